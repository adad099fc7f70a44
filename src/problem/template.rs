//! Reusable constraint templates and their registry.
use super::expression::Expr;
use anyhow::{Result, ensure};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use strum::{Display, EnumString};

/// Whether a template is a hard constraint or a term of the objective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum TemplateKind {
    /// Must evaluate to true (non-zero) for an assignment to be feasible
    Predicate,
    /// Contributes its value to the objective
    Function,
}

/// A named expression with an ordered list of integer parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// Name used by constraints to refer to the template
    pub name: String,
    /// Predicate or function
    pub kind: TemplateKind,
    /// Parameter names, in the order constraint arguments bind to them
    pub parameters: Vec<String>,
    /// The template body
    pub expression: Expr,
}

impl Template {
    /// Create a new template, checking that every parameter used in the expression is declared
    pub fn new(
        name: &str,
        kind: TemplateKind,
        parameters: &[&str],
        expression: Expr,
    ) -> Result<Self> {
        let declared: HashSet<&str> = parameters.iter().copied().collect();
        ensure!(
            declared.len() == parameters.len(),
            "Template {name} has duplicate parameters"
        );
        for param in expression.iter_params() {
            ensure!(
                declared.contains(param),
                "Template {name} uses undeclared parameter {param}"
            );
        }

        Ok(Self {
            name: name.to_string(),
            kind,
            parameters: parameters.iter().map(ToString::to_string).collect(),
            expression,
        })
    }

    /// A key identifying templates which behave identically, regardless of their names.
    ///
    /// Parameters are renamed to their positions, so templates which differ only in how they name
    /// their parameters share a signature.
    pub fn signature(&self) -> String {
        let positional: HashMap<&str, String> = self
            .parameters
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), format!("p{i}")))
            .collect();

        format!(
            "{}/{}:{}",
            self.kind,
            self.parameters.len(),
            self.expression.rename_params(&positional)
        )
    }
}

/// The templates used by a problem, deduplicated by signature
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateRegistry {
    templates: IndexMap<String, Template>,
    names_by_signature: HashMap<String, String>,
}

impl TemplateRegistry {
    /// Add a template, returning the name under which it can be referenced.
    ///
    /// If an equivalent template is already registered, its name is returned and nothing is added.
    /// If the name is taken by a different template, a numeric suffix is appended.
    pub fn add(&mut self, mut template: Template) -> String {
        let signature = template.signature();
        if let Some(name) = self.names_by_signature.get(&signature) {
            return name.clone();
        }

        if self.templates.contains_key(&template.name) {
            let base = template.name.clone();
            let mut suffix = 1;
            while self.templates.contains_key(&format!("{base}{suffix}")) {
                suffix += 1;
            }
            template.name = format!("{base}{suffix}");
        }

        let name = template.name.clone();
        self.names_by_signature.insert(signature, name.clone());
        self.templates.insert(name.clone(), template);
        name
    }

    /// Add a template keeping its name, which must not already be in use
    pub fn insert(&mut self, template: Template) -> Result<()> {
        ensure!(
            !self.templates.contains_key(&template.name),
            "Duplicate template name: {}",
            template.name
        );

        self.names_by_signature
            .entry(template.signature())
            .or_insert_with(|| template.name.clone());
        self.templates.insert(template.name.clone(), template);
        Ok(())
    }

    /// Look up a template by name
    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    /// Iterate over templates of the given kind, in insertion order
    pub fn iter_kind(&self, kind: TemplateKind) -> impl Iterator<Item = &Template> {
        self.templates.values().filter(move |t| t.kind == kind)
    }

    /// The number of registered templates
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether no templates are registered
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
