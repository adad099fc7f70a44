//! Parse an XCSP instance into a [`Problem`].
use super::{attribute_value, local_name_as_str};
use crate::problem::expression::Expr;
use crate::problem::{Argument, Domain, Problem, Template, TemplateKind};
use anyhow::{Context, Result, bail, ensure};
use itertools::Itertools;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// A template whose child elements have not all been read yet
struct PendingTemplate {
    name: String,
    kind: TemplateKind,
    parameters: Vec<String>,
    expression: Option<Expr>,
}

/// A constraint whose parameters have not been read yet
struct PendingConstraint {
    name: String,
    reference: String,
    arguments: Vec<Argument>,
}

/// Parser state for one document
#[derive(Default)]
struct InstanceReader {
    problem: Option<Problem>,
    domains: HashMap<String, Domain>,
    pending_domain: Option<String>,
    pending_template: Option<PendingTemplate>,
    pending_constraint: Option<PendingConstraint>,
    active_tag: Option<String>,
}

fn required_attribute(event: &BytesStart, key: &str) -> Result<String> {
    let tag = String::from_utf8_lossy(event.local_name().as_ref()).into_owned();
    attribute_value(event, key)?.with_context(|| format!("<{tag}> is missing attribute {key}"))
}

/// Parse a domain in `lo..hi` notation
fn parse_domain(text: &str) -> Result<Domain> {
    let (min, max) = text
        .split_once("..")
        .with_context(|| format!("Invalid domain: {text}"))?;
    Domain::new(min.trim().parse()?, max.trim().parse()?)
}

/// Parse a typed parameter list, e.g. `int a int b`
fn parse_parameters(text: &str) -> Result<Vec<String>> {
    let tokens = text.split_whitespace().collect_vec();
    ensure!(tokens.len() % 2 == 0, "Invalid parameter list: {text}");

    tokens
        .chunks(2)
        .map(|pair| {
            ensure!(pair[0] == "int", "Unsupported parameter type: {}", pair[0]);
            Ok(pair[1].to_string())
        })
        .collect()
}

fn parse_arguments(text: &str) -> Vec<Argument> {
    text.split_whitespace()
        .map(|token| match token.parse() {
            Ok(value) => Argument::Literal(value),
            Err(_) => Argument::Variable(token.to_string()),
        })
        .collect()
}

impl InstanceReader {
    fn problem(&mut self) -> Result<&mut Problem> {
        self.problem
            .as_mut()
            .context("<presentation> must precede the problem definition")
    }

    fn start(&mut self, event: &BytesStart, tag: &str) -> Result<()> {
        match tag {
            "presentation" => {
                let name = required_attribute(event, "name")?;
                let maximise = match attribute_value(event, "maximize")?.as_deref() {
                    None | Some("false") => false,
                    Some("true") => true,
                    Some(other) => bail!("Invalid value for maximize: {other}"),
                };
                self.problem = Some(Problem::new(&name, maximise));
            }
            "agent" => {
                let name = required_attribute(event, "name")?;
                self.problem()?.add_agent(&name);
            }
            "domain" => self.pending_domain = Some(required_attribute(event, "name")?),
            "variable" => {
                let name = required_attribute(event, "name")?;
                let domain_name = required_attribute(event, "domain")?;
                let agent = required_attribute(event, "agent")?;
                let domain = *self
                    .domains
                    .get(&domain_name)
                    .with_context(|| format!("Unknown domain {domain_name}"))?;
                self.problem()?.add_variable(&name, domain, &agent)?;
            }
            "predicate" | "function" => {
                let kind = if tag == "predicate" {
                    TemplateKind::Predicate
                } else {
                    TemplateKind::Function
                };
                self.pending_template = Some(PendingTemplate {
                    name: required_attribute(event, "name")?,
                    kind,
                    parameters: Vec::new(),
                    expression: None,
                });
            }
            "constraint" => {
                self.pending_constraint = Some(PendingConstraint {
                    name: required_attribute(event, "name")?,
                    reference: required_attribute(event, "reference")?,
                    arguments: Vec::new(),
                });
            }
            _ => {}
        }

        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<()> {
        match self.active_tag.as_deref() {
            Some("domain") => {
                let name = self
                    .pending_domain
                    .take()
                    .context("Unexpected domain values")?;
                self.domains.insert(name, parse_domain(text)?);
            }
            Some("parameters") => {
                if let Some(constraint) = self.pending_constraint.as_mut() {
                    constraint.arguments = parse_arguments(text);
                } else if let Some(template) = self.pending_template.as_mut() {
                    template.parameters = parse_parameters(text)?;
                }
            }
            Some("functional") => {
                let template = self
                    .pending_template
                    .as_mut()
                    .context("Expression outside of a predicate or function")?;
                template.expression = Some(text.parse()?);
            }
            _ => {}
        }

        Ok(())
    }

    fn end(&mut self, tag: &str) -> Result<()> {
        match tag {
            "predicate" | "function" => {
                let pending = self
                    .pending_template
                    .take()
                    .context("Unexpected end of template")?;
                let expression = pending
                    .expression
                    .with_context(|| format!("Template {} has no expression", pending.name))?;
                let parameters = pending.parameters.iter().map(String::as_str).collect_vec();
                let template = Template::new(&pending.name, pending.kind, &parameters, expression)?;
                self.problem()?.insert_template(template)?;
            }
            "constraint" => {
                let pending = self
                    .pending_constraint
                    .take()
                    .context("Unexpected end of constraint")?;
                self.problem()?.add_constraint(
                    &pending.name,
                    &pending.reference,
                    pending.arguments,
                )?;
            }
            _ => {}
        }

        Ok(())
    }
}

/// Parse an XCSP document
pub fn read_problem(xml: &str) -> Result<Problem> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut state = InstanceReader::default();
    loop {
        match reader.read_event()? {
            Event::Start(ref e) => {
                let name = e.local_name();
                let tag = local_name_as_str(&name);
                state.active_tag = Some(tag.to_string());
                state.start(e, tag)?;
            }
            Event::Empty(ref e) => {
                let name = e.local_name();
                let tag = local_name_as_str(&name);
                state.start(e, tag)?;
                state.end(tag)?;
            }
            Event::Text(e) => state.text(&e.unescape()?)?,
            Event::End(ref e) => {
                let name = e.local_name();
                let tag = local_name_as_str(&name);
                state.active_tag = None;
                state.end(tag)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    state.problem.context("Document has no <presentation> element")
}

/// Read an XCSP document from the specified path
pub fn read_problem_file(file_path: &Path) -> Result<Problem> {
    let xml = fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read problem from {}", file_path.display()))?;
    read_problem(&xml).with_context(|| format!("Invalid problem file {}", file_path.display()))
}
