//! Serialise a [`Problem`] as an XCSP instance.
use super::FORMAT;
use crate::problem::{Domain, Problem, Template, TemplateKind};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use itertools::Itertools;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesText, Event};
use std::fs;
use std::io::Cursor;
use std::path::Path;

const SCHEMA_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SCHEMA_LOCATION: &str = "src/frodo2/algorithms/XCSPschemaJaCoP.xsd";

/// Name the distinct domains used by the problem's variables
fn name_domains(problem: &Problem) -> IndexMap<Domain, String> {
    let mut names = IndexMap::new();
    for (_, var) in problem.variables() {
        let next = names.len();
        names
            .entry(var.domain)
            .or_insert_with(|| format!("domain{next}"));
    }

    names
}

fn write_template<W: std::io::Write>(
    writer: &mut Writer<W>,
    template: &Template,
) -> quick_xml::Result<()> {
    let parameters = template
        .parameters
        .iter()
        .map(|name| format!("int {name}"))
        .join(" ");
    let expression = template.expression.to_string();

    let element = match template.kind {
        TemplateKind::Predicate => writer
            .create_element("predicate")
            .with_attribute(("name", template.name.as_str())),
        TemplateKind::Function => writer
            .create_element("function")
            .with_attribute(("name", template.name.as_str()))
            .with_attribute(("return", "int")),
    };
    element.write_inner_content(|writer| {
        writer
            .create_element("parameters")
            .write_text_content(BytesText::new(&parameters))?;
        writer
            .create_element("expression")
            .write_inner_content(|writer| {
                writer
                    .create_element("functional")
                    .write_text_content(BytesText::new(&expression))?;
                Ok::<(), quick_xml::Error>(())
            })?;
        Ok::<(), quick_xml::Error>(())
    })?;

    Ok(())
}

fn write_templates<W: std::io::Write>(
    writer: &mut Writer<W>,
    problem: &Problem,
    kind: TemplateKind,
) -> quick_xml::Result<()> {
    let templates = problem.templates().iter_kind(kind).collect_vec();
    let (tag, count_attr) = match kind {
        TemplateKind::Predicate => ("predicates", "nbPredicates"),
        TemplateKind::Function => ("functions", "nbFunctions"),
    };

    writer
        .create_element(tag)
        .with_attribute((count_attr, templates.len().to_string().as_str()))
        .write_inner_content(|writer| {
            for template in templates {
                write_template(writer, template)?;
            }
            Ok::<(), quick_xml::Error>(())
        })?;

    Ok(())
}

fn write_instance<W: std::io::Write>(
    writer: &mut Writer<W>,
    problem: &Problem,
) -> quick_xml::Result<()> {
    let domains = name_domains(problem);
    let agents = problem.agents().collect_vec();

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer
        .create_element("instance")
        .with_attribute(("xmlns:xsi", SCHEMA_NAMESPACE))
        .with_attribute(("xsi:noNamespaceSchemaLocation", SCHEMA_LOCATION))
        .write_inner_content(|writer| {
            writer
                .create_element("presentation")
                .with_attribute(("name", problem.name.as_str()))
                .with_attribute((
                    "maxConstraintArity",
                    problem.max_constraint_arity().to_string().as_str(),
                ))
                .with_attribute(("maximize", if problem.maximise { "true" } else { "false" }))
                .with_attribute(("format", FORMAT))
                .write_empty()?;

            writer
                .create_element("agents")
                .with_attribute(("nbAgents", agents.len().to_string().as_str()))
                .write_inner_content(|writer| {
                    for agent in &agents {
                        writer
                            .create_element("agent")
                            .with_attribute(("name", *agent))
                            .write_empty()?;
                    }
                    Ok::<(), quick_xml::Error>(())
                })?;

            writer
                .create_element("domains")
                .with_attribute(("nbDomains", domains.len().to_string().as_str()))
                .write_inner_content(|writer| {
                    for (domain, name) in &domains {
                        let size = domain.max - domain.min + 1;
                        writer
                            .create_element("domain")
                            .with_attribute(("name", name.as_str()))
                            .with_attribute(("nbValues", size.to_string().as_str()))
                            .write_text_content(BytesText::new(&domain.to_string()))?;
                    }
                    Ok::<(), quick_xml::Error>(())
                })?;

            let variables = problem.variables().collect_vec();
            writer
                .create_element("variables")
                .with_attribute(("nbVariables", variables.len().to_string().as_str()))
                .write_inner_content(|writer| {
                    for (name, var) in &variables {
                        writer
                            .create_element("variable")
                            .with_attribute(("name", *name))
                            .with_attribute(("domain", domains[&var.domain].as_str()))
                            .with_attribute(("agent", var.agent.as_str()))
                            .write_empty()?;
                    }
                    Ok::<(), quick_xml::Error>(())
                })?;

            write_templates(writer, problem, TemplateKind::Predicate)?;
            write_templates(writer, problem, TemplateKind::Function)?;

            let constraints = problem.constraints();
            writer
                .create_element("constraints")
                .with_attribute(("nbConstraints", constraints.len().to_string().as_str()))
                .write_inner_content(|writer| {
                    for constraint in constraints {
                        let arguments = constraint.arguments.iter().join(" ");
                        writer
                            .create_element("constraint")
                            .with_attribute(("name", constraint.name.as_str()))
                            .with_attribute((
                                "arity",
                                constraint.scope.len().to_string().as_str(),
                            ))
                            .with_attribute(("scope", constraint.scope.join(" ").as_str()))
                            .with_attribute(("reference", constraint.reference.as_str()))
                            .write_inner_content(|writer| {
                                writer
                                    .create_element("parameters")
                                    .write_text_content(BytesText::new(&arguments))?;
                                Ok::<(), quick_xml::Error>(())
                            })?;
                    }
                    Ok::<(), quick_xml::Error>(())
                })?;

            Ok::<(), quick_xml::Error>(())
        })?;

    Ok(())
}

/// Serialise the problem as an XCSP document
pub fn write_problem(problem: &Problem) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    write_instance(&mut writer, problem)
        .with_context(|| format!("Failed to serialise problem {}", problem.name))?;

    let xml = String::from_utf8(writer.into_inner().into_inner())?;
    Ok(xml)
}

/// Write the problem to the specified path as an XCSP document
pub fn write_problem_file(problem: &Problem, file_path: &Path) -> Result<()> {
    let xml = write_problem(problem)?;
    fs::write(file_path, xml)
        .with_context(|| format!("Failed to write problem to {}", file_path.display()))
}
