//! Solution documents produced by solvers.
use super::{attribute_value, local_name_as_str};
use crate::solver::SolveError;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, Event};
use std::fs;
use std::io::{self, Cursor};
use std::path::Path;

/// The achieved objective and variable values for a solved problem
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Solution {
    /// The achieved objective value
    pub valuation: u64,
    /// Values of variables, in document order
    pub assignments: IndexMap<String, i64>,
}

impl Solution {
    /// The value assigned to a variable
    pub fn value(&self, variable: &str) -> Option<i64> {
        self.assignments.get(variable).copied()
    }
}

fn malformed<E: std::fmt::Display>(err: E) -> SolveError {
    SolveError::MalformedOutput(err.to_string())
}

fn parse_valuation(value: Option<String>) -> Result<u64, SolveError> {
    let value = value.ok_or(SolveError::MissingValuation)?;
    value
        .trim()
        .parse()
        .map_err(|_| SolveError::InvalidValuation(value))
}

/// Parse a solution document.
///
/// The root `<solution>` element must carry a `valuation` attribute holding a non-negative
/// integer.
pub fn parse_solution(xml: &str) -> Result<Solution, SolveError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut solution: Option<Solution> = None;
    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let name = e.local_name();
                match local_name_as_str(&name) {
                    "solution" => {
                        let valuation =
                            parse_valuation(attribute_value(e, "valuation").map_err(malformed)?)?;
                        solution = Some(Solution {
                            valuation,
                            assignments: IndexMap::new(),
                        });
                    }
                    "assignment" => {
                        let current = solution.as_mut().ok_or_else(|| {
                            malformed("<assignment> found outside of <solution>")
                        })?;
                        let variable = attribute_value(e, "variable")
                            .map_err(malformed)?
                            .ok_or_else(|| malformed("<assignment> has no variable"))?;
                        let value = attribute_value(e, "value")
                            .map_err(malformed)?
                            .ok_or_else(|| malformed("<assignment> has no value"))?;
                        let value = value.trim().parse().map_err(|_| {
                            malformed(format!("Invalid value {value} for variable {variable}"))
                        })?;
                        current.assignments.insert(variable, value);
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    solution.ok_or_else(|| malformed("Document has no <solution> element"))
}

/// Read a solution document written by a solver
pub fn read_solution_file(file_path: &Path) -> Result<Solution, SolveError> {
    let xml = match fs::read_to_string(file_path) {
        Ok(xml) => xml,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(SolveError::MissingOutput(file_path.to_path_buf()));
        }
        Err(err) => return Err(err.into()),
    };

    parse_solution(&xml)
}

/// Write a solution document to the specified path
pub fn write_solution_file(solution: &Solution, file_path: &Path) -> Result<()> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer
        .create_element("solution")
        .with_attribute(("valuation", solution.valuation.to_string().as_str()))
        .write_inner_content(|writer| {
            for (variable, value) in &solution.assignments {
                writer
                    .create_element("assignment")
                    .with_attribute(("variable", variable.as_str()))
                    .with_attribute(("value", value.to_string().as_str()))
                    .write_empty()?;
            }
            Ok::<(), quick_xml::Error>(())
        })?;

    let xml = String::from_utf8(writer.into_inner().into_inner())?;
    fs::write(file_path, xml)
        .with_context(|| format!("Failed to write solution to {}", file_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_solution() {
        let xml = r#"<?xml version="1.0"?>
            <solution valuation="1234">
              <assignment variable="wind_capacity" value="80"/>
              <assignment variable="flow_a_b" value="-20"/>
            </solution>"#;
        let solution = parse_solution(xml).unwrap();
        assert_eq!(solution.valuation, 1234);
        assert_eq!(solution.value("wind_capacity"), Some(80));
        assert_eq!(solution.value("flow_a_b"), Some(-20));
        assert_eq!(solution.value("other"), None);
    }

    #[test]
    fn test_parse_solution_missing_valuation() {
        let xml = r#"<solution><assignment variable="x" value="1"/></solution>"#;
        assert!(matches!(
            parse_solution(xml),
            Err(SolveError::MissingValuation)
        ));
    }

    #[rstest]
    #[case("-5")]
    #[case("12.5")]
    #[case("many")]
    #[case("")]
    fn test_parse_solution_invalid_valuation(#[case] valuation: &str) {
        let xml = format!(r#"<solution valuation="{valuation}"/>"#);
        assert!(matches!(
            parse_solution(&xml),
            Err(SolveError::InvalidValuation(_))
        ));
    }

    #[rstest]
    #[case(r#"<solution valuation="1"><assignment variable="x" value="a"/></solution>"#)]
    #[case(r#"<solution valuation="1"><assignment value="1"/></solution>"#)]
    #[case("<other/>")]
    #[case("")]
    fn test_parse_solution_malformed(#[case] xml: &str) {
        assert!(matches!(
            parse_solution(xml),
            Err(SolveError::MalformedOutput(_))
        ));
    }

    #[test]
    fn test_solution_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("solution.xml");
        assert!(matches!(
            read_solution_file(&path),
            Err(SolveError::MissingOutput(_))
        ));

        let solution = Solution {
            valuation: 42,
            assignments: [("x".to_string(), 3), ("y".to_string(), -1)]
                .into_iter()
                .collect(),
        };
        write_solution_file(&solution, &path).unwrap();
        assert_eq!(read_solution_file(&path).unwrap(), solution);
    }
}
