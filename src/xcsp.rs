//! Reading and writing subproblems in the XCSP 2.1 format understood by FRODO.
//!
//! Problems are written as `<instance>` documents and solutions are read from `<solution>`
//! documents whose root carries the achieved `valuation`.
use quick_xml::events::BytesStart;
use quick_xml::name::LocalName;

mod reader;
mod solution;
mod writer;
pub use reader::{read_problem, read_problem_file};
pub use solution::{Solution, parse_solution, read_solution_file, write_solution_file};
pub use writer::{write_problem, write_problem_file};

/// The value of the `format` attribute of the `<presentation>` element
pub const FORMAT: &str = "XCSP 2.1_FRODO";

/// Get the value of an attribute, if present
fn attribute_value(event: &BytesStart, key: &str) -> quick_xml::Result<Option<String>> {
    for attr in event.attributes().with_checks(false) {
        let attr = attr?;
        if attr.key.local_name().as_ref() == key.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }

    Ok(None)
}

fn local_name_as_str<'a>(name: &'a LocalName<'a>) -> &'a str {
    std::str::from_utf8(name.as_ref()).unwrap_or_default()
}
