// Test case specification parsing and builders
//
// Accepted input: a JSON array of case objects, a single case object, or
// nothing. Anything that fails to parse is treated as "no test cases"; the
// executor substitutes the smoke test in that situation.
use codegrade_common::types::TestCase;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

pub const SIMPLE_TEST_DESCRIPTION: &str = "Basic output test";

#[derive(Debug, Deserialize)]
struct RawCase {
    input: Option<String>,
    expected_output: Option<String>,
    description: Option<String>,
}

impl RawCase {
    fn into_case(self, default_description: String) -> TestCase {
        TestCase {
            input: self.input.unwrap_or_default(),
            expected_output: self.expected_output.unwrap_or_default(),
            description: self.description.unwrap_or(default_description),
        }
    }
}

/// Parse a test case specification.
///
/// Returns an empty list for a missing, blank or malformed specification.
pub fn parse_test_cases(spec: Option<&str>) -> Vec<TestCase> {
    let Some(text) = spec.map(str::trim).filter(|text| !text.is_empty()) else {
        return Vec::new();
    };

    match serde_json::from_str::<Value>(text) {
        Ok(value) => parse_value(value),
        Err(e) => {
            warn!(error = %e, "Test case specification is not valid JSON");
            Vec::new()
        }
    }
}

/// Same as [`parse_test_cases`] for a specification that is already JSON
pub fn parse_value(value: Value) -> Vec<TestCase> {
    let parsed = match value {
        Value::Null => return Vec::new(),
        Value::Array(entries) => entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| parse_entry(entry).map(|raw| raw.into_case(format!("Test case {}", i + 1))))
            .collect::<Result<Vec<_>, _>>(),
        object @ Value::Object(_) => {
            parse_entry(object).map(|raw| vec![raw.into_case("Test case".to_string())])
        }
        other => Err(format!("expected a list or an object, found {}", json_kind(&other))),
    };

    parsed.unwrap_or_else(|reason| {
        warn!(reason = %reason, "Malformed test case specification, ignoring it");
        Vec::new()
    })
}

fn parse_entry(entry: Value) -> Result<RawCase, String> {
    if !entry.is_object() {
        return Err(format!("test case entry is {}, not an object", json_kind(&entry)));
    }
    serde_json::from_value(entry).map_err(|e| e.to_string())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// The cases to run: the parsed list, or the smoke test when it is empty
pub fn cases_or_smoke_test(cases: Vec<TestCase>) -> Vec<TestCase> {
    if cases.is_empty() {
        vec![TestCase::smoke_test()]
    } else {
        cases
    }
}

/// One-case specification checking a program's output
pub fn simple_test_case_json(expected_output: &str, input: &str) -> String {
    test_cases_json(&[TestCase::new(input, expected_output, SIMPLE_TEST_DESCRIPTION)])
}

/// Serialize cases back into the specification format
pub fn test_cases_json(cases: &[TestCase]) -> String {
    // A list of plain string fields always serializes
    serde_json::to_string_pretty(cases).unwrap_or_else(|_| "[]".to_string())
}
