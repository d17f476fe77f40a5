//! Startup discovery contract: a JSON array of startup objects, possibly wrapped in prose.

use serde_json::{Map, Value};

use crate::error::ParseError;

/// One undecorated startup object exactly as the model returned it.
pub type RawStartup = Map<String, Value>;

pub fn render(sector: &str, sub_sector: &str, num_startups: usize) -> String {
    format!(
        "Search for {num_startups} startups in the {sector} sector, specifically in the \
         {sub_sector} sub-sector, focusing on lesser-known companies that are gaining traction. \
         For each startup, provide the following information: name, description, funding \
         amount in US dollars (if available), and key technology.\n\n\
         Format the response as a JSON array of startup objects, each containing \"name\", \
         \"description\", \"funding\" and \"technology\" fields. Use a number or null for \
         \"funding\". Return only the JSON array.",
    )
}

/// Slice from the first `[` to the last `]`, dropping any prose around the array.
pub fn extract_json_array(text: &str) -> Result<&str, ParseError> {
    let start = text.find('[');
    let end = text.rfind(']');
    match (start, end) {
        (Some(s), Some(e)) if s < e => Ok(&text[s..=e]),
        _ => Err(ParseError::MalformedShape(
            "no JSON array found in discovery response".into(),
        )),
    }
}

/// Strictly decode the array. Anything other than an array of objects is rejected whole.
pub fn parse(text: &str) -> Result<Vec<RawStartup>, ParseError> {
    let json = extract_json_array(text)?;
    let value: Value = serde_json::from_str(json)
        .map_err(|e| ParseError::MalformedShape(format!("invalid JSON array: {}", e)))?;

    let Value::Array(items) = value else {
        return Err(ParseError::MalformedShape(
            "top-level value is not an array".into(),
        ));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(obj) => Ok(obj),
            other => Err(ParseError::MalformedShape(format!(
                "element {} is not an object: {}",
                i,
                type_name(&other)
            ))),
        })
        .collect()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
