use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::contracts::discovery::{self as contract, RawStartup};
use crate::error::ScoutError;
use crate::llm::CompletionClient;
use crate::model::StartupCandidate;

/// Ask the search-augmented provider for startups and normalize the batch.
pub async fn discover(
    search: &CompletionClient,
    sector: &str,
    sub_sector: &str,
    num_startups: usize,
    max_tokens: u32,
) -> Result<Vec<StartupCandidate>, ScoutError> {
    info!(
        sector,
        sub_sector,
        num_startups,
        provider = search.provider_name(),
        "Discovering startups"
    );

    let prompt = contract::render(sector, sub_sector, num_startups);
    let text = search.complete(&prompt, max_tokens).await?;

    let records = contract::parse(&text).map_err(|e| {
        warn!(sector, sub_sector, error = %e, "Discovery response rejected");
        e
    })?;
    let candidates = normalize(records)?;

    info!(sector, sub_sector, count = candidates.len(), "Startups discovered");
    Ok(candidates)
}

/// Validate and coerce a decoded batch into session candidates.
///
/// Records without a usable `name` are dropped. On an exact name collision the first
/// record wins. `funding` is coerced to a number or `None`.
pub fn normalize(records: Vec<RawStartup>) -> Result<Vec<StartupCandidate>, ScoutError> {
    if records.is_empty() {
        return Err(ScoutError::NoCandidatesFound);
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates = Vec::with_capacity(records.len());

    for (i, record) in records.into_iter().enumerate() {
        let name = match record.get("name").and_then(Value::as_str).map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                warn!(index = i, "Dropping startup record without a name");
                continue;
            }
        };

        if !seen.insert(name.clone()) {
            warn!(name = %name, index = i, "Duplicate startup name in discovery batch, keeping first");
            continue;
        }

        let funding = record.get("funding").and_then(coerce_funding);
        if funding.is_none() {
            debug!(name = %name, raw = ?record.get("funding"), "Funding not numeric, treating as unknown");
        }

        candidates.push(StartupCandidate {
            description: text_field(&record, "description"),
            technology: text_field(&record, "technology"),
            funding,
            name,
        });
    }

    if candidates.is_empty() {
        return Err(ScoutError::NoCandidatesFound);
    }
    Ok(candidates)
}

fn text_field(record: &RawStartup, key: &str) -> String {
    match record.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Accepts JSON numbers and money strings such as `"$12.5 million"`, `"5M"` or `"1,000,000"`.
pub fn coerce_funding(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => parse_money(s)?,
        _ => return None,
    };
    (amount.is_finite() && amount >= 0.0).then_some(amount)
}

fn parse_money(raw: &str) -> Option<f64> {
    let cleaned = raw.to_lowercase().replace([',', '$'], "");
    let start = cleaned.find(|c: char| c.is_ascii_digit())?;
    let tail = &cleaned[start..];
    let number: String = tail
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let value: f64 = number.trim_end_matches('.').parse().ok()?;
    let unit = tail[number.len()..].trim_start();

    const UNITS: &[(&str, f64)] = &[
        ("billion", 1e9),
        ("bn", 1e9),
        ("million", 1e6),
        ("mm", 1e6),
        ("thousand", 1e3),
        ("m", 1e6),
        ("k", 1e3),
        ("b", 1e9),
    ];
    let multiplier = UNITS
        .iter()
        .find(|(suffix, _)| unit.starts_with(suffix))
        .map(|(_, m)| *m)
        .unwrap_or(1.0);

    Some(value * multiplier)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::error::ParseError;
    use crate::llm::testing::ScriptedProvider;

    fn records(value: Value) -> Vec<RawStartup> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn test_empty_batch_is_no_candidates() {
        assert!(matches!(normalize(vec![]), Err(ScoutError::NoCandidatesFound)));
    }

    #[test]
    fn test_drops_nameless_and_keeps_first_duplicate() {
        let batch = records(json!([
            {"name": "SolarTech", "description": "first", "funding": 1000000},
            {"description": "no name"},
            {"name": "   "},
            {"name": 42},
            {"name": "SolarTech", "description": "second"},
            {"name": "WindPower", "technology": "Turbines"}
        ]));
        let candidates = normalize(batch).unwrap();
        let names: Vec<_> = candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["SolarTech", "WindPower"]);
        assert_eq!(candidates[0].description, "first");
        assert_eq!(candidates[0].funding, Some(1_000_000.0));
        assert_eq!(candidates[1].funding, None);
        assert_eq!(candidates[1].description, "");
    }

    #[test]
    fn test_all_dropped_is_no_candidates() {
        let batch = records(json!([{"description": "x"}, {"name": ""}]));
        assert!(matches!(normalize(batch), Err(ScoutError::NoCandidatesFound)));
    }

    #[test]
    fn test_coerce_funding() {
        assert_eq!(coerce_funding(&json!(2500000)), Some(2_500_000.0));
        assert_eq!(coerce_funding(&json!("$1,000,000")), Some(1_000_000.0));
        assert_eq!(coerce_funding(&json!("$12.5 million")), Some(12_500_000.0));
        assert_eq!(coerce_funding(&json!("5M")), Some(5_000_000.0));
        assert_eq!(coerce_funding(&json!("$2.1B")), Some(2_100_000_000.0));
        assert_eq!(coerce_funding(&json!("750k")), Some(750_000.0));
        assert_eq!(coerce_funding(&json!("Undisclosed")), None);
        assert_eq!(coerce_funding(&json!(null)), None);
        assert_eq!(coerce_funding(&json!(-5)), None);
        assert_eq!(coerce_funding(&json!(true)), None);
    }

    #[test]
    fn test_technology_list_is_joined() {
        let batch = records(json!([{"name": "A", "technology": ["CRISPR", "ML"]}]));
        assert_eq!(normalize(batch).unwrap()[0].technology, "CRISPR, ML");
    }

    #[tokio::test]
    async fn test_discover_end_to_end() {
        let provider = Arc::new(ScriptedProvider::new().on(
            "JSON array",
            r#"Sure! [{"name": "SolarTech", "description": "Solar panel manufacturer", "funding": 1000000, "technology": "Advanced photovoltaic cells"}] Hope that helps!"#,
        ));
        let candidates = discover(&provider.client(), "Renewable Energy", "Solar Energy", 5, 4000)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "SolarTech");
        assert_eq!(candidates[0].funding, Some(1_000_000.0));
    }

    #[tokio::test]
    async fn test_discover_rejects_wrong_shape() {
        let provider = Arc::new(ScriptedProvider::new().on("JSON array", "\"no startups\""));
        let err = discover(&provider.client(), "AI", "NLP", 5, 4000)
            .await
            .unwrap_err();
        assert!(matches!(err, ScoutError::Parse(ParseError::MalformedShape(_))));
    }
}
