use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::constants::{LINE1_MARKER, LINE2_MARKER};
use crate::domain::ElementRecord;
use crate::error::{Result, TleError};

// Field aliases seen from the source over time, lower-cased
const NAME_FIELDS: &[&str] = &["object_name", "objectname", "object", "name"];
const LINE1_FIELDS: &[&str] = &["tle_line1", "line1", "tle1", "line_1"];
const LINE2_FIELDS: &[&str] = &["tle_line2", "line2", "tle2", "line_2"];

/// Parse the structured record format.
///
/// Field names are matched case-insensitively against a short alias list;
/// when two keys differ only in casing the first one in the document wins.
/// Records without both data lines are dropped rather than failing the batch.
pub fn parse_json(bytes: &[u8]) -> Result<Vec<ElementRecord>> {
    let root: Value = serde_json::from_slice(bytes).map_err(|e| TleError::InvalidJson(e.to_string()))?;
    let items = match root {
        Value::Array(items) => items,
        Value::Object(obj) => vec![Value::Object(obj)],
        other => {
            return Err(TleError::InvalidJson(format!(
                "expected an array of records, found {}",
                value_kind(&other)
            )))
        }
    };

    let total = items.len();
    let records: Vec<ElementRecord> = items
        .iter()
        .filter_map(|item| item.as_object())
        .filter_map(record_from_object)
        .collect();

    if records.is_empty() {
        warn!("parse_json: none of {} entries carried both data lines", total);
        return Err(TleError::NoUsableRecords);
    }
    debug!("parse_json: kept {} of {} entries", records.len(), total);
    Ok(records)
}

fn record_from_object(obj: &Map<String, Value>) -> Option<ElementRecord> {
    let fields = fold_keys(obj);
    let line1 = lookup_str(&fields, LINE1_FIELDS).filter(|l| l.starts_with(LINE1_MARKER))?;
    let line2 = lookup_str(&fields, LINE2_FIELDS).filter(|l| l.starts_with(LINE2_MARKER))?;
    let name = lookup_str(&fields, NAME_FIELDS).filter(|n| !n.is_empty());
    Some(ElementRecord::new(name, line1, line2))
}

/// Lower-case every key, keeping the first value seen for each folded key.
fn fold_keys(obj: &Map<String, Value>) -> HashMap<String, &Value> {
    let mut folded = HashMap::with_capacity(obj.len());
    for (key, value) in obj {
        folded.entry(key.to_ascii_lowercase()).or_insert(value);
    }
    folded
}

fn lookup_str(fields: &HashMap<String, &Value>, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|alias| match fields.get(*alias) {
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const L1: &str = "1 25544U 98067A   24001.50000000  .00016717  00000-0  10270-3 0  9005";
    const L2: &str = "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391 12345";

    fn bytes(v: Value) -> Vec<u8> {
        serde_json::to_vec(&v).unwrap()
    }

    #[test]
    fn test_field_lookup_ignores_case_and_aliases() {
        let payload = bytes(json!([
            { "OBJECT_NAME": "ISS (ZARYA)", "TLE_LINE1": L1, "TLE_LINE2": L2 },
            { "objectName": "CSS", "Line1": L1, "LINE2": L2 },
            { "Object": "HST", "tle1": L1, "tle2": L2 }
        ]));
        let records = parse_json(&payload).unwrap();
        let names: Vec<_> = records.iter().map(|r| r.name.clone().unwrap()).collect();
        assert_eq!(names, vec!["ISS (ZARYA)", "CSS", "HST"]);
        assert!(records.iter().all(|r| r.line1 == L1 && r.line2 == L2));
    }

    #[test]
    fn test_first_seen_casing_wins() {
        let raw = format!(
            r#"[{{"Object_Name":"FIRST","OBJECT_NAME":"SECOND","TLE_LINE1":"{L1}","TLE_LINE2":"{L2}"}}]"#
        );
        let records = parse_json(raw.as_bytes()).unwrap();
        assert_eq!(records[0].name.as_deref(), Some("FIRST"));
    }

    #[test]
    fn test_records_missing_a_line_are_dropped() {
        let payload = bytes(json!([
            { "OBJECT_NAME": "NO LINE 2", "TLE_LINE1": L1 },
            { "OBJECT_NAME": "BAD LINE 1", "TLE_LINE1": "garbage", "TLE_LINE2": L2 },
            { "OBJECT_NAME": "OK", "TLE_LINE1": L1, "TLE_LINE2": L2 },
            "not an object"
        ]));
        let records = parse_json(&payload).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name.as_deref(), Some("OK"));
    }

    #[test]
    fn test_gp_elements_without_lines_are_not_usable() {
        let payload = bytes(json!([
            { "OBJECT_NAME": "ISS (ZARYA)", "NORAD_CAT_ID": 25544, "MEAN_MOTION": 15.5 }
        ]));
        assert_eq!(parse_json(&payload).unwrap_err(), TleError::NoUsableRecords);
        assert_eq!(parse_json(b"[]").unwrap_err(), TleError::NoUsableRecords);
    }

    #[test]
    fn test_undecodable_payload_is_invalid_json() {
        assert!(matches!(parse_json(b"No GP data found"), Err(TleError::InvalidJson(_))));
        assert!(matches!(parse_json(b"42"), Err(TleError::InvalidJson(_))));
    }

    #[test]
    fn test_unnamed_record_is_kept() {
        let payload = bytes(json!({ "line1": L1, "line2": L2 }));
        let records = parse_json(&payload).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].name.is_none());
    }
}
