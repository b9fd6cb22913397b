use serde_json::{Map, Value};

use crate::StoreError;

/// Filter over stored item documents.
///
/// The filter is a JSON object mapping field names to conditions, in the
/// style of a `where` clause:
///
/// * a plain value matches by equality (`{"harvestState": "New"}`),
/// * `{"$in": [..]}` matches any listed value,
/// * `{"$ne": v}` matches anything but `v`,
/// * `{"$exists": bool}` checks for a present, non-null field.
///
/// A missing field compares as `null`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ItemQuery {
    filter: Map<String, Value>,
    limit: Option<usize>,
}

impl ItemQuery {
    pub fn all() -> Self {
        Self::default()
    }

    /// Parses a JSON `where` object. An empty or blank string means "all".
    pub fn parse_where(json: &str) -> Result<Self, StoreError> {
        if json.trim().is_empty() {
            return Ok(Self::all());
        }
        let value: Value = serde_json::from_str(json).map_err(|e| StoreError::MalformedQuery(e.to_string()))?;
        match value {
            Value::Object(filter) => {
                for (field, cond) in &filter {
                    validate_condition(field, cond)?;
                }
                Ok(Self { filter, limit: None })
            }
            other => Err(StoreError::MalformedQuery(format!("expected a JSON object, got {other}"))),
        }
    }

    /// Items that carry at least one warning.
    pub fn with_warnings() -> Self {
        let mut filter = Map::new();
        let mut cond = Map::new();
        cond.insert("$exists".into(), Value::Bool(true));
        cond.insert("$ne".into(), Value::Array(vec![]));
        filter.insert("warnings".into(), Value::Object(cond));
        Self { filter, limit: None }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn matches(&self, doc: &Map<String, Value>) -> bool {
        self.filter.iter().all(|(field, cond)| {
            let actual = doc.get(field).unwrap_or(&Value::Null);
            condition_matches(actual, cond)
        })
    }
}

fn operator_object(cond: &Value) -> Option<&Map<String, Value>> {
    match cond {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => Some(map),
        _ => None,
    }
}

fn validate_condition(field: &str, cond: &Value) -> Result<(), StoreError> {
    let Some(ops) = operator_object(cond) else {
        return Ok(());
    };
    for (op, arg) in ops {
        match (op.as_str(), arg) {
            ("$in", Value::Array(_)) | ("$ne", _) | ("$exists", Value::Bool(_)) => {}
            ("$in", _) => return Err(StoreError::MalformedQuery(format!("{field}: $in needs an array"))),
            ("$exists", _) => return Err(StoreError::MalformedQuery(format!("{field}: $exists needs a bool"))),
            (other, _) => return Err(StoreError::MalformedQuery(format!("{field}: unsupported operator {other}"))),
        }
    }
    Ok(())
}

fn condition_matches(actual: &Value, cond: &Value) -> bool {
    match operator_object(cond) {
        Some(ops) => ops.iter().all(|(op, arg)| match op.as_str() {
            "$in" => arg.as_array().is_some_and(|vals| vals.contains(actual)),
            "$ne" => actual != arg,
            "$exists" => arg.as_bool() == Some(!actual.is_null()),
            _ => false,
        }),
        None => actual == cond,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn blank_query_matches_everything() {
        let q = ItemQuery::parse_where("  ").unwrap();
        assert!(q.matches(&doc(json!({"a": 1}))));
        assert_eq!(q.limit(), None);
    }

    #[test]
    fn equality_and_in() {
        let q = ItemQuery::parse_where(r#"{"harvestState": {"$in": ["New", "Updated"]}, "inCirculation": true}"#).unwrap();
        assert!(q.matches(&doc(json!({"harvestState": "Updated", "inCirculation": true}))));
        assert!(!q.matches(&doc(json!({"harvestState": "Done", "inCirculation": true}))));
        assert!(!q.matches(&doc(json!({"harvestState": "New"}))));
    }

    #[test]
    fn warnings_query_needs_non_empty_list() {
        let q = ItemQuery::with_warnings();
        assert!(q.matches(&doc(json!({"warnings": ["Gmail user"]}))));
        assert!(!q.matches(&doc(json!({"warnings": []}))));
        assert!(!q.matches(&doc(json!({}))));
    }

    #[test]
    fn rejects_malformed_queries() {
        assert!(matches!(ItemQuery::parse_where("[1,2]"), Err(StoreError::MalformedQuery(_))));
        assert!(ItemQuery::parse_where("{not json").is_err());
        assert!(ItemQuery::parse_where(r#"{"a": {"$in": 3}}"#).is_err());
        assert!(ItemQuery::parse_where(r#"{"a": {"$regex": "x"}}"#).is_err());
    }
}
