//! Deterministic identity of an item's remote counterpart.

use serde_json::{json, Map, Value};

use crate::models::ItemId;

/// The two provider-searchable handles derived from a local item id
///
/// `uid` is the idempotency UID the provider enforces uniqueness on; the
/// private property is a fallback for providers or objects that lost the UID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationKey {
    pub uid: String,
    pub private_key: String,
    pub private_value: String,
}

impl CorrelationKey {
    pub fn for_item(namespace: &str, private_key: &str, item_id: &ItemId) -> Self {
        let item_id = item_id.as_str();
        Self {
            uid: format!("{namespace}-{item_id}@{namespace}"),
            private_key: private_key.to_string(),
            private_value: item_id,
        }
    }

    /// `key=value` form used by private-property queries
    pub fn private_filter(&self) -> String {
        format!("{}={}", self.private_key, self.private_value)
    }

    /// Stamp the UID and private property onto a create payload
    ///
    /// Other extended properties, private or shared, are kept.
    pub fn apply_to_payload(&self, payload: &Value) -> Value {
        let mut body = match payload {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        body.insert("iCalUID".to_string(), json!(self.uid));

        let mut extended = match body.remove("extendedProperties") {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        let mut private = match extended.remove("private") {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        private.insert(self.private_key.clone(), json!(self.private_value));
        extended.insert("private".to_string(), Value::Object(private));
        body.insert("extendedProperties".to_string(), Value::Object(extended));

        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn key_is_deterministic_per_item() {
        let item_id = ItemId::new();
        let first = CorrelationKey::for_item("agenda", "agenda_item_id", &item_id);
        let second = CorrelationKey::for_item("agenda", "agenda_item_id", &item_id);
        assert_eq!(first, second);
        assert_eq!(first.uid, format!("agenda-{item_id}@agenda"));
        assert_eq!(first.private_filter(), format!("agenda_item_id={item_id}"));

        let other = CorrelationKey::for_item("agenda", "agenda_item_id", &ItemId::new());
        assert_ne!(first.uid, other.uid);
    }

    #[test]
    fn apply_to_payload_merges_identity() {
        let item_id = ItemId::new();
        let key = CorrelationKey::for_item("agenda", "agenda_item_id", &item_id);
        let payload = json!({
            "summary": "Dentist",
            "extendedProperties": {
                "private": { "origin": "chat" },
                "shared": { "color": "blue" }
            }
        });

        let body = key.apply_to_payload(&payload);
        assert_eq!(
            body,
            json!({
                "summary": "Dentist",
                "iCalUID": key.uid,
                "extendedProperties": {
                    "private": { "origin": "chat", "agenda_item_id": item_id.as_str() },
                    "shared": { "color": "blue" }
                }
            })
        );
    }

    #[test]
    fn apply_to_payload_replaces_malformed_extended_properties() {
        let key = CorrelationKey::for_item("ns", "k", &ItemId::new());
        let body = key.apply_to_payload(&json!({ "extendedProperties": "broken" }));
        assert_eq!(body["extendedProperties"]["private"]["k"], json!(key.private_value));
    }
}
