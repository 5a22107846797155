//! Desired and observed sub-resource entries.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::kind::SubResourceKind;
use super::signature::ContentSignature;
use crate::planner::Reconcilable;

/// One element of an ordered sub-collection.
///
/// The same type represents both desired entries (built from the stack file)
/// and observed entries (returned by the Data Plane API). Identity lives in
/// `name` and `index`; `fields` holds everything else, in wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubResourceEntry {
    /// Entry kind.
    pub kind: SubResourceKind,
    /// Entry name, for named kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Position within the collection.
    pub index: i64,
    /// Non-identity fields, keyed by wire name.
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl SubResourceEntry {
    /// Creates a new entry.
    #[must_use]
    pub fn new(
        kind: SubResourceKind,
        name: Option<String>,
        index: i64,
        fields: Map<String, Value>,
    ) -> Self {
        Self {
            kind,
            name,
            index,
            fields,
        }
    }

    /// Builds an entry from a wire object.
    ///
    /// The name is taken from the kind's name key and the index from the
    /// `index` field, falling back to `default_index` when absent. `null`
    /// fields are dropped.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if `value` is not an object or if
    /// its name or index has the wrong type.
    pub fn from_object(
        kind: SubResourceKind,
        value: Value,
        default_index: i64,
    ) -> std::result::Result<Self, String> {
        let Value::Object(mut fields) = value else {
            return Err(format!("{kind} entry is not an object"));
        };

        let name = match kind.name_key().and_then(|key| fields.remove(key)) {
            None | Some(Value::Null) => None,
            Some(Value::String(name)) => Some(name),
            Some(other) => return Err(format!("{kind} name is not a string: {other}")),
        };

        let index = match fields.remove("index") {
            None | Some(Value::Null) => default_index,
            Some(value) => value
                .as_i64()
                .ok_or_else(|| format!("{kind} index is not an integer: {value}"))?,
        };

        fields.retain(|_, value| !value.is_null());

        Ok(Self {
            kind,
            name,
            index,
            fields,
        })
    }

    /// Returns this entry with a different index.
    #[must_use]
    pub fn with_index(mut self, index: i64) -> Self {
        self.index = index;
        self
    }

    /// Returns the content signature.
    #[must_use]
    pub fn signature(&self) -> ContentSignature {
        ContentSignature::of(self.kind, &self.fields)
    }

    /// Returns a field as text, if present.
    #[must_use]
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Request body for the Data Plane API at the given position.
    ///
    /// Entries addressed by name carry no index on the wire.
    #[must_use]
    pub fn payload(&self, index: i64) -> Value {
        let mut body = self.fields.clone();
        if let (Some(key), Some(name)) = (self.kind.name_key(), &self.name) {
            body.insert(key.to_string(), Value::String(name.clone()));
        }
        if !self.kind.addressed_by_name() {
            body.insert(String::from("index"), Value::from(index));
        }
        Value::Object(body)
    }

    /// Short description used in logs and plan output.
    #[must_use]
    pub fn describe(&self) -> String {
        match (&self.name, self.field_str("type")) {
            (Some(name), _) => format!("{} '{name}'", self.kind),
            (None, Some(rule_type)) => format!("{} ({rule_type})", self.kind),
            (None, None) => self.kind.to_string(),
        }
    }
}

impl Reconcilable for SubResourceEntry {
    type Signature = ContentSignature;

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn index(&self) -> i64 {
        self.index
    }

    fn signature(&self) -> ContentSignature {
        ContentSignature::of(self.kind, &self.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_object_extracts_identity() {
        let entry = SubResourceEntry::from_object(
            SubResourceKind::Acl,
            json!({"acl_name": "is_api", "index": 3, "criterion": "path_beg", "value": "/api", "extra": null}),
            0,
        )
        .unwrap();

        assert_eq!(entry.name.as_deref(), Some("is_api"));
        assert_eq!(entry.index, 3);
        assert!(!entry.fields.contains_key("acl_name"));
        assert!(!entry.fields.contains_key("index"));
        assert!(!entry.fields.contains_key("extra"));
    }

    #[test]
    fn test_from_object_defaults_index() {
        let entry = SubResourceEntry::from_object(
            SubResourceKind::Server,
            json!({"name": "web1", "address": "10.0.0.1", "port": 8080}),
            2,
        )
        .unwrap();
        assert_eq!(entry.index, 2);
    }

    #[test]
    fn test_from_object_rejects_bad_shapes() {
        assert!(SubResourceEntry::from_object(SubResourceKind::Acl, json!([1, 2]), 0).is_err());
        assert!(
            SubResourceEntry::from_object(
                SubResourceKind::HttpRequestRule,
                json!({"type": "deny", "index": "first"}),
                0
            )
            .is_err()
        );
    }

    #[test]
    fn test_payload_by_addressing() {
        let acl = SubResourceEntry::from_object(
            SubResourceKind::Acl,
            json!({"acl_name": "is_api", "criterion": "path_beg", "value": "/api"}),
            7,
        )
        .unwrap();
        let body = acl.payload(2);
        assert_eq!(body["acl_name"], "is_api");
        assert_eq!(body["index"], 2);

        let server = SubResourceEntry::from_object(
            SubResourceKind::Server,
            json!({"name": "web1", "address": "10.0.0.1"}),
            0,
        )
        .unwrap();
        let body = server.payload(0);
        assert_eq!(body["name"], "web1");
        assert!(body.get("index").is_none());
    }

    #[test]
    fn test_describe() {
        let rule = SubResourceEntry::from_object(
            SubResourceKind::HttpRequestRule,
            json!({"type": "deny"}),
            4,
        )
        .unwrap();
        assert_eq!(rule.describe(), "http-request rule (deny)");
    }
}
