//! Content signatures of sub-resource entries.
//!
//! A signature captures exactly the semantically meaningful fields of an
//! entry, excluding its identity (name and index). Two entries are content
//! equal iff their signatures are equal. Signatures are derived, never stored.

use serde_json::{Map, Value};

use super::kind::SubResourceKind;

/// Fields compared for ACLs.
const ACL_FIELDS: &[&str] = &["criterion", "value"];

/// Fields compared for servers.
const SERVER_FIELDS: &[&str] = &[
    "address",
    "port",
    "check",
    "backup",
    "ssl",
    "verify",
    "weight",
    "maxconn",
    "inter",
    "rise",
    "fall",
    "ssl_certificate",
    "ssl_cafile",
];

/// Fields compared for binds.
const BIND_FIELDS: &[&str] = &[
    "address",
    "port",
    "port_range_end",
    "ssl",
    "ssl_certificate",
    "ssl_cafile",
    "verify",
    "alpn",
    "accept_proxy",
    "transparent",
    "v4v6",
    "v6only",
    "maxconn",
];

/// Condition fields shared by every rule kind.
const CONDITION_FIELDS: &[&str] = &["cond", "cond_test"];

/// Action fields of TCP rules.
const TCP_ACTION_FIELDS: &[&str] = &[
    "expr",
    "timeout",
    "var_scope",
    "var_name",
    "track_key",
    "track_table",
    "lua_action",
    "lua_params",
    "service_name",
    "capture_sample",
    "capture_len",
];

/// Returns the action fields meaningful for an HTTP rule type, or `None` for
/// types this table does not know.
#[must_use]
pub fn http_action_fields(kind: SubResourceKind, rule_type: &str) -> Option<&'static [&'static str]> {
    let fields: &'static [&'static str] = match rule_type {
        "allow" => &[],
        "deny" | "tarpit" => &["deny_status"],
        "redirect" => &["redir_type", "redir_value", "redir_code", "redir_option"],
        "add-header" | "set-header" => &["hdr_name", "hdr_format"],
        "del-header" => &["hdr_name", "hdr_method"],
        "replace-header" | "replace-value" => &["hdr_name", "hdr_match", "hdr_format"],
        "set-var" => &["var_scope", "var_name", "var_expr"],
        "unset-var" => &["var_scope", "var_name"],
        "return" => &[
            "return_status_code",
            "return_content",
            "return_content_type",
            "return_content_format",
        ],
        "set-log-level" => &["log_level"],
        "capture" => &["capture_sample", "capture_len", "capture_id"],
        "lua" => &["lua_action", "lua_params"],
        "track-sc0" | "track-sc1" | "track-sc2" => &["track_sc_key", "track_sc_table"],
        "set-path" if kind == SubResourceKind::HttpRequestRule => &["path_fmt"],
        "replace-path" if kind == SubResourceKind::HttpRequestRule => &["path_match", "path_fmt"],
        "set-uri" if kind == SubResourceKind::HttpRequestRule => &["uri_fmt"],
        "replace-uri" if kind == SubResourceKind::HttpRequestRule => &["uri_match", "uri_fmt"],
        "set-method" if kind == SubResourceKind::HttpRequestRule => &["method_fmt"],
        "auth" if kind == SubResourceKind::HttpRequestRule => &["auth_realm"],
        "use-service" if kind == SubResourceKind::HttpRequestRule => &["service_name"],
        "set-status" if kind == SubResourceKind::HttpResponseRule => &["status", "status_reason"],
        _ => return None,
    };
    Some(fields)
}

/// The content identity of a sub-resource entry.
///
/// Built from an ordered list of `(field, normalised value)` pairs; absent and
/// `null` fields contribute nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentSignature {
    kind: SubResourceKind,
    parts: Vec<(String, String)>,
}

impl ContentSignature {
    /// Computes the signature of an entry's non-identity fields.
    ///
    /// Total and pure: malformed or unexpected input yields a distinct but
    /// valid signature.
    #[must_use]
    pub fn of(kind: SubResourceKind, fields: &Map<String, Value>) -> Self {
        let parts = match kind {
            SubResourceKind::Acl => pick(fields, &[ACL_FIELDS]),
            SubResourceKind::Server => pick(fields, &[SERVER_FIELDS]),
            SubResourceKind::Bind => pick(fields, &[BIND_FIELDS]),
            SubResourceKind::HttpRequestRule | SubResourceKind::HttpResponseRule => {
                let rule_type = fields.get("type").and_then(normalize_value);
                match rule_type.as_deref().and_then(|t| http_action_fields(kind, t)) {
                    Some(action) => pick(fields, &[&["type"][..], action, CONDITION_FIELDS]),
                    None => all_fields(kind, fields),
                }
            }
            SubResourceKind::TcpRequestRule | SubResourceKind::TcpResponseRule => {
                let groups = [&["type", "action"][..], TCP_ACTION_FIELDS, CONDITION_FIELDS];
                if covers(kind, fields, &groups) {
                    pick(fields, &groups)
                } else {
                    all_fields(kind, fields)
                }
            }
        };

        Self { kind, parts }
    }

    /// Kind the signature was computed for.
    #[must_use]
    pub const fn kind(&self) -> SubResourceKind {
        self.kind
    }

    /// The compared `(field, value)` pairs.
    #[must_use]
    pub fn parts(&self) -> &[(String, String)] {
        &self.parts
    }
}

impl std::fmt::Display for ContentSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self
            .parts
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        write!(f, "{}", rendered.join(" "))
    }
}

/// Normalises a field value to its comparable string form.
///
/// `null` maps to `None`; numbers, booleans and strings map to their plain
/// text, so `"301"` and `301` compare equal. Composite values map to compact
/// JSON.
#[must_use]
pub fn normalize_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

fn pick(fields: &Map<String, Value>, groups: &[&[&str]]) -> Vec<(String, String)> {
    groups
        .iter()
        .flat_map(|group| group.iter())
        .filter_map(|key| {
            fields
                .get(*key)
                .and_then(normalize_value)
                .map(|value| ((*key).to_string(), value))
        })
        .collect()
}

/// Whether every non-identity, non-null field belongs to one of `groups`.
fn covers(kind: SubResourceKind, fields: &Map<String, Value>, groups: &[&[&str]]) -> bool {
    let identity = kind.name_key();
    fields.iter().all(|(key, value)| {
        value.is_null()
            || key == "index"
            || Some(key.as_str()) == identity
            || groups.iter().any(|group| group.contains(&key.as_str()))
    })
}

fn all_fields(kind: SubResourceKind, fields: &Map<String, Value>) -> Vec<(String, String)> {
    let identity = kind.name_key();
    let mut parts: Vec<(String, String)> = fields
        .iter()
        .filter(|(key, _)| key.as_str() != "index" && Some(key.as_str()) != identity)
        .filter_map(|(key, value)| normalize_value(value).map(|value| (key.clone(), value)))
        .collect();
    parts.sort();
    parts
}
