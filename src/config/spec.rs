//! Stack file types.
//!
//! This module defines the structs that map to the `lbstack.yaml` file. Every
//! sub-resource collection is an ordered list of blocks; a block may pin its
//! position with `index`, otherwise it takes its declaration position.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{Backend, Balance, Forwardfor, Frontend, ParentResource, ProxyMode, Toggle};
use crate::planner::{OrderStrategy, PositionPolicy};

/// The root structure of a stack file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StackConfig {
    /// Data Plane API connection.
    pub dataplane: DataplaneConfig,
    /// The stack to reconcile.
    pub stack: StackSpec,
    /// Caller-side state location.
    #[serde(default)]
    pub state: StateConfig,
    /// Reconciliation tuning.
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// Data Plane API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DataplaneConfig {
    /// Base URL, e.g. `http://127.0.0.1:5555`.
    pub url: String,
    /// Basic auth user.
    #[serde(default = "default_username")]
    pub username: String,
    /// Inline password. Prefer `password_env`.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Environment variable holding the password.
    #[serde(default = "default_password_env")]
    pub password_env: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Where the caller keeps its state file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StateConfig {
    /// State directory. Defaults to `.lbstack` next to the stack file.
    #[serde(default)]
    pub path: Option<String>,
}

/// Reconciliation options.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReconcileConfig {
    /// How observed entries are ordered when read back.
    #[serde(default)]
    pub order_strategy: OrderStrategy,
    /// How index differences with unchanged content are treated.
    #[serde(default)]
    pub position_policy: PositionPolicy,
}

/// One backend and/or one frontend managed as a unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StackSpec {
    /// Stack name, used for state and lock files.
    pub name: String,
    /// Backend section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendSpec>,
    /// Frontend section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend: Option<FrontendSpec>,
}

/// A backend and its sub-collections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BackendSpec {
    /// Backend name.
    pub name: String,
    /// Proxy mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ProxyMode>,
    /// Balancing algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<String>,
    /// Health-check flavour.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adv_check: Option<String>,
    /// HTTP connection mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_connection_mode: Option<String>,
    /// `option forwardfor`.
    #[serde(default, skip_serializing_if = "Toggle::is_unset")]
    pub forwardfor: Toggle,
    /// Connect timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<i64>,
    /// Server timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_timeout: Option<i64>,
    /// Check timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_timeout: Option<i64>,
    /// Connection retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<i64>,
    /// ACLs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acls: Vec<AclBlock>,
    /// `http-request` rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http_request_rules: Vec<HttpRuleBlock>,
    /// `http-response` rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http_response_rules: Vec<HttpRuleBlock>,
    /// `tcp-request` rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tcp_request_rules: Vec<TcpRuleBlock>,
    /// `tcp-response` rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tcp_response_rules: Vec<TcpRuleBlock>,
    /// Servers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<ServerBlock>,
}

impl BackendSpec {
    /// The backend section itself, without sub-collections.
    #[must_use]
    pub fn resource(&self) -> ParentResource {
        ParentResource::Backend(Backend {
            name: self.name.clone(),
            mode: self.mode,
            balance: self.balance.clone().map(|algorithm| Balance { algorithm }),
            adv_check: self.adv_check.clone(),
            http_connection_mode: self.http_connection_mode.clone(),
            forwardfor: (!self.forwardfor.is_unset()).then_some(Forwardfor {
                enabled: self.forwardfor,
            }),
            connect_timeout: self.connect_timeout,
            server_timeout: self.server_timeout,
            check_timeout: self.check_timeout,
            retries: self.retries,
        })
    }
}

/// A frontend and its sub-collections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FrontendSpec {
    /// Frontend name.
    pub name: String,
    /// Proxy mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ProxyMode>,
    /// Default backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_backend: Option<String>,
    /// Maximum concurrent connections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxconn: Option<i64>,
    /// Client timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_timeout: Option<i64>,
    /// HTTP connection mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_connection_mode: Option<String>,
    /// ACLs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acls: Vec<AclBlock>,
    /// `http-request` rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http_request_rules: Vec<HttpRuleBlock>,
    /// `http-response` rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http_response_rules: Vec<HttpRuleBlock>,
    /// `tcp-request` rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tcp_request_rules: Vec<TcpRuleBlock>,
    /// Binds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binds: Vec<BindBlock>,
}

impl FrontendSpec {
    /// The frontend section itself, without sub-collections.
    #[must_use]
    pub fn resource(&self) -> ParentResource {
        ParentResource::Frontend(Frontend {
            name: self.name.clone(),
            mode: self.mode,
            default_backend: self.default_backend.clone(),
            maxconn: self.maxconn,
            client_timeout: self.client_timeout,
            http_connection_mode: self.http_connection_mode.clone(),
        })
    }
}

/// An ACL line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AclBlock {
    /// ACL name.
    #[serde(rename = "acl_name", alias = "name")]
    pub name: String,
    /// Fetch criterion (`path_beg`, `hdr(host)`, ...).
    pub criterion: String,
    /// Match value.
    #[serde(default)]
    pub value: String,
    /// Explicit position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,
}

/// An `http-request` or `http-response` rule.
///
/// Action parameters (`hdr_name`, `redir_value`, `deny_status`, ...) are
/// passed through in wire form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpRuleBlock {
    /// Rule type (`set-header`, `redirect`, `deny`, ...).
    #[serde(rename = "type")]
    pub rule_type: String,
    /// `if` or `unless`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cond: Option<String>,
    /// Condition expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cond_test: Option<String>,
    /// Explicit position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,
    /// Action parameters.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

/// A `tcp-request` or `tcp-response` rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TcpRuleBlock {
    /// Rule type (`connection`, `content`, `inspect-delay`, ...).
    #[serde(rename = "type")]
    pub rule_type: String,
    /// Action (`accept`, `reject`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// `if` or `unless`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cond: Option<String>,
    /// Condition expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cond_test: Option<String>,
    /// Explicit position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,
    /// Action parameters.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

/// A backend server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerBlock {
    /// Server name.
    pub name: String,
    /// Address or hostname.
    pub address: String,
    /// Port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Health checks.
    #[serde(default, skip_serializing_if = "Toggle::is_unset")]
    pub check: Toggle,
    /// Backup server.
    #[serde(default, skip_serializing_if = "Toggle::is_unset")]
    pub backup: Toggle,
    /// TLS towards the server.
    #[serde(default, skip_serializing_if = "Toggle::is_unset")]
    pub ssl: Toggle,
    /// Certificate verification (`none` or `required`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<String>,
    /// Weight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
    /// Maximum concurrent connections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxconn: Option<i64>,
    /// Check interval in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inter: Option<i64>,
    /// Checks needed to mark the server up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rise: Option<i64>,
    /// Checks needed to mark the server down.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fall: Option<i64>,
    /// Client certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_certificate: Option<String>,
    /// CA file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_cafile: Option<String>,
    /// Explicit position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,
}

/// A frontend bind line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BindBlock {
    /// Bind name.
    pub name: String,
    /// Listen address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Listen port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Last port of a range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_range_end: Option<u16>,
    /// TLS termination.
    #[serde(default, skip_serializing_if = "Toggle::is_unset")]
    pub ssl: Toggle,
    /// Certificate path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_certificate: Option<String>,
    /// CA file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_cafile: Option<String>,
    /// Client certificate verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<String>,
    /// ALPN protocols.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpn: Option<String>,
    /// PROXY protocol.
    #[serde(default, skip_serializing_if = "Toggle::is_unset")]
    pub accept_proxy: Toggle,
    /// Transparent bind.
    #[serde(default, skip_serializing_if = "Toggle::is_unset")]
    pub transparent: Toggle,
    /// Dual-stack bind.
    #[serde(default, skip_serializing_if = "Toggle::is_unset")]
    pub v4v6: Toggle,
    /// IPv6 only.
    #[serde(default, skip_serializing_if = "Toggle::is_unset")]
    pub v6only: Toggle,
    /// Maximum concurrent connections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxconn: Option<i64>,
    /// Explicit position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,
}

fn default_username() -> String {
    String::from("admin")
}

fn default_password_env() -> String {
    String::from("DATAPLANE_PASSWORD")
}

const fn default_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_resource_drops_collections() {
        let spec = BackendSpec {
            name: String::from("web_be"),
            mode: Some(ProxyMode::Http),
            balance: Some(String::from("roundrobin")),
            adv_check: None,
            http_connection_mode: None,
            forwardfor: Toggle::Enabled,
            connect_timeout: Some(5000),
            server_timeout: None,
            check_timeout: None,
            retries: None,
            acls: Vec::new(),
            http_request_rules: Vec::new(),
            http_response_rules: Vec::new(),
            tcp_request_rules: Vec::new(),
            tcp_response_rules: Vec::new(),
            servers: Vec::new(),
        };

        let ParentResource::Backend(backend) = spec.resource() else {
            panic!("expected a backend");
        };
        assert_eq!(backend.name, "web_be");
        assert_eq!(backend.balance.unwrap().algorithm, "roundrobin");
        assert_eq!(backend.forwardfor.unwrap().enabled, Toggle::Enabled);
        assert_eq!(backend.connect_timeout, Some(5000));
    }

    #[test]
    fn test_http_rule_keeps_action_params() {
        let yaml = r"
type: set-header
hdr_name: X-Forwarded-Proto
hdr_format: https
cond: if
cond_test: is_tls
";
        let rule: HttpRuleBlock = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule.rule_type, "set-header");
        assert_eq!(rule.cond.as_deref(), Some("if"));
        assert_eq!(rule.index, None);
        assert_eq!(rule.params.len(), 2);
        assert_eq!(rule.params["hdr_name"], "X-Forwarded-Proto");
    }

    #[test]
    fn test_acl_accepts_name_alias() {
        let acl: AclBlock =
            serde_yaml::from_str("name: is_api\ncriterion: path_beg\nvalue: /api\n").unwrap();
        assert_eq!(acl.name, "is_api");

        let wire = serde_json::to_value(&acl).unwrap();
        assert_eq!(wire["acl_name"], "is_api");
        assert!(wire.get("index").is_none());
    }

    #[test]
    fn test_server_rejects_unknown_field() {
        let result: Result<ServerBlock, _> =
            serde_yaml::from_str("name: s1\naddress: 10.0.0.1\nchek: enabled\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_password_never_serialized() {
        let config = DataplaneConfig {
            url: String::from("http://127.0.0.1:5555"),
            username: default_username(),
            password: Some(String::from("secret")),
            password_env: default_password_env(),
            timeout_secs: default_timeout_secs(),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
