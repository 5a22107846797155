//! Parent proxy sections (backends and frontends) and their scopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::signature::normalize_value;
use super::toggle::Toggle;

/// The type of a parent proxy section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentType {
    /// A `backend` section.
    Backend,
    /// A `frontend` section.
    Frontend,
}

impl ParentType {
    /// Returns the wire value used in `parent_type` query parameters.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::Frontend => "frontend",
        }
    }

    /// Configuration endpoint segment for this parent type.
    #[must_use]
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::Backend => "backends",
            Self::Frontend => "frontends",
        }
    }
}

impl std::fmt::Display for ParentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identifies the parent that owns a sub-collection.
///
/// Reconciliation never crosses scopes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParentScope {
    /// Parent type.
    pub parent_type: ParentType,
    /// Parent name.
    pub parent_name: String,
}

impl ParentScope {
    /// Creates a new scope.
    #[must_use]
    pub fn new(parent_type: ParentType, parent_name: impl Into<String>) -> Self {
        Self {
            parent_type,
            parent_name: parent_name.into(),
        }
    }

    /// Scope of a backend.
    #[must_use]
    pub fn backend(name: impl Into<String>) -> Self {
        Self::new(ParentType::Backend, name)
    }

    /// Scope of a frontend.
    #[must_use]
    pub fn frontend(name: impl Into<String>) -> Self {
        Self::new(ParentType::Frontend, name)
    }
}

impl std::fmt::Display for ParentScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} '{}'", self.parent_type, self.parent_name)
    }
}

/// Proxy mode of a backend or frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    /// Layer 7.
    Http,
    /// Layer 4.
    Tcp,
}

/// Load-balancing algorithm wrapper, as the Data Plane API nests it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Algorithm name (`roundrobin`, `leastconn`, `source`, ...).
    pub algorithm: String,
}

/// `option forwardfor` wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Forwardfor {
    /// Whether the header is added.
    #[serde(default, skip_serializing_if = "Toggle::is_unset")]
    pub enabled: Toggle,
}

/// A backend section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backend {
    /// Backend name.
    pub name: String,
    /// Proxy mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ProxyMode>,
    /// Balancing algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<Balance>,
    /// Health-check flavour (`httpchk`, `tcp-check`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adv_check: Option<String>,
    /// HTTP connection mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_connection_mode: Option<String>,
    /// `option forwardfor`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forwardfor: Option<Forwardfor>,
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
}

impl Backend {
    /// Creates a backend with only a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: None,
            balance: None,
            adv_check: None,
            http_connection_mode: None,
            forwardfor: None,
            connect_timeout: None,
            server_timeout: None,
            check_timeout: None,
            retries: None,
        }
    }
}

/// A frontend section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frontend {
    /// Frontend name.
    pub name: String,
    /// Proxy mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ProxyMode>,
    /// Backend used when no `use_backend` rule matches.
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
}

impl Frontend {
    /// Creates a frontend with only a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: None,
            default_backend: None,
            maxconn: None,
            client_timeout: None,
            http_connection_mode: None,
        }
    }
}

/// A backend or frontend, as desired or as observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "parent_type", rename_all = "snake_case")]
pub enum ParentResource {
    /// A backend.
    Backend(Backend),
    /// A frontend.
    Frontend(Frontend),
}

impl ParentResource {
    /// Parent name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Backend(backend) => &backend.name,
            Self::Frontend(frontend) => &frontend.name,
        }
    }

    /// Parent type.
    #[must_use]
    pub const fn parent_type(&self) -> ParentType {
        match self {
            Self::Backend(_) => ParentType::Backend,
            Self::Frontend(_) => ParentType::Frontend,
        }
    }

    /// Scope addressing this parent's sub-collections.
    #[must_use]
    pub fn scope(&self) -> ParentScope {
        ParentScope::new(self.parent_type(), self.name())
    }

    /// Request body for the Data Plane API.
    #[must_use]
    pub fn payload(&self) -> Value {
        let value = match self {
            Self::Backend(backend) => serde_json::to_value(backend),
            Self::Frontend(frontend) => serde_json::to_value(frontend),
        };
        value.unwrap_or(Value::Null)
    }

    /// Lists the fields set on `self` whose values differ on `observed`.
    ///
    /// Fields left unset here are not managed and never reported.
    #[must_use]
    pub fn changed_fields(&self, observed: &Self) -> Vec<String> {
        if self.parent_type() != observed.parent_type() {
            return vec![String::from("parent_type")];
        }

        let desired = self.payload();
        let current = observed.payload();
        let Some(desired) = desired.as_object() else {
            return Vec::new();
        };

        desired
            .iter()
            .filter(|(_, value)| !value.is_null())
            .filter(|(key, value)| {
                current.get(key.as_str()).and_then(normalize_value) != normalize_value(value)
            })
            .map(|(key, _)| key.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_display() {
        assert_eq!(ParentScope::backend("web_be").to_string(), "backend 'web_be'");
        assert_eq!(ParentScope::frontend("web_fe").to_string(), "frontend 'web_fe'");
    }

    #[test]
    fn test_changed_fields_ignores_unmanaged() {
        let mut desired = Backend::named("web_be");
        desired.mode = Some(ProxyMode::Http);
        desired.balance = Some(Balance {
            algorithm: String::from("roundrobin"),
        });

        let mut observed = desired.clone();
        observed.retries = Some(3);

        let desired = ParentResource::Backend(desired);
        assert!(desired.changed_fields(&ParentResource::Backend(observed.clone())).is_empty());

        observed.balance = Some(Balance {
            algorithm: String::from("leastconn"),
        });
        assert_eq!(
            desired.changed_fields(&ParentResource::Backend(observed)),
            vec![String::from("balance")]
        );
    }

    #[test]
    fn test_state_serialization_is_tagged() {
        let parent = ParentResource::Frontend(Frontend::named("web_fe"));
        let json = serde_json::to_value(&parent).unwrap();
        assert_eq!(json["parent_type"], "frontend");
        assert_eq!(json["name"], "web_fe");

        let back: ParentResource = serde_json::from_value(json).unwrap();
        assert_eq!(back, parent);
    }
}
