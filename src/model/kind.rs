//! Sub-resource kinds managed inside a backend or frontend.

use serde::{Deserialize, Serialize};

use super::parent::ParentType;

/// The closed set of ordered sub-collections a parent proxy section can own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubResourceKind {
    /// Named boolean test (`acl <name> <criterion> <value>`).
    Acl,
    /// `http-request` rule.
    HttpRequestRule,
    /// `http-response` rule.
    HttpResponseRule,
    /// `tcp-request` rule.
    TcpRequestRule,
    /// `tcp-response` rule.
    TcpResponseRule,
    /// Listening address of a frontend.
    Bind,
    /// Upstream server of a backend.
    Server,
}

/// Kinds owned by a backend, in reconciliation order.
const BACKEND_KINDS: &[SubResourceKind] = &[
    SubResourceKind::Acl,
    SubResourceKind::HttpRequestRule,
    SubResourceKind::HttpResponseRule,
    SubResourceKind::TcpRequestRule,
    SubResourceKind::TcpResponseRule,
    SubResourceKind::Server,
];

/// Kinds owned by a frontend, in reconciliation order.
const FRONTEND_KINDS: &[SubResourceKind] = &[
    SubResourceKind::Acl,
    SubResourceKind::HttpRequestRule,
    SubResourceKind::HttpResponseRule,
    SubResourceKind::TcpRequestRule,
    SubResourceKind::Bind,
];

impl SubResourceKind {
    /// Every kind.
    pub const ALL: [Self; 7] = [
        Self::Acl,
        Self::HttpRequestRule,
        Self::HttpResponseRule,
        Self::TcpRequestRule,
        Self::TcpResponseRule,
        Self::Bind,
        Self::Server,
    ];

    /// Returns the kinds a parent of the given type owns, in the order they
    /// are reconciled.
    #[must_use]
    pub const fn kinds_for(parent_type: ParentType) -> &'static [Self] {
        match parent_type {
            ParentType::Backend => BACKEND_KINDS,
            ParentType::Frontend => FRONTEND_KINDS,
        }
    }

    /// Returns true if a parent of the given type may own this kind.
    #[must_use]
    pub fn allowed_in(self, parent_type: ParentType) -> bool {
        Self::kinds_for(parent_type).contains(&self)
    }

    /// Configuration endpoint segment of the Data Plane API.
    #[must_use]
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::Acl => "acls",
            Self::HttpRequestRule => "http_request_rules",
            Self::HttpResponseRule => "http_response_rules",
            Self::TcpRequestRule => "tcp_request_rules",
            Self::TcpResponseRule => "tcp_response_rules",
            Self::Bind => "binds",
            Self::Server => "servers",
        }
    }

    /// Wire key carrying the entry name, if the kind is named.
    #[must_use]
    pub const fn name_key(self) -> Option<&'static str> {
        match self {
            Self::Acl => Some("acl_name"),
            Self::Bind | Self::Server => Some("name"),
            Self::HttpRequestRule
            | Self::HttpResponseRule
            | Self::TcpRequestRule
            | Self::TcpResponseRule => None,
        }
    }

    /// Returns true if entries of this kind carry a name.
    #[must_use]
    pub const fn is_named(self) -> bool {
        self.name_key().is_some()
    }

    /// Returns true if the remote API addresses entries by name rather than
    /// by position.
    #[must_use]
    pub const fn addressed_by_name(self) -> bool {
        matches!(self, Self::Bind | Self::Server)
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Acl => "acl",
            Self::HttpRequestRule => "http-request rule",
            Self::HttpResponseRule => "http-response rule",
            Self::TcpRequestRule => "tcp-request rule",
            Self::TcpResponseRule => "tcp-response rule",
            Self::Bind => "bind",
            Self::Server => "server",
        }
    }
}

impl std::fmt::Display for SubResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}
