//! Desired stack built from a stack file.
//!
//! Blocks are converted to [`SubResourceEntry`] values through their wire
//! form. A block without `index` takes its declaration position; explicit
//! indices are kept verbatim, gaps included.

use serde::Serialize;

use crate::config::{BackendSpec, ConfigHasher, FrontendSpec, StackConfig};
use crate::error::{ConfigError, Result};
use crate::model::{ParentResource, ParentScope, ParentType, SubResourceEntry, SubResourceKind};
use crate::state::{CollectionState, StackState};

/// One declared sub-collection.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredCollection {
    /// Collection kind.
    pub kind: SubResourceKind,
    /// Entries in declaration order.
    pub entries: Vec<SubResourceEntry>,
}

/// A declared parent and its sub-collections.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredParent {
    /// The parent section.
    pub resource: ParentResource,
    /// Every collection the parent type owns, possibly empty.
    pub collections: Vec<DesiredCollection>,
}

impl DesiredParent {
    /// Scope of the parent.
    #[must_use]
    pub fn scope(&self) -> ParentScope {
        self.resource.scope()
    }

    /// Declared entries of a kind; empty if none.
    #[must_use]
    pub fn entries(&self, kind: SubResourceKind) -> &[SubResourceEntry] {
        self.collections
            .iter()
            .find(|c| c.kind == kind)
            .map(|c| c.entries.as_slice())
            .unwrap_or_default()
    }
}

/// The full desired stack.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredStack {
    /// Stack name.
    pub name: String,
    /// Hash of the stack file it came from.
    pub config_hash: String,
    /// Declared parents, backend first.
    pub parents: Vec<DesiredParent>,
}

impl DesiredStack {
    /// Builds the desired stack from a parsed stack file.
    ///
    /// # Errors
    ///
    /// Returns an error if a block cannot be converted to an entry.
    pub fn from_config(config: &StackConfig) -> Result<Self> {
        let mut parents = Vec::new();
        if let Some(backend) = &config.stack.backend {
            parents.push(backend_parent(backend)?);
        }
        if let Some(frontend) = &config.stack.frontend {
            parents.push(frontend_parent(frontend)?);
        }

        Ok(Self {
            name: config.stack.name.clone(),
            config_hash: ConfigHasher::new().hash_config(config),
            parents,
        })
    }

    /// Gets a declared parent.
    #[must_use]
    pub fn parent(&self, parent_type: ParentType, name: &str) -> Option<&DesiredParent> {
        self.parents.iter().find(|p| {
            p.resource.parent_type() == parent_type && p.resource.name() == name
        })
    }

    /// Scopes of every declared parent.
    #[must_use]
    pub fn scopes(&self) -> Vec<ParentScope> {
        self.parents.iter().map(DesiredParent::scope).collect()
    }

    /// Number of declared entries across all collections.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.parents
            .iter()
            .flat_map(|p| &p.collections)
            .map(|c| c.entries.len())
            .sum()
    }

    /// The state recorded once this stack has been applied.
    #[must_use]
    pub fn to_state(&self) -> StackState {
        let mut state = StackState::new(&self.name);
        state.config_hash.clone_from(&self.config_hash);
        state.parents = self.parents.iter().map(|p| p.resource.clone()).collect();
        state.collections = self
            .parents
            .iter()
            .flat_map(|parent| {
                let scope = parent.scope();
                parent
                    .collections
                    .iter()
                    .filter(|c| !c.entries.is_empty())
                    .map(move |c| CollectionState {
                        scope: scope.clone(),
                        kind: c.kind,
                        entries: c.entries.clone(),
                    })
            })
            .collect();
        state
    }
}

fn backend_parent(spec: &BackendSpec) -> Result<DesiredParent> {
    let collections = vec![
        collection(SubResourceKind::Acl, &spec.acls)?,
        collection(SubResourceKind::HttpRequestRule, &spec.http_request_rules)?,
        collection(SubResourceKind::HttpResponseRule, &spec.http_response_rules)?,
        collection(SubResourceKind::TcpRequestRule, &spec.tcp_request_rules)?,
        collection(SubResourceKind::TcpResponseRule, &spec.tcp_response_rules)?,
        collection(SubResourceKind::Server, &spec.servers)?,
    ];
    Ok(DesiredParent {
        resource: spec.resource(),
        collections,
    })
}

fn frontend_parent(spec: &FrontendSpec) -> Result<DesiredParent> {
    let collections = vec![
        collection(SubResourceKind::Acl, &spec.acls)?,
        collection(SubResourceKind::HttpRequestRule, &spec.http_request_rules)?,
        collection(SubResourceKind::HttpResponseRule, &spec.http_response_rules)?,
        collection(SubResourceKind::TcpRequestRule, &spec.tcp_request_rules)?,
        collection(SubResourceKind::Bind, &spec.binds)?,
    ];
    Ok(DesiredParent {
        resource: spec.resource(),
        collections,
    })
}

fn collection<T: Serialize>(kind: SubResourceKind, blocks: &[T]) -> Result<DesiredCollection> {
    let entries = (0_i64..)
        .zip(blocks)
        .map(|(position, block)| -> Result<SubResourceEntry> {
            let value = serde_json::to_value(block).map_err(|e| ConfigError::InvalidShape {
                expected: "stack block",
                message: format!("{kind} #{position}: {e}"),
            })?;
            let entry = SubResourceEntry::from_object(kind, value, position).map_err(|message| {
                ConfigError::InvalidShape {
                    expected: "stack block",
                    message,
                }
            })?;
            Ok(entry)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(DesiredCollection { kind, entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::model::Toggle;

    const STACK: &str = r"
dataplane:
  url: http://127.0.0.1:5555
stack:
  name: web
  backend:
    name: web_be
    acls:
      - name: is_api
        criterion: path_beg
        value: /api
      - name: is_static
        criterion: path_beg
        value: /static
        index: 7
    http_request_rules:
      - type: set-header
        hdr_name: X-Forwarded-Proto
        hdr_format: https
    servers:
      - name: app1
        address: 10.0.0.1
        port: 8080
        check: true
  frontend:
    name: web_fe
    default_backend: web_be
    binds:
      - name: http
        address: 0.0.0.0
        port: 80
";

    fn desired() -> DesiredStack {
        let config = ConfigParser::new().parse_yaml(STACK, None).unwrap();
        DesiredStack::from_config(&config).unwrap()
    }

    #[test]
    fn test_parents_backend_first() {
        let stack = desired();
        assert_eq!(stack.name, "web");
        assert_eq!(stack.config_hash.len(), 64);
        assert_eq!(
            stack.scopes(),
            vec![ParentScope::backend("web_be"), ParentScope::frontend("web_fe")]
        );
        assert!(stack.parent(ParentType::Frontend, "web_fe").is_some());
        assert!(stack.parent(ParentType::Backend, "web_fe").is_none());
    }

    #[test]
    fn test_index_assignment() {
        let stack = desired();
        let acls = stack.parents[0].entries(SubResourceKind::Acl);

        assert_eq!(acls[0].name.as_deref(), Some("is_api"));
        assert_eq!(acls[0].index, 0);
        assert_eq!(acls[1].index, 7);
        assert!(!acls[0].fields.contains_key("acl_name"));
        assert!(!acls[0].fields.contains_key("index"));
    }

    #[test]
    fn test_omitted_index_is_declaration_position() {
        let yaml = r"
dataplane:
  url: http://127.0.0.1:5555
stack:
  name: web
  backend:
    name: web_be
    acls:
      - name: first
        criterion: path_beg
        value: /a
        index: 5
      - name: second
        criterion: path_beg
        value: /b
      - name: third
        criterion: path_beg
        value: /c
";
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        let stack = DesiredStack::from_config(&config).unwrap();
        let indices: Vec<i64> = stack.parents[0]
            .entries(SubResourceKind::Acl)
            .iter()
            .map(|acl| acl.index)
            .collect();
        assert_eq!(indices, vec![5, 1, 2]);
    }

    #[test]
    fn test_wire_fields() {
        let stack = desired();
        let backend = &stack.parents[0];

        let rule = &backend.entries(SubResourceKind::HttpRequestRule)[0];
        assert_eq!(rule.field_str("type"), Some("set-header"));
        assert_eq!(rule.field_str("hdr_name"), Some("X-Forwarded-Proto"));

        let server = &backend.entries(SubResourceKind::Server)[0];
        assert_eq!(server.name.as_deref(), Some("app1"));
        assert_eq!(server.field_str("check"), Some(Toggle::Enabled.as_str().unwrap()));
        assert_eq!(server.fields["port"], 8080);
        assert!(!server.fields.contains_key("backup"));

        assert!(backend.entries(SubResourceKind::TcpResponseRule).is_empty());
        assert_eq!(stack.entry_count(), 5);
    }

    #[test]
    fn test_to_state_skips_empty_collections() {
        let state = desired().to_state();
        assert_eq!(state.parents.len(), 2);
        assert_eq!(state.collections.len(), 4);
        assert_eq!(
            state
                .collection(&ParentScope::backend("web_be"), SubResourceKind::Acl)
                .unwrap()
                .len(),
            2
        );
        assert_eq!(state.entry_count(), 5);
    }
}
