//! Typed model of the load-balancer objects lbstack manages.
//!
//! Parents (backends and frontends) own ordered sub-collections of ACLs,
//! rules, servers and binds. Entries of every kind share one representation,
//! [`SubResourceEntry`], compared by [`ContentSignature`].

mod entry;
mod kind;
mod parent;
mod signature;
mod toggle;

pub use entry::SubResourceEntry;
pub use kind::SubResourceKind;
pub use parent::{
    Backend, Balance, Forwardfor, Frontend, ParentResource, ParentScope, ParentType, ProxyMode,
};
pub use signature::{ContentSignature, http_action_fields, normalize_value};
pub use toggle::Toggle;
