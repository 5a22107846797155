//! Stack file handling.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `lbstack.yaml`
//! - Environment overrides and password resolution
//! - Validation of the declared stack
//! - Computing stack hashes for change detection

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::ConfigHasher;
pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILES, ENV_DATAPLANE_PASSWORD, ENV_DATAPLANE_URL,
    ENV_DATAPLANE_USERNAME, find_config_file, resolve_password,
};
pub use spec::{
    AclBlock, BackendSpec, BindBlock, DataplaneConfig, FrontendSpec, HttpRuleBlock,
    ReconcileConfig, ServerBlock, StackConfig, StackSpec, StateConfig, TcpRuleBlock,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
