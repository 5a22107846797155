// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(missing_docs)]                // All public items must be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # lbstack
//!
//! Declarative, transactional reconciliation of HAProxy stacks through the
//! Data Plane API.
//!
//! ## Overview
//!
//! A stack is one backend and/or one frontend together with their ordered
//! sub-collections: ACLs, HTTP and TCP rules, servers and binds. lbstack
//! compares the declared stack with what HAProxy reports and applies the
//! smallest ordered set of index-addressed operations that converges it,
//! all inside one Data Plane API transaction.
//!
//! ## Architecture
//!
//! 1. **Desired state**: declared in `lbstack.yaml`
//! 2. **Observed state**: listed from the Data Plane API
//! 3. **Reconciler**: pairs entries by name or content signature and plans
//!    updates, deletes and creates
//! 4. **Coordinator**: runs every planned batch in a single transaction,
//!    rolling back on the first failure
//!
//! ## Modules
//!
//! - [`model`]: Parents, sub-resource entries and content signatures
//! - [`planner`]: Collection reconciliation and order reconstruction
//! - [`dataplane`]: Adapter traits and the HTTP client
//! - [`transaction`]: Transactional execution of batches
//! - [`stack`]: Stack lifecycle orchestration
//! - [`config`]: Stack file parsing, validation and hashing
//! - [`state`]: Caller-side state and locking
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! dataplane:
//!   url: http://127.0.0.1:5555
//!   password_env: DATAPLANE_PASSWORD
//!
//! stack:
//!   name: web
//!   backend:
//!     name: web_be
//!     servers:
//!       - name: app1
//!         address: 10.0.0.11
//!         port: 8080
//!   frontend:
//!     name: web_fe
//!     default_backend: web_be
//!     binds:
//!       - name: http
//!         port: 80
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod dataplane;
pub mod error;
pub mod model;
pub mod planner;
pub mod stack;
pub mod state;
pub mod transaction;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, StackConfig};
pub use dataplane::{CollectionAdapter, DataplaneApi, DataplaneClient, ParentAdapter, TransactionApi};
pub use error::{LbStackError, Result};
pub use model::{ContentSignature, ParentResource, ParentScope, SubResourceEntry, SubResourceKind};
pub use planner::{CollectionReconciler, OperationPlan, OrderStrategy, PositionPolicy};
pub use stack::{DesiredStack, DriftReport, StackOrchestrator, StackOutcome, StackPlan};
pub use state::{LocalStateStore, StackState, StateStore};
pub use transaction::TransactionCoordinator;
