//! HAProxy Data Plane API integration.
//!
//! This module defines the adapter traits the reconciliation core depends on
//! and their HTTP implementation.

mod adapter;
mod client;
mod types;

#[cfg(test)]
pub(crate) mod memory;

pub use adapter::{CollectionAdapter, DataplaneApi, ParentAdapter, TransactionApi};
pub use client::DataplaneClient;
pub use types::TransactionHandle;
