//! Data Plane API wire types.

use serde::{Deserialize, Serialize};

/// An open remote configuration transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHandle {
    /// Transaction identifier assigned by the Data Plane API.
    pub id: String,
    /// Configuration version the transaction was opened against.
    pub version: u64,
}

impl std::fmt::Display for TransactionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (version {})", self.id, self.version)
    }
}

/// Response envelope of configuration reads.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    /// Configuration version the data was read at.
    #[serde(rename = "_version", default)]
    pub version: Option<u64>,
    /// Payload.
    pub data: T,
}

/// Response of `POST /transactions`.
#[derive(Debug, Deserialize)]
pub(crate) struct TransactionResponse {
    /// Transaction identifier.
    pub id: String,
    /// Configuration version.
    #[serde(rename = "_version", default)]
    pub version: Option<u64>,
    /// Transaction status (`in_progress`, `success`, `failed`).
    #[serde(default)]
    pub status: Option<String>,
}

/// Error body returned by the Data Plane API.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    /// Error code.
    #[serde(default)]
    pub code: Option<i64>,
    /// Error message.
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiErrorBody {
    /// Extracts the most useful message from a raw error body.
    pub(crate) fn message_from(body: &str) -> String {
        match serde_json::from_str::<Self>(body) {
            Ok(Self {
                message: Some(message),
                code,
            }) => code.map_or_else(|| message.clone(), |code| format!("{message} (code {code})")),
            _ if body.trim().is_empty() => String::from("no response body"),
            _ => body.trim().to_string(),
        }
    }
}
