//! HAProxy Data Plane API client.
//!
//! This module provides the HTTP client for the Data Plane API v2
//! configuration and transaction endpoints.

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{DataplaneError, LbStackError, Result};
use crate::model::{
    Backend, Frontend, ParentResource, ParentScope, ParentType, SubResourceEntry, SubResourceKind,
};

use super::adapter::{CollectionAdapter, ParentAdapter, TransactionApi};
use super::types::{ApiErrorBody, Envelope, TransactionHandle, TransactionResponse};

/// Path prefix of the HAProxy service.
const API_PREFIX: &str = "/v2/services/haproxy";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of attempts for idempotent reads.
const MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 500;

/// Data Plane API client.
#[derive(Debug, Clone)]
pub struct DataplaneClient {
    /// HTTP client.
    client: Client,
    /// Base URL, without the API prefix.
    base_url: String,
    /// Basic auth user.
    username: String,
    /// Basic auth password.
    password: String,
    /// Base delay between read retries.
    retry_delay: Duration,
}

impl DataplaneClient {
    /// Creates a new client with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: &str, username: &str, password: &str) -> Result<Self> {
        Self::with_timeout(base_url, username, password, DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a client with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_timeout(
        base_url: &str,
        username: &str,
        password: &str,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DataplaneError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        })
    }

    /// Sets the base delay between read retries.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches the current configuration version.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn configuration_version(&self) -> Result<u64> {
        self.get_json("/configuration/version", &[]).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{API_PREFIX}{path}", self.base_url)
    }

    /// Performs a GET, retrying transient failures.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                debug!("Retry attempt {attempt} of {MAX_RETRIES} for GET {path}");
                tokio::time::sleep(self.retry_delay * attempt).await;
            }

            match self.get_once::<T>(path, query).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if e.is_retryable() {
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            LbStackError::Dataplane(DataplaneError::NetworkError {
                message: String::from("Max retries exceeded"),
            })
        }))
    }

    async fn get_once<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let response = self.send(Method::GET, path, query, None).await?;
        response.json::<T>().await.map_err(|e| {
            LbStackError::Dataplane(DataplaneError::InvalidResponse {
                message: format!("Failed to parse response of GET {path}: {e}"),
            })
        })
    }

    /// Sends one request and maps error statuses. Never retried.
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Response> {
        trace!("{method} {path} {query:?}");

        let mut request = self
            .client
            .request(method.clone(), self.url(path))
            .basic_auth(&self.username, Some(&self.password))
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            LbStackError::Dataplane(DataplaneError::NetworkError {
                message: format!("{method} {path} failed: {e}"),
            })
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = ApiErrorBody::message_from(&body);
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                DataplaneError::AuthenticationFailed { message }
            }
            StatusCode::NOT_FOUND => DataplaneError::NotFound {
                resource: format!("{path}: {message}"),
            },
            StatusCode::CONFLICT => DataplaneError::Conflict { message },
            _ => DataplaneError::api_error(status.as_u16(), message),
        }
        .into())
    }

    async fn mutate(
        &self,
        method: Method,
        path: &str,
        mut query: Vec<(&str, String)>,
        body: Option<&Value>,
        txn: &TransactionHandle,
    ) -> Result<()> {
        query.push(("transaction_id", txn.id.clone()));
        self.send(method, path, &query, body).await?;
        Ok(())
    }
}

/// Query parameters selecting a collection's parent.
fn scope_query(kind: SubResourceKind, scope: &ParentScope) -> Vec<(&'static str, String)> {
    match kind {
        SubResourceKind::Server => vec![("backend", scope.parent_name.clone())],
        SubResourceKind::Bind => vec![("frontend", scope.parent_name.clone())],
        _ => vec![
            ("parent_type", scope.parent_type.as_str().to_string()),
            ("parent_name", scope.parent_name.clone()),
        ],
    }
}

/// Path of a single entry, by name or by index depending on the kind.
fn entry_path(kind: SubResourceKind, index: i64, name: Option<&str>) -> Result<String> {
    if kind.addressed_by_name() {
        let name = name.ok_or_else(|| {
            LbStackError::internal(format!("{kind} at index {index} has no name to address it by"))
        })?;
        Ok(format!("/configuration/{}/{name}", kind.endpoint()))
    } else {
        Ok(format!("/configuration/{}/{index}", kind.endpoint()))
    }
}

fn parent_path(parent_type: ParentType, name: &str) -> String {
    format!("/configuration/{}/{name}", parent_type.endpoint())
}

#[async_trait]
impl TransactionApi for DataplaneClient {
    async fn begin(&self) -> Result<TransactionHandle> {
        let version = self.configuration_version().await?;
        let response = self
            .send(
                Method::POST,
                "/transactions",
                &[("version", version.to_string())],
                None,
            )
            .await?;
        let created: TransactionResponse = response.json().await.map_err(|e| {
            LbStackError::Dataplane(DataplaneError::InvalidResponse {
                message: format!("Failed to parse transaction: {e}"),
            })
        })?;

        debug!(
            "Opened transaction {} at version {version} (status: {})",
            created.id,
            created.status.as_deref().unwrap_or("unknown")
        );
        Ok(TransactionHandle {
            id: created.id,
            version: created.version.unwrap_or(version),
        })
    }

    async fn commit(&self, txn: &TransactionHandle) -> Result<()> {
        self.send(Method::PUT, &format!("/transactions/{}", txn.id), &[], None)
            .await?;
        Ok(())
    }

    async fn rollback(&self, txn: &TransactionHandle) -> Result<()> {
        self.send(Method::DELETE, &format!("/transactions/{}", txn.id), &[], None)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ParentAdapter for DataplaneClient {
    async fn get_parent(
        &self,
        parent_type: ParentType,
        name: &str,
    ) -> Result<Option<ParentResource>> {
        let path = parent_path(parent_type, name);
        let result = match parent_type {
            ParentType::Backend => self
                .get_json::<Envelope<Backend>>(&path, &[])
                .await
                .map(|e| ParentResource::Backend(e.data)),
            ParentType::Frontend => self
                .get_json::<Envelope<Frontend>>(&path, &[])
                .await
                .map(|e| ParentResource::Frontend(e.data)),
        };

        match result {
            Ok(parent) => Ok(Some(parent)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_parent(&self, parent: &ParentResource, txn: &TransactionHandle) -> Result<()> {
        let path = format!("/configuration/{}", parent.parent_type().endpoint());
        self.mutate(Method::POST, &path, Vec::new(), Some(&parent.payload()), txn)
            .await
    }

    async fn update_parent(&self, parent: &ParentResource, txn: &TransactionHandle) -> Result<()> {
        let path = parent_path(parent.parent_type(), parent.name());
        self.mutate(Method::PUT, &path, Vec::new(), Some(&parent.payload()), txn)
            .await
    }

    async fn delete_parent(
        &self,
        parent_type: ParentType,
        name: &str,
        txn: &TransactionHandle,
    ) -> Result<()> {
        self.mutate(
            Method::DELETE,
            &parent_path(parent_type, name),
            Vec::new(),
            None,
            txn,
        )
        .await
    }
}

#[async_trait]
impl CollectionAdapter for DataplaneClient {
    async fn list(
        &self,
        kind: SubResourceKind,
        scope: &ParentScope,
    ) -> Result<Vec<SubResourceEntry>> {
        let path = format!("/configuration/{}", kind.endpoint());
        let envelope: Envelope<Vec<Value>> = self.get_json(&path, &scope_query(kind, scope)).await?;
        debug!(
            "Read {} {kind} entries of {scope} at version {}",
            envelope.data.len(),
            envelope.version.unwrap_or_default()
        );

        (0_i64..)
            .zip(envelope.data)
            .map(|(position, value)| {
                SubResourceEntry::from_object(kind, value, position).map_err(|message| {
                    LbStackError::Dataplane(DataplaneError::InvalidResponse { message })
                })
            })
            .collect()
    }

    async fn create(
        &self,
        kind: SubResourceKind,
        scope: &ParentScope,
        index: i64,
        entry: &SubResourceEntry,
        txn: &TransactionHandle,
    ) -> Result<()> {
        let path = format!("/configuration/{}", kind.endpoint());
        self.mutate(
            Method::POST,
            &path,
            scope_query(kind, scope),
            Some(&entry.payload(index)),
            txn,
        )
        .await
    }

    async fn update_at(
        &self,
        kind: SubResourceKind,
        index: i64,
        current_name: Option<&str>,
        scope: &ParentScope,
        entry: &SubResourceEntry,
        txn: &TransactionHandle,
    ) -> Result<()> {
        let path = entry_path(kind, index, current_name)?;
        self.mutate(
            Method::PUT,
            &path,
            scope_query(kind, scope),
            Some(&entry.payload(index)),
            txn,
        )
        .await
    }

    async fn delete_at(
        &self,
        kind: SubResourceKind,
        index: i64,
        name: Option<&str>,
        scope: &ParentScope,
        txn: &TransactionHandle,
    ) -> Result<()> {
        let path = entry_path(kind, index, name)?;
        self.mutate(Method::DELETE, &path, scope_query(kind, scope), None, txn)
            .await
    }
}
