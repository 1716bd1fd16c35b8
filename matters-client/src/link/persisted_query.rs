//! Automatic persisted queries.
//!
//! The first attempt sends only the SHA-256 hash of the document. When the API
//! does not know the hash it answers `PersistedQueryNotFound` and the operation
//! is sent again, once, with the full document. An API answering
//! `PersistedQueryNotSupported` turns hashing off for the life of the link.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;

use crate::configuration::PersistedQueries;
use crate::error::FetchError;
use crate::graphql::Response;
use crate::link::Link;
use crate::link::Next;
use crate::operation::Operation;

const PERSISTED_QUERY_NOT_FOUND_EXTENSION_CODE: &str = "PERSISTED_QUERY_NOT_FOUND";
const PERSISTED_QUERY_NOT_SUPPORTED_EXTENSION_CODE: &str = "PERSISTED_QUERY_NOT_SUPPORTED";
const PERSISTED_QUERY_NOT_FOUND_MESSAGE: &str = "PersistedQueryNotFound";
const PERSISTED_QUERY_NOT_SUPPORTED_MESSAGE: &str = "PersistedQueryNotSupported";

pub(crate) const PERSISTED_QUERY_KEY: &str = "persistedQuery";
const HASH_VERSION_KEY: &str = "version";
const HASH_VERSION_VALUE: i32 = 1;
const HASH_KEY: &str = "sha256Hash";

#[derive(Debug, PartialEq, Eq)]
enum APQError {
    PersistedQueryNotSupported,
    PersistedQueryNotFound,
    Other,
}

#[derive(Clone, Debug)]
pub struct PersistedQueryLink {
    /// Cleared when the API reports that it does not support persisted queries.
    enabled: Arc<AtomicBool>,
    use_get_for_hashed_queries: bool,
}

impl PersistedQueryLink {
    pub fn new(settings: &PersistedQueries) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(settings.enabled)),
            use_get_for_hashed_queries: settings.use_get_for_hashed_queries,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Relaxed)
    }
}

#[async_trait::async_trait]
impl Link for PersistedQueryLink {
    async fn handle(&self, operation: Operation, next: Next<'_>) -> Result<Response, FetchError> {
        if !self.enabled.load(Relaxed) {
            return next.run(operation).await;
        }

        let persisted_query = serde_json_bytes::json!({
            HASH_VERSION_KEY: HASH_VERSION_VALUE,
            HASH_KEY: operation.document_hash()
        });

        let original = operation.clone();
        let mut with_document = operation;
        with_document
            .extensions_mut()
            .insert(PERSISTED_QUERY_KEY, persisted_query);

        let mut hashed = with_document.clone();
        let use_get =
            self.use_get_for_hashed_queries && hashed.kind().is_read() && !hashed.has_uploads();
        let http = hashed.context.http_mut();
        http.include_query = false;
        http.use_get = use_get;

        let response = next.run(hashed).await?;

        match get_apq_error(&response) {
            APQError::PersistedQueryNotSupported => {
                tracing::warn!("persisted queries are not supported by the API, disabling them");
                self.enabled.store(false, Relaxed);
                next.run(original).await
            }
            APQError::PersistedQueryNotFound => {
                tracing::debug!(
                    graphql.operation.name = with_document.operation_name().unwrap_or_default(),
                    "persisted query not found, sending the full document"
                );
                next.run(with_document).await
            }
            APQError::Other => Ok(response),
        }
    }

    fn name(&self) -> &'static str {
        "persisted_query"
    }
}

fn get_apq_error(gql_response: &Response) -> APQError {
    for error in &gql_response.errors {
        match error.message.as_str() {
            PERSISTED_QUERY_NOT_FOUND_MESSAGE => {
                return APQError::PersistedQueryNotFound;
            }
            PERSISTED_QUERY_NOT_SUPPORTED_MESSAGE => {
                return APQError::PersistedQueryNotSupported;
            }
            _ => {}
        }
        match error.code() {
            Some(PERSISTED_QUERY_NOT_FOUND_EXTENSION_CODE) => {
                return APQError::PersistedQueryNotFound;
            }
            Some(PERSISTED_QUERY_NOT_SUPPORTED_EXTENSION_CODE) => {
                return APQError::PersistedQueryNotSupported;
            }
            _ => {}
        }
    }
    APQError::Other
}
