//! Forwards the browser fingerprint, if one was stored.

use std::sync::Arc;

use http::HeaderName;

use crate::configuration::Fingerprint;
use crate::error::FetchError;
use crate::graphql::Response;
use crate::link::Link;
use crate::link::Next;
use crate::operation::Operation;
use crate::storage::Storage;

pub const FINGERPRINT_HEADER: HeaderName = HeaderName::from_static("x-user-agent-hash");

/// Only browsers have a fingerprint: without storage this link does nothing.
#[derive(Clone)]
pub struct FingerprintLink {
    settings: Fingerprint,
    storage: Option<Arc<dyn Storage>>,
}

impl FingerprintLink {
    pub fn new(settings: Fingerprint, storage: Option<Arc<dyn Storage>>) -> Self {
        Self { settings, storage }
    }

    fn fingerprint(&self) -> Option<String> {
        let storage = self.storage.as_ref()?;
        let hash: String = storage.get(&self.settings.storage_key)?;
        if hash.starts_with(&self.settings.prefix) {
            Some(hash)
        } else {
            tracing::debug!("ignoring stored fingerprint with an unexpected prefix");
            None
        }
    }
}

#[async_trait::async_trait]
impl Link for FingerprintLink {
    async fn handle(
        &self,
        mut operation: Operation,
        next: Next<'_>,
    ) -> Result<Response, FetchError> {
        if let Some(hash) = self.fingerprint() {
            operation.context.set_header(FINGERPRINT_HEADER, &hash);
        }
        next.run(operation).await
    }

    fn name(&self) -> &'static str {
        "fingerprint"
    }
}
