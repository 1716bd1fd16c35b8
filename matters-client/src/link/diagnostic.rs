//! Correlates client requests with the error reporter.
//!
//! Every operation gets a fresh action id, sent to the API as a header and
//! recorded as a tag in the error reporter so that server and client events
//! can be joined. Tagging is fire-and-forget: it never delays or fails the
//! operation.

use std::sync::Arc;

use http::HeaderName;
use rand::distr::Alphanumeric;
use rand::Rng;
use tower::BoxError;

use crate::error::FetchError;
use crate::graphql::Response;
use crate::link::Link;
use crate::link::Next;
use crate::operation::Operation;

pub const ACTION_ID_HEADER: HeaderName = HeaderName::from_static("x-sentry-action-id");
pub const ACTION_ID_TAG: &str = "action-id";

const ACTION_ID_LENGTH: usize = 12;

/// Where diagnostic tags go.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ErrorReporter: Send + Sync + 'static {
    async fn set_tag(&self, key: String, value: String) -> Result<(), BoxError>;
}

/// Records tags as `debug` events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

#[async_trait::async_trait]
impl ErrorReporter for TracingReporter {
    async fn set_tag(&self, key: String, value: String) -> Result<(), BoxError> {
        tracing::debug!(tag.key = %key, tag.value = %value, "diagnostic tag");
        Ok(())
    }
}

#[derive(Clone)]
pub struct DiagnosticLink {
    reporter: Arc<dyn ErrorReporter>,
}

impl DiagnosticLink {
    pub fn new(reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { reporter }
    }
}

pub(crate) fn action_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(ACTION_ID_LENGTH)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect()
}

#[async_trait::async_trait]
impl Link for DiagnosticLink {
    async fn handle(
        &self,
        mut operation: Operation,
        next: Next<'_>,
    ) -> Result<Response, FetchError> {
        let action_id = action_id();
        operation.context.set_header(ACTION_ID_HEADER, &action_id);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let reporter = self.reporter.clone();
                let value = action_id.clone();
                handle.spawn(async move {
                    if let Err(error) = reporter.set_tag(ACTION_ID_TAG.to_string(), value).await {
                        tracing::debug!(%error, "could not tag the error reporter");
                    }
                });
            }
            Err(_) => tracing::debug!("no runtime to tag the error reporter from"),
        }

        next.run(operation).await
    }

    fn name(&self) -> &'static str {
        "diagnostic"
    }
}
