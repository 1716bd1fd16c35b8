//! The link pipeline.
//!
//! An operation flows through an ordered chain of [`Link`]s before reaching the
//! [`Transport`]. Each link may decorate the operation's context, delegate to
//! the rest of the chain through [`Next`], and observe or replace the result.
//! The chain is fixed when the [`Pipeline`] is built and is never reordered
//! per request.

use std::sync::Arc;
use std::task::Poll;

use futures::future::BoxFuture;
use tower::Service;

use crate::error::FetchError;
use crate::graphql::Response;
use crate::operation::Operation;

mod auth;
mod diagnostic;
mod error;
mod fingerprint;
mod persisted_query;
mod user_group;

pub use self::auth::AuthLink;
pub use self::auth::ACCESS_TOKEN_HEADER;
pub use self::auth::CLIENT_NAME_HEADER;
pub use self::diagnostic::DiagnosticLink;
pub use self::diagnostic::ErrorReporter;
pub use self::diagnostic::TracingReporter;
pub use self::diagnostic::ACTION_ID_HEADER;
pub use self::diagnostic::ACTION_ID_TAG;
pub use self::error::ErrorLink;
pub use self::fingerprint::FingerprintLink;
pub use self::fingerprint::FINGERPRINT_HEADER;
pub use self::persisted_query::PersistedQueryLink;
pub use self::user_group::UserGroupLink;
pub use self::user_group::USER_GROUP_HEADER;

/// One stage of the pipeline.
#[async_trait::async_trait]
pub trait Link: Send + Sync + 'static {
    /// Handle `operation`, usually by calling `next.run(operation)`.
    async fn handle(&self, operation: Operation, next: Next<'_>) -> Result<Response, FetchError>;

    /// Used in logs.
    fn name(&self) -> &'static str;
}

/// The terminal stage: puts the operation on the wire.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn execute(&self, operation: Operation) -> Result<Response, FetchError>;
}

/// The remainder of the chain after the current link.
///
/// `Next` is `Copy`: a link may run the rest of the chain more than once, as
/// the persisted-query retry does.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    links: &'a [Arc<dyn Link>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub(crate) fn new(links: &'a [Arc<dyn Link>], transport: &'a dyn Transport) -> Self {
        Self { links, transport }
    }

    pub async fn run(mut self, operation: Operation) -> Result<Response, FetchError> {
        match self.links.split_first() {
            Some((link, rest)) => {
                self.links = rest;
                link.handle(operation, self).await
            }
            None => self.transport.execute(operation).await,
        }
    }
}

/// An ordered chain of links ending in a transport.
#[derive(Clone)]
pub struct Pipeline {
    links: Arc<[Arc<dyn Link>]>,
    transport: Arc<dyn Transport>,
}

impl Pipeline {
    pub fn builder(transport: Arc<dyn Transport>) -> PipelineBuilder {
        PipelineBuilder {
            links: Vec::new(),
            transport,
        }
    }

    /// Run `operation` through every link, then the transport.
    pub async fn execute(&self, operation: Operation) -> Result<Response, FetchError> {
        Next::new(&self.links, self.transport.as_ref())
            .run(operation)
            .await
    }

    /// Link names, outermost first.
    pub fn link_names(&self) -> Vec<&'static str> {
        self.links.iter().map(|link| link.name()).collect()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("links", &self.link_names())
            .finish_non_exhaustive()
    }
}

impl Service<Operation> for Pipeline {
    type Response = Response;
    type Error = FetchError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, operation: Operation) -> Self::Future {
        let pipeline = self.clone();
        Box::pin(async move { pipeline.execute(operation).await })
    }
}

pub struct PipelineBuilder {
    links: Vec<Arc<dyn Link>>,
    transport: Arc<dyn Transport>,
}

impl PipelineBuilder {
    /// Append a link. Links run in the order they are added.
    pub fn link(mut self, link: impl Link) -> Self {
        self.links.push(Arc::new(link));
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            links: self.links.into(),
            transport: self.transport,
        }
    }
}
