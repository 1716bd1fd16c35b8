//! The client: one pipeline and one cache per render context.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::cache::NormalizedCache;
use crate::cache::PossibleTypes;
use crate::cache::RootType;
use crate::configuration::Configuration;
use crate::environment::RenderContext;
use crate::error::ConfigurationError;
use crate::error::FetchError;
use crate::graphql::Response;
use crate::json_ext::Value;
use crate::link::AuthLink;
use crate::link::DiagnosticLink;
use crate::link::ErrorLink;
use crate::link::ErrorReporter;
use crate::link::FingerprintLink;
use crate::link::PersistedQueryLink;
use crate::link::Pipeline;
use crate::link::TracingReporter;
use crate::link::Transport;
use crate::link::UserGroupLink;
use crate::locale::Language;
use crate::operation::Operation;
use crate::transport::Endpoint;
use crate::transport::HttpTransport;
use crate::transport::SecurityPolicy;

/// A GraphQL client bound to one render context.
///
/// Build one per server-rendered request, or one per browser session.
#[derive(Clone, Debug)]
pub struct Client {
    pipeline: Pipeline,
    cache: Arc<NormalizedCache>,
    language: Language,
    optimistic_ids: Arc<AtomicU64>,
}

#[buildstructor::buildstructor]
impl Client {
    /// Build the pipeline and the cache.
    ///
    /// The links always run in this order: error logging, diagnostic id,
    /// fingerprint, credentials, user group, persisted queries, then the
    /// transport.
    #[builder(visibility = "pub")]
    fn new(
        configuration: Configuration,
        render_context: Option<RenderContext>,
        reporter: Option<Arc<dyn ErrorReporter>>,
        transport: Option<Arc<dyn Transport>>,
        introspection: Option<Value>,
        initial_state: Option<Value>,
        viewer_language: Option<String>,
        route_language: Option<String>,
    ) -> Result<Self, ConfigurationError> {
        let render_context =
            render_context.unwrap_or_else(|| RenderContext::server(Default::default()));
        let cookies = render_context.cookies();

        let transport: Arc<dyn Transport> = match transport {
            Some(transport) => transport,
            None => {
                let endpoint = Endpoint::resolve(&configuration, render_context.host())?;
                let policy = SecurityPolicy::for_endpoint(&endpoint, configuration.runtime_env);
                tracing::debug!(url = %endpoint.url, host = %endpoint.host, ?policy, "resolved endpoint");
                Arc::new(HttpTransport::new(endpoint, policy, cookies.clone())?)
            }
        };

        let pipeline = Pipeline::builder(transport)
            .link(ErrorLink::new())
            .link(DiagnosticLink::new(
                reporter.unwrap_or_else(|| Arc::new(TracingReporter)),
            ))
            .link(FingerprintLink::new(
                configuration.fingerprint.clone(),
                render_context.storage().cloned(),
            ))
            .link(AuthLink::new(&configuration))
            .link(UserGroupLink::new(
                configuration.cookies.user_group.clone(),
                cookies.clone(),
            ))
            .link(PersistedQueryLink::new(&configuration.persisted_queries))
            .build();

        let possible_types = match &introspection {
            Some(introspection) => PossibleTypes::from_introspection(introspection)?,
            None => PossibleTypes::default(),
        };
        let cache = NormalizedCache::new(possible_types);
        cache.restore(initial_state.unwrap_or(Value::Null))?;

        let cookie_language = cookies.get(&configuration.cookies.language);
        let language = Language::resolve(
            viewer_language.as_deref(),
            cookie_language.as_deref(),
            route_language.as_deref(),
            render_context.preferred_language(),
        );

        Ok(Self {
            pipeline,
            cache: Arc::new(cache),
            language,
            optimistic_ids: Default::default(),
        })
    }
}

impl Client {
    /// Send a query. Data is written to the cache even when errors came along.
    pub async fn query(&self, operation: Operation) -> Result<Response, FetchError> {
        let response = self.pipeline.execute(operation).await?;
        if let Some(data) = &response.data {
            self.cache.write_result(RootType::Query, data);
        }
        Ok(response)
    }

    /// Send a mutation.
    ///
    /// With an `optimistic` result the cache shows it right away; it is
    /// replaced by the real result, or rolled back if the mutation fails or
    /// is cancelled.
    pub async fn mutate(
        &self,
        operation: Operation,
        optimistic: Option<Value>,
    ) -> Result<Response, FetchError> {
        let mut guard = optimistic.map(|data| {
            let id = format!(
                "optimistic-{}",
                self.optimistic_ids.fetch_add(1, Ordering::Relaxed)
            );
            self.cache
                .record_optimistic(&id, RootType::Mutation, &data);
            OptimisticGuard {
                cache: self.cache.clone(),
                id: Some(id),
            }
        });

        let response = self.pipeline.execute(operation).await?;
        let data = response.data.as_ref().filter(|data| !data.is_null());
        match (data, guard.as_mut().and_then(|guard| guard.id.take())) {
            (Some(data), Some(id)) => {
                self.cache.commit_optimistic(&id, RootType::Mutation, data);
            }
            (Some(data), None) => {
                self.cache.write_result(RootType::Mutation, data);
            }
            (None, Some(id)) => {
                if let Err(error) = self.cache.rollback_optimistic(&id) {
                    tracing::debug!(%error, "optimistic layer already gone");
                }
            }
            (None, None) => {}
        }
        Ok(response)
    }

    /// Run an operation through the pipeline without touching the cache.
    pub async fn execute(&self, operation: Operation) -> Result<Response, FetchError> {
        self.pipeline.execute(operation).await
    }

    pub fn cache(&self) -> &Arc<NormalizedCache> {
        &self.cache
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// The viewer's language, resolved when the client was built.
    pub fn language(&self) -> Language {
        self.language
    }
}

/// Rolls an optimistic layer back unless the real result was committed.
struct OptimisticGuard {
    cache: Arc<NormalizedCache>,
    id: Option<String>,
}

impl Drop for OptimisticGuard {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            tracing::debug!(layer = %id, "rolling back optimistic result");
            let _ = self.cache.rollback_optimistic(&id);
        }
    }
}
