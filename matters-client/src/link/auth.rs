//! Credentials policy and client identification.

use http::HeaderName;

use crate::configuration::Configuration;
use crate::configuration::RuntimeEnv;
use crate::context::Credentials;
use crate::error::FetchError;
use crate::graphql::Response;
use crate::json_ext::to_json_string;
use crate::link::Link;
use crate::link::Next;
use crate::operation::Operation;

pub const ACCESS_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-access-token");
pub const CLIENT_NAME_HEADER: HeaderName = HeaderName::from_static("x-client-name");

/// Public operations are sent without cookies or access token; every other
/// operation carries the viewer's credentials.
#[derive(Clone, Debug)]
pub struct AuthLink {
    runtime_env: RuntimeEnv,
    access_token: Option<String>,
    client_name: String,
}

impl AuthLink {
    pub fn new(configuration: &Configuration) -> Self {
        Self {
            runtime_env: configuration.runtime_env,
            access_token: configuration.access_token.clone(),
            client_name: configuration.client_name.clone(),
        }
    }
}

#[async_trait::async_trait]
impl Link for AuthLink {
    async fn handle(
        &self,
        mut operation: Operation,
        next: Next<'_>,
    ) -> Result<Response, FetchError> {
        let public = operation.context.is_public();
        let credentials = if public {
            Credentials::Omit
        } else {
            Credentials::Include
        };
        operation.context.set_credentials(credentials);

        if self.runtime_env.is_local() {
            tracing::info!(
                graphql.operation.name = operation.operation_name().unwrap_or_default(),
                credentials = !public,
                variables = %to_json_string(&operation.json_variables()),
                "[GraphQL operation]"
            );
        }

        if !self.client_name.is_empty() {
            operation
                .context
                .set_header(CLIENT_NAME_HEADER, &self.client_name);
        }
        match &self.access_token {
            Some(token) if !public => {
                operation.context.set_header(ACCESS_TOKEN_HEADER, token);
            }
            _ => {
                operation.context.headers_mut().remove(ACCESS_TOKEN_HEADER);
            }
        }

        next.run(operation).await
    }

    fn name(&self) -> &'static str {
        "auth"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tracing_test::traced_test;
    use url::Url;

    use super::*;
    use crate::context::Context;
    use crate::link::MockTransport;
    use crate::link::Pipeline;

    fn configuration(runtime_env: RuntimeEnv) -> Configuration {
        let mut configuration =
            Configuration::new(Url::parse("http://localhost:4000/graphql").expect("valid url"));
        configuration.runtime_env = runtime_env;
        configuration.access_token = Some("secret".to_string());
        configuration
    }

    fn expect_operation(
        check: impl Fn(&Operation) -> bool + Send + 'static,
    ) -> Arc<MockTransport> {
        let mut transport = MockTransport::new();
        transport
            .expect_execute()
            .times(1)
            .withf(check)
            .returning(|_| Ok(Response::default()));
        Arc::new(transport)
    }

    #[tokio::test]
    async fn public_operations_omit_credentials() {
        let transport = expect_operation(|operation| {
            operation.context.credentials() == Credentials::Omit
                && !operation.context.headers().contains_key(&ACCESS_TOKEN_HEADER)
                && operation.context.headers()[&CLIENT_NAME_HEADER] == "web"
        });
        Pipeline::builder(transport)
            .link(AuthLink::new(&configuration(RuntimeEnv::Production)))
            .build()
            .execute(
                Operation::builder()
                    .document("query GetThing { thing { id } }")
                    .context(Context::public())
                    .build(),
            )
            .await
            .expect("succeeds");
    }

    #[tokio::test]
    async fn other_operations_include_credentials() {
        let transport = expect_operation(|operation| {
            operation.context.credentials() == Credentials::Include
                && operation.context.headers()[&ACCESS_TOKEN_HEADER] == "secret"
        });
        Pipeline::builder(transport)
            .link(AuthLink::new(&configuration(RuntimeEnv::Production)))
            .build()
            .execute(Operation::builder().document("{ viewer { id } }").build())
            .await
            .expect("succeeds");
    }

    #[tokio::test]
    #[traced_test]
    async fn operations_are_logged_locally() {
        let transport = expect_operation(|_| true);
        Pipeline::builder(transport)
            .link(AuthLink::new(&configuration(RuntimeEnv::Local)))
            .build()
            .execute(
                Operation::builder()
                    .document("query GetThing($id: ID!) { thing(id: $id) { id } }")
                    .operation_name("GetThing")
                    .variable("id", "1")
                    .build(),
            )
            .await
            .expect("succeeds");
        assert!(logs_contain("[GraphQL operation]"));
        assert!(logs_contain("GetThing"));
    }

    #[tokio::test]
    #[traced_test]
    async fn operations_are_not_logged_elsewhere() {
        let transport = expect_operation(|_| true);
        Pipeline::builder(transport)
            .link(AuthLink::new(&configuration(RuntimeEnv::Development)))
            .build()
            .execute(Operation::builder().document("{ viewer { id } }").build())
            .await
            .expect("succeeds");
        assert!(!logs_contain("[GraphQL operation]"));
    }
}
