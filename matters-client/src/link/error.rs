//! Logs every GraphQL error and transport failure. Results pass through unchanged.

use crate::error::FetchError;
use crate::graphql::Response;
use crate::json_ext::to_json_string;
use crate::link::Link;
use crate::link::Next;
use crate::operation::Operation;

#[derive(Clone, Debug, Default)]
pub struct ErrorLink;

impl ErrorLink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Link for ErrorLink {
    async fn handle(&self, operation: Operation, next: Next<'_>) -> Result<Response, FetchError> {
        let operation_name = operation.operation_name().unwrap_or_default().to_string();
        let result = next.run(operation).await;

        match &result {
            Ok(response) => {
                for error in &response.errors {
                    tracing::warn!(
                        graphql.operation.name = %operation_name,
                        "[GraphQL error]: Message: {}, Location: {}, Path: {}, Code: {}",
                        error.message,
                        to_json_string(&error.locations),
                        to_json_string(&error.path),
                        error.code().unwrap_or_default(),
                    );
                }
            }
            Err(error) => {
                tracing::error!(
                    graphql.operation.name = %operation_name,
                    "[Network error]: {error}"
                );
            }
        }

        result
    }

    fn name(&self) -> &'static str {
        "error"
    }
}
