//! HTTP transport: the terminal stage of the link pipeline.

use std::time::Duration;

use bytes::Bytes;
use http::header::ACCEPT;
use http::header::CONTENT_TYPE;
use http::header::COOKIE;
use http::header::HOST;
use http::HeaderName;
use http::HeaderValue;
use tracing::Instrument;

use crate::context::Credentials;
use crate::cookie::CookieSource;
use crate::error::ConfigurationError;
use crate::error::FetchError;
use crate::graphql;
use crate::link::Transport;
use crate::operation::Operation;
use crate::operation::OperationKind;

mod endpoint;
pub(crate) mod multipart;

pub use self::endpoint::Endpoint;
pub use self::endpoint::SecurityPolicy;
use self::multipart::MultipartFormData;

/// Asks the API to treat the request as preflighted, which keeps simple
/// cross-origin `GET` and multipart requests from being rejected.
pub const PREFLIGHT_HEADER: HeaderName = HeaderName::from_static("apollo-require-preflight");

static APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json");
static ACCEPT_GRAPHQL_JSON: HeaderValue =
    HeaderValue::from_static("application/graphql-response+json, application/json");

/// Longest body excerpt kept in an [`FetchError::HttpStatus`] reason.
const MAX_REASON_LENGTH: usize = 512;

/// Sends operations to the GraphQL API with `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Endpoint,
    cookies: CookieSource,
}

impl HttpTransport {
    /// Build a transport for `endpoint`. `cookies` are sent with operations
    /// whose credentials are [`Credentials::Include`].
    pub fn new(
        endpoint: Endpoint,
        policy: SecurityPolicy,
        cookies: CookieSource,
    ) -> Result<Self, ConfigurationError> {
        let builder = reqwest::Client::builder()
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .pool_idle_timeout(Some(Duration::from_secs(5)));
        let builder = match policy {
            SecurityPolicy::Plain => builder,
            SecurityPolicy::Tls {
                verify_certificates,
            } => builder
                .https_only(true)
                .danger_accept_invalid_certs(!verify_certificates),
        };
        let client = builder
            .build()
            .map_err(|error| ConfigurationError::HttpClient(error.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            cookies,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn request(&self, operation: &Operation) -> Result<reqwest::RequestBuilder, FetchError> {
        let (request, files) = operation.to_request();
        let http = operation.context.http();

        let builder = if !files.is_empty() {
            let form = MultipartFormData::new(&request, files)?;
            let content_type = form.content_type()?;
            self.client
                .post(self.endpoint.url.clone())
                .header(CONTENT_TYPE, content_type)
                .body(reqwest::Body::wrap_stream(form.into_stream()?))
        } else if http.use_get && operation.kind().is_read() {
            let query = request
                .to_urlencoded_query()
                .map_err(|error| FetchError::MalformedRequest {
                    reason: error.to_string(),
                })?;
            let mut url = self.endpoint.url.clone();
            url.set_query(Some(&query));
            self.client.get(url)
        } else {
            let body = serde_json::to_vec(&request).map_err(|error| {
                FetchError::MalformedRequest {
                    reason: error.to_string(),
                }
            })?;
            self.client
                .post(self.endpoint.url.clone())
                .header(CONTENT_TYPE, APPLICATION_JSON.clone())
                .body(body)
        };

        let mut headers = operation.context.headers().clone();
        headers.insert(ACCEPT, ACCEPT_GRAPHQL_JSON.clone());
        headers.insert(PREFLIGHT_HEADER, HeaderValue::from_static("true"));
        if let Ok(host) = HeaderValue::from_str(&self.endpoint.host) {
            headers.insert(HOST, host);
        }
        match operation.context.credentials() {
            Credentials::Include if !self.cookies.is_empty() => {
                if let Ok(cookie) = HeaderValue::from_str(self.cookies.as_str()) {
                    headers.insert(COOKIE, cookie);
                }
            }
            _ => {
                headers.remove(COOKIE);
            }
        }

        Ok(builder.headers(headers))
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, operation: Operation) -> Result<graphql::Response, FetchError> {
        if operation.kind() == OperationKind::Subscription {
            return Err(FetchError::MalformedRequest {
                reason: "subscriptions cannot be sent over HTTP".to_string(),
            });
        }

        let request = self.request(&operation)?;
        let span = tracing::info_span!("graphql_request",
            "otel.kind" = "CLIENT",
            "graphql.operation.name" = operation.operation_name().unwrap_or_default(),
            "graphql.operation.type" = %operation.kind(),
            "http.url" = %self.endpoint.url,
        );

        async move {
            let response = request.send().await?;
            let status = response.status();
            let body = response.bytes().await?;
            tracing::debug!(http.response.status = status.as_u16(), "received response");
            parse_response(status, body)
        }
        .instrument(span)
        .await
    }
}

/// Error statuses carrying GraphQL errors are surfaced as GraphQL responses,
/// so that links further up can inspect the errors.
fn parse_response(status: http::StatusCode, body: Bytes) -> Result<graphql::Response, FetchError> {
    match graphql::Response::from_bytes(body.clone()) {
        Ok(response) if status.is_success() || response.has_errors() => Ok(response),
        Ok(_) => Err(http_status_error(status, &body)),
        Err(_) if !status.is_success() => Err(http_status_error(status, &body)),
        Err(error) => Err(error),
    }
}

fn http_status_error(status: http::StatusCode, body: &[u8]) -> FetchError {
    let mut reason = String::from_utf8_lossy(body).into_owned();
    if reason.len() > MAX_REASON_LENGTH {
        let mut end = MAX_REASON_LENGTH;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    if reason.trim().is_empty() {
        reason = status
            .canonical_reason()
            .unwrap_or("unknown status")
            .to_string();
    }
    FetchError::HttpStatus {
        status: status.as_u16(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;
    use url::Url;

    use super::*;
    use crate::configuration::Configuration;
    use crate::configuration::RuntimeEnv;

    fn legacy_transport() -> HttpTransport {
        let configuration = Configuration::new(
            Url::parse("https://server.matters.town/graphql").expect("valid url"),
        );
        let endpoint =
            Endpoint::resolve(&configuration, "web.matters.news").expect("valid endpoint");
        let policy = SecurityPolicy::for_endpoint(&endpoint, RuntimeEnv::Production);
        HttpTransport::new(endpoint, policy, CookieSource::from("session=secret"))
            .expect("valid transport")
    }

    fn get_thing() -> Operation {
        Operation::builder()
            .document("query GetThing { thing { id } }")
            .operation_name("GetThing")
            .build()
    }

    #[test]
    fn requests_carry_the_rewritten_host_header() {
        let transport = legacy_transport();
        let request = transport
            .request(&get_thing())
            .expect("encodable")
            .build()
            .expect("valid request");

        assert_eq!(
            request.url().as_str(),
            "https://server.matters.news/graphql"
        );
        assert_eq!(
            request.headers().get(HOST),
            Some(&HeaderValue::from_static("server.matters.news"))
        );
        assert_eq!(
            request.headers().get(PREFLIGHT_HEADER),
            Some(&HeaderValue::from_static("true"))
        );
        assert_eq!(
            request.headers().get(COOKIE),
            Some(&HeaderValue::from_static("session=secret"))
        );
    }

    #[test]
    fn omitted_credentials_drop_the_cookie_header() {
        let transport = legacy_transport();
        let mut operation = get_thing();
        operation.context.set_credentials(Credentials::Omit);
        operation
            .context
            .headers_mut()
            .insert(COOKIE, HeaderValue::from_static("leaked=1"));
        let request = transport
            .request(&operation)
            .expect("encodable")
            .build()
            .expect("valid request");

        assert_eq!(request.headers().get(COOKIE), None);
        assert_eq!(
            request.headers().get(HOST),
            Some(&HeaderValue::from_static("server.matters.news"))
        );
    }

    #[test]
    fn graphql_errors_survive_error_statuses() {
        let response = parse_response(
            StatusCode::BAD_REQUEST,
            Bytes::from_static(br#"{"errors":[{"message":"PersistedQueryNotFound"}]}"#),
        )
        .expect("graphql response");
        assert_eq!(response.errors[0].message, "PersistedQueryNotFound");
    }

    #[test]
    fn non_graphql_error_bodies_become_status_errors() {
        assert_eq!(
            parse_response(StatusCode::BAD_GATEWAY, Bytes::from_static(b"<html>oops</html>")),
            Err(FetchError::HttpStatus {
                status: 502,
                reason: "<html>oops</html>".to_string()
            })
        );
        assert_eq!(
            parse_response(StatusCode::SERVICE_UNAVAILABLE, Bytes::new()),
            Err(FetchError::HttpStatus {
                status: 503,
                reason: "Service Unavailable".to_string()
            })
        );
        assert_eq!(
            parse_response(StatusCode::INTERNAL_SERVER_ERROR, Bytes::from_static(b"{}")),
            Err(FetchError::HttpStatus {
                status: 500,
                reason: "{}".to_string()
            })
        );
    }

    #[test]
    fn malformed_success_bodies_are_malformed_responses() {
        assert!(matches!(
            parse_response(StatusCode::OK, Bytes::from_static(b"[1, 2]")),
            Err(FetchError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn long_reasons_are_truncated() {
        let body = "é".repeat(MAX_REASON_LENGTH);
        let FetchError::HttpStatus { reason, .. } =
            http_status_error(StatusCode::BAD_GATEWAY, body.as_bytes())
        else {
            panic!("expected a status error");
        };
        assert!(reason.len() <= MAX_REASON_LENGTH);
    }
}
