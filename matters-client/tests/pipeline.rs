use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::header::COOKIE;
use http::header::HOST;
use http::HeaderMap;
use http::HeaderValue;
use matters_client::configuration::PersistedQueries;
use matters_client::error::FetchError;
use matters_client::storage::MemoryStorage;
use matters_client::storage::Storage;
use matters_client::Client;
use matters_client::Configuration;
use matters_client::Context;
use matters_client::Operation;
use matters_client::RenderContext;
use matters_client::Upload;
use pretty_assertions::assert_eq;
use serde_json::json;
use sha2::Digest;
use sha2::Sha256;
use url::Url;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::Request;
use wiremock::ResponseTemplate;

const GET_THING: &str = "query GetThing { thing { id } }";
const SINGLE_FILE_UPLOAD: &str =
    "mutation SingleFileUpload($file: Upload!) { singleFileUpload(input: { file: $file }) { id } }";

fn configuration(server: &MockServer) -> Configuration {
    Configuration::new(Url::parse(&format!("{}/graphql", server.uri())).expect("valid url"))
}

fn without_persisted_queries(server: &MockServer) -> Configuration {
    let mut configuration = configuration(server);
    configuration.persisted_queries = PersistedQueries {
        enabled: false,
        use_get_for_hashed_queries: false,
    };
    configuration
}

fn server_render(cookie: &str) -> RenderContext {
    let mut headers = HeaderMap::new();
    headers.insert(COOKIE, HeaderValue::from_str(cookie).expect("valid cookie"));
    headers.insert(HOST, HeaderValue::from_static("matters.town"));
    RenderContext::server(headers)
}

fn client(configuration: Configuration, render_context: RenderContext) -> Client {
    Client::builder()
        .configuration(configuration)
        .render_context(render_context)
        .build()
        .expect("valid client")
}

fn hash_of(document: &str) -> String {
    hex::encode(Sha256::digest(document.as_bytes()))
}

fn query_pairs(request: &Request) -> HashMap<String, String> {
    request.url.query_pairs().into_owned().collect()
}

fn header<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
}

fn body_json(request: &Request) -> serde_json::Value {
    serde_json::from_slice(&request.body).expect("json body")
}

fn get_thing(context: Context) -> Operation {
    Operation::builder()
        .document(GET_THING)
        .operation_name("GetThing")
        .context(context)
        .build()
}

#[tokio::test]
async fn public_reads_go_out_as_hashed_gets_without_cookies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/graphql"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": { "thing": { "id": "1" } } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client(
        configuration(&server),
        server_render("__user_group=a; session=secret"),
    );
    let response = client
        .query(get_thing(Context::public()))
        .await
        .expect("succeeds");
    assert_eq!(
        serde_json::to_value(&response).expect("serializable"),
        json!({ "data": { "thing": { "id": "1" } } })
    );

    let requests = server.received_requests().await.expect("recording enabled");
    let request = &requests[0];
    let pairs = query_pairs(request);
    assert!(!pairs.contains_key("query"), "only the hash is sent");
    assert_eq!(pairs["operationName"], "GetThing");
    let extensions: serde_json::Value =
        serde_json::from_str(&pairs["extensions"]).expect("json extensions");
    assert_eq!(
        extensions,
        json!({ "persistedQuery": { "version": 1, "sha256Hash": hash_of(GET_THING) } })
    );
    assert_eq!(header(request, "cookie"), None);
    assert_eq!(header(request, "x-user-group"), Some("a"));
    assert_eq!(header(request, "apollo-require-preflight"), Some("true"));
    assert_eq!(header(request, "x-client-name"), Some("web"));
    assert_eq!(
        header(request, "x-sentry-action-id").map(str::len),
        Some(12)
    );
}

#[tokio::test]
async fn credentialed_operations_forward_cookies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": { "thing": { "id": "1" } } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client(
        without_persisted_queries(&server),
        server_render("__user_group=b; session=secret"),
    );
    client
        .query(get_thing(Context::new()))
        .await
        .expect("succeeds");

    let requests = server.received_requests().await.expect("recording enabled");
    let request = &requests[0];
    assert_eq!(
        header(request, "cookie"),
        Some("__user_group=b; session=secret")
    );
    assert_eq!(header(request, "x-user-group"), Some("b"));
    assert_eq!(header(request, "content-type"), Some("application/json"));
    assert_eq!(
        body_json(request),
        json!({ "query": GET_THING, "operationName": "GetThing" })
    );
}

#[tokio::test]
async fn unknown_hashes_are_retried_once_with_the_document() {
    let server = MockServer::start().await;
    Mock::given(path("/graphql"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "errors": [{ "message": "PersistedQueryNotFound" }] })),
        )
        .expect(2)
        .mount(&server)
        .await;

    let client = client(configuration(&server), server_render(""));
    let response = client
        .query(get_thing(Context::new()))
        .await
        .expect("graphql errors are not fetch errors");
    assert_eq!(response.errors[0].message, "PersistedQueryNotFound");

    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 2, "no third attempt");
    assert_eq!(requests[0].method.as_str(), "GET");
    assert!(!query_pairs(&requests[0]).contains_key("query"));
    assert_eq!(requests[1].method.as_str(), "POST");
    assert_eq!(
        body_json(&requests[1]),
        json!({
            "query": GET_THING,
            "operationName": "GetThing",
            "extensions": { "persistedQuery": { "version": 1, "sha256Hash": hash_of(GET_THING) } }
        })
    );
}

#[tokio::test]
async fn files_are_sent_as_multipart_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": { "singleFileUpload": { "id": "asset-1" } } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client(without_persisted_queries(&server), server_render(""));
    let operation = Operation::builder()
        .document(SINGLE_FILE_UPLOAD)
        .operation_name("SingleFileUpload")
        .variable(
            "file",
            Upload::new("cover.png", mime::IMAGE_PNG, Bytes::from_static(b"\x89PNG")),
        )
        .build();
    let response = client.mutate(operation, None).await.expect("succeeds");
    assert_eq!(
        serde_json::to_value(&response).expect("serializable"),
        json!({ "data": { "singleFileUpload": { "id": "asset-1" } } })
    );

    let requests = server.received_requests().await.expect("recording enabled");
    let request = &requests[0];
    let content_type = header(request, "content-type").expect("content type");
    let boundary = multer::parse_boundary(content_type).expect("multipart content type");
    let body = Bytes::from(request.body.clone());
    let mut multipart = multer::Multipart::new(
        futures::stream::once(async move { Ok::<_, std::io::Error>(body) }),
        boundary,
    );

    let operations = multipart
        .next_field()
        .await
        .expect("readable")
        .expect("operations part");
    assert_eq!(operations.name(), Some("operations"));
    let operations: serde_json::Value = operations.json().await.expect("json");
    assert_eq!(
        operations,
        json!({
            "query": SINGLE_FILE_UPLOAD,
            "operationName": "SingleFileUpload",
            "variables": { "file": null }
        })
    );

    let map = multipart
        .next_field()
        .await
        .expect("readable")
        .expect("map part");
    assert_eq!(map.name(), Some("map"));
    let map: serde_json::Value = map.json().await.expect("json");
    assert_eq!(map, json!({ "1": ["variables.file"] }));

    let file = multipart
        .next_field()
        .await
        .expect("readable")
        .expect("file part");
    assert_eq!(file.name(), Some("1"));
    assert_eq!(file.file_name(), Some("cover.png"));
    assert_eq!(
        file.bytes().await.expect("file bytes"),
        Bytes::from_static(b"\x89PNG")
    );
    assert!(multipart.next_field().await.expect("readable").is_none());
}

#[tokio::test]
async fn legacy_hosts_talk_to_the_legacy_endpoint() {
    let server = MockServer::start().await;
    Mock::given(path("/api.matters.news/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "thing": null } })))
        .expect(1)
        .mount(&server)
        .await;

    let mut configuration = without_persisted_queries(&server);
    configuration.api_url = Url::parse(&format!("{}/api.matters.town/graphql", server.uri()))
        .expect("valid url");
    let client = Client::builder()
        .configuration(configuration)
        .render_context(RenderContext::browser(
            "web.matters.news",
            "",
            Arc::new(MemoryStorage::new()),
        ))
        .build()
        .expect("valid client");

    client
        .query(get_thing(Context::new()))
        .await
        .expect("served by the legacy path");
}

#[tokio::test]
async fn browsers_send_their_fingerprint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {} })))
        .expect(1)
        .mount(&server)
        .await;

    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    storage
        .set("__agent_hash", &"ahv1_fingerprint")
        .expect("stored");
    let client = client(
        without_persisted_queries(&server),
        RenderContext::browser("matters.town", "__user_group=c", storage),
    );
    client
        .query(get_thing(Context::new()))
        .await
        .expect("succeeds");

    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(
        header(&requests[0], "x-user-agent-hash"),
        Some("ahv1_fingerprint")
    );
    assert_eq!(header(&requests[0], "cookie"), Some("__user_group=c"));
}

#[tokio::test]
async fn error_statuses_without_graphql_errors_fail_the_operation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
        .mount(&server)
        .await;

    let client = client(without_persisted_queries(&server), server_render(""));
    let error = client
        .query(get_thing(Context::new()))
        .await
        .expect_err("bad gateway");
    assert_eq!(
        error,
        FetchError::HttpStatus {
            status: 502,
            reason: "<html>bad gateway</html>".to_string()
        }
    );
}

#[tokio::test]
async fn unreachable_apis_are_network_errors() {
    let server = MockServer::start().await;
    let configuration = without_persisted_queries(&server);
    drop(server);

    let client = client(configuration, server_render(""));
    let error = client
        .query(get_thing(Context::new()))
        .await
        .expect_err("nothing listens");
    assert!(error.is_network_error());
}
