//! Per-operation metadata.
//!
//! A [`Context`] travels with exactly one operation through the link pipeline.
//! Links read and decorate it; the transport turns it into HTTP headers and a
//! credentials policy. It is never persisted beyond the request's lifetime.
use std::sync::Arc;

use dashmap::DashMap;
use http::HeaderMap;
use http::HeaderName;
use http::HeaderValue;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::json_ext::Value;

/// Context key marking an operation as public: such operations are sent
/// without cookies.
pub const PUBLIC_OPERATION_KEY: &str = "_public";

/// Whether cookies travel with the request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Credentials {
    /// Send the viewer's cookies.
    #[default]
    Include,
    /// Send no cookies at all.
    Omit,
}

/// How the transport should put the operation on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HttpOptions {
    /// Send the document text. Cleared for the hash-only persisted-query attempt.
    pub include_query: bool,
    /// Send the operation as a `GET` query string instead of a `POST` body.
    pub use_get: bool,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            include_query: true,
            use_get: false,
        }
    }
}

/// Holds the context of one operation.
#[derive(Clone, Debug, Default)]
pub struct Context {
    headers: HeaderMap,
    credentials: Credentials,
    http: HttpOptions,
    entries: Arc<DashMap<String, Value>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context for an operation that must be sent without credentials.
    pub fn public() -> Self {
        let context = Self::default();
        context.insert_json_value(PUBLIC_OPERATION_KEY, Value::Bool(true));
        context
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Set an outgoing header.
    ///
    /// Values that are not valid header values (for example a cookie holding
    /// control characters) are dropped: optional metadata never fails a request.
    pub fn set_header(&mut self, name: HeaderName, value: &str) -> bool {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
                true
            }
            Err(_) => {
                tracing::debug!(header = %name, "dropping invalid header value");
                false
            }
        }
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials
    }

    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
    }

    pub fn http(&self) -> HttpOptions {
        self.http
    }

    pub fn http_mut(&mut self) -> &mut HttpOptions {
        &mut self.http
    }

    /// True when the operation was explicitly marked public.
    pub fn is_public(&self) -> bool {
        matches!(
            self.get_json_value(PUBLIC_OPERATION_KEY),
            Some(Value::Bool(true))
        )
    }

    /// Insert a value serialized as JSON.
    pub fn insert<K, V>(&self, key: K, value: V) -> Result<Option<Value>, serde_json::Error>
    where
        K: Into<String>,
        V: Serialize,
    {
        let value = serde_json_bytes::to_value(value)?;
        Ok(self.entries.insert(key.into(), value))
    }

    pub fn insert_json_value<K: Into<String>>(&self, key: K, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Get a value deserialized from its JSON representation.
    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>, serde_json::Error> {
        self.entries
            .get(key)
            .map(|value| serde_json_bytes::from_value(value.value().clone()))
            .transpose()
    }

    pub fn get_json_value(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|value| value.value().clone())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}
