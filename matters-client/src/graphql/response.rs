use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;

use crate::error::Error;
use crate::error::FetchError;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// A GraphQL response as returned by the API.
///
/// `data` and `errors` may both be present: partial data plus errors is a
/// valid terminal state.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Response {
    /// The response data.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,

    /// The optional graphql errors encountered.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<Error>,

    /// The optional graphql extensions.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl Response {
    /// Constructor
    #[builder(visibility = "pub")]
    fn new(data: Option<Value>, errors: Vec<Error>, extensions: Map<ByteString, Value>) -> Self {
        Self {
            data,
            errors,
            extensions,
        }
    }

    /// Create a [`Response`] from the supplied [`Bytes`].
    ///
    /// This will return an error (identifying the faulty service) if the input is invalid.
    pub fn from_bytes(b: Bytes) -> Result<Response, FetchError> {
        let value: Value =
            serde_json::from_slice(&b).map_err(|error| FetchError::MalformedResponse {
                reason: error.to_string(),
            })?;
        if !value.is_object() {
            return Err(FetchError::MalformedResponse {
                reason: "the response body is not a JSON object".to_string(),
            });
        }
        serde_json_bytes::from_value(value).map_err(|error| FetchError::MalformedResponse {
            reason: error.to_string(),
        })
    }

    /// True when the response carries at least one GraphQL error.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
