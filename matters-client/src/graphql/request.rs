use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;
use serde_json_bytes::Value;

use crate::json_ext::Object;

/// A GraphQL `Request` as it goes over the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Request {
    /// The GraphQL operation (e.g., query, mutation) string.
    ///
    /// Omitted on the first attempt of a persisted query, where only the hash
    /// travels in `extensions`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub query: Option<String>,

    /// The (optional) GraphQL operation name.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub operation_name: Option<String>,

    /// The (optional) GraphQL variables in the form of a JSON object.
    #[serde(
        skip_serializing_if = "Object::is_empty",
        default,
        deserialize_with = "deserialize_null_default"
    )]
    pub variables: Object,

    /// The (optional) GraphQL `extensions` of a GraphQL request.
    ///
    /// Persisted queries populate the `persistedQuery` key:
    ///
    /// ```json
    /// {
    ///   "extensions": {
    ///     "persistedQuery": {
    ///       "version": 1,
    ///       "sha256Hash": "sha256HashOfQuery"
    ///     }
    ///   }
    /// }
    /// ```
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    pub extensions: Object,
}

// NOTE: this deserialize helper is used to transform `null` to Default::default()
fn deserialize_null_default<'de, D, T: Default + Deserialize<'de>>(
    deserializer: D,
) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
{
    <Option<T>>::deserialize(deserializer).map(|x| x.unwrap_or_default())
}

#[buildstructor::buildstructor]
impl Request {
    #[builder(visibility = "pub")]
    fn new(
        query: Option<String>,
        operation_name: Option<String>,
        // Skip the `Object` type alias in order to use buildstructor's map special-casing
        variables: JsonMap<ByteString, Value>,
        extensions: JsonMap<ByteString, Value>,
    ) -> Self {
        Self {
            query,
            operation_name,
            variables,
            extensions,
        }
    }

    /// Encode the request as URL query string parameters, for `GET` requests.
    ///
    /// `variables` and `extensions` are JSON-encoded, and omitted when empty.
    pub fn to_urlencoded_query(&self) -> Result<String, serde_json::Error> {
        let mut params: Vec<(&str, String)> = Vec::with_capacity(4);
        if let Some(query) = &self.query {
            params.push(("query", query.clone()));
        }
        if let Some(operation_name) = &self.operation_name {
            params.push(("operationName", operation_name.clone()));
        }
        if !self.variables.is_empty() {
            params.push(("variables", serde_json::to_string(&self.variables)?));
        }
        if !self.extensions.is_empty() {
            params.push(("extensions", serde_json::to_string(&self.extensions)?));
        }
        serde_urlencoded::to_string(params).map_err(serde::ser::Error::custom)
    }
}
