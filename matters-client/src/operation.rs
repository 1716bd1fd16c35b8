//! Operations as they enter the link pipeline.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use apollo_parser::cst;
use bytes::Bytes;
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use sha2::Digest;
use sha2::Sha256;

use crate::context::Context;
use crate::graphql;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// The kind of a GraphQL operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    /// Reads have no side effects and may go over `GET`.
    pub fn is_read(&self) -> bool {
        matches!(self, OperationKind::Query)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
            OperationKind::Subscription => "subscription",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file sent as a GraphQL variable.
#[derive(Clone, Debug, PartialEq)]
pub struct Upload {
    pub filename: String,
    pub content_type: mime::Mime,
    pub content: Bytes,
}

impl Upload {
    pub fn new(filename: impl Into<String>, content_type: mime::Mime, content: Bytes) -> Self {
        Self {
            filename: filename.into(),
            content_type,
            content,
        }
    }

    /// Read a file from disk. The content type is `application/octet-stream`.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "blob".to_string());
        Ok(Self::new(
            filename,
            mime::APPLICATION_OCTET_STREAM,
            Bytes::from(content),
        ))
    }
}

/// A variable value. Unlike plain JSON it may hold files, at any depth.
#[derive(Clone, Debug, PartialEq)]
pub enum InputValue {
    Json(Value),
    Upload(Upload),
    List(Vec<InputValue>),
    Object(IndexMap<String, InputValue>),
}

impl From<Value> for InputValue {
    fn from(value: Value) -> Self {
        InputValue::Json(value)
    }
}

impl From<Upload> for InputValue {
    fn from(upload: Upload) -> Self {
        InputValue::Upload(upload)
    }
}

impl From<&str> for InputValue {
    fn from(value: &str) -> Self {
        InputValue::Json(Value::from(value))
    }
}

impl From<String> for InputValue {
    fn from(value: String) -> Self {
        InputValue::Json(Value::from(value))
    }
}

impl From<Vec<InputValue>> for InputValue {
    fn from(values: Vec<InputValue>) -> Self {
        InputValue::List(values)
    }
}

/// A file pulled out of the variables, with every variable path it was found at.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractedFile {
    pub upload: Upload,
    /// Dotted paths such as `variables.input.cover`.
    pub paths: Vec<String>,
}

/// Replace every file in `variables` by `null`, collecting the files in
/// document order.
pub fn extract_files(variables: &IndexMap<String, InputValue>) -> (Object, Vec<ExtractedFile>) {
    let mut files = Vec::new();
    let mut object = Object::new();
    for (name, value) in variables {
        let path = format!("variables.{name}");
        object.insert(name.as_str(), extract_value(value, path, &mut files));
    }
    (object, files)
}

fn extract_value(value: &InputValue, path: String, files: &mut Vec<ExtractedFile>) -> Value {
    match value {
        InputValue::Json(value) => value.clone(),
        InputValue::Upload(upload) => {
            files.push(ExtractedFile {
                upload: upload.clone(),
                paths: vec![path],
            });
            Value::Null
        }
        InputValue::List(values) => Value::Array(
            values
                .iter()
                .enumerate()
                .map(|(index, value)| extract_value(value, format!("{path}.{index}"), files))
                .collect(),
        ),
        InputValue::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, value)| {
                    (
                        key.as_str().into(),
                        extract_value(value, format!("{path}.{key}"), files),
                    )
                })
                .collect(),
        ),
    }
}

/// One GraphQL request travelling through the pipeline.
///
/// Cloning is cheap for the document; the persisted-query retry re-sends a
/// clone of the same operation.
#[derive(Clone, Debug)]
pub struct Operation {
    document: Arc<str>,
    operation_name: Option<String>,
    kind: OperationKind,
    variables: IndexMap<String, InputValue>,
    extensions: Object,
    hash: Arc<OnceCell<String>>,
    pub context: Context,
}

#[buildstructor::buildstructor]
impl Operation {
    #[builder(visibility = "pub")]
    fn new(
        document: String,
        operation_name: Option<String>,
        variables: IndexMap<String, InputValue>,
        context: Option<Context>,
    ) -> Self {
        let kind = operation_kind(&document, operation_name.as_deref());
        Self {
            document: document.into(),
            operation_name,
            kind,
            variables,
            extensions: Object::new(),
            hash: Default::default(),
            context: context.unwrap_or_default(),
        }
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn variables(&self) -> &IndexMap<String, InputValue> {
        &self.variables
    }

    /// Request extensions, such as `persistedQuery`.
    pub fn extensions(&self) -> &Object {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Object {
        &mut self.extensions
    }

    /// True if any variable, at any depth, is a file.
    pub fn has_uploads(&self) -> bool {
        fn contains_upload(value: &InputValue) -> bool {
            match value {
                InputValue::Json(_) => false,
                InputValue::Upload(_) => true,
                InputValue::List(values) => values.iter().any(contains_upload),
                InputValue::Object(fields) => fields.values().any(contains_upload),
            }
        }
        self.variables.values().any(contains_upload)
    }

    /// Hex encoded SHA-256 of the document, computed once per operation.
    pub fn document_hash(&self) -> &str {
        self.hash
            .get_or_init(|| calculate_hash_for_query(&self.document))
    }

    /// The wire request for this operation, with files replaced by `null`.
    ///
    /// The document text is left out when the context's HTTP options say so.
    pub fn to_request(&self) -> (graphql::Request, Vec<ExtractedFile>) {
        let (variables, files) = extract_files(&self.variables);
        let query = self
            .context
            .http()
            .include_query
            .then(|| self.document.to_string());
        let request = graphql::Request::builder()
            .and_query(query)
            .and_operation_name(self.operation_name.clone())
            .variables(variables)
            .extensions(self.extensions.clone())
            .build();
        (request, files)
    }

    /// Variables as JSON, files rendered as `null`. Used for logging.
    pub fn json_variables(&self) -> Object {
        extract_files(&self.variables).0
    }
}

pub(crate) fn calculate_hash_for_query(query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    hex::encode(hasher.finalize())
}

/// Find the kind of the operation named `name`, or of the first operation.
///
/// A document that cannot be parsed counts as a query; the API reports the
/// syntax error.
fn operation_kind(document: &str, name: Option<&str>) -> OperationKind {
    let tree = apollo_parser::Parser::new(document).parse();
    let document = tree.document();
    let kinds: Vec<(Option<String>, OperationKind)> = document
        .definitions()
        .filter_map(|definition| match definition {
            cst::Definition::OperationDefinition(operation) => {
                let operation_name = operation.name().map(|n| n.text().to_string());
                let kind = operation
                    .operation_type()
                    .and_then(|op| {
                        op.query_token()
                            .map(|_| OperationKind::Query)
                            .or_else(|| op.mutation_token().map(|_| OperationKind::Mutation))
                            .or_else(|| {
                                op.subscription_token()
                                    .map(|_| OperationKind::Subscription)
                            })
                    })
                    .unwrap_or(OperationKind::Query);
                Some((operation_name, kind))
            }
            _ => None,
        })
        .collect();

    // An unmatched name falls back to the first operation, like the main
    // definition lookup of the web client.
    name.and_then(|name| {
        kinds
            .iter()
            .find(|(operation_name, _)| operation_name.as_deref() == Some(name))
    })
    .or_else(|| kinds.first())
    .map(|(_, kind)| *kind)
    .unwrap_or_default()
}
