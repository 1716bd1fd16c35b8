//! `multipart/form-data` bodies following the GraphQL multipart request
//! convention: an `operations` part, a `map` part, then one part per file.

use bytes::Bytes;
use bytes::BytesMut;
use futures::Stream;
use http::HeaderValue;
use indexmap::IndexMap;
use mediatype::names::BOUNDARY;
use mediatype::names::FORM_DATA;
use mediatype::names::MULTIPART;
use mediatype::MediaType;
use rand::RngCore;

use crate::error::FetchError;
use crate::graphql;
use crate::operation::ExtractedFile;
use crate::operation::Upload;

#[derive(Clone, Debug)]
pub(crate) struct MultipartFormData {
    boundary: String,
    operations: Bytes,
    /// File part name to the variable paths it fills.
    map: IndexMap<String, Vec<String>>,
    files: Vec<(String, Upload)>,
}

impl MultipartFormData {
    /// File parts are named `1`, `2`, ... in the order the files were found.
    pub(crate) fn new(
        request: &graphql::Request,
        files: Vec<ExtractedFile>,
    ) -> Result<Self, FetchError> {
        let boundary = format!("{:016x}", rand::rng().next_u64());
        let operations = serde_json::to_vec(request).map_err(|error| {
            FetchError::MalformedRequest {
                reason: error.to_string(),
            }
        })?;

        let mut map = IndexMap::with_capacity(files.len());
        let mut parts = Vec::with_capacity(files.len());
        for (index, file) in files.into_iter().enumerate() {
            let name = (index + 1).to_string();
            map.insert(name.clone(), file.paths);
            parts.push((name, file.upload));
        }

        Ok(Self {
            boundary,
            operations: Bytes::from(operations),
            map,
            files: parts,
        })
    }

    pub(crate) fn content_type(&self) -> Result<HeaderValue, FetchError> {
        let malformed = || FetchError::MalformedRequest {
            reason: format!("invalid multipart boundary '{}'", self.boundary),
        };
        let boundary = mediatype::Value::new(&self.boundary).ok_or_else(malformed)?;
        let params = [(BOUNDARY, boundary)];
        let mime = MediaType::from_parts(MULTIPART, FORM_DATA, None, &params);
        HeaderValue::try_from(mime.to_string()).map_err(|_| malformed())
    }

    /// The body as a stream of chunks. File contents are not copied.
    pub(crate) fn into_stream(
        self,
    ) -> Result<
        impl Stream<Item = Result<Bytes, std::io::Error>> + Send + Sync + 'static,
        FetchError,
    > {
        let map = serde_json::to_string(&self.map).map_err(|error| {
            FetchError::MalformedRequest {
                reason: error.to_string(),
            }
        })?;
        let field_prefix = |name: &str| {
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n",
                self.boundary, name
            )
        };

        let mut chunks = vec![
            Bytes::from(field_prefix("operations")),
            self.operations.clone(),
            Bytes::from(format!("\r\n{}{}", field_prefix("map"), map)),
        ];
        for (name, upload) in &self.files {
            let mut prefix = BytesMut::new();
            prefix.extend_from_slice(b"\r\n--");
            prefix.extend_from_slice(self.boundary.as_bytes());
            prefix.extend_from_slice(
                format!(
                    "\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    name,
                    escape_filename(&upload.filename)
                )
                .as_bytes(),
            );
            prefix.extend_from_slice(
                format!("Content-Type: {}\r\n\r\n", upload.content_type).as_bytes(),
            );
            chunks.push(prefix.freeze());
            chunks.push(upload.content.clone());
        }
        chunks.push(Bytes::from(format!("\r\n--{}--\r\n", self.boundary)));

        Ok(futures::stream::iter(chunks.into_iter().map(Ok)))
    }
}

fn escape_filename(filename: &str) -> String {
    filename
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
