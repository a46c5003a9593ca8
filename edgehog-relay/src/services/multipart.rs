use reqwest::multipart::Form;
use reqwest::multipart::Part;

use crate::error::FetchError;
use crate::json_ext::Object;
use crate::uploads::UploadableMap;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Builds the multipart body of an operation carrying files.
///
/// Files come first, each under its placeholder key, followed by the `query`
/// text and the `variables` JSON in which files are replaced by their keys.
pub(crate) fn form(
    query: &str,
    variables: &Object,
    uploadables: &UploadableMap,
) -> Result<Form, FetchError> {
    let mut form = Form::new();
    for (key, upload) in uploadables {
        let part = Part::stream_with_length(
            reqwest::Body::from(upload.content().clone()),
            upload.len() as u64,
        )
        .file_name(upload.file_name().unwrap_or(key).to_string())
        .mime_str(upload.content_type().unwrap_or(DEFAULT_CONTENT_TYPE))
        .map_err(|error| FetchError::MalformedRequest {
            reason: format!("invalid content type for file '{key}': {error}"),
        })?;
        form = form.part(key.clone(), part);
    }

    let variables =
        serde_json::to_string(variables).map_err(|error| FetchError::MalformedRequest {
            reason: error.to_string(),
        })?;
    Ok(form
        .text("query", query.to_string())
        .text("variables", variables))
}
