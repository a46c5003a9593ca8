use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;

use crate::error::FetchError;
use crate::graphql::Error;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;

/// A GraphQL response envelope.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Response {
    /// The response data.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,

    /// The optional graphql errors encountered.
    #[serde(
        skip_serializing_if = "Vec::is_empty",
        default,
        deserialize_with = "deserialize_null_default"
    )]
    pub errors: Vec<Error>,

    /// The optional graphql extensions.
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

    /// Decodes a response body.
    ///
    /// The HTTP status is only reported when the body is not a GraphQL
    /// envelope: servers may answer with a non-2xx status and a regular
    /// `errors` array.
    pub(crate) fn from_bytes(status: u16, body: Bytes) -> Result<Response, FetchError> {
        serde_json::from_slice(&body).map_err(|error| FetchError::MalformedResponse {
            status,
            reason: error.to_string(),
        })
    }

    /// The `data` object, if any.
    pub fn data_object(&self) -> Option<&Object> {
        self.data.as_ref().and_then(Value::as_object)
    }

    /// The value at `path` in `data`, e.g. `createDevice/result/id`.
    pub fn data_at(&self, path: impl Into<Path>) -> Option<&Value> {
        self.data.as_ref()?.get_path(&path.into())
    }

    /// Whether the response carries GraphQL errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Joins all error messages into a single string suited for a banner.
    pub fn error_feedback(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        Some(
            self.errors
                .iter()
                .map(|error| error.message.as_str())
                .collect::<Vec<_>>()
                .join(". \n"),
        )
    }

    /// Errors reported on an input field, for inline display.
    pub fn field_errors<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a Error> + 'a {
        self.errors
            .iter()
            .filter(move |error| error.fields.iter().any(|f| f == field))
    }
}
