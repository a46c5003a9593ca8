//! Types related to GraphQL requests, responses, etc.

mod request;
mod response;

use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;
use serde_json_bytes::Value;

pub use request::Request;
pub use response::Response;

use crate::json_ext::Object;
use crate::json_ext::Path;

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
/// The error location
pub struct Location {
    /// The line number
    pub line: u32,
    /// The column number
    pub column: u32,
}

/// A GraphQL error as found in the `errors` field of a [`Response`].
///
/// Besides the fields of the GraphQL specification, the Edgehog backend
/// reports a machine readable `code`, the input `fields` the error refers to
/// and a `short_message`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct Error {
    /// The error message.
    pub message: String,

    /// The locations of the error in the GraphQL document of the originating request.
    #[serde(
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "deserialize_locations"
    )]
    pub locations: Vec<Location>,

    /// If this is a field error, the JSON path to that field in [`Response::data`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Path>,

    /// The error code, e.g. `invalid_attribute`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub code: String,

    /// The input fields the error refers to.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,

    /// A short version of the message, without the field name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_message: Option<String>,

    /// The optional GraphQL extensions for this error.
    #[serde(skip_serializing_if = "Object::is_empty")]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl Error {
    /// Returns a builder that builds a GraphQL [`Error`] from its components.
    ///
    /// Builder methods:
    ///
    /// * `.message(impl Into<`[`String`]`>)`
    ///   Required.
    ///   Sets [`Error::message`].
    ///
    /// * `.locations(impl Into<`[`Vec`]`<`[`Location`]`>>)`
    ///   Optional.
    ///   Sets the entire `Vec` of [`Error::locations`], which defaults to the empty.
    ///
    /// * `.path(impl Into<`[`Path`]`>)`
    ///   Optional.
    ///   Sets [`Error::path`].
    ///
    /// * `.code(impl Into<`[`String`]`>)`
    ///   Optional.
    ///   Sets [`Error::code`], and the "code" extension unless already present.
    ///
    /// * `.fields(impl Into<`[`Vec`]`<`[`String`]`>>)`
    ///   Optional.
    ///   Sets [`Error::fields`].
    ///
    /// * `.short_message(impl Into<`[`String`]`>)`
    ///   Optional.
    ///   Sets [`Error::short_message`].
    ///
    /// * `.extensions(impl Into<`[`serde_json_bytes::Map`]`<`[`ByteString`]`, `[`Value`]`>>)`
    ///   Optional.
    ///   Sets the entire [`Error::extensions`] map, which defaults to empty.
    ///
    /// * `.build()`
    ///   Finishes the builder and returns a GraphQL [`Error`].
    #[builder(visibility = "pub")]
    fn new(
        message: String,
        locations: Vec<Location>,
        path: Option<Path>,
        code: Option<String>,
        fields: Vec<String>,
        short_message: Option<String>,
        // Skip the `Object` type alias in order to use buildstructor's map special-casing
        mut extensions: JsonMap<ByteString, Value>,
    ) -> Self {
        if let Some(code) = &code {
            extensions
                .entry("code")
                .or_insert(Value::String(ByteString::from(code.as_str())));
        }
        Self {
            message,
            locations,
            path,
            code: code.unwrap_or_default(),
            fields,
            short_message,
            extensions,
        }
    }

    /// The error code, from the `code` field or else from the extensions.
    pub fn error_code(&self) -> Option<String> {
        if !self.code.is_empty() {
            return Some(self.code.clone());
        }
        self.extensions.get("code").and_then(|c| match c {
            Value::String(s) => Some(s.as_str().to_owned()),
            Value::Number(n) => Some(n.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) | Value::Bool(_) => None,
        })
    }
}

/// GraphQL spec require that both "line" and "column" are positive numbers.
/// Some servers return `{ "line": -1, "column": -1 }` when they can't locate
/// the error inside the query; such locations are dropped.
fn deserialize_locations<'de, D>(deserializer: D) -> Result<Vec<Location>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct RawLocation {
        line: i64,
        column: i64,
    }

    let raw = <Option<Vec<RawLocation>>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|location| {
            Some(Location {
                line: u32::try_from(location.line).ok()?,
                column: u32::try_from(location.column).ok()?,
            })
        })
        .collect())
}

/// Displays (only) the error message.
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.message.fmt(f)
    }
}

/// Trait used to get extension type from an error
pub(crate) trait ErrorExtension
where
    Self: Sized,
{
    fn extension_code(&self) -> String;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn deserializes_backend_error() {
        let error: Error = serde_json::from_value(json!({
            "message": "name has already been taken",
            "code": "invalid_attribute",
            "path": ["createHardwareType", "result"],
            "fields": ["name"],
            "short_message": "has already been taken",
            "locations": [{"line": 2, "column": 3}]
        }))
        .unwrap();

        assert_eq!(
            error,
            Error::builder()
                .message("name has already been taken")
                .code("invalid_attribute")
                .path(Path::from("createHardwareType/result"))
                .fields(vec!["name".to_string()])
                .short_message("has already been taken")
                .locations(vec![Location { line: 2, column: 3 }])
                .build()
                .without_code_extension()
        );
        assert_eq!(error.error_code().as_deref(), Some("invalid_attribute"));
    }

    #[test]
    fn drops_invalid_locations() {
        let error: Error = serde_json::from_value(json!({
            "message": "boom",
            "locations": [{"line": -1, "column": -1}, {"line": 1, "column": 4}]
        }))
        .unwrap();

        assert_eq!(error.locations, vec![Location { line: 1, column: 4 }]);
        assert_eq!(error.fields, Vec::<String>::new());
        assert_eq!(error.error_code(), None);
    }

    #[test]
    fn code_falls_back_to_extensions() {
        let error: Error = serde_json::from_value(json!({
            "message": "forbidden",
            "extensions": {"code": "FORBIDDEN"}
        }))
        .unwrap();

        assert_eq!(error.error_code().as_deref(), Some("FORBIDDEN"));
    }

    impl Error {
        fn without_code_extension(mut self) -> Self {
            self.extensions.remove("code");
            self
        }
    }
}
