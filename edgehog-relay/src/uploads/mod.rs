//! Extraction of file uploads from GraphQL variables.
//!
//! Variables are a tree that may hold [`Upload`] leaves. Before sending, the
//! tree is walked by [`extract`]: every upload is replaced by a placeholder
//! string (its own key) and collected in an [`UploadableMap`] under that key.
//! The transport sends a multipart request when, and only when, the map is
//! present.

mod upload;

use indexmap::IndexMap;
use serde_json_bytes::ByteString;

pub use self::upload::Upload;
pub use self::upload::UploadError;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// GraphQL variables that may hold file uploads.
pub type Variables = IndexMap<String, VariableValue>;

/// Files extracted from a variables tree, keyed by placeholder.
pub type UploadableMap = IndexMap<String, Upload>;

/// A value in a [`Variables`] tree.
#[derive(Clone, Debug, PartialEq)]
pub enum VariableValue {
    /// Plain JSON, which never holds uploads.
    Json(Value),

    /// A nested input object.
    Object(Variables),

    /// A list of values.
    List(Vec<VariableValue>),

    /// A file to be sent as a multipart field.
    Upload(Upload),
}

impl From<Value> for VariableValue {
    fn from(value: Value) -> Self {
        VariableValue::Json(value)
    }
}

impl From<Upload> for VariableValue {
    fn from(upload: Upload) -> Self {
        VariableValue::Upload(upload)
    }
}

impl From<Variables> for VariableValue {
    fn from(object: Variables) -> Self {
        VariableValue::Object(object)
    }
}

impl From<Vec<VariableValue>> for VariableValue {
    fn from(list: Vec<VariableValue>) -> Self {
        VariableValue::List(list)
    }
}

/// Builds upload-free variables from a JSON object.
pub fn variables_from_object(object: &Object) -> Variables {
    object
        .iter()
        .map(|(key, value)| (key.as_str().to_string(), VariableValue::Json(value.clone())))
        .collect()
}

/// The result of [`extract`].
#[derive(Clone, Debug, PartialEq)]
pub struct Extracted {
    /// The variables, with each upload replaced by its placeholder key.
    pub variables: Object,

    /// The extracted files, `None` when the tree held no upload.
    pub uploadables: Option<UploadableMap>,
}

/// Replaces every upload in `variables` with its key and collects the files.
///
/// Uploads in nested objects are collected under their own key, so two
/// uploads with the same key at different depths collide and the later one
/// wins. Uploads inside lists are keyed by their index.
pub fn extract(variables: &Variables) -> Extracted {
    let mut uploadables: Option<UploadableMap> = None;
    let variables = extract_object(variables, &mut uploadables);
    Extracted {
        variables,
        uploadables,
    }
}

fn extract_object(object: &Variables, uploadables: &mut Option<UploadableMap>) -> Object {
    let mut output = Object::new();
    for (key, value) in object {
        let value = extract_value(key, value, uploadables);
        output.insert(ByteString::from(key.as_str()), value);
    }
    output
}

fn extract_value(
    key: &str,
    value: &VariableValue,
    uploadables: &mut Option<UploadableMap>,
) -> Value {
    match value {
        VariableValue::Json(value) => value.clone(),
        VariableValue::Upload(upload) => {
            uploadables
                .get_or_insert_with(IndexMap::new)
                .insert(key.to_string(), upload.clone());
            Value::String(ByteString::from(key))
        }
        VariableValue::Object(object) => Value::Object(extract_object(object, uploadables)),
        VariableValue::List(list) => Value::Array(
            list.iter()
                .enumerate()
                .map(|(index, value)| extract_value(&index.to_string(), value, uploadables))
                .collect(),
        ),
    }
}
