use indexmap::IndexMap;

use crate::store::StorageKey;
use crate::uploads::VariableValue;
use crate::uploads::Variables;

/// A GraphQL operation (query or mutation) as sent to the backend.
///
/// Variables may hold [`Upload`](crate::uploads::Upload)s, in which case the
/// transport switches to a multipart encoding.
#[derive(Clone, Debug, Default, PartialEq)]
#[non_exhaustive]
pub struct Request {
    /// The GraphQL document text.
    pub query: String,

    /// The (optional) GraphQL operation name.
    pub operation_name: Option<String>,

    /// The GraphQL variables, possibly holding file uploads.
    pub variables: Variables,

    /// Storage keys of response fields by response path, used when
    /// publishing the response into the store. A path joins response keys
    /// with `/` and leaves list indexes out: `device/otaOperations` applies
    /// to the field of the device, and `devices/otaOperations` to the field
    /// of every device in the list. Fields not listed are stored under their
    /// response key.
    pub storage_keys: IndexMap<String, StorageKey>,
}

impl Request {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_operation_name(mut self, operation_name: impl Into<String>) -> Self {
        self.operation_name = Some(operation_name.into());
        self
    }

    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<VariableValue>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Stores the response field at `path` under `storage_key`.
    pub fn with_storage_key(
        mut self,
        path: impl Into<String>,
        storage_key: impl Into<StorageKey>,
    ) -> Self {
        self.storage_keys.insert(path.into(), storage_key.into());
        self
    }

    /// The storage key for the response field at `path`.
    pub fn storage_key(&self, path: &str) -> StorageKey {
        self.storage_keys.get(path).cloned().unwrap_or_else(|| {
            StorageKey::field(path.rsplit('/').next().unwrap_or(path))
        })
    }
}
