//! Normalized client-side record store.
//!
//! Records are keyed by a stable [`RecordId`]: objects carrying an `id` are
//! stored under it, so the same entity fetched by different queries is a
//! single record. Other objects get a client id derived from their parent
//! and field. The root record aggregates top-level query fields.
//!
//! Connections follow the cursor pagination convention: a connection record
//! holds an ordered `edges` list, each edge record links its `node`.

mod normalize;
mod patch;

use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;

pub use self::patch::EdgePosition;
pub use self::patch::StorePatch;
use crate::json_ext::Object;
use crate::json_ext::Value;

const ROOT_ID: &str = "client:root";
const MUTATION_ROOT_ID: &str = "client:mutation";
const CLIENT_PREFIX: &str = "client:";

pub(crate) const EDGES: &str = "edges";
pub(crate) const NODE: &str = "node";
pub(crate) const CURSOR: &str = "cursor";

/// Identity of a record in the [`Store`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The record holding top-level query fields.
    pub fn root() -> Self {
        Self(ROOT_ID.to_string())
    }

    /// The record holding top-level mutation payloads.
    pub fn mutation_root() -> Self {
        Self(MUTATION_ROOT_ID.to_string())
    }

    /// The id of an object without identity, nested under `parent`.
    pub fn client(parent: &RecordId, key: &str) -> Self {
        if parent.is_client() {
            Self(format!("{}:{key}", parent.0))
        } else {
            Self(format!("{CLIENT_PREFIX}{}:{key}", parent.0))
        }
    }

    pub fn is_client(&self) -> bool {
        self.0.starts_with(CLIENT_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Borrow<str> for RecordId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The key a field is stored under in its record.
///
/// Fields queried with arguments are stored as `name(arg:value,...)`, with
/// arguments sorted by name and values JSON encoded with the keys of nested
/// input objects sorted as well, so the same field
/// queried with different arguments is stored separately. Connections are
/// stored under `__<key>_connection`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn field(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn with_args(name: &str, args: &Object) -> Self {
        if args.is_empty() {
            return Self::field(name);
        }
        let mut args: Vec<(&ByteString, &Value)> = args.iter().collect();
        args.sort_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));
        let args = args
            .into_iter()
            .map(|(key, value)| {
                format!(
                    "{}:{}",
                    key.as_str(),
                    serde_json::to_string(&sorted(value)).unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join(",");
        Self(format!("{name}({args})"))
    }

    /// The storage key of a connection declared with `key`.
    pub fn connection(key: &str) -> Self {
        Self(format!("__{key}_connection"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A copy of `value` with object keys sorted at every depth.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut entries: Vec<(&ByteString, &Value)> = object.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.clone(), sorted(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        _ => value.clone(),
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for StorageKey {
    fn from(name: &str) -> Self {
        Self::field(name)
    }
}

/// A field value in a [`Record`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Field {
    /// A scalar, a list of scalars, or null.
    Scalar(Value),

    /// A link to another record.
    Link(RecordId),

    /// An ordered list of links.
    Links(Vec<RecordId>),
}

impl Field {
    /// The links of a plural field. A null or empty scalar reads as no links.
    fn as_links(&self) -> Option<Vec<RecordId>> {
        match self {
            Field::Links(links) => Some(links.clone()),
            Field::Scalar(Value::Null) => Some(Vec::new()),
            Field::Scalar(Value::Array(values)) if values.is_empty() => Some(Vec::new()),
            Field::Scalar(_) | Field::Link(_) => None,
        }
    }
}

/// A normalized record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    id: RecordId,
    typename: Option<String>,
    fields: IndexMap<StorageKey, Field>,
    stale: bool,
}

impl Record {
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            typename: None,
            fields: IndexMap::new(),
            stale: false,
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn typename(&self) -> Option<&str> {
        self.typename.as_deref()
    }

    pub fn field(&self, key: &StorageKey) -> Option<&Field> {
        self.fields.get(key)
    }

    pub fn has_field(&self, key: &StorageKey) -> bool {
        self.fields.contains_key(key)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&StorageKey, &Field)> {
        self.fields.iter()
    }

    /// The scalar value of a field.
    pub fn value(&self, key: &StorageKey) -> Option<&Value> {
        match self.fields.get(key)? {
            Field::Scalar(value) => Some(value),
            Field::Link(_) | Field::Links(_) => None,
        }
    }

    pub fn linked_record(&self, key: &StorageKey) -> Option<&RecordId> {
        match self.fields.get(key)? {
            Field::Link(id) => Some(id),
            Field::Scalar(_) | Field::Links(_) => None,
        }
    }

    pub fn linked_records(&self, key: &StorageKey) -> Option<&[RecordId]> {
        match self.fields.get(key)? {
            Field::Links(ids) => Some(ids),
            Field::Scalar(_) | Field::Link(_) => None,
        }
    }

    pub fn set_field(&mut self, key: StorageKey, field: Field) {
        self.fields.insert(key, field);
    }

    /// Whether the record was invalidated since it was last published.
    pub fn is_stale(&self) -> bool {
        self.stale
    }
}

/// The normalized store: records keyed by [`RecordId`].
///
/// The root record always exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Store {
    records: IndexMap<RecordId, Record>,
    generation: u64,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        let mut records = IndexMap::new();
        records.insert(RecordId::root(), Record::new(RecordId::root()));
        Self {
            records,
            generation: 0,
        }
    }

    /// Incremented by every [`reset`](Self::reset). Responses to requests
    /// issued in an earlier generation must not be published.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn root(&self) -> Option<&Record> {
        self.records.get(ROOT_ID)
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &RecordId) -> Option<&mut Record> {
        self.records.get_mut(id)
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.len() <= 1
            && self
                .root()
                .map(|root| root.fields.is_empty())
                .unwrap_or(true)
    }

    /// Removes a record. Links pointing at it are left in place and resolve
    /// to nothing. The root record cannot be deleted.
    pub fn delete(&mut self, id: &RecordId) -> Option<Record> {
        if id.as_str() == ROOT_ID {
            return None;
        }
        self.records.shift_remove(id)
    }

    /// Marks a record as stale, so that views holding it refetch.
    pub fn invalidate(&mut self, id: &RecordId) -> bool {
        match self.records.get_mut(id) {
            Some(record) => {
                record.stale = true;
                true
            }
            None => false,
        }
    }

    pub fn is_stale(&self, id: &RecordId) -> bool {
        self.records.get(id).map(Record::is_stale).unwrap_or(false)
    }

    /// Drops every record, e.g. on logout, and starts a new generation.
    pub fn reset(&mut self) {
        tracing::debug!(records = self.records.len(), "resetting store");
        let generation = self.generation + 1;
        *self = Self::new();
        self.generation = generation;
    }

    /// The node ids of the connection stored on `parent` under `key`.
    pub fn connection_nodes(&self, parent: &RecordId, key: &StorageKey) -> Option<Vec<RecordId>> {
        let connection = self.get(parent)?.linked_record(key)?;
        let edges = self.get(connection)?.field(&StorageKey::field(EDGES))?.as_links()?;
        Some(
            edges
                .iter()
                .filter_map(|edge| self.get(edge)?.linked_record(&StorageKey::field(NODE)))
                .cloned()
                .collect(),
        )
    }

    /// Reads a record back as JSON, following links.
    ///
    /// A record already being expanded higher in the tree is rendered as
    /// `{"id": ...}` so back-references terminate; links to deleted records
    /// read as null.
    pub fn lookup(&self, id: &RecordId) -> Option<Value> {
        let mut visiting = HashSet::new();
        self.records.get(id)?;
        Some(self.lookup_record(id, &mut visiting))
    }

    fn lookup_record(&self, id: &RecordId, visiting: &mut HashSet<RecordId>) -> Value {
        let Some(record) = self.records.get(id) else {
            return Value::Null;
        };
        if !visiting.insert(id.clone()) {
            let mut object = Object::new();
            object.insert(ByteString::from("id"), Value::String(id.as_str().into()));
            return Value::Object(object);
        }
        let mut object = Object::new();
        for (key, field) in record.fields.iter() {
            let value = match field {
                Field::Scalar(value) => value.clone(),
                Field::Link(link) => self.lookup_record(link, visiting),
                Field::Links(links) => Value::Array(
                    links
                        .iter()
                        .map(|link| self.lookup_record(link, visiting))
                        .collect(),
                ),
            };
            object.insert(ByteString::from(key.as_str()), value);
        }
        visiting.remove(id);
        Value::Object(object)
    }
}
