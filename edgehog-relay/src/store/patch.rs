use serde::Deserialize;
use serde::Serialize;

use super::Field;
use super::Record;
use super::RecordId;
use super::StorageKey;
use super::Store;
use super::CURSOR;
use super::EDGES;
use super::NODE;
use crate::json_ext::Value;

/// Where a new edge is spliced into a connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgePosition {
    /// Newest first.
    #[default]
    Before,

    /// Oldest first.
    After,
}

/// A change to cached data, returned by mutation handlers.
///
/// Patches targeting a record or field that is not in the store are ignored:
/// they never create the field.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum StorePatch {
    /// Adds an edge wrapping `node` to the connection stored on `parent`.
    InsertEdge {
        parent: RecordId,
        connection: StorageKey,
        node: RecordId,
        position: EdgePosition,
    },

    /// Removes every edge wrapping `node` from a connection.
    RemoveEdge {
        parent: RecordId,
        connection: StorageKey,
        node: RecordId,
    },

    /// Adds `node` at the end of a plural field.
    AppendLink {
        parent: RecordId,
        field: StorageKey,
        node: RecordId,
    },

    /// Adds `node` at the start of a plural field.
    PrependLink {
        parent: RecordId,
        field: StorageKey,
        node: RecordId,
    },

    /// Removes `node` from a plural field.
    RemoveLink {
        parent: RecordId,
        field: StorageKey,
        node: RecordId,
    },

    /// Points a singular field at `node`.
    SetLink {
        parent: RecordId,
        field: StorageKey,
        node: RecordId,
    },

    /// Replaces the scalar value of a field.
    UpdateField {
        record: RecordId,
        field: StorageKey,
        value: Value,
    },

    /// Removes a record. References to it are left to other patches.
    DeleteRecord(RecordId),

    /// Marks a record stale until it is published again.
    InvalidateRecord(RecordId),
}

impl StorePatch {
    pub fn insert_edge(parent: RecordId, connection: StorageKey, node: RecordId) -> Self {
        StorePatch::InsertEdge {
            parent,
            connection,
            node,
            position: EdgePosition::default(),
        }
    }

    pub fn remove_edge(parent: RecordId, connection: StorageKey, node: RecordId) -> Self {
        StorePatch::RemoveEdge {
            parent,
            connection,
            node,
        }
    }
}

impl Store {
    /// Applies a patch, returning whether it changed the store.
    pub fn apply(&mut self, patch: &StorePatch) -> bool {
        let applied = match patch {
            StorePatch::InsertEdge {
                parent,
                connection,
                node,
                position,
            } => self.insert_edge(parent, connection, node, *position),
            StorePatch::RemoveEdge {
                parent,
                connection,
                node,
            } => self.remove_edge(parent, connection, node),
            StorePatch::AppendLink {
                parent,
                field,
                node,
            } => self.update_links(parent, field, |links| {
                links.push(node.clone());
                true
            }),
            StorePatch::PrependLink {
                parent,
                field,
                node,
            } => self.update_links(parent, field, |links| {
                links.insert(0, node.clone());
                true
            }),
            StorePatch::RemoveLink {
                parent,
                field,
                node,
            } => self.update_links(parent, field, |links| {
                let len = links.len();
                links.retain(|link| link != node);
                links.len() != len
            }),
            StorePatch::SetLink {
                parent,
                field,
                node,
            } => self.update_field(parent, field, Field::Link(node.clone())),
            StorePatch::UpdateField {
                record,
                field,
                value,
            } => self.update_field(record, field, Field::Scalar(value.clone())),
            StorePatch::DeleteRecord(id) => self.delete(id).is_some(),
            StorePatch::InvalidateRecord(id) => self.invalidate(id),
        };
        if !applied {
            tracing::debug!(?patch, "store patch had no effect");
        }
        applied
    }

    /// Applies patches in order, each independently of the others.
    ///
    /// Returns how many changed the store.
    pub fn apply_all<'a>(&mut self, patches: impl IntoIterator<Item = &'a StorePatch>) -> usize {
        patches
            .into_iter()
            .filter(|patch| self.apply(patch))
            .count()
    }

    fn update_field(&mut self, id: &RecordId, key: &StorageKey, field: Field) -> bool {
        match self.records.get_mut(id) {
            Some(record) if record.has_field(key) => {
                record.set_field(key.clone(), field);
                true
            }
            _ => false,
        }
    }

    fn update_links(
        &mut self,
        id: &RecordId,
        key: &StorageKey,
        update: impl FnOnce(&mut Vec<RecordId>) -> bool,
    ) -> bool {
        let Some(record) = self.records.get_mut(id) else {
            return false;
        };
        let Some(mut links) = record.field(key).and_then(Field::as_links) else {
            return false;
        };
        if !update(&mut links) {
            return false;
        }
        record.set_field(key.clone(), Field::Links(links));
        true
    }

    fn connection_id(&self, parent: &RecordId, connection: &StorageKey) -> Option<RecordId> {
        self.get(parent)?.linked_record(connection).cloned()
    }

    fn edge_node(&self, edge: &RecordId) -> Option<&RecordId> {
        self.get(edge)?.linked_record(&StorageKey::field(NODE))
    }

    fn insert_edge(
        &mut self,
        parent: &RecordId,
        connection: &StorageKey,
        node: &RecordId,
        position: EdgePosition,
    ) -> bool {
        let Some(connection_id) = self.connection_id(parent, connection) else {
            return false;
        };
        if !self.contains(&connection_id) {
            return false;
        }
        let edges_key = StorageKey::field(EDGES);
        let mut edges = self
            .get(&connection_id)
            .and_then(|record| record.field(&edges_key))
            .and_then(Field::as_links)
            .unwrap_or_default();
        if edges
            .iter()
            .any(|edge| self.edge_node(edge) == Some(node))
        {
            return false;
        }

        let edge_id = RecordId::client(&connection_id, &format!("edge:{node}"));
        let mut edge = Record::new(edge_id.clone());
        edge.set_field(StorageKey::field(CURSOR), Field::Scalar(Value::Null));
        edge.set_field(StorageKey::field(NODE), Field::Link(node.clone()));
        self.records.insert(edge_id.clone(), edge);

        match position {
            EdgePosition::Before => edges.insert(0, edge_id),
            EdgePosition::After => edges.push(edge_id),
        }
        if let Some(record) = self.records.get_mut(&connection_id) {
            record.set_field(edges_key, Field::Links(edges));
        }
        true
    }

    fn remove_edge(&mut self, parent: &RecordId, connection: &StorageKey, node: &RecordId) -> bool {
        let Some(connection_id) = self.connection_id(parent, connection) else {
            return false;
        };
        let edges_key = StorageKey::field(EDGES);
        let Some(edges) = self
            .get(&connection_id)
            .and_then(|record| record.field(&edges_key))
            .and_then(Field::as_links)
        else {
            return false;
        };
        let (removed, kept): (Vec<_>, Vec<_>) = edges
            .into_iter()
            .partition(|edge| self.edge_node(edge) == Some(node));
        if removed.is_empty() {
            return false;
        }
        for edge in &removed {
            self.delete(edge);
        }
        if let Some(record) = self.records.get_mut(&connection_id) {
            record.set_field(edges_key, Field::Links(kept));
        }
        true
    }
}
