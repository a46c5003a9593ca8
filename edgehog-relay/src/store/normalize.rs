use indexmap::IndexMap;

use super::Field;
use super::Record;
use super::RecordId;
use super::StorageKey;
use super::Store;
use crate::json_ext::Object;
use crate::json_ext::Value;

const ID: &str = "id";
const TYPENAME: &str = "__typename";

/// Storage keys by response path, see [`crate::graphql::Request::storage_keys`].
type StorageKeys = IndexMap<String, StorageKey>;

impl Store {
    /// Normalizes `data` into the store as fields of `parent`.
    ///
    /// A field is stored under the key found in `storage_keys` for its
    /// response path (`device/otaOperations`, list indexes left out), or
    /// under its response key. Objects with an `id` are merged into the
    /// record of that id, keeping the fields they do not mention; other
    /// objects are stored under a client id derived from their position.
    /// Publishing a record clears its stale mark.
    ///
    /// Returns the ids of the records that were written.
    pub fn publish(
        &mut self,
        parent: &RecordId,
        data: &Object,
        storage_keys: &StorageKeys,
    ) -> Vec<RecordId> {
        let mut touched = Vec::new();
        self.record_mut(parent);
        self.normalize_fields(parent, "", data, storage_keys, &mut touched);
        touched.push(parent.clone());
        tracing::trace!(parent = %parent, records = touched.len(), "published response");
        touched
    }

    fn normalize_fields(
        &mut self,
        id: &RecordId,
        path: &str,
        object: &Object,
        storage_keys: &StorageKeys,
        touched: &mut Vec<RecordId>,
    ) {
        for (name, value) in object.iter() {
            let path = if path.is_empty() {
                name.as_str().to_string()
            } else {
                format!("{path}/{}", name.as_str())
            };
            let key = storage_keys
                .get(&path)
                .cloned()
                .unwrap_or_else(|| StorageKey::field(name.as_str()));
            let field = self.normalize_field(id, &path, &key, value, storage_keys, touched);
            self.record_mut(id).set_field(key, field);
        }
    }

    fn normalize_field(
        &mut self,
        parent: &RecordId,
        path: &str,
        key: &StorageKey,
        value: &Value,
        storage_keys: &StorageKeys,
        touched: &mut Vec<RecordId>,
    ) -> Field {
        match value {
            Value::Object(object) => {
                let id = record_id(object)
                    .unwrap_or_else(|| RecordId::client(parent, key.as_str()));
                self.normalize_object(&id, path, object, storage_keys, touched);
                Field::Link(id)
            }
            Value::Array(items)
                if !items.is_empty() && items.iter().all(|item| item.is_object()) =>
            {
                let links = items
                    .iter()
                    .enumerate()
                    .filter_map(|(index, item)| {
                        let object = item.as_object()?;
                        let id = record_id(object).unwrap_or_else(|| {
                            RecordId::client(parent, &format!("{}:{index}", key.as_str()))
                        });
                        self.normalize_object(&id, path, object, storage_keys, touched);
                        Some(id)
                    })
                    .collect();
                Field::Links(links)
            }
            _ => Field::Scalar(value.clone()),
        }
    }

    fn normalize_object(
        &mut self,
        id: &RecordId,
        path: &str,
        object: &Object,
        storage_keys: &StorageKeys,
        touched: &mut Vec<RecordId>,
    ) {
        {
            let record = self.record_mut(id);
            record.stale = false;
            if let Some(typename) = object.get(TYPENAME).and_then(Value::as_str) {
                record.typename = Some(typename.to_string());
            }
        }
        self.normalize_fields(id, path, object, storage_keys, touched);
        touched.push(id.clone());
    }

    fn record_mut(&mut self, id: &RecordId) -> &mut Record {
        self.records
            .entry(id.clone())
            .or_insert_with(|| Record::new(id.clone()))
    }
}

fn record_id(object: &Object) -> Option<RecordId> {
    match object.get(ID)? {
        Value::String(id) => Some(RecordId::new(id.as_str())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;

    fn publish(store: &mut Store, data: Value) {
        store.publish(
            &RecordId::root(),
            data.as_object().unwrap(),
            &IndexMap::new(),
        );
    }

    #[test]
    fn records_with_id_are_merged() {
        let mut store = Store::new();
        publish(
            &mut store,
            json!({"device": {"__typename": "Device", "id": "device-1", "name": "gw", "online": true}}),
        );
        publish(
            &mut store,
            json!({"devices": [{"id": "device-1", "name": "gateway"}]}),
        );

        let device = store.get(&RecordId::new("device-1")).unwrap();
        assert_eq!(device.typename(), Some("Device"));
        assert_eq!(
            device.value(&StorageKey::field("name")),
            Some(&json!("gateway"))
        );
        assert_eq!(
            device.value(&StorageKey::field("online")),
            Some(&json!(true))
        );
        assert_eq!(
            store
                .root()
                .unwrap()
                .linked_records(&StorageKey::field("devices")),
            Some(&[RecordId::new("device-1")][..])
        );
    }

    #[test]
    fn objects_without_id_get_client_ids() {
        let mut store = Store::new();
        publish(
            &mut store,
            json!({
                "device": {
                    "id": "device-1",
                    "location": {"latitude": 45.0, "longitude": 7.6},
                    "sensors": [{"name": "a"}, {"name": "b"}]
                }
            }),
        );

        let device = store.get(&RecordId::new("device-1")).unwrap();
        assert_eq!(
            device.linked_record(&StorageKey::field("location")),
            Some(&RecordId::new("client:device-1:location"))
        );
        assert_eq!(
            device.linked_records(&StorageKey::field("sensors")),
            Some(
                &[
                    RecordId::new("client:device-1:sensors:0"),
                    RecordId::new("client:device-1:sensors:1")
                ][..]
            )
        );
    }

    #[test]
    fn scalars_and_mixed_lists_are_stored_as_values() {
        let mut store = Store::new();
        publish(
            &mut store,
            json!({"tags": ["a", "b"], "mixed": [{"id": "x"}, 1], "empty": [], "none": null}),
        );

        let root = store.root().unwrap();
        assert_eq!(
            root.value(&StorageKey::field("tags")),
            Some(&json!(["a", "b"]))
        );
        assert_eq!(
            root.value(&StorageKey::field("mixed")),
            Some(&json!([{"id": "x"}, 1]))
        );
        assert_eq!(root.value(&StorageKey::field("empty")), Some(&json!([])));
        assert_eq!(root.value(&StorageKey::field("none")), Some(&Value::Null));
    }

    #[test]
    fn top_level_fields_use_storage_keys() {
        let mut store = Store::new();
        let storage_keys: IndexMap<String, StorageKey> = [(
            "devices".to_string(),
            StorageKey::connection("DevicesTable_devices"),
        )]
        .into_iter()
        .collect();
        store.publish(
            &RecordId::root(),
            json!({
                "devices": {
                    "edges": [
                        {"cursor": "a", "node": {"id": "device-1"}},
                        {"cursor": "b", "node": {"id": "device-2"}}
                    ]
                }
            })
            .as_object()
            .unwrap(),
            &storage_keys,
        );

        assert_eq!(
            store.connection_nodes(
                &RecordId::root(),
                &StorageKey::connection("DevicesTable_devices")
            ),
            Some(vec![RecordId::new("device-1"), RecordId::new("device-2")])
        );
        assert!(!store
            .root()
            .unwrap()
            .has_field(&StorageKey::field("devices")));
    }

    #[test]
    fn publish_clears_stale_mark() {
        let mut store = Store::new();
        publish(&mut store, json!({"device": {"id": "device-1"}}));
        store.invalidate(&RecordId::new("device-1"));

        publish(&mut store, json!({"device": {"id": "device-1", "name": "gw"}}));

        assert!(!store.is_stale(&RecordId::new("device-1")));
    }

    #[test]
    fn nested_fields_use_storage_keys_by_path() {
        let mut store = Store::new();
        let storage_keys: IndexMap<String, StorageKey> = [
            (
                "device/otaOperations".to_string(),
                StorageKey::connection("SoftwareUpdateTab_otaOperations"),
            ),
            (
                "device/stable".to_string(),
                StorageKey::with_args(
                    "updateCampaigns",
                    json!({"channel": "stable"}).as_object().unwrap(),
                ),
            ),
            (
                "device/beta".to_string(),
                StorageKey::with_args(
                    "updateCampaigns",
                    json!({"channel": "beta"}).as_object().unwrap(),
                ),
            ),
        ]
        .into_iter()
        .collect();
        store.publish(
            &RecordId::root(),
            json!({
                "device": {
                    "id": "device-1",
                    "otaOperations": {"edges": [{"node": {"id": "operation-1"}}]},
                    "stable": [{"id": "campaign-1"}],
                    "beta": [{"id": "campaign-2"}]
                }
            })
            .as_object()
            .unwrap(),
            &storage_keys,
        );

        let device = RecordId::new("device-1");
        assert_eq!(
            store.connection_nodes(
                &device,
                &StorageKey::connection("SoftwareUpdateTab_otaOperations")
            ),
            Some(vec![RecordId::new("operation-1")])
        );
        let record = store.get(&device).unwrap();
        assert!(!record.has_field(&StorageKey::field("otaOperations")));
        assert_eq!(
            record.linked_records(&StorageKey::from(r#"updateCampaigns(channel:"stable")"#)),
            Some(&[RecordId::new("campaign-1")][..])
        );
        assert_eq!(
            record.linked_records(&StorageKey::from(r#"updateCampaigns(channel:"beta")"#)),
            Some(&[RecordId::new("campaign-2")][..])
        );
    }

    #[test]
    fn list_items_share_the_path_of_their_field() {
        let mut store = Store::new();
        let storage_keys: IndexMap<String, StorageKey> = [(
            "devices/otaOperations".to_string(),
            StorageKey::connection("DeviceRow_otaOperations"),
        )]
        .into_iter()
        .collect();
        store.publish(
            &RecordId::root(),
            json!({
                "devices": [
                    {"id": "device-1", "otaOperations": {"edges": [{"node": {"id": "operation-1"}}]}},
                    {"id": "device-2", "otaOperations": {"edges": []}}
                ]
            })
            .as_object()
            .unwrap(),
            &storage_keys,
        );

        let connection = StorageKey::connection("DeviceRow_otaOperations");
        assert_eq!(
            store.connection_nodes(&RecordId::new("device-1"), &connection),
            Some(vec![RecordId::new("operation-1")])
        );
        assert_eq!(
            store.connection_nodes(&RecordId::new("device-2"), &connection),
            Some(Vec::new())
        );
    }
}
