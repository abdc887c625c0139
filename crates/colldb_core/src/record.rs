//! Record, tombstone and archive snapshot types.
//!
//! Stored documents carry four bookkeeping fields next to the
//! collection-specific ones: `_id`, `_v`, `__created` and `__updated`.

use crate::clock::Timestamp;
use crate::error::CoreResult;
use colldb_store::{field, Document};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Primary key field.
pub const ID_KEY: &str = "_id";
/// Schema version field.
pub const VERSION_KEY: &str = "_v";
/// Creation timestamp field.
pub const CREATED_KEY: &str = "__created";
/// Last-write timestamp field.
pub const UPDATED_KEY: &str = "__updated";
/// Flag that turns the next write into a cascading hard delete.
pub const HARD_DELETE_KEY: &str = "__hardDelete";
/// Tombstone field naming the collection the record was deleted from.
pub const COLLECTION_NAME_KEY: &str = "__collectionName";
/// Archive snapshot field pointing at the live record.
pub const ORIGIN_DOC_ID_KEY: &str = "originDocId";

/// Fields that patch operations may never modify.
pub const DEFAULT_LOCK_KEYS: [&str; 4] = [ID_KEY, VERSION_KEY, CREATED_KEY, UPDATED_KEY];

/// Length of generated ids (hex characters).
pub const ID_LENGTH: usize = 32;

/// Generates a fresh record id: 32 lowercase hex characters.
#[must_use]
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Path of the archive sub-collection holding a record's snapshots.
#[must_use]
pub fn archive_collection(collection: &str, id: &str) -> String {
    format!("{collection}/{id}/_archived")
}

/// A live record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Primary key.
    #[serde(rename = "_id")]
    pub id: String,
    /// Schema version tag. Empty for records written before versioning.
    #[serde(rename = "_v", default)]
    pub version: String,
    /// First write time. Immutable.
    #[serde(rename = "__created", default)]
    pub created_at: Timestamp,
    /// Last write time.
    #[serde(rename = "__updated", default)]
    pub updated_at: Timestamp,
    /// Collection-specific fields.
    #[serde(flatten)]
    pub fields: Document,
}

impl Record {
    /// Parses a stored document.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if `_id` is missing or a bookkeeping
    /// field has the wrong type.
    pub fn from_document(document: Document) -> CoreResult<Self> {
        Ok(serde_json::from_value(Value::Object(document))?)
    }

    /// Renders the record as a stored document.
    #[must_use]
    pub fn to_document(&self) -> Document {
        self.clone().into_document()
    }

    /// Renders the record as a stored document, consuming it.
    #[must_use]
    pub fn into_document(self) -> Document {
        let mut document = self.fields;
        document.insert(ID_KEY.into(), Value::String(self.id));
        document.insert(VERSION_KEY.into(), Value::String(self.version));
        document.insert(CREATED_KEY.into(), Value::from(self.created_at));
        document.insert(UPDATED_KEY.into(), Value::from(self.updated_at));
        document
    }

    /// Reads any field, bookkeeping fields included.
    #[must_use]
    pub fn value_of(&self, key: &str) -> Option<Value> {
        match key {
            ID_KEY => Some(Value::String(self.id.clone())),
            VERSION_KEY => Some(Value::String(self.version.clone())),
            CREATED_KEY => Some(Value::from(self.created_at)),
            UPDATED_KEY => Some(Value::from(self.updated_at)),
            _ => field(&self.fields, key).cloned(),
        }
    }

    /// Returns true if the record is flagged for hard deletion.
    #[must_use]
    pub fn is_hard_delete(&self) -> bool {
        self.fields
            .get(HARD_DELETE_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Minimal projection of a deleted record, kept for incremental sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tombstone {
    /// Id of the deleted record.
    #[serde(rename = "_id")]
    pub id: String,
    /// Version of the deleted record.
    #[serde(rename = "_v", default)]
    pub version: String,
    /// Creation time of the deleted record.
    #[serde(rename = "__created", default)]
    pub created_at: Timestamp,
    /// Delete time.
    #[serde(rename = "__updated")]
    pub updated_at: Timestamp,
    /// Collection the record was deleted from.
    #[serde(rename = "__collectionName")]
    pub collection_name: String,
    /// Values of the collection's unique-key fields.
    #[serde(flatten)]
    pub unique_fields: Document,
}

impl Tombstone {
    /// Projects a record to its tombstone.
    #[must_use]
    pub fn project(
        record: &Record,
        collection: &str,
        unique_keys: &[String],
        deleted_at: Timestamp,
    ) -> Self {
        let unique_fields = unique_keys
            .iter()
            .filter(|k| !DEFAULT_LOCK_KEYS.contains(&k.as_str()))
            .filter_map(|k| record.value_of(k).map(|v| (k.clone(), v)))
            .collect();
        Self {
            id: record.id.clone(),
            version: record.version.clone(),
            created_at: record.created_at,
            updated_at: deleted_at,
            collection_name: collection.to_string(),
            unique_fields,
        }
    }

    /// Parses a stored tombstone.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if a required field is missing.
    pub fn from_document(document: Document) -> CoreResult<Self> {
        Ok(serde_json::from_value(Value::Object(document))?)
    }

    /// Renders the tombstone as a stored document.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the unique fields cannot be encoded.
    pub fn to_document(&self) -> CoreResult<Document> {
        match serde_json::to_value(self)? {
            Value::Object(document) => Ok(document),
            other => Err(crate::error::CoreError::unexpected(format!(
                "tombstone serialized to {other}"
            ))),
        }
    }
}

/// A deep copy of a record, taken before it aged out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedSnapshot {
    /// Snapshot id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Snapshot time.
    #[serde(rename = "__created")]
    pub created_at: Timestamp,
    /// Snapshot time.
    #[serde(rename = "__updated")]
    pub updated_at: Timestamp,
    /// Id of the record this snapshot was taken from.
    #[serde(rename = "originDocId")]
    pub origin_doc_id: String,
    /// Copied record content, version included.
    #[serde(flatten)]
    pub data: Document,
}

impl ArchivedSnapshot {
    /// Copies a record into a new snapshot, dropping internal fields.
    #[must_use]
    pub fn capture(record: &Record, strip: &[String], now: Timestamp) -> Self {
        let mut data = record.fields.clone();
        for key in [HARD_DELETE_KEY, ORIGIN_DOC_ID_KEY, ID_KEY, CREATED_KEY, UPDATED_KEY] {
            data.remove(key);
        }
        for key in strip {
            data.remove(key);
        }
        data.insert(VERSION_KEY.into(), Value::String(record.version.clone()));
        Self {
            id: generate_id(),
            created_at: now,
            updated_at: now,
            origin_doc_id: record.id.clone(),
            data,
        }
    }

    /// Parses a stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if a required field is missing.
    pub fn from_document(document: Document) -> CoreResult<Self> {
        Ok(serde_json::from_value(Value::Object(document))?)
    }

    /// Renders the snapshot as a stored document.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut document = self.data.clone();
        document.insert(ID_KEY.into(), Value::String(self.id.clone()));
        document.insert(CREATED_KEY.into(), Value::from(self.created_at));
        document.insert(UPDATED_KEY.into(), Value::from(self.updated_at));
        document.insert(
            ORIGIN_DOC_ID_KEY.into(),
            Value::String(self.origin_doc_id.clone()),
        );
        document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Record {
        Record::from_document(
            json!({
                "_id": "r1", "_v": "2", "__created": 10, "__updated": 20,
                "email": "a@b.c", "name": "Alice", "__hardDelete": true
            })
            .as_object()
            .cloned()
            .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn generated_ids_are_fixed_length_hex() {
        let id = generate_id();
        assert_eq!(id.len(), ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(id, generate_id());
    }

    #[test]
    fn document_roundtrip_keeps_bookkeeping() {
        let r = record();
        assert_eq!(r.id, "r1");
        assert_eq!(r.version, "2");
        assert_eq!(r.fields.get("name"), Some(&json!("Alice")));
        assert!(!r.fields.contains_key(ID_KEY));

        let doc = r.to_document();
        assert_eq!(doc[UPDATED_KEY], json!(20));
        assert_eq!(Record::from_document(doc).unwrap(), r);
    }

    #[test]
    fn missing_version_parses_as_empty() {
        let r = Record::from_document(json!({"_id": "x"}).as_object().cloned().unwrap()).unwrap();
        assert_eq!(r.version, "");
        assert_eq!(r.created_at, 0);
    }

    #[test]
    fn tombstone_keeps_unique_fields_only() {
        let t = Tombstone::project(&record(), "users", &["_id".into(), "email".into()], 99);
        assert_eq!(t.updated_at, 99);
        assert_eq!(t.created_at, 10);
        assert_eq!(t.unique_fields.len(), 1);
        let doc = t.to_document().unwrap();
        assert_eq!(doc[COLLECTION_NAME_KEY], json!("users"));
        assert_eq!(doc["email"], json!("a@b.c"));
        assert!(!doc.contains_key("name"));
        assert_eq!(Tombstone::from_document(doc).unwrap(), t);
    }

    #[test]
    fn snapshot_strips_internal_fields() {
        let s = ArchivedSnapshot::capture(&record(), &["email".into()], 500);
        assert_eq!(s.origin_doc_id, "r1");
        assert_ne!(s.id, "r1");
        assert_eq!(s.created_at, 500);
        assert!(!s.data.contains_key(HARD_DELETE_KEY));
        assert!(!s.data.contains_key("email"));
        assert_eq!(s.data[VERSION_KEY], json!("2"));
        assert_eq!(
            ArchivedSnapshot::from_document(s.to_document()).unwrap(),
            s
        );
    }

    #[test]
    fn archive_path_is_per_record() {
        assert_eq!(archive_collection("users", "r1"), "users/r1/_archived");
    }
}
