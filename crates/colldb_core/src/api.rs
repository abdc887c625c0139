//! Per-collection request surface.
//!
//! [`CollectionApi`] exposes one typed method per resource operation, and
//! [`CollectionApi::dispatch`] accepts the same operations as serialized
//! requests and answers with an HTTP-style status and JSON body. Route
//! binding is left to the host.

use crate::engine::{CollectionEngine, SyncResult};
use crate::error::{CoreError, CoreResult};
use crate::migrator::PromotionReport;
use crate::record::{Record, ID_KEY};
use crate::schema::Schema;
use colldb_store::{Document, DocumentStore, Filter, Query};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Target of a unique lookup: an id or a filter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum UniqueTarget {
    /// Lookup by `_id`.
    Id {
        /// Record id.
        id: String,
    },
    /// Lookup by filter.
    Filter(Filter),
}

/// Body of a patch request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchRequest {
    /// Partial record, carrying the unique key.
    pub data: Document,
    /// Fields to merge; all non-lock fields when absent.
    #[serde(default)]
    pub props_to_patch: Option<Vec<String>>,
}

/// Body of a bulk upgrade request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeRequest {
    /// Rewrite every record, not only stale ones.
    #[serde(default)]
    pub force_update: bool,
}

/// Introspection payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMetadata {
    /// Collection name.
    pub name: String,
    /// Current version.
    pub current_version: String,
    /// Accepted versions, newest first.
    pub versions: Vec<String>,
    /// Unique key used to locate records.
    pub unique_keys: Vec<String>,
    /// Fields patch never modifies.
    pub lock_keys: Vec<String>,
    /// Uniqueness predicate sets.
    pub unique_constraints: Vec<Vec<String>>,
    /// Declared schema, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
}

/// A serialized request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", content = "body", rename_all = "camelCase")]
pub enum ApiRequest {
    /// Full predicate query.
    Query(Query),
    /// Incremental sync read.
    Sync(Filter),
    /// Unique lookup.
    QueryUnique(UniqueTarget),
    /// Create or update.
    Upsert(Document),
    /// Chunked create or update.
    UpsertAll(Vec<Document>),
    /// Lock-key protected merge.
    Patch(PatchRequest),
    /// Delete by id.
    Delete {
        /// Record id.
        id: String,
    },
    /// Delete by non-empty filter.
    DeleteQuery(Filter),
    /// Delete everything.
    DeleteAll,
    /// Bulk migration trigger.
    UpgradeCollection(UpgradeRequest),
    /// Introspection.
    Metadata,
}

/// A status code and JSON body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    /// HTTP-style status.
    pub status: u16,
    /// Response payload or error body.
    pub body: Value,
}

impl ApiResponse {
    fn ok<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(body) => Self { status: 200, body },
            Err(e) => Self::error(&CoreError::from(e)),
        }
    }

    fn error(error: &CoreError) -> Self {
        Self {
            status: error.status_code(),
            body: error.body(),
        }
    }
}

/// The resource surface of one collection.
pub struct CollectionApi<S: DocumentStore> {
    engine: Arc<CollectionEngine<S>>,
}

impl<S: DocumentStore> CollectionApi<S> {
    /// Wraps an engine.
    pub fn new(engine: Arc<CollectionEngine<S>>) -> Self {
        Self { engine }
    }

    /// Returns the wrapped engine.
    pub fn engine(&self) -> &Arc<CollectionEngine<S>> {
        &self.engine
    }

    /// Full predicate query.
    pub fn query(&self, query: &Query) -> CoreResult<Vec<Record>> {
        self.engine.query(query)
    }

    /// Incremental sync read.
    pub fn sync(&self, filter: &Filter) -> CoreResult<SyncResult> {
        self.engine.query_sync(filter)
    }

    /// Unique lookup by id or filter.
    pub fn query_unique(&self, target: &UniqueTarget) -> CoreResult<Record> {
        match target {
            UniqueTarget::Id { id } => self.engine.query_by_id(id),
            UniqueTarget::Filter(filter) => {
                if filter.is_empty() {
                    return Err(CoreError::bad_request("unique lookup needs a filter"));
                }
                self.engine.query_unique(filter)
            }
        }
    }

    /// Create or update.
    pub fn upsert(&self, data: Document) -> CoreResult<Record> {
        self.engine.upsert(data)
    }

    /// Chunked create or update.
    pub fn upsert_all(&self, data: Vec<Document>) -> CoreResult<Vec<Record>> {
        self.engine.upsert_all(data)
    }

    /// Lock-key protected merge.
    pub fn patch(&self, request: PatchRequest) -> CoreResult<Record> {
        self.engine
            .patch(request.data, request.props_to_patch.as_deref())
    }

    /// Delete by id.
    pub fn delete(&self, id: &str) -> CoreResult<Record> {
        if id.is_empty() {
            return Err(CoreError::bad_request("missing `_id`"));
        }
        self.engine.delete_unique(id)
    }

    /// Delete by filter. Empty filters and `null` operands are rejected.
    pub fn delete_query(&self, filter: &Filter) -> CoreResult<Vec<Record>> {
        if filter.is_empty() {
            return Err(CoreError::bad_request("delete filter must not be empty"));
        }
        if filter.has_null_values() {
            return Err(CoreError::bad_request(
                "delete filter must not compare against null",
            ));
        }
        self.engine.delete(filter)
    }

    /// Unfiltered delete.
    pub fn delete_all(&self) -> CoreResult<Vec<Record>> {
        self.engine.delete_all()
    }

    /// Bulk migration trigger.
    pub fn upgrade_collection(&self, request: UpgradeRequest) -> PromotionReport {
        self.engine.upgrade_collection(request.force_update)
    }

    /// Introspection.
    pub fn metadata(&self) -> CollectionMetadata {
        let config = self.engine.config();
        CollectionMetadata {
            name: config.name.clone(),
            current_version: config.current_version().to_string(),
            versions: config.versions.clone(),
            unique_keys: config.unique_keys.clone(),
            lock_keys: config.lock_keys(),
            unique_constraints: config.unique_constraints.clone(),
            schema: config.schema.clone(),
        }
    }

    /// Executes a serialized request.
    pub fn dispatch(&self, request: ApiRequest) -> ApiResponse {
        let result = match request {
            ApiRequest::Query(query) => self.query(&query).and_then(to_json),
            ApiRequest::Sync(filter) => self.sync(&filter).and_then(to_json),
            ApiRequest::QueryUnique(target) => self.query_unique(&target).and_then(to_json),
            ApiRequest::Upsert(data) => self.upsert(data).and_then(to_json),
            ApiRequest::UpsertAll(data) => self.upsert_all(data).and_then(to_json),
            ApiRequest::Patch(request) => self.patch(request).and_then(to_json),
            ApiRequest::Delete { id } => self.delete(&id).and_then(to_json),
            ApiRequest::DeleteQuery(filter) => self.delete_query(&filter).and_then(to_json),
            ApiRequest::DeleteAll => self.delete_all().and_then(to_json),
            ApiRequest::UpgradeCollection(request) => {
                return ApiResponse::ok(&self.upgrade_collection(request))
            }
            ApiRequest::Metadata => return ApiResponse::ok(&self.metadata()),
        };
        match result {
            Ok(body) => ApiResponse { status: 200, body },
            Err(e) => ApiResponse::error(&e),
        }
    }

    /// Parses and executes a JSON request.
    pub fn dispatch_json(&self, request: Value) -> ApiResponse {
        match serde_json::from_value::<ApiRequest>(request) {
            Ok(request) => self.dispatch(request),
            Err(e) => ApiResponse::error(&CoreError::bad_request(e.to_string())),
        }
    }
}

fn to_json<T: Serialize>(value: T) -> CoreResult<Value> {
    Ok(serde_json::to_value(value)?)
}

impl UniqueTarget {
    /// Builds an id target.
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id { id: id.into() }
    }

    /// Returns the target as a filter.
    #[must_use]
    pub fn to_filter(&self) -> Filter {
        match self {
            Self::Id { id } => Filter::new().eq(ID_KEY, id.as_str()),
            Self::Filter(filter) => filter.clone(),
        }
    }
}
