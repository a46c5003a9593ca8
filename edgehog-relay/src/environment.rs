//! The environment ties a transport to a normalized store.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tower::Service;
use tower::ServiceExt;

use crate::configuration::Configuration;
use crate::configuration::ConfigurationError;
use crate::error::FetchError;
use crate::graphql;
use crate::json_ext::Value;
use crate::services::BoxTransport;
use crate::services::HttpTransport;
use crate::store::RecordId;
use crate::store::Store;
use crate::store::StorePatch;

/// The store handle shared by an [`Environment`] and its clones.
///
/// The lock is only held while publishing or applying patches.
pub type SharedStore = Arc<Mutex<Store>>;

/// Computes the cache changes following a mutation.
///
/// Called with the mutation response once its payload has been published,
/// while the store is locked: the patches are applied right after, in
/// order.
pub trait Updater: Send + 'static {
    fn patches(self, response: &graphql::Response, store: &Store) -> Vec<StorePatch>;
}

impl<F> Updater for F
where
    F: FnOnce(&graphql::Response, &Store) -> Vec<StorePatch> + Send + 'static,
{
    fn patches(self, response: &graphql::Response, store: &Store) -> Vec<StorePatch> {
        self(response, store)
    }
}

/// Executes operations and keeps their results in a normalized store.
///
/// Cloning is cheap: clones share the transport and the store.
#[derive(Clone)]
pub struct Environment {
    transport: BoxTransport,
    store: SharedStore,
}

impl Environment {
    /// Creates an environment with an empty store around any transport.
    pub fn new<S>(transport: S) -> Self
    where
        S: Service<graphql::Request, Response = graphql::Response, Error = FetchError>
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        Self {
            transport: BoxTransport::new(transport),
            store: SharedStore::default(),
        }
    }

    /// Creates an environment over an [`HttpTransport`].
    pub fn from_configuration(configuration: &Configuration) -> Result<Self, ConfigurationError> {
        Ok(Self::new(HttpTransport::from_configuration(configuration)?))
    }

    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    /// Reads a record from the store as JSON.
    pub fn lookup(&self, id: &RecordId) -> Option<Value> {
        self.store.lock().lookup(id)
    }

    /// Executes a query and publishes its data under the root record.
    ///
    /// GraphQL errors are returned in the response; partial data is still
    /// published. Data received after a [`logout`](Self::logout) that
    /// happened while the request was in flight is returned but not
    /// published.
    pub fn fetch_query(
        &self,
        request: graphql::Request,
    ) -> impl Future<Output = Result<graphql::Response, FetchError>> + Send + 'static {
        let transport = self.transport.clone();
        let store = self.store.clone();
        let generation = store.lock().generation();
        async move {
            let storage_keys = request.storage_keys.clone();
            let response = transport.oneshot(request).await?;
            if let Some(data) = response.data_object() {
                let mut store = store.lock();
                if store.generation() == generation {
                    store.publish(&RecordId::root(), data, &storage_keys);
                } else {
                    tracing::debug!("store was reset while fetching, response not published");
                }
            }
            Ok(response)
        }
    }

    /// Executes a mutation, publishes its payload and applies the patches
    /// returned by `updater`.
    ///
    /// The updater only runs when the response carries data, and the store
    /// was not reset in the meantime. A failing operation leaves the store
    /// untouched.
    pub fn commit_mutation<U>(
        &self,
        request: graphql::Request,
        updater: U,
    ) -> impl Future<Output = Result<graphql::Response, FetchError>> + Send + 'static
    where
        U: Updater,
    {
        let transport = self.transport.clone();
        let store = self.store.clone();
        let generation = store.lock().generation();
        async move {
            let storage_keys = request.storage_keys.clone();
            let response = transport.oneshot(request).await?;
            if let Some(data) = response.data_object() {
                let mut store = store.lock();
                if store.generation() == generation {
                    store.publish(&RecordId::mutation_root(), data, &storage_keys);
                    let patches = updater.patches(&response, &store);
                    let applied = store.apply_all(&patches);
                    tracing::debug!(patches = patches.len(), applied, "applied mutation updater");
                } else {
                    tracing::debug!("store was reset while committing, updater skipped");
                }
            }
            Ok(response)
        }
    }

    /// Drops all cached data. Requests in flight complete, but their
    /// results are no longer published.
    pub fn logout(&self) {
        self.store.lock().reset();
    }
}
