//! Collection registry: definitions with aliases and priorities, lazy
//! per-collection clients, and per-collection read/write locking.
//!
//! Searches share a read semaphore (many concurrent readers); ingestion
//! takes an exclusive write mutex with an acquisition timeout so a stuck
//! writer fails loudly instead of dropping data.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, Semaphore};
use tracing::{debug, warn};

use super::{Document, RetrievalError, RetrievedChunk, VectorStore};

/// Collection priority for federated ordering and ops dashboards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// One entry in the collection registry.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct CollectionDefinition {
    pub name: String,
    /// Optional alias target; resolved transparently at lookup time.
    pub alias: Option<String>,
    pub priority: Priority,
    pub doc_count: u64,
    pub description: String,
}

impl CollectionDefinition {
    pub fn new(
        name: impl Into<String>,
        priority: Priority,
        doc_count: u64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            alias: None,
            priority,
            doc_count,
            description: description.into(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// The default knowledge-base registry for the business-assistant domain.
pub fn default_collections() -> Vec<CollectionDefinition> {
    vec![
        CollectionDefinition::new(
            "visa_oracle",
            Priority::High,
            1612,
            "Visas, KITAS, KITAP, immigration, stay permits",
        ),
        CollectionDefinition::new(
            "legal_unified",
            Priority::High,
            5041,
            "Laws, company types (PT, CV, Firma), regulations",
        ),
        CollectionDefinition::new(
            "kbli_unified",
            Priority::High,
            8886,
            "Business classification codes (KBLI), OSS, NIB",
        ),
        CollectionDefinition::new(
            "tax_genius",
            Priority::High,
            895,
            "Taxes, PPh, PPN, NPWP, fiscal matters",
        ),
        CollectionDefinition::new(
            "service_pricing",
            Priority::High,
            29,
            "Official service pricing and costs",
        ),
        CollectionDefinition::new(
            "training_conversations",
            Priority::Medium,
            2898,
            "Procedures, practical examples",
        ),
        CollectionDefinition::new("legal_architect", Priority::Medium, 5041, "Legacy legal name")
            .with_alias("legal_unified"),
        CollectionDefinition::new("kbli_eye", Priority::Medium, 8886, "Legacy KBLI name")
            .with_alias("kbli_unified"),
        CollectionDefinition::new("tax_knowledge", Priority::Medium, 895, "Legacy tax name")
            .with_alias("tax_genius"),
    ]
}

type StoreFactory = Box<dyn Fn(&str) -> Arc<dyn VectorStore> + Send + Sync>;

/// Registry of collections plus lazily created clients and per-collection
/// concurrency guards.
pub struct CollectionManager {
    definitions: Vec<CollectionDefinition>,
    factory: StoreFactory,
    clients: DashMap<String, Arc<dyn VectorStore>>,
    read_semaphores: DashMap<String, Arc<Semaphore>>,
    write_locks: DashMap<String, Arc<Mutex<()>>>,
    read_concurrency: usize,
    write_timeout: Duration,
}

impl CollectionManager {
    /// `factory` builds a client for an (alias-resolved) collection name on
    /// first use.
    pub fn new(
        definitions: Vec<CollectionDefinition>,
        factory: impl Fn(&str) -> Arc<dyn VectorStore> + Send + Sync + 'static,
        read_concurrency: usize,
        write_timeout: Duration,
    ) -> Self {
        Self {
            definitions,
            factory: Box::new(factory),
            clients: DashMap::new(),
            read_semaphores: DashMap::new(),
            write_locks: DashMap::new(),
            read_concurrency,
            write_timeout,
        }
    }

    /// Primary (non-alias) collection names, high priority first.
    pub fn primary_collections(&self) -> Vec<String> {
        let mut defs: Vec<&CollectionDefinition> =
            self.definitions.iter().filter(|d| d.alias.is_none()).collect();
        defs.sort_by_key(|d| match d.priority {
            Priority::High => 0u8,
            Priority::Medium => 1,
            Priority::Low => 2,
        });
        defs.iter().map(|d| d.name.clone()).collect()
    }

    pub fn definition(&self, name: &str) -> Option<&CollectionDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    /// Resolves an alias chainlessly: one level, as registered.
    fn resolve(&self, name: &str) -> Result<String, RetrievalError> {
        let def = self
            .definition(name)
            .ok_or_else(|| RetrievalError::UnknownCollection(name.to_string()))?;
        Ok(def.alias.clone().unwrap_or_else(|| def.name.clone()))
    }

    /// Lazily builds (or fetches) the client for a collection.
    fn client(&self, name: &str) -> Result<Arc<dyn VectorStore>, RetrievalError> {
        let actual = self.resolve(name)?;
        if let Some(existing) = self.clients.get(&actual) {
            return Ok(Arc::clone(&existing));
        }
        let created = (self.factory)(&actual);
        debug!(collection = %actual, "lazy-loaded collection client");
        self.clients.insert(actual, Arc::clone(&created));
        Ok(created)
    }

    fn read_semaphore(&self, name: &str) -> Arc<Semaphore> {
        // Clone the Arc out of the map entry; never hold the map guard
        // across an await.
        Arc::clone(
            &self
                .read_semaphores
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.read_concurrency))),
        )
    }

    fn write_lock(&self, name: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            &self
                .write_locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Searches one collection under its read semaphore.
    pub async fn search_with_lock(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        let actual = self.resolve(collection)?;
        let client = self.client(collection)?;
        let semaphore = self.read_semaphore(&actual);
        let _permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| RetrievalError::Store("read semaphore closed".to_string()))?;
        client.search(query, limit).await
    }

    /// Ingests documents under the exclusive write lock; times out rather
    /// than queueing forever behind a stuck writer.
    pub async fn ingest_with_lock(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<usize, RetrievalError> {
        let actual = self.resolve(collection)?;
        let client = self.client(collection)?;
        let lock = self.write_lock(&actual);

        let guard: OwnedMutexGuard<()> =
            match tokio::time::timeout(self.write_timeout, lock.lock_owned()).await {
                Ok(guard) => guard,
                Err(_) => {
                    warn!(collection = %actual, timeout_s = self.write_timeout.as_secs(), "ingest lock timeout");
                    return Err(RetrievalError::IngestLockTimeout {
                        collection: actual,
                        timeout_s: self.write_timeout.as_secs(),
                    });
                }
            };
        let written = client.upsert(documents).await?;
        drop(guard);
        Ok(written)
    }
}
