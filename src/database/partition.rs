use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, info, warn};

use super::models::tenant::normalize_slug;

/// Every tenant namespace is named `tenant_<slug>`.
pub const PARTITION_PREFIX: &str = "tenant_";

/// Errors from the partition router and its backends
#[derive(Debug, Clone, Error)]
pub enum PartitionError {
    #[error("Invalid tenant slug '{0}'")]
    InvalidSlug(String),

    #[error("DDL on partition {partition} failed: {message}")]
    Ddl { partition: String, message: String },

    #[error("Connection resources exhausted for partition {0}")]
    Exhausted(String),

    #[error("Failed to open partition {partition}: {message}")]
    Connect { partition: String, message: String },
}

impl PartitionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, PartitionError::Exhausted(_) | PartitionError::Connect { .. })
    }
}

/// Name of one tenant's isolated namespace, derived from a validated slug.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionName {
    slug: String,
    name: String,
}

impl PartitionName {
    pub fn for_slug(slug: &str) -> Result<Self, PartitionError> {
        let slug = normalize_slug(slug).map_err(|_| PartitionError::InvalidSlug(slug.to_string()))?;
        let name = format!("{}{}", PARTITION_PREFIX, slug);
        Ok(Self { slug, name })
    }

    /// Reverse of [`PartitionName::for_slug`]. Returns `None` for namespaces
    /// that do not belong to a tenant.
    pub fn from_namespace(namespace: &str) -> Option<Self> {
        let slug = namespace.strip_prefix(PARTITION_PREFIX)?;
        let partition = Self::for_slug(slug).ok()?;
        (partition.name == namespace).then_some(partition)
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Identifier quoted for interpolation into DDL.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.name.replace('"', "\"\""))
    }
}

impl fmt::Display for PartitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Storage engine operations the router needs. The PostgreSQL backend maps
/// a namespace to a schema; tests use an in-memory backend.
#[async_trait]
pub trait PartitionBackend: Send + Sync + 'static {
    type Pool: Clone + Send + Sync + 'static;

    /// Create the namespace if it is absent. Must succeed when it exists.
    async fn create_namespace(&self, partition: &PartitionName) -> Result<(), PartitionError>;

    async fn drop_namespace(&self, partition: &PartitionName) -> Result<(), PartitionError>;

    async fn namespace_exists(&self, partition: &PartitionName) -> Result<bool, PartitionError>;

    /// All namespaces carrying [`PARTITION_PREFIX`].
    async fn list_namespaces(&self) -> Result<Vec<String>, PartitionError>;

    /// Build a bounded pool whose sessions only see `partition`.
    async fn open_pool(&self, partition: &PartitionName) -> Result<Self::Pool, PartitionError>;

    async fn close_pool(&self, pool: Self::Pool);

    /// Namespace a session from `pool` currently resolves unqualified names in.
    async fn active_namespace(&self, pool: &Self::Pool) -> Result<String, PartitionError>;
}

/// Partition-scoped data access handed to business handlers.
#[derive(Debug, Clone)]
pub struct TenantHandle<P> {
    pub partition: PartitionName,
    pub pool: P,
}

/// One cache entry. A slot leaves the map exactly once, and is marked
/// `retired` when it does. `released` records that its pool was handed to
/// `close_pool`, so every pool is closed exactly once no matter which side
/// of a `get_handle`/`close` race finishes last.
struct PoolSlot<P> {
    pool: OnceCell<P>,
    state: Mutex<SlotState>,
}

#[derive(Default)]
struct SlotState {
    retired: bool,
    released: bool,
}

impl<P> PoolSlot<P> {
    fn new() -> Self {
        Self {
            pool: OnceCell::new(),
            state: Mutex::new(SlotState::default()),
        }
    }
}

/// Owns the slug → pool mapping.
///
/// Pools are built lazily, at most one live pool per slug. Callers racing on
/// a cold slug share one slot and only the first runs the constructor; the
/// map lock is never held across I/O, so different tenants never wait on
/// each other.
pub struct PartitionRouter<B: PartitionBackend> {
    backend: B,
    pools: RwLock<HashMap<String, Arc<PoolSlot<B::Pool>>>>,
    ddl_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<B: PartitionBackend> PartitionRouter<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            pools: RwLock::new(HashMap::new()),
            ddl_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Handle bound to the tenant's partition, creating the pool on first use.
    ///
    /// A failed construction leaves the slug uncached so the next call
    /// retries. There is no fallback to any other pool. A pool finished
    /// after `close` retired its slot is closed here and a fresh slot is
    /// used instead.
    pub async fn get_handle(&self, slug: &str) -> Result<TenantHandle<B::Pool>, PartitionError> {
        let partition = PartitionName::for_slug(slug)?;

        loop {
            let slot = self.pool_slot(partition.slug()).await;

            let built = slot
                .pool
                .get_or_try_init(|| async {
                    let pool = self.backend.open_pool(&partition).await?;
                    info!(slug = %partition.slug(), partition = %partition, "Created tenant pool");
                    Ok::<_, PartitionError>(pool)
                })
                .await;
            let pool = match built {
                Ok(pool) => pool.clone(),
                Err(e) => {
                    self.retire(partition.slug(), &slot).await;
                    return Err(e);
                }
            };

            let stale = {
                let mut state = slot.state.lock().await;
                if !state.retired {
                    return Ok(TenantHandle { partition, pool });
                }
                !std::mem::replace(&mut state.released, true)
            };
            if stale {
                self.backend.close_pool(pool).await;
                debug!(slug = %partition.slug(), "Closed pool built for a retired slot");
            }
        }
    }

    async fn pool_slot(&self, slug: &str) -> Arc<PoolSlot<B::Pool>> {
        {
            let pools = self.pools.read().await;
            if let Some(slot) = pools.get(slug) {
                debug!(slug, "Tenant pool cache hit");
                return slot.clone();
            }
        }

        let mut pools = self.pools.write().await;
        pools
            .entry(slug.to_string())
            .or_insert_with(|| Arc::new(PoolSlot::new()))
            .clone()
    }

    /// Unmap `slot` if it is still the current one and mark it retired, so a
    /// caller still building into it closes what it builds.
    async fn retire(&self, slug: &str, slot: &Arc<PoolSlot<B::Pool>>) {
        {
            let mut pools = self.pools.write().await;
            if pools.get(slug).is_some_and(|current| Arc::ptr_eq(current, slot)) {
                pools.remove(slug);
            }
        }
        slot.state.lock().await.retired = true;
    }

    async fn ddl_lock(&self, slug: &str) -> Arc<Mutex<()>> {
        let mut locks = self.ddl_locks.lock().await;
        locks.entry(slug.to_string()).or_default().clone()
    }

    /// Forget the slug's DDL lock once no other caller holds it.
    async fn release_ddl_lock(&self, slug: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.ddl_locks.lock().await;
        // One reference in the map, one here.
        if locks.get(slug).is_some_and(|l| Arc::ptr_eq(l, &lock)) && Arc::strong_count(&lock) == 2 {
            locks.remove(slug);
        }
    }

    /// Create the tenant namespace if absent. Safe to re-run and to race.
    pub async fn create_partition(&self, slug: &str) -> Result<PartitionName, PartitionError> {
        let partition = PartitionName::for_slug(slug)?;
        let lock = self.ddl_lock(partition.slug()).await;
        let result = {
            let _guard = lock.lock().await;
            self.backend.create_namespace(&partition).await
        };
        self.release_ddl_lock(partition.slug(), lock).await;

        result?;
        info!(slug = %partition.slug(), partition = %partition, "Partition ready");
        Ok(partition)
    }

    /// Destroy the namespace and everything in it. Irreversible.
    pub async fn drop_partition(&self, slug: &str) -> Result<(), PartitionError> {
        let partition = PartitionName::for_slug(slug)?;
        self.close(partition.slug()).await;

        let lock = self.ddl_lock(partition.slug()).await;
        let result = {
            let _guard = lock.lock().await;
            self.backend.drop_namespace(&partition).await
        };
        self.release_ddl_lock(partition.slug(), lock).await;

        result?;
        warn!(slug = %partition.slug(), partition = %partition, "Partition dropped");
        Ok(())
    }

    /// Release the tenant's pooled connections. Unknown slugs are a no-op.
    ///
    /// A construction still in flight is not awaited; its caller sees the
    /// retired slot and closes the pool itself.
    pub async fn close(&self, slug: &str) {
        let Ok(partition) = PartitionName::for_slug(slug) else {
            return;
        };
        let slot = {
            let mut pools = self.pools.write().await;
            pools.remove(partition.slug())
        };
        let Some(slot) = slot else {
            return;
        };

        let pool = {
            let mut state = slot.state.lock().await;
            state.retired = true;
            match slot.pool.get() {
                Some(pool) if !state.released => {
                    state.released = true;
                    Some(pool.clone())
                }
                _ => None,
            }
        };
        if let Some(pool) = pool {
            self.backend.close_pool(pool).await;
            info!(slug = %partition.slug(), "Closed tenant pool");
        }
    }

    pub async fn partition_exists(&self, slug: &str) -> Result<bool, PartitionError> {
        let partition = PartitionName::for_slug(slug)?;
        self.backend.namespace_exists(&partition).await
    }

    pub async fn list_partitions(&self) -> Result<Vec<PartitionName>, PartitionError> {
        let mut partitions: Vec<PartitionName> = self
            .backend
            .list_namespaces()
            .await?
            .iter()
            .filter_map(|ns| PartitionName::from_namespace(ns))
            .collect();
        partitions.sort();
        Ok(partitions)
    }

    /// Slugs with a constructed pool.
    pub async fn cached_slugs(&self) -> Vec<String> {
        let pools = self.pools.read().await;
        let mut slugs: Vec<String> = pools
            .iter()
            .filter(|(_, slot)| slot.pool.initialized())
            .map(|(slug, _)| slug.clone())
            .collect();
        slugs.sort();
        slugs
    }

    pub async fn close_all(&self) {
        let slugs: Vec<String> = {
            let pools = self.pools.read().await;
            pools.keys().cloned().collect()
        };
        for slug in slugs {
            self.close(&slug).await;
        }
    }
}

/// The part of the router the lifecycle service depends on.
#[async_trait]
pub trait PartitionProvisioner: Send + Sync {
    async fn create_partition(&self, slug: &str) -> Result<PartitionName, PartitionError>;

    async fn list_partitions(&self) -> Result<Vec<PartitionName>, PartitionError>;

    async fn close(&self, slug: &str);
}

#[async_trait]
impl<B: PartitionBackend> PartitionProvisioner for PartitionRouter<B> {
    async fn create_partition(&self, slug: &str) -> Result<PartitionName, PartitionError> {
        PartitionRouter::create_partition(self, slug).await
    }

    async fn list_partitions(&self) -> Result<Vec<PartitionName>, PartitionError> {
        PartitionRouter::list_partitions(self).await
    }

    async fn close(&self, slug: &str) {
        PartitionRouter::close(self, slug).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::MemoryPartitionBackend;

    #[test]
    fn partition_names_are_prefixed_and_reversible() {
        let p = PartitionName::for_slug("Acme-Corp").unwrap();
        assert_eq!(p.as_str(), "tenant_acme-corp");
        assert_eq!(p.quoted(), "\"tenant_acme-corp\"");
        assert_eq!(PartitionName::from_namespace("tenant_acme-corp"), Some(p));
        assert_eq!(PartitionName::from_namespace("public"), None);
        assert_eq!(PartitionName::from_namespace("tenant_9x"), None);
    }

    #[test]
    fn rejects_unsafe_slugs() {
        assert!(matches!(
            PartitionName::for_slug("a\"; drop schema public"),
            Err(PartitionError::InvalidSlug(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_cold_callers_share_one_pool() {
        let backend = MemoryPartitionBackend::new().with_open_delay(Duration::from_millis(20));
        let router = Arc::new(PartitionRouter::new(backend));

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let router = router.clone();
                tokio::spawn(async move { router.get_handle("acme").await.unwrap() })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().pool.id);
        }

        assert_eq!(router.backend().pools_opened(), 1);
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(router.cached_slugs().await, vec!["acme".to_string()]);
    }

    #[tokio::test]
    async fn different_tenants_get_different_pools() {
        let router = PartitionRouter::new(MemoryPartitionBackend::new());
        let a = router.get_handle("alpha").await.unwrap();
        let b = router.get_handle("bravo").await.unwrap();

        assert_ne!(a.pool.id, b.pool.id);
        assert_eq!(a.pool.partition, "tenant_alpha");
        assert_eq!(b.pool.partition, "tenant_bravo");
        assert_eq!(router.backend().active_namespace(&b.pool).await.unwrap(), "tenant_bravo");
    }

    #[tokio::test]
    async fn create_partition_is_idempotent() {
        let router = Arc::new(PartitionRouter::new(MemoryPartitionBackend::new()));

        let (a, b) = tokio::join!(router.create_partition("acme"), router.create_partition("acme"));
        a.unwrap();
        b.unwrap();
        router.create_partition("ACME").await.unwrap();

        assert_eq!(router.backend().create_calls(), 3);
        let names: Vec<String> = router
            .list_partitions()
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(names, vec!["tenant_acme".to_string()]);
        assert!(router.partition_exists("acme").await.unwrap());
    }

    #[tokio::test]
    async fn failed_pool_construction_is_retried() {
        let backend = MemoryPartitionBackend::new();
        backend.fail_next_opens(1);
        let router = PartitionRouter::new(backend);

        let err = router.get_handle("acme").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(router.cached_slugs().await.is_empty());

        router.get_handle("acme").await.unwrap();
        assert_eq!(router.backend().pools_opened(), 1);
    }

    #[tokio::test]
    async fn close_releases_pool_and_unknown_slug_is_noop() {
        let router = PartitionRouter::new(MemoryPartitionBackend::new());
        router.close("nobody").await;

        let first = router.get_handle("acme").await.unwrap();
        router.close("acme").await;
        assert!(first.pool.is_closed());
        assert_eq!(router.backend().pools_closed(), 1);

        let second = router.get_handle("acme").await.unwrap();
        assert_ne!(first.pool.id, second.pool.id);
        assert!(!second.pool.is_closed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn close_racing_first_use_never_leaks_a_pool() {
        let router = Arc::new(PartitionRouter::new(MemoryPartitionBackend::new()));

        for _ in 0..2_000 {
            let opener = {
                let router = router.clone();
                tokio::spawn(async move { router.get_handle("acme").await.unwrap() })
            };
            let closer = {
                let router = router.clone();
                tokio::spawn(async move { router.close("acme").await })
            };
            opener.await.unwrap();
            closer.await.unwrap();
        }

        let live = router.get_handle("acme").await.unwrap();
        assert!(!live.pool.is_closed());
        assert_eq!(router.cached_slugs().await, vec!["acme".to_string()]);

        router.close_all().await;
        let backend = router.backend();
        assert_eq!(backend.pools_opened(), backend.pools_closed());
        assert!(router.pools.read().await.is_empty());
    }

    #[tokio::test]
    async fn pool_built_after_close_is_released_by_its_builder() {
        let backend = MemoryPartitionBackend::new().with_open_delay(Duration::from_millis(30));
        let router = Arc::new(PartitionRouter::new(backend));

        let opener = {
            let router = router.clone();
            tokio::spawn(async move { router.get_handle("acme").await.unwrap() })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        router.close("acme").await;

        let handle = opener.await.unwrap();
        assert!(!handle.pool.is_closed());
        // The first build landed in a retired slot and was closed; the
        // handle comes from a second, tracked pool.
        assert_eq!(router.backend().pools_opened(), 2);
        assert_eq!(router.backend().pools_closed(), 1);
        assert_eq!(router.cached_slugs().await, vec!["acme".to_string()]);
    }

    #[tokio::test]
    async fn failed_builds_and_finished_ddl_leave_no_entries() {
        let backend = MemoryPartitionBackend::new();
        backend.fail_next_opens(3);
        let router = PartitionRouter::new(backend);

        for slug in ["alpha", "bravo", "charlie"] {
            router.get_handle(slug).await.unwrap_err();
        }
        assert!(router.pools.read().await.is_empty());

        router.create_partition("alpha").await.unwrap();
        router.drop_partition("alpha").await.unwrap();
        assert!(router.ddl_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn drop_partition_removes_namespace() {
        let router = PartitionRouter::new(MemoryPartitionBackend::new());
        router.create_partition("acme").await.unwrap();
        router.get_handle("acme").await.unwrap();

        router.drop_partition("acme").await.unwrap();
        assert!(!router.partition_exists("acme").await.unwrap());
        assert!(router.cached_slugs().await.is_empty());
    }
}
