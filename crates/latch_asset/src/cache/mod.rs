//! Reference-counted cache of asynchronously loaded assets
//!
//! Every operation goes through a single mutex around the entry map. The lock
//! is never held across an `.await` and never while calling into the loader.
//!
//! Entry lifecycle:
//!
//! ```text
//! acquire (miss) ──▶ Loading ──load ok──▶ Ready ──evict / clear_all / policy──▶ (removed)
//!                       │
//!                       └──load failed──▶ (removed, every waiter gets LoadFailed)
//! ```
//!
//! Each load cycle carries a fresh id. A load that completes after its entry was
//! evicted (or replaced by a newer cycle) only releases its resource.

mod acquire;
mod stats;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::Instrument;

use crate::atlas::{token_sprite_name, Sprite, SpriteAtlas, TOKENS_ADDRESS};
use crate::{AssetLoader, CacheConfig, CacheError, EvictionPolicy, LoadError, SubResources};

pub use acquire::{Acquire, AcquireMany};
use stats::CacheStats;
pub use stats::CacheStatsSnapshot;

type Outcome<R> = Result<Arc<R>, CacheError>;
type Notifier<R> = oneshot::Sender<Outcome<R>>;

enum Entry<R> {
    Loading {
        load_id: u64,
        /// Resolved in registration order.
        waiters: Vec<Notifier<R>>,
    },
    Ready {
        load_id: u64,
        resource: Arc<R>,
        ref_count: usize,
        /// Set while `ref_count == 0`.
        idle_since: Option<Instant>,
    },
}

/// Deduplicating, reference-counted cache in front of an [`AssetLoader`].
///
/// Cloning is cheap and yields another handle to the same cache. Acquisitions
/// that miss spawn the load on the current Tokio runtime, so `acquire` must be
/// called from within one.
pub struct ResourceCache<L: AssetLoader> {
    inner: Arc<Inner<L>>,
}

impl<L: AssetLoader> Clone for ResourceCache<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: AssetLoader> std::fmt::Debug for ResourceCache<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.inner.entries.try_lock().map(|e| e.len());
        f.debug_struct("ResourceCache")
            .field("config", &self.inner.config)
            .field("entries", &entries)
            .field("stats", &self.inner.stats.snapshot())
            .finish()
    }
}

pub(crate) struct Inner<L: AssetLoader> {
    loader: L,
    config: CacheConfig,
    entries: Mutex<HashMap<String, Entry<L::Resource>>>,
    next_load_id: AtomicU64,
    stats: CacheStats,
}

impl<L: AssetLoader> ResourceCache<L> {
    pub fn new(loader: L, config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                loader,
                config,
                entries: Mutex::new(HashMap::new()),
                next_load_id: AtomicU64::new(0),
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn loader(&self) -> &L {
        &self.inner.loader
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Acquires a reference to the asset at `address`, loading it if needed.
    ///
    /// A ready entry resolves without suspending. Concurrent acquisitions of an
    /// address that is still loading share one load. Every successful
    /// acquisition must be paired with a [`release`](Self::release).
    ///
    /// Dropping the returned handle before it resolves detaches this caller
    /// only; the load keeps going for everyone else. The configured
    /// `acquire_timeout` applies, if any.
    pub fn acquire(&self, address: &str) -> Acquire<L> {
        self.acquire_inner(address, self.inner.config.acquire_timeout)
    }

    /// Like [`acquire`](Self::acquire), giving up on this caller's wait after `timeout`.
    pub fn acquire_with_timeout(&self, address: &str, timeout: Duration) -> Acquire<L> {
        self.acquire_inner(address, Some(timeout))
    }

    /// Acquires every address, resolving once all of them have.
    ///
    /// Results come back in input order, one per address. Repeated addresses
    /// are independent acquisitions and each hold their own reference.
    pub fn acquire_many<I, S>(&self, addresses: I) -> AcquireMany<L>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        AcquireMany::new(
            addresses
                .into_iter()
                .map(|address| self.acquire(address.as_ref()))
                .collect(),
        )
    }

    fn acquire_inner(&self, address: &str, timeout: Option<Duration>) -> Acquire<L> {
        if address.is_empty() {
            return Acquire::rejected(address, CacheError::InvalidAddress);
        }

        let mut entries = self.inner.entries.lock();
        match entries.get_mut(address) {
            Some(Entry::Ready {
                load_id,
                resource,
                ref_count,
                idle_since,
            }) => {
                *ref_count += 1;
                *idle_since = None;
                self.inner.stats.hit();
                tracing::trace!(address, ref_count = *ref_count, "Cache hit");
                return Acquire::resolved(
                    Arc::clone(&self.inner),
                    address,
                    *load_id,
                    Ok(Arc::clone(resource)),
                );
            }
            Some(Entry::Loading { load_id, waiters }) => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                self.inner.stats.miss();
                tracing::debug!(
                    address,
                    load_id = *load_id,
                    waiters = waiters.len(),
                    "Joined in-flight load"
                );
                return Acquire::waiting(Arc::clone(&self.inner), address, *load_id, rx, timeout);
            }
            None => {}
        }

        let load_id = self.inner.next_load_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        entries.insert(
            address.to_string(),
            Entry::Loading {
                load_id,
                waiters: vec![tx],
            },
        );
        drop(entries);
        self.inner.stats.miss();

        Inner::spawn_load(&self.inner, address, load_id);
        Acquire::waiting(Arc::clone(&self.inner), address, load_id, rx, timeout)
    }

    /// Gives back one reference, returning how many remain.
    ///
    /// Once the count reaches zero the configured [`EvictionPolicy`] decides
    /// what happens to the entry.
    pub fn release(&self, address: &str) -> Result<usize, CacheError> {
        self.inner.release_cycle(address, None)
    }

    /// Forcibly removes `address` from the cache.
    ///
    /// Returns `Ok(false)` if nothing was cached. The resource is released
    /// through the loader even when consumers still hold references; in that
    /// case the entry is gone but [`CacheError::EvictWhileReferenced`] is
    /// returned so the caller can react. Waiters of a pending load receive
    /// [`CacheError::Cancelled`].
    pub fn evict(&self, address: &str) -> Result<bool, CacheError> {
        let removed = self.inner.entries.lock().remove(address);
        match removed {
            None => {
                tracing::debug!(address, "Evict of uncached asset");
                Ok(false)
            }
            Some(Entry::Loading { load_id, waiters }) => {
                tracing::debug!(address, load_id, "Evicted pending load");
                cancel_waiters(address, waiters);
                Ok(true)
            }
            Some(Entry::Ready {
                resource,
                ref_count,
                ..
            }) => {
                self.inner.stats.evicted(1);
                self.inner.release_resource(address, &resource);
                if ref_count > 0 {
                    tracing::warn!(address, ref_count, "Evicted asset that is still referenced");
                    return Err(CacheError::EvictWhileReferenced {
                        address: address.to_string(),
                        ref_count,
                    });
                }
                tracing::debug!(address, "Evicted asset");
                Ok(true)
            }
        }
    }

    /// Evicts everything, returning the number of entries removed.
    ///
    /// Pending loads are detached with [`CacheError::Cancelled`]. A resource
    /// that fails to release is logged and skipped.
    pub fn clear_all(&self) -> usize {
        let drained: Vec<_> = self.inner.entries.lock().drain().collect();
        let removed = drained.len();
        let mut evicted = 0;

        for (address, entry) in drained {
            match entry {
                Entry::Loading { waiters, .. } => cancel_waiters(&address, waiters),
                Entry::Ready {
                    resource,
                    ref_count,
                    ..
                } => {
                    if ref_count > 0 {
                        tracing::debug!(address = %address, ref_count, "Clearing referenced asset");
                    }
                    self.inner.release_resource(&address, &resource);
                    evicted += 1;
                }
            }
        }

        self.inner.stats.evicted(evicted);
        tracing::info!(removed, "Cleared all cached assets");
        removed
    }

    /// The cached resource at `address`, without taking a reference.
    pub fn get(&self, address: &str) -> Option<Arc<L::Resource>> {
        match self.inner.entries.lock().get(address) {
            Some(Entry::Ready { resource, .. }) => Some(Arc::clone(resource)),
            _ => None,
        }
    }

    /// Looks up a named child of a cached resource. Never triggers a load.
    pub fn query(
        &self,
        address: &str,
        key: &str,
    ) -> Option<<L::Resource as SubResources>::Child>
    where
        L::Resource: SubResources,
    {
        let Some(resource) = self.get(address) else {
            tracing::trace!(address, key, "Query against uncached asset");
            return None;
        };
        resource.sub_resource(key)
    }

    pub fn is_ready(&self, address: &str) -> bool {
        matches!(
            self.inner.entries.lock().get(address),
            Some(Entry::Ready { .. })
        )
    }

    /// Outstanding references to a ready entry.
    pub fn ref_count(&self, address: &str) -> Option<usize> {
        match self.inner.entries.lock().get(address) {
            Some(Entry::Ready { ref_count, .. }) => Some(*ref_count),
            _ => None,
        }
    }

    /// Number of entries, ready or loading.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts unreferenced entries that have been idle for longer than the
    /// [`EvictionPolicy::Idle`] threshold. Does nothing under other policies.
    pub fn sweep_idle(&self) -> usize {
        self.inner.sweep_idle()
    }

    /// Runs [`sweep_idle`](Self::sweep_idle) every `period` on the current
    /// Tokio runtime.
    ///
    /// Returns `None` unless the policy is [`EvictionPolicy::Idle`]. The task
    /// ends on its own once every handle to the cache is dropped.
    pub fn spawn_idle_sweeper(&self, period: Duration) -> Option<JoinHandle<()>> {
        let EvictionPolicy::Idle { .. } = self.inner.config.eviction else {
            return None;
        };

        let inner = Arc::downgrade(&self.inner);
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.sweep_idle();
            }
        }))
    }
}

impl<L> ResourceCache<L>
where
    L: AssetLoader<Resource = SpriteAtlas>,
{
    /// Sprite for `entity_type` at `level` from the tokens atlas, if it is loaded.
    pub fn token_sprite(&self, entity_type: &str, level: u32) -> Option<Sprite> {
        self.query(TOKENS_ADDRESS, &token_sprite_name(entity_type, level))
    }
}

impl<L: AssetLoader> Inner<L> {
    fn spawn_load(this: &Arc<Self>, address: &str, load_id: u64) {
        this.stats.load_started();
        let inner = Arc::clone(this);
        let address = address.to_string();
        let span = tracing::debug_span!("load_asset", address = %address, load_id);

        tokio::spawn(
            async move {
                tracing::debug!("Loading asset");
                // Covers loaders that panic before handing out their future.
                let load = AssertUnwindSafe(async { inner.loader.load(&address).await });
                let result = match load.catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(LoadError::Aborted(panic_message(panic.as_ref()))),
                };
                inner.complete(&address, load_id, result);
            }
            .instrument(span),
        );
    }

    fn complete(&self, address: &str, load_id: u64, result: Result<L::Resource, LoadError>) {
        let mut entries = self.entries.lock();
        let waiters = match entries.get_mut(address) {
            Some(Entry::Loading {
                load_id: current,
                waiters,
            }) if *current == load_id => Some(std::mem::take(waiters)),
            _ => None,
        };
        let Some(waiters) = waiters else {
            drop(entries);
            tracing::debug!("Discarding result of detached load");
            if let Ok(resource) = result {
                self.release_resource(address, &resource);
            }
            return;
        };

        match result {
            Ok(resource) => {
                let resource = Arc::new(resource);
                let mut ref_count = 0;
                for waiter in waiters {
                    // A closed receiver is a waiter that detached; it holds no reference.
                    if waiter.send(Ok(Arc::clone(&resource))).is_ok() {
                        ref_count += 1;
                    }
                }
                tracing::debug!(ref_count, "Asset loaded");

                if ref_count == 0 && self.config.eviction == EvictionPolicy::Eager {
                    entries.remove(address);
                    drop(entries);
                    self.stats.evicted(1);
                    self.release_resource(address, &resource);
                    return;
                }

                entries.insert(
                    address.to_string(),
                    Entry::Ready {
                        load_id,
                        resource,
                        ref_count,
                        idle_since: (ref_count == 0).then(Instant::now),
                    },
                );
            }
            Err(source) => {
                entries.remove(address);
                drop(entries);
                self.stats.load_failed();

                let error = CacheError::LoadFailed {
                    address: address.to_string(),
                    source,
                };
                tracing::warn!(error = &error as &dyn std::error::Error, "Asset load failed");
                for waiter in waiters {
                    let _ = waiter.send(Err(error.clone()));
                }
            }
        }
    }

    /// Releases one reference, optionally only if the entry still belongs to load cycle `cycle`.
    fn release_cycle(&self, address: &str, cycle: Option<u64>) -> Result<usize, CacheError> {
        let mut entries = self.entries.lock();
        let Some(Entry::Ready {
            load_id,
            ref_count,
            idle_since,
            ..
        }) = entries.get_mut(address)
        else {
            tracing::debug!(address, "Release of uncached asset");
            return Err(CacheError::NotCached {
                address: address.to_string(),
            });
        };
        if cycle.is_some_and(|cycle| cycle != *load_id) {
            tracing::debug!(address, ?cycle, current = *load_id, "Release against a replaced entry");
            return Err(CacheError::NotCached {
                address: address.to_string(),
            });
        }

        if *ref_count == 0 {
            #[cfg(feature = "strict_assertions")]
            panic!("'{address}' released more often than it was acquired");

            #[cfg(not(feature = "strict_assertions"))]
            {
                tracing::warn!(address, "Double release");
                return Err(CacheError::DoubleRelease {
                    address: address.to_string(),
                });
            }
        }

        *ref_count -= 1;
        let remaining = *ref_count;
        tracing::trace!(address, ref_count = remaining, "Released reference");
        if remaining > 0 {
            return Ok(remaining);
        }

        *idle_since = Some(Instant::now());
        if self.config.eviction == EvictionPolicy::Eager {
            if let Some(Entry::Ready { resource, .. }) = entries.remove(address) {
                drop(entries);
                self.stats.evicted(1);
                tracing::debug!(address, "Evicted unreferenced asset");
                self.release_resource(address, &resource);
            }
        }
        Ok(0)
    }

    fn sweep_idle(&self) -> usize {
        let EvictionPolicy::Idle { after } = self.config.eviction else {
            return 0;
        };

        let now = Instant::now();
        let expired: Vec<(String, Arc<L::Resource>)> = {
            let mut entries = self.entries.lock();
            let keys: Vec<String> = entries
                .iter()
                .filter_map(|(address, entry)| match entry {
                    Entry::Ready {
                        ref_count: 0,
                        idle_since: Some(since),
                        ..
                    } if now.duration_since(*since) >= after => Some(address.clone()),
                    _ => None,
                })
                .collect();
            keys.into_iter()
                .filter_map(|address| match entries.remove(&address) {
                    Some(Entry::Ready { resource, .. }) => Some((address, resource)),
                    _ => None,
                })
                .collect()
        };

        for (address, resource) in &expired {
            tracing::debug!(address = %address, "Evicted idle asset");
            self.release_resource(address, resource);
        }
        self.stats.evicted(expired.len() as u64);
        expired.len()
    }

    fn release_resource(&self, address: &str, resource: &L::Resource) {
        if let Err(error) = self.loader.release(address, resource) {
            tracing::error!(
                address,
                error = &error as &dyn std::error::Error,
                "Failed to release asset"
            );
        }
    }
}

fn cancel_waiters<R>(address: &str, waiters: Vec<Notifier<R>>) {
    for waiter in waiters {
        let _ = waiter.send(Err(CacheError::Cancelled {
            address: address.to_string(),
        }));
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "loader panicked".to_string()
    }
}
