//! In-memory materialized view of vendor and deal records.
//!
//! Reads never touch the source: they return snapshots of the last merged
//! vendor set. Writes (initial load, refresh, pushed updates) replace whole
//! records by id, last write wins, and notify subscribers.
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::error::ErrorKind;
use crate::vendor::{DealFilters, DealRecord, DealType, VendorId, VendorRecord};

/// Errors raised by a [`VendorSource`].
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("vendor source unavailable: {0}")]
    Unavailable(String),
    #[error("vendor payload malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// External feed that delivers the complete vendor set.
#[async_trait]
pub trait VendorSource: Send + Sync {
    /// Load every vendor record.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be reached or decoded.
    async fn load_vendors(&self) -> Result<Vec<VendorRecord>, SourceError>;
}

/// Source serving a fixed, pre-parsed vendor set.
#[derive(Debug, Clone, Default)]
pub struct StaticVendorSource {
    vendors: Vec<VendorRecord>,
}

impl StaticVendorSource {
    #[must_use]
    pub const fn new(vendors: Vec<VendorRecord>) -> Self {
        Self { vendors }
    }

    /// Parse a JSON array of vendor records.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not describe vendor records.
    pub fn from_json(json: &str) -> Result<Self, SourceError> {
        Ok(Self::new(serde_json::from_str(json)?))
    }
}

#[async_trait]
impl VendorSource for StaticVendorSource {
    async fn load_vendors(&self) -> Result<Vec<VendorRecord>, SourceError> {
        Ok(self.vendors.clone())
    }
}

/// Lifecycle of the cache contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    Uninitialized,
    Initializing,
    Ready,
    Error,
}

/// Errors raised by cache queries and loads.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("vendor cache is not ready (state: {0:?})")]
    Unavailable(CacheState),
    #[error("vendor {0} not found")]
    VendorNotFound(VendorId),
    #[error(transparent)]
    Source(#[from] SourceError),
}

impl CacheError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_) | Self::Source(_) => ErrorKind::CacheUnavailable,
            Self::VendorNotFound(_) => ErrorKind::VendorNotFound,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheEventKind {
    Init,
    Update,
}

/// Notification delivered to subscribers. Delivery is at-least-once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEvent {
    #[serde(rename = "type")]
    pub kind: CacheEventKind,
    pub vendor_count: usize,
}

/// Handle returned by [`VendorDealCache::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

#[derive(Default)]
struct VendorTable {
    vendors: Vec<VendorRecord>,
    index: HashMap<VendorId, usize>,
}

impl VendorTable {
    /// Swap in a full snapshot; returns how many records were added, changed
    /// or evicted.
    fn replace_all(&mut self, records: Vec<VendorRecord>) -> usize {
        let previous = std::mem::take(self);
        self.merge(records);
        let upserted = self
            .vendors
            .iter()
            .filter(|record| previous.get(&record.id) != Some(*record))
            .count();
        let evicted = previous
            .vendors
            .iter()
            .filter(|record| !self.index.contains_key(&record.id))
            .count();
        upserted + evicted
    }

    fn get(&self, id: &VendorId) -> Option<&VendorRecord> {
        self.index.get(id).map(|&slot| &self.vendors[slot])
    }

    /// Upsert by id; returns how many records changed.
    fn merge(&mut self, records: Vec<VendorRecord>) -> usize {
        let mut changed = 0;
        for record in records {
            if let Some(&slot) = self.index.get(&record.id) {
                if self.vendors[slot] != record {
                    self.vendors[slot] = record;
                    changed += 1;
                }
            } else {
                self.index.insert(record.id.clone(), self.vendors.len());
                self.vendors.push(record);
                changed += 1;
            }
        }
        changed
    }
}

/// Cache of vendor records shared by the planner and the journey machine.
pub struct VendorDealCache {
    source: Arc<dyn VendorSource>,
    state: RwLock<CacheState>,
    table: RwLock<VendorTable>,
    init: OnceCell<()>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_subscription: AtomicU64,
}

impl std::fmt::Debug for VendorDealCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorDealCache")
            .field("state", &self.state())
            .field("vendors", &self.len())
            .finish_non_exhaustive()
    }
}

impl VendorDealCache {
    #[must_use]
    pub fn new(source: Arc<dyn VendorSource>) -> Self {
        Self {
            source,
            state: RwLock::new(CacheState::Uninitialized),
            table: RwLock::new(VendorTable::default()),
            init: OnceCell::new(),
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Load the full vendor set once.
    ///
    /// Concurrent callers share the in-flight load; once `ready`, further
    /// calls return immediately. A failed load leaves the cache in `error`
    /// and a later call retries.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails to deliver vendors.
    pub async fn initialize(&self) -> Result<usize, CacheError> {
        self.init
            .get_or_try_init(|| async {
                self.set_state(CacheState::Initializing);
                match self.source.load_vendors().await {
                    Ok(records) => {
                        let count = records.len();
                        self.write_table(|table| table.replace_all(records));
                        self.set_state(CacheState::Ready);
                        log::info!("vendor cache ready with {count} vendors");
                        self.notify(CacheEventKind::Init);
                        Ok(())
                    }
                    Err(err) => {
                        self.set_state(CacheState::Error);
                        log::warn!("vendor cache initialization failed: {err}");
                        Err(CacheError::Source(err))
                    }
                }
            })
            .await?;
        Ok(self.len())
    }

    /// Re-pull the vendor set and merge it over the current contents.
    ///
    /// Before the first successful load this is equivalent to
    /// [`Self::initialize`]. A failed refresh keeps the previous snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails to deliver vendors.
    pub async fn refresh(&self) -> Result<usize, CacheError> {
        if !self.is_ready() {
            return self.initialize().await;
        }
        let records = self.source.load_vendors().await.map_err(|err| {
            log::warn!("vendor cache refresh failed, keeping previous snapshot: {err}");
            CacheError::Source(err)
        })?;
        let changed = self.write_table(|table| table.replace_all(records));
        log::debug!("vendor cache refresh changed {changed} records");
        self.notify(CacheEventKind::Update);
        Ok(changed)
    }

    /// Merge pushed vendor records. Re-delivering a batch is harmless.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache has not finished its initial load.
    pub fn apply_update(&self, records: Vec<VendorRecord>) -> Result<usize, CacheError> {
        let state = self.state();
        if state != CacheState::Ready {
            return Err(CacheError::Unavailable(state));
        }
        let changed = self.write_table(|table| table.merge(records));
        self.notify(CacheEventKind::Update);
        Ok(changed)
    }

    #[must_use]
    pub fn state(&self) -> CacheState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == CacheState::Ready
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read_table(|table| table.vendors.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every vendor in source order.
    #[must_use]
    pub fn all_vendors(&self) -> Vec<VendorRecord> {
        self.read_table(|table| table.vendors.clone())
    }

    #[must_use]
    pub fn vendor_by_id(&self, id: &VendorId) -> Option<VendorRecord> {
        self.read_table(|table| {
            table
                .index
                .get(id)
                .and_then(|&slot| table.vendors.get(slot).cloned())
        })
    }

    /// Like [`Self::vendor_by_id`] but reports a miss as an error.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::VendorNotFound`] when no vendor has this id.
    pub fn require_vendor(&self, id: &VendorId) -> Result<VendorRecord, CacheError> {
        self.vendor_by_id(id)
            .ok_or_else(|| CacheError::VendorNotFound(id.clone()))
    }

    /// Vendors whose category matches, case-insensitively.
    #[must_use]
    pub fn vendors_in_category(&self, category: &str) -> Vec<VendorRecord> {
        let wanted = category.trim();
        self.read_table(|table| {
            table
                .vendors
                .iter()
                .filter(|vendor| {
                    vendor
                        .category
                        .as_deref()
                        .is_some_and(|c| c.trim().eq_ignore_ascii_case(wanted))
                })
                .cloned()
                .collect()
        })
    }

    /// Vendors offering `deal_type` on `today`, in source order.
    #[must_use]
    pub fn vendors_offering(
        &self,
        deal_type: DealType,
        filters: &DealFilters,
        today: NaiveDate,
    ) -> Vec<VendorRecord> {
        self.read_table(|table| {
            table
                .vendors
                .iter()
                .filter(|vendor| vendor.offers(deal_type, filters, today))
                .cloned()
                .collect()
        })
    }

    /// Flattened deals of `deal_type` valid on `today`.
    #[must_use]
    pub fn deals_by_type(
        &self,
        deal_type: DealType,
        filters: &DealFilters,
        today: NaiveDate,
    ) -> Vec<DealRecord> {
        self.read_table(|table| {
            table
                .vendors
                .iter()
                .flat_map(|vendor| vendor.deal_records(deal_type, filters, today))
                .collect()
        })
    }

    /// Register a listener for `init` and `update` events.
    pub fn subscribe(
        &self,
        listener: impl Fn(&CacheEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Unknown or already removed ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(existing, _)| *existing != id);
    }

    fn notify(&self, kind: CacheEventKind) {
        let event = CacheEvent {
            kind,
            vendor_count: self.len(),
        };
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }

    fn set_state(&self, next: CacheState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn read_table<R>(&self, f: impl FnOnce(&VendorTable) -> R) -> R {
        let guard = self.table.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write_table<R>(&self, f: impl FnOnce(&mut VendorTable) -> R) -> R {
        let mut guard = self.table.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}
