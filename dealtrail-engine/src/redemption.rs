//! Day-scoped redemption eligibility.
//!
//! One store key per `(vendor, deal type, local calendar day)`; the value is
//! the redemption timestamp. Storage failures fail open: a vendor is treated
//! as eligible and the condition is logged.
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::clock::Clock;
use crate::constants::REDEMPTION_KEY_PREFIX;
use crate::store::{KeyValueStore, StoreError, set_json};
use crate::vendor::{DealType, VendorId, VendorRecord};

/// Parsed identity of one redemption record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionKey {
    pub vendor_id: VendorId,
    pub deal_type: DealType,
    pub date: NaiveDate,
}

impl RedemptionKey {
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!(
            "{REDEMPTION_KEY_PREFIX}{}:{}:{}",
            self.vendor_id,
            self.deal_type.as_str(),
            self.date.format("%Y-%m-%d")
        )
    }

    /// Parse a storage key; vendor ids may themselves contain `:`.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        let rest = key.strip_prefix(REDEMPTION_KEY_PREFIX)?;
        let mut parts = rest.rsplitn(3, ':');
        let date = NaiveDate::parse_from_str(parts.next()?, "%Y-%m-%d").ok()?;
        let deal_type = parts.next()?.parse::<DealType>().ok()?;
        let vendor = parts.next()?;
        if vendor.is_empty() {
            return None;
        }
        Some(Self {
            vendor_id: VendorId::from(vendor),
            deal_type,
            date,
        })
    }
}

/// A redemption that was just recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionRecord {
    #[serde(flatten)]
    pub key: RedemptionKey,
    pub redeemed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionTally {
    pub count: usize,
    pub unique_vendors: usize,
}

/// Dashboard aggregates over every stored redemption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionStats {
    pub today: RedemptionTally,
    pub total: RedemptionTally,
}

fn tally<'a>(keys: impl Iterator<Item = &'a RedemptionKey>) -> RedemptionTally {
    let mut count = 0;
    let mut vendors = HashSet::new();
    for key in keys {
        count += 1;
        vendors.insert(&key.vendor_id);
    }
    RedemptionTally {
        count,
        unique_vendors: vendors.len(),
    }
}

/// Tracks which `(vendor, deal type)` pairs were redeemed today.
#[derive(Clone)]
pub struct RedemptionTracker {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RedemptionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedemptionTracker").finish_non_exhaustive()
    }
}

impl RedemptionTracker {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn key_for_today(&self, vendor_id: &VendorId, deal_type: DealType) -> RedemptionKey {
        RedemptionKey {
            vendor_id: vendor_id.clone(),
            deal_type,
            date: self.clock.today(),
        }
    }

    /// True unless this pair already has a record dated today.
    pub async fn can_redeem(&self, vendor_id: &VendorId, deal_type: DealType) -> bool {
        let key = self.key_for_today(vendor_id, deal_type).storage_key();
        match self.store.get(&key).await {
            Ok(existing) => existing.is_none(),
            Err(err) => {
                log::warn!("redemption lookup for {key} failed, treating as eligible: {err}");
                true
            }
        }
    }

    /// Write (or overwrite) today's record for this pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub async fn record_redemption(
        &self,
        vendor_id: &VendorId,
        deal_type: DealType,
    ) -> Result<RedemptionRecord, StoreError> {
        let record = RedemptionRecord {
            key: self.key_for_today(vendor_id, deal_type),
            redeemed_at: self.clock.now(),
        };
        set_json(
            self.store.as_ref(),
            &record.key.storage_key(),
            &record.redeemed_at,
        )
        .await?;
        log::debug!("recorded {deal_type} redemption for vendor {vendor_id}");
        Ok(record)
    }

    /// Keep the vendors still eligible today, preserving order.
    pub async fn filter_redeemable(
        &self,
        vendors: Vec<VendorRecord>,
        deal_type: DealType,
    ) -> Vec<VendorRecord> {
        let mut eligible = Vec::with_capacity(vendors.len());
        for vendor in vendors {
            if self.can_redeem(&vendor.id, deal_type).await {
                eligible.push(vendor);
            }
        }
        eligible
    }

    async fn all_keys(&self) -> Result<Vec<RedemptionKey>, StoreError> {
        Ok(self
            .store
            .list_keys()
            .await?
            .iter()
            .filter_map(|key| RedemptionKey::parse(key))
            .collect())
    }

    /// Aggregate counts for today and all time. Unreadable storage yields zeros.
    pub async fn stats(&self) -> RedemptionStats {
        let keys = match self.all_keys().await {
            Ok(keys) => keys,
            Err(err) => {
                log::warn!("redemption stats unavailable: {err}");
                return RedemptionStats::default();
            }
        };
        let today = self.clock.today();
        RedemptionStats {
            today: tally(keys.iter().filter(|key| key.date == today)),
            total: tally(keys.iter()),
        }
    }

    /// Remove records dated strictly before `cutoff`; returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed or written.
    pub async fn prune_before(&self, cutoff: NaiveDate) -> Result<usize, StoreError> {
        let stale: Vec<String> = self
            .all_keys()
            .await?
            .into_iter()
            .filter(|key| key.date < cutoff)
            .map(|key| key.storage_key())
            .collect();
        if !stale.is_empty() {
            self.store.multi_remove(&stale).await?;
        }
        Ok(stale.len())
    }
}
