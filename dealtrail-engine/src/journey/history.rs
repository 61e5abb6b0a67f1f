//! Finished-journey history and the cumulative point balance.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JourneyRecord;
use crate::constants::{KEY_JOURNEY_HISTORY, KEY_USER_POINTS};
use crate::reward::RewardBreakdown;
use crate::store::{KeyValueStore, StoreError, get_json, set_json};
use crate::vendor::DealType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JourneyOutcome {
    Completed,
    Terminated,
}

/// Summary kept in `journey_history`, most recent first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyHistoryEntry {
    pub deal_type: DealType,
    pub outcome: JourneyOutcome,
    pub planned_stops: usize,
    pub remaining_stops: usize,
    pub checked_in_stops: usize,
    pub points: u32,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl JourneyHistoryEntry {
    #[must_use]
    pub fn from_journey(
        journey: &JourneyRecord,
        outcome: JourneyOutcome,
        reward: &RewardBreakdown,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            deal_type: journey.deal_type,
            outcome,
            planned_stops: journey.planned_stops,
            remaining_stops: journey.stops.len(),
            checked_in_stops: journey.checked_in_count(),
            points: reward.total_points,
            created_at: journey.created_at,
            completed_at,
        }
    }
}

/// Read the stored history. A missing key is an empty history.
///
/// # Errors
///
/// Returns an error if the store fails or the history does not decode.
pub(crate) async fn load_history(
    store: &dyn KeyValueStore,
) -> Result<Vec<JourneyHistoryEntry>, StoreError> {
    Ok(get_json(store, KEY_JOURNEY_HISTORY).await?.unwrap_or_default())
}

/// Prepend `entry` and trim to `limit`. Re-recording the same journey is a no-op.
pub(crate) async fn push_history(
    store: &dyn KeyValueStore,
    entry: JourneyHistoryEntry,
    limit: usize,
) -> Result<(), StoreError> {
    let mut history = match load_history(store).await {
        Ok(history) => history,
        Err(StoreError::Corrupt { .. }) => {
            log::warn!("journey history unreadable, starting a fresh list");
            Vec::new()
        }
        Err(err) => return Err(err),
    };
    if history
        .first()
        .is_some_and(|head| head.created_at == entry.created_at)
    {
        return Ok(());
    }
    history.insert(0, entry);
    history.truncate(limit);
    set_json(store, KEY_JOURNEY_HISTORY, &history).await
}

/// Cumulative point balance stored under `user_points`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsLedger {
    pub balance: u64,
    /// `createdAt` of the last journey credited; guards double crediting.
    #[serde(default)]
    pub last_credited: Option<DateTime<Utc>>,
}

impl PointsLedger {
    /// Load the ledger, or an empty one when none is stored. An undecodable
    /// ledger is logged and replaced by an empty one.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn load(store: &dyn KeyValueStore) -> Result<Self, StoreError> {
        match get_json(store, KEY_USER_POINTS).await {
            Ok(ledger) => Ok(ledger.unwrap_or_default()),
            Err(StoreError::Corrupt { .. }) => {
                log::warn!("points ledger unreadable, starting from zero");
                Ok(Self::default())
            }
            Err(err) => Err(err),
        }
    }

    /// Add `points` for the journey created at `journey_created_at`.
    ///
    /// Returns `false` without changing the balance if that journey was
    /// already credited.
    pub fn credit(&mut self, journey_created_at: DateTime<Utc>, points: u32) -> bool {
        if self.last_credited == Some(journey_created_at) {
            return false;
        }
        self.balance = self.balance.saturating_add(u64::from(points));
        self.last_credited = Some(journey_created_at);
        true
    }

    pub(crate) async fn save(&self, store: &dyn KeyValueStore) -> Result<(), StoreError> {
        set_json(store, KEY_USER_POINTS, self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn entry(minute: u32) -> JourneyHistoryEntry {
        let at: DateTime<Utc> = format!("2024-06-03T10:{minute:02}:00Z").parse().unwrap();
        JourneyHistoryEntry {
            deal_type: DealType::Daily,
            outcome: JourneyOutcome::Completed,
            planned_stops: 3,
            remaining_stops: 3,
            checked_in_stops: 3,
            points: 125,
            created_at: at,
            completed_at: at,
        }
    }

    #[tokio::test]
    async fn history_is_most_recent_first_and_bounded() {
        let store = MemoryStore::new();
        for minute in 0..25 {
            push_history(&store, entry(minute), 20).await.unwrap();
        }
        let history = load_history(&store).await.unwrap();
        assert_eq!(history.len(), 20);
        assert_eq!(history[0], entry(24));
        assert_eq!(history[19], entry(5));

        push_history(&store, entry(24), 20).await.unwrap();
        assert_eq!(load_history(&store).await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn ledger_credits_each_journey_once() {
        let store = MemoryStore::new();
        let mut ledger = PointsLedger::load(&store).await.unwrap();
        let created = entry(0).created_at;
        assert!(ledger.credit(created, 125));
        assert!(!ledger.credit(created, 125));
        assert!(ledger.credit(entry(1).created_at, 10));
        ledger.save(&store).await.unwrap();
        assert_eq!(PointsLedger::load(&store).await.unwrap().balance, 135);
    }
}
