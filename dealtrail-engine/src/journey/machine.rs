//! Single-slot journey lifecycle with a soft expiry lease.
//!
//! Every transition updates memory first and then writes the journey record,
//! followed by the route record. There is no multi-key atomicity; a crash
//! between the two writes leaves a journey whose route is rebuilt on recovery.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use super::history::{JourneyHistoryEntry, JourneyOutcome, PointsLedger, load_history, push_history};
use super::{CheckInType, JourneyRecord, StopRecord};
use crate::clock::Clock;
use crate::config::{JourneyConfig, PlannerConfig};
use crate::constants::{JOURNEY_SCHEMA_VERSION, KEY_CURRENT_JOURNEY, KEY_CURRENT_ROUTE};
use crate::error::ErrorKind;
use crate::planner::{PlannedJourney, RouteSummary};
use crate::redemption::{RedemptionRecord, RedemptionTracker};
use crate::reward::{RewardBreakdown, RewardCalculator};
use crate::store::{KeyValueStore, StoreError, get_json, set_json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum JourneyPhase {
    Inactive,
    Active,
    Completing,
    Terminating,
}

#[derive(Debug, Error)]
pub enum JourneyError {
    #[error("cannot {action} while the journey is {phase:?}")]
    InvalidTransition {
        action: &'static str,
        phase: JourneyPhase,
    },
    #[error("stop {index} is out of range for a journey with {len} stops")]
    StopOutOfRange { index: usize, len: usize },
    #[error("check-in type `none` cannot confirm a visit")]
    InvalidCheckIn,
    #[error("a journey needs at least one stop")]
    EmptyJourney,
    #[error("{remaining} stops remain; terminate to end the journey early")]
    StopsRemaining { remaining: usize },
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl JourneyError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Storage(_) => ErrorKind::StorageUnavailable,
            Self::InvalidTransition { .. }
            | Self::StopOutOfRange { .. }
            | Self::InvalidCheckIn
            | Self::EmptyJourney
            | Self::StopsRemaining { .. } => ErrorKind::InvalidTransition,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum AdvanceOutcome {
    Moved { index: usize },
    /// Already on the last stop; `complete()` is the next step.
    AtFinalStop,
}

/// What `recover()` found in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RecoveryOutcome {
    NoJourney,
    Restored,
    Expired { created_at: DateTime<Utc> },
    /// The stored record could not be decoded and was cleared.
    Corrupt,
    /// Written by a newer build; left in place untouched.
    UnsupportedVersion { found: u32 },
}

impl RecoveryOutcome {
    #[must_use]
    pub const fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Expired { .. } => Some(ErrorKind::ExpiredJourney),
            Self::Corrupt | Self::UnsupportedVersion { .. } => Some(ErrorKind::StorageUnavailable),
            Self::NoJourney | Self::Restored => None,
        }
    }
}

/// Final state of a completed or terminated journey.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyResult {
    pub outcome: JourneyOutcome,
    pub journey: JourneyRecord,
    pub reward: RewardBreakdown,
    /// False when this journey had already been credited to the ledger.
    pub credited: bool,
    pub balance: u64,
}

/// Owns the one active-journey slot.
pub struct JourneyStateMachine {
    store: Arc<dyn KeyValueStore>,
    tracker: RedemptionTracker,
    clock: Arc<dyn Clock>,
    rewards: RewardCalculator,
    config: JourneyConfig,
    planner: PlannerConfig,
    phase: JourneyPhase,
    journey: Option<JourneyRecord>,
    route: Option<RouteSummary>,
}

impl std::fmt::Debug for JourneyStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JourneyStateMachine")
            .field("phase", &self.phase)
            .field("journey", &self.journey)
            .finish_non_exhaustive()
    }
}

impl JourneyStateMachine {
    #[must_use]
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        tracker: RedemptionTracker,
        clock: Arc<dyn Clock>,
        rewards: RewardCalculator,
        config: JourneyConfig,
        planner: PlannerConfig,
    ) -> Self {
        Self {
            store,
            tracker,
            clock,
            rewards,
            config,
            planner,
            phase: JourneyPhase::Inactive,
            journey: None,
            route: None,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> JourneyPhase {
        self.phase
    }

    #[must_use]
    pub const fn journey(&self) -> Option<&JourneyRecord> {
        self.journey.as_ref()
    }

    #[must_use]
    pub const fn route(&self) -> Option<&RouteSummary> {
        self.route.as_ref()
    }

    fn reject(&self, action: &'static str) -> JourneyError {
        log::error!("rejected {action}: journey is {:?}", self.phase);
        JourneyError::InvalidTransition {
            action,
            phase: self.phase,
        }
    }

    fn active_journey(&mut self, action: &'static str) -> Result<&mut JourneyRecord, JourneyError> {
        if self.phase != JourneyPhase::Active {
            return Err(self.reject(action));
        }
        match self.journey.as_mut() {
            Some(journey) => Ok(journey),
            None => {
                log::error!("rejected {action}: active phase without a journey record");
                Err(JourneyError::InvalidTransition {
                    action,
                    phase: JourneyPhase::Active,
                })
            }
        }
    }

    /// Begin a planned journey. Only valid while inactive.
    ///
    /// The in-memory transition stands even if the durable write fails.
    ///
    /// # Errors
    ///
    /// Rejects a second journey, an empty plan, or a failed write.
    pub async fn start(&mut self, plan: PlannedJourney) -> Result<&JourneyRecord, JourneyError> {
        if self.phase != JourneyPhase::Inactive {
            return Err(self.reject("start"));
        }
        if plan.stops.is_empty() {
            log::error!("rejected start: plan has no stops");
            return Err(JourneyError::EmptyJourney);
        }
        let record = JourneyRecord::new(
            plan.deal_type,
            plan.stops,
            plan.max_distance_miles,
            plan.origin,
            self.clock.now(),
        );
        log::info!(
            "journey started: {} stops for {} deals",
            record.total_stops,
            record.deal_type
        );
        self.journey = Some(record);
        self.route = Some(plan.route);
        self.phase = JourneyPhase::Active;
        self.persist().await?;
        self.journey.as_ref().ok_or(JourneyError::EmptyJourney)
    }

    /// Move to the next stop, or report that the final stop is reached.
    ///
    /// # Errors
    ///
    /// Rejects the call unless a journey is active; surfaces write failures.
    pub async fn advance(&mut self) -> Result<AdvanceOutcome, JourneyError> {
        let journey = self.active_journey("advance")?;
        if journey.is_on_final_stop() {
            return Ok(AdvanceOutcome::AtFinalStop);
        }
        journey.current_stop_index += 1;
        let index = journey.current_stop_index;
        log::debug!("journey advanced to stop {index}");
        self.persist().await?;
        Ok(AdvanceOutcome::Moved { index })
    }

    /// Drop the current stop from the journey and return it.
    ///
    /// # Errors
    ///
    /// Rejects the call unless a journey with stops left is active.
    pub async fn skip(&mut self) -> Result<StopRecord, JourneyError> {
        let journey = self.active_journey("skip")?;
        let len = journey.stops.len();
        let index = journey.current_stop_index;
        let Some(removed) = journey.remove_current() else {
            log::error!("rejected skip: no stop at {index}");
            return Err(JourneyError::StopOutOfRange { index, len });
        };
        log::debug!(
            "skipped {} ({} stops left)",
            removed.vendor.name,
            journey.total_stops
        );
        self.rebuild_route();
        self.persist().await?;
        Ok(removed)
    }

    /// Confirm a visit to `stop_index` and record today's redemption.
    ///
    /// A failed redemption write is logged and reported as `None`; the
    /// check-in itself still stands.
    ///
    /// # Errors
    ///
    /// Rejects `none` check-ins, out-of-range indexes, and calls while not active.
    pub async fn mark_checked_in(
        &mut self,
        stop_index: usize,
        check_in: CheckInType,
    ) -> Result<Option<RedemptionRecord>, JourneyError> {
        let now = self.clock.now();
        let journey = self.active_journey("check in")?;
        if !check_in.redeems() {
            log::error!("rejected check in: type `none`");
            return Err(JourneyError::InvalidCheckIn);
        }
        let deal_type = journey.deal_type;
        let len = journey.stops.len();
        let Some(stop) = journey.stops.get_mut(stop_index) else {
            log::error!("rejected check in: stop {stop_index} of {len}");
            return Err(JourneyError::StopOutOfRange {
                index: stop_index,
                len,
            });
        };
        stop.checked_in = true;
        stop.check_in_type = check_in;
        stop.checked_in_at = Some(now);
        let vendor_id = stop.vendor.id.clone();
        self.persist().await?;

        match self.tracker.record_redemption(&vendor_id, deal_type).await {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                log::warn!("check-in at {vendor_id} kept, redemption not recorded: {err}");
                Ok(None)
            }
        }
    }

    /// Finish a journey that has reached its final stop.
    ///
    /// # Errors
    ///
    /// Rejects the call unless active on the final stop; surfaces write failures.
    pub async fn complete(&mut self) -> Result<JourneyResult, JourneyError> {
        let journey = self.active_journey("complete")?;
        if !journey.is_on_final_stop() {
            let remaining = journey.remaining_after_current();
            log::error!("rejected complete: {remaining} stops remain");
            return Err(JourneyError::StopsRemaining { remaining });
        }
        self.finish(JourneyOutcome::Completed).await
    }

    /// End the journey early. Scores whatever was checked in.
    ///
    /// # Errors
    ///
    /// Rejects the call unless active; surfaces write failures.
    pub async fn terminate(&mut self) -> Result<JourneyResult, JourneyError> {
        self.active_journey("terminate")?;
        self.finish(JourneyOutcome::Terminated).await
    }

    async fn finish(&mut self, outcome: JourneyOutcome) -> Result<JourneyResult, JourneyError> {
        self.phase = match outcome {
            JourneyOutcome::Completed => JourneyPhase::Completing,
            JourneyOutcome::Terminated => JourneyPhase::Terminating,
        };
        let Some(mut journey) = self.journey.clone() else {
            self.phase = JourneyPhase::Inactive;
            return Err(self.reject("finish"));
        };
        let now = self.clock.now();
        journey.completed_at = Some(now);
        let reward = self.rewards.score(&journey);

        match self.settle(&journey, outcome, &reward, now).await {
            Ok((credited, balance)) => {
                self.journey = None;
                self.route = None;
                self.phase = JourneyPhase::Inactive;
                log::info!(
                    "journey {outcome:?}: {} points (balance {balance})",
                    reward.total_points
                );
                Ok(JourneyResult {
                    outcome,
                    journey,
                    reward,
                    credited,
                    balance,
                })
            }
            Err(err) => {
                log::warn!("journey {outcome:?} could not be settled, still active: {err}");
                self.phase = JourneyPhase::Active;
                Err(err.into())
            }
        }
    }

    // Ledger first so a crash before the clear re-settles without double credit.
    async fn settle(
        &self,
        journey: &JourneyRecord,
        outcome: JourneyOutcome,
        reward: &RewardBreakdown,
        now: DateTime<Utc>,
    ) -> Result<(bool, u64), StoreError> {
        let store = self.store.as_ref();
        let mut ledger = PointsLedger::load(store).await?;
        let credited = ledger.credit(journey.created_at, reward.total_points);
        if credited {
            ledger.save(store).await?;
        }
        let entry = JourneyHistoryEntry::from_journey(journey, outcome, reward, now);
        push_history(store, entry, self.config.history_limit).await?;
        self.clear_storage().await?;
        Ok((credited, ledger.balance))
    }

    /// Drop the active journey without scoring it.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted keys cannot be removed.
    pub async fn clear(&mut self) -> Result<(), JourneyError> {
        self.journey = None;
        self.route = None;
        self.phase = JourneyPhase::Inactive;
        self.clear_storage().await?;
        Ok(())
    }

    /// Restore a persisted journey at process start.
    ///
    /// Journeys older than the lease are cleared and reported as expired.
    ///
    /// # Errors
    ///
    /// Rejects the call while a journey is already loaded; surfaces store failures.
    pub async fn recover(&mut self) -> Result<RecoveryOutcome, JourneyError> {
        if self.phase != JourneyPhase::Inactive {
            return Err(self.reject("recover"));
        }
        let Some(raw) = self.store.get(KEY_CURRENT_JOURNEY).await? else {
            return Ok(RecoveryOutcome::NoJourney);
        };
        let record = match serde_json::from_str::<JourneyRecord>(&raw) {
            Ok(record) => record,
            Err(err) => {
                if let Some(found) = newer_schema_version(&raw) {
                    log::warn!("stored journey uses schema {found}, leaving it in place");
                    return Ok(RecoveryOutcome::UnsupportedVersion { found });
                }
                log::warn!("stored journey is unreadable, clearing it: {err}");
                self.clear_storage().await?;
                return Ok(RecoveryOutcome::Corrupt);
            }
        };
        let legacy = record.schema_version < JOURNEY_SCHEMA_VERSION;
        let record = match record.migrate() {
            Ok(record) => record,
            Err(found) => {
                log::warn!("stored journey uses schema {found}, leaving it in place");
                return Ok(RecoveryOutcome::UnsupportedVersion { found });
            }
        };
        if record.is_expired(self.clock.now(), self.config.lease()) {
            log::info!("journey from {} outlived its lease", record.created_at);
            self.clear_storage().await?;
            return Ok(RecoveryOutcome::Expired {
                created_at: record.created_at,
            });
        }

        let route = match get_json::<RouteSummary>(self.store.as_ref(), KEY_CURRENT_ROUTE).await {
            Ok(route) => route,
            Err(err) => {
                log::warn!("stored route unreadable, rebuilding: {err}");
                None
            }
        };
        self.journey = Some(record);
        self.phase = JourneyPhase::Active;
        match route {
            Some(route) if !legacy => self.route = Some(route),
            _ => {
                self.rebuild_route();
                self.persist().await?;
            }
        }
        log::info!("journey restored");
        Ok(RecoveryOutcome::Restored)
    }

    /// Recent finished journeys, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the history cannot be read.
    pub async fn history(&self) -> Result<Vec<JourneyHistoryEntry>, JourneyError> {
        Ok(load_history(self.store.as_ref()).await?)
    }

    fn rebuild_route(&mut self) {
        self.route = self.journey.as_ref().map(|journey| {
            let origin = journey
                .origin
                .or_else(|| journey.stops.first().map(|stop| stop.vendor.coordinates));
            match origin {
                Some(origin) => RouteSummary::build(origin, &journey.stops, &self.planner),
                None => RouteSummary {
                    coordinates: Vec::new(),
                    total_distance: 0.0,
                    estimated_time_minutes: 0,
                },
            }
        });
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let Some(journey) = self.journey.as_ref() else {
            return Ok(());
        };
        let store = self.store.as_ref();
        set_json(store, KEY_CURRENT_JOURNEY, journey).await?;
        if let Some(route) = self.route.as_ref() {
            set_json(store, KEY_CURRENT_ROUTE, route).await?;
        }
        Ok(())
    }

    async fn clear_storage(&self) -> Result<(), StoreError> {
        self.store
            .multi_remove(&[
                KEY_CURRENT_JOURNEY.to_string(),
                KEY_CURRENT_ROUTE.to_string(),
            ])
            .await
    }
}

fn newer_schema_version(raw: &str) -> Option<u32> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let version = u32::try_from(value.get("schemaVersion")?.as_u64()?).ok()?;
    (version > JOURNEY_SCHEMA_VERSION).then_some(version)
}
