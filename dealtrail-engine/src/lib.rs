//! Dealtrail Engine
//!
//! Platform-agnostic journey planning and redemption eligibility for the
//! Dealtrail deal finder. Turns a deal-type preference and a location into an
//! ordered, eligibility-filtered multi-stop journey, drives that journey's
//! lifecycle across restarts, and scores the loyalty reward at the end.
//! Storage, the vendor feed and the wall clock enter through traits.

pub mod cache;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod journey;
pub mod numbers;
pub mod planner;
pub mod proximity;
pub mod redemption;
pub mod reward;
pub mod store;
pub mod vendor;

use std::sync::Arc;

// Re-export commonly used types
pub use cache::{
    CacheError, CacheEvent, CacheEventKind, CacheState, SourceError, StaticVendorSource,
    SubscriptionId, VendorDealCache, VendorSource,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, EngineConfig, JourneyConfig, PlannerConfig, RewardConfig};
pub use error::ErrorKind;
pub use journey::{
    AdvanceOutcome, CheckInType, JourneyError, JourneyHistoryEntry, JourneyOutcome, JourneyPhase,
    JourneyRecord, JourneyResult, JourneyStateMachine, PointsLedger, RecoveryOutcome, StopRecord,
};
pub use planner::{
    JourneyCriteria, JourneyPlanner, PlanError, PlanResponse, PlannedJourney, RouteSummary,
};
pub use proximity::{Coordinates, RankedVendor, distance_miles, path_length, rank};
pub use redemption::{
    RedemptionKey, RedemptionRecord, RedemptionStats, RedemptionTally, RedemptionTracker,
};
pub use reward::{RewardBreakdown, RewardCalculator};
pub use store::{KeyValueStore, MemoryStore, StoreError};
pub use vendor::{
    ContactInfo, DayOfWeek, Deal, DealFilters, DealRecord, DealType, MultiDayDeal, OpeningHours,
    SpecialDeal, VendorDeals, VendorId, VendorRecord,
};

/// Composition root: builds each service once and hands them out.
pub struct DealEngine {
    config: EngineConfig,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    cache: Arc<VendorDealCache>,
    tracker: RedemptionTracker,
    planner: JourneyPlanner,
}

impl std::fmt::Debug for DealEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DealEngine")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl DealEngine {
    /// Wire the engine around the provided collaborators.
    #[must_use]
    pub fn new(
        source: Arc<dyn VendorSource>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let cache = Arc::new(VendorDealCache::new(source));
        let tracker = RedemptionTracker::new(Arc::clone(&store), Arc::clone(&clock));
        let planner = JourneyPlanner::new(
            Arc::clone(&cache),
            tracker.clone(),
            Arc::clone(&clock),
            config.planner.clone(),
        );
        Self {
            config,
            store,
            clock,
            cache,
            tracker,
            planner,
        }
    }

    /// Engine on the system clock with default tuning.
    #[must_use]
    pub fn with_defaults(source: Arc<dyn VendorSource>, store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(source, store, Arc::new(SystemClock), EngineConfig::default())
    }

    /// Load the vendor cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the vendor source fails.
    pub async fn initialize(&self) -> Result<usize, CacheError> {
        self.cache.initialize().await
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub const fn cache(&self) -> &Arc<VendorDealCache> {
        &self.cache
    }

    #[must_use]
    pub const fn tracker(&self) -> &RedemptionTracker {
        &self.tracker
    }

    #[must_use]
    pub const fn planner(&self) -> &JourneyPlanner {
        &self.planner
    }

    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Plan a journey and wrap the outcome in the consumer envelope.
    pub async fn plan(&self, criteria: &JourneyCriteria) -> PlanResponse {
        PlanResponse::from(self.planner.create_journey(criteria).await)
    }

    /// A fresh, inactive state machine bound to this engine's services.
    #[must_use]
    pub fn journey_machine(&self) -> JourneyStateMachine {
        JourneyStateMachine::new(
            Arc::clone(&self.store),
            self.tracker.clone(),
            Arc::clone(&self.clock),
            RewardCalculator::new(self.config.rewards.clone()),
            self.config.journey.clone(),
            self.config.planner.clone(),
        )
    }

    /// State machine after running recovery against the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or cleared.
    pub async fn resume(&self) -> Result<(JourneyStateMachine, RecoveryOutcome), JourneyError> {
        let mut machine = self.journey_machine();
        let outcome = machine.recover().await?;
        Ok((machine, outcome))
    }

    /// Current cumulative point balance.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read.
    pub async fn points(&self) -> Result<PointsLedger, StoreError> {
        PointsLedger::load(self.store.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine(store: MemoryStore) -> DealEngine {
        let source = StaticVendorSource::from_json(
            &json!([{
                "id": 1,
                "name": "Kaladi Brothers",
                "coordinates": { "latitude": 61.2186, "longitude": -149.8997 },
                "hasQrCode": false,
                "deals": { "birthday": { "title": "Free drink" } }
            }])
            .to_string(),
        )
        .unwrap();
        let clock = FixedClock::parse("2024-06-03T09:00:00-08:00").unwrap();
        DealEngine::new(
            Arc::new(source),
            Arc::new(store),
            Arc::new(clock),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn engine_plans_runs_and_resumes_a_journey() {
        let store = MemoryStore::new();
        let engine = engine(store.clone());
        assert_eq!(engine.initialize().await.unwrap(), 1);

        let criteria = JourneyCriteria::new(DealType::Birthday, Coordinates::new(61.2176, -149.8997));
        let response = engine.plan(&criteria).await;
        assert!(response.success);
        assert_eq!(response.vendors.as_ref().map(Vec::len), Some(1));

        let plan = engine.planner().create_journey(&criteria).await.unwrap();
        let mut machine = engine.journey_machine();
        machine.start(plan).await.unwrap();

        let (mut resumed, outcome) = engine.resume().await.unwrap();
        assert_eq!(outcome, RecoveryOutcome::Restored);
        resumed.mark_checked_in(0, CheckInType::QrSkipped).await.unwrap();
        let result = resumed.complete().await.unwrap();
        // 5 for the skipped scan plus four milestones; no QR stops means compliant.
        assert_eq!(result.reward.total_points, 105);
        assert_eq!(engine.points().await.unwrap().balance, 105);

        let response = engine.plan(&criteria).await;
        assert_eq!(response.error, Some(ErrorKind::AllVendorsRedeemed));
    }

    #[tokio::test]
    async fn plan_before_initialize_reports_cache_unavailable() {
        let engine = engine(MemoryStore::new());
        let criteria = JourneyCriteria::new(DealType::Birthday, Coordinates::new(61.2, -149.9));
        let response = engine.plan(&criteria).await;
        assert!(!response.success);
        assert_eq!(response.error, Some(ErrorKind::CacheUnavailable));
    }
}
