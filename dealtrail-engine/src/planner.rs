//! Journey planning: deal-type match, exclusion, eligibility, proximity, cap.
//!
//! Stops are taken nearest-first from the origin and kept in that order; no
//! further route optimization is attempted.
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::cache::{CacheState, VendorDealCache};
use crate::clock::Clock;
use crate::config::PlannerConfig;
use crate::constants::{
    MSG_ALL_REDEEMED, MSG_CACHE_UNAVAILABLE, MSG_DISTANCE_EXCEEDED, MSG_NO_MATCHING_VENDORS,
};
use crate::error::ErrorKind;
use crate::journey::StopRecord;
use crate::numbers::{round_f64_to_u32, usize_to_f64};
use crate::proximity::{Coordinates, RankedVendor, path_length, rank};
use crate::redemption::RedemptionTracker;
use crate::vendor::{DealFilters, DealType, VendorId};

/// Caller input for [`JourneyPlanner::create_journey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyCriteria {
    pub deal_type: DealType,
    /// Requested stop cap; defaults to 5 and never exceeds 10.
    #[serde(default)]
    pub max_stops: Option<usize>,
    #[serde(default)]
    pub max_distance_miles: Option<f64>,
    pub origin_coordinates: Coordinates,
    #[serde(default)]
    pub exclude_vendor_ids: Vec<VendorId>,
    #[serde(default)]
    pub filters: DealFilters,
}

impl JourneyCriteria {
    #[must_use]
    pub fn new(deal_type: DealType, origin: Coordinates) -> Self {
        Self {
            deal_type,
            max_stops: None,
            max_distance_miles: None,
            origin_coordinates: origin,
            exclude_vendor_ids: Vec::new(),
            filters: DealFilters::default(),
        }
    }

    #[must_use]
    pub const fn with_max_stops(mut self, max_stops: usize) -> Self {
        self.max_stops = Some(max_stops);
        self
    }

    #[must_use]
    pub const fn with_max_distance(mut self, miles: f64) -> Self {
        self.max_distance_miles = Some(miles);
        self
    }

    #[must_use]
    pub fn excluding(mut self, ids: impl IntoIterator<Item = VendorId>) -> Self {
        self.exclude_vendor_ids.extend(ids);
        self
    }

    #[must_use]
    pub fn with_filters(mut self, filters: DealFilters) -> Self {
        self.filters = filters;
        self
    }
}

/// Typed, user-actionable planning failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlanError {
    #[error("vendor cache unavailable (state: {0:?})")]
    CacheUnavailable(CacheState),
    #[error("no vendors offer {deal_type} deals")]
    NoMatchingVendors { deal_type: DealType },
    #[error("all {matched} vendors offering {deal_type} deals were already redeemed today")]
    AllVendorsRedeemed { deal_type: DealType, matched: usize },
    #[error("no eligible {deal_type} vendor within {max_distance_miles:.1} miles")]
    DistanceExceeded {
        deal_type: DealType,
        max_distance_miles: f64,
        nearest_miles: Option<f64>,
    },
}

impl PlanError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::CacheUnavailable(_) => ErrorKind::CacheUnavailable,
            Self::NoMatchingVendors { .. } => ErrorKind::NoMatchingVendors,
            Self::AllVendorsRedeemed { .. } => ErrorKind::AllVendorsRedeemed,
            Self::DistanceExceeded { .. } => ErrorKind::DistanceExceeded,
        }
    }

    /// Guidance shown to the user; each kind reads differently.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::CacheUnavailable(_) => MSG_CACHE_UNAVAILABLE,
            Self::NoMatchingVendors { .. } => MSG_NO_MATCHING_VENDORS,
            Self::AllVendorsRedeemed { .. } => MSG_ALL_REDEEMED,
            Self::DistanceExceeded { .. } => MSG_DISTANCE_EXCEEDED,
        }
    }
}

/// Derived path through the stops; never the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSummary {
    /// Origin followed by each stop, in visiting order.
    pub coordinates: Vec<Coordinates>,
    pub total_distance: f64,
    pub estimated_time_minutes: u32,
}

impl RouteSummary {
    /// Build a summary for `origin -> stop1 -> stop2 -> ...`.
    #[must_use]
    pub fn build(origin: Coordinates, stops: &[StopRecord], config: &PlannerConfig) -> Self {
        let coordinates: Vec<Coordinates> = std::iter::once(origin)
            .chain(stops.iter().map(|stop| stop.vendor.coordinates))
            .collect();
        let total_distance = path_length(&coordinates);
        let minutes = total_distance.mul_add(
            config.minutes_per_mile,
            usize_to_f64(stops.len()) * config.dwell_minutes_per_stop,
        );
        Self {
            coordinates,
            total_distance,
            estimated_time_minutes: round_f64_to_u32(minutes),
        }
    }
}

/// A successfully planned, not yet started journey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedJourney {
    pub deal_type: DealType,
    pub origin: Coordinates,
    pub max_distance_miles: f64,
    pub stops: Vec<StopRecord>,
    pub route: RouteSummary,
}

/// Consumer-facing `{success, vendors | error}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendors: Option<Vec<StopRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<Result<PlannedJourney, PlanError>> for PlanResponse {
    fn from(result: Result<PlannedJourney, PlanError>) -> Self {
        match result {
            Ok(plan) => Self {
                success: true,
                vendors: Some(plan.stops),
                route: Some(plan.route),
                error: None,
                message: None,
            },
            Err(err) => Self {
                success: false,
                vendors: None,
                route: None,
                error: Some(err.kind()),
                message: Some(err.user_message().to_string()),
            },
        }
    }
}

/// Composes cache, eligibility, and proximity into a journey plan.
#[derive(Clone)]
pub struct JourneyPlanner {
    cache: Arc<VendorDealCache>,
    tracker: RedemptionTracker,
    clock: Arc<dyn Clock>,
    config: PlannerConfig,
}

impl std::fmt::Debug for JourneyPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JourneyPlanner")
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl JourneyPlanner {
    #[must_use]
    pub fn new(
        cache: Arc<VendorDealCache>,
        tracker: RedemptionTracker,
        clock: Arc<dyn Clock>,
        config: PlannerConfig,
    ) -> Self {
        Self {
            cache,
            tracker,
            clock,
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plan a journey for `criteria`.
    ///
    /// # Errors
    ///
    /// Returns a [`PlanError`] naming which filter emptied the candidate set.
    pub async fn create_journey(
        &self,
        criteria: &JourneyCriteria,
    ) -> Result<PlannedJourney, PlanError> {
        let state = self.cache.state();
        if state != CacheState::Ready {
            return Err(PlanError::CacheUnavailable(state));
        }
        let deal_type = criteria.deal_type;
        let today = self.clock.today();

        let matching = self
            .cache
            .vendors_offering(deal_type, &criteria.filters, today);
        let excluded: HashSet<&VendorId> = criteria.exclude_vendor_ids.iter().collect();
        let candidates: Vec<_> = matching
            .into_iter()
            .filter(|vendor| !excluded.contains(&vendor.id))
            .collect();
        if candidates.is_empty() {
            log::info!("plan {deal_type}: no matching vendors");
            return Err(PlanError::NoMatchingVendors { deal_type });
        }

        let matched = candidates.len();
        let eligible = self.tracker.filter_redeemable(candidates, deal_type).await;
        if eligible.is_empty() {
            log::info!("plan {deal_type}: all {matched} matching vendors redeemed today");
            return Err(PlanError::AllVendorsRedeemed { deal_type, matched });
        }

        let max_distance_miles = criteria
            .max_distance_miles
            .filter(|miles| !miles.is_nan())
            .unwrap_or(self.config.default_max_distance_miles);
        let origin = criteria.origin_coordinates;
        let ranked = rank(eligible, origin, f64::INFINITY);
        let nearest_miles = ranked.first().map(|nearest| nearest.distance);
        let max_stops = self.config.effective_max_stops(criteria.max_stops);
        let selected: Vec<RankedVendor> = ranked
            .into_iter()
            .take_while(|candidate| candidate.distance <= max_distance_miles)
            .take(max_stops)
            .collect();
        if selected.is_empty() {
            log::info!(
                "plan {deal_type}: nothing within {max_distance_miles:.1} mi (nearest {nearest_miles:?})"
            );
            return Err(PlanError::DistanceExceeded {
                deal_type,
                max_distance_miles,
                nearest_miles,
            });
        }

        let stops = Self::build_stops(origin, selected);
        let route = RouteSummary::build(origin, &stops, &self.config);
        log::debug!(
            "plan {deal_type}: {} stops, {:.2} mi, ~{} min",
            stops.len(),
            route.total_distance,
            route.estimated_time_minutes
        );
        Ok(PlannedJourney {
            deal_type,
            origin,
            max_distance_miles,
            stops,
            route,
        })
    }

    fn build_stops(origin: Coordinates, selected: Vec<RankedVendor>) -> Vec<StopRecord> {
        let mut previous = origin;
        selected
            .into_iter()
            .map(|ranked| {
                let leg = previous.distance_to(ranked.vendor.coordinates);
                previous = ranked.vendor.coordinates;
                StopRecord::new(ranked.vendor, leg, ranked.distance)
            })
            .collect()
    }
}
