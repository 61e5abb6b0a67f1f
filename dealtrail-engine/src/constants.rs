//! Centralized tuning constants and storage keys for Dealtrail engine logic.
//!
//! Defaults here seed [`crate::config::EngineConfig`]; anything a deployment
//! may tune lives in the config, while wire names and formulas stay fixed.

// Durable store keys ---------------------------------------------------------
pub const KEY_CURRENT_JOURNEY: &str = "current_journey";
pub const KEY_CURRENT_ROUTE: &str = "current_route_data";
pub const KEY_JOURNEY_HISTORY: &str = "journey_history";
pub const KEY_USER_POINTS: &str = "user_points";
pub const REDEMPTION_KEY_PREFIX: &str = "redemption:";

// Geometry -------------------------------------------------------------------
pub(crate) const EARTH_RADIUS_MILES: f64 = 3_958.8;

// Planner defaults -----------------------------------------------------------
pub(crate) const DEFAULT_MAX_STOPS: usize = 5;
pub(crate) const MAX_STOPS_CEILING: usize = 10;
pub(crate) const DEFAULT_MAX_DISTANCE_MILES: f64 = 25.0;
pub(crate) const MINUTES_PER_MILE: f64 = 3.0;
pub(crate) const DWELL_MINUTES_PER_STOP: f64 = 10.0;

// Journey lifecycle ----------------------------------------------------------
pub(crate) const JOURNEY_LEASE_HOURS: u32 = 24;
pub(crate) const JOURNEY_HISTORY_LIMIT: usize = 20;
pub const JOURNEY_SCHEMA_VERSION: u32 = 1;

// Rewards --------------------------------------------------------------------
pub(crate) const CHECKIN_POINTS: u32 = 10;
pub(crate) const QR_SKIPPED_POINTS: u32 = 5;
pub(crate) const MILESTONE_POINTS: u32 = 25;
pub(crate) const MILESTONE_COUNT: u32 = 4;
pub(crate) const MIN_QR_COMPLIANCE: f64 = 0.5;

// User-facing messages -------------------------------------------------------
pub(crate) const MSG_CACHE_UNAVAILABLE: &str =
    "Deals are still loading. Please wait a moment and try again.";
pub(crate) const MSG_NO_MATCHING_VENDORS: &str =
    "No vendors are offering this kind of deal right now. Try a different deal type.";
pub(crate) const MSG_ALL_REDEEMED: &str =
    "You've already redeemed every available deal of this type today. Come back tomorrow!";
pub(crate) const MSG_DISTANCE_EXCEEDED: &str =
    "No matching vendors are within range. Try widening your search distance.";
pub(crate) const MSG_LOW_QR_COMPLIANCE: &str =
    "Completion bonus not awarded: scan the QR code at at least half of the QR-enabled stops to earn it.";
