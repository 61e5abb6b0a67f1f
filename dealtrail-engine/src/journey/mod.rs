//! Persisted journey records and the lifecycle that drives them.
//!
//! A journey is a device-wide singleton: at most one [`JourneyRecord`] lives
//! under [`KEY_CURRENT_JOURNEY`](crate::constants::KEY_CURRENT_JOURNEY) at a
//! time. Vendor data is copied into each [`StopRecord`] so cache refreshes do
//! not rewrite an in-progress journey.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::JOURNEY_SCHEMA_VERSION;
use crate::proximity::Coordinates;
use crate::vendor::{DealType, VendorRecord};

mod history;
mod machine;

pub use history::{JourneyHistoryEntry, JourneyOutcome, PointsLedger};
pub use machine::{
    AdvanceOutcome, JourneyError, JourneyPhase, JourneyResult, JourneyStateMachine,
    RecoveryOutcome,
};

/// How a stop visit was confirmed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CheckInType {
    /// Vendor QR code scanned.
    Qr,
    /// Vendor has a code but the user skipped scanning it.
    QrSkipped,
    #[default]
    None,
}

impl CheckInType {
    /// Whether this check-in consumes the vendor's deal for the day.
    #[must_use]
    pub const fn redeems(self) -> bool {
        matches!(self, Self::Qr | Self::QrSkipped)
    }
}

impl std::str::FromStr for CheckInType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "qr" => Ok(Self::Qr),
            "qrskipped" | "qr-skipped" | "skipped" => Ok(Self::QrSkipped),
            "none" => Ok(Self::None),
            other => Err(format!("unknown check-in type `{other}`")),
        }
    }
}

/// One vendor stop inside a journey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRecord {
    pub vendor: VendorRecord,
    #[serde(default)]
    pub checked_in: bool,
    #[serde(default)]
    pub check_in_type: CheckInType,
    #[serde(default)]
    pub has_qr_code: bool,
    /// Miles from the previous stop, or from the origin for the first stop.
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub distance_from_origin: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_in_at: Option<DateTime<Utc>>,
}

impl StopRecord {
    #[must_use]
    pub fn new(vendor: VendorRecord, distance: f64, distance_from_origin: f64) -> Self {
        Self {
            has_qr_code: vendor.has_qr_code,
            vendor,
            checked_in: false,
            check_in_type: CheckInType::None,
            distance,
            distance_from_origin,
            checked_in_at: None,
        }
    }
}

/// The active journey as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyRecord {
    /// Records written before versioning lack this field and read as 0.
    #[serde(default)]
    pub schema_version: u32,
    pub deal_type: DealType,
    #[serde(default)]
    pub stops: Vec<StopRecord>,
    #[serde(default, deserialize_with = "lenient_index")]
    pub current_stop_index: usize,
    #[serde(default)]
    pub total_stops: usize,
    /// Stop count at start; completion is measured against it.
    #[serde(default)]
    pub planned_stops: usize,
    #[serde(default)]
    pub max_distance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Coordinates>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

// Legacy records used -1 for "no current stop".
fn lenient_index<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    Ok(usize::try_from(raw).unwrap_or(0))
}

impl JourneyRecord {
    #[must_use]
    pub fn new(
        deal_type: DealType,
        stops: Vec<StopRecord>,
        max_distance: f64,
        origin: Coordinates,
        created_at: DateTime<Utc>,
    ) -> Self {
        let total = stops.len();
        Self {
            schema_version: JOURNEY_SCHEMA_VERSION,
            deal_type,
            stops,
            current_stop_index: 0,
            total_stops: total,
            planned_stops: total,
            max_distance,
            origin: Some(origin),
            created_at,
            completed_at: None,
        }
    }

    #[must_use]
    pub fn current_stop(&self) -> Option<&StopRecord> {
        self.stops.get(self.current_stop_index)
    }

    /// True when no stop lies beyond the current one.
    #[must_use]
    pub fn is_on_final_stop(&self) -> bool {
        self.current_stop_index + 1 >= self.stops.len()
    }

    #[must_use]
    pub fn remaining_after_current(&self) -> usize {
        self.stops
            .len()
            .saturating_sub(self.current_stop_index + 1)
    }

    #[must_use]
    pub fn checked_in_count(&self) -> usize {
        self.stops.iter().filter(|stop| stop.checked_in).count()
    }

    /// Whether the lease has run out at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, lease: chrono::Duration) -> bool {
        now.signed_duration_since(self.created_at) > lease
    }

    /// Remove the current stop and re-establish the index invariants.
    pub(crate) fn remove_current(&mut self) -> Option<StopRecord> {
        if self.current_stop_index >= self.stops.len() {
            self.normalize();
            return None;
        }
        let removed = self.stops.remove(self.current_stop_index);
        self.normalize();
        Some(removed)
    }

    /// Clamp the index into range and resync `total_stops`.
    pub(crate) fn normalize(&mut self) {
        self.total_stops = self.stops.len();
        self.current_stop_index = self
            .current_stop_index
            .min(self.stops.len().saturating_sub(1));
    }

    /// Bring an older record up to the current schema.
    ///
    /// # Errors
    ///
    /// Returns the stored version when it is newer than this build understands.
    pub fn migrate(mut self) -> Result<Self, u32> {
        if self.schema_version > JOURNEY_SCHEMA_VERSION {
            return Err(self.schema_version);
        }
        if self.schema_version == 0 {
            if self.total_stops == 0 {
                self.total_stops = self.stops.len();
            }
            if self.planned_stops == 0 {
                self.planned_stops = self.total_stops.max(self.stops.len());
            }
            for stop in &mut self.stops {
                stop.has_qr_code |= stop.vendor.has_qr_code;
            }
            self.schema_version = JOURNEY_SCHEMA_VERSION;
        }
        self.normalize();
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vendor(id: u32) -> VendorRecord {
        serde_json::from_value(json!({
            "id": id,
            "name": format!("Vendor {id}"),
            "coordinates": { "latitude": 61.2, "longitude": -149.9 },
            "hasQrCode": true
        }))
        .unwrap()
    }

    fn record(stops: u32) -> JourneyRecord {
        JourneyRecord::new(
            DealType::Daily,
            (1..=stops).map(|id| StopRecord::new(vendor(id), 1.0, 1.0)).collect(),
            10.0,
            Coordinates::new(61.2, -149.9),
            "2024-06-03T18:00:00Z".parse().unwrap(),
        )
    }

    #[test]
    fn removing_the_last_stop_clamps_the_index() {
        let mut journey = record(3);
        journey.current_stop_index = 2;
        let removed = journey.remove_current().unwrap();
        assert_eq!(removed.vendor.id.as_str(), "3");
        assert_eq!(journey.current_stop_index, 1);
        assert_eq!(journey.total_stops, 2);

        journey.remove_current();
        journey.remove_current();
        assert!(journey.stops.is_empty());
        assert_eq!(journey.current_stop_index, 0);
        assert_eq!(journey.total_stops, 0);
        assert!(journey.remove_current().is_none());
        assert_eq!(journey.planned_stops, 3);
    }

    #[test]
    fn wire_format_uses_camel_case_contract_names() {
        let journey = record(1);
        let wire = serde_json::to_value(&journey).unwrap();
        assert_eq!(wire["dealType"], json!("daily"));
        assert_eq!(wire["currentStopIndex"], json!(0));
        assert_eq!(wire["schemaVersion"], json!(1));
        assert_eq!(wire["stops"][0]["checkInType"], json!("none"));
        assert_eq!(wire["stops"][0]["hasQrCode"], json!(true));
    }

    #[test]
    fn legacy_records_migrate_on_read() {
        let legacy = json!({
            "dealType": "daily",
            "stops": [{ "vendor": serde_json::to_value(vendor(7)).unwrap(), "distance": 1.2 }],
            "currentStopIndex": -1,
            "totalStops": 4,
            "maxDistance": 15,
            "createdAt": "2024-06-03T18:00:00Z"
        });
        let parsed: JourneyRecord = serde_json::from_value(legacy).unwrap();
        assert_eq!(parsed.schema_version, 0);
        let migrated = parsed.migrate().unwrap();
        assert_eq!(migrated.schema_version, JOURNEY_SCHEMA_VERSION);
        assert_eq!(migrated.planned_stops, 4);
        assert_eq!(migrated.total_stops, 1);
        assert_eq!(migrated.current_stop_index, 0);
        assert!(migrated.stops[0].has_qr_code);

        let mut future = record(1);
        future.schema_version = JOURNEY_SCHEMA_VERSION + 1;
        assert_eq!(future.migrate(), Err(JOURNEY_SCHEMA_VERSION + 1));
    }

    #[test]
    fn lease_expires_strictly_after_window() {
        let journey = record(1);
        let lease = chrono::Duration::hours(24);
        assert!(!journey.is_expired(journey.created_at + lease, lease));
        assert!(journey.is_expired(journey.created_at + lease + chrono::Duration::seconds(1), lease));
    }

    #[test]
    fn check_in_types_parse_and_redeem() {
        assert_eq!("qrSkipped".parse::<CheckInType>(), Ok(CheckInType::QrSkipped));
        assert_eq!("QR".parse::<CheckInType>(), Ok(CheckInType::Qr));
        assert!("scan".parse::<CheckInType>().is_err());
        assert!(CheckInType::Qr.redeems());
        assert!(!CheckInType::None.redeems());
    }
}
