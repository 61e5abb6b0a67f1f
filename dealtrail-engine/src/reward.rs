//! Loyalty points for a finished journey.
use serde::{Deserialize, Serialize};

use crate::config::RewardConfig;
use crate::constants::MSG_LOW_QR_COMPLIANCE;
use crate::journey::{CheckInType, JourneyRecord};
use crate::numbers::{ratio_or, usize_to_u32};

/// Points awarded for one journey plus the ratios that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardBreakdown {
    pub checkin_points: u32,
    pub bonus_points: u32,
    pub total_points: u32,
    pub qr_compliance_rate: f64,
    pub completion_rate: f64,
    pub milestones: u32,
    /// Set when the completion bonus was withheld.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RewardCalculator {
    config: RewardConfig,
}

impl RewardCalculator {
    #[must_use]
    pub const fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    /// Score a journey from its check-in records.
    ///
    /// Check-ins earn full points unless the QR scan was skipped. The
    /// completion bonus pays per milestone reached against the planned stop
    /// count, and only when enough QR-capable stops were actually scanned.
    #[must_use]
    pub fn score(&self, journey: &JourneyRecord) -> RewardBreakdown {
        let cfg = &self.config;
        let checkin_points = journey
            .stops
            .iter()
            .filter(|stop| stop.checked_in)
            .map(|stop| match stop.check_in_type {
                CheckInType::QrSkipped => cfg.qr_skipped_points,
                CheckInType::Qr | CheckInType::None => cfg.checkin_points,
            })
            .sum::<u32>();

        let qr_capable = journey.stops.iter().filter(|stop| stop.has_qr_code).count();
        let scanned = journey
            .stops
            .iter()
            .filter(|stop| stop.has_qr_code && stop.check_in_type == CheckInType::Qr)
            .count();
        let qr_compliance_rate = ratio_or(scanned, qr_capable, 1.0);
        let compliant = qr_capable == 0 || qr_compliance_rate >= cfg.min_qr_compliance;

        let checked_in = journey.checked_in_count();
        let planned = journey.planned_stops;
        let completion_rate = ratio_or(checked_in, planned, 0.0).min(1.0);
        let milestones = if planned == 0 {
            0
        } else {
            let count = usize::try_from(cfg.milestone_count).unwrap_or(usize::MAX);
            let reached = checked_in.saturating_mul(count) / planned;
            usize_to_u32(reached).min(cfg.milestone_count)
        };

        let (bonus_points, notice) = if compliant {
            (milestones.saturating_mul(cfg.milestone_points), None)
        } else {
            (0, Some(MSG_LOW_QR_COMPLIANCE.to_string()))
        };

        RewardBreakdown {
            checkin_points,
            bonus_points,
            total_points: checkin_points.saturating_add(bonus_points),
            qr_compliance_rate,
            completion_rate,
            milestones,
            notice,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journey::StopRecord;
    use crate::proximity::Coordinates;
    use crate::vendor::{DealType, VendorRecord};
    use chrono::Utc;
    use serde_json::json;

    fn stop(id: u32, has_qr: bool, check_in: Option<CheckInType>) -> StopRecord {
        let vendor: VendorRecord = serde_json::from_value(json!({
            "id": id,
            "name": format!("Stop {id}"),
            "coordinates": { "latitude": 61.2, "longitude": -149.9 },
            "hasQrCode": has_qr
        }))
        .unwrap();
        let mut stop = StopRecord::new(vendor, 1.0, 1.0);
        if let Some(kind) = check_in {
            stop.checked_in = true;
            stop.check_in_type = kind;
        }
        stop
    }

    fn journey(stops: Vec<StopRecord>, planned: usize) -> JourneyRecord {
        let mut record = JourneyRecord::new(
            DealType::Daily,
            stops,
            25.0,
            Coordinates::new(61.2, -149.9),
            Utc::now(),
        );
        record.planned_stops = planned;
        record
    }

    #[test]
    fn full_journey_with_mostly_scanned_codes() {
        let record = journey(
            vec![
                stop(1, true, Some(CheckInType::Qr)),
                stop(2, true, Some(CheckInType::Qr)),
                stop(3, true, Some(CheckInType::QrSkipped)),
            ],
            3,
        );
        let reward = RewardCalculator::default().score(&record);
        assert_eq!(reward.checkin_points, 25);
        assert_eq!(reward.milestones, 4);
        assert_eq!(reward.bonus_points, 100);
        assert_eq!(reward.total_points, 125);
        assert!((reward.qr_compliance_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!(reward.notice.is_none());
    }

    #[test]
    fn low_compliance_forfeits_bonus_with_notice() {
        let record = journey(
            vec![
                stop(1, true, Some(CheckInType::QrSkipped)),
                stop(2, true, Some(CheckInType::QrSkipped)),
                stop(3, true, Some(CheckInType::Qr)),
            ],
            3,
        );
        let reward = RewardCalculator::default().score(&record);
        assert_eq!(reward.checkin_points, 20);
        assert_eq!(reward.bonus_points, 0);
        assert_eq!(reward.total_points, 20);
        assert_eq!(reward.notice.as_deref(), Some(MSG_LOW_QR_COMPLIANCE));
    }

    #[test]
    fn stops_without_codes_count_as_compliant() {
        let record = journey(
            vec![stop(1, false, Some(CheckInType::QrSkipped)), stop(2, false, None)],
            2,
        );
        let reward = RewardCalculator::default().score(&record);
        assert!((reward.qr_compliance_rate - 1.0).abs() < f64::EPSILON);
        // 1 of 2 planned stops is two quarter milestones.
        assert_eq!(reward.milestones, 2);
        assert_eq!(reward.bonus_points, 50);
        assert_eq!(reward.total_points, 55);
    }

    #[test]
    fn milestones_use_planned_stop_count_after_skips() {
        // Planned 5, two skipped away, one checked in: floor(1 * 4 / 5) = 0.
        let record = journey(
            vec![stop(1, false, Some(CheckInType::Qr)), stop(2, false, None), stop(3, false, None)],
            5,
        );
        let reward = RewardCalculator::default().score(&record);
        assert_eq!(reward.milestones, 0);
        assert_eq!(reward.total_points, 10);
        assert!((reward.completion_rate - 0.2).abs() < 1e-12);

        let empty = journey(Vec::new(), 0);
        let reward = RewardCalculator::default().score(&empty);
        assert_eq!(reward.total_points, 0);
    }
}
