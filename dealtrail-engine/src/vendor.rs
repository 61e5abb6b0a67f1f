//! Vendor and deal records as delivered by the vendor source.
//!
//! Vendor ids are normalized at deserialization so every lookup downstream is
//! a single canonical string comparison.
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Deserializer, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;

use crate::proximity::Coordinates;

/// Canonical vendor identifier.
///
/// Sources may send ids as JSON numbers or strings; both collapse to the same
/// trimmed decimal string (`42`, `"42"`, `" 42 "` and `42.0` are equal).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VendorId(String);

impl VendorId {
    /// Build an id from any textual form, normalizing numeric spellings.
    #[must_use]
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(int) = trimmed.parse::<i64>() {
            return Self(int.to_string());
        }
        if let Ok(float) = trimmed.parse::<f64>()
            && float.is_finite()
            && float.fract() == 0.0
            && float.abs() < 9.0e15
        {
            return Self(format!("{float:.0}"));
        }
        Self(trimmed.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VendorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VendorId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for VendorId {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<u64> for VendorId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<i64> for VendorId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl<'de> Deserialize<'de> for VendorId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Unsigned(u64),
            Signed(i64),
            Float(f64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Unsigned(value) => Self::from(value),
            RawId::Signed(value) => Self::from(value),
            RawId::Float(value) => Self::new(&value.to_string()),
            RawId::Text(value) => Self::new(&value),
        })
    }
}

/// Day of the week used to key daily deals and opening hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    #[must_use]
    pub const fn from_weekday(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => Self::Monday,
            Weekday::Tue => Self::Tuesday,
            Weekday::Wed => Self::Wednesday,
            Weekday::Thu => Self::Thursday,
            Weekday::Fri => Self::Friday,
            Weekday::Sat => Self::Saturday,
            Weekday::Sun => Self::Sunday,
        }
    }

    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        Self::from_weekday(date.weekday())
    }
}

/// Closed set of deal families a journey can be planned around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DealType {
    Birthday,
    Daily,
    MultiDay,
    Special,
    Everyday,
}

impl DealType {
    pub const ALL: [Self; 5] = [
        Self::Birthday,
        Self::Daily,
        Self::MultiDay,
        Self::Special,
        Self::Everyday,
    ];

    /// Wire name (`birthday`, `daily`, `multiDay`, `special`, `everyday`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Birthday => "birthday",
            Self::Daily => "daily",
            Self::MultiDay => "multiDay",
            Self::Special => "special",
            Self::Everyday => "everyday",
        }
    }
}

impl std::fmt::Display for DealType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DealType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown deal type `{s}`"))
    }
}

/// A single offer as authored by the vendor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub discount_text: String,
    #[serde(default)]
    pub restrictions: Vec<String>,
}

impl Deal {
    /// A deal with no visible text carries no offer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty()
            && self.description.trim().is_empty()
            && self.discount_text.trim().is_empty()
    }
}

/// Deal active on a recurring set of weekdays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiDayDeal {
    #[serde(flatten)]
    pub deal: Deal,
    #[serde(default)]
    pub active_days: SmallVec<[DayOfWeek; 7]>,
}

impl MultiDayDeal {
    #[must_use]
    pub fn is_active_on(&self, day: DayOfWeek) -> bool {
        !self.deal.is_empty() && self.active_days.contains(&day)
    }
}

/// Limited-time deal valid over an inclusive date window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialDeal {
    #[serde(flatten)]
    pub deal: Deal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl SpecialDeal {
    #[must_use]
    pub fn is_running_on(&self, day: NaiveDate) -> bool {
        !self.deal.is_empty() && self.start_date <= day && day <= self.end_date
    }
}

/// Every deal collection a vendor may carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorDeals {
    #[serde(default)]
    pub daily: BTreeMap<DayOfWeek, Vec<Deal>>,
    #[serde(default)]
    pub birthday: Option<Deal>,
    #[serde(default)]
    pub multi_day: Vec<MultiDayDeal>,
    #[serde(default)]
    pub special: Vec<SpecialDeal>,
    #[serde(default)]
    pub everyday: Option<Deal>,
}

/// Opening and closing time for a single day, as display strings (`"09:00"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningHours {
    pub open: String,
    pub close: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
}

/// Full vendor record, replaced wholesale on each cache refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorRecord {
    pub id: VendorId,
    pub name: String,
    pub coordinates: Coordinates,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub contact: ContactInfo,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub is_partner: bool,
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default)]
    pub has_qr_code: bool,
    #[serde(default)]
    pub hours: BTreeMap<DayOfWeek, OpeningHours>,
    #[serde(default)]
    pub deals: VendorDeals,
}

/// Caller-supplied narrowing applied on top of the deal-type predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealFilters {
    /// Category allow-list for `everyday` deals (case-insensitive).
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    /// Restrict to partner vendors.
    #[serde(default)]
    pub partners_only: bool,
}

impl DealFilters {
    fn admits_category(&self, category: Option<&str>) -> bool {
        let Some(allowed) = &self.categories else {
            return true;
        };
        category.is_some_and(|category| {
            allowed
                .iter()
                .any(|entry| entry.trim().eq_ignore_ascii_case(category.trim()))
        })
    }
}

/// Flattened, per-query view of one vendor deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealRecord {
    pub id: String,
    pub vendor_id: VendorId,
    pub title: String,
    pub description: String,
    pub discount_text: String,
    pub deal_type: DealType,
    pub restrictions: Vec<String>,
    #[serde(default)]
    pub valid_from: Option<NaiveDate>,
    #[serde(default)]
    pub valid_until: Option<NaiveDate>,
}

impl VendorRecord {
    /// Whether this vendor offers `deal_type` on `today`.
    ///
    /// Dispatch is an exhaustive match so a new deal type cannot be added
    /// without a predicate.
    #[must_use]
    pub fn offers(&self, deal_type: DealType, filters: &DealFilters, today: NaiveDate) -> bool {
        if filters.partners_only && !self.is_partner {
            return false;
        }
        let deals = &self.deals;
        match deal_type {
            DealType::Birthday => deals.birthday.as_ref().is_some_and(|deal| !deal.is_empty()),
            DealType::Daily => deals
                .daily
                .get(&DayOfWeek::from_date(today))
                .is_some_and(|list| list.iter().any(|deal| !deal.is_empty())),
            DealType::MultiDay => {
                let day = DayOfWeek::from_date(today);
                deals.multi_day.iter().any(|deal| deal.is_active_on(day))
            }
            DealType::Special => deals.special.iter().any(|deal| deal.is_running_on(today)),
            DealType::Everyday => {
                deals.everyday.as_ref().is_some_and(|deal| !deal.is_empty())
                    && filters.admits_category(self.category.as_deref())
            }
        }
    }

    /// Flatten the deals of `deal_type` that apply on `today`.
    #[must_use]
    pub fn deal_records(
        &self,
        deal_type: DealType,
        filters: &DealFilters,
        today: NaiveDate,
    ) -> Vec<DealRecord> {
        if !self.offers(deal_type, filters, today) {
            return Vec::new();
        }
        let deals = &self.deals;
        match deal_type {
            DealType::Birthday => deals
                .birthday
                .iter()
                .map(|deal| self.flatten(deal, deal_type, 0, None))
                .collect(),
            DealType::Daily => deals
                .daily
                .get(&DayOfWeek::from_date(today))
                .into_iter()
                .flatten()
                .filter(|deal| !deal.is_empty())
                .enumerate()
                .map(|(idx, deal)| self.flatten(deal, deal_type, idx, None))
                .collect(),
            DealType::MultiDay => {
                let day = DayOfWeek::from_date(today);
                deals
                    .multi_day
                    .iter()
                    .filter(|deal| deal.is_active_on(day))
                    .enumerate()
                    .map(|(idx, deal)| self.flatten(&deal.deal, deal_type, idx, None))
                    .collect()
            }
            DealType::Special => deals
                .special
                .iter()
                .filter(|deal| deal.is_running_on(today))
                .enumerate()
                .map(|(idx, deal)| {
                    self.flatten(
                        &deal.deal,
                        deal_type,
                        idx,
                        Some((deal.start_date, deal.end_date)),
                    )
                })
                .collect(),
            DealType::Everyday => deals
                .everyday
                .iter()
                .map(|deal| self.flatten(deal, deal_type, 0, None))
                .collect(),
        }
    }

    fn flatten(
        &self,
        deal: &Deal,
        deal_type: DealType,
        index: usize,
        window: Option<(NaiveDate, NaiveDate)>,
    ) -> DealRecord {
        let id = deal
            .id
            .clone()
            .unwrap_or_else(|| format!("{}-{}-{index}", self.id, deal_type.as_str()));
        DealRecord {
            id,
            vendor_id: self.id.clone(),
            title: deal.title.clone(),
            description: deal.description.clone(),
            discount_text: deal.discount_text.clone(),
            deal_type,
            restrictions: deal.restrictions.clone(),
            valid_from: window.map(|(start, _)| start),
            valid_until: window.map(|(_, end)| end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn vendor(deals: serde_json::Value) -> VendorRecord {
        serde_json::from_value(json!({
            "id": 7,
            "name": "Spenard Roadhouse",
            "coordinates": { "latitude": 61.19, "longitude": -149.91 },
            "category": "Restaurant",
            "deals": deals
        }))
        .unwrap()
    }

    #[test]
    fn vendor_ids_normalize_numeric_and_string_forms() {
        let numeric: VendorId = serde_json::from_value(json!(42)).unwrap();
        let text: VendorId = serde_json::from_value(json!(" 42 ")).unwrap();
        let float: VendorId = serde_json::from_value(json!(42.0)).unwrap();
        let slug: VendorId = serde_json::from_value(json!("moose-tooth")).unwrap();
        assert_eq!(numeric, text);
        assert_eq!(numeric, float);
        assert_eq!(numeric.as_str(), "42");
        assert_eq!(slug.as_str(), "moose-tooth");
        assert_eq!(VendorId::from(42_u64), VendorId::from("042"));
    }

    #[test]
    fn deal_type_uses_camel_case_wire_names() {
        assert_eq!(serde_json::to_string(&DealType::MultiDay).unwrap(), "\"multiDay\"");
        assert_eq!("MULTIDAY".parse::<DealType>().unwrap(), DealType::MultiDay);
        assert!("weekly".parse::<DealType>().is_err());
    }

    #[test]
    fn daily_predicate_keys_on_todays_weekday() {
        let record = vendor(json!({
            "daily": { "monday": [{ "title": "Half-price wings" }], "tuesday": [] }
        }));
        let filters = DealFilters::default();
        // 2024-06-03 is a Monday.
        assert!(record.offers(DealType::Daily, &filters, date(2024, 6, 3)));
        assert!(!record.offers(DealType::Daily, &filters, date(2024, 6, 4)));
        let flattened = record.deal_records(DealType::Daily, &filters, date(2024, 6, 3));
        assert_eq!(flattened.len(), 1);
        assert_eq!(flattened[0].id, "7-daily-0");
    }

    #[test]
    fn special_window_is_inclusive() {
        let record = vendor(json!({
            "special": [{ "title": "Fur Rondy", "startDate": "2024-02-23", "endDate": "2024-03-03" }]
        }));
        let filters = DealFilters::default();
        assert!(record.offers(DealType::Special, &filters, date(2024, 2, 23)));
        assert!(record.offers(DealType::Special, &filters, date(2024, 3, 3)));
        assert!(!record.offers(DealType::Special, &filters, date(2024, 3, 4)));
        let flattened = record.deal_records(DealType::Special, &filters, date(2024, 3, 1));
        assert_eq!(flattened[0].valid_until, Some(date(2024, 3, 3)));
    }

    #[test]
    fn multi_day_matches_active_days() {
        let record = vendor(json!({
            "multiDay": [{ "title": "Weekend brunch", "activeDays": ["saturday", "sunday"] }]
        }));
        let filters = DealFilters::default();
        assert!(record.offers(DealType::MultiDay, &filters, date(2024, 6, 8)));
        assert!(!record.offers(DealType::MultiDay, &filters, date(2024, 6, 5)));
    }

    #[test]
    fn everyday_respects_category_allow_list_and_empty_birthday_is_ignored() {
        let record = vendor(json!({
            "everyday": { "title": "10% off" },
            "birthday": { "title": "  " }
        }));
        let today = date(2024, 6, 3);
        let restaurants = DealFilters {
            categories: Some(vec!["restaurant".into()]),
            partners_only: false,
        };
        let retail = DealFilters {
            categories: Some(vec!["Retail".into()]),
            partners_only: false,
        };
        assert!(record.offers(DealType::Everyday, &restaurants, today));
        assert!(!record.offers(DealType::Everyday, &retail, today));
        assert!(!record.offers(DealType::Birthday, &DealFilters::default(), today));
        let partners = DealFilters {
            categories: None,
            partners_only: true,
        };
        assert!(!record.offers(DealType::Everyday, &partners, today));
    }
}
