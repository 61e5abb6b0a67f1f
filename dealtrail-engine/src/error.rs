//! Shared error classification.
//!
//! Each module owns its `thiserror` enum; [`ErrorKind`] is the closed set of
//! codes consumers match on, serialized exactly as listed.

use serde::{Deserialize, Serialize};

/// Stable, consumer-facing failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The vendor cache never reached `ready`.
    CacheUnavailable,
    /// The deal-type predicate matched no vendors.
    NoMatchingVendors,
    /// Every matching vendor was already redeemed today.
    AllVendorsRedeemed,
    /// No matching vendor lies within the requested distance.
    DistanceExceeded,
    /// A vendor lookup missed.
    VendorNotFound,
    /// The durable store could not be read or written.
    StorageUnavailable,
    /// A persisted journey outlived its lease.
    ExpiredJourney,
    /// A journey transition was requested from the wrong state.
    InvalidTransition,
}

impl ErrorKind {
    /// Wire code, identical to the serialized form.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::CacheUnavailable => "CacheUnavailable",
            Self::NoMatchingVendors => "NoMatchingVendors",
            Self::AllVendorsRedeemed => "AllVendorsRedeemed",
            Self::DistanceExceeded => "DistanceExceeded",
            Self::VendorNotFound => "VendorNotFound",
            Self::StorageUnavailable => "StorageUnavailable",
            Self::ExpiredJourney => "ExpiredJourney",
            Self::InvalidTransition => "InvalidTransition",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_serialized_form() {
        for kind in [
            ErrorKind::CacheUnavailable,
            ErrorKind::NoMatchingVendors,
            ErrorKind::AllVendorsRedeemed,
            ErrorKind::DistanceExceeded,
            ErrorKind::VendorNotFound,
            ErrorKind::StorageUnavailable,
            ErrorKind::ExpiredJourney,
            ErrorKind::InvalidTransition,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.code()));
        }
    }
}
