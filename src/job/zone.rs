//! Parsed Compute Engine zone
//!
//! A zone name embeds its region as a prefix followed by a hyphen and a single
//! letter (`us-central1-a` lives in `us-central1`). Parsing it once up front
//! means the subnetwork path can never be built from a truncated string.

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// A zone split into its region and one-letter suffix
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Zone {
    region: String,
    suffix: char,
}

impl Zone {
    /// The region this zone belongs to, e.g. `us-central1`
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The zone letter, e.g. `a`
    pub fn suffix(&self) -> char {
        self.suffix
    }
}

impl FromStr for Zone {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ValidationError::MalformedZone {
            zone: s.to_string(),
        };

        let (region, suffix) = s.rsplit_once('-').ok_or_else(malformed)?;

        let mut chars = suffix.chars();
        let suffix = match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_lowercase() => c,
            _ => return Err(malformed()),
        };

        let region_ok = region
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase())
            && !region.ends_with('-')
            && region
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !region_ok {
            return Err(malformed());
        }

        Ok(Zone {
            region: region.to_string(),
            suffix,
        })
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.region, self.suffix)
    }
}
