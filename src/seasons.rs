use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Inclusive range of season years, e.g. `2016..=2019`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeasonRange {
    pub start: i32,
    pub end: i32,
}

impl SeasonRange {
    pub fn new(start: i32, end: i32) -> Result<Self, ConfigError> {
        if start > end {
            return Err(ConfigError::InvertedSeasons { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single(season: i32) -> Self {
        Self {
            start: season,
            end: season,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::new(self.start, self.end).map(|_| ())
    }

    pub fn contains(&self, season: i32) -> bool {
        season >= self.start && season <= self.end
    }

    pub fn overlaps(&self, other: &SeasonRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn covers(&self, other: &SeasonRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// True when every season in `self` comes after every season in `other`.
    pub fn strictly_after(&self, other: &SeasonRange) -> bool {
        self.start > other.end
    }

    pub fn seasons(&self) -> impl Iterator<Item = i32> {
        self.start..=self.end
    }
}

impl fmt::Display for SeasonRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::SeasonRange;

    #[test]
    fn overlap_and_order() {
        let train = SeasonRange::new(2012, 2016).unwrap();
        let cal = SeasonRange::new(2017, 2018).unwrap();
        assert!(!train.overlaps(&cal));
        assert!(cal.strictly_after(&train));
        assert!(!train.strictly_after(&cal));
        assert!(SeasonRange::new(2016, 2017).unwrap().overlaps(&train));
        assert!(cal.covers(&SeasonRange::single(2018)));
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(SeasonRange::new(2019, 2018).is_err());
    }
}
