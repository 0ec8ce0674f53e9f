use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Apuração period (PA). Serialized as the integer `YYYYMM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period(NaiveDate);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid period '{0}', expected YYYYMM")]
pub struct InvalidPeriod(pub String);

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self(date - Days::new(u64::from(date.day0())))
    }

    pub fn from_yyyymm(value: u32) -> Result<Self, InvalidPeriod> {
        let year = i32::try_from(value / 100).map_err(|_| InvalidPeriod(value.to_string()))?;
        if !(1000..=9999).contains(&year) {
            return Err(InvalidPeriod(value.to_string()));
        }
        Self::new(year, value % 100).ok_or_else(|| InvalidPeriod(value.to_string()))
    }

    pub fn year(self) -> i32 {
        self.0.year()
    }

    pub fn month(self) -> u32 {
        self.0.month()
    }

    pub fn yyyymm(self) -> u32 {
        self.0.year().unsigned_abs() * 100 + self.0.month()
    }

    pub fn first_day(self) -> NaiveDate {
        self.0
    }

    pub fn previous(self) -> Self {
        self.0
            .pred_opt()
            .map(Self::from_date)
            .unwrap_or(self)
    }

    /// The `count` periods before this one, most recent first.
    pub fn preceding(self, count: usize) -> Vec<Self> {
        let mut periods = Vec::with_capacity(count);
        let mut cursor = self;
        for _ in 0..count {
            cursor = cursor.previous();
            periods.push(cursor);
        }
        periods
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year(), self.month())
    }
}

impl FromStr for Period {
    type Err = InvalidPeriod;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.len() != 6 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidPeriod(raw.to_string()));
        }
        let value = trimmed
            .parse::<u32>()
            .map_err(|_| InvalidPeriod(raw.to_string()))?;
        Self::from_yyyymm(value)
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.yyyymm())
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u32::deserialize(deserializer)?;
        Self::from_yyyymm(value).map_err(serde::de::Error::custom)
    }
}
