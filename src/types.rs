use crate::error::Error;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dense, zero-based identifier of an entity within its entity type.
pub type EntityId = u32;

/// Index of an entity type in the schema.
///
/// Type 0 is the transaction log: every commit creates exactly one entity of
/// this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(pub u32);

impl EntityType {
    pub const TRANSACTIONS: EntityType = EntityType(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Logical commit sequence number.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TxId(pub u32);

impl TxId {
    pub fn next(self) -> TxId {
        TxId(self.0 + 1)
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// 2021-01-01 counted in chrono's days-from-CE (0001-01-01 is day 1).
const EPOCH_DAYS_FROM_CE: i32 = 737_791;

/// Valid-time date: whole days since 2021-01-01 (negative before it).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Date(pub i32);

impl Date {
    pub fn from_naive(date: NaiveDate) -> Date {
        Date(date.num_days_from_ce() - EPOCH_DAYS_FROM_CE)
    }

    /// Returns `None` for an invalid calendar date.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Date> {
        NaiveDate::from_ymd_opt(year, month, day).map(Date::from_naive)
    }

    /// `None` when the day number falls outside chrono's calendar range.
    pub fn to_naive(self) -> Option<NaiveDate> {
        NaiveDate::from_num_days_from_ce_opt(self.0.checked_add(EPOCH_DAYS_FROM_CE)?)
    }

    pub fn add_days(self, days: i32) -> Date {
        Date(self.0 + days)
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_naive() {
            Some(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            None => write!(f, "day {}", self.0),
        }
    }
}

impl FromStr for Date {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").map(Date::from_naive)
    }
}

impl From<NaiveDate> for Date {
    fn from(date: NaiveDate) -> Self {
        Date::from_naive(date)
    }
}

/// A stored value: a signed integer in `[-2^54, 2^54 - 1]`.
///
/// Integers, entity references, text table indexes and set membership
/// entries (`id` to add, `!id` to remove) are all carried as `Vint`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Vint(i64);

impl Vint {
    pub const MIN: i64 = -1 << 54;
    pub const MAX: i64 = (1 << 54) - 1;

    /// # Panics
    ///
    /// Panics if `i` is outside `[Vint::MIN, Vint::MAX]`.
    pub fn new(i: i64) -> Vint {
        assert!(
            (Vint::MIN..=Vint::MAX).contains(&i),
            "Vint out of range: {i}"
        );
        Vint(i)
    }

    pub fn get(self) -> i64 {
        self.0
    }

    /// Set-membership tombstone for `self`.
    pub fn complement(self) -> Vint {
        Vint(!self.0)
    }
}

impl TryFrom<i64> for Vint {
    type Error = Error;

    fn try_from(i: i64) -> Result<Self, Self::Error> {
        if (Vint::MIN..=Vint::MAX).contains(&i) {
            Ok(Vint(i))
        } else {
            Err(Error::OutOfRange(i))
        }
    }
}

impl From<u32> for Vint {
    fn from(i: u32) -> Self {
        Vint(i64::from(i))
    }
}

impl From<i32> for Vint {
    fn from(i: i32) -> Self {
        Vint(i64::from(i))
    }
}

impl From<bool> for Vint {
    fn from(b: bool) -> Self {
        Vint(i64::from(b))
    }
}

impl From<Date> for Vint {
    fn from(d: Date) -> Self {
        Vint(i64::from(d.0))
    }
}

impl From<Vint> for i64 {
    fn from(v: Vint) -> Self {
        v.0
    }
}

impl fmt::Display for Vint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
