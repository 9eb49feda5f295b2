use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod event;
pub mod finance;
pub mod points;

pub use event::*;
pub use finance::*;
pub use points::*;

/// A club member
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Unique identifier for the `Member`
    ///
    /// This is the same identity the auth collaborator hands out.
    pub member_id: Uuid,
    pub name: String,
    pub email: String,
    /// Inactive members are skipped by dues generation and the team draw.
    ///
    /// Members are deactivated instead of deleted so their ledger history stays intact.
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Member {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            member_id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            active: true,
            created_at: Utc::now(),
        }
    }
}

/// Admin action written to the audit log
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: Uuid,
    pub action: String,
    /// Member the action concerns, if any
    pub member_id: Option<Uuid>,
    pub details: Option<String>,
    pub recorded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(action: impl Into<String>, recorded_by: Uuid) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            action: action.into(),
            member_id: None,
            details: None,
            recorded_by,
            created_at: Utc::now(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Member,
    Admin,
}

/// Authenticated identity making a request
///
/// Supplied by the auth collaborator. The domain logic never authenticates anyone by itself, it
/// only checks the role.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Caller {
    pub member_id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn admin(member_id: Uuid) -> Self {
        Self {
            member_id,
            role: Role::Admin,
        }
    }

    pub fn member(member_id: Uuid) -> Self {
        Self {
            member_id,
            role: Role::Member,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether the caller may act on behalf of `member_id`
    pub fn can_act_for(&self, member_id: Uuid) -> bool {
        self.is_admin() || self.member_id == member_id
    }
}

/// Billing month, written as `YYYY-MM`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum YearMonthError {
    #[error("month must be between 1 and 12, got {0}")]
    InvalidMonth(u32),
    #[error("expected a YYYY-MM month, got {0:?}")]
    Malformed(String),
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, YearMonthError> {
        // Constructing the first day also rejects years chrono cannot represent
        match NaiveDate::from_ymd_opt(year, month, 1) {
            Some(_) => Ok(Self { year, month }),
            None => Err(YearMonthError::InvalidMonth(month)),
        }
    }

    /// Month containing the given instant (UTC)
    pub fn of(instant: DateTime<Utc>) -> Self {
        Self {
            year: instant.year(),
            month: instant.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Due date for this month on the given day, clamped to the last day of the month
    pub fn due_date(&self, day: u32) -> NaiveDate {
        let last_day = self.next().first_day().pred_opt().unwrap_or(NaiveDate::MIN);
        self.first_day()
            .with_day(day.clamp(1, last_day.day()))
            .unwrap_or(last_day)
    }

    /// Half-open UTC range `[start, end)` covering this month
    pub fn range(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc.from_utc_datetime(&self.first_day().and_time(NaiveTime::default()));
        let end = Utc.from_utc_datetime(&self.next().first_day().and_time(NaiveTime::default()));
        (start, end)
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        let (start, end) = self.range();
        start <= instant && instant < end
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = YearMonthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || YearMonthError::Malformed(s.to_string());
        let (year, month) = s.split_once('-').ok_or_else(malformed)?;
        let year = year.parse().map_err(|_| malformed())?;
        let month = month.parse().map_err(|_| malformed())?;
        Self::new(year, month)
    }
}

/// Format an amount in cents as `R$ 12.50`
pub fn format_cents(amount_cents: i64) -> String {
    let sign = if amount_cents < 0 { "-" } else { "" };
    let abs = amount_cents.unsigned_abs();
    format!("{}R$ {}.{:02}", sign, abs / 100, abs % 100)
}
