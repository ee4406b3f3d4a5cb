use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

/// Minimum length of the reason given when reopening a year or closing it
/// despite high-severity audit findings.
pub const MIN_REASON_CHARS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FiscalYearStatus {
    Open,
    Partial,
    Closed,
}

impl FiscalYearStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FiscalYearStatus::Open => "open",
            FiscalYearStatus::Partial => "partial",
            FiscalYearStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(FiscalYearStatus::Open),
            "partial" => Some(FiscalYearStatus::Partial),
            "closed" => Some(FiscalYearStatus::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for FiscalYearStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct FiscalYearState {
    pub id: Uuid,
    pub year: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: FiscalYearStatus,
    pub closed_until: Option<NaiveDate>,
}

impl FiscalYearState {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

#[derive(Debug, Clone)]
pub struct ExceptionalPeriod {
    pub fiscal_year_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PeriodError {
    #[error("no fiscal year covers {0}")]
    NoFiscalYear(NaiveDate),
    #[error("fiscal year {year} is closed, {date} cannot be posted")]
    Closed { year: i32, date: NaiveDate },
    #[error("fiscal year {year} is closed until {until}, {date} cannot be posted")]
    ClosedUntil {
        year: i32,
        until: NaiveDate,
        date: NaiveDate,
    },
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FiscalTransitionError {
    #[error("start date must be before end date")]
    InvalidRange,
    #[error("fiscal year {0} already exists")]
    Duplicate(i32),
    #[error("dates overlap fiscal year {0}")]
    Overlap(i32),
    #[error("fiscal year is already closed")]
    AlreadyClosed,
    #[error("partial close is not allowed on a closed year")]
    PartialOnClosed,
    #[error("closing date must lie inside the fiscal year")]
    ClosedUntilOutOfRange,
    #[error("only closed or partially closed years can be reopened")]
    NotClosed,
    #[error("a reason of at least {} characters is required", MIN_REASON_CHARS)]
    ReasonTooShort,
    #[error("the audit found {0} high severity issues, an override reason is required")]
    OverrideRequired(usize),
    #[error("exceptional period must lie inside the fiscal year")]
    PeriodOutsideYear,
}

/// Year covering `date`; when several do, the one that starts last.
pub fn covering_year(years: &[FiscalYearState], date: NaiveDate) -> Option<&FiscalYearState> {
    years
        .iter()
        .filter(|y| y.contains(date))
        .max_by_key(|y| y.start_date)
}

fn in_exceptional(periods: &[ExceptionalPeriod], year: &FiscalYearState, date: NaiveDate) -> bool {
    periods
        .iter()
        .any(|p| p.fiscal_year_id == year.id && p.start_date <= date && date <= p.end_date)
}

pub fn check_period(
    years: &[FiscalYearState],
    periods: &[ExceptionalPeriod],
    date: NaiveDate,
    require_year: bool,
) -> Result<(), PeriodError> {
    let Some(year) = covering_year(years, date) else {
        if require_year {
            return Err(PeriodError::NoFiscalYear(date));
        }
        return Ok(());
    };

    match (year.status, year.closed_until) {
        (FiscalYearStatus::Closed, _) if !in_exceptional(periods, year, date) => {
            Err(PeriodError::Closed {
                year: year.year,
                date,
            })
        }
        (FiscalYearStatus::Partial, Some(until))
            if date <= until && !in_exceptional(periods, year, date) =>
        {
            Err(PeriodError::ClosedUntil {
                year: year.year,
                until,
                date,
            })
        }
        _ => Ok(()),
    }
}

pub fn validate_new_year(
    existing: &[FiscalYearState],
    year: i32,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<(), FiscalTransitionError> {
    if start >= end {
        return Err(FiscalTransitionError::InvalidRange);
    }
    if existing.iter().any(|y| y.year == year) {
        return Err(FiscalTransitionError::Duplicate(year));
    }
    if let Some(other) = existing
        .iter()
        .find(|y| start <= y.end_date && y.start_date <= end)
    {
        return Err(FiscalTransitionError::Overlap(other.year));
    }
    Ok(())
}

fn reason_ok(reason: Option<&str>) -> bool {
    reason
        .map(|r| r.trim().chars().count() >= MIN_REASON_CHARS)
        .unwrap_or(false)
}

/// High-severity audit findings block a close unless a reason is given.
/// Returns whether the close is an override.
pub fn check_override(high_findings: usize, reason: Option<&str>) -> Result<bool, FiscalTransitionError> {
    if high_findings == 0 {
        return Ok(false);
    }
    if !reason_ok(reason) {
        return Err(FiscalTransitionError::OverrideRequired(high_findings));
    }
    Ok(true)
}

pub fn check_close(year: &FiscalYearState) -> Result<(), FiscalTransitionError> {
    if year.status == FiscalYearStatus::Closed {
        return Err(FiscalTransitionError::AlreadyClosed);
    }
    Ok(())
}

pub fn check_partial_close(
    year: &FiscalYearState,
    closed_until: NaiveDate,
) -> Result<(), FiscalTransitionError> {
    if year.status == FiscalYearStatus::Closed {
        return Err(FiscalTransitionError::PartialOnClosed);
    }
    if !year.contains(closed_until) {
        return Err(FiscalTransitionError::ClosedUntilOutOfRange);
    }
    Ok(())
}

pub fn check_reopen(year: &FiscalYearState, reason: Option<&str>) -> Result<(), FiscalTransitionError> {
    if year.status == FiscalYearStatus::Open {
        return Err(FiscalTransitionError::NotClosed);
    }
    if !reason_ok(reason) {
        return Err(FiscalTransitionError::ReasonTooShort);
    }
    Ok(())
}

pub fn check_exceptional(
    year: &FiscalYearState,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<(), FiscalTransitionError> {
    if start >= end {
        return Err(FiscalTransitionError::InvalidRange);
    }
    if !year.contains(start) || !year.contains(end) {
        return Err(FiscalTransitionError::PeriodOutsideYear);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn year(y: i32, status: FiscalYearStatus, closed_until: Option<NaiveDate>) -> FiscalYearState {
        FiscalYearState {
            id: Uuid::new_v4(),
            year: y,
            start_date: ymd(y, 1, 1),
            end_date: ymd(y, 12, 31),
            status,
            closed_until,
        }
    }

    #[test]
    fn open_year_accepts_dates() {
        let years = [year(2024, FiscalYearStatus::Open, None)];
        assert!(check_period(&years, &[], ymd(2024, 6, 1), true).is_ok());
        assert_eq!(
            check_period(&years, &[], ymd(2025, 1, 1), true),
            Err(PeriodError::NoFiscalYear(ymd(2025, 1, 1)))
        );
        assert!(check_period(&years, &[], ymd(2025, 1, 1), false).is_ok());
    }

    #[test]
    fn closed_year_honours_exceptional_periods() {
        let y = year(2023, FiscalYearStatus::Closed, None);
        let periods = [ExceptionalPeriod {
            fiscal_year_id: y.id,
            start_date: ymd(2023, 12, 1),
            end_date: ymd(2023, 12, 31),
        }];
        let years = [y];
        assert!(matches!(
            check_period(&years, &periods, ymd(2023, 5, 1), true),
            Err(PeriodError::Closed { year: 2023, .. })
        ));
        assert!(check_period(&years, &periods, ymd(2023, 12, 15), true).is_ok());
    }

    #[test]
    fn partial_close_blocks_up_to_date() {
        let years = [year(2024, FiscalYearStatus::Partial, Some(ymd(2024, 6, 30)))];
        assert!(matches!(
            check_period(&years, &[], ymd(2024, 6, 30), true),
            Err(PeriodError::ClosedUntil { .. })
        ));
        assert!(check_period(&years, &[], ymd(2024, 7, 1), true).is_ok());
    }

    #[test]
    fn latest_start_wins() {
        let mut short = year(2024, FiscalYearStatus::Closed, None);
        short.year = 2025;
        short.start_date = ymd(2024, 7, 1);
        let years = [year(2024, FiscalYearStatus::Open, None), short];
        assert_eq!(covering_year(&years, ymd(2024, 8, 1)).map(|y| y.year), Some(2025));
        assert_eq!(covering_year(&years, ymd(2024, 2, 1)).map(|y| y.year), Some(2024));
    }

    #[test]
    fn new_year_validation() {
        let years = [year(2024, FiscalYearStatus::Open, None)];
        assert_eq!(
            validate_new_year(&years, 2025, ymd(2025, 12, 31), ymd(2025, 1, 1)),
            Err(FiscalTransitionError::InvalidRange)
        );
        assert_eq!(
            validate_new_year(&years, 2024, ymd(2026, 1, 1), ymd(2026, 12, 31)),
            Err(FiscalTransitionError::Duplicate(2024))
        );
        assert_eq!(
            validate_new_year(&years, 2025, ymd(2024, 12, 1), ymd(2025, 11, 30)),
            Err(FiscalTransitionError::Overlap(2024))
        );
        assert!(validate_new_year(&years, 2025, ymd(2025, 1, 1), ymd(2025, 12, 31)).is_ok());
    }

    #[test]
    fn transitions() {
        let open = year(2024, FiscalYearStatus::Open, None);
        let closed = year(2024, FiscalYearStatus::Closed, None);

        assert!(check_close(&open).is_ok());
        assert_eq!(check_close(&closed), Err(FiscalTransitionError::AlreadyClosed));

        assert_eq!(
            check_partial_close(&closed, ymd(2024, 3, 31)),
            Err(FiscalTransitionError::PartialOnClosed)
        );
        assert_eq!(
            check_partial_close(&open, ymd(2025, 3, 31)),
            Err(FiscalTransitionError::ClosedUntilOutOfRange)
        );

        assert_eq!(
            check_reopen(&open, Some("a long enough reason here")),
            Err(FiscalTransitionError::NotClosed)
        );
        assert_eq!(
            check_reopen(&closed, Some("too short")),
            Err(FiscalTransitionError::ReasonTooShort)
        );
        assert!(check_reopen(&closed, Some("correcting supplier invoice dates")).is_ok());

        assert_eq!(
            check_exceptional(&open, ymd(2024, 12, 1), ymd(2025, 1, 5)),
            Err(FiscalTransitionError::PeriodOutsideYear)
        );
    }

    #[test]
    fn override_needs_reason_only_with_high_findings() {
        assert_eq!(check_override(0, None), Ok(false));
        assert_eq!(
            check_override(2, Some("   short   ")),
            Err(FiscalTransitionError::OverrideRequired(2))
        );
        assert_eq!(check_override(2, Some("auditor approved the late entries")), Ok(true));
    }
}
