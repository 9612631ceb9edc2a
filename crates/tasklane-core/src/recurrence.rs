//! Due-date math for repeating tasks.
//!
//! Completing a recurring task spawns a successor whose due date is the
//! current one advanced by `interval` units of the rule's frequency. The
//! rule's weekday set is stored but not consulted here.

use chrono::{DateTime, Months, TimeDelta, Utc};
use tasklane_shared::{Frequency, Recurrence, RecurrenceInput};

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub next: DateTime<Utc>,
    /// `false` once `next` falls after the rule's end date.
    pub in_range: bool,
}

/// Advances `current` by `interval` units of `frequency`.
///
/// Month and year steps land on the last day of the target month when the
/// source day does not exist there (Jan 31 + 1 month is Feb 28/29). An
/// interval of zero is treated as one.
pub fn next_occurrence(
    frequency: Frequency,
    interval: u32,
    current: DateTime<Utc>,
    ends_on: Option<DateTime<Utc>>,
) -> Occurrence {
    let step = interval.max(1);
    let next = match frequency {
        Frequency::Daily => current.checked_add_signed(TimeDelta::days(i64::from(step))),
        Frequency::Weekly => current.checked_add_signed(TimeDelta::weeks(i64::from(step))),
        Frequency::Monthly => current.checked_add_months(Months::new(step)),
        Frequency::Yearly => step
            .checked_mul(12)
            .and_then(|months| current.checked_add_months(Months::new(months))),
    }
    .unwrap_or(DateTime::<Utc>::MAX_UTC);

    let in_range = ends_on.is_none_or(|end| next <= end);
    Occurrence { next, in_range }
}

pub fn next_for_rule(rule: &Recurrence, current: DateTime<Utc>) -> Occurrence {
    next_occurrence(rule.frequency, rule.interval, current, rule.ends_on)
}

/// Rejects rules that could never be stored: a zero interval or weekday
/// numbers outside 0..=6.
pub fn validate(input: &RecurrenceInput) -> Result<(), StoreError> {
    if input.interval == 0 {
        return Err(StoreError::InvalidRecurrence(
            "interval must be at least 1".to_string(),
        ));
    }
    if let Some(days) = &input.week_days
        && let Some(bad) = days.iter().find(|day| **day > 6)
    {
        return Err(StoreError::InvalidRecurrence(format!(
            "weekday {bad} is outside 0 (Sunday) ..= 6 (Saturday)"
        )));
    }
    Ok(())
}
