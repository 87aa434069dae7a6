use chrono::{
    DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, SubsecRound, Timelike, Utc,
};

use crate::error::{Result, SchedulerError};
use crate::expression::{Field, Schedule};

/// How many calendar years past the reference the search may run. Eight
/// covers the longest gap between leap days (e.g. 2096 to 2104).
const YEAR_HORIZON: i32 = 8;

/// Hard cap on carry steps, independent of the year horizon.
const MAX_STEPS: u32 = 100_000;

/// Compute the earliest instant strictly after `after` matching `schedule`.
///
/// Walks the calendar from the coarsest field to the finest. Whenever a
/// field does not match, that unit is advanced (resetting everything finer
/// to its minimum) and, if the advance carried into a coarser unit, the walk
/// restarts from the month. Returns [`SchedulerError::Unsatisfiable`] when
/// nothing matches within [`YEAR_HORIZON`] years.
pub fn next_occurrence(schedule: &Schedule, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let unsatisfiable = || SchedulerError::Unsatisfiable {
        expression: schedule.expression().to_string(),
    };

    let mut t: NaiveDateTime = after.trunc_subsecs(0).naive_utc() + Duration::seconds(1);
    let year_limit = t.year() + YEAR_HORIZON;
    // The first time a field is advanced, everything finer is zeroed.
    let mut truncated = false;
    let mut steps = 0u32;

    'wrap: loop {
        steps += 1;
        if t.year() > year_limit || steps > MAX_STEPS {
            return Err(unsatisfiable());
        }

        while !schedule.matches(Field::Month, t.month()) {
            if !truncated {
                truncated = true;
                t = start_of_day(first_of_month(t.date()).ok_or_else(unsatisfiable)?);
            }
            t = start_of_day(next_month(t.date()).ok_or_else(unsatisfiable)?);
            if t.month() == 1 {
                continue 'wrap;
            }
        }

        while !day_matches(schedule, t.date()) {
            if !truncated {
                truncated = true;
                t = start_of_day(t.date());
            }
            t += Duration::days(1);
            if t.day() == 1 {
                continue 'wrap;
            }
        }

        while !schedule.matches(Field::Hour, t.hour()) {
            if !truncated {
                truncated = true;
                t = t.date().and_hms_opt(t.hour(), 0, 0).ok_or_else(unsatisfiable)?;
            }
            t += Duration::hours(1);
            if t.hour() == 0 {
                continue 'wrap;
            }
        }

        while !schedule.matches(Field::Minute, t.minute()) {
            if !truncated {
                truncated = true;
                t = t
                    .date()
                    .and_hms_opt(t.hour(), t.minute(), 0)
                    .ok_or_else(unsatisfiable)?;
            }
            t += Duration::minutes(1);
            if t.minute() == 0 {
                continue 'wrap;
            }
        }

        while !schedule.matches(Field::Second, t.second()) {
            truncated = true;
            t += Duration::seconds(1);
            if t.second() == 0 {
                continue 'wrap;
            }
        }

        return Ok(t.and_utc());
    }
}

impl Schedule {
    /// Method form of [`next_occurrence`].
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
        next_occurrence(self, after)
    }
}

/// Day-of-month and day-of-week combine with OR when both are restricted,
/// otherwise with AND (an unrestricted field matches every day anyway).
fn day_matches(schedule: &Schedule, date: NaiveDate) -> bool {
    let dom = schedule.matches(Field::DayOfMonth, date.day());
    let dow = schedule.matches(Field::DayOfWeek, date.weekday().num_days_from_sunday());
    if schedule.dom_unrestricted || schedule.dow_unrestricted {
        dom && dow
    } else {
        dom || dow
    }
}

fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}

fn first_of_month(date: NaiveDate) -> Option<NaiveDate> {
    date.with_day(1)
}

fn next_month(date: NaiveDate) -> Option<NaiveDate> {
    first_of_month(date)?.checked_add_months(Months::new(1))
}
