use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SchedulerError};

/// One of the six positional fields of a cron expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Second,
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Second,
        Field::Minute,
        Field::Hour,
        Field::DayOfMonth,
        Field::Month,
        Field::DayOfWeek,
    ];

    /// Zero-based position in the canonical six-field form.
    pub fn index(self) -> usize {
        match self {
            Field::Second => 0,
            Field::Minute => 1,
            Field::Hour => 2,
            Field::DayOfMonth => 3,
            Field::Month => 4,
            Field::DayOfWeek => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Field::Second => "second",
            Field::Minute => "minute",
            Field::Hour => "hour",
            Field::DayOfMonth => "day-of-month",
            Field::Month => "month",
            Field::DayOfWeek => "day-of-week",
        }
    }

    /// Inclusive value domain.
    pub fn bounds(self) -> (u32, u32) {
        match self {
            Field::Second | Field::Minute => (0, 59),
            Field::Hour => (0, 23),
            Field::DayOfMonth => (1, 31),
            Field::Month => (1, 12),
            Field::DayOfWeek => (0, 6),
        }
    }

    fn names(self) -> &'static [&'static str] {
        match self {
            Field::Month => &[
                "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
            ],
            Field::DayOfWeek => &["sun", "mon", "tue", "wed", "thu", "fri", "sat"],
            _ => &[],
        }
    }

    /// Parse a single value: a number, or a month/weekday name where the
    /// field allows one.
    fn value(self, token: &str) -> Option<u32> {
        if let Ok(n) = token.parse::<u32>() {
            return Some(n);
        }
        let (min, _) = self.bounds();
        self.names()
            .iter()
            .position(|name| name.eq_ignore_ascii_case(token))
            .map(|pos| min + pos as u32)
    }
}

/// A parsed, validated recurrence.
///
/// Each field is stored as a bitmask over its value domain (bit `n` set means
/// value `n` matches). Two extra flags remember whether the day fields were
/// left unrestricted, which decides between AND and OR matching of days.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub(crate) seconds: u64,
    pub(crate) minutes: u64,
    pub(crate) hours: u64,
    pub(crate) days_of_month: u64,
    pub(crate) months: u64,
    pub(crate) days_of_week: u64,
    pub(crate) dom_unrestricted: bool,
    pub(crate) dow_unrestricted: bool,
    expression: String,
}

impl Schedule {
    /// Parse a five- or six-field expression.
    ///
    /// Five fields get an implicit leading `0` seconds field. A `**` token
    /// is read as `*`. The canonical form (see [`Schedule::expression`]) is
    /// what callers should persist.
    pub fn parse(text: &str) -> Result<Schedule> {
        let mut tokens: Vec<String> = text.split_whitespace().map(collapse_stars).collect();
        match tokens.len() {
            5 => tokens.insert(0, "0".to_string()),
            6 => {}
            n => {
                return Err(SchedulerError::MalformedExpression {
                    expression: text.to_string(),
                    reason: format!("expected 5 or 6 fields, found {n}"),
                })
            }
        }

        let mut masks = [0u64; 6];
        let mut unrestricted = [false; 6];
        for (field, token) in Field::ALL.iter().zip(&tokens) {
            let (mask, star) = parse_field(*field, token)?;
            masks[field.index()] = mask;
            unrestricted[field.index()] = star;
        }

        Ok(Schedule {
            seconds: masks[0],
            minutes: masks[1],
            hours: masks[2],
            days_of_month: masks[3],
            months: masks[4],
            days_of_week: masks[5],
            dom_unrestricted: unrestricted[Field::DayOfMonth.index()],
            dow_unrestricted: unrestricted[Field::DayOfWeek.index()],
            expression: tokens.join(" "),
        })
    }

    /// Canonical six-field form: single-space separated, `**` collapsed.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Whether `value` is set in the mask for `field`.
    pub fn matches(&self, field: Field, value: u32) -> bool {
        let mask = match field {
            Field::Second => self.seconds,
            Field::Minute => self.minutes,
            Field::Hour => self.hours,
            Field::DayOfMonth => self.days_of_month,
            Field::Month => self.months,
            Field::DayOfWeek => self.days_of_week,
        };
        value < 64 && mask & (1 << value) != 0
    }
}

impl FromStr for Schedule {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        Schedule::parse(s)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn collapse_stars(token: &str) -> String {
    let mut token = token.to_string();
    while token.contains("**") {
        token = token.replace("**", "*");
    }
    token
}

/// Parse one comma-separated field into its mask. The flag is true when the
/// field contains an unstepped `*` or `?`.
fn parse_field(field: Field, token: &str) -> Result<(u64, bool)> {
    let mut mask = 0u64;
    let mut unrestricted = false;
    for term in token.split(',') {
        let (bits, star) = parse_term(field, term).ok_or_else(|| SchedulerError::FieldOutOfRange {
            index: field.index(),
            field: field.name(),
            token: token.to_string(),
        })?;
        mask |= bits;
        unrestricted |= star;
    }
    Ok((mask, unrestricted))
}

// term := ( '*' | '?' | value | value '-' value ) [ '/' step ]
fn parse_term(field: Field, term: &str) -> Option<(u64, bool)> {
    let (min, max) = field.bounds();
    let (range, step) = match term.split_once('/') {
        Some((range, step)) => (range, Some(step.parse::<u32>().ok().filter(|s| *s > 0)?)),
        None => (term, None),
    };

    let (start, end, star) = if range == "*" || range == "?" {
        (min, max, step.map_or(true, |s| s == 1))
    } else if let Some((lo, hi)) = range.split_once('-') {
        (field.value(lo)?, field.value(hi)?, false)
    } else {
        let start = field.value(range)?;
        // `n/step` runs from n to the end of the domain
        (start, if step.is_some() { max } else { start }, false)
    };

    if start < min || end > max || start > end {
        return None;
    }

    let bits = (start..=end)
        .step_by(step.unwrap_or(1) as usize)
        .fold(0u64, |acc, v| acc | (1 << v));
    Some((bits, star))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_fields_get_zero_seconds() {
        let five = Schedule::parse("30 4 * * *").unwrap();
        let six = Schedule::parse("0 30 4 * * *").unwrap();
        assert_eq!(five, six);
        assert_eq!(five.expression(), "0 30 4 * * *");
    }

    #[test]
    fn double_asterisk_is_cosmetic() {
        let plain = Schedule::parse("*/5 * * * * *").unwrap();
        for variant in ["*/5 ** * * * *", "*/5 * ** ** * **", "**/5 * * * * *"] {
            assert_eq!(Schedule::parse(variant).unwrap(), plain, "{variant}");
        }
        assert_eq!(Schedule::parse("** ** ** ** **").unwrap().expression(), "0 * * * * *");
    }

    #[test]
    fn canonical_string_round_trips() {
        for text in [
            "0 15 10 * * ?",
            "  0   0  12  1-5  *  MON-FRI ",
            "5/15 0,30 * 1,15 JAN-jun *",
            "0 0 0 15 * 1",
            "*/10 * * * *",
        ] {
            let first = Schedule::parse(text).unwrap();
            let again = Schedule::parse(first.expression()).unwrap();
            assert_eq!(first, again, "{text}");
        }
    }

    #[test]
    fn wrong_field_count_is_malformed() {
        for text in ["", "* * * *", "* * * * * * *"] {
            assert!(
                matches!(
                    Schedule::parse(text),
                    Err(SchedulerError::MalformedExpression { .. })
                ),
                "{text:?}"
            );
        }
    }

    #[test]
    fn out_of_range_names_the_field_index() {
        let cases = [
            ("60 * * * * *", 0),
            ("* 60 * * * *", 1),
            ("* * 24 * * *", 2),
            ("* * * 0 * *", 3),
            ("* * * 32 * *", 3),
            ("* * * * 13 *", 4),
            ("* * * * * 7", 5),
            ("* * * * * funday", 5),
            // five-field input is indexed after the implicit seconds field
            ("* * * 0 *", 4),
            ("abc * * * *", 1),
        ];
        for (text, expected) in cases {
            match Schedule::parse(text) {
                Err(SchedulerError::FieldOutOfRange { index, .. }) => {
                    assert_eq!(index, expected, "{text}")
                }
                other => panic!("{text}: expected FieldOutOfRange, got {other:?}"),
            }
        }
    }

    #[test]
    fn bad_ranges_and_steps_are_rejected() {
        for text in ["* * 5-2 * * *", "*/0 * * * * *", "*/x * * * * *", "1,,2 * * * * *"] {
            assert!(
                matches!(
                    Schedule::parse(text),
                    Err(SchedulerError::FieldOutOfRange { index: 0, .. })
                        | Err(SchedulerError::FieldOutOfRange { index: 2, .. })
                ),
                "{text}"
            );
        }
    }

    #[test]
    fn steps_lists_and_names_expand() {
        let s = Schedule::parse("*/20 10-40/15 1,2 * feb,DEC SUN,sat").unwrap();
        let seconds: Vec<u32> = (0..60).filter(|v| s.matches(Field::Second, *v)).collect();
        assert_eq!(seconds, vec![0, 20, 40]);
        let minutes: Vec<u32> = (0..60).filter(|v| s.matches(Field::Minute, *v)).collect();
        assert_eq!(minutes, vec![10, 25, 40]);
        assert!(s.matches(Field::Month, 2) && s.matches(Field::Month, 12));
        assert!(!s.matches(Field::Month, 1));
        assert!(s.matches(Field::DayOfWeek, 0) && s.matches(Field::DayOfWeek, 6));
    }

    #[test]
    fn only_unstepped_star_leaves_days_unrestricted() {
        let s = Schedule::parse("0 0 0 * * 1").unwrap();
        assert!(s.dom_unrestricted && !s.dow_unrestricted);
        let s = Schedule::parse("0 0 0 */2 * ?").unwrap();
        assert!(!s.dom_unrestricted && s.dow_unrestricted);
    }

    #[test]
    fn from_str_and_display_agree() {
        let s: Schedule = "0 0 * * *".parse().unwrap();
        assert_eq!(s.to_string(), "0 0 0 * * *");
    }
}
