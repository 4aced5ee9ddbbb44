//! Natural-language date/time parsing for scheduling requests.
//!
//! Accepts the phrasings customers actually type: "tomorrow at 7pm",
//! "Friday 6:30", "in 2 hours", "today 14:00", "2026-08-09 19:00". All
//! resolution happens in the business's local clock; the caller converts to
//! UTC for storage. Bare hours 1..=11 with no meridiem default to the
//! evening (PM) reading.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateTimeError {
    #[error("Could not understand the date or time: {0}")]
    Unparseable(String),

    #[error("That time is already in the past")]
    PastDateTime,
}

impl DateTimeError {
    pub fn code(&self) -> &'static str {
        match self {
            DateTimeError::Unparseable(_) => "INVALID_DATE_FORMAT",
            DateTimeError::PastDateTime => "PAST_DATE_TIME",
        }
    }
}

/// What the customer asked for: a day, and a clock time when they gave one.
/// A missing time falls back to the venue's opening time at resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedWhen {
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
}

impl ParsedWhen {
    /// Combine into a local datetime, using `fallback_time` when the
    /// customer gave only a day.
    pub fn at(&self, fallback_time: NaiveTime) -> NaiveDateTime {
        self.date.and_time(self.time.unwrap_or(fallback_time))
    }
}

/// Parse a natural-language scheduling expression against the local clock.
pub fn parse_expression(input: &str, now: NaiveDateTime) -> Result<ParsedWhen, DateTimeError> {
    let lowered = input.trim().to_lowercase();
    if lowered.is_empty() {
        return Err(DateTimeError::Unparseable(input.to_string()));
    }

    // Relative offsets resolve completely on their own.
    if let Some(when) = parse_relative(&lowered, now) {
        return Ok(when);
    }

    let tokens = tokenize(&lowered);
    let mut date: Option<NaiveDate> = None;
    let mut time: Option<NaiveTime> = None;

    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i].as_str();
        let next = tokens.get(i + 1).map(|s| s.as_str());

        if date.is_none() {
            if let Some(d) = parse_day_token(token, now.date()) {
                date = Some(d);
                i += 1;
                continue;
            }
        }
        if time.is_none() {
            if let Some((t, consumed_next)) = parse_time_token(token, next) {
                time = Some(t);
                i += if consumed_next { 2 } else { 1 };
                continue;
            }
        }
        i += 1;
    }

    if date.is_none() && time.is_none() {
        return Err(DateTimeError::Unparseable(input.to_string()));
    }

    let date = match date {
        Some(d) => {
            // A weekday that names today but whose time already passed means
            // next week, not a past slot.
            if let Some(t) = time {
                if d == now.date() && d.and_time(t) <= now && mentions_weekday(&tokens) {
                    d + Duration::days(7)
                } else {
                    d
                }
            } else {
                d
            }
        }
        // Time with no day: today, or tomorrow once today's instant passed.
        None => {
            let t = time.expect("time is set when date is not");
            if now.date().and_time(t) <= now {
                now.date() + Duration::days(1)
            } else {
                now.date()
            }
        }
    };

    Ok(ParsedWhen { date, time })
}

/// Reject datetimes at or before the local clock.
pub fn ensure_future(when: NaiveDateTime, now: NaiveDateTime) -> Result<(), DateTimeError> {
    if when <= now {
        Err(DateTimeError::PastDateTime)
    } else {
        Ok(())
    }
}

// ── token helpers ─────────────────────────────────────────────────────────────

fn tokenize(s: &str) -> Vec<String> {
    s.split_whitespace()
        .map(|t| t.trim_matches(|c: char| c == ',' || c == '.' || c == '!').to_string())
        .filter(|t| !t.is_empty() && t != "at" && t != "on" && t != "the")
        .collect()
}

/// "in 2 hours", "in 45 minutes", "in an hour".
fn parse_relative(s: &str, now: NaiveDateTime) -> Option<ParsedWhen> {
    let rest = s.strip_prefix("in ")?;
    let mut parts = rest.split_whitespace();
    let amount = parts.next()?;
    let unit = parts.next()?;
    let n: i64 = match amount {
        "an" | "a" => 1,
        other => other.parse().ok()?,
    };
    let delta = match unit.trim_end_matches('s') {
        "hour" | "hr" => Duration::hours(n),
        "minute" | "min" => Duration::minutes(n),
        _ => return None,
    };
    let target = now + delta;
    Some(ParsedWhen {
        date: target.date(),
        time: Some(target.time()),
    })
}

fn parse_day_token(token: &str, today: NaiveDate) -> Option<NaiveDate> {
    match token {
        "today" | "tonight" => return Some(today),
        "tomorrow" => return Some(today + Duration::days(1)),
        _ => {}
    }
    if let Ok(d) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(d) = NaiveDate::parse_from_str(token, "%d/%m/%Y") {
        return Some(d);
    }
    let weekday = parse_weekday(token)?;
    // Next occurrence, today included.
    let today_dow = today.weekday().num_days_from_monday() as i64;
    let target_dow = weekday.num_days_from_monday() as i64;
    let ahead = (target_dow - today_dow).rem_euclid(7);
    Some(today + Duration::days(ahead))
}

fn parse_weekday(token: &str) -> Option<Weekday> {
    match token {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" | "tues" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" | "thurs" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

fn mentions_weekday(tokens: &[String]) -> bool {
    tokens.iter().any(|t| parse_weekday(t).is_some())
}

/// Parse "7", "7:30", "19:00", "7pm", "7:30pm", or "7 pm" (consuming the
/// following token). Returns the time and whether the next token was used.
fn parse_time_token(token: &str, next: Option<&str>) -> Option<(NaiveTime, bool)> {
    let (body, meridiem_inline) = strip_meridiem(token);
    let (meridiem, consumed_next) = match meridiem_inline {
        Some(m) => (Some(m), false),
        None => match next {
            Some("am") => (Some(Meridiem::Am), true),
            Some("pm") => (Some(Meridiem::Pm), true),
            _ => (None, false),
        },
    };

    let (hour, minute): (u32, u32) = if let Some((h, m)) = body.split_once(':') {
        (h.parse().ok()?, m.parse().ok()?)
    } else {
        (body.parse().ok()?, 0)
    };
    if minute > 59 {
        return None;
    }

    let hour = match meridiem {
        Some(Meridiem::Am) => {
            if hour == 12 {
                0
            } else if hour <= 11 {
                hour
            } else {
                return None;
            }
        }
        Some(Meridiem::Pm) => {
            if hour == 12 {
                12
            } else if hour <= 11 {
                hour + 12
            } else {
                return None;
            }
        }
        // No meridiem: 1..=11 reads as evening, 12+ as 24-hour clock.
        None => {
            if hour > 23 {
                return None;
            }
            if (1..=11).contains(&hour) {
                hour + 12
            } else {
                hour
            }
        }
    };

    NaiveTime::from_hms_opt(hour, minute, 0).map(|t| (t, consumed_next))
}

#[derive(Clone, Copy)]
enum Meridiem {
    Am,
    Pm,
}

fn strip_meridiem(token: &str) -> (&str, Option<Meridiem>) {
    if let Some(body) = token.strip_suffix("pm") {
        (body, Some(Meridiem::Pm))
    } else if let Some(body) = token.strip_suffix("am") {
        (body, Some(Meridiem::Am))
    } else {
        (token, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        // Saturday 2026-08-01, 10:00 local.
        NaiveDate::from_ymd_opt(2026, 8, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn tomorrow_at_7pm() {
        let when = parse_expression("tomorrow at 7pm", now()).unwrap();
        assert_eq!(when.date, NaiveDate::from_ymd_opt(2026, 8, 2).unwrap());
        assert_eq!(when.time, Some(time(19, 0)));
    }

    #[test]
    fn friday_six_thirty_defaults_to_evening() {
        let when = parse_expression("Friday 6:30", now()).unwrap();
        // Next Friday after Saturday 2026-08-01 is 2026-08-07.
        assert_eq!(when.date, NaiveDate::from_ymd_opt(2026, 8, 7).unwrap());
        assert_eq!(when.time, Some(time(18, 30)));
    }

    #[test]
    fn in_two_hours() {
        let when = parse_expression("in 2 hours", now()).unwrap();
        assert_eq!(when.date, now().date());
        assert_eq!(when.time, Some(time(12, 0)));
    }

    #[test]
    fn today_explicit_24h_stays_literal() {
        let when = parse_expression("today 14:00", now()).unwrap();
        assert_eq!(when.date, now().date());
        assert_eq!(when.time, Some(time(14, 0)));
    }

    #[test]
    fn bare_time_past_rolls_to_tomorrow() {
        // 9am is before the 10:00 clock, so it means tomorrow morning.
        let when = parse_expression("9am", now()).unwrap();
        assert_eq!(when.date, now().date() + Duration::days(1));
        assert_eq!(when.time, Some(time(9, 0)));
    }

    #[test]
    fn todays_weekday_with_past_time_means_next_week() {
        // "saturday 9am" said on a Saturday at 10:00.
        let when = parse_expression("saturday 9am", now()).unwrap();
        assert_eq!(when.date, now().date() + Duration::days(7));
    }

    #[test]
    fn date_only_leaves_time_unset() {
        let when = parse_expression("tomorrow", now()).unwrap();
        assert_eq!(when.date, NaiveDate::from_ymd_opt(2026, 8, 2).unwrap());
        assert_eq!(when.time, None);

        let when = parse_expression("2026-08-09", now()).unwrap();
        assert_eq!(when.date, NaiveDate::from_ymd_opt(2026, 8, 9).unwrap());
        assert_eq!(when.time, None);
    }

    #[test]
    fn twelve_handling() {
        let when = parse_expression("tomorrow 12pm", now()).unwrap();
        assert_eq!(when.time, Some(time(12, 0)));
        let when = parse_expression("tomorrow 12am", now()).unwrap();
        assert_eq!(when.time, Some(time(0, 0)));
        // Bare 12 reads as noon on the 24-hour clock.
        let when = parse_expression("tomorrow 12:30", now()).unwrap();
        assert_eq!(when.time, Some(time(12, 30)));
    }

    #[test]
    fn garbage_is_unparseable() {
        let err = parse_expression("whenever works", now()).unwrap_err();
        assert_eq!(err.code(), "INVALID_DATE_FORMAT");
        assert!(parse_expression("", now()).is_err());
    }

    #[test]
    fn ensure_future_boundary() {
        assert!(ensure_future(now() + Duration::minutes(1), now()).is_ok());
        assert_eq!(
            ensure_future(now(), now()).unwrap_err().code(),
            "PAST_DATE_TIME"
        );
    }

    #[test]
    fn roundtrip_minute_precision() {
        // parse(format(d)) == d for an in-hours datetime.
        let d = NaiveDate::from_ymd_opt(2026, 8, 9)
            .unwrap()
            .and_hms_opt(19, 30, 0)
            .unwrap();
        let formatted = d.format("%Y-%m-%d %H:%M").to_string();
        let when = parse_expression(&formatted, now()).unwrap();
        assert_eq!(when.at(time(0, 0)), d);
    }
}
