//! Opening-hours resolution and time-window checks.
//!
//! Rows are per (owner, weekday). Branch rows shadow business rows; when a
//! branch has no row for a weekday the business row applies. Times are "HH:MM"
//! strings with minute precision; a close time at or before the open time is
//! read as closing after midnight.

use crate::error::{CatalogError, Result};
use crate::store::CatalogStore;
use crate::types::OpeningHours;

/// Parse "HH:MM" into minutes since midnight.
pub fn parse_hhmm(s: &str) -> Result<u32> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| CatalogError::InvalidTime(s.to_string()))?;
    let h: u32 = h
        .parse()
        .map_err(|_| CatalogError::InvalidTime(s.to_string()))?;
    let m: u32 = m
        .parse()
        .map_err(|_| CatalogError::InvalidTime(s.to_string()))?;
    if h > 23 || m > 59 {
        return Err(CatalogError::InvalidTime(s.to_string()));
    }
    Ok(h * 60 + m)
}

/// Format minutes since midnight back to "HH:MM".
pub fn format_hhmm(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// The hours in effect for an owner on a weekday: the branch row when one
/// exists, the business row otherwise.
pub fn effective_hours(
    store: &CatalogStore,
    owner_id: &str,
    business_id: &str,
    day_of_week: u8,
) -> Result<Option<OpeningHours>> {
    if let Some(h) = store.opening_hours_for(owner_id, day_of_week)? {
        return Ok(Some(h));
    }
    if owner_id != business_id {
        return store.opening_hours_for(business_id, day_of_week);
    }
    Ok(None)
}

/// Is the venue open at `minutes` (since local midnight) under `hours`?
///
/// A missing row or a row without both times reads as closed. Overnight
/// windows (close at or before open) extend past midnight.
pub fn is_open_at(hours: Option<&OpeningHours>, minutes: u32) -> bool {
    let Some(h) = hours else { return false };
    if h.is_closed {
        return false;
    }
    let (Some(open), Some(close)) = (h.open_time.as_deref(), h.close_time.as_deref()) else {
        return false;
    };
    let (Ok(open), Ok(close)) = (parse_hhmm(open), parse_hhmm(close)) else {
        return false;
    };
    if close > open {
        open <= minutes && minutes < close
    } else {
        // Overnight: e.g. 18:00 .. 02:00.
        minutes >= open || minutes < close
    }
}

/// Has the last-order cutoff passed at `minutes`? No cutoff means no.
pub fn last_order_passed(hours: Option<&OpeningHours>, minutes: u32) -> bool {
    let Some(cutoff) = hours.and_then(|h| h.last_order_time.as_deref()) else {
        return false;
    };
    match parse_hhmm(cutoff) {
        Ok(cutoff) => minutes >= cutoff,
        Err(_) => false,
    }
}

/// Opening minute for a weekday, if the venue opens at all that day.
pub fn opening_minute(hours: Option<&OpeningHours>) -> Option<u32> {
    let h = hours?;
    if h.is_closed {
        return None;
    }
    parse_hhmm(h.open_time.as_deref()?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours(open: &str, close: &str) -> OpeningHours {
        OpeningHours {
            owner_id: "biz".into(),
            day_of_week: 0,
            open_time: Some(open.into()),
            close_time: Some(close.into()),
            is_closed: false,
            last_order_time: None,
        }
    }

    #[test]
    fn parse_rejects_out_of_range() {
        assert!(parse_hhmm("24:00").is_err());
        assert!(parse_hhmm("12:60").is_err());
        assert!(parse_hhmm("noon").is_err());
        assert_eq!(parse_hhmm("09:30").unwrap(), 570);
    }

    #[test]
    fn open_window_is_half_open() {
        let h = hours("09:00", "17:00");
        assert!(!is_open_at(Some(&h), parse_hhmm("08:59").unwrap()));
        assert!(is_open_at(Some(&h), parse_hhmm("09:00").unwrap()));
        assert!(is_open_at(Some(&h), parse_hhmm("16:59").unwrap()));
        assert!(!is_open_at(Some(&h), parse_hhmm("17:00").unwrap()));
    }

    #[test]
    fn overnight_window_spans_midnight() {
        let h = hours("18:00", "02:00");
        assert!(is_open_at(Some(&h), parse_hhmm("23:30").unwrap()));
        assert!(is_open_at(Some(&h), parse_hhmm("01:30").unwrap()));
        assert!(!is_open_at(Some(&h), parse_hhmm("03:00").unwrap()));
        assert!(!is_open_at(Some(&h), parse_hhmm("17:59").unwrap()));
    }

    #[test]
    fn closed_day_is_never_open() {
        let mut h = hours("09:00", "17:00");
        h.is_closed = true;
        assert!(!is_open_at(Some(&h), parse_hhmm("12:00").unwrap()));
        assert!(!is_open_at(None, parse_hhmm("12:00").unwrap()));
    }

    #[test]
    fn last_order_cutoff() {
        let mut h = hours("09:00", "22:00");
        h.last_order_time = Some("21:30".into());
        assert!(!last_order_passed(Some(&h), parse_hhmm("21:29").unwrap()));
        assert!(last_order_passed(Some(&h), parse_hhmm("21:30").unwrap()));
    }
}
