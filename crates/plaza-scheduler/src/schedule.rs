use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

use crate::error::{Result, SchedulerError};

/// The subset of cron this deployment uses: fixed minute and hour, every
/// day ("M H * * *"). Anything fancier is a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyCron {
    pub minute: u8,
    pub hour: u8,
}

impl DailyCron {
    pub fn parse(expr: &str) -> Result<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 || fields[2] != "*" || fields[3] != "*" || fields[4] != "*" {
            return Err(SchedulerError::InvalidCron(expr.to_string()));
        }
        let minute: u8 = fields[0]
            .parse()
            .map_err(|_| SchedulerError::InvalidCron(expr.to_string()))?;
        let hour: u8 = fields[1]
            .parse()
            .map_err(|_| SchedulerError::InvalidCron(expr.to_string()))?;
        if minute > 59 || hour > 23 {
            return Err(SchedulerError::InvalidCron(expr.to_string()));
        }
        Ok(Self { minute, hour })
    }

    /// Next firing strictly after `from`, in the clock shifted by
    /// `tz_offset_minutes` from UTC.
    pub fn next_run(&self, from: DateTime<Utc>, tz_offset_minutes: i32) -> DateTime<Utc> {
        let offset = Duration::minutes(tz_offset_minutes as i64);
        let local = from + offset;
        let candidate = Utc
            .with_ymd_and_hms(
                local.year(),
                local.month(),
                local.day(),
                self.hour as u32,
                self.minute as u32,
                0,
            )
            .single()
            .unwrap_or(local);
        let candidate = if candidate > local {
            candidate
        } else {
            candidate + Duration::days(1)
        };
        candidate - offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_archive_cron() {
        let cron = DailyCron::parse("0 2 * * *").unwrap();
        assert_eq!(cron, DailyCron { minute: 0, hour: 2 });
    }

    #[test]
    fn rejects_unsupported_fields() {
        assert!(DailyCron::parse("0 2 * * 1").is_err());
        assert!(DailyCron::parse("*/5 2 * * *").is_err());
        assert!(DailyCron::parse("61 2 * * *").is_err());
        assert!(DailyCron::parse("0 2").is_err());
    }

    #[test]
    fn next_run_rolls_to_tomorrow_after_the_hour() {
        let cron = DailyCron::parse("0 2 * * *").unwrap();
        let before = Utc.with_ymd_and_hms(2026, 8, 1, 1, 0, 0).unwrap();
        assert_eq!(
            cron.next_run(before, 0),
            Utc.with_ymd_and_hms(2026, 8, 1, 2, 0, 0).unwrap()
        );
        let after = Utc.with_ymd_and_hms(2026, 8, 1, 2, 0, 0).unwrap();
        assert_eq!(
            cron.next_run(after, 0),
            Utc.with_ymd_and_hms(2026, 8, 2, 2, 0, 0).unwrap()
        );
    }

    #[test]
    fn next_run_respects_tz_offset() {
        // 02:00 local at UTC+3 is 23:00 UTC the previous day.
        let cron = DailyCron::parse("0 2 * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        assert_eq!(
            cron.next_run(from, 180),
            Utc.with_ymd_and_hms(2026, 8, 1, 23, 0, 0).unwrap()
        );
    }
}
