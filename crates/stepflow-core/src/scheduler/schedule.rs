//! Cron schedule normalization and next-occurrence computation.
//!
//! Provides:
//! - Standard cron expression handling (6-field with seconds)
//! - Human-readable schedule normalization ("every 5 minutes" -> cron)
//! - `next_occurrence` for computing a task's next run via `croner`

use chrono::{DateTime, Utc};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur while interpreting a schedule string.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// Invalid cron expression or schedule string.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// The schedule has no occurrence after the given instant.
    #[error("schedule '{0}' has no future occurrence")]
    NoOccurrence(String),
}

// ---------------------------------------------------------------------------
// Human-readable schedule normalization
// ---------------------------------------------------------------------------

/// Normalize a human-readable schedule string to a cron expression.
///
/// Supported patterns (case-insensitive):
/// - "every N seconds"     -> "*/N * * * * *"
/// - "every N minutes"     -> "0 */N * * * *"
/// - "every N hours"       -> "0 0 */N * * *"
/// - "every minute"        -> "0 * * * * *"
/// - "every hour"          -> "0 0 * * * *"
/// - "every day"           -> "0 0 0 * * *"
/// - "every day at HH:MM"  -> "0 MM HH * * *"
/// - "hourly"              -> "0 0 * * * *"
/// - "daily"               -> "0 0 0 * * *"
///
/// A 5-field cron expression gets "0" prepended for seconds; a 6-field one
/// passes through unchanged.
pub fn normalize_schedule(input: &str) -> Result<String, ScheduleError> {
    let trimmed = input.trim();

    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    if parts.len() == 5 {
        return Ok(format!("0 {trimmed}"));
    }
    if parts.len() == 6 {
        return Ok(trimmed.to_string());
    }

    let lower = trimmed.to_lowercase();

    if lower == "every minute" || lower == "minutely" {
        return Ok("0 * * * * *".to_string());
    }
    if lower == "every hour" || lower == "hourly" {
        return Ok("0 0 * * * *".to_string());
    }
    if lower == "every day" || lower == "daily" {
        return Ok("0 0 0 * * *".to_string());
    }

    if let Some(rest) = lower.strip_prefix("every ") {
        // "every day at HH:MM"
        if let Some(at_part) = rest.strip_prefix("day at ") {
            let time_parts: Vec<&str> = at_part.split(':').collect();
            if time_parts.len() == 2 {
                let hour: u32 = time_parts[0]
                    .trim()
                    .parse()
                    .map_err(|_| ScheduleError::InvalidSchedule(input.to_string()))?;
                let minute: u32 = time_parts[1]
                    .trim()
                    .parse()
                    .map_err(|_| ScheduleError::InvalidSchedule(input.to_string()))?;
                if hour < 24 && minute < 60 {
                    return Ok(format!("0 {minute} {hour} * * *"));
                }
            }
            return Err(ScheduleError::InvalidSchedule(input.to_string()));
        }

        // "every N seconds/minutes/hours"
        let words: Vec<&str> = rest.split_whitespace().collect();
        if words.len() == 2 {
            let n: u32 = words[0]
                .parse()
                .map_err(|_| ScheduleError::InvalidSchedule(input.to_string()))?;
            if n == 0 {
                return Err(ScheduleError::InvalidSchedule(
                    "interval must be > 0".to_string(),
                ));
            }
            let unit = words[1].trim_end_matches('s');
            return match unit {
                "second" => Ok(format!("*/{n} * * * * *")),
                "minute" => Ok(format!("0 */{n} * * * *")),
                "hour" => Ok(format!("0 0 */{n} * * *")),
                _ => Err(ScheduleError::InvalidSchedule(input.to_string())),
            };
        }
    }

    Err(ScheduleError::InvalidSchedule(format!(
        "unrecognized schedule format: '{trimmed}'"
    )))
}

// ---------------------------------------------------------------------------
// Next occurrence
// ---------------------------------------------------------------------------

/// Compute the first occurrence of a schedule strictly after `after`.
///
/// Accepts anything `normalize_schedule` does. Invalid schedules are errors,
/// never a fabricated timestamp.
pub fn next_occurrence(
    schedule: &str,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>, ScheduleError> {
    let cron_expr = normalize_schedule(schedule)?;
    let cron = cron_expr
        .parse::<croner::Cron>()
        .map_err(|e| ScheduleError::InvalidSchedule(format!("{schedule}: {e}")))?;

    cron.iter_after(after)
        .next()
        .ok_or_else(|| ScheduleError::NoOccurrence(schedule.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // -------------------------------------------------------------------
    // normalize_schedule
    // -------------------------------------------------------------------

    #[test]
    fn test_normalize_standard_5field_cron() {
        let result = normalize_schedule("*/5 * * * *").unwrap();
        assert_eq!(result, "0 */5 * * * *");
    }

    #[test]
    fn test_normalize_6field_cron_passthrough() {
        let result = normalize_schedule("30 */5 * * * *").unwrap();
        assert_eq!(result, "30 */5 * * * *");
    }

    #[test]
    fn test_normalize_every_5_minutes() {
        let result = normalize_schedule("every 5 minutes").unwrap();
        assert_eq!(result, "0 */5 * * * *");
    }

    #[test]
    fn test_normalize_every_10_seconds() {
        let result = normalize_schedule("every 10 seconds").unwrap();
        assert_eq!(result, "*/10 * * * * *");
    }

    #[test]
    fn test_normalize_every_2_hours() {
        let result = normalize_schedule("every 2 hours").unwrap();
        assert_eq!(result, "0 0 */2 * * *");
    }

    #[test]
    fn test_normalize_hourly_and_daily() {
        assert_eq!(normalize_schedule("hourly").unwrap(), "0 0 * * * *");
        assert_eq!(normalize_schedule("daily").unwrap(), "0 0 0 * * *");
    }

    #[test]
    fn test_normalize_every_day_at_time() {
        let result = normalize_schedule("every day at 09:30").unwrap();
        assert_eq!(result, "0 30 9 * * *");
    }

    #[test]
    fn test_normalize_invalid_format() {
        assert!(normalize_schedule("run whenever").is_err());
    }

    #[test]
    fn test_normalize_zero_interval_rejected() {
        assert!(normalize_schedule("every 0 minutes").is_err());
    }

    #[test]
    fn test_normalize_case_insensitive() {
        let result = normalize_schedule("Every 5 Minutes").unwrap();
        assert_eq!(result, "0 */5 * * * *");
    }

    // -------------------------------------------------------------------
    // next_occurrence
    // -------------------------------------------------------------------

    #[test]
    fn test_next_occurrence_is_strictly_after() {
        let after = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let next = next_occurrence("0 9 * * *", after).unwrap();
        // 09:00 itself does not count; the next daily 09:00 is tomorrow.
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_next_occurrence_every_minute() {
        let after = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 30).unwrap();
        let next = next_occurrence("every minute", after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 1, 9, 1, 0).unwrap());
    }

    #[test]
    fn test_next_occurrence_invalid_schedule_is_error() {
        let result = next_occurrence("not a schedule", Utc::now());
        assert!(matches!(result, Err(ScheduleError::InvalidSchedule(_))));
    }
}
