//! Schedule evaluation for SCHEDULED and RECURRING campaigns

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use whatsjet_common::{Error, Result};
use whatsjet_storage::models::ScheduleDescriptor;

/// Expand 5- and 6-field expressions to the 7-field form the `cron` crate
/// expects (seconds first, year last)
pub fn normalize_cron_expr(expr: &str) -> String {
    let expr = expr.trim();
    match expr.split_whitespace().count() {
        5 => format!("0 {expr} *"),
        6 => format!("{expr} *"),
        _ => expr.to_owned(),
    }
}

pub fn parse_pattern(pattern: &str) -> Result<Schedule> {
    Schedule::from_str(&normalize_cron_expr(pattern))
        .map_err(|e| Error::Validation(format!("Invalid recurring pattern '{}': {}", pattern, e)))
}

/// First occurrence of `pattern` strictly after `after`
pub fn next_occurrence(pattern: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
    parse_pattern(pattern)?
        .after(&after)
        .next()
        .ok_or_else(|| Error::Validation(format!("Pattern '{}' has no future occurrence", pattern)))
}

/// When a campaign entering SCHEDULED should fire
pub fn next_run_at(schedule: &ScheduleDescriptor, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    match schedule {
        ScheduleDescriptor::Immediate => Ok(now),
        ScheduleDescriptor::Scheduled { at } => Ok(*at),
        ScheduleDescriptor::Recurring { pattern } => next_occurrence(pattern, now),
    }
}
