use chrono::{DateTime, Utc};
use croner::Cron;
use tracing::warn;

use crate::error::ValidationError;

/// Parse a standard five-field cron expression (`min hour dom month dow`).
pub fn parse_cron(expression: &str) -> Result<Cron, ValidationError> {
    Cron::new(expression)
        .parse()
        .map_err(|e| ValidationError::InvalidCronSchedule(format!("{expression}: {e}")))
}

/// Compute the first instant matching `expression` strictly after `after` (UTC).
///
/// Returns `None` when the expression does not parse or has no future
/// occurrence. Callers validate expressions up front, so `None` here means
/// the job has nothing left to run.
pub fn next_occurrence(expression: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let cron = match parse_cron(expression) {
        Ok(cron) => cron,
        Err(e) => {
            warn!(%expression, "cannot compute next run: {e}");
            return None;
        }
    };

    let mut from = after;
    // croner truncates sub-second precision; step past any match that does
    // not land strictly after the requested instant.
    for _ in 0..2 {
        match cron.find_next_occurrence(&from, false) {
            Ok(next) if next > after => return Some(next),
            Ok(next) => from = next,
            Err(e) => {
                warn!(%expression, "no next occurrence: {e}");
                return None;
            }
        }
    }
    None
}
