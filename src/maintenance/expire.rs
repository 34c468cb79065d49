//! Git time expressions for `gc.prunePackExpire`.
//!
//! Supports the expiry subset of Git's date grammar: `now`, `never` (and
//! its alias `false`), and relative forms like `3600.seconds.ago`,
//! `1.hour.ago`, or `1.hour.30.minutes.ago`. Units may be singular or
//! plural; months count 30 days and years 365.
//!
//! Unparseable configured values are downgraded to a warning and the
//! default of one hour applies.

use std::time::{Duration, SystemTime};

use tracing::warn;

/// Fallback grace window when the config is missing or unparseable.
pub const DEFAULT_EXPIRE: Duration = Duration::from_secs(3600);

/// An instant before which packs are considered stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpireCutoff {
    /// Nothing ever expires.
    Never,
    /// Files modified strictly before this instant are stale.
    At(SystemTime),
}

impl ExpireCutoff {
    /// Returns true if a file with modification time `mtime` is stale.
    #[must_use]
    pub fn is_stale(&self, mtime: SystemTime) -> bool {
        match self {
            Self::Never => false,
            Self::At(cutoff) => mtime < *cutoff,
        }
    }
}

/// Parses one expiry expression relative to `now`.
#[must_use]
pub fn parse_expire(raw: &str, now: SystemTime) -> Option<ExpireCutoff> {
    let expr = raw.trim().to_ascii_lowercase();
    match expr.as_str() {
        "" => return None,
        "now" => return Some(ExpireCutoff::At(now)),
        "never" | "false" => return Some(ExpireCutoff::Never),
        _ => {}
    }

    let mut parts = expr.split('.').collect::<Vec<_>>();
    if parts.len() < 3 || parts.pop() != Some("ago") {
        return None;
    }
    if parts.len() % 2 != 0 {
        return None;
    }

    let mut total = Duration::ZERO;
    for pair in parts.chunks_exact(2) {
        let amount: u64 = pair[0].parse().ok()?;
        let unit = unit_seconds(pair[1])?;
        total = total.checked_add(Duration::from_secs(amount.checked_mul(unit)?))?;
    }

    let cutoff = now.checked_sub(total).unwrap_or(SystemTime::UNIX_EPOCH);
    Some(ExpireCutoff::At(cutoff))
}

/// Resolves a configured expiry, falling back to [`DEFAULT_EXPIRE`] when
/// the value is missing or unparseable.
#[must_use]
pub fn resolve_expire(raw: Option<&str>, now: SystemTime) -> ExpireCutoff {
    let fallback = || {
        ExpireCutoff::At(
            now.checked_sub(DEFAULT_EXPIRE)
                .unwrap_or(SystemTime::UNIX_EPOCH),
        )
    };

    match raw {
        None => fallback(),
        Some(value) => parse_expire(value, now).unwrap_or_else(|| {
            warn!(value, "unparseable gc.prunePackExpire, using 1 hour");
            fallback()
        }),
    }
}

fn unit_seconds(unit: &str) -> Option<u64> {
    let unit = unit.strip_suffix('s').unwrap_or(unit);
    match unit {
        "second" => Some(1),
        "minute" => Some(60),
        "hour" => Some(3600),
        "day" => Some(86_400),
        "week" => Some(7 * 86_400),
        "month" => Some(30 * 86_400),
        "year" => Some(365 * 86_400),
        _ => None,
    }
}
