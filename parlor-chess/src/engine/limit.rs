use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_STRENGTH: u16 = 100;
pub const MAX_STRENGTH: u16 = 3000;
pub const DEFAULT_STRENGTH: u16 = 1000;
pub const MAX_DEPTH: u8 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimit {
    pub depth: u8,
    pub move_time: Option<Duration>,
}

impl SearchLimit {
    /// Maps a rating-like strength onto search depth: every 100 points above
    /// the minimum buys one ply, from depth 1 at 100 up to [`MAX_DEPTH`].
    pub fn for_strength(strength: u16, move_time: Option<Duration>) -> Self {
        let rating = strength.clamp(MIN_STRENGTH, MAX_STRENGTH);
        let depth = ((rating - MIN_STRENGTH) / 100 + 1).min(MAX_DEPTH as u16) as u8;
        Self { depth, move_time }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid duration {0:?}")]
pub struct InvalidDuration(pub String);

/// A duration written the way config files spell it: `250ms`, `10s`, `2m`,
/// `1h`, or bare seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DurationText(pub Duration);

impl FromStr for DurationText {
    type Err = InvalidDuration;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidDuration(s.to_owned());
        let text = s.trim();
        let split = text
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(text.len());
        let (amount, unit) = text.split_at(split);
        let millis_per_unit = match unit {
            "ms" => 1.0,
            "" | "s" => 1_000.0,
            "m" => 60_000.0,
            "h" => 3_600_000.0,
            _ => return Err(invalid()),
        };
        let amount: f64 = amount.trim_end().parse().map_err(|_| invalid())?;
        let secs = amount * millis_per_unit / 1_000.0;
        if secs.is_sign_negative() || !secs.is_finite() || secs >= u64::MAX as f64 {
            return Err(invalid());
        }
        Ok(DurationText(Duration::from_secs_f64(secs)))
    }
}

impl TryFrom<String> for DurationText {
    type Error = InvalidDuration;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DurationText> for String {
    fn from(d: DurationText) -> Self {
        d.to_string()
    }
}

impl fmt::Display for DurationText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_maps_to_depth() {
        let depth = |s| SearchLimit::for_strength(s, None).depth;
        assert_eq!(depth(100), 1);
        assert_eq!(depth(199), 1);
        assert_eq!(depth(1000), 10);
        assert_eq!(depth(2900), 29);
        assert_eq!(depth(3000), 30);
        assert_eq!(depth(0), 1);
        assert_eq!(depth(9000), 30);
    }

    #[test]
    fn durations() {
        let parse = |s: &str| s.parse::<DurationText>().map(|d| d.0);
        assert_eq!(parse("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse("10s"), Ok(Duration::from_secs(10)));
        assert_eq!(parse(" 2m "), Ok(Duration::from_secs(120)));
        assert_eq!(parse("1.5"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse("-1s"), Err(InvalidDuration("-1s".to_owned())));
        assert!(parse("soon").is_err());
        assert!(parse("5 days").is_err());
        assert!(parse("ms").is_err());
        assert!(parse("1e400").is_err());
        let text = "10s".parse::<DurationText>().map(|d| d.to_string());
        assert_eq!(text, Ok("10000ms".to_owned()));
    }
}
