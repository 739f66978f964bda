use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Opaque commit identifier (a full or abbreviated hash as printed by git).
///
/// Two refs are only ever compared for equality; any ordering between them
/// comes from ancestry queries against the repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommitRef(String);

impl CommitRef {
    pub fn new(hash: impl Into<String>) -> Self {
        CommitRef(hash.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CommitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommitRef {
    fn from(s: &str) -> Self {
        CommitRef::new(s)
    }
}

impl From<String> for CommitRef {
    fn from(s: String) -> Self {
        CommitRef::new(s)
    }
}

/// Relationship of the local HEAD to the remote HEAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    LocalBehindRemote,
    LocalAheadOfRemote,
    Diverged,
    /// Both refs claim to be ancestors of each other. Never valid.
    Unknown,
}

impl Comparison {
    /// Classify two distinct refs from the two ancestry answers.
    pub fn from_ancestry(local_in_remote: bool, remote_in_local: bool) -> Self {
        match (local_in_remote, remote_in_local) {
            (true, false) => Comparison::LocalBehindRemote,
            (false, true) => Comparison::LocalAheadOfRemote,
            (false, false) => Comparison::Diverged,
            (true, true) => Comparison::Unknown,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Comparison::Equal => "equal",
            Comparison::LocalBehindRemote => "behind",
            Comparison::LocalAheadOfRemote => "ahead",
            Comparison::Diverged => "diverged",
            Comparison::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Duration value as written in config files and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct HumanDuration(pub Duration);

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s).map(HumanDuration)
    }
}

impl TryFrom<String> for HumanDuration {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<HumanDuration> for Duration {
    fn from(d: HumanDuration) -> Self {
        d.0
    }
}

/// Parse a duration string like `"15s"`, `"250ms"`, `"1m"`, `"2h"`.
///
/// Units may be chained (`"1m30s"`); a bare number is rejected.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let mut total = Duration::ZERO;
    let mut rest = s;

    while !rest.is_empty() {
        let idx = rest
            .chars()
            .position(|c| !c.is_ascii_digit())
            .ok_or_else(|| format!("duration '{}' is missing a unit suffix", s))?;
        if idx == 0 {
            return Err(format!("invalid duration '{}': expected a number", s));
        }

        let (num_part, tail) = rest.split_at(idx);
        let value: u64 = num_part
            .parse()
            .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;

        let unit_len = tail
            .chars()
            .position(|c| c.is_ascii_digit())
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);

        let part = match unit.trim().to_lowercase().as_str() {
            "ms" => Some(Duration::from_millis(value)),
            "s" => Some(Duration::from_secs(value)),
            "m" => value.checked_mul(60).map(Duration::from_secs),
            "h" => value.checked_mul(60 * 60).map(Duration::from_secs),
            other => {
                return Err(format!(
                    "unsupported duration unit '{}'; expected ms, s, m, or h",
                    other
                ));
            }
        };

        total = part
            .and_then(|part| total.checked_add(part))
            .ok_or_else(|| format!("duration '{}' is too large", s))?;
        rest = next;
    }

    Ok(total)
}
