use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    #[error("empty version string")]
    Empty,
    #[error("malformed version segment '{segment}' in '{input}'")]
    MalformedSegment { input: String, segment: String },
}

/// Dotted numeric version. Missing trailing components compare as zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    segments: Vec<u64>,
}

impl Version {
    /// Strict parse: every segment must be a non-negative integer.
    ///
    /// # Errors
    /// Returns an error for an empty string or any non-numeric segment.
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let core = strip_prefix(input);
        if core.is_empty() {
            return Err(VersionParseError::Empty);
        }

        let segments = core
            .split('.')
            .map(|segment| {
                segment
                    .parse::<u64>()
                    .map_err(|_| VersionParseError::MalformedSegment {
                        input: input.to_string(),
                        segment: segment.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { segments })
    }

    /// Lenient parse used for ordering: unparsable segments become `0`,
    /// so `2.0.0-beta.1` reads as `2.0.0.1`.
    #[must_use]
    pub fn lenient(input: &str) -> Self {
        let segments = strip_prefix(input)
            .split('.')
            .map(|segment| segment.trim().parse::<u64>().unwrap_or(0))
            .collect();
        Self { segments }
    }

    #[must_use]
    pub fn segments(&self) -> &[u64] {
        &self.segments
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        (0..len)
            .map(|i| {
                let left = self.segments.get(i).copied().unwrap_or(0);
                let right = other.segments.get(i).copied().unwrap_or(0);
                left.cmp(&right)
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.segments.iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join("."))
    }
}

fn strip_prefix(input: &str) -> &str {
    let trimmed = input.trim();
    trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed)
}

/// Total ordering of two dotted version strings. Never fails.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    Version::lenient(a).cmp(&Version::lenient(b))
}

/// `-1`, `0` or `1` depending on whether `a` is older, equal or newer than `b`.
#[must_use]
pub fn compare(a: &str, b: &str) -> i32 {
    match compare_versions(a, b) {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

#[must_use]
pub fn is_newer_version(candidate: &str, current: &str) -> bool {
    compare_versions(candidate, current) == Ordering::Greater
}
