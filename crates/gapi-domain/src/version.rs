//! Gradle release strings and their base versions.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Numeric part of a Gradle version with any qualifier stripped.
///
/// Ordering is a strict total order over `(major, minor, patch)`; `8.2` and
/// `8.2.0` are the same base version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BaseVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl BaseVersion {
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for BaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.patch == 0 {
            write!(f, "{}.{}", self.major, self.minor)
        } else {
            write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
        }
    }
}

impl FromStr for BaseVersion {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let version = GradleVersion::parse(s)?;
        if version.qualifier().is_some() {
            return Err(EngineError::InvalidVersionFormat {
                input: s.to_string(),
                reason: "a base version cannot carry a qualifier".into(),
            });
        }
        Ok(version.base())
    }
}

impl TryFrom<String> for BaseVersion {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BaseVersion> for String {
    fn from(value: BaseVersion) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualifierKind {
    Nightly,
    Milestone,
    ReleaseCandidate,
    Other,
}

/// Pre-release suffix such as `rc-1`, `milestone-2` or a nightly timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Qualifier {
    text: String,
    kind: QualifierKind,
}

impl Qualifier {
    fn parse(text: &str) -> Self {
        let lowered = text.to_ascii_lowercase();
        let kind = if is_nightly_stamp(&lowered) {
            QualifierKind::Nightly
        } else if lowered.starts_with("milestone-") {
            QualifierKind::Milestone
        } else if lowered.starts_with("rc-") {
            QualifierKind::ReleaseCandidate
        } else {
            QualifierKind::Other
        };
        Self {
            text: text.to_string(),
            kind,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn kind(&self) -> QualifierKind {
        self.kind
    }
}

impl Ord for Qualifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.kind
            .cmp(&other.kind)
            .then_with(|| compare_segments(&self.text, &other.text))
    }
}

impl PartialOrd for Qualifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Nightlies end in `yyyyMMddHHmmss+zzzz`, optionally after a branch name.
fn is_nightly_stamp(qualifier: &str) -> bool {
    let Some((stamp, zone)) = qualifier.rsplit_once('+') else {
        return false;
    };
    let stamp = stamp.rsplit('-').next().unwrap_or(stamp);
    stamp.len() == 14
        && stamp.bytes().all(|b| b.is_ascii_digit())
        && zone.len() == 4
        && zone.bytes().all(|b| b.is_ascii_digit())
}

fn compare_segments(a: &str, b: &str) -> Ordering {
    let mut left = a.split(['.', '-', '+']);
    let mut right = b.split(['.', '-', '+']);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(ln), Ok(rn)) => ln.cmp(&rn),
                    _ => l.cmp(r),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// A parsed Gradle release string.
///
/// Equality and hashing use the full string, so `6.0-rc-1` and `6.0` are
/// distinct identities even though they share a [`BaseVersion`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GradleVersion {
    raw: String,
    base: BaseVersion,
    qualifier: Option<Qualifier>,
}

impl GradleVersion {
    /// Parses `major.minor[.patch][-qualifier]`.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidVersionFormat`] when the string does not
    /// follow that shape.
    pub fn parse(input: &str) -> Result<Self, EngineError> {
        let invalid = |reason: &str| EngineError::InvalidVersionFormat {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let raw = input.trim();
        if raw.is_empty() {
            return Err(invalid("version is empty"));
        }
        let (numeric, qualifier) = match raw.split_once('-') {
            Some((numeric, qualifier)) => (numeric, Some(qualifier)),
            None => (raw, None),
        };

        let parts: Vec<&str> = numeric.split('.').collect();
        if parts.len() < 2 {
            return Err(invalid("expected at least major.minor"));
        }
        if parts.len() > 3 {
            return Err(invalid("expected at most major.minor.patch"));
        }
        let mut numbers = [0u32; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("version components must be numeric"));
            }
            *slot = part
                .parse()
                .map_err(|_| invalid("version component out of range"))?;
        }

        let qualifier = match qualifier {
            None => None,
            Some("") => return Err(invalid("qualifier after '-' is empty")),
            Some(text) => {
                let valid = text
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'+'));
                if !valid {
                    return Err(invalid("qualifier contains unsupported characters"));
                }
                Some(Qualifier::parse(text))
            }
        };

        Ok(Self {
            raw: raw.to_string(),
            base: BaseVersion::new(numbers[0], numbers[1], numbers[2]),
            qualifier,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn base(&self) -> BaseVersion {
        self.base
    }

    #[must_use]
    pub fn qualifier(&self) -> Option<&Qualifier> {
        self.qualifier.as_ref()
    }

    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        self.qualifier.is_some()
    }

    #[must_use]
    pub fn is_nightly(&self) -> bool {
        self.qualifier
            .as_ref()
            .is_some_and(|q| q.kind() == QualifierKind::Nightly)
    }

    /// Filesystem-safe rendering used for cache directory names.
    #[must_use]
    pub fn path_segment(&self) -> String {
        self.raw
            .chars()
            .map(|c| if c == '+' { '_' } else { c })
            .collect()
    }
}

impl PartialEq for GradleVersion {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for GradleVersion {}

impl Hash for GradleVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl Ord for GradleVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.base
            .cmp(&other.base)
            .then_with(|| match (&self.qualifier, &other.qualifier) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(l), Some(r)) => l.cmp(r),
            })
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for GradleVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for GradleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for GradleVersion {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for GradleVersion {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<GradleVersion> for String {
    fn from(value: GradleVersion) -> Self {
        value.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> GradleVersion {
        GradleVersion::parse(text).unwrap()
    }

    #[test]
    fn parses_release_and_patch_versions() {
        assert_eq!(v("8.2").base(), BaseVersion::new(8, 2, 0));
        assert_eq!(v("8.2.1").base(), BaseVersion::new(8, 2, 1));
        assert!(v("8.2").qualifier().is_none());
        assert_eq!(v("8.2").base(), v("8.2.0").base());
    }

    #[test]
    fn classifies_qualifiers() {
        let rc = v("6.0-rc-1");
        assert_eq!(rc.base().to_string(), "6.0");
        let qualifier = rc.qualifier().unwrap();
        assert_eq!(qualifier.as_str(), "rc-1");
        assert_eq!(qualifier.kind(), QualifierKind::ReleaseCandidate);

        assert_eq!(
            v("7.0-milestone-2").qualifier().unwrap().kind(),
            QualifierKind::Milestone
        );
        let nightly = v("8.5-20231010220000+0000");
        assert!(nightly.is_nightly());
        assert_eq!(nightly.path_segment(), "8.5-20231010220000_0000");
        assert!(v("8.6-branch-feature-20240101000000+0000").is_nightly());
    }

    #[test]
    fn rejects_malformed_strings() {
        for input in ["", "8", "8.x", "8.2.1.4", "8.2-", "8..2", "8.2-rc 1", "-rc-1"] {
            let err = GradleVersion::parse(input).unwrap_err();
            assert!(
                matches!(err, EngineError::InvalidVersionFormat { .. }),
                "{input:?} should be rejected, got {err}"
            );
        }
    }

    #[test]
    fn identity_includes_qualifier_but_base_does_not() {
        let rc = v("6.0-rc-1");
        let release = v("6.0");
        assert_ne!(rc, release);
        assert_eq!(rc.base(), release.base());
        assert!(rc < release);
    }

    #[test]
    fn orders_prereleases_below_release() {
        let mut versions = vec![
            v("8.0"),
            v("8.0-rc-2"),
            v("7.6.1"),
            v("8.0-milestone-1"),
            v("8.0-rc-10"),
            v("8.0-20221017230001+0000"),
        ];
        versions.sort();
        let rendered: Vec<&str> = versions.iter().map(GradleVersion::as_str).collect();
        assert_eq!(
            rendered,
            [
                "7.6.1",
                "8.0-20221017230001+0000",
                "8.0-milestone-1",
                "8.0-rc-2",
                "8.0-rc-10",
                "8.0",
            ]
        );
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&v("9.0-rc-1")).unwrap();
        assert_eq!(json, "\"9.0-rc-1\"");
        let back: GradleVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v("9.0-rc-1"));
        assert!(serde_json::from_str::<GradleVersion>("\"nope\"").is_err());

        let base: BaseVersion = serde_json::from_str("\"5.0\"").unwrap();
        assert_eq!(base, BaseVersion::new(5, 0, 0));
        assert_eq!(serde_json::to_string(&BaseVersion::new(8, 2, 1)).unwrap(), "\"8.2.1\"");
        assert!(serde_json::from_str::<BaseVersion>("\"5.0-rc-1\"").is_err());
    }
}
