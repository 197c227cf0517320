//! Package versions and version ranges.
//!
//! Versions accept one to four numeric components (`1`, `1.0`, `1.0.0`,
//! `1.0.0.4`) with an optional `-prerelease` suffix; missing components are
//! zero. Ranges use interval notation: `[1.0,2.0)`, `(,3.0]`, `[1.5]`, and a
//! bare version meaning "at least".

use semver::{Prerelease, Version};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("empty version string")]
    Empty,
    #[error("invalid version component `{component}` in `{input}`")]
    InvalidComponent { input: String, component: String },
    #[error("version `{0}` has more than four components")]
    TooManyComponents(String),
    #[error("invalid prerelease in `{input}`: {message}")]
    InvalidPrerelease { input: String, message: String },
    #[error("invalid version range `{0}`")]
    InvalidRange(String),
}

#[derive(Clone, Debug)]
pub struct PackageVersion {
    version: Version,
    revision: u64,
    original: String,
}

impl PackageVersion {
    pub fn new(major: u64, minor: u64, patch: u64, revision: u64) -> Self {
        let version = Version::new(major, minor, patch);
        let original = if revision == 0 {
            version.to_string()
        } else {
            format!("{version}.{revision}")
        };
        Self {
            version,
            revision,
            original,
        }
    }

    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(VersionError::Empty);
        }
        let (core, pre) = match trimmed.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (trimmed, None),
        };
        let mut numbers = [0u64; 4];
        let mut count = 0;
        for component in core.split('.') {
            if count == numbers.len() {
                return Err(VersionError::TooManyComponents(trimmed.to_string()));
            }
            numbers[count] = component
                .parse()
                .map_err(|_| VersionError::InvalidComponent {
                    input: trimmed.to_string(),
                    component: component.to_string(),
                })?;
            count += 1;
        }
        let mut version = Version::new(numbers[0], numbers[1], numbers[2]);
        if let Some(pre) = pre {
            version.pre = Prerelease::new(pre).map_err(|err| VersionError::InvalidPrerelease {
                input: trimmed.to_string(),
                message: err.to_string(),
            })?;
        }
        Ok(Self {
            version,
            revision: numbers[3],
            original: trimmed.to_string(),
        })
    }

    pub fn major(&self) -> u64 {
        self.version.major
    }

    pub fn minor(&self) -> u64 {
        self.version.minor
    }

    pub fn patch(&self) -> u64 {
        self.version.patch
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_prerelease(&self) -> bool {
        !self.version.pre.is_empty()
    }

    /// The text this version was parsed from.
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Canonical form with three or four components, e.g. `1.0.0` or `1.2.3.4-beta`.
    pub fn normalized(&self) -> String {
        let mut out = format!(
            "{}.{}.{}",
            self.version.major, self.version.minor, self.version.patch
        );
        if self.revision != 0 {
            out.push_str(&format!(".{}", self.revision));
        }
        if !self.version.pre.is_empty() {
            out.push('-');
            out.push_str(self.version.pre.as_str());
        }
        out
    }

    fn key(&self) -> (u64, u64, u64, u64) {
        (
            self.version.major,
            self.version.minor,
            self.version.patch,
            self.revision,
        )
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key() && self.version.pre == other.version.pre
    }
}

impl Eq for PackageVersion {}

impl Hash for PackageVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
        self.version.pre.hash(state);
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key()
            .cmp(&other.key())
            .then_with(|| self.version.pre.cmp(&other.version.pre))
    }
}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl FromStr for PackageVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PackageVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.original)
    }
}

impl<'de> Deserialize<'de> for PackageVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[derive(Clone, Debug)]
pub struct VersionRange {
    min: Option<PackageVersion>,
    min_inclusive: bool,
    max: Option<PackageVersion>,
    max_inclusive: bool,
    original: String,
}

impl VersionRange {
    /// Matches every version.
    pub fn any() -> Self {
        Self {
            min: None,
            min_inclusive: false,
            max: None,
            max_inclusive: false,
            original: String::new(),
        }
    }

    pub fn at_least(version: PackageVersion) -> Self {
        Self {
            original: version.original().to_string(),
            min: Some(version),
            min_inclusive: true,
            max: None,
            max_inclusive: false,
        }
    }

    pub fn exact(version: PackageVersion) -> Self {
        Self {
            original: format!("[{version}]"),
            min: Some(version.clone()),
            min_inclusive: true,
            max: Some(version),
            max_inclusive: true,
        }
    }

    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self {
                original: trimmed.to_string(),
                ..Self::any()
            });
        }

        let open = trimmed.chars().next();
        if !matches!(open, Some('[') | Some('(')) {
            let mut range = Self::at_least(PackageVersion::parse(trimmed)?);
            range.original = trimmed.to_string();
            return Ok(range);
        }

        let invalid = || VersionError::InvalidRange(trimmed.to_string());
        let close = trimmed.chars().last().ok_or_else(invalid)?;
        if trimmed.len() < 2 || !matches!(close, ']' | ')') {
            return Err(invalid());
        }
        let min_inclusive = open == Some('[');
        let max_inclusive = close == ']';
        let inner = &trimmed[1..trimmed.len() - 1];

        let bound = |text: &str| -> Result<Option<PackageVersion>, VersionError> {
            let text = text.trim();
            if text.is_empty() {
                Ok(None)
            } else {
                PackageVersion::parse(text).map(Some)
            }
        };

        let (min, max) = match inner.split_once(',') {
            Some((low, high)) => (bound(low)?, bound(high)?),
            None => {
                // `[1.0]` pins an exact version; any other single-bound form is meaningless.
                if !(min_inclusive && max_inclusive) {
                    return Err(invalid());
                }
                let version = bound(inner)?.ok_or_else(invalid)?;
                (Some(version.clone()), Some(version))
            }
        };
        if min.is_none() && max.is_none() {
            return Err(invalid());
        }
        if let (Some(low), Some(high)) = (&min, &max) {
            if low > high || (low == high && !(min_inclusive && max_inclusive)) {
                return Err(invalid());
            }
        }

        Ok(Self {
            min,
            min_inclusive,
            max,
            max_inclusive,
            original: trimmed.to_string(),
        })
    }

    pub fn min_version(&self) -> Option<&PackageVersion> {
        self.min.as_ref()
    }

    pub fn max_version(&self) -> Option<&PackageVersion> {
        self.max.as_ref()
    }

    pub fn is_min_inclusive(&self) -> bool {
        self.min_inclusive
    }

    pub fn is_max_inclusive(&self) -> bool {
        self.max_inclusive
    }

    pub fn satisfies(&self, version: &PackageVersion) -> bool {
        let above = match &self.min {
            Some(min) if self.min_inclusive => version >= min,
            Some(min) => version > min,
            None => true,
        };
        let below = match &self.max {
            Some(max) if self.max_inclusive => version <= max,
            Some(max) => version < max,
            None => true,
        };
        above && below
    }
}

impl PartialEq for VersionRange {
    fn eq(&self, other: &Self) -> bool {
        self.min == other.min
            && self.max == other.max
            && (self.min.is_none() || self.min_inclusive == other.min_inclusive)
            && (self.max.is_none() || self.max_inclusive == other.max_inclusive)
    }
}

impl Eq for VersionRange {}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.original.is_empty() {
            return f.write_str(&self.original);
        }
        match (&self.min, &self.max) {
            (None, None) => f.write_str("*"),
            (Some(min), None) if self.min_inclusive => write!(f, "{min}"),
            (min, max) => {
                f.write_str(if self.min_inclusive { "[" } else { "(" })?;
                if let Some(min) = min {
                    write!(f, "{min}")?;
                }
                f.write_str(",")?;
                if let Some(max) = max {
                    write!(f, "{max}")?;
                }
                f.write_str(if self.max_inclusive { "]" } else { ")" })
            }
        }
    }
}

impl FromStr for VersionRange {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for VersionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
