//! Dotted numeric version numbers.
//!
//! Versions are stored verbatim as strings; comparison splits on `.`, parses
//! each component as an integer, zero-pads the shorter side on the right and
//! compares component-wise. Pre-release suffixes are not interpreted: a
//! non-numeric component is rejected when the number is first ingested.

use std::{cmp::Ordering, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A parsed version number such as `2.10.3`.
#[derive(Debug, Clone)]
pub struct VersionNumber(Vec<u64>);

impl VersionNumber {
  /// Parse a dotted numeric version. Empty strings, empty components and
  /// components that are not plain ASCII digits (signs, whitespace,
  /// suffixes) are [`Error::InvalidRequest`].
  pub fn parse(raw: &str) -> Result<Self> {
    if raw.is_empty() {
      return Err(Error::InvalidRequest("version number is empty".into()));
    }
    raw
      .split('.')
      .map(|part| {
        let digits = !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        digits.then(|| part.parse::<u64>().ok()).flatten().ok_or_else(|| {
          Error::InvalidRequest(format!(
            "version number {raw:?} has non-numeric component {part:?}"
          ))
        })
      })
      .collect::<Result<Vec<_>>>()
      .map(Self)
  }

  /// Lenient parse used when comparing already-stored numbers: components
  /// that fail to parse count as zero.
  pub fn parse_lossy(raw: &str) -> Self {
    Self(
      raw
        .trim()
        .split('.')
        .map(|part| part.parse::<u64>().unwrap_or(0))
        .collect(),
    )
  }

  pub fn components(&self) -> &[u64] { &self.0 }

  fn padded(&self, idx: usize) -> u64 { self.0.get(idx).copied().unwrap_or(0) }

  /// Index of the first component that differs after zero-padding.
  fn first_difference(&self, other: &Self) -> Option<usize> {
    let len = self.0.len().max(other.0.len());
    (0..len).find(|&i| self.padded(i) != other.padded(i))
  }
}

impl Ord for VersionNumber {
  fn cmp(&self, other: &Self) -> Ordering {
    let len = self.0.len().max(other.0.len());
    (0..len)
      .map(|i| self.padded(i).cmp(&other.padded(i)))
      .find(|o| o.is_ne())
      .unwrap_or(Ordering::Equal)
  }
}

impl PartialOrd for VersionNumber {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

// `1.0` and `1.0.0` are equal under zero-padding, so equality must follow
// `Ord` rather than the raw component vectors.
impl PartialEq for VersionNumber {
  fn eq(&self, other: &Self) -> bool { self.cmp(other).is_eq() }
}

impl Eq for VersionNumber {}

impl FromStr for VersionNumber {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::parse(s) }
}

impl fmt::Display for VersionNumber {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut first = true;
    for c in &self.0 {
      if !first {
        f.write_str(".")?;
      }
      write!(f, "{c}")?;
      first = false;
    }
    Ok(())
  }
}

/// Compare two stored version strings.
pub fn compare(a: &str, b: &str) -> Ordering {
  VersionNumber::parse_lossy(a).cmp(&VersionNumber::parse_lossy(b))
}

/// `true` iff `candidate` is strictly newer than `installed`.
pub fn is_newer(candidate: &str, installed: &str) -> bool {
  compare(candidate, installed).is_gt()
}

/// Semantic distance between two version numbers.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum GapType {
  None,
  Patch,
  Minor,
  Major,
}

impl GapType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::None => "none",
      Self::Patch => "patch",
      Self::Minor => "minor",
      Self::Major => "major",
    }
  }
}

/// Classify the gap from `from` to `to` by the first differing component.
///
/// Position 0 is a major gap, position 1 minor, and any later position
/// (including the fourth component and beyond) a patch gap.
pub fn gap_type(from: &str, to: &str) -> GapType {
  let from = VersionNumber::parse_lossy(from);
  let to = VersionNumber::parse_lossy(to);
  match from.first_difference(&to) {
    None => GapType::None,
    Some(0) => GapType::Major,
    Some(1) => GapType::Minor,
    Some(_) => GapType::Patch,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn zero_padding_makes_short_forms_equal() {
    assert_eq!(compare("1.0", "1.0.0"), Ordering::Equal);
    assert_eq!(
      VersionNumber::parse("2").unwrap(),
      VersionNumber::parse("2.0.0.0").unwrap()
    );
  }

  #[test]
  fn components_compare_numerically_not_lexically() {
    assert!(is_newer("1.10.0", "1.9.0"));
    assert!(is_newer("10.0", "9.99.99"));
    assert!(!is_newer("1.2.3", "1.2.3"));
    assert!(!is_newer("1.2", "1.2.1"));
  }

  #[test]
  fn non_numeric_components_are_rejected_on_ingestion() {
    assert!(matches!(
      VersionNumber::parse("1.0.0-beta"),
      Err(Error::InvalidRequest(_))
    ));
    for raw in ["+1.0", "1.-2", " 1.0", "1.0 ", "1..2"] {
      assert!(
        matches!(VersionNumber::parse(raw), Err(Error::InvalidRequest(_))),
        "{raw:?}"
      );
    }
    assert!(matches!(VersionNumber::parse("  "), Err(Error::InvalidRequest(_))));
  }

  #[test]
  fn display_round_trips_canonical_form() {
    assert_eq!(VersionNumber::parse("3.04.1").unwrap().to_string(), "3.4.1");
  }

  #[test]
  fn gap_classification() {
    assert_eq!(gap_type("1.0.0", "2.0.0"), GapType::Major);
    assert_eq!(gap_type("1.0.0", "1.1.0"), GapType::Minor);
    assert_eq!(gap_type("1.0.0", "1.0.1"), GapType::Patch);
    assert_eq!(gap_type("1.0.0.0", "1.0.0.7"), GapType::Patch);
    assert_eq!(gap_type("1.0", "1.0.0"), GapType::None);
  }
}
