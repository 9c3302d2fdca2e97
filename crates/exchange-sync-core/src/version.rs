//! Dotted-numeric version parsing and range resolution (spec.md §3, §4.B).

use crate::error::{ExchangeError, Result};
use std::cmp::Ordering;
use std::fmt;

/// A dotted numeric version, e.g. `1.2.0`. Segments are compared left to
/// right; a shorter version is padded with trailing zeros for comparison.
#[derive(Debug, Clone, Eq)]
pub struct Version {
    segments: Vec<u64>,
    raw: String,
}

impl Version {
    /// Parses `s` as a version. Every dot-separated segment must be a
    /// non-negative integer and there must be at least one segment.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(ExchangeError::invalid_version(s));
        }
        let mut segments = Vec::new();
        for part in s.split('.') {
            let n: u64 = part
                .parse()
                .map_err(|_| ExchangeError::invalid_version(s))?;
            segments.push(n);
        }
        Ok(Version {
            segments,
            raw: s.to_string(),
        })
    }

    /// The zero version `0.0.0`, used as the implicit lower bound of an
    /// empty range.
    pub fn zero() -> Self {
        Version {
            segments: vec![0, 0, 0],
            raw: "0.0.0".to_string(),
        }
    }

    fn segment(&self, i: usize) -> u64 {
        self.segments.get(i).copied().unwrap_or(0)
    }

    /// Three-way comparison via segment-wise numeric ordering (spec.md
    /// §4.B `cmp`). Returns -1, 0, or 1.
    pub fn cmp_spec(&self, other: &Self) -> i32 {
        match self.cmp(other) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let ord = self.segment(i).cmp(&other.segment(i));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// Whether the upper/lower bound of a range is inclusive or exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Inclusive,
    Exclusive,
}

/// An unbounded-above-or-below version range, canonicalized to `[lo, hi)`
/// semantics but remembering the original bound kinds so `inRange` applies
/// the right comparison at each end.
#[derive(Debug, Clone)]
pub struct Range {
    lo: Version,
    lo_bound: Bound,
    hi: Option<Version>,
    hi_bound: Bound,
}

impl Range {
    /// Returns true if `s` parses as a bare version (not a bracketed range).
    pub fn is_version(s: &str) -> bool {
        let s = s.trim();
        !s.is_empty() && !s.starts_with(['[', '(']) && Version::parse(s).is_ok()
    }

    /// Returns true if `s` parses as a bracketed range.
    pub fn is_range(s: &str) -> bool {
        let s = s.trim();
        s.starts_with(['[', '(']) || s.is_empty()
    }

    /// Parses `s` into a canonical range.
    ///
    /// - Empty string means "matches every version": `[0.0.0, ∞)`.
    /// - A bare version `v` means `[v, ∞)`.
    /// - A bracketed form `[lo,hi)`, `(lo,hi]`, `[lo,hi]`, `(lo,hi)` is a
    ///   full interval; either side of the comma may be blank, meaning
    ///   unbounded on that side.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Range {
                lo: Version::zero(),
                lo_bound: Bound::Inclusive,
                hi: None,
                hi_bound: Bound::Exclusive,
            });
        }
        if Self::is_version(s) {
            return Ok(Range {
                lo: Version::parse(s)?,
                lo_bound: Bound::Inclusive,
                hi: None,
                hi_bound: Bound::Exclusive,
            });
        }

        let mut chars = s.chars();
        let open = chars.next().ok_or_else(|| ExchangeError::invalid_range(s))?;
        let lo_bound = match open {
            '[' => Bound::Inclusive,
            '(' => Bound::Exclusive,
            _ => return Err(ExchangeError::invalid_range(s)),
        };
        if !s.ends_with([')', ']']) {
            return Err(ExchangeError::invalid_range(s));
        }
        let close = s.chars().last().unwrap();
        let hi_bound = match close {
            ']' => Bound::Inclusive,
            ')' => Bound::Exclusive,
            _ => return Err(ExchangeError::invalid_range(s)),
        };

        let inner = &s[1..s.len() - 1];
        let (lo_raw, hi_raw) = inner
            .split_once(',')
            .ok_or_else(|| ExchangeError::invalid_range(s))?;
        let lo_raw = lo_raw.trim();
        let hi_raw = hi_raw.trim();

        let lo = if lo_raw.is_empty() {
            Version::zero()
        } else {
            Version::parse(lo_raw).map_err(|_| ExchangeError::invalid_range(s))?
        };
        let hi = if hi_raw.is_empty() {
            None
        } else {
            Some(Version::parse(hi_raw).map_err(|_| ExchangeError::invalid_range(s))?)
        };

        Ok(Range {
            lo,
            lo_bound,
            hi,
            hi_bound,
        })
    }

    /// Whether `v` falls inside this range.
    pub fn contains(&self, v: &Version) -> bool {
        let lo_ok = match self.lo_bound {
            Bound::Inclusive => *v >= self.lo,
            Bound::Exclusive => *v > self.lo,
        };
        if !lo_ok {
            return false;
        }
        match (&self.hi, self.hi_bound) {
            (None, _) => true,
            (Some(hi), Bound::Inclusive) => *v <= *hi,
            (Some(hi), Bound::Exclusive) => *v < *hi,
        }
    }
}

/// Returns the highest version in `vs` that falls within `r`, or `None` if
/// no candidate matches.
pub fn highest_in_range<'a>(vs: &'a [Version], r: &Range) -> Option<&'a Version> {
    vs.iter().filter(|v| r.contains(v)).max()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_version_is_unbounded_above() {
        let r = Range::parse("1.2.0").unwrap();
        assert!(r.contains(&Version::parse("1.2.0").unwrap()));
        assert!(r.contains(&Version::parse("999.0.0").unwrap()));
        assert!(!r.contains(&Version::parse("1.1.9").unwrap()));
    }

    #[test]
    fn empty_range_matches_everything() {
        let r = Range::parse("").unwrap();
        assert!(r.contains(&Version::parse("0.0.0").unwrap()));
        assert!(r.contains(&Version::parse("50.1.2").unwrap()));
    }

    #[test]
    fn half_open_interval() {
        let r = Range::parse("[1.0.0,2.0.0)").unwrap();
        assert!(r.contains(&Version::parse("1.0.0").unwrap()));
        assert!(r.contains(&Version::parse("1.9.9").unwrap()));
        assert!(!r.contains(&Version::parse("2.0.0").unwrap()));
    }

    #[test]
    fn closed_interval_includes_hi() {
        let r = Range::parse("[1.0.0,2.0.0]").unwrap();
        assert!(r.contains(&Version::parse("2.0.0").unwrap()));
    }

    #[test]
    fn exclusive_lo_excludes_boundary() {
        let r = Range::parse("(1.0.0,2.0.0)").unwrap();
        assert!(!r.contains(&Version::parse("1.0.0").unwrap()));
    }

    #[test]
    fn missing_trailing_segments_are_zero() {
        let a = Version::parse("1.2").unwrap();
        let b = Version::parse("1.2.0").unwrap();
        assert_eq!(a.cmp_spec(&b), 0);
    }

    #[test]
    fn highest_in_range_picks_max_within_bounds() {
        let vs = vec![
            Version::parse("1.0.0").unwrap(),
            Version::parse("1.2.0").unwrap(),
            Version::parse("2.0.0").unwrap(),
        ];
        let r = Range::parse("[1.0.0,2.0.0)").unwrap();
        let got = highest_in_range(&vs, &r).unwrap();
        assert_eq!(got.as_str(), "1.2.0");
    }

    #[test]
    fn highest_in_range_none_when_no_match() {
        let vs = vec![Version::parse("3.0.0").unwrap()];
        let r = Range::parse("[1.0.0,2.0.0)").unwrap();
        assert!(highest_in_range(&vs, &r).is_none());
    }

    #[test]
    fn invalid_version_is_application_error() {
        assert!(Version::parse("not-a-version").is_err());
    }

    use proptest::prelude::*;

    fn arb_segments() -> impl Strategy<Value = Vec<u64>> {
        prop::collection::vec(0u64..1000, 1..5)
    }

    fn version_from_segments(segments: &[u64]) -> Version {
        let raw = segments.iter().map(u64::to_string).collect::<Vec<_>>().join(".");
        Version::parse(&raw).unwrap()
    }

    proptest! {
        #[test]
        fn ordering_is_total_and_consistent_with_cmp_spec(a in arb_segments(), b in arb_segments()) {
            let va = version_from_segments(&a);
            let vb = version_from_segments(&b);
            let std_ord = va.cmp(&vb);
            let spec_ord = va.cmp_spec(&vb);
            match std_ord {
                std::cmp::Ordering::Less => prop_assert_eq!(spec_ord, -1),
                std::cmp::Ordering::Equal => prop_assert_eq!(spec_ord, 0),
                std::cmp::Ordering::Greater => prop_assert_eq!(spec_ord, 1),
            }
            prop_assert_eq!(vb.cmp(&va), std_ord.reverse());
        }

        #[test]
        fn a_version_is_always_in_its_own_bare_range(segments in arb_segments()) {
            let v = version_from_segments(&segments);
            let r = Range::parse(v.as_str()).unwrap();
            prop_assert!(r.contains(&v));
        }
    }
}
