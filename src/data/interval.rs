//! # Interval
//!
//! Half-open interval `[start, end)` over a PRG's linear coordinates.
//! Zero-length intervals are legal and represent the empty sequence, which
//! variant sites that delete into nothing rely on.

use std::fmt;
use std::str::FromStr;

use crate::error::PangeneError;

/// Half-open interval over 32-bit PRG coordinates.
///
/// Totally ordered lexicographically by `(start, end)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interval {
    pub start: u32,
    pub end: u32,
}

impl Interval {
    /// Create a new interval. `end < start` is a contract violation.
    pub fn new(start: u32, end: u32) -> Self {
        assert!(end >= start, "not a real interval: [{}, {})", start, end);
        Self { start, end }
    }

    /// Number of positions covered; zero for the empty interval.
    pub fn length(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `pos` falls inside the half-open range.
    pub fn contains(&self, pos: u32) -> bool {
        self.start <= pos && pos < self.end
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

impl FromStr for Interval {
    type Err = PangeneError;

    /// Parses the `S,E` form used inside index and GFA path encodings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once(',')
            .ok_or_else(|| PangeneError::invalid_data(format!("bad interval: {s:?}")))?;
        let start = start
            .trim()
            .parse::<u32>()
            .map_err(|_| PangeneError::invalid_data(format!("bad interval start: {s:?}")))?;
        let end = end
            .trim()
            .parse::<u32>()
            .map_err(|_| PangeneError::invalid_data(format!("bad interval end: {s:?}")))?;
        if end < start {
            return Err(PangeneError::invalid_data(format!(
                "interval end before start: {s:?}"
            )));
        }
        Ok(Self { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_and_empty() {
        let i = Interval::new(3, 7);
        assert_eq!(i.length(), 4);
        assert!(!i.is_empty());

        let e = Interval::new(5, 5);
        assert_eq!(e.length(), 0);
        assert!(e.is_empty());
    }

    #[test]
    #[should_panic]
    fn test_reversed_interval_panics() {
        let _ = Interval::new(7, 3);
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        assert!(Interval::new(0, 5) < Interval::new(1, 2));
        assert!(Interval::new(1, 2) < Interval::new(1, 3));
        assert_eq!(Interval::new(4, 4), Interval::new(4, 4));
    }

    #[test]
    fn test_contains() {
        let i = Interval::new(2, 4);
        assert!(!i.contains(1));
        assert!(i.contains(2));
        assert!(i.contains(3));
        assert!(!i.contains(4));
    }

    #[test]
    fn test_parse_round_trip() {
        let i: Interval = "12,40".parse().unwrap();
        assert_eq!(i, Interval::new(12, 40));
        assert!("40,12".parse::<Interval>().is_err());
        assert!("x,12".parse::<Interval>().is_err());
    }
}
