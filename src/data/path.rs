//! # PrgPath
//!
//! An ordered sequence of intervals over a PRG's linear coordinates. Kmer
//! graph nodes are identified by the path their k bases take through the
//! locus, so paths double as node keys and as the topological order.

use std::fmt;
use std::str::FromStr;

use crate::data::Interval;
use crate::error::PangeneError;

/// Ordered run of intervals with a cached total length.
///
/// Invariants: intervals appear in strictly increasing coordinate order and
/// never overlap; `length` is the sum of interval lengths. Paths compare
/// lexicographically over their interval sequence, which is the order used
/// to topologically sort kmer-graph nodes.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrgPath {
    intervals: Vec<Interval>,
    length: u32,
}

impl PrgPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_intervals(intervals: impl IntoIterator<Item = Interval>) -> Self {
        let mut path = Self::new();
        for interval in intervals {
            path.add_end_interval(interval);
        }
        path
    }

    /// A zero-length path anchored at `pos`; the kmer graph's source and
    /// sink are paths of this shape.
    pub fn terminus(pos: u32) -> Self {
        Self::from_intervals([Interval::new(pos, pos)])
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Total number of bases covered.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Coordinate where the path begins.
    pub fn start(&self) -> u32 {
        self.intervals.first().map_or(0, |i| i.start)
    }

    /// Coordinate one past where the path ends.
    pub fn end(&self) -> u32 {
        self.intervals.last().map_or(0, |i| i.end)
    }

    /// Prepend an interval; it must close before the current start.
    pub fn add_start_interval(&mut self, interval: Interval) {
        assert!(
            self.intervals.is_empty() || interval.end <= self.start(),
            "start interval {} overlaps path starting at {}",
            interval,
            self.start()
        );
        self.length += interval.length();
        self.intervals.insert(0, interval);
    }

    /// Append an interval; it must open at or after the current end.
    pub fn add_end_interval(&mut self, interval: Interval) {
        assert!(
            self.intervals.is_empty() || interval.start >= self.end(),
            "end interval {} overlaps path ending at {}",
            interval,
            self.end()
        );
        self.length += interval.length();
        self.intervals.push(interval);
    }

    /// Whether `pos` is covered by one of the path's intervals.
    pub fn contains_position(&self, pos: u32) -> bool {
        self.intervals.iter().any(|i| i.contains(pos))
    }

    /// Position-set containment: every base of `self` is covered by `other`
    /// or `other2`. Used to detect shortcut edges in the kmer graph.
    pub fn is_covered_by(&self, other: &PrgPath, other2: &PrgPath) -> bool {
        self.intervals.iter().all(|i| {
            (i.start..i.end)
                .all(|pos| other.contains_position(pos) || other2.contains_position(pos))
        })
    }
}

impl fmt::Display for PrgPath {
    /// `S,E;S,E;...`, the encoding used in index records and GFA segments.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (n, i) in self.intervals.iter().enumerate() {
            if n > 0 {
                write!(f, ";")?;
            }
            write!(f, "{},{}", i.start, i.end)?;
        }
        Ok(())
    }
}

impl FromStr for PrgPath {
    type Err = PangeneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut path = Self::new();
        for part in s.split(';') {
            if part.is_empty() {
                continue;
            }
            path.add_end_interval(part.parse()?);
        }
        Ok(path)
    }
}
