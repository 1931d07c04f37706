// Ordered sets of disjoint closed integer ranges, the search state of the
// Bleichenbacher attack.

use num_bigint::BigUint;

use std::fmt;

/// A closed range `[lo, hi]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    pub lo: BigUint,
    pub hi: BigUint,
}

impl Interval {
    pub fn new(lo: BigUint, hi: BigUint) -> Self {
        Self { lo, hi }
    }

    pub fn contains(&self, x: &BigUint) -> bool {
        &self.lo <= x && x <= &self.hi
    }

    /// Number of integers in the range.
    pub fn width(&self) -> BigUint {
        &self.hi - &self.lo + 1u32
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:x}, {:x}]", self.lo, self.hi)
    }
}

/// Disjoint, non-adjacent intervals sorted by lower bound.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    pub fn single(interval: Interval) -> Self {
        Self {
            intervals: vec![interval],
        }
    }

    /// Build a set from arbitrary ranges, dropping empty ones and merging any
    /// that overlap or touch.
    pub fn from_ranges(ranges: impl IntoIterator<Item = Interval>) -> Self {
        let mut ranges: Vec<Interval> = ranges.into_iter().filter(|r| r.lo <= r.hi).collect();
        ranges.sort_by(|a, b| a.lo.cmp(&b.lo));

        let mut intervals: Vec<Interval> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match intervals.last_mut() {
                Some(last) if range.lo <= &last.hi + 1u32 => {
                    if range.hi > last.hi {
                        last.hi = range.hi;
                    }
                }
                _ => intervals.push(range),
            }
        }
        Self { intervals }
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.intervals.iter()
    }

    pub fn contains(&self, x: &BigUint) -> bool {
        self.intervals.iter().any(|interval| interval.contains(x))
    }

    /// The only interval, if there is exactly one.
    pub fn single_interval(&self) -> Option<&Interval> {
        match self.intervals.as_slice() {
            [interval] => Some(interval),
            _ => None,
        }
    }

    /// The value the set has collapsed to, if it is a single point.
    pub fn point(&self) -> Option<&BigUint> {
        self.single_interval()
            .filter(|interval| interval.lo == interval.hi)
            .map(|interval| &interval.lo)
    }

    /// Total number of integers covered.
    pub fn total_width(&self) -> BigUint {
        self.intervals.iter().map(Interval::width).sum()
    }
}

impl fmt::Display for IntervalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, interval) in self.intervals.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{interval}")?;
        }
        write!(f, "}}")
    }
}
