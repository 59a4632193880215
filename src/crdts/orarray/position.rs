// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use smallvec::SmallVec;
use std::{error, fmt};

/// A position in an [`OrArray`](super::OrArray).
///
/// A position is a non-empty sequence of unsigned digits compared
/// lexicographically, with missing trailing digits reading as zero. The array
/// is the sequence of elements sorted by position in ascending order; between
/// any two distinct positions a new one strictly between them can always be
/// produced (see [`Position::between`]), so inserting never requires
/// renumbering existing elements.
///
/// A fixed-width key (say, an `f64` midpoint) runs out of representable
/// values after a few dozen insertions into the same gap; a digit sequence
/// instead grows another digit and refines the interval indefinitely.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Position(SmallVec<[u64; 4]>);

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

/// A position was built from no digits, or `between` was called on bounds
/// that admit nothing between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidPosition;

impl fmt::Display for InvalidPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid position or position bounds")
    }
}

impl error::Error for InvalidPosition {}

impl Position {
    /// How far past a lower bound a freshly branched digit lands. Leaves
    /// room for later insertions below the new position without immediately
    /// growing another digit.
    const GAP: u64 = 1 << 15;

    /// Creates a `Position` from a digit sequence.
    ///
    /// Trailing zero digits are insignificant under the zero-extended
    /// comparison order and are stripped, so equal positions have equal
    /// representations.
    pub fn from_digits(digits: impl IntoIterator<Item = u64>) -> Result<Self, InvalidPosition> {
        let mut digits: SmallVec<[u64; 4]> = digits.into_iter().collect();
        if digits.is_empty() {
            return Err(InvalidPosition);
        }
        while digits.len() > 1 && digits.last() == Some(&0) {
            digits.pop();
        }
        Ok(Self(digits))
    }

    /// The digit sequence of this position.
    pub fn digits(&self) -> &[u64] {
        &self.0
    }

    fn is_zero(&self) -> bool {
        self.0.as_slice() == [0]
    }

    /// Returns a new position strictly between the two bounds.
    ///
    /// `None` for `lo` means "before everything" and `None` for `hi` means
    /// "after everything", so `between(None, None)` produces a starting
    /// position for an empty array.
    ///
    /// Fails with [`InvalidPosition`] if `lo >= hi`, or if `hi` is the
    /// all-zero position (which nothing precedes).
    pub fn between(lo: Option<&Position>, hi: Option<&Position>) -> Result<Self, InvalidPosition> {
        let lo_digits: &[u64] = lo.map_or(&[], |p| p.0.as_slice());
        match hi {
            None => {
                let mut out = SmallVec::new();
                Self::nudge_above(lo_digits, 0, &mut out);
                Ok(Self(out))
            }
            Some(hi) => {
                if hi.is_zero() || lo.is_some_and(|lo| lo >= hi) {
                    return Err(InvalidPosition);
                }
                Ok(Self::strictly_between(lo_digits, &hi.0))
            }
        }
    }

    /// Extends `out` with digits from `lo[from..]` such that the result
    /// compares strictly greater than `lo` and shares `lo`'s prefix up to
    /// the first digit with headroom.
    fn nudge_above(lo: &[u64], mut from: usize, out: &mut SmallVec<[u64; 4]>) {
        loop {
            let d = lo.get(from).copied().unwrap_or(0);
            if d == u64::MAX {
                // no headroom at this digit; go one deeper
                out.push(d);
                from += 1;
            } else {
                out.push(d.saturating_add(Self::GAP));
                return;
            }
        }
    }

    /// Core of [`Position::between`] for `lo < q` under zero-extension.
    fn strictly_between(lo: &[u64], hi: &[u64]) -> Self {
        let mut out = SmallVec::new();
        let mut i = 0;
        loop {
            let a = lo.get(i).copied().unwrap_or(0);
            let b = hi.get(i).copied().unwrap_or(0);
            if a == b {
                out.push(a);
                i += 1;
                continue;
            }
            debug_assert!(a < b, "bounds are ordered, so they diverge upward");
            if b - a >= 2 {
                // room at this level: split the gap
                out.push(a + (b - a) / 2);
                return Self(out);
            }
            // gap of exactly one: nothing fits at this level, so descend
            // along the lower bound and branch off above its tail. the
            // result differs from `hi` at index i, so anything > lo works.
            out.push(a);
            Self::nudge_above(lo, i + 1, &mut out);
            return Self(out);
        }
    }
}

#[cfg(any(test, feature = "arbitrary"))]
mod arbitrary_impls {
    use super::*;
    use quickcheck::{Arbitrary, Gen};

    impl Arbitrary for Position {
        fn arbitrary(g: &mut Gen) -> Self {
            let len = usize::from(u8::arbitrary(g) % 3) + 1;
            let digits = (0..len).map(|_| u64::from(u8::arbitrary(g) % 8));
            Position::from_digits(digits).expect("non-empty by construction")
        }
    }
}
