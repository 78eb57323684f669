//! Sequence-number arithmetic modulo 2^32.

/// A TCP sequence number. Wrapped in a newtype so that adding or comparing sequence numbers can't
/// accidentally use plain `u32` arithmetic, which has different (non-wrapping, and meaningless
/// for a circular space) semantics.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Seq(u32);

static_assertions::assert_not_impl_any!(Seq: PartialOrd, Ord, From<u32>, std::ops::Deref);

impl Seq {
    #[inline]
    pub fn new(x: u32) -> Self {
        Self(x)
    }
}

impl std::fmt::Debug for Seq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for Seq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Seq> for u32 {
    fn from(x: Seq) -> Self {
        x.0
    }
}

impl std::ops::Add<u32> for Seq {
    type Output = Self;
    fn add(self, offset: u32) -> Self::Output {
        Self::new(self.0.wrapping_add(offset))
    }
}

impl std::ops::Sub<u32> for Seq {
    type Output = Self;
    fn sub(self, offset: u32) -> Self::Output {
        Self::new(self.0.wrapping_sub(offset))
    }
}

impl std::ops::Sub for Seq {
    type Output = u32;
    fn sub(self, other: Self) -> Self::Output {
        self.0.wrapping_sub(other.0)
    }
}

impl std::ops::AddAssign<u32> for Seq {
    fn add_assign(&mut self, offset: u32) {
        self.0 = self.0.wrapping_add(offset);
    }
}

impl std::ops::SubAssign<u32> for Seq {
    fn sub_assign(&mut self, offset: u32) {
        self.0 = self.0.wrapping_sub(offset);
    }
}

/// A half-open range of sequence numbers modulo 2^32, bounded inclusively by `start` and
/// exclusively by `end`. The starting position may be numerically greater than the ending
/// position, since the space wraps around.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct SeqRange {
    pub start: Seq,
    pub end: Seq,
}

impl std::fmt::Debug for SeqRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.start.fmt(f)?;
        write!(f, "..")?;
        self.end.fmt(f)
    }
}

impl SeqRange {
    #[inline]
    pub fn new(start: Seq, end: Seq) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `seq` lies within this half-open range.
    #[inline]
    pub fn contains(&self, seq: Seq) -> bool {
        SeqRange::new(self.start, seq).len() < self.len()
    }

    /// Returns the intersecting range, if there is exactly one. Two disjoint arcs of
    /// intersection (possible when both ranges wrap) are reported as `None` since there is no
    /// single contiguous range to return.
    pub fn intersection(&self, other: &Self) -> Option<SeqRange> {
        let a = self;
        let b = other;

        match (a.is_empty(), b.is_empty()) {
            (true, true) => return (a == b).then_some(*a),
            (true, false) => return b.contains(a.start).then_some(*a),
            (false, true) => return a.contains(b.start).then_some(*b),
            (false, false) => {}
        }

        let a_0_in_b = b.contains(a.start);
        let a_1_in_b = b.contains(a.end - 1);

        match (a_0_in_b, a_1_in_b) {
            (true, false) => Some(Self::new(a.start, b.end)),
            (false, true) => Some(Self::new(b.start, a.end)),
            (true, true) => {
                if a.start - b.start < a.end - b.start {
                    Some(*a)
                } else {
                    None
                }
            }
            (false, false) => {
                let b_0_in_a = a.contains(b.start);
                let b_1_in_a = a.contains(b.end - 1);
                if b_0_in_a && b_1_in_a {
                    Some(*b)
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u32, end: u32) -> SeqRange {
        SeqRange::new(Seq::new(start), Seq::new(end))
    }

    fn seq(val: u32) -> Seq {
        Seq::new(val)
    }

    #[test]
    fn contains_handles_wraparound() {
        fn test_range(range: SeqRange, val: Seq, contained: bool, offset_range: std::ops::Range<i32>) {
            for i in offset_range {
                let i = i as u32;
                let range = SeqRange::new(range.start + i, range.end + i);
                let val = val + i;
                assert_eq!(range.contains(val), contained);
            }
        }

        test_range(range(0, 0), seq(0), false, -10..10);
        test_range(range(0, 1), seq(0), true, -10..10);
        test_range(range(0, 1), seq(1), false, -10..10);
        test_range(range(0, 2), seq(1), true, -10..10);
        test_range(range(0, 2), seq(2), false, -10..10);
    }

    #[test]
    fn intersection_is_symmetric_and_handles_wraparound() {
        fn test_pair(a: SeqRange, b: SeqRange, expected: impl Into<Option<SeqRange>>, offset_range: std::ops::Range<i32>) {
            let expected = expected.into();
            for i in offset_range {
                let i = i as u32;
                let a = SeqRange::new(a.start + i, a.end + i);
                let b = SeqRange::new(b.start + i, b.end + i);
                let expected = expected.map(|x: SeqRange| SeqRange::new(x.start + i, x.end + i));
                assert_eq!(a.intersection(&b), expected);
                assert_eq!(b.intersection(&a), expected);
            }
        }

        test_pair(range(0, 0), range(0, 0), range(0, 0), -10..10);
        test_pair(range(0, 0), range(1, 1), None, -10..10);
        test_pair(range(0, 2), range(1, 2), range(1, 2), -10..10);
        test_pair(range(10, 20), range(12, 16), range(12, 16), -100..100);
        test_pair(range(10, 20), range(16, 12), None, -100..100);
    }
}
