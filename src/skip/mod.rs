//! Skip-support value generation
//!
//! Lets a scan jump from "no more matches for key K" directly to the first
//! possible position for the next distinct key, for discrete totally-ordered
//! key domains. The operator class supplies the support record once, at scan
//! open; it is immutable afterwards.
//!
//! # Invariants
//!
//! - `increment(high_elem)` and `decrement(low_elem)` always overflow
//! - Away from the boundary elements, increment and decrement are exact
//!   inverses
//! - Overflow never escapes this module as an error: the scan falls back to
//!   direct positioning using only lower-order keys

/// Internal overflow signal. Consumed entirely by the scan machinery; never
/// surfaced to the scan caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipOverflow;

/// Operator-class-supplied next/previous-value generation for i64 keys.
///
/// `low_elem` and `high_elem` bound the domain; values outside the bounds
/// cannot be produced and cannot be stepped past.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipSupport {
    /// Lowest element of the key domain
    pub low_elem: i64,
    /// Highest element of the key domain
    pub high_elem: i64,
}

impl SkipSupport {
    /// Support record for the full i64 domain.
    pub fn for_int() -> Self {
        Self {
            low_elem: i64::MIN,
            high_elem: i64::MAX,
        }
    }

    /// Support record for a restricted domain, e.g. a bounded range qual.
    pub fn bounded(low_elem: i64, high_elem: i64) -> Self {
        debug_assert!(low_elem <= high_elem);
        Self { low_elem, high_elem }
    }

    /// Next distinct value above `v`, or overflow at `high_elem`.
    pub fn increment(&self, v: i64) -> Result<i64, SkipOverflow> {
        if v >= self.high_elem {
            return Err(SkipOverflow);
        }
        Ok(v + 1)
    }

    /// Next distinct value below `v`, or overflow at `low_elem`.
    pub fn decrement(&self, v: i64) -> Result<i64, SkipOverflow> {
        if v <= self.low_elem {
            return Err(SkipOverflow);
        }
        Ok(v - 1)
    }
}

/// Direction-resolved skip support, prepared once at scan open.
///
/// For descending scans the low/high bounds and the increment/decrement roles
/// are swapped in this prepared copy; the caller-visible support record is
/// never mutated.
#[derive(Debug, Clone, Copy)]
pub struct PreparedSkip {
    support: SkipSupport,
    backward: bool,
}

impl PreparedSkip {
    /// Prepares a support record for the given scan direction.
    pub fn prepare(support: SkipSupport, backward: bool) -> Self {
        Self { support, backward }
    }

    /// First element in scan order.
    pub fn start_elem(&self) -> i64 {
        if self.backward {
            self.support.high_elem
        } else {
            self.support.low_elem
        }
    }

    /// Steps to the next distinct value in scan order.
    pub fn next_distinct(&self, v: i64) -> Result<i64, SkipOverflow> {
        if self.backward {
            self.support.decrement(v)
        } else {
            self.support.increment(v)
        }
    }

    /// Steps to the previous distinct value in scan order.
    pub fn prev_distinct(&self, v: i64) -> Result<i64, SkipOverflow> {
        if self.backward {
            self.support.increment(v)
        } else {
            self.support.decrement(v)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_decrement_are_inverse() {
        let sup = SkipSupport::bounded(-10, 10);
        for v in -9..=9 {
            assert_eq!(sup.decrement(sup.increment(v).unwrap()).unwrap(), v);
            assert_eq!(sup.increment(sup.decrement(v).unwrap()).unwrap(), v);
        }
    }

    #[test]
    fn test_overflow_exactly_at_bounds() {
        let sup = SkipSupport::bounded(3, 7);
        assert_eq!(sup.increment(7), Err(SkipOverflow));
        assert_eq!(sup.decrement(3), Err(SkipOverflow));
        assert_eq!(sup.increment(6), Ok(7));
        assert_eq!(sup.decrement(4), Ok(3));
    }

    #[test]
    fn test_full_domain_overflow() {
        let sup = SkipSupport::for_int();
        assert_eq!(sup.increment(i64::MAX), Err(SkipOverflow));
        assert_eq!(sup.decrement(i64::MIN), Err(SkipOverflow));
    }

    #[test]
    fn test_prepared_swaps_roles_for_backward_scans() {
        let sup = SkipSupport::bounded(0, 5);
        let fwd = PreparedSkip::prepare(sup, false);
        let bwd = PreparedSkip::prepare(sup, true);

        assert_eq!(fwd.start_elem(), 0);
        assert_eq!(bwd.start_elem(), 5);
        assert_eq!(fwd.next_distinct(2), Ok(3));
        assert_eq!(bwd.next_distinct(2), Ok(1));
        assert_eq!(bwd.next_distinct(0), Err(SkipOverflow));
        // The caller-visible record is untouched by preparation
        assert_eq!(sup.low_elem, 0);
        assert_eq!(sup.high_elem, 5);
    }

    #[test]
    fn test_prev_distinct_mirrors_next() {
        let bwd = PreparedSkip::prepare(SkipSupport::bounded(0, 5), true);
        assert_eq!(bwd.prev_distinct(2), Ok(3));
        assert_eq!(bwd.prev_distinct(5), Err(SkipOverflow));
    }
}
