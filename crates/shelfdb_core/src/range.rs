//! Key ranges.

use crate::error::{CoreError, CoreResult};
use crate::key::Key;
use shelfdb_codec::Value;
use std::ops::Bound;

/// An interval over keys.
///
/// Either bound may be absent (unbounded) and each present bound may be
/// open (exclusive) or closed (inclusive). Ranges are validated on
/// construction: `lower <= upper`, and equal bounds must both be closed.
///
/// ```
/// use shelfdb_core::{Key, KeyRange};
///
/// let teens = KeyRange::bound(13, 19, false, false).unwrap();
/// assert!(teens.includes(&Key::from(13)));
/// assert!(!teens.includes(&Key::from(20)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    lower: Option<Key>,
    upper: Option<Key>,
    lower_open: bool,
    upper_open: bool,
}

impl KeyRange {
    /// Range between two keys.
    ///
    /// # Errors
    ///
    /// Returns a data error if `lower > upper`, or if they are equal and
    /// either bound is open.
    pub fn bound(
        lower: impl Into<Key>,
        upper: impl Into<Key>,
        lower_open: bool,
        upper_open: bool,
    ) -> CoreResult<Self> {
        let (lower, upper) = (lower.into(), upper.into());
        if lower > upper {
            return Err(CoreError::data(format!(
                "range lower bound {lower} is greater than upper bound {upper}"
            )));
        }
        if lower == upper && (lower_open || upper_open) {
            return Err(CoreError::data(format!(
                "range over the single key {lower} cannot be open"
            )));
        }
        Ok(Self {
            lower: Some(lower),
            upper: Some(upper),
            lower_open,
            upper_open,
        })
    }

    /// All keys at or above (or strictly above, if `open`) `lower`.
    pub fn lower_bound(lower: impl Into<Key>, open: bool) -> Self {
        Self {
            lower: Some(lower.into()),
            upper: None,
            lower_open: open,
            upper_open: false,
        }
    }

    /// All keys at or below (or strictly below, if `open`) `upper`.
    pub fn upper_bound(upper: impl Into<Key>, open: bool) -> Self {
        Self {
            lower: None,
            upper: Some(upper.into()),
            lower_open: false,
            upper_open: open,
        }
    }

    /// Exactly one key.
    pub fn only(key: impl Into<Key>) -> Self {
        let key = key.into();
        Self {
            lower: Some(key.clone()),
            upper: Some(key),
            lower_open: false,
            upper_open: false,
        }
    }

    /// Lower bound, if any.
    #[must_use]
    pub fn lower(&self) -> Option<&Key> {
        self.lower.as_ref()
    }

    /// Upper bound, if any.
    #[must_use]
    pub fn upper(&self) -> Option<&Key> {
        self.upper.as_ref()
    }

    /// Whether the lower bound is exclusive.
    #[must_use]
    pub fn lower_open(&self) -> bool {
        self.lower_open
    }

    /// Whether the upper bound is exclusive.
    #[must_use]
    pub fn upper_open(&self) -> bool {
        self.upper_open
    }

    /// Whether `key` falls inside the range.
    #[must_use]
    pub fn includes(&self, key: &Key) -> bool {
        let (lo, hi) = self.bounds();
        let above = match lo {
            Bound::Included(l) => key >= l,
            Bound::Excluded(l) => key > l,
            Bound::Unbounded => true,
        };
        let below = match hi {
            Bound::Included(h) => key <= h,
            Bound::Excluded(h) => key < h,
            Bound::Unbounded => true,
        };
        above && below
    }

    /// The range as a pair of standard bounds.
    #[must_use]
    pub fn bounds(&self) -> (Bound<&Key>, Bound<&Key>) {
        (
            to_bound(self.lower.as_ref(), self.lower_open),
            to_bound(self.upper.as_ref(), self.upper_open),
        )
    }

    /// Encodes the range as a record value (`[lower, upper, lower_open, upper_open]`).
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Array(vec![
            self.lower.as_ref().map_or(Value::Null, Key::to_value),
            self.upper.as_ref().map_or(Value::Null, Key::to_value),
            Value::Bool(self.lower_open),
            Value::Bool(self.upper_open),
        ])
    }
}

impl From<Key> for KeyRange {
    fn from(key: Key) -> Self {
        KeyRange::only(key)
    }
}

impl From<i64> for KeyRange {
    fn from(n: i64) -> Self {
        KeyRange::only(n)
    }
}

impl From<i32> for KeyRange {
    fn from(n: i32) -> Self {
        KeyRange::only(n)
    }
}

impl From<&str> for KeyRange {
    fn from(s: &str) -> Self {
        KeyRange::only(s)
    }
}

fn to_bound(key: Option<&Key>, open: bool) -> Bound<&Key> {
    match key {
        None => Bound::Unbounded,
        Some(k) if open => Bound::Excluded(k),
        Some(k) => Bound::Included(k),
    }
}

/// Bounds of an optional range; `None` covers every key.
pub(crate) fn bounds_of(range: Option<&KeyRange>) -> (Bound<&Key>, Bound<&Key>) {
    range.map_or((Bound::Unbounded, Bound::Unbounded), KeyRange::bounds)
}

/// The more restrictive of two lower bounds.
pub(crate) fn tighter_lower<'a>(a: Bound<&'a Key>, b: Bound<&'a Key>) -> Bound<&'a Key> {
    match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other,
        (Bound::Included(x), Bound::Included(y)) => Bound::Included(x.max(y)),
        (Bound::Excluded(x), Bound::Excluded(y)) => Bound::Excluded(x.max(y)),
        (Bound::Included(i), Bound::Excluded(e)) | (Bound::Excluded(e), Bound::Included(i)) => {
            if i > e {
                Bound::Included(i)
            } else {
                Bound::Excluded(e)
            }
        }
    }
}

/// The more restrictive of two upper bounds.
pub(crate) fn tighter_upper<'a>(a: Bound<&'a Key>, b: Bound<&'a Key>) -> Bound<&'a Key> {
    match (a, b) {
        (Bound::Unbounded, other) | (other, Bound::Unbounded) => other,
        (Bound::Included(x), Bound::Included(y)) => Bound::Included(x.min(y)),
        (Bound::Excluded(x), Bound::Excluded(y)) => Bound::Excluded(x.min(y)),
        (Bound::Included(i), Bound::Excluded(e)) | (Bound::Excluded(e), Bound::Included(i)) => {
            if i < e {
                Bound::Included(i)
            } else {
                Bound::Excluded(e)
            }
        }
    }
}

/// Whether no key can satisfy both bounds.
///
/// `BTreeMap::range` panics on inverted bounds, so every range scan that
/// combines bounds checks this first.
pub(crate) fn is_empty_interval(lo: Bound<&Key>, hi: Bound<&Key>) -> bool {
    match (lo, hi) {
        (Bound::Included(l), Bound::Included(h)) => l > h,
        (Bound::Included(l), Bound::Excluded(h))
        | (Bound::Excluded(l), Bound::Included(h))
        | (Bound::Excluded(l), Bound::Excluded(h)) => l >= h,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_validates_order() {
        assert!(KeyRange::bound(7, 3, false, false).is_err());
        assert!(KeyRange::bound(3, 3, false, false).is_ok());
        assert!(KeyRange::bound(3, 3, true, false).is_err());
        assert!(KeyRange::bound(3, 3, false, true).is_err());
        assert!(KeyRange::bound(3, 4, true, true).is_ok());
    }

    #[test]
    fn includes_respects_openness() {
        let closed = KeyRange::bound(3, 7, false, false).unwrap();
        let open = KeyRange::bound(3, 7, true, true).unwrap();

        for k in 3..=7 {
            assert!(closed.includes(&Key::from(k)));
        }
        assert!(!open.includes(&Key::from(3)));
        assert!(!open.includes(&Key::from(7)));
        assert!(open.includes(&Key::from(5)));
        assert!(!closed.includes(&Key::from("3")));
    }

    #[test]
    fn half_open_constructors() {
        let above = KeyRange::lower_bound(10, true);
        assert!(!above.includes(&Key::from(10)));
        assert!(above.includes(&Key::from("text sorts after numbers")));

        let below = KeyRange::upper_bound("m", false);
        assert!(below.includes(&Key::from(i64::MAX)));
        assert!(below.includes(&Key::from("m")));
        assert!(!below.includes(&Key::from("n")));
    }

    #[test]
    fn only_matches_single_key() {
        let only = KeyRange::only("x");
        assert!(only.includes(&Key::from("x")));
        assert!(!only.includes(&Key::from("y")));
        assert_eq!(KeyRange::from("x"), only);
    }

    #[test]
    fn tighter_bounds() {
        let (a, b) = (Key::from(1), Key::from(5));
        assert_eq!(
            tighter_lower(Bound::Included(&a), Bound::Excluded(&b)),
            Bound::Excluded(&b)
        );
        assert_eq!(
            tighter_lower(Bound::Excluded(&a), Bound::Included(&a)),
            Bound::Excluded(&a)
        );
        assert_eq!(
            tighter_upper(Bound::Included(&b), Bound::Excluded(&b)),
            Bound::Excluded(&b)
        );
        assert_eq!(
            tighter_upper(Bound::Unbounded, Bound::Included(&a)),
            Bound::Included(&a)
        );
    }

    #[test]
    fn empty_interval_detection() {
        let (a, b) = (Key::from(1), Key::from(2));
        assert!(is_empty_interval(Bound::Included(&b), Bound::Included(&a)));
        assert!(is_empty_interval(Bound::Excluded(&a), Bound::Excluded(&a)));
        assert!(!is_empty_interval(Bound::Included(&a), Bound::Included(&a)));
        assert!(!is_empty_interval(Bound::Unbounded, Bound::Excluded(&a)));
    }
}
