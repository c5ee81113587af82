//! Validation of externally supplied numeric operands.
//!
//! Callers hand offsets, counts and sizes over as [`Operand`]s, which mirror
//! the loosely typed values a host runtime passes around: a number is always
//! a double-precision float, and an argument may be missing altogether. Every
//! operand is checked here before it is narrowed to a native integer type.

use crate::error::{Error, Result};

/// Largest integer a double-precision float represents exactly (2^53 - 1).
pub const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;
/// Smallest integer a double-precision float represents exactly.
pub const MIN_SAFE_INTEGER: i64 = -MAX_SAFE_INTEGER;

/// A loosely typed argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    /// The argument was not supplied.
    Undefined,
    /// The argument was explicitly empty.
    Null,
    Number(f64),
    /// Any non-numeric value (string, object, ...).
    Other,
}

impl Operand {
    pub fn is_nullish(&self) -> bool {
        matches!(self, Operand::Undefined | Operand::Null)
    }
}

/// `true` for an absent or empty optional argument.
pub fn is_nullish(value: impl Into<Operand>) -> bool {
    value.into().is_nullish()
}

macro_rules! operand_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Operand::Number(value as f64)
                }
            }
        )*
    };
}

operand_from_number!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl<T: Into<Operand>> From<Option<T>> for Operand {
    fn from(value: Option<T>) -> Self {
        value.map_or(Operand::Undefined, Into::into)
    }
}

/// Outcome of [`is_safe_integer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafeInteger {
    Ok,
    /// Not a number, or not exactly representable as an integer.
    WrongType,
    /// An integer, but outside the interval of the target width.
    OutOfRange,
}

/// Closed interval admissible for an integer of `byte_width` bytes.
///
/// Widths of eight bytes or more are bounded by the safe-integer range
/// instead of the native range.
pub fn integer_bounds(byte_width: usize, unsigned: bool) -> (i64, i64) {
    if byte_width >= 8 {
        let min = if unsigned { 0 } else { MIN_SAFE_INTEGER };
        return (min, MAX_SAFE_INTEGER);
    }
    let span = 1i64 << (8 * byte_width);
    if unsigned {
        (0, span - 1)
    } else {
        (-(span / 2), span / 2 - 1)
    }
}

/// Check that `value` is an integer that fits in `byte_width` bytes.
pub fn is_safe_integer(value: impl Into<Operand>, byte_width: usize, unsigned: bool) -> SafeInteger {
    let Operand::Number(number) = value.into() else {
        return SafeInteger::WrongType;
    };
    if !number.is_finite() || number.fract() != 0.0 || number.abs() > MAX_SAFE_INTEGER as f64 {
        return SafeInteger::WrongType;
    }

    let integer = number as i64;
    let (min, max) = integer_bounds(byte_width, unsigned);
    if integer < min || integer > max {
        SafeInteger::OutOfRange
    } else {
        SafeInteger::Ok
    }
}

/// Human-readable description of the interval accepted for an argument.
pub fn safe_integer_message(byte_width: usize, label: &str, unsigned: bool) -> String {
    if byte_width >= 8 {
        let signedness = if unsigned { "unsigned " } else { "" };
        return format!("Must provide a safe {signedness}integer as the {label}.");
    }
    let (min, max) = integer_bounds(byte_width, unsigned);
    format!("Must provide an integer in range [{min}:{max}] as the {label}.")
}

/// Validate `value` and return it as an exact integer.
pub fn check_integer(
    value: impl Into<Operand>,
    byte_width: usize,
    unsigned: bool,
    label: &str,
) -> Result<i64> {
    let value = value.into();
    match (is_safe_integer(value, byte_width, unsigned), value) {
        (SafeInteger::Ok, Operand::Number(number)) => Ok(number as i64),
        (SafeInteger::OutOfRange, _) => Err(Error::OutOfRange(safe_integer_message(
            byte_width, label, unsigned,
        ))),
        _ => Err(Error::TypeMismatch(safe_integer_message(
            byte_width, label, unsigned,
        ))),
    }
}

/// Like [`check_integer`], but an absent argument yields `None`.
pub fn check_optional_integer(
    value: impl Into<Operand>,
    byte_width: usize,
    unsigned: bool,
    label: &str,
) -> Result<Option<i64>> {
    let value = value.into();
    if value.is_nullish() {
        return Ok(None);
    }
    check_integer(value, byte_width, unsigned, label).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_four_byte_range() {
        assert_eq!(is_safe_integer(-2147483648i64, 4, false), SafeInteger::Ok);
        assert_eq!(is_safe_integer(2147483647i64, 4, false), SafeInteger::Ok);
        assert_eq!(is_safe_integer(0, 4, false), SafeInteger::Ok);
        assert_eq!(
            is_safe_integer(2147483648i64, 4, false),
            SafeInteger::OutOfRange
        );
        assert_eq!(
            is_safe_integer(-2147483649i64, 4, false),
            SafeInteger::OutOfRange
        );
        assert_eq!(is_safe_integer(3.5, 4, false), SafeInteger::WrongType);
    }

    #[test]
    fn unsigned_four_byte_range() {
        assert_eq!(is_safe_integer(0, 4, true), SafeInteger::Ok);
        assert_eq!(is_safe_integer(4294967295u32, 4, true), SafeInteger::Ok);
        assert_eq!(
            is_safe_integer(4294967296i64, 4, true),
            SafeInteger::OutOfRange
        );
        assert_eq!(is_safe_integer(-1, 4, true), SafeInteger::OutOfRange);
    }

    #[test]
    fn small_widths() {
        assert_eq!(integer_bounds(1, false), (-128, 127));
        assert_eq!(integer_bounds(1, true), (0, 255));
        assert_eq!(integer_bounds(2, false), (-32768, 32767));
        assert_eq!(integer_bounds(2, true), (0, 65535));
    }

    #[test]
    fn wide_types_use_the_safe_range() {
        assert_eq!(is_safe_integer(MAX_SAFE_INTEGER, 8, false), SafeInteger::Ok);
        assert_eq!(is_safe_integer(MIN_SAFE_INTEGER, 8, false), SafeInteger::Ok);
        assert_eq!(is_safe_integer(-1, 8, true), SafeInteger::OutOfRange);
        assert_eq!(is_safe_integer(-1, 16, true), SafeInteger::OutOfRange);
        // 2^53 + 2 is an exact double, but not a safe integer.
        assert_eq!(
            is_safe_integer(9_007_199_254_740_994.0, 8, false),
            SafeInteger::WrongType
        );
    }

    #[test]
    fn non_numbers_are_the_wrong_type() {
        for value in [
            Operand::Undefined,
            Operand::Null,
            Operand::Other,
            Operand::Number(f64::NAN),
            Operand::Number(f64::INFINITY),
            Operand::Number(-0.25),
        ] {
            assert_eq!(is_safe_integer(value, 4, false), SafeInteger::WrongType);
        }
    }

    #[test]
    fn messages() {
        assert_eq!(
            safe_integer_message(4, "first argument", false),
            "Must provide an integer in range [-2147483648:2147483647] as the first argument."
        );
        assert_eq!(
            safe_integer_message(4, "second argument", true),
            "Must provide an integer in range [0:4294967295] as the second argument."
        );
        assert_eq!(
            safe_integer_message(8, "third argument", true),
            "Must provide a safe unsigned integer as the third argument."
        );
        assert_eq!(
            safe_integer_message(8, "first argument", false),
            "Must provide a safe integer as the first argument."
        );
    }

    #[test]
    fn nullish() {
        assert!(is_nullish(Operand::Undefined));
        assert!(is_nullish(Operand::Null));
        assert!(is_nullish(None::<u32>));
        assert!(!is_nullish(0));
        assert!(!is_nullish(Operand::Other));
    }

    #[test]
    fn check_maps_to_error_kinds() {
        assert_eq!(check_integer(12, 4, true, "size").unwrap(), 12);
        assert!(matches!(
            check_integer(1.5, 4, true, "size"),
            Err(Error::TypeMismatch(_))
        ));
        assert!(matches!(
            check_integer(-3, 4, true, "size"),
            Err(Error::OutOfRange(_))
        ));
        assert_eq!(check_optional_integer(None::<i64>, 4, true, "size").unwrap(), None);
        assert_eq!(
            check_optional_integer(Some(7u8), 4, true, "size").unwrap(),
            Some(7)
        );
    }
}
