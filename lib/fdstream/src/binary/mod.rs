//! Little-endian binary encoding of primitive values over byte streams.
//!
//! The layout matches the one used by .NET's `BinaryWriter` and
//! `BinaryReader`: fixed-width values are little-endian, and strings are
//! prefixed with their UTF-8 byte length as a 7-bit encoded integer.
//! Characters are always UTF-8 encoded.

mod reader;
mod writer;

use crate::error::{Error, Result};
use crate::validate::{Operand, check_integer};

pub use reader::BinaryReader;
pub use writer::BinaryWriter;

/// How a string is framed on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StringMode {
    /// Byte length as a 7-bit encoded integer, then the bytes.
    #[default]
    LengthPrefixed,
    /// The bytes, then a NUL terminator.
    CStr,
    /// The bytes alone.
    Raw,
}

/// Validate an `(index, count)` pair against a character array of `len`
/// elements.
fn char_range(len: usize, index: Operand, count: Operand) -> Result<(usize, usize)> {
    let index = check_integer(index, 8, false, "index")?;
    let count = check_integer(count, 8, false, "count")?;

    let index = usize::try_from(index)
        .map_err(|_| Error::OutOfRange("\"index\" must be a non-negative number.".to_string()))?;
    if index > len {
        return Err(Error::OutOfRange(
            "\"index\" must not be greater than chars's length.".to_string(),
        ));
    }
    let count = usize::try_from(count)
        .map_err(|_| Error::OutOfRange("\"count\" must be a non-negative number.".to_string()))?;
    if count > len - index {
        return Err(Error::OutOfRange(
            "\"index + count\" must not be greater than chars' length.".to_string(),
        ));
    }
    Ok((index, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn char_ranges() {
        assert_eq!(char_range(4, Operand::from(1), Operand::from(3)).unwrap(), (1, 3));
        assert_eq!(char_range(4, Operand::from(4), Operand::from(0)).unwrap(), (4, 0));

        let cases = [
            (-1, 0, "\"index\" must be a non-negative number."),
            (5, 0, "\"index\" must not be greater than chars's length."),
            (0, -2, "\"count\" must be a non-negative number."),
            (2, 3, "\"index + count\" must not be greater than chars' length."),
        ];
        for (index, count, message) in cases {
            let err = char_range(4, Operand::from(index), Operand::from(count)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::OutOfRange);
            assert_eq!(err.to_string(), message);
        }

        let err = char_range(4, Operand::Undefined, Operand::from(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }
}
