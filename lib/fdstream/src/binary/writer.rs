use std::io::{Seek, SeekFrom, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use super::{StringMode, char_range};
use crate::device::open_null_device;
use crate::error::{Error, Result};
use crate::file::File;
use crate::validate::Operand;

/// Writes primitive values to a byte sink.
///
/// Dropping the writer drops the sink, which closes a [`File`]. Use
/// [`BinaryWriter::into_inner`] to keep the sink open.
#[derive(Debug)]
pub struct BinaryWriter<W: Write> {
    inner: W,
}

impl BinaryWriter<File> {
    /// A writer that discards everything.
    pub fn null() -> Result<Self> {
        Ok(Self::new(open_null_device()?))
    }
}

impl<W: Write> BinaryWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Flush pending writes and hand the sink back.
    pub fn into_inner(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }

    pub fn flush(&mut self) -> Result<()> {
        Ok(self.inner.flush()?)
    }

    /// One byte: `1` for `true`, `0` for `false`.
    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(value as u8)
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        Ok(self.inner.write_u8(value)?)
    }

    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        Ok(self.inner.write_i8(value)?)
    }

    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        Ok(self.inner.write_i16::<LittleEndian>(value)?)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        Ok(self.inner.write_u16::<LittleEndian>(value)?)
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        Ok(self.inner.write_i32::<LittleEndian>(value)?)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        Ok(self.inner.write_u32::<LittleEndian>(value)?)
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        Ok(self.inner.write_i64::<LittleEndian>(value)?)
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        Ok(self.inner.write_u64::<LittleEndian>(value)?)
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        Ok(self.inner.write_f32::<LittleEndian>(value)?)
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        Ok(self.inner.write_f64::<LittleEndian>(value)?)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        Ok(self.inner.write_all(bytes)?)
    }

    /// The UTF-8 encoding of `ch`.
    pub fn write_char(&mut self, ch: char) -> Result<()> {
        let mut buf = [0u8; 4];
        self.write_bytes(ch.encode_utf8(&mut buf).as_bytes())
    }

    /// The UTF-8 encoding of every character in `chars`.
    pub fn write_chars(&mut self, chars: &[char]) -> Result<()> {
        let text: String = chars.iter().collect();
        self.write_bytes(text.as_bytes())
    }

    /// Like [`BinaryWriter::write_chars`] over `chars[index..index + count]`.
    pub fn write_chars_ex(
        &mut self,
        chars: &[char],
        index: impl Into<Operand>,
        count: impl Into<Operand>,
    ) -> Result<()> {
        let (index, count) = char_range(chars.len(), index.into(), count.into())?;
        self.write_chars(&chars[index..index + count])
    }

    /// Seven bits per byte, least significant group first; the high bit
    /// marks that another byte follows. Negative values take five bytes.
    pub fn write_7bit_encoded_i32(&mut self, value: i32) -> Result<()> {
        let mut value = value as u32;
        while value > 0x7F {
            self.write_u8(value as u8 | 0x80)?;
            value >>= 7;
        }
        self.write_u8(value as u8)
    }

    /// Like [`BinaryWriter::write_7bit_encoded_i32`]; negative values take
    /// ten bytes.
    pub fn write_7bit_encoded_i64(&mut self, value: i64) -> Result<()> {
        let mut value = value as u64;
        while value > 0x7F {
            self.write_u8(value as u8 | 0x80)?;
            value >>= 7;
        }
        self.write_u8(value as u8)
    }

    pub fn write_string(&mut self, value: &str, mode: StringMode) -> Result<()> {
        let bytes = value.as_bytes();
        match mode {
            StringMode::LengthPrefixed => {
                let len = i32::try_from(bytes.len()).map_err(|_| {
                    Error::OutOfRange(format!(
                        "String of {} bytes is too long for a length prefix.",
                        bytes.len()
                    ))
                })?;
                self.write_7bit_encoded_i32(len)?;
                self.write_bytes(bytes)
            }
            StringMode::CStr => {
                self.write_bytes(bytes)?;
                self.write_u8(0)
            }
            StringMode::Raw => self.write_bytes(bytes),
        }
    }
}

impl<W: Write + Seek> BinaryWriter<W> {
    /// Move the sink's position and return the new one.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        Ok(self.inner.seek(pos)?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;

    use super::*;

    fn written(f: impl FnOnce(&mut BinaryWriter<Vec<u8>>) -> Result<()>) -> Vec<u8> {
        let mut writer = BinaryWriter::new(Vec::new());
        f(&mut writer).unwrap();
        writer.into_inner().unwrap()
    }

    #[test]
    fn fixed_width_values_are_little_endian() {
        assert_eq!(written(|w| w.write_u16(0x0102)), [0x02, 0x01]);
        assert_eq!(written(|w| w.write_i32(-2)), [0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(
            written(|w| w.write_u64(0x0102_0304_0506_0708)),
            [8, 7, 6, 5, 4, 3, 2, 1]
        );
        assert_eq!(written(|w| w.write_f32(1.0)), [0x00, 0x00, 0x80, 0x3F]);
        assert_eq!(written(|w| w.write_bool(true)), [1]);
        assert_eq!(written(|w| w.write_i8(-1)), [0xFF]);
    }

    #[test]
    fn seven_bit_encoding() {
        assert_eq!(written(|w| w.write_7bit_encoded_i32(0)), [0x00]);
        assert_eq!(written(|w| w.write_7bit_encoded_i32(127)), [0x7F]);
        assert_eq!(written(|w| w.write_7bit_encoded_i32(128)), [0x80, 0x01]);
        assert_eq!(written(|w| w.write_7bit_encoded_i32(300)), [0xAC, 0x02]);
        assert_eq!(
            written(|w| w.write_7bit_encoded_i32(-1)),
            [0xFF, 0xFF, 0xFF, 0xFF, 0x0F]
        );
        assert_eq!(written(|w| w.write_7bit_encoded_i64(-1)).len(), 10);
    }

    #[test]
    fn string_modes() {
        assert_eq!(
            written(|w| w.write_string("hé", StringMode::LengthPrefixed)),
            [3, b'h', 0xC3, 0xA9]
        );
        assert_eq!(
            written(|w| w.write_string("ab", StringMode::CStr)),
            [b'a', b'b', 0]
        );
        assert_eq!(written(|w| w.write_string("ab", StringMode::Raw)), b"ab");
        assert_eq!(written(|w| w.write_char('€')), "€".as_bytes());
    }

    #[test]
    fn char_arrays() {
        let chars = ['a', 'ß', '€', '😀'];
        assert_eq!(written(|w| w.write_chars(&chars)), "aß€😀".as_bytes());
        assert_eq!(written(|w| w.write_chars_ex(&chars, 1, 2)), "ß€".as_bytes());
        assert!(written(|w| w.write_chars_ex(&chars, 4, 0)).is_empty());

        let mut writer = BinaryWriter::new(Vec::new());
        let err = writer.write_chars_ex(&chars, 3, 2).unwrap_err();
        assert_eq!(
            err.to_string(),
            "\"index + count\" must not be greater than chars' length."
        );
        let err = writer.write_chars_ex(&chars, 0.5, 1).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TypeMismatch);
        assert!(writer.into_inner().unwrap().is_empty());
    }

    #[test]
    fn seek_then_overwrite() {
        let mut writer = BinaryWriter::new(Cursor::new(Vec::new()));
        writer.write_u32(0).unwrap();
        assert_eq!(writer.seek(SeekFrom::Start(1)).unwrap(), 1);
        writer.write_u8(9).unwrap();
        assert_eq!(writer.into_inner().unwrap().into_inner(), [0, 9, 0, 0]);
    }
}
