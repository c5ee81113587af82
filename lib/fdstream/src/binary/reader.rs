use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use super::char_range;
use crate::error::{Error, Result};
use crate::validate::{Operand, check_integer};

fn bad_7bit_integer() -> Error {
    Error::Format("Bad 7-bit encoded integer.".to_string())
}

/// Reads primitive values written by [`super::BinaryWriter`].
///
/// Running out of input in the middle of a value fails with
/// [`Error::OutOfRange`]. Dropping the reader drops the source; use
/// [`BinaryReader::into_inner`] to keep it open.
#[derive(Debug)]
pub struct BinaryReader<R: Read> {
    inner: R,
}

impl<R: Read> BinaryReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Any non-zero byte is `true`.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.inner.read_u8()?)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.inner.read_i8()?)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.inner.read_i16::<LittleEndian>()?)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.inner.read_u16::<LittleEndian>()?)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.inner.read_i32::<LittleEndian>()?)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.inner.read_u32::<LittleEndian>()?)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.inner.read_i64::<LittleEndian>()?)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(self.inner.read_u64::<LittleEndian>()?)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(self.inner.read_f32::<LittleEndian>()?)
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(self.inner.read_f64::<LittleEndian>()?)
    }

    /// Read up to `count` bytes; fewer are returned at the end of input.
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(count);
        (&mut self.inner).take(count as u64).read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Read into `buffer`, returning how many bytes were read.
    pub fn read_into(&mut self, buffer: &mut [u8]) -> Result<usize> {
        loop {
            match self.inner.read(buffer) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Decode a single UTF-8 encoded character.
    pub fn read_char(&mut self) -> Result<char> {
        let lead = self.read_u8()?;
        self.decode_char(lead)
    }

    /// The next character, or `None` when the input ends on a character
    /// boundary. A sequence cut short by the end of input is an error.
    fn next_char(&mut self) -> Result<Option<char>> {
        let mut lead = [0u8; 1];
        if self.read_into(&mut lead)? == 0 {
            return Ok(None);
        }
        self.decode_char(lead[0]).map(Some)
    }

    fn decode_char(&mut self, lead: u8) -> Result<char> {
        let width = match lead {
            0x00..=0x7F => 1,
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => return Err(Error::Format(format!("Invalid UTF-8 lead byte 0x{lead:02x}."))),
        };
        let mut buf = [lead, 0, 0, 0];
        self.inner.read_exact(&mut buf[1..width])?;
        std::str::from_utf8(&buf[..width])
            .ok()
            .and_then(|s| s.chars().next())
            .ok_or_else(|| Error::Format("Invalid UTF-8 sequence.".to_string()))
    }

    /// Read up to `count` characters; fewer are returned at the end of input.
    pub fn read_chars(&mut self, count: impl Into<Operand>) -> Result<Vec<char>> {
        let count = check_integer(count, 8, false, "count")?;
        let count = usize::try_from(count)
            .map_err(|_| Error::OutOfRange("count must be a non-negative value.".to_string()))?;
        let mut chars = Vec::new();
        while chars.len() < count {
            match self.next_char()? {
                Some(ch) => chars.push(ch),
                None => break,
            }
        }
        Ok(chars)
    }

    /// Fill `buffer` with characters, returning how many were read.
    pub fn read_into_chars(&mut self, buffer: &mut [char]) -> Result<usize> {
        let mut read = 0;
        for slot in buffer.iter_mut() {
            match self.next_char()? {
                Some(ch) => *slot = ch,
                None => break,
            }
            read += 1;
        }
        Ok(read)
    }

    /// Like [`BinaryReader::read_into_chars`] over
    /// `buffer[index..index + count]`.
    pub fn read_into_chars_ex(
        &mut self,
        buffer: &mut [char],
        index: impl Into<Operand>,
        count: impl Into<Operand>,
    ) -> Result<usize> {
        let (index, count) = char_range(buffer.len(), index.into(), count.into())?;
        self.read_into_chars(&mut buffer[index..index + count])
    }

    pub fn read_7bit_encoded_i32(&mut self) -> Result<i32> {
        let mut result = 0u32;
        for shift in (0..28).step_by(7) {
            let byte = self.read_u8()?;
            result |= u32::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(result as i32);
            }
        }
        // Only the low four bits of the fifth byte fit.
        let byte = self.read_u8()?;
        if byte > 0b1111 {
            return Err(bad_7bit_integer());
        }
        result |= u32::from(byte) << 28;
        Ok(result as i32)
    }

    pub fn read_7bit_encoded_i64(&mut self) -> Result<i64> {
        let mut result = 0u64;
        for shift in (0..63).step_by(7) {
            let byte = self.read_u8()?;
            result |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(result as i64);
            }
        }
        // Only the low bit of the tenth byte fits.
        let byte = self.read_u8()?;
        if byte > 0b1 {
            return Err(bad_7bit_integer());
        }
        result |= u64::from(byte) << 63;
        Ok(result as i64)
    }

    /// Read a string with a 7-bit encoded byte length prefix.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_7bit_encoded_i32()?;
        let len = usize::try_from(len)
            .map_err(|_| Error::Format(format!("Invalid string's length: {len}")))?;
        // The prefix is untrusted; let the input bound the allocation.
        let mut bytes = Vec::new();
        (&mut self.inner).take(len as u64).read_to_end(&mut bytes)?;
        if bytes.len() < len {
            return Err(Error::OutOfRange("Read beyond end-of-file.".to_string()));
        }
        String::from_utf8(bytes).map_err(|err| Error::Format(err.to_string()))
    }

    /// Read a NUL-terminated string; the terminator is consumed.
    pub fn read_cstring(&mut self) -> Result<String> {
        let mut bytes = Vec::new();
        loop {
            match self.read_u8()? {
                0 => break,
                byte => bytes.push(byte),
            }
        }
        String::from_utf8(bytes).map_err(|err| Error::Format(err.to_string()))
    }
}

impl<R: Read + Seek> BinaryReader<R> {
    /// Current position, or `None` when the source cannot seek.
    fn position(&mut self) -> Result<Option<u64>> {
        match self.inner.stream_position() {
            Ok(position) => Ok(Some(position)),
            Err(err) if err.kind() == io::ErrorKind::NotSeekable => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// The next byte without consuming it, or `None` at the end of input or
    /// when the source cannot seek.
    pub fn peek_byte(&mut self) -> Result<Option<u8>> {
        let Some(position) = self.position()? else {
            return Ok(None);
        };
        let mut byte = [0u8; 1];
        let read = self.read_into(&mut byte)?;
        self.inner.seek(SeekFrom::Start(position))?;
        Ok((read == 1).then_some(byte[0]))
    }

    /// The next character without consuming it, or `None` at the end of
    /// input or when the source cannot seek.
    pub fn peek_char(&mut self) -> Result<Option<char>> {
        let Some(position) = self.position()? else {
            return Ok(None);
        };
        let ch = self.next_char();
        self.inner.seek(SeekFrom::Start(position))?;
        ch
    }

    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        Ok(self.inner.seek(pos)?)
    }
}
