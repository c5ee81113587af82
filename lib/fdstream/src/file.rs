//! The buffered file resource.

use std::io;
use std::mem::size_of;

use libc::{c_int, c_long};
use tracing::{debug, trace};

use crate::RawDescriptor;
use crate::bridge::bridge;
use crate::error::{EOVERFLOW, Error, Result, os_error};
use crate::options::FileOptions;
use crate::probe::{IoState, probe_stream};
use crate::stream::Stream;
use crate::validate::{
    MAX_SAFE_INTEGER, MIN_SAFE_INTEGER, Operand, SafeInteger, check_integer,
    check_optional_integer, is_safe_integer,
};

pub const SEEK_SET: i32 = libc::SEEK_SET;
pub const SEEK_CUR: i32 = libc::SEEK_CUR;
pub const SEEK_END: i32 = libc::SEEK_END;

/// Reference point of [`File::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    Begin,
    Current,
    End,
}

impl SeekOrigin {
    pub const fn as_raw(self) -> c_int {
        match self {
            SeekOrigin::Begin => SEEK_SET,
            SeekOrigin::Current => SEEK_CUR,
            SeekOrigin::End => SEEK_END,
        }
    }
}

impl From<SeekOrigin> for Operand {
    fn from(origin: SeekOrigin) -> Self {
        Operand::Number(origin.as_raw() as f64)
    }
}

/// A buffered stream over a descriptor whose origin is unknown.
///
/// Construction probes the descriptor, picks the matching stdio mode and
/// takes ownership of it. Every operation on a closed file fails with
/// `EBADF`, except [`File::close`], which may be called any number of times.
#[derive(Debug)]
pub struct File {
    descriptor: RawDescriptor,
    stream: Option<Stream>,
    state: IoState,
}

impl File {
    /// Adopt `descriptor`.
    ///
    /// # Safety
    ///
    /// `descriptor` must be open, and ownership of it passes to the returned
    /// `File`: nothing else may use or close it afterwards.
    pub unsafe fn new(descriptor: impl Into<Operand>) -> Result<Self> {
        let descriptor = descriptor.into();
        let Operand::Number(number) = descriptor else {
            return Err(descriptor_type_mismatch());
        };
        if is_safe_integer(descriptor, size_of::<RawDescriptor>(), false) != SafeInteger::Ok {
            return Err(descriptor_type_mismatch());
        }
        // SAFETY: forwarded to the caller.
        unsafe { Self::from_raw(number as RawDescriptor) }
    }

    /// Adopt `descriptor` and apply `options`.
    ///
    /// # Safety
    ///
    /// See [`File::new`].
    pub unsafe fn with_options(
        descriptor: impl Into<Operand>,
        options: &FileOptions,
    ) -> Result<Self> {
        // SAFETY: forwarded to the caller.
        let mut file = unsafe { Self::new(descriptor)? };
        options.apply(&mut file)?;
        Ok(file)
    }

    /// Adopt an owned descriptor. On failure the descriptor is closed.
    #[cfg(unix)]
    pub fn from_owned_fd(fd: std::os::fd::OwnedFd) -> Result<Self> {
        use std::os::fd::{AsRawFd, IntoRawFd};

        // SAFETY: `fd` is open and owned; it is only released to the stream
        // once the stream exists.
        let file = unsafe { Self::from_raw(fd.as_raw_fd())? };
        let _ = fd.into_raw_fd();
        Ok(file)
    }

    #[tracing::instrument(level = "trace", skip_all, fields(%descriptor))]
    pub(crate) unsafe fn from_raw(descriptor: RawDescriptor) -> Result<Self> {
        let (state, mode) = probe_stream(descriptor)?;
        let bridged = bridge(descriptor, &state)?;
        // SAFETY: the caller hands over ownership of `descriptor`, and
        // `bridged` is either the same descriptor or one registered for it.
        let stream = unsafe { Stream::from_descriptor(bridged, mode)? };

        debug!(bridged, %mode, "adopted descriptor");
        Ok(Self {
            descriptor: bridged,
            stream: Some(stream),
            state,
        })
    }

    fn stream(&mut self, op: &'static str) -> Result<&mut Stream> {
        self.stream
            .as_mut()
            .ok_or_else(|| os_error!(libc::EBADF, op).into())
    }

    /// Release the stream and its descriptor.
    ///
    /// Closing a closed file does nothing. When the C runtime reports a
    /// failure the file still ends up closed.
    #[tracing::instrument(level = "trace", skip_all, fields(descriptor = self.descriptor))]
    pub fn close(&mut self) -> Result<()> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        self.descriptor = -1;
        self.state = IoState::default();
        trace!("closing stream");
        stream.close()
    }

    /// Move the stream position by `offset` relative to `origin`.
    pub fn seek(&mut self, offset: impl Into<Operand>, origin: impl Into<Operand>) -> Result<()> {
        self.stream("seek")?;
        let offset = check_integer(offset, size_of::<c_long>(), false, "first argument")?;
        let origin = match origin.into() {
            Operand::Number(origin) => origin,
            _ => {
                return Err(Error::TypeMismatch(
                    "Must provide a SeekOrigin value as the second argument.".to_string(),
                ));
            }
        };
        let origin = match origin as c_int {
            raw @ (SEEK_SET | SEEK_CUR | SEEK_END) if raw as f64 == origin => raw,
            _ => return Err(Error::OutOfRange("Invalid SeekOrigin value.".to_string())),
        };

        trace!(descriptor = self.descriptor, offset, origin, "seek");
        self.stream("seek")?.seek(offset as c_long, origin)
    }

    /// Current stream position.
    pub fn tell(&mut self) -> Result<i64> {
        let position = self.stream("tell")?.tell()?;
        checked_position(position as i64)
    }

    /// Read into `buffer[offset..offset + count]` and return the number of
    /// bytes read, which is short at the end of the stream.
    ///
    /// `offset` defaults to zero and `count` to the rest of the buffer.
    pub fn read(
        &mut self,
        buffer: &mut [u8],
        offset: impl Into<Operand>,
        count: impl Into<Operand>,
    ) -> Result<usize> {
        self.stream("read")?;
        let (offset, count) = buffer_range(buffer.len(), offset.into(), count.into())?;
        self.stream("read")?.read(&mut buffer[offset..offset + count])
    }

    /// Write all of `buffer[offset..offset + count]`.
    ///
    /// `offset` defaults to zero and `count` to the rest of the buffer.
    pub fn write(
        &mut self,
        buffer: &[u8],
        offset: impl Into<Operand>,
        count: impl Into<Operand>,
    ) -> Result<()> {
        self.stream("write")?;
        let (offset, count) = buffer_range(buffer.len(), offset.into(), count.into())?;
        self.stream("write")?.write(&buffer[offset..offset + count])
    }

    pub fn flush(&mut self) -> Result<()> {
        self.stream("flush")?.flush()
    }

    /// Resize the stream buffer; zero turns buffering off.
    pub fn set_buffer_size(&mut self, size: impl Into<Operand>) -> Result<()> {
        self.stream("set_buffer_size")?;
        let size = check_integer(size, size_of::<usize>(), true, "first argument")? as usize;
        trace!(descriptor = self.descriptor, size, "resizing stream buffer");
        self.stream("set_buffer_size")?.set_buffer(size)
    }

    /// Read one byte, or `None` at the end of the stream.
    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.stream("read_byte")?.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.stream("write_byte")?.write(&[byte])
    }

    /// The descriptor backing the stream, `-1` once closed.
    pub fn descriptor(&self) -> RawDescriptor {
        self.descriptor
    }

    pub fn state(&self) -> &IoState {
        &self.state
    }

    pub fn can_read(&self) -> bool {
        self.state.can_read()
    }

    pub fn can_write(&self) -> bool {
        self.state.can_write()
    }

    pub fn can_append(&self) -> bool {
        self.state.can_append()
    }

    pub fn can_seek(&self) -> bool {
        self.state.can_seek()
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

fn descriptor_type_mismatch() -> Error {
    Error::TypeMismatch("Must provide an integer file descriptor as the first argument.".to_string())
}

/// Validate an optional `(offset, count)` pair against a buffer of `len`
/// bytes.
fn buffer_range(len: usize, offset: Operand, count: Operand) -> Result<(usize, usize)> {
    let width = size_of::<usize>();
    let offset = check_optional_integer(offset, width, true, "second argument")?;
    let count = check_optional_integer(count, width, true, "third argument")?;

    let offset = offset.unwrap_or(0) as usize;
    if offset > len {
        return Err(Error::OutOfRange(
            "offset is not allowed to be greater than buffer's length.".to_string(),
        ));
    }
    let available = len - offset;
    let count = count.map_or(available, |count| count as usize);
    if available < count {
        return Err(Error::OutOfRange(
            "Your requested read range would cause buffer overflow.".to_string(),
        ));
    }
    Ok((offset, count))
}

/// Reject positions a double-precision float cannot hold exactly.
pub fn checked_position(position: i64) -> Result<i64> {
    if (MIN_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&position) {
        Ok(position)
    } else {
        Err(os_error!(EOVERFLOW, "ftell").into())
    }
}

impl io::Read for File {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.stream("read")?.read(buf)?)
    }
}

impl io::Write for File {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream("write")?.write(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(File::flush(self)?)
    }
}

impl io::Seek for File {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let (offset, origin) = match pos {
            io::SeekFrom::Start(offset) => (i64::try_from(offset).ok(), SEEK_SET),
            io::SeekFrom::Current(offset) => (Some(offset), SEEK_CUR),
            io::SeekFrom::End(offset) => (Some(offset), SEEK_END),
        };
        let offset = offset
            .and_then(|offset| c_long::try_from(offset).ok())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek offset out of range"))?;

        let stream = self.stream("seek")?;
        stream.seek(offset, origin)?;
        let position = checked_position(stream.tell()? as i64)?;
        u64::try_from(position)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "negative stream position"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn range_defaults_to_the_whole_buffer() {
        assert_eq!(
            buffer_range(10, Operand::Undefined, Operand::Null).unwrap(),
            (0, 10)
        );
        assert_eq!(buffer_range(10, Operand::from(4), Operand::Undefined).unwrap(), (4, 6));
        assert_eq!(buffer_range(10, Operand::from(10), Operand::from(0)).unwrap(), (10, 0));
    }

    #[test]
    fn range_overflow() {
        let err = buffer_range(10, Operand::from(8), Operand::from(5)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
        assert_eq!(
            err.to_string(),
            "Your requested read range would cause buffer overflow."
        );

        let err = buffer_range(10, Operand::from(11), Operand::Undefined).unwrap_err();
        assert_eq!(
            err.to_string(),
            "offset is not allowed to be greater than buffer's length."
        );
    }

    #[test]
    fn range_operands_are_validated() {
        let err = buffer_range(10, Operand::Other, Operand::Undefined).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert!(err.to_string().ends_with("as the second argument."));

        let err = buffer_range(10, Operand::from(0), Operand::from(-1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
        assert!(err.to_string().ends_with("as the third argument."));
    }

    #[test]
    fn positions_beyond_the_safe_range_overflow() {
        assert_eq!(checked_position(0).unwrap(), 0);
        assert_eq!(checked_position(MAX_SAFE_INTEGER).unwrap(), MAX_SAFE_INTEGER);

        let err = checked_position(MAX_SAFE_INTEGER + 1).unwrap_err();
        assert_eq!(err.errno(), Some(EOVERFLOW));
        assert!(err.to_string().starts_with("EOVERFLOW: "));
        assert!(checked_position(i64::MIN).is_err());
    }

    #[test]
    fn descriptor_must_be_an_integer() {
        for descriptor in [Operand::Other, Operand::Undefined, Operand::Number(2.5)] {
            let err = unsafe { File::new(descriptor) }.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::TypeMismatch);
            assert_eq!(
                err.to_string(),
                "Must provide an integer file descriptor as the first argument."
            );
        }
        let err = unsafe { File::new(4_294_967_296i64) }.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[cfg(unix)]
    #[tracing_test::traced_test]
    #[test]
    fn failed_close_on_drop_is_logged() -> anyhow::Result<()> {
        use std::os::fd::OwnedFd;

        let temp = tempfile::NamedTempFile::new()?;
        let fd = OwnedFd::from(
            std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open(temp.path())?,
        );
        let mut file = File::from_owned_fd(fd)?;
        file.write(b"pending", None::<usize>, None::<usize>)?;

        // Swap a read-only descriptor in underneath the stream so flushing the
        // buffered bytes fails when the stream is closed.
        let null = std::fs::File::open("/dev/null")?;
        let null = std::os::fd::AsRawFd::as_raw_fd(&null);
        assert_ne!(unsafe { libc::dup2(null, file.descriptor()) }, -1);

        drop(file);
        assert!(logs_contain("failed to close stream on drop"));
        Ok(())
    }

    #[test]
    fn seek_origin_tokens() {
        assert_eq!(SeekOrigin::Begin.as_raw(), SEEK_SET);
        assert_eq!(Operand::from(SeekOrigin::End), Operand::Number(SEEK_END as f64));
    }
}
