//! Exclusive ownership of a C stdio stream.

use std::ptr::NonNull;

use libc::{c_int, c_long};

use crate::RawDescriptor;
use crate::error::{Result, last_os_error};
use crate::probe::StreamMode;

/// An open `FILE *`.
///
/// Closing consumes the value, so a stream is released at most once. Dropping
/// an unclosed stream closes it and only logs a failure.
#[derive(Debug)]
pub(crate) struct Stream {
    file: NonNull<libc::FILE>,
}

// SAFETY: a `FILE` carries its own lock and is not tied to the thread that
// opened it; `Stream` is never shared, only moved.
unsafe impl Send for Stream {}

impl Stream {
    /// Put a stream on top of `descriptor`.
    ///
    /// # Safety
    ///
    /// `descriptor` must be open and owned by the caller; on success the
    /// stream becomes responsible for closing it.
    pub(crate) unsafe fn from_descriptor(
        descriptor: RawDescriptor,
        mode: StreamMode,
    ) -> Result<Self> {
        // SAFETY: the mode string is a static, NUL-terminated literal.
        let file = unsafe { libc::fdopen(descriptor, mode.as_cstr().as_ptr()) };
        match NonNull::new(file) {
            Some(file) => Ok(Self { file }),
            None => Err(last_os_error!("fdopen").into()),
        }
    }

    pub(crate) fn seek(&mut self, offset: c_long, origin: c_int) -> Result<()> {
        // SAFETY: `self.file` is open for as long as `self` exists.
        if unsafe { libc::fseek(self.file.as_ptr(), offset, origin) } != 0 {
            return Err(last_os_error!("fseek").into());
        }
        Ok(())
    }

    pub(crate) fn tell(&mut self) -> Result<c_long> {
        // SAFETY: see `seek`.
        let position = unsafe { libc::ftell(self.file.as_ptr()) };
        if position == -1 {
            return Err(last_os_error!("ftell").into());
        }
        Ok(position)
    }

    /// Fill as much of `buf` as the stream provides. A short count is only an
    /// error when the stream's error indicator is set.
    pub(crate) fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        // SAFETY: `buf` is valid for `buf.len()` bytes of writes.
        let read = unsafe { libc::fread(buf.as_mut_ptr().cast(), 1, buf.len(), self.file.as_ptr()) };
        // SAFETY: see `seek`.
        if read < buf.len() && unsafe { libc::ferror(self.file.as_ptr()) } != 0 {
            return Err(last_os_error!("fread").into());
        }
        Ok(read)
    }

    /// Write all of `buf`; anything less is an error.
    pub(crate) fn write(&mut self, buf: &[u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        // SAFETY: `buf` is valid for `buf.len()` bytes of reads.
        let written = unsafe { libc::fwrite(buf.as_ptr().cast(), 1, buf.len(), self.file.as_ptr()) };
        if written != buf.len() {
            return Err(last_os_error!("fwrite").into());
        }
        Ok(())
    }

    pub(crate) fn flush(&mut self) -> Result<()> {
        // SAFETY: see `seek`.
        if unsafe { libc::fflush(self.file.as_ptr()) } == libc::EOF {
            return Err(last_os_error!("fflush").into());
        }
        Ok(())
    }

    /// Switch to full buffering with a `size`-byte buffer, or to unbuffered
    /// mode when `size` is zero.
    pub(crate) fn set_buffer(&mut self, size: usize) -> Result<()> {
        let mode = if size == 0 { libc::_IONBF } else { libc::_IOFBF };
        // SAFETY: a null buffer lets the C runtime allocate and own it.
        let status =
            unsafe { libc::setvbuf(self.file.as_ptr(), std::ptr::null_mut(), mode, size) };
        if status != 0 {
            return Err(last_os_error!("setvbuf").into());
        }
        Ok(())
    }

    /// Flush and close the stream together with its descriptor.
    pub(crate) fn close(self) -> Result<()> {
        let file = self.file;
        std::mem::forget(self);
        // SAFETY: `self` was consumed, nothing else refers to `file`.
        if unsafe { libc::fclose(file.as_ptr()) } == libc::EOF {
            return Err(last_os_error!("fclose").into());
        }
        Ok(())
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        // SAFETY: `close` forgets the value, so the stream is still open here.
        if unsafe { libc::fclose(self.file.as_ptr()) } == libc::EOF {
            let err = last_os_error!("fclose");
            tracing::warn!(error = %err, "failed to close stream on drop");
        }
    }
}
