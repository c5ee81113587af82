//! Well-known devices adapted through [`File`].

use std::ffi::CStr;

use crate::error::{Result, last_os_error};
use crate::file::File;

#[cfg(unix)]
const NULL_DEVICE: &CStr = c"/dev/null";
#[cfg(windows)]
const NULL_DEVICE: &CStr = c"NUL";

#[cfg(unix)]
const WRITE_FLAGS: libc::c_int = libc::O_WRONLY;
#[cfg(windows)]
const WRITE_FLAGS: libc::c_int = libc::O_WRONLY | libc::O_BINARY;

/// Open the null device for writing; everything written is discarded.
pub fn open_null_device() -> Result<File> {
    // SAFETY: the path is a static, NUL-terminated literal.
    let descriptor = unsafe { libc::open(NULL_DEVICE.as_ptr(), WRITE_FLAGS) };
    if descriptor == -1 {
        return Err(last_os_error!("open").into());
    }

    // SAFETY: the descriptor was just opened and nothing else knows of it.
    match unsafe { File::from_raw(descriptor) } {
        Ok(file) => Ok(file),
        Err(err) => {
            // SAFETY: the stream was never created, so the descriptor is
            // still ours to close.
            unsafe { libc::close(descriptor) };
            Err(err)
        }
    }
}
