//! Re-exposes a probed descriptor in a form `fdopen` accepts.
//!
//! The Windows C runtime cannot put a stream on an arbitrary descriptor whose
//! mode disagrees with the stream mode, so the kernel handle is registered
//! again under a fresh descriptor carrying the inferred open flags. On POSIX
//! the descriptor is usable as is.

use crate::RawDescriptor;
use crate::error::Result;
use crate::probe::IoState;

#[cfg(unix)]
pub fn bridge(descriptor: RawDescriptor, _state: &IoState) -> Result<RawDescriptor> {
    Ok(descriptor)
}

#[cfg(windows)]
#[tracing::instrument(level = "trace", skip_all, fields(%descriptor))]
pub fn bridge(descriptor: RawDescriptor, state: &IoState) -> Result<RawDescriptor> {
    use crate::error::last_os_error;
    use crate::probe::windows::os_handle;

    let handle = os_handle(descriptor)?;
    // SAFETY: `handle` belongs to a live descriptor; the new descriptor takes
    // over responsibility for closing it.
    let bridged =
        unsafe { libc::open_osfhandle(handle as libc::intptr_t, state.open_flags()) };
    if bridged == -1 {
        return Err(last_os_error!("_open_osfhandle").into());
    }
    tracing::trace!(bridged, "registered handle under a new descriptor");
    Ok(bridged)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::probe::probe;

    #[test]
    fn identity_on_posix() {
        let temp = tempfile::tempfile().unwrap();
        let fd = std::os::fd::AsRawFd::as_raw_fd(&temp);
        let state = probe(fd).unwrap();
        assert_eq!(bridge(fd, &state).unwrap(), fd);
    }
}
