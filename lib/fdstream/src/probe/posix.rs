use super::{CapabilityProvider, ModeTable, RawAccess};
use crate::RawDescriptor;
use crate::error::{Result, last_os_error};

/// Probes descriptors through `fcntl(F_GETFL)`.
///
/// The access triple is reported verbatim. Seekability is found out
/// empirically with a zero-length relative `lseek`.
#[derive(Debug, Clone, Copy)]
pub struct PosixProvider;

impl CapabilityProvider for PosixProvider {
    type Handle = RawDescriptor;

    const TABLE: ModeTable = ModeTable::Posix;

    fn resolve(descriptor: RawDescriptor) -> Result<Self::Handle> {
        Ok(descriptor)
    }

    fn access(fd: Self::Handle) -> Result<RawAccess> {
        // SAFETY: F_GETFL takes no argument and does not touch memory.
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if flags == -1 {
            return Err(last_os_error!("fcntl").into());
        }

        let access_mode = flags & libc::O_ACCMODE;
        // SAFETY: a zero-offset relative seek never moves the file position.
        let seekable = unsafe { libc::lseek(fd, 0, libc::SEEK_CUR) } != -1;

        Ok(RawAccess {
            read: access_mode == libc::O_RDONLY || access_mode == libc::O_RDWR,
            write: access_mode == libc::O_WRONLY || access_mode == libc::O_RDWR,
            append: flags & libc::O_APPEND != 0,
            seekable,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs::OpenOptions;
    use std::os::fd::AsRawFd;

    use super::*;
    use crate::error::ErrorKind;
    use crate::probe::{StreamMode, probe};

    #[test]
    fn read_only_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let file = OpenOptions::new().read(true).open(temp.path()).unwrap();

        let state = probe(file.as_raw_fd()).unwrap();
        assert!(state.can_read());
        assert!(!state.can_write());
        assert!(!state.can_append());
        assert!(state.can_seek());
        assert_eq!(state.stream_mode(), Some(StreamMode::Read));
    }

    #[test]
    fn append_only_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let file = OpenOptions::new().append(true).open(temp.path()).unwrap();

        let state = probe(file.as_raw_fd()).unwrap();
        assert!(!state.can_read());
        assert!(state.can_write());
        assert!(state.can_append());
        assert_eq!(state.stream_mode(), Some(StreamMode::Append));
        assert_eq!(state.open_flags(), libc::O_WRONLY | libc::O_APPEND);
    }

    #[test]
    fn read_append_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(temp.path())
            .unwrap();

        let state = probe(file.as_raw_fd()).unwrap();
        assert!(state.can_read() && state.can_write() && state.can_append());
        assert_eq!(state.stream_mode(), Some(StreamMode::ReadAppend));
    }

    #[test]
    fn pipe_is_not_seekable() {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let [rx, tx] = fds;

        let read_end = probe(rx).unwrap();
        assert!(read_end.can_read());
        assert!(!read_end.can_seek());
        assert_eq!(read_end.stream_mode(), Some(StreamMode::Read));

        let write_end = probe(tx).unwrap();
        assert!(write_end.can_write());
        assert!(!write_end.can_seek());
        assert_eq!(write_end.stream_mode(), Some(StreamMode::Write));

        unsafe {
            libc::close(rx);
            libc::close(tx);
        }
    }

    #[test]
    fn invalid_descriptor() {
        let err = probe(-1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadDescriptor);
        assert!(err.to_string().starts_with("EBADF: "));
    }
}
