use std::ffi::c_void;
use std::sync::OnceLock;

use tracing::debug;
use windows_sys::Win32::Foundation::{HANDLE, INVALID_HANDLE_VALUE};
use windows_sys::Win32::Storage::FileSystem::{
    FILE_APPEND_DATA, FILE_READ_DATA, FILE_TYPE_DISK, FILE_WRITE_DATA, GetFileType,
};
use windows_sys::Win32::System::Diagnostics::Debug::{
    FORMAT_MESSAGE_FROM_SYSTEM, FORMAT_MESSAGE_IGNORE_INSERTS, FormatMessageA,
};
use windows_sys::Win32::System::LibraryLoader::{GetProcAddress, LoadLibraryA};

use super::{CapabilityProvider, ModeTable, RawAccess};
use crate::RawDescriptor;
use crate::error::{Error, Result, os_error};

type NtStatus = i32;

/// `FileAccessInformation` in `FILE_INFORMATION_CLASS`.
const FILE_ACCESS_INFORMATION_CLASS: i32 = 8;

#[repr(C)]
struct IoStatusBlock {
    status: usize,
    information: usize,
}

#[repr(C)]
struct FileAccessInformation {
    access_flags: u32,
}

type NtQueryInformationFileFn = unsafe extern "system" fn(
    HANDLE,
    *mut IoStatusBlock,
    *mut c_void,
    u32,
    i32,
) -> NtStatus;
type RtlNtStatusToDosErrorFn = unsafe extern "system" fn(NtStatus) -> u32;

type InvalidParameterHandler =
    Option<unsafe extern "C" fn(*const u16, *const u16, *const u16, u32, usize)>;

unsafe extern "C" {
    fn _set_invalid_parameter_handler(handler: InvalidParameterHandler) -> InvalidParameterHandler;
}

/// Report invalid CRT parameters (such as an unknown descriptor) through the
/// return value instead of terminating the process.
unsafe extern "C" fn ignore_invalid_parameter(
    _expression: *const u16,
    _function: *const u16,
    _file: *const u16,
    _line: u32,
    _reserved: usize,
) {
}

/// State of the optional `ntdll.dll` entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Nothing has needed the entry points yet.
    Pending,
    Resolved,
    Unresolved,
}

#[derive(Clone, Copy)]
struct NtDll {
    query_information_file: Option<NtQueryInformationFileFn>,
    status_to_dos_error: Option<RtlNtStatusToDosErrorFn>,
}

static NTDLL: OnceLock<NtDll> = OnceLock::new();

fn ntdll() -> &'static NtDll {
    NTDLL.get_or_init(|| {
        // SAFETY: installs a handler that does nothing; it is never unset.
        unsafe {
            _set_invalid_parameter_handler(Some(ignore_invalid_parameter));
        }

        // SAFETY: ntdll.dll is mapped into every process; the resolved symbols
        // are cast to their documented signatures.
        unsafe {
            let module = LoadLibraryA(c"ntdll.dll".as_ptr().cast());
            if module.is_null() {
                debug!("failed to load ntdll.dll");
                return NtDll {
                    query_information_file: None,
                    status_to_dos_error: None,
                };
            }

            let query = GetProcAddress(module, c"NtQueryInformationFile".as_ptr().cast())
                .map(|f| std::mem::transmute::<_, NtQueryInformationFileFn>(f));
            let to_dos = GetProcAddress(module, c"RtlNtStatusToDosError".as_ptr().cast())
                .map(|f| std::mem::transmute::<_, RtlNtStatusToDosErrorFn>(f));
            if query.is_none() || to_dos.is_none() {
                debug!(
                    query_information_file = query.is_some(),
                    status_to_dos_error = to_dos.is_some(),
                    "ntdll entry points are missing"
                );
            }

            NtDll {
                query_information_file: query,
                status_to_dos_error: to_dos,
            }
        }
    })
}

/// Whether the optional `ntdll.dll` entry points have been looked up, and
/// with what outcome.
pub fn resolution() -> Resolution {
    match NTDLL.get() {
        None => Resolution::Pending,
        Some(NtDll {
            query_information_file: Some(_),
            status_to_dos_error: Some(_),
        }) => Resolution::Resolved,
        Some(_) => Resolution::Unresolved,
    }
}

fn query_information_file() -> Result<NtQueryInformationFileFn> {
    ntdll().query_information_file.ok_or_else(|| {
        Error::ReferenceUnavailable(
            "This module has failed to import the NtQueryInformationFile function.".to_string(),
        )
    })
}

/// Translate an `NTSTATUS` into the system's message for it.
fn nt_status_error(status: NtStatus) -> Error {
    let Some(to_dos_error) = ntdll().status_to_dos_error else {
        return Error::ReferenceUnavailable(
            "This module has failed to import the RtlNtStatusToDosError function.".to_string(),
        );
    };

    let mut buffer = [0u8; 512];
    // SAFETY: the buffer outlives the call and its length is passed along.
    let len = unsafe {
        FormatMessageA(
            FORMAT_MESSAGE_FROM_SYSTEM | FORMAT_MESSAGE_IGNORE_INSERTS,
            std::ptr::null(),
            to_dos_error(status),
            0,
            buffer.as_mut_ptr(),
            buffer.len() as u32,
            std::ptr::null(),
        )
    };
    if len == 0 {
        return Error::Generic(format!("NTSTATUS code is {status}"));
    }
    let message = String::from_utf8_lossy(&buffer[..len as usize]);
    Error::Generic(message.trim_end().to_string())
}

/// Look up the kernel handle behind a C runtime descriptor.
pub(crate) fn os_handle(descriptor: RawDescriptor) -> Result<HANDLE> {
    // Make sure an unknown descriptor is reported instead of aborting.
    ntdll();
    // SAFETY: `_get_osfhandle` validates the descriptor itself.
    let handle = unsafe { libc::get_osfhandle(descriptor) };
    if handle == INVALID_HANDLE_VALUE as libc::intptr_t {
        return Err(os_error!(libc::EBADF, "_get_osfhandle")
            .with_context("assumed")
            .into());
    }
    Ok(handle as HANDLE)
}

/// # Safety
///
/// `handle` must be an open kernel handle.
unsafe fn query_access_mask(
    query: NtQueryInformationFileFn,
    handle: HANDLE,
) -> std::result::Result<u32, NtStatus> {
    let mut status_block = IoStatusBlock {
        status: 0,
        information: 0,
    };
    let mut info = FileAccessInformation { access_flags: 0 };
    // SAFETY: both out-parameters are live, correctly sized locals.
    let status = unsafe {
        query(
            handle,
            &mut status_block,
            (&mut info as *mut FileAccessInformation).cast(),
            std::mem::size_of::<FileAccessInformation>() as u32,
            FILE_ACCESS_INFORMATION_CLASS,
        )
    };
    if status == 0 {
        Ok(info.access_flags)
    } else {
        Err(status)
    }
}

/// Raw kernel access mask of a descriptor, for diagnostics.
pub fn get_descriptor_access_mask(descriptor: RawDescriptor) -> Result<u32> {
    let query = query_information_file()?;
    // SAFETY: `_get_osfhandle` validates the descriptor itself.
    let handle = unsafe { libc::get_osfhandle(descriptor) };
    if handle == INVALID_HANDLE_VALUE as libc::intptr_t {
        return Err(Error::Generic("Bad file descriptor.".to_string()));
    }
    // SAFETY: the handle was just obtained from a live descriptor.
    unsafe { query_access_mask(query, handle as HANDLE) }.map_err(|status| {
        Error::Generic(format!(
            "NtQueryInformationFile returned an error code: 0x{status:x}"
        ))
    })
}

/// Probes handles through their kernel access mask.
///
/// See [`RawAccess::reconcile_access_mask`] for how append and write are
/// reported. Only disk files are reported as seekable.
#[derive(Debug, Clone, Copy)]
pub struct WindowsProvider;

impl CapabilityProvider for WindowsProvider {
    type Handle = HANDLE;

    const TABLE: ModeTable = ModeTable::Windows;

    fn resolve(descriptor: RawDescriptor) -> Result<Self::Handle> {
        os_handle(descriptor)
    }

    fn access(handle: Self::Handle) -> Result<RawAccess> {
        let query = query_information_file()?;
        // SAFETY: `handle` came from `os_handle`.
        let mask = unsafe { query_access_mask(query, handle) }.map_err(nt_status_error)?;
        // SAFETY: see above.
        let seekable = unsafe { GetFileType(handle) } == FILE_TYPE_DISK;

        Ok(RawAccess {
            read: mask & FILE_READ_DATA != 0,
            write: mask & FILE_WRITE_DATA != 0,
            append: mask & FILE_APPEND_DATA != 0,
            seekable,
        })
    }

    fn reconcile(raw: RawAccess) -> RawAccess {
        raw.reconcile_access_mask()
    }
}

#[cfg(test)]
mod tests {
    use std::fs::OpenOptions;
    use std::os::windows::io::IntoRawHandle;

    use super::*;
    use crate::probe::{StreamMode, probe};

    fn crt_descriptor(file: std::fs::File, flags: libc::c_int) -> RawDescriptor {
        let fd = unsafe { libc::open_osfhandle(file.into_raw_handle() as libc::intptr_t, flags) };
        assert_ne!(fd, -1);
        fd
    }

    #[test]
    fn read_only_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let file = OpenOptions::new().read(true).open(temp.path()).unwrap();
        let fd = crt_descriptor(file, libc::O_RDONLY);

        let state = probe(fd).unwrap();
        assert_eq!(resolution(), Resolution::Resolved);
        assert!(state.can_read());
        assert!(!state.can_write());
        assert!(state.can_seek());
        assert_eq!(state.stream_mode(), Some(StreamMode::Read));

        let mask = get_descriptor_access_mask(fd).unwrap();
        assert_ne!(mask & FILE_READ_DATA, 0);
        assert_eq!(mask & FILE_WRITE_DATA, 0);
        unsafe { libc::close(fd) };
    }

    #[test]
    fn write_handle_is_not_append() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let file = OpenOptions::new().write(true).open(temp.path()).unwrap();
        let fd = crt_descriptor(file, libc::O_WRONLY);

        let state = probe(fd).unwrap();
        assert!(state.can_write());
        assert!(!state.can_append());
        assert_eq!(state.stream_mode(), Some(StreamMode::Write));
        unsafe { libc::close(fd) };
    }

    #[test]
    fn unknown_descriptor() {
        let err = probe(-1).unwrap_err();
        assert!(err.is_bad_descriptor());
        assert!(err.to_string().ends_with("(assumed)"));
        assert!(matches!(
            get_descriptor_access_mask(-1),
            Err(Error::Generic(_))
        ));
    }
}
