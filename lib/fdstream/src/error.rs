//! Error types shared by every component of the crate.
//!
//! Validation failures ([`Error::TypeMismatch`], [`Error::OutOfRange`]) are
//! always raised before any system call is made. Failures of the underlying
//! OS or C runtime call are reported as [`Error::SystemIo`] and carry the
//! `errno` value observed right after the failing call.

use std::ffi::CStr;
use std::fmt;
use std::io;

use thiserror::Error;

/// `EOVERFLOW` is not part of the classic C runtime set on every target.
#[cfg(unix)]
pub(crate) const EOVERFLOW: i32 = libc::EOVERFLOW;
#[cfg(not(unix))]
pub(crate) const EOVERFLOW: i32 = 132;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error type for external users
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An operand has the wrong type or shape (e.g. a fractional offset).
    #[error("{0}")]
    TypeMismatch(String),
    /// An operand is outside the admissible interval for its target width,
    /// or a buffer range would overrun the buffer.
    #[error("{0}")]
    OutOfRange(String),
    /// An optional OS entry point could not be resolved at startup.
    #[error("{0}")]
    ReferenceUnavailable(String),
    /// The underlying OS or C runtime call failed.
    #[error(transparent)]
    SystemIo(#[from] SystemError),
    /// The probed capabilities have no matching open mode.
    #[error("{0}")]
    Unrepresentable(String),
    /// A failure that has no `errno` attached, such as an `NTSTATUS` code.
    #[error("{0}")]
    Generic(String),
    /// Malformed data was met while decoding a binary stream.
    #[error("{0}")]
    Format(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TypeMismatch,
    OutOfRange,
    ReferenceUnavailable,
    SystemIo,
    /// A [`Error::SystemIo`] whose code is `EBADF`.
    BadDescriptor,
    Unrepresentable,
    Generic,
    Format,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TypeMismatch(_) => ErrorKind::TypeMismatch,
            Error::OutOfRange(_) => ErrorKind::OutOfRange,
            Error::ReferenceUnavailable(_) => ErrorKind::ReferenceUnavailable,
            Error::SystemIo(err) if err.errno == libc::EBADF => ErrorKind::BadDescriptor,
            Error::SystemIo(_) => ErrorKind::SystemIo,
            Error::Unrepresentable(_) => ErrorKind::Unrepresentable,
            Error::Generic(_) => ErrorKind::Generic,
            Error::Format(_) => ErrorKind::Format,
        }
    }

    pub fn is_bad_descriptor(&self) -> bool {
        self.kind() == ErrorKind::BadDescriptor
    }

    /// The `errno` carried by a system error, if any.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Error::SystemIo(err) => Some(err.errno),
            _ => None,
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::TypeMismatch(_) | Error::OutOfRange(_) => io::ErrorKind::InvalidInput,
            Error::Format(_) => io::ErrorKind::InvalidData,
            Error::SystemIo(sys) => sys.io_kind(),
            Error::ReferenceUnavailable(_) => io::ErrorKind::Unsupported,
            Error::Unrepresentable(_) | Error::Generic(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        let kind = err.kind();
        let raw = err.raw_os_error();
        match err.into_inner() {
            Some(inner) => match inner.downcast::<Error>() {
                Ok(inner) => *inner,
                Err(inner) => Error::from_io_kind(kind, inner.to_string()),
            },
            None => match raw {
                Some(code) if cfg!(unix) => {
                    Error::SystemIo(SystemError::new(code, "io", concat!(file!(), ":", line!())))
                }
                _ => Error::from_io_kind(kind, kind.to_string()),
            },
        }
    }
}

impl Error {
    fn from_io_kind(kind: io::ErrorKind, message: String) -> Self {
        match kind {
            io::ErrorKind::UnexpectedEof => Error::OutOfRange("Read beyond end-of-file.".to_string()),
            io::ErrorKind::InvalidData => Error::Format(message),
            _ => Error::Generic(message),
        }
    }
}

/// A failed OS or C runtime call.
///
/// Rendered as `<ERRNO_NAME>: <strerror>`, followed by ` (<context>)` when
/// the caller attached extra context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemError {
    pub errno: i32,
    /// Name of the failing call, e.g. `fseek`.
    pub syscall: &'static str,
    /// Source location that raised the error.
    pub path: &'static str,
    pub context: Option<String>,
}

impl SystemError {
    pub fn new(errno: i32, syscall: &'static str, path: &'static str) -> Self {
        Self {
            errno,
            syscall,
            path,
            context: None,
        }
    }

    /// Capture the calling thread's current `errno`.
    pub fn last(syscall: &'static str, path: &'static str) -> Self {
        Self::new(errno(), syscall, path)
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Symbolic name of the code, e.g. `EBADF`.
    pub fn code(&self) -> Option<&'static str> {
        errno_name(self.errno)
    }

    fn io_kind(&self) -> io::ErrorKind {
        #[cfg(unix)]
        {
            io::Error::from_raw_os_error(self.errno).kind()
        }
        #[cfg(not(unix))]
        {
            match self.errno {
                libc::ENOENT => io::ErrorKind::NotFound,
                libc::EACCES | libc::EPERM => io::ErrorKind::PermissionDenied,
                libc::EINVAL => io::ErrorKind::InvalidInput,
                libc::EPIPE => io::ErrorKind::BrokenPipe,
                libc::ESPIPE => io::ErrorKind::NotSeekable,
                libc::EINTR => io::ErrorKind::Interrupted,
                _ => io::ErrorKind::Other,
            }
        }
    }
}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code() {
            Some(code) => write!(f, "{code}: {}", strerror(self.errno))?,
            None => write!(f, "{}: {}", self.errno, strerror(self.errno))?,
        }
        if let Some(context) = &self.context {
            write!(f, " ({context})")?;
        }
        Ok(())
    }
}

impl std::error::Error for SystemError {}

/// Build a [`SystemError`] from the current `errno`, tagged with the call site.
macro_rules! last_os_error {
    ($syscall:expr) => {
        $crate::error::SystemError::last($syscall, concat!(file!(), ":", line!()))
    };
}

/// Build a [`SystemError`] for an explicit code, tagged with the call site.
macro_rules! os_error {
    ($errno:expr, $syscall:expr) => {
        $crate::error::SystemError::new($errno, $syscall, concat!(file!(), ":", line!()))
    };
}

pub(crate) use last_os_error;
pub(crate) use os_error;

#[cfg(unix)]
pub(crate) fn errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

#[cfg(windows)]
pub(crate) fn errno() -> i32 {
    unsafe extern "C" {
        fn _errno() -> *mut libc::c_int;
    }
    // SAFETY: the CRT always returns a valid pointer to the thread's errno.
    unsafe { *_errno() }
}

fn strerror(errno: i32) -> String {
    // SAFETY: `strerror` returns a pointer to a NUL-terminated string owned by
    // the C runtime; it is copied out immediately.
    unsafe {
        let message = libc::strerror(errno);
        if message.is_null() {
            return format!("Unknown error {errno}");
        }
        CStr::from_ptr(message).to_string_lossy().into_owned()
    }
}

/// Symbolic name of an `errno` value.
pub fn errno_name(errno: i32) -> Option<&'static str> {
    let name = match errno {
        libc::EPERM => "EPERM",
        libc::ENOENT => "ENOENT",
        libc::EINTR => "EINTR",
        libc::EIO => "EIO",
        libc::ENXIO => "ENXIO",
        libc::EBADF => "EBADF",
        libc::EAGAIN => "EAGAIN",
        libc::ENOMEM => "ENOMEM",
        libc::EACCES => "EACCES",
        libc::EFAULT => "EFAULT",
        libc::EBUSY => "EBUSY",
        libc::EEXIST => "EEXIST",
        libc::ENODEV => "ENODEV",
        libc::ENOTDIR => "ENOTDIR",
        libc::EISDIR => "EISDIR",
        libc::EINVAL => "EINVAL",
        libc::ENFILE => "ENFILE",
        libc::EMFILE => "EMFILE",
        libc::ENOTTY => "ENOTTY",
        libc::EFBIG => "EFBIG",
        libc::ENOSPC => "ENOSPC",
        libc::ESPIPE => "ESPIPE",
        libc::EROFS => "EROFS",
        libc::EPIPE => "EPIPE",
        libc::ERANGE => "ERANGE",
        EOVERFLOW => "EOVERFLOW",
        _ => return None,
    };
    Some(name)
}
