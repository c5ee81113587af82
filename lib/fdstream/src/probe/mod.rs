//! Capability probing for raw descriptors.
//!
//! A descriptor handed in from outside may be anything: a regular file, a
//! pipe, a console or a socket. Probing asks the OS which operations are
//! legal on it and derives the open mode needed to put a stdio stream on top
//! of it. POSIX and Windows expose incompatible metadata for this, so each
//! platform gets its own [`CapabilityProvider`]; everything above this module
//! only ever sees the resulting [`IoState`].

use std::ffi::CStr;
use std::fmt;

use libc::c_int;
use tracing::debug;

use crate::RawDescriptor;
use crate::error::{Error, Result};

#[cfg(unix)]
mod posix;
#[cfg(windows)]
pub(crate) mod windows;

#[cfg(unix)]
pub use posix::PosixProvider;
#[cfg(windows)]
pub use windows::{Resolution, WindowsProvider, get_descriptor_access_mask, resolution};

/// The capability provider of the current target.
#[cfg(unix)]
pub type NativeProvider = PosixProvider;
/// The capability provider of the current target.
#[cfg(windows)]
pub type NativeProvider = WindowsProvider;

/// Marker added to every native flag set on Windows to disable newline
/// translation.
#[cfg(windows)]
const BINARY: c_int = libc::O_BINARY;
#[cfg(not(windows))]
const BINARY: c_int = 0;

/// The stdio mode token used to put a stream on a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamMode {
    /// `"rb"`
    Read,
    /// `"r+b"`
    ReadWrite,
    /// `"wb"`
    Write,
    /// `"ab"`
    Append,
    /// `"a+b"`
    ReadAppend,
}

impl StreamMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            StreamMode::Read => "rb",
            StreamMode::ReadWrite => "r+b",
            StreamMode::Write => "wb",
            StreamMode::Append => "ab",
            StreamMode::ReadAppend => "a+b",
        }
    }

    pub(crate) const fn as_cstr(self) -> &'static CStr {
        match self {
            StreamMode::Read => c"rb",
            StreamMode::ReadWrite => c"r+b",
            StreamMode::Write => c"wb",
            StreamMode::Append => c"ab",
            StreamMode::ReadAppend => c"a+b",
        }
    }
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which (read, write, append) → open mode table to apply.
///
/// The two platforms report append differently, so they disagree on which
/// triples are legal. Both tables are evaluated top to bottom and the first
/// matching row wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeTable {
    /// `fcntl(F_GETFL)` semantics: append is only ever set together with a
    /// write access mode.
    Posix,
    /// Access-mask semantics: `FILE_APPEND_DATA` is granted for plain write
    /// opens as well as for append opens.
    Windows,
}

impl ModeTable {
    /// Pick the native open flags and stream mode for a raw access triple.
    pub fn select(self, read: bool, write: bool, append: bool) -> Result<(c_int, StreamMode)> {
        use libc::{O_APPEND, O_RDONLY, O_RDWR, O_WRONLY};

        let selected = match self {
            ModeTable::Posix => match (read, write, append) {
                (false, true, true) => Some((O_WRONLY | O_APPEND, StreamMode::Append)),
                (true, true, true) => Some((O_RDWR | O_APPEND, StreamMode::ReadAppend)),
                (true, false, false) => Some((O_RDONLY, StreamMode::Read)),
                (true, true, false) => Some((O_RDWR, StreamMode::ReadWrite)),
                (false, true, false) => Some((O_WRONLY, StreamMode::Write)),
                _ => None,
            },
            ModeTable::Windows => match (read, write, append) {
                (false, false, true) => {
                    Some((O_WRONLY | O_APPEND | BINARY, StreamMode::Append))
                }
                (true, false, true) => {
                    Some((O_RDWR | O_APPEND | BINARY, StreamMode::ReadAppend))
                }
                (true, false, false) => Some((O_RDONLY | BINARY, StreamMode::Read)),
                (true, true, _) => Some((O_RDWR | BINARY, StreamMode::ReadWrite)),
                (false, true, _) => Some((O_WRONLY | BINARY, StreamMode::Write)),
                _ => None,
            },
        };

        selected.ok_or_else(|| {
            Error::Unrepresentable(format!(
                "There is no suitable file flag that can be inferred from your file {}.",
                match self {
                    ModeTable::Posix => "descriptor",
                    ModeTable::Windows => "handle",
                }
            ))
        })
    }
}

/// Access bits as reported by the OS, before any reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawAccess {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub seekable: bool,
}

impl RawAccess {
    /// Capabilities implied by a kernel access mask.
    ///
    /// `FILE_APPEND_DATA` is granted for plain write opens as well as for
    /// append opens, so append only survives when write data is not granted,
    /// and either right allows writing.
    pub const fn reconcile_access_mask(self) -> RawAccess {
        RawAccess {
            read: self.read,
            write: self.append || self.write,
            append: !self.write && self.append,
            seekable: self.seekable,
        }
    }
}

/// The capability vector of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoState {
    can_read: bool,
    can_write: bool,
    can_append: bool,
    can_seek: bool,
    open_flags: c_int,
    stream_mode: Option<StreamMode>,
}

impl Default for IoState {
    fn default() -> Self {
        Self {
            can_read: false,
            can_write: false,
            can_append: false,
            can_seek: false,
            open_flags: -1,
            stream_mode: None,
        }
    }
}

impl IoState {
    pub const fn can_read(&self) -> bool {
        self.can_read
    }

    pub const fn can_write(&self) -> bool {
        self.can_write
    }

    pub const fn can_append(&self) -> bool {
        self.can_append
    }

    pub const fn can_seek(&self) -> bool {
        self.can_seek
    }

    /// Native open flags implied by the capabilities; `-1` when unknown.
    pub const fn open_flags(&self) -> c_int {
        self.open_flags
    }

    /// `None` only for the default (closed) state.
    pub const fn stream_mode(&self) -> Option<StreamMode> {
        self.stream_mode
    }
}

/// A platform strategy for discovering what a descriptor allows.
pub trait CapabilityProvider {
    /// The OS object actually inspected.
    type Handle: Copy + fmt::Debug;

    const TABLE: ModeTable;

    /// Map a descriptor to the object to inspect.
    fn resolve(descriptor: RawDescriptor) -> Result<Self::Handle>;

    /// Query the raw access bits of `handle`.
    fn access(handle: Self::Handle) -> Result<RawAccess>;

    /// Turn raw access bits into the capabilities reported to users.
    fn reconcile(raw: RawAccess) -> RawAccess {
        raw
    }
}

/// Probe `descriptor` with the provider of the current target.
pub fn probe(descriptor: RawDescriptor) -> Result<IoState> {
    probe_with::<NativeProvider>(descriptor)
}

/// Probe `descriptor` with an explicit provider.
pub fn probe_with<P: CapabilityProvider>(descriptor: RawDescriptor) -> Result<IoState> {
    probe_stream_with::<P>(descriptor).map(|(state, _)| state)
}

/// Probe `descriptor` and also hand back the stream mode to open it with.
pub(crate) fn probe_stream(descriptor: RawDescriptor) -> Result<(IoState, StreamMode)> {
    probe_stream_with::<NativeProvider>(descriptor)
}

#[tracing::instrument(level = "trace", skip_all, fields(%descriptor))]
fn probe_stream_with<P: CapabilityProvider>(
    descriptor: RawDescriptor,
) -> Result<(IoState, StreamMode)> {
    let handle = P::resolve(descriptor)?;
    let raw = P::access(handle)?;
    let (open_flags, stream_mode) = P::TABLE.select(raw.read, raw.write, raw.append)?;
    let caps = P::reconcile(raw);

    debug!(
        ?handle,
        ?raw,
        open_flags,
        mode = %stream_mode,
        "inferred stream mode"
    );

    let state = IoState {
        can_read: caps.read,
        can_write: caps.write,
        can_append: caps.append,
        can_seek: caps.seekable,
        open_flags,
        stream_mode: Some(stream_mode),
    };
    Ok((state, stream_mode))
}
