//! Buffered, capability-checked streams over already-open file descriptors.
//!
//! A descriptor handed over by an outside caller comes without any record of
//! how it was opened. [`File`] asks the OS what the descriptor allows
//! (see [`probe`]), puts a C stdio stream with the matching mode on top of it
//! and from then on owns it:
//!
//! ```no_run
//! use fdstream::{File, SeekOrigin};
//!
//! # fn main() -> fdstream::Result<()> {
//! // SAFETY: descriptor 3 was passed to this process and is not used elsewhere.
//! let mut file = unsafe { File::new(3)? };
//! if file.can_seek() {
//!     file.seek(0, SeekOrigin::Begin)?;
//! }
//! let mut buf = [0u8; 64];
//! let n = file.read(&mut buf, None::<usize>, None::<usize>)?;
//! println!("{:?}", &buf[..n]);
//! file.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! Numeric arguments of the [`File`] operations are taken as loosely typed
//! [`Operand`]s and checked by the [`validate`] module before any system
//! call is made. [`BinaryReader`] and [`BinaryWriter`] add typed
//! little-endian encoding on top of any byte stream, a [`File`] included.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod error;

pub mod binary;
mod bridge;
mod device;
pub mod file;
mod options;
pub mod probe;
mod stream;
pub mod validate;

/// A C runtime file descriptor.
pub type RawDescriptor = libc::c_int;

pub use binary::{BinaryReader, BinaryWriter, StringMode};
pub use bridge::bridge;
pub use device::open_null_device;
pub use error::{Error, ErrorKind, Result, SystemError, errno_name};
pub use file::{File, SEEK_CUR, SEEK_END, SEEK_SET, SeekOrigin, checked_position};
pub use options::FileOptions;
#[cfg(windows)]
pub use probe::get_descriptor_access_mask;
pub use probe::{CapabilityProvider, IoState, ModeTable, NativeProvider, StreamMode, probe};
pub use validate::{Operand, SafeInteger, is_nullish, is_safe_integer, safe_integer_message};
