//! The recoverable condition taxonomy (§7.1).
//!
//! A hand-rolled `std::error::Error` enum, not `thiserror`/`anyhow` —
//! grounded on the compiler crate's `codegen::error::CodeGenError`, which
//! takes the same approach.

use std::fmt;
use std::io;

/// A recoverable condition: the guest-visible error taxonomy a handler
/// can catch and continue from, as opposed to the panics of
/// [`crate::error`]'s coding-error family.
#[derive(Debug, Clone)]
pub enum Condition {
    /// A primitive received an argument of the wrong Rust-level shape
    /// (e.g. a pair where a symbol was expected).
    ParameterType { expected: String, got: String },
    /// A primitive received an argument of the right shape but an
    /// unacceptable value (e.g. a negative array size).
    ParameterValue { message: String },
    /// An operating-system call failed for a reason not covered by the
    /// more specific `io-*`/`rt-*` variants below.
    SystemError { message: String, errno: Option<i32> },
    /// `io-*` family: handle-level I/O failures (§4.6).
    IoError { message: String, errno: Option<i32> },
    /// No such file or directory (`ENOENT`).
    FileNotFound { path: String },
    /// Permission denied (`EACCES`).
    PermissionDenied { path: String },
    /// The target already exists (`EEXIST`, e.g. an exclusive-create open).
    FileExists { path: String },
    /// A path component expected to be a directory wasn't one (`ENOTDIR`).
    NotADirectory { path: String },
    /// A path or path component exceeded the platform's name/path length
    /// limit (`ENAMETOOLONG`).
    NameTooLong { path: String },
    /// A FIFO was opened write-only with no reader present (`ENXIO`,
    /// §4.6/§8: this is testable as the open call returning `#f` rather
    /// than raising, so callers translate this condition to `#f` rather
    /// than propagating it).
    NoReaderForFifo { path: String },
    /// The handle was used after having been closed.
    IoClosed,
    /// A second `close` was invoked on a handle that is already closed
    /// (§4.6: close is idempotent per handle but the second user-code
    /// invocation itself is an error).
    AlreadyClosed { name: String },
    /// A mandatory vtable method lookup (`resolve-method`/fixed-slot
    /// dispatch) found nothing in the type's chain (§4.4/§9 "dynamic
    /// dispatch").
    MethodUnbound { type_name: String, method: String },
    /// Read past the end of a handle without the lookahead being
    /// refilled.
    IoEof,
    /// The extension loader failed to locate or load a library (§4.8).
    LoadError { name: String, message: String },
    /// A glob-style path expansion in the loader's search path failed.
    GlobError { pattern: String, message: String },
    /// `rt-command-*` family: job-control adjacent errors that cross the
    /// core/runtime boundary (out of scope to execute, but the core must
    /// still be able to construct and propagate them).
    CommandError { message: String },
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::ParameterType { expected, got } => {
                write!(f, "^rt-parameter-type-error: expected {expected}, got {got}")
            }
            Condition::ParameterValue { message } => {
                write!(f, "^rt-parameter-value-error: {message}")
            }
            Condition::SystemError { message, errno } => match errno {
                Some(e) => write!(f, "^system-error: {message} (errno {e})"),
                None => write!(f, "^system-error: {message}"),
            },
            Condition::IoError { message, errno } => match errno {
                Some(e) => write!(f, "^io-error: {message} (errno {e})"),
                None => write!(f, "^io-error: {message}"),
            },
            Condition::FileNotFound { path } => write!(f, "^i/o-no-such-file-error: {path}"),
            Condition::PermissionDenied { path } => {
                write!(f, "^i/o-permission-denied-error: {path}")
            }
            Condition::FileExists { path } => write!(f, "^i/o-file-already-exists-error: {path}"),
            Condition::NotADirectory { path } => {
                write!(f, "^i/o-file-is-not-a-directory-error: {path}")
            }
            Condition::NameTooLong { path } => write!(f, "^i/o-filename-error: {path}: name too long"),
            Condition::NoReaderForFifo { path } => {
                write!(f, "^i/o-no-such-file-error: {path}: no reader on FIFO")
            }
            Condition::IoClosed => write!(f, "^io-closed-error: handle is closed"),
            Condition::AlreadyClosed { name } => {
                write!(f, "^i/o-closed-error: {name}: already closed")
            }
            Condition::MethodUnbound { type_name, method } => {
                write!(f, "^rt-method-unbound-error: {type_name}: {method}")
            }
            Condition::IoEof => write!(f, "^io-eof-error: end of file"),
            Condition::LoadError { name, message } => {
                write!(f, "^rt-load-error: {name}: {message}")
            }
            Condition::GlobError { pattern, message } => {
                write!(f, "^rt-glob-error: {pattern}: {message}")
            }
            Condition::CommandError { message } => write!(f, "^rt-command-error: {message}"),
        }
    }
}

impl std::error::Error for Condition {}

impl Condition {
    /// Map a POSIX `errno` value to the condition the handle subsystem
    /// should raise, per §4.6.
    pub fn from_errno(context: &str, errno: i32) -> Condition {
        match errno {
            libc::ENOENT => Condition::FileNotFound { path: context.to_string() },
            libc::EACCES => Condition::PermissionDenied { path: context.to_string() },
            libc::EEXIST => Condition::FileExists { path: context.to_string() },
            libc::ENOTDIR => Condition::NotADirectory { path: context.to_string() },
            libc::ENAMETOOLONG => Condition::NameTooLong { path: context.to_string() },
            libc::ENXIO => Condition::NoReaderForFifo { path: context.to_string() },
            libc::EBADF => Condition::IoClosed,
            libc::ENOSPC => Condition::SystemError {
                message: format!("{context}: no space left on device"),
                errno: Some(errno),
            },
            libc::EMFILE | libc::ENFILE => Condition::SystemError {
                message: format!("{context}: too many open files"),
                errno: Some(errno),
            },
            _ => Condition::IoError {
                message: format!("{context}: {}", io::Error::from_raw_os_error(errno)),
                errno: Some(errno),
            },
        }
    }

    pub fn from_io_error(context: &str, e: &io::Error) -> Condition {
        match e.raw_os_error() {
            Some(errno) => Condition::from_errno(context, errno),
            None => Condition::IoError {
                message: format!("{context}: {e}"),
                errno: None,
            },
        }
    }
}

impl From<io::Error> for Condition {
    fn from(e: io::Error) -> Self {
        Condition::from_io_error("io", &e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enoent_maps_to_file_not_found() {
        let c = Condition::from_errno("open", libc::ENOENT);
        assert!(matches!(c, Condition::FileNotFound { .. }));
    }

    #[test]
    fn eexist_enotdir_enametoolong_enxio_map_distinctly() {
        assert!(matches!(
            Condition::from_errno("open", libc::EEXIST),
            Condition::FileExists { .. }
        ));
        assert!(matches!(
            Condition::from_errno("open", libc::ENOTDIR),
            Condition::NotADirectory { .. }
        ));
        assert!(matches!(
            Condition::from_errno("open", libc::ENAMETOOLONG),
            Condition::NameTooLong { .. }
        ));
        assert!(matches!(
            Condition::from_errno("open", libc::ENXIO),
            Condition::NoReaderForFifo { .. }
        ));
    }

    #[test]
    fn ebadf_maps_to_closed() {
        let c = Condition::from_errno("read", libc::EBADF);
        assert!(matches!(c, Condition::IoClosed));
    }

    #[test]
    fn method_unbound_display_names_type_and_method() {
        let c = Condition::MethodUnbound {
            type_name: "pair".into(),
            method: "value-index".into(),
        };
        assert!(c.to_string().contains("pair"));
        assert!(c.to_string().contains("value-index"));
    }

    #[test]
    fn display_includes_tag() {
        let c = Condition::ParameterValue {
            message: "negative size".into(),
        };
        assert!(c.to_string().contains("^rt-parameter-value-error"));
    }
}
