//! File/pipe/string handle abstraction (§4.6).
//!
//! Buffered I/O, a one-code-point lookahead, seek semantics, POSIX-style
//! mode-string parsing, and errno→condition mapping. Per the "Lookahead
//! channel" design note, the lookahead is modelled as `Option<char>`
//! rather than a sentinel-encoded integer, since this reimplementation
//! doesn't need to interoperate with the source's byte-oriented
//! lookahead representation.
//!
//! Grounded on the runtime crate's `file.rs` for the surface shape
//! (slurp/exists/read-line-style operations), generalized here to the
//! buffered, seekable, mode-string-driven handle the spec calls for.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};

use crate::condition::Condition;

/// Parsed POSIX-style open mode (`"r"`, `"w"`, `"a"`, `"r+"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub truncate: bool,
    pub create: bool,
    /// The `x` letter: create exclusively, failing with `file-exists` if
    /// the path is already there (`O_EXCL`).
    pub exclusive: bool,
    /// The `e` letter: mark the descriptor close-on-exec. Rust's
    /// `std::fs::File` sets `FD_CLOEXEC` by default on Unix, so the
    /// absence of `e` is the interesting case — it means the caller
    /// wants the descriptor to survive an `exec`, e.g. to hand a pipe
    /// end to a child job.
    pub cloexec: bool,
}

impl OpenMode {
    /// Parse a mode string of the form `r`, `w`, `a`, `r+`, `w+`, `a+`,
    /// each optionally followed by any of `b` (binary, accepted and
    /// ignored), `e` (close-on-exec) and `x` (exclusive create).
    pub fn parse(mode: &str) -> Result<Self, Condition> {
        let mut chars = mode.chars().filter(|&c| c != 'b').peekable();
        let base = chars.next().ok_or_else(|| Condition::ParameterValue {
            message: format!("empty open mode {mode:?}"),
        })?;
        let plus = if chars.peek() == Some(&'+') {
            chars.next();
            true
        } else {
            false
        };
        let mut cloexec = false;
        let mut exclusive = false;
        for c in chars {
            match c {
                'e' => cloexec = true,
                'x' => exclusive = true,
                _ => {
                    return Err(Condition::ParameterValue {
                        message: format!("malformed open mode {mode:?}"),
                    });
                }
            }
        }
        Ok(match base {
            'r' => OpenMode {
                read: true,
                write: plus,
                append: false,
                truncate: false,
                create: false,
                exclusive,
                cloexec,
            },
            'w' => OpenMode {
                read: plus,
                write: true,
                append: false,
                truncate: true,
                create: true,
                exclusive,
                cloexec,
            },
            'a' => OpenMode {
                read: plus,
                write: true,
                append: true,
                truncate: false,
                create: true,
                exclusive,
                cloexec,
            },
            _ => {
                return Err(Condition::ParameterValue {
                    message: format!("unknown open mode {mode:?}"),
                });
            }
        })
    }

    fn to_open_options(self) -> OpenOptions {
        let mut opts = OpenOptions::new();
        opts.read(self.read).write(self.write).append(self.append);
        if self.exclusive {
            opts.create_new(true);
        } else {
            opts.truncate(self.truncate).create(self.create);
        }
        opts
    }
}

/// How `get-char` handles an invalid UTF-8 byte sequence (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Replace with U+FFFD. Used for program source: a malformed
    /// comment or string literal shouldn't abort the whole read.
    Simple,
    /// Report the failure as a condition. Used for data channels, where
    /// silently substituting a replacement character would corrupt the
    /// guest's view of the bytes it asked to read.
    Extended,
}

/// What kind of underlying stream a handle wraps.
pub enum HandleStream {
    File(BufReader<File>),
    FileOut(BufWriter<File>),
    /// A guest string used as an input source (e.g. `with-input-from-string`).
    StringInput { bytes: Vec<u8>, pos: usize },
    /// A guest string being built as an output sink.
    StringOutput { bytes: Vec<u8> },
    /// A raw descriptor adopted for reading, never opened via
    /// `OpenOptions` — `open-file-from-fd`, `open-input-pipe`. Distinct
    /// from `File` because its provenance means no path exists to
    /// re-derive on error, and it is never seekable.
    PipeIn(BufReader<File>),
    /// The write-side counterpart of `PipeIn` — `open-output-pipe`.
    PipeOut(BufWriter<File>),
}

impl std::fmt::Debug for HandleStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandleStream::File(_) => write!(f, "HandleStream::File"),
            HandleStream::FileOut(_) => write!(f, "HandleStream::FileOut"),
            HandleStream::StringInput { pos, bytes } => {
                write!(f, "HandleStream::StringInput(pos={pos}, len={})", bytes.len())
            }
            HandleStream::StringOutput { bytes } => {
                write!(f, "HandleStream::StringOutput(len={})", bytes.len())
            }
            HandleStream::PipeIn(_) => write!(f, "HandleStream::PipeIn"),
            HandleStream::PipeOut(_) => write!(f, "HandleStream::PipeOut"),
        }
    }
}

/// An invalid byte sequence encountered mid-decode: U+FFFD in `Simple`
/// mode, a reported condition in `Extended` mode (§4.9).
fn invalid_utf8(name: &str, mode: DecodeMode) -> Result<Option<char>, Condition> {
    match mode {
        DecodeMode::Simple => Ok(Some('\u{FFFD}')),
        DecodeMode::Extended => Err(Condition::IoError {
            message: format!("{name}: invalid UTF-8 byte sequence"),
            errno: None,
        }),
    }
}

/// A file/pipe/string handle: the heap representation behind `HeapData::Handle`.
#[derive(Debug)]
pub struct HandleData {
    pub name: String,
    /// The resolved absolute path, distinct from `name` (the string the
    /// caller opened it with, which may be relative or a synthetic
    /// label like `"*stdin*"`). `None` for string and pipe handles,
    /// which have no filesystem path.
    pub pathname: Option<String>,
    pub mode: OpenMode,
    pub stream: HandleStream,
    /// One code point of read-ahead, populated by peek/unget (§9
    /// "Lookahead channel").
    pub lookahead: Option<char>,
    pub closed: bool,
    /// Whether the underlying descriptor is a terminal (`isatty`).
    pub interactive: bool,
    /// Whether the descriptor is marked close-on-exec.
    pub cloexec: bool,
    /// 1-based line number of the next unread character, advanced on
    /// every `\n` consumed via `get_char`.
    pub line: u32,
    /// Byte offset of the next unread (input) or just-written (output)
    /// position, tracked independently of `seek` so diagnostics survive
    /// handles that are never sought.
    pub byte_pos: u64,
    decode_mode: DecodeMode,
}

impl HandleData {
    pub fn open_file(path: &str, mode: &str) -> Result<Self, Condition> {
        Self::open_file_with_retry(path, mode, &mut || {})
    }

    /// Open a file, retrying once via `on_busy` when the process or
    /// system-wide descriptor table is exhausted (`EMFILE`/`ENFILE`).
    /// Callers wire `on_busy` to a garbage-collection pass so handles
    /// with no remaining guest references can drop their descriptors
    /// before the retry (§4.6: "file table exhaustion is recoverable by
    /// collecting garbage").
    pub fn open_file_with_retry(
        path: &str,
        mode: &str,
        on_busy: &mut dyn FnMut(),
    ) -> Result<Self, Condition> {
        let parsed = OpenMode::parse(mode)?;
        let file = match parsed.to_open_options().open(path) {
            Ok(f) => f,
            Err(e) if is_table_exhausted(&e) => {
                on_busy();
                parsed
                    .to_open_options()
                    .open(path)
                    .map_err(|e| Condition::from_io_error(path, &e))?
            }
            Err(e) => return Err(Condition::from_io_error(path, &e)),
        };
        apply_cloexec(&file, parsed.cloexec)?;
        let pathname = std::fs::canonicalize(path)
            .ok()
            .and_then(|p| p.to_str().map(str::to_string));
        let interactive = is_tty(&file);
        let stream = if parsed.write {
            HandleStream::FileOut(BufWriter::new(file))
        } else {
            HandleStream::File(BufReader::new(file))
        };
        Ok(HandleData {
            name: path.to_string(),
            pathname,
            mode: parsed,
            stream,
            lookahead: None,
            closed: false,
            interactive,
            cloexec: parsed.cloexec,
            line: 1,
            byte_pos: 0,
            decode_mode: DecodeMode::Extended,
        })
    }

    /// Open a file as program source: invalid UTF-8 is replaced with
    /// U+FFFD rather than reported (§4.9 "simple" mode).
    pub fn open_source_file(path: &str) -> Result<Self, Condition> {
        let mut h = Self::open_file(path, "r")?;
        h.decode_mode = DecodeMode::Simple;
        Ok(h)
    }

    /// Open a FIFO for writing in non-blocking mode. Per §4.6/§8, a
    /// FIFO opened write-only with no reader attached is not an error —
    /// the call returns `Ok(None)` (the guest sees `#f`) rather than
    /// raising, so the caller can retry or report normally.
    pub fn open_output_fifo(path: &str) -> Result<Option<Self>, Condition> {
        let c_path = std::ffi::CString::new(path).map_err(|_| Condition::ParameterValue {
            message: format!("{path}: path contains a NUL byte"),
        })?;
        let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_WRONLY | libc::O_NONBLOCK) };
        if fd == -1 {
            let err = std::io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::ENXIO) => Ok(None),
                _ => Err(Condition::from_io_error(path, &err)),
            };
        }
        let file = unsafe { File::from_raw_fd(fd) };
        apply_cloexec(&file, true)?;
        Ok(Some(HandleData {
            name: path.to_string(),
            pathname: Some(path.to_string()),
            mode: OpenMode {
                read: false,
                write: true,
                append: false,
                truncate: false,
                create: false,
                exclusive: false,
                cloexec: true,
            },
            stream: HandleStream::FileOut(BufWriter::new(file)),
            lookahead: None,
            closed: false,
            interactive: false,
            cloexec: true,
            line: 1,
            byte_pos: 0,
            decode_mode: DecodeMode::Extended,
        }))
    }

    /// Adopt an already-open descriptor as a handle (`open-file-from-fd`).
    ///
    /// # Safety
    /// `fd` must be a valid, currently-open descriptor not owned by any
    /// other `File`/handle; ownership transfers to the returned handle,
    /// which closes it on drop.
    pub unsafe fn open_file_from_fd(
        fd: RawFd,
        name: impl Into<String>,
        mode: &str,
    ) -> Result<Self, Condition> {
        let parsed = OpenMode::parse(mode)?;
        let file = unsafe { File::from_raw_fd(fd) };
        let interactive = is_tty(&file);
        let stream = if parsed.write {
            HandleStream::PipeOut(BufWriter::new(file))
        } else {
            HandleStream::PipeIn(BufReader::new(file))
        };
        Ok(HandleData {
            name: name.into(),
            pathname: None,
            mode: parsed,
            stream,
            lookahead: None,
            closed: false,
            interactive,
            cloexec: parsed.cloexec,
            line: 1,
            byte_pos: 0,
            decode_mode: DecodeMode::Extended,
        })
    }

    /// Wrap the read end of a pipe descriptor (`open-input-pipe`).
    ///
    /// # Safety
    /// See [`Self::open_file_from_fd`].
    pub unsafe fn open_input_pipe(fd: RawFd) -> Result<Self, Condition> {
        unsafe { Self::open_file_from_fd(fd, format!("pipe-in-fd-{fd}"), "r") }
    }

    /// Wrap the write end of a pipe descriptor (`open-output-pipe`).
    ///
    /// # Safety
    /// See [`Self::open_file_from_fd`].
    pub unsafe fn open_output_pipe(fd: RawFd) -> Result<Self, Condition> {
        unsafe { Self::open_file_from_fd(fd, format!("pipe-out-fd-{fd}"), "w") }
    }

    pub fn open_input_string(name: impl Into<String>, contents: String) -> Self {
        HandleData {
            name: name.into(),
            pathname: None,
            mode: OpenMode {
                read: true,
                write: false,
                append: false,
                truncate: false,
                create: false,
                exclusive: false,
                cloexec: false,
            },
            stream: HandleStream::StringInput {
                bytes: contents.into_bytes(),
                pos: 0,
            },
            lookahead: None,
            closed: false,
            interactive: false,
            cloexec: false,
            line: 1,
            byte_pos: 0,
            decode_mode: DecodeMode::Extended,
        }
    }

    pub fn open_output_string(name: impl Into<String>) -> Self {
        HandleData {
            name: name.into(),
            pathname: None,
            mode: OpenMode {
                read: false,
                write: true,
                append: false,
                truncate: true,
                create: true,
                exclusive: false,
                cloexec: false,
            },
            stream: HandleStream::StringOutput { bytes: Vec::new() },
            lookahead: None,
            closed: false,
            interactive: false,
            cloexec: false,
            line: 1,
            byte_pos: 0,
            decode_mode: DecodeMode::Extended,
        }
    }

    fn check_open(&self) -> Result<(), Condition> {
        if self.closed {
            Err(Condition::IoClosed)
        } else {
            Ok(())
        }
    }

    /// Read one code point, consulting and then clearing the lookahead.
    pub fn get_char(&mut self) -> Result<Option<char>, Condition> {
        self.check_open()?;
        let c = match self.lookahead.take() {
            Some(c) => Some(c),
            None => self.read_char_raw()?,
        };
        if let Some(ch) = c {
            self.byte_pos += ch.len_utf8() as u64;
            if ch == '\n' {
                self.line += 1;
            }
        }
        Ok(c)
    }

    /// Peek one code point without consuming it, populating the
    /// lookahead if it wasn't already set.
    pub fn peek_char(&mut self) -> Result<Option<char>, Condition> {
        self.check_open()?;
        if self.lookahead.is_none() {
            self.lookahead = self.read_char_raw()?;
        }
        Ok(self.lookahead)
    }

    /// Push a code point back onto the lookahead (`unget-char`).
    ///
    /// Per §4.6, only one code point of lookahead exists; a second
    /// `unget_char` without an intervening read is a parameter-value
    /// error rather than silently overwriting.
    pub fn unget_char(&mut self, c: char) -> Result<(), Condition> {
        if self.lookahead.is_some() {
            return Err(Condition::ParameterValue {
                message: "unget-char: lookahead slot already occupied".into(),
            });
        }
        self.lookahead = Some(c);
        Ok(())
    }

    fn read_char_raw(&mut self) -> Result<Option<char>, Condition> {
        let name = self.name.clone();
        let mode = self.decode_mode;
        match &mut self.stream {
            HandleStream::File(r) | HandleStream::PipeIn(r) => {
                let mut buf = [0u8; 4];
                let mut len = 0;
                loop {
                    let n = r
                        .read(&mut buf[len..len + 1])
                        .map_err(|e| Condition::from_io_error(&name, &e))?;
                    if n == 0 {
                        if len == 0 {
                            return Ok(None);
                        }
                        return invalid_utf8(&name, mode);
                    }
                    len += 1;
                    if let Ok(s) = std::str::from_utf8(&buf[..len]) {
                        return Ok(s.chars().next());
                    }
                    if len == 4 {
                        return invalid_utf8(&name, mode);
                    }
                }
            }
            HandleStream::StringInput { bytes, pos } => {
                if *pos >= bytes.len() {
                    return Ok(None);
                }
                match std::str::from_utf8(&bytes[*pos..]) {
                    Ok(rest) => {
                        let c = rest.chars().next().expect("non-empty checked above");
                        *pos += c.len_utf8();
                        Ok(Some(c))
                    }
                    Err(e) => {
                        // Advance past the malformed run so a `Simple`
                        // caller that keeps reading makes progress
                        // instead of looping on the same bytes.
                        *pos += e.valid_up_to().max(1);
                        invalid_utf8(&name, mode)
                    }
                }
            }
            HandleStream::FileOut(_) | HandleStream::StringOutput { .. } | HandleStream::PipeOut(_) => {
                Err(Condition::ParameterValue {
                    message: format!("{name}: handle is not open for reading"),
                })
            }
        }
    }

    pub fn write_str(&mut self, s: &str) -> Result<(), Condition> {
        self.check_open()?;
        let result = match &mut self.stream {
            HandleStream::FileOut(w) | HandleStream::PipeOut(w) => w
                .write_all(s.as_bytes())
                .map_err(|e| Condition::from_io_error(&self.name, &e)),
            HandleStream::StringOutput { bytes } => {
                bytes.extend_from_slice(s.as_bytes());
                Ok(())
            }
            HandleStream::File(_) | HandleStream::StringInput { .. } | HandleStream::PipeIn(_) => {
                Err(Condition::ParameterValue {
                    message: format!("{}: handle is not open for writing", self.name),
                })
            }
        };
        if result.is_ok() {
            self.byte_pos += s.len() as u64;
        }
        result
    }

    pub fn flush(&mut self) -> Result<(), Condition> {
        match &mut self.stream {
            HandleStream::FileOut(w) => w.flush().map_err(|e| Condition::from_io_error(&self.name, &e)),
            HandleStream::PipeOut(w) => w.flush().map_err(|e| Condition::from_io_error(&self.name, &e)),
            _ => Ok(()),
        }
    }

    /// Seek, clearing the lookahead (a seek invalidates any buffered
    /// read-ahead).
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64, Condition> {
        self.check_open()?;
        self.lookahead = None;
        match &mut self.stream {
            HandleStream::File(r) => r.seek(pos).map_err(|e| Condition::from_io_error(&self.name, &e)),
            HandleStream::FileOut(w) => w
                .seek(pos)
                .map_err(|e| Condition::from_io_error(&self.name, &e)),
            HandleStream::StringInput { bytes, pos: p } => {
                let new_pos = match pos {
                    SeekFrom::Start(n) => n as i64,
                    SeekFrom::End(n) => bytes.len() as i64 + n,
                    SeekFrom::Current(n) => *p as i64 + n,
                };
                if new_pos < 0 || new_pos as usize > bytes.len() {
                    return Err(Condition::ParameterValue {
                        message: "seek: position out of range".into(),
                    });
                }
                *p = new_pos as usize;
                Ok(*p as u64)
            }
            HandleStream::StringOutput { .. } => Err(Condition::ParameterValue {
                message: format!("{}: handle is not seekable", self.name),
            }),
            HandleStream::PipeIn(_) | HandleStream::PipeOut(_) => Err(Condition::ParameterValue {
                message: format!("{}: handle is not seekable", self.name),
            }),
        }
    }

    /// Close the handle. Idempotent in effect (a closed handle stays
    /// closed) but not in result: a second call raises *already-closed*
    /// rather than silently succeeding, since it signals a guest-code
    /// bug (double-closing a handle) rather than a harmless no-op.
    pub fn close(&mut self) -> Result<(), Condition> {
        if self.closed {
            return Err(Condition::AlreadyClosed {
                name: self.name.clone(),
            });
        }
        self.flush()?;
        self.closed = true;
        Ok(())
    }

    /// Contents of an output string handle (`get-output-string`).
    pub fn output_string(&self) -> Option<String> {
        match &self.stream {
            HandleStream::StringOutput { bytes } => String::from_utf8(bytes.clone()).ok(),
            _ => None,
        }
    }
}

fn is_table_exhausted(e: &std::io::Error) -> bool {
    matches!(e.raw_os_error(), Some(libc::EMFILE) | Some(libc::ENFILE))
}

fn is_tty(file: &File) -> bool {
    unsafe { libc::isatty(file.as_raw_fd()) == 1 }
}

/// Set or clear `FD_CLOEXEC` explicitly. Rust's `std::fs::File` sets it
/// by default on Unix, so clearing it (the no-`e` case) is the
/// meaningful half of this call — it lets a descriptor survive `exec`,
/// e.g. when handed to a child job.
fn apply_cloexec(file: &File, cloexec: bool) -> Result<(), Condition> {
    let fd = file.as_raw_fd();
    let flags = if cloexec { libc::FD_CLOEXEC } else { 0 };
    let r = unsafe { libc::fcntl(fd, libc::F_SETFD, flags) };
    if r == -1 {
        return Err(Condition::from_io_error("fcntl", &std::io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn mode_parse_basic_forms() {
        assert_eq!(
            OpenMode::parse("r").unwrap(),
            OpenMode {
                read: true,
                write: false,
                append: false,
                truncate: false,
                create: false,
                exclusive: false,
                cloexec: false,
            }
        );
        assert!(OpenMode::parse("w+").unwrap().read);
        assert!(OpenMode::parse("a").unwrap().append);
        assert!(OpenMode::parse("").is_err());
        assert!(OpenMode::parse("z").is_err());
    }

    #[test]
    fn mode_parse_accepts_e_and_x_in_either_order() {
        let m = OpenMode::parse("wex").unwrap();
        assert!(m.cloexec);
        assert!(m.exclusive);
        let m = OpenMode::parse("w+xe").unwrap();
        assert!(m.cloexec);
        assert!(m.exclusive);
        assert!(m.read);
    }

    #[test]
    fn string_input_get_and_peek() {
        let mut h = HandleData::open_input_string("test", "ab".to_string());
        assert_eq!(h.peek_char().unwrap(), Some('a'));
        assert_eq!(h.get_char().unwrap(), Some('a'));
        assert_eq!(h.get_char().unwrap(), Some('b'));
        assert_eq!(h.get_char().unwrap(), None);
    }

    #[test]
    fn unget_then_get_replays_char() {
        let mut h = HandleData::open_input_string("test", "xyz".to_string());
        let c = h.get_char().unwrap().unwrap();
        h.unget_char(c).unwrap();
        assert_eq!(h.get_char().unwrap(), Some(c));
    }

    #[test]
    fn double_unget_is_an_error() {
        let mut h = HandleData::open_input_string("test", "xyz".to_string());
        h.unget_char('a').unwrap();
        assert!(h.unget_char('b').is_err());
    }

    #[test]
    fn output_string_accumulates() {
        let mut h = HandleData::open_output_string("out");
        h.write_str("hello ").unwrap();
        h.write_str("world").unwrap();
        assert_eq!(h.output_string().unwrap(), "hello world");
    }

    #[test]
    fn closed_handle_rejects_io() {
        let mut h = HandleData::open_input_string("test", "abc".to_string());
        h.close().unwrap();
        assert!(matches!(h.get_char(), Err(Condition::IoClosed)));
    }

    #[test]
    fn second_close_is_an_error_not_a_silent_success() {
        let mut h = HandleData::open_input_string("test", "abc".to_string());
        h.close().unwrap();
        assert!(matches!(h.close(), Err(Condition::AlreadyClosed { .. })));
    }

    #[test]
    fn file_roundtrip_write_then_read() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        {
            let mut w = HandleData::open_file(path, "w").unwrap();
            w.write_str("hi there").unwrap();
            w.close().unwrap();
        }
        let mut r = HandleData::open_file(path, "r").unwrap();
        let mut s = String::new();
        while let Some(c) = r.get_char().unwrap() {
            s.push(c);
        }
        assert_eq!(s, "hi there");
        assert!(r.pathname.is_some());
    }

    #[test]
    fn missing_file_maps_to_file_not_found() {
        let err = HandleData::open_file("/nonexistent/path/to/file", "r").unwrap_err();
        assert!(matches!(err, Condition::FileNotFound { .. }));
    }

    #[test]
    fn exclusive_create_fails_if_file_exists() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap();
        let err = HandleData::open_file(path, "wx").unwrap_err();
        assert!(matches!(err, Condition::FileExists { .. }));
    }

    #[test]
    fn seek_clears_lookahead() {
        let mut h = HandleData::open_input_string("test", "abcdef".to_string());
        h.peek_char().unwrap();
        assert!(h.lookahead.is_some());
        h.seek(SeekFrom::Start(2)).unwrap();
        assert!(h.lookahead.is_none());
        assert_eq!(h.get_char().unwrap(), Some('c'));
    }

    #[test]
    fn line_and_byte_pos_advance_on_read() {
        let mut h = HandleData::open_input_string("test", "ab\ncd".to_string());
        assert_eq!(h.line, 1);
        h.get_char().unwrap();
        h.get_char().unwrap();
        assert_eq!(h.byte_pos, 2);
        h.get_char().unwrap(); // consumes the newline
        assert_eq!(h.line, 2);
        assert_eq!(h.byte_pos, 3);
    }

    #[test]
    fn extended_mode_reports_invalid_utf8() {
        let mut h = HandleData::open_input_string("test", String::new());
        // Bypass the `String`-typed constructor to inject a lone
        // continuation byte, which is never valid UTF-8 on its own.
        h.stream = HandleStream::StringInput { bytes: vec![0x80], pos: 0 };
        assert!(matches!(h.get_char(), Err(Condition::IoError { .. })));
    }

    #[test]
    fn simple_mode_replaces_with_replacement_character() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), [0x80u8]).unwrap();
        let mut h = HandleData::open_source_file(tmp.path().to_str().unwrap()).unwrap();
        assert_eq!(h.get_char().unwrap(), Some('\u{FFFD}'));
    }

    #[test]
    fn fifo_write_only_with_no_reader_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fifo");
        let c_path = std::ffi::CString::new(path.to_str().unwrap()).unwrap();
        let r = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
        assert_eq!(r, 0);
        let opened = HandleData::open_output_fifo(path.to_str().unwrap()).unwrap();
        assert!(opened.is_none());
    }
}
