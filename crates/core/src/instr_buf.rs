//! Instruction buffer: a growable byte vector used while assembling one
//! bytecode fragment (§4.2).
//!
//! Buffers are strictly owned by the emitter that created them and are
//! released on normal completion or error exit of that emitter — in Rust
//! terms, that's just `Drop`, so there is no explicit `free` call; the
//! type exists to give the growth-by-half-capacity policy and the
//! used-vs-capacity distinction a stable home, matching the layout the
//! spec's VM-facing documentation describes.

use crate::varuint;

/// A growable byte buffer tracking used size distinctly from capacity.
///
/// `Vec<u8>` already tracks len/capacity, but exposes neither the
/// half-capacity growth policy nor a `copy_over` operation that appends a
/// `Null`-able source buffer as a no-op; `InstrBuf` wraps `Vec<u8>` to
/// make those semantics explicit and testable in isolation.
#[derive(Debug, Clone, Default)]
pub struct InstrBuf {
    bytes: Vec<u8>,
}

impl InstrBuf {
    /// Create a buffer with the given initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        InstrBuf {
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// Create an empty buffer.
    pub fn new() -> Self {
        InstrBuf::with_capacity(0)
    }

    /// Number of bytes used so far.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Current capacity.
    pub fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    /// The bytes assembled so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Push a single byte, growing by half the current capacity if the
    /// backing store is full.
    pub fn push(&mut self, byte: u8) {
        self.reserve_for(1);
        self.bytes.push(byte);
    }

    /// Push a varuint-encoded non-negative integer.
    pub fn push_varuint(&mut self, n: u64) {
        let mut tmp = Vec::with_capacity(9);
        varuint::encode(n, &mut tmp);
        self.append_bytes(&tmp);
    }

    /// Push a fixed-width big-endian 16-bit unsigned integer (used for the
    /// constants-reference slot, §4.3).
    pub fn push_fixed2(&mut self, n: u16) {
        let mut tmp = Vec::with_capacity(2);
        varuint::encode_fixed2(n, &mut tmp);
        self.append_bytes(&tmp);
    }

    /// Append another buffer's used prefix to this one.
    ///
    /// Appending an empty buffer is a no-op, matching the spec's "appending
    /// a null buffer is a no-op".
    pub fn append(&mut self, other: &InstrBuf) {
        self.append_bytes(other.as_slice());
    }

    fn append_bytes(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.reserve_for(data.len());
        self.bytes.extend_from_slice(data);
    }

    /// Copy another buffer's content into this one, overwriting from the
    /// current end, preserving the source's used size (i.e. behaviorally
    /// identical to `append` for this append-only model).
    pub fn copy_over(&mut self, other: &InstrBuf) {
        self.append(other);
    }

    /// Grow capacity by half the current capacity (at least enough to fit
    /// `additional` more bytes).
    fn reserve_for(&mut self, additional: usize) {
        let needed = self.bytes.len() + additional;
        if needed <= self.bytes.capacity() {
            return;
        }
        let grown = self.bytes.capacity() + self.bytes.capacity() / 2;
        let target = grown.max(needed).max(8);
        self.bytes.reserve(target - self.bytes.len());
    }

    /// Consume the buffer, returning its bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }
}

impl From<InstrBuf> for Vec<u8> {
    fn from(buf: InstrBuf) -> Self {
        buf.into_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_tracks_used_size() {
        let mut buf = InstrBuf::new();
        buf.push(1);
        buf.push(2);
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.as_slice(), &[1, 2]);
    }

    #[test]
    fn append_empty_is_noop() {
        let mut buf = InstrBuf::new();
        buf.push(0xAA);
        let empty = InstrBuf::new();
        buf.append(&empty);
        assert_eq!(buf.as_slice(), &[0xAA]);
    }

    #[test]
    fn append_preserves_source_used_size() {
        let mut src = InstrBuf::with_capacity(16);
        src.push(1);
        src.push(2);
        src.push(3);
        let mut dst = InstrBuf::new();
        dst.append(&src);
        assert_eq!(dst.len(), 3);
        assert_eq!(src.len(), 3, "source buffer's used size is unaffected");
        assert_eq!(dst.as_slice(), src.as_slice());
    }

    #[test]
    fn capacity_grows_by_half() {
        let mut buf = InstrBuf::with_capacity(8);
        for i in 0..8u8 {
            buf.push(i);
        }
        let cap_before = buf.capacity();
        buf.push(8);
        assert!(buf.capacity() > cap_before);
    }

    #[test]
    fn varuint_and_fixed_roundtrip_via_decode() {
        let mut buf = InstrBuf::new();
        buf.push_varuint(42);
        buf.push_fixed2(0xBEEF);
        let bytes = buf.as_slice();
        let (v, len) = varuint::decode(bytes).unwrap();
        assert_eq!(v, 42);
        assert_eq!(varuint::decode_fixed2(&bytes[len..]).unwrap(), 0xBEEF);
    }

    #[test]
    fn copy_over_appends() {
        let mut a = InstrBuf::new();
        a.push(1);
        let mut b = InstrBuf::new();
        b.push(2);
        b.copy_over(&a);
        assert_eq!(b.as_slice(), &[2, 1]);
    }
}
