//! Foundation crate for the Idio bytecode core: the tagged value
//! representation, the varuint codec, and the instruction buffer.
//!
//! This crate has no knowledge of the heap (that lives in `idio-runtime`)
//! and no knowledge of opcodes (that lives in `idio-codegen`); it is the
//! dependency-free bottom of the stack both build on.

pub mod instr_buf;
pub mod tagged;
pub mod varuint;

pub use instr_buf::InstrBuf;
pub use tagged::{Constant, ConstantSpace, HeapRef, Immediate, Value};
pub use varuint::VaruintError;
