pub mod emitter;
pub mod error;
pub mod meaning;
pub mod opcode;

pub use emitter::Emitter;
pub use error::{CodeGenError, CodingError};
pub use meaning::{Kind, Meaning, RefTable};
pub use opcode::Opcode;
