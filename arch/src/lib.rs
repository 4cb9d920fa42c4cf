//! Instruction set of the stack machine and the binary format revisions that encode it.

pub mod op;
pub mod version;
pub mod width;

pub use op::{Edge, Effect, Flow, Opcode, OperandKind, StackEffect};
pub use version::{ConstKind, Encoding, FormatVersion, Rule, VersionTable};
pub use width::Width;
