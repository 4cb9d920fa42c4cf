//! Assembler for a stack-machine bytecode.
//!
//! A [`Unit`] collects instructions, labels and constants. [`Unit::finalize`] resolves
//! labels, picks the shortest encoding for every jump, checks the operand stack along
//! every path and serializes the result into a [`CodeArtifact`].
//!
//! ```
//! use arch::{FormatVersion, Opcode};
//! use stasm::Unit;
//!
//! let mut unit = Unit::new(FormatVersion::V2);
//! let done = unit.new_label("done").unwrap();
//! unit.push(1).unwrap();
//! unit.jump_to(Opcode::JumpIfFalse, done).unwrap();
//! unit.push(0).unwrap();
//! unit.bind_label(done).unwrap();
//! unit.op(Opcode::Return).unwrap();
//!
//! let artifact = unit.finalize().unwrap();
//! assert_eq!(artifact.instruction_count(), 4);
//! ```

mod artifact;
mod config;
mod decode;
mod encode;
mod error;
mod format;
mod label;
mod layout;
mod listing;
mod pool;
mod stack;
mod unit;

pub use artifact::{ArtifactInfo, CodeArtifact, HEADER_LEN};
pub use config::AsmConfig;
pub use decode::{decode, Decoded, DecodedInstr, DecodedOperand};
pub use encode::Assembly;
pub use error::{DecodeError, Error, Result, SourcePos, Unresolved};
pub use format::{Reader, Writer};
pub use label::{Label, Labels};
pub use layout::Layout;
pub use listing::{disassemble, print_dump};
pub use pool::{ConstId, Constant, NameId, Pool};
pub use stack::{validate, StackReport};
pub use unit::{Instruction, Operand, Unit};
