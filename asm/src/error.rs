use arch::FormatVersion;
use color_print::cprintln;
use std::fmt;
use thiserror::Error;

/// Line and column in the source that produced an instruction, both 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
}

impl SourcePos {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A label that is referenced but never bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolved {
    pub name: String,
    /// First instruction referring to the label.
    pub index: usize,
    pub pos: Option<SourcePos>,
}

fn unresolved(labels: &[Unresolved]) -> String {
    labels
        .iter()
        .map(|u| format!("`{}` (instruction {})", u.name, u.index))
        .collect::<Vec<_>>()
        .join(", ")
}

fn at(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!(" at instruction {i}"),
        None => String::new(),
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Duplicate label: `{name}`")]
    DuplicateLabel {
        name: String,
        pos: Option<SourcePos>,
    },

    #[error("Unresolved label: {}", unresolved(.labels))]
    UnresolvedLabel { labels: Vec<Unresolved> },

    #[error("Layout did not converge within {passes} passes")]
    LayoutOverflow { passes: usize },

    #[error("Stack underflow at instruction {index}: depth {depth}, needs {needed}")]
    StackUnderflow {
        index: usize,
        pos: Option<SourcePos>,
        depth: u32,
        needed: u32,
    },

    #[error("Stack imbalance at instruction {index}: reached with depth {expected} and {found}")]
    StackImbalance {
        index: usize,
        pos: Option<SourcePos>,
        expected: u32,
        found: u32,
    },

    #[error("Not ready: {0}")]
    NotReady(&'static str),

    #[error("Unsupported operand{}: {reason}", at(.index))]
    UnsupportedOperand {
        index: Option<usize>,
        pos: Option<SourcePos>,
        reason: String,
    },
}

impl Error {
    pub(crate) fn unsupported(
        index: Option<usize>,
        pos: Option<SourcePos>,
        reason: impl Into<String>,
    ) -> Self {
        Error::UnsupportedOperand {
            index,
            pos,
            reason: reason.into(),
        }
    }

    /// Source position of the offending instruction or label, if one was recorded.
    pub fn pos(&self) -> Option<SourcePos> {
        match self {
            Error::DuplicateLabel { pos, .. }
            | Error::StackUnderflow { pos, .. }
            | Error::StackImbalance { pos, .. }
            | Error::UnsupportedOperand { pos, .. } => *pos,
            Error::UnresolvedLabel { labels } => labels.iter().find_map(|u| u.pos),
            Error::LayoutOverflow { .. } | Error::NotReady(_) => None,
        }
    }

    /// Print error with diagnostic information showing file location and line content
    pub fn print_diag(&self, file: &str, lines: &[String]) {
        cprintln!("<red,bold>error</>: {}", self);

        let Some(pos) = self.pos() else {
            return;
        };
        cprintln!("     <blue>--></> <underline>{}:{}</>", file, pos);
        cprintln!("      <blue>|</>");

        let line_content = lines
            .get((pos.line as usize).saturating_sub(1))
            .map(|s| s.as_str())
            .unwrap_or("");

        cprintln!(" <blue>{:>4} |</> {}", pos.line, line_content);
        let pad = " ".repeat((pos.column as usize).saturating_sub(1));
        cprintln!("      <blue>|</> {}<red,bold>^</>", pad);
    }
}

/// Errors raised while reading an artifact back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Unexpected end of input at byte {0}")]
    UnexpectedEof(usize),

    #[error("Unsupported format version tag: {0}")]
    UnsupportedVersion(u8),

    #[error("Unknown opcode 0x{code:02X} for {version} at offset {offset}")]
    UnknownOpcode {
        version: FormatVersion,
        code: u8,
        offset: usize,
    },

    #[error("Unknown constant tag: {0}")]
    UnknownConstant(u8),

    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("Jump at offset {offset} targets {target}, outside the code")]
    BadJumpTarget { offset: usize, target: i64 },

    #[error("Header declares {declared} instructions, code holds {found}")]
    CountMismatch { declared: u32, found: u32 },

    #[error("{0} trailing bytes")]
    TrailingBytes(usize),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
