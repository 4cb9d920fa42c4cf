use crate::op::{Opcode, OperandKind, StackEffect};
use crate::width::Width;
use bimap::BiMap;
use indexmap::IndexMap;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator};

/// Binary format revision. The tag is the first byte of every artifact.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    IntoPrimitive,
    TryFromPrimitive,
    EnumIter,
    Display,
)]
#[repr(u8)]
pub enum FormatVersion {
    /// 16-bit operands.
    V1 = 1,
    /// 32-bit operands, float constants.
    #[default]
    V2 = 2,
    /// 64-bit immediates, byte-string constants.
    V3 = 3,
}

/// Constant pool entry type, also its tag byte in the artifact.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    IntoPrimitive,
    TryFromPrimitive,
    Display,
)]
#[repr(u8)]
#[strum(serialize_all = "snake_case")]
pub enum ConstKind {
    Int = 1,
    Float = 2,
    Bool = 3,
    Str = 4,
    Bytes = 5,
}

impl FormatVersion {
    pub fn tag(self) -> u8 {
        self.into()
    }

    pub fn table(self) -> &'static VersionTable {
        match self {
            FormatVersion::V1 => &V1,
            FormatVersion::V2 => &V2,
            FormatVersion::V3 => &V3,
        }
    }

    /// Size classes available to `kind`, narrowest first.
    pub fn widths(self, kind: OperandKind) -> &'static [Width] {
        use OperandKind::*;
        use Width::*;
        match (self, kind) {
            (FormatVersion::V1, Imm | Label) => &[W8, W16],
            (FormatVersion::V1, Const | Name) => &[W16],
            (FormatVersion::V1, Local | Count) => &[W8],
            (FormatVersion::V2, Imm) => &[W8, W16, W32],
            (FormatVersion::V2, Label) => &[W8, W16, W32],
            (FormatVersion::V3, Imm) => &[W8, W16, W32, W64],
            (FormatVersion::V3, Label) => &[W8, W32],
            (FormatVersion::V2 | FormatVersion::V3, Const | Name) => &[W8, W32],
            (FormatVersion::V2 | FormatVersion::V3, Local) => &[W8, W16],
            (FormatVersion::V2 | FormatVersion::V3, Count) => &[W8],
        }
    }

    pub fn supports(self, kind: ConstKind) -> bool {
        match kind {
            ConstKind::Int | ConstKind::Bool | ConstKind::Str => true,
            ConstKind::Float => self != FormatVersion::V1,
            ConstKind::Bytes => self == FormatVersion::V3,
        }
    }
}

// ----------------------------------------------------------------------------
// Tables

/// An opcode at a concrete operand width. `width` is `None` for opcodes without operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Encoding {
    pub opcode: Opcode,
    pub width: Option<Width>,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub operand: Option<OperandKind>,
    pub widths: &'static [Width],
    pub effect: StackEffect,
}

impl Rule {
    /// Narrowest width holding `v`.
    pub fn fit(&self, v: i64) -> Option<Width> {
        let signed = self.operand.is_some_and(|k| k.is_signed());
        self.widths.iter().copied().find(|w| w.fits(v, signed))
    }

    /// Narrowest width holding `v` that is not narrower than `current`.
    pub fn grow(&self, current: Width, v: i64) -> Option<Width> {
        let signed = self.operand.is_some_and(|k| k.is_signed());
        self.widths
            .iter()
            .copied()
            .filter(|w| *w >= current)
            .find(|w| w.fits(v, signed))
    }

    pub fn narrowest(&self) -> Option<Width> {
        self.widths.first().copied()
    }
}

#[derive(Debug)]
pub struct VersionTable {
    version: FormatVersion,
    rules: IndexMap<Opcode, Rule>,
    codes: BiMap<Encoding, u8>,
}

impl VersionTable {
    pub fn version(&self) -> FormatVersion {
        self.version
    }

    pub fn rule(&self, opcode: Opcode) -> Option<&Rule> {
        self.rules.get(&opcode)
    }

    pub fn code(&self, enc: Encoding) -> Option<u8> {
        self.codes.get_by_left(&enc).copied()
    }

    pub fn encoding(&self, code: u8) -> Option<Encoding> {
        self.codes.get_by_right(&code).copied()
    }

    /// Encoded size of an instruction whose operand has `width`.
    pub fn size(&self, width: Option<Width>) -> usize {
        1 + width.map_or(0, |w| w.bytes())
    }
}

enum Numbering {
    /// One byte per (opcode, width), sequential in declaration order.
    Dense { start: u8 },
    /// Plain opcodes sequential from `plain`; operand opcodes get a band of four
    /// bytes from `banded`, indexed by width code.
    Banded { plain: u8, banded: u8 },
}

fn build(version: FormatVersion, numbering: Numbering) -> VersionTable {
    let mut rules = IndexMap::new();
    let mut codes = BiMap::new();
    let (mut plain, mut banded) = match numbering {
        Numbering::Dense { start } => (start, start),
        Numbering::Banded { plain, banded } => (plain, banded),
    };
    let dense = matches!(numbering, Numbering::Dense { .. });

    for opcode in Opcode::iter() {
        let operand = opcode.operand();
        let widths: &'static [Width] = match operand {
            Some(kind) => version.widths(kind),
            None => &[],
        };
        match operand {
            None => {
                codes.insert(Encoding { opcode, width: None }, plain);
                plain += 1;
            }
            Some(_) if dense => {
                for w in widths {
                    codes.insert(Encoding { opcode, width: Some(*w) }, plain);
                    plain += 1;
                }
            }
            Some(_) => {
                for w in widths {
                    codes.insert(Encoding { opcode, width: Some(*w) }, banded + u8::from(*w));
                }
                banded += 4;
            }
        }
        rules.insert(
            opcode,
            Rule {
                operand,
                widths,
                effect: opcode.effect(),
            },
        );
    }

    VersionTable {
        version,
        rules,
        codes,
    }
}

static V1: Lazy<VersionTable> =
    Lazy::new(|| build(FormatVersion::V1, Numbering::Dense { start: 0x00 }));

static V2: Lazy<VersionTable> = Lazy::new(|| {
    build(
        FormatVersion::V2,
        Numbering::Banded {
            plain: 0x00,
            banded: 0x80,
        },
    )
});

static V3: Lazy<VersionTable> = Lazy::new(|| {
    build(
        FormatVersion::V3,
        Numbering::Banded {
            plain: 0x01,
            banded: 0x40,
        },
    )
});
