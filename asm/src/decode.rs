use crate::error::{DecodeError, SourcePos};
use crate::format::Reader;
use crate::pool::Constant;
use arch::{ConstKind, FormatVersion, Opcode, OperandKind, Width};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedOperand {
    Imm(i64),
    Const(u32),
    Name(u32),
    Local(u32),
    Count(u32),
    /// Absolute byte offset of the jump target.
    Target(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstr {
    pub offset: u32,
    pub opcode: Opcode,
    pub width: Option<Width>,
    pub operand: Option<DecodedOperand>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub version: FormatVersion,
    pub max_stack_depth: u32,
    pub code_len: u32,
    pub instructions: Vec<DecodedInstr>,
    pub constants: Vec<Constant>,
    pub names: Vec<String>,
    pub labels: Vec<(String, u32)>,
    pub spans: Vec<(u32, SourcePos)>,
}

/// Parses an artifact produced by [`Unit::finalize`](crate::Unit::finalize).
pub fn decode(bytes: &[u8]) -> Result<Decoded, DecodeError> {
    let mut r = Reader::new(bytes);
    let tag = r.u8()?;
    let version = FormatVersion::try_from(tag).map_err(|_| DecodeError::UnsupportedVersion(tag))?;
    let table = version.table();
    let max_stack_depth = r.u32()?;
    let declared = r.u32()?;
    let code_len = r.u32()?;

    let code = r.take(code_len as usize)?;
    let mut instructions = vec![];
    let mut pc = 0;
    while pc < code.len() {
        let code_byte = code[pc];
        let enc = table.encoding(code_byte).ok_or(DecodeError::UnknownOpcode {
            version,
            code: code_byte,
            offset: pc,
        })?;
        let operand_at = pc + 1;
        let end = operand_at + enc.width.map_or(0, |w| w.bytes());
        let operand = match (enc.opcode.operand(), enc.width) {
            (Some(kind), Some(width)) => {
                let v = width
                    .decode(&code[operand_at..], kind.is_signed())
                    .ok_or(DecodeError::UnexpectedEof(r.offset() - code.len() + operand_at))?;
                Some(decode_operand(kind, v, pc, end, code.len())?)
            }
            _ => None,
        };
        instructions.push(DecodedInstr {
            offset: pc as u32,
            opcode: enc.opcode,
            width: enc.width,
            operand,
        });
        pc = end;
    }
    if instructions.len() != declared as usize {
        return Err(DecodeError::CountMismatch {
            declared,
            found: instructions.len() as u32,
        });
    }

    let mut constants = vec![];
    for _ in 0..r.u32()? {
        let tag = r.u8()?;
        let kind = ConstKind::try_from(tag).map_err(|_| DecodeError::UnknownConstant(tag))?;
        constants.push(match kind {
            ConstKind::Int => Constant::Int(r.u64()? as i64),
            ConstKind::Float => Constant::Float(f64::from_bits(r.u64()?)),
            ConstKind::Bool => Constant::Bool(r.u8()? != 0),
            ConstKind::Str => Constant::Str(r.str("string constant")?.to_string()),
            ConstKind::Bytes => Constant::Bytes(r.blob()?.to_vec()),
        });
    }

    let mut names = vec![];
    for _ in 0..r.u32()? {
        names.push(r.str("name")?.to_string());
    }

    let mut labels = vec![];
    for _ in 0..r.u32()? {
        let name = r.str("label")?.to_string();
        labels.push((name, r.u32()?));
    }

    let mut spans = vec![];
    for _ in 0..r.u32()? {
        let offset = r.u32()?;
        let line = r.u32()?;
        let column = r.u32()?;
        spans.push((offset, SourcePos { line, column }));
    }

    if r.remaining() > 0 {
        return Err(DecodeError::TrailingBytes(r.remaining()));
    }

    Ok(Decoded {
        version,
        max_stack_depth,
        code_len,
        instructions,
        constants,
        names,
        labels,
        spans,
    })
}

fn decode_operand(
    kind: OperandKind,
    v: i64,
    at: usize,
    end: usize,
    code_len: usize,
) -> Result<DecodedOperand, DecodeError> {
    Ok(match kind {
        OperandKind::Imm => DecodedOperand::Imm(v),
        OperandKind::Const => DecodedOperand::Const(v as u32),
        OperandKind::Name => DecodedOperand::Name(v as u32),
        OperandKind::Local => DecodedOperand::Local(v as u32),
        OperandKind::Count => DecodedOperand::Count(v as u32),
        OperandKind::Label => {
            let target = end as i64 + v;
            if target < 0 || target > code_len as i64 {
                return Err(DecodeError::BadJumpTarget { offset: at, target });
            }
            DecodedOperand::Target(target as u32)
        }
    })
}

impl Decoded {
    /// Instruction starting at byte `offset`.
    pub fn at(&self, offset: u32) -> Option<&DecodedInstr> {
        self.instructions
            .binary_search_by_key(&offset, |i| i.offset)
            .ok()
            .map(|i| &self.instructions[i])
    }

    pub fn label(&self, name: &str) -> Option<u32> {
        self.labels.iter().find(|(n, _)| n == name).map(|(_, o)| *o)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_version() {
        assert_eq!(
            decode(&[9, 0, 0, 0, 0]),
            Err(DecodeError::UnsupportedVersion(9))
        );
    }

    #[test]
    fn rejects_truncated_header() {
        assert_eq!(decode(&[1, 0, 0]), Err(DecodeError::UnexpectedEof(1)));
    }

    fn empty_tail() -> Vec<u8> {
        [0u32; 4].iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn rejects_unknown_opcode() {
        // V3 leaves 0x00 unassigned.
        let mut bytes = vec![3, 0, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 0x00];
        bytes.extend(empty_tail());
        assert_eq!(
            decode(&bytes),
            Err(DecodeError::UnknownOpcode {
                version: FormatVersion::V3,
                code: 0,
                offset: 0
            })
        );
    }

    #[test]
    fn rejects_jump_outside_code() {
        let table = FormatVersion::V1.table();
        let jump = table
            .code(arch::Encoding {
                opcode: Opcode::Jump,
                width: Some(Width::W8),
            })
            .unwrap();
        let mut bytes = vec![1, 0, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, jump, 5];
        bytes.extend(empty_tail());
        assert_eq!(
            decode(&bytes),
            Err(DecodeError::BadJumpTarget {
                offset: 0,
                target: 7
            })
        );
    }

    #[test]
    fn rejects_count_mismatch() {
        let mut bytes = vec![2, 0, 0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0, 0x00];
        bytes.extend(empty_tail());
        assert_eq!(
            decode(&bytes),
            Err(DecodeError::CountMismatch {
                declared: 2,
                found: 1
            })
        );
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = vec![2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        bytes.extend(empty_tail());
        bytes.push(0xAA);
        assert_eq!(decode(&bytes), Err(DecodeError::TrailingBytes(1)));
    }
}
