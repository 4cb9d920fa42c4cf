use crate::artifact::CodeArtifact;
use crate::decode::{Decoded, DecodedInstr, DecodedOperand};
use crate::error::DecodeError;
use crate::unit::{Instruction, Operand, Unit};
use color_print::cformat;
use std::collections::HashMap;

impl Unit {
    /// Operand as written in a listing.
    fn operand_text(&self, operand: &Operand) -> String {
        match operand {
            Operand::Imm(v) => v.to_string(),
            Operand::Const(id) => self
                .constants()
                .get(id.index())
                .map_or_else(|| format!("#{}", id.index()), |c| c.to_string()),
            Operand::Name(id) => self
                .names()
                .get(id.index())
                .cloned()
                .unwrap_or_else(|| format!("#{}", id.index())),
            Operand::Local(v) => format!("${v}"),
            Operand::Count(v) => v.to_string(),
            Operand::Label(l) => self
                .labels()
                .name(*l)
                .map_or_else(|| format!("#{}", l.index()), |n| n.to_string()),
        }
    }

    fn default_comment(&self, inst: &Instruction) -> String {
        let name = inst.opcode.to_string().to_uppercase();
        match &inst.operand {
            None => format!("{name} operation."),
            Some(o) => format!("{name} operand {}.", self.operand_text(o)),
        }
    }

    /// Assembly text of the unit: one line per label and per instruction.
    pub fn listing(&self) -> String {
        let config = self.config();
        let mut marks: HashMap<usize, Vec<&str>> = HashMap::new();
        for (name, at) in self.labels().bound() {
            marks.entry(at).or_default().push(name);
        }

        let mut out = String::new();
        for index in 0..=self.len() {
            for name in marks.get(&index).into_iter().flatten() {
                out.push_str(&format!("{name}:\n"));
            }
            let Some(inst) = self.instructions().get(index) else {
                break;
            };
            let mut line = format!("{}{}", config.indent, inst.opcode);
            if let Some(o) = &inst.operand {
                line.push(' ');
                line.push_str(&self.operand_text(o));
            }
            if config.comments {
                let comment = self
                    .comment_at(index)
                    .map_or_else(|| self.default_comment(inst), |c| c.to_string());
                line.push_str(&format!("  ; {comment}"));
            }
            out.push_str(&line);
            out.push('\n');
        }
        out
    }
}

// ----------------------------------------------------------------------------
// Disassembly

fn operand_text(decoded: &Decoded, operand: &DecodedOperand, labels: &HashMap<u32, &str>) -> String {
    match operand {
        DecodedOperand::Imm(v) => v.to_string(),
        DecodedOperand::Const(i) => decoded
            .constants
            .get(*i as usize)
            .map_or_else(|| format!("#{i}"), |c| c.to_string()),
        DecodedOperand::Name(i) => decoded
            .names
            .get(*i as usize)
            .cloned()
            .unwrap_or_else(|| format!("#{i}")),
        DecodedOperand::Local(v) => format!("${v}"),
        DecodedOperand::Count(v) => v.to_string(),
        DecodedOperand::Target(t) => match labels.get(t) {
            Some(name) => name.to_string(),
            None => format!("0x{t:04X}"),
        },
    }
}

fn label_map(decoded: &Decoded) -> HashMap<u32, &str> {
    let mut map = HashMap::new();
    for (name, offset) in &decoded.labels {
        map.entry(*offset).or_insert(name.as_str());
    }
    map
}

/// Plain-text disassembly with byte offsets.
pub fn disassemble(decoded: &Decoded) -> String {
    let labels = label_map(decoded);
    let mut out = String::new();
    for inst in &decoded.instructions {
        for (name, offset) in &decoded.labels {
            if *offset == inst.offset {
                out.push_str(&format!("{name}:\n"));
            }
        }
        out.push_str(&format!("{:04X}    {}", inst.offset, inst.opcode));
        if let Some(o) = &inst.operand {
            out.push(' ');
            out.push_str(&operand_text(decoded, o, &labels));
        }
        out.push('\n');
    }
    out
}

impl DecodedInstr {
    pub fn cformat(&self, decoded: &Decoded) -> String {
        let labels = label_map(decoded);
        let op = cformat!("<r>{:<18}</>", self.opcode);
        match &self.operand {
            None => op,
            Some(o @ DecodedOperand::Target(_)) => {
                cformat!("{} <m>{}</>", op, operand_text(decoded, o, &labels))
            }
            Some(o @ (DecodedOperand::Const(_) | DecodedOperand::Name(_))) => {
                cformat!("{} <c>{}</>", op, operand_text(decoded, o, &labels))
            }
            Some(o) => cformat!("{} <y>{}</>", op, operand_text(decoded, o, &labels)),
        }
    }
}

/// Prints a colored dump of an artifact: header, then offset, bytes and instruction.
pub fn print_dump(artifact: &CodeArtifact) -> Result<(), DecodeError> {
    let decoded = artifact.decode()?;
    let code = artifact.code();
    println!(
        "+-[{}]-+ depth {} | {} instructions | {} bytes",
        decoded.version,
        decoded.max_stack_depth,
        decoded.instructions.len(),
        decoded.code_len
    );
    for (i, inst) in decoded.instructions.iter().enumerate() {
        for (name, offset) in &decoded.labels {
            if *offset == inst.offset {
                println!("{}", cformat!("|          <g>{}:</>", name));
            }
        }
        let start = inst.offset as usize;
        let end = decoded
            .instructions
            .get(i + 1)
            .map_or(code.len(), |next| next.offset as usize);
        let bytes = code[start..end]
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!("| {:04X} : {:<26} {}", inst.offset, bytes, inst.cformat(&decoded));
    }
    println!("+------------------------------------------------------------------------");
    Ok(())
}
