//! Operand width selection and byte offsets.
//!
//! Jumps start at their narrowest width. Each pass recomputes offsets and widens every
//! jump whose displacement no longer fits. Widths only grow, so the number of passes is
//! bounded by the number of size classes the jumps can still climb.

use crate::error::{Error, Result};
use crate::unit::{Instruction, Operand};
use arch::{VersionTable, Width};
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    widths: Vec<Option<Width>>,
    // One entry per instruction plus the end of the code.
    offsets: Vec<usize>,
    passes: usize,
}

impl Layout {
    /// `targets` is the binding position of each label, by label index.
    pub fn resolve(
        table: &VersionTable,
        insts: &[Instruction],
        targets: &[Option<usize>],
        max_passes: Option<usize>,
    ) -> Result<Self> {
        let mut widths = Vec::with_capacity(insts.len());
        let mut growth = 0;
        for (i, inst) in insts.iter().enumerate() {
            let Some(operand) = inst.operand else {
                widths.push(None);
                continue;
            };
            let rule = table.rule(inst.opcode).ok_or_else(|| {
                Error::unsupported(Some(i), inst.pos, format!("`{}` has no encoding", inst.opcode))
            })?;
            let width = match operand.value() {
                Some(v) => rule.fit(v),
                None => {
                    growth += rule.widths.len().saturating_sub(1);
                    rule.narrowest()
                }
            };
            let Some(width) = width else {
                return Err(Error::unsupported(
                    Some(i),
                    inst.pos,
                    format!("no {} width holds the operand of `{}`", table.version(), inst.opcode),
                ));
            };
            widths.push(Some(width));
        }

        let bound = match max_passes {
            Some(cap) => cap.min(growth + 1),
            None => growth + 1,
        };

        let mut layout = Layout {
            widths,
            offsets: vec![],
            passes: 0,
        };
        loop {
            if layout.passes >= bound {
                return Err(Error::LayoutOverflow { passes: bound });
            }
            layout.passes += 1;
            layout.offsets = offsets(table, &layout.widths);
            if !layout.grow(table, insts, targets)? {
                return Ok(layout);
            }
        }
    }

    // Widens every jump that does not fit. Returns whether anything changed.
    fn grow(
        &mut self,
        table: &VersionTable,
        insts: &[Instruction],
        targets: &[Option<usize>],
    ) -> Result<bool> {
        let mut changed = false;
        for (i, inst) in insts.iter().enumerate() {
            let Some(Operand::Label(label)) = inst.operand else {
                continue;
            };
            let Some(target) = targets.get(label.index()).copied().flatten() else {
                return Err(Error::unsupported(
                    Some(i),
                    inst.pos,
                    format!("label #{} has no position", label.index()),
                ));
            };
            let Some(current) = self.widths[i] else {
                continue;
            };
            let disp = self.displacement(i, target);
            if current.fits_signed(disp) {
                continue;
            }
            let grown = table
                .rule(inst.opcode)
                .and_then(|rule| rule.grow(current, disp))
                .ok_or_else(|| {
                    Error::unsupported(
                        Some(i),
                        inst.pos,
                        format!(
                            "jump displacement {disp} exceeds the widest {} label operand",
                            table.version()
                        ),
                    )
                })?;
            trace!(index = i, from = %current, to = %grown, disp, "widen jump");
            self.widths[i] = Some(grown);
            changed = true;
        }
        Ok(changed)
    }

    /// Displacement from the end of instruction `from` to the start of instruction `to`.
    pub fn displacement(&self, from: usize, to: usize) -> i64 {
        self.offsets[to] as i64 - self.offsets[from + 1] as i64
    }

    pub fn offset(&self, index: usize) -> usize {
        self.offsets[index]
    }

    pub fn width(&self, index: usize) -> Option<Width> {
        self.widths[index]
    }

    pub fn code_len(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    pub fn passes(&self) -> usize {
        self.passes
    }
}

fn offsets(table: &VersionTable, widths: &[Option<Width>]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(widths.len() + 1);
    let mut pc = 0;
    offsets.push(pc);
    for w in widths {
        pc += table.size(*w);
        offsets.push(pc);
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::Unit;
    use arch::{FormatVersion, Opcode};

    fn resolve(unit: &Unit, max_passes: Option<usize>) -> Result<Layout> {
        let targets = unit.labels().resolve_all(|_| None)?;
        Layout::resolve(
            unit.version().table(),
            unit.instructions(),
            &targets,
            max_passes,
        )
    }

    // `jump L; nop * n; L:` in the given version.
    fn forward(version: FormatVersion, n: usize) -> Unit {
        let mut unit = Unit::new(version);
        let l = unit.new_label("L").unwrap();
        unit.jump_to(Opcode::Jump, l).unwrap();
        for _ in 0..n {
            unit.op(Opcode::Nop).unwrap();
        }
        unit.bind_label(l).unwrap();
        unit
    }

    #[test]
    fn short_form_at_boundary() {
        let layout = resolve(&forward(FormatVersion::V2, 127), None).unwrap();
        assert_eq!(layout.width(0), Some(Width::W8));
        assert_eq!(layout.displacement(0, 128), 127);
        assert_eq!(layout.passes(), 1);
    }

    #[test]
    fn long_form_past_boundary() {
        let layout = resolve(&forward(FormatVersion::V2, 128), None).unwrap();
        assert_eq!(layout.width(0), Some(Width::W16));
        assert_eq!(layout.offset(1), 3);
        assert_eq!(layout.code_len(), 131);
        assert_eq!(layout.passes(), 2);
    }

    #[test]
    fn skips_missing_class() {
        let layout = resolve(&forward(FormatVersion::V3, 200), None).unwrap();
        assert_eq!(layout.width(0), Some(Width::W32));
    }

    #[test]
    fn backward_jump() {
        let mut unit = Unit::new(FormatVersion::V2);
        let top = unit.new_label("top").unwrap();
        unit.bind_label(top).unwrap();
        unit.op(Opcode::Nop).unwrap();
        unit.jump_to(Opcode::Jump, top).unwrap();
        let layout = resolve(&unit, None).unwrap();
        assert_eq!(layout.displacement(1, 0), -3);
        assert_eq!(layout.width(1), Some(Width::W8));
    }

    #[test]
    fn long_backward_jump() {
        let mut unit = Unit::new(FormatVersion::V2);
        let top = unit.new_label("top").unwrap();
        unit.bind_label(top).unwrap();
        for _ in 0..300 {
            unit.op(Opcode::Nop).unwrap();
        }
        unit.jump_to(Opcode::Jump, top).unwrap();
        let layout = resolve(&unit, None).unwrap();
        assert_eq!(layout.width(300), Some(Width::W16));
        assert_eq!(layout.displacement(300, 0), -303);
        assert_eq!(layout.passes(), 2);
    }

    #[test]
    fn cascading_growth() {
        // The jump to `near` spans the jump to `far` and overflows only after it grows.
        let mut unit = Unit::new(FormatVersion::V2);
        let near = unit.new_label("near").unwrap();
        let far = unit.new_label("far").unwrap();
        unit.jump_to(Opcode::Jump, near).unwrap();
        unit.jump_to(Opcode::Jump, far).unwrap();
        for _ in 0..125 {
            unit.op(Opcode::Nop).unwrap();
        }
        unit.bind_label(near).unwrap();
        for _ in 0..3 {
            unit.op(Opcode::Nop).unwrap();
        }
        unit.bind_label(far).unwrap();
        let layout = resolve(&unit, None).unwrap();
        assert_eq!(layout.width(0), Some(Width::W16));
        assert_eq!(layout.width(1), Some(Width::W16));
        assert_eq!(layout.displacement(0, 127), 128);
        assert_eq!(layout.passes(), 3);
    }

    #[test]
    fn too_far_for_version() {
        let err = resolve(&forward(FormatVersion::V1, 40_000), None).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedOperand {
                index: Some(0),
                ..
            }
        ));
    }

    #[test]
    fn pass_cap() {
        let err = resolve(&forward(FormatVersion::V2, 200), Some(1)).unwrap_err();
        assert_eq!(err, Error::LayoutOverflow { passes: 1 });
        assert!(resolve(&forward(FormatVersion::V2, 200), Some(2)).is_ok());
    }

    #[test]
    fn immediates_take_narrowest_width() {
        let mut unit = Unit::new(FormatVersion::V2);
        unit.push(5).unwrap();
        unit.push(-300).unwrap();
        unit.push(70_000).unwrap();
        let layout = resolve(&unit, None).unwrap();
        assert_eq!(layout.width(0), Some(Width::W8));
        assert_eq!(layout.width(1), Some(Width::W16));
        assert_eq!(layout.width(2), Some(Width::W32));
        assert_eq!(layout.code_len(), 2 + 3 + 5);
    }
}
