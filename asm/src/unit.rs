use crate::artifact::CodeArtifact;
use crate::config::AsmConfig;
use crate::encode::Assembly;
use crate::error::{Error, Result, SourcePos};
use crate::label::{Label, Labels};
use crate::pool::{ConstId, Constant, NameId, Pool};
use arch::{FormatVersion, Opcode, OperandKind, VersionTable};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Imm(i64),
    Const(ConstId),
    Name(NameId),
    Local(u32),
    Count(u32),
    Label(Label),
}

impl Operand {
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::Imm(_) => OperandKind::Imm,
            Operand::Const(_) => OperandKind::Const,
            Operand::Name(_) => OperandKind::Name,
            Operand::Local(_) => OperandKind::Local,
            Operand::Count(_) => OperandKind::Count,
            Operand::Label(_) => OperandKind::Label,
        }
    }

    /// Encoded value of operands that do not depend on layout.
    pub fn value(&self) -> Option<i64> {
        match self {
            Operand::Imm(v) => Some(*v),
            Operand::Const(id) => Some(id.index() as i64),
            Operand::Name(id) => Some(id.index() as i64),
            Operand::Local(v) | Operand::Count(v) => Some(*v as i64),
            Operand::Label(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: Option<Operand>,
    pub pos: Option<SourcePos>,
}

impl Instruction {
    pub fn label(&self) -> Option<Label> {
        match self.operand {
            Some(Operand::Label(l)) => Some(l),
            _ => None,
        }
    }

    pub fn count(&self) -> u32 {
        match self.operand {
            Some(Operand::Count(n)) => n,
            _ => 0,
        }
    }
}

// ----------------------------------------------------------------------------

static NEXT_UNIT: AtomicU32 = AtomicU32::new(1);

/// One assembly unit: the instruction stream with its labels, constants and names.
///
/// Everything a unit hands out (labels, constant and name ids) is tagged with the
/// unit's id and rejected by any other unit. A clone keeps the id of its source, so
/// handles taken before cloning stay valid in both. Units share no state and can be
/// built on different threads.
#[derive(Debug, Clone)]
pub struct Unit {
    id: u32,
    config: AsmConfig,
    insts: Vec<Instruction>,
    labels: Labels,
    consts: Pool<Constant>,
    names: Pool<String>,
    // Listing comments by instruction index. Kept apart so instructions stay untouched.
    comments: HashMap<usize, String>,
    cursor: Option<SourcePos>,
}

impl Unit {
    pub fn new(version: FormatVersion) -> Self {
        Self::with_config(AsmConfig::new(version))
    }

    pub fn with_config(config: AsmConfig) -> Self {
        let id = NEXT_UNIT.fetch_add(1, Ordering::Relaxed);
        Self {
            id,
            config,
            insts: vec![],
            labels: Labels::new(id),
            consts: Pool::new(),
            names: Pool::new(),
            comments: HashMap::new(),
            cursor: None,
        }
    }

    pub fn version(&self) -> FormatVersion {
        self.config.version
    }

    pub fn config(&self) -> &AsmConfig {
        &self.config
    }

    pub(crate) fn table(&self) -> &'static VersionTable {
        self.config.version.table()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.insts
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn constants(&self) -> &Pool<Constant> {
        &self.consts
    }

    pub fn names(&self) -> &Pool<String> {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    /// Source position attached to instructions emitted from now on.
    pub fn at(&mut self, pos: impl Into<Option<SourcePos>>) -> &mut Self {
        self.cursor = pos.into();
        self
    }

    /// Attaches a listing comment to the last emitted instruction.
    ///
    /// Does nothing while the unit is still empty.
    pub fn comment(&mut self, text: impl Into<String>) -> &mut Self {
        if let Some(last) = self.insts.len().checked_sub(1) {
            self.comments.insert(last, text.into());
        }
        self
    }

    pub fn comment_at(&self, index: usize) -> Option<&str> {
        self.comments.get(&index).map(|s| s.as_str())
    }

    /// Appends an instruction and returns its index.
    pub fn emit(&mut self, opcode: Opcode, operand: impl Into<Option<Operand>>) -> Result<usize> {
        let operand = operand.into();
        let index = self.insts.len();
        self.check(index, opcode, operand.as_ref())?;
        if let Some(Operand::Label(l)) = operand {
            self.labels.reference(l, index)?;
        }
        self.insts.push(Instruction {
            opcode,
            operand,
            pos: self.cursor,
        });
        Ok(index)
    }

    fn check(&self, index: usize, opcode: Opcode, operand: Option<&Operand>) -> Result<()> {
        let unsupported = |reason: String| Error::unsupported(Some(index), self.cursor, reason);
        let Some(rule) = self.table().rule(opcode) else {
            return Err(unsupported(format!("`{opcode}` is not in {}", self.version())));
        };
        let operand = match (rule.operand, operand) {
            (None, None) => return Ok(()),
            (None, Some(_)) => return Err(unsupported(format!("`{opcode}` takes no operand"))),
            (Some(kind), None) => {
                return Err(unsupported(format!("`{opcode}` requires a {kind} operand")))
            }
            (Some(kind), Some(o)) if o.kind() != kind => {
                return Err(unsupported(format!(
                    "`{opcode}` takes a {kind} operand, got {}",
                    o.kind()
                )))
            }
            (Some(_), Some(o)) => o,
        };
        match operand {
            Operand::Label(l) if !self.labels.contains(*l) => {
                return Err(unsupported(format!(
                    "label #{} does not belong to this unit",
                    l.index()
                )))
            }
            Operand::Const(id)
                if id.unit() != self.id || id.index() as usize >= self.consts.len() =>
            {
                return Err(unsupported(format!(
                    "constant #{} does not belong to this unit",
                    id.index()
                )))
            }
            Operand::Name(id)
                if id.unit() != self.id || id.index() as usize >= self.names.len() =>
            {
                return Err(unsupported(format!(
                    "name #{} does not belong to this unit",
                    id.index()
                )))
            }
            _ => {}
        }
        if let Some(v) = operand.value() {
            if rule.fit(v).is_none() {
                return Err(unsupported(format!(
                    "{} operand {v} does not fit `{opcode}` in {}",
                    operand.kind(),
                    self.version()
                )));
            }
        }
        Ok(())
    }

    /// Creates a label. Names are unique within the unit.
    pub fn new_label(&mut self, name: &str) -> Result<Label> {
        self.labels.create(name, self.cursor)
    }

    /// Binds `label` to the position of the next emitted instruction.
    pub fn bind_label(&mut self, label: Label) -> Result<()> {
        self.labels.bind(label, self.insts.len(), self.cursor)
    }

    pub fn label(&self, name: &str) -> Option<Label> {
        self.labels.get(name)
    }

    /// Pool index of `value`. Equal constants of equal type share one index.
    pub fn intern(&mut self, value: impl Into<Constant>) -> Result<ConstId> {
        let value = value.into();
        if !self.version().supports(value.kind()) {
            return Err(Error::unsupported(
                None,
                self.cursor,
                format!("{} constants are not supported by {}", value.kind(), self.version()),
            ));
        }
        Ok(ConstId::new(self.id, self.consts.intern(value)))
    }

    pub fn name(&mut self, name: &str) -> NameId {
        NameId::new(self.id, self.names.intern(name.to_string()))
    }

    /// Resolves, lays out, validates and encodes the unit.
    ///
    /// The unit is left untouched, so calling this again yields the same bytes.
    pub fn finalize(&self) -> Result<CodeArtifact> {
        Assembly::new(self).run()
    }
}

// ----------------------------------------------------------------------------
// Shorthands

impl Unit {
    pub fn op(&mut self, opcode: Opcode) -> Result<usize> {
        self.emit(opcode, None)
    }

    pub fn push(&mut self, v: i64) -> Result<usize> {
        self.emit(Opcode::Push, Operand::Imm(v))
    }

    pub fn push_const(&mut self, value: impl Into<Constant>) -> Result<usize> {
        let id = self.intern(value)?;
        self.emit(Opcode::PushConst, Operand::Const(id))
    }

    pub fn load_name(&mut self, name: &str) -> Result<usize> {
        let id = self.name(name);
        self.emit(Opcode::LoadName, Operand::Name(id))
    }

    pub fn store_name(&mut self, name: &str) -> Result<usize> {
        let id = self.name(name);
        self.emit(Opcode::StoreName, Operand::Name(id))
    }

    pub fn jump_to(&mut self, opcode: Opcode, label: Label) -> Result<usize> {
        self.emit(opcode, Operand::Label(label))
    }

    pub fn call(&mut self, argc: u32) -> Result<usize> {
        self.emit(Opcode::Call, Operand::Count(argc))
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.listing())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_returns_index() {
        let mut unit = Unit::new(FormatVersion::V2);
        assert_eq!(unit.push(1).unwrap(), 0);
        assert_eq!(unit.op(Opcode::Dup).unwrap(), 1);
        assert_eq!(unit.len(), 2);
    }

    #[test]
    fn operand_shape_checked() {
        let mut unit = Unit::new(FormatVersion::V2);
        assert!(unit.emit(Opcode::Add, Operand::Imm(1)).is_err());
        assert!(unit.emit(Opcode::Push, None).is_err());
        assert!(unit.emit(Opcode::Push, Operand::Local(0)).is_err());
        let stray = ConstId::new(unit.id, 0);
        assert!(unit.emit(Opcode::PushConst, Operand::Const(stray)).is_err());
        let stray = NameId::new(unit.id, 3);
        assert!(unit.emit(Opcode::LoadName, Operand::Name(stray)).is_err());
        assert!(unit.is_empty());
    }

    #[test]
    fn immediate_range_per_version() {
        let mut v1 = Unit::new(FormatVersion::V1);
        assert!(v1.push(32767).is_ok());
        let err = v1.push(32768).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedOperand {
                index: Some(1),
                ..
            }
        ));
        let mut v3 = Unit::new(FormatVersion::V3);
        assert!(v3.push(i64::MIN).is_ok());
    }

    #[test]
    fn constants_per_version() {
        let mut v1 = Unit::new(FormatVersion::V1);
        assert!(v1.intern(1.5).is_err());
        assert!(v1.intern("s").is_ok());
        let mut v2 = Unit::new(FormatVersion::V2);
        assert!(v2.intern(1.5).is_ok());
        assert!(v2.intern(vec![1u8, 2]).is_err());
        let mut v3 = Unit::new(FormatVersion::V3);
        assert!(v3.intern(vec![1u8, 2]).is_ok());
    }

    #[test]
    fn labels_from_other_unit_rejected() {
        let mut a = Unit::new(FormatVersion::V2);
        let mut b = Unit::new(FormatVersion::V2);
        let _ = a.new_label("x").unwrap();
        let y = a.new_label("y").unwrap();
        assert!(b.jump_to(Opcode::Jump, y).is_err());
        assert!(b.bind_label(y).is_err());
    }

    #[test]
    fn handles_from_other_unit_rejected_when_in_range() {
        let mut a = Unit::new(FormatVersion::V2);
        let mut b = Unit::new(FormatVersion::V2);
        let theirs = a.new_label("a_only").unwrap();
        let their_const = a.intern("from_a").unwrap();
        let their_name = a.name("n");
        let ours = b.new_label("b_only").unwrap();
        let our_const = b.intern(42i64).unwrap();
        let our_name = b.name("n");
        assert_eq!(theirs.index(), ours.index());
        assert_eq!(their_const.index(), our_const.index());
        assert_eq!(their_name.index(), our_name.index());

        let foreign = |r: Result<usize>| matches!(r, Err(Error::UnsupportedOperand { .. }));
        assert!(foreign(b.jump_to(Opcode::Jump, theirs)));
        assert!(foreign(b.emit(Opcode::PushConst, Operand::Const(their_const))));
        assert!(foreign(b.emit(Opcode::LoadName, Operand::Name(their_name))));
        assert!(matches!(
            b.bind_label(theirs),
            Err(Error::UnsupportedOperand { .. })
        ));
        assert!(b.is_empty());
        assert_eq!(b.labels().position(ours), None);

        assert!(b.emit(Opcode::PushConst, Operand::Const(our_const)).is_ok());
        assert!(b.jump_to(Opcode::Jump, ours).is_ok());
    }

    #[test]
    fn clone_keeps_handles_valid() {
        let mut a = Unit::new(FormatVersion::V2);
        let l = a.new_label("l").unwrap();
        let c = a.intern(1i64).unwrap();
        let mut copy = a.clone();
        assert!(copy.emit(Opcode::PushConst, Operand::Const(c)).is_ok());
        assert!(copy.bind_label(l).is_ok());
    }

    #[test]
    fn positions_and_comments() {
        let mut unit = Unit::new(FormatVersion::V2);
        unit.at(SourcePos::new(1, 1));
        unit.push(1).unwrap();
        unit.comment("one");
        unit.at(None);
        unit.op(Opcode::Pop).unwrap();
        let insts = unit.instructions();
        assert_eq!(insts[0].pos, Some(SourcePos::new(1, 1)));
        assert_eq!(unit.comment_at(0), Some("one"));
        assert_eq!(unit.comment_at(1), None);
        assert_eq!(insts[1].pos, None);
    }

    #[test]
    fn comment_on_empty_unit_is_dropped() {
        let mut unit = Unit::new(FormatVersion::V2);
        unit.comment("nothing yet");
        unit.op(Opcode::Nop).unwrap();
        assert_eq!(unit.comment_at(0), None);
    }
}
