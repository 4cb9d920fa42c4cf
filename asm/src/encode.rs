use crate::artifact::CodeArtifact;
use crate::error::{Error, Result};
use crate::format::{count, Writer};
use crate::layout::Layout;
use crate::pool::Constant;
use crate::stack::{self, StackReport};
use crate::unit::{Operand, Unit};
use arch::Encoding;
use indexmap::IndexMap;
use tracing::debug;

/// Phases turning a [`Unit`] into a [`CodeArtifact`].
///
/// Each phase needs the ones before it: `resolve_symbols`, then `layout` and
/// `validate`, then `encode`. Running a phase early fails with [`Error::NotReady`].
#[derive(Debug)]
pub struct Assembly<'u> {
    unit: &'u Unit,
    targets: Option<Vec<Option<usize>>>,
    layout: Option<Layout>,
    stack: Option<StackReport>,
}

impl<'u> Assembly<'u> {
    pub fn new(unit: &'u Unit) -> Self {
        Self {
            unit,
            targets: None,
            layout: None,
            stack: None,
        }
    }

    pub fn resolve_symbols(&mut self) -> Result<&mut Self> {
        let insts = self.unit.instructions();
        let targets = self
            .unit
            .labels()
            .resolve_all(|i| insts.get(i).and_then(|inst| inst.pos))?;
        debug!(labels = targets.len(), "labels resolved");
        self.targets = Some(targets);
        Ok(self)
    }

    pub fn layout(&mut self) -> Result<&mut Self> {
        let targets = self
            .targets
            .as_deref()
            .ok_or(Error::NotReady("layout requires resolved symbols"))?;
        let layout = Layout::resolve(
            self.unit.table(),
            self.unit.instructions(),
            targets,
            self.unit.config().max_layout_passes,
        )?;
        debug!(
            passes = layout.passes(),
            code_len = layout.code_len(),
            "layout converged"
        );
        self.layout = Some(layout);
        Ok(self)
    }

    pub fn validate(&mut self) -> Result<&mut Self> {
        let targets = self
            .targets
            .as_deref()
            .ok_or(Error::NotReady("validation requires resolved symbols"))?;
        let report = stack::validate(self.unit.table(), self.unit.instructions(), targets)?;
        debug!(max_depth = report.max_depth(), "stack validated");
        self.stack = Some(report);
        Ok(self)
    }

    pub fn layout_result(&self) -> Option<&Layout> {
        self.layout.as_ref()
    }

    pub fn stack_report(&self) -> Option<&StackReport> {
        self.stack.as_ref()
    }

    /// Serializes the unit. Pure: the same resolved unit always yields the same bytes.
    pub fn encode(&self) -> Result<CodeArtifact> {
        let (Some(targets), Some(layout)) = (self.targets.as_deref(), self.layout.as_ref()) else {
            return Err(Error::NotReady("encoding requires a resolved layout"));
        };
        let stack = self
            .stack
            .as_ref()
            .ok_or(Error::NotReady("encoding requires stack validation"))?;

        let unit = self.unit;
        let config = unit.config();
        let table = unit.table();
        let insts = unit.instructions();

        let mut w = Writer::new();
        w.u8(unit.version().tag());
        w.u32(stack.max_depth());
        w.u32(count(insts.len(), "instruction")?);
        w.u32(count(layout.code_len(), "code byte")?);

        for (i, inst) in insts.iter().enumerate() {
            let width = layout.width(i);
            let code = table
                .code(Encoding {
                    opcode: inst.opcode,
                    width,
                })
                .ok_or_else(|| {
                    Error::unsupported(
                        Some(i),
                        inst.pos,
                        format!("`{}` has no {} encoding", inst.opcode, unit.version()),
                    )
                })?;
            w.u8(code);
            let value = match inst.operand {
                None => None,
                Some(Operand::Label(l)) => targets
                    .get(l.index())
                    .copied()
                    .flatten()
                    .map(|t| layout.displacement(i, t)),
                Some(o) => o.value(),
            };
            if let (Some(width), Some(v)) = (width, value) {
                width.encode(v, w.buf());
            }
        }

        w.u32(count(unit.constants().len(), "constant")?);
        for c in unit.constants().iter() {
            w.u8(c.kind().into());
            match c {
                Constant::Int(v) => w.u64(*v as u64),
                Constant::Float(v) => w.u64(v.to_bits()),
                Constant::Bool(v) => w.u8(*v as u8),
                Constant::Str(s) => w.blob(s.as_bytes())?,
                Constant::Bytes(b) => w.blob(b)?,
            }
        }

        w.u32(count(unit.names().len(), "name")?);
        for name in unit.names().iter() {
            w.blob(name.as_bytes())?;
        }

        let mut labels = IndexMap::new();
        for (name, at) in unit.labels().bound() {
            labels.insert(name.to_string(), count(layout.offset(at), "code byte")?);
        }
        if config.emit_symbols {
            w.u32(count(labels.len(), "label")?);
            for (name, offset) in &labels {
                w.blob(name.as_bytes())?;
                w.u32(*offset);
            }
        } else {
            w.u32(0);
        }

        let spans: Vec<_> = if config.emit_spans {
            insts
                .iter()
                .enumerate()
                .filter_map(|(i, inst)| inst.pos.map(|p| (layout.offset(i), p)))
                .collect()
        } else {
            vec![]
        };
        w.u32(count(spans.len(), "span")?);
        for (offset, pos) in spans {
            w.u32(count(offset, "code byte")?);
            w.u32(pos.line);
            w.u32(pos.column);
        }

        let bytes = w.into_vec();
        debug!(size = bytes.len(), "artifact encoded");
        Ok(CodeArtifact::new(
            bytes,
            unit.version(),
            stack.max_depth(),
            count(insts.len(), "instruction")?,
            labels,
        ))
    }

    /// Runs every phase in order.
    pub fn run(mut self) -> Result<CodeArtifact> {
        self.resolve_symbols()?.layout()?.validate()?;
        self.encode()
    }
}
