use crate::error::{Error, Result};
use crate::unit::Instruction;
use arch::{Edge, Flow, VersionTable};

/// Operand stack depths found by walking every reachable path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackReport {
    max_depth: u32,
    // Depth on entry to each instruction, `None` when unreachable.
    entry: Vec<Option<u32>>,
}

impl StackReport {
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn depth_at(&self, index: usize) -> Option<u32> {
        self.entry.get(index).copied().flatten()
    }

    pub fn is_reachable(&self, index: usize) -> bool {
        self.depth_at(index).is_some()
    }
}

/// Walks the control-flow graph from the first instruction at depth zero.
///
/// Every instruction must be entered with the same depth along all paths and may not
/// pop more than the stack holds. Running off the end of the stream ends a path.
pub fn validate(
    table: &VersionTable,
    insts: &[Instruction],
    targets: &[Option<usize>],
) -> Result<StackReport> {
    let n = insts.len();
    let mut entry: Vec<Option<u32>> = vec![None; n];
    let mut max_depth = 0;
    let mut work = vec![];
    if n > 0 {
        entry[0] = Some(0);
        work.push(0);
    }

    while let Some(i) = work.pop() {
        let inst = &insts[i];
        let Some(depth) = entry[i] else {
            continue;
        };
        let rule = table.rule(inst.opcode).ok_or_else(|| {
            Error::unsupported(Some(i), inst.pos, format!("`{}` has no encoding", inst.opcode))
        })?;
        let target = || {
            inst.label()
                .and_then(|l| targets.get(l.index()).copied().flatten())
        };

        let edges: Vec<(Edge, Option<usize>)> = match inst.opcode.flow() {
            Flow::Next => vec![(Edge::Fallthrough, Some(i + 1))],
            Flow::Jump => vec![(Edge::Taken, target())],
            Flow::Branch => vec![(Edge::Taken, target()), (Edge::Fallthrough, Some(i + 1))],
            Flow::Stop => vec![(Edge::Fallthrough, None)],
        };

        for (edge, succ) in edges {
            let effect = rule.effect.on(edge, inst.count());
            if depth < effect.pop {
                return Err(Error::StackUnderflow {
                    index: i,
                    pos: inst.pos,
                    depth,
                    needed: effect.pop,
                });
            }
            let next = depth - effect.pop + effect.push;
            max_depth = max_depth.max(next);

            let Some(succ) = succ.filter(|s| *s < n) else {
                continue;
            };
            match entry[succ] {
                None => {
                    entry[succ] = Some(next);
                    work.push(succ);
                }
                Some(seen) if seen != next => {
                    return Err(Error::StackImbalance {
                        index: succ,
                        pos: insts[succ].pos,
                        expected: seen,
                        found: next,
                    });
                }
                Some(_) => {}
            }
        }
    }

    Ok(StackReport { max_depth, entry })
}
