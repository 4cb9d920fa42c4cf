use crate::error::{Error, Result, SourcePos, Unresolved};
use indexmap::IndexMap;

/// Handle to a label of one unit. Only meaningful for the unit that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    unit: u32,
    index: u32,
}

impl Label {
    pub fn index(self) -> usize {
        self.index as usize
    }
}

#[derive(Debug, Clone, Default)]
struct Entry {
    // Instruction index the label marks. May equal the instruction count.
    bound: Option<usize>,
    defined: Option<SourcePos>,
    refs: Vec<usize>,
}

/// Label names in creation order with their binding and references.
#[derive(Debug, Clone)]
pub struct Labels {
    // Id of the unit whose handles this table accepts.
    owner: u32,
    labels: IndexMap<String, Entry>,
}

impl Labels {
    pub fn new(owner: u32) -> Self {
        Self {
            owner,
            labels: IndexMap::new(),
        }
    }

    fn handle(&self, index: usize) -> Label {
        Label {
            unit: self.owner,
            index: index as u32,
        }
    }

    fn slot(&self, label: Label) -> Option<usize> {
        (label.unit == self.owner && label.index() < self.labels.len()).then_some(label.index())
    }

    pub fn create(&mut self, name: &str, pos: Option<SourcePos>) -> Result<Label> {
        if let Some(prev) = self.labels.get(name) {
            return Err(Error::DuplicateLabel {
                name: name.to_string(),
                pos: pos.or(prev.defined),
            });
        }
        let (index, _) = self.labels.insert_full(
            name.to_string(),
            Entry {
                defined: pos,
                ..Entry::default()
            },
        );
        Ok(self.handle(index))
    }

    pub fn bind(&mut self, label: Label, at: usize, pos: Option<SourcePos>) -> Result<()> {
        let Some((name, entry)) = self
            .slot(label)
            .and_then(|i| self.labels.get_index_mut(i))
        else {
            return Err(foreign(label, pos));
        };
        if entry.bound.is_some() {
            return Err(Error::DuplicateLabel {
                name: name.clone(),
                pos,
            });
        }
        entry.bound = Some(at);
        if pos.is_some() {
            entry.defined = pos;
        }
        Ok(())
    }

    /// Records that instruction `from` refers to `label`.
    pub fn reference(&mut self, label: Label, from: usize) -> Result<()> {
        match self.slot(label).and_then(|i| self.labels.get_index_mut(i)) {
            Some((_, entry)) => {
                entry.refs.push(from);
                Ok(())
            }
            None => Err(foreign(label, None)),
        }
    }

    /// Whether `label` was created by this table.
    pub fn contains(&self, label: Label) -> bool {
        self.slot(label).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Label> {
        self.labels.get_index_of(name).map(|i| self.handle(i))
    }

    fn entry(&self, label: Label) -> Option<(&String, &Entry)> {
        self.slot(label).and_then(|i| self.labels.get_index(i))
    }

    pub fn name(&self, label: Label) -> Option<&str> {
        self.entry(label).map(|(n, _)| n.as_str())
    }

    pub fn position(&self, label: Label) -> Option<usize> {
        self.entry(label).and_then(|(_, e)| e.bound)
    }

    pub fn references(&self, label: Label) -> &[usize] {
        self.entry(label)
            .map(|(_, e)| e.refs.as_slice())
            .unwrap_or(&[])
    }

    /// Bound labels as (name, instruction index), in creation order.
    pub fn bound(&self) -> impl Iterator<Item = (&str, usize)> {
        self.labels
            .iter()
            .filter_map(|(n, e)| e.bound.map(|at| (n.as_str(), at)))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Binding position of every label, indexed by [`Label::index`].
    ///
    /// Fails with every label that is referenced but never bound, each with its first
    /// referencing instruction and that instruction's position from `pos_of`.
    pub fn resolve_all(
        &self,
        pos_of: impl Fn(usize) -> Option<SourcePos>,
    ) -> Result<Vec<Option<usize>>> {
        let labels: Vec<Unresolved> = self
            .labels
            .iter()
            .filter(|(_, e)| e.bound.is_none())
            .filter_map(|(n, e)| {
                e.refs.first().map(|&index| Unresolved {
                    name: n.clone(),
                    index,
                    pos: pos_of(index),
                })
            })
            .collect();
        if !labels.is_empty() {
            return Err(Error::UnresolvedLabel { labels });
        }
        Ok(self.labels.values().map(|e| e.bound).collect())
    }
}

fn foreign(label: Label, pos: Option<SourcePos>) -> Error {
    Error::unsupported(
        None,
        pos,
        format!("label #{} does not belong to this unit", label.index),
    )
}
