use arch::ConstKind;
use indexmap::IndexSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Literal value stored in the constant pool.
///
/// Two constants are the same entry only when both kind and value match, so `Int(1)`,
/// `Float(1.0)` and `Bool(true)` never share an index. Floats compare by bit pattern.
#[derive(Debug, Clone)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
}

impl Constant {
    pub fn kind(&self) -> ConstKind {
        match self {
            Constant::Int(_) => ConstKind::Int,
            Constant::Float(_) => ConstKind::Float,
            Constant::Bool(_) => ConstKind::Bool,
            Constant::Str(_) => ConstKind::Str,
            Constant::Bytes(_) => ConstKind::Bytes,
        }
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::Int(a), Constant::Int(b)) => a == b,
            (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
            (Constant::Bool(a), Constant::Bool(b)) => a == b,
            (Constant::Str(a), Constant::Str(b)) => a == b,
            (Constant::Bytes(a), Constant::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        match self {
            Constant::Int(v) => v.hash(state),
            Constant::Float(v) => v.to_bits().hash(state),
            Constant::Bool(v) => v.hash(state),
            Constant::Str(v) => v.hash(state),
            Constant::Bytes(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{v}"),
            Constant::Float(v) => write!(f, "{v:?}"),
            Constant::Bool(v) => write!(f, "{v}"),
            Constant::Str(v) => write!(f, "{v:?}"),
            Constant::Bytes(v) => {
                write!(f, "b\"")?;
                for b in v {
                    write!(f, "\\x{b:02x}")?;
                }
                write!(f, "\"")
            }
        }
    }
}

impl From<i64> for Constant {
    fn from(v: i64) -> Self {
        Constant::Int(v)
    }
}

impl From<f64> for Constant {
    fn from(v: f64) -> Self {
        Constant::Float(v)
    }
}

impl From<bool> for Constant {
    fn from(v: bool) -> Self {
        Constant::Bool(v)
    }
}

impl From<&str> for Constant {
    fn from(v: &str) -> Self {
        Constant::Str(v.to_string())
    }
}

impl From<String> for Constant {
    fn from(v: String) -> Self {
        Constant::Str(v)
    }
}

impl From<Vec<u8>> for Constant {
    fn from(v: Vec<u8>) -> Self {
        Constant::Bytes(v)
    }
}

// ----------------------------------------------------------------------------

/// Handle to a constant pool entry of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstId {
    unit: u32,
    index: u32,
}

impl ConstId {
    pub(crate) fn new(unit: u32, index: u32) -> Self {
        Self { unit, index }
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub(crate) fn unit(self) -> u32 {
        self.unit
    }
}

/// Handle to a name table entry of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameId {
    unit: u32,
    index: u32,
}

impl NameId {
    pub(crate) fn new(unit: u32, index: u32) -> Self {
        Self { unit, index }
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub(crate) fn unit(self) -> u32 {
        self.unit
    }
}

/// Insertion-ordered set handing out the index of each distinct value.
#[derive(Debug, Clone)]
pub struct Pool<T: Hash + Eq> {
    items: IndexSet<T>,
}

impl<T: Hash + Eq> Default for Pool<T> {
    fn default() -> Self {
        Self {
            items: IndexSet::new(),
        }
    }
}

impl<T: Hash + Eq> Pool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `value`, adding it if not present.
    pub fn intern(&mut self, value: T) -> u32 {
        self.items.insert_full(value).0 as u32
    }

    pub fn get(&self, index: u32) -> Option<&T> {
        self.items.get_index(index as usize)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}
