use crate::decode::{decode, Decoded};
use crate::error::DecodeError;
use arch::FormatVersion;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;

/// Size of the fixed header: version tag, max depth, instruction count, code length.
pub const HEADER_LEN: usize = 1 + 4 + 4 + 4;

/// Finished, immutable output of one unit. Clones share the byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeArtifact {
    bytes: Arc<[u8]>,
    version: FormatVersion,
    max_stack_depth: u32,
    instruction_count: u32,
    labels: IndexMap<String, u32>,
}

impl CodeArtifact {
    pub(crate) fn new(
        bytes: Vec<u8>,
        version: FormatVersion,
        max_stack_depth: u32,
        instruction_count: u32,
        labels: IndexMap<String, u32>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            version,
            max_stack_depth,
            instruction_count,
            labels,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    pub fn version(&self) -> FormatVersion {
        self.version
    }

    pub fn max_stack_depth(&self) -> u32 {
        self.max_stack_depth
    }

    pub fn instruction_count(&self) -> u32 {
        self.instruction_count
    }

    /// Byte range of the instruction stream within [`as_bytes`](Self::as_bytes).
    pub fn code_range(&self) -> Range<usize> {
        let len = self
            .bytes
            .get(HEADER_LEN - 4..HEADER_LEN)
            .map_or(0, |b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize);
        HEADER_LEN..HEADER_LEN + len
    }

    pub fn code(&self) -> &[u8] {
        &self.bytes[self.code_range()]
    }

    /// Byte offset of a bound label within the code.
    pub fn label_offset(&self, name: &str) -> Option<u32> {
        self.labels.get(name).copied()
    }

    pub fn decode(&self) -> Result<Decoded, DecodeError> {
        decode(&self.bytes)
    }

    pub fn info(&self) -> ArtifactInfo {
        ArtifactInfo {
            version: self.version,
            max_stack_depth: self.max_stack_depth,
            instruction_count: self.instruction_count,
            code_len: self.code_range().len(),
            size: self.bytes.len(),
            labels: self.labels.clone(),
        }
    }
}

/// Summary of an artifact for build reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub version: FormatVersion,
    pub max_stack_depth: u32,
    pub instruction_count: u32,
    pub code_len: usize,
    pub size: usize,
    pub labels: IndexMap<String, u32>,
}

impl ArtifactInfo {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
