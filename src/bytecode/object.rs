use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::bytecode::op::Instr;
use crate::lang::value::Constant;

/// Named instruction segment. The name is for readers only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeBlock<O> {
    pub name: String,
    pub instrs: Vec<Instr<O>>,
}

impl<O> CodeBlock<O> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instrs: Vec::new(),
        }
    }
}

/// A compiled function body, ready for the loader.
///
/// Immutable once assembled: instruction blocks in execution order, the
/// constant pool their operands index into, and the peak operand-stack
/// depth the VM must preallocate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object<O> {
    blocks: Vec<CodeBlock<O>>,
    consts: Vec<Constant>,
    stack_usage: usize,
}

impl<O> Object<O> {
    pub(crate) fn new(blocks: Vec<CodeBlock<O>>, consts: Vec<Constant>, stack_usage: usize) -> Self {
        Self {
            blocks,
            consts,
            stack_usage,
        }
    }

    pub fn blocks(&self) -> &[CodeBlock<O>] {
        &self.blocks
    }

    pub fn consts(&self) -> &[Constant] {
        &self.consts
    }

    pub fn stack_usage(&self) -> usize {
        self.stack_usage
    }

    /// Total instruction count across blocks.
    pub fn len(&self) -> usize {
        self.blocks.iter().map(|b| b.instrs.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate the concatenated instruction stream.
    pub fn instrs(&self) -> impl Iterator<Item = &Instr<O>> {
        self.blocks.iter().flat_map(|b| b.instrs.iter())
    }

    /// Absolute start offset of each block.
    pub fn block_starts(&self) -> Vec<usize> {
        self.blocks
            .iter()
            .scan(0, |pos, block| {
                let start = *pos;
                *pos += block.instrs.len();
                Some(start)
            })
            .collect()
    }
}

impl<O: Clone> Object<O> {
    /// The single linear stream the VM executes.
    pub fn linear(&self) -> Vec<Instr<O>> {
        self.instrs().cloned().collect()
    }
}

impl<O: Serialize> Object<O> {
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }
}

impl<O: DeserializeOwned> Object<O> {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

/// Compiled function: object code plus calling convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Func<O> {
    pub name: String,
    /// Parameters occupy stack slots `0..params` on entry.
    pub params: usize,
    pub object: Object<O>,
}

impl<O: Serialize> Func<O> {
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }
}

impl<O: DeserializeOwned> Func<O> {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}
