use crate::bytecode::compile_error::{CompileError, Violation};
use crate::bytecode::object::CodeBlock;
use crate::bytecode::op::Instr;

/// Name of the segment every function starts in.
pub const ENTRY_BLOCK: &str = "entry";

/// Append-only instruction buffer, split into named segments.
///
/// Positions are absolute offsets into the concatenation of all segments,
/// which is what the VM executes.
#[derive(Debug)]
pub struct Code<O> {
    blocks: Vec<CodeBlock<O>>,
    len: usize,
    unbound: usize,
}

/// Handle to a forward jump whose target is not known yet.
///
/// Must be bound exactly once; `bind` consumes the handle.
#[must_use = "an unbound jump leaves a dangling target"]
#[derive(Debug)]
pub struct JumpRef {
    block: usize,
    index: usize,
}

impl JumpRef {
    /// Point the jump at the next instruction to be emitted.
    pub fn bind<O>(self, code: &mut Code<O>) {
        let target = code.len;
        code.blocks[self.block].instrs[self.index].arg = target;
        code.unbound -= 1;
    }
}

impl<O> Code<O> {
    pub fn new() -> Self {
        Self {
            blocks: vec![CodeBlock::new(ENTRY_BLOCK)],
            len: 0,
            unbound: 0,
        }
    }

    pub fn push_instr(&mut self, instr: Instr<O>) {
        self.current().instrs.push(instr);
        self.len += 1;
    }

    /// Emit `op` with a placeholder target.
    pub fn push_jmp(&mut self, op: O) -> JumpRef {
        let block = self.blocks.len() - 1;
        let index = self.blocks[block].instrs.len();
        self.push_instr(Instr::bare(op));
        self.unbound += 1;
        JumpRef { block, index }
    }

    /// Start a new segment; later instructions land there.
    pub fn push_block(&mut self, name: impl Into<String>) {
        self.blocks.push(CodeBlock::new(name));
    }

    /// Current end of the instruction stream.
    pub fn position(&self) -> usize {
        self.len
    }

    fn current(&mut self) -> &mut CodeBlock<O> {
        let last = self.blocks.len() - 1;
        &mut self.blocks[last]
    }

    pub fn finish(self) -> Result<Vec<CodeBlock<O>>, CompileError> {
        if self.unbound != 0 {
            return Err(Violation::DanglingJump {
                count: self.unbound,
            }
            .into());
        }
        Ok(self.blocks)
    }
}

impl<O> Default for Code<O> {
    fn default() -> Self {
        Self::new()
    }
}
