use std::fmt::Debug;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::lang::form::BinOp;

// =============================================================================
// INSTR - opcode plus a single fixed operand
// =============================================================================

/// One bytecode instruction.
///
/// The meaning of `arg` depends on the opcode: a constant-pool index, a
/// stack slot, an argument count or a jump target. Opcodes that take no
/// operand leave it at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instr<O> {
    pub op: O,
    pub arg: usize,
}

impl<O> Instr<O> {
    pub fn new(op: O, arg: usize) -> Self {
        Self { op, arg }
    }

    pub fn bare(op: O) -> Self {
        Self { op, arg: 0 }
    }
}

/// How many stack slots an opcode consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Always the same number of slots.
    Fixed(usize),
    /// `arg + extra` slots, e.g. `call n` consumes the callee and n args.
    Operand { extra: usize },
}

/// Static stack contract of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpSpec {
    pub argc: Arity,
    /// Pushes exactly one result.
    pub output: bool,
    /// Function to call when the fused form does not apply.
    pub fallback: Option<&'static str>,
    /// Control never reaches the next instruction.
    pub terminal: bool,
}

impl OpSpec {
    pub const fn new(argc: usize, output: bool) -> Self {
        Self {
            argc: Arity::Fixed(argc),
            output,
            fallback: None,
            terminal: false,
        }
    }

    pub const fn operand(extra: usize, output: bool) -> Self {
        Self {
            argc: Arity::Operand { extra },
            output,
            fallback: None,
            terminal: false,
        }
    }

    pub const fn with_fallback(mut self, fallback: &'static str) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub const fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    /// Slots consumed by an instruction carrying `arg`.
    pub fn consumes(&self, arg: usize) -> usize {
        match self.argc {
            Arity::Fixed(n) => n,
            Arity::Operand { extra } => arg + extra,
        }
    }

    pub fn produces(&self) -> usize {
        usize::from(self.output)
    }
}

/// Kind of a jump instruction as seen by control-flow analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    /// Always transfers control.
    Always,
    /// Pops the test value; transfers control only if it is nil/false.
    IfNil,
}

// =============================================================================
// INSTRSET - everything the compiler needs to know about a target
// =============================================================================

/// A target instruction set.
///
/// Integrating a new target means supplying the opcode table (`spec`) and
/// the emission helpers below; the form compiler itself is shared.
pub trait InstrSet {
    type Opcode: Copy + Eq + Debug + Serialize + DeserializeOwned;

    /// Short name used in logs and disassembly headers.
    fn name(&self) -> &'static str;

    /// Arity contract of an opcode.
    fn spec(&self, op: Self::Opcode) -> OpSpec;

    /// Mnemonic for disassembly.
    fn mnemonic(&self, op: Self::Opcode) -> &'static str;

    fn const_ref(&self, index: usize) -> Instr<Self::Opcode>;
    fn stack_ref(&self, slot: usize) -> Instr<Self::Opcode>;
    fn stack_set(&self, slot: usize) -> Instr<Self::Opcode>;
    fn discard(&self, n: usize) -> Instr<Self::Opcode>;
    fn call(&self, argc: usize) -> Instr<Self::Opcode>;
    fn ret(&self, results: usize) -> Instr<Self::Opcode>;
    fn trap(&self) -> Instr<Self::Opcode>;
    fn multi_value_ref(&self, index: usize) -> Instr<Self::Opcode>;

    /// Fused opcode for a binary operator.
    fn binary(&self, op: BinOp) -> Self::Opcode;

    fn jmp(&self) -> Self::Opcode;
    fn jmp_nil(&self) -> Self::Opcode;

    /// Jump kind of an opcode, or `None` if it is not a jump.
    fn jump_kind(&self, op: Self::Opcode) -> Option<JumpKind>;

    /// Symbol a boolean literal is loaded as.
    fn bool_symbol(&self, value: bool) -> &'static str;

    fn is_jump(&self, op: Self::Opcode) -> bool {
        self.jump_kind(op).is_some()
    }

    /// Symbol to call for `op` when it is applied to other than two args.
    fn fallback(&self, op: BinOp) -> &'static str {
        let opcode = self.binary(op);
        self.spec(opcode)
            .fallback
            .unwrap_or_else(|| self.mnemonic(opcode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_arity() {
        let spec = OpSpec::new(2, true);
        assert_eq!(spec.consumes(7), 2);
        assert_eq!(spec.produces(), 1);
        assert!(!spec.terminal);
    }

    #[test]
    fn test_operand_arity() {
        // call n: callee + n args
        let spec = OpSpec::operand(1, true);
        assert_eq!(spec.consumes(0), 1);
        assert_eq!(spec.consumes(2), 3);
    }

    #[test]
    fn test_builders() {
        let spec = OpSpec::new(2, true).with_fallback("+");
        assert_eq!(spec.fallback, Some("+"));

        let spec = OpSpec::operand(0, false).terminal();
        assert!(spec.terminal);
        assert_eq!(spec.produces(), 0);
    }
}
