//! Generic stack IR.
//!
//! A target-neutral instruction set used by back ends that translate the
//! stream further. Booleans are ordinary `true`/`false` symbols.

use serde::{Deserialize, Serialize};

use crate::bytecode::op::{Instr, InstrSet, JumpKind, OpSpec};
use crate::lang::form::BinOp;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IrOp {
    ConstRef,
    StackRef,
    StackSet,
    Discard,
    Call,
    Return,
    Jmp,
    JmpNil,
    NumAdd,
    NumSub,
    NumMul,
    NumQuo,
    NumGt,
    NumLt,
    NumEq,
    Panic,
    MultiValueRef,
}

/// Stack contract per opcode, indexed by `IrOp as usize`.
static SPECS: [OpSpec; 17] = [
    OpSpec::new(0, true),                     // ConstRef
    OpSpec::new(0, true),                     // StackRef
    OpSpec::new(1, false),                    // StackSet
    OpSpec::operand(0, false),                // Discard
    OpSpec::operand(1, true),                 // Call
    OpSpec::operand(0, false).terminal(),     // Return
    OpSpec::new(0, false).terminal(),         // Jmp
    OpSpec::new(1, false),                    // JmpNil
    OpSpec::new(2, true).with_fallback("+"),  // NumAdd
    OpSpec::new(2, true).with_fallback("-"),  // NumSub
    OpSpec::new(2, true).with_fallback("*"),  // NumMul
    OpSpec::new(2, true).with_fallback("/"),  // NumQuo
    OpSpec::new(2, true).with_fallback(">"),  // NumGt
    OpSpec::new(2, true).with_fallback("<"),  // NumLt
    OpSpec::new(2, true).with_fallback("="),  // NumEq
    OpSpec::new(1, false).terminal(),         // Panic
    OpSpec::new(0, true),                     // MultiValueRef
];

static MNEMONICS: [&str; 17] = [
    "const_ref",
    "stack_ref",
    "stack_set",
    "discard",
    "call",
    "return",
    "jmp",
    "jmp_nil",
    "num_add",
    "num_sub",
    "num_mul",
    "num_quo",
    "num_gt",
    "num_lt",
    "num_eq",
    "panic",
    "multi_value_ref",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct Ir;

impl InstrSet for Ir {
    type Opcode = IrOp;

    fn name(&self) -> &'static str {
        "ir"
    }

    fn spec(&self, op: IrOp) -> OpSpec {
        SPECS[op as usize]
    }

    fn mnemonic(&self, op: IrOp) -> &'static str {
        MNEMONICS[op as usize]
    }

    fn const_ref(&self, index: usize) -> Instr<IrOp> {
        Instr::new(IrOp::ConstRef, index)
    }

    fn stack_ref(&self, slot: usize) -> Instr<IrOp> {
        Instr::new(IrOp::StackRef, slot)
    }

    fn stack_set(&self, slot: usize) -> Instr<IrOp> {
        Instr::new(IrOp::StackSet, slot)
    }

    fn discard(&self, n: usize) -> Instr<IrOp> {
        Instr::new(IrOp::Discard, n)
    }

    fn call(&self, argc: usize) -> Instr<IrOp> {
        Instr::new(IrOp::Call, argc)
    }

    fn ret(&self, results: usize) -> Instr<IrOp> {
        Instr::new(IrOp::Return, results)
    }

    fn trap(&self) -> Instr<IrOp> {
        Instr::bare(IrOp::Panic)
    }

    fn multi_value_ref(&self, index: usize) -> Instr<IrOp> {
        Instr::new(IrOp::MultiValueRef, index)
    }

    fn binary(&self, op: BinOp) -> IrOp {
        match op {
            BinOp::Add => IrOp::NumAdd,
            BinOp::Sub => IrOp::NumSub,
            BinOp::Mul => IrOp::NumMul,
            BinOp::Quo => IrOp::NumQuo,
            BinOp::Gt => IrOp::NumGt,
            BinOp::Lt => IrOp::NumLt,
            BinOp::Eq => IrOp::NumEq,
        }
    }

    fn jmp(&self) -> IrOp {
        IrOp::Jmp
    }

    fn jmp_nil(&self) -> IrOp {
        IrOp::JmpNil
    }

    fn jump_kind(&self, op: IrOp) -> Option<JumpKind> {
        match op {
            IrOp::Jmp => Some(JumpKind::Always),
            IrOp::JmpNil => Some(JumpKind::IfNil),
            _ => None,
        }
    }

    fn bool_symbol(&self, value: bool) -> &'static str {
        if value { "true" } else { "false" }
    }
}
