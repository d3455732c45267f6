//! Lisp-assembly instruction set.
//!
//! Mirrors the byte-code of a classic Lisp VM: values are loaded from a
//! per-function constant vector, locals live on the operand stack and are
//! addressed by absolute slot, and `nil` is the only false value.

use serde::{Deserialize, Serialize};

use crate::bytecode::op::{Instr, InstrSet, JumpKind, OpSpec};
use crate::lang::form::BinOp;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LapOp {
    Constant,
    StackRef,
    StackSet,
    DiscardN,
    Call,
    Return,
    Goto,
    GotoIfNil,
    Plus,
    Diff,
    Mult,
    Quo,
    Gtr,
    Lss,
    EqlSign,
    Signal,
    ValueRef,
}

/// Stack contract per opcode, indexed by `LapOp as usize`.
static SPECS: [OpSpec; 17] = [
    OpSpec::new(0, true),                     // Constant
    OpSpec::new(0, true),                     // StackRef
    OpSpec::new(1, false),                    // StackSet
    OpSpec::operand(0, false),                // DiscardN
    OpSpec::operand(1, true),                 // Call
    OpSpec::operand(0, false).terminal(),     // Return
    OpSpec::new(0, false).terminal(),         // Goto
    OpSpec::new(1, false),                    // GotoIfNil
    OpSpec::new(2, true).with_fallback("+"),  // Plus
    OpSpec::new(2, true).with_fallback("-"),  // Diff
    OpSpec::new(2, true).with_fallback("*"),  // Mult
    OpSpec::new(2, true).with_fallback("/"),  // Quo
    OpSpec::new(2, true).with_fallback(">"),  // Gtr
    OpSpec::new(2, true).with_fallback("<"),  // Lss
    OpSpec::new(2, true).with_fallback("="),  // EqlSign
    OpSpec::new(1, false).terminal(),         // Signal
    OpSpec::new(0, true),                     // ValueRef
];

static MNEMONICS: [&str; 17] = [
    "constant",
    "stack-ref",
    "stack-set",
    "discardN",
    "call",
    "return",
    "goto",
    "goto-if-nil",
    "plus",
    "diff",
    "mult",
    "quo",
    "gtr",
    "lss",
    "eqlsign",
    "signal",
    "value-ref",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct Lap;

impl InstrSet for Lap {
    type Opcode = LapOp;

    fn name(&self) -> &'static str {
        "lap"
    }

    fn spec(&self, op: LapOp) -> OpSpec {
        SPECS[op as usize]
    }

    fn mnemonic(&self, op: LapOp) -> &'static str {
        MNEMONICS[op as usize]
    }

    fn const_ref(&self, index: usize) -> Instr<LapOp> {
        Instr::new(LapOp::Constant, index)
    }

    fn stack_ref(&self, slot: usize) -> Instr<LapOp> {
        Instr::new(LapOp::StackRef, slot)
    }

    fn stack_set(&self, slot: usize) -> Instr<LapOp> {
        Instr::new(LapOp::StackSet, slot)
    }

    fn discard(&self, n: usize) -> Instr<LapOp> {
        Instr::new(LapOp::DiscardN, n)
    }

    fn call(&self, argc: usize) -> Instr<LapOp> {
        Instr::new(LapOp::Call, argc)
    }

    fn ret(&self, results: usize) -> Instr<LapOp> {
        Instr::new(LapOp::Return, results)
    }

    fn trap(&self) -> Instr<LapOp> {
        Instr::bare(LapOp::Signal)
    }

    fn multi_value_ref(&self, index: usize) -> Instr<LapOp> {
        Instr::new(LapOp::ValueRef, index)
    }

    fn binary(&self, op: BinOp) -> LapOp {
        match op {
            BinOp::Add => LapOp::Plus,
            BinOp::Sub => LapOp::Diff,
            BinOp::Mul => LapOp::Mult,
            BinOp::Quo => LapOp::Quo,
            BinOp::Gt => LapOp::Gtr,
            BinOp::Lt => LapOp::Lss,
            BinOp::Eq => LapOp::EqlSign,
        }
    }

    fn jmp(&self) -> LapOp {
        LapOp::Goto
    }

    fn jmp_nil(&self) -> LapOp {
        LapOp::GotoIfNil
    }

    fn jump_kind(&self, op: LapOp) -> Option<JumpKind> {
        match op {
            LapOp::Goto => Some(JumpKind::Always),
            LapOp::GotoIfNil => Some(JumpKind::IfNil),
            _ => None,
        }
    }

    fn bool_symbol(&self, value: bool) -> &'static str {
        if value { "t" } else { "nil" }
    }
}
