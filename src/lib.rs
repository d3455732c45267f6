//! # formc
//!
//! Compiles trees of statement/expression forms into linear bytecode for a
//! stack-based virtual machine.
//!
//! The compiler core is shared; the target is chosen by passing an
//! [`InstrSet`](bytecode::op::InstrSet) value, either [`Lap`](bytecode::Lap)
//! or [`Ir`](bytecode::Ir).

pub mod bytecode;
pub mod lang;
