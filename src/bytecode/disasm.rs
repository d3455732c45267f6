use std::fmt::Write;

use crate::bytecode::object::Func;
use crate::bytecode::op::{Arity, Instr, InstrSet, OpSpec};

/// Print disassembly of a compiled function
pub fn print_func<I: InstrSet>(isa: &I, func: &Func<I::Opcode>) {
    print!("{}", disassemble(isa, func));
}

/// Render a compiled function as text.
pub fn disassemble<I: InstrSet>(isa: &I, func: &Func<I::Opcode>) -> String {
    let mut out = String::new();
    let obj = &func.object;

    let _ = writeln!(out, "════════════════════════════════════════");
    let _ = writeln!(out, " {} ({})", func.name, isa.name());
    let _ = writeln!(
        out,
        " {} params, {} instructions, stack {}",
        func.params,
        obj.len(),
        obj.stack_usage()
    );
    let _ = writeln!(out, "════════════════════════════════════════");

    if !obj.consts().is_empty() {
        let _ = writeln!(out, " constants:");
        for (i, c) in obj.consts().iter().enumerate() {
            let _ = writeln!(out, "   [{}] {}", i, c);
        }
    }

    let linear = obj.linear();
    let targets = collect_jump_targets(isa, &linear);
    let mut ip = 0;

    for block in obj.blocks() {
        let _ = writeln!(out, " {}:", block.name);

        for instr in &block.instrs {
            if targets.contains(&ip) {
                let _ = writeln!(out, "      ┌──────────────────────────────────");
                let _ = write!(out, " {:04} ► ", ip);
            } else {
                let _ = write!(out, " {:04}   ", ip);
            }

            let spec = isa.spec(instr.op);
            let mnemonic = isa.mnemonic(instr.op);
            let _ = write!(out, "{:<12}", mnemonic);

            if isa.is_jump(instr.op) {
                let direction = if instr.arg <= ip { "↑" } else { "↓" };
                let _ = write!(out, "{} (→ {:04})", direction, instr.arg);
            } else if takes_operand(&spec) || instr.arg != 0 {
                let _ = write!(out, "{}", instr.arg);
            }

            if instr.op == isa.const_ref(0).op
                && let Some(c) = obj.consts().get(instr.arg)
            {
                let _ = write!(out, "    ; {}", c);
            }
            let _ = writeln!(out);
            ip += 1;
        }
    }

    out
}

fn takes_operand(spec: &OpSpec) -> bool {
    matches!(spec.argc, Arity::Operand { .. })
}

fn collect_jump_targets<I: InstrSet>(isa: &I, instrs: &[Instr<I::Opcode>]) -> Vec<usize> {
    let mut targets = Vec::new();

    for instr in instrs {
        if isa.is_jump(instr.op) && !targets.contains(&instr.arg) {
            targets.push(instr.arg);
        }
    }

    targets
}
