use thiserror::Error;

use crate::bytecode::object::Object;
use crate::bytecode::op::{Instr, InstrSet, JumpKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackCheckError {
    #[error("stack-check error: underflow at ip={ip}, {op} needs {needed} items, depth is {depth}")]
    Underflow {
        ip: usize,
        op: &'static str,
        needed: usize,
        depth: usize,
    },

    #[error("stack-check error: paths reach ip={ip} with depths {first} and {second}")]
    JoinMismatch {
        ip: usize,
        first: usize,
        second: usize,
    },

    #[error("stack-check error: control falls off the end of the code after ip={ip}")]
    FallsOffEnd { ip: usize },

    #[error("stack-check error: depth {depth} at ip={ip} exceeds recorded usage {usage}")]
    ExceedsUsage {
        ip: usize,
        depth: usize,
        usage: usize,
    },
}

/// Check stack effects along every control-flow path.
///
/// Starting at ip 0 with `initial` live slots, each reachable instruction
/// is visited once. Paths that join must agree on depth, no instruction
/// may consume more than is live, no path may run past the last
/// instruction, and no depth may exceed `usage`.
///
/// Returns the depth observed at each instruction (`None` if unreachable).
pub fn check_instrs<I: InstrSet>(
    isa: &I,
    instrs: &[Instr<I::Opcode>],
    initial: usize,
    usage: usize,
) -> Result<Vec<Option<usize>>, StackCheckError> {
    let mut depths: Vec<Option<usize>> = vec![None; instrs.len()];
    let mut work = Vec::new();

    if initial > usage {
        return Err(StackCheckError::ExceedsUsage {
            ip: 0,
            depth: initial,
            usage,
        });
    }

    if instrs.is_empty() {
        return Ok(depths);
    }
    depths[0] = Some(initial);
    work.push(0);

    while let Some(ip) = work.pop() {
        let depth = depths[ip].unwrap_or(initial);
        let instr = &instrs[ip];
        let spec = isa.spec(instr.op);

        let needed = spec.consumes(instr.arg);
        if needed > depth {
            return Err(StackCheckError::Underflow {
                ip,
                op: isa.mnemonic(instr.op),
                needed,
                depth,
            });
        }
        let after = depth - needed + spec.produces();
        if after > usage {
            return Err(StackCheckError::ExceedsUsage {
                ip,
                depth: after,
                usage,
            });
        }

        let mut successors = Vec::with_capacity(2);
        match isa.jump_kind(instr.op) {
            Some(JumpKind::Always) => successors.push(instr.arg),
            Some(JumpKind::IfNil) => {
                successors.push(instr.arg);
                successors.push(ip + 1);
            }
            None if !spec.terminal => successors.push(ip + 1),
            None => {}
        }

        for next in successors {
            if next >= instrs.len() {
                return Err(StackCheckError::FallsOffEnd { ip });
            }
            match depths[next] {
                Some(seen) if seen != after => {
                    return Err(StackCheckError::JoinMismatch {
                        ip: next,
                        first: seen,
                        second: after,
                    });
                }
                Some(_) => {}
                None => {
                    depths[next] = Some(after);
                    work.push(next);
                }
            }
        }
    }

    Ok(depths)
}

/// Check a finished object whose function takes `params` arguments.
pub fn check_object<I: InstrSet>(
    isa: &I,
    object: &Object<I::Opcode>,
    params: usize,
) -> Result<Vec<Option<usize>>, StackCheckError> {
    check_instrs(isa, &object.linear(), params, object.stack_usage())
}
