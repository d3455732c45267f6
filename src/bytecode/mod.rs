pub mod code;
pub mod compile;
pub mod compile_error;
pub mod const_pool;
pub mod disasm;
pub mod generic;
pub mod lap;
pub mod object;
pub mod op;
pub mod stack;
pub mod stack_check;

pub use compile::{Compiler, CompilerConfig, compile_func};
pub use compile_error::{CompileError, Violation};
pub use generic::{Ir, IrOp};
pub use lap::{Lap, LapOp};
pub use object::{CodeBlock, Func, Object};
pub use op::{Instr, InstrSet, OpSpec};
