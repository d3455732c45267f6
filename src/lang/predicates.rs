use super::form::{Block, Stmt};

/// Name of the function whose call never returns.
pub const PANIC_FN: &str = "panic";

/// Returns true for statements that unconditionally leave the function,
/// so control never falls through to whatever follows them.
pub fn is_returning(form: &Stmt) -> bool {
    match form {
        Stmt::Return { .. } | Stmt::Panic { .. } => true,
        Stmt::Block(block) => block_is_returning(block),
        Stmt::FormList(forms) => forms.iter().any(is_returning),
        // Both branches must return; a missing else falls through.
        Stmt::If { then, else_, .. } => {
            block_is_returning(then) && else_.as_deref().is_some_and(is_returning)
        }
        // The test may fail before the body ever runs.
        Stmt::While { .. } => false,
        Stmt::CallStmt(call) => call.func == PANIC_FN,
        Stmt::Bind { .. } | Stmt::Rebind { .. } => false,
    }
}

pub fn block_is_returning(block: &Block) -> bool {
    block.forms.iter().any(is_returning)
}
