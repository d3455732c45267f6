use thiserror::Error;

/// A broken precondition of the compiler.
///
/// Either the front end handed over a malformed form tree or the compiler
/// itself lost track of the stack. Neither is recoverable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("reference to unbound variable '{0}'")]
    UnboundVariable(String),

    #[error("stack underflow: dropping {requested} slots with only {available} live")]
    StackUnderflow { requested: usize, available: usize },

    #[error("{count} jump(s) never bound to a target")]
    DanglingJump { count: usize },

    #[error("if branches leave different stack depths (then: {then}, else: {else_})")]
    BranchDepthMismatch { then: usize, else_: usize },

    #[error("scope exit at depth {actual}, expected {expected}")]
    ScopeDepthMismatch { expected: usize, actual: usize },

    #[error("multi-value reference to index {0}; index 0 is the primary result")]
    InvalidMultiValueIndex(usize),

    #[error("{0}")]
    StackCheck(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A language feature the compiler does not implement yet.
    #[error("compile error: not implemented: {feature}")]
    UnsupportedFeature { feature: String },

    /// The form tree or the compiler broke an internal invariant.
    #[error("compile error: internal error: {0}")]
    InternalInvariantViolation(#[from] Violation),

    /// Peak stack usage exceeded the configured limit.
    #[error("compile error: stack usage {peak} exceeds limit {limit}")]
    StackLimitExceeded { peak: usize, limit: usize },
}

impl CompileError {
    pub fn unsupported(feature: impl Into<String>) -> Self {
        CompileError::UnsupportedFeature {
            feature: feature.into(),
        }
    }

    pub fn unbound_var(name: &str) -> Self {
        Violation::UnboundVariable(name.to_string()).into()
    }

    pub fn underflow(requested: usize, available: usize) -> Self {
        Violation::StackUnderflow {
            requested,
            available,
        }
        .into()
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, CompileError::InternalInvariantViolation(_))
    }

    pub fn violation(&self) -> Option<&Violation> {
        match self {
            CompileError::InternalInvariantViolation(v) => Some(v),
            _ => None,
        }
    }
}
