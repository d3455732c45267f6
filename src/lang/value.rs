use serde::{Deserialize, Serialize};

/// Constant-pool entry.
///
/// These are the only values a compiled function can load by index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// 64-bit signed integer.
    Int(i64),

    /// 64-bit floating-point number.
    Float(f64),

    /// UTF-8 string.
    String(String),

    /// Interned symbol; function names are referenced this way.
    Symbol(String),
}

impl std::fmt::Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::Int(n) => write!(f, "{}", n),
            Constant::Float(n) => write!(f, "{:?}", n),
            Constant::String(s) => write!(f, "{:?}", s),
            Constant::Symbol(s) => write!(f, "'{}", s),
        }
    }
}
