use serde::{Deserialize, Serialize};

/// Numeric kind a binary operator node was typed with by the front end.
///
/// Both kinds lower to the same generic numeric opcode; the tag is kept so
/// that forms round-trip unchanged through serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumKind {
    Int,
    Float,
}

/// Binary numeric and comparison operators with a fused instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Quo,
    Gt,
    Lt,
    Eq,
}

impl BinOp {
    pub const ALL: [BinOp; 7] = [
        BinOp::Add,
        BinOp::Sub,
        BinOp::Mul,
        BinOp::Quo,
        BinOp::Gt,
        BinOp::Lt,
        BinOp::Eq,
    ];
}

/// Statement forms.
///
/// Statements never leave a value behind: once compiled, the virtual stack
/// depth is the same as before, except for `Bind`, which names the slot its
/// initializer produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// Leave the function with zero or one results.
    Return { results: Vec<Expr> },

    /// `if test { then } else { else_ }`.
    ///
    /// `else_` is usually a `Block` or another `If` (else-if chains).
    If {
        test: Expr,
        then: Block,
        else_: Option<Box<Stmt>>,
    },

    /// Lexical scope. Bindings introduced inside are dropped on exit.
    Block(Block),

    /// Plain grouping with no scope of its own.
    FormList(Vec<Stmt>),

    /// Introduce a new named slot holding the value of `init`.
    Bind { name: String, init: Expr },

    /// Overwrite an existing named slot.
    Rebind { name: String, expr: Expr },

    /// Call a function for its side effects; the result is discarded.
    CallStmt(Call),

    /// Abort execution with `arg` as the error value.
    Panic { arg: Expr },

    /// `while test { body }`.
    While { test: Expr, body: Block },
}

/// A scoped statement sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub forms: Vec<Stmt>,
}

impl Block {
    pub fn new(forms: Vec<Stmt>) -> Self {
        Self { forms }
    }

    /// Number of slots this block's own scope introduces.
    ///
    /// Counts `Bind`s at this level, looking through `FormList` grouping but
    /// not into nested blocks, which clean up after themselves.
    pub fn scope_len(&self) -> usize {
        scope_len(&self.forms)
    }
}

/// Slots introduced by the `Bind`s of a statement sequence.
pub fn scope_len(forms: &[Stmt]) -> usize {
    forms
        .iter()
        .map(|form| match form {
            Stmt::Bind { .. } => 1,
            Stmt::FormList(inner) => scope_len(inner),
            _ => 0,
        })
        .sum()
}

/// A named-function invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub func: String,
    pub args: Vec<Expr>,
}

/// Expression forms. Each compiled expression leaves exactly one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Symbol(String),
    Bool(bool),

    /// Reference to a parameter or bound variable.
    Var(String),

    /// Operator node with exactly two operands.
    Binary {
        op: BinOp,
        kind: NumKind,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    /// Operator applied to an arbitrary argument list.
    ///
    /// Two arguments compile to the fused instruction; any other arity
    /// degrades to a call of the operator's fallback function.
    Op {
        op: BinOp,
        kind: NumKind,
        args: Vec<Expr>,
    },

    Call(Call),

    /// The `index`-th secondary result of the last multi-value call.
    MultiValueRef { index: usize },
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn sym(name: impl Into<String>) -> Self {
        Expr::Symbol(name.into())
    }

    pub fn binary(op: BinOp, kind: NumKind, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            kind,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn call(func: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call(Call {
            func: func.into(),
            args,
        })
    }
}

impl Stmt {
    pub fn bind(name: impl Into<String>, init: Expr) -> Self {
        Stmt::Bind {
            name: name.into(),
            init,
        }
    }

    pub fn rebind(name: impl Into<String>, expr: Expr) -> Self {
        Stmt::Rebind {
            name: name.into(),
            expr,
        }
    }

    pub fn ret(result: Expr) -> Self {
        Stmt::Return {
            results: vec![result],
        }
    }

    pub fn ret_void() -> Self {
        Stmt::Return { results: vec![] }
    }

    pub fn call(func: impl Into<String>, args: Vec<Expr>) -> Self {
        Stmt::CallStmt(Call {
            func: func.into(),
            args,
        })
    }

    pub fn block(forms: Vec<Stmt>) -> Self {
        Stmt::Block(Block::new(forms))
    }
}

/// A function as handed over by the front end: parameter names plus body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

impl FuncDecl {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }
}
