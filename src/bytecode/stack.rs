use crate::bytecode::compile_error::CompileError;

/// What a live slot of the virtual stack holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Named variable: parameter or bind.
    Var(String),
    /// Value loaded from the constant pool at this index.
    Const(usize),
    /// Anonymous intermediate result.
    Tmp,
}

/// Compile-time model of the runtime operand stack.
///
/// After every emission the slot count equals the number of values the VM
/// would hold at that point.
#[derive(Debug, Default)]
pub struct VirtualStack {
    slots: Vec<Slot>,
    max_size: usize,
}

impl VirtualStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_var(&mut self, name: impl Into<String>) {
        self.push(Slot::Var(name.into()));
    }

    pub fn push_const(&mut self, index: usize) {
        self.push(Slot::Const(index));
    }

    pub fn push_tmp(&mut self) {
        self.push(Slot::Tmp);
    }

    fn push(&mut self, slot: Slot) {
        self.slots.push(slot);
        self.max_size = self.max_size.max(self.slots.len());
    }

    pub fn drop(&mut self, n: usize) -> Result<(), CompileError> {
        let len = self.slots.len();
        if n > len {
            return Err(CompileError::underflow(n, len));
        }
        self.slots.truncate(len - n);
        Ok(())
    }

    /// Absolute index of the most recent binding of `name`.
    pub fn find_var(&self, name: &str) -> Result<usize, CompileError> {
        self.slots
            .iter()
            .rposition(|slot| matches!(slot, Slot::Var(n) if n == name))
            .ok_or_else(|| CompileError::unbound_var(name))
    }

    /// Rename the top slot; the value itself stays where it is.
    pub fn bind_top(&mut self, name: impl Into<String>) -> Result<(), CompileError> {
        match self.slots.last_mut() {
            Some(top) => {
                *top = Slot::Var(name.into());
                Ok(())
            }
            None => Err(CompileError::underflow(1, 0)),
        }
    }

    /// Number of live slots.
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}
