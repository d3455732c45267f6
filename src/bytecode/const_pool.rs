use std::collections::HashMap;

use crate::lang::value::Constant;

/// Dedup key: kind plus value, floats by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Int(i64),
    Float(u64),
    String(String),
    Symbol(String),
}

/// Deduplicating constant store for one compiled function.
///
/// Indices follow first-insertion order and are never reused.
#[derive(Debug, Default)]
pub struct ConstPool {
    values: Vec<Constant>,
    index: HashMap<Key, usize>,
}

impl ConstPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_int(&mut self, value: i64) -> usize {
        self.insert(Key::Int(value), || Constant::Int(value))
    }

    pub fn insert_float(&mut self, value: f64) -> usize {
        self.insert(Key::Float(value.to_bits()), || Constant::Float(value))
    }

    pub fn insert_string(&mut self, value: &str) -> usize {
        self.insert(Key::String(value.to_string()), || {
            Constant::String(value.to_string())
        })
    }

    pub fn insert_symbol(&mut self, value: &str) -> usize {
        self.insert(Key::Symbol(value.to_string()), || {
            Constant::Symbol(value.to_string())
        })
    }

    fn insert(&mut self, key: Key, make: impl FnOnce() -> Constant) -> usize {
        *self.index.entry(key).or_insert_with(|| {
            self.values.push(make());
            self.values.len() - 1
        })
    }

    pub fn into_values(self) -> Vec<Constant> {
        self.values
    }
}
