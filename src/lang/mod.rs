//! # Form trees
//!
//! This module defines the input of the compiler: a tree of statement and
//! expression forms produced by an upstream front end, plus the constant
//! values those forms can mention.
//!
//! Forms are assumed to be type-correct and scope-correct. The compiler
//! performs no semantic validation beyond what it needs to keep its own
//! stack model consistent.

pub mod form;
pub mod predicates;
pub mod value;
