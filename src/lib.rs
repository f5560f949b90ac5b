//! This crate contains code for an untyped lambda calculus interpreter with
//! top-level bindings and normal-order reduction.

pub mod end_to_end;
pub mod environment;
pub mod lexical_analysis;
pub mod program_execution;
pub mod program_representation;
pub mod recursive_descent_parsing;
pub mod repl;
