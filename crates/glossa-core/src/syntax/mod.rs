//! Syntax toolkit for the stored source language: tokens, AST,
//! recursive-descent parser, and the deterministic unparser.

pub mod ast;
pub mod parser;
pub mod token;
pub mod unparse;

pub use parser::parse_module;
pub use unparse::{unparse_expr, unparse_module};
