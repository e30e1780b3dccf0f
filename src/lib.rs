//! takc: a compiler for the Tak language.
//!
//! The pipeline is strictly staged: lexing ([`lexer`]) feeds the
//! recursive-descent [`parser`], which populates the [`entity`] tables and
//! builds the [`ast`]. The [`postparse`] pass monomorphizes generic struct
//! instantiations, the [`checker`] performs bidirectional type inference
//! and validation, and [`codegen`] lowers the result to LLVM IR. The
//! [`compile`] driver wires the stages together behind the [`cli`] surface.

pub mod ast;
pub mod checker;
pub mod cli;
pub mod codegen;
pub mod compile;
pub mod dump;
pub mod entity;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod postparse;
pub mod token;
pub mod types;

pub use cli::Config;
pub use error::{Diagnostic, ErrorSink, Severity};
pub use types::{Primitive, TypeData, TypeFlags, TypeKind, TypeName};
