//! Type checker: a recursive post-order evaluator over the AST. Each node
//! yields its computed type (or nothing for statements and errors), and
//! diagnostics accumulate without aborting so a single pass reports as much
//! as possible.

pub mod convert;
pub mod evaluate;

use crate::ast::{Ast, NodeId};
use crate::entity::EntityTable;
use crate::error::ErrorSink;
use crate::parser::Parser;

pub use evaluate::evaluate;

/// State threaded through evaluation: the entity table (mutated when
/// inference writes deduced types back), the AST, and the diagnostic sink.
pub struct CheckerContext<'a> {
    pub tbl: &'a mut EntityTable,
    pub ast: &'a Ast,
    pub errs: ErrorSink,
}

impl<'a> CheckerContext<'a> {
    pub fn raise_error(&mut self, message: impl Into<String>, node: NodeId) {
        let node = &self.ast[node];
        self.errs
            .raise_error(message, &node.file.clone(), node.pos, node.line);
    }

    pub fn raise_warning(&mut self, message: impl Into<String>, node: NodeId) {
        let node = &self.ast[node];
        self.errs
            .raise_warning(message, &node.file.clone(), node.pos, node.line);
    }
}

/// Checks every top-level declaration. Returns the accumulated diagnostics;
/// the compilation fails atomically afterwards if any carry error severity.
pub fn check(parser: &mut Parser, warn_is_err: bool) -> ErrorSink {
    let mut ctx = CheckerContext {
        tbl: &mut parser.tbl,
        ast: &parser.ast,
        errs: ErrorSink::new(warn_is_err),
    };

    for node in &parser.toplevel_decls {
        if ctx.ast.kind(*node).needs_evaluating() {
            evaluate(*node, &mut ctx);
        }
    }

    ctx.errs
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::parser::parse_source;
    use crate::postparse::permute_generic_structures;

    /// Runs parse, post-parse and check over a source string.
    pub fn check_source(source: &str) -> (Parser, ErrorSink) {
        let (mut parser, parse_errs) = parse_source(source);
        assert!(!parse_errs.failed(), "parse failed: {:?}", parse_errs);

        let mut post_errs = ErrorSink::new(false);
        let ok = permute_generic_structures(&mut parser, &mut post_errs);
        assert!(ok, "postparse failed: {:?}", post_errs);

        let errs = check(&mut parser, false);
        (parser, errs)
    }

    pub fn check_ok(source: &str) -> Parser {
        let (parser, errs) = check_source(source);
        assert!(!errs.failed(), "unexpected diagnostics: {:?}", errs);
        parser
    }

    pub fn check_fails(source: &str) -> ErrorSink {
        let (_, errs) = check_source(source);
        assert!(errs.failed(), "expected diagnostics, got none");
        errs
    }
}
