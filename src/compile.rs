//! The compilation driver: drains the include queue through the parser,
//! runs the post-parse and check stages, then emits the IR module. Stages
//! are strictly ordered and the whole compilation fails atomically when a
//! stage leaves errors in the sink.

use crate::cli::Config;
use crate::codegen;
use crate::error::{report_fatal, ErrorSink};
use crate::lexer::Lexer;
use crate::parser::{parse_file, IncludeState, IncludedFile, Parser};
use crate::{checker, dump, postparse};
use inkwell::context::Context;
use std::fs;
use std::path::Path;

/// Runs a full compilation. Returns the process exit code: zero only when
/// no error-severity diagnostic was raised.
pub fn run(config: &Config) -> i32 {
    let mut sink = ErrorSink::new(config.warn_is_error);
    let mut parser = Parser::new();

    // Seed the include queue with the root file.
    let root = match Path::new(&config.input).canonicalize() {
        Ok(root) => root.to_string_lossy().to_string(),
        Err(err) => {
            report_fatal(&format!(
                "could not open source file \"{}\": {}",
                config.input, err
            ));
            return 1;
        }
    };

    // The root file is registered up front; `@include` directives register
    // and parse further files recursively through the same parser state.
    parser.included_files.push(IncludedFile {
        path: root.clone(),
        state: IncludeState::Done,
    });

    let source = match fs::read_to_string(&root) {
        Ok(source) => source,
        Err(err) => {
            sink.raise_error(
                format!("Could not read source file \"{}\": {}", root, err),
                &root,
                0,
                1,
            );
            sink.emit();
            return 1;
        }
    };

    let mut lxr = Lexer::new(&source, &root, config.warn_is_error);
    let parsed = parse_file(&mut parser, &mut lxr);
    sink.extend(std::mem::take(&mut lxr.errs));

    if !parsed && !sink.failed() {
        sink.raise_error("Parsing stopped before the end of the file.", &root, 0, 1);
    }

    if config.dump_ast {
        dump::dump_ast(&parser);
    }
    if config.dump_symbols {
        dump::dump_symbols(&parser.tbl);
    }
    if config.dump_types {
        dump::dump_types(&parser.tbl);
    }

    if sink.failed() {
        sink.emit();
        return 1;
    }

    // Post-parse: generic struct monomorphization.
    let mut post_errs = ErrorSink::new(config.warn_is_error);
    postparse::permute_generic_structures(&mut parser, &mut post_errs);
    sink.extend(post_errs);

    if sink.failed() {
        sink.emit();
        return 1;
    }

    // Check.
    let check_errs = checker::check(&mut parser, config.warn_is_error);
    sink.extend(check_errs);

    if sink.failed() {
        sink.emit();
        return 1;
    }

    // Emit.
    let context = Context::create();
    let module = codegen::generate_module(
        &context,
        &config.input,
        &parser.tbl,
        &parser.ast,
        &parser.toplevel_decls,
    );

    if let Err(err) = module.print_to_file(&config.output) {
        report_fatal(&format!(
            "could not write output \"{}\": {}",
            config.output, err
        ));
        return 1;
    }

    // Leftover warnings still print on success.
    sink.emit();
    0
}
