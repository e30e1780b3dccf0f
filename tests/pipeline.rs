//! End-to-end pipeline tests through the compile driver: include
//! resolution, atomic failure, and warning promotion.

use std::fs;
use takc::cli::Config;
use takc::compile;

fn config_for(dir: &tempfile::TempDir, input: &str, warn_is_error: bool) -> Config {
    Config {
        input: input.to_string(),
        output: dir
            .path()
            .join("out.ll")
            .to_string_lossy()
            .to_string(),
        opt_level: 0,
        warn_is_error,
        dump_ast: false,
        dump_symbols: false,
        dump_types: false,
    }
}

#[test]
fn include_resolution_merges_files() {
    let dir = tempfile::tempdir().unwrap();

    let lib = dir.path().join("lib.tak");
    fs::write(&lib, "helper :: proc() -> i32 { ret 7; }\n").unwrap();

    let root = dir.path().join("main.tak");
    fs::write(
        &root,
        "@include \"lib.tak\";\n\
         main :: proc() -> i32 { ret helper(); }\n",
    )
    .unwrap();

    let config = config_for(&dir, &root.to_string_lossy(), false);
    assert_eq!(compile::run(&config), 0);

    let ir = fs::read_to_string(&config.output).unwrap();
    assert!(ir.contains("define i32 @helper"));
    assert!(ir.contains("define i32 @main"));
}

#[test]
fn include_cycles_do_not_loop() {
    let dir = tempfile::tempdir().unwrap();

    let a = dir.path().join("a.tak");
    let b = dir.path().join("b.tak");
    fs::write(&a, "@include \"b.tak\";\nvalue_a : i32 = 1;\n").unwrap();
    fs::write(&b, "@include \"a.tak\";\nvalue_b : i32 = 2;\n").unwrap();

    let config = config_for(&dir, &a.to_string_lossy(), false);
    assert_eq!(compile::run(&config), 0);

    let ir = fs::read_to_string(&config.output).unwrap();
    assert!(ir.contains("@value_a"));
    assert!(ir.contains("@value_b"));
}

#[test]
fn missing_input_is_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&dir, "does-not-exist.tak", false);
    assert_ne!(compile::run(&config), 0);
}

#[test]
fn type_errors_fail_atomically() {
    let dir = tempfile::tempdir().unwrap();

    let root = dir.path().join("main.tak");
    fs::write(
        &root,
        "main :: proc() -> void { x : i8 = 0; y : i32 = 0; x = y; }\n",
    )
    .unwrap();

    let config = config_for(&dir, &root.to_string_lossy(), false);
    assert_ne!(compile::run(&config), 0);
    assert!(!fs::metadata(&config.output).is_ok());
}

#[test]
fn syntax_errors_fail_before_codegen() {
    let dir = tempfile::tempdir().unwrap();

    let root = dir.path().join("main.tak");
    fs::write(&root, "main :: proc() -> void { x : = ; }\n").unwrap();

    let config = config_for(&dir, &root.to_string_lossy(), false);
    assert_ne!(compile::run(&config), 0);
}

#[test]
fn warnings_promote_with_flag() {
    let dir = tempfile::tempdir().unwrap();

    let root = dir.path().join("main.tak");
    fs::write(
        &root,
        "@intern id :: proc[T](x: T) -> T { ret x; }\n\
         main :: proc() -> i32 { ret 0; }\n",
    )
    .unwrap();

    let relaxed = config_for(&dir, &root.to_string_lossy(), false);
    assert_eq!(compile::run(&relaxed), 0);

    let strict_dir = tempfile::tempdir().unwrap();
    let strict = config_for(&strict_dir, &root.to_string_lossy(), true);
    assert_ne!(compile::run(&strict), 0);
}
