//! Command-line surface for `takc`.

use clap::Parser as ClapParser;

/// The Tak compiler.
#[derive(Debug, ClapParser)]
#[command(name = "takc")]
#[command(about = "Compiler for the Tak language, targeting LLVM IR", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the root source file
    #[arg(long, short = 'i')]
    pub input: String,

    /// Path for the emitted IR
    #[arg(long, short = 'o', default_value = "a.out")]
    pub output: String,

    /// Optimization hint (0-3); passed through, unused by the front-end
    #[arg(long = "opt", short = 'O', default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=3))]
    pub opt: u8,

    /// Promote warnings to errors
    #[arg(long = "warn-is-error", alias = "we", short = 'w', default_value_t = false)]
    pub warn_is_error: bool,

    /// Print the AST after parsing
    #[arg(long = "dump-ast", alias = "da", default_value_t = false)]
    pub dump_ast: bool,

    /// Print the symbol table
    #[arg(long = "dump-symbols", alias = "ds", default_value_t = false)]
    pub dump_symbols: bool,

    /// Print the user-type registry
    #[arg(long = "dump-types", alias = "dt", default_value_t = false)]
    pub dump_types: bool,
}

/// Immutable compilation configuration, threaded through the pipeline by
/// value.
#[derive(Debug, Clone)]
pub struct Config {
    pub input: String,
    pub output: String,
    pub opt_level: u8,
    pub warn_is_error: bool,
    pub dump_ast: bool,
    pub dump_symbols: bool,
    pub dump_types: bool,
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Self {
            input: cli.input,
            output: cli.output,
            opt_level: cli.opt,
            warn_is_error: cli.warn_is_error,
            dump_ast: cli.dump_ast,
            dump_symbols: cli.dump_symbols,
            dump_types: cli.dump_types,
        }
    }
}

impl Config {
    pub fn parse_args() -> Self {
        Cli::parse().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn minimal_invocation() {
        let cli = Cli::try_parse_from(["takc", "-i", "main.tak"]).unwrap();
        assert_eq!(cli.input, "main.tak");
        assert_eq!(cli.output, "a.out");
        assert_eq!(cli.opt, 0);
        assert!(!cli.warn_is_error);
    }

    #[test]
    fn input_is_required() {
        assert!(Cli::try_parse_from(["takc"]).is_err());
    }

    #[test]
    fn opt_level_is_bounded() {
        assert!(Cli::try_parse_from(["takc", "-i", "m.tak", "-O", "4"]).is_err());
        let cli = Cli::try_parse_from(["takc", "-i", "m.tak", "-O", "3"]).unwrap();
        assert_eq!(cli.opt, 3);
    }

    #[test]
    fn long_form_aliases() {
        let cli = Cli::try_parse_from([
            "takc", "--input", "m.tak", "--we", "--da", "--ds", "--dt",
        ])
        .unwrap();

        assert!(cli.warn_is_error);
        assert!(cli.dump_ast);
        assert!(cli.dump_symbols);
        assert!(cli.dump_types);
    }

    #[test]
    fn duplicate_flags_are_rejected() {
        assert!(Cli::try_parse_from(["takc", "-i", "a.tak", "-i", "b.tak"]).is_err());
    }
}
