//! Command-line surface. Every flag here maps onto a [`dwarflint_core::Config`]
//! field; parsing and config-building are kept separate so tests can build
//! a `Config` without going through `clap`.

use std::path::PathBuf;

use clap::Parser;
use dwarflint_core::Config;

/// Pedantic structural validator for DWARF debugging information in ELF
/// object files.
#[derive(Debug, Parser)]
#[command(name = "dwarflint", version, about)]
pub struct Args {
    /// ELF objects to check.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Treat an object with no debug sections as clean instead of an error.
    #[arg(long)]
    pub ignore_missing_debug: bool,

    /// Suppress everything but the final error count.
    #[arg(short, long)]
    pub quiet: bool,

    /// Raise logging verbosity (debug-level internal tracing).
    #[arg(short, long)]
    pub verbose: bool,

    /// Hold every diagnostic category to the same error bar, not just
    /// impact-4 findings.
    #[arg(long)]
    pub strict: bool,

    /// Accept constructs GNU toolchains commonly emit that are technically
    /// non-conforming.
    #[arg(long)]
    pub gnu: bool,

    /// Also report findings in the suboptimal/bloat categories.
    #[arg(long)]
    pub tolerant: bool,

    /// Skip the line-number program.
    #[arg(long = "no-line-checks")]
    pub no_line_checks: bool,

    /// Prefix every diagnostic with its raw section offset.
    #[arg(long = "dump-offsets")]
    pub dump_offsets: bool,

    /// Print the referring context alongside a diagnostic's own locus.
    #[arg(long = "ref-context")]
    pub ref_context: bool,
}

impl Args {
    pub fn to_config(&self) -> Config {
        Config {
            ignore_missing_debug: self.ignore_missing_debug,
            quiet: self.quiet,
            verbose: self.verbose,
            strict: self.strict,
            gnu: self.gnu,
            tolerant: self.tolerant,
            no_line_checks: self.no_line_checks,
            dump_offsets: self.dump_offsets,
            ref_context: self.ref_context,
        }
    }
}
