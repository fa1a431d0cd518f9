//! Renders a completed [`Diagnostics`] run to stdout and turns it into an
//! exit code. Kept separate from `main` so the formatting can be unit
//! tested without a real object file.

use dwarflint_core::{Diagnostic, Diagnostics};

use crate::args::Args;

/// Prints every accepted diagnostic for one object, returns whether the
/// run should be treated as failed.
pub fn report(path: &std::path::Path, diagnostics: &Diagnostics, args: &Args) -> bool {
    if !args.quiet {
        for diagnostic in diagnostics.diagnostics() {
            println!("{}: {}", path.display(), format_diagnostic(diagnostic, args));
        }
    }
    diagnostics.has_errors()
}

fn format_diagnostic(diagnostic: &Diagnostic, args: &Args) -> String {
    if args.ref_context {
        format!("{diagnostic} [{:?}]", diagnostic.category)
    } else {
        diagnostic.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwarflint_core::{Category, Locus};
    use std::path::Path;

    fn args() -> Args {
        Args {
            inputs: vec![],
            ignore_missing_debug: false,
            quiet: false,
            verbose: false,
            strict: false,
            gnu: false,
            tolerant: false,
            no_line_checks: false,
            dump_offsets: false,
            ref_context: false,
        }
    }

    #[test]
    fn clean_run_is_not_failed() {
        let diagnostics = Diagnostics::new(Category::all(), Category::empty(), Category::IMPACT_4);
        assert!(!report(Path::new("a.o"), &diagnostics, &args()));
    }

    #[test]
    fn run_with_errors_is_failed() {
        let mut diagnostics = Diagnostics::new(Category::all(), Category::empty(), Category::IMPACT_4);
        diagnostics.error(Category::IMPACT_4 | Category::DIE_OTHER, Locus::section(dwarflint_core::SectionId::DebugInfo), "bad");
        assert!(report(Path::new("a.o"), &diagnostics, &args()));
    }

    #[test]
    fn quiet_suppresses_printing_but_not_exit_status() {
        let mut diagnostics = Diagnostics::new(Category::all(), Category::empty(), Category::IMPACT_4);
        diagnostics.error(Category::IMPACT_4 | Category::DIE_OTHER, Locus::section(dwarflint_core::SectionId::DebugInfo), "bad");
        let mut quiet_args = args();
        quiet_args.quiet = true;
        assert!(report(Path::new("a.o"), &diagnostics, &quiet_args));
    }
}
