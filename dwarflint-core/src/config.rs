//! Run configuration: the `accept`/`reject`/`error_criteria` category
//! masks derived from command-line flags, plus the handful of run-wide
//! toggles that change behavior rather than filtering.

use crate::diagnostics::{default_accept, default_error_criteria, default_reject, Category};

/// Everything a run needs that isn't itself part of the category masks:
/// whether a missing `.debug_*` section is an error or just means "this
/// object has no debug info", how noisy to be, and so on.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Treat an object with no debug sections at all as a clean pass
    /// rather than an error (many ELF objects legitimately carry none).
    pub ignore_missing_debug: bool,
    pub quiet: bool,
    pub verbose: bool,
    /// Hold every class of diagnostic this checker can produce to the
    /// same error bar, not just impact-4.
    pub strict: bool,
    /// Accept a handful of constructs GNU toolchains emit that are
    /// technically non-conforming but never flagged by this checker's
    /// upstream counterpart either.
    pub gnu: bool,
    /// Widen what gets reported (accept `SUBOPTIMAL` findings too)
    /// without changing what counts as an error.
    pub tolerant: bool,
    /// Skip the line-number program entirely.
    pub no_line_checks: bool,
    /// Prefix every diagnostic with its raw section offset, for
    /// cross-referencing against `readelf --debug-dump=rawline` et al.
    pub dump_offsets: bool,
    /// Print referring context (the attribute/CU that led to a check)
    /// alongside the diagnostic's own locus.
    pub ref_context: bool,
}

impl Config {
    /// The `accept` mask a run should filter diagnostics through.
    pub fn accept_mask(&self) -> Category {
        let mut accept = default_accept();
        if self.tolerant {
            accept |= Category::SUBOPTIMAL | Category::BLOAT;
        }
        accept
    }

    /// The `reject` mask a run should filter diagnostics through.
    pub fn reject_mask(&self) -> Category {
        let mut reject = default_reject();
        if self.gnu {
            // GNU toolchains routinely emit constructs this checker
            // otherwise classifies as bloat; --gnu silences them rather
            // than trying to special-case every producer quirk.
            reject |= Category::BLOAT;
        }
        reject
    }

    /// The `error_criteria` mask: which categories flip the process
    /// exit code. `--tolerant` never widens this — it only widens what
    /// gets printed.
    pub fn error_criteria(&self) -> Category {
        if self.strict {
            Category::ALL_IMPACT
        } else {
            default_error_criteria()
        }
    }
}
