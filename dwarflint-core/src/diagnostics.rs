//! The category taxonomy and diagnostic sink.
//!
//! A diagnostic carries a bitmask of categories. Whether it is printed is
//! governed by an `accept`/`reject` mask pair; whether it counts as an
//! error (and therefore flips the process exit code) is governed
//! separately by `error_criteria`. Diagnostics never panic or propagate as
//! `Result` — they are pure side effects recorded on a [`Diagnostics`]
//! handle.

use std::fmt;

use bitflags::bitflags;

use crate::locus::Locus;

bitflags! {
    /// A bitmask classifying a single diagnostic along every axis that
    /// matters for filtering: severity, accuracy, area, and the `error`
    /// outcome-kind override.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Category: u32 {
        /// Cosmetic.
        const IMPACT_1 = 1 << 0;
        /// Suspicious.
        const IMPACT_2 = 1 << 1;
        /// Probably affects consumers.
        const IMPACT_3 = 1 << 2;
        /// Definitely wrong.
        const IMPACT_4 = 1 << 3;

        /// Wasteful but legal.
        const BLOAT = 1 << 4;
        /// Legal but harder to consume.
        const SUBOPTIMAL = 1 << 5;

        const LEB128 = 1 << 6;
        const ABBREVS = 1 << 7;
        const DIE_REL = 1 << 8;
        const DIE_OTHER = 1 << 9;
        const STRINGS = 1 << 10;
        const ARANGES = 1 << 11;
        const LINE = 1 << 12;
        const RELOC = 1 << 13;
        const LOC = 1 << 14;
        const RANGES = 1 << 15;
        const PUBTABLES = 1 << 16;
        const ELF = 1 << 17;
        const HEADER = 1 << 18;

        /// Forces severity to error regardless of impact.
        const ERROR = 1 << 19;

        const ALL_IMPACT = Self::IMPACT_1.bits() | Self::IMPACT_2.bits()
            | Self::IMPACT_3.bits() | Self::IMPACT_4.bits();
        const ALL_AREA = Self::LEB128.bits() | Self::ABBREVS.bits() | Self::DIE_REL.bits()
            | Self::DIE_OTHER.bits() | Self::STRINGS.bits() | Self::ARANGES.bits()
            | Self::LINE.bits() | Self::RELOC.bits() | Self::LOC.bits() | Self::RANGES.bits()
            | Self::PUBTABLES.bits() | Self::ELF.bits() | Self::HEADER.bits();
    }
}

/// The default accept mask: everything. Flags narrow it down from here.
pub fn default_accept() -> Category {
    Category::all()
}

/// The default reject mask: nothing.
pub fn default_reject() -> Category {
    Category::empty()
}

/// The default `error_criteria`: impact-4 only.
pub fn default_error_criteria() -> Category {
    Category::IMPACT_4
}

/// A single finding, always anchored by a [`Locus`].
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub category: Category,
    pub locus: Locus,
    pub message: String,
}

impl Diagnostic {
    pub fn new(category: Category, locus: Locus, message: impl Into<String>) -> Self {
        Self {
            category,
            locus,
            message: message.into(),
        }
    }

    /// Whether this diagnostic counts as an error under `error_criteria`.
    pub fn is_error(&self, error_criteria: Category) -> bool {
        self.category.contains(Category::ERROR) || self.category.intersects(error_criteria)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.locus, self.message)
    }
}

/// Process-wide (per-run) diagnostics sink, threaded by reference into
/// every check instead of living behind a global.
pub struct Diagnostics {
    accept: Category,
    reject: Category,
    error_criteria: Category,
    emitted: Vec<Diagnostic>,
    error_count: usize,
}

impl Diagnostics {
    pub fn new(accept: Category, reject: Category, error_criteria: Category) -> Self {
        Self {
            accept,
            reject,
            error_criteria,
            emitted: Vec::new(),
            error_count: 0,
        }
    }

    /// Filters and records a diagnostic. A diagnostic is kept iff
    /// `mask & accept != 0 && mask & reject == 0`.
    pub fn emit(&mut self, category: Category, locus: Locus, message: impl Into<String>) {
        let diag = Diagnostic::new(category, locus, message);
        if diag.is_error(self.error_criteria) {
            self.error_count += 1;
        }
        if diag.category.intersects(self.accept) && !diag.category.intersects(self.reject) {
            self.emitted.push(diag);
        }
    }

    pub fn error(&mut self, category: Category, locus: Locus, message: impl Into<String>) {
        self.emit(category | Category::ERROR, locus, message);
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.emitted
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locus() -> Locus {
        Locus::section(crate::section::SectionId::DebugInfo)
    }

    #[test]
    fn error_criteria_flips_on_impact() {
        let mut d = Diagnostics::new(default_accept(), default_reject(), default_error_criteria());
        d.emit(Category::IMPACT_2 | Category::DIE_OTHER, locus(), "suspicious");
        assert!(!d.has_errors());
        d.emit(Category::IMPACT_4 | Category::DIE_OTHER, locus(), "definitely wrong");
        assert!(d.has_errors());
        assert_eq!(d.error_count(), 1);
    }

    #[test]
    fn error_category_always_counts() {
        let mut d = Diagnostics::new(default_accept(), default_reject(), default_error_criteria());
        d.error(Category::IMPACT_1 | Category::ABBREVS, locus(), "forced error");
        assert!(d.has_errors());
    }

    #[test]
    fn reject_mask_filters_output_but_not_error_count() {
        let mut d = Diagnostics::new(default_accept(), Category::BLOAT, default_error_criteria());
        d.emit(Category::BLOAT | Category::IMPACT_1, locus(), "wasteful");
        assert!(d.diagnostics().is_empty());
    }

    #[test]
    fn tolerant_widens_accept_not_error_criteria() {
        // --tolerant widens `accept` to include suboptimal, but never
        // widens `error_criteria`.
        let accept = default_accept();
        let error_criteria = default_error_criteria();
        let mut d = Diagnostics::new(accept, default_reject(), error_criteria);
        d.emit(Category::SUBOPTIMAL | Category::IMPACT_2, locus(), "harder to consume");
        assert!(!d.has_errors());
        assert_eq!(d.diagnostics().len(), 1);
    }
}
