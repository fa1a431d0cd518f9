//! Structured source locations for diagnostics.
//!
//! Modeled as a tagged union (section identity + coordinates + optional
//! referrer locus) with a single `Display` implementation, rather than a
//! hierarchy of location types each formatting itself.

use std::fmt;

use crate::section::SectionId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Coord {
    Offset(u64),
    Cu(u64),
    Die(u64),
    Attribute(&'static str),
    Table(u64),
    Index(usize),
    Label(&'static str),
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coord::Offset(o) => write!(f, "offset {o:#x}"),
            Coord::Cu(o) => write!(f, "CU {o:#x}"),
            Coord::Die(o) => write!(f, "DIE {o:#x}"),
            Coord::Attribute(name) => write!(f, "attribute {name}"),
            Coord::Table(o) => write!(f, "table {o:#x}"),
            Coord::Index(i) => write!(f, "#{i}"),
            Coord::Label(l) => f.write_str(l),
        }
    }
}

/// A composable, tagged diagnostic location. Every diagnostic carries one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locus {
    section: SectionId,
    coords: Vec<Coord>,
    referrer: Option<Box<Locus>>,
}

impl Locus {
    pub fn section(section: SectionId) -> Self {
        Locus {
            section,
            coords: Vec::new(),
            referrer: None,
        }
    }

    pub fn at_offset(section: SectionId, offset: u64) -> Self {
        Locus::section(section).with_offset(offset)
    }

    fn push(mut self, coord: Coord) -> Self {
        self.coords.push(coord);
        self
    }

    pub fn with_offset(self, offset: u64) -> Self {
        self.push(Coord::Offset(offset))
    }

    pub fn with_cu(self, cu_offset: u64) -> Self {
        self.push(Coord::Cu(cu_offset))
    }

    pub fn with_die(self, die_offset: u64) -> Self {
        self.push(Coord::Die(die_offset))
    }

    pub fn with_attribute(self, name: &'static str) -> Self {
        self.push(Coord::Attribute(name))
    }

    pub fn with_table(self, table_offset: u64) -> Self {
        self.push(Coord::Table(table_offset))
    }

    pub fn with_index(self, index: usize) -> Self {
        self.push(Coord::Index(index))
    }

    pub fn with_label(self, label: &'static str) -> Self {
        self.push(Coord::Label(label))
    }

    /// Marks this locus as described relative to another ("... relative
    /// to ...").
    pub fn relative_to(mut self, referrer: Locus) -> Self {
        self.referrer = Some(Box::new(referrer));
        self
    }

    pub fn section_id(&self) -> SectionId {
        self.section
    }
}

impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.section)?;
        for coord in &self.coords {
            write!(f, ": {coord}")?;
        }
        if let Some(referrer) = &self.referrer {
            write!(f, " (relative to {referrer})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_die_with_attribute() {
        let locus = Locus::section(SectionId::DebugInfo)
            .with_cu(0)
            .with_die(0x2b)
            .with_attribute("DW_AT_name");
        assert_eq!(
            locus.to_string(),
            ".debug_info: CU 0x0: DIE 0x2b: attribute DW_AT_name"
        );
    }

    #[test]
    fn relative_locus_composes() {
        let origin = Locus::section(SectionId::DebugLoc).with_offset(0x10);
        let referrer = Locus::section(SectionId::DebugInfo).with_die(0x4);
        let locus = origin.relative_to(referrer);
        assert!(locus.to_string().contains("relative to"));
    }
}
