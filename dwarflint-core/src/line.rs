//! The `.debug_line` state machine: the header (directory table, file
//! table, and opcode-length declarations) followed by a byte program
//! that a consumer runs to produce a table of `(address, file, line,
//! column, is_stmt, end_sequence)` rows.
//!
//! The checker runs the program the same way a consumer would, but
//! additionally verifies invariants no consumer needs to care about:
//! addresses must never decrease within a sequence, `end_sequence` must
//! be the last row of a sequence, and every file/line register a row
//! claims must resolve against the header's tables.

use crate::diagnostics::{Category, Diagnostics};
use crate::locus::Locus;
use crate::reader::{ReadError, Reader};
use crate::section::{Endian, OffsetSize, SectionId};

pub mod standard_opcode {
    pub const COPY: u8 = 1;
    pub const ADVANCE_PC: u8 = 2;
    pub const ADVANCE_LINE: u8 = 3;
    pub const SET_FILE: u8 = 4;
    pub const SET_COLUMN: u8 = 5;
    pub const NEGATE_STMT: u8 = 6;
    pub const SET_BASIC_BLOCK: u8 = 7;
    pub const CONST_ADD_PC: u8 = 8;
    pub const FIXED_ADVANCE_PC: u8 = 9;
    pub const SET_PROLOGUE_END: u8 = 10;
    pub const SET_EPILOGUE_BEGIN: u8 = 11;
    pub const SET_ISA: u8 = 12;
}

pub mod extended_opcode {
    pub const END_SEQUENCE: u8 = 1;
    pub const SET_ADDRESS: u8 = 2;
    pub const DEFINE_FILE: u8 = 3;
}

/// One entry of the file name table (index 1-based per DWARF 2/3; index
/// 0 is reserved and never populated here).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: Vec<u8>,
    pub directory_index: u64,
    pub mtime: u64,
    pub length: u64,
}

/// The decoded `.debug_line` program header.
#[derive(Debug, Clone)]
pub struct LineProgramHeader {
    pub offset: u64,
    pub unit_length: u64,
    pub offset_size: OffsetSize,
    pub version: u16,
    pub header_length: u64,
    pub minimum_instruction_length: u8,
    pub default_is_stmt: bool,
    pub line_base: i8,
    pub line_range: u8,
    pub opcode_base: u8,
    pub standard_opcode_lengths: Vec<u8>,
    pub include_directories: Vec<Vec<u8>>,
    pub file_names: Vec<FileEntry>,
    /// Offset of the first byte of the opcode program, immediately after
    /// the header.
    pub program_start: u64,
    pub program_end: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineError {
    Truncated,
}

pub fn read_line_program_header(reader: &mut Reader<'_>, diagnostics: &mut Diagnostics) -> Result<LineProgramHeader, LineError> {
    let offset = reader.offset();
    let locus = || Locus::section(SectionId::DebugLine).with_table(offset);

    let initial = reader.read_initial_length().map_err(|_| LineError::Truncated)?;
    let unit_end = offset + u64::from(initial.field_size) + initial.length;

    let version = reader.read_u16().map_err(|_| LineError::Truncated)?;
    if !(2..=3).contains(&version) {
        diagnostics.error(
            Category::LINE | Category::IMPACT_4,
            locus(),
            format!("unsupported .debug_line version {version}, expected 2 or 3"),
        );
    }

    let header_length = reader.read_offset(initial.offset_size).map_err(|_| LineError::Truncated)?;
    let program_start = reader.offset() + header_length;

    let minimum_instruction_length = reader.read_u8().map_err(|_| LineError::Truncated)?;
    let default_is_stmt = reader.read_u8().map_err(|_| LineError::Truncated)? != 0;
    let line_base = reader.read_u8().map_err(|_| LineError::Truncated)? as i8;
    let line_range = reader.read_u8().map_err(|_| LineError::Truncated)?;
    if line_range == 0 {
        diagnostics.error(Category::LINE | Category::IMPACT_4, locus(), "line_range is zero");
        return Err(LineError::Truncated);
    }
    let opcode_base = reader.read_u8().map_err(|_| LineError::Truncated)?;

    let mut standard_opcode_lengths = Vec::with_capacity(opcode_base.saturating_sub(1) as usize);
    for _ in 1..opcode_base {
        standard_opcode_lengths.push(reader.read_u8().map_err(|_| LineError::Truncated)?);
    }

    let mut include_directories = Vec::new();
    loop {
        let entry = reader.read_cstr().map_err(|_| LineError::Truncated)?;
        if entry.is_empty() {
            break;
        }
        include_directories.push(entry.to_vec());
    }

    let mut file_names = Vec::new();
    loop {
        let name = reader.read_cstr().map_err(|_| LineError::Truncated)?;
        if name.is_empty() {
            break;
        }
        let directory_index = reader.read_uleb128().map_err(|_| LineError::Truncated)?.value;
        let mtime = reader.read_uleb128().map_err(|_| LineError::Truncated)?.value;
        let length = reader.read_uleb128().map_err(|_| LineError::Truncated)?.value;
        if directory_index as usize > include_directories.len() {
            diagnostics.emit(
                Category::LINE | Category::IMPACT_2,
                locus(),
                format!("file entry references undeclared directory index {directory_index}"),
            );
        }
        file_names.push(FileEntry {
            name: name.to_vec(),
            directory_index,
            mtime,
            length,
        });
    }

    Ok(LineProgramHeader {
        offset,
        unit_length: initial.length,
        offset_size: initial.offset_size,
        version,
        header_length,
        minimum_instruction_length,
        default_is_stmt,
        line_base,
        line_range,
        opcode_base,
        standard_opcode_lengths,
        include_directories,
        file_names,
        program_start,
        program_end: unit_end,
    })
}

/// One row the line number program produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRow {
    pub address: u64,
    pub file: u64,
    pub line: u64,
    pub column: u64,
    pub is_stmt: bool,
    pub end_sequence: bool,
}

struct Registers {
    address: u64,
    file: u64,
    line: u64,
    column: u64,
    is_stmt: bool,
}

impl Registers {
    fn reset(header: &LineProgramHeader) -> Self {
        Registers {
            address: 0,
            file: 1,
            line: 1,
            column: 0,
            is_stmt: header.default_is_stmt,
        }
    }

    fn row(&self, end_sequence: bool) -> LineRow {
        LineRow {
            address: self.address,
            file: self.file,
            line: self.line,
            column: self.column,
            is_stmt: self.is_stmt,
            end_sequence,
        }
    }
}

/// Runs the line number program following `header`, checking address
/// monotonicity within each sequence and file-index bounds as it goes.
/// Address width comes from the compile unit the program belongs to, not
/// from the line program header itself (DWARF 2/3 `.debug_line` carries
/// no address size field of its own).
pub fn run_line_program(
    reader: &mut Reader<'_>,
    header: &LineProgramHeader,
    diagnostics: &mut Diagnostics,
    address_width_bytes: u8,
) -> Result<Vec<LineRow>, LineError> {
    let mut rows = Vec::new();
    let mut regs = Registers::reset(header);
    let mut sequence_start_offset = reader.offset();
    let mut max_address_this_sequence = 0u64;
    let mut in_sequence = false;

    while reader.offset() < header.program_end {
        let opcode = reader.read_u8().map_err(|_| LineError::Truncated)?;

        if opcode == 0 {
            let length = reader.read_uleb128().map_err(|_| LineError::Truncated)?.value;
            let extended_start = reader.offset();
            let sub_opcode = reader.read_u8().map_err(|_| LineError::Truncated)?;
            match sub_opcode {
                extended_opcode::END_SEQUENCE => {
                    rows.push(regs.row(true));
                    in_sequence = false;
                    regs = Registers::reset(header);
                    max_address_this_sequence = 0;
                }
                extended_opcode::SET_ADDRESS => {
                    let addr = reader.read_uint(address_width_bytes).map_err(|_| LineError::Truncated)?;
                    regs.address = addr;
                    in_sequence = true;
                    sequence_start_offset = extended_start;
                    max_address_this_sequence = addr;
                }
                extended_opcode::DEFINE_FILE => {
                    let _name = reader.read_cstr().map_err(|_| LineError::Truncated)?;
                    reader.read_uleb128().map_err(|_| LineError::Truncated)?;
                    reader.read_uleb128().map_err(|_| LineError::Truncated)?;
                    reader.read_uleb128().map_err(|_| LineError::Truncated)?;
                }
                other => {
                    diagnostics.emit(
                        Category::LINE | Category::IMPACT_2,
                        Locus::section(SectionId::DebugLine).with_offset(extended_start),
                        format!("unrecognized extended opcode {other}"),
                    );
                    reader
                        .skip_bytes((length.saturating_sub((reader.offset() - extended_start) + 1)) as usize)
                        .map_err(|_| LineError::Truncated)?;
                }
            }
            // Ensure the cursor lands exactly where `length` says it should,
            // regardless of which arm above ran.
            let expected_end = extended_start + length;
            if reader.offset() != expected_end {
                diagnostics.emit(
                    Category::LINE | Category::IMPACT_3,
                    Locus::section(SectionId::DebugLine).with_offset(extended_start),
                    "extended opcode length does not match its operand size",
                );
            }
            continue;
        }

        if opcode < header.opcode_base {
            let produced_row = run_standard_opcode(reader, header, &mut regs, opcode).map_err(|_| LineError::Truncated)?;
            if produced_row {
                rows.push(regs.row(false));
            }
        } else {
            let adjusted = (opcode - header.opcode_base) as u32;
            let line_range = header.line_range as u32;
            let address_advance = (adjusted / line_range) * header.minimum_instruction_length as u32;
            let line_advance = header.line_base as i32 + (adjusted % line_range) as i32;
            regs.address = regs.address.wrapping_add(address_advance as u64);
            regs.line = (regs.line as i64 + line_advance as i64).max(0) as u64;
            rows.push(regs.row(false));
        }

        if in_sequence {
            if regs.address < max_address_this_sequence {
                diagnostics.error(
                    Category::LINE | Category::IMPACT_4,
                    Locus::section(SectionId::DebugLine).with_offset(sequence_start_offset),
                    "address register decreased within a sequence",
                );
            }
            max_address_this_sequence = max_address_this_sequence.max(regs.address);
        }

        if let Some(last) = rows.last() {
            if last.file != 0 && !header.file_names.is_empty() && last.file as usize > header.file_names.len() {
                diagnostics.emit(
                    Category::LINE | Category::IMPACT_3,
                    Locus::section(SectionId::DebugLine).with_offset(sequence_start_offset),
                    format!("row references undeclared file index {}", last.file),
                );
            }
        }
    }

    if in_sequence {
        diagnostics.error(
            Category::LINE | Category::IMPACT_4,
            Locus::section(SectionId::DebugLine).with_offset(sequence_start_offset),
            "sequence of opcodes not terminated with DW_LNE_end_sequence",
        );
    }

    Ok(rows)
}

/// Executes one standard opcode (1..opcode_base), already consumed from
/// the reader by the caller. Returns whether it appends a row, mirroring
/// the DWARF rule that only `DW_LNS_copy` (and the special opcodes) do.
/// Opcodes this program doesn't recognize semantically still have their
/// operands consumed, using the operand count the header declared for
/// them — the mechanism that keeps an older consumer forward-compatible
/// with a vendor's extended standard opcodes.
fn run_standard_opcode(
    reader: &mut Reader<'_>,
    header: &LineProgramHeader,
    regs: &mut Registers,
    opcode: u8,
) -> Result<bool, ReadError> {
    use standard_opcode::*;
    match opcode {
        COPY => {
            return Ok(true);
        }
        ADVANCE_PC => {
            let advance = reader.read_uleb128()?.value;
            regs.address = regs.address.wrapping_add(advance * header.minimum_instruction_length as u64);
        }
        ADVANCE_LINE => {
            let advance = reader.read_sleb128()?.value;
            regs.line = (regs.line as i64 + advance).max(0) as u64;
        }
        SET_FILE => {
            regs.file = reader.read_uleb128()?.value;
        }
        SET_COLUMN => {
            regs.column = reader.read_uleb128()?.value;
        }
        NEGATE_STMT => {
            regs.is_stmt = !regs.is_stmt;
        }
        SET_BASIC_BLOCK => {}
        CONST_ADD_PC => {
            let adjusted = (255 - header.opcode_base) as u32;
            let advance = (adjusted / header.line_range as u32) * header.minimum_instruction_length as u32;
            regs.address = regs.address.wrapping_add(advance as u64);
        }
        FIXED_ADVANCE_PC => {
            let advance = reader.read_u16()?;
            regs.address = regs.address.wrapping_add(advance as u64);
        }
        SET_PROLOGUE_END | SET_EPILOGUE_BEGIN => {}
        SET_ISA => {
            reader.read_uleb128()?;
        }
        _ => {
            let operand_count = header
                .standard_opcode_lengths
                .get(opcode.saturating_sub(1) as usize)
                .copied()
                .unwrap_or(0);
            for _ in 0..operand_count {
                reader.read_uleb128()?;
            }
        }
    }
    Ok(false)
}
