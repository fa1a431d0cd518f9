//! Decoding and structurally validating a single DWARF location
//! expression (`DW_OP_*` byte stream), the payload of an `exprloc`-class
//! attribute or a `.debug_loc` list entry.
//!
//! This only checks the expression decodes cleanly — every opcode is
//! known, every operand read stays in bounds, and every `DW_OP_skip`/
//! `DW_OP_bra` branch target lands exactly on another instruction's start
//! offset (or just past the last one). It does not simulate the
//! expression stack machine; a location expression that decodes validly
//! but would underflow the stack at evaluation time is out of scope,
//! matching the rest of this checker's focus on encoding well-formedness
//! rather than runtime semantics.

use crate::reader::{ReadError, Reader};
use crate::section::{AddressWidth, Endian, OffsetSize};

pub mod op {
    pub const ADDR: u8 = 0x03;
    pub const DEREF: u8 = 0x06;
    pub const CONST1U: u8 = 0x08;
    pub const CONST1S: u8 = 0x09;
    pub const CONST2U: u8 = 0x0a;
    pub const CONST2S: u8 = 0x0b;
    pub const CONST4U: u8 = 0x0c;
    pub const CONST4S: u8 = 0x0d;
    pub const CONST8U: u8 = 0x0e;
    pub const CONST8S: u8 = 0x0f;
    pub const CONSTU: u8 = 0x10;
    pub const CONSTS: u8 = 0x11;
    pub const DUP: u8 = 0x12;
    pub const DROP: u8 = 0x13;
    pub const OVER: u8 = 0x14;
    pub const PICK: u8 = 0x15;
    pub const SWAP: u8 = 0x16;
    pub const ROT: u8 = 0x17;
    pub const XDEREF: u8 = 0x18;
    pub const ABS: u8 = 0x19;
    pub const AND: u8 = 0x1a;
    pub const DIV: u8 = 0x1b;
    pub const MINUS: u8 = 0x1c;
    pub const MOD: u8 = 0x1d;
    pub const MUL: u8 = 0x1e;
    pub const NEG: u8 = 0x1f;
    pub const NOT: u8 = 0x20;
    pub const OR: u8 = 0x21;
    pub const PLUS: u8 = 0x22;
    pub const PLUS_UCONST: u8 = 0x23;
    pub const SHL: u8 = 0x24;
    pub const SHR: u8 = 0x25;
    pub const SHRA: u8 = 0x26;
    pub const XOR: u8 = 0x27;
    pub const BRA: u8 = 0x28;
    pub const EQ: u8 = 0x29;
    pub const GE: u8 = 0x2a;
    pub const GT: u8 = 0x2b;
    pub const LE: u8 = 0x2c;
    pub const LT: u8 = 0x2d;
    pub const NE: u8 = 0x2e;
    pub const SKIP: u8 = 0x2f;
    pub const LIT0: u8 = 0x30;
    pub const LIT31: u8 = 0x4f;
    pub const REG0: u8 = 0x50;
    pub const REG31: u8 = 0x6f;
    pub const BREG0: u8 = 0x70;
    pub const BREG31: u8 = 0x8f;
    pub const REGX: u8 = 0x90;
    pub const FBREG: u8 = 0x91;
    pub const BREGX: u8 = 0x92;
    pub const PIECE: u8 = 0x93;
    pub const DEREF_SIZE: u8 = 0x94;
    pub const XDEREF_SIZE: u8 = 0x95;
    pub const NOP: u8 = 0x96;
    pub const PUSH_OBJECT_ADDRESS: u8 = 0x97;
    pub const CALL2: u8 = 0x98;
    pub const CALL4: u8 = 0x99;
    pub const CALL_REF: u8 = 0x9a;
    pub const FORM_TLS_ADDRESS: u8 = 0x9b;
    pub const CALL_FRAME_CFA: u8 = 0x9c;
    pub const BIT_PIECE: u8 = 0x9d;
    pub const LO_USER: u8 = 0xe0;
    pub const HI_USER: u8 = 0xff;
}

/// One decoded instruction: its offset within the block, the opcode, and
/// the raw bytes of its operand (for ops like `skip`/`bra` whose operand
/// needs a second look during branch-target validation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedOp {
    pub offset: usize,
    pub opcode: u8,
    pub branch_offset: Option<i16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocExprError {
    Truncated,
    UnknownOpcode { offset: usize, opcode: u8 },
    BranchTargetInvalid { offset: usize, target: i64 },
}

/// Decodes every instruction in `data` and checks that `skip`/`bra`
/// branch targets land on an instruction boundary (or exactly at the end
/// of the block, which is how a conditional skips the rest of the
/// expression).
pub fn validate(
    data: &[u8],
    endian: Endian,
    address_size: AddressWidth,
    offset_size: OffsetSize,
) -> Result<Vec<DecodedOp>, LocExprError> {
    let mut reader = Reader::new(data, endian);
    let mut ops = Vec::new();

    while !reader.is_at_end() {
        let offset = reader.offset() as usize;
        let opcode = reader.read_u8().map_err(|_| LocExprError::Truncated)?;
        if !is_known_opcode(opcode) {
            return Err(LocExprError::UnknownOpcode { offset, opcode });
        }
        let branch_offset = decode_operand(&mut reader, opcode, address_size, offset_size)
            .map_err(|_| LocExprError::Truncated)?;
        ops.push(DecodedOp {
            offset,
            opcode,
            branch_offset,
        });
    }

    let mut boundaries: Vec<usize> = ops.iter().map(|o| o.offset).collect();
    boundaries.push(data.len());

    for decoded in &ops {
        if let Some(branch) = decoded.branch_offset {
            let instr_end = next_offset_after(&ops, decoded.offset, data.len());
            let target = instr_end as i64 + branch as i64;
            if target < 0 || target > data.len() as i64 || !boundaries.contains(&(target as usize)) {
                return Err(LocExprError::BranchTargetInvalid {
                    offset: decoded.offset,
                    target,
                });
            }
        }
    }

    Ok(ops)
}

fn next_offset_after(ops: &[DecodedOp], offset: usize, block_len: usize) -> usize {
    ops.iter()
        .map(|o| o.offset)
        .find(|&o| o > offset)
        .unwrap_or(block_len)
}

/// Reads the operand (if any) belonging to `opcode`, returning the
/// branch delta for `skip`/`bra` so the caller can validate it once
/// every instruction offset is known.
fn decode_operand(
    reader: &mut Reader<'_>,
    opcode: u8,
    address_size: AddressWidth,
    offset_size: OffsetSize,
) -> Result<Option<i16>, ReadError> {
    use op::*;
    match opcode {
        ADDR => {
            reader.read_uint(address_size.bytes())?;
            Ok(None)
        }
        CONST1U | CONST1S | PICK | DEREF_SIZE | XDEREF_SIZE => {
            reader.read_u8()?;
            Ok(None)
        }
        CONST2U | CONST2S => {
            reader.read_u16()?;
            Ok(None)
        }
        CONST4U | CONST4S => {
            reader.read_u32()?;
            Ok(None)
        }
        CONST8U | CONST8S => {
            reader.read_u64()?;
            Ok(None)
        }
        CONSTU | PLUS_UCONST | REGX | PIECE => {
            reader.read_uleb128()?;
            Ok(None)
        }
        CONSTS | FBREG => {
            reader.read_sleb128()?;
            Ok(None)
        }
        BREGX => {
            reader.read_uleb128()?;
            reader.read_sleb128()?;
            Ok(None)
        }
        BIT_PIECE => {
            reader.read_uleb128()?;
            reader.read_uleb128()?;
            Ok(None)
        }
        CALL2 => {
            reader.read_u16()?;
            Ok(None)
        }
        CALL4 => {
            reader.read_u32()?;
            Ok(None)
        }
        CALL_REF => {
            reader.read_offset(offset_size)?;
            Ok(None)
        }
        SKIP | BRA => {
            let raw = reader.read_u16()?;
            Ok(Some(raw as i16))
        }
        opcode if (BREG0..=BREG31).contains(&opcode) => {
            reader.read_sleb128()?;
            Ok(None)
        }
        opcode if (LIT0..=LIT31).contains(&opcode) || (REG0..=REG31).contains(&opcode) => Ok(None),
        DEREF | DUP | DROP | OVER | SWAP | ROT | XDEREF | ABS | AND | DIV | MINUS | MOD | MUL | NEG | NOT | OR
        | PLUS | SHL | SHR | SHRA | XOR | EQ | GE | GT | LE | LT | NE | NOP | PUSH_OBJECT_ADDRESS
        | FORM_TLS_ADDRESS | CALL_FRAME_CFA => Ok(None),
        _ => Ok(None),
    }
}

/// True if `opcode` is a recognized DWARF 2/3 operation, including the
/// reserved vendor-extension range.
pub fn is_known_opcode(opcode: u8) -> bool {
    use op::*;
    matches!(opcode,
        ADDR | DEREF | CONST1U | CONST1S | CONST2U | CONST2S | CONST4U | CONST4S | CONST8U | CONST8S
        | CONSTU | CONSTS | DUP | DROP | OVER | PICK | SWAP | ROT | XDEREF | ABS | AND | DIV | MINUS
        | MOD | MUL | NEG | NOT | OR | PLUS | PLUS_UCONST | SHL | SHR | SHRA | XOR | BRA | EQ | GE
        | GT | LE | LT | NE | SKIP | REGX | FBREG | BREGX | PIECE | DEREF_SIZE | XDEREF_SIZE | NOP
        | PUSH_OBJECT_ADDRESS | CALL2 | CALL4 | CALL_REF | FORM_TLS_ADDRESS | CALL_FRAME_CFA | BIT_PIECE)
        || (LIT0..=LIT31).contains(&opcode)
        || (REG0..=REG31).contains(&opcode)
        || (BREG0..=BREG31).contains(&opcode)
        || (LO_USER..=HI_USER).contains(&opcode)
}
