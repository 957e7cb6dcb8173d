//! 6502 / 65C02 opcode table, addressing-mode enumeration and cycle
//! counting.
//!
//! The table is gated per `(mnemonic, mode)` pair by [`CpuLevel`]: a
//! mode present only on the 65C02 (or a mnemonic that doesn't exist on
//! NMOS at all, like `BRA`) carries `CpuLevel::Cmos65C02` and is
//! invisible to a context assembling at `CpuLevel::Nmos6502`.

use num_enum::TryFromPrimitive;

/// One of the 15 addressing modes the instruction set uses.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum AddressingMode {
    Implied = 0,
    Accumulator = 1,
    Immediate = 2,
    ZeroPage = 3,
    ZeroPageX = 4,
    ZeroPageY = 5,
    Absolute = 6,
    AbsoluteX = 7,
    AbsoluteY = 8,
    Indirect = 9,
    IndirectX = 10,
    IndirectY = 11,
    Indirect16 = 12,
    Indirect16X = 13,
    Relative = 14,
}

impl AddressingMode {
    pub const COUNT: usize = 15;
}

/// Minimum CPU level an opcode or addressing mode requires.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum CpuLevel {
    Nmos6502 = 0,
    Cmos65C02 = 1,
}

/// One `(mode, cpu level, opcode byte)` slot in a mnemonic's row.
#[derive(Debug, Copy, Clone)]
pub struct ModeSlot {
    pub mode: AddressingMode,
    pub cpu_level: CpuLevel,
    pub opcode: u8,
}

/// A mnemonic and every addressing mode it supports.
pub struct OpcodeDef {
    pub mnemonic: &'static str,
    pub slots: &'static [ModeSlot],
}

macro_rules! slot {
    ($mode:ident, $cpu:ident, $op:expr) => {
        ModeSlot {
            mode: AddressingMode::$mode,
            cpu_level: CpuLevel::$cpu,
            opcode: $op,
        }
    };
}

macro_rules! n {
    ($mode:ident, $op:expr) => {
        slot!($mode, Nmos6502, $op)
    };
}

macro_rules! c {
    ($mode:ident, $op:expr) => {
        slot!($mode, Cmos65C02, $op)
    };
}

macro_rules! mnemonic {
    ($name:literal, [$($slot:expr),+ $(,)?]) => {
        OpcodeDef { mnemonic: $name, slots: &[$($slot),+] }
    };
}

/// The full instruction table, linear-scanned case-insensitively by
/// mnemonic the way a real assembler's instruction recognizer does.
pub static OPCODE_TABLE: &[OpcodeDef] = &[
    mnemonic!("ADC", [n!(Immediate,0x69), n!(ZeroPage,0x65), n!(ZeroPageX,0x75), n!(Absolute,0x6D), n!(AbsoluteX,0x7D), n!(AbsoluteY,0x79), n!(IndirectX,0x61), n!(IndirectY,0x71), c!(Indirect,0x72)]),
    mnemonic!("AND", [n!(Immediate,0x29), n!(ZeroPage,0x25), n!(ZeroPageX,0x35), n!(Absolute,0x2D), n!(AbsoluteX,0x3D), n!(AbsoluteY,0x39), n!(IndirectX,0x21), n!(IndirectY,0x31), c!(Indirect,0x32)]),
    mnemonic!("ASL", [n!(Accumulator,0x0A), n!(ZeroPage,0x06), n!(ZeroPageX,0x16), n!(Absolute,0x0E), n!(AbsoluteX,0x1E)]),
    mnemonic!("BCC", [n!(Relative,0x90)]),
    mnemonic!("BCS", [n!(Relative,0xB0)]),
    mnemonic!("BEQ", [n!(Relative,0xF0)]),
    mnemonic!("BIT", [n!(ZeroPage,0x24), n!(Absolute,0x2C), c!(Immediate,0x89), c!(ZeroPageX,0x34), c!(AbsoluteX,0x3C)]),
    mnemonic!("BMI", [n!(Relative,0x30)]),
    mnemonic!("BNE", [n!(Relative,0xD0)]),
    mnemonic!("BPL", [n!(Relative,0x10)]),
    mnemonic!("BRA", [c!(Relative,0x80)]),
    mnemonic!("BRK", [n!(Implied,0x00)]),
    mnemonic!("BVC", [n!(Relative,0x50)]),
    mnemonic!("BVS", [n!(Relative,0x70)]),
    mnemonic!("CLC", [n!(Implied,0x18)]),
    mnemonic!("CLD", [n!(Implied,0xD8)]),
    mnemonic!("CLI", [n!(Implied,0x58)]),
    mnemonic!("CLV", [n!(Implied,0xB8)]),
    mnemonic!("CMP", [n!(Immediate,0xC9), n!(ZeroPage,0xC5), n!(ZeroPageX,0xD5), n!(Absolute,0xCD), n!(AbsoluteX,0xDD), n!(AbsoluteY,0xD9), n!(IndirectX,0xC1), n!(IndirectY,0xD1), c!(Indirect,0xD2)]),
    mnemonic!("CPX", [n!(Immediate,0xE0), n!(ZeroPage,0xE4), n!(Absolute,0xEC)]),
    mnemonic!("CPY", [n!(Immediate,0xC0), n!(ZeroPage,0xC4), n!(Absolute,0xCC)]),
    mnemonic!("DEC", [n!(ZeroPage,0xC6), n!(ZeroPageX,0xD6), n!(Absolute,0xCE), n!(AbsoluteX,0xDE), c!(Accumulator,0x3A)]),
    mnemonic!("DEX", [n!(Implied,0xCA)]),
    mnemonic!("DEY", [n!(Implied,0x88)]),
    mnemonic!("EOR", [n!(Immediate,0x49), n!(ZeroPage,0x45), n!(ZeroPageX,0x55), n!(Absolute,0x4D), n!(AbsoluteX,0x5D), n!(AbsoluteY,0x59), n!(IndirectX,0x41), n!(IndirectY,0x51), c!(Indirect,0x52)]),
    mnemonic!("INC", [n!(ZeroPage,0xE6), n!(ZeroPageX,0xF6), n!(Absolute,0xEE), n!(AbsoluteX,0xFE), c!(Accumulator,0x1A)]),
    mnemonic!("INX", [n!(Implied,0xE8)]),
    mnemonic!("INY", [n!(Implied,0xC8)]),
    mnemonic!("JMP", [n!(Absolute,0x4C), n!(Indirect16,0x6C), c!(Indirect16X,0x7C)]),
    mnemonic!("JSR", [n!(Absolute,0x20)]),
    mnemonic!("LDA", [n!(Immediate,0xA9), n!(ZeroPage,0xA5), n!(ZeroPageX,0xB5), n!(Absolute,0xAD), n!(AbsoluteX,0xBD), n!(AbsoluteY,0xB9), n!(IndirectX,0xA1), n!(IndirectY,0xB1), c!(Indirect,0xB2)]),
    mnemonic!("LDX", [n!(Immediate,0xA2), n!(ZeroPage,0xA6), n!(ZeroPageY,0xB6), n!(Absolute,0xAE), n!(AbsoluteY,0xBE)]),
    mnemonic!("LDY", [n!(Immediate,0xA0), n!(ZeroPage,0xA4), n!(ZeroPageX,0xB4), n!(Absolute,0xAC), n!(AbsoluteX,0xBC)]),
    mnemonic!("LSR", [n!(Accumulator,0x4A), n!(ZeroPage,0x46), n!(ZeroPageX,0x56), n!(Absolute,0x4E), n!(AbsoluteX,0x5E)]),
    mnemonic!("NOP", [n!(Implied,0xEA)]),
    mnemonic!("ORA", [n!(Immediate,0x09), n!(ZeroPage,0x05), n!(ZeroPageX,0x15), n!(Absolute,0x0D), n!(AbsoluteX,0x1D), n!(AbsoluteY,0x19), n!(IndirectX,0x01), n!(IndirectY,0x11), c!(Indirect,0x12)]),
    mnemonic!("PHA", [n!(Implied,0x48)]),
    mnemonic!("PHP", [n!(Implied,0x08)]),
    mnemonic!("PHX", [c!(Implied,0xDA)]),
    mnemonic!("PHY", [c!(Implied,0x5A)]),
    mnemonic!("PLA", [n!(Implied,0x68)]),
    mnemonic!("PLP", [n!(Implied,0x28)]),
    mnemonic!("PLX", [c!(Implied,0xFA)]),
    mnemonic!("PLY", [c!(Implied,0x7A)]),
    mnemonic!("ROL", [n!(Accumulator,0x2A), n!(ZeroPage,0x26), n!(ZeroPageX,0x36), n!(Absolute,0x2E), n!(AbsoluteX,0x3E)]),
    mnemonic!("ROR", [n!(Accumulator,0x6A), n!(ZeroPage,0x66), n!(ZeroPageX,0x76), n!(Absolute,0x6E), n!(AbsoluteX,0x7E)]),
    mnemonic!("RTI", [n!(Implied,0x40)]),
    mnemonic!("RTS", [n!(Implied,0x60)]),
    mnemonic!("SBC", [n!(Immediate,0xE9), n!(ZeroPage,0xE5), n!(ZeroPageX,0xF5), n!(Absolute,0xED), n!(AbsoluteX,0xFD), n!(AbsoluteY,0xF9), n!(IndirectX,0xE1), n!(IndirectY,0xF1), c!(Indirect,0xF2)]),
    mnemonic!("SEC", [n!(Implied,0x38)]),
    mnemonic!("SED", [n!(Implied,0xF8)]),
    mnemonic!("SEI", [n!(Implied,0x78)]),
    mnemonic!("STA", [n!(ZeroPage,0x85), n!(ZeroPageX,0x95), n!(Absolute,0x8D), n!(AbsoluteX,0x9D), n!(AbsoluteY,0x99), n!(IndirectX,0x81), n!(IndirectY,0x91), c!(Indirect,0x92)]),
    mnemonic!("STP", [c!(Implied,0xDB)]),
    mnemonic!("STX", [n!(ZeroPage,0x86), n!(ZeroPageY,0x96), n!(Absolute,0x8E)]),
    mnemonic!("STY", [n!(ZeroPage,0x84), n!(ZeroPageX,0x94), n!(Absolute,0x8C)]),
    mnemonic!("STZ", [c!(ZeroPage,0x64), c!(ZeroPageX,0x74), c!(Absolute,0x9C), c!(AbsoluteX,0x9E)]),
    mnemonic!("TAX", [n!(Implied,0xAA)]),
    mnemonic!("TAY", [n!(Implied,0xA8)]),
    mnemonic!("TRB", [c!(ZeroPage,0x14), c!(Absolute,0x1C)]),
    mnemonic!("TSB", [c!(ZeroPage,0x04), c!(Absolute,0x0C)]),
    mnemonic!("TSX", [n!(Implied,0xBA)]),
    mnemonic!("TXA", [n!(Implied,0x8A)]),
    mnemonic!("TXS", [n!(Implied,0x9A)]),
    mnemonic!("TYA", [n!(Implied,0x98)]),
    mnemonic!("WAI", [c!(Implied,0xCB)]),
];

/// Finds a mnemonic's table row by case-insensitive name, first match
/// wins as the original linear scan does.
pub fn find_mnemonic(name: &str) -> Option<&'static OpcodeDef> {
    OPCODE_TABLE.iter().find(|def| def.mnemonic.eq_ignore_ascii_case(name))
}

/// Finds a mnemonic's table row, but only if it has at least one
/// addressing mode available at `cpu`. A mnemonic every one of whose
/// slots needs a higher CPU level (e.g. `BRA` at [`CpuLevel::Nmos6502`])
/// is invisible, exactly as if the table didn't contain it at all --
/// the instruction recognizer reports "not an instruction" rather than
/// "instruction recognized, no mode available".
pub fn find_mnemonic_for_cpu(name: &str, cpu: CpuLevel) -> Option<&'static OpcodeDef> {
    find_mnemonic(name).filter(|def| def.min_cpu_level() <= cpu)
}

impl OpcodeDef {
    /// The lowest CPU level at which any addressing mode of this
    /// mnemonic is available.
    pub fn min_cpu_level(&self) -> CpuLevel {
        self.slots
            .iter()
            .map(|s| s.cpu_level)
            .min()
            .unwrap_or(CpuLevel::Cmos65C02)
    }

    /// Whether this mnemonic supports `mode` at or below `cpu`.
    pub fn has_mode(&self, mode: AddressingMode, cpu: CpuLevel) -> bool {
        self.slots.iter().any(|s| s.mode == mode && s.cpu_level <= cpu)
    }

    /// The opcode byte for `mode` at or below `cpu`, if supported.
    pub fn opcode_for(&self, mode: AddressingMode, cpu: CpuLevel) -> Option<u8> {
        self.slots
            .iter()
            .find(|s| s.mode == mode && s.cpu_level <= cpu)
            .map(|s| s.opcode)
    }
}

/// Cycle count for a non-branch instruction: either fixed, or fixed
/// plus one extra cycle when indexing crosses a page boundary.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CycleCount {
    Fixed(u8),
    PageSensitive(u8),
}

impl std::fmt::Display for CycleCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleCount::Fixed(n) => write!(f, "{n}"),
            CycleCount::PageSensitive(n) => write!(f, "{n}/{}", n + 1),
        }
    }
}

/// Base cycle count for `mnemonic` addressed via `mode`, independent
/// of the actual operand address (see [`branch_cycles`] for branches,
/// whose count depends on the target address).
pub fn cycle_report(mnemonic: &str, mode: AddressingMode) -> Option<CycleCount> {
    use AddressingMode::*;
    use CycleCount::*;

    let m = mnemonic.to_ascii_uppercase();
    let read_write_modify = matches!(
        m.as_str(),
        "ASL" | "LSR" | "ROL" | "ROR" | "INC" | "DEC" | "TRB" | "TSB"
    );

    Some(match (m.as_str(), mode) {
        ("BRK", Implied) => Fixed(7),
        ("RTI", Implied) => Fixed(6),
        ("RTS", Implied) => Fixed(6),
        ("JSR", Absolute) => Fixed(6),
        ("JMP", Absolute) => Fixed(3),
        ("JMP", Indirect16) => Fixed(5),
        ("JMP", Indirect16X) => Fixed(6),
        ("PHP", Implied) | ("PHA", Implied) | ("PHX", Implied) | ("PHY", Implied) => Fixed(3),
        ("PLP", Implied) | ("PLA", Implied) | ("PLX", Implied) | ("PLY", Implied) => Fixed(4),
        (_, Implied) => Fixed(2),
        (_, Accumulator) => Fixed(2),
        (_, Immediate) => Fixed(2),
        (_, ZeroPage) if read_write_modify => Fixed(5),
        (_, ZeroPage) => Fixed(3),
        (_, ZeroPageX) | (_, ZeroPageY) if read_write_modify => Fixed(6),
        (_, ZeroPageX) | (_, ZeroPageY) => Fixed(4),
        ("STA", AbsoluteX) | ("STA", AbsoluteY) => Fixed(5),
        (_, Absolute) if read_write_modify => Fixed(6),
        (_, Absolute) => Fixed(4),
        (_, AbsoluteX) | (_, AbsoluteY) if read_write_modify => Fixed(7),
        (_, AbsoluteX) | (_, AbsoluteY) => PageSensitive(4),
        ("STA", IndirectX) | ("STA", IndirectY) => Fixed(6),
        (_, IndirectX) => Fixed(6),
        (_, IndirectY) => PageSensitive(5),
        (_, Indirect) => Fixed(5),
        (_, Relative) => return None, // use branch_cycles
        _ => return None,
    })
}

/// Cycle count for a branch instruction, which depends on whether the
/// branch is taken and whether it crosses a page boundary: 2 cycles if
/// not taken, 3 if taken, 4 if taken and the target is on a different
/// page from the instruction after the branch.
pub fn branch_cycles(pc_after_branch: u16, dest: u16) -> (u8, u8) {
    let not_taken = 2;
    let taken = if (pc_after_branch & 0xFF00) == (dest & 0xFF00) {
        3
    } else {
        4
    };
    (not_taken, taken)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_known_mnemonics_case_insensitively() {
        assert!(find_mnemonic("lda").is_some());
        assert!(find_mnemonic("LDA").is_some());
        assert!(find_mnemonic("Lda").is_some());
        assert!(find_mnemonic("FROB").is_none());
    }

    #[test]
    fn lda_immediate_is_a9() {
        let def = find_mnemonic("LDA").unwrap();
        assert_eq!(def.opcode_for(AddressingMode::Immediate, CpuLevel::Nmos6502), Some(0xA9));
    }

    #[test]
    fn bra_is_invisible_to_recognizer_on_nmos() {
        assert!(find_mnemonic_for_cpu("BRA", CpuLevel::Nmos6502).is_none());
        assert!(find_mnemonic_for_cpu("BRA", CpuLevel::Cmos65C02).is_some());
    }

    #[test]
    fn bra_is_65c02_only() {
        let def = find_mnemonic("BRA").unwrap();
        assert!(!def.has_mode(AddressingMode::Relative, CpuLevel::Nmos6502));
        assert!(def.has_mode(AddressingMode::Relative, CpuLevel::Cmos65C02));
    }

    #[test]
    fn jmp_indirect_16_is_6c() {
        let def = find_mnemonic("JMP").unwrap();
        assert_eq!(def.opcode_for(AddressingMode::Indirect16, CpuLevel::Nmos6502), Some(0x6C));
    }

    #[test]
    fn branch_same_page_costs_three_taken_cycles() {
        assert_eq!(branch_cycles(0x8010, 0x8020), (2, 3));
    }

    #[test]
    fn branch_crossing_page_costs_four_taken_cycles() {
        assert_eq!(branch_cycles(0x80F0, 0x8110), (2, 4));
    }
}
