//! 64KiB object memory `M` and its parallel per-byte flag array `F`.
//!
//! Every byte written to the image funnels through [`ObjectMemory::write_byte`],
//! which implements the emit policy in a fixed order: guarded addresses
//! reject any write, pass-2 writes are checked for byte-for-byte
//! consistency against what pass 1 produced at the same address (unless
//! that address opted out via [`Flags::DONT_CHECK`]), and only then is
//! the byte actually stored.

use std::io::Read;

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Per-byte metadata tracked alongside the 64KiB memory image.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct Flags: u8 {
        /// At least one byte has been written to this address since the
        /// last `CLEAR`.
        const USED = 0b0001;
        /// Writes to this address are rejected with [`Error::GuardHit`].
        const GUARD = 0b0010;
        /// This address was written during pass 1 and must produce an
        /// identical byte value during pass 2.
        const CHECK = 0b0100;
        /// This address is exempt from the pass 1/pass 2 consistency
        /// check even though it has been written.
        const DONT_CHECK = 0b1000;
    }
}

const SIZE: usize = 0x1_0000;

#[derive(Debug, Error)]
pub enum Error {
    #[error("assembler out of memory: cannot write to address &{0:04X}")]
    OutOfMemory(u16),

    #[error("GUARD hit at address &{0:04X}")]
    GuardHit(u16),

    #[error("memory overlap at address &{0:04X}: already written this pass")]
    Overlap(u16),

    #[error("code at address &{0:04X} is inconsistent between passes (expected &{1:02X}, got &{2:02X})")]
    InconsistentCode(u16, u8, u8),

    #[error("O% has not been set; cannot assemble in offset mode")]
    NoOffsetAddress,
}

/// The bit in `OPT` that switches code generation into "offset
/// assembly" mode: bytes are still logically placed at `P%` for symbol
/// resolution, but physically written starting at `O%`.
const OPT_OFFSET_ASSEMBLY: u8 = 0b0100;

/// 64KiB object memory plus its parallel flag array, a `MAPCHAR`
/// table, and the running program-counter / offset-address pair.
pub struct ObjectMemory {
    mem: Box<[u8; SIZE]>,
    flags: Box<[Flags; SIZE]>,
    /// `P%`, the logical program counter.
    pub pc: u32,
    /// `O%`, the physical write address when offset assembly is active.
    pub offset_pc: Option<u32>,
    /// `OPT`, bit 2 of which enables offset assembly.
    pub opt: u8,
    /// `MAPCHAR` translation table, ASCII 32..127 inclusive.
    ascii_map: [u8; 96],
    pass: Pass,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Pass {
    One,
    Two,
}

impl Default for ObjectMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectMemory {
    pub fn new() -> Self {
        let mut ascii_map = [0u8; 96];
        for (i, slot) in ascii_map.iter_mut().enumerate() {
            *slot = (i as u8) + 32;
        }
        ObjectMemory {
            mem: Box::new([0u8; SIZE]),
            flags: Box::new([Flags::empty(); SIZE]),
            pc: 0,
            offset_pc: None,
            opt: 0,
            ascii_map,
            pass: Pass::One,
        }
    }

    /// Prepares for a fresh pass, resetting `P%`/`O%`. Entering pass 1
    /// wipes every flag (a completely clean slate); entering pass 2
    /// clears only `USED` and `GUARD` -- `CHECK` and `DONT_CHECK` must
    /// survive so pass 2's writes can be checked against what pass 1
    /// produced, and `GUARD` is cleared because the `GUARD` directive
    /// re-applies it as the source is replayed.
    pub fn initialise_pass(&mut self, pass: Pass) {
        for f in self.flags.iter_mut() {
            if pass == Pass::One {
                *f = Flags::empty();
            } else {
                f.remove(Flags::USED | Flags::GUARD);
            }
        }
        self.pass = pass;
        self.pc = 0;
        self.offset_pc = None;
    }

    pub fn current_pass(&self) -> Pass {
        self.pass
    }

    /// Whether code is currently being written via `O%` rather than `P%`.
    pub fn offset_assembly_active(&self) -> bool {
        self.opt & OPT_OFFSET_ASSEMBLY != 0
    }

    /// The address the *next* byte will be physically written to.
    pub fn put_address(&self) -> Result<u32, Error> {
        if self.offset_assembly_active() {
            self.offset_pc.ok_or(Error::NoOffsetAddress)
        } else {
            Ok(self.pc)
        }
    }

    fn addr16(addr: u32) -> Result<u16, Error> {
        if addr >= SIZE as u32 {
            Err(Error::OutOfMemory((addr & 0xFFFF) as u16))
        } else {
            Ok(addr as u16)
        }
    }

    /// Marks every address in `[start, start+len)` as guarded: any
    /// future write there fails with [`Error::GuardHit`].
    pub fn set_guard(&mut self, start: u32, len: u32) -> Result<(), Error> {
        for a in start..start + len {
            let a16 = Self::addr16(a)?;
            self.flags[a16 as usize].insert(Flags::GUARD);
        }
        Ok(())
    }

    /// Writes one data byte (`EQUB`/`EQUW`/`EQUD`/`EQUS`, `INCBIN`)
    /// through the full emit policy, advancing `P%` and (if active)
    /// `O%` by one. Data bytes are never pass-1/pass-2 checked: only
    /// the opcode byte of an assembled instruction is (see
    /// [`Self::assemble_byte`]).
    pub fn put_byte(&mut self, byte: u8) -> Result<(), Error> {
        let addr = self.put_address()?;
        self.write_byte(addr, byte, false)?;
        self.advance_pc();
        Ok(())
    }

    /// Writes one instruction byte. `is_opcode` must be `true` only for
    /// the first byte of an `Assemble1`/`Assemble2`/`Assemble3` call
    /// (the opcode itself); operand bytes pass `false`. Only the
    /// opcode byte is tagged [`Flags::CHECK`], so pass 2 re-emitting
    /// the identical opcode at the identical address is verified, while
    /// the operand bytes (which may legitimately differ between passes
    /// while a forward reference resolves) are not.
    pub fn assemble_byte(&mut self, byte: u8, is_opcode: bool) -> Result<(), Error> {
        let addr = self.put_address()?;
        self.write_byte(addr, byte, is_opcode)?;
        self.advance_pc();
        Ok(())
    }

    /// Emits a whole instruction (1-3 bytes: `Assemble1`/`Assemble2`/
    /// `Assemble3`) atomically. Every target byte's GUARD, overlap and
    /// pass-2 consistency status is checked across the *entire* span
    /// before any byte is stored, so a failure on the 2nd or 3rd byte
    /// (the operand) never leaves the opcode byte already written and
    /// flagged -- matching the all-or-nothing emit policy in §8.
    /// `bytes[0]` is the opcode and is the only byte tagged
    /// [`Flags::CHECK`].
    pub fn assemble_instruction(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let start = self.put_address()?;
        let mut addrs = Vec::with_capacity(bytes.len());
        let mut addr = start;
        for _ in 0..bytes.len() {
            addrs.push(Self::addr16(addr)?);
            addr = addr.wrapping_add(1) & 0xFFFF;
        }

        for (i, &a16) in addrs.iter().enumerate() {
            let idx = a16 as usize;
            let existing = self.flags[idx];
            let is_opcode = i == 0;

            if is_opcode
                && self.pass == Pass::Two
                && existing.contains(Flags::CHECK)
                && !existing.contains(Flags::DONT_CHECK)
            {
                let previous = self.mem[idx];
                if previous != bytes[i] {
                    return Err(Error::InconsistentCode(a16, previous, bytes[i]));
                }
            }

            if existing.contains(Flags::GUARD) {
                return Err(Error::GuardHit(a16));
            }

            if existing.contains(Flags::USED) {
                return Err(Error::Overlap(a16));
            }
        }

        for (i, &a16) in addrs.iter().enumerate() {
            let idx = a16 as usize;
            self.mem[idx] = bytes[i];
            self.flags[idx].insert(Flags::USED);
            if i == 0 {
                self.flags[idx].insert(Flags::CHECK);
            }
        }

        for _ in 0..bytes.len() {
            self.advance_pc();
        }
        Ok(())
    }

    fn advance_pc(&mut self) {
        self.pc = self.pc.wrapping_add(1) & 0xFFFF;
        if let Some(o) = self.offset_pc {
            self.offset_pc = Some(o.wrapping_add(1) & 0xFFFF);
        }
    }

    /// Copies raw bytes from `reader` directly into memory starting at
    /// the current write address, without any symbol/value evaluation
    /// (`INCBIN`).
    pub fn inc_bin(&mut self, mut reader: impl Read) -> Result<(), Error> {
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .map_err(|_| Error::OutOfMemory(self.pc as u16))?;
        for byte in buf {
            self.put_byte(byte)?;
        }
        Ok(())
    }

    /// The single emit policy every write path funnels through: guard
    /// check, pass-2 consistency check, then store. `tag_check`
    /// decides whether this write marks the address [`Flags::CHECK`]
    /// for future passes; it is `true` only for opcode bytes.
    fn write_byte(&mut self, addr: u32, byte: u8, tag_check: bool) -> Result<(), Error> {
        let a16 = Self::addr16(addr)?;
        let idx = a16 as usize;
        let existing = self.flags[idx];

        if self.pass == Pass::Two
            && existing.contains(Flags::CHECK)
            && !existing.contains(Flags::DONT_CHECK)
        {
            let previous = self.mem[idx];
            if previous != byte {
                return Err(Error::InconsistentCode(a16, previous, byte));
            }
        }

        if existing.contains(Flags::GUARD) {
            return Err(Error::GuardHit(a16));
        }

        if existing.contains(Flags::USED) {
            return Err(Error::Overlap(a16));
        }

        self.mem[idx] = byte;
        self.flags[idx].insert(Flags::USED);
        if tag_check {
            self.flags[idx].insert(Flags::CHECK);
        }
        Ok(())
    }

    /// Excludes `addr` from the pass 1/pass 2 consistency check even
    /// though it has already been written.
    pub fn dont_check(&mut self, addr: u32) -> Result<(), Error> {
        let a16 = Self::addr16(addr)?;
        self.flags[a16 as usize].insert(Flags::DONT_CHECK);
        Ok(())
    }

    pub fn peek(&self, addr: u32) -> Result<u8, Error> {
        let a16 = Self::addr16(addr)?;
        Ok(self.mem[a16 as usize])
    }

    /// Zeroes `[start, end)` and resets its flags (`CLEAR`). When
    /// `all_flags` is set, the range is also marked [`Flags::DONT_CHECK`]
    /// so no later pass re-checks bytes that no longer exist; otherwise
    /// this behaves like the inter-pass reset, scoped to the range
    /// (`USED`/`GUARD` cleared, `CHECK`/`DONT_CHECK` preserved).
    pub fn clear(&mut self, start: u32, end: u32, all_flags: bool) -> Result<(), Error> {
        for a in start..end {
            let a16 = Self::addr16(a)?;
            let idx = a16 as usize;
            if all_flags {
                self.mem[idx] = 0;
                self.flags[idx] = Flags::DONT_CHECK;
            } else {
                self.flags[idx].remove(Flags::USED | Flags::GUARD);
            }
        }
        Ok(())
    }

    /// Copies `len` bytes from `src` to `dest` (`MOVE`), subject to the
    /// same guard/consistency policy as any other write. Rejects the
    /// move outright if any destination byte is guarded. The source
    /// range's flags are reduced to `CHECK | DONT_CHECK` afterwards: it
    /// is no longer `USED` or `GUARD`ed at its old location, but pass 2
    /// must still find the same bytes there if the source is never
    /// rewritten.
    pub fn copy_block(&mut self, src: u32, dest: u32, len: u32) -> Result<(), Error> {
        for a in dest..dest + len {
            let a16 = Self::addr16(a)?;
            if self.flags[a16 as usize].contains(Flags::GUARD) {
                return Err(Error::GuardHit(a16));
            }
        }

        let mut bytes = Vec::with_capacity(len as usize);
        for a in src..src + len {
            bytes.push(self.peek(a)?);
        }
        for (i, b) in bytes.into_iter().enumerate() {
            self.write_byte(dest + i as u32, b, false)?;
        }

        for a in src..src + len {
            let a16 = Self::addr16(a)?;
            let idx = a16 as usize;
            self.flags[idx] &= Flags::CHECK | Flags::DONT_CHECK;
        }
        Ok(())
    }

    /// Installs a `MAPCHAR` translation for one source character.
    pub fn set_mapping(&mut self, ascii: u8, mapped: u8) {
        if (32..128).contains(&ascii) {
            self.ascii_map[(ascii - 32) as usize] = mapped;
        }
    }

    /// Restores `MAPCHAR` to the identity mapping, done at the start of
    /// every pass.
    pub fn reset_ascii_map(&mut self) {
        for (i, slot) in self.ascii_map.iter_mut().enumerate() {
            *slot = (i as u8) + 32;
        }
    }

    pub fn get_mapping(&self, ascii: u8) -> u8 {
        if (32..128).contains(&ascii) {
            self.ascii_map[(ascii - 32) as usize]
        } else {
            ascii
        }
    }

    /// A read-only view of the full 64KiB image, e.g. for `SAVE`.
    pub fn image(&self) -> &[u8; SIZE] {
        &self.mem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_write_and_readback() {
        let mut mem = ObjectMemory::new();
        mem.put_byte(0xA9).unwrap();
        mem.put_byte(0x00).unwrap();
        assert_eq!(mem.peek(0).unwrap(), 0xA9);
        assert_eq!(mem.peek(1).unwrap(), 0x00);
        assert_eq!(mem.pc, 2);
    }

    #[test]
    fn guard_rejects_writes() {
        let mut mem = ObjectMemory::new();
        mem.set_guard(0x8000, 4).unwrap();
        mem.pc = 0x8000;
        assert!(matches!(mem.put_byte(0), Err(Error::GuardHit(0x8000))));
    }

    #[test]
    fn overlap_detected_within_one_pass() {
        let mut mem = ObjectMemory::new();
        mem.put_byte(1).unwrap();
        mem.pc = 0;
        assert!(matches!(mem.put_byte(2), Err(Error::Overlap(0))));
    }

    #[test]
    fn pass_two_must_match_pass_one() {
        let mut mem = ObjectMemory::new();
        mem.assemble_byte(0x42, true).unwrap();
        mem.initialise_pass(Pass::Two);
        assert!(mem.assemble_byte(0x42, true).is_ok());

        mem.initialise_pass(Pass::Two);
        let err = mem.assemble_byte(0x43, true).unwrap_err();
        assert!(matches!(err, Error::InconsistentCode(0, 0x42, 0x43)));
    }

    #[test]
    fn data_bytes_are_never_pass_checked() {
        let mut mem = ObjectMemory::new();
        mem.put_byte(0x42).unwrap();
        mem.initialise_pass(Pass::Two);
        assert!(mem.put_byte(0x99).is_ok());
        assert_eq!(mem.peek(0).unwrap(), 0x99);
    }

    #[test]
    fn dont_check_suppresses_mismatch() {
        let mut mem = ObjectMemory::new();
        mem.assemble_byte(0x10, true).unwrap();
        mem.dont_check(0).unwrap();
        mem.initialise_pass(Pass::Two);
        assert!(mem.assemble_byte(0x99, true).is_ok());
    }

    #[test]
    fn copy_block_rejects_guarded_destination() {
        let mut mem = ObjectMemory::new();
        mem.put_byte(0xEA).unwrap();
        mem.pc = 0x100;
        mem.set_guard(0x100, 1).unwrap();
        assert!(matches!(mem.copy_block(0, 0x100, 1), Err(Error::GuardHit(0x100))));
    }

    #[test]
    fn copy_block_reduces_source_flags() {
        let mut mem = ObjectMemory::new();
        mem.assemble_byte(0xEA, true).unwrap();
        mem.copy_block(0, 0x100, 1).unwrap();
        assert!(!mem.flags[0].contains(Flags::USED));
        assert!(mem.flags[0].contains(Flags::CHECK));
        assert!(mem.flags[0x100].contains(Flags::USED));
    }

    #[test]
    fn clear_with_all_flags_zeroes_memory_and_sets_dont_check() {
        let mut mem = ObjectMemory::new();
        mem.put_byte(0x42).unwrap();
        mem.clear(0, 1, true).unwrap();
        assert_eq!(mem.peek(0).unwrap(), 0);
        assert!(mem.flags[0].contains(Flags::DONT_CHECK));
        assert!(!mem.flags[0].contains(Flags::USED));
    }

    #[test]
    fn initialise_pass_two_preserves_check_but_clears_used_and_guard() {
        let mut mem = ObjectMemory::new();
        mem.assemble_byte(0x42, true).unwrap();
        mem.set_guard(0x10, 1).unwrap();
        mem.initialise_pass(Pass::Two);
        assert!(mem.flags[0].contains(Flags::CHECK));
        assert!(!mem.flags[0].contains(Flags::USED));
        assert!(!mem.flags[0x10].contains(Flags::GUARD));
    }

    #[test]
    fn reset_ascii_map_restores_identity_after_set_mapping() {
        let mut mem = ObjectMemory::new();
        mem.set_mapping(65, 99);
        assert_eq!(mem.get_mapping(65), 99);
        mem.reset_ascii_map();
        assert_eq!(mem.get_mapping(65), 65);
    }

    #[test]
    fn offset_assembly_requires_o_percent() {
        let mut mem = ObjectMemory::new();
        mem.opt = 0b0100;
        assert!(matches!(mem.put_byte(0), Err(Error::NoOffsetAddress)));
        mem.offset_pc = Some(0x2000);
        assert!(mem.put_byte(0xEA).is_ok());
        assert_eq!(mem.offset_pc, Some(0x2001));
    }

    #[test]
    fn assemble_instruction_guard_on_operand_byte_leaves_opcode_byte_unwritten() {
        let mut mem = ObjectMemory::new();
        mem.set_guard(1, 1).unwrap();
        let err = mem.assemble_instruction(&[0xA9, 0x00]).unwrap_err();
        assert!(matches!(err, Error::GuardHit(1)));
        assert!(!mem.flags[0].contains(Flags::USED));
        assert_eq!(mem.pc, 0, "P% must not advance when the instruction is rejected");
    }

    #[test]
    fn assemble_instruction_overlap_on_operand_byte_leaves_opcode_byte_unwritten() {
        let mut mem = ObjectMemory::new();
        mem.put_byte(0xFF).unwrap(); // marks address 0 USED
        mem.pc = 0;
        let err = mem.assemble_instruction(&[0xA9, 0x00]).unwrap_err();
        assert!(matches!(err, Error::Overlap(0)));
        assert_eq!(mem.peek(1).unwrap(), 0, "the operand byte must not be written either");
    }
}
