//! User-level register file of the simulated MIPS CPU

/// Number of general purpose registers
pub const NUM_GP_REGS: usize = 32;
/// User's stack pointer
pub const STACK_REG: usize = 29;
/// Holds return address for procedure calls
pub const RET_ADDR_REG: usize = 31;
/// Double register to hold multiply result
pub const HI_REG: usize = 32;
pub const LO_REG: usize = 33;
/// Current program counter
pub const PC_REG: usize = 34;
/// Next program counter (for branch delay)
pub const NEXT_PC_REG: usize = 35;
/// Previous program counter (for debugging)
pub const PREV_PC_REG: usize = 36;
/// The register target of a delayed load
pub const LOAD_REG: usize = 37;
/// The value to be loaded by a delayed load
pub const LOAD_VALUE_REG: usize = 38;
/// The failing virtual address on an exception
pub const BAD_VADDR_REG: usize = 39;

pub const NUM_TOTAL_REGS: usize = 40;

/// CPU registers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registers {
    regs: [u32; NUM_TOTAL_REGS],
}

impl Registers {
    pub const fn new() -> Self {
        Self {
            regs: [0; NUM_TOTAL_REGS],
        }
    }

    /// Read a register. Out-of-range indices read as zero.
    pub fn read(&self, index: usize) -> u32 {
        self.regs.get(index).copied().unwrap_or(0)
    }

    /// Write a register. Out-of-range indices are ignored.
    pub fn write(&mut self, index: usize, value: u32) {
        if let Some(reg) = self.regs.get_mut(index) {
            *reg = value;
        }
    }

    /// Zero every register
    pub fn clear(&mut self) {
        self.regs = [0; NUM_TOTAL_REGS];
    }

    /// Advance PC, NEXT_PC and PREV_PC past the current instruction
    pub fn advance_pc(&mut self) {
        let pc = self.read(PC_REG);
        self.write(PREV_PC_REG, pc);
        let next = self.read(NEXT_PC_REG);
        self.write(PC_REG, next);
        self.write(NEXT_PC_REG, next.wrapping_add(4));
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}
