use crate::{
    error::CpuError,
    symbol::{Flag, Register},
};

/// Memory is 256 bytes.
pub const MEMORY_MAX: usize = 0x100;

/// Initial stack pointer, leaves headroom for the stack to grow down.
pub const STACK_TOP: u64 = 240;

/// Registers, flags and memory of the machine.
///
/// Only the interpreter mutates registers and flags. Everything else reads them for display.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct State {
    /// 9x 64-bit registers, indexed by [`Register`]
    reg: [u64; Register::COUNT],
    /// Condition flags, indexed by [`Flag`]
    flag: [bool; Flag::COUNT],
    /// System memory - 256 bytes
    mem: Box<[u8; MEMORY_MAX]>,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    pub fn new() -> Self {
        let mut reg = [0; Register::COUNT];
        reg[Register::Rsp.index()] = STACK_TOP;
        State {
            reg,
            flag: [false; Flag::COUNT],
            mem: Box::new([0; MEMORY_MAX]),
        }
    }

    /// Look up a register by its exact name.
    pub fn get_register(&self, name: &str) -> Result<u64, CpuError> {
        let reg = name.parse::<Register>().map_err(|_| CpuError::UnknownKey {
            key: name.to_owned(),
        })?;
        Ok(self.reg(reg))
    }

    /// Look up a flag by its exact name.
    pub fn get_flag(&self, name: &str) -> Result<bool, CpuError> {
        let flag = name.parse::<Flag>().map_err(|_| CpuError::UnknownKey {
            key: name.to_owned(),
        })?;
        Ok(self.flag(flag))
    }

    pub fn get_memory(&self, addr: usize) -> Result<u8, CpuError> {
        self.mem
            .get(addr)
            .copied()
            .ok_or(CpuError::OutOfRange { addr })
    }

    pub fn set_memory(&mut self, addr: usize, value: u8) -> Result<(), CpuError> {
        let cell = self
            .mem
            .get_mut(addr)
            .ok_or(CpuError::OutOfRange { addr })?;
        *cell = value;
        Ok(())
    }

    #[inline]
    pub fn reg(&self, reg: Register) -> u64 {
        self.reg[reg.index()]
    }

    #[inline]
    pub(crate) fn set_reg(&mut self, reg: Register, value: u64) {
        self.reg[reg.index()] = value;
    }

    #[inline]
    pub fn flag(&self, flag: Flag) -> bool {
        self.flag[flag.index()]
    }

    #[inline]
    pub(crate) fn set_flag(&mut self, flag: Flag, value: bool) {
        self.flag[flag.index()] = value;
    }

    /// Set zero and sign from a result, clear carry and overflow.
    pub(crate) fn set_logic_flags(&mut self, result: u64) {
        self.set_result_flags(result, false, false);
    }

    pub(crate) fn set_result_flags(&mut self, result: u64, carry: bool, overflow: bool) {
        self.set_flag(Flag::Zero, result == 0);
        self.set_flag(Flag::Sign, sign(result));
        self.set_flag(Flag::Carry, carry);
        self.set_flag(Flag::Overflow, overflow);
    }

    /// Memory window starting at `start`, cut off at the end of memory.
    pub fn mem_window(&self, start: usize, len: usize) -> &[u8] {
        let start = start.min(MEMORY_MAX);
        let end = start.saturating_add(len).min(MEMORY_MAX);
        &self.mem[start..end]
    }

    pub fn memory(&self) -> &[u8; MEMORY_MAX] {
        &self.mem
    }
}

/// Bit 63, the sign of a two's complement word.
#[inline]
pub(crate) fn sign(val: u64) -> bool {
    (val >> 63) & 1 == 1
}
