use std::{fmt, ops::Range, str::FromStr};

use miette::SourceSpan;

/// Location within source
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Span {
    offs: SrcOffset,
    len: usize,
}

impl Span {
    pub fn new(offs: SrcOffset, len: usize) -> Self {
        Span { offs, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn offs(&self) -> usize {
        self.offs.0
    }

    pub fn end(&self) -> usize {
        self.offs.0 + self.len
    }
}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}

impl From<Span> for Range<usize> {
    fn from(value: Span) -> Self {
        value.offs()..value.end()
    }
}

/// Used to refer to offsets from the start of a source file.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct SrcOffset(pub usize);

/// Represents the CPU registers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Register {
    Rax = 0,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    /// Stack pointer, starts near the top of memory.
    Rsp,
    Rbp,
    /// Shadow of the program counter. Only written by instructions naming it.
    Rip,
}

impl Register {
    pub const COUNT: usize = 9;

    /// Every register, in display order.
    pub const ALL: [Register; Register::COUNT] = [
        Register::Rax,
        Register::Rbx,
        Register::Rcx,
        Register::Rdx,
        Register::Rsi,
        Register::Rdi,
        Register::Rsp,
        Register::Rbp,
        Register::Rip,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Register::Rax => "RAX",
            Register::Rbx => "RBX",
            Register::Rcx => "RCX",
            Register::Rdx => "RDX",
            Register::Rsi => "RSI",
            Register::Rdi => "RDI",
            Register::Rsp => "RSP",
            Register::Rbp => "RBP",
            Register::Rip => "RIP",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl FromStr for Register {
    type Err = ();

    // Exact match only, `rax` is not a register.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Register::ALL
            .into_iter()
            .find(|reg| reg.name() == s)
            .ok_or(())
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Condition bits set by arithmetic and logic instructions.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Flag {
    /// Result was zero
    Zero = 0,
    /// Unsigned carry or borrow out of bit 63
    Carry,
    /// Bit 63 of the result
    Sign,
    /// Signed overflow
    Overflow,
}

impl Flag {
    pub const COUNT: usize = 4;

    /// Every flag, in display order.
    pub const ALL: [Flag; Flag::COUNT] = [Flag::Zero, Flag::Carry, Flag::Sign, Flag::Overflow];

    pub fn name(self) -> &'static str {
        match self {
            Flag::Zero => "ZF",
            Flag::Carry => "CF",
            Flag::Sign => "SF",
            Flag::Overflow => "OF",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl FromStr for Flag {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Flag::ALL.into_iter().find(|flag| flag.name() == s).ok_or(())
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Label used to refer to a position in the program
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Label(String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Label(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
