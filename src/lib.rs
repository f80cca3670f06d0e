// Parsing
mod lexer;
mod parser;
pub use parser::AsmParser;
mod air;
pub use air::{Instruction, Mnemonic, Op, Operand, Program};
mod integer;
pub use integer::parse_literal;

// Running
mod runtime;
pub use runtime::{RunEnvironment, Step};
mod state;
pub use state::{State, MEMORY_MAX, STACK_TOP};
mod breakpoint;
pub use breakpoint::{Breakpoint, Breakpoints};
mod output;
pub use output::Output;

mod symbol;
pub use symbol::{Flag, Label, Register};

pub mod error;
pub use error::CpuError;

pub mod env;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 8;

/// Instructions executed before a run is considered stuck.
pub const DEFAULT_MAX_STEPS: u64 = 1_000_000;
