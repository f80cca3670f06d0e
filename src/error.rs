use std::{error::Error, fmt};

use miette::{miette, LabeledSpan, Report, Severity};

use crate::{lexer::TokenKind, symbol::Span};

/// Error raised by the machine while loading or executing a program.
///
/// Every failure leaves the machine exactly as it was before the failing operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CpuError {
    /// Register or flag name outside the fixed set.
    UnknownKey { key: String },
    /// Memory address past the end of memory.
    OutOfRange { addr: usize },
    /// Operand is neither a register nor a parseable integer.
    MalformedLiteral { literal: String },
    /// First operand of a register-writing instruction is not a register.
    InvalidDestination {
        mnemonic: &'static str,
        operand: String,
    },
    /// Register operand that does not name a register.
    InvalidOperand {
        mnemonic: &'static str,
        operand: String,
    },
    /// Jump target missing from the label map.
    UnknownLabel { label: String },
    DivisionByZero,
    /// Label bound to more than one instruction.
    DuplicateLabel {
        label: String,
        first: usize,
        second: usize,
    },
    MissingOperand {
        mnemonic: &'static str,
        position: u8,
    },
    UnexpectedOperand {
        mnemonic: &'static str,
        operand: String,
    },
    /// Only raised when unknown opcodes are not tolerated.
    UnknownOpcode { mnemonic: String },
}

impl CpuError {
    /// Diagnostic code used when reporting through miette.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownKey { .. } => "cpu::unknown_key",
            Self::OutOfRange { .. } => "cpu::out_of_range",
            Self::MalformedLiteral { .. } => "cpu::malformed_literal",
            Self::InvalidDestination { .. } => "cpu::invalid_destination",
            Self::InvalidOperand { .. } => "cpu::invalid_operand",
            Self::UnknownLabel { .. } => "cpu::unknown_label",
            Self::DivisionByZero => "cpu::division_by_zero",
            Self::DuplicateLabel { .. } => "cpu::duplicate_label",
            Self::MissingOperand { .. } => "cpu::missing_operand",
            Self::UnexpectedOperand { .. } => "cpu::unexpected_operand",
            Self::UnknownOpcode { .. } => "cpu::unknown_opcode",
        }
    }

    fn help(&self) -> &'static str {
        match self {
            Self::UnknownKey { .. } => "registers are RAX RBX RCX RDX RSI RDI RSP RBP RIP, flags are ZF CF SF OF",
            Self::OutOfRange { .. } => "memory addresses range from 0 to 255",
            Self::MalformedLiteral { .. } => "literals are decimal like 42 or hex like 0x2A",
            Self::InvalidDestination { .. } => "the first operand must be a register",
            Self::InvalidOperand { .. } => "this instruction only accepts register operands",
            Self::UnknownLabel { .. } => "jump targets must be labels defined in this program",
            Self::DivisionByZero => "check the divisor register before DIV",
            Self::DuplicateLabel { .. } => "labels are only allowed once per program",
            Self::MissingOperand { .. } => "check the operands for this instruction",
            Self::UnexpectedOperand { .. } => "check the operands for this instruction",
            Self::UnknownOpcode { .. } => "unset TINYCPU_STRICT or drop --strict to skip unknown instructions",
        }
    }
}

impl Error for CpuError {}

impl fmt::Display for CpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKey { key } => write!(f, "Unknown register or flag `{}`", key),
            Self::OutOfRange { addr } => write!(f, "Memory address {} out of range", addr),
            Self::MalformedLiteral { literal } => {
                write!(f, "Malformed integer literal `{}`", literal)
            }
            Self::InvalidDestination { mnemonic, operand } => {
                write!(f, "Invalid {} destination `{}`", mnemonic, operand)
            }
            Self::InvalidOperand { mnemonic, operand } => {
                write!(f, "Invalid {} operand `{}`", mnemonic, operand)
            }
            Self::UnknownLabel { label } => write!(f, "Unknown label `{}`", label),
            Self::DivisionByZero => write!(f, "Division by zero"),
            Self::DuplicateLabel {
                label,
                first,
                second,
            } => write!(
                f,
                "Label `{}` defined at instruction {} and again at instruction {}",
                label, first, second
            ),
            Self::MissingOperand { mnemonic, position } => {
                write!(f, "{} is missing operand {}", mnemonic, position)
            }
            Self::UnexpectedOperand { mnemonic, operand } => {
                write!(f, "Unexpected operand `{}` for {}", operand, mnemonic)
            }
            Self::UnknownOpcode { mnemonic } => write!(f, "Unknown instruction `{}`", mnemonic),
        }
    }
}

// Runtime errors

pub fn runtime_error(err: &CpuError, pc: usize, instr: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = err.code(),
        help = err.help(),
        "{err} (at instruction {pc}: `{instr}`)",
    )
}

pub fn load_error(err: &CpuError) -> Report {
    miette!(
        severity = Severity::Error,
        code = err.code(),
        help = err.help(),
        "{err}",
    )
}

pub fn step_limit(limit: u64) -> Report {
    miette!(
        severity = Severity::Error,
        code = "run::step_limit",
        help = "raise the limit with --max-steps if the program is expected to run this long",
        "Program did not halt within {limit} steps",
    )
}

pub fn bad_breakpoint(spec: &str, len: usize) -> Report {
    miette!(
        severity = Severity::Error,
        code = "run::bad_breakpoint",
        help = format!("use a label from the program or an index below {len}"),
        "Cannot place a breakpoint at `{spec}`",
    )
}

// Lexer errors

pub fn lex_unknown(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::unknown",
        help = "operands are register names, labels, or integer literals",
        labels = vec![LabeledSpan::at(span, "unknown token")],
        "Encountered an unknown token",
    )
    .with_source_code(src.to_owned())
}

// Parser errors

pub fn parse_duplicate_label(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::duplicate_label",
        help = "labels are only allowed once per program",
        labels = vec![LabeledSpan::at(span, "duplicate label")],
        "Duplicate label"
    )
    .with_source_code(src.to_owned())
}

pub fn parse_stacked_label(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::stacked_label",
        help = "each instruction can carry a single label",
        labels = vec![LabeledSpan::at(span, "second label")],
        "Instruction already has a label"
    )
    .with_source_code(src.to_owned())
}

pub fn parse_generic_unexpected(span: Span, src: &str, expected: &str, found: TokenKind) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::unexpected_token",
        help = "lines look like `label: MNEMONIC operand, operand`",
        labels = vec![LabeledSpan::at(span, "unexpected token")],
        "Expected {expected}, found {found}",
    )
    .with_source_code(src.to_owned())
}

pub fn parse_eof(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::unexpected_eof",
        help = "a label must be followed by an instruction",
        labels = vec![LabeledSpan::at(span, "label without instruction")],
        "Unexpected end of file",
    )
    .with_source_code(src.to_owned())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn messages_name_the_culprit() {
        let err = CpuError::InvalidDestination {
            mnemonic: "ADD",
            operand: "5".into(),
        };
        assert_eq!(err.to_string(), "Invalid ADD destination `5`");
        assert_eq!(err.code(), "cpu::invalid_destination");

        let err = CpuError::OutOfRange { addr: 256 };
        assert_eq!(err.to_string(), "Memory address 256 out of range");
    }

    #[test]
    fn reports_carry_code() {
        let report = load_error(&CpuError::DivisionByZero);
        assert_eq!(
            report.code().map(|code| code.to_string()),
            Some("cpu::division_by_zero".to_string())
        );
    }
}
