use std::{fmt, slice, str::FromStr};

use fxhash::FxBuildHasher;
use indexmap::IndexMap;

use crate::{
    error::CpuError,
    integer::parse_literal,
    symbol::{Label, Register},
};

// Label table of label -> program index
type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Instruction argument, decided once when the program is loaded.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Operand {
    Reg(Register),
    Imm(u64),
}

impl Operand {
    /// Register if the text names one exactly, integer literal otherwise.
    pub fn resolve(raw: &str) -> Result<Operand, CpuError> {
        match raw.parse::<Register>() {
            Ok(reg) => Ok(Operand::Reg(reg)),
            Err(_) => parse_literal(raw).map(Operand::Imm),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(reg) => write!(f, "{}", reg),
            Operand::Imm(val) => write!(f, "{}", val),
        }
    }
}

/// Recognised instruction mnemonics.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Mnemonic {
    Mov,
    Add,
    Sub,
    Cmp,
    Mul,
    Div,
    Inc,
    Dec,
    And,
    Or,
    Xor,
    Jmp,
    Je,
    Jne,
}

impl Mnemonic {
    pub const ALL: [Mnemonic; 14] = [
        Mnemonic::Mov,
        Mnemonic::Add,
        Mnemonic::Sub,
        Mnemonic::Cmp,
        Mnemonic::Mul,
        Mnemonic::Div,
        Mnemonic::Inc,
        Mnemonic::Dec,
        Mnemonic::And,
        Mnemonic::Or,
        Mnemonic::Xor,
        Mnemonic::Jmp,
        Mnemonic::Je,
        Mnemonic::Jne,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Mnemonic::Mov => "MOV",
            Mnemonic::Add => "ADD",
            Mnemonic::Sub => "SUB",
            Mnemonic::Cmp => "CMP",
            Mnemonic::Mul => "MUL",
            Mnemonic::Div => "DIV",
            Mnemonic::Inc => "INC",
            Mnemonic::Dec => "DEC",
            Mnemonic::And => "AND",
            Mnemonic::Or => "OR",
            Mnemonic::Xor => "XOR",
            Mnemonic::Jmp => "JMP",
            Mnemonic::Je => "JE",
            Mnemonic::Jne => "JNE",
        }
    }

    /// Number of operands the instruction takes.
    pub fn arity(self) -> usize {
        match self {
            Mnemonic::Div
            | Mnemonic::Inc
            | Mnemonic::Dec
            | Mnemonic::Jmp
            | Mnemonic::Je
            | Mnemonic::Jne => 1,
            _ => 2,
        }
    }
}

impl FromStr for Mnemonic {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mnemonic::ALL
            .into_iter()
            .find(|mn| mn.name().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded operation of a single instruction.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Op {
    /// Copy SRC into DEST, flags untouched
    Mov { dest: Register, src: Operand },
    Add { dest: Register, src: Operand },
    Sub { dest: Register, src: Operand },
    /// Subtract without storing the result
    Cmp { reg: Register, src: Operand },
    /// Full 128-bit product into RDX:RAX
    Mul { lhs: Register, rhs: Register },
    /// Unsigned RAX / DIVISOR, quotient into RAX, remainder into RDX
    Div { divisor: Register },
    Inc { reg: Register },
    Dec { reg: Register },
    And { dest: Register, src: Register },
    Or { dest: Register, src: Register },
    Xor { dest: Register, src: Register },
    Jmp { target: Label },
    /// Jump if zero flag set
    Je { target: Label },
    /// Jump if zero flag clear
    Jne { target: Label },
    /// Mnemonic outside the instruction set. Kept with its raw operands for display.
    Unknown { mnemonic: String, args: Vec<String> },
    /// Known mnemonic whose operands failed to decode. Fails when dispatched.
    Invalid {
        mnemonic: Mnemonic,
        args: Vec<String>,
        err: CpuError,
    },
}

impl Op {
    pub fn mnemonic(&self) -> Option<Mnemonic> {
        Some(match self {
            Op::Mov { .. } => Mnemonic::Mov,
            Op::Add { .. } => Mnemonic::Add,
            Op::Sub { .. } => Mnemonic::Sub,
            Op::Cmp { .. } => Mnemonic::Cmp,
            Op::Mul { .. } => Mnemonic::Mul,
            Op::Div { .. } => Mnemonic::Div,
            Op::Inc { .. } => Mnemonic::Inc,
            Op::Dec { .. } => Mnemonic::Dec,
            Op::And { .. } => Mnemonic::And,
            Op::Or { .. } => Mnemonic::Or,
            Op::Xor { .. } => Mnemonic::Xor,
            Op::Jmp { .. } => Mnemonic::Jmp,
            Op::Je { .. } => Mnemonic::Je,
            Op::Jne { .. } => Mnemonic::Jne,
            Op::Invalid { mnemonic, .. } => *mnemonic,
            Op::Unknown { .. } => return None,
        })
    }

    /// Decode failure carried by an [`Op::Invalid`].
    pub fn error(&self) -> Option<&CpuError> {
        match self {
            Op::Invalid { err, .. } => Some(err),
            _ => None,
        }
    }

    /// Jump target, if this is a jump.
    pub fn target(&self) -> Option<&Label> {
        match self {
            Op::Jmp { target } | Op::Je { target } | Op::Jne { target } => Some(target),
            _ => None,
        }
    }

    /// Decode a mnemonic and its operand text. Mnemonics ignore case.
    ///
    /// Operand problems do not fail the decode. They are kept in an [`Op::Invalid`] and only
    /// surface when that instruction is stepped.
    pub fn decode(mnemonic: &str, args: &[&str]) -> Op {
        let owned_args = || args.iter().map(|arg| arg.to_string()).collect();
        let Ok(mn) = mnemonic.parse::<Mnemonic>() else {
            return Op::Unknown {
                mnemonic: mnemonic.to_owned(),
                args: owned_args(),
            };
        };
        Self::decode_operands(mn, args).unwrap_or_else(|err| Op::Invalid {
            mnemonic: mn,
            args: owned_args(),
            err,
        })
    }

    /// Each operand error names the operand position (1 or 2) through the error kind:
    /// a bad destination is [`CpuError::InvalidDestination`], a bad register-only operand
    /// is [`CpuError::InvalidOperand`], a bad value is [`CpuError::MalformedLiteral`].
    fn decode_operands(mn: Mnemonic, args: &[&str]) -> Result<Op, CpuError> {
        let decoder = Decoder { mn, args };
        decoder.check_arity()?;

        let op = match mn {
            Mnemonic::Mov => Op::Mov {
                dest: decoder.dest(0)?,
                src: decoder.value(1)?,
            },
            Mnemonic::Add => Op::Add {
                dest: decoder.dest(0)?,
                src: decoder.value(1)?,
            },
            Mnemonic::Sub => Op::Sub {
                dest: decoder.dest(0)?,
                src: decoder.value(1)?,
            },
            Mnemonic::Cmp => Op::Cmp {
                reg: decoder.dest(0)?,
                src: decoder.value(1)?,
            },
            Mnemonic::Mul => Op::Mul {
                lhs: decoder.reg(0)?,
                rhs: decoder.reg(1)?,
            },
            Mnemonic::Div => Op::Div {
                divisor: decoder.reg(0)?,
            },
            Mnemonic::Inc => Op::Inc {
                reg: decoder.dest(0)?,
            },
            Mnemonic::Dec => Op::Dec {
                reg: decoder.dest(0)?,
            },
            Mnemonic::And => Op::And {
                dest: decoder.reg(0)?,
                src: decoder.reg(1)?,
            },
            Mnemonic::Or => Op::Or {
                dest: decoder.reg(0)?,
                src: decoder.reg(1)?,
            },
            Mnemonic::Xor => Op::Xor {
                dest: decoder.reg(0)?,
                src: decoder.reg(1)?,
            },
            Mnemonic::Jmp => Op::Jmp {
                target: decoder.label(0)?,
            },
            Mnemonic::Je => Op::Je {
                target: decoder.label(0)?,
            },
            Mnemonic::Jne => Op::Jne {
                target: decoder.label(0)?,
            },
        };
        Ok(op)
    }
}

/// Operand text of one instruction being decoded.
struct Decoder<'a> {
    mn: Mnemonic,
    args: &'a [&'a str],
}

impl<'a> Decoder<'a> {
    fn check_arity(&self) -> Result<(), CpuError> {
        if let Some(extra) = self.args.get(self.mn.arity()) {
            return Err(CpuError::UnexpectedOperand {
                mnemonic: self.mn.name(),
                operand: extra.to_string(),
            });
        }
        Ok(())
    }

    fn raw(&self, idx: usize) -> Result<&'a str, CpuError> {
        match self.args.get(idx) {
            Some(raw) if !raw.is_empty() => Ok(raw),
            _ => Err(CpuError::MissingOperand {
                mnemonic: self.mn.name(),
                position: idx as u8 + 1,
            }),
        }
    }

    fn dest(&self, idx: usize) -> Result<Register, CpuError> {
        let raw = self.raw(idx)?;
        raw.parse().map_err(|_| CpuError::InvalidDestination {
            mnemonic: self.mn.name(),
            operand: raw.to_owned(),
        })
    }

    fn reg(&self, idx: usize) -> Result<Register, CpuError> {
        let raw = self.raw(idx)?;
        raw.parse().map_err(|_| CpuError::InvalidOperand {
            mnemonic: self.mn.name(),
            operand: raw.to_owned(),
        })
    }

    fn value(&self, idx: usize) -> Result<Operand, CpuError> {
        Operand::resolve(self.raw(idx)?)
    }

    fn label(&self, idx: usize) -> Result<Label, CpuError> {
        self.raw(idx).map(Label::new)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mn = self.mnemonic().map(Mnemonic::name).unwrap_or_default();
        match self {
            Op::Mov { dest, src }
            | Op::Add { dest, src }
            | Op::Sub { dest, src }
            | Op::Cmp { reg: dest, src } => write!(f, "{} {}, {}", mn, dest, src),
            Op::Mul { lhs, rhs } => write!(f, "{} {}, {}", mn, lhs, rhs),
            Op::And { dest, src } | Op::Or { dest, src } | Op::Xor { dest, src } => {
                write!(f, "{} {}, {}", mn, dest, src)
            }
            Op::Div { divisor: reg } | Op::Inc { reg } | Op::Dec { reg } => {
                write!(f, "{} {}", mn, reg)
            }
            Op::Jmp { target } | Op::Je { target } | Op::Jne { target } => {
                write!(f, "{} {}", mn, target)
            }
            Op::Unknown { mnemonic, args } if args.is_empty() => write!(f, "{}", mnemonic),
            Op::Unknown { mnemonic, args } => write!(f, "{} {}", mnemonic, args.join(", ")),
            Op::Invalid { args, .. } if args.is_empty() => write!(f, "{}", mn),
            Op::Invalid { args, .. } => write!(f, "{} {}", mn, args.join(", ")),
        }
    }
}

/// Single program step, with an optional label bound to its position.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Instruction {
    pub label: Option<Label>,
    pub op: Op,
}

impl Instruction {
    pub fn new(label: Option<Label>, op: Op) -> Self {
        Instruction { label, op }
    }

    /// Build an instruction from its text columns. Empty strings mean absent.
    pub fn from_parts(label: &str, op: &str, arg1: &str, arg2: &str) -> Self {
        let args: Vec<&str> = match (arg1.is_empty(), arg2.is_empty()) {
            (true, true) => vec![],
            (false, true) => vec![arg1],
            _ => vec![arg1, arg2],
        };
        let label = (!label.is_empty()).then(|| Label::new(label));
        Instruction::new(label, Op::decode(op, &args))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(label) = &self.label {
            write!(f, "{}: ", label)?;
        }
        write!(f, "{}", self.op)
    }
}

/// Loaded program: instructions in order, and the label table derived from them.
///
/// The label table is built once in [`Program::new`] and never changes afterwards.
#[derive(Clone, Debug, Default)]
pub struct Program {
    instrs: Vec<Instruction>,
    labels: FxMap<String, usize>,
}

impl Program {
    /// Fails on the second definition of a label.
    pub fn new(instrs: Vec<Instruction>) -> Result<Self, CpuError> {
        let mut labels = FxMap::with_hasher(FxBuildHasher::default());
        for (idx, instr) in instrs.iter().enumerate() {
            let Some(label) = &instr.label else {
                continue;
            };
            if let Some(&first) = labels.get(label.as_str()) {
                return Err(CpuError::DuplicateLabel {
                    label: label.to_string(),
                    first,
                    second: idx,
                });
            }
            labels.insert(label.to_string(), idx);
        }
        Ok(Program { instrs, labels })
    }

    pub fn get(&self, idx: usize) -> Option<&Instruction> {
        self.instrs.get(idx)
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, Instruction> {
        self.instrs.iter()
    }

    /// Program index bound to a label.
    pub fn resolve(&self, label: &str) -> Result<usize, CpuError> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| CpuError::UnknownLabel {
                label: label.to_owned(),
            })
    }

    /// Labels in definition order.
    pub fn labels(&self) -> impl Iterator<Item = (&str, usize)> {
        self.labels.iter().map(|(label, idx)| (label.as_str(), *idx))
    }

    /// Jumps whose target is not defined, as `(index, target)`.
    pub fn unresolved_jumps(&self) -> Vec<(usize, &Label)> {
        self.instrs
            .iter()
            .enumerate()
            .filter_map(|(idx, instr)| instr.op.target().map(|target| (idx, target)))
            .filter(|(_, target)| !self.labels.contains_key(target.as_str()))
            .collect()
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a Instruction;
    type IntoIter = slice::Iter<'a, Instruction>;
    fn into_iter(self) -> Self::IntoIter {
        self.instrs.iter()
    }
}

impl TryFrom<Vec<Instruction>> for Program {
    type Error = CpuError;
    fn try_from(instrs: Vec<Instruction>) -> Result<Self, Self::Error> {
        Program::new(instrs)
    }
}
