use crate::{
    air::{Op, Operand, Program},
    error::CpuError,
    state::{sign, State},
    symbol::{Flag, Register},
};

/// What a single step did.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Step {
    /// Instruction at `pc` ran and the counter moved to `next`.
    Executed { pc: usize, next: usize },
    /// Instruction at `pc` was not recognised and was skipped.
    Skipped { pc: usize },
    /// Counter is past the end of the program, nothing ran.
    Halted,
}

/// Result of an ALU operation, before it is written back.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct AluOut {
    result: u64,
    carry: bool,
    overflow: bool,
}

/// Loaded program together with the machine executing it.
///
/// The environment is the only thing that mutates its [`State`] and program counter.
/// Independent runs each need their own environment.
#[derive(Clone, Debug, Default)]
pub struct RunEnvironment {
    state: State,
    program: Program,
    /// Index of the next instruction
    pc: usize,
    /// Amount of instructions executed since load or reset
    cycles: u64,
    /// Unknown instructions are errors instead of no-ops
    strict: bool,
}

impl RunEnvironment {
    /// Fresh machine with `program` loaded.
    pub fn new(program: Program) -> Self {
        RunEnvironment {
            program,
            ..Default::default()
        }
    }

    /// Replace the program and rewind the counter. Machine state is kept.
    pub fn load(&mut self, program: Program) {
        self.program = program;
        self.pc = 0;
        self.cycles = 0;
    }

    /// Fresh machine state and counter, same program.
    pub fn reset(&mut self) {
        self.state = State::new();
        self.pc = 0;
        self.cycles = 0;
    }

    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn is_halted(&self) -> bool {
        self.pc >= self.program.len()
    }

    pub fn get_register(&self, name: &str) -> Result<u64, CpuError> {
        self.state.get_register(name)
    }

    pub fn get_flag(&self, name: &str) -> Result<bool, CpuError> {
        self.state.get_flag(name)
    }

    pub fn get_memory(&self, addr: usize) -> Result<u8, CpuError> {
        self.state.get_memory(addr)
    }

    /// Preload memory. Instructions never touch memory themselves.
    pub fn set_memory(&mut self, addr: usize, value: u8) -> Result<(), CpuError> {
        self.state.set_memory(addr, value)
    }

    /// Run until the counter leaves the program. Returns the amount of steps taken.
    ///
    /// Stops at the first failing instruction, leaving the counter on it.
    pub fn run(&mut self) -> Result<u64, CpuError> {
        let mut steps = 0;
        while !self.is_halted() {
            self.step()?;
            steps += 1;
        }
        Ok(steps)
    }

    /// Execute the instruction at the counter.
    ///
    /// On error nothing changes, the counter included.
    pub fn step(&mut self) -> Result<Step, CpuError> {
        let pc = self.pc;
        let Some(instr) = self.program.get(pc) else {
            return Ok(Step::Halted);
        };

        let next = match &instr.op {
            Op::Mov { dest, src } => {
                let val = operand(&self.state, *src);
                self.state.set_reg(*dest, val);
                pc + 1
            }
            Op::Add { dest, src } => {
                let out = add(self.state.reg(*dest), operand(&self.state, *src));
                write_back(&mut self.state, *dest, out);
                pc + 1
            }
            Op::Sub { dest, src } => {
                let out = sub(self.state.reg(*dest), operand(&self.state, *src));
                write_back(&mut self.state, *dest, out);
                pc + 1
            }
            Op::Cmp { reg, src } => {
                let out = sub(self.state.reg(*reg), operand(&self.state, *src));
                self.state
                    .set_result_flags(out.result, out.carry, out.overflow);
                pc + 1
            }
            Op::Mul { lhs, rhs } => {
                let (low, high) = mul(self.state.reg(*lhs), self.state.reg(*rhs));
                self.state.set_reg(Register::Rax, low);
                self.state.set_reg(Register::Rdx, high);
                self.state.set_result_flags(low, high != 0, high != 0);
                pc + 1
            }
            Op::Div { divisor } => {
                let (quot, rem) = div(self.state.reg(Register::Rax), self.state.reg(*divisor))?;
                self.state.set_reg(Register::Rdx, rem);
                self.state.set_reg(Register::Rax, quot);
                self.state.set_logic_flags(quot);
                pc + 1
            }
            Op::Inc { reg } => {
                let out = inc(self.state.reg(*reg));
                write_back(&mut self.state, *reg, out);
                pc + 1
            }
            Op::Dec { reg } => {
                let out = dec(self.state.reg(*reg));
                write_back(&mut self.state, *reg, out);
                pc + 1
            }
            Op::And { dest, src } => {
                logic(&mut self.state, *dest, *src, |a, b| a & b);
                pc + 1
            }
            Op::Or { dest, src } => {
                logic(&mut self.state, *dest, *src, |a, b| a | b);
                pc + 1
            }
            Op::Xor { dest, src } => {
                logic(&mut self.state, *dest, *src, |a, b| a ^ b);
                pc + 1
            }
            Op::Jmp { target } => self.program.resolve(target.as_str())?,
            Op::Je { target } => {
                let dest = self.program.resolve(target.as_str())?;
                if self.state.flag(Flag::Zero) {
                    dest
                } else {
                    pc + 1
                }
            }
            Op::Jne { target } => {
                let dest = self.program.resolve(target.as_str())?;
                if self.state.flag(Flag::Zero) {
                    pc + 1
                } else {
                    dest
                }
            }
            Op::Invalid { err, .. } => return Err(err.clone()),
            Op::Unknown { mnemonic, .. } => {
                if self.strict {
                    return Err(CpuError::UnknownOpcode {
                        mnemonic: mnemonic.clone(),
                    });
                }
                self.pc = pc + 1;
                self.cycles += 1;
                return Ok(Step::Skipped { pc });
            }
        };

        self.pc = next;
        self.cycles += 1;
        Ok(Step::Executed { pc, next })
    }
}

#[inline]
fn operand(state: &State, operand: Operand) -> u64 {
    match operand {
        Operand::Reg(reg) => state.reg(reg),
        Operand::Imm(val) => val,
    }
}

fn write_back(state: &mut State, dest: Register, out: AluOut) {
    state.set_reg(dest, out.result);
    state.set_result_flags(out.result, out.carry, out.overflow);
}

fn logic(state: &mut State, dest: Register, src: Register, f: fn(u64, u64) -> u64) {
    let result = f(state.reg(dest), state.reg(src));
    state.set_reg(dest, result);
    state.set_logic_flags(result);
}

fn add(a: u64, b: u64) -> AluOut {
    let result = a.wrapping_add(b);
    AluOut {
        result,
        carry: result < a,
        // Same-sign operands giving a result of the other sign
        overflow: sign(a) == sign(b) && sign(result) != sign(a),
    }
}

fn sub(a: u64, b: u64) -> AluOut {
    let result = a.wrapping_sub(b);
    AluOut {
        result,
        // Borrow
        carry: a < b,
        overflow: sign(a) != sign(b) && sign(result) != sign(a),
    }
}

fn inc(before: u64) -> AluOut {
    let after = before.wrapping_add(1);
    AluOut {
        result: after,
        carry: after < before,
        overflow: !sign(before) && sign(after),
    }
}

fn dec(before: u64) -> AluOut {
    let after = before.wrapping_sub(1);
    AluOut {
        result: after,
        carry: after > before,
        overflow: sign(before) && !sign(after),
    }
}

/// Full product as `(low, high)` halves.
fn mul(a: u64, b: u64) -> (u64, u64) {
    let product = a as u128 * b as u128;
    (product as u64, (product >> 64) as u64)
}

/// Unsigned `(quotient, remainder)`.
fn div(dividend: u64, divisor: u64) -> Result<(u64, u64), CpuError> {
    if divisor == 0 {
        return Err(CpuError::DivisionByZero);
    }
    Ok((dividend / divisor, dividend % divisor))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::air::Instruction;

    fn program(lines: &[(&str, &str, &str, &str)]) -> Program {
        let instrs = lines
            .iter()
            .map(|(label, op, a1, a2)| Instruction::from_parts(label, op, a1, a2))
            .collect();
        Program::new(instrs).unwrap()
    }

    /// Run `lines` to completion and return the environment.
    fn run(lines: &[(&str, &str, &str, &str)]) -> RunEnvironment {
        let mut env = RunEnvironment::new(program(lines));
        env.run().unwrap();
        env
    }

    fn flags(env: &RunEnvironment) -> [bool; 4] {
        Flag::ALL.map(|flag| env.state().flag(flag))
    }

    fn reg(env: &RunEnvironment, name: &str) -> u64 {
        env.get_register(name).unwrap()
    }

    const DEMO: &[(&str, &str, &str, &str)] = &[
        ("start", "MOV", "RAX", "5"),
        ("", "MOV", "RBX", "3"),
        ("", "MUL", "RAX", "RBX"),
        ("", "INC", "RAX", ""),
        ("", "CMP", "RAX", "16"),
        ("", "JE", "equal", ""),
        ("", "DEC", "RAX", ""),
        ("", "DIV", "RBX", ""),
        ("", "AND", "RAX", "RBX"),
        ("", "OR", "RCX", "RAX"),
        ("", "XOR", "RDX", "RBX"),
        ("equal", "MOV", "RCX", "999"),
    ];

    #[test]
    fn mov_sets_every_register() {
        for reg in Register::ALL {
            for imm in ["0", "1", "240", "0xFFFFFFFFFFFFFFFF", "12345678901234"] {
                let env = run(&[("", "MOV", reg.name(), imm)]);
                let expected = crate::integer::parse_literal(imm).unwrap();
                assert_eq!(env.get_register(reg.name()), Ok(expected));
                // Flags untouched
                assert_eq!(flags(&env), [false; 4]);
            }
        }
    }

    #[test]
    fn mov_copies_registers() {
        let env = run(&[("", "MOV", "RAX", "RSP")]);
        assert_eq!(reg(&env, "RAX"), 240);
    }

    #[test]
    fn add_flags_follow_unsigned_wrap() {
        let values = [0, 1, 2, 5, 1 << 62, 1 << 63, u64::MAX - 1, u64::MAX];
        for a in values {
            for b in values {
                let mut env = RunEnvironment::new(program(&[("", "ADD", "RAX", "RBX")]));
                env.state.set_reg(Register::Rax, a);
                env.state.set_reg(Register::Rbx, b);
                env.run().unwrap();

                let sum = a.wrapping_add(b);
                assert_eq!(reg(&env, "RAX"), sum);
                assert_eq!(env.get_flag("ZF"), Ok(sum == 0), "{a} + {b}");
                assert_eq!(env.get_flag("CF"), Ok(sum < a), "{a} + {b}");
                assert_eq!(env.get_flag("SF"), Ok(sum >> 63 == 1), "{a} + {b}");
            }
        }
    }

    #[test]
    fn add_signed_overflow() {
        let env = run(&[("", "MOV", "RAX", "0x7FFFFFFFFFFFFFFF"), ("", "ADD", "RAX", "1")]);
        assert_eq!(reg(&env, "RAX"), 1 << 63);
        // ZF CF SF OF
        assert_eq!(flags(&env), [false, false, true, true]);

        let env = run(&[("", "MOV", "RAX", "0x8000000000000000"), ("", "ADD", "RAX", "0x8000000000000000")]);
        assert_eq!(reg(&env, "RAX"), 0);
        assert_eq!(flags(&env), [true, true, false, true]);

        let env = run(&[("", "MOV", "RAX", "-1"), ("", "ADD", "RAX", "1")]);
        assert_eq!(flags(&env), [true, true, false, false]);
    }

    #[test]
    fn sub_borrow_and_overflow() {
        let env = run(&[("", "MOV", "RAX", "3"), ("", "SUB", "RAX", "5")]);
        assert_eq!(reg(&env, "RAX"), 3u64.wrapping_sub(5));
        assert_eq!(flags(&env), [false, true, true, false]);

        let env = run(&[("", "MOV", "RAX", "7"), ("", "SUB", "RAX", "7")]);
        assert_eq!(flags(&env), [true, false, false, false]);

        // i64::MIN - 1 overflows to positive
        let env = run(&[("", "MOV", "RAX", "0x8000000000000000"), ("", "SUB", "RAX", "1")]);
        assert_eq!(reg(&env, "RAX"), i64::MAX as u64);
        assert_eq!(flags(&env), [false, false, false, true]);
    }

    #[test]
    fn cmp_only_touches_flags() {
        let cases: &[(&str, u64)] = &[
            ("0", 0),
            ("5", 5),
            ("16", 16),
            ("17", 17),
            ("-1", u64::MAX),
            ("RBX", 16),
            ("RSP", 240),
        ];
        for (src, value) in cases {
            let env = run(&[("", "MOV", "RAX", "16"), ("", "MOV", "RBX", "16"), ("", "CMP", "RAX", src)]);
            assert_eq!(reg(&env, "RAX"), 16, "CMP RAX, {src}");

            let out = sub(16, *value);
            assert_eq!(
                flags(&env),
                [out.result == 0, out.carry, sign(out.result), out.overflow],
                "CMP RAX, {src}"
            );
        }
    }

    #[test]
    fn mul_small_product() {
        let env = run(&[("", "MOV", "RAX", "5"), ("", "MOV", "RBX", "3"), ("", "MUL", "RAX", "RBX")]);
        assert_eq!(reg(&env, "RAX"), 15);
        assert_eq!(reg(&env, "RDX"), 0);
        assert_eq!(flags(&env), [false, false, false, false]);
    }

    #[test]
    fn mul_wide_product() {
        let env = run(&[
            ("", "MOV", "RCX", "0xFFFFFFFFFFFFFFFF"),
            ("", "MOV", "RSI", "2"),
            ("", "MUL", "RCX", "RSI"),
        ]);
        assert_eq!(reg(&env, "RAX"), u64::MAX - 1);
        assert_eq!(reg(&env, "RDX"), 1);
        // Operands untouched
        assert_eq!(reg(&env, "RCX"), u64::MAX);
        assert_eq!(flags(&env), [false, true, true, true]);

        let env = run(&[("", "MOV", "RAX", "0x100000000"), ("", "MUL", "RAX", "RAX")]);
        assert_eq!(reg(&env, "RAX"), 0);
        assert_eq!(reg(&env, "RDX"), 1);
        assert_eq!(flags(&env), [true, true, false, true]);
    }

    #[test]
    fn div_quotient_and_remainder() {
        let env = run(&[("", "MOV", "RAX", "16"), ("", "MOV", "RBX", "3"), ("", "DIV", "RBX", "")]);
        assert_eq!(reg(&env, "RAX"), 5);
        assert_eq!(reg(&env, "RDX"), 1);
        assert_eq!(flags(&env), [false, false, false, false]);

        let env = run(&[("", "MOV", "RAX", "2"), ("", "MOV", "RBX", "3"), ("", "DIV", "RBX", "")]);
        assert_eq!(reg(&env, "RAX"), 0);
        assert_eq!(reg(&env, "RDX"), 2);
        assert_eq!(flags(&env), [true, false, false, false]);
    }

    #[test]
    fn div_by_zero_changes_nothing() {
        let mut env = RunEnvironment::new(program(&[
            ("", "MOV", "RAX", "16"),
            ("", "MOV", "RDX", "7"),
            ("", "CMP", "RAX", "20"),
            ("", "DIV", "RBX", ""),
        ]));
        for _ in 0..3 {
            env.step().unwrap();
        }
        let before = env.state().clone();
        let cycles = env.cycles();

        assert_eq!(env.step(), Err(CpuError::DivisionByZero));
        assert_eq!(env.state(), &before);
        assert_eq!(env.pc(), 3);
        assert_eq!(env.cycles(), cycles);
        // Still failing on retry
        assert_eq!(env.run(), Err(CpuError::DivisionByZero));
    }

    #[test]
    fn inc_dec_round_trip() {
        let values = [1, 2, 100, 240, 1 << 40, (1 << 63) + 5, u64::MAX - 1];
        for v in values {
            let mut env = RunEnvironment::new(program(&[("", "INC", "RDI", ""), ("", "DEC", "RDI", "")]));
            env.state.set_reg(Register::Rdi, v);
            env.run().unwrap();
            assert_eq!(reg(&env, "RDI"), v);
            assert_eq!(env.get_flag("ZF"), Ok(v == 0));
            assert_eq!(env.get_flag("SF"), Ok(sign(v)));
        }
    }

    #[test]
    fn inc_dec_boundaries() {
        let env = run(&[("", "MOV", "RAX", "-1"), ("", "INC", "RAX", "")]);
        assert_eq!(reg(&env, "RAX"), 0);
        assert_eq!(flags(&env), [true, true, false, false]);

        let env = run(&[("", "MOV", "RAX", "0x7FFFFFFFFFFFFFFF"), ("", "INC", "RAX", "")]);
        assert_eq!(flags(&env), [false, false, true, true]);

        let env = run(&[("", "DEC", "RAX", "")]);
        assert_eq!(reg(&env, "RAX"), u64::MAX);
        assert_eq!(flags(&env), [false, true, true, false]);

        let env = run(&[("", "MOV", "RAX", "0x8000000000000000"), ("", "DEC", "RAX", "")]);
        assert_eq!(flags(&env), [false, false, false, true]);
    }

    #[test]
    fn logic_ops_clear_carry_and_overflow() {
        // Carry left set by the ADD must be cleared
        let env = run(&[
            ("", "MOV", "RAX", "0xF0"),
            ("", "MOV", "RBX", "0x0F"),
            ("", "MOV", "RCX", "-1"),
            ("", "ADD", "RCX", "1"),
            ("", "AND", "RAX", "RBX"),
        ]);
        assert_eq!(reg(&env, "RAX"), 0);
        assert_eq!(flags(&env), [true, false, false, false]);

        let env = run(&[("", "MOV", "RAX", "0xF0"), ("", "MOV", "RBX", "0x0F"), ("", "OR", "RAX", "RBX")]);
        assert_eq!(reg(&env, "RAX"), 0xFF);
        assert_eq!(flags(&env), [false, false, false, false]);

        let env = run(&[("", "MOV", "RAX", "-1"), ("", "MOV", "RBX", "1"), ("", "XOR", "RAX", "RBX")]);
        assert_eq!(reg(&env, "RAX"), u64::MAX - 1);
        assert_eq!(flags(&env), [false, false, true, false]);
    }

    #[test]
    fn je_follows_zero_flag() {
        let mut lines = vec![("start", "CMP", "RAX", "0")];
        for _ in 1..11 {
            lines.push(("", "INC", "RBX", ""));
        }
        lines.push(("equal", "MOV", "RCX", "1"));
        lines[1] = ("", "JE", "equal", "");
        let prog = program(&lines);
        assert_eq!(prog.resolve("start"), Ok(0));
        assert_eq!(prog.resolve("equal"), Ok(11));

        // ZF set, jump taken
        let mut env = RunEnvironment::new(prog.clone());
        env.step().unwrap();
        assert_eq!(env.step(), Ok(Step::Executed { pc: 1, next: 11 }));

        // ZF clear, fall through
        let mut env = RunEnvironment::new(prog);
        env.state.set_reg(Register::Rax, 4);
        env.step().unwrap();
        assert_eq!(env.step(), Ok(Step::Executed { pc: 1, next: 2 }));
    }

    #[test]
    fn jne_mirrors_je() {
        let prog = program(&[
            ("", "CMP", "RAX", "1"),
            ("", "JNE", "skip", ""),
            ("", "MOV", "RBX", "1"),
            ("skip", "MOV", "RCX", "1"),
        ]);
        let mut env = RunEnvironment::new(prog.clone());
        env.run().unwrap();
        assert_eq!(reg(&env, "RBX"), 0);

        let mut env = RunEnvironment::new(prog);
        env.state.set_reg(Register::Rax, 1);
        env.run().unwrap();
        assert_eq!(reg(&env, "RBX"), 1);
    }

    #[test]
    fn jmp_loops_until_counter_done() {
        let env = run(&[
            ("", "MOV", "RCX", "10"),
            ("loop", "ADD", "RAX", "3"),
            ("", "DEC", "RCX", ""),
            ("", "JNE", "loop", ""),
            ("", "JMP", "end", ""),
            ("", "MOV", "RAX", "0"),
            ("end", "MOV", "RDX", "RAX"),
        ]);
        assert_eq!(reg(&env, "RAX"), 30);
        assert_eq!(reg(&env, "RDX"), 30);
        assert_eq!(reg(&env, "RCX"), 0);
    }

    #[test]
    fn unknown_label_fails_without_moving() {
        let mut env = RunEnvironment::new(program(&[("", "JMP", "nowhere", "")]));
        assert_eq!(
            env.step(),
            Err(CpuError::UnknownLabel {
                label: "nowhere".into()
            })
        );
        assert_eq!(env.pc(), 0);

        // Checked even when the jump would not be taken
        let mut env = RunEnvironment::new(program(&[("", "CMP", "RAX", "1"), ("", "JE", "nowhere", "")]));
        env.step().unwrap();
        assert!(env.step().is_err());
    }

    #[test]
    fn bad_operand_skipped_over_never_fails() {
        let env = run(&[
            ("", "JMP", "end", ""),
            ("", "AND", "RAX", "5"),
            ("end", "MOV", "RCX", "1"),
        ]);
        assert!(env.is_halted());
        assert_eq!(reg(&env, "RCX"), 1);
        assert_eq!(env.cycles(), 2);
    }

    #[test]
    fn bad_operand_fails_when_reached() {
        let mut env = RunEnvironment::new(program(&[
            ("", "MOV", "RAX", "7"),
            ("", "AND", "RAX", "5"),
            ("", "MOV", "RCX", "1"),
        ]));
        env.step().unwrap();
        let before = env.state().clone();
        assert_eq!(
            env.step(),
            Err(CpuError::InvalidOperand {
                mnemonic: "AND",
                operand: "5".into()
            })
        );
        assert_eq!(env.pc(), 1);
        assert_eq!(env.cycles(), 1);
        assert_eq!(env.state(), &before);

        // Strict mode does not change how decode failures surface
        let mut env = RunEnvironment::new(program(&[("", "ADD", "RAX", "0xZZ")]));
        env.set_strict(true);
        assert_eq!(
            env.run(),
            Err(CpuError::MalformedLiteral {
                literal: "0xZZ".into()
            })
        );
        assert_eq!(env.pc(), 0);
    }

    #[test]
    fn lowercase_mnemonics_execute() {
        let env = run(&[("", "mov", "RAX", "1"), ("", "inc", "RAX", "")]);
        assert_eq!(reg(&env, "RAX"), 2);
        assert_eq!(env.cycles(), 2);
    }

    #[test]
    fn unknown_opcode_policy() {
        let prog = program(&[("", "NOP", "", ""), ("", "INC", "RAX", "")]);

        let mut env = RunEnvironment::new(prog.clone());
        assert_eq!(env.step(), Ok(Step::Skipped { pc: 0 }));
        assert_eq!(env.run(), Ok(1));
        assert_eq!(reg(&env, "RAX"), 1);

        let mut env = RunEnvironment::new(prog);
        env.set_strict(true);
        assert_eq!(
            env.step(),
            Err(CpuError::UnknownOpcode {
                mnemonic: "NOP".into()
            })
        );
        assert_eq!(env.pc(), 0);
    }

    #[test]
    fn demo_program_skips_to_equal() {
        let mut env = RunEnvironment::new(program(DEMO));
        let mut visited = Vec::new();
        while let Step::Executed { pc, .. } = env.step().unwrap() {
            visited.push(pc);
        }
        assert_eq!(visited, vec![0, 1, 2, 3, 4, 5, 11]);
        assert_eq!(reg(&env, "RAX"), 16);
        assert_eq!(reg(&env, "RBX"), 3);
        assert_eq!(reg(&env, "RCX"), 999);
        assert_eq!(reg(&env, "RDX"), 0);
        assert_eq!(env.get_flag("ZF"), Ok(true));
        assert_eq!(env.cycles(), 7);
        assert!(env.is_halted());
    }

    #[test]
    fn halted_step_is_noop() {
        let mut env = RunEnvironment::new(program(&[("", "INC", "RAX", "")]));
        assert_eq!(env.run(), Ok(1));
        let before = env.state().clone();
        assert_eq!(env.step(), Ok(Step::Halted));
        assert_eq!(env.state(), &before);
        assert_eq!(env.pc(), 1);

        let mut empty = RunEnvironment::default();
        assert!(empty.is_halted());
        assert_eq!(empty.run(), Ok(0));
    }

    #[test]
    fn load_rewinds_and_reset_clears() {
        let mut env = run(&[("", "MOV", "RAX", "7")]);
        env.set_memory(3, 9).unwrap();

        env.load(program(&[("", "INC", "RAX", "")]));
        assert_eq!(env.pc(), 0);
        assert_eq!(env.cycles(), 0);
        env.run().unwrap();
        // State carries over a load
        assert_eq!(reg(&env, "RAX"), 8);

        env.reset();
        assert_eq!(env.pc(), 0);
        assert_eq!(env.state(), &State::new());
        assert_eq!(env.get_memory(3), Ok(0));
        assert_eq!(env.program().len(), 1);
    }

    #[test]
    fn introspection_errors() {
        let env = RunEnvironment::default();
        assert_eq!(env.get_memory(256), Err(CpuError::OutOfRange { addr: 256 }));
        assert_eq!(
            env.get_register("rax"),
            Err(CpuError::UnknownKey { key: "rax".into() })
        );
        assert_eq!(env.get_register("RSP"), Ok(240));
    }

    #[test]
    fn environments_are_independent() {
        fn assert_send<T: Send>() {}
        assert_send::<RunEnvironment>();

        let prog = program(&[("", "INC", "RAX", "")]);
        let mut first = RunEnvironment::new(prog.clone());
        let second = RunEnvironment::new(prog);
        first.run().unwrap();
        assert_eq!(reg(&first, "RAX"), 1);
        assert_eq!(reg(&second, "RAX"), 0);
    }
}
