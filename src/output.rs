use std::cell::RefCell;
use std::str::Chars;

use colored::{ColoredString, Colorize};

use crate::{
    air::Program,
    runtime::{RunEnvironment, Step},
    state::State,
    symbol::{Flag, Register},
};

/// Bytes shown per memory row, and in the stack window.
const ROW_WIDTH: usize = 16;

#[derive(Clone, Copy, Debug)]
pub enum Output {
    /// Program results, on stdout
    Normal,
    /// Trace and pause information, on stderr
    Diagnostic,
}

struct Decolored<'a> {
    chars: Chars<'a>,
}

impl Output {
    thread_local! {
        static IS_MINIMAL: RefCell<bool> = const { RefCell::new(false) };
    }

    pub fn set_minimal(new_value: bool) -> bool {
        Self::IS_MINIMAL.with(|value| value.replace(new_value))
    }
    pub fn is_minimal() -> bool {
        Self::IS_MINIMAL.with(|value| *value.borrow())
    }

    pub fn print_str(&self, string: &str) {
        match (self, Self::is_minimal()) {
            (Self::Normal, false) => print!("{}", string),
            (Self::Normal, true) => print_colorless(string),
            (Self::Diagnostic, false) => eprint!("{}", ColoredString::from(string).blue()),
            // Always remove color if `--minimal`
            (Self::Diagnostic, true) => eprint_colorless(string),
        }
    }

    /// Registers, flags, the first memory row and the bytes at the stack pointer.
    pub fn print_state(&self, env: &RunEnvironment) {
        self.print_registers(env);
        self.print_flags(env.state());
        let state = env.state();
        self.print_str(&format!(
            "MEM 0: {}\n",
            hex_bytes(state.mem_window(0, ROW_WIDTH))
        ));
        self.print_stack(state);
    }

    pub fn print_registers(&self, env: &RunEnvironment) {
        let state = env.state();
        if Self::is_minimal() {
            for reg in Register::ALL {
                self.print_str(&format!("{} {}\n", reg, state.reg(reg)));
            }
            self.print_str(&format!("PC {}\n", env.pc()));
            self.print_str(&format!("CYCLES {}\n", env.cycles()));
            return;
        }

        self.print_str("\x1b[2m┌─────────────────────────────────────────────────────────────────┐\x1b[0m\n");
        self.print_str(
            "\x1b[2m│              \x1b[3mhex                  uint                   int\x1b[0m\x1b[2m │\x1b[0m\n",
        );
        for reg in Register::ALL {
            self.print_str("\x1b[2m│\x1b[0m");
            self.print_str(&format!(" \x1b[1m{}\x1b[0m  ", reg));
            self.print_integer(state.reg(reg));
            self.print_str(" \x1b[2m│\x1b[0m\n");
        }
        self.print_str("\x1b[2m│\x1b[0m");
        self.print_str(&format!(" \x1b[1mPC\x1b[0m   {:<18}", env.pc()));
        self.print_str(&format!(" \x1b[1mCYCLES\x1b[0m {:<33}", env.cycles()));
        self.print_str(" \x1b[2m│\x1b[0m\n");
        self.print_str("\x1b[2m└─────────────────────────────────────────────────────────────────┘\x1b[0m\n");
    }

    pub fn print_integer(&self, value: u64) {
        if Self::is_minimal() {
            self.print_str(&format!("{}", value));
            return;
        }
        self.print_str(&format!("0x{:016x}  ", value));
        self.print_str(&format!("{:>20}  ", value));
        self.print_str(&format!("{:>20}", value as i64));
    }

    pub fn print_flags(&self, state: &State) {
        let line = Flag::ALL
            .iter()
            .map(|flag| format!("{} {}", flag, state.flag(*flag) as u8))
            .collect::<Vec<_>>();
        if Self::is_minimal() {
            self.print_str(&format!("{}\n", line.join("\n")));
        } else {
            self.print_str(&format!(" \x1b[1mflags\x1b[0m  {}\n", line.join("  ")));
        }
    }

    /// Window of memory starting at the stack pointer, clipped to memory.
    pub fn print_stack(&self, state: &State) {
        let sp = state.reg(Register::Rsp);
        let Ok(start) = usize::try_from(sp) else {
            self.print_str(&format!("STACK {} out of memory\n", sp));
            return;
        };
        let window = state.mem_window(start, ROW_WIDTH);
        if window.is_empty() {
            self.print_str(&format!("STACK {} out of memory\n", sp));
            return;
        }
        self.print_str(&format!("STACK {}: {}\n", start, hex_bytes(window)));
    }

    /// Full memory as rows of 16 bytes.
    pub fn print_memory(&self, state: &State) {
        for (row, bytes) in state.memory().chunks(ROW_WIDTH).enumerate() {
            let addr = row * ROW_WIDTH;
            if Self::is_minimal() {
                self.print_str(&format!("0x{:02x}: {}\n", addr, hex_bytes(bytes)));
                continue;
            }
            // Dim empty rows so data stands out
            if bytes.iter().all(|byte| *byte == 0) {
                self.print_str(&format!(
                    "\x1b[2m0x{:02x}  {}\x1b[0m\n",
                    addr,
                    hex_bytes(bytes)
                ));
            } else {
                self.print_str(&format!("\x1b[1m0x{:02x}\x1b[0m  {}\n", addr, hex_bytes(bytes)));
            }
        }
    }

    /// Numbered program listing. Instructions that will not execute are dimmed.
    pub fn print_listing(&self, program: &Program) {
        for (idx, instr) in program.iter().enumerate() {
            let label = instr
                .label
                .as_ref()
                .map(|label| format!("{}:", label))
                .unwrap_or_default();
            if Self::is_minimal() {
                self.print_str(&format!("{} {} {}\n", idx, label, instr.op));
            } else if instr.op.mnemonic().is_none() || instr.op.error().is_some() {
                self.print_str(&format!(
                    "\x1b[2m{:>4}\x1b[0m  {:<12} \x1b[2m{}\x1b[0m\n",
                    idx, label, instr.op
                ));
            } else {
                self.print_str(&format!(
                    "\x1b[2m{:>4}\x1b[0m  {:<12} {}\n",
                    idx, label, instr.op
                ));
            }
        }
    }

    /// One line per executed step.
    pub fn print_trace(&self, env: &RunEnvironment, step: Step) {
        let (pc, suffix) = match step {
            Step::Executed { pc, .. } => (pc, ""),
            Step::Skipped { pc } => (pc, " (skipped)"),
            Step::Halted => return,
        };
        let Some(instr) = env.program().get(pc) else {
            return;
        };
        let state = env.state();
        let flags = Flag::ALL
            .iter()
            .map(|flag| format!("{}={}", flag, state.flag(*flag) as u8))
            .collect::<Vec<_>>()
            .join(" ");
        self.print_str(&format!(
            "{:>8} {:>4}  {:<24} {}{}\n",
            env.cycles(),
            pc,
            instr.op.to_string(),
            flags,
            suffix
        ));
    }
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect::<Vec<_>>()
        .join(" ")
}

impl<'a> Decolored<'a> {
    pub fn new(string: &'a str) -> Self {
        Self {
            chars: string.chars(),
        }
    }
}

impl Iterator for Decolored<'_> {
    type Item = char;
    fn next(&mut self) -> Option<Self::Item> {
        while let Some(ch) = self.chars.next() {
            // Skip everything between '\x1b' and 'm' (inclusive)
            if ch == '\x1b' {
                while self.chars.next().is_some_and(|ch| ch != 'm') {}
                continue;
            }
            return Some(ch);
        }
        None
    }
}

fn print_colorless(string: &str) {
    print!("{}", Decolored::new(string).collect::<String>());
}

fn eprint_colorless(string: &str) {
    eprint!("{}", Decolored::new(string).collect::<String>());
}
