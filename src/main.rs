use std::fs;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use hotwatch::notify::Event;
use hotwatch::{
    blocking::{Flow, Hotwatch},
    EventKind,
};
use miette::{bail, IntoDiagnostic, Result};

use tinycpu::{error, AsmParser, Breakpoint, Breakpoints, Output, Program, RunEnvironment};

/// tinycpu assembles and runs programs for a small 64-bit register machine.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.asm` file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a `.asm` file and print the final machine state
    Run {
        /// `.asm` file to run
        name: PathBuf,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
        /// Print every executed instruction to stderr
        #[arg(short, long)]
        trace: bool,
        /// Pause and print state before the instruction at a label or index
        #[arg(short, long = "break", value_name = "LABEL|INDEX")]
        breakpoints: Vec<String>,
        /// Give up after this many executed instructions
        #[arg(long, default_value_t = tinycpu::DEFAULT_MAX_STEPS)]
        max_steps: u64,
        /// Treat unknown instructions as errors instead of skipping them
        #[arg(short, long)]
        strict: bool,
        /// Print all of memory after the run
        #[arg(long)]
        memory: bool,
    },
    /// Check a `.asm` file without running it
    Check {
        /// File to check
        name: PathBuf,
    },
    /// Print the assembled program with its labels
    List {
        /// `.asm` file to list
        name: PathBuf,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Place a watch on a `.asm` file to receive constant assembler updates
    Watch {
        /// `.asm` file to watch
        name: PathBuf,
    },
}

struct RunOptions {
    minimal: bool,
    trace: bool,
    breakpoints: Vec<String>,
    max_steps: u64,
    strict: bool,
    memory: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            minimal: false,
            trace: false,
            breakpoints: Vec::new(),
            max_steps: tinycpu::DEFAULT_MAX_STEPS,
            strict: false,
            memory: false,
        }
    }
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    tinycpu::env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(tinycpu::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    if let Some(command) = args.command {
        match command {
            Command::Run {
                name,
                minimal,
                trace,
                breakpoints,
                max_steps,
                strict,
                memory,
            } => run(
                &name,
                RunOptions {
                    minimal,
                    trace,
                    breakpoints,
                    max_steps,
                    strict,
                    memory,
                },
            ),
            Command::Check { name } => {
                file_message(Green, "Checking", &name);
                let contents = fs::read_to_string(&name).into_diagnostic()?;
                let program = assemble(&contents)?;
                let warnings = warn_suspicious(&program);
                if warnings == 0 {
                    message(Green, "Success", "no errors found!");
                } else {
                    message(Green, "Success", &format!("no errors, {warnings} warning(s)"));
                }
                Ok(())
            }
            Command::List { name, minimal } => {
                Output::set_minimal(minimal);
                let contents = fs::read_to_string(&name).into_diagnostic()?;
                let program = assemble(&contents)?;
                Output::Normal.print_listing(&program);
                for (label, idx) in program.labels() {
                    Output::Normal.print_str(&format!("{label} -> {idx}\n"));
                }
                Ok(())
            }
            Command::Watch { name } => watch(name),
        }
    } else if let Some(path) = args.path {
        run(&path, RunOptions::default())
    } else {
        println!("\n~ tinycpu v{VERSION} ~");
        println!("{SHORT_INFO}");
        std::process::exit(0);
    }
}

enum MsgColor {
    Green,
    Cyan,
    Red,
    Yellow,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message(color: MsgColor, left: &str, right: &str) {
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
        MsgColor::Yellow => left.yellow(),
    };
    println!("{left:>12} {right}");
}

fn run(name: &Path, opts: RunOptions) -> Result<()> {
    use MsgColor::*;
    Output::set_minimal(opts.minimal);
    if opts.minimal {
        colored::control::set_override(false);
    }

    file_message(Green, "Assembling", name);
    let contents = fs::read_to_string(name).into_diagnostic()?;
    let program = assemble(&contents)?;

    let breakpoints = opts
        .breakpoints
        .iter()
        .map(|spec| Breakpoint::resolve(spec, &program))
        .collect::<Result<Vec<_>>>()?;
    let breakpoints = Breakpoints::from(breakpoints);

    let mut env = RunEnvironment::new(program);
    env.set_strict(opts.strict || tinycpu::env::is_strict());
    let trace = opts.trace || tinycpu::env::is_trace();

    message(
        Green,
        "Running",
        &format!("{} instructions", env.program().len()),
    );
    while !env.is_halted() {
        if env.cycles() >= opts.max_steps {
            message(Red, "Halted", &format!("at instruction {}", env.pc()));
            Output::Normal.print_state(&env);
            return Err(error::step_limit(opts.max_steps));
        }
        if let Some(breakpoint) = breakpoints.get(env.pc()) {
            let at = match &breakpoint.label {
                Some(label) => format!("{label} (instruction {})", breakpoint.index),
                None => format!("instruction {}", breakpoint.index),
            };
            message(Cyan, "Breakpoint", &at);
            Output::Normal.print_state(&env);
        }

        let pc = env.pc();
        match env.step() {
            Ok(step) => {
                if trace {
                    Output::Diagnostic.print_trace(&env, step);
                }
            }
            Err(err) => {
                let instr = env
                    .program()
                    .get(pc)
                    .map(|instr| instr.to_string())
                    .unwrap_or_default();
                message(Red, "Halted", &format!("at instruction {pc}"));
                Output::Normal.print_state(&env);
                return Err(error::runtime_error(&err, pc, &instr));
            }
        }
    }

    file_message(Green, "Completed", name);
    message(Green, "Cycles", &env.cycles().to_string());
    Output::Normal.print_state(&env);
    if opts.memory {
        Output::Normal.print_memory(env.state());
    }
    Ok(())
}

/// Warn about things that assemble but are likely mistakes. Returns the amount of warnings.
fn warn_suspicious(program: &Program) -> usize {
    let mut warnings = 0;
    for (idx, instr) in program.iter().enumerate() {
        if let Some(err) = instr.op.error() {
            message(
                MsgColor::Yellow,
                "Warning",
                &format!("instruction {idx} `{}` fails when reached: {err}", instr.op),
            );
            warnings += 1;
        }
        if instr.op.mnemonic().is_none() {
            message(
                MsgColor::Yellow,
                "Warning",
                &format!("unknown instruction `{}` at {idx} will be skipped", instr.op),
            );
            warnings += 1;
        }
    }
    for (idx, label) in program.unresolved_jumps() {
        message(
            MsgColor::Yellow,
            "Warning",
            &format!("jump at {idx} targets undefined label `{label}`"),
        );
        warnings += 1;
    }
    warnings
}

fn watch(name: PathBuf) -> Result<()> {
    use MsgColor::*;
    if !name.exists() {
        bail!("File does not exist. Exiting...")
    }
    // Vim breaks if watching a single file
    let folder_path = match name.parent() {
        Some(pth) if pth.is_dir() => pth.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };

    // Clear screen and move cursor to top left
    print!("\x1B[2J\x1B[2;1H");
    file_message(Green, "Watching", &name);
    message(Cyan, "Help", "press CTRL+C to exit");

    let mut watcher =
        Hotwatch::new_with_custom_delay(Duration::from_millis(500)).into_diagnostic()?;

    watcher
        .watch(folder_path, move |event: Event| match event.kind {
            // Watch remove for vim changes
            EventKind::Modify(_) | EventKind::Remove(_) => {
                print!("\x1B[2J\x1B[2;1H");
                file_message(Green, "Watching", &name);
                message(Green, "Re-checking", "file change detected");
                message(Cyan, "Help", "press CTRL+C to exit");

                sleep(Duration::from_millis(50));

                let contents = match fs::read_to_string(&name) {
                    Ok(cts) => cts,
                    Err(e) => {
                        eprintln!("{e}. Exiting...");
                        std::process::exit(1)
                    }
                };
                match assemble(&contents) {
                    Ok(program) => {
                        warn_suspicious(&program);
                        message(Green, "Success", "no errors found!");
                    }
                    Err(e) => {
                        message(Red, "Error", "check failed");
                        println!("\n{:?}", e);
                    }
                }
                Flow::Continue
            }
            _ => Flow::Continue,
        })
        .into_diagnostic()?;
    watcher.run();
    Ok(())
}

/// Return the assembled program for a source file
fn assemble(contents: &str) -> Result<Program> {
    AsmParser::new(contents).parse()
}

const SHORT_INFO: &str = r"
Welcome to tinycpu, an assembler and interpreter for a small
64-bit register machine with nine registers and four flags.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
