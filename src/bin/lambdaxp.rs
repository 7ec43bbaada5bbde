//! LambdaXP CLI
//!
//! - `lambdaxp <EXPR|FILE>` - evaluate a program given inline or read from a file
//! - `lambdaxp` - interactive REPL
//!
//! Set `RUST_LOG=lambdaxp=trace` to watch every reduction step on stderr.

use clap::Parser;
use lambdaxp::parser::parse;
use lambdaxp::{EvalResult, Error, Evaluator, MAX_STEPS};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::fs;
use std::panic;
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lambdaxp")]
#[command(about = "Normal-order interpreter for an extended lambda calculus")]
#[command(version)]
struct Cli {
    /// Program text, or a file containing it. Starts the REPL when omitted
    program: Option<String>,
    /// Reduction steps allowed before giving up with <non-terminating>
    #[arg(long, default_value_t = MAX_STEPS)]
    max_steps: usize,
}

/// Outcome of running one program, as the driver reports it
enum Outcome {
    Finished(EvalResult),
    NonTerminating,
}

fn run(source: &str, max_steps: usize) -> Result<Outcome, Error> {
    let term = parse(source)?;
    match Evaluator::with_max_steps(max_steps).evaluate_counted(term) {
        Ok(result) => Ok(Outcome::Finished(result)),
        Err(Error::NonTermination { .. }) => Ok(Outcome::NonTerminating),
        Err(e) => Err(e),
    }
}

fn run_program(argument: &str, max_steps: usize) -> ExitCode {
    // An existing path wins over treating the argument as program text
    let source = if Path::new(argument).is_file() {
        match fs::read_to_string(argument) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("Error: cannot read {argument}: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        argument.to_owned()
    };

    match run(&source, max_steps) {
        Ok(Outcome::Finished(result)) => {
            println!("{}", result.term);
            ExitCode::SUCCESS
        }
        Ok(Outcome::NonTerminating) => {
            println!("<non-terminating>");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    // Logs go to stderr so stdout carries only results
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(program) = cli.program {
        return run_program(&program, cli.max_steps);
    }

    let max_steps = cli.max_steps;
    let result = panic::catch_unwind(|| {
        run_repl(max_steps);
    });

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run_repl(max_steps: usize) {
    println!("LambdaXP - normal-order lambda calculus with numbers and lists");
    println!("Enter expressions like: (\\x.x + 1) 5");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            return;
        }
    };

    let mut show_steps = false;

    loop {
        match rl.readline("lambdaxp> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help(max_steps);
                        continue;
                    }
                    ":steps" => {
                        show_steps = !show_steps;
                        let state = if show_steps { "on" } else { "off" };
                        println!("Step reporting {state}");
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                // Each line gets its own evaluator, so fresh names restart at Var1
                match run(line, max_steps) {
                    Ok(Outcome::Finished(EvalResult { term, steps })) => {
                        println!("{term}");
                        if show_steps {
                            println!("  ({steps} steps)");
                        }
                    }
                    Ok(Outcome::NonTerminating) => println!("<non-terminating>"),
                    Err(e) => println!("Error: {e}"),
                }
            }

            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

fn print_help(max_steps: usize) {
    println!("LambdaXP commands:");
    println!("  :help      - Show this help message");
    println!("  :steps     - Toggle reporting of reduction step counts");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+C     - Exit the interpreter");
    println!();
    println!("Syntax (loosest binding first):");
    println!("  e1 ;; e2                      evaluate both, print both");
    println!("  \\x.e   λx.e                   lambda");
    println!("  let x = e1 in e2              letrec x = e1 in e2");
    println!("  if c then e1 else e2          c must reduce to 1 or 0");
    println!("  e1 == e2   e1 <= e2           yield 1.0 or 0.0");
    println!("  e1 + e2   e1 - e2   e1 * e2   -e");
    println!("  hd e   tl e   fix e");
    println!("  f x y                         application");
    println!("  h : t   #                     cons cell, empty list");
    println!();
    println!("Examples:");
    println!("  letrec f = \\n. if n==0 then 1 else n*f(n-1) in f 4");
    println!("  hd (1:2:#)");
    println!();
    println!("Evaluation gives up after {max_steps} steps with <non-terminating>.");
}
