//! FineLang CLI

use clap::Parser;
use fine::ast::Program;
use fine::config::RuntimeConfig;
use fine::error::report_error;
use fine::interp::Interpreter;
use fine::repl::Repl;
use fine::vm::Vm;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Parser)]
#[command(name = "fine", version, about = "FineLang - run .fine programs or start a REPL")]
struct Cli {
    /// Program to run; starts the REPL when omitted
    file: Option<PathBuf>,

    /// Compile to bytecode and run on the VM
    #[arg(long, requires = "file")]
    vm: bool,

    /// Print the bytecode listing and exit
    #[arg(long, requires = "file", conflicts_with = "vm")]
    disassemble: bool,

    /// Parse and dump the AST as JSON (debug)
    #[arg(long, requires = "file", conflicts_with_all = ["vm", "disassemble"])]
    ast: bool,

    /// Tokenize and dump tokens (debug)
    #[arg(long, requires = "file", conflicts_with_all = ["vm", "disassemble", "ast"])]
    tokens: bool,

    /// Evaluator call-depth limit
    #[arg(long, value_name = "N")]
    max_depth: Option<usize>,

    /// VM executed-instruction limit
    #[arg(long, value_name = "N")]
    max_instructions: Option<usize>,

    /// Configuration file (default: ./fine.toml if present)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("Could not open file '{}'", path.display())]
    Open {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// Already rendered with ariadne
    #[error("could not compile '{0}'")]
    Compile(String),
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() {
    fine::init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> CliResult {
    let mut config = RuntimeConfig::discover(cli.config.as_deref(), &std::env::current_dir()?)?;
    if let Some(depth) = cli.max_depth {
        config = config.with_max_stack_depth(depth);
    }
    if let Some(limit) = cli.max_instructions {
        config = config.with_vm_max_instructions(limit);
    }

    let Some(file) = cli.file else {
        return Repl::new(&config)?.run().map_err(Into::into);
    };
    config = config.with_source_name(file.display().to_string());

    if cli.tokens {
        tokenize_file(&file)
    } else if cli.ast {
        parse_file(&file)
    } else if cli.disassemble {
        disassemble_file(&file)
    } else if cli.vm {
        run_vm(&file, &config)
    } else {
        run_file(&file, &config)
    }
}

fn read_source(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|error| CliError::Open {
        path: path.to_path_buf(),
        error,
    })
}

/// Parse a file, rendering any syntax error with ariadne
fn load_program(path: &Path) -> Result<(String, Program), CliError> {
    let source = read_source(path)?;
    let filename = path.display().to_string();
    match fine::parser::parse_source(&source) {
        Ok(program) => Ok((source, program)),
        Err(err) => {
            report_error(&filename, &source, &err);
            Err(CliError::Compile(filename))
        }
    }
}

fn compile_program(path: &Path) -> Result<fine::bytecode::Chunk, CliError> {
    let (source, program) = load_program(path)?;
    fine::compiler::compile(&program).map_err(|err| {
        let filename = path.display().to_string();
        report_error(&filename, &source, &err);
        CliError::Compile(filename)
    })
}

fn run_file(path: &Path, config: &RuntimeConfig) -> CliResult {
    let (_, program) = load_program(path)?;

    let mut interpreter = Interpreter::with_config(config);
    interpreter.set_current_file(path.display().to_string());

    // An uncaught exception ends the program normally
    if let Err(exception) = interpreter.run(&program) {
        println!("{exception}");
    }
    Ok(())
}

fn run_vm(path: &Path, config: &RuntimeConfig) -> CliResult {
    let chunk = compile_program(path)?;
    Vm::with_config(config).run(&chunk)?;
    Ok(())
}

fn disassemble_file(path: &Path) -> CliResult {
    let chunk = compile_program(path)?;
    print!("{}", chunk.disassemble(&path.display().to_string()));
    Ok(())
}

fn parse_file(path: &Path) -> CliResult {
    let (_, program) = load_program(path)?;
    println!("{}", serde_json::to_string_pretty(&program)?);
    Ok(())
}

fn tokenize_file(path: &Path) -> CliResult {
    let source = read_source(path)?;

    let tokens = fine::lexer::tokenize(&source)?;
    for (tok, span) in &tokens {
        println!("{:?} @ {}..{}", tok, span.start, span.end);
    }

    Ok(())
}
