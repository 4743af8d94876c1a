//! REPL (Read-Eval-Print Loop) for FineLang

use crate::config::RuntimeConfig;
use crate::error::report_error;
use crate::interp::{Interpreter, Value};
use crate::parser::parse_source;
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, Result as RlResult};

const PROMPT: &str = ">>> ";
const BANNER: &str = "FineLang v1.0 - Interactive Mode";
const SOURCE_NAME: &str = "<repl>";

/// REPL state: one interpreter shared by every line
pub struct Repl {
    editor: DefaultEditor,
    interpreter: Interpreter,
}

impl Repl {
    /// Create a new REPL
    pub fn new(config: &RuntimeConfig) -> RlResult<Self> {
        let editor = DefaultEditor::new()?;
        let mut interpreter = Interpreter::with_config(config);
        interpreter.set_current_file(SOURCE_NAME);
        Ok(Repl { editor, interpreter })
    }

    /// Run the REPL
    pub fn run(&mut self) -> RlResult<()> {
        println!("{BANNER}");
        println!("Type 'exit' to quit\n");

        loop {
            match self.editor.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim();

                    if line.is_empty() {
                        continue;
                    }

                    // History lives only for this session
                    let _ = self.editor.add_history_entry(line);

                    if line == "exit" || line.starts_with(':') {
                        if self.handle_command(line) {
                            break;
                        }
                        continue;
                    }

                    if let Some(echo) = self.eval_input(line) {
                        println!("{echo}");
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("Error: {err}");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handle REPL commands; returns true to quit
    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd {
            "exit" | ":quit" | ":q" => true,
            ":help" | ":h" => {
                print_help();
                false
            }
            ":clear" => {
                print!("\x1B[2J\x1B[1;1H");
                false
            }
            _ => {
                println!("Unknown command: {cmd}");
                println!("Type :help for help.");
                false
            }
        }
    }

    /// Parse and run one line in the persistent interpreter.
    ///
    /// Returns the text to echo: a non-null result, or an uncaught exception.
    /// Parse errors are reported on stderr and yield nothing.
    fn eval_input(&mut self, input: &str) -> Option<String> {
        let program = match parse_source(input) {
            Ok(program) => program,
            Err(err) => {
                report_error(SOURCE_NAME, input, &err);
                return None;
            }
        };

        match self.interpreter.run(&program) {
            Ok(Value::Null) => None,
            Ok(value) => Some(value.to_string()),
            Err(exception) => Some(exception.to_string()),
        }
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }
}

fn print_help() {
    println!("FineLang REPL Commands:");
    println!("  :help, :h       Show this help");
    println!("  exit, :quit, :q Exit the REPL");
    println!("  :clear          Clear the screen");
    println!();
    println!("Each line is a program; bindings persist between lines:");
    println!("  let xs = range(0, 5)");
    println!("  fn double(x) {{ return x * 2 }}");
    println!("  map(double, xs)");
}
