//! FineLang Library
//!
//! A small scripting language with two engines: a tree-walking interpreter
//! for the full language and a bytecode compiler plus stack VM for its
//! imperative subset.

pub mod ast;
pub mod bytecode;
pub mod compiler;
pub mod config;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod vm;

pub use ast::Span;
pub use config::RuntimeConfig;
pub use error::{CompileError, Result};

/// Remaining stack below which the recursive passes (parser, compiler,
/// evaluator) switch to a fresh segment
pub(crate) const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each fresh stack segment
pub(crate) const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Call this once at startup. Safe to call multiple times.
/// Enable with `RUST_LOG=fine=debug` or `RUST_LOG=fine=trace`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
    });
}
