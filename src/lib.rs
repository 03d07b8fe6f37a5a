//! Objo: a small, dynamically-typed, class-based scripting language
//! (`spec.md` §1 "Purpose & scope").
//!
//! The pipeline is lexer → parser → compiler → VM, each in its own module;
//! [`Interpreter`] wires a fresh VM to the core library and exposes the
//! whole pipeline as a single `run` call.

mod ast;
mod chunk;
mod compiler;
mod corelib;
mod error;
mod foreign;
mod function;
mod host;
mod instance;
mod klass;
mod lexer;
mod parser;
mod signature;
mod token;
mod value;
mod vm;

pub use error::{CompilerError, LexError, LexErrorKind, ParserError, StackFrameInfo, VmError, VmResult};
pub use host::{CapturingHost, ForeignAllocate, ForeignMethodFn, Host, StdoutHost};
pub use instance::Instance;
pub use value::{InstanceRef, Value};
pub use vm::{Limits, NoopTracer, RecordingTracer, StderrTracer, Tracer, Vm};

use std::rc::Rc;

/// Everything that can go wrong before a script starts running.
#[derive(Debug)]
pub enum LoadError {
    Lex(Vec<LexError>),
    Parse(Vec<ParserError>),
    Compile(CompilerError),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Lex(errs) => {
                for e in errs {
                    writeln!(f, "{e}")?;
                }
                Ok(())
            }
            LoadError::Parse(errs) => {
                for e in errs {
                    writeln!(f, "{e}")?;
                }
                Ok(())
            }
            LoadError::Compile(e) => write!(f, "{e}"),
        }
    }
}
impl std::error::Error for LoadError {}

/// Everything that can go wrong while running a loaded script.
#[derive(Debug)]
pub enum RunError {
    Load(LoadError),
    Runtime(VmError),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Load(e) => write!(f, "{e}"),
            RunError::Runtime(e) => write!(f, "{e}"),
        }
    }
}
impl std::error::Error for RunError {}

/// A ready-to-run Objo virtual machine, bootstrapped with the core library
/// (`spec.md` §6 "Standard library surface").
pub struct Interpreter {
    vm: Vm,
}

impl Interpreter {
    pub fn new(host: Box<dyn Host>) -> Interpreter {
        Self::with_limits(host, Limits::default())
    }

    pub fn with_limits(host: Box<dyn Host>, limits: Limits) -> Interpreter {
        let mut vm = Vm::with_limits(host, limits);
        corelib::bootstrap(&mut vm);
        Interpreter { vm }
    }

    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }

    /// Lexes, parses, compiles and runs `source` as a fresh top-level
    /// script, with `script_id` distinguishing it in diagnostics from
    /// previously-loaded scripts (`spec.md` §3 "scriptId").
    pub fn run(&mut self, source: &str, script_id: i32) -> Result<(), RunError> {
        let function = compile(source, script_id, self.vm.debug_mode).map_err(RunError::Load)?;
        self.vm.interpret(Rc::new(function)).map_err(RunError::Runtime)
    }
}

/// Runs the lexer, parser and compiler in sequence (`spec.md` §7:
/// "downstream phases refuse to run if errors is non-empty").
pub(crate) fn compile(source: &str, script_id: i32, is_debug: bool) -> Result<function::Function, LoadError> {
    let (tokens, lex_errors) = lexer::Lexer::new(source, script_id).tokenize();
    if !lex_errors.is_empty() {
        return Err(LoadError::Lex(lex_errors));
    }
    let (stmts, parse_errors) = parser::Parser::new(tokens).parse();
    if !parse_errors.is_empty() {
        return Err(LoadError::Parse(parse_errors));
    }
    compiler::Compiler::compile_top_level(&stmts, script_id, is_debug).map_err(LoadError::Compile)
}
