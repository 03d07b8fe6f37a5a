//! Error taxonomies for the four compilation/execution phases.
//!
//! Mirrors the teacher's `exception_private.rs` shape: plain structs carrying
//! enough location info to build a diagnostic, plus a `Result` alias used
//! pervasively instead of reaching for `anyhow`/`thiserror`.

use std::fmt;

/// A single stack frame recorded when a [`VmError`] is raised, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct StackFrameInfo {
    pub function_name: String,
    pub line: i32,
    pub script_id: i32,
}

impl fmt::Display for StackFrameInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  at {} (script {}, line {})", self.function_name, self.script_id, self.line)
    }
}

/// Lexical error kinds (`spec.md` §7.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum LexErrorKind {
    SyntaxError,
    UnexpectedCharacter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub line: i32,
    pub script_id: i32,
    pub start: usize,
    pub message: String,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at line {}: {}", self.kind, self.line, self.message)
    }
}
impl std::error::Error for LexError {}

/// A single-kind parser error (`spec.md` §7.2). The parser never aborts on
/// these: it records them in an `errors` list and re-synchronises.
#[derive(Debug, Clone, PartialEq)]
pub struct ParserError {
    pub message: String,
    pub line: i32,
    pub script_id: i32,
}

impl fmt::Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parser error at line {}: {}", self.line, self.message)
    }
}
impl std::error::Error for ParserError {}

/// A single-kind compiler error (`spec.md` §7.3). Fatal: compilation aborts
/// at the first one.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerError {
    pub message: String,
    pub line: i32,
    pub script_id: i32,
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Compiler error at line {}: {}", self.line, self.message)
    }
}
impl std::error::Error for CompilerError {}

/// A runtime error (`spec.md` §7.4, §4.4 "Runtime errors"). Always aborts the
/// current `interpret`/`run` call.
#[derive(Debug, Clone, PartialEq)]
pub struct VmError {
    pub line: i32,
    pub script_id: i32,
    pub message: String,
    pub stack_dump: String,
    pub stack_trace: Vec<StackFrameInfo>,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Runtime error at line {}: {}", self.line, self.message)?;
        for frame in &self.stack_trace {
            writeln!(f, "{frame}")?;
        }
        Ok(())
    }
}
impl std::error::Error for VmError {}

/// Result alias used throughout the VM, matching the teacher's `RunResult<T>`.
pub type VmResult<T> = Result<T, VmError>;
