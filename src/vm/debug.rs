//! Tracing hooks and the single-step debugger (`spec.md` §4.4 "Debugger").
//!
//! `Tracer` mirrors the teacher's `VmTracer` trait: a no-op default, a
//! stderr-printing variant for ad hoc debugging, and a recording variant
//! tests can inspect after a run.

use crate::chunk::OpCode;
use crate::error::VmError;

pub trait Tracer {
    fn on_instruction(&mut self, _frame_depth: usize, _op: OpCode) {}
    fn on_error(&mut self, _err: &VmError) {}
}

pub struct NoopTracer;
impl Tracer for NoopTracer {}

pub struct StderrTracer;
impl Tracer for StderrTracer {
    fn on_instruction(&mut self, frame_depth: usize, op: OpCode) {
        eprintln!("{:width$}{op}", "", width = frame_depth * 2);
    }
    fn on_error(&mut self, err: &VmError) {
        eprintln!("{err}");
    }
}

#[derive(Default)]
pub struct RecordingTracer {
    pub instructions: Vec<OpCode>,
    pub errors: Vec<String>,
}

impl Tracer for RecordingTracer {
    fn on_instruction(&mut self, _frame_depth: usize, op: OpCode) {
        self.instructions.push(op);
    }
    fn on_error(&mut self, err: &VmError) {
        self.errors.push(err.message.clone());
    }
}

/// Opcodes the debugger is allowed to pause before (`spec.md` §4.4).
fn is_stoppable_opcode(op: OpCode) -> bool {
    matches!(
        op,
        OpCode::Assert
            | OpCode::SetLocal
            | OpCode::SetGlobal
            | OpCode::SetGlobalLong
            | OpCode::DefineGlobal
            | OpCode::DefineGlobalLong
            | OpCode::SetField
            | OpCode::SetStaticField
            | OpCode::SetStaticFieldLong
            | OpCode::Return_
            | OpCode::Loop
            | OpCode::Call
            | OpCode::Invoke
            | OpCode::InvokeLong
            | OpCode::Breakpoint
    )
}

impl super::Vm {
    /// Stops are disallowed in chunks whose `scriptId == -1` (the standard
    /// library, `spec.md` §4.4 "Debugger").
    pub(crate) fn is_stoppable_here(&self) -> bool {
        let frame = self.frames.last().unwrap();
        if frame.function.chunk.script_id_for_offset(frame.ip) == -1 {
            return false;
        }
        let byte = frame.function.chunk.read_u8(frame.ip);
        OpCode::from_byte(byte).is_some_and(is_stoppable_opcode)
    }
}
