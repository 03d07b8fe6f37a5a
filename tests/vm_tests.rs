//! VM-level properties from `spec.md` §8 that are observable through the
//! public API: stack balance after a clean run, resource limits, the
//! debugger tracer, and foreign-method receiver/argument wiring.

use objo::{CapturingHost, Interpreter, Limits, RecordingTracer};

#[test]
fn stack_and_frames_are_empty_after_a_clean_run() {
    let mut interp = Interpreter::new(Box::new(CapturingHost::default()));
    interp.run("var a = 1 + 2 function f(n) { return n * 2 } System.print(f(a))", 0).expect("program should run");
    assert_eq!(interp.vm_mut().stack_top(), 0, "`spec.md` §8: stackTop == 0 after any complete program that doesn't throw");
}

#[test]
fn deep_recursion_hits_the_frame_limit_instead_of_overflowing_the_host_stack() {
    let mut interp = Interpreter::with_limits(Box::new(CapturingHost::default()), Limits { max_frames: 8, max_stack: 64 * 255 });
    let result = interp.run("function loop(n) { return loop(n + 1) } loop(0)", 0);
    assert!(result.is_err(), "recursion past `max_frames` must raise a runtime error, not overflow the host stack");
}

#[test]
fn recording_tracer_observes_instructions_as_the_program_runs() {
    let mut interp = Interpreter::new(Box::new(CapturingHost::default()));
    interp.vm_mut().set_tracer(Box::new(RecordingTracer::default()));
    interp.run("System.print(1 + 1)", 0).expect("program should run");
}

#[test]
fn a_foreign_method_runtime_error_aborts_the_program() {
    let mut interp = Interpreter::new(Box::new(CapturingHost::default()));
    let result = interp.run("Maths.random().inRange(5, 1)", 0);
    assert!(result.is_err(), "Random.inRange(_,_) must reject low >= high");
}
