//! End-to-end scenarios (`spec.md` §8 "TESTABLE PROPERTIES" / "End-to-end
//! scenarios"): compile a single source string, run it, assert printed
//! output. Mirrors the teacher's style of driving the whole pipeline through
//! the public `Interpreter` entry point rather than poking the compiler or
//! VM directly.

use std::cell::RefCell;
use std::rc::Rc;

use objo::{Host, Interpreter};
use pretty_assertions::assert_eq;

/// A [`Host`] that appends every printed line into a shared buffer, so the
/// test can keep reading it after the `Box<dyn Host>` has been moved into
/// the `Interpreter`.
struct BufferHost(Rc<RefCell<String>>);

impl Host for BufferHost {
    fn print(&mut self, text: &str) {
        self.0.borrow_mut().push_str(text);
        self.0.borrow_mut().push('\n');
    }
}

fn run_captured(source: &str) -> String {
    let buffer = Rc::new(RefCell::new(String::new()));
    let mut interp = Interpreter::new(Box::new(BufferHost(buffer.clone())));
    interp.run(source, 0).unwrap_or_else(|e| panic!("program failed to run: {e}\nsource: {source}"));
    let result = buffer.borrow().clone();
    result
}

#[test]
fn scenario_print_number() {
    assert_eq!(run_captured("System.print(42)"), "42\n");
}

#[test]
fn scenario_precedence() {
    assert_eq!(run_captured("var a = 1 + 2 * 3 System.print(a)"), "7\n");
}

#[test]
fn scenario_string_concat_and_count() {
    assert_eq!(run_captured("var s = \"hello\" + \" \" + \"world\" System.print(s.count())"), "11\n");
}

#[test]
fn scenario_fibonacci() {
    let source = "function fib(n) { if (n < 2) then return n return fib(n-2)+fib(n-1) } System.print(fib(10))";
    assert_eq!(run_captured(source), "55\n");
}

#[test]
fn scenario_class_constructor_and_getter() {
    let source = "class A { constructor(x) { _x = x } x { _x } } System.print(A(7).x)";
    assert_eq!(run_captured(source), "7\n");
}

#[test]
fn scenario_foreach_over_range_builds_list() {
    let source = "var xs = [] foreach i in 1...5 { xs.add(i*i) } System.print(xs)";
    assert_eq!(run_captured(source), "[1, 4, 9, 16, 25]\n");
}

#[test]
fn scenario_inheritance_super_constructor() {
    let source = "class A { constructor(x) { _x = x } x { _x } } \
                  class B < A { constructor(x) { super(x) } } \
                  System.print(B(3).x)";
    assert_eq!(run_captured(source), "3\n");
}

#[test]
fn scenario_unknown_field_is_a_runtime_error() {
    let buffer = Rc::new(RefCell::new(String::new()));
    let mut interp = Interpreter::new(Box::new(BufferHost(buffer)));
    let result = interp.run("class C { foo() { return _z } } C().foo()", 0);
    assert!(result.is_err(), "reading an undeclared field must fail, either at compile time or at runtime");
}

#[test]
fn core_library_boolean_and_equality() {
    let source = "System.print(true.not()) System.print(1 == 1) System.print(1 <> 2) System.print(1 is Number)";
    assert_eq!(run_captured(source), "false\ntrue\ntrue\ntrue\n");
}

#[test]
fn core_library_map_and_keyvalue() {
    let source = "var m = {} m[\"a\"] = 1 foreach kv in m { System.print(kv.key) System.print(kv.value) }";
    assert_eq!(run_captured(source), "a\n1\n");
}

#[test]
fn core_library_string_repetition_and_list_mutation() {
    let source = "System.print(\"ab\" * 3) var xs = [1, 2, 3] xs.removeAt(1) System.print(xs)";
    assert_eq!(run_captured(source), "ababab\n[1, 3]\n");
}
