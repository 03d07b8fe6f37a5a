//! Class declaration and dispatch scenarios beyond the core `spec.md` §8
//! list: `is`/`type`/`hasMethod`, static fields, foreign-class equality,
//! and user-defined `foreign` classes bound through the [`Host`] trait.

use std::cell::RefCell;
use std::rc::Rc;

use objo::{ForeignAllocate, ForeignMethodFn, Host, Interpreter, Value};
use pretty_assertions::assert_eq;

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
fn object_reflection_methods() {
    let source = "class A {} \
                  var a = A() \
                  System.print(a.type() == A) \
                  System.print(a.hasMethod(\"type\")) \
                  System.print(a is A) \
                  System.print(a is Object)";
    assert_eq!(run_captured(source), "true\ntrue\ntrue\ntrue\n");
}

#[test]
fn user_defined_classes_are_distinct_types() {
    let source = "class A {} class B {} \
                  System.print(A() is A) \
                  System.print(A() is B)";
    assert_eq!(run_captured(source), "true\nfalse\n");
}

#[test]
fn static_methods_are_not_visible_on_instances() {
    let source = "class A { static make() { return A() } } \
                  var a = A.make() \
                  System.print(a.type() == A)";
    assert_eq!(run_captured(source), "true\n");
}

#[test]
fn default_equality_is_identity_not_structural() {
    let source = "class A { constructor(v) { _v = v } } \
                  System.print(A(1) == A(1)) \
                  var a = A(1) \
                  System.print(a == a)";
    assert_eq!(run_captured(source), "false\ntrue\n");
}

/// A host can extend the foreign-class surface beyond the core library
/// (`spec.md` §6 "Host API"); the core library falls through to it for any
/// class/method it doesn't already provide.
struct CounterHost {
    buffer: Rc<RefCell<String>>,
}

impl Host for CounterHost {
    fn bind_foreign_class(&mut self, name: &str) -> Option<ForeignAllocate> {
        if name == "Counter" {
            Some(Rc::new(|inst, _args| {
                inst.set_foreign::<i64>(0);
                Ok(())
            }))
        } else {
            None
        }
    }

    fn bind_foreign_method(&mut self, class_name: &str, signature: &str, _is_static: bool) -> Option<ForeignMethodFn> {
        match (class_name, signature) {
            ("Counter", "increment()") => Some(Box::new(|vm, _argc| {
                let receiver = vm.get_slot(0);
                let n = match receiver {
                    Value::Instance(i) => i.with_foreign_mut::<i64, i64>(|n| {
                        *n += 1;
                        *n
                    }),
                    _ => None,
                };
                Ok(Value::Number(n.unwrap_or(0) as f64))
            })),
            _ => None,
        }
    }

    fn print(&mut self, text: &str) {
        self.buffer.borrow_mut().push_str(text);
        self.buffer.borrow_mut().push('\n');
    }
}

#[test]
fn host_supplied_foreign_class_and_method() {
    let buffer = Rc::new(RefCell::new(String::new()));
    let mut interp = Interpreter::new(Box::new(CounterHost { buffer: buffer.clone() }));
    let source = "foreign class Counter { foreign increment() } \
                  var c = Counter() \
                  c.increment() \
                  System.print(c.increment())";
    interp.run(source, 0).unwrap_or_else(|e| panic!("program failed: {e}"));
    assert_eq!(buffer.borrow().as_str(), "2\n");
}
