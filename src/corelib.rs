//! Bootstraps a fresh [`Vm`] with the core library (`spec.md` §6 "Standard
//! library surface"): compiles and runs `assets/core_object.objo` and
//! `assets/core.objo`, caches the well-known classes, builds the `nothing`
//! and default `Random` singletons, and binds the handful of operator
//! methods the parser has no grammar to declare.

use std::rc::Rc;

use crate::instance::Instance;
use crate::value::{ForeignMethod, KlassRef, Value};
use crate::vm::Vm;

const CORE_OBJECT_SOURCE: &str = include_str!("../assets/core_object.objo");
const CORE_SOURCE: &str = include_str!("../assets/core.objo");

/// Compiles and runs one of the embedded core library sources. Any failure
/// here is a bug in this crate, not a recoverable user-facing error.
fn run_core_source(vm: &mut Vm, source: &str, script_id: i32) {
    let function = crate::compile(source, script_id, false).unwrap_or_else(|e| panic!("core library failed to compile: {e}"));
    vm.interpret(Rc::new(function)).unwrap_or_else(|e| panic!("core library failed to run: {e}"));
}

fn global_class(vm: &Vm, name: &str) -> KlassRef {
    match vm.globals.get(name) {
        Some(Value::Class(k)) => k.clone(),
        _ => panic!("core library did not define class '{name}'"),
    }
}

/// Inserts a native method directly into `klass`'s method table, bypassing
/// the `foreignMethod` opcode for signatures the parser cannot spell
/// (operators, `is`; `spec.md` §4.2 "Signature grammar").
fn inject(klass: &KlassRef, signature: &str, arity: usize, is_static: bool, callback: impl Fn(&mut Vm, usize) -> crate::error::VmResult<Value> + 'static) {
    let fm = Rc::new(ForeignMethod { class_name: klass.name.clone(), signature: signature.to_string(), arity, is_static, callback: Box::new(callback) });
    let table = if is_static { &klass.static_methods } else { &klass.methods };
    table.borrow_mut().insert(signature.to_string(), Value::ForeignMethod(fm));
}

fn number_of(vm: &mut Vm, slot: usize) -> crate::error::VmResult<f64> {
    match vm.get_slot(slot) {
        Value::Number(n) => Ok(n),
        other => Err(vm.runtime_error(format!("Expected a Number but got {}.", other.type_name()))),
    }
}

fn integer_of(vm: &mut Vm, slot: usize) -> crate::error::VmResult<i64> {
    number_of(vm, slot).map(|n| n as i64)
}

pub fn bootstrap(vm: &mut Vm) {
    run_core_source(vm, CORE_OBJECT_SOURCE, -1);
    let object_class = global_class(vm, "Object");
    inject_object_operators(&object_class);
    vm.set_core_class("Object", object_class);

    run_core_source(vm, CORE_SOURCE, -2);
    for name in ["Boolean", "Number", "String", "Nothing", "List", "KeyValue"] {
        let klass = global_class(vm, name);
        vm.set_core_class(name, klass);
    }

    inject_number_operators(&global_class(vm, "Number"));
    inject_string_operators(&global_class(vm, "String"));

    let nothing_klass = global_class(vm, "Nothing");
    let nothing_instance = Rc::new(Instance::new(nothing_klass, None));
    vm.nothing = Some(Value::Instance(nothing_instance));

    let random_klass = global_class(vm, "Random");
    let random_instance = Rc::new(Instance::new(random_klass, vm.nothing.as_ref()));
    crate::foreign::seed_random(&random_instance);
    vm.random_instance = Some(Value::Instance(random_instance));
}

/// `==`, `<>`, `is` (`spec.md` §6): the only methods every value in the
/// system must answer, so they live on `Object` itself.
fn inject_object_operators(object_class: &KlassRef) {
    inject(object_class, "==(_)", 1, false, |vm, _argc| {
        let a = vm.get_slot(0);
        let b = vm.get_slot(1);
        Ok(Value::Boolean(a == b))
    });
    inject(object_class, "<>(_)", 1, false, |vm, _argc| {
        let a = vm.get_slot(0);
        let b = vm.get_slot(1);
        Ok(Value::Boolean(a != b))
    });
    inject(object_class, "is(_)", 1, false, |vm, _argc| {
        let receiver = vm.get_slot(0);
        match vm.get_slot(1) {
            Value::Class(target) => Ok(Value::Boolean(crate::foreign::is_a(vm, &receiver, &target))),
            other => Err(vm.runtime_error(format!("Expected a Class but got {}.", other.type_name()))),
        }
    });
}

/// Arithmetic, comparison, bitwise and range operators on `Number`
/// (`spec.md` §6). The fast numeric path in `vm/ops.rs` handles `Number op
/// Number` without reaching here; these exist for the signature-based
/// fallback and so `Number` answers `hasMethod` truthfully for them.
fn inject_number_operators(number_class: &KlassRef) {
    macro_rules! binary {
        ($sig:literal, $op:expr) => {
            inject(number_class, $sig, 1, false, |vm, _argc| {
                let a = number_of(vm, 0)?;
                let b = number_of(vm, 1)?;
                Ok(Value::Number(($op)(a, b)))
            });
        };
    }
    binary!("+(_)", |a: f64, b: f64| a + b);
    binary!("-(_)", |a: f64, b: f64| a - b);
    binary!("*(_)", |a: f64, b: f64| a * b);
    binary!("/(_)", |a: f64, b: f64| a / b);
    binary!("%(_)", |a: f64, b: f64| a % b);

    macro_rules! compare {
        ($sig:literal, $op:expr) => {
            inject(number_class, $sig, 1, false, |vm, _argc| {
                let a = number_of(vm, 0)?;
                let b = number_of(vm, 1)?;
                Ok(Value::Boolean(($op)(a, b)))
            });
        };
    }
    compare!("<(_)", |a: f64, b: f64| a < b);
    compare!("<=(_)", |a: f64, b: f64| a <= b);
    compare!(">(_)", |a: f64, b: f64| a > b);
    compare!(">=(_)", |a: f64, b: f64| a >= b);

    macro_rules! bitwise {
        ($sig:literal, $op:expr) => {
            inject(number_class, $sig, 1, false, |vm, _argc| {
                let a = integer_of(vm, 0)?;
                let b = integer_of(vm, 1)?;
                Ok(Value::Number(($op)(a, b) as f64))
            });
        };
    }
    bitwise!("&(_)", |a: i64, b: i64| a & b);
    bitwise!("|(_)", |a: i64, b: i64| a | b);
    bitwise!("^(_)", |a: i64, b: i64| a ^ b);
    bitwise!("<<(_)", |a: i64, b: i64| a << b);
    bitwise!(">>(_)", |a: i64, b: i64| a >> b);

    inject(number_class, "-()", 0, false, |vm, _argc| Ok(Value::Number(-number_of(vm, 0)?)));
    inject(number_class, "~()", 0, false, |vm, _argc| Ok(Value::Number(!integer_of(vm, 0)? as f64)));

    inject(number_class, "..<(_)", 1, false, |vm, _argc| {
        let start = integer_of(vm, 0)?;
        let end = integer_of(vm, 1)?;
        let items = if start <= end { (start..end).map(|n| Value::Number(n as f64)).collect() } else { (end + 1..=start).rev().map(|n| Value::Number(n as f64)).collect() };
        vm.new_list(items)
    });
    inject(number_class, "...(_)", 1, false, |vm, _argc| {
        let start = integer_of(vm, 0)?;
        let end = integer_of(vm, 1)?;
        let items = if start <= end { (start..=end).map(|n| Value::Number(n as f64)).collect() } else { (end..=start).rev().map(|n| Value::Number(n as f64)).collect() };
        vm.new_list(items)
    });
}

/// `+` (concatenation) and `*` (repetition) on `String` (`spec.md` §6).
fn inject_string_operators(string_class: &KlassRef) {
    inject(string_class, "+(_)", 1, false, |vm, _argc| {
        let a = match vm.get_slot(0) {
            Value::String(s) => s,
            other => return Err(vm.runtime_error(format!("Expected a String but got {}.", other.type_name()))),
        };
        let other = vm.get_slot(1);
        let b = vm.stringify(&other)?;
        Ok(Value::string(format!("{a}{b}")))
    });
    inject(string_class, "*(_)", 1, false, |vm, _argc| {
        let a = match vm.get_slot(0) {
            Value::String(s) => s,
            other => return Err(vm.runtime_error(format!("Expected a String but got {}.", other.type_name()))),
        };
        let times = integer_of(vm, 1)?.max(0) as usize;
        Ok(Value::string(a.repeat(times)))
    });
}
