//! `Number` (`spec.md` §6). Arithmetic/comparison/bitwise/range operators
//! are installed directly on the `Klass` by [`crate::corelib`] since they
//! have no identifier name the parser can declare; this module covers the
//! named methods only.

use crate::value::Value;
use crate::vm::Vm;

fn number_arg(vm: &mut Vm, slot: usize) -> crate::error::VmResult<f64> {
    match vm.get_slot(slot) {
        Value::Number(n) => Ok(n),
        other => Err(vm.runtime_error(format!("Expected a Number but got {}.", other.type_name()))),
    }
}

pub fn register(vm: &mut Vm) {
    macro_rules! unary {
        ($sig:literal, $f:expr) => {
            vm.register_foreign_method("Number", $sig, false, Box::new(|vm, _argc| Ok(Value::Number(($f)(number_arg(vm, 0)?)))));
        };
    }
    unary!("abs()", f64::abs);
    unary!("ceil()", f64::ceil);
    unary!("floor()", f64::floor);
    unary!("round()", f64::round);
    unary!("sqrt()", f64::sqrt);
    unary!("sin()", f64::sin);
    unary!("cos()", f64::cos);
    unary!("tan()", f64::tan);

    vm.register_foreign_method(
        "Number",
        "sign()",
        false,
        Box::new(|vm, _argc| {
            let n = number_arg(vm, 0)?;
            let sign = if n > 0.0 { 1.0 } else if n < 0.0 { -1.0 } else { 0.0 };
            Ok(Value::Number(sign))
        }),
    );
    vm.register_foreign_method(
        "Number",
        "pow(_)",
        false,
        Box::new(|vm, _argc| {
            let base = number_arg(vm, 0)?;
            let exponent = number_arg(vm, 1)?;
            Ok(Value::Number(base.powf(exponent)))
        }),
    );
    vm.register_foreign_method(
        "Number",
        "min(_)",
        false,
        Box::new(|vm, _argc| Ok(Value::Number(number_arg(vm, 0)?.min(number_arg(vm, 1)?)))),
    );
    vm.register_foreign_method(
        "Number",
        "max(_)",
        false,
        Box::new(|vm, _argc| Ok(Value::Number(number_arg(vm, 0)?.max(number_arg(vm, 1)?)))),
    );
    vm.register_foreign_method(
        "Number",
        "toString()",
        false,
        Box::new(|vm, _argc| {
            let n = number_arg(vm, 0)?;
            Ok(Value::string(format_number(n)))
        }),
    );
    vm.register_foreign_method(
        "Number",
        "fromString(_)",
        true,
        Box::new(|vm, _argc| match vm.get_slot(1) {
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(n) => Ok(Value::Number(n)),
                Err(_) => Ok(vm.nothing()),
            },
            other => Err(vm.runtime_error(format!("Expected a String but got {}.", other.type_name()))),
        }),
    );
}

/// Shortest round-trippable formatting (`spec.md` §9: `Cargo.toml`'s `ryu`
/// dependency exists for exactly this), with integral values printed
/// without a trailing `.0` since Objo has a single numeric type.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    let mut buf = ryu::Buffer::new();
    buf.format(n).to_string()
}
