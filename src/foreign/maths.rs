//! `Maths`: static constants and helpers (`spec.md` §6). Declared `foreign
//! class` like every core class, but never constructed, so it has no
//! `foreign_allocate` registered here.

use crate::value::Value;
use crate::vm::Vm;

pub fn register(vm: &mut Vm) {
    vm.register_foreign_method("Maths", "e()", true, Box::new(|_vm, _argc| Ok(Value::Number(std::f64::consts::E))));
    vm.register_foreign_method("Maths", "pi()", true, Box::new(|_vm, _argc| Ok(Value::Number(std::f64::consts::PI))));
    vm.register_foreign_method("Maths", "tau()", true, Box::new(|_vm, _argc| Ok(Value::Number(std::f64::consts::TAU))));
    vm.register_foreign_method(
        "Maths",
        "random()",
        true,
        Box::new(|vm, _argc| vm.random_instance.clone().ok_or_else(|| vm.runtime_error("Random instance not bootstrapped."))),
    );
}
