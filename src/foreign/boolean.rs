//! `Boolean` (`spec.md` §6).

use crate::value::Value;
use crate::vm::Vm;

pub fn register(vm: &mut Vm) {
    vm.register_foreign_method(
        "Boolean",
        "not()",
        false,
        Box::new(|vm, _argc| match vm.get_slot(0) {
            Value::Boolean(b) => Ok(Value::Boolean(!b)),
            other => Err(vm.runtime_error(format!("Expected a Boolean but got {}.", other.type_name()))),
        }),
    );
    vm.register_foreign_method(
        "Boolean",
        "toString()",
        false,
        Box::new(|vm, _argc| match vm.get_slot(0) {
            Value::Boolean(b) => Ok(Value::string(if b { "true" } else { "false" })),
            other => Err(vm.runtime_error(format!("Expected a Boolean but got {}.", other.type_name()))),
        }),
    );
}
