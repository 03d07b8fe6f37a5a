//! `Nothing`: the class of the single `nothing` singleton (`spec.md` §6).

use crate::value::Value;
use crate::vm::Vm;

pub fn register(vm: &mut Vm) {
    vm.register_foreign_method("Nothing", "toString()", false, Box::new(|_vm, _argc| Ok(Value::string("nothing"))));
}
