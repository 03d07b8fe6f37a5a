//! `Object`: the root of every class hierarchy (`spec.md` §6).
//!
//! `==`/`<>`/`is` are not declarable from Objo source (the parser has no
//! operator-method grammar, and `is` is a reserved word), so they are
//! installed directly onto the compiled `Klass` by [`crate::corelib`]
//! rather than through a `foreign` declaration here.

use std::rc::Rc;

use crate::value::Value;
use crate::vm::Vm;

pub fn register(vm: &mut Vm) {
    vm.register_foreign_method(
        "Object",
        "hasMethod(_)",
        false,
        Box::new(|vm, _argc| {
            let name = match vm.get_slot(1) {
                Value::String(s) => s.to_string(),
                other => return Err(vm.runtime_error(format!("Expected a String but got {}.", other.type_name()))),
            };
            let klass = vm.class_of(&vm.get_slot(0));
            let found = klass.methods.borrow().keys().any(|sig| sig.split('(').next() == Some(name.as_str()));
            Ok(Value::Boolean(found))
        }),
    );
    vm.register_foreign_method(
        "Object",
        "type()",
        false,
        Box::new(|vm, _argc| {
            let klass = vm.class_of(&vm.get_slot(0));
            Ok(Value::Class(klass))
        }),
    );
    vm.register_foreign_method(
        "Object",
        "superType()",
        false,
        Box::new(|vm, _argc| {
            let klass = vm.class_of(&vm.get_slot(0));
            let superclass = klass.superclass.borrow().clone();
            match superclass {
                Some(s) => Ok(Value::Class(s)),
                None => Ok(vm.nothing()),
            }
        }),
    );
    vm.register_foreign_method(
        "Object",
        "toString()",
        false,
        Box::new(|vm, _argc| {
            let klass = vm.class_of(&vm.get_slot(0));
            Ok(Value::string(format!("instance of {}", klass.name)))
        }),
    );
}

/// Checks `receiver is target` by walking the superclass chain.
pub(crate) fn is_a(vm: &Vm, receiver: &Value, target: &Rc<crate::klass::Klass>) -> bool {
    let mut klass = Some(vm.class_of(receiver));
    while let Some(k) = klass {
        if Rc::ptr_eq(&k, target) {
            return true;
        }
        klass = k.superclass.borrow().clone();
    }
    false
}
