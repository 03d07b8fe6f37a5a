//! `KeyValue` (`spec.md` §6): the pair type yielded by `Map.iterate`.
//! Backed by `Instance::foreign_data` holding a `(Value, Value)` tuple.

use crate::instance::Instance;
use crate::value::Value;
use crate::vm::Vm;

type Storage = (Value, Value);

fn kv_instance(vm: &mut Vm, slot: usize) -> crate::error::VmResult<std::rc::Rc<Instance>> {
    match vm.get_slot(slot) {
        Value::Instance(i) if i.with_foreign::<Storage, ()>(|_| ()).is_some() => Ok(i),
        other => Err(vm.runtime_error(format!("Expected a KeyValue but got {}.", other.type_name()))),
    }
}

pub fn register(vm: &mut Vm) {
    vm.register_foreign_class(
        "KeyValue",
        std::rc::Rc::new(|inst, args| {
            let key = args.first().cloned().unwrap_or(Value::Boolean(false));
            let value = args.get(1).cloned().unwrap_or(Value::Boolean(false));
            inst.set_foreign::<Storage>((key, value));
            Ok(())
        }),
    );

    vm.register_foreign_method(
        "KeyValue",
        "key()",
        false,
        Box::new(|vm, _argc| {
            let inst = kv_instance(vm, 0)?;
            Ok(inst.with_foreign::<Storage, Value>(|(k, _)| k.clone()).unwrap())
        }),
    );
    vm.register_foreign_method(
        "KeyValue",
        "value()",
        false,
        Box::new(|vm, _argc| {
            let inst = kv_instance(vm, 0)?;
            Ok(inst.with_foreign::<Storage, Value>(|(_, v)| v.clone()).unwrap())
        }),
    );
    vm.register_foreign_method(
        "KeyValue",
        "key=(_)",
        false,
        Box::new(|vm, _argc| {
            let new_key = vm.get_slot(1);
            let inst = kv_instance(vm, 0)?;
            inst.with_foreign_mut::<Storage, ()>(|(k, _)| *k = new_key.clone());
            Ok(new_key)
        }),
    );
    vm.register_foreign_method(
        "KeyValue",
        "value=(_)",
        false,
        Box::new(|vm, _argc| {
            let new_value = vm.get_slot(1);
            let inst = kv_instance(vm, 0)?;
            inst.with_foreign_mut::<Storage, ()>(|(_, v)| *v = new_value.clone());
            Ok(new_value)
        }),
    );
    vm.register_foreign_method(
        "KeyValue",
        "toString()",
        false,
        Box::new(|vm, _argc| {
            let inst = kv_instance(vm, 0)?;
            let (k, v) = inst.with_foreign::<Storage, Storage>(|pair| pair.clone()).unwrap();
            let ks = vm.stringify(&k)?;
            let vs = vm.stringify(&v)?;
            Ok(Value::string(format!("{ks}: {vs}")))
        }),
    );
}
