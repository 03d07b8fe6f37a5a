//! `Map` (`spec.md` §6). Backed by `Instance::foreign_data` holding an
//! `indexmap::IndexMap<Value, Value>` so insertion order is stable for
//! `iterate`/`keys`/`values`.

use indexmap::IndexMap;

use crate::instance::Instance;
use crate::value::Value;
use crate::vm::Vm;

type Storage = IndexMap<Value, Value>;

fn map_instance(vm: &mut Vm, slot: usize) -> crate::error::VmResult<std::rc::Rc<Instance>> {
    match vm.get_slot(slot) {
        Value::Instance(i) if i.with_foreign::<Storage, ()>(|_| ()).is_some() => Ok(i),
        other => Err(vm.runtime_error(format!("Expected a Map but got {}.", other.type_name()))),
    }
}

fn index_arg(vm: &mut Vm, slot: usize) -> crate::error::VmResult<i64> {
    match vm.get_slot(slot) {
        Value::Number(n) => Ok(n as i64),
        other => Err(vm.runtime_error(format!("Expected a Number but got {}.", other.type_name()))),
    }
}

pub fn register(vm: &mut Vm) {
    vm.register_foreign_class(
        "Map",
        std::rc::Rc::new(|inst, _args| {
            inst.set_foreign::<Storage>(IndexMap::new());
            Ok(())
        }),
    );

    vm.register_foreign_method(
        "Map",
        "clear()",
        false,
        Box::new(|vm, _argc| {
            let inst = map_instance(vm, 0)?;
            inst.with_foreign_mut::<Storage, ()>(|m| m.clear());
            Ok(Value::Instance(inst))
        }),
    );
    vm.register_foreign_method(
        "Map",
        "containsKey(_)",
        false,
        Box::new(|vm, _argc| {
            let key = vm.get_slot(1);
            let inst = map_instance(vm, 0)?;
            Ok(Value::Boolean(inst.with_foreign::<Storage, bool>(|m| m.contains_key(&key)).unwrap_or(false)))
        }),
    );
    vm.register_foreign_method(
        "Map",
        "count()",
        false,
        Box::new(|vm, _argc| {
            let inst = map_instance(vm, 0)?;
            Ok(Value::Number(inst.with_foreign::<Storage, usize>(|m| m.len()).unwrap_or(0) as f64))
        }),
    );
    vm.register_foreign_method(
        "Map",
        "iterate(_)",
        false,
        Box::new(|vm, _argc| {
            let inst = map_instance(vm, 0)?;
            let len = inst.with_foreign::<Storage, usize>(|m| m.len()).unwrap_or(0) as i64;
            let next = match vm.get_slot(1) {
                Value::Boolean(false) => 0,
                Value::Number(n) => n as i64 + 1,
                other => return Err(vm.runtime_error(format!("Expected false or a Number but got {}.", other.type_name()))),
            };
            if next >= len {
                Ok(Value::Boolean(false))
            } else {
                Ok(Value::Number(next as f64))
            }
        }),
    );
    vm.register_foreign_method(
        "Map",
        "iteratorValue(_)",
        false,
        Box::new(|vm, _argc| {
            let idx = index_arg(vm, 1)?.max(0) as usize;
            let inst = map_instance(vm, 0)?;
            let entry = inst.with_foreign::<Storage, Option<(Value, Value)>>(|m| m.get_index(idx).map(|(k, v)| (k.clone(), v.clone()))).flatten();
            match entry {
                Some((k, v)) => vm.new_key_value(k, v),
                None => Ok(vm.nothing()),
            }
        }),
    );
    vm.register_foreign_method(
        "Map",
        "keys()",
        false,
        Box::new(|vm, _argc| {
            let inst = map_instance(vm, 0)?;
            let keys = inst.with_foreign::<Storage, Vec<Value>>(|m| m.keys().cloned().collect()).unwrap_or_default();
            vm.new_list(keys)
        }),
    );
    vm.register_foreign_method(
        "Map",
        "values()",
        false,
        Box::new(|vm, _argc| {
            let inst = map_instance(vm, 0)?;
            let values = inst.with_foreign::<Storage, Vec<Value>>(|m| m.values().cloned().collect()).unwrap_or_default();
            vm.new_list(values)
        }),
    );
    vm.register_foreign_method(
        "Map",
        "remove(_)",
        false,
        Box::new(|vm, _argc| {
            let key = vm.get_slot(1);
            let inst = map_instance(vm, 0)?;
            let removed = inst.with_foreign_mut::<Storage, Option<Value>>(|m| m.shift_remove(&key)).flatten();
            Ok(removed.unwrap_or_else(|| vm.nothing()))
        }),
    );
    vm.register_foreign_method(
        "Map",
        "toString()",
        false,
        Box::new(|vm, _argc| {
            let inst = map_instance(vm, 0)?;
            let entries = inst.with_foreign::<Storage, Vec<(Value, Value)>>(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()).unwrap_or_default();
            let mut parts = Vec::with_capacity(entries.len());
            for (k, v) in &entries {
                let ks = vm.stringify(k)?;
                let ks = if matches!(k, Value::String(_)) { format!("\"{ks}\"") } else { ks };
                let vs = vm.stringify(v)?;
                let vs = if matches!(v, Value::String(_)) { format!("\"{vs}\"") } else { vs };
                parts.push(format!("{ks}: {vs}"));
            }
            Ok(Value::string(format!("{{{}}}", parts.join(", "))))
        }),
    );
    vm.register_foreign_method(
        "Map",
        "[_]",
        false,
        Box::new(|vm, _argc| {
            let key = vm.get_slot(1);
            let inst = map_instance(vm, 0)?;
            let found = inst.with_foreign::<Storage, Option<Value>>(|m| m.get(&key).cloned()).flatten();
            Ok(found.unwrap_or_else(|| vm.nothing()))
        }),
    );
    vm.register_foreign_method(
        "Map",
        "[_]=(_)",
        false,
        Box::new(|vm, _argc| {
            let key = vm.get_slot(1);
            let value = vm.get_slot(2);
            let inst = map_instance(vm, 0)?;
            inst.with_foreign_mut::<Storage, ()>(|m| {
                m.insert(key, value.clone());
            });
            Ok(value)
        }),
    );
}
