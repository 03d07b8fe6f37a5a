//! `List` (`spec.md` §6). Backed by `Instance::foreign_data` holding a
//! `Vec<Value>`, attached either by a list literal (`Vm::new_list`) or by
//! `foreign_allocate` when a `List` is constructed explicitly.

use crate::instance::Instance;
use crate::value::Value;
use crate::vm::Vm;

fn list_instance(vm: &mut Vm, slot: usize) -> crate::error::VmResult<std::rc::Rc<Instance>> {
    match vm.get_slot(slot) {
        Value::Instance(i) if i.with_foreign::<Vec<Value>, ()>(|_| ()).is_some() => Ok(i),
        other => Err(vm.runtime_error(format!("Expected a List but got {}.", other.type_name()))),
    }
}

fn index_arg(vm: &mut Vm, slot: usize) -> crate::error::VmResult<i64> {
    match vm.get_slot(slot) {
        Value::Number(n) => Ok(n as i64),
        other => Err(vm.runtime_error(format!("Expected a Number but got {}.", other.type_name()))),
    }
}

/// Normalises a (possibly negative) index against `len`; errors if still
/// out of range.
fn normalise(vm: &mut Vm, raw: i64, len: usize) -> crate::error::VmResult<usize> {
    let idx = if raw < 0 { raw + len as i64 } else { raw };
    if idx < 0 || idx as usize >= len {
        return Err(vm.runtime_error("List index out of bounds."));
    }
    Ok(idx as usize)
}

pub fn register(vm: &mut Vm) {
    vm.register_foreign_class(
        "List",
        std::rc::Rc::new(|inst, _args| {
            inst.set_foreign::<Vec<Value>>(Vec::new());
            Ok(())
        }),
    );

    vm.register_foreign_method(
        "List",
        "add(_)",
        false,
        Box::new(|vm, _argc| {
            let item = vm.get_slot(1);
            let inst = list_instance(vm, 0)?;
            inst.with_foreign_mut::<Vec<Value>, ()>(|v| v.push(item));
            Ok(Value::Instance(inst))
        }),
    );
    vm.register_foreign_method(
        "List",
        "clear()",
        false,
        Box::new(|vm, _argc| {
            let inst = list_instance(vm, 0)?;
            inst.with_foreign_mut::<Vec<Value>, ()>(|v| v.clear());
            Ok(Value::Instance(inst))
        }),
    );
    vm.register_foreign_method(
        "List",
        "clone()",
        false,
        Box::new(|vm, _argc| {
            let inst = list_instance(vm, 0)?;
            let items = inst.with_foreign::<Vec<Value>, Vec<Value>>(|v| v.clone()).unwrap_or_default();
            vm.new_list(items)
        }),
    );
    vm.register_foreign_method(
        "List",
        "count()",
        false,
        Box::new(|vm, _argc| {
            let inst = list_instance(vm, 0)?;
            Ok(Value::Number(inst.with_foreign::<Vec<Value>, usize>(|v| v.len()).unwrap_or(0) as f64))
        }),
    );
    vm.register_foreign_method(
        "List",
        "indexOf(_)",
        false,
        Box::new(|vm, _argc| {
            let target = vm.get_slot(1);
            let inst = list_instance(vm, 0)?;
            let pos = inst.with_foreign::<Vec<Value>, Option<usize>>(|v| v.iter().position(|x| *x == target)).flatten();
            Ok(Value::Number(pos.map(|i| i as f64).unwrap_or(-1.0)))
        }),
    );
    vm.register_foreign_method(
        "List",
        "insert(_,_)",
        false,
        Box::new(|vm, _argc| {
            let raw = index_arg(vm, 1)?;
            let item = vm.get_slot(2);
            let inst = list_instance(vm, 0)?;
            let len = inst.with_foreign::<Vec<Value>, usize>(|v| v.len()).unwrap_or(0);
            let idx = if raw < 0 { (raw + len as i64 + 1).max(0) as usize } else { raw as usize };
            if idx > len {
                return Err(vm.runtime_error("List insert index out of bounds."));
            }
            inst.with_foreign_mut::<Vec<Value>, ()>(|v| v.insert(idx, item));
            Ok(Value::Instance(inst))
        }),
    );
    vm.register_foreign_method(
        "List",
        "iterate(_)",
        false,
        Box::new(|vm, _argc| {
            let inst = list_instance(vm, 0)?;
            let len = inst.with_foreign::<Vec<Value>, usize>(|v| v.len()).unwrap_or(0) as i64;
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
        "List",
        "iteratorValue(_)",
        false,
        Box::new(|vm, _argc| {
            let idx = index_arg(vm, 1)?.max(0) as usize;
            let inst = list_instance(vm, 0)?;
            Ok(inst.with_foreign::<Vec<Value>, Value>(|v| v.get(idx).cloned().unwrap_or_else(|| vm.nothing())).unwrap_or_else(|| vm.nothing()))
        }),
    );
    vm.register_foreign_method(
        "List",
        "pop()",
        false,
        Box::new(|vm, _argc| {
            let inst = list_instance(vm, 0)?;
            let popped = inst.with_foreign_mut::<Vec<Value>, Option<Value>>(|v| v.pop()).flatten();
            Ok(popped.unwrap_or_else(|| vm.nothing()))
        }),
    );
    vm.register_foreign_method(
        "List",
        "remove(_)",
        false,
        Box::new(|vm, _argc| {
            let target = vm.get_slot(1);
            let inst = list_instance(vm, 0)?;
            let removed = inst.with_foreign_mut::<Vec<Value>, Option<Value>>(|v| v.iter().position(|x| *x == target).map(|i| v.remove(i))).flatten();
            Ok(removed.unwrap_or_else(|| vm.nothing()))
        }),
    );
    vm.register_foreign_method(
        "List",
        "removeAt(_)",
        false,
        Box::new(|vm, _argc| {
            let raw = index_arg(vm, 1)?;
            let inst = list_instance(vm, 0)?;
            let len = inst.with_foreign::<Vec<Value>, usize>(|v| v.len()).unwrap_or(0);
            let idx = normalise(vm, raw, len)?;
            let removed = inst.with_foreign_mut::<Vec<Value>, Value>(|v| v.remove(idx)).unwrap();
            Ok(removed)
        }),
    );
    vm.register_foreign_method(
        "List",
        "swap(_,_)",
        false,
        Box::new(|vm, _argc| {
            let a = index_arg(vm, 1)?;
            let b = index_arg(vm, 2)?;
            let inst = list_instance(vm, 0)?;
            let len = inst.with_foreign::<Vec<Value>, usize>(|v| v.len()).unwrap_or(0);
            let ia = normalise(vm, a, len)?;
            let ib = normalise(vm, b, len)?;
            inst.with_foreign_mut::<Vec<Value>, ()>(|v| v.swap(ia, ib));
            Ok(Value::Instance(inst))
        }),
    );
    vm.register_foreign_method(
        "List",
        "toString()",
        false,
        Box::new(|vm, _argc| {
            let inst = list_instance(vm, 0)?;
            let items = inst.with_foreign::<Vec<Value>, Vec<Value>>(|v| v.clone()).unwrap_or_default();
            let mut parts = Vec::with_capacity(items.len());
            for item in &items {
                let s = vm.stringify(item)?;
                parts.push(if matches!(item, Value::String(_)) { format!("\"{s}\"") } else { s });
            }
            Ok(Value::string(format!("[{}]", parts.join(", "))))
        }),
    );
    vm.register_foreign_method(
        "List",
        "[_]",
        false,
        Box::new(|vm, _argc| {
            let raw = index_arg(vm, 1)?;
            let inst = list_instance(vm, 0)?;
            let len = inst.with_foreign::<Vec<Value>, usize>(|v| v.len()).unwrap_or(0);
            let idx = normalise(vm, raw, len)?;
            Ok(inst.with_foreign::<Vec<Value>, Value>(|v| v[idx].clone()).unwrap())
        }),
    );
    vm.register_foreign_method(
        "List",
        "[_]=(_)",
        false,
        Box::new(|vm, _argc| {
            let raw = index_arg(vm, 1)?;
            let value = vm.get_slot(2);
            let inst = list_instance(vm, 0)?;
            let len = inst.with_foreign::<Vec<Value>, usize>(|v| v.len()).unwrap_or(0);
            let idx = normalise(vm, raw, len)?;
            inst.with_foreign_mut::<Vec<Value>, ()>(|v| v[idx] = value.clone());
            Ok(value)
        }),
    );
    vm.register_foreign_method(
        "List",
        "filled(_,_)",
        true,
        Box::new(|vm, _argc| {
            let size = index_arg(vm, 1)?.max(0) as usize;
            let element = vm.get_slot(2);
            vm.new_list(vec![element; size])
        }),
    );
}
