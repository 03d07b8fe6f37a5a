//! `String` (`spec.md` §6). `+`/`*` are installed directly on the `Klass`
//! by [`crate::corelib`] since the parser has no operator-method grammar.

use crate::value::Value;
use crate::vm::Vm;

fn string_arg(vm: &mut Vm, slot: usize) -> crate::error::VmResult<std::rc::Rc<str>> {
    match vm.get_slot(slot) {
        Value::String(s) => Ok(s),
        other => Err(vm.runtime_error(format!("Expected a String but got {}.", other.type_name()))),
    }
}

fn bool_arg(vm: &mut Vm, slot: usize) -> crate::error::VmResult<bool> {
    match vm.get_slot(slot) {
        Value::Boolean(b) => Ok(b),
        other => Err(vm.runtime_error(format!("Expected a Boolean but got {}.", other.type_name()))),
    }
}

fn index_arg(vm: &mut Vm, slot: usize) -> crate::error::VmResult<i64> {
    match vm.get_slot(slot) {
        Value::Number(n) => Ok(n as i64),
        other => Err(vm.runtime_error(format!("Expected a Number but got {}.", other.type_name()))),
    }
}

pub fn register(vm: &mut Vm) {
    vm.register_foreign_method("String", "count()", false, Box::new(|vm, _argc| Ok(Value::Number(string_arg(vm, 0)?.chars().count() as f64))));
    vm.register_foreign_method(
        "String",
        "contains(_)",
        false,
        Box::new(|vm, _argc| Ok(Value::Boolean(string_arg(vm, 0)?.contains(&*string_arg(vm, 1)?)))),
    );
    vm.register_foreign_method(
        "String",
        "indexOf(_)",
        false,
        Box::new(|vm, _argc| {
            let haystack = string_arg(vm, 0)?;
            let needle = string_arg(vm, 1)?;
            match haystack.find(&*needle) {
                Some(byte_idx) => Ok(Value::Number(haystack[..byte_idx].chars().count() as f64)),
                None => Ok(Value::Number(-1.0)),
            }
        }),
    );
    vm.register_foreign_method(
        "String",
        "startsWith(_)",
        false,
        Box::new(|vm, _argc| Ok(Value::Boolean(string_arg(vm, 0)?.starts_with(&*string_arg(vm, 1)?)))),
    );
    vm.register_foreign_method(
        "String",
        "startsWith(_,_)",
        false,
        Box::new(|vm, _argc| {
            let s = string_arg(vm, 0)?;
            let prefix = string_arg(vm, 1)?;
            let case_sensitive = bool_arg(vm, 2)?;
            let matched = if case_sensitive { s.starts_with(&*prefix) } else { s.to_lowercase().starts_with(&prefix.to_lowercase()) };
            Ok(Value::Boolean(matched))
        }),
    );
    vm.register_foreign_method(
        "String",
        "endsWith(_)",
        false,
        Box::new(|vm, _argc| Ok(Value::Boolean(string_arg(vm, 0)?.ends_with(&*string_arg(vm, 1)?)))),
    );
    vm.register_foreign_method(
        "String",
        "endsWith(_,_)",
        false,
        Box::new(|vm, _argc| {
            let s = string_arg(vm, 0)?;
            let suffix = string_arg(vm, 1)?;
            let case_sensitive = bool_arg(vm, 2)?;
            let matched = if case_sensitive { s.ends_with(&*suffix) } else { s.to_lowercase().ends_with(&suffix.to_lowercase()) };
            Ok(Value::Boolean(matched))
        }),
    );
    vm.register_foreign_method(
        "String",
        "left(_)",
        false,
        Box::new(|vm, _argc| {
            let s = string_arg(vm, 0)?;
            let n = index_arg(vm, 1)?.max(0) as usize;
            Ok(Value::string(s.chars().take(n).collect::<String>()))
        }),
    );
    vm.register_foreign_method(
        "String",
        "right(_)",
        false,
        Box::new(|vm, _argc| {
            let s = string_arg(vm, 0)?;
            let n = index_arg(vm, 1)?.max(0) as usize;
            let len = s.chars().count();
            Ok(Value::string(s.chars().skip(len.saturating_sub(n)).collect::<String>()))
        }),
    );
    vm.register_foreign_method(
        "String",
        "middle(_,_)",
        false,
        Box::new(|vm, _argc| {
            let s = string_arg(vm, 0)?;
            let start = index_arg(vm, 1)?.max(0) as usize;
            let count = index_arg(vm, 2)?.max(0) as usize;
            Ok(Value::string(s.chars().skip(start).take(count).collect::<String>()))
        }),
    );
    vm.register_foreign_method("String", "trim()", false, Box::new(|vm, _argc| Ok(Value::string(string_arg(vm, 0)?.trim()))));
    vm.register_foreign_method("String", "trimStart()", false, Box::new(|vm, _argc| Ok(Value::string(string_arg(vm, 0)?.trim_start()))));
    vm.register_foreign_method("String", "trimEnd()", false, Box::new(|vm, _argc| Ok(Value::string(string_arg(vm, 0)?.trim_end()))));
    vm.register_foreign_method("String", "toUpperCase()", false, Box::new(|vm, _argc| Ok(Value::string(string_arg(vm, 0)?.to_uppercase()))));
    vm.register_foreign_method("String", "toLowerCase()", false, Box::new(|vm, _argc| Ok(Value::string(string_arg(vm, 0)?.to_lowercase()))));
    vm.register_foreign_method(
        "String",
        "split(_)",
        false,
        Box::new(|vm, _argc| {
            let s = string_arg(vm, 0)?;
            let sep = string_arg(vm, 1)?;
            let parts: Vec<Value> = if sep.is_empty() { s.chars().map(|c| Value::string(c.to_string())).collect() } else { s.split(&*sep).map(Value::string).collect() };
            vm.new_list(parts)
        }),
    );
    vm.register_foreign_method(
        "String",
        "iterate(_)",
        false,
        Box::new(|vm, _argc| {
            let s = string_arg(vm, 0)?;
            let len = s.chars().count() as i64;
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
        "String",
        "iteratorValue(_)",
        false,
        Box::new(|vm, _argc| {
            let s = string_arg(vm, 0)?;
            let idx = index_arg(vm, 1)?.max(0) as usize;
            match s.chars().nth(idx) {
                Some(c) => Ok(Value::string(c.to_string())),
                None => Ok(vm.nothing()),
            }
        }),
    );
    vm.register_foreign_method(
        "String",
        "toString()",
        false,
        Box::new(|vm, _argc| Ok(Value::String(string_arg(vm, 0)?))),
    );
    vm.register_foreign_method(
        "String",
        "[_]",
        false,
        Box::new(|vm, _argc| {
            let s = string_arg(vm, 0)?;
            let len = s.chars().count() as i64;
            let mut idx = index_arg(vm, 1)?;
            if idx < 0 {
                idx += len;
            }
            if idx < 0 || idx >= len {
                return Err(vm.runtime_error("String index out of bounds."));
            }
            Ok(Value::string(s.chars().nth(idx as usize).unwrap().to_string()))
        }),
    );
    vm.register_foreign_method(
        "String",
        "fromCodepoint(_)",
        true,
        Box::new(|vm, _argc| {
            let code = index_arg(vm, 1)? as u32;
            match char::from_u32(code) {
                Some(c) => Ok(Value::string(c.to_string())),
                None => Err(vm.runtime_error(format!("{code} is not a valid Unicode codepoint."))),
            }
        }),
    );
}
