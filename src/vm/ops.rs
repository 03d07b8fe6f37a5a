//! Opcode execution: the big `match` driven by `Vm::run`'s dispatch loop,
//! plus the numeric/structural fast paths described in `spec.md` §4.4.

use std::rc::Rc;

use crate::chunk::OpCode;
use crate::error::VmResult;
use crate::instance::Instance;
use crate::klass::Klass;
use crate::signature::call_signature;
use crate::value::Value;

use super::Vm;

/// Truncates a `Number` to `i64` the way bitwise/shift operators need
/// (`spec.md` §3 "single numeric type; `isInteger` derived at runtime").
fn as_integer(v: &Value) -> Option<i64> {
    v.as_number().map(|n| n as i64)
}

impl Vm {
    pub(crate) fn execute(&mut self, op: OpCode) -> VmResult<()> {
        use OpCode::*;
        match op {
            Constant => {
                let idx = self.fetch_byte() as usize;
                let v = self.current_chunk_constant(idx);
                self.push(v)
            }
            ConstantLong => {
                let idx = self.fetch_u16() as usize;
                let v = self.current_chunk_constant(idx);
                self.push(v)
            }
            Nothing => {
                let n = self.nothing();
                self.push(n)
            }
            True_ => self.push(Value::Boolean(true)),
            False_ => self.push(Value::Boolean(false)),
            Load0 => self.push(Value::Number(0.0)),
            Load1 => self.push(Value::Number(1.0)),
            Load2 => self.push(Value::Number(2.0)),
            LoadMinus1 => self.push(Value::Number(-1.0)),
            LoadMinus2 => self.push(Value::Number(-2.0)),
            Pop => {
                self.pop();
                Ok(())
            }
            PopN => {
                let n = self.fetch_byte() as usize;
                self.popn(n);
                Ok(())
            }
            Swap => {
                let len = self.stack_top();
                self.stack_swap(len - 1, len - 2);
                Ok(())
            }
            Add => self.binary_numeric(|a, b| a + b, "+"),
            Subtract => self.binary_numeric(|a, b| a - b, "-"),
            Multiply => self.binary_numeric(|a, b| a * b, "*"),
            Divide => self.binary_numeric(|a, b| a / b, "/"),
            Modulo => self.binary_numeric(|a, b| a % b, "%"),
            BitwiseAnd => self.binary_integer(|a, b| a & b, "&"),
            BitwiseOr => self.binary_integer(|a, b| a | b, "|"),
            BitwiseXor => self.binary_integer(|a, b| a ^ b, "^"),
            ShiftLeft => self.binary_integer(|a, b| a << b, "<<"),
            ShiftRight => self.binary_integer(|a, b| a >> b, ">>"),
            Equal => self.equality_op(false),
            NotEqual => self.equality_op(true),
            Less => self.comparison_op(|a, b| a < b, "<"),
            LessEqual => self.comparison_op(|a, b| a <= b, "<="),
            Greater => self.comparison_op(|a, b| a > b, ">"),
            GreaterEqual => self.comparison_op(|a, b| a >= b, ">="),
            Add1 => self.unary_numeric(|a| a + 1.0),
            Subtract1 => self.unary_numeric(|a| a - 1.0),
            Negate => self.negate_op(),
            Not => {
                let v = self.pop();
                let truthy = v.is_truthy(self.nothing_class());
                self.push(Value::Boolean(!truthy))
            }
            BitwiseNot => {
                let v = self.pop();
                match as_integer(&v) {
                    Some(n) => self.push(Value::Number(!n as f64)),
                    None => self.dispatch_unary_fallback(v, "~"),
                }
            }
            Is_ => self.binary_invoke("is", 1),
            RangeExclusive => self.binary_invoke("..<", 1),
            RangeInclusive => self.binary_invoke("...", 1),
            GetLocal => {
                let slot = self.fetch_byte() as usize;
                let base = self.current_frame_base();
                let v = self.stack_get(base + slot);
                self.push(v)
            }
            SetLocal => {
                let slot = self.fetch_byte() as usize;
                let base = self.current_frame_base();
                let v = self.peek(0).clone();
                self.stack_set_at(base + slot, v);
                Ok(())
            }
            GetGlobal => self.get_global(false),
            GetGlobalLong => self.get_global(true),
            SetGlobal => self.set_global(false),
            SetGlobalLong => self.set_global(true),
            DefineGlobal => self.define_global(false),
            DefineGlobalLong => self.define_global(true),
            GetField => {
                let idx = self.fetch_byte() as usize;
                let this = self.stack_get(self.current_frame_base());
                match this {
                    Value::Instance(inst) => {
                        let v = inst.get_field(idx);
                        self.push(v)
                    }
                    other => Err(self.runtime_error(format!("Cannot access fields on {}.", other.type_name()))),
                }
            }
            SetField => {
                let idx = self.fetch_byte() as usize;
                let v = self.peek(0).clone();
                let this = self.stack_get(self.current_frame_base());
                match this {
                    Value::Instance(inst) => {
                        inst.set_field(idx, v);
                        Ok(())
                    }
                    other => Err(self.runtime_error(format!("Cannot access fields on {}.", other.type_name()))),
                }
            }
            GetStaticField => self.get_static_field(false),
            GetStaticFieldLong => self.get_static_field(true),
            SetStaticField => self.set_static_field(false),
            SetStaticFieldLong => self.set_static_field(true),
            Jump => {
                let offset = self.fetch_u16() as usize;
                self.advance_ip(offset);
                Ok(())
            }
            JumpIfFalse => {
                let offset = self.fetch_u16() as usize;
                let truthy = self.peek(0).is_truthy(self.nothing_class());
                if !truthy {
                    self.advance_ip(offset);
                }
                Ok(())
            }
            JumpIfTrue => {
                let offset = self.fetch_u16() as usize;
                let truthy = self.peek(0).is_truthy(self.nothing_class());
                if truthy {
                    self.advance_ip(offset);
                }
                Ok(())
            }
            Loop => {
                let offset = self.fetch_u16() as usize;
                self.retreat_ip(offset);
                Ok(())
            }
            Call => {
                let arg_count = self.fetch_byte() as usize;
                self.call_value(arg_count)
            }
            Invoke => self.invoke_op(false),
            InvokeLong => self.invoke_op(true),
            SuperConstructor => {
                let name_idx = self.fetch_u16() as usize;
                let arg_count = self.fetch_byte() as usize;
                let superclass = self.resolve_super_class(name_idx)?;
                self.super_constructor(&superclass, arg_count)
            }
            SuperInvoke => {
                let name_idx = self.fetch_u16() as usize;
                let sig_idx = self.fetch_u16() as usize;
                let arg_count = self.fetch_byte() as usize;
                let superclass = self.resolve_super_class(name_idx)?;
                let signature = self.constant_string(sig_idx);
                self.super_invoke(&superclass, &signature, arg_count)
            }
            SuperSetter => {
                let name_idx = self.fetch_u16() as usize;
                let sig_idx = self.fetch_u16() as usize;
                let superclass = self.resolve_super_class(name_idx)?;
                let signature = self.constant_string(sig_idx);
                self.super_invoke(&superclass, &signature, 1)
            }
            Class_ => self.class_op(),
            Inherit => {
                let super_v = self.pop();
                let class_v = self.peek(0).clone();
                match (class_v, super_v) {
                    (Value::Class(c), Value::Class(s)) => {
                        c.inherit_from(&s);
                        Ok(())
                    }
                    _ => Err(self.runtime_error("Superclass must be a class.")),
                }
            }
            Method => self.bind_method_op(false),
            ForeignMethod => self.bind_foreign_method_op(),
            Constructor => self.bind_constructor_op(),
            List => self.collection_op(ListKind::List),
            Map => self.collection_op(ListKind::Map),
            KeyValue => self.collection_op(ListKind::KeyValue),
            Return_ => self.return_op(),
            Assert => {
                let message = self.pop();
                let cond = self.pop();
                if !cond.is_truthy(self.nothing_class()) {
                    return Err(self.runtime_error(format!("{message:?}")));
                }
                let n = self.nothing();
                self.push(n)
            }
            Breakpoint => Ok(()),
            Exit => Err(self.runtime_error("Unreachable 'exit' opcode reached at runtime (compiler bug).")),
            LocalVarDeclaration => {
                self.fetch_byte();
                self.fetch_byte();
                Ok(())
            }
            DebugFieldName => {
                self.fetch_u16();
                self.fetch_byte();
                Ok(())
            }
            GetLocalClass => {
                let slot = self.fetch_byte() as usize;
                let base = self.current_frame_base();
                let v = self.stack_get(base + slot);
                let klass = self.class_of(&v);
                self.push(Value::Class(klass))
            }
        }
    }

    fn binary_numeric(&mut self, f: impl Fn(f64, f64) -> f64, sig: &str) -> VmResult<()> {
        let b = self.peek(0).clone();
        let a = self.peek(1).clone();
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            self.popn(2);
            return self.push(Value::Number(f(x, y)));
        }
        self.dispatch_binary_fallback(sig)
    }

    fn binary_integer(&mut self, f: impl Fn(i64, i64) -> i64, sig: &str) -> VmResult<()> {
        let b = self.peek(0).clone();
        let a = self.peek(1).clone();
        if let (Some(x), Some(y)) = (as_integer(&a), as_integer(&b)) {
            self.popn(2);
            return self.push(Value::Number(f(x, y) as f64));
        }
        self.dispatch_binary_fallback(sig)
    }

    fn comparison_op(&mut self, f: impl Fn(f64, f64) -> bool, sig: &str) -> VmResult<()> {
        let b = self.peek(0).clone();
        let a = self.peek(1).clone();
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            self.popn(2);
            return self.push(Value::Boolean(f(x, y)));
        }
        self.dispatch_binary_fallback(sig)
    }

    fn equality_op(&mut self, negate: bool) -> VmResult<()> {
        let b = self.peek(0).clone();
        let a = self.peek(1).clone();
        if a.is_number() && b.is_number() {
            self.popn(2);
            return self.push(Value::Boolean((a == b) != negate));
        }
        self.dispatch_binary_fallback(if negate { "<>" } else { "==" })
    }

    fn unary_numeric(&mut self, f: impl Fn(f64) -> f64) -> VmResult<()> {
        let v = self.peek(0).clone();
        match v.as_number() {
            Some(n) => {
                self.pop();
                self.push(Value::Number(f(n)))
            }
            None => Err(self.runtime_error(format!("{} is not a Number.", v.type_name()))),
        }
    }

    fn negate_op(&mut self) -> VmResult<()> {
        let v = self.pop();
        match v.as_number() {
            Some(n) => self.push(Value::Number(-n)),
            None => self.dispatch_unary_fallback(v, "-"),
        }
    }

    fn dispatch_binary_fallback(&mut self, sig: &str) -> VmResult<()> {
        let signature = call_signature(sig, 1);
        self.invoke(&signature, 1)
    }

    fn dispatch_unary_fallback(&mut self, v: Value, sig: &str) -> VmResult<()> {
        self.push(v)?;
        let signature = call_signature(sig, 0);
        self.invoke(&signature, 0)
    }

    fn binary_invoke(&mut self, name: &str, arity: usize) -> VmResult<()> {
        let signature = call_signature(name, arity);
        self.invoke(&signature, arity)
    }

    fn invoke_op(&mut self, long: bool) -> VmResult<()> {
        let sig_idx = if long { self.fetch_u16() as usize } else { self.fetch_byte() as usize };
        let arg_count = self.fetch_byte() as usize;
        let signature = self.constant_string(sig_idx);
        self.invoke(&signature, arg_count)
    }

    fn get_global(&mut self, long: bool) -> VmResult<()> {
        let idx = if long { self.fetch_u16() as usize } else { self.fetch_byte() as usize };
        let name = self.constant_string(idx);
        match self.globals.get(&name).cloned() {
            Some(v) => self.push(v),
            None => Err(self.runtime_error(format!("Undefined variable '{name}'."))),
        }
    }

    fn set_global(&mut self, long: bool) -> VmResult<()> {
        let idx = if long { self.fetch_u16() as usize } else { self.fetch_byte() as usize };
        let name = self.constant_string(idx);
        if !self.globals.contains_key(&name) {
            return Err(self.runtime_error(format!("Undefined variable '{name}'.")));
        }
        let v = self.peek(0).clone();
        self.globals.insert(name, v);
        Ok(())
    }

    fn define_global(&mut self, long: bool) -> VmResult<()> {
        let idx = if long { self.fetch_u16() as usize } else { self.fetch_byte() as usize };
        let name = self.constant_string(idx);
        let v = self.pop();
        self.globals.insert(name, v);
        Ok(())
    }

    /// Like `getField`/`setField`, the receiver is implicit: slot 0 of the
    /// current frame, which for a static method already holds the `Class`
    /// itself (`spec.md` §4.3 "Slot 0").
    fn get_static_field(&mut self, long: bool) -> VmResult<()> {
        let idx = if long { self.fetch_u16() as usize } else { self.fetch_byte() as usize };
        let name = self.constant_string(idx);
        let receiver = self.stack_get(self.current_frame_base());
        let klass = self.class_of(&receiver);
        let nothing = self.nothing();
        let v = klass.get_static_field(&name, &nothing);
        self.push(v)
    }

    fn set_static_field(&mut self, long: bool) -> VmResult<()> {
        let idx = if long { self.fetch_u16() as usize } else { self.fetch_byte() as usize };
        let name = self.constant_string(idx);
        let value = self.peek(0).clone();
        let receiver = self.stack_get(self.current_frame_base());
        let klass = self.class_of(&receiver);
        klass.set_static_field(&name, value);
        Ok(())
    }

    fn resolve_super_class(&mut self, name_idx: usize) -> VmResult<Rc<Klass>> {
        let name = self.constant_string(name_idx);
        match self.globals.get(&name).cloned() {
            Some(Value::Class(k)) => Ok(k),
            _ => Err(self.runtime_error(format!("Undefined superclass '{name}'."))),
        }
    }

    fn class_op(&mut self) -> VmResult<()> {
        let name_idx = self.fetch_u16() as usize;
        let is_foreign = self.fetch_byte() != 0;
        let field_count = self.fetch_byte() as usize;
        let first_field_index = self.fetch_byte() as usize;
        let name = self.constant_string(name_idx);
        let own_fields = (0..field_count.saturating_sub(first_field_index)).map(|i| format!("field{i}")).collect();
        let klass = Rc::new(Klass::new(name.clone(), is_foreign, first_field_index, own_fields));
        if is_foreign {
            if let Some(allocate) = self.bind_foreign_class_callback(&name) {
                *klass.foreign_allocate.borrow_mut() = Some(allocate);
            }
        }
        self.push(Value::Class(klass))
    }

    fn bind_method_op(&mut self, is_static_opcode: bool) -> VmResult<()> {
        let _ = is_static_opcode;
        let sig_idx = self.fetch_u16() as usize;
        let is_static = self.fetch_byte() != 0;
        let signature = self.constant_string(sig_idx);
        let method = self.pop();
        match self.peek(0).clone() {
            Value::Class(k) => {
                if is_static {
                    k.static_methods.borrow_mut().insert(signature, method);
                } else {
                    k.methods.borrow_mut().insert(signature, method);
                }
                Ok(())
            }
            _ => Err(self.runtime_error("'method' opcode requires a class on the stack.")),
        }
    }

    fn bind_foreign_method_op(&mut self) -> VmResult<()> {
        let sig_idx = self.fetch_u16() as usize;
        let arity = self.fetch_byte() as usize;
        let is_static = self.fetch_byte() != 0;
        let signature = self.constant_string(sig_idx);
        let class_name = match self.peek(0) {
            Value::Class(k) => k.name.clone(),
            _ => return Err(self.runtime_error("'foreignMethod' opcode requires a class on the stack.")),
        };
        let callback = self
            .bind_foreign_method_callback(&class_name, &signature, is_static, arity)
            .ok_or_else(|| self.runtime_error(format!("No foreign method bound for {class_name}.{signature}.")))?;
        let fm = Rc::new(crate::value::ForeignMethod { class_name: class_name.clone(), signature: signature.clone(), arity, is_static, callback });
        match self.peek(0).clone() {
            Value::Class(k) => {
                if is_static {
                    k.static_methods.borrow_mut().insert(signature, Value::ForeignMethod(fm));
                } else {
                    k.methods.borrow_mut().insert(signature, Value::ForeignMethod(fm));
                }
                Ok(())
            }
            _ => unreachable!(),
        }
    }

    fn bind_constructor_op(&mut self) -> VmResult<()> {
        let arg_count = self.fetch_byte() as usize;
        let func = self.pop();
        match (self.peek(0).clone(), func) {
            (Value::Class(k), Value::Function(f)) => {
                k.constructors.borrow_mut().insert(arg_count, f);
                Ok(())
            }
            _ => Err(self.runtime_error("'constructor' opcode requires a class and a function.")),
        }
    }

    fn collection_op(&mut self, kind: ListKind) -> VmResult<()> {
        let count = self.fetch_byte() as usize;
        match kind {
            ListKind::List => {
                let items = self.pop_n_values(count);
                let v = self.new_list(items)?;
                self.push(v)
            }
            ListKind::Map => {
                let entries = self.pop_n_values(count * 2);
                let v = self.new_map(entries)?;
                self.push(v)
            }
            ListKind::KeyValue => {
                let mut entry = self.pop_n_values(2);
                let value = entry.pop().unwrap();
                let key = entry.pop().unwrap();
                let v = self.new_key_value(key, value)?;
                self.push(v)
            }
        }
    }

    fn pop_n_values(&mut self, n: usize) -> Vec<Value> {
        let start = self.stack_top() - n;
        let items = self.stack_range(start);
        self.popn(n);
        items
    }

    fn return_op(&mut self) -> VmResult<()> {
        let result = self.pop();
        let frame = self.frames.pop().expect("return with no active frame");
        self.truncate_stack_to(frame.stack_base);
        self.push(result)
    }
}

enum ListKind {
    List,
    Map,
    KeyValue,
}

impl Vm {
    fn current_frame_base(&self) -> usize {
        self.frames.last().unwrap().stack_base
    }

    fn advance_ip(&mut self, by: usize) {
        self.frames.last_mut().unwrap().ip += by;
    }

    fn retreat_ip(&mut self, by: usize) {
        self.frames.last_mut().unwrap().ip -= by;
    }

    fn constant_string(&self, idx: usize) -> String {
        match self.current_chunk_constant(idx) {
            Value::String(s) => s.to_string(),
            other => format!("{other:?}"),
        }
    }

    fn stack_get(&self, idx: usize) -> Value {
        self.stack[idx].clone()
    }

    fn stack_set_at(&mut self, idx: usize, v: Value) {
        self.stack[idx] = v;
    }

    fn stack_swap(&mut self, a: usize, b: usize) {
        self.stack.swap(a, b);
    }

    fn stack_range(&self, from: usize) -> Vec<Value> {
        self.stack[from..].to_vec()
    }

    fn truncate_stack_to(&mut self, len: usize) {
        self.stack.truncate(len);
    }
}

/// Allocates the `Nothing`-backed instance used by `Object.toString()` and
/// friends when a foreign object has no bespoke formatting; lives here
/// since it only makes sense in terms of `Instance` + the class cache.
impl Vm {
    pub(crate) fn instance_of(&self, klass: Rc<Klass>) -> Instance {
        Instance::new(klass, self.nothing.as_ref())
    }
}
