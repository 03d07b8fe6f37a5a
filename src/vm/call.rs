//! Call mechanics: plain calls, signature-based method dispatch, class
//! instantiation and the foreign-method boundary (`spec.md` §4.4 "Calls",
//! "Method dispatch").

use std::rc::Rc;

use crate::error::VmResult;
use crate::function::Function;
use crate::instance::Instance;
use crate::klass::{BoundMethod, Klass};
use crate::value::{ForeignMethod, KlassRef, Value};

use super::{CallFrame, Vm};

impl Vm {
    pub(crate) fn call_function(&mut self, f: Rc<Function>, arg_count: usize) -> VmResult<()> {
        if arg_count != f.arity {
            return Err(self.runtime_error(format!("Expected {} argument(s) but got {}.", f.arity, arg_count)));
        }
        if self.frames.len() >= self.limits.max_frames {
            return Err(self.runtime_error("Stack overflow."));
        }
        let stack_base = self.stack_top() - arg_count - 1;
        self.frames.push(CallFrame { function: f, ip: 0, stack_base });
        Ok(())
    }

    /// `callForeignMethod` (`spec.md` §4.4): moves receiver+args into the
    /// slot array, leaves a `nothing` placeholder return value on the
    /// stack, then runs the host callback synchronously.
    pub(crate) fn call_foreign_method(&mut self, fm: Rc<ForeignMethod>, arg_count: usize) -> VmResult<()> {
        let base = self.stack_top() - arg_count - 1;
        self.slots.clear();
        self.slots.extend_from_slice(&self.stack_slice(base));
        self.popn(arg_count + 1);
        let placeholder = self.nothing();
        self.push(placeholder)?;
        let result = (fm.callback)(self, arg_count)?;
        self.set_return(result);
        Ok(())
    }

    fn stack_slice(&self, from: usize) -> Vec<Value> {
        self.stack[from..].to_vec()
    }

    /// `callClass` (`spec.md` §4.4): replaces the class value on the stack
    /// with a freshly allocated instance, runs foreign allocation, then
    /// dispatches to a matching-arity constructor (or requires zero args).
    pub(crate) fn call_class(&mut self, klass: KlassRef, arg_count: usize) -> VmResult<()> {
        let base = self.stack_top() - arg_count - 1;
        let instance = Rc::new(Instance::new(klass.clone(), self.nothing.as_ref()));
        if klass.is_foreign {
            if let Some(allocate) = klass.foreign_allocate.borrow().clone() {
                let args = self.stack_slice(base + 1);
                allocate(&instance, &args)?;
            }
        }
        self.stack[base] = Value::Instance(instance);
        match klass.find_constructor(arg_count) {
            Some(ctor) => self.call_function(ctor, arg_count),
            None if arg_count == 0 => Ok(()),
            None => Err(self.runtime_error(format!("{} does not implement a constructor with {arg_count} argument(s).", klass.name))),
        }
    }

    pub(crate) fn call_value(&mut self, arg_count: usize) -> VmResult<()> {
        let callee = self.peek(arg_count).clone();
        match callee {
            Value::Function(f) => self.call_function(f, arg_count),
            Value::ForeignMethod(fm) => self.call_foreign_method(fm, arg_count),
            Value::Class(k) => self.call_class(k, arg_count),
            Value::BoundMethod(bm) => self.call_bound_method(bm, arg_count),
            other => Err(self.runtime_error(format!("{} is not callable.", other.type_name()))),
        }
    }

    fn call_bound_method(&mut self, bm: Rc<BoundMethod>, arg_count: usize) -> VmResult<()> {
        let base = self.stack_top() - arg_count - 1;
        self.stack[base] = bm.receiver.clone();
        match &bm.method {
            Value::Function(f) => self.call_function(f.clone(), arg_count),
            Value::ForeignMethod(fm) => self.call_foreign_method(fm.clone(), arg_count),
            other => Err(self.runtime_error(format!("{} is not a callable method.", other.type_name()))),
        }
    }

    /// `invoke` (`spec.md` §4.4 "Method dispatch"): looks the signature up
    /// on the receiver's class (instance methods) or the class itself
    /// (static methods), then dispatches like a plain call.
    pub(crate) fn invoke(&mut self, signature: &str, arg_count: usize) -> VmResult<()> {
        let receiver = self.peek(arg_count).clone();
        let (klass, method) = match &receiver {
            Value::Class(k) => (k.clone(), k.find_static_method(signature)),
            other => {
                let k = self.class_of(other);
                let m = k.find_method(signature);
                (k, m)
            }
        };
        match method {
            Some(Value::Function(f)) => self.call_function(f, arg_count),
            Some(Value::ForeignMethod(fm)) => self.call_foreign_method(fm, arg_count),
            _ => Err(self.runtime_error(format!("{} does not implement '{signature}'.", klass.name))),
        }
    }

    pub(crate) fn super_invoke(&mut self, superclass: &Klass, signature: &str, arg_count: usize) -> VmResult<()> {
        match superclass.find_method(signature) {
            Some(Value::Function(f)) => self.call_function(f, arg_count),
            Some(Value::ForeignMethod(fm)) => self.call_foreign_method(fm, arg_count),
            _ => Err(self.runtime_error(format!("{} does not implement '{signature}'.", superclass.name))),
        }
    }

    pub(crate) fn super_constructor(&mut self, superclass: &Klass, arg_count: usize) -> VmResult<()> {
        match superclass.find_constructor(arg_count) {
            Some(f) => self.call_function(f, arg_count),
            None if arg_count == 0 => Ok(()),
            None => Err(self.runtime_error(format!("{} does not implement a constructor with {arg_count} argument(s).", superclass.name))),
        }
    }

}
