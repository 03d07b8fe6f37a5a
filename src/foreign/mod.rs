//! Native (`foreign`) method and class bindings for the core library
//! (`spec.md` §6 "Standard library surface"). Each submodule registers the
//! identifier/subscript/setter-named methods of one core class; operator and
//! keyword-named methods (`==`, `is`, `+`, ...) have no declarable name in
//! Objo source and are injected directly onto the `Klass` by
//! [`crate::corelib`] instead.

mod boolean;
mod keyvalue;
mod list;
mod map;
mod maths;
mod nothing_class;
mod number;
mod object_class;
mod random;
mod string;
mod system;

pub(crate) use object_class::is_a;
pub(crate) use random::seed_random;

use crate::vm::Vm;

pub(crate) fn register_core(vm: &mut Vm) {
    object_class::register(vm);
    nothing_class::register(vm);
    boolean::register(vm);
    number::register(vm);
    string::register(vm);
    list::register(vm);
    map::register(vm);
    keyvalue::register(vm);
    maths::register(vm);
    random::register(vm);
    system::register(vm);
}
