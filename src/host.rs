//! The VM/host boundary (`spec.md` §6 "Host API").
//!
//! An embedder implements [`Host`] to receive output, supply foreign class
//! allocators and method bodies beyond the built-in core library, and get
//! single-step debugger callbacks.

use crate::value::Value;
use crate::vm::Vm;

/// Allocates a foreign class' native storage onto a freshly created
/// instance; see `Klass::foreign_allocate`.
pub type ForeignAllocate = std::rc::Rc<dyn Fn(&crate::value::InstanceRef, &[Value]) -> crate::error::VmResult<()>>;
pub type ForeignMethodFn = Box<dyn Fn(&mut Vm, usize) -> crate::error::VmResult<Value>>;

pub trait Host {
    /// Resolves a foreign class allocator for a class the core library
    /// doesn't already provide. Returning `None` lets the VM fall back to
    /// its own core-library table (`spec.md` §4.4 "Foreign binding").
    fn bind_foreign_class(&mut self, _name: &str) -> Option<ForeignAllocate> {
        None
    }

    fn bind_foreign_method(&mut self, _class_name: &str, _signature: &str, _is_static: bool) -> Option<ForeignMethodFn> {
        None
    }

    fn print(&mut self, text: &str);

    /// Called once when `interpret` completes without error.
    fn finished(&mut self) {}

    /// Called when the single-step debugger pauses.
    fn will_stop(&mut self, _script_id: i32, _line: i32) {}
}

/// A host that writes to stdout, the default for running scripts outside a
/// richer embedding (tests, a REPL).
pub struct StdoutHost;

impl Host for StdoutHost {
    fn print(&mut self, text: &str) {
        println!("{text}");
    }
}

/// A host that captures printed output in memory, used by tests.
#[derive(Default)]
pub struct CapturingHost {
    pub output: String,
}

impl Host for CapturingHost {
    fn print(&mut self, text: &str) {
        self.output.push_str(text);
        self.output.push('\n');
    }
}
