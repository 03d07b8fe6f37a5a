//! Runtime object representation (`spec.md` §3 "Instance").

use std::any::Any;
use std::cell::RefCell;

use crate::value::{KlassRef, Value};

/// Opaque native storage attached by foreign classes (`List`, `Map`,
/// `KeyValue`, ...) that need more than a flat field array.
pub type ForeignData = RefCell<Option<Box<dyn Any>>>;

pub struct Instance {
    pub klass: KlassRef,
    /// One slot per field in `klass.field_count`, flattened across the
    /// inheritance chain. Interior mutability: many `Instance`s are shared
    /// behind an `Rc` once pushed onto the stack or stored in a container.
    pub fields: RefCell<Vec<Value>>,
    pub foreign_data: ForeignData,
}

impl Instance {
    /// Fields default to the singleton `nothing`, except for the `Nothing`
    /// instance itself, which is constructed with an empty field vector
    /// before it exists to be its own default (`spec.md` §9 "nothing
    /// singleton").
    pub fn new(klass: KlassRef, nothing: Option<&Value>) -> Instance {
        let field_count = klass.field_count;
        let fields = match nothing {
            Some(n) => vec![n.clone(); field_count],
            None => Vec::with_capacity(field_count),
        };
        Instance { klass, fields: RefCell::new(fields), foreign_data: RefCell::new(None) }
    }

    pub fn get_field(&self, index: usize) -> Value {
        self.fields.borrow()[index].clone()
    }

    pub fn set_field(&self, index: usize, value: Value) {
        self.fields.borrow_mut()[index] = value;
    }

    pub fn with_foreign<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.foreign_data.borrow().as_ref().and_then(|b| b.downcast_ref::<T>()).map(f)
    }

    pub fn with_foreign_mut<T: 'static, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.foreign_data.borrow_mut().as_mut().and_then(|b| b.downcast_mut::<T>()).map(f)
    }

    pub fn set_foreign<T: 'static>(&self, data: T) {
        *self.foreign_data.borrow_mut() = Some(Box::new(data));
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Instance({})", self.klass.name)
    }
}
