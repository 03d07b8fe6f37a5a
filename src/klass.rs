//! Class runtime representation (`spec.md` §3 "Klass").

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;

use crate::function::Function;
use crate::value::{InstanceRef, KlassRef, Value};

/// Host callback invoked by `callClass` to attach a foreign class'
/// native storage to a freshly allocated instance (`spec.md` §4.4
/// "callClass").
pub type ForeignAllocate = Rc<dyn Fn(&InstanceRef, &[Value]) -> crate::error::VmResult<()>>;

pub struct Klass {
    pub name: String,
    pub is_foreign: bool,
    pub superclass: RefCell<Option<KlassRef>>,
    pub field_count: usize,
    pub first_field_index: usize,
    /// Signature → `Function` or `ForeignMethod` value.
    pub methods: RefCell<AHashMap<String, Value>>,
    pub static_methods: RefCell<AHashMap<String, Value>>,
    pub constructors: RefCell<AHashMap<usize, Rc<Function>>>,
    pub static_fields: RefCell<AHashMap<String, Value>>,
    /// Declared field names, outermost class' own fields last; debug-only.
    pub fields: Vec<String>,
    pub foreign_allocate: RefCell<Option<ForeignAllocate>>,
}

impl Klass {
    pub fn new(name: String, is_foreign: bool, first_field_index: usize, own_fields: Vec<String>) -> Klass {
        let field_count = first_field_index + own_fields.len();
        Klass {
            name,
            is_foreign,
            superclass: RefCell::new(None),
            field_count,
            first_field_index,
            methods: RefCell::new(AHashMap::new()),
            static_methods: RefCell::new(AHashMap::new()),
            constructors: RefCell::new(AHashMap::new()),
            static_fields: RefCell::new(AHashMap::new()),
            fields: own_fields,
            foreign_allocate: RefCell::new(None),
        }
    }

    pub fn find_method(&self, signature: &str) -> Option<Value> {
        self.methods.borrow().get(signature).cloned()
    }

    pub fn find_static_method(&self, signature: &str) -> Option<Value> {
        self.static_methods.borrow().get(signature).cloned()
    }

    pub fn find_constructor(&self, arity: usize) -> Option<Rc<Function>> {
        self.constructors.borrow().get(&arity).cloned()
    }

    pub fn get_static_field(&self, name: &str, nothing: &Value) -> Value {
        self.static_fields.borrow().get(name).cloned().unwrap_or_else(|| nothing.clone())
    }

    pub fn set_static_field(&self, name: &str, value: Value) {
        self.static_fields.borrow_mut().insert(name.to_string(), value);
    }

    /// `inherit` (`spec.md` §4.3): copies the superclass' methods into this
    /// class so dispatch is a single table lookup; static methods are
    /// copied only when the superclass is `Object`, constructors never are.
    pub fn inherit_from(&self, superclass: &KlassRef) {
        self.methods.borrow_mut().extend(superclass.methods.borrow().iter().map(|(k, v)| (k.clone(), v.clone())));
        if superclass.name == "Object" {
            self.static_methods.borrow_mut().extend(superclass.static_methods.borrow().iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        *self.superclass.borrow_mut() = Some(superclass.clone());
    }
}

impl std::fmt::Debug for Klass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Klass({})", self.name)
    }
}

/// A method value bound to a specific receiver, produced when a method is
/// referenced (not called) as a first-class value.
pub struct BoundMethod {
    pub receiver: Value,
    pub method: Value,
    pub signature: String,
}

impl BoundMethod {
    pub fn signature(&self) -> &str {
        &self.signature
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn foreign_method(class_name: &str, signature: &str) -> Value {
        Value::ForeignMethod(Rc::new(crate::value::ForeignMethod {
            class_name: class_name.to_string(),
            signature: signature.to_string(),
            arity: 0,
            is_static: false,
            callback: Box::new(|vm, _argc| Ok(vm.nothing())),
        }))
    }

    /// `spec.md` §8: `C.fieldCount == S.fieldCount + own_fields(C)` and
    /// `C.firstFieldIndex == S.fieldCount`.
    #[test]
    fn field_count_accumulates_across_inheritance() {
        let base = Klass::new("Base".into(), false, 0, vec!["a".into(), "b".into()]);
        assert_eq!(base.field_count, 2);
        assert_eq!(base.first_field_index, 0);

        let derived = Klass::new("Derived".into(), false, base.field_count, vec!["c".into()]);
        assert_eq!(derived.first_field_index, base.field_count);
        assert_eq!(derived.field_count, base.field_count + 1);
    }

    /// `inherit` copies the superclass' method table at the moment it runs;
    /// later mutation of the superclass table isn't retroactively visible.
    #[test]
    fn inherit_copies_methods_by_value_not_by_reference() {
        let base = Rc::new(Klass::new("Base".into(), false, 0, Vec::new()));
        base.methods.borrow_mut().insert("greet()".to_string(), foreign_method("Base", "greet()"));

        let derived = Klass::new("Derived".into(), false, 0, Vec::new());
        derived.inherit_from(&base);
        assert!(derived.find_method("greet()").is_some());

        base.methods.borrow_mut().insert("later()".to_string(), foreign_method("Base", "later()"));
        assert!(derived.find_method("later()").is_none());
    }

    #[test]
    fn inherit_from_object_also_copies_static_methods() {
        let object = Rc::new(Klass::new("Object".into(), false, 0, Vec::new()));
        object.static_methods.borrow_mut().insert("fromString(_)".to_string(), foreign_method("Object", "fromString(_)"));

        let number = Klass::new("Number".into(), true, 0, Vec::new());
        number.inherit_from(&object);
        assert!(number.find_static_method("fromString(_)").is_some());

        let other_base = Rc::new(Klass::new("Shape".into(), false, 0, Vec::new()));
        other_base.static_methods.borrow_mut().insert("unit()".to_string(), foreign_method("Shape", "unit()"));
        let square = Klass::new("Square".into(), false, 0, Vec::new());
        square.inherit_from(&other_base);
        assert!(square.find_static_method("unit()").is_none());
    }
}
