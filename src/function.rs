//! Compiled function/method/constructor bodies (`spec.md` §3 "Function").

use crate::chunk::Chunk;

pub struct Function {
    pub name: String,
    pub arity: usize,
    pub parameter_names: Vec<String>,
    pub is_setter: bool,
    /// Empty for the synthetic top-level function.
    pub signature: String,
    pub chunk: Chunk,
}

impl Function {
    pub fn new(name: String, arity: usize, parameter_names: Vec<String>, is_setter: bool, signature: String, chunk: Chunk) -> Function {
        Function { name, arity, parameter_names, is_setter, signature, chunk }
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<fn {}/{}>", self.name, self.arity)
    }
}

/// `spec.md` §3: "two functions compiled from identical sources must compare
/// equal" — signature, bytecode and constants determine identity, not the
/// heap address, so structurally identical closures dedupe in constant
/// pools and hash-based containers.
impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.signature == other.signature && self.chunk.code == other.chunk.code && self.chunk.constants == other.chunk.constants && self.parameter_names == other.parameter_names
    }
}

impl Eq for Function {}

impl std::hash::Hash for Function {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.signature.hash(state);
        self.chunk.code.hash(state);
        self.parameter_names.hash(state);
    }
}
