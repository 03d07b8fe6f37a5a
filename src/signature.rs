//! Canonical method signature strings (`spec.md` §4.2 "Signatures", §6
//! "Signature grammar").
//!
//! A signature is the sole lookup key for method dispatch (`spec.md` §4.4),
//! so the parser, compiler and VM must all agree on exactly this format.

/// Builds `"name()"`, `"name(_,_)"`, ... for a plain method call of the given
/// arity.
pub fn call_signature(name: &str, arity: usize) -> String {
    let mut sig = String::with_capacity(name.len() + arity * 2 + 2);
    sig.push_str(name);
    sig.push('(');
    for i in 0..arity {
        if i > 0 {
            sig.push(',');
        }
        sig.push('_');
    }
    sig.push(')');
    sig
}

/// Builds `"name=(_)"` for a setter.
pub fn setter_signature(name: &str) -> String {
    format!("{name}=(_)")
}

/// Builds `"[_,_]"` for a subscript getter of the given arity (number of
/// index arguments).
pub fn subscript_getter_signature(arity: usize) -> String {
    let mut sig = String::from("[");
    for i in 0..arity {
        if i > 0 {
            sig.push(',');
        }
        sig.push('_');
    }
    sig.push(']');
    sig
}

/// Builds `"[_,_]=(_)"` for a subscript setter; `arity` is the number of
/// index arguments (the assigned value is not counted).
pub fn subscript_setter_signature(arity: usize) -> String {
    format!("{}=(_)", subscript_getter_signature(arity))
}

/// A binary/unary operator signature, e.g. `+(_)`, `-(_)`, `==(_)`, the
/// prefix-unary `-()`/`!()` etc. Used by the compiler's operator fallback and
/// by foreign method tables.
pub fn operator_signature(op: &str, arity: usize) -> String {
    if arity == 0 {
        format!("{op}()")
    } else {
        call_signature(op, arity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_signatures() {
        assert_eq!(call_signature("foo", 0), "foo()");
        assert_eq!(call_signature("foo", 2), "foo(_,_)");
    }

    #[test]
    fn setter_and_subscript() {
        assert_eq!(setter_signature("x"), "x=(_)");
        assert_eq!(subscript_getter_signature(2), "[_,_]");
        assert_eq!(subscript_setter_signature(2), "[_,_]=(_)");
    }
}
