//! Class declaration compilation (`spec.md` §4.3 "Classes").
//!
//! Emission order: push the class (`class_`), optionally inherit, bind
//! static-field debug names, bind methods/foreign methods, bind
//! constructors, then define the global.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{ClassDef, ConstructorDef, Expr, MethodDef, MethodKind, Stmt};
use crate::chunk::OpCode;
use crate::error::CompilerError;
use crate::signature::{call_signature, setter_signature, subscript_getter_signature, subscript_setter_signature};
use crate::value::Value;

use super::{ClassContext, Compiler, FunctionType};

impl Compiler {
    pub(super) fn emit_class(&mut self, def: &ClassDef) -> Result<(), CompilerError> {
        if !self.top.borrow_mut().known_classes.insert(def.name.clone()) {
            return Err(self.error(def.loc, format!("A class named '{}' already exists.", def.name)));
        }

        let first_field_index = match &def.superclass {
            Some(super_name) => *self.top.borrow().class_field_counts.get(super_name).ok_or_else(|| self.error(def.loc, format!("Unknown superclass '{super_name}'.")))?,
            None => 0,
        };

        let own_fields = collect_own_fields(def);
        let field_count = first_field_index + own_fields.len();
        self.top.borrow_mut().class_field_counts.insert(def.name.clone(), field_count);

        let mut field_indices = HashMap::new();
        for (i, name) in own_fields.iter().enumerate() {
            field_indices.insert(name.clone(), first_field_index + i);
        }
        let class_ctx = Rc::new(ClassContext { name: def.name.clone(), field_indices, superclass: def.superclass.clone() });

        // 1. push the class value.
        let name_idx = self.intern(Value::string(def.name.as_str()), def.loc)?;
        self.emit_op(OpCode::Class_, def.loc);
        self.emit_u16(name_idx as u16, def.loc);
        self.emit_u8(if def.is_foreign { 1 } else { 0 }, def.loc);
        self.emit_u8(field_count as u8, def.loc);
        self.emit_u8(first_field_index as u8, def.loc);

        // 2. inherit.
        if let Some(super_name) = &def.superclass {
            self.emit_named(OpCode::GetGlobal, OpCode::GetGlobalLong, super_name, def.loc)?;
            self.emit_op(OpCode::Inherit, def.loc);
        }

        // 3. static field debug names (`spec.md` §4.4: `DebugFieldName`
        // is a no-op at runtime, only emitted in debug builds).
        if self.chunk.is_debug {
            for name in collect_static_field_names(def) {
                let idx = self.intern(Value::string(name.as_str()), def.loc)?;
                self.emit_op(OpCode::DebugFieldName, def.loc);
                self.emit_u16(idx as u16, def.loc);
                self.emit_u8(0, def.loc);
            }
        }

        // 4. methods.
        for method in &def.methods {
            self.emit_method(method, &class_ctx)?;
        }

        // 5. constructors.
        for ctor in &def.constructors {
            self.emit_constructor(ctor, &class_ctx)?;
        }

        // 6. define the global.
        if self.scope_depth > 0 {
            self.declare_local(&def.name, def.loc)?;
            self.mark_initialized();
            return Ok(());
        }
        if !self.top.borrow_mut().known_globals.insert(def.name.clone()) {
            return Err(self.error(def.loc, format!("A global variable named '{}' already exists.", def.name)));
        }
        self.emit_named(OpCode::DefineGlobal, OpCode::DefineGlobalLong, &def.name, def.loc)
    }

    fn emit_method(&mut self, method: &MethodDef, class_ctx: &Rc<ClassContext>) -> Result<(), CompilerError> {
        let is_static = matches!(method.kind, MethodKind::Static);
        let signature = method_signature(method);
        let arity = method.def.params.len();

        if method.is_foreign {
            let sig_idx = self.intern(Value::string(signature.as_str()), method.def.loc)?;
            self.emit_op(OpCode::ForeignMethod, method.def.loc);
            self.emit_u16(sig_idx as u16, method.def.loc);
            self.emit_u8(arity as u8, method.def.loc);
            self.emit_u8(if is_static { 1 } else { 0 }, method.def.loc);
            return Ok(());
        }

        let param_names: Vec<String> = method.def.params.iter().map(|p| p.name.clone()).collect();
        let mut child = self.child(method.def.name.clone(), arity, param_names, method.def.is_setter, signature.clone(), FunctionType::Method);
        child.current_class = Some(class_ctx.clone());
        child.is_static_method = is_static;
        for stmt in &method.def.body {
            child.compile_stmt(stmt)?;
        }
        let already_returns = matches!(method.def.body.last(), Some(Stmt::Return { .. }));
        let function = child.finish(method.def.loc, already_returns)?;
        self.emit_constant(Value::Function(Rc::new(function)), method.def.loc)?;

        let sig_idx = self.intern(Value::string(signature.as_str()), method.def.loc)?;
        self.emit_op(OpCode::Method, method.def.loc);
        self.emit_u16(sig_idx as u16, method.def.loc);
        self.emit_u8(if is_static { 1 } else { 0 }, method.def.loc);
        Ok(())
    }

    fn emit_constructor(&mut self, ctor: &ConstructorDef, class_ctx: &Rc<ClassContext>) -> Result<(), CompilerError> {
        let arity = ctor.params.len();
        let param_names: Vec<String> = ctor.params.iter().map(|p| p.name.clone()).collect();
        let mut child = self.child("constructor".to_string(), arity, param_names, false, String::new(), FunctionType::Constructor);
        child.current_class = Some(class_ctx.clone());
        child.is_static_method = false;
        for stmt in &ctor.body {
            child.compile_stmt(stmt)?;
        }
        let already_returns = matches!(ctor.body.last(), Some(Stmt::Return { .. }));
        let function = child.finish(ctor.loc, already_returns)?;
        self.emit_constant(Value::Function(Rc::new(function)), ctor.loc)?;
        self.emit_op(OpCode::Constructor, ctor.loc);
        self.emit_u8(arity as u8, ctor.loc);
        Ok(())
    }
}

fn method_signature(method: &MethodDef) -> String {
    if method.is_subscript {
        return if method.def.is_setter { subscript_setter_signature(method.def.params.len().saturating_sub(1)) } else { subscript_getter_signature(method.def.params.len()) };
    }
    if method.def.is_setter {
        return setter_signature(&method.def.name);
    }
    call_signature(&method.def.name, method.def.params.len())
}

/// Distinct `_name` field references across every constructor/method body,
/// in first-appearance order (`spec.md` §4.3 "Field indices").
fn collect_own_fields(def: &ClassDef) -> Vec<String> {
    let mut seen = Vec::new();
    for ctor in &def.constructors {
        for stmt in &ctor.body {
            walk_stmt_fields(stmt, &mut seen);
        }
    }
    for method in &def.methods {
        for stmt in &method.def.body {
            walk_stmt_fields(stmt, &mut seen);
        }
    }
    seen
}

fn collect_static_field_names(def: &ClassDef) -> Vec<String> {
    let mut seen = Vec::new();
    for ctor in &def.constructors {
        for stmt in &ctor.body {
            walk_stmt_static_fields(stmt, &mut seen);
        }
    }
    for method in &def.methods {
        for stmt in &method.def.body {
            walk_stmt_static_fields(stmt, &mut seen);
        }
    }
    seen
}

fn push_unique(seen: &mut Vec<String>, name: &str) {
    if !seen.iter().any(|s| s == name) {
        seen.push(name.to_string());
    }
}

/// A field belongs to a class's schema once something assigns to it;
/// reading `_name` before anything ever wrote it is a compile error
/// (`spec.md` §8 scenario 8), not an implicit declaration.
fn walk_stmt_fields(stmt: &Stmt, seen: &mut Vec<String>) {
    walk_stmt(stmt, seen, &mut |e, seen| {
        let target = match e {
            Expr::Assign { target, .. } => Some(target.as_ref()),
            Expr::CompoundAssign { target, .. } => Some(target.as_ref()),
            Expr::PrefixIncDec { target, .. } | Expr::PostfixIncDec { target, .. } => Some(target.as_ref()),
            _ => None,
        };
        if let Some(Expr::Field(name, _)) = target {
            push_unique(seen, name);
        }
    });
}

fn walk_stmt_static_fields(stmt: &Stmt, seen: &mut Vec<String>) {
    walk_stmt(stmt, seen, &mut |e, seen| {
        if let Expr::StaticField(name, _) = e {
            push_unique(seen, name);
        }
    });
}

/// Generic recursive walk over every `Expr` reachable from `stmt`,
/// including nested statement bodies (blocks, loops, branches) but not
/// descending into nested function/class declarations, which compile with
/// their own field tables.
fn walk_stmt(stmt: &Stmt, seen: &mut Vec<String>, visit: &mut impl FnMut(&Expr, &mut Vec<String>)) {
    match stmt {
        Stmt::Expression(e) => walk_expr(e, seen, visit),
        Stmt::VarDecl { initializer, .. } => {
            if let Some(e) = initializer {
                walk_expr(e, seen, visit);
            }
        }
        Stmt::Block(stmts) => {
            for s in stmts {
                walk_stmt(s, seen, visit);
            }
        }
        Stmt::If { condition, then_branch, else_branch } => {
            walk_expr(condition, seen, visit);
            walk_stmt(then_branch, seen, visit);
            if let Some(e) = else_branch {
                walk_stmt(e, seen, visit);
            }
        }
        Stmt::While { condition, body } => {
            walk_expr(condition, seen, visit);
            walk_stmt(body, seen, visit);
        }
        Stmt::DoWhile { body, condition } => {
            walk_stmt(body, seen, visit);
            walk_expr(condition, seen, visit);
        }
        Stmt::For { init, condition, increment, body } => {
            if let Some(s) = init {
                walk_stmt(s, seen, visit);
            }
            if let Some(e) = condition {
                walk_expr(e, seen, visit);
            }
            if let Some(e) = increment {
                walk_expr(e, seen, visit);
            }
            walk_stmt(body, seen, visit);
        }
        Stmt::Foreach { iterable, body, .. } => {
            walk_expr(iterable, seen, visit);
            walk_stmt(body, seen, visit);
        }
        Stmt::Return { value, .. } => {
            if let Some(e) = value {
                walk_expr(e, seen, visit);
            }
        }
        Stmt::Exit { .. } | Stmt::Continue { .. } | Stmt::Breakpoint { .. } => {}
        Stmt::Assert { condition, message, .. } => {
            walk_expr(condition, seen, visit);
            walk_expr(message, seen, visit);
        }
        Stmt::Switch { subject, cases, else_body } => {
            walk_expr(subject, seen, visit);
            for case in cases {
                for v in &case.values {
                    walk_expr(v, seen, visit);
                }
                for s in &case.body {
                    walk_stmt(s, seen, visit);
                }
            }
            if let Some(stmts) = else_body {
                for s in stmts {
                    walk_stmt(s, seen, visit);
                }
            }
        }
        Stmt::FunctionDecl(_) | Stmt::ClassDecl(_) => {}
    }
}

fn walk_expr(expr: &Expr, seen: &mut Vec<String>, visit: &mut impl FnMut(&Expr, &mut Vec<String>)) {
    visit(expr, seen);
    match expr {
        Expr::NumberLiteral(..) | Expr::StringLiteral(..) | Expr::BooleanLiteral(..) | Expr::NothingLiteral(..) | Expr::Identifier(..) | Expr::Field(..) | Expr::StaticField(..) | Expr::This(..) | Expr::Super(..) => {}
        Expr::ListLiteral(items, _) => {
            for i in items {
                walk_expr(i, seen, visit);
            }
        }
        Expr::MapLiteral(entries, _) => {
            for (k, v) in entries {
                walk_expr(k, seen, visit);
                walk_expr(v, seen, visit);
            }
        }
        Expr::Grouping(inner) => walk_expr(inner, seen, visit),
        Expr::Unary { operand, .. } => walk_expr(operand, seen, visit),
        Expr::Binary { left, right, .. } => {
            walk_expr(left, seen, visit);
            walk_expr(right, seen, visit);
        }
        Expr::Logical { left, right, .. } => {
            walk_expr(left, seen, visit);
            walk_expr(right, seen, visit);
        }
        Expr::Conditional { condition, then_expr, else_expr, .. } => {
            walk_expr(condition, seen, visit);
            walk_expr(then_expr, seen, visit);
            walk_expr(else_expr, seen, visit);
        }
        Expr::Assign { target, value, .. } => {
            walk_expr(target, seen, visit);
            walk_expr(value, seen, visit);
        }
        Expr::CompoundAssign { target, value, .. } => {
            walk_expr(target, seen, visit);
            walk_expr(value, seen, visit);
        }
        Expr::PrefixIncDec { target, .. } | Expr::PostfixIncDec { target, .. } => walk_expr(target, seen, visit),
        Expr::Call { callee, args, .. } => {
            walk_expr(callee, seen, visit);
            for a in args {
                walk_expr(a, seen, visit);
            }
        }
        Expr::Invoke { receiver, args, .. } => {
            walk_expr(receiver, seen, visit);
            for a in args {
                walk_expr(a, seen, visit);
            }
        }
        Expr::InvokeSet { receiver, value, .. } => {
            walk_expr(receiver, seen, visit);
            walk_expr(value, seen, visit);
        }
        Expr::SuperConstructor { args, .. } | Expr::SuperInvoke { args, .. } => {
            for a in args {
                walk_expr(a, seen, visit);
            }
        }
        Expr::SuperSet { value, .. } => walk_expr(value, seen, visit),
        Expr::Subscript { receiver, args, .. } => {
            walk_expr(receiver, seen, visit);
            for a in args {
                walk_expr(a, seen, visit);
            }
        }
        Expr::SubscriptSet { receiver, args, value, .. } => {
            walk_expr(receiver, seen, visit);
            for a in args {
                walk_expr(a, seen, visit);
            }
            walk_expr(value, seen, visit);
        }
    }
}
