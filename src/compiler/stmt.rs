//! Statement compilation (`spec.md` §4.3 "Statements").

use crate::ast::{ClassDef, FunctionDef, Loc, Stmt};
use crate::chunk::OpCode;
use crate::error::CompilerError;

use super::{Compiler, FunctionType, LoopCtx};

impl Compiler {
    pub(super) fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompilerError> {
        match stmt {
            Stmt::Expression(e) => {
                self.compile_expr(e)?;
                self.emit_op(OpCode::Pop, e.loc());
                Ok(())
            }
            Stmt::VarDecl { name, initializer, loc } => self.compile_var_decl(name, initializer.as_ref(), *loc),
            Stmt::Block(stmts) => {
                let loc = stmts.first().map(body_loc).unwrap_or(Loc { line: 0, script_id: -1 });
                self.compile_block(stmts, loc)
            }
            Stmt::If { condition, then_branch, else_branch } => self.compile_if(condition, then_branch, else_branch.as_deref()),
            Stmt::While { condition, body } => self.compile_while(condition, body),
            Stmt::DoWhile { body, condition } => self.compile_do_while(body, condition),
            Stmt::For { init, condition, increment, body } => self.compile_for(init.as_deref(), condition.as_ref(), increment.as_ref(), body),
            Stmt::Foreach { variable, iterable, body, loc } => self.compile_foreach(variable, iterable, body, *loc),
            Stmt::Return { value, loc } => self.compile_return(value.as_ref(), *loc),
            Stmt::Exit { loc } => self.compile_exit(*loc),
            Stmt::Continue { loc } => self.compile_continue(*loc),
            Stmt::Breakpoint { loc } => {
                self.emit_op(OpCode::Breakpoint, *loc);
                Ok(())
            }
            Stmt::Assert { condition, message, loc } => {
                self.compile_expr(condition)?;
                self.compile_expr(message)?;
                self.emit_op(OpCode::Assert, *loc);
                self.emit_op(OpCode::Pop, *loc);
                Ok(())
            }
            Stmt::Switch { subject, cases, else_body } => self.compile_switch(subject, cases, else_body.as_deref()),
            Stmt::FunctionDecl(def) => self.compile_function_decl(def),
            Stmt::ClassDecl(def) => self.compile_class_decl(def),
        }
    }

    fn compile_var_decl(&mut self, name: &str, initializer: Option<&crate::ast::Expr>, loc: Loc) -> Result<(), CompilerError> {
        match initializer {
            Some(e) => self.compile_expr(e)?,
            None => self.emit_op(OpCode::Nothing, loc),
        }
        if self.scope_depth > 0 {
            self.declare_local(name, loc)?;
            self.mark_initialized();
            return Ok(());
        }
        if !self.top.borrow_mut().known_globals.insert(name.to_string()) {
            return Err(self.error(loc, format!("A global variable named '{name}' already exists.")));
        }
        self.emit_named(OpCode::DefineGlobal, OpCode::DefineGlobalLong, name, loc)
    }

    fn compile_block(&mut self, stmts: &[Stmt], loc: Loc) -> Result<(), CompilerError> {
        self.begin_scope();
        for s in stmts {
            self.compile_stmt(s)?;
        }
        self.end_scope(loc);
        Ok(())
    }

    fn compile_if(&mut self, condition: &crate::ast::Expr, then_branch: &Stmt, else_branch: Option<&Stmt>) -> Result<(), CompilerError> {
        let loc = condition.loc();
        self.compile_expr(condition)?;
        let then_jump = self.emit_jump(OpCode::JumpIfFalse, loc);
        self.emit_op(OpCode::Pop, loc);
        self.compile_stmt(then_branch)?;
        let else_jump = self.emit_jump(OpCode::Jump, loc);
        self.patch_jump(then_jump, loc)?;
        self.emit_op(OpCode::Pop, loc);
        if let Some(else_branch) = else_branch {
            self.compile_stmt(else_branch)?;
        }
        self.patch_jump(else_jump, loc)
    }

    fn compile_while(&mut self, condition: &crate::ast::Expr, body: &Stmt) -> Result<(), CompilerError> {
        let loc = condition.loc();
        let loop_start = self.chunk_len();
        self.push_loop(loop_start);
        self.compile_expr(condition)?;
        let exit_jump = self.emit_jump(OpCode::JumpIfFalse, loc);
        self.emit_op(OpCode::Pop, loc);
        self.compile_stmt(body)?;
        self.emit_loop(loop_start, loc)?;
        self.patch_jump(exit_jump, loc)?;
        self.emit_op(OpCode::Pop, loc);
        self.pop_loop_and_patch_exits(loc)
    }

    fn compile_do_while(&mut self, body: &Stmt, condition: &crate::ast::Expr) -> Result<(), CompilerError> {
        let loc = condition.loc();
        let loop_start = self.chunk_len();
        self.push_loop(loop_start);
        self.compile_stmt(body)?;
        self.compile_expr(condition)?;
        let exit_jump = self.emit_jump(OpCode::JumpIfFalse, loc);
        self.emit_op(OpCode::Pop, loc);
        self.emit_loop(loop_start, loc)?;
        self.patch_jump(exit_jump, loc)?;
        self.emit_op(OpCode::Pop, loc);
        self.pop_loop_and_patch_exits(loc)
    }

    fn compile_for(&mut self, init: Option<&Stmt>, condition: Option<&crate::ast::Expr>, increment: Option<&crate::ast::Expr>, body: &Stmt) -> Result<(), CompilerError> {
        let loc = body_loc(body);
        self.begin_scope();
        if let Some(init) = init {
            self.compile_stmt(init)?;
        }
        let loop_start = self.chunk_len();
        self.push_loop(loop_start);
        let exit_jump = match condition {
            Some(cond) => {
                self.compile_expr(cond)?;
                let j = self.emit_jump(OpCode::JumpIfFalse, loc);
                self.emit_op(OpCode::Pop, loc);
                Some(j)
            }
            None => None,
        };
        self.compile_stmt(body)?;
        if let Some(incr) = increment {
            self.compile_expr(incr)?;
            self.emit_op(OpCode::Pop, loc);
        }
        self.emit_loop(loop_start, loc)?;
        if let Some(j) = exit_jump {
            self.patch_jump(j, loc)?;
            self.emit_op(OpCode::Pop, loc);
        }
        self.pop_loop_and_patch_exits(loc)?;
        self.end_scope(loc);
        Ok(())
    }

    /// `spec.md` §4.3 "foreach": lowers to `iterate`/`iteratorValue` calls
    /// against a hidden local holding the (once-evaluated) iterable.
    fn compile_foreach(&mut self, variable: &str, iterable: &crate::ast::Expr, body: &Stmt, loc: Loc) -> Result<(), CompilerError> {
        self.begin_scope();
        self.compile_expr(iterable)?;
        self.declare_local("@foreach_iterable", loc)?;
        self.mark_initialized();
        let iterable_slot = self.locals.len() - 1;

        // `iterate(_)` is seeded with `false` (`spec.md` §6 "List ...
        // iterate/iteratorValue"): every iterator's first call must be able
        // to distinguish "just started" from "a real previous index".
        self.emit_op(OpCode::False_, loc);
        self.declare_local("@foreach_iter", loc)?;
        self.mark_initialized();
        let iter_slot = self.locals.len() - 1;

        let loop_start = self.chunk_len();
        self.push_loop(loop_start);

        self.emit_op(OpCode::GetLocal, loc);
        self.emit_u8(iterable_slot as u8, loc);
        self.emit_op(OpCode::GetLocal, loc);
        self.emit_u8(iter_slot as u8, loc);
        self.emit_invoke_pub("iterate", 1, loc)?;
        self.emit_op(OpCode::SetLocal, loc);
        self.emit_u8(iter_slot as u8, loc);

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse, loc);
        self.emit_op(OpCode::Pop, loc);

        self.emit_op(OpCode::GetLocal, loc);
        self.emit_u8(iterable_slot as u8, loc);
        self.emit_op(OpCode::GetLocal, loc);
        self.emit_u8(iter_slot as u8, loc);
        self.emit_invoke_pub("iteratorValue", 1, loc)?;

        self.begin_scope();
        self.declare_local(variable, loc)?;
        self.mark_initialized();
        self.compile_stmt(body)?;
        self.end_scope(loc);

        self.emit_loop(loop_start, loc)?;
        self.patch_jump(exit_jump, loc)?;
        self.emit_op(OpCode::Pop, loc);
        self.pop_loop_and_patch_exits(loc)?;
        self.end_scope(loc);
        Ok(())
    }

    fn emit_invoke_pub(&mut self, name: &str, arity: usize, loc: Loc) -> Result<(), CompilerError> {
        let signature = crate::signature::call_signature(name, arity);
        let idx = self.intern(crate::value::Value::string(signature.as_str()), loc)?;
        self.chunk.write_indexed(OpCode::Invoke, OpCode::InvokeLong, idx, loc.line, loc.script_id);
        self.emit_u8(arity as u8, loc);
        Ok(())
    }

    fn compile_return(&mut self, value: Option<&crate::ast::Expr>, loc: Loc) -> Result<(), CompilerError> {
        if self.ftype == FunctionType::Constructor && value.is_some() {
            return Err(self.error(loc, "Cannot return a value from a constructor."));
        }
        match value {
            Some(e) => self.compile_expr(e)?,
            None if self.ftype == FunctionType::Constructor => {
                self.emit_op(OpCode::GetLocal, loc);
                self.emit_u8(0, loc);
            }
            None => self.emit_op(OpCode::Nothing, loc),
        }
        self.emit_op(OpCode::Return_, loc);
        Ok(())
    }

    fn compile_continue(&mut self, loc: Loc) -> Result<(), CompilerError> {
        let (start, depth) = {
            let ctx = self.loops.last().ok_or_else(|| self.error(loc, "Cannot use 'continue' outside of a loop."))?;
            (ctx.start, ctx.scope_depth)
        };
        self.emit_scope_unwind(depth, loc);
        self.emit_loop(start, loc)
    }

    /// `exit` (`spec.md` §4.3: "compile to jump/loop with offsets later
    /// patched using currentLoop's exitJump/start"): a forward jump recorded
    /// on the innermost loop, patched once that loop finishes compiling.
    fn compile_exit(&mut self, loc: Loc) -> Result<(), CompilerError> {
        let depth = self.loops.last().ok_or_else(|| self.error(loc, "Cannot use 'exit' outside of a loop."))?.scope_depth;
        self.emit_scope_unwind(depth, loc);
        let jump = self.emit_jump(OpCode::Jump, loc);
        self.loops.last_mut().unwrap().exit_jumps.push(jump);
        Ok(())
    }

    fn emit_scope_unwind(&mut self, target_depth: i32, loc: Loc) {
        let locals_to_drop = self.locals.iter().rev().take_while(|l| l.depth > target_depth).count();
        match locals_to_drop {
            0 => {}
            1 => self.emit_op(OpCode::Pop, loc),
            n => {
                self.emit_op(OpCode::PopN, loc);
                self.emit_u8(n as u8, loc);
            }
        }
    }

    fn compile_switch(&mut self, subject: &crate::ast::Expr, cases: &[crate::ast::SwitchCase], else_body: Option<&[Stmt]>) -> Result<(), CompilerError> {
        let loc = subject.loc();
        self.begin_scope();
        self.compile_expr(subject)?;
        self.declare_local("@switch_subject", loc)?;
        self.mark_initialized();
        let subject_slot = self.locals.len() - 1;

        let mut end_jumps = Vec::new();
        for case in cases {
            let mut value_checks = Vec::new();
            for value in &case.values {
                self.emit_op(OpCode::GetLocal, loc);
                self.emit_u8(subject_slot as u8, loc);
                self.compile_expr(value)?;
                self.emit_op(OpCode::Equal, loc);
                value_checks.push(self.emit_jump(OpCode::JumpIfTrue, loc));
                self.emit_op(OpCode::Pop, loc);
            }
            let skip_case = self.emit_jump(OpCode::Jump, loc);
            for j in value_checks {
                self.patch_jump(j, loc)?;
                self.emit_op(OpCode::Pop, loc);
            }
            self.compile_block(&case.body, loc)?;
            end_jumps.push(self.emit_jump(OpCode::Jump, loc));
            self.patch_jump(skip_case, loc)?;
        }
        if let Some(else_body) = else_body {
            self.compile_block(else_body, loc)?;
        }
        for j in end_jumps {
            self.patch_jump(j, loc)?;
        }
        self.end_scope(loc);
        Ok(())
    }

    fn compile_function_decl(&mut self, def: &FunctionDef) -> Result<(), CompilerError> {
        let arity = def.params.len();
        let param_names: Vec<String> = def.params.iter().map(|p| p.name.clone()).collect();
        let signature = crate::signature::call_signature(&def.name, arity);
        let mut child = self.child(def.name.clone(), arity, param_names, def.is_setter, signature, FunctionType::Function);
        for stmt in &def.body {
            child.compile_stmt(stmt)?;
        }
        let already_returns = matches!(def.body.last(), Some(Stmt::Return { .. }));
        let function = child.finish(def.loc, already_returns)?;
        self.emit_constant(crate::value::Value::Function(std::rc::Rc::new(function)), def.loc)?;

        if self.scope_depth > 0 {
            self.declare_local(&def.name, def.loc)?;
            self.mark_initialized();
            return Ok(());
        }
        if !self.top.borrow_mut().known_globals.insert(def.name.clone()) {
            return Err(self.error(def.loc, format!("A global function named '{}' already exists.", def.name)));
        }
        self.emit_named(OpCode::DefineGlobal, OpCode::DefineGlobalLong, &def.name, def.loc)
    }

    fn compile_class_decl(&mut self, def: &ClassDef) -> Result<(), CompilerError> {
        self.emit_class(def)
    }

    fn chunk_len(&self) -> usize {
        self.chunk.code.len()
    }

    fn push_loop(&mut self, start: usize) {
        self.loops.push(LoopCtx { start, scope_depth: self.scope_depth, exit_jumps: Vec::new() });
    }

    fn pop_loop_and_patch_exits(&mut self, loc: Loc) -> Result<(), CompilerError> {
        let ctx = self.loops.pop().expect("compiler bug: loop context missing");
        for j in ctx.exit_jumps {
            self.patch_jump(j, loc)?;
        }
        Ok(())
    }
}

fn body_loc(stmt: &Stmt) -> Loc {
    match stmt {
        Stmt::Expression(e) => e.loc(),
        Stmt::VarDecl { loc, .. }
        | Stmt::Foreach { loc, .. }
        | Stmt::Return { loc, .. }
        | Stmt::Exit { loc }
        | Stmt::Continue { loc }
        | Stmt::Breakpoint { loc }
        | Stmt::Assert { loc, .. } => *loc,
        Stmt::Block(stmts) => stmts.first().map(body_loc).unwrap_or(Loc { line: 0, script_id: -1 }),
        Stmt::If { condition, .. } => condition.loc(),
        Stmt::While { condition, .. } => condition.loc(),
        Stmt::DoWhile { condition, .. } => condition.loc(),
        Stmt::For { body, .. } => body_loc(body),
        Stmt::Switch { subject, .. } => subject.loc(),
        Stmt::FunctionDecl(def) => def.loc,
        Stmt::ClassDecl(def) => def.loc,
    }
}
