//! Expression compilation (`spec.md` §4.3, operator fallback rules).

use crate::ast::{BinaryOp, Expr, Loc, UnaryOp};
use crate::chunk::OpCode;
use crate::error::CompilerError;
use crate::signature::{call_signature, setter_signature, subscript_getter_signature, subscript_setter_signature};
use crate::value::Value;

use super::Compiler;

impl Compiler {
    pub(super) fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompilerError> {
        match expr {
            Expr::NumberLiteral(n, _, loc) => self.emit_constant(Value::Number(*n), *loc),
            Expr::StringLiteral(s, loc) => self.emit_constant(Value::string(s.as_str()), *loc),
            Expr::BooleanLiteral(b, loc) => {
                self.emit_op(if *b { OpCode::True_ } else { OpCode::False_ }, *loc);
                Ok(())
            }
            Expr::NothingLiteral(loc) => {
                self.emit_op(OpCode::Nothing, *loc);
                Ok(())
            }
            Expr::Identifier(name, loc) => self.compile_identifier_get(name, *loc),
            Expr::Field(name, loc) => self.compile_field_get(name, *loc),
            Expr::StaticField(name, loc) => self.emit_named(OpCode::GetStaticField, OpCode::GetStaticFieldLong, name, *loc),
            Expr::This(loc) => {
                if self.current_class.is_none() {
                    return Err(self.error(*loc, "Cannot use 'this' outside of a method."));
                }
                self.emit_op(OpCode::GetLocal, *loc);
                self.emit_u8(0, *loc);
                Ok(())
            }
            Expr::Super(loc) => Err(self.error(*loc, "'super' must be followed by a call or '.'.")),
            Expr::ListLiteral(items, loc) => {
                for item in items {
                    self.compile_expr(item)?;
                }
                self.emit_op(OpCode::List, *loc);
                self.emit_u8(items.len() as u8, *loc);
                Ok(())
            }
            Expr::MapLiteral(entries, loc) => {
                for (k, v) in entries {
                    self.compile_expr(k)?;
                    self.compile_expr(v)?;
                }
                self.emit_op(OpCode::Map, *loc);
                self.emit_u8(entries.len() as u8, *loc);
                Ok(())
            }
            Expr::Grouping(inner) => self.compile_expr(inner),
            Expr::Unary { op, operand, loc } => self.compile_unary(*op, operand, *loc),
            Expr::Binary { op, left, right, loc } => self.compile_binary(*op, left, right, *loc),
            Expr::Logical { is_and, left, right, loc } => self.compile_logical(*is_and, left, right, *loc),
            Expr::Conditional { condition, then_expr, else_expr, loc } => self.compile_conditional(condition, then_expr, else_expr, *loc),
            Expr::Assign { target, value, loc } => self.compile_assign(target, value, *loc),
            Expr::CompoundAssign { target, op, value, loc } => self.compile_compound_assign(target, *op, value, *loc),
            Expr::PrefixIncDec { is_increment, target, loc } => self.compile_inc_dec(*is_increment, target, *loc, true),
            Expr::PostfixIncDec { is_increment, target, loc } => self.compile_inc_dec(*is_increment, target, *loc, false),
            Expr::Call { callee, args, loc } => self.compile_call(callee, args, *loc),
            Expr::Invoke { receiver, method, args, loc } => self.compile_invoke(receiver, method, args, *loc),
            Expr::InvokeSet { receiver, method, value, loc } => self.compile_invoke_set(receiver, method, value, *loc),
            Expr::SuperConstructor { args, loc } => self.compile_super_constructor(args, *loc),
            Expr::SuperInvoke { method, args, loc } => self.compile_super_invoke(method, args, *loc),
            Expr::SuperSet { method, value, loc } => self.compile_super_set(method, value, *loc),
            Expr::Subscript { receiver, args, loc } => self.compile_subscript(receiver, args, *loc),
            Expr::SubscriptSet { receiver, args, value, loc } => self.compile_subscript_set(receiver, args, value, *loc),
        }
    }

    fn compile_identifier_get(&mut self, name: &str, loc: Loc) -> Result<(), CompilerError> {
        if let Some(slot) = self.resolve_local(name) {
            self.emit_op(OpCode::GetLocal, loc);
            self.emit_u8(slot as u8, loc);
            return Ok(());
        }
        self.emit_named(OpCode::GetGlobal, OpCode::GetGlobalLong, name, loc)
    }

    fn compile_identifier_set(&mut self, name: &str, loc: Loc) -> Result<(), CompilerError> {
        if let Some(slot) = self.resolve_local(name) {
            self.emit_op(OpCode::SetLocal, loc);
            self.emit_u8(slot as u8, loc);
            return Ok(());
        }
        self.emit_named(OpCode::SetGlobal, OpCode::SetGlobalLong, name, loc)
    }

    fn compile_field_get(&mut self, name: &str, loc: Loc) -> Result<(), CompilerError> {
        let idx = self.resolve_field(name, loc)?;
        self.emit_op(OpCode::GetField, loc);
        self.emit_u8(idx as u8, loc);
        Ok(())
    }

    fn compile_field_set(&mut self, name: &str, loc: Loc) -> Result<(), CompilerError> {
        let idx = self.resolve_field(name, loc)?;
        self.emit_op(OpCode::SetField, loc);
        self.emit_u8(idx as u8, loc);
        Ok(())
    }

    /// `spec.md` §4.3: "field access inside a static method is a compile-time
    /// error"; fields are only meaningful inside an instance method/constructor.
    fn resolve_field(&self, name: &str, loc: Loc) -> Result<usize, CompilerError> {
        if self.is_static_method {
            return Err(self.error(loc, format!("Cannot access field '_{name}' inside a static method.")));
        }
        let class = self.current_class.as_ref().ok_or_else(|| self.error(loc, format!("Cannot access field '_{name}' outside of an instance method.")))?;
        class.field_indices.get(name).copied().ok_or_else(|| self.error(loc, format!("Unknown field '_{name}'.")))
    }

    fn compile_unary(&mut self, op: UnaryOp, operand: &Expr, loc: Loc) -> Result<(), CompilerError> {
        self.compile_expr(operand)?;
        let opcode = match op {
            UnaryOp::Negate => OpCode::Negate,
            UnaryOp::Not => OpCode::Not,
            UnaryOp::BitwiseNot => OpCode::BitwiseNot,
        };
        self.emit_op(opcode, loc);
        Ok(())
    }

    fn compile_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, loc: Loc) -> Result<(), CompilerError> {
        self.compile_expr(left)?;
        self.compile_expr(right)?;
        let opcode = match op {
            BinaryOp::Add => OpCode::Add,
            BinaryOp::Subtract => OpCode::Subtract,
            BinaryOp::Multiply => OpCode::Multiply,
            BinaryOp::Divide => OpCode::Divide,
            BinaryOp::Modulo => OpCode::Modulo,
            BinaryOp::Equal => OpCode::Equal,
            BinaryOp::NotEqual => OpCode::NotEqual,
            BinaryOp::Less => OpCode::Less,
            BinaryOp::LessEqual => OpCode::LessEqual,
            BinaryOp::Greater => OpCode::Greater,
            BinaryOp::GreaterEqual => OpCode::GreaterEqual,
            BinaryOp::BitwiseAnd => OpCode::BitwiseAnd,
            BinaryOp::BitwiseOr => OpCode::BitwiseOr,
            BinaryOp::BitwiseXor => OpCode::BitwiseXor,
            BinaryOp::ShiftLeft => OpCode::ShiftLeft,
            BinaryOp::ShiftRight => OpCode::ShiftRight,
            BinaryOp::RangeExclusive => OpCode::RangeExclusive,
            BinaryOp::RangeInclusive => OpCode::RangeInclusive,
            BinaryOp::Is => OpCode::Is_,
        };
        self.emit_op(opcode, loc);
        Ok(())
    }

    /// Short-circuit `and`/`or` (`spec.md` §4.3 "Operators").
    fn compile_logical(&mut self, is_and: bool, left: &Expr, right: &Expr, loc: Loc) -> Result<(), CompilerError> {
        self.compile_expr(left)?;
        let short_circuit_op = if is_and { OpCode::JumpIfFalse } else { OpCode::JumpIfTrue };
        let end_jump = self.emit_jump(short_circuit_op, loc);
        self.emit_op(OpCode::Pop, loc);
        self.compile_expr(right)?;
        self.patch_jump(end_jump, loc)
    }

    fn compile_conditional(&mut self, condition: &Expr, then_expr: &Expr, else_expr: &Expr, loc: Loc) -> Result<(), CompilerError> {
        self.compile_expr(condition)?;
        let else_jump = self.emit_jump(OpCode::JumpIfFalse, loc);
        self.emit_op(OpCode::Pop, loc);
        self.compile_expr(then_expr)?;
        let end_jump = self.emit_jump(OpCode::Jump, loc);
        self.patch_jump(else_jump, loc)?;
        self.emit_op(OpCode::Pop, loc);
        self.compile_expr(else_expr)?;
        self.patch_jump(end_jump, loc)
    }

    fn compile_assign(&mut self, target: &Expr, value: &Expr, loc: Loc) -> Result<(), CompilerError> {
        self.compile_expr(value)?;
        self.compile_assign_target(target, loc)
    }

    fn compile_assign_target(&mut self, target: &Expr, loc: Loc) -> Result<(), CompilerError> {
        match target {
            Expr::Identifier(name, _) => self.compile_identifier_set(name, loc),
            Expr::Field(name, _) => self.compile_field_set(name, loc),
            Expr::StaticField(name, _) => self.emit_named(OpCode::SetStaticField, OpCode::SetStaticFieldLong, name, loc),
            other => Err(self.error(other.loc(), "Invalid assignment target.")),
        }
    }

    fn compile_compound_assign(&mut self, target: &Expr, op: BinaryOp, value: &Expr, loc: Loc) -> Result<(), CompilerError> {
        self.compile_expr(target)?;
        self.compile_expr(value)?;
        self.compile_binary_op_only(op, loc);
        self.compile_assign_target(target, loc)
    }

    fn compile_binary_op_only(&mut self, op: BinaryOp, loc: Loc) {
        let opcode = match op {
            BinaryOp::Add => OpCode::Add,
            BinaryOp::Subtract => OpCode::Subtract,
            BinaryOp::Multiply => OpCode::Multiply,
            BinaryOp::Divide => OpCode::Divide,
            _ => OpCode::Add,
        };
        self.emit_op(opcode, loc);
    }

    /// Both prefix and postfix forms evaluate to the post-increment value;
    /// `spec.md` §4.2 documents the token but not a distinct postfix result,
    /// so both desugar the same way (`DESIGN.md` open question).
    fn compile_inc_dec(&mut self, is_increment: bool, target: &Expr, loc: Loc, _is_prefix: bool) -> Result<(), CompilerError> {
        self.compile_expr(target)?;
        self.emit_op(if is_increment { OpCode::Add1 } else { OpCode::Subtract1 }, loc);
        self.compile_assign_target(target, loc)?;
        Ok(())
    }

    fn compile_call(&mut self, callee: &Expr, args: &[Expr], loc: Loc) -> Result<(), CompilerError> {
        if let Expr::Identifier(name, id_loc) = callee {
            if self.resolve_local(name).is_none() && !self.is_known_global_or_forward(name) && self.current_class.is_some() {
                // Bare call inside a method with no matching local/global resolves
                // to an implicit `this.name(args)` invoke.
                self.emit_op(OpCode::GetLocal, *id_loc);
                self.emit_u8(0, *id_loc);
                for a in args {
                    self.compile_expr(a)?;
                }
                return self.emit_invoke(&call_signature(name, args.len()), args.len(), loc);
            }
        }
        self.compile_expr(callee)?;
        for a in args {
            self.compile_expr(a)?;
        }
        self.emit_op(OpCode::Call, loc);
        self.emit_u8(args.len() as u8, loc);
        Ok(())
    }

    fn is_known_global_or_forward(&self, name: &str) -> bool {
        self.top.borrow().known_globals.contains(name) || self.top.borrow().known_classes.contains(name)
    }

    fn emit_invoke(&mut self, signature: &str, arg_count: usize, loc: Loc) -> Result<(), CompilerError> {
        let idx = self.intern(Value::string(signature), loc)?;
        self.chunk.write_indexed(OpCode::Invoke, OpCode::InvokeLong, idx, loc.line, loc.script_id);
        self.emit_u8(arg_count as u8, loc);
        Ok(())
    }

    fn compile_invoke(&mut self, receiver: &Expr, method: &str, args: &[Expr], loc: Loc) -> Result<(), CompilerError> {
        self.compile_expr(receiver)?;
        for a in args {
            self.compile_expr(a)?;
        }
        self.emit_invoke(&call_signature(method, args.len()), args.len(), loc)
    }

    fn compile_invoke_set(&mut self, receiver: &Expr, method: &str, value: &Expr, loc: Loc) -> Result<(), CompilerError> {
        self.compile_expr(receiver)?;
        self.compile_expr(value)?;
        self.emit_invoke(&setter_signature(method), 1, loc)
    }

    fn compile_super_constructor(&mut self, args: &[Expr], loc: Loc) -> Result<(), CompilerError> {
        let superclass_name = self.require_superclass(loc)?;
        self.emit_op(OpCode::GetLocal, loc);
        self.emit_u8(0, loc);
        for a in args {
            self.compile_expr(a)?;
        }
        let idx = self.intern(Value::string(superclass_name), loc)?;
        self.emit_op(OpCode::SuperConstructor, loc);
        self.emit_u16(idx as u16, loc);
        self.emit_u8(args.len() as u8, loc);
        Ok(())
    }

    fn compile_super_invoke(&mut self, method: &str, args: &[Expr], loc: Loc) -> Result<(), CompilerError> {
        let superclass_name = self.require_superclass(loc)?;
        self.emit_op(OpCode::GetLocal, loc);
        self.emit_u8(0, loc);
        for a in args {
            self.compile_expr(a)?;
        }
        let name_idx = self.intern(Value::string(superclass_name), loc)?;
        let sig_idx = self.intern(Value::string(call_signature(method, args.len())), loc)?;
        self.emit_op(OpCode::SuperInvoke, loc);
        self.emit_u16(name_idx as u16, loc);
        self.emit_u16(sig_idx as u16, loc);
        self.emit_u8(args.len() as u8, loc);
        Ok(())
    }

    fn compile_super_set(&mut self, method: &str, value: &Expr, loc: Loc) -> Result<(), CompilerError> {
        let superclass_name = self.require_superclass(loc)?;
        self.emit_op(OpCode::GetLocal, loc);
        self.emit_u8(0, loc);
        self.compile_expr(value)?;
        let name_idx = self.intern(Value::string(superclass_name), loc)?;
        let sig_idx = self.intern(Value::string(setter_signature(method)), loc)?;
        self.emit_op(OpCode::SuperSetter, loc);
        self.emit_u16(name_idx as u16, loc);
        self.emit_u16(sig_idx as u16, loc);
        Ok(())
    }

    fn require_superclass(&self, loc: Loc) -> Result<String, CompilerError> {
        let class = self.current_class.as_ref().ok_or_else(|| self.error(loc, "'super' used outside of a subclass."))?;
        class.superclass.clone().ok_or_else(|| self.error(loc, "'super' used in a class with no superclass."))
    }

    fn compile_subscript(&mut self, receiver: &Expr, args: &[Expr], loc: Loc) -> Result<(), CompilerError> {
        self.compile_expr(receiver)?;
        for a in args {
            self.compile_expr(a)?;
        }
        self.emit_invoke(&subscript_getter_signature(args.len()), args.len(), loc)
    }

    fn compile_subscript_set(&mut self, receiver: &Expr, args: &[Expr], value: &Expr, loc: Loc) -> Result<(), CompilerError> {
        self.compile_expr(receiver)?;
        for a in args {
            self.compile_expr(a)?;
        }
        self.compile_expr(value)?;
        self.emit_invoke(&subscript_setter_signature(args.len()), args.len() + 1, loc)
    }
}
