//! Token stream → AST (`spec.md` §4.2).
//!
//! Statements are recursive descent; expressions are a Pratt /
//! precedence-climbing parser driven by [`Precedence`] and the
//! prefix/infix dispatch in [`Parser::parse_precedence`].

use crate::ast::*;
use crate::error::ParserError;
use crate::token::{Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    Lowest,
    Assignment,
    Conditional,
    LogicalOr,
    LogicalXor,
    LogicalAnd,
    Equality,
    Is,
    Comparison,
    BitwiseOr,
    BitwiseXor,
    BitwiseAnd,
    BitwiseShift,
    Range,
    Term,
    Factor,
    Postfix,
    Unary,
    Call,
    Primary,
}

impl Precedence {
    fn one_lower(self) -> Precedence {
        use Precedence::*;
        match self {
            Lowest => Lowest,
            Assignment => Lowest,
            Conditional => Assignment,
            LogicalOr => Conditional,
            LogicalXor => LogicalOr,
            LogicalAnd => LogicalXor,
            Equality => LogicalAnd,
            Is => Equality,
            Comparison => Is,
            BitwiseOr => Comparison,
            BitwiseXor => BitwiseOr,
            BitwiseAnd => BitwiseXor,
            BitwiseShift => BitwiseAnd,
            Range => BitwiseShift,
            Term => Range,
            Factor => Term,
            Postfix => Factor,
            Unary => Postfix,
            Call => Unary,
            Primary => Call,
        }
    }
}

fn infix_precedence(kind: &TokenKind) -> Precedence {
    use Precedence::*;
    use TokenKind::*;
    match kind {
        Equal | PlusEqual | MinusEqual | StarEqual | SlashEqual => Assignment,
        If => Conditional,
        Or => LogicalOr,
        Xor => LogicalXor,
        And => LogicalAnd,
        EqualEqual | NotEqual => Equality,
        TokenKind::Is => Precedence::Is,
        Less | LessEqual | Greater | GreaterEqual => Comparison,
        Pipe => BitwiseOr,
        Caret => BitwiseXor,
        Ampersand => BitwiseAnd,
        ShiftLeft | ShiftRight => BitwiseShift,
        RangeExclusive | RangeInclusive => Range,
        Plus | Minus => Term,
        Star | Slash | Percent => Factor,
        PlusPlus | MinusMinus => Postfix,
        LeftParen | Dot | LeftBracket => Call,
        _ => Lowest,
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<ParserError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0, errors: Vec::new() }
    }

    pub fn parse(mut self) -> (Vec<Stmt>, Vec<ParserError>) {
        let mut stmts = Vec::new();
        self.skip_newlines();
        while !self.is_at_end() {
            match self.declaration() {
                Ok(stmt) => stmts.push(stmt),
                Err(()) => self.synchronise(),
            }
            self.skip_newlines();
        }
        (stmts, self.errors)
    }

    // ---- token stream helpers ----

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if !self.is_at_end() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek().is(kind)
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(&TokenKind::EndOfLine) {
            self.advance();
        }
    }

    fn consume(&mut self, kind: &TokenKind, message: &str) -> Result<Token, ()> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(message))
        }
    }

    fn error_here(&mut self, message: &str) {
        let tok = self.peek().clone();
        self.errors.push(ParserError { message: message.to_string(), line: tok.line, script_id: tok.script_id });
    }

    fn error(&mut self, message: &str) -> () {
        self.error_here(message)
    }

    fn loc(&self) -> Loc {
        let tok = self.peek();
        Loc { line: tok.line, script_id: tok.script_id }
    }

    fn end_statement(&mut self) {
        // Statements end at an EndOfLine, a `}`, or EOF; we don't require one
        // (so `if (c) then return x` on one physical line still closes the
        // enclosing statement without an explicit terminator).
        if self.check(&TokenKind::EndOfLine) {
            self.advance();
        }
    }

    /// Panic-mode recovery (`spec.md` §4.2, §7.2 and §9's Open Question:
    /// only `class`/`function` are guaranteed resync points, richer recovery
    /// is not mandatory). We additionally resync on `var` and `}` since they
    /// are cheap and don't change the documented minimum behaviour.
    fn synchronise(&mut self) {
        while !self.is_at_end() {
            if matches!(self.previous().kind, TokenKind::EndOfLine) {
                return;
            }
            match self.peek_kind() {
                TokenKind::Class | TokenKind::Function | TokenKind::Var | TokenKind::RightBrace => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ---- declarations / statements ----

    fn declaration(&mut self) -> Result<Stmt, ()> {
        if self.matches(&TokenKind::Var) {
            return self.var_declaration();
        }
        if self.check(&TokenKind::Foreign) || self.check(&TokenKind::Class) {
            return self.class_declaration();
        }
        if self.matches(&TokenKind::Function) {
            return self.function_declaration();
        }
        self.statement()
    }

    fn var_declaration(&mut self) -> Result<Stmt, ()> {
        let stmt = self.var_declaration_no_terminator()?;
        self.end_statement();
        Ok(stmt)
    }

    /// Used inside `for (var i = 0; ...)`, where the terminator is the
    /// explicit `;` consumed by the caller rather than an end-of-line.
    fn var_declaration_no_terminator(&mut self) -> Result<Stmt, ()> {
        let loc = self.loc();
        let name_tok = self.consume_identifier_like("Expected variable name")?;
        let initializer = if self.matches(&TokenKind::Equal) { Some(self.expression()?) } else { None };
        Ok(Stmt::VarDecl { name: name_tok, initializer, loc })
    }

    fn consume_identifier_like(&mut self, message: &str) -> Result<String, ()> {
        if matches!(self.peek_kind(), TokenKind::Identifier | TokenKind::UppercaseIdentifier) {
            Ok(self.advance().lexeme)
        } else {
            self.error(message);
            Err(())
        }
    }

    fn param_list(&mut self) -> Result<Vec<Param>, ()> {
        let mut params = Vec::new();
        self.consume(&TokenKind::LeftParen, "Expected '(' before parameters")?;
        if !self.check(&TokenKind::RightParen) {
            loop {
                let loc = self.loc();
                let name = self.consume_identifier_like("Expected parameter name")?;
                if params.len() >= 255 {
                    self.error("Cannot have more than 255 parameters");
                    return Err(());
                }
                params.push(Param { name, loc });
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenKind::RightParen, "Expected ')' after parameters")?;
        Ok(params)
    }

    fn function_declaration(&mut self) -> Result<Stmt, ()> {
        let loc = self.loc();
        let name = self.consume_identifier_like("Expected function name")?;
        let params = self.param_list()?;
        let body = self.block_body()?;
        Ok(Stmt::FunctionDecl(FunctionDef { name, params, body, is_setter: false, loc }))
    }

    fn class_declaration(&mut self) -> Result<Stmt, ()> {
        let loc = self.loc();
        let is_foreign = self.matches(&TokenKind::Foreign);
        self.consume(&TokenKind::Class, "Expected 'class'")?;
        let name = self.consume_identifier_like("Expected class name")?;
        let superclass = if self.matches(&TokenKind::Less) { Some(self.consume_identifier_like("Expected superclass name")?) } else { None };
        self.skip_newlines();
        self.consume(&TokenKind::LeftBrace, "Expected '{' before class body")?;
        self.skip_newlines();

        let mut methods = Vec::new();
        let mut constructors = Vec::new();
        let mut static_fields = Vec::new();

        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            if self.matches(&TokenKind::Constructor) {
                let cloc = self.loc();
                let params = self.param_list()?;
                let body = self.block_body()?;
                constructors.push(ConstructorDef { params, body, loc: cloc });
            } else {
                let is_static = self.matches(&TokenKind::Static);
                let is_method_foreign = self.matches(&TokenKind::Foreign);
                let method = self.method_declaration(is_static, is_method_foreign)?;
                methods.push(method);
            }
            self.skip_newlines();
        }
        self.consume(&TokenKind::RightBrace, "Expected '}' after class body")?;

        for m in &methods {
            if let MethodKind::Static = m.kind {
                // nothing extra; static fields are discovered lazily by the compiler
                // from `__name` tokens inside static methods, matching `debugFieldName`.
            }
        }
        let _ = &mut static_fields;

        Ok(Stmt::ClassDecl(ClassDef { name, is_foreign, superclass, methods, constructors, static_fields, loc }))
    }

    fn method_declaration(&mut self, is_static: bool, is_foreign: bool) -> Result<MethodDef, ()> {
        let loc = self.loc();
        let kind = if is_static { MethodKind::Static } else { MethodKind::Instance };

        if self.check(&TokenKind::LeftBracket) {
            // Subscript getter/setter: [a,b] { ... }  or  [a,b]=(v) { ... }
            self.advance();
            let mut params = Vec::new();
            if !self.check(&TokenKind::RightBracket) {
                loop {
                    let ploc = self.loc();
                    let name = self.consume_identifier_like("Expected subscript parameter name")?;
                    params.push(Param { name, loc: ploc });
                    if !self.matches(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.consume(&TokenKind::RightBracket, "Expected ']'")?;
            let is_setter = self.matches(&TokenKind::Equal);
            if is_setter {
                self.consume(&TokenKind::LeftParen, "Expected '(' after '=' in subscript setter")?;
                let vloc = self.loc();
                let vname = self.consume_identifier_like("Expected setter value parameter")?;
                params.push(Param { name: vname, loc: vloc });
                self.consume(&TokenKind::RightParen, "Expected ')'")?;
            }
            let body = if is_foreign { self.foreign_method_end()? } else { self.block_body()? };
            return Ok(MethodDef {
                kind,
                def: FunctionDef { name: "[]".to_string(), params, body, is_setter, loc },
                is_subscript: true,
                is_foreign,
            });
        }

        let name = self.consume_identifier_like("Expected method name")?;
        if self.matches(&TokenKind::Equal) {
            // setter: name=(value) { ... }
            self.consume(&TokenKind::LeftParen, "Expected '(' after '=' in setter")?;
            let vloc = self.loc();
            let vname = self.consume_identifier_like("Expected setter value parameter")?;
            self.consume(&TokenKind::RightParen, "Expected ')'")?;
            let body = if is_foreign { self.foreign_method_end()? } else { self.block_body()? };
            return Ok(MethodDef {
                kind,
                def: FunctionDef { name, params: vec![Param { name: vname, loc: vloc }], body, is_setter: true, loc },
                is_subscript: false,
                is_foreign,
            });
        }

        let params = if self.check(&TokenKind::LeftParen) { self.param_list()? } else { Vec::new() };
        let body = if is_foreign { self.foreign_method_end()? } else { self.block_body()? };
        Ok(MethodDef { kind, def: FunctionDef { name, params, body, is_setter: false, loc }, is_subscript: false, is_foreign })
    }

    /// Foreign methods have no body: just a signature terminated by a newline.
    fn foreign_method_end(&mut self) -> Result<Vec<Stmt>, ()> {
        self.end_statement();
        Ok(Vec::new())
    }

    fn block_body(&mut self) -> Result<Vec<Stmt>, ()> {
        self.skip_newlines();
        self.consume(&TokenKind::LeftBrace, "Expected '{'")?;
        let mut stmts = Vec::new();
        self.skip_newlines();
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            match self.declaration() {
                Ok(s) => stmts.push(s),
                Err(()) => self.synchronise(),
            }
            self.skip_newlines();
        }
        self.consume(&TokenKind::RightBrace, "Expected '}' after block")?;
        Ok(stmts)
    }

    fn statement(&mut self) -> Result<Stmt, ()> {
        if self.check(&TokenKind::LeftBrace) {
            return Ok(Stmt::Block(self.block_body()?));
        }
        if self.matches(&TokenKind::If) {
            return self.if_statement();
        }
        if self.matches(&TokenKind::While) {
            return self.while_statement();
        }
        if self.matches(&TokenKind::Do) {
            return self.do_while_statement();
        }
        if self.matches(&TokenKind::For) {
            return self.for_statement();
        }
        if self.matches(&TokenKind::Foreach) {
            return self.foreach_statement();
        }
        if self.matches(&TokenKind::Return) {
            return self.return_statement();
        }
        if self.matches(&TokenKind::Exit) {
            let loc = self.loc();
            self.end_statement();
            return Ok(Stmt::Exit { loc });
        }
        if self.matches(&TokenKind::Continue) {
            let loc = self.loc();
            self.end_statement();
            return Ok(Stmt::Continue { loc });
        }
        if self.matches(&TokenKind::Breakpoint) {
            let loc = self.loc();
            self.end_statement();
            return Ok(Stmt::Breakpoint { loc });
        }
        if self.matches(&TokenKind::Assert) {
            return self.assert_statement();
        }
        if self.matches(&TokenKind::Select) {
            return self.select_statement();
        }
        self.expression_statement()
    }

    fn then_clause_or_stmt(&mut self) -> Result<Stmt, ()> {
        // `if (cond) then stmt` or `if (cond) { block }`.
        self.matches(&TokenKind::Then);
        self.statement()
    }

    fn if_statement(&mut self) -> Result<Stmt, ()> {
        self.consume(&TokenKind::LeftParen, "Expected '(' after 'if'")?;
        let condition = self.expression()?;
        self.consume(&TokenKind::RightParen, "Expected ')' after condition")?;
        let then_branch = Box::new(self.then_clause_or_stmt()?);
        let else_branch = if self.peek_else() {
            self.consume_else();
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If { condition, then_branch, else_branch })
    }

    fn peek_else(&mut self) -> bool {
        let save = self.pos;
        self.skip_newlines();
        let found = self.check(&TokenKind::Else);
        if !found {
            self.pos = save;
        }
        found
    }

    fn consume_else(&mut self) {
        self.skip_newlines();
        self.advance();
    }

    fn while_statement(&mut self) -> Result<Stmt, ()> {
        self.consume(&TokenKind::LeftParen, "Expected '(' after 'while'")?;
        let condition = self.expression()?;
        self.consume(&TokenKind::RightParen, "Expected ')' after condition")?;
        let body = Box::new(self.then_clause_or_stmt()?);
        Ok(Stmt::While { condition, body })
    }

    fn do_while_statement(&mut self) -> Result<Stmt, ()> {
        let body = Box::new(self.statement()?);
        self.skip_newlines();
        self.consume(&TokenKind::While, "Expected 'while' after do-block")?;
        self.consume(&TokenKind::LeftParen, "Expected '(' after 'while'")?;
        let condition = self.expression()?;
        self.consume(&TokenKind::RightParen, "Expected ')' after condition")?;
        self.end_statement();
        Ok(Stmt::DoWhile { body, condition })
    }

    fn for_statement(&mut self) -> Result<Stmt, ()> {
        self.consume(&TokenKind::LeftParen, "Expected '(' after 'for'")?;
        let init = if self.matches(&TokenKind::Semicolon) {
            None
        } else if self.matches(&TokenKind::Var) {
            let decl = self.var_declaration_no_terminator()?;
            self.consume(&TokenKind::Semicolon, "Expected ';' after for-initializer")?;
            Some(Box::new(decl))
        } else {
            let e = self.expression()?;
            self.consume(&TokenKind::Semicolon, "Expected ';' after for-initializer")?;
            Some(Box::new(Stmt::Expression(e)))
        };
        let condition = if self.check(&TokenKind::Semicolon) { None } else { Some(self.expression()?) };
        self.consume(&TokenKind::Semicolon, "Expected ';' after for-condition")?;
        let increment = if self.check(&TokenKind::RightParen) { None } else { Some(self.expression()?) };
        self.consume(&TokenKind::RightParen, "Expected ')' after for-clauses")?;
        let body = Box::new(self.then_clause_or_stmt()?);
        Ok(Stmt::For { init, condition, increment, body })
    }

    fn foreach_statement(&mut self) -> Result<Stmt, ()> {
        let loc = self.loc();
        let variable = self.consume_identifier_like("Expected loop variable name")?;
        self.consume(&TokenKind::In, "Expected 'in' after foreach variable")?;
        let iterable = self.expression()?;
        let body = Box::new(self.then_clause_or_stmt()?);
        Ok(Stmt::Foreach { variable, iterable, body, loc })
    }

    fn return_statement(&mut self) -> Result<Stmt, ()> {
        let loc = self.loc();
        let value = if self.check(&TokenKind::EndOfLine) || self.check(&TokenKind::RightBrace) || self.is_at_end() {
            None
        } else {
            Some(self.expression()?)
        };
        self.end_statement();
        Ok(Stmt::Return { value, loc })
    }

    fn assert_statement(&mut self) -> Result<Stmt, ()> {
        let loc = self.loc();
        self.consume(&TokenKind::LeftParen, "Expected '(' after 'assert'")?;
        let condition = self.expression()?;
        self.consume(&TokenKind::Comma, "Expected ',' after assert condition")?;
        let message = self.expression()?;
        self.consume(&TokenKind::RightParen, "Expected ')' after assert arguments")?;
        self.end_statement();
        Ok(Stmt::Assert { condition, message, loc })
    }

    fn select_statement(&mut self) -> Result<Stmt, ()> {
        let subject = self.expression()?;
        self.skip_newlines();
        self.consume(&TokenKind::LeftBrace, "Expected '{' after select subject")?;
        self.skip_newlines();
        let mut cases = Vec::new();
        let mut else_body = None;
        while !self.check(&TokenKind::RightBrace) && !self.is_at_end() {
            if self.matches(&TokenKind::Case) {
                let mut values = vec![self.expression()?];
                while self.matches(&TokenKind::Comma) {
                    values.push(self.expression()?);
                }
                let body = self.block_body()?;
                cases.push(SwitchCase { values, body });
            } else if self.matches(&TokenKind::Else) {
                else_body = Some(self.block_body()?);
            } else {
                self.error("Expected 'case' or 'else' in select body");
                return Err(());
            }
            self.skip_newlines();
        }
        self.consume(&TokenKind::RightBrace, "Expected '}' after select body")?;
        Ok(Stmt::Switch { subject, cases, else_body })
    }

    fn expression_statement(&mut self) -> Result<Stmt, ()> {
        let expr = self.expression()?;
        self.end_statement();
        Ok(Stmt::Expression(expr))
    }

    // ---- expressions (Pratt) ----

    pub fn expression(&mut self) -> Result<Expr, ()> {
        self.parse_precedence(Precedence::Lowest)
    }

    fn parse_precedence(&mut self, precedence: Precedence) -> Result<Expr, ()> {
        let can_assign = precedence <= Precedence::Conditional;
        let mut expr = self.parse_prefix(can_assign)?;

        while precedence < infix_precedence(self.peek_kind()) {
            expr = self.parse_infix(expr, can_assign)?;
        }

        if can_assign && self.check(&TokenKind::Equal) {
            self.error("Invalid assignment target");
            return Err(());
        }
        Ok(expr)
    }

    fn parse_prefix(&mut self, can_assign: bool) -> Result<Expr, ()> {
        let tok = self.peek().clone();
        match &tok.kind {
            TokenKind::Number(v, is_int) => {
                self.advance();
                Ok(Expr::NumberLiteral(*v, *is_int, Loc { line: tok.line, script_id: tok.script_id }))
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Expr::StringLiteral(s.clone(), Loc { line: tok.line, script_id: tok.script_id }))
            }
            TokenKind::Boolean(b) => {
                self.advance();
                Ok(Expr::BooleanLiteral(*b, Loc { line: tok.line, script_id: tok.script_id }))
            }
            TokenKind::Nothing => {
                self.advance();
                Ok(Expr::NothingLiteral(Loc { line: tok.line, script_id: tok.script_id }))
            }
            TokenKind::This => {
                self.advance();
                Ok(Expr::This(Loc { line: tok.line, script_id: tok.script_id }))
            }
            TokenKind::Super => {
                self.advance();
                self.super_expr()
            }
            TokenKind::Identifier | TokenKind::UppercaseIdentifier => {
                self.advance();
                self.named_expr(tok.lexeme, Loc { line: tok.line, script_id: tok.script_id }, can_assign)
            }
            TokenKind::Field => {
                self.advance();
                let name = tok.lexeme.trim_start_matches('_').to_string();
                self.finish_field(Expr::Field(name, Loc { line: tok.line, script_id: tok.script_id }), can_assign)
            }
            TokenKind::StaticField => {
                self.advance();
                let name = tok.lexeme.trim_start_matches('_').to_string();
                self.finish_field(Expr::StaticField(name, Loc { line: tok.line, script_id: tok.script_id }), can_assign)
            }
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.expression()?;
                self.consume(&TokenKind::RightParen, "Expected ')' after expression")?;
                Ok(Expr::Grouping(Box::new(inner)))
            }
            TokenKind::LeftBracket => {
                self.advance();
                self.list_literal(Loc { line: tok.line, script_id: tok.script_id })
            }
            TokenKind::LeftBrace => {
                self.advance();
                self.map_literal(Loc { line: tok.line, script_id: tok.script_id })
            }
            TokenKind::Minus => {
                self.advance();
                let operand = self.parse_precedence(Precedence::Unary)?;
                Ok(Expr::Unary { op: UnaryOp::Negate, operand: Box::new(operand), loc: Loc { line: tok.line, script_id: tok.script_id } })
            }
            TokenKind::Not | TokenKind::Bang => {
                self.advance();
                let operand = self.parse_precedence(Precedence::Unary)?;
                Ok(Expr::Unary { op: UnaryOp::Not, operand: Box::new(operand), loc: Loc { line: tok.line, script_id: tok.script_id } })
            }
            TokenKind::Tilde => {
                self.advance();
                let operand = self.parse_precedence(Precedence::Unary)?;
                Ok(Expr::Unary { op: UnaryOp::BitwiseNot, operand: Box::new(operand), loc: Loc { line: tok.line, script_id: tok.script_id } })
            }
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                self.advance();
                let is_increment = matches!(tok.kind, TokenKind::PlusPlus);
                let target = self.parse_precedence(Precedence::Unary)?;
                Ok(Expr::PrefixIncDec { is_increment, target: Box::new(target), loc: Loc { line: tok.line, script_id: tok.script_id } })
            }
            other => {
                self.error(&format!("Unexpected token '{:?}' in expression", other));
                Err(())
            }
        }
    }

    fn super_expr(&mut self) -> Result<Expr, ()> {
        let loc = self.loc();
        if self.matches(&TokenKind::LeftParen) {
            let args = self.argument_list()?;
            return Ok(Expr::SuperConstructor { args, loc });
        }
        self.consume(&TokenKind::Dot, "Expected '.' after 'super'")?;
        let name = self.consume_identifier_like("Expected method name after 'super.'")?;
        if self.matches(&TokenKind::Equal) {
            let value = self.expression()?;
            return Ok(Expr::SuperSet { method: name, value: Box::new(value), loc });
        }
        let args = if self.check(&TokenKind::LeftParen) { self.advance(); self.argument_list()? } else { Vec::new() };
        Ok(Expr::SuperInvoke { method: name, args, loc })
    }

    fn finish_field(&mut self, field: Expr, can_assign: bool) -> Result<Expr, ()> {
        if can_assign && self.matches(&TokenKind::Equal) {
            let loc = field.loc();
            let value = self.expression()?;
            return Ok(Expr::Assign { target: Box::new(field), value: Box::new(value), loc });
        }
        if can_assign {
            if let Some(op) = self.compound_op() {
                let loc = field.loc();
                let value = self.expression()?;
                return Ok(Expr::CompoundAssign { target: Box::new(field), op, value: Box::new(value), loc });
            }
        }
        Ok(field)
    }

    fn compound_op(&mut self) -> Option<BinaryOp> {
        let op = match self.peek_kind() {
            TokenKind::PlusEqual => BinaryOp::Add,
            TokenKind::MinusEqual => BinaryOp::Subtract,
            TokenKind::StarEqual => BinaryOp::Multiply,
            TokenKind::SlashEqual => BinaryOp::Divide,
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn named_expr(&mut self, name: String, loc: Loc, can_assign: bool) -> Result<Expr, ()> {
        let base = Expr::Identifier(name, loc);
        if can_assign && self.check(&TokenKind::Equal) {
            self.advance();
            let value = self.expression()?;
            return Ok(Expr::Assign { target: Box::new(base), value: Box::new(value), loc });
        }
        if can_assign {
            if let Some(op) = self.compound_op() {
                let value = self.expression()?;
                return Ok(Expr::CompoundAssign { target: Box::new(base), op, value: Box::new(value), loc });
            }
        }
        Ok(base)
    }

    fn list_literal(&mut self, loc: Loc) -> Result<Expr, ()> {
        let mut items = Vec::new();
        self.skip_newlines();
        if !self.check(&TokenKind::RightBracket) {
            loop {
                self.skip_newlines();
                items.push(self.expression()?);
                self.skip_newlines();
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.skip_newlines();
        self.consume(&TokenKind::RightBracket, "Expected ']' after list elements")?;
        Ok(Expr::ListLiteral(items, loc))
    }

    fn map_literal(&mut self, loc: Loc) -> Result<Expr, ()> {
        let mut entries = Vec::new();
        self.skip_newlines();
        if !self.check(&TokenKind::RightBrace) {
            loop {
                self.skip_newlines();
                let key = self.expression()?;
                self.consume(&TokenKind::Colon, "Expected ':' after map key")?;
                let value = self.expression()?;
                entries.push((key, value));
                self.skip_newlines();
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.skip_newlines();
        self.consume(&TokenKind::RightBrace, "Expected '}' after map entries")?;
        Ok(Expr::MapLiteral(entries, loc))
    }

    fn argument_list(&mut self) -> Result<Vec<Expr>, ()> {
        let mut args = Vec::new();
        if !self.check(&TokenKind::RightParen) {
            loop {
                args.push(self.expression()?);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(&TokenKind::RightParen, "Expected ')' after arguments")?;
        Ok(args)
    }

    fn parse_infix(&mut self, left: Expr, can_assign: bool) -> Result<Expr, ()> {
        let tok = self.peek().clone();
        let loc = Loc { line: tok.line, script_id: tok.script_id };
        match &tok.kind {
            TokenKind::If => {
                // Conditional: `then_expr if cond_expr else else_expr`.
                self.advance();
                let condition = self.parse_precedence(Precedence::Conditional)?;
                self.consume(&TokenKind::Else, "Expected 'else' in conditional expression")?;
                let else_expr = self.parse_precedence(Precedence::Assignment)?;
                Ok(Expr::Conditional { condition: Box::new(condition), then_expr: Box::new(left), else_expr: Box::new(else_expr), loc })
            }
            TokenKind::And => {
                self.advance();
                let right = self.parse_precedence(Precedence::LogicalAnd)?;
                Ok(Expr::Logical { is_and: true, left: Box::new(left), right: Box::new(right), loc })
            }
            TokenKind::Or => {
                self.advance();
                let right = self.parse_precedence(Precedence::LogicalOr)?;
                Ok(Expr::Logical { is_and: false, left: Box::new(left), right: Box::new(right), loc })
            }
            TokenKind::Xor => {
                self.advance();
                let right = self.parse_precedence(Precedence::LogicalXor)?;
                Ok(Expr::Binary { op: BinaryOp::NotEqual, left: Box::new(left), right: Box::new(right), loc })
            }
            TokenKind::Is => {
                self.advance();
                let right = self.parse_precedence(Precedence::Is.one_lower())?;
                Ok(Expr::Binary { op: BinaryOp::Is, left: Box::new(left), right: Box::new(right), loc })
            }
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                self.advance();
                let is_increment = matches!(tok.kind, TokenKind::PlusPlus);
                Ok(Expr::PostfixIncDec { is_increment, target: Box::new(left), loc })
            }
            TokenKind::Dot => {
                self.advance();
                let name = self.consume_identifier_like("Expected property/method name after '.'")?;
                if self.check(&TokenKind::LeftParen) {
                    self.advance();
                    let args = self.argument_list()?;
                    return Ok(Expr::Invoke { receiver: Box::new(left), method: name, args, loc });
                }
                if can_assign && self.matches(&TokenKind::Equal) {
                    let value = self.expression()?;
                    return Ok(Expr::InvokeSet { receiver: Box::new(left), method: name, value: Box::new(value), loc });
                }
                Ok(Expr::Invoke { receiver: Box::new(left), method: name, args: Vec::new(), loc })
            }
            TokenKind::LeftParen => {
                self.advance();
                let args = self.argument_list()?;
                Ok(Expr::Call { callee: Box::new(left), args, loc })
            }
            TokenKind::LeftBracket => {
                self.advance();
                let mut args = Vec::new();
                if !self.check(&TokenKind::RightBracket) {
                    loop {
                        args.push(self.expression()?);
                        if !self.matches(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.consume(&TokenKind::RightBracket, "Expected ']' after subscript arguments")?;
                if can_assign && self.matches(&TokenKind::Equal) {
                    let value = self.expression()?;
                    return Ok(Expr::SubscriptSet { receiver: Box::new(left), args, value: Box::new(value), loc });
                }
                Ok(Expr::Subscript { receiver: Box::new(left), args, loc })
            }
            _ => self.binary_infix(left, loc),
        }
    }

    fn binary_infix(&mut self, left: Expr, loc: Loc) -> Result<Expr, ()> {
        let tok = self.advance();
        let prec = infix_precedence(&tok.kind);
        let op = match tok.kind {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Subtract,
            TokenKind::Star => BinaryOp::Multiply,
            TokenKind::Slash => BinaryOp::Divide,
            TokenKind::Percent => BinaryOp::Modulo,
            TokenKind::EqualEqual => BinaryOp::Equal,
            TokenKind::NotEqual => BinaryOp::NotEqual,
            TokenKind::Less => BinaryOp::Less,
            TokenKind::LessEqual => BinaryOp::LessEqual,
            TokenKind::Greater => BinaryOp::Greater,
            TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
            TokenKind::Pipe => BinaryOp::BitwiseOr,
            TokenKind::Caret => BinaryOp::BitwiseXor,
            TokenKind::Ampersand => BinaryOp::BitwiseAnd,
            TokenKind::ShiftLeft => BinaryOp::ShiftLeft,
            TokenKind::ShiftRight => BinaryOp::ShiftRight,
            TokenKind::RangeExclusive => BinaryOp::RangeExclusive,
            TokenKind::RangeInclusive => BinaryOp::RangeInclusive,
            other => {
                self.error(&format!("Unexpected infix token {other:?}"));
                return Err(());
            }
        };
        // Right-associative operators parse their RHS at `prec`; everything
        // here is left-associative, so RHS parses at `prec` (next token with
        // equal precedence won't loop back in, since the outer loop uses
        // strict `>`). Range/comparison/arithmetic are all left-associative.
        let right = self.parse_precedence(prec)?;
        Ok(Expr::Binary { op, left: Box::new(left), right: Box::new(right), loc })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse_ok(src: &str) -> Vec<Stmt> {
        let (tokens, lex_errors) = Lexer::new(src, 0).tokenize();
        assert!(lex_errors.is_empty(), "{lex_errors:?}");
        let (stmts, errors) = Parser::new(tokens).parse();
        assert!(errors.is_empty(), "{errors:?}");
        stmts
    }

    #[test]
    fn precedence_respects_arithmetic() {
        let stmts = parse_ok("1 + 2 * 3");
        match &stmts[0] {
            Stmt::Expression(Expr::Binary { op: BinaryOp::Add, right, .. }) => {
                assert!(matches!(**right, Expr::Binary { op: BinaryOp::Multiply, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn conditional_expression() {
        let stmts = parse_ok("1 if true else 2");
        assert!(matches!(stmts[0], Stmt::Expression(Expr::Conditional { .. })));
    }

    #[test]
    fn invalid_assignment_target_errors() {
        let (tokens, _) = Lexer::new("1 + 2 = 3", 0).tokenize();
        let (_, errors) = Parser::new(tokens).parse();
        assert!(!errors.is_empty());
    }

    #[test]
    fn class_with_constructor_and_getter() {
        let stmts = parse_ok("class A { constructor(x) { _x = x } x { _x } }");
        assert!(matches!(stmts[0], Stmt::ClassDecl(_)));
    }

    #[test]
    fn foreach_over_range() {
        let stmts = parse_ok("foreach i in 1...5 { }");
        assert!(matches!(stmts[0], Stmt::Foreach { .. }));
    }
}
