use crate::error::ParseError;
use crate::lexer::{Token, TokenKind};
use crate::parser::ast::*;

pub mod ast;

/// Hand-written recursive-descent parser with precedence climbing for
/// expressions. `package`/`import` declarations, annotations and `enum`
/// bodies are consumed and discarded.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

#[derive(Default)]
struct Modifiers {
    is_static: bool,
    is_final: bool,
    is_abstract: bool,
    is_default: bool,
    is_native: bool,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn parse(mut self) -> Result<Program, ParseError> {
        let mut declarations = Vec::new();
        loop {
            self.skip_annotations()?;
            match self.kind() {
                TokenKind::Eof => break,
                TokenKind::Semicolon => {
                    self.advance();
                }
                TokenKind::Package | TokenKind::Import => self.skip_until_semicolon(),
                _ => {
                    let mods = self.collect_modifiers();
                    match self.kind() {
                        TokenKind::Class => {
                            declarations.push(TypeDecl::Class(self.parse_class(&mods)?));
                        }
                        TokenKind::Interface => {
                            declarations.push(TypeDecl::Interface(self.parse_interface()?));
                        }
                        TokenKind::Enum => self.skip_enum()?,
                        _ => {
                            return Err(self.error("expected class or interface declaration"));
                        }
                    }
                }
            }
        }
        Ok(Program { declarations })
    }

    // ---- cursor helpers ----

    fn peek(&self) -> &Token {
        // the token vector always ends with EOF
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| self.tokens.last().expect("token stream has EOF"))
    }

    fn peek_ahead(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .unwrap_or_else(|| self.tokens.last().expect("token stream has EOF"))
    }

    fn kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(&format!("expected {}, found '{}'", what, self.peek().text)))
        }
    }

    fn error(&self, message: &str) -> ParseError {
        let token = self.peek();
        ParseError::new(message, token.line, token.column)
    }

    fn line(&self) -> u32 {
        self.peek().line
    }

    // ---- discarded syntax ----

    fn skip_until_semicolon(&mut self) {
        while !self.check(TokenKind::Semicolon) && !self.check(TokenKind::Eof) {
            self.advance();
        }
        self.eat(TokenKind::Semicolon);
    }

    fn skip_annotations(&mut self) -> Result<(), ParseError> {
        while self.check(TokenKind::At) {
            self.advance();
            self.expect(TokenKind::Identifier, "annotation name")?;
            while self.eat(TokenKind::Dot) {
                self.expect(TokenKind::Identifier, "annotation name")?;
            }
            if self.check(TokenKind::LParen) {
                self.skip_balanced(TokenKind::LParen, TokenKind::RParen);
            }
        }
        Ok(())
    }

    fn skip_balanced(&mut self, open: TokenKind, close: TokenKind) {
        let mut depth = 0usize;
        loop {
            let kind = self.kind();
            if kind == TokenKind::Eof {
                return;
            }
            self.advance();
            if kind == open {
                depth += 1;
            } else if kind == close {
                depth -= 1;
                if depth == 0 {
                    return;
                }
            }
        }
    }

    fn skip_enum(&mut self) -> Result<(), ParseError> {
        self.expect(TokenKind::Enum, "enum")?;
        self.expect(TokenKind::Identifier, "enum name")?;
        while !self.check(TokenKind::LBrace) && !self.check(TokenKind::Eof) {
            self.advance();
        }
        self.skip_balanced(TokenKind::LBrace, TokenKind::RBrace);
        Ok(())
    }

    fn collect_modifiers(&mut self) -> Modifiers {
        let mut mods = Modifiers::default();
        while self.kind().is_modifier() {
            match self.kind() {
                TokenKind::Static => mods.is_static = true,
                TokenKind::Final => mods.is_final = true,
                TokenKind::Abstract => mods.is_abstract = true,
                TokenKind::Default => mods.is_default = true,
                TokenKind::Native => mods.is_native = true,
                _ => {}
            }
            self.advance();
        }
        mods
    }

    // ---- declarations ----

    fn parse_class(&mut self, mods: &Modifiers) -> Result<ClassDecl, ParseError> {
        let line = self.line();
        self.expect(TokenKind::Class, "'class'")?;
        let name = self.expect(TokenKind::Identifier, "class name")?.text;
        self.skip_generic_params();

        let super_class = if self.eat(TokenKind::Extends) {
            Some(self.parse_type()?.name)
        } else {
            None
        };
        let mut interfaces = Vec::new();
        if self.eat(TokenKind::Implements) {
            loop {
                interfaces.push(self.parse_type()?.name);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(TokenKind::LBrace, "'{'")?;
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            self.parse_member(&name, &mut fields, &mut methods)?;
        }
        self.expect(TokenKind::RBrace, "'}'")?;

        Ok(ClassDecl {
            name,
            super_class,
            interfaces,
            fields,
            methods,
            is_abstract: mods.is_abstract,
            line,
        })
    }

    fn parse_interface(&mut self) -> Result<InterfaceDecl, ParseError> {
        let line = self.line();
        self.expect(TokenKind::Interface, "'interface'")?;
        let name = self.expect(TokenKind::Identifier, "interface name")?.text;
        self.skip_generic_params();

        let mut extends = Vec::new();
        if self.eat(TokenKind::Extends) {
            loop {
                extends.push(self.parse_type()?.name);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(TokenKind::LBrace, "'{'")?;
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            self.parse_member(&name, &mut fields, &mut methods)?;
        }
        self.expect(TokenKind::RBrace, "'}'")?;

        Ok(InterfaceDecl {
            name,
            extends,
            fields,
            methods,
            line,
        })
    }

    fn parse_member(
        &mut self,
        enclosing: &str,
        fields: &mut Vec<FieldDecl>,
        methods: &mut Vec<MethodDecl>,
    ) -> Result<(), ParseError> {
        self.skip_annotations()?;
        if self.eat(TokenKind::Semicolon) {
            return Ok(());
        }
        let mods = self.collect_modifiers();
        let line = self.line();

        if self.check(TokenKind::Enum) {
            self.skip_enum()?;
            return Ok(());
        }

        // a constructor is the enclosing class name followed by '('
        if self.check(TokenKind::Identifier)
            && self.peek().text == enclosing
            && self.peek_ahead(1).kind == TokenKind::LParen
        {
            let name = self.advance().text;
            let params = self.parse_params()?;
            self.skip_throws()?;
            let body = self.parse_block()?;
            methods.push(MethodDecl {
                name,
                params,
                return_type: TypeNode::simple("void"),
                body: Some(body),
                is_static: false,
                is_abstract: false,
                is_default: false,
                is_constructor: true,
                line,
            });
            return Ok(());
        }

        let ty = self.parse_type()?;
        let name = self.expect(TokenKind::Identifier, "member name")?.text;

        if self.check(TokenKind::LParen) {
            let params = self.parse_params()?;
            self.skip_throws()?;
            let body = if self.check(TokenKind::LBrace) {
                Some(self.parse_block()?)
            } else {
                self.expect(TokenKind::Semicolon, "';'")?;
                None
            };
            let is_abstract = mods.is_abstract || (body.is_none() && !mods.is_native);
            methods.push(MethodDecl {
                name,
                params,
                return_type: ty,
                body,
                is_static: mods.is_static,
                is_abstract,
                is_default: mods.is_default,
                is_constructor: false,
                line,
            });
            return Ok(());
        }

        // field declaration list
        let mut field_name = name;
        loop {
            let init = if self.eat(TokenKind::Assign) {
                Some(self.parse_initialiser()?)
            } else {
                None
            };
            fields.push(FieldDecl {
                name: field_name,
                ty: ty.clone(),
                init,
                is_static: mods.is_static,
                is_final: mods.is_final,
                line,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
            field_name = self.expect(TokenKind::Identifier, "field name")?.text;
        }
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(())
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                self.skip_annotations()?;
                self.eat(TokenKind::Final);
                let ty = self.parse_type()?;
                let name = self.expect(TokenKind::Identifier, "parameter name")?.text;
                params.push(Param { name, ty });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(params)
    }

    fn skip_throws(&mut self) -> Result<(), ParseError> {
        if self.eat(TokenKind::Throws) {
            loop {
                self.parse_type()?;
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        Ok(())
    }

    fn skip_generic_params(&mut self) {
        if self.check(TokenKind::Lt) {
            self.skip_balanced(TokenKind::Lt, TokenKind::Gt);
        }
    }

    // ---- types ----

    fn parse_type(&mut self) -> Result<TypeNode, ParseError> {
        let name = match self.kind() {
            k if k.is_primitive_type() => self.advance().text,
            TokenKind::Identifier => self.advance().text,
            TokenKind::Question => {
                self.advance();
                // bounded wildcards collapse to '?'
                if self.eat(TokenKind::Extends) || self.eat(TokenKind::Super) {
                    self.parse_type()?;
                }
                return Ok(TypeNode::simple("?"));
            }
            _ => return Err(self.error("expected type name")),
        };

        let mut args = Vec::new();
        if self.check(TokenKind::Lt) {
            self.advance();
            if !self.check(TokenKind::Gt) {
                loop {
                    args.push(self.parse_type()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::Gt, "'>'")?;
        }

        let mut dims = 0u8;
        while self.check(TokenKind::LBracket) && self.peek_ahead(1).kind == TokenKind::RBracket {
            self.advance();
            self.advance();
            dims += 1;
        }

        Ok(TypeNode { name, args, dims })
    }

    // ---- statements ----

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            statements.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        self.skip_annotations()?;
        let line = self.line();
        if self.check(TokenKind::Identifier) && self.looks_like_var_decl() {
            return self.parse_var_decl();
        }
        match self.kind() {
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::Semicolon => {
                self.advance();
                Ok(Stmt::Block(Vec::new()))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Return => {
                self.advance();
                let value = if self.check(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Return { value, line })
            }
            TokenKind::Break => {
                self.advance();
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Break { line })
            }
            TokenKind::Continue => {
                self.advance();
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Continue { line })
            }
            TokenKind::Throw => {
                self.advance();
                let value = self.parse_expression()?;
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Throw { value, line })
            }
            TokenKind::Try => self.parse_try(),
            TokenKind::Synchronized => {
                self.advance();
                self.expect(TokenKind::LParen, "'('")?;
                // the lock expression is parsed then discarded
                self.parse_expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                let body = self.parse_block()?;
                Ok(Stmt::Synchronized { body, line })
            }
            TokenKind::Final => {
                self.advance();
                self.parse_var_decl()
            }
            k if k.is_primitive_type() => self.parse_var_decl(),
            _ => {
                let expr = self.parse_expression()?;
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Expr { expr, line })
            }
        }
    }

    /// Lookahead for `Type name (= | , | ;)` without consuming anything.
    fn looks_like_var_decl(&mut self) -> bool {
        let saved = self.pos;
        let ok = (|| {
            let ty = self.parse_type().ok()?;
            if ty.name == "?" {
                return None;
            }
            if !self.check(TokenKind::Identifier) {
                return None;
            }
            self.advance();
            matches!(
                self.kind(),
                TokenKind::Assign | TokenKind::Comma | TokenKind::Semicolon
            )
            .then_some(())
        })()
        .is_some();
        self.pos = saved;
        ok
    }

    /// Parses one declaration list; `int a = 1, b = 2;` lowers to a block
    /// of single declarations (slots are never reclaimed, so the scope is
    /// unaffected).
    fn parse_var_decl(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        let ty = self.parse_type()?;
        let mut decls = Vec::new();
        loop {
            let name = self.expect(TokenKind::Identifier, "variable name")?.text;
            // trailing dims: `int a[]`
            let mut var_ty = ty.clone();
            while self.check(TokenKind::LBracket) && self.peek_ahead(1).kind == TokenKind::RBracket
            {
                self.advance();
                self.advance();
                var_ty.dims += 1;
            }
            let init = if self.eat(TokenKind::Assign) {
                Some(self.parse_initialiser()?)
            } else {
                None
            };
            decls.push(Stmt::VarDecl {
                ty: var_ty,
                name,
                init,
                line,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Semicolon, "';'")?;
        if decls.len() == 1 {
            Ok(decls.pop().expect("one declaration"))
        } else {
            Ok(Stmt::Block(decls))
        }
    }

    fn parse_initialiser(&mut self) -> Result<Expr, ParseError> {
        if self.check(TokenKind::LBrace) {
            self.parse_array_literal()
        } else {
            self.parse_expression()
        }
    }

    fn parse_array_literal(&mut self) -> Result<Expr, ParseError> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut elements = Vec::new();
        if !self.check(TokenKind::RBrace) {
            loop {
                if self.check(TokenKind::LBrace) {
                    elements.push(self.parse_array_literal()?);
                } else {
                    elements.push(self.parse_expression()?);
                }
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Expr::ArrayLiteral(elements))
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.expect(TokenKind::If, "'if'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')'")?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.eat(TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
            line,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.expect(TokenKind::While, "'while'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')'")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::While { cond, body, line })
    }

    /// `do B while (c);` keeps its own node so break and continue bind
    /// to the loop.
    fn parse_do_while(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.expect(TokenKind::Do, "'do'")?;
        let body = Box::new(self.parse_statement()?);
        self.expect(TokenKind::While, "'while'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')'")?;
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(Stmt::DoWhile { body, cond, line })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.expect(TokenKind::For, "'for'")?;
        self.expect(TokenKind::LParen, "'('")?;

        // enhanced for: `Type name :` after the opening paren
        let saved = self.pos;
        if !self.check(TokenKind::Semicolon) {
            if let Ok(var_ty) = self.parse_type() {
                if self.check(TokenKind::Identifier)
                    && self.peek_ahead(1).kind == TokenKind::Colon
                {
                    let var_name = self.advance().text;
                    self.advance(); // ':'
                    let iterable = self.parse_expression()?;
                    self.expect(TokenKind::RParen, "')'")?;
                    let body = Box::new(self.parse_statement()?);
                    return Ok(Stmt::ForEach {
                        var_ty,
                        var_name,
                        iterable,
                        body,
                        line,
                    });
                }
            }
            self.pos = saved;
        }

        let init = if self.eat(TokenKind::Semicolon) {
            None
        } else if self.kind().is_primitive_type()
            || self.check(TokenKind::Final)
            || (self.check(TokenKind::Identifier) && self.looks_like_var_decl())
        {
            self.eat(TokenKind::Final);
            Some(Box::new(self.parse_var_decl()?))
        } else {
            let expr = self.parse_expression()?;
            let expr_line = line;
            self.expect(TokenKind::Semicolon, "';'")?;
            Some(Box::new(Stmt::Expr {
                expr,
                line: expr_line,
            }))
        };

        let cond = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::Semicolon, "';'")?;

        let update = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(TokenKind::RParen, "')'")?;

        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::For {
            init,
            cond,
            update,
            body,
            line,
        })
    }

    fn parse_try(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        self.expect(TokenKind::Try, "'try'")?;
        let body = self.parse_block()?;

        let mut catches = Vec::new();
        while self.check(TokenKind::Catch) {
            self.advance();
            self.expect(TokenKind::LParen, "'('")?;
            let ty = self.parse_type()?;
            // multi-catch `A | B e` keeps the first type
            while self.eat(TokenKind::Pipe) {
                self.parse_type()?;
            }
            let name = self.expect(TokenKind::Identifier, "exception name")?.text;
            self.expect(TokenKind::RParen, "')'")?;
            let catch_body = self.parse_block()?;
            catches.push(CatchClause {
                ty,
                name,
                body: catch_body,
            });
        }

        let finally = if self.eat(TokenKind::Finally) {
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(Stmt::Try {
            body,
            catches,
            finally,
            line,
        })
    }

    // ---- expressions, precedence low to high ----

    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        let target = self.parse_ternary()?;
        let op = match self.kind() {
            TokenKind::Assign => AssignOp::Assign,
            TokenKind::PlusAssign => AssignOp::Add,
            TokenKind::MinusAssign => AssignOp::Sub,
            TokenKind::StarAssign => AssignOp::Mul,
            TokenKind::SlashAssign => AssignOp::Div,
            _ => return Ok(target),
        };
        self.advance();
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn parse_ternary(&mut self) -> Result<Expr, ParseError> {
        let cond = self.parse_or()?;
        if self.eat(TokenKind::Question) {
            let then_value = self.parse_expression()?;
            self.expect(TokenKind::Colon, "':'")?;
            let else_value = self.parse_ternary()?;
            return Ok(Expr::Ternary {
                cond: Box::new(cond),
                then_value: Box::new(then_value),
                else_value: Box::new(else_value),
            });
        }
        Ok(cond)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.eat(TokenKind::OrOr) {
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_bit_or()?;
        while self.eat(TokenKind::AndAnd) {
            let right = self.parse_bit_or()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_bit_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_bit_and()?;
        while self.eat(TokenKind::Pipe) {
            let right = self.parse_bit_and()?;
            left = Expr::Binary {
                op: BinaryOp::BitOr,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_bit_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_equality()?;
        while self.eat(TokenKind::Amp) {
            let right = self.parse_equality()?;
            left = Expr::Binary {
                op: BinaryOp::BitAnd,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.kind() {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Ne,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.kind() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Ge => BinaryOp::Ge,
                TokenKind::Instanceof => {
                    self.advance();
                    let ty = self.parse_type()?;
                    left = Expr::InstanceOf {
                        expr: Box::new(left),
                        ty,
                    };
                    continue;
                }
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        match self.kind() {
            TokenKind::Not => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                })
            }
            TokenKind::Minus => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                })
            }
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let inc = self.advance().kind == TokenKind::PlusPlus;
                let target = self.parse_unary()?;
                Ok(Expr::PreIncDec {
                    inc,
                    target: Box::new(target),
                })
            }
            _ => self.parse_cast(),
        }
    }

    fn parse_cast(&mut self) -> Result<Expr, ParseError> {
        if self.check(TokenKind::LParen) && self.looks_like_cast() {
            self.advance();
            let ty = self.parse_type()?;
            self.expect(TokenKind::RParen, "')'")?;
            let expr = self.parse_unary()?;
            return Ok(Expr::Cast {
                ty,
                expr: Box::new(expr),
            });
        }
        self.parse_postfix()
    }

    /// Trial parse: `(Type)` followed by something a unary expression can
    /// start with. Primitive and array types always win the ambiguity.
    fn looks_like_cast(&mut self) -> bool {
        let saved = self.pos;
        let ok = (|| {
            self.advance(); // '('
            let ty = self.parse_type().ok()?;
            if !self.check(TokenKind::RParen) {
                return None;
            }
            self.advance();
            let primitive = matches!(
                ty.name.as_str(),
                "int" | "long" | "float" | "double" | "boolean" | "char" | "byte" | "short"
            );
            if primitive || ty.dims > 0 || !ty.args.is_empty() {
                return Some(());
            }
            matches!(
                self.kind(),
                TokenKind::Identifier
                    | TokenKind::IntLiteral
                    | TokenKind::FloatLiteral
                    | TokenKind::StringLiteral
                    | TokenKind::CharLiteral
                    | TokenKind::True
                    | TokenKind::False
                    | TokenKind::Null
                    | TokenKind::This
                    | TokenKind::Super
                    | TokenKind::New
                    | TokenKind::LParen
                    | TokenKind::Not
            )
            .then_some(())
        })()
        .is_some();
        self.pos = saved;
        ok
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.kind() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.expect(TokenKind::Identifier, "member name")?.text;
                    if self.check(TokenKind::LParen) {
                        let args = self.parse_args()?;
                        expr = Expr::Call {
                            receiver: Some(Box::new(expr)),
                            name,
                            args,
                        };
                    } else {
                        expr = Expr::FieldAccess {
                            object: Box::new(expr),
                            name,
                        };
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expr = Expr::Index {
                        array: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                TokenKind::ColonColon => {
                    self.advance();
                    let name = if self.check(TokenKind::New) {
                        self.advance().text
                    } else {
                        self.expect(TokenKind::Identifier, "method name")?.text
                    };
                    let target = match &expr {
                        Expr::Name(n) => n.clone(),
                        _ => "?".to_string(),
                    };
                    expr = Expr::MethodRef { target, name };
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let inc = self.advance().kind == TokenKind::PlusPlus;
                    expr = Expr::PostIncDec {
                        inc,
                        target: Box::new(expr),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.kind() {
            TokenKind::IntLiteral => {
                let text = self.advance().text;
                Ok(Expr::IntLit(text.parse().unwrap_or(0)))
            }
            TokenKind::FloatLiteral => {
                let text = self.advance().text;
                Ok(Expr::FloatLit(text.parse().unwrap_or(0.0)))
            }
            TokenKind::StringLiteral => Ok(Expr::StringLit(self.advance().text)),
            TokenKind::CharLiteral => {
                let text = self.advance().text;
                Ok(Expr::CharLit(text.chars().next().unwrap_or('\0')))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::BoolLit(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::BoolLit(false))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::NullLit)
            }
            TokenKind::This => {
                self.advance();
                if self.check(TokenKind::LParen) {
                    // this(...) constructor delegation
                    let args = self.parse_args()?;
                    return Ok(Expr::Call {
                        receiver: Some(Box::new(Expr::This)),
                        name: "<init>".to_string(),
                        args,
                    });
                }
                Ok(Expr::This)
            }
            TokenKind::Super => {
                self.advance();
                if self.check(TokenKind::LParen) {
                    let args = self.parse_args()?;
                    return Ok(Expr::Call {
                        receiver: Some(Box::new(Expr::Super)),
                        name: "<init>".to_string(),
                        args,
                    });
                }
                Ok(Expr::Super)
            }
            TokenKind::New => self.parse_new(),
            TokenKind::LParen => {
                if self.lambda_ahead() {
                    return self.parse_lambda();
                }
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::Identifier => {
                if self.peek_ahead(1).kind == TokenKind::Arrow {
                    return self.parse_lambda();
                }
                let name = self.advance().text;
                if self.check(TokenKind::LParen) {
                    let args = self.parse_args()?;
                    return Ok(Expr::Call {
                        receiver: None,
                        name,
                        args,
                    });
                }
                Ok(Expr::Name(name))
            }
            _ => Err(self.error(&format!("expected expression, found '{}'", self.peek().text))),
        }
    }

    /// True when the matching ')' of the current '(' is followed by `->`.
    fn lambda_ahead(&self) -> bool {
        let mut depth = 0usize;
        let mut offset = 0usize;
        loop {
            let kind = self.peek_ahead(offset).kind;
            match kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return self.peek_ahead(offset + 1).kind == TokenKind::Arrow;
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            offset += 1;
        }
    }

    fn parse_lambda(&mut self) -> Result<Expr, ParseError> {
        let mut params = Vec::new();
        if self.check(TokenKind::Identifier) {
            params.push(self.advance().text);
        } else {
            self.expect(TokenKind::LParen, "'('")?;
            if !self.check(TokenKind::RParen) {
                loop {
                    // optionally-typed parameter: keep the trailing name
                    let first = self.advance();
                    if self.check(TokenKind::Identifier) {
                        params.push(self.advance().text);
                    } else {
                        params.push(first.text);
                    }
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen, "')'")?;
        }
        self.expect(TokenKind::Arrow, "'->'")?;

        let body = if self.check(TokenKind::LBrace) {
            LambdaBody::Block(self.parse_block()?)
        } else {
            LambdaBody::Expr(Box::new(self.parse_expression()?))
        };
        Ok(Expr::Lambda { params, body })
    }

    fn parse_new(&mut self) -> Result<Expr, ParseError> {
        self.expect(TokenKind::New, "'new'")?;
        let base = match self.kind() {
            k if k.is_primitive_type() => self.advance().text,
            TokenKind::Identifier => self.advance().text,
            _ => return Err(self.error("expected type after 'new'")),
        };
        self.skip_generic_params();

        if self.check(TokenKind::LBracket) {
            let mut dims = Vec::new();
            let mut declared_dims = 0u8;
            while self.eat(TokenKind::LBracket) {
                if self.check(TokenKind::RBracket) {
                    declared_dims += 1;
                } else {
                    dims.push(self.parse_expression()?);
                }
                self.expect(TokenKind::RBracket, "']'")?;
            }
            let elem = TypeNode {
                name: base,
                args: Vec::new(),
                dims: declared_dims,
            };
            let init = if self.check(TokenKind::LBrace) {
                match self.parse_array_literal()? {
                    Expr::ArrayLiteral(elements) => Some(elements),
                    _ => None,
                }
            } else {
                None
            };
            return Ok(Expr::NewArray { elem, dims, init });
        }

        let args = self.parse_args()?;
        // anonymous class bodies are consumed and discarded
        if self.check(TokenKind::LBrace) {
            self.skip_balanced(TokenKind::LBrace, TokenKind::RBrace);
        }
        Ok(Expr::New { class: base, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse_source(source: &str) -> Program {
        let tokens = Lexer::new(source).tokenize().unwrap();
        Parser::new(tokens).parse().unwrap()
    }

    fn first_class(program: &Program) -> &ClassDecl {
        match &program.declarations[0] {
            TypeDecl::Class(c) => c,
            TypeDecl::Interface(_) => panic!("expected class"),
        }
    }

    #[test]
    fn parses_class_with_main() {
        let program = parse_source(
            r#"
            public class HelloWorld {
                public static void main(String[] args) {
                    System.out.println("Hello, World!");
                }
            }
            "#,
        );
        let class = first_class(&program);
        assert_eq!(class.name, "HelloWorld");
        assert_eq!(class.methods.len(), 1);
        let main = &class.methods[0];
        assert!(main.is_static);
        assert_eq!(main.params[0].ty.dims, 1);
        assert_eq!(main.params[0].ty.name, "String");
    }

    #[test]
    fn package_import_and_annotations_are_discarded() {
        let program = parse_source(
            r#"
            package com.example.app;
            import java.util.List;
            @SuppressWarnings("all")
            class A { @Override void f() {} }
            "#,
        );
        assert_eq!(program.declarations.len(), 1);
        assert_eq!(first_class(&program).methods.len(), 1);
    }

    #[test]
    fn enum_declarations_are_discarded() {
        let program = parse_source("enum Color { RED, GREEN } class A {}");
        assert_eq!(program.declarations.len(), 1);
    }

    #[test]
    fn constructor_is_recognised() {
        let program = parse_source("class P { int x; P(int x) { this.x = x; } }");
        let class = first_class(&program);
        assert!(class.methods[0].is_constructor);
    }

    #[test]
    fn multi_variable_declaration_lowers_to_block() {
        let program = parse_source("class A { void f() { int a = 1, b = 2; } }");
        let class = first_class(&program);
        let body = class.methods[0].body.as_ref().unwrap();
        match &body[0] {
            Stmt::Block(decls) => assert_eq!(decls.len(), 2),
            other => panic!("expected lowered block, got {:?}", other),
        }
    }

    #[test]
    fn do_while_parses_as_its_own_loop() {
        let program = parse_source("class A { void f() { do { f(); } while (true); } }");
        let class = first_class(&program);
        let body = class.methods[0].body.as_ref().unwrap();
        match &body[0] {
            Stmt::DoWhile { body, .. } => {
                assert!(matches!(body.as_ref(), Stmt::Block(stmts) if stmts.len() == 1));
            }
            other => panic!("expected do-while, got {:?}", other),
        }
    }

    #[test]
    fn enhanced_for_is_disambiguated() {
        let program = parse_source("class A { void f(int[] xs) { for (int x : xs) { f(xs); } } }");
        let class = first_class(&program);
        let body = class.methods[0].body.as_ref().unwrap();
        assert!(matches!(body[0], Stmt::ForEach { .. }));
    }

    #[test]
    fn cast_vs_paren_expression() {
        let program = parse_source("class A { void f() { int a = (int) 3.5; int b = (a) + 1; } }");
        let class = first_class(&program);
        let body = class.methods[0].body.as_ref().unwrap();
        let (first, second) = match (&body[0], &body[1]) {
            (
                Stmt::VarDecl { init: Some(a), .. },
                Stmt::VarDecl { init: Some(b), .. },
            ) => (a, b),
            other => panic!("expected two declarations, got {:?}", other),
        };
        assert!(matches!(first, Expr::Cast { .. }));
        assert!(matches!(second, Expr::Binary { .. }));
    }

    #[test]
    fn lambda_forms() {
        let program =
            parse_source("class A { void f() { g(x -> x + 1); g((a, b) -> { return a; }); } }");
        let class = first_class(&program);
        let body = class.methods[0].body.as_ref().unwrap();
        assert_eq!(body.len(), 2);
    }

    #[test]
    fn method_reference() {
        let program = parse_source("class A { void f() { g(String::valueOf); } }");
        let class = first_class(&program);
        let body = class.methods[0].body.as_ref().unwrap();
        match &body[0] {
            Stmt::Expr {
                expr: Expr::Call { args, .. },
                ..
            } => assert!(matches!(
                &args[0],
                Expr::MethodRef { target, name } if target == "String" && name == "valueOf"
            )),
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn synchronized_discards_lock_expression() {
        let program = parse_source("class A { void f(Object l) { synchronized (l) { f(l); } } }");
        let class = first_class(&program);
        let body = class.methods[0].body.as_ref().unwrap();
        match &body[0] {
            Stmt::Synchronized { body, .. } => assert_eq!(body.len(), 1),
            other => panic!("expected synchronized, got {:?}", other),
        }
    }

    #[test]
    fn generics_and_wildcards() {
        let program =
            parse_source("class A { Map<String, List<Integer>> m; void f(List<?> xs) {} }");
        let class = first_class(&program);
        assert_eq!(class.fields[0].ty.display_name(), "Map<String, List<Integer>>");
        assert_eq!(class.methods[0].params[0].ty.args[0].name, "?");
    }

    #[test]
    fn interface_with_default_method() {
        let program = parse_source(
            "interface Shape { double area(); default String describe() { return \"shape\"; } }",
        );
        match &program.declarations[0] {
            TypeDecl::Interface(i) => {
                assert_eq!(i.methods.len(), 2);
                assert!(i.methods[0].body.is_none());
                assert!(i.methods[1].is_default);
            }
            _ => panic!("expected interface"),
        }
    }

    #[test]
    fn parse_error_carries_position() {
        let tokens = Lexer::new("class A { void f() { int = 5; } }").tokenize().unwrap();
        let err = Parser::new(tokens).parse().unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("expected"));
    }

    #[test]
    fn ternary_and_precedence() {
        let program = parse_source("class A { int f(int a) { return a > 2 ? a * 3 + 1 : 0; } }");
        let class = first_class(&program);
        let body = class.methods[0].body.as_ref().unwrap();
        match &body[0] {
            Stmt::Return { value: Some(expr), .. } => {
                assert!(matches!(expr, Expr::Ternary { .. }));
            }
            other => panic!("expected return, got {:?}", other),
        }
    }
}
