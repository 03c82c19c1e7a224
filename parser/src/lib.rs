//! Pratt-style expression parsing over recursive-descent globals. The
//! parser owns scope construction: entering a function or `if` body pushes
//! a child scope, and nothing after the parser creates scopes.

pub mod imports;
pub mod lexer;

pub use imports::ImportManager;
pub use lexer::{integer_value, scan_invalid_tokens, string_value, Lexer, Token, TokenKind};

use ast::{BinOp, Expression, ExpressionKind, Function, Global, GlobalKind, ScopeId, ScopeTree, UnaryOp};
use codespan::{FileId, Span};
use diagnostics::Diagnostics;
use ty::TypeId;

pub type Result<T> = std::result::Result<T, ParseError>;

#[derive(Debug)]
pub enum ParseError {
    BadToken { expected: Vec<&'static str>, got: String, span: Span },
    ImportFailed,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::BadToken { expected, got, .. } => {
                write!(f, "expected {}, found '{}'", expected.join(" or "), got)
            }
            ParseError::ImportFailed => write!(f, "import failed"),
        }
    }
}

/// Binding powers for the operator loop; zero means "not a binary operator".
fn binary_precedence(kind: TokenKind) -> i32 {
    match kind {
        TokenKind::LeftParen | TokenKind::Dot | TokenKind::RightArrow => 90,
        TokenKind::Star | TokenKind::Slash => 75,
        TokenKind::Plus | TokenKind::Minus => 70,
        TokenKind::LessThan | TokenKind::GreaterThan | TokenKind::LessEqual | TokenKind::GreaterEqual => 55,
        TokenKind::DoubleEqual | TokenKind::BangEqual => 50,
        TokenKind::Equal => 20,
        _ => 0,
    }
}

fn prefix_precedence(kind: TokenKind) -> i32 {
    match kind {
        TokenKind::Minus | TokenKind::Ampersand | TokenKind::Star => 85,
        _ => 0,
    }
}

pub struct Parser<'a> {
    tokens: Vec<Token>,
    position: usize,
    file: FileId,
    diag: &'a mut Diagnostics,
    scopes: &'a mut ScopeTree,
    imports: &'a mut ImportManager,
    active_scope: ScopeId,
}

impl<'a> Parser<'a> {
    pub fn new(
        tokens: Vec<Token>,
        file: FileId,
        diag: &'a mut Diagnostics,
        scopes: &'a mut ScopeTree,
        imports: &'a mut ImportManager,
        scope: ScopeId,
    ) -> Self {
        Self { tokens, position: 0, file, diag, scopes, imports, active_scope: scope }
    }

    pub fn parse(&mut self) -> Result<Vec<Global>> {
        let mut ast = Vec::new();
        while self.position < self.tokens.len() {
            if self.current().kind == TokenKind::EndOfFile {
                break;
            }
            self.parse_global(&mut ast, false)?;
        }
        Ok(ast)
    }

    fn current(&self) -> &Token {
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn peek(&self, offset: usize) -> &Token {
        &self.tokens[(self.position + offset).min(self.tokens.len() - 1)]
    }

    fn consume(&mut self) -> Token {
        let token = self.current().clone();
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.current().kind == kind {
            return Ok(self.consume());
        }
        self.unexpected(kind.name())
    }

    fn unexpected<T>(&mut self, expected: &'static str) -> Result<T> {
        let got = self.current().clone();
        let shown = if got.kind == TokenKind::EndOfFile { "end of file".to_owned() } else { got.text.clone() };
        self.diag.error(self.file, got.span, format!("expected {}, found '{}'", expected, shown));
        Err(ParseError::BadToken { expected: vec![expected], got: shown, span: got.span })
    }

    fn parse_global(&mut self, out: &mut Vec<Global>, exported: bool) -> Result<()> {
        match self.current().kind {
            TokenKind::ExportKeyword => {
                self.consume();
                if self.current().kind == TokenKind::LeftBrace {
                    self.consume();
                    while self.current().kind != TokenKind::RightBrace {
                        if self.current().kind == TokenKind::EndOfFile {
                            return self.unexpected("}");
                        }
                        self.parse_global(out, true)?;
                    }
                    self.consume();
                    return Ok(());
                }
                self.parse_global(out, true)
            }
            TokenKind::ImportKeyword => self.parse_import(out),
            TokenKind::PureKeyword => {
                self.consume();
                if self.current().kind != TokenKind::FuncKeyword {
                    return self.unexpected("func");
                }
                let global = self.parse_function(true, exported)?;
                out.push(global);
                Ok(())
            }
            TokenKind::FuncKeyword => {
                let global = self.parse_function(false, exported)?;
                out.push(global);
                Ok(())
            }
            TokenKind::ClassKeyword => {
                let global = self.parse_class(exported)?;
                out.push(global);
                Ok(())
            }
            TokenKind::EndOfFile => {
                self.consume();
                Ok(())
            }
            _ => self.unexpected("global declaration"),
        }
    }

    fn parse_function(&mut self, pure: bool, exported: bool) -> Result<Global> {
        let start = self.expect(TokenKind::FuncKeyword)?;
        let name = self.expect(TokenKind::Identifier)?;

        self.expect(TokenKind::LeftParen)?;
        let mut arguments = Vec::new();
        while self.current().kind != TokenKind::RightParen {
            let arg_name = self.expect(TokenKind::Identifier)?;
            self.expect(TokenKind::Colon)?;
            let arg_ty = self.parse_type()?;
            arguments.push((arg_name.text, arg_ty));
            if self.current().kind == TokenKind::Comma {
                self.consume();
            }
        }
        self.expect(TokenKind::RightParen)?;
        self.expect(TokenKind::RightArrow)?;
        let return_type = self.parse_type()?;

        let fn_ty = ty::function(return_type, arguments.iter().map(|(_, t)| *t).collect());
        let symbol = self.scopes.declare(self.active_scope, &name.text, fn_ty);
        {
            let symbol = self.scopes.symbol_mut(symbol);
            symbol.pure = pure;
            symbol.exported = exported;
        }

        let own_scope = self.scopes.new_function_scope(self.active_scope, return_type, pure);
        for (arg_name, arg_ty) in &arguments {
            self.scopes.declare(own_scope, arg_name, *arg_ty);
        }

        if self.current().kind == TokenKind::Semicolon {
            let end = self.consume();
            let kind = GlobalKind::Function(Function {
                name: name.text,
                symbol,
                ty: fn_ty,
                arguments,
                body: None,
                own_scope,
                pure,
            });
            return Ok(Global { kind, file: self.file, span: start.span.merge(end.span) });
        }

        self.expect(TokenKind::LeftBrace)?;
        let saved = self.active_scope;
        self.active_scope = own_scope;
        let body = self.parse_statement_list(TokenKind::RightBrace);
        self.active_scope = saved;
        let body = body?;
        let end = self.expect(TokenKind::RightBrace)?;

        let kind = GlobalKind::Function(Function {
            name: name.text,
            symbol,
            ty: fn_ty,
            arguments,
            body: Some(body),
            own_scope,
            pure,
        });
        Ok(Global { kind, file: self.file, span: start.span.merge(end.span) })
    }

    fn parse_class(&mut self, exported: bool) -> Result<Global> {
        let start = self.expect(TokenKind::ClassKeyword)?;
        let name = self.expect(TokenKind::Identifier)?;
        self.expect(TokenKind::LeftBrace)?;

        let mut fields = Vec::new();
        while self.current().kind != TokenKind::RightBrace {
            let field_name = self.expect(TokenKind::Identifier)?;
            self.expect(TokenKind::Colon)?;
            let field_ty = self.parse_type()?;
            fields.push((field_name.text, field_ty));
            if self.current().kind != TokenKind::RightBrace {
                self.expect(TokenKind::Semicolon)?;
            }
        }
        let end = self.expect(TokenKind::RightBrace)?;

        let class_ty = ty::define_struct(&name.text, fields);
        self.imports.mark_defined(&name.text);

        let kind = GlobalKind::Class(ast::Class { name: name.text, ty: class_ty, exported });
        Ok(Global { kind, file: self.file, span: start.span.merge(end.span) })
    }

    fn parse_import(&mut self, out: &mut Vec<Global>) -> Result<()> {
        let start = self.consume(); // import

        let mut segments = Vec::new();
        loop {
            let segment = self.expect(TokenKind::Identifier)?;
            segments.push(segment.text);
            if self.current().kind == TokenKind::Semicolon {
                break;
            }
            self.expect(TokenKind::Dot)?;
        }
        let end = self.expect(TokenKind::Semicolon)?;
        let span = start.span.merge(end.span);

        let globals =
            self.imports.resolve(&segments, &mut *self.diag, &mut *self.scopes, self.active_scope, self.file, span)?;
        out.extend(globals);
        Ok(())
    }

    fn parse_statement_list(&mut self, terminator: TokenKind) -> Result<Vec<Expression>> {
        let mut nodes = Vec::new();
        while self.current().kind != terminator {
            if self.current().kind == TokenKind::EndOfFile {
                return self.unexpected(terminator.name());
            }
            let node = self.parse_expression()?;
            if !node.kind.ends_with_block() {
                self.expect(TokenKind::Semicolon)?;
            }
            nodes.push(node);
        }
        Ok(nodes)
    }

    pub fn parse_expression(&mut self) -> Result<Expression> {
        self.parse_expression_bp(1)
    }

    fn parse_expression_bp(&mut self, min_precedence: i32) -> Result<Expression> {
        let prefix = prefix_precedence(self.current().kind);
        let mut left = if prefix != 0 && prefix >= min_precedence {
            let op_token = self.consume();
            let op = match op_token.kind {
                TokenKind::Minus => UnaryOp::Negate,
                TokenKind::Star => UnaryOp::Deref,
                TokenKind::Ampersand => UnaryOp::AddressOf,
                _ => unreachable!(),
            };
            let operand = self.parse_expression_bp(prefix)?;
            let span = op_token.span.merge(operand.span);
            Expression::new(ExpressionKind::Unary { op, operand: Box::new(operand) }, self.active_scope, span)
        } else {
            self.parse_primary()?
        };

        loop {
            let precedence = binary_precedence(self.current().kind);
            if precedence == 0 || precedence < min_precedence {
                break;
            }

            let op_token = self.consume();
            left = match op_token.kind {
                TokenKind::LeftParen => self.parse_call(left)?,
                TokenKind::Dot => self.parse_member(left, false)?,
                TokenKind::RightArrow => self.parse_member(left, true)?,
                TokenKind::Equal => {
                    // assignment is right-associative
                    let rhs = self.parse_expression_bp(precedence)?;
                    let span = left.span.merge(rhs.span);
                    Expression::new(
                        ExpressionKind::Binary { op: BinOp::Assign, lhs: Box::new(left), rhs: Box::new(rhs) },
                        self.active_scope,
                        span,
                    )
                }
                _ => {
                    let op = match op_token.kind {
                        TokenKind::Plus => BinOp::Add,
                        TokenKind::Minus => BinOp::Sub,
                        TokenKind::Star => BinOp::Mul,
                        TokenKind::Slash => BinOp::Div,
                        TokenKind::DoubleEqual => BinOp::Eq,
                        TokenKind::BangEqual => BinOp::Ne,
                        TokenKind::LessThan => BinOp::Lt,
                        TokenKind::LessEqual => BinOp::Le,
                        TokenKind::GreaterThan => BinOp::Gt,
                        TokenKind::GreaterEqual => BinOp::Ge,
                        _ => unreachable!(),
                    };
                    let rhs = self.parse_expression_bp(precedence + 1)?;
                    let span = left.span.merge(rhs.span);
                    Expression::new(
                        ExpressionKind::Binary { op, lhs: Box::new(left), rhs: Box::new(rhs) },
                        self.active_scope,
                        span,
                    )
                }
            };
        }

        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        match self.current().kind {
            TokenKind::ReturnKeyword => self.parse_return(),
            TokenKind::LetKeyword => self.parse_declaration(),
            TokenKind::IfKeyword => self.parse_if(),
            TokenKind::LeftBrace => self.parse_compound(),
            TokenKind::IntegerLiteral => {
                let token = self.consume();
                Ok(Expression::with_type(
                    ExpressionKind::Integer(integer_value(&token.text)),
                    self.active_scope,
                    ty::get("i32").unwrap(),
                    token.span,
                ))
            }
            TokenKind::StringLiteral => {
                let token = self.consume();
                Ok(Expression::with_type(
                    ExpressionKind::StringLiteral(string_value(&token.text)),
                    self.active_scope,
                    ty::pointer_to(ty::get("u8").unwrap()),
                    token.span,
                ))
            }
            TokenKind::TrueKeyword | TokenKind::FalseKeyword => {
                let token = self.consume();
                let value = token.kind == TokenKind::TrueKeyword;
                Ok(Expression::with_type(ExpressionKind::Boolean(value), self.active_scope, ty::boolean(), token.span))
            }
            TokenKind::Identifier => {
                let first = self.consume();
                let mut names = vec![first.text];
                let mut span = first.span;
                while self.current().kind == TokenKind::DoubleColon {
                    self.consume();
                    let segment = self.expect(TokenKind::Identifier)?;
                    span = span.merge(segment.span);
                    names.push(segment.text);
                }
                Ok(Expression::new(ExpressionKind::Variable { names }, self.active_scope, span))
            }
            _ => self.unexpected("primary expression"),
        }
    }

    fn parse_return(&mut self) -> Result<Expression> {
        let token = self.consume();
        if self.current().kind == TokenKind::Semicolon {
            return Ok(Expression::new(ExpressionKind::Return(None), self.active_scope, token.span));
        }
        let value = self.parse_expression()?;
        let span = token.span.merge(value.span);
        Ok(Expression::new(ExpressionKind::Return(Some(Box::new(value))), self.active_scope, span))
    }

    fn parse_declaration(&mut self) -> Result<Expression> {
        let start = self.consume(); // let
        let name = self.expect(TokenKind::Identifier)?;
        self.expect(TokenKind::Colon)?;
        let declared = self.parse_type()?;

        let mut span = start.span.merge(name.span);
        let init = if self.current().kind == TokenKind::Equal {
            self.consume();
            let value = self.parse_expression()?;
            span = span.merge(value.span);
            Some(Box::new(value))
        } else {
            None
        };

        let symbol = self.scopes.declare(self.active_scope, &name.text, declared);
        Ok(Expression::new(ExpressionKind::Declaration { name: name.text, symbol, init }, self.active_scope, span))
    }

    fn parse_if(&mut self) -> Result<Expression> {
        let token = self.consume(); // if
        self.expect(TokenKind::LeftParen)?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RightParen)?;

        let own_scope = self.scopes.new_scope(self.active_scope);
        let saved = self.active_scope;
        self.active_scope = own_scope;

        let result = self.parse_if_bodies(token.span, condition, own_scope);
        self.active_scope = saved;
        result
    }

    fn parse_if_bodies(&mut self, start: Span, condition: Expression, own_scope: ScopeId) -> Result<Expression> {
        let then_body = self.parse_expression()?;
        let mut span = start.merge(then_body.span);

        let mut else_body = None;
        if self.current().kind == TokenKind::Semicolon && self.peek(1).kind == TokenKind::ElseKeyword {
            self.consume();
            self.consume();
            let body = self.parse_expression()?;
            span = span.merge(body.span);
            else_body = Some(Box::new(body));
        } else if then_body.kind.ends_with_block() && self.current().kind == TokenKind::ElseKeyword {
            self.consume();
            let body = self.parse_expression()?;
            span = span.merge(body.span);
            else_body = Some(Box::new(body));
        }

        Ok(Expression::new(
            ExpressionKind::If { condition: Box::new(condition), then_body: Box::new(then_body), else_body, own_scope },
            // the node itself belongs to the enclosing scope
            self.scopes.scope(own_scope).parent.unwrap(),
            span,
        ))
    }

    fn parse_compound(&mut self) -> Result<Expression> {
        let start = self.expect(TokenKind::LeftBrace)?;
        let nodes = self.parse_statement_list(TokenKind::RightBrace)?;
        let end = self.expect(TokenKind::RightBrace)?;
        Ok(Expression::new(ExpressionKind::Compound(nodes), self.active_scope, start.span.merge(end.span)))
    }

    fn parse_call(&mut self, callee: Expression) -> Result<Expression> {
        let mut arguments = Vec::new();
        while self.current().kind != TokenKind::RightParen {
            arguments.push(self.parse_expression()?);
            if self.current().kind != TokenKind::RightParen {
                self.expect(TokenKind::Comma)?;
            }
        }
        let end = self.expect(TokenKind::RightParen)?;
        let span = callee.span.merge(end.span);
        Ok(Expression::new(
            ExpressionKind::Call { callee: Box::new(callee), arguments, resolved: None },
            self.active_scope,
            span,
        ))
    }

    fn parse_member(&mut self, base: Expression, through_pointer: bool) -> Result<Expression> {
        let field = self.expect(TokenKind::Identifier)?;
        let span = base.span.merge(field.span);
        Ok(Expression::new(
            ExpressionKind::Member { base: Box::new(base), field: field.text, through_pointer, index: None },
            self.active_scope,
            span,
        ))
    }

    /// Types: named structs, type keywords, trailing `*`s, and the function
    /// pointer form `(T, ...)*... -> T`.
    fn parse_type(&mut self) -> Result<TypeId> {
        if self.current().kind == TokenKind::LeftParen {
            self.consume();
            let mut params = Vec::new();
            while self.current().kind != TokenKind::RightParen {
                params.push(self.parse_type()?);
                if self.current().kind != TokenKind::RightParen {
                    self.expect(TokenKind::Comma)?;
                }
            }
            self.expect(TokenKind::RightParen)?;

            if self.current().kind != TokenKind::Star {
                return self.unexpected("*");
            }
            let mut pointer_levels = 0;
            while self.current().kind == TokenKind::Star {
                self.consume();
                pointer_levels += 1;
            }

            self.expect(TokenKind::RightArrow)?;
            let ret = self.parse_type()?;

            let mut result = ty::function(ret, params);
            for _ in 0..pointer_levels {
                result = ty::pointer_to(result);
            }
            return Ok(result);
        }

        let mut base = match self.current().kind {
            TokenKind::Identifier => {
                let name = self.consume();
                match ty::get(&name.text) {
                    Some(known) => known,
                    None => {
                        // incomplete until a class declaration (possibly in an
                        // importing cycle) completes it
                        let forward = ty::declare_struct(&name.text);
                        self.imports.note_incomplete(&name.text, self.file, name.span);
                        forward
                    }
                }
            }
            TokenKind::TypeKeyword => {
                let token = self.consume();
                ty::get(&token.text).unwrap()
            }
            _ => return self.unexpected("type"),
        };

        while self.current().kind == TokenKind::Star {
            self.consume();
            base = ty::pointer_to(base);
        }
        Ok(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast::{BinOp, ExpressionKind, GlobalKind, UnaryOp};

    fn parse_source(source: &str) -> (Vec<Global>, ScopeTree, Diagnostics) {
        ty::initialize();
        let mut diag = Diagnostics::silent();
        let file = diag.add_file("test.vi", source.to_owned());
        let tokens = Lexer::new(source).lex();
        let mut scopes = ScopeTree::new();
        let mut imports = ImportManager::new(".");
        let global = scopes.global();
        let ast = Parser::new(tokens, file, &mut diag, &mut scopes, &mut imports, global)
            .parse()
            .expect("parse failed");
        (ast, scopes, diag)
    }

    fn sole_function(ast: &[Global]) -> &ast::Function {
        match &ast[0].kind {
            GlobalKind::Function(f) => f,
            _ => panic!("expected function"),
        }
    }

    #[test]
    fn function_with_arguments_and_body() {
        let (ast, scopes, _) = parse_source("func add(a: i32, b: i32) -> i32 { return a + b; }");
        let f = sole_function(&ast);

        assert_eq!(f.name, "add");
        assert_eq!(f.arguments.len(), 2);
        assert_eq!(f.ty.return_type(), ty::get("i32"));
        assert!(!f.pure);
        assert_eq!(f.body.as_ref().unwrap().len(), 1);
        assert!(scopes.resolve(f.own_scope, "a").is_some());
        assert!(scopes.resolve(scopes.global(), "add").is_some());
    }

    #[test]
    fn declaration_only_function_has_no_body() {
        let (ast, _, _) = parse_source("func ext(x: i32) -> void;");
        assert!(sole_function(&ast).body.is_none());
    }

    #[test]
    fn pure_and_export_mark_the_symbol() {
        let (ast, scopes, _) = parse_source("export pure func p() -> void { }");
        let f = sole_function(&ast);
        let symbol = scopes.symbol(f.symbol);
        assert!(symbol.pure);
        assert!(symbol.exported);
    }

    #[test]
    fn export_blocks_mark_every_declaration() {
        let (ast, scopes, _) = parse_source("export { func a() -> void; func b() -> void; }");
        assert_eq!(ast.len(), 2);
        for global in &ast {
            if let GlobalKind::Function(f) = &global.kind {
                assert!(scopes.symbol(f.symbol).exported);
            }
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let (ast, ..) = parse_source("func f(a: i32, b: i32) -> i32 { return a + b * a; }");
        let f = sole_function(&ast);
        let body = f.body.as_ref().unwrap();
        let ret = match &body[0].kind {
            ExpressionKind::Return(Some(value)) => value,
            _ => panic!("expected return"),
        };
        match &ret.kind {
            ExpressionKind::Binary { op: BinOp::Add, rhs, .. } => {
                assert!(matches!(rhs.kind, ExpressionKind::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("expected addition at the root, got {:?}", other),
        }
    }

    #[test]
    fn subtraction_is_left_associative() {
        let (ast, ..) = parse_source("func f(a: i32) -> i32 { return a - a - a; }");
        let f = sole_function(&ast);
        let ret = match &f.body.as_ref().unwrap()[0].kind {
            ExpressionKind::Return(Some(value)) => value,
            _ => panic!("expected return"),
        };
        // (a - a) - a
        match &ret.kind {
            ExpressionKind::Binary { op: BinOp::Sub, lhs, rhs } => {
                assert!(matches!(lhs.kind, ExpressionKind::Binary { op: BinOp::Sub, .. }));
                assert!(matches!(rhs.kind, ExpressionKind::Variable { .. }));
            }
            other => panic!("expected subtraction at the root, got {:?}", other),
        }
    }

    #[test]
    fn assignment_is_right_associative() {
        let (ast, ..) = parse_source("func f() -> void { let a: i32; let b: i32; a = b = 1; }");
        let f = sole_function(&ast);
        let assign = &f.body.as_ref().unwrap()[2];
        match &assign.kind {
            ExpressionKind::Binary { op: BinOp::Assign, rhs, .. } => {
                assert!(matches!(rhs.kind, ExpressionKind::Binary { op: BinOp::Assign, .. }));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn unary_operators_bind_tighter_than_arithmetic() {
        let (ast, ..) = parse_source("func f(a: i32) -> i32 { return -a + a; }");
        let f = sole_function(&ast);
        let ret = match &f.body.as_ref().unwrap()[0].kind {
            ExpressionKind::Return(Some(value)) => value,
            _ => panic!("expected return"),
        };
        match &ret.kind {
            ExpressionKind::Binary { op: BinOp::Add, lhs, .. } => {
                assert!(matches!(lhs.kind, ExpressionKind::Unary { op: UnaryOp::Negate, .. }));
            }
            other => panic!("expected addition at the root, got {:?}", other),
        }
    }

    #[test]
    fn if_with_semicolon_before_else() {
        let (ast, ..) = parse_source("func f(x: i32) -> i32 { let y: i32; if (x == 0) y = 1; else y = 2; return y; }");
        let f = sole_function(&ast);
        let body = f.body.as_ref().unwrap();
        match &body[1].kind {
            ExpressionKind::If { else_body, .. } => assert!(else_body.is_some()),
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn if_bodies_open_their_own_scope() {
        let (ast, scopes, _) = parse_source("func f(x: i32) -> void { if (x == 0) { let y: i32 = 1; } }");
        let f = sole_function(&ast);
        let own_scope = match &f.body.as_ref().unwrap()[0].kind {
            ExpressionKind::If { own_scope, .. } => *own_scope,
            other => panic!("expected if, got {:?}", other),
        };
        assert!(scopes.resolve(own_scope, "y").is_some());
        assert!(scopes.resolve(f.own_scope, "y").is_none());
    }

    #[test]
    fn qualified_names_collect_segments() {
        let (ast, ..) = parse_source("func f() -> i32 { return a::b::c; }");
        let f = sole_function(&ast);
        let ret = match &f.body.as_ref().unwrap()[0].kind {
            ExpressionKind::Return(Some(value)) => value,
            _ => panic!("expected return"),
        };
        match &ret.kind {
            ExpressionKind::Variable { names } => assert_eq!(names, &["a", "b", "c"]),
            other => panic!("expected variable, got {:?}", other),
        }
    }

    #[test]
    fn function_pointer_types_parse() {
        let (ast, scopes, _) = parse_source("func f(cb: (i32, i32)* -> i32) -> void { }");
        let f = sole_function(&ast);
        let cb = scopes.resolve(f.own_scope, "cb").unwrap();
        let cb_ty = scopes.symbol(cb).ty;
        assert!(cb_ty.is_pointer());
        let inner = cb_ty.pointee().unwrap();
        assert!(inner.is_function());
        assert_eq!(inner.parameters().unwrap().len(), 2);
    }

    #[test]
    fn class_declarations_define_struct_types() {
        let (_, ..) = parse_source("class Point { x: i32; y: i32; }");
        let point = ty::get("Point").unwrap();
        assert!(point.is_struct());
        assert!(point.is_complete());
        assert_eq!(point.field_index("y"), Some(1));
    }

    #[test]
    fn member_access_forms() {
        let (ast, ..) = parse_source(
            "class P { x: i32; } func f(p: P, q: P*) -> i32 { return p.x + q->x; }",
        );
        let f = match &ast[1].kind {
            GlobalKind::Function(f) => f,
            _ => panic!("expected function"),
        };
        let ret = match &f.body.as_ref().unwrap()[0].kind {
            ExpressionKind::Return(Some(value)) => value,
            _ => panic!("expected return"),
        };
        match &ret.kind {
            ExpressionKind::Binary { lhs, rhs, .. } => {
                assert!(matches!(&lhs.kind, ExpressionKind::Member { through_pointer: false, .. }));
                assert!(matches!(&rhs.kind, ExpressionKind::Member { through_pointer: true, .. }));
            }
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[test]
    fn parse_errors_report_and_fail() {
        ty::initialize();
        let mut diag = Diagnostics::silent();
        let source = "func f( -> i32;";
        let file = diag.add_file("test.vi", source.to_owned());
        let tokens = Lexer::new(source).lex();
        let mut scopes = ScopeTree::new();
        let mut imports = ImportManager::new(".");
        let global = scopes.global();
        let result = Parser::new(tokens, file, &mut diag, &mut scopes, &mut imports, global).parse();
        assert!(result.is_err());
        assert!(diag.had_errors());
    }

    #[test]
    fn every_node_scope_is_reachable_from_global() {
        let (ast, scopes, _) = parse_source(
            "func f(x: i32) -> i32 { if (x == 0) { let y: i32 = 1; } return x; }",
        );
        let reachable = scopes.reachable_from_global();
        fn walk(expr: &ast::Expression, reachable: &[ast::ScopeId]) {
            assert!(reachable.contains(&expr.scope));
            match &expr.kind {
                ExpressionKind::Unary { operand, .. } | ExpressionKind::Cast { operand } => walk(operand, reachable),
                ExpressionKind::Binary { lhs, rhs, .. } => {
                    walk(lhs, reachable);
                    walk(rhs, reachable);
                }
                ExpressionKind::Call { callee, arguments, .. } => {
                    walk(callee, reachable);
                    arguments.iter().for_each(|a| walk(a, reachable));
                }
                ExpressionKind::Member { base, .. } => walk(base, reachable),
                ExpressionKind::Return(Some(value)) => walk(value, reachable),
                ExpressionKind::Declaration { init: Some(init), .. } => walk(init, reachable),
                ExpressionKind::If { condition, then_body, else_body, .. } => {
                    walk(condition, reachable);
                    walk(then_body, reachable);
                    if let Some(else_body) = else_body {
                        walk(else_body, reachable);
                    }
                }
                ExpressionKind::Compound(nodes) => nodes.iter().for_each(|n| walk(n, reachable)),
                _ => {}
            }
        }
        for global in &ast {
            if let GlobalKind::Function(f) = &global.kind {
                for node in f.body.as_ref().unwrap() {
                    walk(node, &reachable);
                }
            }
        }
    }
}
