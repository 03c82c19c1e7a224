//! Pass A of semantic analysis: post-order type inference and checking
//! with implicit-conversion insertion. Failed checks poison the node with
//! the error-type sentinel, which absorbs further diagnostics on that
//! subtree; a nonzero error count stops the pipeline before pass B.

pub mod usage;

use ast::{BinOp, Expression, ExpressionKind, Global, GlobalKind, ScopeTree, SymbolId, UnaryOp};
use codespan::FileId;
use diagnostics::Diagnostics;
use ty::TypeId;

/// Runs the type check over every global. Returns false when any error was
/// reported.
pub fn check(globals: &mut [Global], scopes: &ScopeTree, diag: &mut Diagnostics) -> bool {
    let mut checker = TypeChecker { scopes, diag, file: None, failed: false };
    for global in globals.iter_mut() {
        checker.check_global(global);
    }
    !checker.failed
}

struct TypeChecker<'a> {
    scopes: &'a ScopeTree,
    diag: &'a mut Diagnostics,
    file: Option<FileId>,
    failed: bool,
}

impl<'a> TypeChecker<'a> {
    fn file(&self) -> FileId {
        self.file.unwrap()
    }

    fn error(&mut self, expr_span: codespan::Span, message: String) {
        let file = self.file();
        self.diag.error(file, expr_span, message);
        self.failed = true;
    }

    fn check_global(&mut self, global: &mut Global) {
        self.file = Some(global.file);
        if let GlobalKind::Function(function) = &mut global.kind {
            if let Some(body) = &mut function.body {
                for node in body {
                    self.check_expression(node);
                }
            }
        }
    }

    fn check_expression(&mut self, expr: &mut Expression) {
        match &mut expr.kind {
            // literals carry their type out of the parser
            ExpressionKind::Integer(_) | ExpressionKind::Boolean(_) | ExpressionKind::StringLiteral(_) => {}
            ExpressionKind::Cast { .. } => {}

            ExpressionKind::Variable { names } => {
                let symbol = self.resolve_variable(expr.scope, names);
                match symbol {
                    Some(symbol) => expr.ty = Some(self.scopes.symbol(symbol).ty),
                    None => {
                        self.error(expr.span, format!("undeclared identifier '{}'", names.join("::")));
                        expr.ty = Some(ty::error());
                    }
                }
            }

            ExpressionKind::Unary { op, operand } => {
                let op = *op;
                self.check_expression(operand);
                let operand_ty = operand.ty();
                expr.ty = Some(match op {
                    _ if operand_ty.is_error() => ty::error(),
                    UnaryOp::Negate => {
                        if operand_ty.is_integer() {
                            operand_ty
                        } else {
                            self.error(
                                expr.span,
                                format!("no match for operator '-' with type '{}'", operand_ty.name()),
                            );
                            ty::error()
                        }
                    }
                    UnaryOp::Deref => match operand_ty.pointee() {
                        Some(pointee) => pointee,
                        None => {
                            self.error(
                                expr.span,
                                format!("no match for operator '*' with type '{}'", operand_ty.name()),
                            );
                            ty::error()
                        }
                    },
                    UnaryOp::AddressOf => ty::pointer_to(operand_ty),
                });
            }

            ExpressionKind::Binary { op, lhs, rhs } => {
                let op = *op;
                self.check_expression(lhs);
                self.check_expression(rhs);
                expr.ty = Some(self.check_binary(op, lhs, rhs, expr.span));
            }

            ExpressionKind::Call { callee, arguments, resolved } => {
                for argument in arguments.iter_mut() {
                    self.check_expression(argument);
                }
                // split the borrows: take the pieces the helper needs
                let span = expr.span;
                let scope = expr.scope;
                let ty = self.check_call(scope, span, callee, arguments, resolved);
                expr.ty = Some(ty);
            }

            ExpressionKind::Member { base, field, through_pointer, index } => {
                self.check_expression(base);
                let base_ty = base.ty();
                let through_pointer = *through_pointer;
                let struct_ty = if through_pointer { base_ty.pointee().filter(|t| t.is_struct()) } else { Some(base_ty).filter(|t| t.is_struct()) };

                expr.ty = Some(match struct_ty {
                    _ if base_ty.is_error() => ty::error(),
                    Some(struct_ty) => match struct_ty.field_index(field) {
                        Some(found) => {
                            *index = Some(found);
                            struct_ty.fields().unwrap()[found].1
                        }
                        None => {
                            self.error(
                                expr.span,
                                format!("no member named '{}' in '{}'", field, struct_ty.name()),
                            );
                            ty::error()
                        }
                    },
                    None => {
                        let operator = if through_pointer { "->" } else { "." };
                        self.error(
                            expr.span,
                            format!("no match for operator '{}' with type '{}'", operator, base_ty.name()),
                        );
                        ty::error()
                    }
                });
            }

            ExpressionKind::Return(value) => {
                let expected = self.scopes.expected_return(expr.scope).unwrap_or_else(ty::void);
                match value {
                    Some(value) => {
                        self.check_expression(value);
                        if !self.implicit_cast(value, expected) {
                            let message = format!(
                                "cannot convert returned value of type '{}' to '{}'",
                                value.ty().name(),
                                expected.name()
                            );
                            self.error(value.span, message);
                        }
                    }
                    None => {
                        if !expected.is_void() {
                            self.error(expr.span, format!("function must return a value of type '{}'", expected.name()));
                        }
                    }
                }
                expr.ty = Some(ty::void());
            }

            ExpressionKind::Declaration { symbol, init, .. } => {
                let declared = self.scopes.symbol(*symbol).ty;
                if let Some(init) = init {
                    self.check_expression(init);
                    if !self.implicit_cast(init, declared) {
                        let message = format!(
                            "cannot initialize variable of type '{}' with value of type '{}'",
                            declared.name(),
                            init.ty().name()
                        );
                        self.error(init.span, message);
                    }
                }
                expr.ty = Some(ty::void());
            }

            ExpressionKind::If { condition, then_body, else_body, .. } => {
                self.check_expression(condition);
                if !condition.ty().is_boolean() && !self.implicit_cast(condition, ty::boolean()) {
                    let message = format!(
                        "value of type '{}' cannot be used as a condition in if-statement",
                        condition.ty().name()
                    );
                    self.error(condition.span, message);
                }
                self.check_expression(then_body);
                if let Some(else_body) = else_body {
                    self.check_expression(else_body);
                }
                expr.ty = Some(ty::void());
            }

            ExpressionKind::Compound(nodes) => {
                for node in nodes {
                    self.check_expression(node);
                }
                expr.ty = Some(ty::void());
            }
        }
    }

    fn resolve_variable(&self, scope: ast::ScopeId, names: &[String]) -> Option<SymbolId> {
        if names.len() > 1 {
            self.scopes.resolve_qualified(scope, names)
        } else {
            self.scopes.resolve(scope, &names[0])
        }
    }

    fn check_binary(&mut self, op: BinOp, lhs: &mut Expression, rhs: &mut Expression, span: codespan::Span) -> TypeId {
        if lhs.ty().is_error() || rhs.ty().is_error() {
            return ty::error();
        }

        if op == BinOp::Assign {
            if !self.implicit_cast(rhs, lhs.ty()) {
                let message = format!(
                    "cannot assign value of type '{}' to '{}'",
                    rhs.ty().name(),
                    lhs.ty().name()
                );
                self.error(span, message);
                return ty::error();
            }
            return lhs.ty();
        }

        // unify operand types through the literal/bool conversions
        if lhs.ty() != rhs.ty() && !self.implicit_cast(rhs, lhs.ty()) && !self.implicit_cast(lhs, rhs.ty()) {
            self.error(
                span,
                format!("no match for operator '{}' with types '{}' and '{}'", op, lhs.ty().name(), rhs.ty().name()),
            );
            return ty::error();
        }

        if op.is_arithmetic() {
            if !lhs.ty().is_integer() {
                self.error(span, format!("no match for operator '{}' with type '{}'", op, lhs.ty().name()));
                return ty::error();
            }
            return lhs.ty();
        }

        // comparisons
        if !(lhs.ty().is_integer() || lhs.ty().is_boolean() || lhs.ty().is_pointer()) {
            self.error(span, format!("no match for operator '{}' with type '{}'", op, lhs.ty().name()));
            return ty::error();
        }
        ty::boolean()
    }

    fn check_call(
        &mut self,
        scope: ast::ScopeId,
        span: codespan::Span,
        callee: &mut Expression,
        arguments: &mut [Expression],
        resolved: &mut Option<SymbolId>,
    ) -> TypeId {
        // a named callee resolves through the overload set; a name that only
        // binds to non-function symbols (a function-pointer local, say)
        // falls through to the generic path below
        if let ExpressionKind::Variable { names } = &callee.kind {
            let found: Vec<SymbolId> = if names.len() > 1 {
                self.scopes.resolve_qualified(scope, names).into_iter().collect()
            } else {
                self.scopes.resolve_overloads(scope, &names[0])
            };
            let plain = found.first().copied();
            let candidates: Vec<SymbolId> =
                found.into_iter().filter(|&c| self.scopes.symbol(c).ty.is_function()).collect();

            if candidates.is_empty() && plain.is_none() {
                self.error(span, format!("undeclared identifier '{}'", names.join("::")));
                return ty::error();
            }

            if !candidates.is_empty() {
                let best = match self.best_viable_function(&candidates, arguments) {
                    Ok(best) => best,
                    Err(CallResolution::None) => {
                        self.error(span, format!("no matching function for call to '{}'", names.join("::")));
                        return ty::error();
                    }
                    Err(CallResolution::Ambiguous) => {
                        self.error(span, format!("call to '{}' is ambiguous", names.join("::")));
                        return ty::error();
                    }
                };

                let fn_ty = self.scopes.symbol(best).ty;
                callee.ty = Some(fn_ty);
                *resolved = Some(best);

                let params = fn_ty.parameters().unwrap();
                for (argument, param) in arguments.iter_mut().zip(params) {
                    if !self.implicit_cast(argument, param) {
                        let message = format!(
                            "cannot convert argument of type '{}' to '{}'",
                            argument.ty().name(),
                            param.name()
                        );
                        self.error(argument.span, message);
                    }
                }
                return fn_ty.return_type().unwrap();
            }
        }

        // anything else must evaluate to a function or function pointer
        self.check_expression(callee);
        let callee_ty = callee.ty();
        let fn_ty = if callee_ty.is_function() { Some(callee_ty) } else { callee_ty.pointee().filter(|t| t.is_function()) };
        let fn_ty = match fn_ty {
            Some(fn_ty) => fn_ty,
            None if callee_ty.is_error() => return ty::error(),
            None => {
                self.error(span, format!("called value of type '{}' is not a function", callee_ty.name()));
                return ty::error();
            }
        };

        let params = fn_ty.parameters().unwrap();
        if params.len() != arguments.len() {
            self.error(
                span,
                format!("expected {} arguments to call, found {}", params.len(), arguments.len()),
            );
            return ty::error();
        }
        for (argument, param) in arguments.iter_mut().zip(params) {
            if !self.implicit_cast(argument, param) {
                let message =
                    format!("cannot convert argument of type '{}' to '{}'", argument.ty().name(), param.name());
                self.error(argument.span, message);
            }
        }
        fn_ty.return_type().unwrap()
    }

    /// Overload selection: exact parameter matches score 2, legal implicit
    /// conversions 1, anything else disqualifies; the unique best candidate
    /// wins.
    fn best_viable_function(
        &self,
        candidates: &[SymbolId],
        arguments: &[Expression],
    ) -> Result<SymbolId, CallResolution> {
        let mut best: Option<(SymbolId, u32)> = None;
        let mut tied = false;

        for &candidate in candidates {
            let params = match self.scopes.symbol(candidate).ty.parameters() {
                Some(params) if params.len() == arguments.len() => params,
                _ => continue,
            };

            let mut score = 0;
            let mut viable = true;
            for (argument, param) in arguments.iter().zip(params) {
                if argument.ty() == param {
                    score += 2;
                } else if self.castable(argument, param) {
                    score += 1;
                } else {
                    viable = false;
                    break;
                }
            }
            if !viable {
                continue;
            }

            match best {
                Some((_, best_score)) if score == best_score => tied = true,
                Some((_, best_score)) if score > best_score => {
                    best = Some((candidate, score));
                    tied = false;
                }
                None => best = Some((candidate, score)),
                _ => {}
            }
        }

        match best {
            Some((symbol, _)) if !tied => Ok(symbol),
            Some(_) => Err(CallResolution::Ambiguous),
            None => Err(CallResolution::None),
        }
    }

    /// Non-mutating probe of the implicit-conversion rules.
    fn castable(&self, expr: &Expression, dest: TypeId) -> bool {
        let from = expr.ty();
        if from == dest || from.is_error() || dest.is_error() {
            return true;
        }
        match expr.kind {
            ExpressionKind::Integer(_) => dest.is_integer(),
            _ => from.is_boolean() && dest.is_integer(),
        }
    }

    /// Applies an implicit conversion when legal: integer literals re-type
    /// (narrowing warns and truncates modulo 2^width), booleans wrap in a
    /// cast node.
    fn implicit_cast(&mut self, expr: &mut Expression, dest: TypeId) -> bool {
        let from = expr.ty();
        if from == dest || from.is_error() || dest.is_error() {
            return true;
        }

        if let ExpressionKind::Integer(value) = &expr.kind {
            let value = *value;
            if dest.is_integer() {
                let bits = dest.size_bits();
                if u128::from(value) >= 1u128 << bits {
                    let narrowed = value & (u64::MAX >> (64 - bits));
                    let file = self.file();
                    self.diag.warning(
                        "implicit",
                        file,
                        expr.span,
                        format!("integer literal with value '{}' is being narrowed to '{}'", value, narrowed),
                    );
                }
                expr.ty = Some(dest);
                return true;
            }
            return false;
        }

        if from.is_boolean() && dest.is_integer() {
            wrap_cast(expr, dest);
            return true;
        }

        false
    }
}

enum CallResolution {
    None,
    Ambiguous,
}

fn wrap_cast(expr: &mut Expression, dest: TypeId) {
    let scope = expr.scope;
    let span = expr.span;
    let inner = std::mem::replace(expr, Expression::with_type(ExpressionKind::Boolean(false), scope, dest, span));
    *expr = Expression::with_type(ExpressionKind::Cast { operand: Box::new(inner) }, scope, dest, span);
}

#[cfg(test)]
mod tests {
    use super::*;
    use parser::{ImportManager, Lexer, Parser};
    use pretty_assertions::assert_eq;

    fn analyze(source: &str) -> (Vec<Global>, ScopeTree, Diagnostics, bool) {
        ty::initialize();
        let mut diag = Diagnostics::silent();
        let file = diag.add_file("test.vi", source.to_owned());
        let tokens = Lexer::new(source).lex();
        let mut scopes = ScopeTree::new();
        let mut imports = ImportManager::new(".");
        let global = scopes.global();
        let mut ast = Parser::new(tokens, file, &mut diag, &mut scopes, &mut imports, global)
            .parse()
            .expect("parse failed");
        let ok = check(&mut ast, &scopes, &mut diag);
        (ast, scopes, diag, ok)
    }

    fn body_of(ast: &[Global], index: usize) -> &[Expression] {
        match &ast[index].kind {
            GlobalKind::Function(f) => f.body.as_ref().unwrap(),
            _ => panic!("expected function"),
        }
    }

    #[test]
    fn arithmetic_infers_operand_type() {
        let (ast, _, _, ok) = analyze("func f(a: i32, b: i32) -> i32 { return a + b; }");
        assert!(ok);
        let ret = match &body_of(&ast, 0)[0].kind {
            ExpressionKind::Return(Some(value)) => value,
            _ => panic!("expected return"),
        };
        assert_eq!(ret.ty(), ty::get("i32").unwrap());
    }

    #[test]
    fn comparisons_are_boolean() {
        let (ast, _, _, ok) = analyze("func f(a: i32) -> bool { return a < 3; }");
        assert!(ok);
        let ret = match &body_of(&ast, 0)[0].kind {
            ExpressionKind::Return(Some(value)) => value,
            _ => panic!("expected return"),
        };
        assert!(ret.ty().is_boolean());
    }

    #[test]
    fn undeclared_identifiers_are_errors() {
        let (_, _, diag, ok) = analyze("func f() -> i32 { return nope; }");
        assert!(!ok);
        assert!(diag.had_errors());
    }

    #[test]
    fn narrowing_literals_warn_and_retype() {
        let (ast, _, diag, ok) = analyze("func h() -> i8 { return 300; }");
        assert!(ok);
        let warnings = diag.warnings_of_class("implicit");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("300"));
        assert!(warnings[0].message.contains("44"));

        let ret = match &body_of(&ast, 0)[0].kind {
            ExpressionKind::Return(Some(value)) => value,
            _ => panic!("expected return"),
        };
        assert_eq!(ret.ty(), ty::get("i8").unwrap());
    }

    #[test]
    fn bool_to_integer_inserts_a_cast() {
        let (ast, _, _, ok) = analyze("func f() -> i32 { return true; }");
        assert!(ok);
        let ret = match &body_of(&ast, 0)[0].kind {
            ExpressionKind::Return(Some(value)) => value,
            _ => panic!("expected return"),
        };
        assert!(matches!(ret.kind, ExpressionKind::Cast { .. }));
        assert_eq!(ret.ty(), ty::get("i32").unwrap());
    }

    #[test]
    fn non_boolean_conditions_are_errors() {
        let (_, _, _, ok) = analyze("func f(p: i32*) -> void { if (p) return; }");
        assert!(!ok);
    }

    #[test]
    fn deref_requires_a_pointer() {
        let (_, _, _, ok) = analyze("func f(x: i32) -> i32 { return *x; }");
        assert!(!ok);
    }

    #[test]
    fn member_access_resolves_field_indices() {
        let (ast, _, _, ok) =
            analyze("class P { x: i32; y: i32; } func f(p: P) -> i32 { return p.y; }");
        assert!(ok);
        let ret = match &body_of(&ast, 1)[0].kind {
            ExpressionKind::Return(Some(value)) => value,
            _ => panic!("expected return"),
        };
        match &ret.kind {
            ExpressionKind::Member { index, .. } => assert_eq!(*index, Some(1)),
            other => panic!("expected member access, got {:?}", other),
        }
    }

    #[test]
    fn arrow_requires_pointer_to_struct() {
        let (_, _, _, ok) = analyze("class P { x: i32; } func f(p: P) -> i32 { return p->x; }");
        assert!(!ok);
    }

    #[test]
    fn overloads_prefer_exact_matches() {
        let (ast, scopes, _, ok) = analyze(
            "func g(x: i32) -> i32 { return x; } \
             func g(x: bool) -> i32 { return 0; } \
             func f() -> i32 { return g(true); }",
        );
        assert!(ok);
        let call = match &body_of(&ast, 2)[0].kind {
            ExpressionKind::Return(Some(value)) => value,
            _ => panic!("expected return"),
        };
        match &call.kind {
            ExpressionKind::Call { resolved, .. } => {
                let symbol = resolved.expect("resolved");
                let params = scopes.symbol(symbol).ty.parameters().unwrap();
                assert!(params[0].is_boolean());
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn ambiguous_overloads_are_errors() {
        let (_, _, _, ok) = analyze(
            "func g(x: i8) -> void { } \
             func g(x: i16) -> void { } \
             func f() -> void { g(300); }",
        );
        assert!(!ok);
    }

    #[test]
    fn calls_through_function_pointers_use_the_pointee_signature() {
        let (ast, _, _, ok) = analyze(
            "func id(x: i32) -> i32 { return x; } \
             func f() -> i32 { let g: (i32)* -> i32 = &id; return g(3); }",
        );
        assert!(ok);
        let ret = match &body_of(&ast, 1)[1].kind {
            ExpressionKind::Return(Some(value)) => value,
            _ => panic!("expected return"),
        };
        match &ret.kind {
            ExpressionKind::Call { resolved, .. } => assert!(resolved.is_none()),
            other => panic!("expected call, got {:?}", other),
        }
        assert_eq!(ret.ty(), ty::get("i32").unwrap());
    }

    #[test]
    fn calling_a_non_function_is_an_error() {
        let (_, _, _, ok) = analyze("func f(x: i32) -> void { x(); }");
        assert!(!ok);
    }

    #[test]
    fn return_type_mismatches_are_errors() {
        let (_, _, _, ok) = analyze("func f(p: i32*) -> i32 { return p; }");
        assert!(!ok);
    }

    #[test]
    fn error_types_do_not_cascade() {
        let (_, _, diag, ok) = analyze("func f() -> i32 { return nope + 1; }");
        assert!(!ok);
        // one error for the unknown identifier, none for the addition
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn rechecking_is_deterministic() {
        ty::initialize();
        let source = "func h() -> i8 { let b: i8 = 2; if (b == 2) b = 3; return 300; }";
        let mut diag = Diagnostics::silent();
        let file = diag.add_file("test.vi", source.to_owned());
        let tokens = Lexer::new(source).lex();
        let mut scopes = ScopeTree::new();
        let mut imports = ImportManager::new(".");
        let global = scopes.global();
        let mut ast = Parser::new(tokens, file, &mut diag, &mut scopes, &mut imports, global)
            .parse()
            .expect("parse failed");

        let mut first = ast.clone();
        assert!(check(&mut first, &scopes, &mut diag));
        let mut second = ast.clone();
        assert!(check(&mut second, &scopes, &mut diag));

        assert_eq!(format!("{:?}", first), format!("{:?}", second));
    }
}
