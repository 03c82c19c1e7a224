//! Pass B of semantic analysis: statement/expression usage checks. Runs
//! top-down with a statement-position flag after pass A has typed the tree.

use ast::{BinOp, Expression, ExpressionKind, Global, GlobalKind, ScopeTree, UnaryOp};
use codespan::FileId;
use diagnostics::Diagnostics;

/// Runs the usage check over every global. Returns false when any error was
/// reported.
pub fn check(globals: &[Global], scopes: &ScopeTree, diag: &mut Diagnostics) -> bool {
    let mut checker = UsageChecker { scopes, diag, file: None, failed: false };
    for global in globals {
        checker.check_global(global);
    }
    !checker.failed
}

struct UsageChecker<'a> {
    scopes: &'a ScopeTree,
    diag: &'a mut Diagnostics,
    file: Option<FileId>,
    failed: bool,
}

impl<'a> UsageChecker<'a> {
    fn file(&self) -> FileId {
        self.file.unwrap()
    }

    fn error(&mut self, span: codespan::Span, message: String) {
        let file = self.file();
        self.diag.error(file, span, message);
        self.failed = true;
    }

    fn check_global(&mut self, global: &Global) {
        self.file = Some(global.file);
        if let GlobalKind::Function(function) = &global.kind {
            if let Some(body) = &function.body {
                self.check_body(body);
            }
        }
    }

    fn check_body(&mut self, nodes: &[Expression]) {
        for (position, node) in nodes.iter().enumerate() {
            self.check_expression(node, true);
            if matches!(node.kind, ExpressionKind::Return(_)) && position + 1 < nodes.len() {
                let file = self.file();
                self.diag.warning("unreachable", file, nodes[position + 1].span, "unreachable code after return");
            }
        }
    }

    fn check_expression(&mut self, expr: &Expression, statement: bool) {
        if statement && is_effect_free(&expr.kind) {
            let file = self.file();
            self.diag.warning("unused", file, expr.span, "expression result is unused");
        }

        match &expr.kind {
            ExpressionKind::Integer(_)
            | ExpressionKind::Boolean(_)
            | ExpressionKind::StringLiteral(_)
            | ExpressionKind::Variable { .. } => {}

            ExpressionKind::Unary { op, operand } => {
                if *op == UnaryOp::AddressOf && !is_addressable(&operand.kind) {
                    self.error(expr.span, "cannot take the address of this expression".to_owned());
                }
                self.check_expression(operand, false);
            }

            ExpressionKind::Binary { op, lhs, rhs } => {
                if *op == BinOp::Assign && !is_addressable(&lhs.kind) {
                    self.error(expr.span, "cannot assign to this expression".to_owned());
                }
                self.check_expression(lhs, false);
                self.check_expression(rhs, false);
            }

            ExpressionKind::Call { callee, arguments, resolved } => {
                self.check_expression(callee, false);
                for argument in arguments {
                    self.check_expression(argument, false);
                }
                if let Some(symbol) = resolved {
                    let symbol = self.scopes.symbol(*symbol);
                    if self.scopes.is_pure_context(expr.scope) && !symbol.pure {
                        let name = ast::scope::resolve_sym(symbol.name);
                        self.error(
                            expr.span,
                            format!("calling impure function '{}' from a pure context", name),
                        );
                    }
                }
            }

            ExpressionKind::Member { base, .. } => self.check_expression(base, false),
            ExpressionKind::Cast { operand } => self.check_expression(operand, false),

            ExpressionKind::Return(value) => {
                if let Some(value) = value {
                    self.check_expression(value, false);
                }
            }

            ExpressionKind::Declaration { init, .. } => {
                if let Some(init) = init {
                    self.check_expression(init, false);
                }
            }

            ExpressionKind::If { condition, then_body, else_body, .. } => {
                if !statement {
                    self.error(expr.span, "'if' statement used as an expression".to_owned());
                }
                self.check_expression(condition, false);
                self.check_expression(then_body, true);
                if let Some(else_body) = else_body {
                    self.check_expression(else_body, true);
                }
            }

            ExpressionKind::Compound(nodes) => self.check_body(nodes),
        }
    }
}

/// Lvalues: things with a location that can be assigned to or have their
/// address taken.
fn is_addressable(kind: &ExpressionKind) -> bool {
    match kind {
        ExpressionKind::Variable { .. } | ExpressionKind::Member { .. } => true,
        ExpressionKind::Unary { op: UnaryOp::Deref, .. } => true,
        _ => false,
    }
}

fn is_effect_free(kind: &ExpressionKind) -> bool {
    match kind {
        ExpressionKind::Integer(_)
        | ExpressionKind::Boolean(_)
        | ExpressionKind::StringLiteral(_)
        | ExpressionKind::Variable { .. }
        | ExpressionKind::Member { .. }
        | ExpressionKind::Cast { .. }
        | ExpressionKind::Unary { .. } => true,
        ExpressionKind::Binary { op, .. } => *op != BinOp::Assign,
        _ => false,
    }
}
