//! AST-to-IR lowering. Ordinary locals never get memory slots up front:
//! each symbol carries a history of (basic block, value) bindings, reads
//! look up the latest binding dominating the insertion point, and
//! control-flow merges insert phis for symbols whose branch values
//! diverged. Taking a variable's address materializes an alloca next to
//! the defining instruction and rebinds the symbol to the slot.

pub mod mangle;

use ast::{BinOp, Expression, ExpressionKind, Global, GlobalKind, ScopeTree, SymbolId, UnaryOp};
use ir::{BlockId, ValueId};

pub fn lower(globals: &[Global], scopes: &mut ScopeTree, module: &mut ir::Module) {
    let mut lowerer = Lowerer { scopes, module, builder: ir::Builder::new(), function: None };
    for global in globals {
        lowerer.lower_global(global);
    }
}

struct Lowerer<'a> {
    scopes: &'a mut ScopeTree,
    module: &'a mut ir::Module,
    builder: ir::Builder,
    function: Option<ir::FunctionId>,
}

impl<'a> Lowerer<'a> {
    fn lower_global(&mut self, global: &Global) {
        let function = match &global.kind {
            GlobalKind::Function(function) => function,
            GlobalKind::Class(_) => return,
        };

        let mut names = self.scopes.namespaces(function.symbol.scope);
        names.push(function.name.clone());
        let mangled = mangle::function(&names, function.ty);

        let ir_function = self.module.create_function(mangled, function.ty.to_ir(), function.pure);
        let address = self.module.function_value(ir_function);
        self.scopes.symbol_mut(function.symbol).values.push((None, address));

        let body = match &function.body {
            Some(body) => body,
            None => return,
        };

        self.function = Some(ir_function);
        self.builder = ir::Builder::new();
        let entry = self.builder.create_block(self.module, ir_function);
        self.builder.set_insert_point(entry);

        for (index, (arg_name, _)) in function.arguments.iter().enumerate() {
            let symbol = self.scopes.resolve(function.own_scope, arg_name).unwrap();
            let value = self.module.get_argument(ir_function, index);
            self.scopes.symbol_mut(symbol).values.push((Some(entry), value));
        }

        for node in body {
            self.lower_expression(node);
        }
    }

    fn lower_expression(&mut self, expr: &Expression) -> Option<ValueId> {
        match &expr.kind {
            ExpressionKind::Integer(value) => Some(self.module.const_int(*value, expr.ty().to_ir())),
            ExpressionKind::Boolean(value) => Some(self.module.const_bool(*value)),
            ExpressionKind::StringLiteral(text) => Some(self.module.global_string(text.clone().into_bytes())),

            ExpressionKind::Variable { names } => {
                let symbol_id = self.resolve_variable(expr.scope, names);
                self.read_symbol(symbol_id)
            }

            ExpressionKind::Unary { op, operand } => match op {
                UnaryOp::Negate => {
                    let value = self.lower_expression(operand)?;
                    Some(self.builder.neg(self.module, value))
                }
                UnaryOp::Deref => {
                    let value = self.lower_expression(operand)?;
                    Some(self.builder.load(self.module, value))
                }
                UnaryOp::AddressOf => self.lower_address_of(operand),
            },

            ExpressionKind::Binary { op: BinOp::Assign, lhs, rhs } => self.lower_assignment(lhs, rhs),

            ExpressionKind::Binary { op, lhs, rhs } => {
                let lhs = self.lower_expression(lhs)?;
                let rhs = self.lower_expression(rhs)?;
                let module = &mut *self.module;
                Some(match op {
                    BinOp::Add => self.builder.add(module, lhs, rhs),
                    BinOp::Sub => self.builder.sub(module, lhs, rhs),
                    BinOp::Mul => self.builder.mul(module, lhs, rhs),
                    BinOp::Div => self.builder.div(module, lhs, rhs),
                    BinOp::Eq => self.builder.eq(module, lhs, rhs),
                    BinOp::Ne => self.builder.ne(module, lhs, rhs),
                    BinOp::Lt => self.builder.lt(module, lhs, rhs),
                    BinOp::Le => self.builder.le(module, lhs, rhs),
                    BinOp::Gt => self.builder.gt(module, lhs, rhs),
                    BinOp::Ge => self.builder.ge(module, lhs, rhs),
                    BinOp::Assign => unreachable!(),
                })
            }

            ExpressionKind::Cast { operand } => {
                let value = self.lower_expression(operand)?;
                Some(self.lower_cast(value, operand.ty(), expr.ty()))
            }

            ExpressionKind::Call { callee, arguments, resolved } => {
                let callee_value = match resolved {
                    Some(symbol) => self.scopes.symbol(*symbol).last_value().unwrap(),
                    None => self.lower_expression(callee)?,
                };
                let mut args = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    args.push(self.lower_expression(argument)?);
                }
                Some(self.builder.call(self.module, callee_value, args))
            }

            ExpressionKind::Member { .. } => {
                let ptr = self.lower_lvalue(expr)?;
                Some(self.builder.load(self.module, ptr))
            }

            ExpressionKind::Return(value) => {
                let value = match value {
                    Some(value) => Some(self.lower_expression(value)?),
                    None => None,
                };
                self.builder.ret(self.module, value);
                None
            }

            ExpressionKind::Declaration { symbol, init, .. } => {
                if let Some(init) = init {
                    let value = self.lower_expression(init)?;
                    let block = self.builder.insert_point();
                    self.scopes.symbol_mut(*symbol).values.push((Some(block), value));
                }
                None
            }

            ExpressionKind::If { condition, then_body, else_body, .. } => {
                self.lower_if(expr, condition, then_body, else_body.as_deref());
                None
            }

            ExpressionKind::Compound(nodes) => {
                for node in nodes {
                    self.lower_expression(node);
                }
                None
            }
        }
    }

    fn resolve_variable(&self, scope: ast::ScopeId, names: &[String]) -> SymbolId {
        if names.len() > 1 {
            self.scopes.resolve_qualified(scope, names).unwrap()
        } else {
            self.scopes.resolve(scope, &names[0]).unwrap()
        }
    }

    /// A variable read: functions yield their address, slot-backed locals
    /// load through the slot, everything else is the latest SSA binding.
    fn read_symbol(&mut self, symbol_id: SymbolId) -> Option<ValueId> {
        let symbol = self.scopes.symbol(symbol_id);
        if symbol.ty.is_function() {
            return symbol.last_value();
        }

        let block = self.builder.insert_point();
        match symbol.latest_value(self.module, block) {
            Some(value) if self.module.is_alloca(value) => Some(self.builder.load(self.module, value)),
            Some(value) => Some(value),
            // reads before any binding yield a zero of the declared type
            None => {
                let ty = symbol.ty.to_ir();
                Some(self.module.const_int(0, ty))
            }
        }
    }

    fn lower_assignment(&mut self, lhs: &Expression, rhs: &Expression) -> Option<ValueId> {
        let value = self.lower_expression(rhs)?;

        match &lhs.kind {
            ExpressionKind::Variable { names } => {
                let symbol_id = self.resolve_variable(lhs.scope, names);
                let block = self.builder.insert_point();
                let latest = self.scopes.symbol(symbol_id).latest_value(self.module, block);
                match latest {
                    Some(slot) if self.module.is_alloca(slot) => {
                        self.builder.store(self.module, slot, value);
                    }
                    _ => self.scopes.symbol_mut(symbol_id).values.push((Some(block), value)),
                }
            }
            ExpressionKind::Unary { op: UnaryOp::Deref, operand } => {
                let ptr = self.lower_expression(operand)?;
                self.builder.store(self.module, ptr, value);
            }
            _ => {
                let ptr = self.lower_lvalue(lhs)?;
                self.builder.store(self.module, ptr, value);
            }
        }

        Some(value)
    }

    /// A pointer to the location an expression denotes.
    fn lower_lvalue(&mut self, expr: &Expression) -> Option<ValueId> {
        match &expr.kind {
            ExpressionKind::Variable { names } => {
                let symbol_id = self.resolve_variable(expr.scope, names);
                Some(self.materialize_variable(symbol_id))
            }
            ExpressionKind::Unary { op: UnaryOp::Deref, operand } => self.lower_expression(operand),
            ExpressionKind::Member { base, through_pointer, index, .. } => {
                let base_ptr = if *through_pointer { self.lower_expression(base)? } else { self.lower_lvalue(base)? };
                Some(self.builder.gep(self.module, base_ptr, index.unwrap()))
            }
            // rvalues spill into a temporary slot
            _ => {
                let value = self.lower_expression(expr)?;
                let slot = self.builder.alloca(self.module, expr.ty().to_ir());
                self.builder.store(self.module, slot, value);
                Some(slot)
            }
        }
    }

    /// Ensures the symbol is backed by an alloca: the slot is inserted
    /// directly after the latest value's defining instruction, the value is
    /// stored into it, and the symbol rebinds to the slot so later reads and
    /// writes go through memory.
    fn materialize_variable(&mut self, symbol_id: SymbolId) -> ValueId {
        let block = self.builder.insert_point();
        let symbol = self.scopes.symbol(symbol_id);
        let ty = symbol.ty.to_ir();

        match symbol.latest_value(self.module, block) {
            Some(slot) if self.module.is_alloca(slot) => slot,
            Some(value) => {
                let bind_block = match &self.module.value(value).kind {
                    ir::ValueKind::Instruction(instr) => {
                        let defining = instr.block;
                        self.builder.set_insert_after(Some(value));
                        defining
                    }
                    _ => block,
                };
                let slot = self.builder.alloca(self.module, ty);
                self.builder.set_insert_after(Some(slot));
                self.builder.store(self.module, slot, value);
                self.builder.set_insert_after(None);
                self.scopes.symbol_mut(symbol_id).values.push((Some(bind_block), slot));
                slot
            }
            None => {
                let slot = self.builder.alloca(self.module, ty);
                self.scopes.symbol_mut(symbol_id).values.push((Some(block), slot));
                slot
            }
        }
    }

    fn lower_address_of(&mut self, operand: &Expression) -> Option<ValueId> {
        if let ExpressionKind::Variable { names } = &operand.kind {
            let symbol_id = self.resolve_variable(operand.scope, names);
            if self.scopes.symbol(symbol_id).ty.is_function() {
                return self.scopes.symbol(symbol_id).last_value();
            }
            let slot = self.materialize_variable(symbol_id);
            return Some(self.builder.addr_of(self.module, slot));
        }

        // `&*p` and `&s.f`: drop the freshly emitted load and hand back the
        // pointer it read through
        let value = self.lower_expression(operand)?;
        match self.module.load_pointer_operand(value) {
            Some(ptr) => {
                self.module.erase_from_block(value);
                Some(ptr)
            }
            None => Some(self.builder.addr_of(self.module, value)),
        }
    }

    fn lower_cast(&mut self, value: ValueId, from: ty::TypeId, to: ty::TypeId) -> ValueId {
        if from == to {
            return value;
        }
        let to_ir = to.to_ir();
        if from.is_boolean() && to.is_integer() {
            return self.builder.zext(self.module, value, to_ir);
        }
        if from.is_integer() && to.is_integer() {
            let from_bits = from.size_bits();
            let to_bits = to.size_bits();
            if to_bits > from_bits {
                return if from.is_signed() {
                    self.builder.sext(self.module, value, to_ir)
                } else {
                    self.builder.zext(self.module, value, to_ir)
                };
            }
            if to_bits < from_bits {
                return self.builder.trunc(self.module, value, to_ir);
            }
        }
        value
    }

    /// The if/if-else block scheme. All new blocks are created while the
    /// start block is the insertion point, so each is dominated by it; at
    /// the merge, symbols whose branch values diverged get a phi with the
    /// entry value substituted on the side that did not rebind.
    fn lower_if(
        &mut self,
        expr: &Expression,
        condition: &Expression,
        then_body: &Expression,
        else_body: Option<&Expression>,
    ) {
        let condition_value = match self.lower_expression(condition) {
            Some(value) => value,
            None => return,
        };
        let function = self.function.unwrap();
        let start = self.builder.insert_point();

        let else_block = else_body.map(|_| self.builder.create_block(self.module, function));
        let then_block = self.builder.create_block(self.module, function);
        let merge = self.builder.create_block(self.module, function);

        self.builder.cond_br(self.module, condition_value, then_block, else_block.unwrap_or(merge));

        self.builder.set_insert_point(then_block);
        self.lower_expression(then_body);
        let then_end = self.builder.insert_point();
        self.builder.br(self.module, merge);

        let else_end = match (else_block, else_body) {
            (Some(else_block), Some(else_body)) => {
                self.builder.set_insert_point(else_block);
                self.lower_expression(else_body);
                let end = self.builder.insert_point();
                self.builder.br(self.module, merge);
                Some(end)
            }
            _ => None,
        };

        self.builder.set_insert_point(merge);

        let symbols = self.scopes.visible_symbols(expr.scope);
        match else_end {
            None => {
                for symbol_id in symbols {
                    let (then_value, start_value) = {
                        let symbol = self.scopes.symbol(symbol_id);
                        (symbol.latest_value(self.module, then_end), symbol.latest_value(self.module, start))
                    };
                    if let (Some(then_value), Some(start_value)) = (then_value, start_value) {
                        if then_value != start_value {
                            self.insert_phi(symbol_id, merge, (then_value, then_end), (start_value, start));
                        }
                    }
                }
            }
            Some(else_end) => {
                for symbol_id in symbols {
                    let (then_value, else_value, start_value) = {
                        let symbol = self.scopes.symbol(symbol_id);
                        (
                            symbol.latest_value(self.module, then_end),
                            symbol.latest_value(self.module, else_end),
                            symbol.latest_value(self.module, start),
                        )
                    };
                    if then_value == else_value {
                        continue;
                    }
                    let then_value = then_value.or(start_value);
                    let else_value = else_value.or(start_value);
                    if let (Some(then_value), Some(else_value)) = (then_value, else_value) {
                        self.insert_phi(symbol_id, merge, (then_value, then_end), (else_value, else_end));
                    }
                }
            }
        }
    }

    fn insert_phi(
        &mut self,
        symbol_id: SymbolId,
        merge: BlockId,
        first: (ValueId, BlockId),
        second: (ValueId, BlockId),
    ) {
        let ty = self.scopes.symbol(symbol_id).ty.to_ir();
        let phi = self.builder.phi(self.module, ty);
        self.module.add_phi_incoming(phi, first.0, first.1);
        self.module.add_phi_incoming(phi, second.0, second.1);
        self.scopes.symbol_mut(symbol_id).values.push((Some(merge), phi));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diagnostics::Diagnostics;
    use ir::{Opcode, ValueKind};
    use parser::{ImportManager, Lexer, Parser};
    use pretty_assertions::assert_eq;

    struct Compiled {
        module: ir::Module,
        diag: Diagnostics,
    }

    fn compile(source: &str) -> Compiled {
        compile_with_root(source, ".")
    }

    fn compile_with_root(source: &str, root: &str) -> Compiled {
        ty::initialize();
        let mut diag = Diagnostics::silent();
        let file = diag.add_file("test.vi", source.to_owned());
        let tokens = Lexer::new(source).lex();
        let mut scopes = ScopeTree::new();
        let mut imports = ImportManager::new(root);
        let global = scopes.global();
        let mut ast = Parser::new(tokens, file, &mut diag, &mut scopes, &mut imports, global)
            .parse()
            .expect("parse failed");
        assert!(typecheck::check(&mut ast, &scopes, &mut diag), "type check failed");
        assert!(typecheck::usage::check(&ast, &scopes, &mut diag), "usage check failed");

        let mut module = ir::Module::new("test.vi");
        module.set_abi(ir::Abi::SysV);
        lower(&ast, &mut scopes, &mut module);
        module.verify().expect("malformed IR");
        Compiled { module, diag }
    }

    fn function_named<'m>(module: &'m ir::Module, name: &str) -> &'m ir::Function {
        module
            .functions()
            .map(|(_, f)| f)
            .find(|f| f.name == name)
            .unwrap_or_else(|| panic!("no function named {}", name))
    }

    fn instructions_of(module: &ir::Module, function: &ir::Function) -> Vec<ValueId> {
        function.blocks.iter().flat_map(|&b| module.block(b).instructions.clone()).collect()
    }

    fn opcode_of(module: &ir::Module, value: ValueId) -> Option<Opcode> {
        match &module.value(value).kind {
            ValueKind::Instruction(instr) => Some(instr.opcode),
            _ => None,
        }
    }

    #[test]
    fn identity_function_returns_its_argument() {
        let compiled = compile("func id(x: i32) -> i32 { return x; }");

        let i32_ty = ty::get("i32").unwrap();
        let expected = mangle::function(&["id".to_owned()], ty::function(i32_ty, vec![i32_ty]));
        let function = function_named(&compiled.module, &expected);

        let body = instructions_of(&compiled.module, function);
        assert_eq!(body.len(), 1);
        let ret = body[0];
        assert_eq!(opcode_of(&compiled.module, ret), Some(Opcode::Ret));
        match &compiled.module.value(ret).kind {
            ValueKind::Instruction(instr) => {
                assert_eq!(instr.operands[0], function.arguments[0]);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn if_without_else_merges_through_a_phi() {
        let compiled =
            compile("func f(x: i32) -> i32 { let y: i32 = 1; if (x == 0) y = 2; return y; }");
        let module = &compiled.module;
        let function = module.functions().map(|(_, f)| f).next().unwrap();

        let body = instructions_of(module, function);
        let phi = body
            .iter()
            .copied()
            .find(|&v| opcode_of(module, v) == Some(Opcode::Phi))
            .expect("no phi at the merge");

        let (incoming, ret_operand) = match &module.value(phi).kind {
            ValueKind::Instruction(instr) => {
                let incoming: Vec<u64> = instr
                    .operands
                    .iter()
                    .map(|&v| match module.value(v).kind {
                        ValueKind::ConstantInt(value) => value,
                        _ => panic!("phi incoming is not a constant"),
                    })
                    .collect();
                let ret = body.iter().copied().find(|&v| opcode_of(module, v) == Some(Opcode::Ret)).unwrap();
                let ret_operand = match &module.value(ret).kind {
                    ValueKind::Instruction(instr) => instr.operands[0],
                    _ => unreachable!(),
                };
                (incoming, ret_operand)
            }
            _ => unreachable!(),
        };

        // 2 flows in from the then-block, 1 from the entry block
        assert_eq!(incoming, vec![2, 1]);
        assert_eq!(ret_operand, phi);
    }

    #[test]
    fn if_else_phi_substitutes_the_entry_value() {
        let compiled = compile(
            "func f(x: i32) -> i32 { let y: i32 = 1; if (x == 0) y = 2; else x = 0; return y; }",
        );
        let module = &compiled.module;
        let function = module.functions().map(|(_, f)| f).next().unwrap();
        let body = instructions_of(module, function);

        // y diverges (2 vs entry 1); x diverges (0 vs entry argument)
        let phis: Vec<_> = body.iter().copied().filter(|&v| opcode_of(module, v) == Some(Opcode::Phi)).collect();
        assert_eq!(phis.len(), 2);
    }

    #[test]
    fn address_of_materializes_an_alloca() {
        let compiled =
            compile("func g() -> i32 { let a: i32 = 5; let p: i32* = &a; return *p; }");
        let module = &compiled.module;
        let function = module.functions().map(|(_, f)| f).next().unwrap();
        let body = instructions_of(module, function);

        let alloca = body
            .iter()
            .copied()
            .find(|&v| opcode_of(module, v) == Some(Opcode::Alloca))
            .expect("no alloca was materialized");

        // the slot is initialized from the binding it replaced
        let store = body.iter().copied().find(|&v| opcode_of(module, v) == Some(Opcode::Store)).unwrap();
        match &module.value(store).kind {
            ValueKind::Instruction(instr) => {
                assert_eq!(instr.operands[0], alloca);
                match module.value(instr.operands[1]).kind {
                    ValueKind::ConstantInt(value) => assert_eq!(value, 5),
                    _ => panic!("stored value is not the constant 5"),
                }
            }
            _ => unreachable!(),
        }

        // `return *p` loads through the slot's address
        let loads: Vec<_> = body.iter().copied().filter(|&v| opcode_of(module, v) == Some(Opcode::Load)).collect();
        assert!(!loads.is_empty());
        let ret = body.iter().copied().find(|&v| opcode_of(module, v) == Some(Opcode::Ret)).unwrap();
        match &module.value(ret).kind {
            ValueKind::Instruction(instr) => {
                assert_eq!(opcode_of(module, instr.operands[0]), Some(Opcode::Load));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn narrowed_literals_reach_the_ir_truncated() {
        let compiled = compile("func h() -> i8 { return 300; }");
        assert_eq!(compiled.diag.warnings_of_class("implicit").len(), 1);

        let module = &compiled.module;
        let function = module.functions().map(|(_, f)| f).next().unwrap();
        let body = instructions_of(module, function);
        let ret = body.iter().copied().find(|&v| opcode_of(module, v) == Some(Opcode::Ret)).unwrap();
        match &module.value(ret).kind {
            ValueKind::Instruction(instr) => match module.value(instr.operands[0]).kind {
                ValueKind::ConstantInt(value) => assert_eq!(value, 44),
                _ => panic!("expected constant return"),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn bool_casts_lower_to_zext() {
        let compiled = compile("func f() -> i32 { return true; }");
        let module = &compiled.module;
        let function = module.functions().map(|(_, f)| f).next().unwrap();
        let body = instructions_of(module, function);
        assert!(body.iter().any(|&v| opcode_of(module, v) == Some(Opcode::Zext)));
    }

    #[test]
    fn calls_resolve_to_the_callee_function() {
        let compiled = compile("func seven() -> i32 { return 7; } func main() -> i32 { return seven(); }");
        let module = &compiled.module;

        let i32_ty = ty::get("i32").unwrap();
        let main_name = mangle::function(&["main".to_owned()], ty::function(i32_ty, vec![]));
        let main = function_named(module, &main_name);
        let body = instructions_of(module, main);
        let call = body.iter().copied().find(|&v| opcode_of(module, v) == Some(Opcode::Call)).unwrap();

        match &module.value(call).kind {
            ValueKind::Instruction(instr) => match module.value(instr.operands[0]).kind {
                ValueKind::FunctionRef(callee) => {
                    let seven_name = mangle::function(&["seven".to_owned()], ty::function(i32_ty, vec![]));
                    assert_eq!(module.function(callee).name, seven_name);
                }
                _ => panic!("callee is not a function reference"),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn function_pointer_calls_lower_through_the_binding() {
        let compiled = compile(
            "func id(x: i32) -> i32 { return x; } \
             func f() -> i32 { let g: (i32)* -> i32 = &id; return g(3); }",
        );
        let module = &compiled.module;

        let i32_ty = ty::get("i32").unwrap();
        let f_name = mangle::function(&["f".to_owned()], ty::function(i32_ty, vec![]));
        let f = function_named(module, &f_name);
        let body = instructions_of(module, f);
        let call = body.iter().copied().find(|&v| opcode_of(module, v) == Some(Opcode::Call)).unwrap();
        match &module.value(call).kind {
            ValueKind::Instruction(instr) => {
                assert!(matches!(module.value(instr.operands[0]).kind, ValueKind::FunctionRef(_)));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn member_stores_go_through_geps() {
        let compiled = compile(
            "class P { x: i32; y: i32; } func f() -> i32 { let p: P; p.y = 3; return p.y; }",
        );
        let module = &compiled.module;
        let function = module.functions().map(|(_, f)| f).next().unwrap();
        let body = instructions_of(module, function);

        assert!(body.iter().any(|&v| opcode_of(module, v) == Some(Opcode::Alloca)));
        assert!(body.iter().any(|&v| matches!(opcode_of(module, v), Some(Opcode::Gep(1)))));
    }

    #[test]
    fn string_literals_become_byte_globals() {
        let compiled = compile("func f() -> u8* { return \"hi\"; }");
        let module = &compiled.module;
        let function = module.functions().map(|(_, f)| f).next().unwrap();
        let body = instructions_of(module, function);
        let ret = body.iter().copied().find(|&v| opcode_of(module, v) == Some(Opcode::Ret)).unwrap();
        match &module.value(ret).kind {
            ValueKind::Instruction(instr) => {
                assert!(matches!(module.value(instr.operands[0]).kind, ValueKind::GlobalRef(_)));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn declaration_only_functions_stay_bodyless() {
        let compiled = compile("func ext() -> void; func f() -> void { ext(); }");
        let module = &compiled.module;
        let ext_name = mangle::function(&["ext".to_owned()], ty::function(ty::void(), vec![]));
        let ext = function_named(module, &ext_name);
        assert!(ext.blocks.is_empty());
    }

    #[test]
    fn latest_values_respect_dominance() {
        let compiled =
            compile("func f(x: i32) -> i32 { let y: i32 = 1; if (x == 0) y = 2; return y; }");
        let module = &compiled.module;

        // for every block, walking any symbol history never yields a value
        // bound in a non-dominating block
        for (_, function) in module.functions() {
            for &block in &function.blocks {
                for &value in &module.block(block).instructions {
                    if let ValueKind::Instruction(instr) = &module.value(value).kind {
                        if instr.opcode == Opcode::Phi {
                            for &incoming_block in &instr.blocks {
                                assert!(module
                                    .block(block)
                                    .preds
                                    .contains(&incoming_block));
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn imported_functions_compile_into_the_unit() {
        let root = std::env::temp_dir().join(format!("viper-codegen-{}", std::process::id()));
        let _ = std::fs::create_dir_all(&root);
        std::fs::write(root.join("m.vi"), "export func k() -> i32 { return 7; }").unwrap();

        let compiled = compile_with_root(
            "import m; func main() -> i32 { return k(); }",
            root.to_str().unwrap(),
        );
        let module = &compiled.module;

        let i32_ty = ty::get("i32").unwrap();
        let k_name = mangle::function(&["m".to_owned(), "k".to_owned()], ty::function(i32_ty, vec![]));
        let k = function_named(module, &k_name);

        // k's body returns the constant 7
        let body = instructions_of(module, k);
        let ret = body.iter().copied().find(|&v| opcode_of(module, v) == Some(Opcode::Ret)).unwrap();
        match &module.value(ret).kind {
            ValueKind::Instruction(instr) => match module.value(instr.operands[0]).kind {
                ValueKind::ConstantInt(value) => assert_eq!(value, 7),
                _ => panic!("expected constant return"),
            },
            _ => unreachable!(),
        }

        // and main calls it
        let main_name = mangle::function(&["main".to_owned()], ty::function(i32_ty, vec![]));
        let main = function_named(module, &main_name);
        let main_body = instructions_of(module, main);
        assert!(main_body.iter().any(|&v| opcode_of(module, v) == Some(Opcode::Call)));
    }

    #[test]
    fn imported_internal_helpers_still_compile() {
        let root = std::env::temp_dir().join(format!("viper-codegen-helper-{}", std::process::id()));
        let _ = std::fs::create_dir_all(&root);
        std::fs::write(
            root.join("lib.vi"),
            "func helper() -> i32 { return 3; } export func api() -> i32 { return helper(); }",
        )
        .unwrap();

        // the unexported helper is not visible here, but the unit's own call
        // to it must still typecheck and lower
        let compiled = compile_with_root(
            "import lib; func main() -> i32 { return api(); }",
            root.to_str().unwrap(),
        );
        let module = &compiled.module;

        let i32_ty = ty::get("i32").unwrap();
        let helper_name = mangle::function(&["lib".to_owned(), "helper".to_owned()], ty::function(i32_ty, vec![]));
        let helper = function_named(module, &helper_name);
        assert!(!helper.blocks.is_empty());

        // api's call binds to the injected helper definition
        let api_name = mangle::function(&["lib".to_owned(), "api".to_owned()], ty::function(i32_ty, vec![]));
        let api = function_named(module, &api_name);
        let body = instructions_of(module, api);
        let call = body.iter().copied().find(|&v| opcode_of(module, v) == Some(Opcode::Call)).unwrap();
        match &module.value(call).kind {
            ValueKind::Instruction(instr) => match module.value(instr.operands[0]).kind {
                ValueKind::FunctionRef(callee) => assert_eq!(module.function(callee).name, helper_name),
                _ => panic!("callee is not a function reference"),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn unexported_imports_fail_typecheck() {
        let root = std::env::temp_dir().join(format!("viper-codegen-hidden-{}", std::process::id()));
        let _ = std::fs::create_dir_all(&root);
        std::fs::write(root.join("priv.vi"), "func k() -> i32 { return 7; }").unwrap();

        ty::initialize();
        let source = "import priv; func main() -> i32 { return k(); }";
        let mut diag = Diagnostics::silent();
        let file = diag.add_file("test.vi", source.to_owned());
        let tokens = Lexer::new(source).lex();
        let mut scopes = ScopeTree::new();
        let mut imports = ImportManager::new(root.to_str().unwrap());
        let global = scopes.global();
        let mut ast = Parser::new(tokens, file, &mut diag, &mut scopes, &mut imports, global)
            .parse()
            .expect("parse failed");
        assert!(!typecheck::check(&mut ast, &scopes, &mut diag));
        assert!(diag.emitted().iter().any(|e| e.message.contains("undeclared identifier")));
    }
}
