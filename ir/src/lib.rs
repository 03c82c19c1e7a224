//! Typed SSA intermediate representation targeted by the lowering layer.
//!
//! A [`Module`] owns every function, basic block, value and byte global in
//! per-kind tables; handles are typed indices into those tables, so the
//! cyclic references (blocks to predecessors, instructions to operands)
//! never own each other. The [`Builder`] appends instructions at an
//! insertion point the way the front-end drives it. Basic blocks record
//! the insertion point that was active when they were created as their
//! immediate dominator, which is exactly the dominance query the
//! per-symbol value histories need.

mod emit;

use std::fmt::Write as _;
use std::io::{self, Write};

/// Handle to a [`Value`] in its module's value table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ValueId(pub(crate) u32);

/// Handle to a [`BasicBlock`] in its module's block table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockId(pub(crate) u32);

/// Handle to a [`Function`] in its module's function table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FunctionId(pub(crate) u32);

/// Handle to a [`GlobalString`] in its module's global table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GlobalId(pub(crate) u32);

impl ValueId {
    /// The `%N` number the printer shows for this value.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl BlockId {
    /// The `bbN` number the printer shows for this block.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl FunctionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl GlobalId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Void,
    Bool,
    Integer { bits: u32, signed: bool },
    Pointer(Box<Type>),
    Function { ret: Box<Type>, params: Vec<Type> },
    Struct(Vec<Type>),
}

impl Type {
    pub fn pointer_to(self) -> Type {
        Type::Pointer(Box::new(self))
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        *self == Type::Void
    }

    /// Size in bytes when stored in memory.
    pub fn size(&self) -> u32 {
        match self {
            Type::Void => 0,
            Type::Bool => 1,
            Type::Integer { bits, .. } => bits / 8,
            Type::Pointer(_) | Type::Function { .. } => 8,
            Type::Struct(fields) => {
                let mut offset = 0;
                for field in fields {
                    offset = align_to(offset, field.align()) + field.size();
                }
                align_to(offset, self.align())
            }
        }
    }

    pub fn align(&self) -> u32 {
        match self {
            Type::Void => 1,
            Type::Bool => 1,
            Type::Integer { bits, .. } => (bits / 8).max(1),
            Type::Pointer(_) | Type::Function { .. } => 8,
            Type::Struct(fields) => fields.iter().map(Type::align).max().unwrap_or(1),
        }
    }

    /// Byte offset of field `index` in a struct type.
    pub fn field_offset(&self, index: usize) -> u32 {
        match self {
            Type::Struct(fields) => {
                let mut offset = 0;
                for field in &fields[..index] {
                    offset = align_to(offset, field.align()) + field.size();
                }
                align_to(offset, fields[index].align())
            }
            _ => unreachable!("field_offset on non-struct type"),
        }
    }

    pub fn field_type(&self, index: usize) -> &Type {
        match self {
            Type::Struct(fields) => &fields[index],
            _ => unreachable!("field_type on non-struct type"),
        }
    }

    pub fn return_type(&self) -> &Type {
        match self {
            Type::Function { ret, .. } => ret,
            _ => unreachable!("return_type on non-function type"),
        }
    }
}

fn align_to(value: u32, align: u32) -> u32 {
    (value + align - 1) / align * align
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "i1"),
            Type::Integer { bits, signed: true } => write!(f, "i{}", bits),
            Type::Integer { bits, signed: false } => write!(f, "u{}", bits),
            Type::Pointer(inner) => write!(f, "{}*", inner),
            Type::Function { ret, params } => {
                write!(f, "(")?;
                for (i, param) in params.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ") -> {}", ret)
            }
            Type::Struct(fields) => {
                write!(f, "{{ ")?;
                for (i, field) in fields.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, " }}")
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct Value {
    pub ty: Type,
    pub kind: ValueKind,
}

#[derive(Clone, Debug)]
pub enum ValueKind {
    Argument { function: FunctionId, index: usize },
    ConstantInt(u64),
    ConstantBool(bool),
    FunctionRef(FunctionId),
    GlobalRef(GlobalId),
    Instruction(Instruction),
}

#[derive(Clone, Debug)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<ValueId>,
    pub blocks: Vec<BlockId>,
    pub block: BlockId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    Alloca,
    Load,
    Store,
    AddrOf,
    Gep(usize),
    Neg,
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Sext,
    Zext,
    Trunc,
    CondBr,
    Br,
    Phi,
    Ret,
    Call,
}

impl Opcode {
    fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Alloca => "alloca",
            Opcode::Load => "load",
            Opcode::Store => "store",
            Opcode::AddrOf => "addrof",
            Opcode::Gep(_) => "gep",
            Opcode::Neg => "neg",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Eq => "eq",
            Opcode::Ne => "ne",
            Opcode::Lt => "lt",
            Opcode::Le => "le",
            Opcode::Gt => "gt",
            Opcode::Ge => "ge",
            Opcode::Sext => "sext",
            Opcode::Zext => "zext",
            Opcode::Trunc => "trunc",
            Opcode::CondBr => "condbr",
            Opcode::Br => "br",
            Opcode::Phi => "phi",
            Opcode::Ret => "ret",
            Opcode::Call => "call",
        }
    }
}

#[derive(Clone, Debug)]
pub struct BasicBlock {
    pub function: FunctionId,
    pub instructions: Vec<ValueId>,
    pub idom: Option<BlockId>,
    pub preds: Vec<BlockId>,
}

#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub ty: Type,
    pub pure: bool,
    pub blocks: Vec<BlockId>,
    pub arguments: Vec<ValueId>,
    value: Option<ValueId>,
}

#[derive(Clone, Debug)]
pub struct GlobalString {
    pub bytes: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Abi {
    SysV,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Elf,
}

pub struct Module {
    pub name: String,
    pub(crate) values: Vec<Value>,
    pub(crate) blocks: Vec<BasicBlock>,
    pub(crate) functions: Vec<Function>,
    pub(crate) globals: Vec<GlobalString>,
    abi: Option<Abi>,
    format: Option<OutputFormat>,
    opt_level: u32,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
            blocks: Vec::new(),
            functions: Vec::new(),
            globals: Vec::new(),
            abi: None,
            format: None,
            opt_level: 0,
        }
    }

    pub fn set_abi(&mut self, abi: Abi) {
        self.abi = Some(abi);
    }

    pub fn set_output_format(&mut self, format: OutputFormat) {
        self.format = Some(format);
    }

    pub fn set_opt_level(&mut self, level: u32) {
        self.opt_level = level;
    }

    pub fn opt_level(&self) -> u32 {
        self.opt_level
    }

    pub(crate) fn add_value(&mut self, value: Value) -> ValueId {
        self.values.push(value);
        ValueId(self.values.len() as u32 - 1)
    }

    pub(crate) fn add_block(&mut self, block: BasicBlock) -> BlockId {
        self.blocks.push(block);
        BlockId(self.blocks.len() as u32 - 1)
    }

    /// Creates a function and its argument values. A function with no basic
    /// blocks is a declaration and becomes an undefined symbol in the object.
    pub fn create_function(&mut self, name: impl Into<String>, ty: Type, pure: bool) -> FunctionId {
        let params = match &ty {
            Type::Function { params, .. } => params.clone(),
            _ => unreachable!("create_function with non-function type"),
        };

        self.functions.push(Function {
            name: name.into(),
            ty: ty.clone(),
            pure,
            blocks: Vec::new(),
            arguments: Vec::new(),
            value: None,
        });
        let function = FunctionId(self.functions.len() as u32 - 1);

        for (index, param) in params.into_iter().enumerate() {
            let arg = self.add_value(Value { ty: param, kind: ValueKind::Argument { function, index } });
            self.functions[function.index()].arguments.push(arg);
        }

        let value = self.add_value(Value { ty: ty.pointer_to(), kind: ValueKind::FunctionRef(function) });
        self.functions[function.index()].value = Some(value);

        function
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.index()]
    }

    /// The function's own address value, usable as a callee or operand.
    pub fn function_value(&self, id: FunctionId) -> ValueId {
        self.functions[id.index()].value.unwrap()
    }

    pub fn functions(&self) -> impl Iterator<Item = (FunctionId, &Function)> {
        self.functions.iter().enumerate().map(|(index, function)| (FunctionId(index as u32), function))
    }

    pub fn get_argument(&self, function: FunctionId, index: usize) -> ValueId {
        self.functions[function.index()].arguments[index]
    }

    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.index()]
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    /// True when `a` dominates `b`. Every block is dominated by itself and by
    /// the chain of insertion points that were active when it was created.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut current = Some(b);
        while let Some(bb) = current {
            if bb == a {
                return true;
            }
            current = self.blocks[bb.index()].idom;
        }
        false
    }

    pub fn const_int(&mut self, value: u64, ty: Type) -> ValueId {
        let masked = match &ty {
            Type::Integer { bits, .. } if *bits < 64 => value & ((1u64 << bits) - 1),
            _ => value,
        };
        self.add_value(Value { ty, kind: ValueKind::ConstantInt(masked) })
    }

    pub fn const_bool(&mut self, value: bool) -> ValueId {
        self.add_value(Value { ty: Type::Bool, kind: ValueKind::ConstantBool(value) })
    }

    /// Interns a private constant byte string; the value is a `u8*` into it.
    pub fn global_string(&mut self, bytes: Vec<u8>) -> ValueId {
        self.globals.push(GlobalString { bytes });
        let global = GlobalId(self.globals.len() as u32 - 1);
        let ty = Type::Integer { bits: 8, signed: false }.pointer_to();
        self.add_value(Value { ty, kind: ValueKind::GlobalRef(global) })
    }

    pub fn is_alloca(&self, id: ValueId) -> bool {
        matches!(&self.values[id.index()].kind, ValueKind::Instruction(instr) if instr.opcode == Opcode::Alloca)
    }

    /// For a load instruction, the pointer it reads through.
    pub fn load_pointer_operand(&self, id: ValueId) -> Option<ValueId> {
        match &self.values[id.index()].kind {
            ValueKind::Instruction(instr) if instr.opcode == Opcode::Load => Some(instr.operands[0]),
            _ => None,
        }
    }

    /// Removes an instruction from its block. The value stays allocated but
    /// is no longer printed or emitted; the caller guarantees it has no
    /// remaining uses.
    pub fn erase_from_block(&mut self, id: ValueId) {
        if let ValueKind::Instruction(instr) = &self.values[id.index()].kind {
            let block = instr.block;
            self.blocks[block.index()].instructions.retain(|&v| v != id);
        }
    }

    pub fn add_phi_incoming(&mut self, phi: ValueId, value: ValueId, block: BlockId) {
        match &mut self.values[phi.index()].kind {
            ValueKind::Instruction(instr) if instr.opcode == Opcode::Phi => {
                instr.operands.push(value);
                instr.blocks.push(block);
            }
            _ => unreachable!("add_phi_incoming on non-phi value"),
        }
    }

    /// Structural sanity: phis carry exactly one incoming per predecessor,
    /// and every instruction's block belongs to its function.
    pub fn verify(&self) -> Result<(), String> {
        for (index, value) in self.values.iter().enumerate() {
            let id = ValueId(index as u32);
            let instr = match &value.kind {
                ValueKind::Instruction(instr) => instr,
                _ => continue,
            };
            if !self.blocks[instr.block.index()].instructions.contains(&id) {
                // erased instructions are exempt from checks
                continue;
            }
            if instr.opcode == Opcode::Phi {
                let preds = &self.blocks[instr.block.index()].preds;
                if instr.blocks.len() != preds.len() {
                    return Err(format!(
                        "phi %{} has {} incoming values for {} predecessors",
                        id.index(),
                        instr.blocks.len(),
                        preds.len()
                    ));
                }
                for pred in preds {
                    if !instr.blocks.contains(pred) {
                        return Err(format!("phi %{} missing incoming for bb{}", id.index(), pred.index()));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn print(&self, out: &mut impl Write) -> io::Result<()> {
        let mut text = String::new();
        let _ = writeln!(text, "module \"{}\"", self.name);
        for function in &self.functions {
            let _ = write!(text, "\nfunc @{}{}", function.name, if function.pure { " pure" } else { "" });
            let _ = write!(text, " {}", function.ty);
            if function.blocks.is_empty() {
                let _ = writeln!(text, ";");
                continue;
            }
            let _ = writeln!(text, " {{");
            for &block in &function.blocks {
                let _ = writeln!(text, "bb{}:", block.index());
                for &value in &self.blocks[block.index()].instructions {
                    let _ = writeln!(text, "  {}", self.format_instruction(value));
                }
            }
            let _ = writeln!(text, "}}");
        }
        out.write_all(text.as_bytes())
    }

    pub fn print_to_string(&self) -> String {
        let mut buf = Vec::new();
        self.print(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn format_operand(&self, id: ValueId) -> String {
        match &self.values[id.index()].kind {
            ValueKind::ConstantInt(value) => format!("{} {}", self.values[id.index()].ty, value),
            ValueKind::ConstantBool(value) => format!("i1 {}", value),
            ValueKind::FunctionRef(function) => format!("@{}", self.functions[function.index()].name),
            ValueKind::GlobalRef(global) => format!("@str.{}", global.index()),
            _ => format!("%{}", id.index()),
        }
    }

    fn format_instruction(&self, id: ValueId) -> String {
        let instr = match &self.values[id.index()].kind {
            ValueKind::Instruction(instr) => instr,
            _ => unreachable!(),
        };
        let mut text = String::new();
        if !self.values[id.index()].ty.is_void() {
            let _ = write!(text, "%{} = ", id.index());
        }
        let _ = write!(text, "{}", instr.opcode.mnemonic());
        if let Opcode::Alloca = instr.opcode {
            let _ = write!(text, " {}", self.values[id.index()].ty.pointee().unwrap());
        }
        if let Opcode::Gep(index) = instr.opcode {
            let _ = write!(text, " {}", index);
        }
        if instr.opcode == Opcode::Phi {
            let _ = write!(text, " {}", self.values[id.index()].ty);
            for (value, block) in instr.operands.iter().zip(&instr.blocks) {
                let _ = write!(text, " [{}, bb{}]", self.format_operand(*value), block.index());
            }
            return text;
        }
        for (i, &operand) in instr.operands.iter().enumerate() {
            let _ = write!(text, "{} {}", if i == 0 { "" } else { "," }, self.format_operand(operand));
        }
        for (i, &block) in instr.blocks.iter().enumerate() {
            let _ = write!(text, "{} bb{}", if i == 0 && instr.operands.is_empty() { "" } else { "," }, block.index());
        }
        text
    }

    /// Emits the module as a relocatable object in the configured output
    /// format for the configured ABI.
    pub fn emit(&self, out: &mut impl Write) -> io::Result<()> {
        assert_eq!(self.abi, Some(Abi::SysV), "module ABI not configured");
        assert_eq!(self.format, Some(OutputFormat::Elf), "module output format not configured");
        emit::emit_elf(self, out)
    }
}

/// Appends instructions at an insertion point. `set_insert_after` switches to
/// positional insertion directly after an existing instruction, which the
/// lowerer uses to materialize allocas next to a value's definition.
#[derive(Default)]
pub struct Builder {
    insert_point: Option<BlockId>,
    insert_after: Option<ValueId>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_insert_point(&mut self, block: BlockId) {
        self.insert_point = Some(block);
        self.insert_after = None;
    }

    pub fn insert_point(&self) -> BlockId {
        self.insert_point.unwrap()
    }

    pub fn set_insert_after(&mut self, after: Option<ValueId>) {
        self.insert_after = after;
    }

    /// Creates a block whose immediate dominator is the current insertion
    /// point (or none, for entry blocks).
    pub fn create_block(&mut self, module: &mut Module, function: FunctionId) -> BlockId {
        let block = module.add_block(BasicBlock {
            function,
            instructions: Vec::new(),
            idom: self.insert_point,
            preds: Vec::new(),
        });
        module.functions[function.index()].blocks.push(block);
        block
    }

    fn push(&mut self, module: &mut Module, ty: Type, opcode: Opcode, operands: Vec<ValueId>, blocks: Vec<BlockId>) -> ValueId {
        let block = match self.insert_after {
            Some(after) => match &module.values[after.index()].kind {
                ValueKind::Instruction(instr) => instr.block,
                _ => self.insert_point(),
            },
            None => self.insert_point(),
        };
        let id = module.add_value(Value { ty, kind: ValueKind::Instruction(Instruction { opcode, operands, blocks, block }) });
        match self.insert_after {
            Some(after) => {
                let pos = module.blocks[block.index()].instructions.iter().position(|&v| v == after);
                match pos {
                    Some(pos) => module.blocks[block.index()].instructions.insert(pos + 1, id),
                    None => module.blocks[block.index()].instructions.push(id),
                }
            }
            None => module.blocks[block.index()].instructions.push(id),
        }
        id
    }

    pub fn alloca(&mut self, module: &mut Module, ty: Type) -> ValueId {
        self.push(module, ty.pointer_to(), Opcode::Alloca, Vec::new(), Vec::new())
    }

    pub fn load(&mut self, module: &mut Module, ptr: ValueId) -> ValueId {
        let ty = module.values[ptr.index()].ty.pointee().cloned().unwrap();
        self.push(module, ty, Opcode::Load, vec![ptr], Vec::new())
    }

    pub fn store(&mut self, module: &mut Module, ptr: ValueId, value: ValueId) -> ValueId {
        self.push(module, Type::Void, Opcode::Store, vec![ptr, value], Vec::new())
    }

    pub fn addr_of(&mut self, module: &mut Module, value: ValueId) -> ValueId {
        let ty = module.values[value.index()].ty.clone();
        self.push(module, ty, Opcode::AddrOf, vec![value], Vec::new())
    }

    pub fn gep(&mut self, module: &mut Module, ptr: ValueId, index: usize) -> ValueId {
        let field = {
            let pointee = module.values[ptr.index()].ty.pointee().unwrap();
            pointee.field_type(index).clone()
        };
        self.push(module, field.pointer_to(), Opcode::Gep(index), vec![ptr], Vec::new())
    }

    pub fn neg(&mut self, module: &mut Module, value: ValueId) -> ValueId {
        let ty = module.values[value.index()].ty.clone();
        self.push(module, ty, Opcode::Neg, vec![value], Vec::new())
    }

    fn arith(&mut self, module: &mut Module, opcode: Opcode, lhs: ValueId, rhs: ValueId) -> ValueId {
        let ty = module.values[lhs.index()].ty.clone();
        self.push(module, ty, opcode, vec![lhs, rhs], Vec::new())
    }

    pub fn add(&mut self, module: &mut Module, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.arith(module, Opcode::Add, lhs, rhs)
    }

    pub fn sub(&mut self, module: &mut Module, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.arith(module, Opcode::Sub, lhs, rhs)
    }

    pub fn mul(&mut self, module: &mut Module, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.arith(module, Opcode::Mul, lhs, rhs)
    }

    pub fn div(&mut self, module: &mut Module, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.arith(module, Opcode::Div, lhs, rhs)
    }

    fn compare(&mut self, module: &mut Module, opcode: Opcode, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.push(module, Type::Bool, opcode, vec![lhs, rhs], Vec::new())
    }

    pub fn eq(&mut self, module: &mut Module, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.compare(module, Opcode::Eq, lhs, rhs)
    }

    pub fn ne(&mut self, module: &mut Module, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.compare(module, Opcode::Ne, lhs, rhs)
    }

    pub fn lt(&mut self, module: &mut Module, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.compare(module, Opcode::Lt, lhs, rhs)
    }

    pub fn le(&mut self, module: &mut Module, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.compare(module, Opcode::Le, lhs, rhs)
    }

    pub fn gt(&mut self, module: &mut Module, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.compare(module, Opcode::Gt, lhs, rhs)
    }

    pub fn ge(&mut self, module: &mut Module, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.compare(module, Opcode::Ge, lhs, rhs)
    }

    pub fn sext(&mut self, module: &mut Module, value: ValueId, ty: Type) -> ValueId {
        self.push(module, ty, Opcode::Sext, vec![value], Vec::new())
    }

    pub fn zext(&mut self, module: &mut Module, value: ValueId, ty: Type) -> ValueId {
        self.push(module, ty, Opcode::Zext, vec![value], Vec::new())
    }

    pub fn trunc(&mut self, module: &mut Module, value: ValueId, ty: Type) -> ValueId {
        self.push(module, ty, Opcode::Trunc, vec![value], Vec::new())
    }

    pub fn cond_br(&mut self, module: &mut Module, condition: ValueId, then_block: BlockId, else_block: BlockId) -> ValueId {
        let from = self.insert_point();
        module.blocks[then_block.index()].preds.push(from);
        module.blocks[else_block.index()].preds.push(from);
        self.push(module, Type::Void, Opcode::CondBr, vec![condition], vec![then_block, else_block])
    }

    pub fn br(&mut self, module: &mut Module, dest: BlockId) -> ValueId {
        let from = self.insert_point();
        module.blocks[dest.index()].preds.push(from);
        self.push(module, Type::Void, Opcode::Br, Vec::new(), vec![dest])
    }

    pub fn phi(&mut self, module: &mut Module, ty: Type) -> ValueId {
        self.push(module, ty, Opcode::Phi, Vec::new(), Vec::new())
    }

    pub fn ret(&mut self, module: &mut Module, value: Option<ValueId>) -> ValueId {
        let operands = value.into_iter().collect();
        self.push(module, Type::Void, Opcode::Ret, operands, Vec::new())
    }

    pub fn call(&mut self, module: &mut Module, callee: ValueId, args: Vec<ValueId>) -> ValueId {
        let ret = match module.values[callee.index()].ty.pointee() {
            Some(Type::Function { ret, .. }) => (**ret).clone(),
            _ => match &module.values[callee.index()].ty {
                Type::Function { ret, .. } => (**ret).clone(),
                _ => unreachable!("call through non-function value"),
            },
        };
        let mut operands = vec![callee];
        operands.extend(args);
        self.push(module, ret, Opcode::Call, operands, Vec::new())
    }
}
