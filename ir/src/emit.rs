//! System-V AMD64 code generation and ELF64 relocatable-object emission.
//!
//! Every SSA value gets an 8-byte frame slot holding its 64-bit extended
//! form; instructions load operands into scratch registers, compute, and
//! write the result slot back. Phis are eliminated by having each
//! predecessor write the incoming value into the phi's slot before its
//! branch. Calls relocate through `R_X86_64_PLT32`; string globals live in
//! `.rodata` and are addressed rip-relative.

use crate::{FunctionId, Module, Opcode, Type, ValueId, ValueKind};
use std::collections::HashMap;
use std::io::{self, Write};

const RAX: u8 = 0;
const RCX: u8 = 1;
const RDX: u8 = 2;
const RSI: u8 = 6;
const RDI: u8 = 7;
const R8: u8 = 8;
const R9: u8 = 9;
const R10: u8 = 10;

const ARG_REGS: [u8; 6] = [RDI, RSI, RDX, RCX, R8, R9];

enum RelocKind {
    /// `call rel32` to a function symbol.
    Plt32(FunctionId),
    /// rip-relative address of a function symbol.
    Pc32Function(FunctionId),
    /// rip-relative address into `.rodata`.
    Pc32Rodata { addend: i64 },
}

struct TextReloc {
    offset: u64,
    kind: RelocKind,
}

pub(crate) fn emit_elf(module: &Module, out: &mut impl Write) -> io::Result<()> {
    let mut text = Vec::new();
    let mut relocs = Vec::new();
    let mut rodata = Vec::new();
    let mut rodata_offsets = HashMap::new();

    for (index, global) in module.globals.iter().enumerate() {
        rodata_offsets.insert(index, rodata.len() as i64);
        rodata.extend_from_slice(&global.bytes);
        rodata.push(0);
    }

    let mut defined = Vec::new();
    let mut undefined = Vec::new();
    for (id, function) in module.functions() {
        if function.blocks.is_empty() {
            undefined.push(id);
            continue;
        }
        let start = text.len() as u64;
        FunctionCodegen::new(module, id, &mut text, &mut relocs, &rodata_offsets).run();
        defined.push((id, start, text.len() as u64 - start));
    }

    write_object(module, out, &text, &rodata, &relocs, &defined, &undefined)
}

struct FunctionCodegen<'a> {
    module: &'a Module,
    function: FunctionId,
    code: &'a mut Vec<u8>,
    relocs: &'a mut Vec<TextReloc>,
    rodata_offsets: &'a HashMap<usize, i64>,
    slots: HashMap<usize, i32>,
    storage: HashMap<usize, i32>,
    block_offsets: HashMap<usize, usize>,
    fixups: Vec<(usize, usize)>,
    frame: i32,
}

impl<'a> FunctionCodegen<'a> {
    fn new(
        module: &'a Module,
        function: FunctionId,
        code: &'a mut Vec<u8>,
        relocs: &'a mut Vec<TextReloc>,
        rodata_offsets: &'a HashMap<usize, i64>,
    ) -> Self {
        Self {
            module,
            function,
            code,
            relocs,
            rodata_offsets,
            slots: HashMap::new(),
            storage: HashMap::new(),
            block_offsets: HashMap::new(),
            fixups: Vec::new(),
            frame: 0,
        }
    }

    fn run(mut self) {
        self.assign_slots();

        // prologue
        self.emit(&[0x55]); // push rbp
        self.emit(&[0x48, 0x89, 0xe5]); // mov rbp, rsp
        self.emit(&[0x48, 0x81, 0xec]); // sub rsp, imm32
        let frame = (self.frame + 15) / 16 * 16;
        self.emit_u32(frame as u32);

        let arguments = self.module.functions[self.function.index()].arguments.clone();
        for (index, &arg) in arguments.iter().enumerate().take(ARG_REGS.len()) {
            let slot = self.slots[&arg.index()];
            self.mov_frame_reg(slot, ARG_REGS[index]);
        }

        let blocks = self.module.functions[self.function.index()].blocks.clone();
        for &block in &blocks {
            self.block_offsets.insert(block.index(), self.code.len());
            let instructions = self.module.blocks[block.index()].instructions.clone();
            for &value in &instructions {
                self.lower_instruction(value, block.index());
            }
            let terminated = instructions.last().map(|&v| self.is_terminator(v)).unwrap_or(false);
            if !terminated {
                self.emit(&[0xc9, 0xc3]); // leave; ret
            }
        }

        for (pos, block) in std::mem::take(&mut self.fixups) {
            let target = self.block_offsets[&block];
            let rel = target as i64 - (pos as i64 + 4);
            self.code[pos..pos + 4].copy_from_slice(&(rel as i32).to_le_bytes());
        }
    }

    fn assign_slots(&mut self) {
        let function = &self.module.functions[self.function.index()];
        for &arg in &function.arguments {
            self.alloc_slot(arg);
        }
        for &block in &function.blocks {
            for &value in &self.module.blocks[block.index()].instructions {
                let data = &self.module.values[value.index()];
                if let ValueKind::Instruction(instr) = &data.kind {
                    if instr.opcode == Opcode::Alloca {
                        let size = data.ty.pointee().unwrap().size().max(1) as i32;
                        self.frame += (size + 7) / 8 * 8;
                        self.storage.insert(value.index(), -self.frame);
                    }
                }
                if !data.ty.is_void() {
                    self.alloc_slot(value);
                }
            }
        }
    }

    fn alloc_slot(&mut self, value: ValueId) {
        self.frame += 8;
        self.slots.insert(value.index(), -self.frame);
    }

    fn is_terminator(&self, value: ValueId) -> bool {
        match &self.module.values[value.index()].kind {
            ValueKind::Instruction(instr) => {
                matches!(instr.opcode, Opcode::Ret | Opcode::Br | Opcode::CondBr)
            }
            _ => false,
        }
    }

    fn lower_instruction(&mut self, value: ValueId, current_block: usize) {
        let instr = match &self.module.values[value.index()].kind {
            ValueKind::Instruction(instr) => instr.clone(),
            _ => unreachable!(),
        };
        let ty = self.module.values[value.index()].ty.clone();

        match instr.opcode {
            Opcode::Alloca => {
                let disp = self.storage[&value.index()];
                self.lea_frame(RAX, disp);
                self.store_slot(value, RAX);
            }
            Opcode::Load => {
                self.load_operand(RAX, instr.operands[0]);
                self.load_through(RAX, &ty);
                self.store_slot(value, RAX);
            }
            Opcode::Store => {
                self.load_operand(RAX, instr.operands[0]);
                self.load_operand(RCX, instr.operands[1]);
                let stored = self.module.values[instr.operands[1].index()].ty.clone();
                self.store_through(RAX, RCX, &stored);
            }
            Opcode::AddrOf => {
                self.load_operand(RAX, instr.operands[0]);
                self.store_slot(value, RAX);
            }
            Opcode::Gep(index) => {
                self.load_operand(RAX, instr.operands[0]);
                let pointee = self.module.values[instr.operands[0].index()].ty.pointee().unwrap().clone();
                let offset = pointee.field_offset(index) as i32;
                if offset != 0 {
                    // lea rax, [rax + offset]
                    self.emit(&[0x48, 0x8d, 0x80]);
                    self.emit_u32(offset as u32);
                }
                self.store_slot(value, RAX);
            }
            Opcode::Neg => {
                self.load_operand(RAX, instr.operands[0]);
                self.emit(&[0x48, 0xf7, 0xd8]); // neg rax
                self.canonicalize(&ty);
                self.store_slot(value, RAX);
            }
            Opcode::Add | Opcode::Sub | Opcode::Mul => {
                self.load_operand(RAX, instr.operands[0]);
                self.load_operand(RCX, instr.operands[1]);
                match instr.opcode {
                    Opcode::Add => self.emit(&[0x48, 0x01, 0xc8]), // add rax, rcx
                    Opcode::Sub => self.emit(&[0x48, 0x29, 0xc8]), // sub rax, rcx
                    Opcode::Mul => self.emit(&[0x48, 0x0f, 0xaf, 0xc1]), // imul rax, rcx
                    _ => unreachable!(),
                }
                self.canonicalize(&ty);
                self.store_slot(value, RAX);
            }
            Opcode::Div => {
                self.load_operand(RAX, instr.operands[0]);
                self.load_operand(RCX, instr.operands[1]);
                if is_signed(&ty) {
                    self.emit(&[0x48, 0x99]); // cqo
                    self.emit(&[0x48, 0xf7, 0xf9]); // idiv rcx
                } else {
                    self.emit(&[0x31, 0xd2]); // xor edx, edx
                    self.emit(&[0x48, 0xf7, 0xf1]); // div rcx
                }
                self.canonicalize(&ty);
                self.store_slot(value, RAX);
            }
            Opcode::Eq | Opcode::Ne | Opcode::Lt | Opcode::Le | Opcode::Gt | Opcode::Ge => {
                self.load_operand(RAX, instr.operands[0]);
                self.load_operand(RCX, instr.operands[1]);
                self.emit(&[0x48, 0x39, 0xc8]); // cmp rax, rcx
                let signed = is_signed(&self.module.values[instr.operands[0].index()].ty);
                let setcc = match (instr.opcode, signed) {
                    (Opcode::Eq, _) => 0x94,
                    (Opcode::Ne, _) => 0x95,
                    (Opcode::Lt, true) => 0x9c,
                    (Opcode::Le, true) => 0x9e,
                    (Opcode::Gt, true) => 0x9f,
                    (Opcode::Ge, true) => 0x9d,
                    (Opcode::Lt, false) => 0x92,
                    (Opcode::Le, false) => 0x96,
                    (Opcode::Gt, false) => 0x97,
                    (Opcode::Ge, false) => 0x93,
                    _ => unreachable!(),
                };
                self.emit(&[0x0f, setcc, 0xc0]); // setcc al
                self.emit(&[0x48, 0x0f, 0xb6, 0xc0]); // movzx rax, al
                self.store_slot(value, RAX);
            }
            Opcode::Sext | Opcode::Zext | Opcode::Trunc => {
                self.load_operand(RAX, instr.operands[0]);
                self.canonicalize(&ty);
                self.store_slot(value, RAX);
            }
            Opcode::CondBr => {
                self.write_phi_moves(current_block, instr.blocks[0]);
                self.write_phi_moves(current_block, instr.blocks[1]);
                self.load_operand(RAX, instr.operands[0]);
                self.emit(&[0x84, 0xc0]); // test al, al
                self.emit(&[0x0f, 0x85]); // jne rel32
                self.fixups.push((self.code.len(), instr.blocks[0].index()));
                self.emit_u32(0);
                self.emit(&[0xe9]); // jmp rel32
                self.fixups.push((self.code.len(), instr.blocks[1].index()));
                self.emit_u32(0);
            }
            Opcode::Br => {
                self.write_phi_moves(current_block, instr.blocks[0]);
                self.emit(&[0xe9]);
                self.fixups.push((self.code.len(), instr.blocks[0].index()));
                self.emit_u32(0);
            }
            Opcode::Phi => {
                // written by predecessors
            }
            Opcode::Ret => {
                if let Some(&result) = instr.operands.first() {
                    self.load_operand(RAX, result);
                }
                self.emit(&[0xc9, 0xc3]); // leave; ret
            }
            Opcode::Call => {
                let args = &instr.operands[1..];
                debug_assert!(args.len() <= ARG_REGS.len());
                for (index, &arg) in args.iter().enumerate().take(ARG_REGS.len()) {
                    self.load_operand(ARG_REGS[index], arg);
                }
                match &self.module.values[instr.operands[0].index()].kind {
                    ValueKind::FunctionRef(callee) => {
                        self.emit(&[0xe8]); // call rel32
                        self.relocs.push(TextReloc {
                            offset: self.code.len() as u64,
                            kind: RelocKind::Plt32(*callee),
                        });
                        self.emit_u32(0);
                    }
                    _ => {
                        self.load_operand(R10, instr.operands[0]);
                        self.emit(&[0x41, 0xff, 0xd2]); // call r10
                    }
                }
                if !ty.is_void() {
                    self.canonicalize(&ty);
                    self.store_slot(value, RAX);
                }
            }
        }
    }

    /// Predecessor side of phi elimination: write this edge's incoming
    /// values into the phi slots of `target` before branching there.
    fn write_phi_moves(&mut self, from: usize, target: crate::BlockId) {
        let instructions = self.module.blocks[target.index()].instructions.clone();
        for value in instructions {
            let instr = match &self.module.values[value.index()].kind {
                ValueKind::Instruction(instr) if instr.opcode == Opcode::Phi => instr.clone(),
                _ => continue,
            };
            for (incoming, block) in instr.operands.iter().zip(&instr.blocks) {
                if block.index() == from {
                    self.load_operand(RAX, *incoming);
                    self.store_slot(value, RAX);
                }
            }
        }
    }

    /// Loads a 64-bit extended operand into `reg`.
    fn load_operand(&mut self, reg: u8, operand: ValueId) {
        let value = &self.module.values[operand.index()];
        match &value.kind {
            ValueKind::ConstantInt(raw) => {
                let extended = match &value.ty {
                    Type::Integer { bits, signed: true } if *bits < 64 => sign_extend(*raw, *bits),
                    _ => *raw,
                };
                self.mov_imm64(reg, extended);
            }
            ValueKind::ConstantBool(flag) => self.mov_imm64(reg, *flag as u64),
            ValueKind::GlobalRef(global) => {
                let addend = self.rodata_offsets[&global.index()] - 4;
                self.lea_rip(reg);
                self.relocs.push(TextReloc {
                    offset: self.code.len() as u64 - 4,
                    kind: RelocKind::Pc32Rodata { addend },
                });
            }
            ValueKind::FunctionRef(function) => {
                self.lea_rip(reg);
                self.relocs.push(TextReloc {
                    offset: self.code.len() as u64 - 4,
                    kind: RelocKind::Pc32Function(*function),
                });
            }
            ValueKind::Argument { .. } | ValueKind::Instruction(_) => {
                let slot = self.slots[&operand.index()];
                self.mov_reg_frame(reg, slot);
            }
        }
    }

    fn store_slot(&mut self, value: ValueId, reg: u8) {
        let slot = self.slots[&value.index()];
        self.mov_frame_reg(slot, reg);
    }

    /// mov [rbp+disp32], reg
    fn mov_frame_reg(&mut self, disp: i32, reg: u8) {
        self.emit(&[rex(reg >= 8, false), 0x89, modrm_disp32(reg)]);
        self.emit_u32(disp as u32);
    }

    /// mov reg, [rbp+disp32]
    fn mov_reg_frame(&mut self, reg: u8, disp: i32) {
        self.emit(&[rex(reg >= 8, false), 0x8b, modrm_disp32(reg)]);
        self.emit_u32(disp as u32);
    }

    /// lea reg, [rbp+disp32]
    fn lea_frame(&mut self, reg: u8, disp: i32) {
        self.emit(&[rex(reg >= 8, false), 0x8d, modrm_disp32(reg)]);
        self.emit_u32(disp as u32);
    }

    /// lea reg, [rip+0] (patched by relocation)
    fn lea_rip(&mut self, reg: u8) {
        self.emit(&[rex(reg >= 8, false), 0x8d, 0x05 | ((reg & 7) << 3)]);
        self.emit_u32(0);
    }

    /// movabs reg, imm64
    fn mov_imm64(&mut self, reg: u8, value: u64) {
        self.emit(&[rex(false, reg >= 8), 0xb8 + (reg & 7)]);
        self.emit(&value.to_le_bytes());
    }

    /// Sized load through the pointer in rax, extended per `ty`, into rax.
    fn load_through(&mut self, _reg: u8, ty: &Type) {
        match (ty.size(), is_signed(ty)) {
            (1, true) => self.emit(&[0x48, 0x0f, 0xbe, 0x00]), // movsx rax, byte [rax]
            (1, false) => self.emit(&[0x48, 0x0f, 0xb6, 0x00]), // movzx rax, byte [rax]
            (2, true) => self.emit(&[0x48, 0x0f, 0xbf, 0x00]),
            (2, false) => self.emit(&[0x48, 0x0f, 0xb7, 0x00]),
            (4, true) => self.emit(&[0x48, 0x63, 0x00]), // movsxd rax, [rax]
            (4, false) => self.emit(&[0x8b, 0x00]), // mov eax, [rax]
            _ => self.emit(&[0x48, 0x8b, 0x00]), // mov rax, [rax]
        }
    }

    /// Sized store of `src` through the pointer in `ptr` (rax, rcx fixed).
    fn store_through(&mut self, _ptr: u8, _src: u8, ty: &Type) {
        match ty.size() {
            1 => self.emit(&[0x88, 0x08]), // mov [rax], cl
            2 => self.emit(&[0x66, 0x89, 0x08]),
            4 => self.emit(&[0x89, 0x08]),
            _ => self.emit(&[0x48, 0x89, 0x08]),
        }
    }

    /// Re-extends rax so the full register matches `ty`'s width and sign.
    fn canonicalize(&mut self, ty: &Type) {
        match ty {
            Type::Bool => self.emit(&[0x48, 0x83, 0xe0, 0x01]), // and rax, 1
            Type::Integer { bits: 8, signed: true } => self.emit(&[0x48, 0x0f, 0xbe, 0xc0]),
            Type::Integer { bits: 8, signed: false } => self.emit(&[0x48, 0x0f, 0xb6, 0xc0]),
            Type::Integer { bits: 16, signed: true } => self.emit(&[0x48, 0x0f, 0xbf, 0xc0]),
            Type::Integer { bits: 16, signed: false } => self.emit(&[0x48, 0x0f, 0xb7, 0xc0]),
            Type::Integer { bits: 32, signed: true } => self.emit(&[0x48, 0x63, 0xc0]), // movsxd rax, eax
            Type::Integer { bits: 32, signed: false } => self.emit(&[0x89, 0xc0]), // mov eax, eax
            _ => {}
        }
    }

    fn emit(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    fn emit_u32(&mut self, value: u32) {
        self.code.extend_from_slice(&value.to_le_bytes());
    }
}

fn rex(reg_ext: bool, rm_ext: bool) -> u8 {
    0x48 | ((reg_ext as u8) << 2) | (rm_ext as u8)
}

/// mod=10 (disp32), rm=rbp
fn modrm_disp32(reg: u8) -> u8 {
    0x85 | ((reg & 7) << 3)
}

fn sign_extend(value: u64, bits: u32) -> u64 {
    let shift = 64 - bits;
    (((value << shift) as i64) >> shift) as u64
}

fn is_signed(ty: &Type) -> bool {
    matches!(ty, Type::Integer { signed: true, .. })
}

// ELF64 relocatable object layout

const SHT_PROGBITS: u32 = 1;
const SHT_SYMTAB: u32 = 2;
const SHT_STRTAB: u32 = 3;
const SHT_RELA: u32 = 4;
const SHF_ALLOC: u64 = 0x2;
const SHF_EXECINSTR: u64 = 0x4;
const R_X86_64_PC32: u32 = 2;
const R_X86_64_PLT32: u32 = 4;

struct StringTable {
    bytes: Vec<u8>,
}

impl StringTable {
    fn new() -> Self {
        Self { bytes: vec![0] }
    }

    fn add(&mut self, name: &str) -> u32 {
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(name.as_bytes());
        self.bytes.push(0);
        offset
    }
}

fn write_object(
    module: &Module,
    out: &mut impl Write,
    text: &[u8],
    rodata: &[u8],
    relocs: &[TextReloc],
    defined: &[(FunctionId, u64, u64)],
    undefined: &[FunctionId],
) -> io::Result<()> {
    let mut strtab = StringTable::new();
    let mut symtab = Vec::new();

    // null symbol
    push_symbol(&mut symtab, 0, 0, 0, 0, 0, 0);
    // section symbols: .text (1), .rodata (2)
    push_symbol(&mut symtab, 0, 3, 0, 1, 0, 0);
    push_symbol(&mut symtab, 0, 3, 0, 3, 0, 0);

    let mut symbol_indices = HashMap::new();
    let mut next = 3u32;
    for &(id, offset, size) in defined {
        let name = strtab.add(&module.functions[id.index()].name);
        push_symbol(&mut symtab, name, 0x12, 0, 1, offset, size); // GLOBAL FUNC in .text
        symbol_indices.insert(id.index(), next);
        next += 1;
    }
    for &id in undefined {
        let name = strtab.add(&module.functions[id.index()].name);
        push_symbol(&mut symtab, name, 0x10, 0, 0, 0, 0); // GLOBAL NOTYPE undefined
        symbol_indices.insert(id.index(), next);
        next += 1;
    }

    let mut rela = Vec::new();
    for reloc in relocs {
        let (symbol, kind, addend) = match &reloc.kind {
            RelocKind::Plt32(func) => (symbol_indices[&func.index()], R_X86_64_PLT32, -4i64),
            RelocKind::Pc32Function(func) => (symbol_indices[&func.index()], R_X86_64_PC32, -4i64),
            RelocKind::Pc32Rodata { addend } => (2, R_X86_64_PC32, *addend),
        };
        rela.extend_from_slice(&reloc.offset.to_le_bytes());
        rela.extend_from_slice(&(((symbol as u64) << 32) | kind as u64).to_le_bytes());
        rela.extend_from_slice(&addend.to_le_bytes());
    }

    let mut shstrtab = StringTable::new();
    let name_text = shstrtab.add(".text");
    let name_rela = shstrtab.add(".rela.text");
    let name_rodata = shstrtab.add(".rodata");
    let name_symtab = shstrtab.add(".symtab");
    let name_strtab = shstrtab.add(".strtab");
    let name_shstrtab = shstrtab.add(".shstrtab");

    // layout: header, then section data, then section header table
    let mut offset = 64u64;
    let mut place = |len: usize| {
        let aligned = (offset + 7) / 8 * 8;
        offset = aligned + len as u64;
        aligned
    };
    let off_text = place(text.len());
    let off_rela = place(rela.len());
    let off_rodata = place(rodata.len());
    let off_symtab = place(symtab.len());
    let off_strtab = place(strtab.bytes.len());
    let off_shstrtab = place(shstrtab.bytes.len());
    let shoff = (offset + 7) / 8 * 8;

    let mut header = Vec::new();
    header.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
    header.extend_from_slice(&1u16.to_le_bytes()); // ET_REL
    header.extend_from_slice(&0x3eu16.to_le_bytes()); // EM_X86_64
    header.extend_from_slice(&1u32.to_le_bytes());
    header.extend_from_slice(&0u64.to_le_bytes()); // e_entry
    header.extend_from_slice(&0u64.to_le_bytes()); // e_phoff
    header.extend_from_slice(&shoff.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    header.extend_from_slice(&64u16.to_le_bytes()); // e_ehsize
    header.extend_from_slice(&0u16.to_le_bytes());
    header.extend_from_slice(&0u16.to_le_bytes());
    header.extend_from_slice(&64u16.to_le_bytes()); // e_shentsize
    header.extend_from_slice(&7u16.to_le_bytes()); // e_shnum
    header.extend_from_slice(&6u16.to_le_bytes()); // e_shstrndx

    out.write_all(&header)?;
    let mut written = 64u64;
    let mut pad_to = |out: &mut dyn Write, written: &mut u64, target: u64| -> io::Result<()> {
        while *written < target {
            out.write_all(&[0])?;
            *written += 1;
        }
        Ok(())
    };

    pad_to(out, &mut written, off_text)?;
    out.write_all(text)?;
    written += text.len() as u64;
    pad_to(out, &mut written, off_rela)?;
    out.write_all(&rela)?;
    written += rela.len() as u64;
    pad_to(out, &mut written, off_rodata)?;
    out.write_all(rodata)?;
    written += rodata.len() as u64;
    pad_to(out, &mut written, off_symtab)?;
    out.write_all(&symtab)?;
    written += symtab.len() as u64;
    pad_to(out, &mut written, off_strtab)?;
    out.write_all(&strtab.bytes)?;
    written += strtab.bytes.len() as u64;
    pad_to(out, &mut written, off_shstrtab)?;
    out.write_all(&shstrtab.bytes)?;
    written += shstrtab.bytes.len() as u64;
    pad_to(out, &mut written, shoff)?;

    let mut headers = Vec::new();
    push_section(&mut headers, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0);
    push_section(&mut headers, name_text, SHT_PROGBITS, SHF_ALLOC | SHF_EXECINSTR, 0, off_text, text.len() as u64, 0, 0, 16, 0);
    push_section(&mut headers, name_rela, SHT_RELA, 0, 0, off_rela, rela.len() as u64, 4, 1, 8, 24);
    push_section(&mut headers, name_rodata, SHT_PROGBITS, SHF_ALLOC, 0, off_rodata, rodata.len() as u64, 0, 0, 8, 0);
    let first_global = 3;
    push_section(&mut headers, name_symtab, SHT_SYMTAB, 0, 0, off_symtab, symtab.len() as u64, 5, first_global, 8, 24);
    push_section(&mut headers, name_strtab, SHT_STRTAB, 0, 0, off_strtab, strtab.bytes.len() as u64, 0, 0, 1, 0);
    push_section(&mut headers, name_shstrtab, SHT_STRTAB, 0, 0, off_shstrtab, shstrtab.bytes.len() as u64, 0, 0, 1, 0);
    out.write_all(&headers)
}

#[allow(clippy::too_many_arguments)]
fn push_section(
    buf: &mut Vec<u8>,
    name: u32,
    kind: u32,
    flags: u64,
    addr: u64,
    offset: u64,
    size: u64,
    link: u32,
    info: u32,
    align: u64,
    entsize: u64,
) {
    buf.extend_from_slice(&name.to_le_bytes());
    buf.extend_from_slice(&kind.to_le_bytes());
    buf.extend_from_slice(&flags.to_le_bytes());
    buf.extend_from_slice(&addr.to_le_bytes());
    buf.extend_from_slice(&offset.to_le_bytes());
    buf.extend_from_slice(&size.to_le_bytes());
    buf.extend_from_slice(&link.to_le_bytes());
    buf.extend_from_slice(&info.to_le_bytes());
    buf.extend_from_slice(&align.to_le_bytes());
    buf.extend_from_slice(&entsize.to_le_bytes());
}

fn push_symbol(buf: &mut Vec<u8>, name: u32, info: u8, other: u8, shndx: u16, value: u64, size: u64) {
    buf.extend_from_slice(&name.to_le_bytes());
    buf.push(info);
    buf.push(other);
    buf.extend_from_slice(&shndx.to_le_bytes());
    buf.extend_from_slice(&value.to_le_bytes());
    buf.extend_from_slice(&size.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use crate::{Abi, Builder, Module, OutputFormat, Type};

    #[test]
    fn emits_a_wellformed_elf_header() {
        let mut module = Module::new("test");
        module.set_abi(Abi::SysV);
        module.set_output_format(OutputFormat::Elf);

        let i32_ty = Type::Integer { bits: 32, signed: true };
        let fn_ty = Type::Function { ret: Box::new(i32_ty.clone()), params: vec![] };
        let function = module.create_function("answer", fn_ty, false);

        let mut builder = Builder::new();
        let entry = builder.create_block(&mut module, function);
        builder.set_insert_point(entry);
        let forty_two = module.const_int(42, i32_ty);
        builder.ret(&mut module, Some(forty_two));

        let mut bytes = Vec::new();
        module.emit(&mut bytes).unwrap();

        assert_eq!(&bytes[..4], b"\x7fELF");
        assert_eq!(bytes[4], 2); // 64-bit
        assert_eq!(u16::from_le_bytes([bytes[16], bytes[17]]), 1); // ET_REL
        assert_eq!(u16::from_le_bytes([bytes[18], bytes[19]]), 0x3e); // x86-64
        // section header count
        assert_eq!(u16::from_le_bytes([bytes[60], bytes[61]]), 7);
    }

    #[test]
    fn declarations_become_undefined_symbols() {
        let mut module = Module::new("test");
        module.set_abi(Abi::SysV);
        module.set_output_format(OutputFormat::Elf);

        let fn_ty = Type::Function { ret: Box::new(Type::Void), params: vec![] };
        module.create_function("external", fn_ty, false);

        let mut bytes = Vec::new();
        module.emit(&mut bytes).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("external"));
    }
}
