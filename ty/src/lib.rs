//! Process-scoped type registry. Every type is interned once, so handle
//! equality is type equality; pointer and function types are canonicalized
//! by structure. The registry lives in a thread local and is written to
//! only while parsing.

use lazy_static::lazy_static;
use std::cell::RefCell;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeId(usize);

#[derive(Clone, Debug, PartialEq)]
pub enum TypeInfo {
    Error,
    Void,
    Bool,
    Integer { bits: u32, signed: bool },
    Pointer(TypeId),
    Function { ret: TypeId, params: Vec<TypeId> },
    Struct { name: String, fields: Vec<(String, TypeId)>, complete: bool },
}

lazy_static! {
    static ref PRIMITIVES: Vec<(&'static str, TypeInfo)> = vec![
        ("error-type", TypeInfo::Error),
        ("void", TypeInfo::Void),
        ("bool", TypeInfo::Bool),
        ("i8", TypeInfo::Integer { bits: 8, signed: true }),
        ("i16", TypeInfo::Integer { bits: 16, signed: true }),
        ("i32", TypeInfo::Integer { bits: 32, signed: true }),
        ("i64", TypeInfo::Integer { bits: 64, signed: true }),
        ("u8", TypeInfo::Integer { bits: 8, signed: false }),
        ("u16", TypeInfo::Integer { bits: 16, signed: false }),
        ("u32", TypeInfo::Integer { bits: 32, signed: false }),
        ("u64", TypeInfo::Integer { bits: 64, signed: false }),
    ];
}

struct Registry {
    types: Vec<TypeInfo>,
    names: HashMap<String, TypeId>,
    pointers: HashMap<TypeId, TypeId>,
    functions: HashMap<(TypeId, Vec<TypeId>), TypeId>,
}

impl Registry {
    fn new() -> Self {
        let mut registry =
            Self { types: Vec::new(), names: HashMap::new(), pointers: HashMap::new(), functions: HashMap::new() };
        for (name, info) in PRIMITIVES.iter() {
            let id = TypeId(registry.types.len());
            registry.types.push(info.clone());
            registry.names.insert((*name).to_owned(), id);
        }
        registry
    }

    fn intern(&mut self, info: TypeInfo) -> TypeId {
        let id = TypeId(self.types.len());
        self.types.push(info);
        id
    }
}

std::thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::new());
}

fn with<T>(f: impl FnOnce(&Registry) -> T) -> T {
    REGISTRY.with(|registry| f(&registry.borrow()))
}

fn with_mut<T>(f: impl FnOnce(&mut Registry) -> T) -> T {
    REGISTRY.with(|registry| f(&mut registry.borrow_mut()))
}

/// Resets the registry to the primitive set. Called once by the driver
/// before parsing; tests call it for isolation.
pub fn initialize() {
    REGISTRY.with(|registry| *registry.borrow_mut() = Registry::new());
}

pub fn get(name: &str) -> Option<TypeId> {
    with(|registry| registry.names.get(name).copied())
}

pub fn error() -> TypeId {
    TypeId(0)
}

pub fn void() -> TypeId {
    TypeId(1)
}

pub fn boolean() -> TypeId {
    TypeId(2)
}

pub fn integer(signed: bool, bits: u32) -> TypeId {
    let name = format!("{}{}", if signed { "i" } else { "u" }, bits);
    get(&name).unwrap()
}

pub fn pointer_to(pointee: TypeId) -> TypeId {
    with_mut(|registry| {
        if let Some(&existing) = registry.pointers.get(&pointee) {
            return existing;
        }
        let id = registry.intern(TypeInfo::Pointer(pointee));
        registry.pointers.insert(pointee, id);
        id
    })
}

pub fn function(ret: TypeId, params: Vec<TypeId>) -> TypeId {
    with_mut(|registry| {
        let key = (ret, params.clone());
        if let Some(&existing) = registry.functions.get(&key) {
            return existing;
        }
        let id = registry.intern(TypeInfo::Function { ret, params });
        registry.functions.insert(key, id);
        id
    })
}

/// Forward-declares a struct by name; returns the existing handle when the
/// name is already known. Incomplete structs become complete via
/// [`define_struct`].
pub fn declare_struct(name: &str) -> TypeId {
    with_mut(|registry| {
        if let Some(&existing) = registry.names.get(name) {
            return existing;
        }
        let id = registry.intern(TypeInfo::Struct { name: name.to_owned(), fields: Vec::new(), complete: false });
        registry.names.insert(name.to_owned(), id);
        id
    })
}

pub fn define_struct(name: &str, fields: Vec<(String, TypeId)>) -> TypeId {
    with_mut(|registry| {
        if let Some(&existing) = registry.names.get(name) {
            registry.types[existing.0] = TypeInfo::Struct { name: name.to_owned(), fields, complete: true };
            return existing;
        }
        let id = registry.intern(TypeInfo::Struct { name: name.to_owned(), fields, complete: true });
        registry.names.insert(name.to_owned(), id);
        id
    })
}

pub fn info(id: TypeId) -> TypeInfo {
    with(|registry| registry.types[id.0].clone())
}

impl TypeId {
    pub fn is_error(self) -> bool {
        self == error()
    }

    pub fn is_void(self) -> bool {
        self == void()
    }

    pub fn is_boolean(self) -> bool {
        self == boolean()
    }

    pub fn is_integer(self) -> bool {
        matches!(info(self), TypeInfo::Integer { .. })
    }

    pub fn is_pointer(self) -> bool {
        matches!(info(self), TypeInfo::Pointer(_))
    }

    pub fn is_function(self) -> bool {
        matches!(info(self), TypeInfo::Function { .. })
    }

    pub fn is_struct(self) -> bool {
        matches!(info(self), TypeInfo::Struct { .. })
    }

    pub fn is_complete(self) -> bool {
        match info(self) {
            TypeInfo::Struct { complete, .. } => complete,
            _ => true,
        }
    }

    /// Bit width of an integer type; booleans count as one bit.
    pub fn size_bits(self) -> u32 {
        match info(self) {
            TypeInfo::Integer { bits, .. } => bits,
            TypeInfo::Bool => 1,
            TypeInfo::Pointer(_) | TypeInfo::Function { .. } => 64,
            _ => 0,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(info(self), TypeInfo::Integer { signed: true, .. })
    }

    pub fn pointee(self) -> Option<TypeId> {
        match info(self) {
            TypeInfo::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn return_type(self) -> Option<TypeId> {
        match info(self) {
            TypeInfo::Function { ret, .. } => Some(ret),
            _ => None,
        }
    }

    pub fn parameters(self) -> Option<Vec<TypeId>> {
        match info(self) {
            TypeInfo::Function { params, .. } => Some(params),
            _ => None,
        }
    }

    pub fn fields(self) -> Option<Vec<(String, TypeId)>> {
        match info(self) {
            TypeInfo::Struct { fields, .. } => Some(fields),
            _ => None,
        }
    }

    pub fn field_index(self, field: &str) -> Option<usize> {
        self.fields()?.iter().position(|(name, _)| name == field)
    }

    /// Human-readable name for diagnostics.
    pub fn name(self) -> String {
        match info(self) {
            TypeInfo::Error => "error-type".to_owned(),
            TypeInfo::Void => "void".to_owned(),
            TypeInfo::Bool => "bool".to_owned(),
            TypeInfo::Integer { bits, signed } => format!("{}{}", if signed { "i" } else { "u" }, bits),
            TypeInfo::Pointer(inner) => format!("{}*", inner.name()),
            TypeInfo::Function { ret, params } => {
                let params: Vec<_> = params.iter().map(|p| p.name()).collect();
                format!("({}) -> {}", params.join(", "), ret.name())
            }
            TypeInfo::Struct { name, .. } => name,
        }
    }

    pub fn to_ir(self) -> ir::Type {
        self.to_ir_guarded(&mut Vec::new())
    }

    fn to_ir_guarded(self, visiting: &mut Vec<TypeId>) -> ir::Type {
        match info(self) {
            TypeInfo::Error => unreachable!("error-type survived to lowering"),
            TypeInfo::Void => ir::Type::Void,
            TypeInfo::Bool => ir::Type::Bool,
            TypeInfo::Integer { bits, signed } => ir::Type::Integer { bits, signed },
            TypeInfo::Pointer(inner) => {
                // recursive structs degrade to an opaque byte pointer
                if visiting.contains(&inner) {
                    return ir::Type::Pointer(Box::new(ir::Type::Integer { bits: 8, signed: false }));
                }
                ir::Type::Pointer(Box::new(inner.to_ir_guarded(visiting)))
            }
            TypeInfo::Function { ret, params } => ir::Type::Function {
                ret: Box::new(ret.to_ir_guarded(visiting)),
                params: params.iter().map(|p| p.to_ir_guarded(visiting)).collect(),
            },
            TypeInfo::Struct { fields, .. } => {
                visiting.push(self);
                let fields = fields.iter().map(|(_, field)| field.to_ir_guarded(visiting)).collect();
                visiting.pop();
                ir::Type::Struct(fields)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_lookups_return_identical_handles() {
        initialize();
        assert_eq!(get("i32"), get("i32"));
        assert_eq!(get("i32").unwrap(), integer(true, 32));
        assert_ne!(get("i32"), get("u32"));
    }

    #[test]
    fn pointer_types_are_canonical() {
        initialize();
        let inner = get("i32").unwrap();
        let once = pointer_to(inner);
        let twice = pointer_to(pointer_to(inner));
        assert_eq!(pointer_to(inner), once);
        assert_eq!(pointer_to(pointer_to(inner)), twice);
        assert_ne!(once, twice);
    }

    #[test]
    fn function_types_are_canonical_per_signature() {
        initialize();
        let i32_ty = get("i32").unwrap();
        let a = function(i32_ty, vec![i32_ty]);
        let b = function(i32_ty, vec![i32_ty]);
        let c = function(i32_ty, vec![i32_ty, i32_ty]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn structs_complete_in_place() {
        initialize();
        let forward = declare_struct("Pair");
        assert!(!forward.is_complete());

        let i32_ty = get("i32").unwrap();
        let defined = define_struct("Pair", vec![("a".to_owned(), i32_ty), ("b".to_owned(), i32_ty)]);
        assert_eq!(forward, defined);
        assert!(forward.is_complete());
        assert_eq!(forward.field_index("b"), Some(1));
    }

    #[test]
    fn error_type_is_distinct() {
        initialize();
        assert_eq!(get("error-type"), Some(error()));
        assert!(error().is_error());
        assert!(!get("i32").unwrap().is_error());
    }

    #[test]
    fn recursive_structs_lower_without_blowing_up() {
        initialize();
        let node = declare_struct("Node");
        let next = pointer_to(node);
        define_struct("Node", vec![("value".to_owned(), get("i32").unwrap()), ("next".to_owned(), next)]);

        let lowered = node.to_ir();
        assert_eq!(lowered.size(), 16);
    }
}
