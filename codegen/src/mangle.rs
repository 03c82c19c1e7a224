//! Link-name mangling: `_V`, length-prefixed qualified-name components, `E`,
//! then the parameter-type encoding. Deterministic and injective over
//! (name path, signature) pairs.

use ty::{TypeId, TypeInfo};

pub fn function(names: &[String], fn_ty: TypeId) -> String {
    let mut out = String::from("_V");
    for name in names {
        out.push_str(&name.len().to_string());
        out.push_str(name);
    }
    out.push('E');
    for param in fn_ty.parameters().unwrap_or_default() {
        encode(&mut out, param);
    }
    out
}

fn encode(out: &mut String, ty: TypeId) {
    match ty::info(ty) {
        TypeInfo::Void => out.push('v'),
        TypeInfo::Bool => out.push('b'),
        TypeInfo::Integer { bits, signed } => out.push(match (bits, signed) {
            (8, true) => 'a',
            (16, true) => 's',
            (32, true) => 'i',
            (64, true) => 'l',
            (8, false) => 'h',
            (16, false) => 't',
            (32, false) => 'j',
            _ => 'm',
        }),
        TypeInfo::Pointer(inner) => {
            out.push('P');
            encode(out, inner);
        }
        TypeInfo::Struct { name, .. } => {
            out.push('S');
            out.push_str(&name.len().to_string());
            out.push_str(&name);
        }
        TypeInfo::Function { ret, params } => {
            out.push('F');
            encode(out, ret);
            out.push_str(&params.len().to_string());
            for param in params {
                encode(out, param);
            }
            out.push('E');
        }
        TypeInfo::Error => unreachable!("error-type survived to mangling"),
    }
}
