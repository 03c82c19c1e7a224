//! The scope tree and the symbols it owns. The tree is one flat table with
//! typed indices; scopes reference their parent by handle, never by
//! ownership, and symbols carry the per-basic-block value history that the
//! lowerer appends to.

use std::cell::RefCell;
use string_interner::{DefaultStringInterner, Sym};
use ty::TypeId;

std::thread_local! {
    static INTERNER: RefCell<DefaultStringInterner> = RefCell::new(DefaultStringInterner::new());
}

pub fn intern(name: &str) -> Sym {
    INTERNER.with(|interner| interner.borrow_mut().get_or_intern(name))
}

pub fn resolve_sym(sym: Sym) -> String {
    INTERNER.with(|interner| interner.borrow().resolve(sym).unwrap().to_owned())
}

/// Handle to a [`Scope`] in its tree's table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

impl ScopeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SymbolId {
    pub scope: ScopeId,
    pub index: usize,
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub id: u32,
    pub name: Sym,
    pub ty: TypeId,
    pub pure: bool,
    pub exported: bool,
    /// Owning struct type, for symbols that belong to one.
    pub owner: Option<TypeId>,
    /// SSA bindings appended during lowering. A `None` block is a
    /// block-independent binding (function addresses).
    pub values: Vec<(Option<ir::BlockId>, ir::ValueId)>,
}

impl Symbol {
    /// The most recent value bound at or dominating `block`.
    pub fn latest_value(&self, module: &ir::Module, block: ir::BlockId) -> Option<ir::ValueId> {
        self.values
            .iter()
            .rev()
            .find(|(bound, _)| match bound {
                None => true,
                Some(bound) => module.dominates(*bound, block),
            })
            .map(|&(_, value)| value)
    }

    pub fn last_value(&self) -> Option<ir::ValueId> {
        self.values.last().map(|&(_, value)| value)
    }
}

#[derive(Clone, Debug)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub name: Option<Sym>,
    pub namespace: bool,
    pub pure: bool,
    pub return_type: Option<TypeId>,
    pub symbols: Vec<Symbol>,
    pub children: Vec<ScopeId>,
    pub imported: Vec<ScopeId>,
}

pub struct ScopeTree {
    scopes: Vec<Scope>,
    global: ScopeId,
    next_symbol: u32,
}

impl ScopeTree {
    pub fn new() -> Self {
        let scopes = vec![Scope {
            parent: None,
            name: None,
            namespace: false,
            pure: false,
            return_type: None,
            symbols: Vec::new(),
            children: Vec::new(),
            imported: Vec::new(),
        }];
        Self { scopes, global: ScopeId(0), next_symbol: 0 }
    }

    pub fn global(&self) -> ScopeId {
        self.global
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    fn push(&mut self, scope: Scope) -> ScopeId {
        let parent = scope.parent;
        self.scopes.push(scope);
        let id = ScopeId(self.scopes.len() as u32 - 1);
        if let Some(parent) = parent {
            self.scopes[parent.index()].children.push(id);
        }
        id
    }

    /// A plain child scope (`if` bodies).
    pub fn new_scope(&mut self, parent: ScopeId) -> ScopeId {
        self.push(Scope {
            parent: Some(parent),
            name: None,
            namespace: false,
            pure: false,
            return_type: None,
            symbols: Vec::new(),
            children: Vec::new(),
            imported: Vec::new(),
        })
    }

    pub fn new_function_scope(&mut self, parent: ScopeId, return_type: TypeId, pure: bool) -> ScopeId {
        self.push(Scope {
            parent: Some(parent),
            name: None,
            namespace: false,
            pure,
            return_type: Some(return_type),
            symbols: Vec::new(),
            children: Vec::new(),
            imported: Vec::new(),
        })
    }

    /// A parentless namespace scope; the import manager hands these out and
    /// attaches them below import sites.
    pub fn new_namespace(&mut self, name: &str) -> ScopeId {
        self.push(Scope {
            parent: None,
            name: Some(intern(name)),
            namespace: true,
            pure: false,
            return_type: None,
            symbols: Vec::new(),
            children: Vec::new(),
            imported: Vec::new(),
        })
    }

    pub fn attach_import(&mut self, into: ScopeId, imported: ScopeId) {
        if !self.scopes[into.index()].imported.contains(&imported) {
            self.scopes[into.index()].imported.push(imported);
        }
    }

    pub fn declare(&mut self, scope: ScopeId, name: &str, ty: TypeId) -> SymbolId {
        let symbol = Symbol {
            id: self.next_symbol,
            name: intern(name),
            ty,
            pure: false,
            exported: false,
            owner: None,
            values: Vec::new(),
        };
        self.next_symbol += 1;
        self.scopes[scope.index()].symbols.push(symbol);
        SymbolId { scope, index: self.scopes[scope.index()].symbols.len() - 1 }
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.scopes[id.scope.index()].symbols[id.index]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.scopes[id.scope.index()].symbols[id.index]
    }

    /// Unqualified lookup: the scope chain outward, checking each scope's own
    /// symbols and then the exported symbols of its imported scopes. Within
    /// one scope the first declaration wins; shadowing happens across scopes.
    pub fn resolve(&self, from: ScopeId, name: &str) -> Option<SymbolId> {
        let sym = intern(name);
        let mut current = Some(from);
        while let Some(scope_id) = current {
            let scope = &self.scopes[scope_id.index()];
            for (index, symbol) in scope.symbols.iter().enumerate() {
                if symbol.name == sym {
                    return Some(SymbolId { scope: scope_id, index });
                }
            }
            for &imported in &scope.imported {
                for (index, symbol) in self.scopes[imported.index()].symbols.iter().enumerate() {
                    if symbol.name == sym && symbol.exported {
                        return Some(SymbolId { scope: imported, index });
                    }
                }
            }
            current = scope.parent;
        }
        None
    }

    /// Every symbol sharing `name` in the nearest scope that has any,
    /// imported scopes included. The call checker scores these.
    pub fn resolve_overloads(&self, from: ScopeId, name: &str) -> Vec<SymbolId> {
        let sym = intern(name);
        let mut current = Some(from);
        while let Some(scope_id) = current {
            let scope = &self.scopes[scope_id.index()];
            let mut found: Vec<SymbolId> = scope
                .symbols
                .iter()
                .enumerate()
                .filter(|(_, symbol)| symbol.name == sym)
                .map(|(index, _)| SymbolId { scope: scope_id, index })
                .collect();
            for &imported in &scope.imported {
                found.extend(
                    self.scopes[imported.index()]
                        .symbols
                        .iter()
                        .enumerate()
                        .filter(|(_, symbol)| symbol.name == sym && symbol.exported)
                        .map(|(index, _)| SymbolId { scope: imported, index }),
                );
            }
            if !found.is_empty() {
                return found;
            }
            current = scope.parent;
        }
        Vec::new()
    }

    /// Qualified lookup: descend namespace scopes by name, then resolve the
    /// terminal symbol inside the last one.
    pub fn resolve_qualified(&self, from: ScopeId, names: &[String]) -> Option<SymbolId> {
        let (terminal, namespaces) = names.split_last()?;

        let mut scope_id = self.find_namespace(from, &namespaces[0])?;
        for namespace in &namespaces[1..] {
            scope_id = self.find_namespace_in(scope_id, namespace)?;
        }

        let sym = intern(terminal);
        self.scopes[scope_id.index()]
            .symbols
            .iter()
            .enumerate()
            .find(|(_, symbol)| symbol.name == sym && symbol.exported)
            .map(|(index, _)| SymbolId { scope: scope_id, index })
    }

    fn find_namespace(&self, from: ScopeId, name: &str) -> Option<ScopeId> {
        let mut current = Some(from);
        while let Some(scope_id) = current {
            if let Some(found) = self.find_namespace_in(scope_id, name) {
                return Some(found);
            }
            current = self.scopes[scope_id.index()].parent;
        }
        None
    }

    fn find_namespace_in(&self, scope: ScopeId, name: &str) -> Option<ScopeId> {
        let sym = intern(name);
        let scope = &self.scopes[scope.index()];
        scope
            .imported
            .iter()
            .chain(&scope.children)
            .copied()
            .find(|&candidate| {
                let candidate = &self.scopes[candidate.index()];
                candidate.namespace && candidate.name == Some(sym)
            })
    }

    /// True when any scope on the chain is pure.
    pub fn is_pure_context(&self, from: ScopeId) -> bool {
        let mut current = Some(from);
        while let Some(scope_id) = current {
            if self.scopes[scope_id.index()].pure {
                return true;
            }
            current = self.scopes[scope_id.index()].parent;
        }
        false
    }

    /// The nearest enclosing function's declared return type.
    pub fn expected_return(&self, from: ScopeId) -> Option<TypeId> {
        let mut current = Some(from);
        while let Some(scope_id) = current {
            if let Some(ret) = self.scopes[scope_id.index()].return_type {
                return Some(ret);
            }
            current = self.scopes[scope_id.index()].parent;
        }
        None
    }

    /// Namespace names enclosing a scope, outermost first.
    pub fn namespaces(&self, from: ScopeId) -> Vec<String> {
        let mut names = Vec::new();
        let mut current = Some(from);
        while let Some(scope_id) = current {
            if let Some(name) = self.scopes[scope_id.index()].name {
                names.push(resolve_sym(name));
            }
            current = self.scopes[scope_id.index()].parent;
        }
        names.reverse();
        names
    }

    /// Symbols visible from a scope through the parent chain. The lowerer
    /// scans these at control-flow merges.
    pub fn visible_symbols(&self, from: ScopeId) -> Vec<SymbolId> {
        let mut symbols = Vec::new();
        let mut current = Some(from);
        while let Some(scope_id) = current {
            for index in 0..self.scopes[scope_id.index()].symbols.len() {
                symbols.push(SymbolId { scope: scope_id, index });
            }
            current = self.scopes[scope_id.index()].parent;
        }
        symbols
    }

    /// Scope ids reachable from the global scope via child and import edges.
    pub fn reachable_from_global(&self) -> Vec<ScopeId> {
        let mut seen = vec![self.global];
        let mut work = vec![self.global];
        while let Some(scope_id) = work.pop() {
            let scope = &self.scopes[scope_id.index()];
            for &next in scope.children.iter().chain(&scope.imported) {
                if !seen.contains(&next) {
                    seen.push(next);
                    work.push(next);
                }
            }
        }
        seen
    }
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_the_parent_chain() {
        ty::initialize();
        let mut tree = ScopeTree::new();
        let global = tree.global();
        let i32_ty = ty::get("i32").unwrap();

        let outer = tree.declare(global, "x", i32_ty);
        let inner_scope = tree.new_scope(global);

        assert_eq!(tree.resolve(inner_scope, "x"), Some(outer));
        assert_eq!(tree.resolve(inner_scope, "y"), None);
    }

    #[test]
    fn inner_declarations_shadow_outer() {
        ty::initialize();
        let mut tree = ScopeTree::new();
        let global = tree.global();
        let i32_ty = ty::get("i32").unwrap();

        tree.declare(global, "x", i32_ty);
        let inner_scope = tree.new_scope(global);
        let shadow = tree.declare(inner_scope, "x", ty::boolean());

        assert_eq!(tree.resolve(inner_scope, "x"), Some(shadow));
    }

    #[test]
    fn imports_expose_exported_symbols_only() {
        ty::initialize();
        let mut tree = ScopeTree::new();
        let global = tree.global();
        let i32_ty = ty::get("i32").unwrap();

        let unit = tree.new_namespace("m");
        let public = tree.declare(unit, "k", i32_ty);
        tree.symbol_mut(public).exported = true;
        tree.declare(unit, "hidden", i32_ty);
        tree.attach_import(global, unit);

        assert_eq!(tree.resolve(global, "k"), Some(public));
        assert_eq!(tree.resolve(global, "hidden"), None);
    }

    #[test]
    fn qualified_lookup_descends_namespaces() {
        ty::initialize();
        let mut tree = ScopeTree::new();
        let global = tree.global();
        let i32_ty = ty::get("i32").unwrap();

        let unit = tree.new_namespace("m");
        let symbol = tree.declare(unit, "k", i32_ty);
        tree.symbol_mut(symbol).exported = true;
        tree.attach_import(global, unit);

        let names = vec!["m".to_owned(), "k".to_owned()];
        assert_eq!(tree.resolve_qualified(global, &names), Some(symbol));
    }

    #[test]
    fn purity_is_transitive_over_parents() {
        ty::initialize();
        let mut tree = ScopeTree::new();
        let pure_fn = tree.new_function_scope(tree.global(), ty::void(), true);
        let body = tree.new_scope(pure_fn);

        assert!(tree.is_pure_context(body));
        assert!(!tree.is_pure_context(tree.global()));
    }

    #[test]
    fn every_scope_is_reachable_from_global() {
        ty::initialize();
        let mut tree = ScopeTree::new();
        let global = tree.global();
        let function = tree.new_function_scope(global, ty::void(), false);
        let body = tree.new_scope(function);
        let unit = tree.new_namespace("m");
        tree.attach_import(body, unit);

        let reachable = tree.reachable_from_global();
        assert!(reachable.contains(&function));
        assert!(reachable.contains(&body));
        assert!(reachable.contains(&unit));
    }
}
