//! Lexical scopes and symbol records.
//!
//! Scopes live in a flat arena indexed by [`ScopeId`]; each scope holds
//! a parent link pointing toward the root, so lookup is a walk up the
//! chain. The global scope is created with the table and is always
//! index 0. The arena never shrinks: blocks keep their `ScopeId` after
//! being popped, which lets the code generator resolve names from any
//! block it revisits.

use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Function,
    Block,
}

/// Storage-class attributes attached to a symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymAttrs {
    pub public: bool,
    pub is_extern: bool,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub ty: Type,
    pub attrs: SymAttrs,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    parent: Option<ScopeId>,
    symbols: Vec<Symbol>,
}

#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    current: ScopeId,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![Scope {
                kind: ScopeKind::Global,
                parent: None,
                symbols: Vec::new(),
            }],
            current: ScopeId(0),
        }
    }

    pub fn current_scope(&self) -> ScopeId {
        self.current
    }

    pub fn kind(&self, id: ScopeId) -> ScopeKind {
        self.scopes[id.0].kind
    }

    pub fn at_global_scope(&self) -> bool {
        self.scopes[self.current.0].kind == ScopeKind::Global
    }

    /// Open a new scope under the current one and make it current.
    pub fn push_scope(&mut self, kind: ScopeKind) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            kind,
            parent: Some(self.current),
            symbols: Vec::new(),
        });
        self.current = id;
        id
    }

    /// Close the current scope. Popping the root is a no-op.
    pub fn pop_scope(&mut self) {
        if let Some(parent) = self.scopes[self.current.0].parent {
            self.current = parent;
        }
    }

    /// Insert into the current scope. Redefinition is an error unless
    /// either the new or the existing symbol is `extern`, in which case
    /// the two declarations merge.
    pub fn insert(&mut self, sym: Symbol) -> Result<(), String> {
        self.insert_into(self.current, sym)
    }

    /// Insert into the root scope, regardless of the current scope.
    pub fn insert_global(&mut self, sym: Symbol) -> Result<(), String> {
        let mut id = self.current;
        while let Some(parent) = self.scopes[id.0].parent {
            id = parent;
        }
        self.insert_into(id, sym)
    }

    fn insert_into(&mut self, id: ScopeId, sym: Symbol) -> Result<(), String> {
        let scope = &mut self.scopes[id.0];
        if let Some(existing) = scope.symbols.iter_mut().find(|s| s.name == sym.name) {
            if !existing.attrs.is_extern && !sym.attrs.is_extern {
                return Err(format!("multiple definition of '{}'", sym.name));
            }
            // a declaration and a definition merge into one symbol
            existing.attrs.public |= sym.attrs.public;
            existing.attrs.is_extern &= sym.attrs.is_extern;
            existing.ty = sym.ty;
            return Ok(());
        }
        scope.symbols.push(sym);
        Ok(())
    }

    /// Resolve a name from the current scope outward.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.lookup_from(self.current, name)
    }

    /// Resolve a name starting at an arbitrary scope and walking toward
    /// the root.
    pub fn lookup_from(&self, from: ScopeId, name: &str) -> Option<&Symbol> {
        let mut id = from;
        loop {
            let scope = &self.scopes[id.0];
            if let Some(sym) = scope.symbols.iter().find(|s| s.name == name) {
                return Some(sym);
            }
            match scope.parent {
                Some(parent) => id = parent,
                None => return None,
            }
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BaseType;

    fn sym(name: &str) -> Symbol {
        Symbol {
            name: name.to_string(),
            ty: Type::new(BaseType::Int32),
            attrs: SymAttrs::default(),
        }
    }

    fn extern_sym(name: &str) -> Symbol {
        Symbol {
            name: name.to_string(),
            ty: Type::new(BaseType::Int32),
            attrs: SymAttrs {
                public: false,
                is_extern: true,
            },
        }
    }

    #[test]
    fn test_lookup_walks_to_root() {
        let mut table = SymbolTable::new();
        table.insert(sym("g")).unwrap();
        table.push_scope(ScopeKind::Function);
        table.push_scope(ScopeKind::Block);
        assert!(table.lookup("g").is_some());
        assert!(table.lookup("missing").is_none());
    }

    #[test]
    fn test_inner_scope_shadows_outer() {
        let mut table = SymbolTable::new();
        table.insert(sym("x")).unwrap();
        table.push_scope(ScopeKind::Block);
        let mut inner = sym("x");
        inner.ty = Type::new(BaseType::Uint8);
        table.insert(inner).unwrap();
        assert_eq!(table.lookup("x").unwrap().ty, Type::new(BaseType::Uint8));
        table.pop_scope();
        assert_eq!(table.lookup("x").unwrap().ty, Type::new(BaseType::Int32));
    }

    #[test]
    fn test_sibling_scopes_are_isolated() {
        let mut table = SymbolTable::new();
        table.push_scope(ScopeKind::Block);
        table.insert(sym("a")).unwrap();
        let first = table.current_scope();
        table.pop_scope();
        table.push_scope(ScopeKind::Block);
        // the sibling cannot see 'a'...
        assert!(table.lookup("a").is_none());
        table.pop_scope();
        // ...but a lookup rooted in the first block still can
        assert!(table.lookup_from(first, "a").is_some());
    }

    #[test]
    fn test_duplicate_in_same_scope_is_error() {
        let mut table = SymbolTable::new();
        table.insert(sym("x")).unwrap();
        let err = table.insert(sym("x")).unwrap_err();
        assert!(err.contains("multiple definition"));
    }

    #[test]
    fn test_extern_merges_with_definition() {
        let mut table = SymbolTable::new();
        table.insert(extern_sym("f")).unwrap();
        table.insert(sym("f")).unwrap();
        // the merged symbol is no longer extern
        let merged = table.lookup("f").unwrap();
        assert!(!merged.attrs.is_extern);

        // and the other order works too
        let mut table = SymbolTable::new();
        table.insert(sym("g")).unwrap();
        table.insert(extern_sym("g")).unwrap();
        assert!(table.lookup("g").is_some());
    }

    #[test]
    fn test_insert_global_from_nested_scope() {
        let mut table = SymbolTable::new();
        table.push_scope(ScopeKind::Function);
        table.push_scope(ScopeKind::Block);
        table.insert_global(sym("f")).unwrap();
        table.pop_scope();
        table.pop_scope();
        assert!(table.at_global_scope());
        assert!(table.lookup("f").is_some());
    }

    #[test]
    fn test_scope_kinds() {
        let mut table = SymbolTable::new();
        assert!(table.at_global_scope());
        let id = table.push_scope(ScopeKind::Function);
        assert_eq!(table.kind(id), ScopeKind::Function);
        assert!(!table.at_global_scope());
    }
}
