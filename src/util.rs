use std::fmt::{self, Display, Formatter};

use crate::Symbol;

pub(crate) type BuildHasher = std::hash::BuildHasherDefault<rustc_hash::FxHasher>;
pub(crate) type HashMap<K, V> = hashbrown::HashMap<K, V, BuildHasher>;
pub(crate) type HashSet<K> = hashbrown::HashSet<K, BuildHasher>;
pub type IndexMap<K, V> = indexmap::IndexMap<K, V, BuildHasher>;
pub type IndexSet<K> = indexmap::IndexSet<K, BuildHasher>;

/// Persistent map used by instantiation stores. Fx hashing keeps iteration
/// order stable across runs, which keeps skolem names reproducible.
pub type PersistentMap<K, V> = im::HashMap<K, V, BuildHasher>;

/// Generates fresh names for skolem constants, renamed bound variables and
/// helper predicates. A name is never handed out twice, and names recorded
/// with [`SymbolGen::reserve`] are skipped.
#[derive(Debug, Clone, Default)]
pub struct SymbolGen {
    count: usize,
    reserved_string: String,
    used: HashSet<Symbol>,
}

impl SymbolGen {
    pub fn new(reserved_string: String) -> Self {
        Self {
            count: 0,
            reserved_string,
            used: HashSet::default(),
        }
    }

    pub fn has_been_used(&self) -> bool {
        self.count > 0
    }

    pub fn reserved_prefix(&self) -> &str {
        &self.reserved_string
    }

    pub fn is_reserved(&self, symbol: &str) -> bool {
        !self.reserved_string.is_empty() && symbol.starts_with(&self.reserved_string)
    }

    /// Records a name that already occurs in a proof so that it is never generated.
    pub fn reserve(&mut self, name: Symbol) {
        self.used.insert(name);
    }
}

/// This trait lets us statically dispatch between `fresh` methods for generic structs.
pub trait FreshGen<Head: ?Sized, Leaf> {
    fn fresh(&mut self, name_hint: &Head) -> Leaf;
}

impl FreshGen<str, Symbol> for SymbolGen {
    fn fresh(&mut self, name_hint: &str) -> Symbol {
        loop {
            let s = format!("{}{}_{}", self.reserved_string, name_hint, self.count);
            self.count += 1;
            let sym = Symbol::from(s.as_str());
            if self.used.insert(sym) {
                return sym;
            }
        }
    }
}

impl FreshGen<Symbol, Symbol> for SymbolGen {
    fn fresh(&mut self, name_hint: &Symbol) -> Symbol {
        self.fresh(name_hint.as_str())
    }
}

/// Displays the items of a list separated by a fixed string.
pub struct ListDisplay<'a, TS>(pub TS, pub &'a str);

impl<TS> Display for ListDisplay<'_, TS>
where
    TS: Clone + IntoIterator,
    TS::Item: Display,
{
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let mut did_something = false;
        for item in self.0.clone().into_iter() {
            if did_something {
                f.write_str(self.1)?;
            }
            Display::fmt(&item, f)?;
            did_something = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_names_skip_reserved() {
        let mut gen = SymbolGen::default();
        gen.reserve(Symbol::from("x_0"));
        let a: Symbol = gen.fresh("x");
        let b: Symbol = gen.fresh("x");
        assert_eq!(a.as_str(), "x_1");
        assert_eq!(b.as_str(), "x_2");
        assert!(gen.has_been_used());
    }

    #[test]
    fn list_display() {
        let items = vec![1, 2, 3];
        assert_eq!(ListDisplay(&items, ", ").to_string(), "1, 2, 3");
    }
}
