//! Instantiations of schema variables.
//!
//! [`SVInstantiations`] is persistent: every operation returns a new value.
//! Match attempts fork freely and a failed branch is simply dropped.

use std::fmt::{self, Display};
use std::sync::Arc;

use crate::schema::SchemaVariable;
use crate::sort::Sort;
use crate::term::{Labels, LogicVariable, QuantifiableVariable, Term, UpdateLabelPair};
use crate::util::PersistentMap;
use crate::{Error, Result, Symbol};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Instantiation {
    Term(Term),
    Program(Arc<str>),
}

impl Instantiation {
    pub fn as_term(&self) -> Option<&Term> {
        match self {
            Instantiation::Term(t) => Some(t),
            Instantiation::Program(_) => None,
        }
    }
}

impl Display for Instantiation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instantiation::Term(t) => write!(f, "{t}"),
            Instantiation::Program(p) => write!(f, "{p}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Entry {
    value: Instantiation,
    /// Interesting instantiations cannot be derived from the position and
    /// would have to be recorded to replay the application.
    interesting: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SVInstantiations {
    map: PersistentMap<SchemaVariable, Entry>,
    update_context: im::Vector<UpdateLabelPair>,
    generic_sorts: PersistentMap<Symbol, Sort>,
}

impl SVInstantiations {
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn get(&self, sv: &SchemaVariable) -> Option<&Instantiation> {
        self.map.get(sv).map(|e| &e.value)
    }

    pub fn get_term(&self, sv: &SchemaVariable) -> Option<&Term> {
        self.get(sv).and_then(Instantiation::as_term)
    }

    pub fn is_instantiated(&self, sv: &SchemaVariable) -> bool {
        self.map.contains_key(sv)
    }

    pub fn is_interesting(&self, sv: &SchemaVariable) -> bool {
        self.map.get(sv).map_or(false, |e| e.interesting)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SchemaVariable, &Instantiation)> + '_ {
        self.map.iter().map(|(sv, e)| (sv, &e.value))
    }

    /// Binds `sv`. Binding it again to an equal value is allowed; binding it
    /// to a different value is an error.
    pub fn add(
        &self,
        sv: SchemaVariable,
        value: Instantiation,
        interesting: bool,
    ) -> Result<SVInstantiations> {
        match self.map.get(&sv) {
            Some(existing) if existing.value != value => Err(Error::IllegalInstantiation {
                sv: sv.name(),
                msg: format!(
                    "already instantiated with {}, cannot rebind to {value}",
                    existing.value
                ),
            }),
            Some(existing) if existing.interesting || !interesting => Ok(self.clone()),
            _ => Ok(self.replace(sv, value, interesting)),
        }
    }

    /// Binds `sv`, overwriting an existing binding.
    pub fn replace(
        &self,
        sv: SchemaVariable,
        value: Instantiation,
        interesting: bool,
    ) -> SVInstantiations {
        SVInstantiations {
            map: self.map.update(sv, Entry { value, interesting }),
            ..self.clone()
        }
    }

    pub fn update_context(&self) -> &im::Vector<UpdateLabelPair> {
        &self.update_context
    }

    pub fn update_context_terms(&self) -> Vec<Term> {
        self.update_context.iter().map(|p| p.update.clone()).collect()
    }

    pub fn add_update(&self, update: Term, labels: Labels) -> SVInstantiations {
        let mut result = self.clone();
        result
            .update_context
            .push_back(UpdateLabelPair { update, labels });
        result
    }

    pub fn clear_update_context(&self) -> SVInstantiations {
        SVInstantiations {
            update_context: im::Vector::new(),
            ..self.clone()
        }
    }

    pub fn with_update_context(&self, context: im::Vector<UpdateLabelPair>) -> SVInstantiations {
        SVInstantiations {
            update_context: context,
            ..self.clone()
        }
    }

    pub fn generic_sort(&self, name: Symbol) -> Option<Sort> {
        self.generic_sorts.get(&name).copied()
    }

    /// Records that the generic sort `name` must accommodate `sort`. The
    /// instantiation may be widened or narrowed along the subsort relation;
    /// incompatible sorts give `None`.
    pub fn constrain_generic(&self, name: Symbol, sort: Sort) -> Option<SVInstantiations> {
        let fixed = match self.generic_sorts.get(&name) {
            None => sort,
            Some(existing) if sort.extends(existing) => *existing,
            Some(existing) if existing.extends(&sort) => sort,
            Some(_) => return None,
        };
        if !fixed.is_term_sort() {
            return None;
        }
        Some(SVInstantiations {
            generic_sorts: self.generic_sorts.update(name, fixed),
            ..self.clone()
        })
    }

    /// Resolves a generic sort to its instantiation.
    pub fn instantiate_sort(&self, sort: Sort) -> Sort {
        match sort {
            Sort::Generic(name) => self.generic_sort(name).unwrap_or(sort),
            _ => sort,
        }
    }
}

impl Display for SVInstantiations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<String> = self
            .iter()
            .map(|(sv, value)| format!("{sv} := {value}"))
            .collect();
        entries.sort();
        write!(f, "[{}]", entries.join(", "))
    }
}

/// Correspondences between variables bound in a pattern and in the matched
/// term, innermost last.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenameTable {
    pairs: im::Vector<(QuantifiableVariable, LogicVariable)>,
}

impl RenameTable {
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn push(&self, pattern: QuantifiableVariable, concrete: LogicVariable) -> RenameTable {
        let mut pairs = self.pairs.clone();
        pairs.push_back((pattern, concrete));
        RenameTable { pairs }
    }

    /// Whether `pattern` and `concrete` denote the same variable under the
    /// table. Variables bound in neither must be identical.
    pub fn corresponds(&self, pattern: &QuantifiableVariable, concrete: &LogicVariable) -> bool {
        match self
            .pairs
            .iter()
            .rev()
            .find(|(p, c)| p == pattern || c == concrete)
        {
            Some((p, c)) => p == pattern && c == concrete,
            None => pattern.as_logic() == Some(concrete),
        }
    }

    /// Whether `concrete` is bound by one of the recorded binders.
    pub fn binds(&self, concrete: &LogicVariable) -> bool {
        self.pairs.iter().any(|(_, c)| c == concrete)
    }
}

/// The state threaded through matching.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchConditions {
    instantiations: SVInstantiations,
    renaming: RenameTable,
}

impl MatchConditions {
    pub fn new(instantiations: SVInstantiations, renaming: RenameTable) -> MatchConditions {
        MatchConditions {
            instantiations,
            renaming,
        }
    }

    pub fn instantiations(&self) -> &SVInstantiations {
        &self.instantiations
    }

    pub fn renaming(&self) -> &RenameTable {
        &self.renaming
    }

    pub fn set_instantiations(&self, instantiations: SVInstantiations) -> MatchConditions {
        MatchConditions {
            instantiations,
            renaming: self.renaming.clone(),
        }
    }

    pub fn set_renaming(&self, renaming: RenameTable) -> MatchConditions {
        MatchConditions {
            instantiations: self.instantiations.clone(),
            renaming,
        }
    }

    pub fn into_instantiations(self) -> SVInstantiations {
        self.instantiations
    }
}
