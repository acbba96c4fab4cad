//! Heap and state locations read or written at a proof node.

use std::fmt::{self, Display};

use crate::sort::Sort;
use crate::term::{Function, FunctionKind, Operator, ProgramVariable, Term, TermBuilder};
use crate::util::IndexSet;
use crate::Result;

/// What a value or association is stored under in its container.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LocationKey {
    Variable(ProgramVariable),
    Field(Function),
    ArrayIndex(Term),
}

impl Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationKey::Variable(pv) => write!(f, "{pv}"),
            LocationKey::Field(field) => write!(f, "{field}"),
            LocationKey::ArrayIndex(index) => write!(f, "[{index}]"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LocationKind {
    Variable(ProgramVariable),
    Field(Function),
    ArrayElement(Function, Term),
}

/// A program variable, or a field or array element of a parent object.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    pub kind: LocationKind,
    pub parent: Option<Term>,
}

impl Location {
    pub fn variable(pv: ProgramVariable) -> Location {
        Location {
            kind: LocationKind::Variable(pv),
            parent: None,
        }
    }

    /// The location read by `term`, if it is a variable, field or array
    /// element read.
    pub fn of_read(term: &Term) -> Option<Location> {
        match term.op() {
            Operator::ProgramVariable(pv) => Some(Location::variable(*pv)),
            Operator::Function(f) => Self::of_access(f, term.subs()),
            _ => None,
        }
    }

    /// The location written by a store `f(args) := value`, or read by
    /// `f(args)`.
    fn of_access(f: &Function, args: &[Term]) -> Option<Location> {
        let kind = match f.kind() {
            FunctionKind::Field => LocationKind::Field(f.clone()),
            FunctionKind::ArrayElement => {
                LocationKind::ArrayElement(f.clone(), args.get(1)?.clone())
            }
            _ => return None,
        };
        Some(Location {
            kind,
            parent: Some(args.first()?.clone()),
        })
    }

    pub fn key(&self) -> LocationKey {
        match &self.kind {
            LocationKind::Variable(pv) => LocationKey::Variable(*pv),
            LocationKind::Field(f) => LocationKey::Field(f.clone()),
            LocationKind::ArrayElement(_, index) => LocationKey::ArrayIndex(index.clone()),
        }
    }

    /// Program variables belong to the state, everything else to an object.
    pub fn is_state_member(&self) -> bool {
        self.parent.is_none()
    }

    pub fn sort(&self) -> Sort {
        match &self.kind {
            LocationKind::Variable(pv) => pv.sort,
            LocationKind::Field(f) | LocationKind::ArrayElement(f, _) => f.sort(),
        }
    }

    pub fn with_parent(&self, parent: Term) -> Location {
        Location {
            kind: self.kind.clone(),
            parent: Some(parent),
        }
    }

    /// The term reading this location.
    pub fn term(&self, tb: &TermBuilder) -> Result<Term> {
        match (&self.kind, &self.parent) {
            (LocationKind::Variable(pv), _) => Ok(tb.pv(*pv)),
            (LocationKind::Field(f), Some(parent)) => tb.func(f, vec![parent.clone()]),
            (LocationKind::ArrayElement(f, index), Some(parent)) => {
                tb.func(f, vec![parent.clone(), index.clone()])
            }
            (_, None) => Err(crate::Error::ProofInput(format!(
                "location {} has no parent object",
                self.key()
            ))),
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent {
            Some(parent) => match &self.kind {
                LocationKind::ArrayElement(_, index) => write!(f, "{parent}[{index}]"),
                _ => write!(f, "{parent}.{}", self.key()),
            },
            None => write!(f, "{}", self.key()),
        }
    }
}

/// Walks terms and records the locations they mention.
pub(crate) struct LocationCollector<'a> {
    ignored: &'a dyn Fn(&Term) -> bool,
    /// Whether left-hand sides of updates count as locations.
    with_update_targets: bool,
    pub locations: IndexSet<Location>,
    /// Reference-sort values assigned by updates.
    pub update_values: IndexSet<Term>,
}

impl<'a> LocationCollector<'a> {
    pub fn new(ignored: &'a dyn Fn(&Term) -> bool, with_update_targets: bool) -> Self {
        LocationCollector {
            ignored,
            with_update_targets,
            locations: IndexSet::default(),
            update_values: IndexSet::default(),
        }
    }

    pub fn collect(&mut self, term: &Term) {
        term.walk(&mut |t: &Term| {
            self.visit(t);
            true
        });
    }

    fn visit(&mut self, term: &Term) {
        match term.op() {
            Operator::ElementaryUpdate(pv) => {
                let value = term.sub(0);
                if value.sort().is_reference() && !(self.ignored)(value) {
                    self.update_values.insert(value.clone());
                }
                if self.with_update_targets && !(self.ignored)(&TermBuilder.pv(*pv)) {
                    self.locations.insert(Location::variable(*pv));
                }
            }
            Operator::Store(f) => {
                let (args, value) = term.subs().split_at(term.arity() - 1);
                if value[0].sort().is_reference() && !(self.ignored)(&value[0]) {
                    self.update_values.insert(value[0].clone());
                }
                if self.with_update_targets {
                    self.insert(Location::of_access(f, args));
                }
            }
            _ if !(self.ignored)(term) => self.insert(Location::of_read(term)),
            _ => {}
        }
    }

    fn insert(&mut self, location: Option<Location>) {
        let Some(location) = location else {
            return;
        };
        if location.parent.as_ref().is_some_and(|p| (self.ignored)(p)) {
            return;
        }
        self.locations.insert(location);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_and_writes() {
        let tb = TermBuilder;
        let node = Sort::object("Node");
        let int = Sort::data("int");
        let this = ProgramVariable::new("self", node);
        let exc = ProgramVariable::new("exc", node);
        let next = Function::field("next", node, node);
        let value = Function::field("value", node, int);
        let self_next = tb.func(&next, vec![tb.pv(this)]).unwrap();
        let o = tb.func(&Function::constant("o", node), vec![]).unwrap();
        let one = tb.func(&Function::constant("1", int), vec![]).unwrap();
        let update = tb
            .parallel(
                tb.store(&value, vec![tb.pv(this)], one).unwrap(),
                tb.elementary(exc, o.clone()).unwrap(),
            )
            .unwrap();
        let p = Function::predicate("p", vec![node]);
        let formula = tb.apply(update, tb.func(&p, vec![self_next]).unwrap()).unwrap();

        let ignored = |t: &Term| {
            matches!(t.op(), Operator::ProgramVariable(pv) if pv.name.as_str() == "exc")
        };
        let mut reads = LocationCollector::new(&ignored, false);
        reads.collect(&formula);
        let names: Vec<_> = reads.locations.iter().map(ToString::to_string).collect();
        assert_eq!(names, ["self", "self.next"]);
        assert_eq!(reads.update_values.iter().cloned().collect::<Vec<_>>(), vec![o]);

        let mut all = LocationCollector::new(&ignored, true);
        all.collect(&formula);
        let names: Vec<_> = all.locations.iter().map(ToString::to_string).collect();
        assert_eq!(names, ["self.value", "self", "self.next"]);
        let location = all.locations.get_index(2).unwrap();
        assert_eq!(location.term(&tb).unwrap().to_string(), "self.next");
        assert!(!location.is_state_member());
    }

    #[test]
    fn array_elements_are_keyed_by_index() {
        let tb = TermBuilder;
        let array = Sort::object("Node[]");
        let int = Sort::data("int");
        let node = Sort::object("Node");
        let a = tb.pv(ProgramVariable::new("a", array));
        let element = Function::array_element("elem", array, int, node);
        let index = |n: &str| tb.func(&Function::constant(n, int), vec![]).unwrap();
        let read = |i: &str| tb.func(&element, vec![a.clone(), index(i)]).unwrap();
        let p = Function::predicate("q", vec![node, node]);
        let formula = tb.func(&p, vec![read("0"), read("1")]).unwrap();

        let ignored = |_: &Term| false;
        let mut reads = LocationCollector::new(&ignored, false);
        reads.collect(&formula);
        let keys: Vec<_> = reads
            .locations
            .iter()
            .filter(|l| !l.is_state_member())
            .map(Location::key)
            .collect();
        assert_eq!(
            keys,
            [
                LocationKey::ArrayIndex(index("0")),
                LocationKey::ArrayIndex(index("1"))
            ]
        );
        assert_eq!(reads.locations[0].to_string(), "a[0]");
    }
}
