//! The symbolic memory layouts computed by the extractor.

use std::fmt::{self, Display};

use super::locations::LocationKey;
use crate::term::{Function, Term};
use crate::util::ListDisplay;
use crate::{Error, Result};

/// Object terms that are equal on one branch of the side proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EquivalenceClass {
    terms: Vec<Term>,
}

impl EquivalenceClass {
    pub(crate) fn new() -> EquivalenceClass {
        EquivalenceClass { terms: vec![] }
    }

    pub(crate) fn add(&mut self, term: Term) {
        if !self.contains(&term) {
            self.terms.push(term);
        }
    }

    pub(crate) fn absorb(&mut self, other: EquivalenceClass) {
        for term in other.terms {
            self.add(term);
        }
    }

    /// The members in insertion order.
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn contains(&self, term: &Term) -> bool {
        self.terms.contains(term)
    }

    /// `null` if it is a member, otherwise the member with the shortest
    /// printed form. Ties go to the earlier member.
    pub fn representative(&self) -> Option<&Term> {
        if let Some(null) = self.terms.iter().find(|t| is_null(t)) {
            return Some(null);
        }
        let mut best: Option<(&Term, usize)> = None;
        for term in &self.terms {
            let len = term.to_string().len();
            if best.map_or(true, |(_, shortest)| len < shortest) {
                best = Some((term, len));
            }
        }
        best.map(|(term, _)| term)
    }
}

impl Display for EquivalenceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", ListDisplay(&self.terms, ", "))
    }
}

pub(crate) fn is_null(term: &Term) -> bool {
    term.op().as_function() == Some(&Function::null())
}

/// The class containing `term`, if any.
pub(crate) fn find_class<'c>(
    classes: &'c [EquivalenceClass],
    term: &Term,
) -> Option<&'c EquivalenceClass> {
    classes.iter().find(|c| c.contains(term))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolicValue {
    pub key: LocationKey,
    pub value: Term,
    pub condition: Option<Term>,
}

impl Display for SymbolicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value of {} is {}", self.key, self.value)?;
        if let Some(condition) = &self.condition {
            write!(f, " under {condition}")?;
        }
        Ok(())
    }
}

/// A reference from a container to an object, named by the object's term.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolicAssociation {
    pub key: LocationKey,
    pub target: Term,
    pub condition: Option<Term>,
}

impl Display for SymbolicAssociation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Association {} to {}", self.key, self.target)?;
        if let Some(condition) = &self.condition {
            write!(f, " under {condition}")?;
        }
        Ok(())
    }
}

/// Values and associations of a state or an object. Each key and condition
/// has at most one target.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssociationValueContainer {
    values: Vec<SymbolicValue>,
    associations: Vec<SymbolicAssociation>,
}

impl AssociationValueContainer {
    pub fn values(&self) -> &[SymbolicValue] {
        &self.values
    }

    pub fn associations(&self) -> &[SymbolicAssociation] {
        &self.associations
    }

    pub fn value(&self, key: &LocationKey, condition: Option<&Term>) -> Option<&SymbolicValue> {
        self.values
            .iter()
            .find(|v| &v.key == key && v.condition.as_ref() == condition)
    }

    pub fn association(
        &self,
        key: &LocationKey,
        condition: Option<&Term>,
    ) -> Option<&SymbolicAssociation> {
        self.associations
            .iter()
            .find(|a| &a.key == key && a.condition.as_ref() == condition)
    }

    pub(crate) fn add_value(&mut self, value: SymbolicValue) -> Result<()> {
        match self.value(&value.key, value.condition.as_ref()) {
            None => self.values.push(value),
            Some(existing) if existing.value != value.value => {
                return Err(Error::ProofInput(format!(
                    "Multiple values found: {value} and {existing}."
                )))
            }
            Some(_) => {}
        }
        Ok(())
    }

    pub(crate) fn add_association(&mut self, association: SymbolicAssociation) -> Result<()> {
        match self.association(&association.key, association.condition.as_ref()) {
            None => self.associations.push(association),
            Some(existing) if existing.target != association.target => {
                return Err(Error::ProofInput(format!(
                    "Multiple association targets found: {association} and {existing}."
                )))
            }
            Some(_) => {}
        }
        Ok(())
    }

    fn fmt_members(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for value in &self.values {
            writeln!(f, "  {value}")?;
        }
        for association in &self.associations {
            writeln!(f, "  {association}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolicState {
    pub name: String,
    pub container: AssociationValueContainer,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolicObject {
    pub name: Term,
    pub container: AssociationValueContainer,
}

/// A state and the objects reachable from it, under one assignment of the
/// equivalence classes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolicLayout {
    pub state: SymbolicState,
    pub objects: Vec<SymbolicObject>,
    pub equivalence_classes: Vec<EquivalenceClass>,
}

impl SymbolicLayout {
    pub(crate) fn new(state_name: String, equivalence_classes: Vec<EquivalenceClass>) -> Self {
        SymbolicLayout {
            state: SymbolicState {
                name: state_name,
                container: AssociationValueContainer::default(),
            },
            objects: vec![],
            equivalence_classes,
        }
    }

    pub fn object(&self, name: &Term) -> Option<&SymbolicObject> {
        self.objects.iter().find(|o| &o.name == name)
    }

    pub(crate) fn object_mut(&mut self, name: &Term) -> Option<&mut SymbolicObject> {
        self.objects.iter_mut().find(|o| &o.name == name)
    }

    /// Adds an object unless one with that name exists.
    pub(crate) fn add_object(&mut self, name: Term) {
        if self.object(&name).is_none() {
            self.objects.push(SymbolicObject {
                name,
                container: AssociationValueContainer::default(),
            });
        }
    }
}

impl Display for SymbolicLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "state {}", self.state.name)?;
        self.state.container.fmt_members(f)?;
        for object in &self.objects {
            writeln!(f, "object {}", object.name)?;
            object.container.fmt_members(f)?;
        }
        if !self.equivalence_classes.is_empty() {
            writeln!(
                f,
                "equivalence classes {}",
                ListDisplay(&self.equivalence_classes, ", ")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::Sort;
    use crate::term::{ProgramVariable, TermBuilder};

    fn constant(name: &str) -> Term {
        TermBuilder
            .func(&Function::constant(name, Sort::object("Node")), vec![])
            .unwrap()
    }

    #[test]
    fn representatives() {
        let mut class = EquivalenceClass::new();
        class.add(constant("bb"));
        class.add(constant("a"));
        class.add(constant("c"));
        assert_eq!(class.representative(), Some(&constant("a")));
        class.add(TermBuilder.null());
        assert_eq!(class.representative(), Some(&TermBuilder.null()));
        assert_eq!(class.to_string(), "(bb, a, c, null)");
    }

    #[test]
    fn conflicting_targets_are_rejected() {
        let key = LocationKey::Variable(ProgramVariable::new("x", Sort::object("Node")));
        let mut container = AssociationValueContainer::default();
        let to = |target: Term| SymbolicAssociation {
            key: key.clone(),
            target,
            condition: None,
        };
        container.add_association(to(constant("a"))).unwrap();
        container.add_association(to(constant("a"))).unwrap();
        assert_eq!(container.associations().len(), 1);
        let err = container.add_association(to(constant("b"))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Multiple association targets found: Association x to b and Association x to a."
        );
    }
}
