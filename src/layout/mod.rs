//! Symbolic memory layouts.
//!
//! At a proof node, heap objects may or may not alias. The
//! [`SymbolicLayoutExtractor`] enumerates the possibilities by cutting on
//! the equality of every pair of objects in a side proof. Every open goal of
//! that side proof is one possible layout: the cut literals on its branch
//! partition the objects into [`EquivalenceClass`]es. The values of the
//! locations in such a layout are computed on demand by a second side proof.

mod locations;
mod model;

use std::sync::Arc;

pub use locations::{Location, LocationKey, LocationKind};
pub use model::*;

use crate::app::TacletApp;
use crate::condition::{self, check_skolem_equality, is_skolem_constant, SkolemEquality};
use crate::executor;
use crate::proof::{NodeId, Proof, RuleApp};
use crate::schema::SchemaVariable;
use crate::sequent::{Sequent, SequentFormula};
use crate::side_proof::{compute_general_sequent_to_prove, SideProof, SideProofStore};
use crate::strategy::{ApplyStrategy, StrategySettings};
use crate::taclet::Taclet;
use crate::term::{Function, Junctor, Operator, PosInOccurrence, Term, TermBuilder};
use crate::util::{FreshGen, HashMap, IndexSet};
use crate::{Error, Result};
use locations::LocationCollector;

#[derive(Clone, Debug)]
pub struct LayoutSettings {
    /// Rule applications of the side proofs, shared among the open goals
    /// before each cut.
    pub max_proof_steps: usize,
    /// Lower bound of the rule applications per goal after a cut.
    pub min_steps_per_goal: usize,
    /// Program variables that are never objects or locations.
    pub ignored_variables: Vec<String>,
    /// Simplify the conditions of values and associations.
    pub simplify_conditions: bool,
    /// Keeps the side proofs instead of disposing them.
    pub side_proof_store: Option<Arc<SideProofStore>>,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        LayoutSettings {
            max_proof_steps: 8000,
            min_steps_per_goal: 300,
            ignored_variables: vec!["exc".to_owned()],
            simplify_conditions: true,
            side_proof_store: None,
        }
    }
}

/// A location with its value on one goal of a layout side proof.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExecutionVariableValuePair {
    pub location: Location,
    pub value: Term,
    pub condition: Option<Term>,
}

impl ExecutionVariableValuePair {
    pub fn parent(&self) -> Option<&Term> {
        self.location.parent.as_ref()
    }

    pub fn is_state_member(&self) -> bool {
        self.location.is_state_member()
    }
}

#[derive(Debug)]
struct Analysis {
    path_condition: Term,
    initial_locations: IndexSet<Location>,
    current_locations: IndexSet<Location>,
    objects: Vec<Term>,
    initial_updates: Vec<Term>,
    current_updates: Vec<Term>,
    side_sequent: Sequent,
    /// The cut literals of each layout.
    layouts: Vec<IndexSet<Term>>,
    classes: HashMap<usize, Arc<[EquivalenceClass]>>,
    initial: HashMap<usize, Arc<SymbolicLayout>>,
    current: HashMap<usize, Arc<SymbolicLayout>>,
}

/// Which state a layout describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LayoutState {
    Initial,
    Current,
}

pub struct SymbolicLayoutExtractor<'p> {
    proof: &'p Proof,
    node: NodeId,
    modality_pio: PosInOccurrence,
    settings: LayoutSettings,
    analysis: Option<Analysis>,
}

impl<'p> SymbolicLayoutExtractor<'p> {
    pub fn new(
        proof: &'p Proof,
        node: NodeId,
        modality_pio: PosInOccurrence,
        settings: LayoutSettings,
    ) -> Self {
        SymbolicLayoutExtractor {
            proof,
            node,
            modality_pio,
            settings,
            analysis: None,
        }
    }

    pub fn is_analysed(&self) -> bool {
        self.analysis.is_some()
    }

    /// Enumerates the layouts. Does nothing when already analysed; a failed
    /// analysis can be retried.
    pub fn analyse(&mut self) -> Result<()> {
        if self.analysis.is_none() {
            let analysis = self.compute_analysis()?;
            log::debug!(
                "node {}: {} objects, {} layouts",
                self.proof.node(self.node).serial(),
                analysis.objects.len(),
                analysis.layouts.len()
            );
            self.analysis = Some(analysis);
        }
        Ok(())
    }

    fn analysis(&self) -> Result<&Analysis> {
        self.analysis
            .as_ref()
            .ok_or_else(|| Error::ProofInput("The layouts are not analysed yet.".into()))
    }

    fn analysis_mut(&mut self) -> Result<&mut Analysis> {
        self.analysis
            .as_mut()
            .ok_or_else(|| Error::ProofInput("The layouts are not analysed yet.".into()))
    }

    fn is_ignored(&self, term: &Term) -> bool {
        matches!(term.op(), Operator::ProgramVariable(pv)
            if self.settings.ignored_variables.iter().any(|n| n == pv.name.as_str()))
    }

    fn compute_analysis(&self) -> Result<Analysis> {
        let tb = self.proof.env().tb();
        let sequent = self.proof.node(self.node).sequent();
        let path_condition = condition::path_condition(self.proof, self.node, true)?;

        let ignored = |t: &Term| self.is_ignored(t);
        let mut reads = LocationCollector::new(&ignored, false);
        let mut writes = LocationCollector::new(&ignored, true);
        for (formula, _) in sequent.formulas() {
            reads.collect(formula.formula());
            writes.collect(formula.formula());
        }
        reads.collect(&path_condition);
        let initial_locations = reads.locations;
        let mut current_locations = initial_locations.clone();
        current_locations.extend(writes.locations);

        let objects = self.collect_objects(sequent, &writes.update_values);
        let initial_updates = self.initial_updates();
        let current_updates = if self.node == self.proof.root() {
            initial_updates.clone()
        } else {
            tb.split_updates(self.modality_pio.sequent_formula().formula()).0
        };
        let side_sequent =
            compute_general_sequent_to_prove(sequent, Some(self.modality_pio.sequent_formula()));

        let layouts = self.enumerate_layouts(&side_sequent, &initial_updates, &objects)?;
        Ok(Analysis {
            path_condition,
            initial_locations,
            current_locations,
            objects,
            initial_updates,
            current_updates,
            side_sequent,
            layouts,
            classes: HashMap::default(),
            initial: HashMap::default(),
            current: HashMap::default(),
        })
    }

    /// Update values and the closed reference-sort subterms of the sequent,
    /// shortest first, then `null`.
    fn collect_objects(&self, sequent: &Sequent, update_values: &IndexSet<Term>) -> Vec<Term> {
        let mut objects: IndexSet<Term> = update_values.clone();
        for (formula, _) in sequent.formulas() {
            if check_skolem_equality(formula.formula()) != SkolemEquality::None {
                continue;
            }
            formula.formula().walk(&mut |t: &Term| {
                if t.sort().is_reference()
                    && t.is_closed()
                    && !self.is_ignored(t)
                    && !is_skolem_constant(t)
                {
                    objects.insert(t.without_labels());
                }
                true
            });
        }
        let mut objects: Vec<Term> = objects.into_iter().filter(|t| !is_null(t)).collect();
        objects.sort_by_cached_key(|t| t.to_string().len());
        objects.push(TermBuilder.null());
        objects
    }

    /// The elementary updates above the modality of the root's succedent,
    /// looking below an implication.
    fn initial_updates(&self) -> Vec<Term> {
        let root = self.proof.node(self.proof.root()).sequent();
        let mut updates = vec![];
        for formula in root.succedent().iter() {
            let term = formula.formula();
            let target = if term.op().is_junctor(Junctor::Imp) {
                term.sub(1)
            } else {
                term
            };
            let mut current = target;
            while current.op() == &Operator::UpdateApplication {
                collect_elementary_updates(current.sub(0), &mut updates);
                current = current.sub(1);
            }
        }
        updates
    }

    fn cut_taclet(&self) -> Result<(Arc<Taclet>, SchemaVariable)> {
        let cut = self
            .proof
            .env()
            .taclet_index()
            .get("cut")
            .cloned()
            .ok_or_else(|| Error::ProofInput("The rule base has no cut rule.".into()))?;
        let sv = cut
            .schema_vars()
            .iter()
            .find(|sv| sv.name().as_str() == "cutFormula")
            .cloned()
            .ok_or_else(|| Error::ProofInput("The cut rule has no cut formula.".into()))?;
        Ok((cut, sv))
    }

    fn enumerate_layouts(
        &self,
        side_sequent: &Sequent,
        updates: &[Term],
        objects: &[Term],
    ) -> Result<Vec<IndexSet<Term>>> {
        let tb = self.proof.env().tb();
        let (cut, sv) = self.cut_taclet()?;
        let description = format!(
            "Layouts of node {}",
            self.proof.node(self.node).serial()
        );
        let mut side = SideProof::start(self.proof.env(), &description, side_sequent.clone())
            .store_in(self.settings.side_proof_store.clone());
        let mut strategy = ApplyStrategy::new(StrategySettings {
            max_steps: self.settings.max_proof_steps,
            timeout: None,
        });
        for (i, first) in objects.iter().enumerate() {
            for second in &objects[i + 1..] {
                let equals = tb.equals(first.clone(), second.clone())?;
                let equality = tb.apply_parallel(updates, equals)?;
                self.apply_cut(&mut side, &mut strategy, (&cut, &sv), equality)?;
            }
        }
        strategy.settings_mut().max_steps = self.settings.max_proof_steps;
        side.run(&mut strategy)?;
        extract_applied_cuts(side.proof(), &sv)
    }

    /// Cuts every open goal on `formula` and runs the strategy on the new
    /// goals.
    fn apply_cut(
        &self,
        side: &mut SideProof,
        strategy: &mut ApplyStrategy,
        (cut, sv): (&Arc<Taclet>, &SchemaVariable),
        formula: Term,
    ) -> Result<()> {
        let goals = side.proof().open_goals();
        if goals.is_empty() {
            return Ok(());
        }
        let budget =
            (self.settings.max_proof_steps / goals.len()).max(self.settings.min_steps_per_goal);
        for goal in goals {
            let app =
                TacletApp::new(cut.clone()).add_checked_instantiation(sv, formula.clone(), true)?;
            let children = executor::apply(side.proof_mut(), goal, RuleApp::Taclet(app))?;
            strategy.settings_mut().max_steps = budget;
            strategy.start(side.proof_mut(), &children)?;
        }
        Ok(())
    }

    pub fn path_condition(&self) -> Result<&Term> {
        Ok(&self.analysis()?.path_condition)
    }

    /// The candidate objects, `null` last.
    pub fn objects(&self) -> Result<&[Term]> {
        Ok(&self.analysis()?.objects)
    }

    pub fn initial_locations(&self) -> Result<&IndexSet<Location>> {
        Ok(&self.analysis()?.initial_locations)
    }

    pub fn current_locations(&self) -> Result<&IndexSet<Location>> {
        Ok(&self.analysis()?.current_locations)
    }

    pub fn layouts_count(&self) -> Result<usize> {
        Ok(self.analysis()?.layouts.len())
    }

    /// The cut literals that hold in layout `index`.
    pub fn layout_literals(&self, index: usize) -> Result<&IndexSet<Term>> {
        self.analysis()?
            .layouts
            .get(index)
            .ok_or_else(|| Error::ProofInput(format!("There is no layout {index}.")))
    }

    /// The classes of objects equal in layout `index`, each with at least two
    /// members and pairwise disjoint.
    pub fn equivalence_classes(&mut self, index: usize) -> Result<Arc<[EquivalenceClass]>> {
        let literals = self.layout_literals(index)?.clone();
        let analysis = self.analysis_mut()?;
        let classes = analysis
            .classes
            .entry(index)
            .or_insert_with(|| compute_equivalence_classes(&literals).into());
        Ok(classes.clone())
    }

    pub fn initial_layout(&mut self, index: usize) -> Result<Arc<SymbolicLayout>> {
        self.layout(index, LayoutState::Initial)
    }

    pub fn current_layout(&mut self, index: usize) -> Result<Arc<SymbolicLayout>> {
        self.layout(index, LayoutState::Current)
    }

    fn initial_state_name(&self) -> String {
        format!(
            "{} resulting in {}",
            self.proof.node_name(self.proof.root()),
            self.current_state_name()
        )
    }

    fn current_state_name(&self) -> String {
        self.proof.node_name(self.node)
    }

    fn layout(&mut self, index: usize, state: LayoutState) -> Result<Arc<SymbolicLayout>> {
        let cache = |analysis: &Analysis| match state {
            LayoutState::Initial => analysis.initial.get(&index).cloned(),
            LayoutState::Current => analysis.current.get(&index).cloned(),
        };
        if let Some(layout) = cache(self.analysis()?) {
            return Ok(layout);
        }
        let classes = self.equivalence_classes(index)?;
        let layout = Arc::new(self.compute_layout(index, state, &classes)?);
        let analysis = self.analysis_mut()?;
        match state {
            LayoutState::Initial => analysis.initial.insert(index, layout.clone()),
            LayoutState::Current => analysis.current.insert(index, layout.clone()),
        };
        Ok(layout)
    }

    fn compute_layout(
        &self,
        index: usize,
        state: LayoutState,
        classes: &[EquivalenceClass],
    ) -> Result<SymbolicLayout> {
        let analysis = self.analysis()?;
        let (locations, state_name) = match state {
            LayoutState::Initial => (&analysis.initial_locations, self.initial_state_name()),
            LayoutState::Current => (&analysis.current_locations, self.current_state_name()),
        };
        if locations.is_empty() {
            return self.create_layout(classes, &IndexSet::default(), state_name);
        }
        let tb = self.proof.env().tb();
        let literals = self.layout_literals(index)?;
        let layout_condition = tb.and_all(
            literals
                .iter()
                .map(|l| tb.apply_parallel(&analysis.initial_updates, l.clone()))
                .collect::<Result<Vec<_>>>()?,
        )?;
        let locations: IndexSet<Location> = locations
            .iter()
            .map(|location| match location.parent.as_ref().and_then(|p| find_class(classes, p)) {
                Some(class) => match class.representative() {
                    Some(rep) => location.with_parent(rep.clone()),
                    None => location.clone(),
                },
                None => location.clone(),
            })
            .collect();
        let pairs =
            self.compute_variable_value_pairs(analysis, layout_condition, &locations, state)?;
        self.create_layout(classes, &pairs, state_name)
    }

    /// Proves `side sequent, condition ==> {u}layout_pred(locations)` as far
    /// as possible and reads the location values from the open goals.
    fn compute_variable_value_pairs(
        &self,
        analysis: &Analysis,
        layout_condition: Term,
        locations: &IndexSet<Location>,
        state: LayoutState,
    ) -> Result<IndexSet<ExecutionVariableValuePair>> {
        let tb = self.proof.env().tb();
        let mut names = self.proof.env().names().clone();
        let name: crate::Symbol = names.fresh("layout_pred");
        let predicate = Function::predicate(
            name.as_str(),
            locations.iter().map(Location::sort).collect(),
        );
        let location_terms = locations
            .iter()
            .map(|l| l.term(tb))
            .collect::<Result<Vec<_>>>()?;
        let layout_term = tb.func(&predicate, location_terms)?;
        let layout_term = match state {
            LayoutState::Initial => tb.apply_parallel(&analysis.initial_updates, layout_term)?,
            LayoutState::Current => tb.apply_sequential(&analysis.current_updates, layout_term)?,
        };
        let mut sequent = analysis
            .side_sequent
            .add_formula(SequentFormula::new(layout_term)?, false);
        if !layout_condition.op().is_junctor(Junctor::True) {
            sequent = sequent.add_formula(SequentFormula::new(layout_condition)?, true);
        }

        let description = format!(
            "Layout values of node {}",
            self.proof.node(self.node).serial()
        );
        let mut side = SideProof::start(self.proof.env(), &description, sequent)
            .store_in(self.settings.side_proof_store.clone());
        let mut strategy = ApplyStrategy::new(StrategySettings {
            max_steps: self.settings.max_proof_steps,
            timeout: None,
        });
        side.run(&mut strategy)?;

        let proof = side.proof();
        let goals = proof.open_goals();
        let mut pairs = IndexSet::default();
        for goal in goals.iter().copied() {
            let Some(values) = proof.node(goal).sequent().succedent().iter().find_map(|f| {
                let term = tb.go_below_updates(f.formula());
                (term.op().as_function() == Some(&predicate)).then(|| term.clone())
            }) else {
                continue;
            };
            let condition = if goals.len() > 1 {
                let condition =
                    condition::path_condition(proof, goal, self.settings.simplify_conditions)?;
                (!condition.op().is_junctor(Junctor::True)).then_some(condition)
            } else {
                None
            };
            for (location, value) in locations.iter().zip(values.subs()) {
                pairs.insert(ExecutionVariableValuePair {
                    location: location.clone(),
                    value: value.without_labels(),
                    condition: condition.clone(),
                });
            }
        }
        Ok(pairs)
    }

    fn create_layout(
        &self,
        classes: &[EquivalenceClass],
        pairs: &IndexSet<ExecutionVariableValuePair>,
        state_name: String,
    ) -> Result<SymbolicLayout> {
        let representative = |term: &Term| -> Term {
            find_class(classes, term)
                .and_then(EquivalenceClass::representative)
                .unwrap_or(term)
                .clone()
        };
        let mut layout = SymbolicLayout::new(state_name, classes.to_vec());
        for pair in pairs {
            for term in pair.parent().into_iter().chain([&pair.value]) {
                if term.sort().is_reference() {
                    layout.add_object(representative(term));
                }
            }
        }
        for pair in pairs {
            let value = representative(&pair.value);
            let is_object = layout.object(&value).is_some();
            let container = match pair.parent() {
                Some(parent) => match layout.object_mut(&representative(parent)) {
                    Some(object) => &mut object.container,
                    None => continue,
                },
                None => &mut layout.state.container,
            };
            let key = pair.location.key();
            if is_object {
                container.add_association(SymbolicAssociation {
                    key,
                    target: value,
                    condition: pair.condition.clone(),
                })?;
            } else {
                container.add_value(SymbolicValue {
                    key,
                    value,
                    condition: pair.condition.clone(),
                })?;
            }
        }
        Ok(layout)
    }
}

fn collect_elementary_updates(update: &Term, out: &mut Vec<Term>) {
    match update.op() {
        Operator::UpdateParallel => {
            for sub in update.subs() {
                collect_elementary_updates(sub, out);
            }
        }
        Operator::ElementaryUpdate(_) | Operator::Store(_) => out.push(update.clone()),
        _ => {}
    }
}

/// The cut literals on the path of every open goal, each set once. A
/// literal is `a = b` below the updates on the first branch of a cut and its
/// negation on the second.
fn extract_applied_cuts(
    proof: &Proof,
    cut_formula: &SchemaVariable,
) -> Result<Vec<IndexSet<Term>>> {
    let tb = proof.env().tb();
    let mut result: Vec<IndexSet<Term>> = vec![];
    for goal in proof.open_goals() {
        if !proof.is_descendant(goal, proof.root()) {
            return Err(Error::ProofInput(format!(
                "Node {} is not a descendant of the side proof root.",
                proof.node(goal).serial()
            )));
        }
        let mut literals = IndexSet::default();
        let mut current = goal;
        while let Some(parent) = proof.parent(current) {
            let cut = proof
                .node(parent)
                .applied_rule_app()
                .and_then(RuleApp::as_taclet_app)
                .filter(|app| app.taclet().name().as_str() == "cut")
                .and_then(|app| app.instantiations().get_term(cut_formula));
            if let Some(formula) = cut {
                let literal = tb.go_below_updates(formula).clone();
                let literal = if proof.child_index(current) == Some(1) {
                    tb.not(literal)?
                } else {
                    literal
                };
                literals.insert(literal);
            }
            current = parent;
        }
        if !result.contains(&literals) {
            result.push(literals);
        }
    }
    Ok(result)
}

/// Merges the sides of the positive literals into classes.
fn compute_equivalence_classes(literals: &IndexSet<Term>) -> Vec<EquivalenceClass> {
    let mut classes: Vec<EquivalenceClass> = vec![];
    for literal in literals {
        if literal.op() != &Operator::Equals {
            continue;
        }
        let (a, b) = (literal.sub(0), literal.sub(1));
        let mut class = EquivalenceClass::new();
        class.add(a.clone());
        class.add(b.clone());
        let mut merged: Option<usize> = None;
        let mut i = 0;
        while i < classes.len() {
            if classes[i].contains(a) || classes[i].contains(b) {
                match merged {
                    None => {
                        classes[i].absorb(std::mem::replace(&mut class, EquivalenceClass::new()));
                        merged = Some(i);
                        i += 1;
                    }
                    Some(target) => {
                        let other = classes.remove(i);
                        classes[target].absorb(other);
                    }
                }
            } else {
                i += 1;
            }
        }
        if merged.is_none() {
            classes.push(class);
        }
    }
    classes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::Sort;

    fn constant(name: &str) -> Term {
        TermBuilder
            .func(&Function::constant(name, Sort::object("Node")), vec![])
            .unwrap()
    }

    #[test]
    fn classes_are_merged() {
        let tb = TermBuilder;
        let (a, b, c, d) = (constant("a"), constant("b"), constant("c"), constant("d"));
        let literals: IndexSet<Term> = [
            tb.equals(a.clone(), b.clone()).unwrap(),
            tb.equals(c.clone(), d.clone()).unwrap(),
            tb.not(tb.equals(a.clone(), c.clone()).unwrap()).unwrap(),
            tb.equals(b.clone(), d.clone()).unwrap(),
        ]
        .into_iter()
        .collect();
        let classes = compute_equivalence_classes(&literals);
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].terms(), &[a.clone(), b, d, c]);
        assert_eq!(classes[0].representative(), Some(&a));
    }
}
