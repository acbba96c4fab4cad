//! Truth-value tracing.
//!
//! Formulas labeled with a [`FormulaTermLabel`] keep their label ids through
//! rule applications: every formula a rule produces from a labeled one
//! records the label id it came from. The [`TruthValueTracer`] follows these
//! ids through a proof and tells for each leaf whether a labeled formula was
//! shown true, false, or neither on the path to it.

use std::fmt::{self, Display};

use crate::app::TacletApp;
use crate::condition;
use crate::executor::instantiate;
use crate::proof::{NodeId, Proof, RuleApp};
use crate::sequent::{Sequent, SequentFormula};
use crate::taclet::TacletGoalTemplate;
use crate::term::{FormulaTermLabel, Junctor, LabelId, Operator, PosInOccurrence, Term, TermBuilder};
use crate::util::{ListDisplay, PersistentMap};
use crate::{Result, Symbol};

/// Three-valued Kleene logic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TruthValue {
    True,
    False,
    Unknown,
}

impl TruthValue {
    pub fn and(self, other: TruthValue) -> TruthValue {
        use TruthValue::*;
        match (self, other) {
            (False, _) | (_, False) => False,
            (True, True) => True,
            _ => Unknown,
        }
    }

    pub fn or(self, other: TruthValue) -> TruthValue {
        use TruthValue::*;
        match (self, other) {
            (True, _) | (_, True) => True,
            (False, False) => False,
            _ => Unknown,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> TruthValue {
        match self {
            TruthValue::True => TruthValue::False,
            TruthValue::False => TruthValue::True,
            TruthValue::Unknown => TruthValue::Unknown,
        }
    }

    pub fn imp(self, other: TruthValue) -> TruthValue {
        self.not().or(other)
    }

    pub fn eqv(self, other: TruthValue) -> TruthValue {
        self.and(other).or(self.not().and(other.not()))
    }

    pub fn if_then_else(self, then: TruthValue, els: TruthValue) -> TruthValue {
        match self {
            TruthValue::True => then,
            TruthValue::False => els,
            TruthValue::Unknown => TruthValue::Unknown,
        }
    }
}

impl From<bool> for TruthValue {
    fn from(value: bool) -> Self {
        if value {
            TruthValue::True
        } else {
            TruthValue::False
        }
    }
}

impl Display for TruthValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TruthValue::True => "true",
            TruthValue::False => "false",
            TruthValue::Unknown => "unknown",
        })
    }
}

type Results = PersistentMap<LabelId, MultiEvaluationResult>;

/// What is known about one label: it was seen true, seen false, or it was
/// replaced by the formulas of an instruction term.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MultiEvaluationResult {
    pub evaluates_to_true: bool,
    pub evaluates_to_false: bool,
    pub instruction: Option<Term>,
}

impl MultiEvaluationResult {
    fn with_result(mut self, value: bool) -> Self {
        if value {
            self.evaluates_to_true = true;
        } else {
            self.evaluates_to_false = true;
        }
        self
    }

    fn with_instruction(mut self, instruction: Term) -> Self {
        self.instruction = Some(instruction);
        self
    }

    pub fn evaluate(&self, label_name: Symbol, results: &Results) -> TruthValue {
        self.evaluate_guarded(label_name, results, &mut vec![])
    }

    fn evaluate_guarded(
        &self,
        label_name: Symbol,
        results: &Results,
        visiting: &mut Vec<LabelId>,
    ) -> TruthValue {
        match (self.evaluates_to_true, self.evaluates_to_false, &self.instruction) {
            (true, true, _) => TruthValue::Unknown,
            (true, false, _) => TruthValue::True,
            (false, true, _) => TruthValue::False,
            (false, false, Some(term)) => {
                evaluate_term(term, label_name, results, visiting).unwrap_or(TruthValue::Unknown)
            }
            (false, false, None) => TruthValue::Unknown,
        }
    }
}

impl Display for MultiEvaluationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "true={}, false={}, instruction=",
            self.evaluates_to_true, self.evaluates_to_false
        )?;
        match &self.instruction {
            Some(term) => write!(f, "{term}"),
            None => f.write_str("none"),
        }
    }
}

fn formula_label(term: &Term, label_name: Symbol) -> Option<&FormulaTermLabel> {
    term.label(label_name.as_str()).and_then(|l| l.as_formula())
}

/// The value of an instruction term over the label results. Terms that are
/// neither labeled with a result nor a logical operator have no value.
fn evaluate_term(
    term: &Term,
    label_name: Symbol,
    results: &Results,
    visiting: &mut Vec<LabelId>,
) -> Option<TruthValue> {
    if let Some(label) = formula_label(term, label_name) {
        if let Some(result) = results.get(&label.id) {
            if visiting.contains(&label.id) {
                return Some(TruthValue::Unknown);
            }
            visiting.push(label.id);
            let value = result.evaluate_guarded(label_name, results, visiting);
            visiting.pop();
            return Some(value);
        }
    }
    let mut sub = |i: usize| {
        let below = TermBuilder.go_below_updates(term.sub(i));
        evaluate_term(below, label_name, results, visiting).unwrap_or(TruthValue::Unknown)
    };
    match term.op() {
        Operator::Junctor(Junctor::And) => Some(sub(0).and(sub(1))),
        Operator::Junctor(Junctor::Or) => Some(sub(0).or(sub(1))),
        Operator::Junctor(Junctor::Imp) => Some(sub(0).imp(sub(1))),
        Operator::Equiv => Some(sub(0).eqv(sub(1))),
        Operator::Junctor(Junctor::Not) => Some(sub(0).not()),
        Operator::Junctor(Junctor::True) => Some(TruthValue::True),
        Operator::Junctor(Junctor::False) => Some(TruthValue::False),
        Operator::IfThenElse if term.is_formula() => {
            let (cond, then, els) = (sub(0), sub(1), sub(2));
            Some(cond.if_then_else(then, els))
        }
        _ => None,
    }
}

/// The label results at one leaf of the traced subtree.
#[derive(Clone, Debug)]
pub struct BranchResult {
    pub leaf: NodeId,
    pub leaf_serial: usize,
    pub results: PersistentMap<LabelId, MultiEvaluationResult>,
    /// The path condition from the traced node to the leaf.
    pub condition: Term,
    pub label_name: Symbol,
}

impl BranchResult {
    pub fn result(&self, label: &FormulaTermLabel) -> Option<&MultiEvaluationResult> {
        self.results.get(&label.id)
    }

    /// The truth value of `label` at the leaf, `None` if it was not traced.
    pub fn evaluate(&self, label: &FormulaTermLabel) -> Option<TruthValue> {
        self.evaluate_id(label.id)
    }

    pub fn evaluate_id(&self, id: LabelId) -> Option<TruthValue> {
        self.results
            .get(&id)
            .map(|r| r.evaluate(self.label_name, &self.results))
    }

    pub fn predicate_label<'t>(&self, term: &'t Term) -> Option<&'t FormulaTermLabel> {
        formula_label(term, self.label_name)
    }
}

impl Display for BranchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Goal {}", self.leaf_serial)?;
        let mut ids: Vec<_> = self.results.keys().copied().collect();
        ids.sort();
        for id in ids {
            let result = &self.results[&id];
            write!(
                f,
                "\n{id} = {} :: {result}",
                result.evaluate(self.label_name, &self.results)
            )?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct TruthValueTracingResult {
    pub branch_results: Vec<BranchResult>,
}

impl Display for TruthValueTracingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", ListDisplay(&self.branch_results, "\n\n"))
    }
}

/// A labeled formula touched by a rule application.
#[derive(Clone, Debug)]
struct LabelOccurrence {
    label: FormulaTermLabel,
    in_antec: bool,
}

pub struct TruthValueTracer<'p> {
    proof: &'p Proof,
    start: NodeId,
    label_name: Symbol,
}

impl<'p> TruthValueTracer<'p> {
    /// Traces the labels named `label_name` in the subtree below `start`.
    pub fn evaluate(
        proof: &'p Proof,
        start: NodeId,
        label_name: &str,
    ) -> Result<TruthValueTracingResult> {
        let tracer = TruthValueTracer {
            proof,
            start,
            label_name: Symbol::from(label_name),
        };
        let mut result = TruthValueTracingResult::default();
        // pre-order, each node starting from a copy of its parent's results
        let mut stack: Vec<(NodeId, Option<usize>, Results)> =
            vec![(start, None, Results::default())];
        while let Some((node, child_index, mut results)) = stack.pop() {
            tracer.evaluate_node(node, child_index, &mut results, &mut result)?;
            let children = proof.node(node).children();
            for (i, &child) in children.iter().enumerate().rev() {
                stack.push((child, Some(i), results.clone()));
            }
        }
        Ok(result)
    }

    fn evaluate_node(
        &self,
        child: NodeId,
        child_index: Option<usize>,
        results: &mut Results,
        out: &mut TruthValueTracingResult,
    ) -> Result<()> {
        let mut check_performed = false;
        let parent = child_index.and_then(|_| self.proof.parent(child));
        if let (Some(index), Some(parent)) = (child_index, parent) {
            match self.proof.node(parent).applied_rule_app() {
                Some(RuleApp::Taclet(app)) => {
                    let labels = self.involved_labels(app);
                    if !labels.is_empty() && !app.taclet().is_closing() {
                        check_performed = true;
                        self.update_from_new_minor_ids(child, results);
                        if let Some(template) = app.taclet().goal_templates().get(index) {
                            self.analyze_taclet_goal(app, template, &labels, results)?;
                        }
                    }
                }
                Some(RuleApp::Simplifier(app)) => {
                    let mut previous: Option<&PosInOccurrence> = None;
                    for step in &app.protocol {
                        let Some(pio) = step.pos_in_occurrence() else {
                            continue;
                        };
                        if let Some(previous) = previous {
                            self.update_from_new_minor_ids_in_formula(
                                pio.sequent_formula(),
                                previous,
                                results,
                            );
                        }
                        let labels = self.involved_labels(step);
                        if let (false, Some(template)) =
                            (labels.is_empty(), step.taclet().goal_templates().first())
                        {
                            self.analyze_taclet_goal(step, template, &labels, results)?;
                        }
                        previous = Some(pio);
                    }
                    if let Some(previous) = previous {
                        let result = SequentFormula::new(app.result.clone())?;
                        self.update_from_new_minor_ids_in_formula(&result, previous, results);
                    }
                }
                None => {}
            }
        }

        if self.proof.node(child).is_leaf() {
            // a closing rule has no children, its labels are recorded at the leaf
            if let Some(RuleApp::Taclet(app)) = self.proof.node(child).applied_rule_app() {
                if app.taclet().is_closing() && app.pos_in_occurrence().is_some() {
                    for occurrence in self.involved_labels(app) {
                        update_result(results, &occurrence.label, !occurrence.in_antec);
                    }
                }
            }
            let condition = condition::path_condition_from(self.proof, self.start, child, false)?;
            out.branch_results.push(BranchResult {
                leaf: child,
                leaf_serial: self.proof.node(child).serial(),
                results: results.clone(),
                condition,
                label_name: self.label_name,
            });
        } else if !check_performed {
            self.update_from_new_minor_ids(child, results);
        }
        Ok(())
    }

    /// The label at the position of `app`, and for closing taclets the
    /// labels of the assumed formulas.
    fn involved_labels(&self, app: &TacletApp) -> Vec<LabelOccurrence> {
        let mut labels = vec![];
        if let Some(pio) = app.pos_in_occurrence() {
            if let Some(label) = formula_label(pio.sub_term(), self.label_name) {
                labels.push(LabelOccurrence {
                    label: label.clone(),
                    in_antec: pio.is_in_antec(),
                });
            }
        }
        if app.taclet().is_closing() {
            for assumed in app.assumes_instantiations().into_iter().flatten() {
                if let Some(label) = formula_label(assumed.formula.formula(), self.label_name) {
                    labels.push(LabelOccurrence {
                        label: label.clone(),
                        in_antec: assumed.in_antec,
                    });
                }
            }
        }
        labels
    }

    /// Records the labels as true or false if the goal replaces them by
    /// `true` or `false`.
    fn analyze_taclet_goal(
        &self,
        app: &TacletApp,
        template: &TacletGoalTemplate,
        labels: &[LabelOccurrence],
        results: &mut Results,
    ) -> Result<()> {
        let Some(replacement) = template.replace_with_term() else {
            return Ok(());
        };
        let replacement = instantiate(self.proof.env().tb(), replacement, app.instantiations())?;
        let value = match replacement.op() {
            Operator::Junctor(Junctor::True) => true,
            Operator::Junctor(Junctor::False) => false,
            _ => return Ok(()),
        };
        for occurrence in labels {
            update_result(results, &occurrence.label, value);
        }
        Ok(())
    }

    /// The terms around the position of the rule applied at the parent of
    /// `child`: the term at the position and its subterms, its ancestors, and
    /// the assumed formulas.
    fn update_from_new_minor_ids(&self, child: NodeId, results: &mut Results) {
        let Some(parent) = self.proof.parent(child) else {
            return;
        };
        let Some(app) = self.proof.node(parent).applied_rule_app() else {
            return;
        };
        let Some(pio) = app.pos_in_occurrence() else {
            return;
        };
        let child_sequent = self.proof.node(child).sequent();
        let mut terms = affected_terms(pio);
        if let Some(assumes) = app.as_taclet_app().and_then(TacletApp::assumes_instantiations) {
            terms.extend(assumes.iter().map(|a| a.formula.formula().clone()));
        }
        for term in terms {
            if let Some(label) = formula_label(&term, self.label_name) {
                let instruction = instruction_term(
                    replacements_in_sequent(child_sequent, true, label.id, self.label_name),
                    replacements_in_sequent(child_sequent, false, label.id, self.label_name),
                    pio.is_in_antec(),
                );
                if let Some(instruction) = instruction {
                    update_instruction(results, label, instruction);
                }
            }
        }
    }

    /// Like [`Self::update_from_new_minor_ids`] for one step of the
    /// simplifier, whose result is the single formula `changed`.
    fn update_from_new_minor_ids_in_formula(
        &self,
        changed: &SequentFormula,
        previous: &PosInOccurrence,
        results: &mut Results,
    ) {
        for term in affected_terms(previous) {
            if let Some(label) = formula_label(&term, self.label_name) {
                let mut replacements = vec![];
                list_replacements(changed.formula(), label.id, self.label_name, &mut replacements);
                let (ante, succ) = if previous.is_in_antec() {
                    (replacements, vec![])
                } else {
                    (vec![], replacements)
                };
                if let Some(instruction) = instruction_term(ante, succ, previous.is_in_antec()) {
                    update_instruction(results, label, instruction);
                }
            }
        }
    }
}

/// The term at `pio` with its subterms in pre-order, then its ancestors
/// from the innermost.
fn affected_terms(pio: &PosInOccurrence) -> Vec<Term> {
    let mut terms = vec![];
    pio.sub_term().walk(&mut |t: &Term| {
        terms.push(t.clone());
        true
    });
    let mut current = pio.clone();
    while let Some(up) = current.up() {
        terms.push(up.sub_term().clone());
        current = up;
    }
    terms
}

fn replacements_in_sequent(
    sequent: &Sequent,
    in_antec: bool,
    id: LabelId,
    label_name: Symbol,
) -> Vec<Term> {
    let mut out = vec![];
    for formula in sequent.side(in_antec).iter() {
        list_replacements(formula.formula(), id, label_name, &mut out);
    }
    out
}

/// The outermost subterms derived from label `id`.
fn list_replacements(term: &Term, id: LabelId, label_name: Symbol, out: &mut Vec<Term>) {
    term.walk(&mut |t: &Term| {
        let derived = formula_label(t, label_name).is_some_and(|l| l.before_ids.contains(&id));
        if derived {
            out.push(t.clone());
        }
        !derived
    });
}

/// `and(ante) & !or(succ)` for a rule applied in the antecedent,
/// `and(ante) -> or(succ)` otherwise.
fn instruction_term(ante: Vec<Term>, succ: Vec<Term>, in_antec: bool) -> Option<Term> {
    if ante.is_empty() && succ.is_empty() {
        return None;
    }
    let tb = TermBuilder;
    let left = tb.and_all(ante).ok()?;
    let right = tb.or_all(succ).ok()?;
    if in_antec {
        tb.and(left, tb.not(right).ok()?).ok()
    } else {
        tb.imp(left, right).ok()
    }
}

fn update_result(results: &mut Results, label: &FormulaTermLabel, value: bool) {
    let result = results.get(&label.id).cloned().unwrap_or_default();
    results.insert(label.id, result.with_result(value));
}

fn update_instruction(results: &mut Results, label: &FormulaTermLabel, instruction: Term) {
    let result = results.get(&label.id).cloned().unwrap_or_default();
    results.insert(label.id, result.with_instruction(instruction));
}

#[cfg(test)]
mod tests {
    use super::*;
    use TruthValue::*;

    #[test]
    fn kleene_logic() {
        assert_eq!(True.and(Unknown), Unknown);
        assert_eq!(False.and(Unknown), False);
        assert_eq!(Unknown.or(True), True);
        assert_eq!(False.or(Unknown), Unknown);
        assert_eq!(False.imp(Unknown), True);
        assert_eq!(True.imp(False), False);
        assert_eq!(True.eqv(True), True);
        assert_eq!(True.eqv(Unknown), Unknown);
        assert_eq!(False.eqv(False), True);
        assert_eq!(Unknown.if_then_else(True, True), Unknown);
        assert_eq!(False.if_then_else(True, False), False);
        assert_eq!(Unknown.not(), Unknown);
        assert_eq!(Unknown.to_string(), "unknown");
    }

    #[test]
    fn multi_results() {
        let name = Symbol::from(FormulaTermLabel::NAME);
        let results = Results::default();
        let both = MultiEvaluationResult::default()
            .with_result(true)
            .with_result(false);
        assert_eq!(both.evaluate(name, &results), Unknown);
        let yes = MultiEvaluationResult::default().with_result(true);
        assert_eq!(yes.evaluate(name, &results), True);
        assert_eq!(MultiEvaluationResult::default().evaluate(name, &results), Unknown);
        assert_eq!(
            yes.to_string(),
            "true=true, false=false, instruction=none"
        );
    }

    #[test]
    fn instructions_combine_label_results() {
        use crate::term::{Function, TermLabel};
        let tb = TermBuilder;
        let name = Symbol::from(FormulaTermLabel::NAME);
        let labeled = |pred: &str, id: LabelId| {
            let p = tb.func(&Function::predicate(pred, vec![]), vec![]).unwrap();
            tb.label(&p, TermLabel::Formula(FormulaTermLabel::new(id)))
        };
        let (a, b) = (LabelId::new(1, 0), LabelId::new(2, 0));
        let mut results = Results::default();
        update_result(&mut results, &FormulaTermLabel::new(a), true);
        let instruction = tb.and(labeled("p", a), labeled("q", b)).unwrap();
        let combined = MultiEvaluationResult::default().with_instruction(instruction.clone());
        assert_eq!(combined.evaluate(name, &results), Unknown);
        update_result(&mut results, &FormulaTermLabel::new(b), false);
        assert_eq!(combined.evaluate(name, &results), False);
        let either = tb.or(labeled("p", a), labeled("q", b)).unwrap();
        let either = MultiEvaluationResult::default().with_instruction(either);
        assert_eq!(either.evaluate(name, &results), True);
    }
}
