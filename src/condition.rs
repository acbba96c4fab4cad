//! Branch and path conditions.
//!
//! The branch condition of a node is what its parent's rule application
//! assumed on the branch leading to it: the conjunction of the formulas added
//! to the antecedent and the negated disjunction of the formulas added to the
//! succedent. The path condition of a node is the conjunction of the branch
//! conditions of all splits above it.

use crate::app::TacletApp;
use crate::proof::{NodeId, Proof, RuleApp};
use crate::sequent::Sequent;
use crate::term::{Operator, Term, TermBuilder};
use crate::{Error, Result};

/// The branch condition of `node` under its parent. `true` for the root and
/// for nodes created by the simplifier.
pub fn branch_condition(proof: &Proof, node: NodeId, simplify: bool) -> Result<Term> {
    let tb = proof.env().tb();
    let Some(parent) = proof.parent(node) else {
        return Ok(tb.tt());
    };
    let condition = match proof.node(parent).applied_rule_app() {
        Some(RuleApp::Taclet(app)) => taclet_branch_condition(
            tb,
            proof.node(parent).sequent(),
            proof.node(node).sequent(),
            app,
        )?,
        Some(RuleApp::Simplifier(_)) | None => tb.tt(),
    };
    if simplify {
        proof.env().simplifier().simplify_term(tb, &condition)
    } else {
        Ok(condition)
    }
}

fn taclet_branch_condition(
    tb: &TermBuilder,
    parent: &Sequent,
    child: &Sequent,
    app: &TacletApp,
) -> Result<Term> {
    // the formula a rewrite taclet changed in place is not assumed
    let rewritten = app
        .pos_in_occurrence()
        .filter(|_| app.taclet().is_rewrite())
        .and_then(|pio| {
            let idx = parent.side(pio.is_in_antec()).index_of(pio.sequent_formula())?;
            Some((pio.is_in_antec(), idx))
        });
    let added = |in_antec: bool| -> Vec<Term> {
        child
            .side(in_antec)
            .iter()
            .enumerate()
            .filter(|&(idx, _)| rewritten != Some((in_antec, idx)))
            .filter(|(_, f)| !parent.side(in_antec).contains(f))
            .map(|(_, f)| f.formula().clone())
            .collect()
    };
    let ante = tb.and_all(added(true))?;
    let succ = tb.or_all(added(false))?;
    tb.and(ante, tb.not(succ)?)
}

/// The path condition of `node`: the branch conditions of all splits between
/// the root and `node`.
pub fn path_condition(proof: &Proof, node: NodeId, simplify: bool) -> Result<Term> {
    path_condition_from(proof, proof.root(), node, simplify)
}

/// The branch conditions of the splits between `start` and `node`, outermost
/// first. Fails if `node` is not below `start` or the condition is false.
pub fn path_condition_from(
    proof: &Proof,
    start: NodeId,
    node: NodeId,
    simplify: bool,
) -> Result<Term> {
    if !proof.is_descendant(node, start) {
        return Err(Error::ProofInput(format!(
            "Node {} is not below node {}.",
            proof.node(node).serial(),
            proof.node(start).serial()
        )));
    }
    let tb = proof.env().tb();
    let mut condition = tb.tt();
    let mut current = node;
    while current != start {
        let Some(parent) = proof.parent(current) else {
            break;
        };
        if proof.node(parent).children().len() >= 2 {
            condition = tb.and(branch_condition(proof, current, false)?, condition)?;
        }
        current = parent;
    }
    if simplify {
        condition = proof.env().simplifier().simplify_term(tb, &condition)?;
    }
    if condition.op() == &Operator::Junctor(crate::term::Junctor::False) {
        return Err(Error::ProofInput(
            "Path condition computation failed because the result is false.".into(),
        ));
    }
    Ok(condition)
}

/// Whether `term` is a constant introduced by a quantifier rule.
pub fn is_skolem_constant(term: &Term) -> bool {
    matches!(term.op(), Operator::Function(f) if f.is_skolem() && f.arity() == 0)
}

/// Which side of an equation is a skolem constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkolemEquality {
    Left,
    Right,
    None,
}

pub fn check_skolem_equality(term: &Term) -> SkolemEquality {
    if term.op() != &Operator::Equals {
        return SkolemEquality::None;
    }
    if is_skolem_constant(term.sub(0)) {
        SkolemEquality::Left
    } else if is_skolem_constant(term.sub(1)) {
        SkolemEquality::Right
    } else {
        SkolemEquality::None
    }
}
