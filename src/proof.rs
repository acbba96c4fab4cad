//! Proof trees.
//!
//! A [`Proof`] owns an arena of [`Node`]s linked by [`NodeId`]. Exactly the
//! open leaves have a [`Goal`]; applying a rule consumes the goal and creates
//! one goal per child.

use std::fmt::{self, Display};
use std::sync::Arc;

use crate::app::TacletApp;
use crate::index::TacletIndex;
use crate::rules::simplifier::{OneStepSimplifier, SimplifierApp};
use crate::sequent::Sequent;
use crate::term::{LabelIdGenerator, Operator, PosInOccurrence, Term, TermBuilder};
use crate::util::SymbolGen;
use crate::{Error, Result, Symbol};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub enum RuleApp {
    Taclet(TacletApp),
    Simplifier(SimplifierApp),
}

impl RuleApp {
    pub fn rule_name(&self) -> Symbol {
        match self {
            RuleApp::Taclet(app) => app.rule_name(),
            RuleApp::Simplifier(_) => Symbol::from(OneStepSimplifier::NAME),
        }
    }

    pub fn pos_in_occurrence(&self) -> Option<&PosInOccurrence> {
        match self {
            RuleApp::Taclet(app) => app.pos_in_occurrence(),
            RuleApp::Simplifier(app) => Some(&app.pio),
        }
    }

    pub fn as_taclet_app(&self) -> Option<&TacletApp> {
        match self {
            RuleApp::Taclet(app) => Some(app),
            RuleApp::Simplifier(_) => None,
        }
    }
}

impl Display for RuleApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleApp::Taclet(app) => write!(f, "{app}"),
            RuleApp::Simplifier(app) => write!(f, "{} at {}", OneStepSimplifier::NAME, app.pio),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    serial: usize,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    sequent: Sequent,
    applied: Option<RuleApp>,
    closed: bool,
}

impl Node {
    pub fn serial(&self) -> usize {
        self.serial
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn sequent(&self) -> &Sequent {
        &self.sequent
    }

    pub fn applied_rule_app(&self) -> Option<&RuleApp> {
        self.applied.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// An open leaf with its goal-local state.
#[derive(Clone, Debug)]
pub struct Goal {
    node: NodeId,
    rule_apps: Option<Vec<RuleApp>>,
    automatic_exhausted: bool,
}

impl Goal {
    fn new(node: NodeId) -> Goal {
        Goal {
            node,
            rule_apps: None,
            automatic_exhausted: false,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn is_automatic_exhausted(&self) -> bool {
        self.automatic_exhausted
    }
}

/// The capabilities a proof is run with: term construction, the rule base,
/// the one-step simplifier and fresh names.
#[derive(Debug)]
pub struct ProofEnvironment {
    tb: TermBuilder,
    index: Arc<TacletIndex>,
    simplifier: OneStepSimplifier,
    names: SymbolGen,
}

impl ProofEnvironment {
    pub fn new(index: TacletIndex, simplifier: OneStepSimplifier) -> ProofEnvironment {
        ProofEnvironment {
            tb: TermBuilder,
            index: Arc::new(index),
            simplifier,
            names: SymbolGen::default(),
        }
    }

    /// An environment with [`crate::rules::default_rules`] and the default
    /// simplifier.
    pub fn with_default_rules() -> Result<ProofEnvironment> {
        Ok(ProofEnvironment::new(
            TacletIndex::new(crate::rules::default_rules()?),
            OneStepSimplifier::new()?,
        ))
    }

    pub fn tb(&self) -> &TermBuilder {
        &self.tb
    }

    pub fn taclet_index(&self) -> &Arc<TacletIndex> {
        &self.index
    }

    pub fn simplifier(&self) -> &OneStepSimplifier {
        &self.simplifier
    }

    pub fn names(&self) -> &SymbolGen {
        &self.names
    }

    pub fn names_mut(&mut self) -> &mut SymbolGen {
        &mut self.names
    }

    /// Shares the rule base, copies the name generator and starts a
    /// simplifier with an empty cache. Side proofs run in such a copy.
    pub fn clone_with_own_simplifier(&self) -> ProofEnvironment {
        ProofEnvironment {
            tb: self.tb,
            index: self.index.clone(),
            simplifier: self.simplifier.fresh_instance(),
            names: self.names.clone(),
        }
    }
}

#[derive(Debug)]
pub struct Proof {
    name: String,
    env: ProofEnvironment,
    nodes: Vec<Node>,
    goals: Vec<Goal>,
    label_ids: LabelIdGenerator,
    disposed: bool,
}

impl Proof {
    pub fn new(name: &str, mut env: ProofEnvironment, sequent: Sequent) -> Proof {
        let mut label_ids = LabelIdGenerator::default();
        for (formula, _) in sequent.formulas() {
            formula.formula().walk(&mut |t: &Term| {
                if let Some(label) = t.formula_label() {
                    label_ids.reserve(label.id);
                }
                if let Operator::Function(f) = t.op() {
                    env.names.reserve(f.name());
                }
                true
            });
        }
        let root = Node {
            serial: 0,
            parent: None,
            children: vec![],
            sequent,
            applied: None,
            closed: false,
        };
        Proof {
            name: name.to_owned(),
            env,
            nodes: vec![root],
            goals: vec![Goal::new(NodeId(0))],
            label_ids,
            disposed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn env(&self) -> &ProofEnvironment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut ProofEnvironment {
        &mut self.env
    }

    pub fn label_ids_mut(&mut self) -> &mut LabelIdGenerator {
        &mut self.label_ids
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    /// The nodes of the open goals, in goal order.
    pub fn open_goals(&self) -> Vec<NodeId> {
        self.goals.iter().map(Goal::node).collect()
    }

    pub fn goal(&self, node: NodeId) -> Option<&Goal> {
        self.goals.iter().find(|g| g.node == node)
    }

    fn goal_index(&self, node: NodeId) -> Result<usize> {
        self.goals
            .iter()
            .position(|g| g.node == node)
            .ok_or_else(|| Error::ProofInput(format!("Node {node} is not an open goal")))
    }

    pub fn is_closed(&self) -> bool {
        self.goals.is_empty()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn set_automatic_exhausted(&mut self, node: NodeId) {
        if let Some(goal) = self.goals.iter_mut().find(|g| g.node == node) {
            goal.automatic_exhausted = true;
        }
    }

    /// The rule apps applicable at an open goal, computed once per goal.
    pub fn rule_apps(&mut self, node: NodeId) -> Result<&[RuleApp]> {
        let idx = self.goal_index(node)?;
        if self.goals[idx].rule_apps.is_none() {
            let sequent = self.node(node).sequent();
            let apps = crate::index::RuleAppIndex::new(&self.env).collect(sequent);
            log::trace!("{} rule apps at node {node}", apps.len());
            self.goals[idx].rule_apps = Some(apps);
        }
        Ok(self.goals[idx].rule_apps.as_deref().unwrap_or_default())
    }

    /// Records `app` at the open goal `node` and adds one child per sequent.
    /// The goal is replaced by the goals of the children; with no children
    /// the branch is closed.
    pub(crate) fn expand(
        &mut self,
        node: NodeId,
        app: RuleApp,
        children: Vec<Sequent>,
    ) -> Result<Vec<NodeId>> {
        let idx = self.goal_index(node)?;
        let mut new_ids = Vec::with_capacity(children.len());
        for sequent in children {
            let id = NodeId(self.nodes.len());
            self.nodes.push(Node {
                serial: id.0,
                parent: Some(node),
                children: vec![],
                sequent,
                applied: None,
                closed: false,
            });
            new_ids.push(id);
        }
        let parent = &mut self.nodes[node.0];
        parent.applied = Some(app);
        parent.children = new_ids.clone();
        self.goals
            .splice(idx..=idx, new_ids.iter().map(|&id| Goal::new(id)));
        if new_ids.is_empty() {
            self.close_upwards(node);
        }
        Ok(new_ids)
    }

    fn close_upwards(&mut self, node: NodeId) {
        let mut current = Some(node);
        while let Some(id) = current {
            let all_closed = self.nodes[id.0]
                .children
                .iter()
                .all(|c| self.nodes[c.0].closed);
            if !all_closed {
                break;
            }
            self.nodes[id.0].closed = true;
            current = self.nodes[id.0].parent;
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).parent
    }

    /// The index of `node` among the children of its parent.
    pub fn child_index(&self, node: NodeId) -> Option<usize> {
        let parent = self.parent(node)?;
        self.node(parent).children.iter().position(|&c| c == node)
    }

    /// Whether `ancestor` lies on the path from the root to `node`. A node
    /// is its own descendant.
    pub fn is_descendant(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// The name of the rule applied at `node`, or the status of a leaf.
    pub fn node_name(&self, node: NodeId) -> String {
        let n = self.node(node);
        match &n.applied {
            Some(app) => app.rule_name().to_string(),
            None if self.goal(node).is_some() => "OPEN GOAL".to_owned(),
            None => "Closed goal".to_owned(),
        }
    }

    /// Drops the proof tree and all goals.
    pub fn dispose(&mut self) {
        if !self.disposed {
            log::debug!("disposing proof {}", self.name);
            self.nodes.truncate(1);
            self.nodes[0].children.clear();
            self.goals.clear();
            self.disposed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Function;

    fn proof() -> Proof {
        let tb = TermBuilder;
        let p = tb.func(&Function::predicate("p", vec![]), vec![]).unwrap();
        let q = tb.func(&Function::predicate("q", vec![]), vec![]).unwrap();
        let env = ProofEnvironment::with_default_rules().unwrap();
        Proof::new("test", env, Sequent::from_terms(vec![p], vec![q]).unwrap())
    }

    #[test]
    fn expanding_replaces_goals() {
        let mut proof = proof();
        let root = proof.root();
        let app = RuleApp::Taclet(TacletApp::new(
            proof.env().taclet_index().get("cut").unwrap().clone(),
        ));
        let seq = proof.node(root).sequent().clone();
        let children = proof
            .expand(root, app.clone(), vec![seq.clone(), seq])
            .unwrap();
        assert_eq!(proof.open_goals(), children);
        assert_eq!(proof.node_name(root), "cut");
        assert_eq!(proof.node_name(children[0]), "OPEN GOAL");
        assert_eq!(proof.child_index(children[1]), Some(1));
        assert!(proof.is_descendant(children[1], root));
        assert!(!proof.is_descendant(root, children[1]));

        proof.expand(children[0], app.clone(), vec![]).unwrap();
        assert!(!proof.node(root).is_closed());
        proof.expand(children[1], app, vec![]).unwrap();
        assert!(proof.node(root).is_closed());
        assert!(proof.is_closed());
        assert_eq!(proof.node_name(children[0]), "cut");
    }

    #[test]
    fn expanding_a_closed_node_fails() {
        let mut proof = proof();
        let root = proof.root();
        let app = RuleApp::Taclet(TacletApp::new(
            proof.env().taclet_index().get("cut").unwrap().clone(),
        ));
        proof.expand(root, app.clone(), vec![]).unwrap();
        assert!(matches!(
            proof.expand(root, app, vec![]),
            Err(Error::ProofInput(_))
        ));
    }
}
