//! Automatic proof search.
//!
//! [`ApplyStrategy`] repeatedly picks a goal with a [`GoalChooser`], asks a
//! [`Strategy`] for the cheapest rule app there and applies it, until the
//! goals are closed, no rule applies, or the step or time budget runs out.

use std::cmp::Ordering as CmpOrdering;
use std::fmt::{self, Display};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use instant::{Duration, Instant};

use crate::executor;
use crate::proof::{NodeId, Proof, RuleApp};
use crate::rules::simplifier::term_order;
use crate::sequent::Sequent;
use crate::term::TermBuilder;
use crate::util::{HashMap, SymbolGen};
use crate::{Error, Result, Symbol};

/// The cost of a rule app; cheaper apps are applied first.
pub type Cost = u32;

pub trait Strategy {
    fn name(&self) -> &str;

    /// The cost of applying `app` to a goal with `sequent`, `None` if the
    /// strategy never applies it.
    fn cost(&self, app: &RuleApp, sequent: &Sequent) -> Option<Cost>;

    /// Fills in what the strategy can choose itself, such as skolem
    /// constants. `None` if the app cannot be completed.
    fn instantiate(&self, app: &RuleApp, names: &mut SymbolGen) -> Option<RuleApp> {
        match app {
            RuleApp::Taclet(app) => app.try_to_instantiate(names).map(RuleApp::Taclet),
            RuleApp::Simplifier(_) => Some(app.clone()),
        }
    }
}

/// Propositional and first-order reasoning with equations, without
/// quantifier instantiation and cuts.
#[derive(Clone, Debug)]
pub struct DefaultStrategy {
    costs: Vec<(Symbol, Cost)>,
}

impl Default for DefaultStrategy {
    fn default() -> Self {
        let costs = [
            ("closure", 0),
            ("simplify_sequent", 2),
            ("alpha", 3),
            ("replace_known", 4),
            ("apply_equations", 5),
            ("delta", 6),
            ("beta", 7),
            ("split_cond", 8),
        ];
        DefaultStrategy {
            costs: costs.iter().map(|&(s, c)| (Symbol::from(s), c)).collect(),
        }
    }
}

impl DefaultStrategy {
    pub const SIMPLIFIER_COST: Cost = 1;
}

impl Strategy for DefaultStrategy {
    fn name(&self) -> &str {
        "default"
    }

    fn cost(&self, app: &RuleApp, _sequent: &Sequent) -> Option<Cost> {
        let app = match app {
            RuleApp::Simplifier(_) => return Some(Self::SIMPLIFIER_COST),
            RuleApp::Taclet(app) => app,
        };
        let taclet = app.taclet();
        let cost = taclet
            .rule_sets()
            .iter()
            .filter_map(|set| self.costs.iter().find(|(s, _)| s == set).map(|&(_, c)| c))
            .min()?;
        let pio = app.pos_in_occurrence();
        if let (Some(pio), Some(assumes)) = (pio, app.assumes_instantiations()) {
            // a formula must not be rewritten with itself
            let same = assumes.iter().any(|a| {
                a.in_antec == pio.is_in_antec() && &a.formula == pio.sequent_formula()
            });
            if same {
                return None;
            }
        }
        if taclet.in_rule_set("apply_equations") {
            // only rewrite with oriented equations, so rewriting terminates
            let assumed = app.assumes_instantiations()?.front()?;
            let eq = TermBuilder.go_below_updates(assumed.formula.formula());
            if eq.arity() != 2 || term_order(eq.sub(0), eq.sub(1)) != CmpOrdering::Greater {
                return None;
            }
        }
        Some(cost)
    }
}

/// Picks the next goal to work on.
pub trait GoalChooser {
    /// The next goal among the open goals of `proof` that lie below one of
    /// `roots`, skipping goals where automatic search is exhausted.
    fn next_goal(&mut self, proof: &Proof, roots: &[NodeId]) -> Option<NodeId>;
}

/// Works on the leftmost goal until it is closed or exhausted.
#[derive(Clone, Copy, Debug, Default)]
pub struct DepthFirstGoalChooser;

impl GoalChooser for DepthFirstGoalChooser {
    fn next_goal(&mut self, proof: &Proof, roots: &[NodeId]) -> Option<NodeId> {
        proof
            .goals()
            .iter()
            .filter(|g| !g.is_automatic_exhausted())
            .map(|g| g.node())
            .find(|&node| roots.iter().any(|&root| proof.is_descendant(node, root)))
    }
}

/// Notified while a strategy runs.
pub trait ProverTaskObserver {
    fn task_started(&mut self, message: &str, size: usize);
    fn task_progress(&mut self, position: usize);
    fn task_finished(&mut self, info: &ApplyStrategyInfo);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// All goals below the start goals are closed.
    Closed,
    /// No goal has an applicable rule app left.
    Exhausted,
    MaxSteps,
    Timeout,
}

impl Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StopReason::Closed => "all goals closed",
            StopReason::Exhausted => "no more rules applicable",
            StopReason::MaxSteps => "maximal number of rule applications reached",
            StopReason::Timeout => "timeout",
        };
        f.write_str(text)
    }
}

/// What a strategy run did.
#[derive(Clone, Debug)]
pub struct ApplyStrategyInfo {
    pub reason: StopReason,
    pub applied: usize,
    pub open_goals: usize,
    pub time: Duration,
    pub applications_per_rule: HashMap<Symbol, usize>,
}

impl Display for ApplyStrategyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} rule applications, {} open goals, {:.3}s",
            self.reason,
            self.applied,
            self.open_goals,
            self.time.as_secs_f64()
        )
    }
}

#[derive(Clone, Debug)]
pub struct StrategySettings {
    pub max_steps: usize,
    pub timeout: Option<Duration>,
}

impl Default for StrategySettings {
    fn default() -> Self {
        StrategySettings {
            max_steps: 10_000,
            timeout: None,
        }
    }
}

pub struct ApplyStrategy {
    settings: StrategySettings,
    strategy: Box<dyn Strategy>,
    chooser: Box<dyn GoalChooser>,
    observers: Vec<Box<dyn ProverTaskObserver>>,
    interrupted: Arc<AtomicBool>,
    stopped_by_interrupt: bool,
}

impl Default for ApplyStrategy {
    fn default() -> Self {
        ApplyStrategy::new(StrategySettings::default())
    }
}

impl ApplyStrategy {
    pub fn new(settings: StrategySettings) -> ApplyStrategy {
        ApplyStrategy {
            settings,
            strategy: Box::new(DefaultStrategy::default()),
            chooser: Box::new(DepthFirstGoalChooser),
            observers: vec![],
            interrupted: Arc::new(AtomicBool::new(false)),
            stopped_by_interrupt: false,
        }
    }

    pub fn with_strategy(mut self, strategy: impl Strategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    pub fn with_goal_chooser(mut self, chooser: impl GoalChooser + 'static) -> Self {
        self.chooser = Box::new(chooser);
        self
    }

    pub fn settings_mut(&mut self) -> &mut StrategySettings {
        &mut self.settings
    }

    pub fn add_prover_task_observer(&mut self, observer: impl ProverTaskObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// The flag that interrupts a running strategy when set. It is polled
    /// between steps.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    /// Whether the last run stopped because of an interrupt.
    pub fn has_been_interrupted(&self) -> bool {
        self.stopped_by_interrupt
    }

    /// Runs the strategy on the goals below `goals`.
    pub fn start(&mut self, proof: &mut Proof, goals: &[NodeId]) -> Result<ApplyStrategyInfo> {
        self.stopped_by_interrupt = false;
        let start = Instant::now();
        let mut info = ApplyStrategyInfo {
            reason: StopReason::Exhausted,
            applied: 0,
            open_goals: 0,
            time: Duration::ZERO,
            applications_per_rule: HashMap::default(),
        };
        let message = format!("{} strategy on {}", self.strategy.name(), proof.name());
        for observer in &mut self.observers {
            observer.task_started(&message, self.settings.max_steps);
        }
        log::debug!("starting {message} with {} goals", goals.len());

        // observers hear about the end of every run, failed or not
        let result = self.run_steps(proof, goals, start, &mut info);
        info.open_goals = proof
            .open_goals()
            .into_iter()
            .filter(|&g| goals.iter().any(|&root| proof.is_descendant(g, root)))
            .count();
        if result.is_ok() && info.open_goals == 0 {
            info.reason = StopReason::Closed;
        }
        info.time = start.elapsed();
        match &result {
            Ok(()) => log::debug!("{message}: {info}"),
            Err(err) => log::debug!("{message} stopped: {err}"),
        }
        for observer in &mut self.observers {
            observer.task_finished(&info);
        }
        result.map(|()| info)
    }

    fn run_steps(
        &mut self,
        proof: &mut Proof,
        goals: &[NodeId],
        start: Instant,
        info: &mut ApplyStrategyInfo,
    ) -> Result<()> {
        loop {
            if self.interrupted.swap(false, Ordering::SeqCst) {
                self.stopped_by_interrupt = true;
                return Err(Error::Interrupted {
                    applied: info.applied,
                });
            }
            if info.applied >= self.settings.max_steps {
                info.reason = StopReason::MaxSteps;
                return Ok(());
            }
            if self.settings.timeout.is_some_and(|t| start.elapsed() >= t) {
                info.reason = StopReason::Timeout;
                return Ok(());
            }
            let Some(goal) = self.chooser.next_goal(proof, goals) else {
                return Ok(());
            };
            let Some(app) = self.choose_app(proof, goal)? else {
                log::trace!("no rule app at node {goal}");
                proof.set_automatic_exhausted(goal);
                continue;
            };
            let rule = app.rule_name();
            executor::apply(proof, goal, app)?;
            info.applied += 1;
            *info.applications_per_rule.entry(rule).or_default() += 1;
            for observer in &mut self.observers {
                observer.task_progress(info.applied);
            }
        }
    }

    fn choose_app(&self, proof: &mut Proof, goal: NodeId) -> Result<Option<RuleApp>> {
        let sequent = proof.node(goal).sequent().clone();
        let mut candidates: Vec<(Cost, RuleApp)> = proof
            .rule_apps(goal)?
            .iter()
            .filter_map(|app| Some((self.strategy.cost(app, &sequent)?, app.clone())))
            .collect();
        // stable, so ties keep the order of collection
        candidates.sort_by_key(|(cost, _)| *cost);
        let names = proof.env_mut().names_mut();
        Ok(candidates
            .into_iter()
            .find_map(|(_, app)| self.strategy.instantiate(&app, names)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::ProofEnvironment;
    use crate::term::Function;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn atom(name: &str) -> crate::term::Term {
        TermBuilder
            .func(&Function::predicate(name, vec![]), vec![])
            .unwrap()
    }

    fn proof(ante: Vec<crate::term::Term>, succ: Vec<crate::term::Term>) -> Proof {
        let env = ProofEnvironment::with_default_rules().unwrap();
        Proof::new("test", env, Sequent::from_terms(ante, succ).unwrap())
    }

    #[test]
    fn propositional_tautology_closes() {
        let tb = TermBuilder;
        let (p, q) = (atom("p"), atom("q"));
        // (p & q) -> (q | p)
        let formula = tb
            .imp(tb.and(p.clone(), q.clone()).unwrap(), tb.or(q, p).unwrap())
            .unwrap();
        let mut proof = proof(vec![], vec![formula]);
        let root = proof.root();
        let info = ApplyStrategy::default().start(&mut proof, &[root]).unwrap();
        assert_eq!(info.reason, StopReason::Closed);
        assert!(proof.is_closed());
    }

    #[test]
    fn unprovable_goals_stay_open() {
        let tb = TermBuilder;
        let (p, q) = (atom("p"), atom("q"));
        let mut proof = proof(vec![], vec![tb.or(p, q).unwrap()]);
        let root = proof.root();
        let info = ApplyStrategy::default().start(&mut proof, &[root]).unwrap();
        assert_eq!(info.reason, StopReason::Exhausted);
        assert_eq!(info.open_goals, 1);
        let goal = proof.open_goals()[0];
        assert_eq!(proof.node(goal).sequent().to_string(), " ==> p, q");
    }

    #[test]
    fn step_budget_is_respected() {
        let tb = TermBuilder;
        let (p, q, r) = (atom("p"), atom("q"), atom("r"));
        let formula = tb
            .and(tb.and(p.clone(), q.clone()).unwrap(), r.clone())
            .unwrap();
        let mut proof = proof(vec![p, q, r], vec![formula]);
        let root = proof.root();
        let mut strategy = ApplyStrategy::new(StrategySettings {
            max_steps: 1,
            timeout: None,
        });
        let info = strategy.start(&mut proof, &[root]).unwrap();
        assert_eq!(info.reason, StopReason::MaxSteps);
        assert_eq!(info.applied, 1);
    }

    #[derive(Default)]
    struct Recorder {
        events: Rc<RefCell<Vec<String>>>,
    }

    impl ProverTaskObserver for Recorder {
        fn task_started(&mut self, _message: &str, size: usize) {
            self.events.borrow_mut().push(format!("started {size}"));
        }

        fn task_progress(&mut self, position: usize) {
            self.events.borrow_mut().push(format!("progress {position}"));
        }

        fn task_finished(&mut self, info: &ApplyStrategyInfo) {
            self.events.borrow_mut().push(format!("finished {}", info.applied));
        }
    }

    #[test]
    fn observers_and_interrupts() {
        let p = atom("p");
        let mut proof = proof(vec![p.clone()], vec![p]);
        let root = proof.root();
        let events = Rc::new(RefCell::new(vec![]));
        let mut strategy = ApplyStrategy::default();
        strategy.add_prover_task_observer(Recorder {
            events: events.clone(),
        });
        strategy.start(&mut proof, &[root]).unwrap();
        assert_eq!(
            *events.borrow(),
            vec!["started 10000", "progress 1", "finished 1"]
        );

        let mut other = self::proof(vec![], vec![atom("q")]);
        let root = other.root();
        events.borrow_mut().clear();
        strategy.interrupt_flag().store(true, Ordering::SeqCst);
        assert!(matches!(
            strategy.start(&mut other, &[root]),
            Err(Error::Interrupted { applied: 0 })
        ));
        assert!(strategy.has_been_interrupted());
        assert_eq!(*events.borrow(), vec!["started 10000", "finished 0"]);

        // the flag is consumed, the next run goes ahead
        events.borrow_mut().clear();
        strategy.start(&mut other, &[root]).unwrap();
        assert!(!strategy.has_been_interrupted());
        assert_eq!(*events.borrow(), vec!["started 10000", "finished 0"]);
    }
}
