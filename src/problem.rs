//! Run problem files: declare symbols, pose sequents, run the strategy on
//! them and check the outcome.

use crate::executor::add_formula_labels;
use crate::layout::{LayoutSettings, SymbolicLayoutExtractor};
use crate::proof::{NodeId, Proof, ProofEnvironment};
use crate::sequent::Sequent;
use crate::sort::Sort;
use crate::strategy::{ApplyStrategy, StrategySettings};
use crate::syntax::{parse_program, Check, Command, Expr, ParseError, ProofOptions, Span};
use crate::term::{
    FormulaTermLabel, Function, LabelId, LabelIdGenerator, LogicVariable, ModalProgram,
    ModalityKind, PosInOccurrence, ProgramVariable, Term, TermBuilder,
};
use crate::truth::{TruthValue, TruthValueTracer};
use crate::util::HashMap;
use crate::{Error, Result, Symbol};

#[derive(Clone, Debug, Default)]
pub struct RunConfig {
    pub strategy: StrategySettings,
    pub layout: LayoutSettings,
    /// Report the layouts of each posed sequent with a modality.
    pub print_layouts: bool,
    /// Report the truth values of labels with this name after each labeled
    /// proof.
    pub trace_label: Option<String>,
}

#[derive(Clone, Debug)]
enum Declared {
    Function(Function),
    ProgramVariable(ProgramVariable),
}

/// The state of a running problem file. Checks refer to the proof posed
/// last.
pub struct Problem {
    config: RunConfig,
    env: ProofEnvironment,
    sorts: HashMap<Symbol, Sort>,
    symbols: HashMap<Symbol, Declared>,
    proof: Option<Proof>,
    proof_count: usize,
}

impl Problem {
    pub fn new(config: RunConfig) -> Result<Problem> {
        Ok(Problem {
            config,
            env: ProofEnvironment::with_default_rules()?,
            sorts: HashMap::default(),
            symbols: HashMap::default(),
            proof: None,
            proof_count: 0,
        })
    }

    /// The proof posed last.
    pub fn proof(&self) -> Option<&Proof> {
        self.proof.as_ref()
    }

    pub fn parse_and_run_program(
        &mut self,
        filename: Option<String>,
        input: &str,
    ) -> Result<Vec<String>> {
        let program = parse_program(filename, input)?;
        self.run_program(program)
    }

    /// Runs the commands in order and returns what they report.
    pub fn run_program(&mut self, program: Vec<Command>) -> Result<Vec<String>> {
        let mut outputs = vec![];
        for command in program {
            self.run_command(command, &mut outputs)?;
        }
        Ok(outputs)
    }

    fn run_command(&mut self, command: Command, outputs: &mut Vec<String>) -> Result<()> {
        match command {
            Command::Sort {
                span,
                name,
                reference,
            } => {
                let sort = if reference {
                    Sort::Object(name)
                } else {
                    Sort::Data(name)
                };
                if self.sorts.insert(name, sort).is_some() {
                    return Err(malformed(&span, format!("sort {name} declared twice")));
                }
            }
            Command::Function {
                span,
                name,
                args,
                sort,
            } => {
                let args = self.sorts_of(&span, &args)?;
                let sort = self.sort(&span, sort)?;
                let function = Function::new(name.as_str(), args, sort);
                self.declare(&span, name, Declared::Function(function))?;
            }
            Command::Predicate { span, name, args } => {
                let args = self.sorts_of(&span, &args)?;
                let function = Function::predicate(name.as_str(), args);
                self.declare(&span, name, Declared::Function(function))?;
            }
            Command::Constant { span, name, sort } => {
                let sort = self.sort(&span, sort)?;
                let function = Function::constant(name.as_str(), sort);
                self.declare(&span, name, Declared::Function(function))?;
            }
            Command::Field {
                span,
                name,
                owner,
                sort,
            } => {
                let (owner, sort) = (self.sort(&span, owner)?, self.sort(&span, sort)?);
                let function = Function::field(name.as_str(), owner, sort);
                self.declare(&span, name, Declared::Function(function))?;
            }
            Command::ArrayElement {
                span,
                name,
                array,
                index,
                sort,
            } => {
                let array = self.sort(&span, array)?;
                let index = self.sort(&span, index)?;
                let sort = self.sort(&span, sort)?;
                let f = Function::array_element(name.as_str(), array, index, sort);
                self.declare(&span, name, Declared::Function(f))?;
            }
            Command::ProgramVariable { span, name, sort } => {
                let sort = self.sort(&span, sort)?;
                let pv = ProgramVariable::new(name.as_str(), sort);
                self.declare(&span, name, Declared::ProgramVariable(pv))?;
            }
            Command::Prove {
                span: _,
                ante,
                succ,
                options,
            } => {
                self.prove(&ante, &succ, &options, outputs)?;
            }
            Command::Check(_, check) => self.check(&check)?,
        }
        Ok(())
    }

    fn prove(
        &mut self,
        ante: &[Expr],
        succ: &[Expr],
        options: &ProofOptions,
        outputs: &mut Vec<String>,
    ) -> Result<()> {
        let mut ids = LabelIdGenerator::default();
        let mut side = |exprs: &[Expr]| -> Result<Vec<Term>> {
            exprs
                .iter()
                .map(|e| {
                    let term = self.resolve(e, &mut vec![])?;
                    if options.labeled {
                        add_formula_labels(&term, &mut ids)
                    } else {
                        Ok(term)
                    }
                })
                .collect()
        };
        let ante = side(ante)?;
        let succ = side(succ)?;
        let sequent = Sequent::from_terms(ante, succ)?;

        self.proof_count += 1;
        let name = format!("Problem {}", self.proof_count);
        log::debug!("posing {name}: {sequent}");
        let mut proof = Proof::new(&name, self.env.clone_with_own_simplifier(), sequent);
        if !options.no_auto {
            let mut strategy = ApplyStrategy::new(self.config.strategy.clone());
            let root = proof.root();
            let info = strategy.start(&mut proof, &[root])?;
            log::info!("{name}: {info}");
            outputs.push(format!("{name}: {info}"));
        }

        if self.config.print_layouts {
            if let Some((node, pio)) = first_modality_goal(&proof) {
                outputs.extend(layout_report(&proof, node, pio, &self.config.layout)?);
            }
        }
        if let (true, Some(label)) = (options.labeled, &self.config.trace_label) {
            let root = proof.root();
            let result = TruthValueTracer::evaluate(&proof, root, label)?;
            outputs.push(result.to_string());
        }
        self.proof = Some(proof);
        Ok(())
    }

    fn check(&self, check: &Check) -> Result<()> {
        let proof = self
            .proof
            .as_ref()
            .ok_or_else(|| Error::CheckFailed(format!("{check}: nothing was proved yet")))?;
        match check {
            Check::Proved => {
                if !proof.is_closed() {
                    return Err(Error::CheckFailed(format!(
                        "{check}: {} has {} open goals",
                        proof.name(),
                        proof.open_goals().len()
                    )));
                }
            }
            Check::Open(expected) => {
                let open = proof.open_goals().len();
                if open != *expected {
                    return Err(Error::CheckFailed(format!(
                        "{check}: {} has {open} open goals",
                        proof.name()
                    )));
                }
            }
            Check::Layouts(expected) => {
                let (node, pio) = first_modality_goal(proof).ok_or_else(|| {
                    Error::CheckFailed(format!("{check}: no open goal with a modality"))
                })?;
                let mut extractor =
                    SymbolicLayoutExtractor::new(proof, node, pio, self.config.layout.clone());
                extractor.analyse()?;
                let count = extractor.layouts_count()?;
                if count != *expected {
                    return Err(Error::CheckFailed(format!("{check}: found {count} layouts")));
                }
            }
            Check::Truth { label, value } => {
                let id = parse_label_id(label)
                    .ok_or_else(|| Error::CheckFailed(format!("{check}: bad label id")))?;
                let root = proof.root();
                let result = TruthValueTracer::evaluate(proof, root, FormulaTermLabel::NAME)?;
                for branch in &result.branch_results {
                    // labels without any result count as unknown
                    let actual = branch.evaluate_id(id).unwrap_or(TruthValue::Unknown);
                    if actual.to_string() != value.as_str() {
                        return Err(Error::CheckFailed(format!(
                            "{check}: label {id} is {actual} on goal {}",
                            branch.leaf_serial
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn declare(&mut self, span: &Span, name: Symbol, declared: Declared) -> Result<()> {
        if self.symbols.insert(name, declared).is_some() {
            return Err(malformed(span, format!("{name} declared twice")));
        }
        Ok(())
    }

    fn sort(&self, span: &Span, name: Symbol) -> Result<Sort> {
        self.sorts
            .get(&name)
            .copied()
            .ok_or_else(|| ParseError::UnknownSymbol(span.clone(), name).into())
    }

    fn sorts_of(&self, span: &Span, names: &[Symbol]) -> Result<Vec<Sort>> {
        names.iter().map(|n| self.sort(span, *n)).collect()
    }

    /// Resolves the symbols of `expr`. `scope` holds the logic variables
    /// bound around it, innermost last.
    pub fn resolve(&self, expr: &Expr, scope: &mut Vec<LogicVariable>) -> Result<Term> {
        let tb = TermBuilder;
        match expr {
            Expr::Var(span, name) => {
                if let Some(v) = scope.iter().rev().find(|v| v.name == *name) {
                    return Ok(tb.var(*v));
                }
                match (name.as_str(), self.symbols.get(name)) {
                    (_, Some(Declared::ProgramVariable(pv))) => Ok(tb.pv(*pv)),
                    (_, Some(Declared::Function(f))) => tb.func(f, vec![]),
                    ("true", None) => Ok(tb.tt()),
                    ("false", None) => Ok(tb.ff()),
                    ("null", None) => Ok(tb.null()),
                    (_, None) => Err(ParseError::UnknownSymbol(span.clone(), *name).into()),
                }
            }
            Expr::Call(span, head, args) => {
                let args = args
                    .iter()
                    .map(|a| self.resolve(a, scope))
                    .collect::<Result<Vec<_>>>()?;
                if let Some(Declared::Function(f)) = self.symbols.get(head) {
                    return tb.func(f, args);
                }
                let arity = |n: usize| {
                    if args.len() == n {
                        Ok(())
                    } else {
                        Err(malformed(span, format!("{head} expects {n} arguments")))
                    }
                };
                match head.as_str() {
                    "and" => tb.and_all(args),
                    "or" => tb.or_all(args),
                    "not" => {
                        arity(1)?;
                        let [a] = into_array(args);
                        tb.not(a)
                    }
                    "=>" | "<=>" | "=" => {
                        arity(2)?;
                        let [a, b] = into_array(args);
                        match head.as_str() {
                            "=>" => tb.imp(a, b),
                            "<=>" => tb.eqv(a, b),
                            _ => tb.equals(a, b),
                        }
                    }
                    "ite" => {
                        arity(3)?;
                        let [c, a, b] = into_array(args);
                        tb.ite(c, a, b)
                    }
                    _ => Err(ParseError::UnknownSymbol(span.clone(), *head).into()),
                }
            }
            Expr::Quantified {
                span,
                universal,
                vars,
                body,
            } => {
                let bound = vars
                    .iter()
                    .map(|(name, sort)| {
                        Ok(LogicVariable::new(name.as_str(), self.sort(span, *sort)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let depth = scope.len();
                scope.extend(bound.iter().copied());
                let body = self.resolve(body, scope);
                scope.truncate(depth);
                bound.into_iter().rev().try_fold(body?, |body, v| {
                    if *universal {
                        tb.all(v, body)
                    } else {
                        tb.ex(v, body)
                    }
                })
            }
            Expr::Update {
                span,
                assignments,
                target,
            } => {
                let updates = assignments
                    .iter()
                    .map(|(lhs, rhs)| {
                        let value = self.resolve(rhs, scope)?;
                        match lhs {
                            Expr::Var(_, name) => match self.symbols.get(name) {
                                Some(Declared::ProgramVariable(pv)) => tb.elementary(*pv, value),
                                _ => Err(malformed(
                                    span,
                                    format!("{name} is not a program variable"),
                                )),
                            },
                            Expr::Call(_, head, args) => match self.symbols.get(head) {
                                Some(Declared::Function(f)) if f.is_location() => {
                                    let args = args
                                        .iter()
                                        .map(|a| self.resolve(a, scope))
                                        .collect::<Result<Vec<_>>>()?;
                                    tb.store(f, args, value)
                                }
                                _ => Err(malformed(
                                    span,
                                    format!("{head} is not a field or array"),
                                )),
                            },
                            _ => Err(malformed(span, format!("cannot assign to {lhs}"))),
                        }
                    })
                    .collect::<Result<Vec<_>>>()?;
                let target = self.resolve(target, scope)?;
                tb.apply(tb.parallel_all(updates)?, target)
            }
            Expr::Modal {
                kind,
                program,
                body,
                ..
            } => {
                let program = ModalProgram::Concrete(program.as_str().into());
                let body = self.resolve(body, scope)?;
                match kind {
                    ModalityKind::Diamond => tb.dia(program, body),
                    ModalityKind::Box => tb.box_(program, body),
                }
            }
        }
    }
}

fn malformed(span: &Span, msg: String) -> Error {
    ParseError::Malformed(span.clone(), msg).into()
}

fn into_array<const N: usize>(args: Vec<Term>) -> [Term; N] {
    args.try_into()
        .unwrap_or_else(|_| unreachable!("arity checked before"))
}

fn parse_label_id(label: &str) -> Option<LabelId> {
    let (major, minor) = label.split_once('.')?;
    Some(LabelId::new(major.parse().ok()?, minor.parse().ok()?))
}

/// The first open goal with a modality in its succedent, and the position of
/// that formula.
fn first_modality_goal(proof: &Proof) -> Option<(NodeId, PosInOccurrence)> {
    proof.open_goals().into_iter().find_map(|goal| {
        proof
            .node(goal)
            .sequent()
            .succedent()
            .iter()
            .find(|f| f.formula().contains_modality())
            .map(|f| (goal, PosInOccurrence::top_level(f.clone(), false)))
    })
}

fn layout_report(
    proof: &Proof,
    node: NodeId,
    pio: PosInOccurrence,
    settings: &LayoutSettings,
) -> Result<Vec<String>> {
    let mut extractor = SymbolicLayoutExtractor::new(proof, node, pio, settings.clone());
    extractor.analyse()?;
    let mut report = vec![];
    for i in 0..extractor.layouts_count()? {
        let initial = extractor.initial_layout(i)?;
        let current = extractor.current_layout(i)?;
        report.push(format!("layout {i}\n{initial}{current}"));
    }
    Ok(report)
}
