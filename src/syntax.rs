//! Parse problem files.
//!
//! A problem file is a sequence of s-expression commands declaring sorts and
//! symbols, posing proof obligations and checking what became of them:
//!
//! ```text
//! (sort Node)
//! (pvar self Node)
//! (field next Node Node)
//! (predicate post (Node))
//! (prove (dia "self.next = self;" (post (next self))) :no-auto)
//! (check layouts 5)
//! ```

use std::fmt::{self, Display};
use std::sync::Arc;

use thiserror::Error;

use crate::term::ModalityKind;
use crate::Symbol;

pub fn parse_program(filename: Option<String>, input: &str) -> Result<Vec<Command>, ParseError> {
    let (out, rest) = program(&Context::new(filename, input))?;
    debug_assert!(rest.is_at_end(), "did not parse entire program");
    Ok(out)
}

pub fn parse_expr(filename: Option<String>, input: &str) -> Result<Expr, ParseError> {
    let (out, rest) = expr(&Context::new(filename, input))?;
    if !rest.is_at_end() {
        return Err(ParseError::TrailingInput(rest.span()));
    }
    Ok(out)
}

/// A [`Span`] contains the file name and a pair of offsets representing the start and the end.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Span(Arc<SrcFile>, usize, usize);

impl Span {
    pub fn string(&self) -> &str {
        &self.0.contents[self.1..self.2]
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SrcFile {
    name: Option<String>,
    contents: String,
}

struct Location {
    line: usize,
    col: usize,
}

impl SrcFile {
    fn get_location(&self, offset: usize) -> Location {
        let mut line = 1;
        let mut col = 1;
        for (i, c) in self.contents.char_indices() {
            if i == offset {
                break;
            }
            if c == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        Location { line, col }
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = self.0.get_location(self.1);
        let end = self.0.get_location(self.2.saturating_sub(1).max(self.1));
        let quote = self.string();
        match (&self.0.name, start.line == end.line) {
            (Some(filename), true) => write!(
                f,
                "In {}:{}-{} of {filename}: {quote}",
                start.line, start.col, end.col
            ),
            (Some(filename), false) => write!(
                f,
                "In {}:{}-{}:{} of {filename}: {quote}",
                start.line, start.col, end.line, end.col
            ),
            (None, false) => write!(
                f,
                "In {}:{}-{}:{}: {quote}",
                start.line, start.col, end.line, end.col
            ),
            (None, true) => write!(f, "In {}:{}-{}: {quote}", start.line, start.col, end.col),
        }
    }
}

/// Formulas and terms, before symbols are resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    Var(Span, Symbol),
    Call(Span, Symbol, Vec<Expr>),
    /// `(forall ((x Sort) ...) body)` or `(exists ...)`.
    Quantified {
        span: Span,
        universal: bool,
        vars: Vec<(Symbol, Symbol)>,
        body: Box<Expr>,
    },
    /// `(update ((x v) ((next o) w)) target)`: the assignments in parallel.
    Update {
        span: Span,
        assignments: Vec<(Expr, Expr)>,
        target: Box<Expr>,
    },
    /// `(dia "program" body)` or `(box "program" body)`.
    Modal {
        span: Span,
        kind: ModalityKind,
        program: String,
        body: Box<Expr>,
    },
}

impl Expr {
    pub fn span(&self) -> &Span {
        match self {
            Expr::Var(span, _) | Expr::Call(span, _, _) => span,
            Expr::Quantified { span, .. }
            | Expr::Update { span, .. }
            | Expr::Modal { span, .. } => span,
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Var(_, name) => write!(f, "{name}"),
            Expr::Call(_, head, args) => {
                write!(f, "({head}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                f.write_str(")")
            }
            Expr::Quantified {
                universal,
                vars,
                body,
                ..
            } => {
                let q = if *universal { "forall" } else { "exists" };
                write!(f, "({q} (")?;
                for (i, (name, sort)) in vars.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "({name} {sort})")?;
                }
                write!(f, ") {body})")
            }
            Expr::Update {
                assignments,
                target,
                ..
            } => {
                f.write_str("(update (")?;
                for (i, (lhs, rhs)) in assignments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "({lhs} {rhs})")?;
                }
                write!(f, ") {target})")
            }
            Expr::Modal {
                kind,
                program,
                body,
                ..
            } => {
                let m = match kind {
                    ModalityKind::Diamond => "dia",
                    ModalityKind::Box => "box",
                };
                write!(f, "({m} {program:?} {body})")
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProofOptions {
    /// Attach formula labels so that truth values can be traced.
    pub labeled: bool,
    /// Only set up the proof, do not run the strategy on it.
    pub no_auto: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Check {
    /// The last proof is closed.
    Proved,
    /// The last proof has this many open goals.
    Open(usize),
    /// The first open goal with a modality has this many layouts.
    Layouts(usize),
    /// Every branch of the last proof evaluates the label to the value.
    Truth { label: String, value: Symbol },
}

impl Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::Proved => write!(f, "proved"),
            Check::Open(n) => write!(f, "open {n}"),
            Check::Layouts(n) => write!(f, "layouts {n}"),
            Check::Truth { label, value } => write!(f, "truth {label:?} {value}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `(sort Node)` declares a reference sort, `(datasort int)` a value sort.
    Sort {
        span: Span,
        name: Symbol,
        reference: bool,
    },
    Function {
        span: Span,
        name: Symbol,
        args: Vec<Symbol>,
        sort: Symbol,
    },
    Predicate {
        span: Span,
        name: Symbol,
        args: Vec<Symbol>,
    },
    Constant {
        span: Span,
        name: Symbol,
        sort: Symbol,
    },
    Field {
        span: Span,
        name: Symbol,
        owner: Symbol,
        sort: Symbol,
    },
    ArrayElement {
        span: Span,
        name: Symbol,
        array: Symbol,
        index: Symbol,
        sort: Symbol,
    },
    ProgramVariable {
        span: Span,
        name: Symbol,
        sort: Symbol,
    },
    /// `(prove F)` poses `==> F`, `(sequent (ante ..) (succ ..))` a whole
    /// sequent.
    Prove {
        span: Span,
        ante: Vec<Expr>,
        succ: Vec<Expr>,
        options: ProofOptions,
    },
    Check(Span, Check),
}

#[derive(Clone, Debug)]
struct Context {
    source: Arc<SrcFile>,
    index: usize,
}

impl Context {
    fn new(name: Option<String>, contents: &str) -> Context {
        let mut next = Context {
            source: Arc::new(SrcFile {
                name,
                contents: contents.to_string(),
            }),
            index: 0,
        };
        next.advance_past_whitespace();
        next
    }

    fn advance_text(&self, s: &str, skip_whitespace: bool) -> Option<(Span, Context)> {
        if self.source.contents[self.index..].starts_with(s) {
            let mut next = self.clone();
            next.index += s.len();
            if skip_whitespace {
                next.advance_past_whitespace();
            }
            Some((Span(self.source.clone(), self.index, next.index), next))
        } else {
            None
        }
    }

    fn advance_past_whitespace(&mut self) {
        let mut iter = self.source.contents[self.index..].char_indices();
        loop {
            let end = match iter.next() {
                Some((_, c)) if c.is_whitespace() => None,
                Some((_, ';')) => {
                    loop {
                        match iter.next() {
                            Some((_, '\n' | '\r')) => break,
                            Some(_) => {}
                            None => {
                                self.index = self.source.contents.len();
                                return;
                            }
                        }
                    }
                    None
                }
                Some((i, _)) => Some(self.index + i),
                None => Some(self.source.contents.len()),
            };
            if let Some(i) = end {
                self.index = i;
                return;
            }
        }
    }

    fn is_at_end(&self) -> bool {
        self.index == self.source.contents.len()
    }

    fn span(&self) -> Span {
        Span(self.source.clone(), self.index, self.index)
    }
}

type Res<T> = Result<(T, Context), ParseError>;

trait Parser<T>: Fn(&Context) -> Res<T> + Clone {}
impl<T, F: Fn(&Context) -> Res<T> + Clone> Parser<T> for F {}

fn text_exact(s: &str) -> impl Parser<Span> + '_ {
    text_internal(s, false)
}

fn text(s: &str) -> impl Parser<Span> + '_ {
    text_internal(s, true)
}

fn text_internal(s: &str, skip_whitespace: bool) -> impl Parser<Span> + '_ {
    move |ctx| {
        if let Some((span, next)) = ctx.advance_text(s, skip_whitespace) {
            Ok((span, next))
        } else {
            Err(ParseError::ExpectedText(ctx.span(), s.to_string()))
        }
    }
}

/// A whole identifier equal to `word`, so that `sort` does not match the
/// start of `sorted`.
fn keyword(word: &str) -> impl Parser<Span> + '_ {
    move |ctx| {
        let (name, next) = ident(ctx)?;
        if name.as_str() == word {
            Ok((Span(ctx.source.clone(), ctx.index, ctx.index + word.len()), next))
        } else {
            Err(ParseError::ExpectedText(ctx.span(), word.to_string()))
        }
    }
}

fn repeat<T>(parser: impl Parser<T>) -> impl Parser<Vec<T>> {
    move |ctx| {
        let mut vec = Vec::new();
        let mut next = ctx.clone();
        while let Ok((x, rest)) = parser(&next) {
            vec.push(x);
            next = rest;
        }
        Ok((vec, next))
    }
}

fn repeat1<T>(parser: impl Parser<T>) -> impl Parser<Vec<T>> {
    move |ctx| {
        let (x, next) = (parser.clone())(ctx)?;
        let (mut xs, next) = repeat(parser.clone())(&next)?;
        xs.insert(0, x);
        Ok((xs, next))
    }
}

fn repeat_all<T>(parser: impl Parser<T>) -> impl Parser<Vec<T>> {
    move |ctx| {
        let mut vec = Vec::new();
        let mut next = ctx.clone();
        while !next.is_at_end() {
            let (x, rest) = parser(&next)?;
            vec.push(x);
            next = rest;
        }
        Ok((vec, next))
    }
}

fn choice<T>(a: impl Parser<T>, b: impl Parser<T>) -> impl Parser<T> {
    move |ctx| a(ctx).or_else(|_| b(ctx))
}

macro_rules! choices {
    ( $x:expr , ) => { $x };
    ( $x:expr $( , $xs:expr )+ , ) => {
        choice( $x, choices!( $( $xs , )+ ) )
    };
}

fn map<T, U>(parser: impl Parser<T>, f: impl Fn(T) -> U + Clone) -> impl Parser<U> {
    move |ctx| {
        let (x, next) = parser(ctx)?;
        Ok((f(x), next))
    }
}

fn sequence<T, U>(a: impl Parser<T>, b: impl Parser<U>) -> impl Parser<(T, U)> {
    move |ctx| {
        let (x, next) = a(ctx)?;
        let (y, next) = b(&next)?;
        Ok(((x, y), next))
    }
}

fn sequence3<T, U, V>(
    a: impl Parser<T>,
    b: impl Parser<U>,
    c: impl Parser<V>,
) -> impl Parser<(T, U, V)> {
    move |ctx| {
        let (x, next) = a(ctx)?;
        let (y, next) = b(&next)?;
        let (z, next) = c(&next)?;
        Ok(((x, y, z), next))
    }
}

macro_rules! sequences {
    ( $x:expr , ) => { $x };
    ( $x:expr $( , $xs:expr )+ , ) => {
        sequence( $x, sequences!( $( $xs , )+ ) )
    };
}

fn parens_span<T>(f: impl Parser<T>) -> impl Parser<(Span, T)> {
    move |ctx| {
        let ((lo, x, hi), next) = choice(
            sequence3(text("("), f.clone(), text(")")),
            sequence3(text("["), f.clone(), text("]")),
        )(ctx)?;
        Ok(((Span(lo.0, lo.1, hi.2), x), next))
    }
}

fn parens<T>(f: impl Parser<T>) -> impl Parser<T> {
    move |ctx| {
        let ((_span, x), next) = parens_span(f.clone())(ctx)?;
        Ok((x, next))
    }
}

fn list<T>(f: impl Parser<T>) -> impl Parser<Vec<T>> {
    parens(repeat(f))
}

fn program(ctx: &Context) -> Res<Vec<Command>> {
    repeat_all(command)(ctx)
}

fn proof_options(ctx: &Context) -> Res<ProofOptions> {
    let (flags, next) = repeat(choice(text(":labeled"), text(":no-auto")))(ctx)?;
    let mut options = ProofOptions::default();
    for flag in flags {
        match flag.string() {
            ":labeled" => options.labeled = true,
            _ => options.no_auto = true,
        }
    }
    Ok((options, next))
}

fn command(ctx: &Context) -> Res<Command> {
    choices!(
        map(
            parens_span(sequence(keyword("sort"), ident)),
            |(span, (_, name))| Command::Sort {
                span,
                name,
                reference: true
            }
        ),
        map(
            parens_span(sequence(keyword("datasort"), ident)),
            |(span, (_, name))| Command::Sort {
                span,
                name,
                reference: false
            }
        ),
        map(
            parens_span(sequences!(keyword("function"), ident, list(ident), ident,)),
            |(span, (_, (name, (args, sort))))| Command::Function {
                span,
                name,
                args,
                sort
            }
        ),
        map(
            parens_span(sequence3(keyword("predicate"), ident, list(ident))),
            |(span, (_, name, args))| Command::Predicate { span, name, args }
        ),
        map(
            parens_span(sequence3(keyword("constant"), ident, ident)),
            |(span, (_, name, sort))| Command::Constant { span, name, sort }
        ),
        map(
            parens_span(sequences!(keyword("field"), ident, ident, ident,)),
            |(span, (_, (name, (owner, sort))))| Command::Field {
                span,
                name,
                owner,
                sort
            }
        ),
        map(
            parens_span(sequences!(keyword("array"), ident, ident, ident, ident,)),
            |(span, (_, (name, (array, (index, sort)))))| Command::ArrayElement {
                span,
                name,
                array,
                index,
                sort
            }
        ),
        map(
            parens_span(sequence3(keyword("pvar"), ident, ident)),
            |(span, (_, name, sort))| Command::ProgramVariable { span, name, sort }
        ),
        map(
            parens_span(sequence3(keyword("prove"), expr, proof_options)),
            |(span, (_, formula, options))| Command::Prove {
                span,
                ante: vec![],
                succ: vec![formula],
                options
            }
        ),
        map(
            parens_span(sequences!(
                keyword("sequent"),
                parens(sequence(keyword("ante"), repeat(expr))),
                parens(sequence(keyword("succ"), repeat(expr))),
                proof_options,
            )),
            |(span, (_, ((_, ante), ((_, succ), options))))| Command::Prove {
                span,
                ante,
                succ,
                options
            }
        ),
        map(
            parens_span(sequence(keyword("check"), check)),
            |(span, (_, check))| Command::Check(span, check)
        ),
    )(ctx)
}

fn check(ctx: &Context) -> Res<Check> {
    choices!(
        map(keyword("proved"), |_| Check::Proved),
        map(sequence(keyword("open"), unum), |(_, n)| Check::Open(n)),
        map(sequence(keyword("layouts"), unum), |(_, n)| Check::Layouts(n)),
        map(
            sequence3(keyword("truth"), string, ident),
            |(_, label, value)| Check::Truth { label, value }
        ),
    )(ctx)
}

fn expr(ctx: &Context) -> Res<Expr> {
    choices!(
        quantified,
        update,
        modal,
        map(
            parens_span(sequence(ident, repeat(expr))),
            |(span, (head, tail))| Expr::Call(span, head, tail)
        ),
        var,
    )(ctx)
}

fn var(ctx: &Context) -> Res<Expr> {
    let start = ctx.index;
    let (name, next) = ident(ctx)?;
    let span = Span(ctx.source.clone(), start, start + name.as_str().len());
    Ok((Expr::Var(span, name), next))
}

fn quantified(ctx: &Context) -> Res<Expr> {
    map(
        parens_span(sequence3(
            choice(keyword("forall"), keyword("exists")),
            list(parens(sequence(ident, ident))),
            expr,
        )),
        |(span, (q, vars, body))| Expr::Quantified {
            span,
            universal: q.string() == "forall",
            vars,
            body: Box::new(body),
        },
    )(ctx)
}

fn update(ctx: &Context) -> Res<Expr> {
    map(
        parens_span(sequence3(
            keyword("update"),
            list(parens(sequence(expr, expr))),
            expr,
        )),
        |(span, (_, assignments, target))| Expr::Update {
            span,
            assignments,
            target: Box::new(target),
        },
    )(ctx)
}

fn modal(ctx: &Context) -> Res<Expr> {
    map(
        parens_span(sequence3(
            choice(keyword("dia"), keyword("box")),
            string,
            expr,
        )),
        |(span, (m, program, body))| Expr::Modal {
            span,
            kind: if m.string() == "dia" {
                ModalityKind::Diamond
            } else {
                ModalityKind::Box
            },
            program,
            body: Box::new(body),
        },
    )(ctx)
}

fn digit(ctx: &Context) -> Res<Span> {
    let c = ctx.source.contents[ctx.index..].chars().next();
    match c {
        Some(c) if c.is_ascii_digit() => {
            text_exact(&ctx.source.contents[ctx.index..ctx.index + 1])(ctx)
        }
        _ => Err(ParseError::ExpectedUint(ctx.span())),
    }
}

fn unum(ctx: &Context) -> Res<usize> {
    let start = ctx.index;
    let (_, next) = sequence(repeat1(digit), text(""))(ctx)?;
    let digits = ctx.source.contents[start..next.index].trim_end();
    let end = start + digits.len();
    let i = digits
        .parse()
        .map_err(|_| ParseError::ExpectedUint(Span(ctx.source.clone(), start, end)))?;
    Ok((i, next))
}

fn ident(ctx: &Context) -> Res<Symbol> {
    let mut span = ctx.span();
    let is_ident_char = |c: char| c.is_alphanumeric() || "-+*/?!=<>&|^%_.".contains(c);
    match ctx.source.contents[ctx.index..].chars().next() {
        Some(c) if is_ident_char(c) => {}
        _ => return Err(ParseError::ExpectedIdent(span)),
    }

    let mut next = ctx.clone();
    loop {
        loop {
            next.index += 1;
            if next.source.contents.is_char_boundary(next.index) {
                break;
            }
        }

        let Some(c) = next.source.contents[next.index..].chars().next() else {
            break;
        };
        if !is_ident_char(c) {
            break;
        }
    }

    span.2 = next.index;
    next.advance_past_whitespace();

    Ok((Symbol::from(span.string()), next))
}

fn string(ctx: &Context) -> Res<String> {
    let mut span = ctx.span();
    if !ctx.source.contents[ctx.index..].starts_with('"') {
        return Err(ParseError::ExpectedString(span));
    }

    let mut next = ctx.clone();
    let mut in_escape = false;
    loop {
        loop {
            next.index += 1;
            if next.source.contents.is_char_boundary(next.index) {
                break;
            }
        }

        let Some(c) = next.source.contents[next.index..].chars().next() else {
            span.2 = span.1 + 1;
            return Err(ParseError::MissingEndQuote(span));
        };

        if c == '"' && !in_escape {
            next.index += 1;
            break;
        }

        in_escape = c == '\\' && !in_escape;
    }

    span.2 = next.index;
    next.advance_past_whitespace();

    let string = span.string();
    let string = &string[1..string.len() - 1];
    Ok((string.to_string(), next))
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{0}\nexpected {1}, found {}", .0.string())]
    ExpectedText(Span, String),
    #[error("{0}\nexpected string")]
    ExpectedString(Span),
    #[error("{0}\nmissing end quote for string")]
    MissingEndQuote(Span),
    #[error("{0}\nexpected identifier")]
    ExpectedIdent(Span),
    #[error("{0}\nexpected unsigned integer")]
    ExpectedUint(Span),
    #[error("{0}\nunexpected input after expression")]
    TrailingInput(Span),
    #[error("{0}\nunknown symbol {1}")]
    UnknownSymbol(Span, Symbol),
    #[error("{0}\n{1}")]
    Malformed(Span, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expr_display_roundtrip() {
        let s = r#"(forall ((x Node)) (=> (update ((self x)) (dia "self = self.next;" (p self))) (= (next x) null)))"#;
        let e = parse_expr(None, s).unwrap();
        assert_eq!(e.to_string(), s);
    }

    #[test]
    fn commands() {
        let program = parse_program(
            Some("test.tac".into()),
            r#"
            ; declarations
            (sort Node)
            (datasort int)
            (field next Node Node)
            (predicate p (Node))
            (sequent (ante (p self)) (succ (p self)) :labeled)
            (check proved)
            (check open 0)
            (check truth "1.0" true)
            "#,
        )
        .unwrap();
        assert_eq!(program.len(), 8);
        assert!(matches!(&program[0], Command::Sort { reference: true, .. }));
        assert!(matches!(&program[1], Command::Sort { reference: false, .. }));
        match &program[4] {
            Command::Prove {
                ante,
                succ,
                options,
                ..
            } => {
                assert_eq!(ante.len(), 1);
                assert_eq!(succ[0].to_string(), "(p self)");
                assert!(options.labeled && !options.no_auto);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(&program[6], Command::Check(_, Check::Open(0))));
        assert!(matches!(
            &program[7],
            Command::Check(_, Check::Truth { label, .. }) if label == "1.0"
        ));
    }

    #[test]
    fn errors_point_at_the_input() {
        let err = parse_program(Some("bad.tac".into()), "(sort Node)\n(pvar x)").unwrap_err();
        assert!(err.to_string().starts_with("In 2:"), "{err}");
        assert!(parse_expr(None, "(p x) y").is_err());
    }
}
