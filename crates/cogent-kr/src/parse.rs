//! Text syntax for KR formulas.
//!
//! The grammar lives in `kr.pest`:
//!
//! ```text
//! theory  := (clause ".")*
//! clause  := compound [":-" body]
//! body    := literal ("," literal)*
//! literal := "not" "(" term ")" | term [op term]
//! op      := "=<" | ">=" | "\=" | "=" | "<" | ">"
//! term    := Var | Int | atom ["(" term ("," term)* ")"] | 'quoted atom'
//! ```
//!
//! Variables start with an upper-case letter or `_`.  Every bare `_` is a
//! fresh anonymous variable.  `%` starts a comment that runs to the end of
//! the line.  Error offsets are byte offsets into the source.

use pest::Parser;
use pest::error::{Error as PestError, InputLocation};
use pest::iterators::{Pair, Pairs};

use cogent_types::{CogentError, DatabaseFormula, KrLiteral, Query, Term, Update};

mod grammar {
    #[derive(pest_derive::Parser)]
    #[grammar = "kr.pest"]
    pub(super) struct KrParser;
}

use grammar::{KrParser, Rule};

/// Parse a single term.
pub fn parse_term(src: &str) -> Result<Term, CogentError> {
    let mut builder = Builder::default();
    let mut pairs = entry(Rule::term_input, src)?;
    builder.term(next_pair(&mut pairs, "term", 0)?)
}

/// Parse a conjunction of literals.  Empty input is the query `true`.
pub fn parse_query(src: &str) -> Result<Query, CogentError> {
    let mut builder = Builder::default();
    match entry(Rule::query_input, src)?.find(|p| p.as_rule() == Rule::body) {
        Some(body) => Ok(Query::new(builder.body(body)?)),
        None => Ok(Query::default()),
    }
}

/// Parse an update: positive literals are added, `not(..)` literals deleted.
pub fn parse_update(src: &str) -> Result<Update, CogentError> {
    Ok(parse_query(src)?.to_update())
}

/// Parse one clause, with or without the terminating `.`.
pub fn parse_clause(src: &str) -> Result<DatabaseFormula, CogentError> {
    let mut builder = Builder::default();
    let mut pairs = entry(Rule::clause_input, src)?;
    builder.clause(next_pair(&mut pairs, "clause", 0)?)
}

/// Parse a sequence of `.`-terminated clauses.
pub fn parse_theory(src: &str) -> Result<Vec<DatabaseFormula>, CogentError> {
    let mut builder = Builder::default();
    entry(Rule::theory_input, src)?
        .filter(|p| p.as_rule() == Rule::clause)
        .map(|p| builder.clause(p))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Pest plumbing
// ─────────────────────────────────────────────────────────────────────────────

/// Run `rule` over `src` and return the children of the entry pair.
fn entry(rule: Rule, src: &str) -> Result<Pairs<'_, Rule>, CogentError> {
    let mut pairs = KrParser::parse(rule, src).map_err(syntax_error)?;
    let top = next_pair(&mut pairs, "input", 0)?;
    Ok(top.into_inner())
}

fn syntax_error(err: PestError<Rule>) -> CogentError {
    let offset = match err.location {
        InputLocation::Pos(pos) => pos,
        InputLocation::Span((start, _)) => start,
    };
    CogentError::Parse {
        offset,
        details: err.variant.message().into_owned(),
    }
}

fn next_pair<'i>(pairs: &mut Pairs<'i, Rule>, what: &str, offset: usize) -> Result<Pair<'i, Rule>, CogentError> {
    pairs.next().ok_or_else(|| CogentError::Parse {
        offset,
        details: format!("expected {what}"),
    })
}

fn unexpected(pair: &Pair<'_, Rule>, expected: &str) -> CogentError {
    CogentError::Parse {
        offset: pair.as_span().start(),
        details: format!("expected {expected}, found {:?} '{}'", pair.as_rule(), pair.as_str()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builders
// ─────────────────────────────────────────────────────────────────────────────

/// Turns parse trees into formulas.  Numbers anonymous variables per call.
#[derive(Default)]
struct Builder {
    anonymous: usize,
}

impl Builder {
    fn clause(&mut self, pair: Pair<'_, Rule>) -> Result<DatabaseFormula, CogentError> {
        let start = pair.as_span().start();
        let mut inner = pair.into_inner();
        let head = self.compound(next_pair(&mut inner, "clause head", start)?)?;
        match inner.next() {
            Some(body) => Ok(DatabaseFormula::rule(head, self.body(body)?)),
            None => Ok(DatabaseFormula::fact(head)),
        }
    }

    fn body(&mut self, pair: Pair<'_, Rule>) -> Result<Vec<KrLiteral>, CogentError> {
        pair.into_inner().map(|literal| self.literal(literal)).collect()
    }

    fn literal(&mut self, pair: Pair<'_, Rule>) -> Result<KrLiteral, CogentError> {
        let start = pair.as_span().start();
        let mut inner = pair.into_inner();
        let left = self.term(next_pair(&mut inner, "term", start)?)?;
        let Some(op) = inner.next() else {
            return Ok(match left {
                Term::Compound { functor, mut args } if functor == "not" && args.len() == 1 => {
                    KrLiteral::negative(args.remove(0))
                }
                other => KrLiteral::positive(other),
            });
        };
        let right = self.term(next_pair(&mut inner, "right operand", op.as_span().end())?)?;
        Ok(KrLiteral::positive(Term::compound(op.as_str(), vec![left, right])))
    }

    fn term(&mut self, pair: Pair<'_, Rule>) -> Result<Term, CogentError> {
        let start = pair.as_span().start();
        let inner = next_pair(&mut pair.into_inner(), "term", start)?;
        match inner.as_rule() {
            Rule::integer => inner.as_str().parse::<i64>().map(Term::int).map_err(|_| CogentError::Parse {
                offset: start,
                details: format!("invalid integer '{}'", inner.as_str()),
            }),
            Rule::variable if inner.as_str() == "_" => {
                self.anonymous += 1;
                Ok(Term::var(format!("_G{}", self.anonymous)))
            }
            Rule::variable => Ok(Term::var(inner.as_str())),
            Rule::compound => self.compound(inner),
            _ => Err(unexpected(&inner, "term")),
        }
    }

    fn compound(&mut self, pair: Pair<'_, Rule>) -> Result<Term, CogentError> {
        if pair.as_rule() != Rule::compound {
            return Err(unexpected(&pair, "atom or compound term"));
        }
        let start = pair.as_span().start();
        let mut inner = pair.into_inner();
        let functor = next_pair(&mut inner, "functor", start)?;
        let functor = match functor.as_rule() {
            Rule::quoted => {
                let raw = functor.as_str();
                raw[1..raw.len() - 1].to_string()
            }
            _ => functor.as_str().to_string(),
        };
        let args = match inner.next() {
            Some(args) => args.into_inner().map(|arg| self.term(arg)).collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        Ok(Term::compound(functor, args))
    }
}
