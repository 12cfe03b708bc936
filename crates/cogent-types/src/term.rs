//! Logical terms, substitutions and unification.
//!
//! A [`Term`] is either a variable, an atom, an integer or a compound
//! `functor(arg, ...)`.  Variables are named; two occurrences of the same
//! name denote the same variable.
//!
//! A [`Substitution`] maps variable names to terms.  Internally bindings may
//! refer to other bound variables while unification is in progress; every
//! public constructor returns the *normalised* form in which every binding is
//! fully resolved, so two substitutions that bind the same variables to the
//! same terms compare equal.
//!
//! # Example
//!
//! ```
//! use cogent_types::term::{mgu, Term};
//!
//! let pattern = Term::compound("on", vec![Term::var("X"), Term::atom("table")]);
//! let fact = Term::compound("on", vec![Term::atom("a"), Term::atom("table")]);
//!
//! let subst = mgu(&pattern, &fact).unwrap();
//! assert_eq!(subst.get("X"), Some(&Term::atom("a")));
//! assert_eq!(subst.apply(&pattern), fact);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Term
// ─────────────────────────────────────────────────────────────────────────────

/// A first-order term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    /// A logical variable, e.g. `X` or `_Tmp`.
    Var(String),
    /// A constant symbol, e.g. `table`.
    Atom(String),
    /// An integer constant.
    Int(i64),
    /// A compound term `functor(args...)` with at least one argument.
    Compound { functor: String, args: Vec<Term> },
}

impl Term {
    pub fn var(name: impl Into<String>) -> Self {
        Term::Var(name.into())
    }

    pub fn atom(name: impl Into<String>) -> Self {
        Term::Atom(name.into())
    }

    pub fn int(value: i64) -> Self {
        Term::Int(value)
    }

    /// Build a compound term.  A functor without arguments is an atom.
    pub fn compound(functor: impl Into<String>, args: Vec<Term>) -> Self {
        let functor = functor.into();
        if args.is_empty() {
            Term::Atom(functor)
        } else {
            Term::Compound { functor, args }
        }
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Term::Var(_))
    }

    /// `true` when the term contains no variables.
    pub fn is_ground(&self) -> bool {
        match self {
            Term::Var(_) => false,
            Term::Atom(_) | Term::Int(_) => true,
            Term::Compound { args, .. } => args.iter().all(Term::is_ground),
        }
    }

    /// Name and arity of the term, or `None` for variables and integers.
    pub fn signature(&self) -> Option<(&str, usize)> {
        match self {
            Term::Atom(name) => Some((name.as_str(), 0)),
            Term::Compound { functor, args } => Some((functor.as_str(), args.len())),
            Term::Var(_) | Term::Int(_) => None,
        }
    }

    /// Arguments of a compound term (empty for every other kind).
    pub fn args(&self) -> &[Term] {
        match self {
            Term::Compound { args, .. } => args,
            _ => &[],
        }
    }

    /// Collect the names of all variables occurring in this term.
    pub fn collect_vars(&self, out: &mut BTreeSet<String>) {
        match self {
            Term::Var(name) => {
                out.insert(name.clone());
            }
            Term::Compound { args, .. } => {
                for arg in args {
                    arg.collect_vars(out);
                }
            }
            Term::Atom(_) | Term::Int(_) => {}
        }
    }

    pub fn vars(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_vars(&mut out);
        out
    }

    /// Rename every variable by appending `suffix`.  Used to keep clause
    /// variables apart from query variables during resolution.
    pub fn rename(&self, suffix: &str) -> Term {
        match self {
            Term::Var(name) => Term::Var(format!("{name}{suffix}")),
            Term::Compound { functor, args } => Term::Compound {
                functor: functor.clone(),
                args: args.iter().map(|a| a.rename(suffix)).collect(),
            },
            other => other.clone(),
        }
    }

    /// Shorthand for [`Substitution::apply`].
    pub fn apply_subst(&self, subst: &Substitution) -> Term {
        subst.apply(self)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Var(name) | Term::Atom(name) => write!(f, "{name}"),
            Term::Int(value) => write!(f, "{value}"),
            Term::Compound { functor, args } => {
                write!(f, "{functor}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Substitution
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable-by-convention mapping from variable names to terms.
///
/// Operations that extend a substitution return a new value; the original is
/// never modified after it has been handed out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Substitution {
    bindings: BTreeMap<String, Term>,
}

impl Substitution {
    /// The empty substitution.
    pub fn new() -> Self {
        Self::default()
    }

    /// A substitution with a single binding.
    pub fn singleton(var: impl Into<String>, term: Term) -> Self {
        let mut bindings = BTreeMap::new();
        bindings.insert(var.into(), term);
        Self { bindings }
    }

    /// Build from `(variable, term)` pairs.  Returns `None` when two pairs
    /// bind the same variable inconsistently.
    pub fn from_pairs<I, S>(pairs: I) -> Option<Self>
    where
        I: IntoIterator<Item = (S, Term)>,
        S: Into<String>,
    {
        let mut subst = Substitution::new();
        for (var, term) in pairs {
            if !unify(&Term::Var(var.into()), &term, &mut subst) {
                return None;
            }
        }
        Some(subst.normalized())
    }

    pub fn get(&self, var: &str) -> Option<&Term> {
        self.bindings.get(var)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Term)> {
        self.bindings.iter()
    }

    /// Variables bound by this substitution.
    pub fn domain(&self) -> BTreeSet<String> {
        self.bindings.keys().cloned().collect()
    }

    /// Apply the substitution to `term`, resolving chains of bindings.
    pub fn apply(&self, term: &Term) -> Term {
        match term {
            Term::Var(name) => match self.bindings.get(name) {
                Some(bound) => self.apply(bound),
                None => term.clone(),
            },
            Term::Compound { functor, args } => Term::Compound {
                functor: functor.clone(),
                args: args.iter().map(|a| self.apply(a)).collect(),
            },
            other => other.clone(),
        }
    }

    /// Union of two consistent substitutions.
    ///
    /// Returns `None` when the substitutions bind a shared variable to terms
    /// that do not unify.
    pub fn combine(&self, other: &Substitution) -> Option<Substitution> {
        if other.is_empty() {
            return Some(self.clone());
        }
        let mut combined = self.clone();
        for (var, term) in &other.bindings {
            if !unify(&Term::Var(var.clone()), term, &mut combined) {
                return None;
            }
        }
        Some(combined.normalized())
    }

    /// Keep only the bindings for `vars`.
    pub fn restrict(&self, vars: &BTreeSet<String>) -> Substitution {
        Substitution {
            bindings: self
                .bindings
                .iter()
                .filter(|(var, _)| vars.contains(*var))
                .map(|(var, term)| (var.clone(), self.apply(term)))
                .collect(),
        }
    }

    /// Fully resolve every binding and drop trivial `X/X` bindings.
    pub fn normalized(&self) -> Substitution {
        Substitution {
            bindings: self
                .bindings
                .iter()
                .map(|(var, term)| (var.clone(), self.apply(term)))
                .filter(|(var, term)| !matches!(term, Term::Var(v) if v == var))
                .collect(),
        }
    }

    fn walk(&self, term: &Term) -> Term {
        let mut current = term.clone();
        while let Term::Var(name) = &current {
            match self.bindings.get(name) {
                Some(next) => current = next.clone(),
                None => break,
            }
        }
        current
    }

    fn occurs(&self, var: &str, term: &Term) -> bool {
        match self.walk(term) {
            Term::Var(name) => name == var,
            Term::Compound { args, .. } => args.iter().any(|a| self.occurs(var, a)),
            Term::Atom(_) | Term::Int(_) => false,
        }
    }
}

impl fmt::Display for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (var, term)) in self.bindings.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{var}/{term}")?;
        }
        write!(f, "]")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unification
// ─────────────────────────────────────────────────────────────────────────────

/// Most general unifier of two terms, or `None` if they do not unify.
pub fn mgu(a: &Term, b: &Term) -> Option<Substitution> {
    let mut subst = Substitution::new();
    if unify(a, b, &mut subst) {
        Some(subst.normalized())
    } else {
        None
    }
}

/// Extend `subst` so that `a` and `b` become equal.  On failure `subst` may
/// hold partial bindings and must be discarded by the caller.
pub fn unify(a: &Term, b: &Term, subst: &mut Substitution) -> bool {
    let a = subst.walk(a);
    let b = subst.walk(b);
    match (a, b) {
        (Term::Var(x), Term::Var(y)) if x == y => true,
        (Term::Var(x), t) | (t, Term::Var(x)) => {
            if subst.occurs(&x, &t) {
                return false;
            }
            subst.bindings.insert(x, t);
            true
        }
        (
            Term::Compound { functor: f, args: xs },
            Term::Compound { functor: g, args: ys },
        ) => {
            f == g
                && xs.len() == ys.len()
                && xs.iter().zip(ys.iter()).all(|(x, y)| unify(x, y, subst))
        }
        (x, y) => x == y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(args: Vec<Term>) -> Term {
        Term::compound("p", args)
    }

    #[test]
    fn compound_without_args_is_atom() {
        assert_eq!(Term::compound("done", vec![]), Term::atom("done"));
    }

    #[test]
    fn display_nested_compound() {
        let t = Term::compound("on", vec![Term::atom("a"), p(vec![Term::var("X"), Term::int(3)])]);
        assert_eq!(t.to_string(), "on(a, p(X, 3))");
    }

    #[test]
    fn mgu_binds_variables_both_ways() {
        let s = mgu(&p(vec![Term::var("X"), Term::int(2)]), &p(vec![Term::int(1), Term::var("Y")]))
            .unwrap();
        assert_eq!(s.get("X"), Some(&Term::int(1)));
        assert_eq!(s.get("Y"), Some(&Term::int(2)));
    }

    #[test]
    fn mgu_fails_on_clash() {
        assert!(mgu(&p(vec![Term::int(1)]), &p(vec![Term::int(2)])).is_none());
        assert!(mgu(&p(vec![Term::int(1)]), &Term::compound("q", vec![Term::int(1)])).is_none());
    }

    #[test]
    fn occurs_check_rejects_cyclic_binding() {
        assert!(mgu(&Term::var("X"), &p(vec![Term::var("X")])).is_none());
    }

    #[test]
    fn chained_bindings_are_normalised() {
        let s = mgu(
            &p(vec![Term::var("X"), Term::var("Y")]),
            &p(vec![Term::var("Y"), Term::atom("a")]),
        )
        .unwrap();
        assert_eq!(s.apply(&Term::var("X")), Term::atom("a"));
        assert_eq!(s.get("X"), Some(&Term::atom("a")));
    }

    #[test]
    fn combine_consistent_substitutions() {
        let a = Substitution::singleton("X", Term::int(1));
        let b = Substitution::singleton("Y", Term::int(2));
        let c = a.combine(&b).unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(a.combine(&a).unwrap(), a);
    }

    #[test]
    fn combine_conflicting_substitutions_fails() {
        let a = Substitution::singleton("X", Term::int(1));
        let b = Substitution::singleton("X", Term::int(2));
        assert!(a.combine(&b).is_none());
    }

    #[test]
    fn combine_resolves_through_shared_variables() {
        let a = Substitution::singleton("X", Term::var("Y"));
        let b = Substitution::singleton("Y", Term::atom("b"));
        let c = a.combine(&b).unwrap();
        assert_eq!(c.get("X"), Some(&Term::atom("b")));
    }

    #[test]
    fn restrict_keeps_only_requested_vars() {
        let s = Substitution::from_pairs([("X", Term::int(1)), ("Y", Term::int(2))]).unwrap();
        let vars: BTreeSet<String> = ["X".to_string()].into_iter().collect();
        let r = s.restrict(&vars);
        assert_eq!(r.len(), 1);
        assert_eq!(r.get("X"), Some(&Term::int(1)));
    }

    #[test]
    fn rename_appends_suffix_to_vars_only() {
        let t = p(vec![Term::var("X"), Term::atom("a")]);
        assert_eq!(t.rename("_1"), p(vec![Term::var("X_1"), Term::atom("a")]));
    }

    #[test]
    fn substitution_display() {
        let s = Substitution::from_pairs([("X", Term::int(1)), ("Y", Term::atom("a"))]).unwrap();
        assert_eq!(s.to_string(), "[X/1, Y/a]");
    }
}
