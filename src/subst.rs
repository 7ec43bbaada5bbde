//! Free-variable analysis, fresh-name generation and capture-avoiding substitution.
//!
//! Substitution works on shared [`Rc<Term>`] nodes: subtrees that contain nothing
//! to replace are returned as new references to the same node, so each rewrite
//! allocates only along the paths it actually changes.

use crate::ast::{MIN_STACK_RED_ZONE, STACK_GROWTH_SIZE, Term};
use std::collections::HashSet;
use std::rc::Rc;
use tracing::trace;

/// Prefix of every generated binder name
pub const FRESH_PREFIX: &str = "Var";

/// Set of variable names
pub type NameSet = HashSet<String>;

/// Source of fresh variable names
///
/// A monotonically increasing counter that is never reset, so no two calls on the
/// same generator return the same name. Each [`crate::Evaluator`] owns one; share a
/// generator by reference when several substitutions must not collide.
#[derive(Debug, Default, Clone)]
pub struct FreshNames {
    counter: u64,
}

impl FreshNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a name that is not in `avoid` and has never been returned before
    pub fn fresh(&mut self, avoid: &NameSet) -> String {
        loop {
            self.counter += 1;
            let candidate = format!("{FRESH_PREFIX}{}", self.counter);
            if !avoid.contains(&candidate) {
                return candidate;
            }
        }
    }

    /// Number of names drawn so far, including skipped candidates
    pub fn issued(&self) -> u64 {
        self.counter
    }
}

impl Term {
    /// Free variables of this term
    pub fn free_vars(&self) -> NameSet {
        let mut free = NameSet::new();
        collect_free_vars(self, &mut NameSet::new(), &mut free);
        free
    }

    /// Check whether `name` occurs free in this term
    pub fn has_free_var(&self, name: &str) -> bool {
        self.free_vars().contains(name)
    }
}

/// Accumulate the free variables of `term` into `free`, skipping names in `bound`
fn collect_free_vars(term: &Term, bound: &mut NameSet, free: &mut NameSet) {
    stacker::maybe_grow(MIN_STACK_RED_ZONE, STACK_GROWTH_SIZE, || {
        collect_free_vars_impl(term, bound, free)
    })
}

/// Implementation (called via stacker::maybe_grow)
fn collect_free_vars_impl(term: &Term, bound: &mut NameSet, free: &mut NameSet) {
    match term {
        Term::Var(name) => {
            if !bound.contains(name) {
                free.insert(name.clone());
            }
        }
        Term::Num(_) | Term::Nil => {}
        Term::Lam(param, body) => with_bound(param, bound, |bound| {
            collect_free_vars(body, bound, free)
        }),
        Term::Let(name, value, body) => {
            collect_free_vars(value, bound, free);
            with_bound(name, bound, |bound| collect_free_vars(body, bound, free));
        }
        Term::Letrec(name, value, body) => with_bound(name, bound, |bound| {
            collect_free_vars(value, bound, free);
            collect_free_vars(body, bound, free);
        }),
        Term::If(a, b, c) => {
            collect_free_vars(a, bound, free);
            collect_free_vars(b, bound, free);
            collect_free_vars(c, bound, free);
        }
        Term::App(a, b)
        | Term::Plus(a, b)
        | Term::Minus(a, b)
        | Term::Times(a, b)
        | Term::Eq(a, b)
        | Term::Leq(a, b)
        | Term::Seq(a, b)
        | Term::Cons(a, b) => {
            collect_free_vars(a, bound, free);
            collect_free_vars(b, bound, free);
        }
        Term::Neg(a) | Term::Fix(a) | Term::Hd(a) | Term::Tl(a) => {
            collect_free_vars(a, bound, free)
        }
    }
}

/// Run `f` with `name` added to `bound`, restoring the previous set afterwards
fn with_bound<R>(name: &str, bound: &mut NameSet, f: impl FnOnce(&mut NameSet) -> R) -> R {
    let newly_bound = bound.insert(name.to_owned());
    let result = f(bound);
    if newly_bound {
        bound.remove(name);
    }
    result
}

/// Replace every free occurrence of `name` in `term` with `replacement`
///
/// Binders that would capture a free variable of `replacement` are renamed to a
/// name drawn from `names` first, so the result never binds a variable of
/// `replacement` that was free before.
pub fn substitute(
    term: &Rc<Term>,
    name: &str,
    replacement: &Rc<Term>,
    names: &mut FreshNames,
) -> Rc<Term> {
    let mut subst = Substitution {
        name,
        replacement,
        replacement_free: replacement.free_vars(),
        names,
    };
    subst.apply(term)
}

/// One substitution `[replacement/name]` with the free variables of
/// `replacement` computed once up front
struct Substitution<'a> {
    name: &'a str,
    replacement: &'a Rc<Term>,
    replacement_free: NameSet,
    names: &'a mut FreshNames,
}

impl Substitution<'_> {
    fn apply(&mut self, term: &Rc<Term>) -> Rc<Term> {
        stacker::maybe_grow(MIN_STACK_RED_ZONE, STACK_GROWTH_SIZE, || self.apply_impl(term))
    }

    /// Implementation (called via stacker::maybe_grow)
    fn apply_impl(&mut self, term: &Rc<Term>) -> Rc<Term> {
        match term.as_ref() {
            Term::Var(v) => {
                if v == self.name {
                    Rc::clone(self.replacement)
                } else {
                    Rc::clone(term)
                }
            }
            Term::Num(_) | Term::Nil => Rc::clone(term),

            Term::Lam(param, body) => {
                if param == self.name {
                    return Rc::clone(term);
                }
                let (new_param, new_body) = self.under_binder(param, body);
                if new_param == *param && Rc::ptr_eq(&new_body, body) {
                    return Rc::clone(term);
                }
                Rc::new(Term::Lam(new_param, new_body))
            }
            Term::Let(var, value, body) => {
                // The bound value is outside the binder's scope
                let new_value = self.apply(value);
                let (new_var, new_body) = if var == self.name {
                    (var.clone(), Rc::clone(body))
                } else {
                    self.under_binder(var, body)
                };
                if new_var == *var && Rc::ptr_eq(&new_value, value) && Rc::ptr_eq(&new_body, body)
                {
                    return Rc::clone(term);
                }
                Rc::new(Term::Let(new_var, new_value, new_body))
            }
            Term::Letrec(var, value, body) => {
                if var == self.name {
                    return Rc::clone(term);
                }
                if self.replacement_free.contains(var) {
                    let mut avoid = value.free_vars();
                    avoid.extend(body.free_vars());
                    avoid.extend(self.replacement_free.iter().cloned());
                    avoid.insert(var.clone());
                    avoid.insert(self.name.to_owned());
                    let fresh = self.rename_binder(var, &avoid);
                    let renamed_value = rename(value, var, &fresh, self.names);
                    let renamed_body = rename(body, var, &fresh, self.names);
                    let new_value = self.apply(&renamed_value);
                    let new_body = self.apply(&renamed_body);
                    return Rc::new(Term::Letrec(fresh, new_value, new_body));
                }
                self.binary(term, value, body, |value, body| {
                    Term::Letrec(var.clone(), value, body)
                })
            }

            Term::App(a, b) => self.binary(term, a, b, Term::App),
            Term::Plus(a, b) => self.binary(term, a, b, Term::Plus),
            Term::Minus(a, b) => self.binary(term, a, b, Term::Minus),
            Term::Times(a, b) => self.binary(term, a, b, Term::Times),
            Term::Eq(a, b) => self.binary(term, a, b, Term::Eq),
            Term::Leq(a, b) => self.binary(term, a, b, Term::Leq),
            Term::Seq(a, b) => self.binary(term, a, b, Term::Seq),
            Term::Cons(a, b) => self.binary(term, a, b, Term::Cons),
            Term::If(a, b, c) => {
                let (na, nb, nc) = (self.apply(a), self.apply(b), self.apply(c));
                if Rc::ptr_eq(&na, a) && Rc::ptr_eq(&nb, b) && Rc::ptr_eq(&nc, c) {
                    Rc::clone(term)
                } else {
                    Rc::new(Term::If(na, nb, nc))
                }
            }
            Term::Neg(a) => self.unary(term, a, Term::Neg),
            Term::Fix(a) => self.unary(term, a, Term::Fix),
            Term::Hd(a) => self.unary(term, a, Term::Hd),
            Term::Tl(a) => self.unary(term, a, Term::Tl),
        }
    }

    /// Substitute into both children, reusing `term` when neither changed
    fn binary(
        &mut self,
        term: &Rc<Term>,
        a: &Rc<Term>,
        b: &Rc<Term>,
        build: impl FnOnce(Rc<Term>, Rc<Term>) -> Term,
    ) -> Rc<Term> {
        let (na, nb) = (self.apply(a), self.apply(b));
        if Rc::ptr_eq(&na, a) && Rc::ptr_eq(&nb, b) {
            Rc::clone(term)
        } else {
            Rc::new(build(na, nb))
        }
    }

    fn unary(
        &mut self,
        term: &Rc<Term>,
        a: &Rc<Term>,
        build: impl FnOnce(Rc<Term>) -> Term,
    ) -> Rc<Term> {
        let na = self.apply(a);
        if Rc::ptr_eq(&na, a) {
            Rc::clone(term)
        } else {
            Rc::new(build(na))
        }
    }

    /// Substitute into `body` under a binder for `var` (known to differ from the
    /// substituted name), renaming the binder if it would capture
    fn under_binder(&mut self, var: &str, body: &Rc<Term>) -> (String, Rc<Term>) {
        if !self.replacement_free.contains(var) {
            return (var.to_owned(), self.apply(body));
        }
        let mut avoid = body.free_vars();
        avoid.extend(self.replacement_free.iter().cloned());
        avoid.insert(var.to_owned());
        avoid.insert(self.name.to_owned());
        let fresh = self.rename_binder(var, &avoid);
        let renamed = rename(body, var, &fresh, self.names);
        (fresh, self.apply(&renamed))
    }

    fn rename_binder(&mut self, var: &str, avoid: &NameSet) -> String {
        let fresh = self.names.fresh(avoid);
        trace!(binder = var, fresh = %fresh, "renaming binder to avoid capture");
        fresh
    }
}

/// Rename free occurrences of `from` in `term` to the variable `to`
fn rename(term: &Rc<Term>, from: &str, to: &str, names: &mut FreshNames) -> Rc<Term> {
    substitute(term, from, &Rc::new(Term::Var(to.to_owned())), names)
}
