use crate::Error;
use crate::MAX_STEPS;
use crate::ast::{MIN_STACK_RED_ZONE, NumberType, STACK_GROWTH_SIZE, Term, values_equal};
use crate::subst::{FreshNames, substitute};
use std::rc::Rc;
use tracing::{debug, debug_span, trace, warn};

/// Final term of an evaluation together with the number of reductions it took
#[derive(Debug, Clone, PartialEq)]
pub struct EvalResult {
    /// Value or stuck term the evaluation ended on
    pub term: Term,
    /// Number of single steps performed
    pub steps: usize,
}

/// Evaluation context: owns the fresh-name generator used for capture-avoiding
/// renames and the step budget of the driver loop
///
/// Independent evaluators never share names or budgets, so several can run side
/// by side in one process.
#[derive(Debug, Clone)]
pub struct Evaluator {
    names: FreshNames,
    max_steps: usize,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    /// Evaluator with the default budget of [`MAX_STEPS`] reductions
    pub fn new() -> Self {
        Self::with_max_steps(MAX_STEPS)
    }

    pub fn with_max_steps(max_steps: usize) -> Self {
        Evaluator {
            names: FreshNames::new(),
            max_steps,
        }
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Perform exactly one reduction
    ///
    /// Returns `None` when `term` is a value or stuck, otherwise the reduct. The
    /// leftmost-outermost redex is reduced first; lambda bodies and the argument of
    /// a beta-redex are left untouched.
    pub fn step(&mut self, term: &Rc<Term>) -> Option<Rc<Term>> {
        stacker::maybe_grow(MIN_STACK_RED_ZONE, STACK_GROWTH_SIZE, || self.step_impl(term))
    }

    /// Implementation (called via stacker::maybe_grow)
    fn step_impl(&mut self, term: &Rc<Term>) -> Option<Rc<Term>> {
        match term.as_ref() {
            // Irreducible on their own; no reduction under an unapplied lambda
            Term::Var(_) | Term::Num(_) | Term::Nil | Term::Lam(..) => None,

            Term::App(func, arg) => {
                if let Term::Lam(param, body) = func.as_ref() {
                    // Call-by-name: the argument goes in unevaluated
                    return Some(substitute(body, param, arg, &mut self.names));
                }
                if let Some(func) = self.step(func) {
                    return Some(Rc::new(Term::App(func, Rc::clone(arg))));
                }
                self.step(arg)
                    .map(|arg| Rc::new(Term::App(Rc::clone(func), arg)))
            }

            // Lists are forced: head first, then tail
            Term::Cons(head, tail) => self.step_left_right(head, tail, Term::Cons),

            Term::Plus(l, r) => self.step_arithmetic(l, r, Term::Plus, |a, b| a + b),
            Term::Minus(l, r) => self.step_arithmetic(l, r, Term::Minus, |a, b| a - b),
            Term::Times(l, r) => self.step_arithmetic(l, r, Term::Times, |a, b| a * b),
            Term::Neg(x) => {
                if let Some(x) = self.step(x) {
                    return Some(Rc::new(Term::Neg(x)));
                }
                x.as_number().map(|n| Rc::new(Term::Num(-n)))
            }

            Term::If(cond, then, else_) => {
                if let Some(cond) = self.step(cond) {
                    return Some(Rc::new(Term::If(cond, Rc::clone(then), Rc::clone(else_))));
                }
                // Only 1 and 0 select a branch; anything else is stuck
                match cond.as_number() {
                    Some(n) if n == 1.0 => Some(Rc::clone(then)),
                    Some(n) if n == 0.0 => Some(Rc::clone(else_)),
                    _ => None,
                }
            }

            Term::Eq(l, r) => self
                .step_left_right(l, r, Term::Eq)
                .or_else(|| Some(truth(values_equal(l, r)))),
            Term::Leq(l, r) => self.step_left_right(l, r, Term::Leq).or_else(|| {
                match (l.as_number(), r.as_number()) {
                    (Some(a), Some(b)) => Some(truth(a <= b)),
                    _ => None,
                }
            }),

            // let v = e in b  -->  (\v.b) e
            Term::Let(var, value, body) => Some(Rc::new(Term::App(
                Rc::new(Term::Lam(var.clone(), Rc::clone(body))),
                Rc::clone(value),
            ))),
            // letrec v = e in b  -->  let v = fix (\v.e) in b
            Term::Letrec(var, value, body) => Some(Rc::new(Term::Let(
                var.clone(),
                Rc::new(Term::Fix(Rc::new(Term::Lam(var.clone(), Rc::clone(value))))),
                Rc::clone(body),
            ))),
            // fix F  -->  F (fix F), unfolded again only when the copy is demanded
            Term::Fix(func) => {
                if let Some(func) = self.step(func) {
                    return Some(Rc::new(Term::Fix(func)));
                }
                matches!(func.as_ref(), Term::Lam(..))
                    .then(|| Rc::new(Term::App(Rc::clone(func), Rc::clone(term))))
            }

            // Both sides are reduced to normal form
            Term::Seq(l, r) => self.step_left_right(l, r, Term::Seq),

            Term::Hd(list) => {
                if let Some(list) = self.step(list) {
                    return Some(Rc::new(Term::Hd(list)));
                }
                match list.as_ref() {
                    Term::Cons(head, _) => Some(Rc::clone(head)),
                    _ => None,
                }
            }
            Term::Tl(list) => {
                if let Some(list) = self.step(list) {
                    return Some(Rc::new(Term::Tl(list)));
                }
                match list.as_ref() {
                    Term::Cons(_, tail) => Some(Rc::clone(tail)),
                    _ => None,
                }
            }
        }
    }

    /// Step the left operand, else the right one, rebuilding the node with `build`
    fn step_left_right(
        &mut self,
        l: &Rc<Term>,
        r: &Rc<Term>,
        build: fn(Rc<Term>, Rc<Term>) -> Term,
    ) -> Option<Rc<Term>> {
        if let Some(l) = self.step(l) {
            return Some(Rc::new(build(l, Rc::clone(r))));
        }
        self.step(r).map(|r| Rc::new(build(Rc::clone(l), r)))
    }

    /// Binary arithmetic: reduce both operands, then fold two numbers with `op`
    fn step_arithmetic(
        &mut self,
        l: &Rc<Term>,
        r: &Rc<Term>,
        build: fn(Rc<Term>, Rc<Term>) -> Term,
        op: fn(NumberType, NumberType) -> NumberType,
    ) -> Option<Rc<Term>> {
        self.step_left_right(l, r, build)
            .or_else(|| match (l.as_number(), r.as_number()) {
                (Some(a), Some(b)) => Some(Rc::new(Term::Num(op(a, b)))),
                _ => None,
            })
    }

    /// Reduce `term` until no step applies or the budget runs out
    pub fn evaluate(&mut self, term: Term) -> Result<Term, Error> {
        self.evaluate_counted(term).map(|result| result.term)
    }

    /// Like [`Evaluator::evaluate`], also reporting how many steps were taken
    ///
    /// Fails with [`Error::NonTermination`] only if the term is still reducible
    /// after `max_steps` reductions; a term that reaches normal form on exactly the
    /// last permitted step succeeds.
    pub fn evaluate_counted(&mut self, term: Term) -> Result<EvalResult, Error> {
        let _span = debug_span!("evaluate", max_steps = self.max_steps).entered();

        let mut current = Rc::new(term);
        let mut steps: usize = 0;

        while let Some(next) = self.step(&current) {
            if steps == self.max_steps {
                warn!(steps, "step budget exhausted, giving up");
                return Err(Error::NonTermination { steps });
            }
            steps += 1;
            current = next;
            trace!(step = steps, term = %current, "reduced");
        }

        debug!(steps, "evaluation finished");
        Ok(EvalResult {
            term: Rc::try_unwrap(current).unwrap_or_else(|shared| shared.as_ref().clone()),
            steps,
        })
    }
}

/// Boolean result of a comparison as a number term
fn truth(b: bool) -> Rc<Term> {
    Rc::new(Term::Num(if b { 1.0 } else { 0.0 }))
}

/// Evaluate a term with a fresh [`Evaluator`] and the default step budget
pub fn evaluate(term: Term) -> Result<Term, Error> {
    Evaluator::new().evaluate(term)
}
