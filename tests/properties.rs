//! Property tests over randomly generated terms

use lambdaxp::ast::*;
use lambdaxp::subst::{FreshNames, NameSet, substitute};
use lambdaxp::{Evaluator, Term};
use proptest::prelude::*;
use std::rc::Rc;

// `Var1` collides with the first generated name, so renames must skip it
fn name_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["x", "y", "z", "Var1"])
}

fn leaf_strategy() -> BoxedStrategy<Term> {
    prop_oneof![
        name_strategy().prop_map(var),
        (0..4i32).prop_map(num),
        Just(nil()),
    ]
    .boxed()
}

// Strategy for generating arbitrary terms (depth-limited)
fn term_strategy(depth: u32) -> BoxedStrategy<Term> {
    if depth == 0 {
        return leaf_strategy();
    }
    let inner = term_strategy(depth - 1);
    let sub = || inner.clone();

    let binders = prop_oneof![
        (name_strategy(), sub()).prop_map(|(x, body)| lam(x, body)),
        (name_strategy(), sub(), sub()).prop_map(|(x, v, b)| let_(x, v, b)),
        (name_strategy(), sub(), sub()).prop_map(|(x, v, b)| letrec(x, v, b)),
        sub().prop_map(fix),
    ];
    let operators = prop_oneof![
        (sub(), sub()).prop_map(|(f, a)| app(f, a)),
        (sub(), sub()).prop_map(|(l, r)| plus(l, r)),
        (sub(), sub()).prop_map(|(l, r)| minus(l, r)),
        (sub(), sub()).prop_map(|(l, r)| times(l, r)),
        sub().prop_map(neg),
        (sub(), sub(), sub()).prop_map(|(c, t, e)| if_(c, t, e)),
        (sub(), sub()).prop_map(|(l, r)| eq(l, r)),
        (sub(), sub()).prop_map(|(l, r)| leq(l, r)),
    ];
    let lists = prop_oneof![
        (sub(), sub()).prop_map(|(h, t)| cons(h, t)),
        sub().prop_map(hd),
        sub().prop_map(tl),
        (sub(), sub()).prop_map(|(l, r)| seq(l, r)),
    ];

    prop_oneof![
        2 => leaf_strategy(),
        2 => binders,
        3 => operators,
        2 => lists,
    ]
    .boxed()
}

// Strategy for generating values: these must never step
fn value_strategy(depth: u32) -> BoxedStrategy<Term> {
    if depth == 0 {
        return leaf_strategy();
    }
    prop_oneof![
        leaf_strategy(),
        (name_strategy(), term_strategy(depth - 1)).prop_map(|(x, body)| lam(x, body)),
        (value_strategy(depth - 1), value_strategy(depth - 1)).prop_map(|(h, t)| cons(h, t)),
    ]
    .boxed()
}

/// Free variables a substitution result must have
fn expected_free_vars(term: &Term, name: &str, replacement: &Term) -> NameSet {
    let mut expected = term.free_vars();
    if expected.remove(name) {
        expected.extend(replacement.free_vars());
    }
    expected
}

proptest! {
    /// No free variable of the replacement is captured and nothing else changes
    /// freeness: FV(t[r/x]) = FV(t) - {x}, plus FV(r) when x occurred free
    #[test]
    fn prop_substitution_avoids_capture(
        term in term_strategy(3),
        name in name_strategy(),
        replacement in term_strategy(2),
    ) {
        let mut names = FreshNames::new();
        let result = substitute(&Rc::new(term.clone()), name, &Rc::new(replacement.clone()), &mut names);
        prop_assert_eq!(result.free_vars(), expected_free_vars(&term, name, &replacement),
            "substituting {} for {} in {}", replacement, name, term);
    }

    /// A closed replacement for a name that does not occur changes nothing,
    /// down to sharing the input node
    #[test]
    fn prop_substitution_of_absent_name_is_identity(term in term_strategy(3), n in 0..4i32) {
        let term = Rc::new(term);
        let mut names = FreshNames::new();
        let result = substitute(&term, "absent", &Rc::new(num(n)), &mut names);
        prop_assert!(Rc::ptr_eq(&result, &term));
        prop_assert_eq!(names.issued(), 0);
    }

    /// Values are normal forms
    #[test]
    fn prop_values_do_not_step(value in value_strategy(3)) {
        prop_assert!(value.is_value());
        let mut evaluator = Evaluator::new();
        prop_assert_eq!(evaluator.step(&Rc::new(value.clone())), None,
            "value {} reduced", value);
    }

    /// A beta-redex steps to exactly the substitution of its argument
    #[test]
    fn prop_beta_step_is_substitution(
        name in name_strategy(),
        body in term_strategy(3),
        arg in term_strategy(2),
    ) {
        let body = Rc::new(body);
        let arg = Rc::new(arg);
        let redex = Rc::new(Term::Lam(name.to_owned(), Rc::clone(&body)));
        let redex = Rc::new(Term::App(redex, Rc::clone(&arg)));

        let stepped = Evaluator::new().step(&redex);
        let expected = substitute(&body, name, &arg, &mut FreshNames::new());
        prop_assert_eq!(stepped, Some(expected));
    }

    /// fix (\x.b) unfolds to (\x.b) (fix (\x.b))
    #[test]
    fn prop_fix_unfolds_once(name in name_strategy(), body in term_strategy(3)) {
        let func = lam(name, body);
        let stepped = Evaluator::new().step(&Rc::new(fix(func.clone())));
        prop_assert_eq!(stepped.as_deref(), Some(&app(func.clone(), fix(func))));
    }

    /// Evaluating a result again changes nothing
    #[test]
    fn prop_evaluate_is_idempotent(term in term_strategy(3)) {
        let mut evaluator = Evaluator::with_max_steps(500);
        if let Ok(once) = evaluator.evaluate(term) {
            let again = evaluator.evaluate_counted(once.clone());
            prop_assert_eq!(again.map(|r| (r.term, r.steps)), Ok((once, 0)));
        }
    }
}
