//! This module defines the term type shared by the parser, the reducer and the
//! pretty-printer. A [`Term`] is both program syntax and run-time value: evaluation
//! rewrites one term into the next, and whatever term is left when no rewrite
//! applies is the result.
//!
//! Terms are immutable. Children are held behind [`Rc`] so that rewriting a node
//! shares every untouched subtree with its predecessor instead of copying it.
//!
//! Ergonomic helper functions such as [`var`], [`lam`], [`app`] and [`num`] build
//! terms in code and tests. [`values_equal`] is the structural equality behind the
//! `==` operator, and the [`std::fmt::Display`] impl renders terms in source-like
//! notation.

use std::fmt;
use std::rc::Rc;

/// Minimum stack space to reserve before recursive calls (32 KB).
pub(crate) const MIN_STACK_RED_ZONE: usize = 32 * 1024;

/// Stack size to grow to when running low (1 MB).
pub(crate) const STACK_GROWTH_SIZE: usize = 1024 * 1024;

/// Type alias for number values in the interpreter
pub type NumberType = f64;

/// Terms of the extended lambda calculus
///
/// Derived equality is syntactic (binder names included). Use [`values_equal`] for
/// the language's own `==`.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// Variable reference
    Var(String),
    /// Abstraction: parameter and body
    Lam(String, Rc<Term>),
    /// Application: function and argument
    App(Rc<Term>, Rc<Term>),
    /// Numeric literal
    Num(NumberType),
    Plus(Rc<Term>, Rc<Term>),
    Minus(Rc<Term>, Rc<Term>),
    Times(Rc<Term>, Rc<Term>),
    /// Unary negation
    Neg(Rc<Term>),
    /// Conditional: condition, then-branch, else-branch
    If(Rc<Term>, Rc<Term>, Rc<Term>),
    /// Structural equality, yields `1` or `0`
    Eq(Rc<Term>, Rc<Term>),
    /// Numeric `<=`, yields `1` or `0`
    Leq(Rc<Term>, Rc<Term>),
    /// Non-recursive binding: name, bound value, body
    Let(String, Rc<Term>, Rc<Term>),
    /// Recursive binding: the name is in scope in both the value and the body
    Letrec(String, Rc<Term>, Rc<Term>),
    /// Fixed-point operator
    Fix(Rc<Term>),
    /// Sequencing (`l ;; r`), both sides are evaluated
    Seq(Rc<Term>, Rc<Term>),
    /// Empty list
    Nil,
    /// List cell: head and tail
    Cons(Rc<Term>, Rc<Term>),
    /// Head of a list
    Hd(Rc<Term>),
    /// Tail of a list
    Tl(Rc<Term>),
}

impl Term {
    /// Check if this term is a value: a number, `#`, a lambda, a variable, or a
    /// cons cell whose head and tail are themselves values
    pub fn is_value(&self) -> bool {
        stacker::maybe_grow(MIN_STACK_RED_ZONE, STACK_GROWTH_SIZE, || match self {
            Term::Num(_) | Term::Nil | Term::Lam(..) | Term::Var(_) => true,
            Term::Cons(head, tail) => head.is_value() && tail.is_value(),
            _ => false,
        })
    }

    /// Number payload, if this is a numeric literal
    pub fn as_number(&self) -> Option<NumberType> {
        match self {
            Term::Num(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<NumberType> for Term {
    fn from(n: NumberType) -> Self {
        Term::Num(n)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Term {
            fn from(n: $int_type) -> Self {
                Term::Num(NumberType::from(n))
            }
        }
    };
}

// All integer types that widen losslessly to f64
impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

/// Variable reference
pub fn var<S: AsRef<str>>(name: S) -> Term {
    Term::Var(name.as_ref().to_owned())
}

/// Abstraction `\param.body`
pub fn lam<S: AsRef<str>>(param: S, body: Term) -> Term {
    Term::Lam(param.as_ref().to_owned(), Rc::new(body))
}

/// Application `f a`
pub fn app(func: Term, arg: Term) -> Term {
    Term::App(Rc::new(func), Rc::new(arg))
}

/// Numeric literal from anything that converts to a number term
pub fn num<T: Into<Term>>(n: T) -> Term {
    n.into()
}

pub fn plus(l: Term, r: Term) -> Term {
    Term::Plus(Rc::new(l), Rc::new(r))
}

pub fn minus(l: Term, r: Term) -> Term {
    Term::Minus(Rc::new(l), Rc::new(r))
}

pub fn times(l: Term, r: Term) -> Term {
    Term::Times(Rc::new(l), Rc::new(r))
}

pub fn neg(x: Term) -> Term {
    Term::Neg(Rc::new(x))
}

pub fn if_(cond: Term, then: Term, else_: Term) -> Term {
    Term::If(Rc::new(cond), Rc::new(then), Rc::new(else_))
}

pub fn eq(l: Term, r: Term) -> Term {
    Term::Eq(Rc::new(l), Rc::new(r))
}

pub fn leq(l: Term, r: Term) -> Term {
    Term::Leq(Rc::new(l), Rc::new(r))
}

pub fn let_<S: AsRef<str>>(name: S, value: Term, body: Term) -> Term {
    Term::Let(name.as_ref().to_owned(), Rc::new(value), Rc::new(body))
}

pub fn letrec<S: AsRef<str>>(name: S, value: Term, body: Term) -> Term {
    Term::Letrec(name.as_ref().to_owned(), Rc::new(value), Rc::new(body))
}

pub fn fix(f: Term) -> Term {
    Term::Fix(Rc::new(f))
}

pub fn seq(l: Term, r: Term) -> Term {
    Term::Seq(Rc::new(l), Rc::new(r))
}

/// Empty list `#`
pub fn nil() -> Term {
    Term::Nil
}

pub fn cons(head: Term, tail: Term) -> Term {
    Term::Cons(Rc::new(head), Rc::new(tail))
}

pub fn hd(x: Term) -> Term {
    Term::Hd(Rc::new(x))
}

pub fn tl(x: Term) -> Term {
    Term::Tl(Rc::new(x))
}

/// Build a proper list `x1 : x2 : ... : #` from its elements
pub fn list<T: Into<Term>, I: IntoIterator<Item = T>>(items: I) -> Term
where
    I::IntoIter: DoubleEndedIterator,
{
    items
        .into_iter()
        .rev()
        .fold(Term::Nil, |tail, head| cons(head.into(), tail))
}

/// Structural equality of fully-reduced values
///
/// Numbers compare numerically, `#` equals `#`, and cons cells are equal when their
/// heads and tails are. Every other pairing, including two lambdas or two
/// variables, is unequal.
pub fn values_equal(a: &Term, b: &Term) -> bool {
    stacker::maybe_grow(MIN_STACK_RED_ZONE, STACK_GROWTH_SIZE, || match (a, b) {
        (Term::Num(x), Term::Num(y)) => x == y,
        (Term::Nil, Term::Nil) => true,
        (Term::Cons(h1, t1), Term::Cons(h2, t2)) => values_equal(h1, h2) && values_equal(t1, t2),
        _ => false,
    })
}

/// Render a number the way the language prints floats: integral values keep a
/// trailing `.0`, very large or very small magnitudes switch to exponent form.
pub(crate) fn format_number(n: NumberType) -> String {
    if n.is_nan() {
        return "nan".to_owned();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_owned();
    }

    let magnitude = n.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        // Rust writes `1e16` / `1.5e-5`; the language writes `1e+16` / `1.5e-05`
        let rendered = format!("{n:e}");
        return match rendered.split_once('e') {
            Some((mantissa, exponent)) => {
                let (sign, digits) = match exponent.strip_prefix('-') {
                    Some(digits) => ('-', digits),
                    None => ('+', exponent),
                };
                format!("{mantissa}e{sign}{digits:0>2}")
            }
            None => rendered,
        };
    }

    if n.fract() == 0.0 {
        format!("{n:.1}")
    } else {
        format!("{n}")
    }
}

impl Term {
    /// Render with the printer's parenthesization rules; `top` marks a position
    /// where infix and keyword forms need no enclosing parentheses
    fn write_linear(&self, f: &mut fmt::Formatter<'_>, top: bool) -> fmt::Result {
        stacker::maybe_grow(MIN_STACK_RED_ZONE, STACK_GROWTH_SIZE, || {
            self.write_linear_impl(f, top)
        })
    }

    fn write_linear_impl(&self, f: &mut fmt::Formatter<'_>, top: bool) -> fmt::Result {
        // Writes `body`, wrapped in parentheses unless at top level
        fn wrapped(
            f: &mut fmt::Formatter<'_>,
            top: bool,
            body: impl FnOnce(&mut fmt::Formatter<'_>) -> fmt::Result,
        ) -> fmt::Result {
            if !top {
                write!(f, "(")?;
            }
            body(f)?;
            if !top {
                write!(f, ")")?;
            }
            Ok(())
        }

        match self {
            Term::Var(name) => write!(f, "{name}"),
            Term::Num(n) => write!(f, "{}", format_number(*n)),
            Term::Nil => write!(f, "#"),
            Term::Lam(param, body) => {
                write!(f, "(\\{param}.")?;
                body.write_linear(f, false)?;
                write!(f, ")")
            }
            Term::App(func, arg) => {
                write!(f, "(")?;
                func.write_linear(f, false)?;
                write!(f, " ")?;
                arg.write_linear(f, false)?;
                write!(f, ")")
            }
            Term::Plus(l, r) | Term::Minus(l, r) | Term::Times(l, r) => {
                let op = match self {
                    Term::Plus(..) => "+",
                    Term::Minus(..) => "-",
                    _ => "*",
                };
                wrapped(f, top, |f| {
                    l.write_linear(f, false)?;
                    write!(f, " {op} ")?;
                    r.write_linear(f, false)
                })
            }
            Term::Eq(l, r) | Term::Leq(l, r) => {
                let op = if matches!(self, Term::Eq(..)) { "==" } else { "<=" };
                wrapped(f, top, |f| {
                    l.write_linear(f, false)?;
                    write!(f, " {op} ")?;
                    r.write_linear(f, false)
                })
            }
            Term::Neg(x) => {
                write!(f, "-")?;
                x.write_linear(f, false)
            }
            Term::If(cond, then, else_) => wrapped(f, top, |f| {
                write!(f, "if ")?;
                cond.write_linear(f, false)?;
                write!(f, " then ")?;
                then.write_linear(f, false)?;
                write!(f, " else ")?;
                else_.write_linear(f, false)
            }),
            Term::Let(name, value, body) | Term::Letrec(name, value, body) => {
                let keyword = if matches!(self, Term::Let(..)) { "let" } else { "letrec" };
                wrapped(f, top, |f| {
                    write!(f, "{keyword} {name} = ")?;
                    value.write_linear(f, false)?;
                    write!(f, " in ")?;
                    body.write_linear(f, false)
                })
            }
            Term::Fix(func) => wrapped(f, top, |f| {
                write!(f, "fix ")?;
                func.write_linear(f, false)
            }),
            Term::Seq(l, r) => {
                l.write_linear(f, true)?;
                write!(f, " ;; ")?;
                r.write_linear(f, true)
            }
            Term::Cons(head, tail) => {
                write!(f, "(")?;
                head.write_linear(f, false)?;
                write!(f, " : ")?;
                tail.write_linear(f, false)?;
                write!(f, ")")
            }
            Term::Hd(x) => {
                write!(f, "(hd ")?;
                x.write_linear(f, false)?;
                write!(f, ")")
            }
            Term::Tl(x) => {
                write!(f, "(tl ")?;
                x.write_linear(f, false)?;
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_linear(f, true)
    }
}

impl Term {
    fn is_leaf(&self) -> bool {
        matches!(self, Term::Var(_) | Term::Num(_) | Term::Nil)
    }

    /// Mutable references to the direct children, in order
    fn child_slots(&mut self) -> [Option<&mut Rc<Term>>; 3] {
        match self {
            Term::Var(_) | Term::Num(_) | Term::Nil => [None, None, None],
            Term::Lam(_, a) | Term::Neg(a) | Term::Fix(a) | Term::Hd(a) | Term::Tl(a) => {
                [Some(a), None, None]
            }
            Term::App(a, b)
            | Term::Plus(a, b)
            | Term::Minus(a, b)
            | Term::Times(a, b)
            | Term::Eq(a, b)
            | Term::Leq(a, b)
            | Term::Seq(a, b)
            | Term::Cons(a, b)
            | Term::Let(_, a, b)
            | Term::Letrec(_, a, b) => [Some(a), Some(b), None],
            Term::If(a, b, c) => [Some(a), Some(b), Some(c)],
        }
    }
}

/// Iterative destructor: the derived one recurses once per level and overflows on
/// long lists or deep nesting
impl Drop for Term {
    fn drop(&mut self) {
        let owns_subtree = |slot: &Option<&mut Rc<Term>>| {
            matches!(slot, Some(child) if Rc::strong_count(&**child) == 1 && !child.is_leaf())
        };
        // Shallow nodes, and nodes whose children are shared, drop normally
        if !self.child_slots().iter().any(owns_subtree) {
            return;
        }

        let placeholder = Rc::new(Term::Nil);
        let mut pending: Vec<Rc<Term>> = Vec::new();
        let detach = |node: &mut Term, pending: &mut Vec<Rc<Term>>| {
            for child in node.child_slots().into_iter().flatten() {
                pending.push(std::mem::replace(child, Rc::clone(&placeholder)));
            }
        };

        detach(self, &mut pending);
        while let Some(child) = pending.pop() {
            // Shared children only lose a reference; unique ones are taken apart here
            if let Ok(mut node) = Rc::try_unwrap(child) {
                detach(&mut node, &mut pending);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_functions_data_driven() {
        let test_cases = vec![
            (var("x"), Term::Var("x".to_owned())),
            (num(5), Term::Num(5.0)),
            (num(-3i8), Term::Num(-3.0)),
            (num(2.5), Term::Num(2.5)),
            (nil(), Term::Nil),
            (
                lam("x", var("x")),
                Term::Lam("x".to_owned(), Rc::new(Term::Var("x".to_owned()))),
            ),
            (
                app(var("f"), num(1)),
                Term::App(Rc::new(Term::Var("f".to_owned())), Rc::new(Term::Num(1.0))),
            ),
            (list([1, 2]), cons(num(1), cons(num(2), nil()))),
            (list(Vec::<Term>::new()), nil()),
        ];

        for (i, (actual, expected)) in test_cases.iter().enumerate() {
            assert_eq!(actual, expected, "Test case #{} failed", i + 1);
        }
    }

    #[test]
    fn test_is_value() {
        let test_cases = vec![
            (num(1), true),
            (nil(), true),
            (var("x"), true),
            (lam("x", app(var("x"), var("x"))), true),
            (list([1, 2, 3]), true),
            (cons(var("a"), lam("y", var("y"))), true),
            (cons(plus(num(1), num(2)), nil()), false),
            (cons(num(1), hd(nil())), false),
            (app(var("f"), num(1)), false),
            (plus(num(1), num(2)), false),
            (hd(var("a")), false),
            (fix(lam("f", var("f"))), false),
        ];

        for (i, (term, expected)) in test_cases.iter().enumerate() {
            assert_eq!(term.is_value(), *expected, "#{}: is_value({term})", i + 1);
        }
    }

    #[test]
    fn test_values_equal() {
        let test_cases = vec![
            (num(1), num(1), true),
            (num(1), num(2), false),
            (num(0.0), num(-0.0), true),
            (nil(), nil(), true),
            (list([1, 2, 3]), list([1, 2, 3]), true),
            (list([1, 2, 3]), list([1, 2, 4]), false),
            (list([1, 2]), list([1, 2, 3]), false),
            (list([1, 2, 3]), list([1, 2]), false),
            (cons(num(1), num(2)), cons(num(1), num(2)), true),
            (list([1]), num(1), false),
            (nil(), num(0), false),
            // Non-data values never compare equal, not even to themselves
            (lam("x", var("x")), lam("x", var("x")), false),
            (var("x"), var("x"), false),
            (cons(var("x"), nil()), cons(var("x"), nil()), false),
        ];

        for (i, (a, b, expected)) in test_cases.iter().enumerate() {
            assert_eq!(values_equal(a, b), *expected, "#{}: {a} == {b}", i + 1);
            assert_eq!(values_equal(b, a), *expected, "#{}: {b} == {a}", i + 1);
        }
    }

    #[test]
    fn test_format_number() {
        let test_cases = vec![
            (5.0, "5.0"),
            (-12.0, "-12.0"),
            (0.0, "0.0"),
            (-0.0, "-0.0"),
            (0.5, "0.5"),
            (3.25, "3.25"),
            (1e16, "1e+16"),
            (1.5e-5, "1.5e-05"),
            (-2.5e20, "-2.5e+20"),
            (123456789.0, "123456789.0"),
            (NumberType::INFINITY, "inf"),
            (NumberType::NEG_INFINITY, "-inf"),
        ];

        for (n, expected) in test_cases {
            assert_eq!(format_number(n), expected, "format_number({n:?})");
        }
    }

    #[test]
    fn test_display_data_driven() {
        let test_cases = vec![
            (var("x"), "x"),
            (num(3), "3.0"),
            (nil(), "#"),
            (lam("x", var("y")), "(\\x.y)"),
            (app(var("x"), var("y")), "(x y)"),
            (app(app(var("x"), var("y")), var("z")), "((x y) z)"),
            (app(var("x"), app(var("y"), var("z"))), "(x (y z))"),
            (plus(var("a"), num(1)), "a + 1.0"),
            (times(plus(var("a"), num(1)), num(2)), "(a + 1.0) * 2.0"),
            (lam("x", plus(var("x"), num(1))), "(\\x.(x + 1.0))"),
            (neg(var("a")), "-a"),
            (leq(var("a"), num(1)), "a <= 1.0"),
            (eq(var("a"), num(1)), "a == 1.0"),
            (
                if_(var("c"), num(1), num(2)),
                "if c then 1.0 else 2.0",
            ),
            (
                app(if_(var("c"), num(1), num(2)), num(3)),
                "((if c then 1.0 else 2.0) 3.0)",
            ),
            (let_("x", num(1), var("x")), "let x = 1.0 in x"),
            (letrec("f", var("f"), var("f")), "letrec f = f in f"),
            (fix(var("g")), "fix g"),
            (list([1, 2, 3]), "(1.0 : (2.0 : (3.0 : #)))"),
            (cons(num(1), num(2)), "(1.0 : 2.0)"),
            (hd(var("a")), "(hd a)"),
            (tl(var("a")), "(tl a)"),
            (seq(num(1), seq(num(2), num(3))), "1.0 ;; 2.0 ;; 3.0"),
            (
                seq(cons(num(1), num(2)), list([1, 2])),
                "(1.0 : 2.0) ;; (1.0 : (2.0 : #))",
            ),
        ];

        for (i, (term, expected)) in test_cases.iter().enumerate() {
            assert_eq!(term.to_string(), *expected, "Display test #{}", i + 1);
        }
    }

    #[test]
    fn test_dropping_deep_terms() {
        // Each of these is far deeper than the native stack can recurse through
        drop(list(vec![1; 200_000]));

        let mut negs = var("x");
        for _ in 0..200_000 {
            negs = neg(negs);
        }
        drop(negs);

        let mut apps = num(0);
        for i in 0..200_000 {
            apps = app(apps, num(i));
        }
        drop(apps);
    }

    #[test]
    fn test_drop_keeps_shared_subterms() {
        let shared = Rc::new(list([1, 2, 3]));
        let outer = Term::Cons(Rc::new(num(0)), Rc::clone(&shared));
        let pair = Term::Seq(Rc::new(outer), Rc::new(list([4, 5])));
        drop(pair);

        assert_eq!(Rc::strong_count(&shared), 1);
        assert_eq!(shared.to_string(), "(1.0 : (2.0 : (3.0 : #)))");
    }
}
