use std::{
    cell::RefCell,
    collections::HashSet,
    fmt::{self, Display},
    iter::Sum,
    ops::{Add, Div, Mul, Neg, Sub},
    rc::Rc,
};

use log::trace;

use crate::error::GradError;

/// Negative-side slope of [`LeakyRelu`].
const LEAKY_SLOPE: f64 = 0.01;

/// The operation that produced a node, together with handles to its
/// operands. Each variant's match arm in `step_grad` is the local backward
/// rule for that operation.
#[derive(Clone, Debug)]
enum Op {
    Add { lhs: Value, rhs: Value },
    Neg { input: Value },
    Sub { lhs: Value, rhs: Value },
    Mul { lhs: Value, rhs: Value },
    Div { lhs: Value, rhs: Value },
    Tanh { input: Value },
    Relu { input: Value },
    Sigmoid { input: Value },
    LeakyRelu { input: Value },
    Exp { input: Value },
    /// Constant exponent; no gradient flows into `exp`.
    Powf { base: Value, exp: f64 },
    /// Node exponent; both operands receive gradient.
    Pow { base: Value, exp: Value },
}

impl Op {
    fn inputs(&self) -> impl Iterator<Item = &Value> {
        match self {
            Op::Add { lhs, rhs }
            | Op::Sub { lhs, rhs }
            | Op::Mul { lhs, rhs }
            | Op::Div { lhs, rhs }
            | Op::Pow {
                base: lhs,
                exp: rhs,
            } => vec![lhs, rhs].into_iter(),
            Op::Tanh { input }
            | Op::Relu { input }
            | Op::Sigmoid { input }
            | Op::LeakyRelu { input }
            | Op::Exp { input }
            | Op::Neg { input }
            | Op::Powf { base: input, .. } => vec![input].into_iter(),
        }
    }
}

impl Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Add { .. } => write!(f, "+"),
            Op::Neg { .. } => write!(f, "-"),
            Op::Sub { .. } => write!(f, "-"),
            Op::Mul { .. } => write!(f, "*"),
            Op::Div { .. } => write!(f, "/"),
            Op::Tanh { .. } => write!(f, "tanh"),
            Op::Relu { .. } => write!(f, "relu"),
            Op::Sigmoid { .. } => write!(f, "sigmoid"),
            Op::LeakyRelu { .. } => write!(f, "leaky_relu"),
            Op::Exp { .. } => write!(f, "exp"),
            Op::Powf { .. } | Op::Pow { .. } => write!(f, "^"),
        }
    }
}

#[derive(Debug)]
struct ValueInner {
    op: Option<Op>,
    data: f64,
    /// gradient relative to the first caller of `backward()`
    grad: f64,
}

/// A scalar node in a dynamically built computation graph.
///
/// Cloning a `Value` clones the handle, not the node: both handles refer to
/// the same graph position, which is what lets one node feed several
/// downstream operations (the graph is a DAG, not a tree).
///
/// `grad` accumulates additively across backward passes. Callers must reset
/// it (via [`Value::set_grad`] or an optimizer's `zero_grad`) before reusing
/// a node in a new backward pass, or stale gradients silently leak into the
/// next one.
#[derive(Clone, Debug)]
pub struct Value {
    /// allows a `Value` to be shared and mutated across multiple owners,
    /// essentially allowing construction of a DAG computation graph (a
    /// `Value` may contribute to more than 1 output).
    inner: Rc<RefCell<ValueInner>>,
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Value {}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // hash the pointer address instead of the inner mutating contents:
        // two nodes may share numeric value but be distinct graph positions
        Rc::as_ptr(&self.inner).hash(state);
    }
}

impl Value {
    /// Creates a leaf node with zero gradient and no producing operation.
    pub fn new(data: f64) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ValueInner {
                data,
                op: None,
                grad: 0.0,
            })),
        }
    }

    pub fn data(&self) -> f64 {
        self.inner.borrow().data
    }

    /// Adds `val` to the node's data. Meant for optimizer updates on
    /// leaf/parameter nodes; graph-construction operations never mutate an
    /// existing node's data.
    pub fn increase_data(&self, val: f64) {
        self.inner.borrow_mut().data += val;
    }

    pub fn grad(&self) -> f64 {
        self.inner.borrow().grad
    }

    fn op(&self) -> Option<Op> {
        self.inner.borrow().op.clone()
    }

    fn set_op(&self, op: Option<Op>) {
        self.inner.borrow_mut().op = op;
    }

    pub fn set_grad(&self, val: f64) {
        self.inner.borrow_mut().grad = val;
    }

    fn increase_grad(&self, val: f64) {
        self.inner.borrow_mut().grad += val;
    }

    /// Pushes this node's gradient into its operands per the local
    /// derivative of the producing operation. No-op for leaves.
    fn step_grad(&self) {
        // assume self.grad has been initialized
        if let Some(op) = &self.op() {
            match op {
                Op::Add { lhs, rhs } => {
                    // 1.0 is local gradient, times with self.grad() for chain rule
                    lhs.increase_grad(1.0 * self.grad());
                    rhs.increase_grad(1.0 * self.grad());
                }
                Op::Neg { input } => {
                    input.increase_grad(-1.0 * self.grad());
                }
                Op::Sub { lhs, rhs } => {
                    lhs.increase_grad(1.0 * self.grad());
                    rhs.increase_grad(-1.0 * self.grad());
                }
                Op::Mul { lhs, rhs } => {
                    lhs.increase_grad(rhs.data() * self.grad());
                    rhs.increase_grad(lhs.data() * self.grad());
                }
                Op::Div { lhs, rhs } => {
                    // c = a/b
                    // dc/da = 1/b
                    // dc/db = -a/(b^2)
                    lhs.increase_grad((1.0 / rhs.data()) * self.grad());
                    rhs.increase_grad((-lhs.data() / rhs.data().powi(2)) * self.grad());
                }
                Op::Tanh { input } => {
                    // y = tanh x
                    // dy/dx = 1 - y^2
                    input.increase_grad((1.0 - self.data().powi(2)) * self.grad());
                }
                Op::Relu { input } => {
                    // y = max(0, x)
                    // dy/dx = 1 if x > 0, 0 otherwise
                    input.increase_grad((if input.data() > 0.0 { 1.0 } else { 0.0 }) * self.grad());
                }
                Op::Sigmoid { input } => {
                    // y = 1/(1 + e^-x)
                    // dy/dx = y(1 - y)
                    input.increase_grad(self.data() * (1.0 - self.data()) * self.grad());
                }
                Op::LeakyRelu { input } => {
                    input.increase_grad(
                        (if input.data() > 0.0 { 1.0 } else { LEAKY_SLOPE }) * self.grad(),
                    );
                }
                Op::Exp { input } => {
                    // y = e^x
                    // dy/dx = y
                    input.increase_grad(self.data() * self.grad());
                }
                Op::Powf { base, exp } => {
                    // y = base^k, k constant
                    // dy/dbase = k * base^(k-1)
                    base.increase_grad(exp * base.data().powf(exp - 1.0) * self.grad());
                }
                Op::Pow { base, exp } => {
                    // y = base^exp
                    // dy/dbase = exp * base^(exp-1)
                    // dy/dexp = ln(base) * y
                    base.increase_grad(
                        exp.data() * base.data().powf(exp.data() - 1.0) * self.grad(),
                    );
                    exp.increase_grad(base.data().ln() * self.data() * self.grad());
                }
            }
        }
    }

    /// Post-order over the graph reachable from `self`: every node appears
    /// after all of its operands. Uses an explicit stack so deep sequential
    /// graphs cannot overflow the call stack.
    fn topo(&self) -> Vec<Value> {
        #[allow(
            clippy::mutable_key_type,
            reason = "Using identity of Value for visited set"
        )]
        let mut visited: HashSet<Value> = HashSet::new();
        let mut order = Vec::new();
        // a frame is pushed back with children_done = true and emitted on
        // its second pop, after all of its operands
        let mut stack = vec![(self.clone(), false)];
        while let Some((node, children_done)) = stack.pop() {
            if children_done {
                order.push(node);
                continue;
            }
            if !visited.insert(node.clone()) {
                continue;
            }
            stack.push((node.clone(), true));
            if let Some(op) = node.op() {
                for input in op.inputs() {
                    if !visited.contains(input) {
                        stack.push((input.clone(), false));
                    }
                }
            }
        }
        order
    }

    /// Runs backpropagation from this node.
    ///
    /// Seeds `self.grad = 1.0`, then walks the topological order in reverse
    /// (root first, leaves last), invoking each node's backward rule exactly
    /// once. Afterwards every reachable node's `grad` holds d(self)/d(node),
    /// added on top of whatever gradient the node already carried:
    /// `backward` never resets gradients other than the seed.
    pub fn backward(&self) {
        // mark the top of the computation graph
        self.set_grad(1.0);
        // topo sort to ensure that when we compute gradient for a node, all
        // of its consumers have already pushed their contributions into it
        let order = self.topo();
        trace!("backward pass over {} nodes", order.len());
        order.iter().rev().for_each(|node| {
            node.step_grad();
        });
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn fmt_with_indent(
            value: &Value,
            f: &mut fmt::Formatter<'_>,
            indent: usize,
        ) -> fmt::Result {
            for _ in 0..indent {
                write!(f, "    ")?; // four spaces per indent level
            }

            match &value.op() {
                Some(op) => writeln!(
                    f,
                    "Value(data={:.4}, grad={:.4}, op={})",
                    value.data(),
                    value.grad(),
                    op
                )?,
                None => writeln!(
                    f,
                    "Value(data={:.4}, grad={:.4})",
                    value.data(),
                    value.grad()
                )?,
            }

            if let Some(op) = &value.op() {
                match op {
                    Op::Add { lhs, rhs }
                    | Op::Sub { lhs, rhs }
                    | Op::Mul { lhs, rhs }
                    | Op::Div { lhs, rhs }
                    | Op::Pow {
                        base: lhs,
                        exp: rhs,
                    } if lhs == rhs => {
                        fmt_with_indent(lhs, f, indent + 1)?;
                    }
                    Op::Add { lhs, rhs }
                    | Op::Sub { lhs, rhs }
                    | Op::Mul { lhs, rhs }
                    | Op::Div { lhs, rhs }
                    | Op::Pow {
                        base: lhs,
                        exp: rhs,
                    } => {
                        fmt_with_indent(lhs, f, indent + 1)?;
                        fmt_with_indent(rhs, f, indent + 1)?;
                    }
                    Op::Neg { input }
                    | Op::Tanh { input }
                    | Op::Relu { input }
                    | Op::Sigmoid { input }
                    | Op::LeakyRelu { input }
                    | Op::Exp { input }
                    | Op::Powf { base: input, .. } => {
                        fmt_with_indent(input, f, indent + 1)?;
                    }
                }
            }

            Ok(())
        }

        fmt_with_indent(self, f, 0)
    }
}

impl Add for Value {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        let res = Self::new(self.data() + rhs.data());
        res.set_op(Op::Add { lhs: self, rhs }.into());
        res
    }
}

impl Add<f64> for Value {
    type Output = Self;

    fn add(self, rhs: f64) -> Self::Output {
        self + Value::new(rhs)
    }
}

impl Add<Value> for f64 {
    type Output = Value;

    fn add(self, rhs: Value) -> Self::Output {
        Value::new(self) + rhs
    }
}

impl Sum for Value {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Value::new(0.0), |acc, x| acc + x)
    }
}

impl Neg for Value {
    type Output = Self;

    fn neg(self) -> Self::Output {
        let res = Self::new(-self.data());
        res.set_op(Op::Neg { input: self }.into());
        res
    }
}

impl Sub for Value {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        let res = Self::new(self.data() - rhs.data());
        res.set_op(Op::Sub { lhs: self, rhs }.into());
        res
    }
}

impl Sub<f64> for Value {
    type Output = Self;

    fn sub(self, rhs: f64) -> Self::Output {
        self - Value::new(rhs)
    }
}

impl Sub<Value> for f64 {
    type Output = Value;

    fn sub(self, rhs: Value) -> Self::Output {
        Value::new(self) - rhs
    }
}

impl Mul for Value {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        let res = Self::new(self.data() * rhs.data());
        res.set_op(Op::Mul { lhs: self, rhs }.into());
        res
    }
}

impl Mul<f64> for Value {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        self * Value::new(rhs)
    }
}

impl Mul<Value> for f64 {
    type Output = Value;

    fn mul(self, rhs: Value) -> Self::Output {
        Value::new(self) * rhs
    }
}

impl Div for Value {
    type Output = Self;

    fn div(self, rhs: Self) -> Self::Output {
        // division by a zero-valued node is not guarded: it yields inf/NaN
        // per native float semantics
        let res = Self::new(self.data() / rhs.data());
        res.set_op(Op::Div { lhs: self, rhs }.into());
        res
    }
}

impl Div<f64> for Value {
    type Output = Self;

    fn div(self, rhs: f64) -> Self::Output {
        self / Value::new(rhs)
    }
}

impl Div<Value> for f64 {
    type Output = Value;

    fn div(self, rhs: Value) -> Self::Output {
        Value::new(self) / rhs
    }
}

pub trait Tanh {
    fn tanh(self) -> Self;
}

impl Tanh for Value {
    fn tanh(self) -> Self {
        let res = Self::new(self.data().tanh());
        res.set_op(Op::Tanh { input: self }.into());
        res
    }
}

pub trait Relu {
    fn relu(self) -> Self;
}

impl Relu for Value {
    fn relu(self) -> Self {
        let res = Self::new(self.data().max(0.0));
        res.set_op(Op::Relu { input: self }.into());
        res
    }
}

pub trait Sigmoid {
    fn sigmoid(self) -> Self;
}

impl Sigmoid for Value {
    fn sigmoid(self) -> Self {
        let res = Self::new(1.0 / (1.0 + (-self.data()).exp()));
        res.set_op(Op::Sigmoid { input: self }.into());
        res
    }
}

pub trait LeakyRelu {
    fn leaky_relu(self) -> Self;
}

impl LeakyRelu for Value {
    fn leaky_relu(self) -> Self {
        let data = self.data();
        let res = Self::new(if data > 0.0 { data } else { LEAKY_SLOPE * data });
        res.set_op(Op::LeakyRelu { input: self }.into());
        res
    }
}

pub trait Exp {
    type Output;

    fn exp(self) -> Self::Output;
}

impl Exp for Value {
    type Output = Value;

    fn exp(self) -> Self::Output {
        let res = Self::new(self.data().exp());
        res.set_op(Op::Exp { input: self }.into());
        res
    }
}

/// Raise to a constant exponent.
pub trait Powf {
    type Output;

    fn powf(self, exp: f64) -> Self::Output;
}

impl Powf for Value {
    type Output = Result<Value, GradError>;

    /// Fails when the base/exponent pair has no real result: negative base
    /// with a non-integer exponent, or zero base with a non-positive
    /// exponent. A negative base with an integer exponent is fine.
    fn powf(self, exp: f64) -> Self::Output {
        let base = self.data();
        if base < 0.0 && exp.fract() != 0.0 {
            return Err(GradError::NegativeBaseNonIntegerExponent { base, exp });
        }
        if base == 0.0 && exp <= 0.0 {
            return Err(GradError::ZeroBaseNonPositiveExponent { exp });
        }
        let res = Self::new(base.powf(exp));
        res.set_op(Op::Powf { base: self, exp }.into());
        Ok(res)
    }
}

/// Raise to a node-valued exponent; gradient flows into both operands.
pub trait Pow<Rhs = Self> {
    type Output;

    fn pow(self, exp: Rhs) -> Self::Output;
}

impl Pow for Value {
    type Output = Result<Value, GradError>;

    /// Requires a non-negative base, since the exponent gradient needs
    /// `ln(base)`.
    fn pow(self, exp: Value) -> Self::Output {
        let base = self.data();
        if base < 0.0 {
            return Err(GradError::NegativeBaseNodeExponent { base });
        }
        let res = Self::new(base.powf(exp.data()));
        res.set_op(Op::Pow { base: self, exp }.into());
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backward_single_add() {
        let a = Value::new(2.0);
        let b = Value::new(3.0);
        let c = a.clone() + b.clone();
        c.backward();

        assert_eq!(c.grad(), 1.0);
        assert_eq!(a.grad(), 1.0);
        assert_eq!(b.grad(), 1.0);
    }

    #[test]
    fn test_backward_single_neg() {
        let a = Value::new(5.0);
        let b = -a.clone();
        b.backward();

        assert_eq!(b.data(), -5.0);
        assert_eq!(b.grad(), 1.0);
        assert_eq!(a.grad(), -1.0);
    }

    #[test]
    fn test_backward_single_sub() {
        let a = Value::new(2.0);
        let b = Value::new(3.0);
        let c = a.clone() - b.clone();
        c.backward();

        assert_eq!(c.grad(), 1.0);
        assert_eq!(a.grad(), 1.0);
        assert_eq!(b.grad(), -1.0);
    }

    #[test]
    fn test_backward_single_exp() {
        let a = Value::new(2.0);
        let b = a.clone().exp();
        b.backward();

        let tol = 1e-12;
        assert!((b.data() - 2.0_f64.exp()).abs() < tol);
        assert_eq!(b.grad(), 1.0);
        assert!((a.grad() - 2.0_f64.exp()).abs() < tol); // d/dx(e^x) = e^x
    }

    #[test]
    fn test_backward_single_mul() {
        let a = Value::new(2.0);
        let b = Value::new(3.0);
        let c = a.clone() * b.clone();
        c.backward();

        assert_eq!(c.grad(), 1.0);
        assert_eq!(a.grad(), 3.0);
        assert_eq!(b.grad(), 2.0);
    }

    #[test]
    fn test_backward_single_square() {
        let a = Value::new(3.0);
        let b = a.clone().powf(2.0).unwrap();
        b.backward();

        assert_eq!(b.data(), 9.0);
        assert_eq!(b.grad(), 1.0);
        assert_eq!(a.grad(), 6.0);
    }

    #[test]
    fn test_square_negative_base() {
        let a = Value::new(-2.0);
        let b = a.clone().powf(2.0).unwrap();
        b.backward();

        assert_eq!(b.data(), 4.0);
        assert_eq!(a.grad(), -4.0);
    }

    #[test]
    fn test_powf_negative_base_fractional_exponent() {
        let a = Value::new(-2.0);
        assert_eq!(
            a.powf(0.5),
            Err(GradError::NegativeBaseNonIntegerExponent {
                base: -2.0,
                exp: 0.5
            })
        );
    }

    #[test]
    fn test_powf_zero_base_negative_exponent() {
        let a = Value::new(0.0);
        assert_eq!(
            a.powf(-1.0),
            Err(GradError::ZeroBaseNonPositiveExponent { exp: -1.0 })
        );
    }

    #[test]
    fn test_pow_node_exponent() {
        let a = Value::new(2.0);
        let b = Value::new(3.0);
        let c = a.clone().pow(b.clone()).unwrap();
        c.backward();

        let tol = 1e-12;
        assert_eq!(c.data(), 8.0);
        // dc/da = b * a^(b-1) = 3 * 4 = 12
        assert!((a.grad() - 12.0).abs() < tol);
        // dc/db = ln(a) * c = ln(2) * 8
        assert!((b.grad() - 2.0_f64.ln() * 8.0).abs() < tol);
    }

    #[test]
    fn test_pow_node_exponent_negative_base() {
        let a = Value::new(-2.0);
        let b = Value::new(3.0);
        assert_eq!(
            a.pow(b),
            Err(GradError::NegativeBaseNodeExponent { base: -2.0 })
        );
    }

    #[test]
    fn test_div_by_zero_is_unguarded() {
        let a = Value::new(1.0);
        let b = Value::new(0.0);
        let c = a / b;

        assert!(c.data().is_infinite());
    }

    #[test]
    fn test_chain_rule_computation() {
        // ((a * b) + c) * d
        let a = Value::new(1.0);
        let b = Value::new(2.0);
        let c = Value::new(3.0);
        let d = Value::new(4.0);

        let ab = a.clone() * b.clone(); // 2
        let abc = ab.clone() + c.clone(); // 5
        let result = abc.clone() * d.clone(); // 20
        result.backward();

        assert_eq!(result.data(), 20.0);
        assert_eq!(result.grad(), 1.0);
        assert_eq!(abc.grad(), 4.0);
        assert_eq!(d.grad(), 5.0);
        assert_eq!(ab.grad(), 4.0);
        assert_eq!(c.grad(), 4.0);
        assert_eq!(a.grad(), 8.0); // chain rule: 4 * b
        assert_eq!(b.grad(), 4.0); // chain rule: 4 * a
    }

    #[test]
    fn test_chain_rule_matches_finite_difference() {
        // y = tanh(a*b + c), gradients checked against a central difference
        let f = |a: f64, b: f64, c: f64| (a * b + c).tanh();
        let samples = [(0.5, -1.2, 0.3), (1.0, 2.0, -0.5), (-0.7, 0.4, 1.1)];
        let h = 1e-5;
        let tol = 1e-5;

        for (av, bv, cv) in samples {
            let a = Value::new(av);
            let b = Value::new(bv);
            let c = Value::new(cv);
            let y = (a.clone() * b.clone() + c.clone()).tanh();
            y.backward();

            let da = (f(av + h, bv, cv) - f(av - h, bv, cv)) / (2.0 * h);
            let db = (f(av, bv + h, cv) - f(av, bv - h, cv)) / (2.0 * h);
            let dc = (f(av, bv, cv + h) - f(av, bv, cv - h)) / (2.0 * h);

            assert!((a.grad() - da).abs() < tol);
            assert!((b.grad() - db).abs() < tol);
            assert!((c.grad() - dc).abs() < tol);
        }
    }

    #[test]
    fn test_multiple_operations() {
        // a + b * c
        let a = Value::new(1.0);
        let b = Value::new(2.0);
        let c = Value::new(3.0);

        let bc = b.clone() * c.clone(); // 6
        let result = a.clone() + bc.clone(); // 7
        result.backward();

        assert_eq!(result.data(), 7.0);
        assert_eq!(result.grad(), 1.0);
        assert_eq!(a.grad(), 1.0);
        assert_eq!(bc.grad(), 1.0);
        assert_eq!(b.grad(), 3.0);
        assert_eq!(c.grad(), 2.0);
    }

    #[test]
    fn test_square_chain_rule() {
        let a = Value::new(2.0);
        let b = Value::new(3.0);
        let ab = a.clone() * b.clone(); // 6
        let result = ab.clone().powf(2.0).unwrap(); // 36
        result.backward();

        assert_eq!(result.data(), 36.0);
        assert_eq!(ab.grad(), 12.0); // 2 * 6 = 12
        assert_eq!(a.grad(), 36.0); // 12 * 3 = 36
        assert_eq!(b.grad(), 24.0); // 12 * 2 = 24
    }

    #[test]
    fn test_shared_node() {
        let a = Value::new(3.0);
        let b = a.clone() + a.clone();
        b.backward();

        assert_eq!(a.grad(), 2.0);
    }

    #[test]
    fn test_shared_node_complex() {
        let a = Value::new(-2.0);
        let b = Value::new(3.0);
        let d = a.clone() * b.clone();
        let e = a.clone() + b.clone();
        let f = d * e;
        f.backward();

        assert_eq!(a.grad(), -3.0);
        assert_eq!(b.grad(), -8.0);
    }

    #[test]
    fn test_backward_without_reset_accumulates() {
        // grads are never implicitly reset: a second backward pass stacks
        // its contributions on top of the first
        let a = Value::new(2.0);
        let b = Value::new(3.0);
        let c = a.clone() + b.clone();
        c.backward();
        c.backward();

        assert_eq!(a.grad(), 2.0);
        assert_eq!(b.grad(), 2.0);

        a.set_grad(0.0);
        b.set_grad(0.0);
        c.backward();

        assert_eq!(a.grad(), 1.0);
        assert_eq!(b.grad(), 1.0);
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        // long sequential graph; the explicit-stack traversal must handle it
        let a = Value::new(1.0);
        let mut nodes = vec![a.clone()];
        for _ in 0..10_000 {
            let next = nodes.last().expect("chain is non-empty").clone() + 0.0;
            nodes.push(next);
        }
        nodes.last().expect("chain is non-empty").backward();

        assert_eq!(a.grad(), 1.0);

        // tear down root-first so each pop frees exactly one node; dropping
        // the root alone would recurse through the whole chain
        while nodes.pop().is_some() {}
    }

    #[test]
    fn test_sigmoid() {
        let a = Value::new(0.0);
        let b = a.clone().sigmoid();
        b.backward();

        assert_eq!(b.data(), 0.5);
        // s(1 - s) = 0.25 at x = 0
        assert_eq!(a.grad(), 0.25);
    }

    #[test]
    fn test_leaky_relu() {
        let a = Value::new(-2.0);
        let b = a.clone().leaky_relu();
        b.backward();

        assert_eq!(b.data(), -0.02);
        assert_eq!(a.grad(), 0.01);

        let c = Value::new(3.0);
        let d = c.clone().leaky_relu();
        d.backward();

        assert_eq!(d.data(), 3.0);
        assert_eq!(c.grad(), 1.0);
    }

    #[test]
    fn test_exp_div_sub_equivalence_to_tanh() {
        let x1 = Value::new(2.0);
        let x2 = Value::new(0.0);
        let w1 = Value::new(-3.0);
        let w2 = Value::new(1.0);
        let b = Value::new(6.881_373_4);

        let w1x1 = x1.clone() * w1;
        let w2x2 = x2.clone() * w2;
        let w1x1w2x2 = w1x1 + w2x2;
        let n = w1x1w2x2 + b;
        let o = n.tanh();
        o.backward();

        let x1_1 = Value::new(2.0);
        let x2_1 = Value::new(0.0);
        let w1_1 = Value::new(-3.0);
        let w2_1 = Value::new(1.0);
        let b_1 = Value::new(6.881_373_4);

        let w1x1_1 = x1_1.clone() * w1_1;
        let w2x2_1 = x2_1.clone() * w2_1;
        let w1x1w2x2_1 = w1x1_1 + w2x2_1;
        let n_1 = w1x1w2x2_1 + b_1;
        let e_1 = (n_1 * 2.0).exp();
        let o_1 = (e_1.clone() - 1.0) / (e_1 + 1.0);
        o_1.backward();

        let tol = 1e-9;
        assert!((o.data() - o_1.data()).abs() < tol);
        assert!((x1.grad() - x1_1.grad()).abs() < tol);
        assert!((x2.grad() - x2_1.grad()).abs() < tol);
    }

    #[test]
    fn test_sanity_check() {
        let x = Value::new(-4.0);
        let z = Value::new(2.0) * x.clone() + Value::new(2.0) + x.clone();
        let q = z.clone().relu() + z.clone() * x.clone();
        let h = (z.clone() * z.clone()).relu();
        let y = h + q.clone() + q * x.clone();
        y.backward();

        // These are the correct values from the PyTorch reference
        let y_expected = -20.0;
        let x_grad_expected = 46.0;

        let tol = 1e-9;
        assert!((y.data() - y_expected).abs() < tol);
        assert!((x.grad() - x_grad_expected).abs() < tol);
    }

    #[test]
    fn test_more_ops() {
        let a = Value::new(-4.0);
        let b = Value::new(2.0);

        let mut c = a.clone() + b.clone();
        let mut d = a.clone() * b.clone() + b.clone().powf(3.0).unwrap();

        // Using `c = c + ...` to correctly build the graph
        c = c.clone() + c.clone() + Value::new(1.0);
        c = c.clone() + Value::new(1.0) + c.clone() + (-a.clone());

        d = d.clone() + d.clone() * Value::new(2.0) + (b.clone() + a.clone()).relu();
        d = d.clone() + Value::new(3.0) * d.clone() + (b.clone() - a.clone()).relu();

        let e = c - d;
        let f = e.clone().powf(2.0).unwrap();
        let mut g = f.clone() / 2.0;
        g = g + Value::new(10.0) / f;
        g.backward();

        // These are the correct values from the PyTorch reference
        let g_expected = 24.704_081_632_653_057;
        let a_grad_expected = 138.833_819_241_982_52;
        let b_grad_expected = 645.577_259_475_218_6;

        let tol = 1e-9;
        assert!((g.data() - g_expected).abs() < tol);
        assert!((a.grad() - a_grad_expected).abs() < tol);
        assert!((b.grad() - b_grad_expected).abs() < tol);
    }
}
