use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use log::trace;

pub type ValueId = usize;

pub type ValueType = f64;

/// Chain-rule step for one node: `(operands, output data, output grad)`.
pub type BackwardFn = fn(&[Value], ValueType, ValueType);

/// Primitive operation that produced a node. Negation, subtraction and
/// division are compositions of these and never show up as tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Add,
    Mul,
    Pow,
    Exp,
    Tanh,
    Relu,
}

impl Op {
    pub fn symbol(&self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Mul => "*",
            Op::Pow => "pow",
            Op::Exp => "exp",
            Op::Tanh => "tanh",
            Op::Relu => "ReLU",
        }
    }

    /// The local gradient rule for this operation.
    fn backward_fn(&self) -> BackwardFn {
        match self {
            Op::Add => add_backward,
            Op::Mul => mul_backward,
            Op::Pow => pow_backward,
            Op::Exp => exp_backward,
            Op::Tanh => tanh_backward,
            Op::Relu => relu_backward,
        }
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug)]
struct Node {
    id: ValueId,
    data: Cell<ValueType>,
    grad: Cell<ValueType>,
    label: RefCell<Option<String>>,
    op: Option<Op>,
    op_args: Vec<Value>,
}

// Unlinks operand chains iteratively so dropping a deep graph does not
// recurse once per node.
impl Drop for Node {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.op_args);
        while let Some(value) = pending.pop() {
            if let Ok(mut node) = Rc::try_unwrap(value.0) {
                pending.append(&mut node.op_args);
            }
        }
    }
}

/// Value backed by an autograd engine.
///
/// Cloning a `Value` yields another handle to the same graph node, so a
/// weight used in several expressions accumulates gradient from every use.
#[derive(Clone, Debug)]
pub struct Value(Rc<Node>);

impl Value {
    pub fn new(data: ValueType) -> Self {
        Self::from_op(data, None, vec![])
    }

    fn from_op(data: ValueType, op: Option<Op>, op_args: Vec<Value>) -> Self {
        let id = super::get_id();
        debug_assert!(op_args.iter().all(|arg| arg.id() < id));
        Self(Rc::new(Node {
            id,
            data: Cell::new(data),
            grad: Cell::new(0.),
            label: RefCell::new(None),
            op,
            op_args,
        }))
    }

    /// Identity token of the underlying node. Stable for the node's lifetime
    /// and never shared between two nodes, whatever their data.
    pub fn id(&self) -> ValueId {
        self.0.id
    }

    pub fn data(&self) -> ValueType {
        self.0.data.get()
    }

    /// Overwrites the forward value. Meant for parameter updates between
    /// passes; nodes already built from this one keep their old results.
    pub fn set_data(&self, data: ValueType) {
        self.0.data.set(data)
    }

    pub fn grad(&self) -> ValueType {
        self.0.grad.get()
    }

    pub fn reset_grad(&self) {
        self.0.grad.set(Default::default())
    }

    pub fn label(&self) -> Option<String> {
        self.0.label.borrow().clone()
    }

    pub fn set_label(&self, label: impl Into<String>) {
        *self.0.label.borrow_mut() = Some(label.into());
    }

    pub fn labeled(self, label: &str) -> Self {
        self.set_label(label);
        self
    }

    pub fn op(&self) -> Option<Op> {
        self.0.op
    }

    /// Operands in construction order. Empty for leaves.
    pub fn op_args(&self) -> &[Value] {
        &self.0.op_args
    }

    pub fn is_leaf(&self) -> bool {
        self.0.op_args.is_empty()
    }

    pub fn relu(&self) -> Value {
        let data = if self.data() < 0. { 0. } else { self.data() };
        Value::from_op(data, Some(Op::Relu), vec![self.clone()])
    }

    pub fn tanh(&self) -> Value {
        Value::from_op(self.data().tanh(), Some(Op::Tanh), vec![self.clone()])
    }

    pub fn exp(&self) -> Value {
        Value::from_op(self.data().exp(), Some(Op::Exp), vec![self.clone()])
    }

    pub fn pow(&self, exp: ValueType) -> Value {
        self.powv(&Value::new(exp))
    }

    /// Power with a graph node as exponent. Only the base receives gradient.
    pub fn powv(&self, exp: &Value) -> Value {
        Value::from_op(
            self.data().powf(exp.data()),
            Some(Op::Pow),
            vec![self.clone(), exp.clone()],
        )
    }

    /// Seeds this node's gradient with 1 and back-propagates through every
    /// node it depends on, consumers before producers.
    ///
    /// Gradients accumulate: call [`Value::reset_grad`] on reused leaves
    /// between passes.
    pub fn backward(&self) {
        self.0.grad.set(1.0);
        let topo = self.topological_order();
        trace!("backward from value {} over {} nodes", self.id(), topo.len());
        for node in topo {
            if let Some(op) = node.op() {
                op.backward_fn()(node.op_args(), node.data(), node.grad());
            }
        }
    }

    /// Every node reachable from `self`, each exactly once, ordered so that a
    /// node always precedes all of its operands. `self` comes first.
    pub fn topological_order(&self) -> Vec<Value> {
        let mut topo = vec![];
        let mut visited = HashSet::<ValueId>::new();
        // (node, operands already scheduled)
        let mut stack = vec![(self.clone(), false)];

        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                topo.push(node);
                continue;
            }
            if !visited.insert(node.id()) {
                continue;
            }
            let children = node
                .op_args()
                .iter()
                .rev()
                .filter(|child| !visited.contains(&child.id()))
                .map(|child| (child.clone(), false))
                .collect::<Vec<_>>();
            stack.push((node, true));
            stack.extend(children);
        }
        topo.reverse();

        topo
    }

    fn update_grad(&self, delta: ValueType) {
        self.0.grad.set(self.grad() + delta);
    }
}

fn add_backward(args: &[Value], _out_data: ValueType, out_grad: ValueType) {
    args[0].update_grad(out_grad);
    args[1].update_grad(out_grad);
}

fn mul_backward(args: &[Value], _out_data: ValueType, out_grad: ValueType) {
    args[0].update_grad(args[1].data() * out_grad);
    args[1].update_grad(args[0].data() * out_grad);
}

fn pow_backward(args: &[Value], _out_data: ValueType, out_grad: ValueType) {
    args[0].update_grad(args[1].data() * args[0].data().powf(args[1].data() - 1.) * out_grad)
}

fn exp_backward(args: &[Value], out_data: ValueType, out_grad: ValueType) {
    args[0].update_grad(out_data * out_grad);
}

fn tanh_backward(args: &[Value], out_data: ValueType, out_grad: ValueType) {
    args[0].update_grad((1. - out_data * out_data) * out_grad);
}

fn relu_backward(args: &[Value], out_data: ValueType, out_grad: ValueType) {
    let delta = if out_data > 0. { out_grad } else { 0. };
    args[0].update_grad(delta);
}

fn add(lhs: &Value, rhs: &Value) -> Value {
    Value::from_op(
        lhs.data() + rhs.data(),
        Some(Op::Add),
        vec![lhs.clone(), rhs.clone()],
    )
}

fn mul(lhs: &Value, rhs: &Value) -> Value {
    Value::from_op(
        lhs.data() * rhs.data(),
        Some(Op::Mul),
        vec![lhs.clone(), rhs.clone()],
    )
}

fn neg(val: &Value) -> Value {
    mul(val, &Value::new(-1.0))
}

fn sub(lhs: &Value, rhs: &Value) -> Value {
    add(lhs, &neg(rhs))
}

fn div(lhs: &Value, rhs: &Value) -> Value {
    mul(lhs, &rhs.pow(-1.))
}

impl std::fmt::Display for Value {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        let op = self.op().map(|op| op.symbol()).unwrap_or_default();
        match self.op_args() {
            [] => fmt.write_fmt(format_args!(
                "Value({:.06}, grad={:.06})",
                self.data(),
                self.grad()
            )),
            [arg] => fmt.write_fmt(format_args!(
                "{} [Value({:.06}, grad={:.06})]",
                op,
                arg.data(),
                arg.grad(),
            )),
            [lhs, rhs, ..] => fmt.write_fmt(format_args!(
                "[Value({:.06}, grad={:.06})] {} [Value({:.06}, grad={:.06})]",
                lhs.data(),
                lhs.grad(),
                op,
                rhs.data(),
                rhs.grad(),
            )),
        }
    }
}

impl From<ValueType> for Value {
    fn from(data: ValueType) -> Self {
        Value::new(data)
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $func:ident) => {
        impl std::ops::$trait<Value> for Value {
            type Output = Value;

            fn $method(self, rhs: Value) -> Self::Output {
                $func(&self, &rhs)
            }
        }

        impl std::ops::$trait<&Value> for Value {
            type Output = Value;

            fn $method(self, rhs: &Value) -> Self::Output {
                $func(&self, rhs)
            }
        }

        impl std::ops::$trait<Value> for &Value {
            type Output = Value;

            fn $method(self, rhs: Value) -> Self::Output {
                $func(self, &rhs)
            }
        }

        impl std::ops::$trait<&Value> for &Value {
            type Output = Value;

            fn $method(self, rhs: &Value) -> Self::Output {
                $func(self, rhs)
            }
        }

        impl std::ops::$trait<ValueType> for Value {
            type Output = Value;

            fn $method(self, rhs: ValueType) -> Self::Output {
                $func(&self, &Value::new(rhs))
            }
        }

        impl std::ops::$trait<ValueType> for &Value {
            type Output = Value;

            fn $method(self, rhs: ValueType) -> Self::Output {
                $func(self, &Value::new(rhs))
            }
        }

        impl std::ops::$trait<Value> for ValueType {
            type Output = Value;

            fn $method(self, rhs: Value) -> Self::Output {
                $func(&Value::new(self), &rhs)
            }
        }

        impl std::ops::$trait<&Value> for ValueType {
            type Output = Value;

            fn $method(self, rhs: &Value) -> Self::Output {
                $func(&Value::new(self), rhs)
            }
        }
    };
}

impl_binary_op!(Add, add, add);
impl_binary_op!(Sub, sub, sub);
impl_binary_op!(Mul, mul, mul);
impl_binary_op!(Div, div, div);

// Compound assignment rebinds the handle to a fresh node. The previous node
// stays intact for every other handle and consumer that references it.
macro_rules! impl_assign_op {
    ($trait:ident, $method:ident, $func:ident) => {
        impl std::ops::$trait<Value> for Value {
            fn $method(&mut self, rhs: Value) {
                *self = $func(self, &rhs);
            }
        }

        impl std::ops::$trait<&Value> for Value {
            fn $method(&mut self, rhs: &Value) {
                *self = $func(self, rhs);
            }
        }

        impl std::ops::$trait<ValueType> for Value {
            fn $method(&mut self, rhs: ValueType) {
                *self = $func(self, &Value::new(rhs));
            }
        }
    };
}

impl_assign_op!(AddAssign, add_assign, add);
impl_assign_op!(SubAssign, sub_assign, sub);
impl_assign_op!(MulAssign, mul_assign, mul);
impl_assign_op!(DivAssign, div_assign, div);

impl std::ops::Neg for Value {
    type Output = Value;

    fn neg(self) -> Self::Output {
        neg(&self)
    }
}

impl std::ops::Neg for &Value {
    type Output = Value;

    fn neg(self) -> Self::Output {
        neg(self)
    }
}

impl std::iter::Sum for Value {
    fn sum<I: Iterator<Item = Value>>(iter: I) -> Self {
        iter.reduce(|acc, v| acc + v)
            .unwrap_or_else(|| Value::new(0.))
    }
}

impl<'a> std::iter::Sum<&'a Value> for Value {
    fn sum<I: Iterator<Item = &'a Value>>(iter: I) -> Self {
        iter.cloned().sum()
    }
}
