//! # Evaluator Module
//!
//! A tree-walking interpreter over the optimized AST.
//!
//! The evaluator is a pure function of `(tree, environment)`: variables come
//! from a caller-supplied [`VariableResolver`] and functions from a
//! [`FunctionLibrary`]; there is no hidden state. Failures are typed
//! [`EvaluationError`]s and abort only the current evaluation call.

pub mod functions;

use compact_str::CompactString;
use hashbrown::HashMap;

use crate::ast::{AstNode, BinaryOp, UnaryOp};
use crate::error::EvaluationError;

pub use functions::Builtins;

/// A runtime value: the formula language only has numbers and booleans.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    Number(f64),
    Boolean(bool),
}

impl Value {
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Boolean(_) => "boolean",
        }
    }

    /// # Errors
    ///
    /// Type mismatch if the value is not a number.
    pub fn as_number(self, context: &'static str) -> Result<f64, EvaluationError> {
        match self {
            Self::Number(v) => Ok(v),
            Self::Boolean(_) => Err(EvaluationError::TypeMismatch {
                expected: "number",
                found: "boolean",
                context,
            }),
        }
    }

    /// # Errors
    ///
    /// Type mismatch if the value is not a boolean.
    pub fn as_boolean(self, context: &'static str) -> Result<bool, EvaluationError> {
        match self {
            Self::Boolean(v) => Ok(v),
            Self::Number(_) => Err(EvaluationError::TypeMismatch {
                expected: "boolean",
                found: "number",
                context,
            }),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

/// Host-supplied variable lookup.
pub trait VariableResolver {
    fn resolve(&self, name: &str) -> Option<Value>;
}

impl VariableResolver for HashMap<CompactString, Value> {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.get(name).copied()
    }
}

impl VariableResolver for HashMap<String, f64> {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.get(name).map(|v| Value::Number(*v))
    }
}

/// An empty environment; every lookup misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBindings;

impl VariableResolver for NoBindings {
    fn resolve(&self, _name: &str) -> Option<Value> {
        None
    }
}

/// Host-supplied function lookup, keyed by name and arity.
pub trait FunctionLibrary {
    /// Invoke `name` with the given arguments.
    ///
    /// # Errors
    ///
    /// Unknown name, wrong arity, argument type mismatch, or a domain error
    /// from the implementation.
    fn call(&self, name: &str, args: &[Value]) -> Result<Value, EvaluationError>;

    /// Whether `name` is callable with `arity` arguments.
    fn contains(&self, name: &str, arity: usize) -> bool;
}

/// Apply a binary operator to two values.
///
/// This is the single arithmetic kernel: the evaluator and the optimizer's
/// constant folding both go through it, which is what keeps folding
/// semantics-preserving.
///
/// # Errors
///
/// Division/modulo by zero, type mismatches, and non-finite results.
pub fn apply_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvaluationError> {
    if op.is_logical() {
        let l = lhs.as_boolean("logical operand")?;
        let r = rhs.as_boolean("logical operand")?;
        return Ok(Value::Boolean(match op {
            BinaryOp::And => l && r,
            _ => l || r,
        }));
    }

    if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
        let equal = match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            _ => {
                return Err(EvaluationError::TypeMismatch {
                    expected: lhs.type_name(),
                    found: rhs.type_name(),
                    context: "equality operand",
                })
            }
        };
        return Ok(Value::Boolean(if op == BinaryOp::Eq { equal } else { !equal }));
    }

    let l = lhs.as_number("arithmetic operand")?;
    let r = rhs.as_number("arithmetic operand")?;

    if op.is_comparison() {
        return Ok(Value::Boolean(match op {
            BinaryOp::Lt => l < r,
            BinaryOp::Le => l <= r,
            BinaryOp::Gt => l > r,
            _ => l >= r,
        }));
    }

    let result = match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => {
            if r == 0.0 {
                return Err(EvaluationError::DivisionByZero);
            }
            l / r
        }
        BinaryOp::Mod => {
            if r == 0.0 {
                return Err(EvaluationError::ModuloByZero);
            }
            l % r
        }
        BinaryOp::Pow => l.powf(r),
        _ => unreachable!("comparison and logical operators handled above"),
    };
    if !result.is_finite() {
        return Err(EvaluationError::NonFiniteResult {
            operation: op.symbol(),
        });
    }
    Ok(Value::Number(result))
}

/// Apply a unary operator to a value.
///
/// # Errors
///
/// Type mismatch when the operand kind does not fit the operator.
pub fn apply_unary(op: UnaryOp, operand: Value) -> Result<Value, EvaluationError> {
    match op {
        UnaryOp::Neg => Ok(Value::Number(-operand.as_number("negation operand")?)),
        UnaryOp::Plus => Ok(Value::Number(operand.as_number("unary plus operand")?)),
        UnaryOp::Not => Ok(Value::Boolean(!operand.as_boolean("logical-not operand")?)),
    }
}

/// The tree-walking interpreter.
pub struct Evaluator<'a> {
    variables: &'a dyn VariableResolver,
    functions: &'a dyn FunctionLibrary,
}

impl<'a> Evaluator<'a> {
    #[must_use]
    pub fn new(variables: &'a dyn VariableResolver, functions: &'a dyn FunctionLibrary) -> Self {
        Self {
            variables,
            functions,
        }
    }

    /// Evaluate a tree to a single value.
    ///
    /// # Errors
    ///
    /// Any [`EvaluationError`]; the error aborts only this call.
    pub fn evaluate(&self, node: &AstNode) -> Result<Value, EvaluationError> {
        match node {
            AstNode::Number(v) => Ok(Value::Number(*v)),
            AstNode::Boolean(v) => Ok(Value::Boolean(*v)),
            AstNode::Variable(name) => {
                self.variables
                    .resolve(name)
                    .ok_or_else(|| EvaluationError::UnboundVariable {
                        name: name.to_string(),
                    })
            }
            AstNode::Binary { op, lhs, rhs } => {
                // Short-circuit logical operators before evaluating the right side.
                if *op == BinaryOp::And {
                    let l = self.evaluate(lhs)?.as_boolean("logical operand")?;
                    if !l {
                        return Ok(Value::Boolean(false));
                    }
                    return Ok(Value::Boolean(
                        self.evaluate(rhs)?.as_boolean("logical operand")?,
                    ));
                }
                if *op == BinaryOp::Or {
                    let l = self.evaluate(lhs)?.as_boolean("logical operand")?;
                    if l {
                        return Ok(Value::Boolean(true));
                    }
                    return Ok(Value::Boolean(
                        self.evaluate(rhs)?.as_boolean("logical operand")?,
                    ));
                }
                apply_binary(*op, self.evaluate(lhs)?, self.evaluate(rhs)?)
            }
            AstNode::Unary { op, operand } => apply_unary(*op, self.evaluate(operand)?),
            AstNode::Call { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate(arg)?);
                }
                self.functions.call(name, &values)
            }
            AstNode::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.as_boolean("condition")? {
                    self.evaluate(then_branch)
                } else {
                    self.evaluate(else_branch)
                }
            }
            AstNode::Arguments(_) => Err(EvaluationError::MalformedReduction {
                context: "argument list outside a call",
            }),
        }
    }
}
