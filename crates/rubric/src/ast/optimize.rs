//! Multi-pass AST optimizer.
//!
//! Each pass applies, in order: constant folding, identity/annihilator
//! elimination, redundant-conditional elimination, and common-subexpression
//! reuse. A pass that changes nothing (by node-count comparison) ends the
//! loop, so the result is a fixed point: optimizing an already-optimized
//! tree returns it unchanged.
//!
//! Folding goes through the same arithmetic kernel as the evaluator
//! ([`crate::eval::apply_binary`]), and errors it raises (division by zero,
//! domain errors, non-finite results) are surfaced, not swallowed.

use std::sync::Arc;

use hashbrown::HashMap;

use crate::ast::{AstNode, BinaryOp, UnaryOp};
use crate::error::{EvaluationError, LimitKind, ResourceLimitError};
use crate::eval::{apply_binary, apply_unary, FunctionLibrary, Value};

/// Counters for one optimization run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    /// Passes run, including the final no-change pass.
    pub passes: usize,
    pub nodes_before: usize,
    pub nodes_after: usize,
}

/// Result of an optimization run: the rewritten tree plus its counters.
#[derive(Debug, Clone)]
pub struct OptimizeOutcome {
    pub root: Arc<AstNode>,
    pub stats: OptimizeStats,
}

/// The rewrite engine. Cheap to construct; holds no per-run state.
pub struct Optimizer<'a> {
    functions: Option<&'a dyn FunctionLibrary>,
    max_passes: usize,
}

impl Default for Optimizer<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Optimizer<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            functions: None,
            max_passes: crate::config::Limits::default().max_optimizer_passes,
        }
    }

    /// Enable folding of calls whose arguments are all literal, using the
    /// given library.
    #[must_use]
    pub fn with_functions(mut self, functions: &'a dyn FunctionLibrary) -> Self {
        self.functions = Some(functions);
        self
    }

    #[must_use]
    pub const fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    /// Rewrite `root` to its optimization fixed point.
    ///
    /// # Errors
    ///
    /// Errors surfaced by constant folding, or a pass-count
    /// [`ResourceLimitError`] if the fixed point is not reached within the
    /// configured bound.
    pub fn optimize(&self, root: &Arc<AstNode>) -> Result<OptimizeOutcome, crate::error::FormulaError> {
        let nodes_before = root.node_count();
        let mut current = Arc::clone(root);
        let mut passes = 0;

        loop {
            if passes == self.max_passes {
                return Err(ResourceLimitError::new(
                    LimitKind::OptimizerPasses,
                    self.max_passes,
                    passes + 1,
                )
                .into());
            }
            let before = current.node_count();
            let folded = self.fold(&current)?;
            let reduced = Self::identities(&folded)?;
            let selected = Self::conditionals(&reduced);
            let shared = Self::dedupe(&selected);
            passes += 1;
            let after = shared.node_count();
            current = shared;
            if after == before {
                break;
            }
        }

        let nodes_after = current.node_count();
        Ok(OptimizeOutcome {
            root: current,
            stats: OptimizeStats {
                passes,
                nodes_before,
                nodes_after,
            },
        })
    }

    fn literal(node: &AstNode) -> Option<Value> {
        match node {
            AstNode::Number(v) => Some(Value::Number(*v)),
            AstNode::Boolean(v) => Some(Value::Boolean(*v)),
            _ => None,
        }
    }

    fn from_value(value: Value) -> Arc<AstNode> {
        match value {
            // Folded results may legitimately exceed the literal magnitude
            // bound, so this does not go through the checked constructor.
            Value::Number(v) => Arc::new(AstNode::Number(v)),
            Value::Boolean(v) => AstNode::boolean(v),
        }
    }

    /// Constant folding: operations whose operands are all literal are
    /// evaluated now. Logical operators fold through their short-circuit
    /// rules so folding never evaluates more than evaluation would.
    fn fold(&self, node: &Arc<AstNode>) -> Result<Arc<AstNode>, EvaluationError> {
        match &**node {
            AstNode::Number(_) | AstNode::Boolean(_) | AstNode::Variable(_) => {
                Ok(Arc::clone(node))
            }
            AstNode::Binary { op, lhs, rhs } => {
                let lhs = self.fold(lhs)?;
                if op.is_logical() {
                    if let Some(value) = Self::literal(&lhs) {
                        let l = value.as_boolean("logical operand")?;
                        return match (op, l) {
                            (BinaryOp::And, false) => Ok(AstNode::boolean(false)),
                            (BinaryOp::Or, true) => Ok(AstNode::boolean(true)),
                            _ => self.fold(rhs),
                        };
                    }
                }
                let rhs = self.fold(rhs)?;
                match (Self::literal(&lhs), Self::literal(&rhs)) {
                    (Some(l), Some(r)) => Ok(Self::from_value(apply_binary(*op, l, r)?)),
                    _ => Ok(Arc::new(AstNode::Binary {
                        op: *op,
                        lhs,
                        rhs,
                    })),
                }
            }
            AstNode::Unary { op, operand } => {
                let operand = self.fold(operand)?;
                match Self::literal(&operand) {
                    Some(v) => Ok(Self::from_value(apply_unary(*op, v)?)),
                    None => Ok(Arc::new(AstNode::Unary { op: *op, operand })),
                }
            }
            AstNode::Call { name, args } => {
                let mut folded = Vec::with_capacity(args.len());
                for arg in args {
                    folded.push(self.fold(arg)?);
                }
                if let Some(library) = self.functions {
                    let literals: Option<Vec<Value>> =
                        folded.iter().map(|a| Self::literal(a)).collect();
                    if let Some(values) = literals {
                        if library.contains(name, values.len()) {
                            return Ok(Self::from_value(library.call(name, &values)?));
                        }
                    }
                }
                Ok(Arc::new(AstNode::Call {
                    name: name.clone(),
                    args: folded,
                }))
            }
            AstNode::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.fold(condition)?;
                // A literal condition selects its branch before the other
                // branch is folded, mirroring evaluation order.
                if let Some(value) = Self::literal(&condition) {
                    return if value.as_boolean("condition")? {
                        self.fold(then_branch)
                    } else {
                        self.fold(else_branch)
                    };
                }
                Ok(AstNode::if_node(
                    condition,
                    self.fold(then_branch)?,
                    self.fold(else_branch)?,
                ))
            }
            AstNode::Arguments(items) => {
                let mut folded = Vec::with_capacity(items.len());
                for item in items {
                    folded.push(self.fold(item)?);
                }
                Ok(AstNode::arguments(folded))
            }
        }
    }

    /// Identity and annihilator elimination, applied bottom-up.
    fn identities(node: &Arc<AstNode>) -> Result<Arc<AstNode>, EvaluationError> {
        let rebuilt = match &**node {
            AstNode::Number(_) | AstNode::Boolean(_) | AstNode::Variable(_) => {
                return Ok(Arc::clone(node))
            }
            AstNode::Binary { op, lhs, rhs } => {
                let lhs = Self::identities(lhs)?;
                let rhs = Self::identities(rhs)?;
                return Ok(Self::binary_identity(*op, lhs, rhs));
            }
            AstNode::Unary { op, operand } => {
                let operand = Self::identities(operand)?;
                match (op, &*operand) {
                    // --x => x, !!x => x, +x => x
                    (UnaryOp::Neg, AstNode::Unary { op: UnaryOp::Neg, operand: inner })
                    | (UnaryOp::Not, AstNode::Unary { op: UnaryOp::Not, operand: inner }) => {
                        Arc::clone(inner)
                    }
                    (UnaryOp::Plus, _) => operand,
                    _ => Arc::new(AstNode::Unary {
                        op: *op,
                        operand,
                    }),
                }
            }
            AstNode::Call { name, args } => {
                let args = args
                    .iter()
                    .map(Self::identities)
                    .collect::<Result<Vec<_>, _>>()?;
                Arc::new(AstNode::Call {
                    name: name.clone(),
                    args,
                })
            }
            AstNode::If {
                condition,
                then_branch,
                else_branch,
            } => AstNode::if_node(
                Self::identities(condition)?,
                Self::identities(then_branch)?,
                Self::identities(else_branch)?,
            ),
            AstNode::Arguments(items) => AstNode::arguments(
                items
                    .iter()
                    .map(Self::identities)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        };
        Ok(rebuilt)
    }

    fn binary_identity(op: BinaryOp, lhs: Arc<AstNode>, rhs: Arc<AstNode>) -> Arc<AstNode> {
        let zero = |n: &AstNode| n.is_number(0.0);
        let one = |n: &AstNode| n.is_number(1.0);
        match op {
            BinaryOp::Add => {
                if zero(&lhs) {
                    return rhs;
                }
                if zero(&rhs) {
                    return lhs;
                }
            }
            BinaryOp::Sub => {
                if zero(&rhs) {
                    return lhs;
                }
                if lhs == rhs {
                    return Arc::new(AstNode::Number(0.0));
                }
            }
            BinaryOp::Mul => {
                if zero(&lhs) || zero(&rhs) {
                    return Arc::new(AstNode::Number(0.0));
                }
                if one(&lhs) {
                    return rhs;
                }
                if one(&rhs) {
                    return lhs;
                }
            }
            BinaryOp::Div => {
                if one(&rhs) {
                    return lhs;
                }
            }
            BinaryOp::Pow => {
                if zero(&rhs) || one(&lhs) {
                    return Arc::new(AstNode::Number(1.0));
                }
                if one(&rhs) {
                    return lhs;
                }
            }
            BinaryOp::And => {
                let truth = |n: &AstNode| match n {
                    AstNode::Boolean(b) => Some(*b),
                    _ => None,
                };
                if truth(&lhs) == Some(false) || truth(&rhs) == Some(false) {
                    return AstNode::boolean(false);
                }
                if truth(&lhs) == Some(true) {
                    return rhs;
                }
                if truth(&rhs) == Some(true) {
                    return lhs;
                }
            }
            BinaryOp::Or => {
                let truth = |n: &AstNode| match n {
                    AstNode::Boolean(b) => Some(*b),
                    _ => None,
                };
                if truth(&lhs) == Some(true) || truth(&rhs) == Some(true) {
                    return AstNode::boolean(true);
                }
                if truth(&lhs) == Some(false) {
                    return rhs;
                }
                if truth(&rhs) == Some(false) {
                    return lhs;
                }
            }
            _ => {}
        }
        Arc::new(AstNode::Binary { op, lhs, rhs })
    }

    /// Redundant-conditional elimination.
    fn conditionals(node: &Arc<AstNode>) -> Arc<AstNode> {
        match &**node {
            AstNode::Number(_) | AstNode::Boolean(_) | AstNode::Variable(_) => Arc::clone(node),
            AstNode::Binary { op, lhs, rhs } => Arc::new(AstNode::Binary {
                op: *op,
                lhs: Self::conditionals(lhs),
                rhs: Self::conditionals(rhs),
            }),
            AstNode::Unary { op, operand } => Arc::new(AstNode::Unary {
                op: *op,
                operand: Self::conditionals(operand),
            }),
            AstNode::Call { name, args } => Arc::new(AstNode::Call {
                name: name.clone(),
                args: args.iter().map(Self::conditionals).collect(),
            }),
            AstNode::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = Self::conditionals(condition);
                let then_branch = Self::conditionals(then_branch);
                let else_branch = Self::conditionals(else_branch);
                if let AstNode::Boolean(flag) = &*condition {
                    return if *flag { then_branch } else { else_branch };
                }
                if then_branch == else_branch {
                    return then_branch;
                }
                AstNode::if_node(condition, then_branch, else_branch)
            }
            AstNode::Arguments(items) => {
                AstNode::arguments(items.iter().map(Self::conditionals).collect())
            }
        }
    }

    /// Leaf de-duplication and common-subexpression reuse: structurally
    /// equal subtrees collapse to one shared allocation.
    fn dedupe(node: &Arc<AstNode>) -> Arc<AstNode> {
        let mut interned: HashMap<Arc<AstNode>, Arc<AstNode>, ahash::RandomState> =
            HashMap::with_hasher(ahash::RandomState::new());
        Self::intern(node, &mut interned)
    }

    fn intern(
        node: &Arc<AstNode>,
        interned: &mut HashMap<Arc<AstNode>, Arc<AstNode>, ahash::RandomState>,
    ) -> Arc<AstNode> {
        let rebuilt = match &**node {
            AstNode::Number(_) | AstNode::Boolean(_) | AstNode::Variable(_) => Arc::clone(node),
            AstNode::Binary { op, lhs, rhs } => Arc::new(AstNode::Binary {
                op: *op,
                lhs: Self::intern(lhs, interned),
                rhs: Self::intern(rhs, interned),
            }),
            AstNode::Unary { op, operand } => Arc::new(AstNode::Unary {
                op: *op,
                operand: Self::intern(operand, interned),
            }),
            AstNode::Call { name, args } => Arc::new(AstNode::Call {
                name: name.clone(),
                args: args.iter().map(|a| Self::intern(a, interned)).collect(),
            }),
            AstNode::If {
                condition,
                then_branch,
                else_branch,
            } => AstNode::if_node(
                Self::intern(condition, interned),
                Self::intern(then_branch, interned),
                Self::intern(else_branch, interned),
            ),
            AstNode::Arguments(items) => {
                AstNode::arguments(items.iter().map(|i| Self::intern(i, interned)).collect())
            }
        };
        interned
            .entry(rebuilt)
            .or_insert_with_key(Arc::clone)
            .clone()
    }
}
