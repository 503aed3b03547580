//! # Engine Module
//!
//! The embedding surface of the pipeline: text in, structured report out.
//!
//! A [`FormulaEngine`] owns a grammar, the memoized table cache, a function
//! library, and an optional expression-result cache. It is immutable after
//! construction and safe to share across threads; each evaluation runs the
//! full flow (tokenize, parse against the cached table, optimize, evaluate,
//! render) with its own per-parse state.

use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use compact_str::CompactString;
use hashbrown::HashMap;
use std::collections::VecDeque;

use crate::ast::optimize::Optimizer;
use crate::ast::AstNode;
use crate::config::EngineOptions;
use crate::error::{FormulaError, LimitKind, Metrics, ResourceLimitError, Warning};
use crate::eval::{Builtins, Evaluator, FunctionLibrary, Value, VariableResolver};
use crate::grammar::{formula_grammar, Grammar};
use crate::lexer::{Lexer, Token};
use crate::parser::{ParserRuntime, TableCache};
use crate::render::Formatter;

/// Concrete variable bindings. The expression cache needs to enumerate and
/// hash the environment, which the open [`VariableResolver`] trait cannot
/// offer; [`FormulaEngine::evaluate_with_resolver`] accepts arbitrary
/// resolvers and skips the cache.
pub type Bindings = HashMap<CompactString, Value>;

/// The structured result of one evaluation.
#[derive(Debug, Clone)]
pub struct FormulaReport {
    /// The token sequence, end-of-input token included.
    pub tokens: Vec<Token>,
    /// The (optimized) AST.
    pub ast: Arc<AstNode>,
    /// The evaluation outcome.
    pub value: Value,
    /// Canonical-infix rendering of the evaluated tree.
    pub rendered: String,
    /// Recoverable diagnostics (error-recovery skips and the like).
    pub warnings: Vec<Warning>,
    /// Counters and timings for this trip through the pipeline.
    pub metrics: Metrics,
}

/// What the expression cache stores per key.
struct CachedOutcome {
    tokens: Vec<Token>,
    ast: Arc<AstNode>,
    value: Value,
    rendered: String,
    warnings: Vec<Warning>,
}

/// Insertion-order (FIFO) cache: once capacity is reached the oldest entry
/// is evicted. A performance layer only, never a correctness dependency.
struct FifoCache<V> {
    capacity: usize,
    map: HashMap<u64, V, ahash::RandomState>,
    order: VecDeque<u64>,
}

impl<V> FifoCache<V> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: HashMap::with_hasher(ahash::RandomState::new()),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: u64) -> Option<&V> {
        self.map.get(&key)
    }

    fn insert(&mut self, key: u64, value: V) {
        if self.capacity == 0 {
            return;
        }
        if self.map.insert(key, value).is_none() {
            self.order.push_back(key);
            while self.order.len() > self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.map.remove(&oldest);
                }
            }
        }
    }
}

/// The formula evaluation engine.
pub struct FormulaEngine {
    grammar: Grammar,
    tables: TableCache,
    results: Mutex<FifoCache<Arc<CachedOutcome>>>,
    functions: Box<dyn FunctionLibrary + Send + Sync>,
    options: EngineOptions,
}

impl Default for FormulaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FormulaEngine {
    /// An engine over the shipped formula grammar, the builtin function
    /// library, and default options.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    #[must_use]
    pub fn with_options(options: EngineOptions) -> Self {
        Self::custom(formula_grammar(), Box::new(Builtins::new()), options)
    }

    /// Full control: a custom grammar description and function library.
    #[must_use]
    pub fn custom(
        grammar: Grammar,
        functions: Box<dyn FunctionLibrary + Send + Sync>,
        options: EngineOptions,
    ) -> Self {
        let results = Mutex::new(FifoCache::new(options.result_cache_capacity));
        Self {
            grammar,
            tables: TableCache::new(),
            results,
            functions,
            options,
        }
    }

    #[must_use]
    pub const fn options(&self) -> &EngineOptions {
        &self.options
    }

    #[must_use]
    pub const fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// Evaluate `text` against concrete bindings, consulting the expression
    /// cache.
    ///
    /// # Errors
    ///
    /// Any [`FormulaError`] from the pipeline stage that failed.
    pub fn evaluate(&self, text: &str, bindings: &Bindings) -> Result<FormulaReport, FormulaError> {
        let key = self.cache_key(text, bindings);
        if let Some(hit) = self
            .results
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
        {
            let metrics = Metrics {
                tokens: hit.tokens.len(),
                nodes_after: hit.ast.node_count(),
                cache_hit: true,
                ..Metrics::default()
            };
            return Ok(FormulaReport {
                tokens: hit.tokens.clone(),
                ast: Arc::clone(&hit.ast),
                value: hit.value,
                rendered: hit.rendered.clone(),
                warnings: hit.warnings.clone(),
                metrics,
            });
        }

        let report = self.evaluate_with_resolver(text, bindings)?;
        self.results
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(
                key,
                Arc::new(CachedOutcome {
                    tokens: report.tokens.clone(),
                    ast: Arc::clone(&report.ast),
                    value: report.value,
                    rendered: report.rendered.clone(),
                    warnings: report.warnings.clone(),
                }),
            );
        Ok(report)
    }

    /// Evaluate `text` against an arbitrary resolver, bypassing the
    /// expression cache.
    ///
    /// # Errors
    ///
    /// Any [`FormulaError`] from the pipeline stage that failed.
    pub fn evaluate_with_resolver(
        &self,
        text: &str,
        variables: &dyn VariableResolver,
    ) -> Result<FormulaReport, FormulaError> {
        let mut metrics = Metrics::default();
        let (tokens, ast, warnings) = self.compile_internal(text, &mut metrics)?;

        let started = Instant::now();
        let evaluator = Evaluator::new(variables, self.functions.as_ref());
        let value = evaluator.evaluate(&ast)?;
        metrics.eval_time = started.elapsed();

        let rendered = Formatter::new().format(&ast);
        Ok(FormulaReport {
            tokens,
            ast,
            value,
            rendered,
            warnings,
            metrics,
        })
    }

    /// Tokenize, parse, and (optionally) optimize without evaluating.
    ///
    /// # Errors
    ///
    /// Any [`FormulaError`] up to and including optimization.
    pub fn compile(&self, text: &str) -> Result<(Vec<Token>, Arc<AstNode>), FormulaError> {
        let mut metrics = Metrics::default();
        let (tokens, ast, _) = self.compile_internal(text, &mut metrics)?;
        Ok((tokens, ast))
    }

    fn compile_internal(
        &self,
        text: &str,
        metrics: &mut Metrics,
    ) -> Result<(Vec<Token>, Arc<AstNode>, Vec<Warning>), FormulaError> {
        let limits = &self.options.limits;
        if text.len() > limits.max_expression_length {
            return Err(ResourceLimitError::new(
                LimitKind::ExpressionLength,
                limits.max_expression_length,
                text.len(),
            )
            .into());
        }

        let started = Instant::now();
        let tokens = Lexer::new().tokenize(text)?;
        metrics.tokenize_time = started.elapsed();
        metrics.tokens = tokens.len();

        let table = self.tables.get_or_build(&self.grammar)?;
        if self.options.enable_validation {
            if let Some(conflict) = table.unresolved_conflicts().next() {
                return Err(crate::error::ConflictError {
                    state: conflict.state,
                    terminal: conflict.terminal,
                    reason: format!(
                        "{} vs {} left unresolved",
                        conflict.existing, conflict.incoming
                    ),
                }
                .into());
            }
        }

        let started = Instant::now();
        let runtime =
            ParserRuntime::new(&self.grammar, &table, limits, self.options.error_recovery);
        let output = runtime.parse(&tokens)?;
        metrics.parse_time = started.elapsed();
        metrics.parse_steps = output.steps;
        metrics.shifts = output.shifts;
        metrics.reduces = output.reduces;
        metrics.recovered_errors = output.recovered;
        metrics.nodes_before = output.root.node_count();

        if self.options.enable_validation {
            output.root.validate_limits(limits)?;
        }

        let ast = if self.options.enable_optimization {
            let started = Instant::now();
            let optimizer = Optimizer::new()
                .with_functions(self.functions.as_ref())
                .with_max_passes(limits.max_optimizer_passes);
            let outcome = optimizer.optimize(&output.root)?;
            metrics.optimize_time = started.elapsed();
            metrics.optimizer_passes = outcome.stats.passes;
            outcome.root
        } else {
            output.root
        };
        metrics.nodes_after = ast.node_count();

        Ok((tokens, ast, output.warnings))
    }

    /// Cache key: normalized expression text, sorted bindings, and the
    /// flags that change the outcome.
    fn cache_key(&self, text: &str, bindings: &Bindings) -> u64 {
        let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut pairs: Vec<(&str, u64)> = bindings
            .iter()
            .map(|(name, value)| {
                let bits = match value {
                    Value::Number(v) => v.to_bits(),
                    Value::Boolean(b) => u64::from(*b) | (1 << 63),
                };
                (name.as_str(), bits)
            })
            .collect();
        pairs.sort_unstable();

        let mut hasher = ahash::AHasher::default();
        normalized.hash(&mut hasher);
        pairs.hash(&mut hasher);
        self.options.enable_optimization.hash(&mut hasher);
        self.options.enable_validation.hash(&mut hasher);
        self.options.error_recovery.hash(&mut hasher);
        self.grammar.fingerprint().hash(&mut hasher);
        hasher.finish()
    }
}

/// Convenience: bindings from name/number pairs.
#[must_use]
pub fn number_bindings(pairs: &[(&str, f64)]) -> Bindings {
    pairs
        .iter()
        .map(|(name, value)| (CompactString::from(*name), Value::Number(*value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_scenario_precedence() {
        let engine = FormulaEngine::new();
        let report = engine.evaluate("3 + 4 * 2", &Bindings::new()).unwrap();
        assert_eq!(report.value, Value::Number(11.0));
        assert!(!report.metrics.cache_hit);
        assert!(report.metrics.shifts > 0);
    }

    #[test]
    fn test_cache_hit_on_second_evaluation() {
        let engine = FormulaEngine::new();
        let bindings = number_bindings(&[("x", 5.0)]);
        let first = engine.evaluate("{x} * 2", &bindings).unwrap();
        assert!(!first.metrics.cache_hit);
        let second = engine.evaluate("{x} * 2", &bindings).unwrap();
        assert!(second.metrics.cache_hit);
        assert_eq!(second.value, first.value);
    }

    #[test]
    fn test_cache_distinguishes_bindings() {
        let engine = FormulaEngine::new();
        let a = engine
            .evaluate("x + 1", &number_bindings(&[("x", 1.0)]))
            .unwrap();
        let b = engine
            .evaluate("x + 1", &number_bindings(&[("x", 2.0)]))
            .unwrap();
        assert_eq!(a.value, Value::Number(2.0));
        assert_eq!(b.value, Value::Number(3.0));
        assert!(!b.metrics.cache_hit);
    }

    #[test]
    fn test_normalized_text_shares_cache_slot() {
        let engine = FormulaEngine::new();
        engine.evaluate("1+2", &Bindings::new()).unwrap();
        // Whitespace-only differences normalize to the same key.
        let report = engine.evaluate("1 + 2", &Bindings::new()).unwrap();
        assert!(report.metrics.cache_hit);
    }

    #[test]
    fn test_expression_length_limit() {
        let mut options = EngineOptions::default();
        options.limits.max_expression_length = 8;
        let engine = FormulaEngine::with_options(options);
        let err = engine.evaluate("1 + 2 + 3 + 4", &Bindings::new()).unwrap_err();
        assert!(matches!(
            err,
            FormulaError::ResourceLimit(ResourceLimitError {
                kind: LimitKind::ExpressionLength,
                ..
            })
        ));
    }

    #[test]
    fn test_fifo_eviction() {
        let mut cache = FifoCache::new(2);
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.insert(3, "c");
        assert!(cache.get(1).is_none());
        assert_eq!(cache.get(2), Some(&"b"));
        assert_eq!(cache.get(3), Some(&"c"));
    }

    #[test]
    fn test_fifo_reinsert_keeps_position() {
        let mut cache = FifoCache::new(2);
        cache.insert(1, "a");
        cache.insert(2, "b");
        cache.insert(1, "a2");
        cache.insert(3, "c");
        // Re-inserting key 1 does not refresh its age: it is still evicted
        // first.
        assert!(cache.get(1).is_none());
        assert_eq!(cache.get(2), Some(&"b"));
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let options = EngineOptions {
            result_cache_capacity: 0,
            ..EngineOptions::default()
        };
        let engine = FormulaEngine::with_options(options);
        engine.evaluate("1 + 1", &Bindings::new()).unwrap();
        let again = engine.evaluate("1 + 1", &Bindings::new()).unwrap();
        assert!(!again.metrics.cache_hit);
    }

    #[test]
    fn test_optimization_flag_off_keeps_raw_tree() {
        let options = EngineOptions {
            enable_optimization: false,
            ..EngineOptions::default()
        };
        let engine = FormulaEngine::with_options(options);
        let report = engine.evaluate("2 + 3 * 4", &Bindings::new()).unwrap();
        assert_eq!(report.value, Value::Number(14.0));
        assert_eq!(report.metrics.nodes_before, report.metrics.nodes_after);
        assert!(matches!(&*report.ast, AstNode::Binary { .. }));
    }

    #[test]
    fn test_rendered_output() {
        let engine = FormulaEngine::new();
        let report = engine
            .evaluate("IF(x > 3, 10, 20)", &number_bindings(&[("x", 5.0)]))
            .unwrap();
        assert_eq!(report.value, Value::Number(10.0));
        assert!(report.rendered.starts_with("IF("));
    }
}
