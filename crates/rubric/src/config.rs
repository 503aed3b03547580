//! Policy constants and tunable limits for the pipeline.
//!
//! Every operation that could loop or grow without bound is capped here and
//! fails fast with a [`crate::error::ResourceLimitError`] (or a
//! [`crate::error::GrammarError`] for grammar-sized limits) when exceeded.

/// Largest magnitude a numeric literal may carry.
pub const MAX_NUMBER_MAGNITUDE: f64 = 1.0e15;

/// Most arguments a single function call may take.
pub const MAX_CALL_ARGS: usize = 16;

/// Most productions a grammar description may declare.
pub const MAX_PRODUCTIONS: usize = 512;

/// Most LR(1) states the builder will construct before giving up.
pub const MAX_STATES: usize = 20_000;

/// Runtime bounds for a single parse/optimize/evaluate trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum automaton iterations per parse.
    pub max_parse_steps: usize,
    /// Maximum parser stack depth.
    pub max_stack_depth: usize,
    /// Maximum AST node count after parsing.
    pub max_node_count: usize,
    /// Maximum AST depth after parsing.
    pub max_node_depth: usize,
    /// Maximum number of distinct variables in one expression.
    pub max_variables: usize,
    /// Maximum optimizer passes before the fixed point is declared reached.
    pub max_optimizer_passes: usize,
    /// Maximum tokens error recovery may skip in one parse.
    pub max_recovery_skips: usize,
    /// Maximum expression length in bytes.
    pub max_expression_length: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_parse_steps: 100_000,
            max_stack_depth: 256,
            max_node_count: 10_000,
            max_node_depth: 64,
            max_variables: 128,
            max_optimizer_passes: 8,
            max_recovery_skips: 8,
            max_expression_length: 64 * 1024,
        }
    }
}

/// Engine-level switches and bounds.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Run the multi-pass optimizer on the raw AST.
    pub enable_optimization: bool,
    /// Enforce AST resource limits and treat unresolved table conflicts as
    /// fatal [`crate::error::ConflictError`]s.
    pub enable_validation: bool,
    /// Skip offending tokens (bounded) instead of failing the parse.
    pub error_recovery: bool,
    /// Capacity of the expression-result cache; zero disables it.
    pub result_cache_capacity: usize,
    pub limits: Limits,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            enable_optimization: true,
            enable_validation: true,
            error_recovery: false,
            result_cache_capacity: 256,
            limits: Limits::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits_are_positive() {
        let limits = Limits::default();
        assert!(limits.max_parse_steps > 0);
        assert!(limits.max_stack_depth > 0);
        assert!(limits.max_optimizer_passes > 0);
    }

    #[test]
    fn test_default_options() {
        let options = EngineOptions::default();
        assert!(options.enable_optimization);
        assert!(options.enable_validation);
        assert!(!options.error_recovery);
    }
}
