//! Builtin numeric function library.
//!
//! Functions are looked up by name (ASCII case-insensitive) and arity.
//! Domain violations are typed errors, never silent NaNs.

use crate::error::EvaluationError;
use crate::eval::{FunctionLibrary, Value};

/// Signature of a builtin implementation.
type NumericFn = fn(&[f64]) -> Result<f64, EvaluationError>;

struct Builtin {
    name: &'static str,
    min_arity: usize,
    /// `None` means variadic above `min_arity`.
    max_arity: Option<usize>,
    apply: NumericFn,
}

/// The standard function library shipped with the engine.
///
/// | name  | arity | notes                          |
/// |-------|-------|--------------------------------|
/// | ABS   | 1     |                                |
/// | MIN   | 2+    | variadic                       |
/// | MAX   | 2+    | variadic                       |
/// | ROUND | 1     | half away from zero            |
/// | FLOOR | 1     |                                |
/// | CEIL  | 1     |                                |
/// | SQRT  | 1     | domain error for negatives     |
/// | POW   | 2     | domain error on non-finite     |
/// | LN    | 1     | domain error for non-positives |
/// | LOG10 | 1     | domain error for non-positives |
pub struct Builtins {
    table: Vec<Builtin>,
}

impl Builtins {
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: vec![
                Builtin {
                    name: "ABS",
                    min_arity: 1,
                    max_arity: Some(1),
                    apply: |args| Ok(args[0].abs()),
                },
                Builtin {
                    name: "MIN",
                    min_arity: 2,
                    max_arity: None,
                    apply: |args| Ok(args.iter().copied().fold(f64::INFINITY, f64::min)),
                },
                Builtin {
                    name: "MAX",
                    min_arity: 2,
                    max_arity: None,
                    apply: |args| Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
                },
                Builtin {
                    name: "ROUND",
                    min_arity: 1,
                    max_arity: Some(1),
                    apply: |args| Ok(args[0].round()),
                },
                Builtin {
                    name: "FLOOR",
                    min_arity: 1,
                    max_arity: Some(1),
                    apply: |args| Ok(args[0].floor()),
                },
                Builtin {
                    name: "CEIL",
                    min_arity: 1,
                    max_arity: Some(1),
                    apply: |args| Ok(args[0].ceil()),
                },
                Builtin {
                    name: "SQRT",
                    min_arity: 1,
                    max_arity: Some(1),
                    apply: |args| {
                        if args[0] < 0.0 {
                            return Err(EvaluationError::DomainError {
                                function: "SQRT".to_string(),
                                message: format!("square root of negative number {}", args[0]),
                            });
                        }
                        Ok(args[0].sqrt())
                    },
                },
                Builtin {
                    name: "POW",
                    min_arity: 2,
                    max_arity: Some(2),
                    apply: |args| {
                        let result = args[0].powf(args[1]);
                        if result.is_finite() {
                            Ok(result)
                        } else {
                            Err(EvaluationError::DomainError {
                                function: "POW".to_string(),
                                message: format!("{}^{} is not finite", args[0], args[1]),
                            })
                        }
                    },
                },
                Builtin {
                    name: "LN",
                    min_arity: 1,
                    max_arity: Some(1),
                    apply: |args| {
                        if args[0] <= 0.0 {
                            return Err(EvaluationError::DomainError {
                                function: "LN".to_string(),
                                message: format!("logarithm of non-positive number {}", args[0]),
                            });
                        }
                        Ok(args[0].ln())
                    },
                },
                Builtin {
                    name: "LOG10",
                    min_arity: 1,
                    max_arity: Some(1),
                    apply: |args| {
                        if args[0] <= 0.0 {
                            return Err(EvaluationError::DomainError {
                                function: "LOG10".to_string(),
                                message: format!("logarithm of non-positive number {}", args[0]),
                            });
                        }
                        Ok(args[0].log10())
                    },
                },
            ],
        }
    }

    fn lookup(&self, name: &str) -> Option<&Builtin> {
        self.table
            .iter()
            .find(|b| b.name.eq_ignore_ascii_case(name))
    }

    fn arity_matches(builtin: &Builtin, arity: usize) -> bool {
        arity >= builtin.min_arity && builtin.max_arity.is_none_or(|max| arity <= max)
    }

    fn expected_arity(builtin: &Builtin) -> String {
        match builtin.max_arity {
            Some(max) if max == builtin.min_arity => max.to_string(),
            Some(max) => format!("{}..={}", builtin.min_arity, max),
            None => format!("{}+", builtin.min_arity),
        }
    }
}

impl Default for Builtins {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionLibrary for Builtins {
    fn call(&self, name: &str, args: &[Value]) -> Result<Value, EvaluationError> {
        let Some(builtin) = self.lookup(name) else {
            return Err(EvaluationError::UnknownFunction {
                name: name.to_string(),
                arity: args.len(),
            });
        };
        if !Self::arity_matches(builtin, args.len()) {
            return Err(EvaluationError::WrongArity {
                function: builtin.name.to_string(),
                expected: Self::expected_arity(builtin),
                found: args.len(),
            });
        }
        let mut numbers = Vec::with_capacity(args.len());
        for arg in args {
            numbers.push(arg.as_number("function argument")?);
        }
        let result = (builtin.apply)(&numbers)?;
        if !result.is_finite() {
            return Err(EvaluationError::DomainError {
                function: builtin.name.to_string(),
                message: "result is not finite".to_string(),
            });
        }
        Ok(Value::Number(result))
    }

    fn contains(&self, name: &str, arity: usize) -> bool {
        self.lookup(name)
            .is_some_and(|b| Self::arity_matches(b, arity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nums(values: &[f64]) -> Vec<Value> {
        values.iter().map(|v| Value::Number(*v)).collect()
    }

    #[test]
    fn test_basic_functions() {
        let lib = Builtins::new();
        assert_eq!(lib.call("ABS", &nums(&[-3.0])), Ok(Value::Number(3.0)));
        assert_eq!(lib.call("MIN", &nums(&[4.0, 2.0, 9.0])), Ok(Value::Number(2.0)));
        assert_eq!(lib.call("MAX", &nums(&[4.0, 2.0])), Ok(Value::Number(4.0)));
        assert_eq!(lib.call("FLOOR", &nums(&[2.9])), Ok(Value::Number(2.0)));
        assert_eq!(lib.call("CEIL", &nums(&[2.1])), Ok(Value::Number(3.0)));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let lib = Builtins::new();
        assert_eq!(lib.call("sqrt", &nums(&[9.0])), Ok(Value::Number(3.0)));
        assert!(lib.contains("Min", 2));
    }

    #[test]
    fn test_unknown_function() {
        let lib = Builtins::new();
        assert!(matches!(
            lib.call("NOPE", &nums(&[1.0])),
            Err(EvaluationError::UnknownFunction { .. })
        ));
        assert!(!lib.contains("NOPE", 1));
    }

    #[test]
    fn test_wrong_arity() {
        let lib = Builtins::new();
        assert!(matches!(
            lib.call("ABS", &nums(&[1.0, 2.0])),
            Err(EvaluationError::WrongArity { .. })
        ));
        assert!(matches!(
            lib.call("MIN", &nums(&[1.0])),
            Err(EvaluationError::WrongArity { .. })
        ));
        assert!(!lib.contains("MIN", 1));
        assert!(lib.contains("MIN", 5));
    }

    #[test]
    fn test_domain_errors() {
        let lib = Builtins::new();
        assert!(matches!(
            lib.call("SQRT", &nums(&[-1.0])),
            Err(EvaluationError::DomainError { .. })
        ));
        assert!(matches!(
            lib.call("LN", &nums(&[0.0])),
            Err(EvaluationError::DomainError { .. })
        ));
    }

    #[test]
    fn test_boolean_argument_rejected() {
        let lib = Builtins::new();
        assert!(matches!(
            lib.call("ABS", &[Value::Boolean(true)]),
            Err(EvaluationError::TypeMismatch { .. })
        ));
    }
}
