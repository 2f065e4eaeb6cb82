//! JEXL expression evaluator for condition steps.
//!
//! Wraps `jexl_eval::Evaluator` with a small set of pre-registered string
//! transforms. Unlike a `when`-clause filter, a condition step's expression
//! must evaluate to a JSON boolean: comparisons and boolean combinators
//! qualify, a bare path lookup that resolves to a string or number does not.
//!
//! Payloads are always passed as context objects, never interpolated into
//! expression strings.

use serde_json::{Value, json};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during condition evaluation.
#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    /// The expression is malformed or referenced an unsupported operation.
    #[error("expression evaluation failed: {0}")]
    EvalFailed(String),

    /// The expression evaluated to something other than a boolean.
    #[error("expression did not evaluate to a boolean: got {result}")]
    NotBoolean { result: Value },

    /// The evaluation context was not a JSON object.
    #[error("invalid context: {0}")]
    InvalidContext(String),
}

// ---------------------------------------------------------------------------
// ConditionEvaluator
// ---------------------------------------------------------------------------

/// Expression evaluator for condition steps.
///
/// Supports comparison operators, boolean combinators, and dotted-path
/// variable lookup into the context (e.g. `steps.fetch.output.total > 100`).
pub struct ConditionEvaluator {
    evaluator: jexl_eval::Evaluator<'static>,
}

impl ConditionEvaluator {
    /// Create a new evaluator with the standard transforms registered.
    pub fn new() -> Self {
        let evaluator = jexl_eval::Evaluator::new()
            .with_transform("lower", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.to_lowercase()))
            })
            .with_transform("upper", |args: &[Value]| {
                let s = args.first().and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(s.to_uppercase()))
            })
            .with_transform("contains", |args: &[Value]| {
                let subject = args.first().and_then(|v| v.as_str()).unwrap_or("");
                let search = args.get(1).and_then(|v| v.as_str()).unwrap_or("");
                Ok(json!(subject.contains(search)))
            })
            .with_transform("length", |args: &[Value]| {
                let val = args.first().cloned().unwrap_or(Value::Null);
                let len = match &val {
                    Value::String(s) => s.len(),
                    Value::Array(a) => a.len(),
                    Value::Object(o) => o.len(),
                    _ => 0,
                };
                Ok(json!(len as f64))
            })
            .with_transform("not", |args: &[Value]| {
                let val = args.first().cloned().unwrap_or(Value::Null);
                let truthy = match &val {
                    Value::Bool(b) => *b,
                    Value::Null => false,
                    Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
                    Value::String(s) => !s.is_empty(),
                    Value::Array(_) | Value::Object(_) => true,
                };
                Ok(json!(!truthy))
            });

        Self { evaluator }
    }

    /// Evaluate an expression against a context mapping.
    ///
    /// The context must be a JSON object. The result must be a JSON boolean;
    /// anything else is `EvaluationError::NotBoolean`. No side effects.
    pub fn evaluate(&self, expression: &str, context: &Value) -> Result<bool, EvaluationError> {
        if !context.is_object() {
            return Err(EvaluationError::InvalidContext(
                "context must be a JSON object".to_string(),
            ));
        }

        let result = self
            .evaluator
            .eval_in_context(expression, context)
            .map_err(|e| EvaluationError::EvalFailed(e.to_string()))?;

        match result {
            Value::Bool(b) => Ok(b),
            other => Err(EvaluationError::NotBoolean { result: other }),
        }
    }
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
