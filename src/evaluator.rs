// Expression evaluator

use std::collections::HashMap;
use std::rc::Rc;

use log::debug;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::ast::{AstNode, CallForm, PathStep};
use crate::functions::{CallSite, EvaluationContext, FunctionRegistry};
use crate::signature::{self, SignatureError};
use crate::utils;

/// Evaluator errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluatorError {
    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Reference error: {0}")]
    ReferenceError(String),

    /// Failure raised while evaluating; displays the bare message
    #[error("{0}")]
    EvaluationError(String),
}

impl EvaluatorError {
    /// An evaluation failure carrying `message` verbatim
    pub fn raised(message: impl Into<String>) -> Self {
        EvaluatorError::EvaluationError(message.into())
    }

    /// The message without any category prefix
    pub fn message(&self) -> &str {
        match self {
            EvaluatorError::TypeError(message)
            | EvaluatorError::ReferenceError(message)
            | EvaluatorError::EvaluationError(message) => message,
        }
    }
}

impl From<SignatureError> for EvaluatorError {
    fn from(e: SignatureError) -> Self {
        EvaluatorError::TypeError(e.to_string())
    }
}

/// Default limit on nested evaluation depth
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 302;

/// Evaluator configuration
///
/// Deserializable so hosts can load it alongside their own settings; missing
/// fields take their default.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EvaluatorOptions {
    /// Nesting depth past which evaluation fails with U1001
    pub max_recursion_depth: usize,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        EvaluatorOptions {
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }
}

/// Evaluation context
///
/// Holds variable bindings and the built-in function table
pub struct Context {
    pub(crate) bindings: HashMap<String, Value>,
    functions: Rc<FunctionRegistry>,
}

impl Context {
    pub fn new() -> Self {
        Self::with_functions(FunctionRegistry::with_builtins())
    }

    pub fn with_functions(functions: FunctionRegistry) -> Self {
        Context {
            bindings: HashMap::new(),
            functions: Rc::new(functions),
        }
    }

    pub fn bind(&mut self, name: String, value: Value) {
        self.bindings.insert(name, value);
    }

    pub fn unbind(&mut self, name: &str) {
        self.bindings.remove(name);
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluator for JSONata expressions
pub struct Evaluator {
    context: Context,
    recursion_depth: usize,
    max_recursion_depth: usize,
}

/// A function call in progress: the evaluator plus the data the call was
/// evaluated against.
struct Frame<'e> {
    evaluator: &'e mut Evaluator,
    data: Option<&'e Value>,
}

impl EvaluationContext for Frame<'_> {
    fn context_value(&self) -> Option<&Value> {
        self.data
    }

    fn evaluate(&mut self, node: &AstNode) -> Result<Option<Value>, EvaluatorError> {
        self.evaluator.evaluate_internal(node, self.data)
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self::with_options(EvaluatorOptions::default())
    }

    pub fn with_options(options: EvaluatorOptions) -> Self {
        Self::with_context_and_options(Context::new(), options)
    }

    pub fn with_context(context: Context) -> Self {
        Self::with_context_and_options(context, EvaluatorOptions::default())
    }

    pub fn with_context_and_options(context: Context, options: EvaluatorOptions) -> Self {
        Evaluator {
            context,
            recursion_depth: 0,
            max_recursion_depth: options.max_recursion_depth,
        }
    }

    /// Bind a variable visible as `$name`
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.context.bind(name.into(), value);
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Evaluate an AST node against input data
    ///
    /// `data` is the initial context value; `None` evaluates with no input.
    /// `Ok(None)` means the expression produced no value.
    pub fn evaluate(
        &mut self,
        node: &AstNode,
        data: Option<&Value>,
    ) -> Result<Option<Value>, EvaluatorError> {
        self.recursion_depth = 0;
        self.evaluate_internal(node, data)
    }

    /// Internal evaluation method
    fn evaluate_internal(
        &mut self,
        node: &AstNode,
        data: Option<&Value>,
    ) -> Result<Option<Value>, EvaluatorError> {
        // Check recursion depth to prevent stack overflow
        self.recursion_depth += 1;
        if self.recursion_depth > self.max_recursion_depth {
            self.recursion_depth -= 1;
            return Err(EvaluatorError::EvaluationError(format!(
                "U1001: Stack overflow - maximum recursion depth ({}) exceeded",
                self.max_recursion_depth
            )));
        }

        let result = self.evaluate_internal_impl(node, data);

        self.recursion_depth -= 1;
        result
    }

    /// Internal evaluation implementation (separated to allow depth tracking)
    fn evaluate_internal_impl(
        &mut self,
        node: &AstNode,
        data: Option<&Value>,
    ) -> Result<Option<Value>, EvaluatorError> {
        match node {
            AstNode::String(s) => Ok(Some(Value::String(s.clone()))),

            // Name nodes represent field access on the current data
            AstNode::Name(field_name) => Ok(data.and_then(|data| lookup_field(data, field_name))),

            AstNode::Number(n) => {
                // Preserve integer-ness: if the number is a whole number, create an integer Value
                if n.fract() == 0.0 && n.is_finite() && n.abs() < (1i64 << 53) as f64 {
                    Ok(Some(serde_json::json!(*n as i64)))
                } else {
                    Ok(Some(serde_json::json!(*n)))
                }
            }
            AstNode::Boolean(b) => Ok(Some(Value::Bool(*b))),
            AstNode::Null => Ok(Some(Value::Null)),
            AstNode::Undefined => Ok(None),

            AstNode::Variable(name) => {
                // $ alone (empty name) refers to the current context
                if name.is_empty() {
                    return Ok(data.cloned());
                }
                // Unbound variables are undefined
                Ok(self.context.lookup(name).cloned())
            }

            AstNode::Path { steps } => self.evaluate_path(steps, data),

            // Array constructor:
            // - If element is itself an array constructor [...], keep it nested
            // - Otherwise, if element evaluates to an array, flatten it
            // - Undefined values are excluded
            AstNode::Array(elements) => {
                let mut result = Vec::new();
                for element in elements {
                    let is_array_constructor = matches!(element, AstNode::Array(_));

                    match self.evaluate_internal(element, data)? {
                        None => continue,
                        Some(Value::Array(arr)) if !is_array_constructor => result.extend(arr),
                        Some(value) => result.push(value),
                    }
                }
                Ok(Some(Value::Array(result)))
            }

            AstNode::Object(pairs) => {
                let mut result = serde_json::Map::new();

                for (key_node, value_node) in pairs {
                    // Evaluate key (must be a string)
                    let key = match self.evaluate_internal(key_node, data)? {
                        Some(Value::String(s)) => s,
                        None | Some(Value::Null) => continue,
                        Some(other) => {
                            return Err(EvaluatorError::TypeError(format!(
                                "T1003: Object key must be a string, got: {}",
                                other
                            )));
                        }
                    };

                    // Skip key-value pairs where the value is undefined
                    if let Some(value) = self.evaluate_internal(value_node, data)? {
                        result.insert(key, value);
                    }
                }
                Ok(Some(Value::Object(result)))
            }

            AstNode::Block(expressions) => {
                let mut result = None;
                for expr in expressions {
                    result = self.evaluate_internal(expr, data)?;
                }
                Ok(result)
            }

            AstNode::Function {
                name,
                args,
                is_builtin,
                form,
            } => self.evaluate_function_call(name, args, *is_builtin, *form, data),
        }
    }

    /// Evaluate path steps left to right, each against the previous result
    ///
    /// When the input to a step is an array, the step is applied to each
    /// element and the results are flattened.
    fn evaluate_path(
        &mut self,
        steps: &[PathStep],
        data: Option<&Value>,
    ) -> Result<Option<Value>, EvaluatorError> {
        let mut current = data.cloned();

        for (index, step) in steps.iter().enumerate() {
            current = match current {
                // Literals and calls in the first step see the input as-is
                Some(Value::Array(items)) if index > 0 || matches!(step.node, AstNode::Name(_)) => {
                    let mut results = Vec::new();
                    for item in &items {
                        if let Some(value) = self.evaluate_internal(&step.node, Some(item))? {
                            results.push(value);
                        }
                    }
                    utils::collapse(utils::flatten(&results))
                }
                other => self.evaluate_internal(&step.node, other.as_ref())?,
            };

            if current.is_none() {
                break;
            }
        }

        Ok(current)
    }

    fn evaluate_function_call(
        &mut self,
        name: &str,
        args: &[AstNode],
        is_builtin: bool,
        form: CallForm,
        data: Option<&Value>,
    ) -> Result<Option<Value>, EvaluatorError> {
        // Names called without the $ prefix are never built-ins
        let function = match self.context.functions().get(name) {
            Some(function) if is_builtin => function,
            _ => {
                return Err(EvaluatorError::ReferenceError(format!(
                    "Unknown function: {}{}",
                    if is_builtin { "$" } else { "" },
                    name
                )))
            }
        };

        let call = CallSite::new(name, args, form);

        // Reject explicit argument counts outside the declared bounds before
        // any context substitution takes place.
        signature::validate_bounds(
            name,
            function.min_args(),
            Some(function.max_args()),
            call.arg_count(),
        )?;

        debug!(
            "invoking ${} with {} explicit argument(s) ({:?} form)",
            name,
            call.arg_count(),
            form
        );

        let mut frame = Frame {
            evaluator: self,
            data,
        };
        function.invoke(&mut frame, &call)
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Field access on a single value. Arrays map the lookup over their objects.
fn lookup_field(data: &Value, field_name: &str) -> Option<Value> {
    match data {
        Value::Object(obj) => obj.get(field_name).cloned(),
        Value::Array(arr) => {
            let values: Vec<Value> = arr
                .iter()
                .filter_map(|item| match item {
                    Value::Object(obj) => obj.get(field_name).cloned(),
                    _ => None,
                })
                .collect();
            utils::collapse(utils::flatten(&values))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::error::{ERR_ARG1_BAD_TYPE, GENERIC, NO_ARGUMENTS};
    use serde_json::json;

    #[test]
    fn test_evaluate_literals() {
        let mut evaluator = Evaluator::new();

        // String literal
        let result = evaluator.evaluate(&AstNode::string("hello"), None).unwrap();
        assert_eq!(result, Some(Value::String("hello".to_string())));

        // Number literal
        let result = evaluator.evaluate(&AstNode::number(42.0), None).unwrap();
        assert_eq!(result, Some(json!(42)));

        let result = evaluator.evaluate(&AstNode::number(1.5), None).unwrap();
        assert_eq!(result, Some(json!(1.5)));

        // Boolean literal
        let result = evaluator.evaluate(&AstNode::boolean(true), None).unwrap();
        assert_eq!(result, Some(Value::Bool(true)));

        // Null literal
        let result = evaluator.evaluate(&AstNode::null(), None).unwrap();
        assert_eq!(result, Some(Value::Null));

        // Undefined literal
        let result = evaluator.evaluate(&AstNode::undefined(), None).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_evaluate_variables() {
        let mut evaluator = Evaluator::new();
        let data = json!({"a": 1});

        evaluator.bind("x", json!(100));

        let result = evaluator.evaluate(&AstNode::variable("x"), None).unwrap();
        assert_eq!(result, Some(json!(100)));

        // $ is the context value
        let result = evaluator.evaluate(&AstNode::variable(""), Some(&data)).unwrap();
        assert_eq!(result, Some(data));

        // Unbound variables are undefined
        let result = evaluator.evaluate(&AstNode::variable("undefined"), None).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_unbind_variable() {
        let mut context = Context::new();
        context.bind("reason".to_string(), json!("quota"));
        assert_eq!(context.lookup("reason"), Some(&json!("quota")));

        context.unbind("reason");
        assert_eq!(context.lookup("reason"), None);

        // Unbound again: evaluates to nothing
        let mut evaluator = Evaluator::with_context(context);
        let result = evaluator.evaluate(&AstNode::variable("reason"), None).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_evaluate_path() {
        let mut evaluator = Evaluator::new();
        let data = json!({
            "foo": {
                "bar": {
                    "baz": 42
                }
            }
        });

        let path = AstNode::path([AstNode::name("foo")]);
        let result = evaluator.evaluate(&path, Some(&data)).unwrap();
        assert_eq!(result, Some(json!({"bar": {"baz": 42}})));

        let path = AstNode::path([
            AstNode::name("foo"),
            AstNode::name("bar"),
            AstNode::name("baz"),
        ]);
        let result = evaluator.evaluate(&path, Some(&data)).unwrap();
        assert_eq!(result, Some(json!(42)));

        let path = AstNode::path([AstNode::name("foo"), AstNode::name("missing")]);
        let result = evaluator.evaluate(&path, Some(&data)).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_evaluate_path_over_arrays() {
        let mut evaluator = Evaluator::new();
        let data = json!({
            "orders": [
                {"items": [{"sku": "a"}, {"sku": "b"}]},
                {"items": [{"sku": "c"}]},
                {"other": true}
            ]
        });

        let path = AstNode::path([
            AstNode::name("orders"),
            AstNode::name("items"),
            AstNode::name("sku"),
        ]);
        let result = evaluator.evaluate(&path, Some(&data)).unwrap();
        assert_eq!(result, Some(json!(["a", "b", "c"])));

        let single = json!({"orders": [{"id": 7}]});
        let path = AstNode::path([AstNode::name("orders"), AstNode::name("id")]);
        let result = evaluator.evaluate(&path, Some(&single)).unwrap();
        assert_eq!(result, Some(json!(7)));
    }

    #[test]
    fn test_evaluate_constructors() {
        let mut evaluator = Evaluator::new();
        let data = json!({"name": "Alice", "tags": ["x", "y"]});

        let array = AstNode::Array(vec![
            AstNode::number(1.0),
            AstNode::undefined(),
            AstNode::name("tags"),
            AstNode::Array(vec![AstNode::number(2.0)]),
        ]);
        let result = evaluator.evaluate(&array, Some(&data)).unwrap();
        assert_eq!(result, Some(json!([1, "x", "y", [2]])));

        let object = AstNode::Object(vec![
            (AstNode::string("who"), AstNode::name("name")),
            (AstNode::string("gone"), AstNode::name("missing")),
        ]);
        let result = evaluator.evaluate(&object, Some(&data)).unwrap();
        assert_eq!(result, Some(json!({"who": "Alice"})));

        let bad_key = AstNode::Object(vec![(AstNode::number(1.0), AstNode::null())]);
        let err = evaluator.evaluate(&bad_key, Some(&data)).unwrap_err();
        assert!(matches!(err, EvaluatorError::TypeError(_)));
    }

    #[test]
    fn test_evaluate_block() {
        let mut evaluator = Evaluator::new();
        let block = AstNode::Block(vec![AstNode::number(1.0), AstNode::string("last")]);
        let result = evaluator.evaluate(&block, None).unwrap();
        assert_eq!(result, Some(json!("last")));

        let result = evaluator.evaluate(&AstNode::Block(vec![]), None).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_error_function_dispatch() {
        let mut evaluator = Evaluator::new();

        let call = AstNode::call("error", vec![AstNode::string("Hello World")]);
        let err = evaluator.evaluate(&call, None).unwrap_err();
        assert_eq!(err, EvaluatorError::EvaluationError("Hello World".to_string()));

        let call = AstNode::call("error", vec![]);
        let err = evaluator.evaluate(&call, None).unwrap_err();
        assert_eq!(err.message(), NO_ARGUMENTS);

        let err = evaluator.evaluate(&call, Some(&json!("ctx-msg"))).unwrap_err();
        assert_eq!(err.message(), "ctx-msg");

        let err = evaluator.evaluate(&call, Some(&json!(42))).unwrap_err();
        assert_eq!(err.message(), ERR_ARG1_BAD_TYPE);
    }

    #[test]
    fn test_error_function_in_path_uses_step_context() {
        let mut evaluator = Evaluator::new();
        let data = json!({"problem": "disk full"});

        let path = AstNode::path([AstNode::name("problem"), AstNode::call("error", vec![])]);
        let err = evaluator.evaluate(&path, Some(&data)).unwrap_err();
        assert_eq!(err.message(), "disk full");

        // A missing step stops the path before the call
        let path = AstNode::path([AstNode::name("missing"), AstNode::call("error", vec![])]);
        assert_eq!(evaluator.evaluate(&path, Some(&data)).unwrap(), None);
    }

    #[test]
    fn test_error_function_object_literal_form() {
        let mut evaluator = Evaluator::new();
        let data = json!({"code": 7, "text": "bad input"});

        let call = AstNode::call_object("error", "message", AstNode::name("text"));
        let err = evaluator.evaluate(&call, Some(&data)).unwrap_err();
        assert_eq!(err.message(), "bad input");

        let call = AstNode::call_object("error", "message", AstNode::name("code"));
        let err = evaluator.evaluate(&call, Some(&data)).unwrap_err();
        assert_eq!(err.message(), GENERIC);

        // No context: the object is the lone argument and is not a string
        let err = evaluator.evaluate(&call, None).unwrap_err();
        assert_eq!(err.message(), ERR_ARG1_BAD_TYPE);
    }

    #[test]
    fn test_declared_bounds_enforced_before_invoke() {
        let mut evaluator = Evaluator::new();
        let call = AstNode::call("error", vec![AstNode::string("a"), AstNode::string("b")]);
        let err = evaluator.evaluate(&call, Some(&json!("ctx"))).unwrap_err();
        assert_eq!(
            err,
            EvaluatorError::TypeError(
                "Argument count mismatch for function $error: expected 0 to 1, got 2".to_string()
            )
        );
    }

    #[test]
    fn test_unknown_function() {
        let mut evaluator = Evaluator::new();

        let call = AstNode::call("nope", vec![]);
        let err = evaluator.evaluate(&call, None).unwrap_err();
        assert_eq!(err, EvaluatorError::ReferenceError("Unknown function: $nope".to_string()));

        // error(...) without the $ prefix is not the built-in
        let call = AstNode::Function {
            name: "error".to_string(),
            args: vec![AstNode::string("x")],
            is_builtin: false,
            form: CallForm::List,
        };
        let err = evaluator.evaluate(&call, None).unwrap_err();
        assert!(matches!(err, EvaluatorError::ReferenceError(_)));

        let mut evaluator = Evaluator::with_context(Context::with_functions(FunctionRegistry::new()));
        let call = AstNode::call("error", vec![AstNode::string("x")]);
        let err = evaluator.evaluate(&call, None).unwrap_err();
        assert!(matches!(err, EvaluatorError::ReferenceError(_)));
    }

    #[test]
    fn test_recursion_limit() {
        let mut node = AstNode::string("deep");
        for _ in 0..10 {
            node = AstNode::Block(vec![node]);
        }

        let mut evaluator = Evaluator::with_options(EvaluatorOptions {
            max_recursion_depth: 5,
        });
        let err = evaluator.evaluate(&node, None).unwrap_err();
        assert_eq!(
            err.message(),
            "U1001: Stack overflow - maximum recursion depth (5) exceeded"
        );

        // The evaluator is usable again afterwards
        let result = evaluator.evaluate(&AstNode::string("ok"), None).unwrap();
        assert_eq!(result, Some(json!("ok")));

        let mut evaluator = Evaluator::new();
        assert_eq!(evaluator.evaluate(&node, None).unwrap(), Some(json!("deep")));
    }

    #[test]
    fn test_custom_registry_with_options() {
        let mut node = AstNode::call("error", vec![AstNode::string("unreached")]);
        for _ in 0..3 {
            node = AstNode::Block(vec![node]);
        }

        let context = Context::with_functions(FunctionRegistry::with_builtins());
        let mut evaluator = Evaluator::with_context_and_options(
            context,
            EvaluatorOptions {
                max_recursion_depth: 2,
            },
        );
        let err = evaluator.evaluate(&node, None).unwrap_err();
        assert_eq!(
            err.message(),
            "U1001: Stack overflow - maximum recursion depth (2) exceeded"
        );

        // with_context keeps the default limit
        let context = Context::with_functions(FunctionRegistry::with_builtins());
        let mut evaluator = Evaluator::with_context(context);
        let err = evaluator.evaluate(&node, None).unwrap_err();
        assert_eq!(err.message(), "unreached");
    }

    #[test]
    fn test_options_deserialize() {
        let options: EvaluatorOptions = serde_json::from_value(json!({})).unwrap();
        assert_eq!(options, EvaluatorOptions::default());
        assert_eq!(options.max_recursion_depth, DEFAULT_MAX_RECURSION_DEPTH);

        let options: EvaluatorOptions =
            serde_json::from_value(json!({"max_recursion_depth": 12})).unwrap();
        assert_eq!(options.max_recursion_depth, 12);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(EvaluatorError::raised("plain").to_string(), "plain");
        assert_eq!(
            EvaluatorError::TypeError("t".to_string()).to_string(),
            "Type error: t"
        );
        assert_eq!(EvaluatorError::ReferenceError("r".to_string()).message(), "r");
    }
}
