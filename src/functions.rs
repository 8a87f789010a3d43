// Built-in function protocol and implementations

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::ast::{AstNode, CallForm};
use crate::evaluator::EvaluatorError;

/// The evaluation state a built-in function runs against.
///
/// Implemented by the evaluator's call frame; tests substitute their own.
pub trait EvaluationContext {
    /// The current context value (`$`), `None` when there is none.
    fn context_value(&self) -> Option<&Value>;

    /// Evaluate a sub-expression against the current context value.
    /// `Ok(None)` means the expression produced no value.
    fn evaluate(&mut self, node: &AstNode) -> Result<Option<Value>, EvaluatorError>;
}

/// Borrowed view of a parsed function invocation
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'a> {
    pub name: &'a str,
    pub args: &'a [AstNode],
    pub form: CallForm,
}

impl<'a> CallSite<'a> {
    pub fn new(name: &'a str, args: &'a [AstNode], form: CallForm) -> Self {
        CallSite { name, args, form }
    }

    /// Number of explicit arguments written at the call site
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// The value expression of an object-literal call, i.e. `expr` in
    /// `$f({ "key": expr })`. `None` for list-form calls.
    pub fn object_value(&self) -> Option<&'a AstNode> {
        if self.form != CallForm::ObjectLiteral {
            return None;
        }
        match self.args.first()? {
            AstNode::Object(pairs) => pairs.first().map(|(_, value)| value),
            _ => None,
        }
    }
}

/// A built-in function the evaluator can dispatch to
pub trait Function {
    /// Name without the `$` prefix
    fn name(&self) -> &'static str;

    /// Fewest explicit arguments accepted by the dispatcher
    fn min_args(&self) -> usize;

    /// Most explicit arguments accepted by the dispatcher
    fn max_args(&self) -> usize;

    /// JSONata signature string, e.g. `<s-:x>`
    fn signature(&self) -> &'static str;

    /// Invoke the function. `Ok(None)` is an undefined result.
    fn invoke(
        &self,
        context: &mut dyn EvaluationContext,
        call: &CallSite<'_>,
    ) -> Result<Option<Value>, EvaluatorError>;
}

/// Evaluate the explicit argument at `index`.
///
/// Missing arguments and arguments that evaluate to nothing both yield `None`.
pub fn argument_at(
    context: &mut dyn EvaluationContext,
    call: &CallSite<'_>,
    index: usize,
) -> Result<Option<Value>, EvaluatorError> {
    match call.args.get(index) {
        Some(node) => context.evaluate(node),
        None => Ok(None),
    }
}

/// Name-indexed table of built-in functions, in registration order
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: IndexMap<&'static str, Rc<dyn Function>>,
}

impl FunctionRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in this crate provides
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(error::ErrorFunction);
        registry
    }

    /// Register a function, returning the one it replaced
    pub fn register<F: Function + 'static>(&mut self, function: F) -> Option<Rc<dyn Function>> {
        self.functions.insert(function.name(), Rc::new(function))
    }

    pub fn get(&self, name: &str) -> Option<Rc<dyn Function>> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.functions.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// $error()
pub mod error {
    use std::convert::Infallible;

    use log::trace;
    use once_cell::sync::Lazy;

    use super::*;
    use crate::signature::{ParamType, Parameter, Signature};

    pub const NO_ARGUMENTS: &str = "$error() function evaluated with no arguments";
    pub const GENERIC: &str = "$error() function evaluated";
    pub const ERR_ARG1_BAD_TYPE: &str =
        "Argument 1 of function \"$error\" does not match function signature";
    pub const ERR_ARG2_BAD_TYPE: &str =
        "Argument 2 of function \"$error\" does not match function signature";

    /// `$error(str)` throws an error with `str` as its message.
    ///
    /// When `str` is omitted the context value is used in its place. A
    /// non-string message is itself an error. The object-literal form
    /// `$error({ "message": expr })` evaluates `expr` and throws it as the
    /// message when it is a string.
    ///
    /// Never returns a value.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ErrorFunction;

    /// `<s-:x>`
    static SIGNATURE: Lazy<Signature> = Lazy::new(|| {
        Signature::new(
            vec![Parameter {
                param_type: ParamType::String,
                optional: false,
                variadic: false,
                context: true,
            }],
            ParamType::Any,
        )
    });

    impl ErrorFunction {
        /// The declared signature in parsed form
        pub fn signature_spec(&self) -> &'static Signature {
            &SIGNATURE
        }

        /// Resolve the arguments and produce the failure this call raises.
        pub fn raise(
            &self,
            context: &mut dyn EvaluationContext,
            call: &CallSite<'_>,
        ) -> Result<Infallible, EvaluatorError> {
            let mut use_context = self.signature_spec().use_context(call);
            let mut arg_count = call.arg_count();
            let mut context_arg = None;

            if use_context {
                match context.context_value() {
                    Some(value) if !value.is_null() => {
                        arg_count += 1;
                        context_arg = Some(value.clone());
                    }
                    _ => use_context = false,
                }
            }

            trace!(
                "${}: {} explicit, {} effective argument(s), context {}",
                call.name,
                call.arg_count(),
                arg_count,
                if use_context { "used" } else { "unused" }
            );

            match (arg_count, use_context) {
                (0, _) => Err(EvaluatorError::raised(NO_ARGUMENTS)),

                (1, _) => {
                    let message = if use_context {
                        context_arg
                    } else {
                        argument_at(context, call, 0)?
                    };

                    match message {
                        Some(Value::String(message)) => Err(EvaluatorError::raised(message)),
                        _ => Err(EvaluatorError::raised(ERR_ARG1_BAD_TYPE)),
                    }
                }

                // Two arguments only come from the context filling in for an
                // object-literal call.
                (2, false) => Err(EvaluatorError::raised(ERR_ARG2_BAD_TYPE)),

                (2, true) => {
                    let message = match call.object_value() {
                        Some(node) => context.evaluate(node)?,
                        None => None,
                    };

                    match message {
                        Some(Value::String(message)) => Err(EvaluatorError::raised(message)),
                        _ => Err(EvaluatorError::raised(GENERIC)),
                    }
                }

                _ => Err(EvaluatorError::raised(ERR_ARG2_BAD_TYPE)),
            }
        }
    }

    impl Function for ErrorFunction {
        fn name(&self) -> &'static str {
            "error"
        }

        fn min_args(&self) -> usize {
            0
        }

        // The context value may add one more
        fn max_args(&self) -> usize {
            1
        }

        fn signature(&self) -> &'static str {
            "<s-:x>"
        }

        fn invoke(
            &self,
            context: &mut dyn EvaluationContext,
            call: &CallSite<'_>,
        ) -> Result<Option<Value>, EvaluatorError> {
            match self.raise(context, call)? {}
        }
    }
}
