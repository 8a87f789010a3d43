// jsonata-core - JSONata evaluator core
// Copyright (c) 2025 jsonatapy contributors
// Licensed under the MIT License

//! # jsonata-core
//!
//! The evaluation core of a JSONata implementation: expression trees, function
//! signatures, built-in dispatch, and the `$error` built-in.
//!
//! ## Architecture
//!
//! - `ast` - Abstract Syntax Tree definitions
//! - `evaluator` - Expression evaluator (executes AST against data)
//! - `functions` - Built-in function protocol and implementations
//! - `signature` - Function signature parsing and validation
//! - `utils` - Sequence helpers
//!
//! There is no parser here; trees are built with the `AstNode` helpers or
//! deserialized with serde.
//!
//! ## Example
//!
//! ```
//! use jsonata_core::ast::AstNode;
//! use serde_json::json;
//!
//! let expr = AstNode::path([
//!     AstNode::name("status"),
//!     AstNode::call("error", vec![]),
//! ]);
//!
//! let err = jsonata_core::evaluate(&expr, &json!({"status": "offline"})).unwrap_err();
//! assert_eq!(err.to_string(), "offline");
//! ```

use serde_json::Value;

pub mod ast;
pub mod evaluator;
pub mod functions;
pub mod signature;
mod utils;

pub use evaluator::{Evaluator, EvaluatorError, EvaluatorOptions};
pub use functions::{CallSite, EvaluationContext, Function, FunctionRegistry};

/// Evaluate an expression against `data` with a fresh evaluator.
///
/// Returns `Ok(None)` when the expression produces no value.
pub fn evaluate(ast: &ast::AstNode, data: &Value) -> Result<Option<Value>, EvaluatorError> {
    Evaluator::new().evaluate(ast, Some(data))
}
