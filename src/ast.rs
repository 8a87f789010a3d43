// Abstract Syntax Tree definitions

use serde::{Deserialize, Serialize};

/// A step in a path expression
///
/// Each step is evaluated with the result of the previous step as its
/// context value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    /// The main step node (field name, function call, literal, ...)
    pub node: AstNode,
}

/// How the arguments of a function call were written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CallForm {
    /// Plain argument list: `$f(a, b)`
    #[default]
    List,

    /// Single object-literal argument carrying the value expression:
    /// `$f({ "message": expr })`
    ObjectLiteral,
}

/// AST Node types
///
/// This enum represents the node types the evaluator understands. There is
/// no parser in this crate; trees are built directly or deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AstNode {
    /// String literal (e.g., "hello", 'world')
    String(String),

    /// Field/property name in path expressions (e.g., foo in foo.bar)
    /// This is distinct from String: Name is a field access, String is a literal value
    Name(String),

    /// Number literal
    Number(f64),

    /// Boolean literal
    Boolean(bool),

    /// Null literal
    Null,

    /// Undefined literal (no value)
    Undefined,

    /// Variable reference (e.g., $var). The empty name is `$`, the context value.
    Variable(String),

    /// Path expression (e.g., foo.bar)
    Path {
        steps: Vec<PathStep>,
    },

    /// Function call by name
    Function {
        name: String,
        args: Vec<AstNode>,
        /// Whether this was called with $ prefix (built-in function)
        /// True for $string(x), false for string(x)
        is_builtin: bool,
        /// Whether the arguments use the object-literal call form
        #[serde(default)]
        form: CallForm,
    },

    /// Array constructor
    Array(Vec<AstNode>),

    /// Object constructor
    Object(Vec<(AstNode, AstNode)>),

    /// Block expression; evaluates to its last expression
    Block(Vec<AstNode>),
}

impl PathStep {
    /// Create a path step from a node
    pub fn new(node: AstNode) -> Self {
        PathStep { node }
    }
}

impl AstNode {
    /// Create a string literal node
    pub fn string(s: impl Into<String>) -> Self {
        AstNode::String(s.into())
    }

    /// Create a field name node
    pub fn name(s: impl Into<String>) -> Self {
        AstNode::Name(s.into())
    }

    /// Create a number literal node
    pub fn number(n: f64) -> Self {
        AstNode::Number(n)
    }

    /// Create a boolean literal node
    pub fn boolean(b: bool) -> Self {
        AstNode::Boolean(b)
    }

    /// Create a null literal node
    pub fn null() -> Self {
        AstNode::Null
    }

    /// Create an undefined literal node
    pub fn undefined() -> Self {
        AstNode::Undefined
    }

    /// Create a variable reference node
    pub fn variable(name: impl Into<String>) -> Self {
        AstNode::Variable(name.into())
    }

    /// Create a path from a sequence of step nodes
    pub fn path(steps: impl IntoIterator<Item = AstNode>) -> Self {
        AstNode::Path {
            steps: steps.into_iter().map(PathStep::new).collect(),
        }
    }

    /// Create a `$name(args...)` call in list form
    pub fn call(name: impl Into<String>, args: Vec<AstNode>) -> Self {
        AstNode::Function {
            name: name.into(),
            args,
            is_builtin: true,
            form: CallForm::List,
        }
    }

    /// Create a `$name({ key: value })` call in object-literal form
    pub fn call_object(name: impl Into<String>, key: impl Into<String>, value: AstNode) -> Self {
        AstNode::Function {
            name: name.into(),
            args: vec![AstNode::Object(vec![(AstNode::string(key), value)])],
            is_builtin: true,
            form: CallForm::ObjectLiteral,
        }
    }
}
