// Function signature parsing and validation
//
// Signatures use the JSONata notation, e.g. `<s-:x>` or `<a<n>n?:n>`.

use thiserror::Error;

use crate::ast::CallForm;
use crate::functions::CallSite;

/// Signature validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignatureError {
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Argument count mismatch for function ${name}: expected {expected}, got {actual}")]
    ArgumentCountMismatch {
        name: String,
        expected: String,
        actual: usize,
    },
}

/// Parameter type
#[derive(Debug, Clone, PartialEq)]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Null,
    Array(Option<Box<ParamType>>),
    Object,
    Function,
    /// `u`: boolean, number, string or null
    Primitive,
    /// `j`: any JSON value
    Json,
    /// `x`: any value
    Any,
    /// `(...)`: one of the listed types
    Choice(Vec<ParamType>),
}

impl ParamType {
    fn from_symbol(symbol: char) -> Option<Self> {
        Some(match symbol {
            's' => ParamType::String,
            'n' => ParamType::Number,
            'b' => ParamType::Boolean,
            'l' => ParamType::Null,
            'a' => ParamType::Array(None),
            'o' => ParamType::Object,
            'f' => ParamType::Function,
            'u' => ParamType::Primitive,
            'j' => ParamType::Json,
            'x' => ParamType::Any,
            _ => return None,
        })
    }
}

/// Function parameter definition
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub param_type: ParamType,
    /// `?`
    pub optional: bool,
    /// `+`
    pub variadic: bool,
    /// `-`: the context value may stand in for a missing argument
    pub context: bool,
}

impl Parameter {
    fn new(param_type: ParamType) -> Self {
        Parameter {
            param_type,
            optional: false,
            variadic: false,
            context: false,
        }
    }
}

/// Function signature
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<Parameter>,
    pub return_type: ParamType,
}

impl Signature {
    /// Create a new signature
    pub fn new(params: Vec<Parameter>, return_type: ParamType) -> Self {
        Signature {
            params,
            return_type,
        }
    }

    /// Parse a signature string such as `<s-:x>`
    pub fn parse(signature: &str) -> Result<Self, SignatureError> {
        let invalid = || SignatureError::InvalidSignature(signature.to_string());

        let body = signature
            .strip_prefix('<')
            .and_then(|s| s.strip_suffix('>'))
            .ok_or_else(invalid)?;

        let (params_src, return_src) = match split_return(body) {
            Some((params, ret)) => (params, Some(ret)),
            None => (body, None),
        };

        let mut chars = params_src.chars().peekable();
        let mut params: Vec<Parameter> = Vec::new();

        while let Some(c) = chars.next() {
            match c {
                '?' | '+' | '-' => {
                    let param = params.last_mut().ok_or_else(invalid)?;
                    let flag = match c {
                        '?' => &mut param.optional,
                        '+' => &mut param.variadic,
                        _ => &mut param.context,
                    };
                    // Each modifier at most once per parameter
                    if *flag {
                        return Err(invalid());
                    }
                    *flag = true;
                }
                '(' => {
                    let mut choices = Vec::new();
                    loop {
                        match chars.next() {
                            Some(')') => break,
                            Some(symbol) => {
                                choices.push(ParamType::from_symbol(symbol).ok_or_else(invalid)?)
                            }
                            None => return Err(invalid()),
                        }
                    }
                    params.push(Parameter::new(ParamType::Choice(choices)));
                }
                '<' => {
                    // Subtype of the preceding array parameter, e.g. a<n>
                    let param = params.last_mut().ok_or_else(invalid)?;
                    if param.param_type != ParamType::Array(None) {
                        return Err(invalid());
                    }
                    let inner = chars
                        .next()
                        .and_then(ParamType::from_symbol)
                        .ok_or_else(invalid)?;
                    if chars.next() != Some('>') {
                        return Err(invalid());
                    }
                    param.param_type = ParamType::Array(Some(Box::new(inner)));
                }
                symbol => {
                    let param_type = ParamType::from_symbol(symbol).ok_or_else(invalid)?;
                    params.push(Parameter::new(param_type));
                }
            }
        }

        let return_type = match return_src {
            Some(ret) => {
                let mut ret_chars = ret.chars().peekable();
                let symbol = ret_chars.next().ok_or_else(invalid)?;
                let mut return_type = ParamType::from_symbol(symbol).ok_or_else(invalid)?;
                // Allow a<n> style return types
                if return_type == ParamType::Array(None) && ret_chars.peek() == Some(&'<') {
                    ret_chars.next();
                    let inner = ret_chars
                        .next()
                        .and_then(ParamType::from_symbol)
                        .ok_or_else(invalid)?;
                    if ret_chars.next() != Some('>') {
                        return Err(invalid());
                    }
                    return_type = ParamType::Array(Some(Box::new(inner)));
                }
                if ret_chars.next().is_some() {
                    return Err(invalid());
                }
                return_type
            }
            None => ParamType::Any,
        };

        Ok(Signature::new(params, return_type))
    }

    /// Minimum number of explicit arguments
    pub fn min_args(&self) -> usize {
        self.params
            .iter()
            .filter(|p| !p.optional && !p.context)
            .count()
    }

    /// Maximum number of explicit arguments, `None` when unbounded
    pub fn max_args(&self) -> Option<usize> {
        if self.params.iter().any(|p| p.variadic) {
            None
        } else {
            Some(self.params.len())
        }
    }

    /// Whether the first parameter may be taken from the context value
    pub fn accepts_context(&self) -> bool {
        self.params.first().map_or(false, |p| p.context)
    }

    /// Whether the call should fall back to the context value for its
    /// first argument.
    ///
    /// True when the signature accepts the context and either an argument
    /// slot is left unfilled or the call uses the object-literal form,
    /// which always engages the context slot.
    pub fn use_context(&self, call: &CallSite<'_>) -> bool {
        self.accepts_context()
            && (call.arg_count() < self.params.len() || call.form == CallForm::ObjectLiteral)
    }

    /// Validate argument count
    pub fn validate_arg_count(&self, name: &str, actual: usize) -> Result<(), SignatureError> {
        validate_bounds(name, self.min_args(), self.max_args(), actual)
    }
}

/// Check an explicit argument count against `[min, max]`; `max` of `None`
/// is unbounded.
pub fn validate_bounds(
    name: &str,
    min: usize,
    max: Option<usize>,
    actual: usize,
) -> Result<(), SignatureError> {
    if actual < min || max.map_or(false, |max| actual > max) {
        return Err(SignatureError::ArgumentCountMismatch {
            name: name.to_string(),
            expected: describe_bounds(min, max),
            actual,
        });
    }

    Ok(())
}

/// Human-readable arity range, e.g. "0 to 1" or "at least 2"
fn describe_bounds(min: usize, max: Option<usize>) -> String {
    match max {
        Some(max) if max == min => min.to_string(),
        Some(max) => format!("{} to {}", min, max),
        None => format!("at least {}", min),
    }
}

/// Split `params:return` on the colon that is not nested inside `<...>`
fn split_return(body: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (i, c) in body.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ':' if depth == 0 => return Some((&body[..i], &body[i + 1..])),
            _ => {}
        }
    }
    None
}
