//! Input domain description
//!
//! The domain is supplied by the (external) source analyzer: one entry per
//! function parameter, each with a type and the declared range of values.

use crate::error::{Error, Result};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashSet;
use std::path::Path;

/// Character used to build boundary-length strings
const BOUNDARY_CHAR: char = 'a';

/// Largest `max_len` accepted for text and list parameters
pub const MAX_COLLECTION_LEN: usize = 1 << 20;

/// Declared type and range of a single parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ParamType {
    /// Signed integer in `[min, max]`
    Int {
        /// Inclusive lower bound
        min: i64,
        /// Inclusive upper bound
        max: i64,
    },
    /// Finite float in `[min, max]`
    Float {
        /// Inclusive lower bound
        min: f64,
        /// Inclusive upper bound
        max: f64,
    },
    /// Boolean flag
    Bool,
    /// Free text with a bounded length
    Text {
        /// Minimum length in characters
        #[serde(default)]
        min_len: usize,
        /// Maximum length in characters
        max_len: usize,
    },
    /// One of a fixed set of labels
    Choice {
        /// Allowed labels
        options: Vec<String>,
    },
    /// List of integers in `[min, max]`
    IntList {
        /// Inclusive lower bound per element
        min: i64,
        /// Inclusive upper bound per element
        max: i64,
        /// Maximum list length
        max_len: usize,
    },
    /// List of finite floats in `[min, max]`
    FloatList {
        /// Inclusive lower bound per element
        min: f64,
        /// Inclusive upper bound per element
        max: f64,
        /// Maximum list length
        max_len: usize,
    },
}

impl ParamType {
    /// Short tag used in logs and error messages
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Int { .. } => "int",
            Self::Float { .. } => "float",
            Self::Bool => "bool",
            Self::Text { .. } => "text",
            Self::Choice { .. } => "choice",
            Self::IntList { .. } => "int-list",
            Self::FloatList { .. } => "float-list",
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        let invalid = |reason: String| Err(Error::InvalidDomain(format!("'{name}': {reason}")));
        if let Self::Text { max_len, .. }
        | Self::IntList { max_len, .. }
        | Self::FloatList { max_len, .. } = self
        {
            if *max_len > MAX_COLLECTION_LEN {
                return invalid(format!("max_len {max_len} exceeds {MAX_COLLECTION_LEN}"));
            }
        }
        match self {
            Self::Int { min, max } | Self::IntList { min, max, .. } if min > max => {
                invalid(format!("empty range [{min}, {max}]"))
            }
            Self::Float { min, max } | Self::FloatList { min, max, .. } => {
                if !min.is_finite() || !max.is_finite() {
                    invalid(format!("non-finite bounds [{min}, {max}]"))
                } else if min > max {
                    invalid(format!("empty range [{min}, {max}]"))
                } else {
                    Ok(())
                }
            }
            Self::Text { min_len, max_len } if max_len < min_len => {
                invalid(format!("max_len {max_len} < min_len {min_len}"))
            }
            Self::Choice { options } if options.is_empty() => invalid("no options".to_string()),
            _ => Ok(()),
        }
    }

    /// Deterministic boundary values: zero, min, max, then a typical midpoint
    #[must_use]
    pub fn boundary_values(&self) -> Vec<Value> {
        let values = match self {
            Self::Int { min, max } => {
                let mut v = Vec::with_capacity(4);
                if (*min..=*max).contains(&0) {
                    v.push(Value::Int(0));
                }
                v.extend([Value::Int(*min), Value::Int(*max), Value::Int(mid_i64(*min, *max))]);
                v
            }
            Self::Float { min, max } => {
                let mut v = Vec::with_capacity(4);
                if *min <= 0.0 && 0.0 <= *max {
                    v.push(Value::Float(0.0));
                }
                v.extend([
                    Value::Float(*min),
                    Value::Float(*max),
                    Value::Float(mid_f64(*min, *max)),
                ]);
                v
            }
            Self::Bool => vec![Value::Bool(false), Value::Bool(true)],
            Self::Text { min_len, max_len } => {
                let one = (*min_len).max(1).min(*max_len);
                [*min_len, one, *max_len]
                    .into_iter()
                    .map(|len| Value::Text(BOUNDARY_CHAR.to_string().repeat(len)))
                    .collect()
            }
            Self::Choice { options } => options.iter().cloned().map(Value::Text).collect(),
            Self::IntList { min, max, max_len } => {
                if *max_len == 0 {
                    vec![Value::IntList(Vec::new())]
                } else {
                    vec![
                        Value::IntList(Vec::new()),
                        Value::IntList(vec![*min]),
                        Value::IntList(vec![*max]),
                        Value::IntList(vec![mid_i64(*min, *max); *max_len]),
                    ]
                }
            }
            Self::FloatList { min, max, max_len } => {
                if *max_len == 0 {
                    vec![Value::FloatList(Vec::new())]
                } else {
                    vec![
                        Value::FloatList(Vec::new()),
                        Value::FloatList(vec![*min]),
                        Value::FloatList(vec![*max]),
                        Value::FloatList(vec![mid_f64(*min, *max); *max_len]),
                    ]
                }
            }
        };
        let mut seen: Vec<Value> = Vec::with_capacity(values.len());
        for value in values {
            if !seen.contains(&value) {
                seen.push(value);
            }
        }
        seen
    }

    /// A representative in-range value
    #[must_use]
    pub fn typical(&self) -> Value {
        match self {
            Self::Int { min, max } => Value::Int(mid_i64(*min, *max)),
            Self::Float { min, max } => Value::Float(mid_f64(*min, *max)),
            Self::Bool => Value::Bool(false),
            Self::Text { min_len, .. } => Value::Text(BOUNDARY_CHAR.to_string().repeat(*min_len)),
            Self::Choice { options } => {
                Value::Text(options.first().cloned().unwrap_or_default())
            }
            Self::IntList { .. } => Value::IntList(Vec::new()),
            Self::FloatList { .. } => Value::FloatList(Vec::new()),
        }
    }
}

fn mid_i64(min: i64, max: i64) -> i64 {
    // i128 keeps i64::MIN..=i64::MAX from overflowing
    ((i128::from(min) + i128::from(max)) / 2) as i64
}

fn mid_f64(min: f64, max: f64) -> f64 {
    min / 2.0 + max / 2.0
}

/// One named parameter of the function under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name
    pub name: String,
    /// Declared type and range
    #[serde(flatten)]
    pub kind: ParamType,
}

impl ParameterSpec {
    /// Create a new parameter spec
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ParamType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Input domain of the function under test
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputDomain {
    /// Parameters in declaration order
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

impl InputDomain {
    /// Create a domain from parameters
    #[must_use]
    pub fn new(parameters: Vec<ParameterSpec>) -> Self {
        Self { parameters }
    }

    /// Add a parameter
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, kind: ParamType) -> Self {
        self.parameters.push(ParameterSpec::new(name, kind));
        self
    }

    /// Number of parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Whether the function takes no parameters
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Check that every parameter can be sampled
    ///
    /// # Errors
    ///
    /// Returns `InvalidDomain` for empty ranges, empty option sets,
    /// non-finite bounds, or empty/duplicate parameter names.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::with_capacity(self.parameters.len());
        for param in &self.parameters {
            if param.name.trim().is_empty() {
                return Err(Error::InvalidDomain(
                    "parameter with empty name".to_string(),
                ));
            }
            if !names.insert(param.name.as_str()) {
                return Err(Error::InvalidDomain(format!(
                    "duplicate parameter '{}'",
                    param.name
                )));
            }
            param.kind.validate(&param.name)?;
        }
        Ok(())
    }

    /// Parse and validate a JSON domain description
    ///
    /// # Errors
    ///
    /// Returns `InvalidDomain` if the text is malformed, names an unsupported
    /// type, or describes an unsampleable range.
    pub fn from_json(text: &str) -> Result<Self> {
        let domain: Self = serde_json::from_str(text)
            .map_err(|e| Error::InvalidDomain(format!("malformed domain description: {e}")))?;
        domain.validate()?;
        Ok(domain)
    }

    /// Parse and validate a YAML domain description
    ///
    /// # Errors
    ///
    /// Same as [`InputDomain::from_json`].
    pub fn from_yaml(text: &str) -> Result<Self> {
        let domain: Self = serde_yaml::from_str(text).map_err(|e| Error::from_yaml(&e))?;
        domain.validate()?;
        Ok(domain)
    }

    /// Load a domain description from a `.json`, `.yaml` or `.yml` file
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read, otherwise as
    /// [`InputDomain::from_json`].
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            _ => Self::from_yaml(&text),
        }
    }
}

/// A single input value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// Boolean
    Bool(bool),
    /// Text or categorical label
    Text(String),
    /// Integer list
    IntList(Vec<i64>),
    /// Float list
    FloatList(Vec<f64>),
}

impl Value {
    /// Render the value as a single command-line argument
    #[must_use]
    pub fn to_arg(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Float(v) => format!("{v:?}"),
            Self::Bool(v) => v.to_string(),
            Self::Text(v) => v.clone(),
            Self::IntList(v) => join(v.iter().map(ToString::to_string)),
            Self::FloatList(v) => join(v.iter().map(|x| format!("{x:?}"))),
        }
    }
}

fn join(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join(",")
}

/// Mapping from parameter name to value, in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputVector {
    entries: Vec<(String, Value)>,
}

impl InputVector {
    /// Create an empty input vector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a named value
    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.entries.push((name.into(), value));
    }

    /// Look up a value by parameter name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Iterate over `(name, value)` pairs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Values in declaration order
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the vector is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize as a single-line JSON object
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Serialize for InputVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
