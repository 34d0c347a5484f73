//! Runtime types
//!
//! The binding-layer type a property surfaces as. Model references are kept
//! symbolic (by alias) until a registry is available to resolve them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A binding-layer type.
///
/// String form: `Element`, `<name>`, `@<alias>`, `List<inner>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RuntimeType {
    /// The generic element facade (no typed binding)
    Element,
    /// A concrete type, e.g. `String`, `i64` or a compiled model type
    Named(String),
    /// The model type for a content type alias, not yet resolved
    ModelRef(String),
    /// A list of the inner type
    List(Box<RuntimeType>),
}

impl RuntimeType {
    pub fn named(name: impl Into<String>) -> Self {
        RuntimeType::Named(name.into())
    }

    pub fn model(alias: impl Into<String>) -> Self {
        RuntimeType::ModelRef(alias.into())
    }

    pub fn list_of(inner: RuntimeType) -> Self {
        RuntimeType::List(Box::new(inner))
    }

    /// Rewrites every model reference through `resolve`, recursing into lists.
    pub fn map_models<F>(&self, resolve: &F) -> RuntimeType
    where
        F: Fn(&str) -> RuntimeType,
    {
        match self {
            RuntimeType::ModelRef(alias) => resolve(alias),
            RuntimeType::List(inner) => RuntimeType::List(Box::new(inner.map_models(resolve))),
            other => other.clone(),
        }
    }
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeType::Element => f.write_str("Element"),
            RuntimeType::Named(name) => f.write_str(name),
            RuntimeType::ModelRef(alias) => write!(f, "@{}", alias),
            RuntimeType::List(inner) => write!(f, "List<{}>", inner),
        }
    }
}

impl FromStr for RuntimeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty runtime type".to_string());
        }
        if s == "Element" {
            return Ok(RuntimeType::Element);
        }
        if let Some(alias) = s.strip_prefix('@') {
            if alias.is_empty() {
                return Err("model reference without alias".to_string());
            }
            return Ok(RuntimeType::ModelRef(alias.to_string()));
        }
        if let Some(rest) = s.strip_prefix("List<") {
            let inner = rest
                .strip_suffix('>')
                .ok_or_else(|| format!("unterminated list type: {}", s))?;
            return Ok(RuntimeType::List(Box::new(inner.parse()?)));
        }
        if s.contains(['<', '>', '@']) {
            return Err(format!("malformed runtime type: {}", s));
        }
        Ok(RuntimeType::Named(s.to_string()))
    }
}

impl TryFrom<String> for RuntimeType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RuntimeType> for String {
    fn from(value: RuntimeType) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_list_of_model() {
        let parsed: RuntimeType = "List<List<@blogPost>>".parse().unwrap();
        assert_eq!(
            parsed,
            RuntimeType::list_of(RuntimeType::list_of(RuntimeType::model("blogPost")))
        );
        assert_eq!(parsed.to_string(), "List<List<@blogPost>>");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("List<String".parse::<RuntimeType>().is_err());
        assert!("@".parse::<RuntimeType>().is_err());
        assert!("".parse::<RuntimeType>().is_err());
    }

    #[test]
    fn test_map_models_recurses() {
        let ty = RuntimeType::list_of(RuntimeType::model("author"));
        let mapped = ty.map_models(&|alias| RuntimeType::named(format!("Model_{}", alias)));
        assert_eq!(mapped.to_string(), "List<Model_author>");
    }
}
