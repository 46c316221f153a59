use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// High-level operator identity: `namespace::name[.overload]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperatorIdentity {
    namespace: String,
    name: String,
    overload: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityParseError {
    #[error("operator identity '{0}' is missing a '::' namespace separator")]
    MissingNamespace(String),
    #[error("operator identity '{0}' has an empty component")]
    EmptyComponent(String),
    #[error("operator identity '{0}' has more than one overload separator")]
    NestedOverload(String),
}

impl OperatorIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            overload: None,
        }
    }

    pub fn with_overload(mut self, overload: impl Into<String>) -> Self {
        self.overload = Some(overload.into());
        self
    }

    /// Shorthand for an identity in the `aten` namespace, parsing an optional overload suffix.
    pub fn aten(name: &str) -> Self {
        match name.split_once('.') {
            Some((base, overload)) => Self::new("aten", base).with_overload(overload),
            None => Self::new("aten", name),
        }
    }

    pub fn parse(text: &str) -> Result<Self, IdentityParseError> {
        let (namespace, rest) = text
            .split_once("::")
            .ok_or_else(|| IdentityParseError::MissingNamespace(text.to_string()))?;
        let (name, overload) = match rest.split_once('.') {
            Some((name, overload)) => {
                if overload.contains('.') {
                    return Err(IdentityParseError::NestedOverload(text.to_string()));
                }
                (name, Some(overload))
            }
            None => (rest, None),
        };
        if namespace.is_empty() || name.is_empty() || overload.is_some_and(str::is_empty) {
            return Err(IdentityParseError::EmptyComponent(text.to_string()));
        }
        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            overload: overload.map(str::to_string),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn overload(&self) -> Option<&str> {
        self.overload.as_deref()
    }
}

impl fmt::Display for OperatorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.namespace, self.name)?;
        if let Some(overload) = &self.overload {
            write!(f, ".{overload}")?;
        }
        Ok(())
    }
}

impl FromStr for OperatorIdentity {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for OperatorIdentity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for OperatorIdentity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        OperatorIdentity::parse(&text).map_err(serde::de::Error::custom)
    }
}
