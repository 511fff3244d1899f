//! Dynamically-typed property values

use std::fmt;

use serde::{Deserialize, Serialize};

/// Value stored in a node property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Var {
    Bool(bool),
    Int(i64),
    Double(f64),
    Text(String),
}

impl Var {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Var::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Var::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers widen to doubles.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Var::Double(d) => Some(*d),
            Var::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Var::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Var::Bool(b) => write!(f, "{}", b),
            Var::Int(i) => write!(f, "{}", i),
            Var::Double(d) => write!(f, "{}", d),
            Var::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for Var {
    fn from(b: bool) -> Self {
        Var::Bool(b)
    }
}

impl From<i64> for Var {
    fn from(i: i64) -> Self {
        Var::Int(i)
    }
}

impl From<i32> for Var {
    fn from(i: i32) -> Self {
        Var::Int(i64::from(i))
    }
}

impl From<f64> for Var {
    fn from(d: f64) -> Self {
        Var::Double(d)
    }
}

impl From<&str> for Var {
    fn from(s: &str) -> Self {
        Var::Text(s.to_string())
    }
}

impl From<String> for Var {
    fn from(s: String) -> Self {
        Var::Text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_int_var_when_reading_as_double_then_widens() {
        assert_eq!(Var::from(3).as_double(), Some(3.0));
        assert_eq!(Var::from("x").as_int(), None);
    }
}
