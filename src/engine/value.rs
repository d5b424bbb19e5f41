// Copyright © 2024 Pathway

use std::fmt::{self, Display};

use serde::Serialize;
use xxhash_rust::xxh3::Xxh3 as Hasher;

/// A single cell of a row written to a persistent store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    String(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::String(_) => "string",
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Type {
    Bool,
    Int,
    String,
}

impl Type {
    pub fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::Bool, Value::Bool(_)) | (Self::Int, Value::Int(_)) | (Self::String, Value::String(_))
        )
    }
}

pub trait HashInto {
    fn hash_into(&self, hasher: &mut Hasher);
}

impl<T: HashInto + ?Sized> HashInto for &T {
    fn hash_into(&self, hasher: &mut Hasher) {
        (*self).hash_into(hasher);
    }
}

impl HashInto for u64 {
    fn hash_into(&self, hasher: &mut Hasher) {
        hasher.update(&self.to_le_bytes());
    }
}

impl HashInto for usize {
    fn hash_into(&self, hasher: &mut Hasher) {
        (*self as u64).hash_into(hasher);
    }
}

impl HashInto for str {
    fn hash_into(&self, hasher: &mut Hasher) {
        // length prefix keeps ("ab", "c") and ("a", "bc") apart
        self.len().hash_into(hasher);
        hasher.update(self.as_bytes());
    }
}

impl HashInto for String {
    fn hash_into(&self, hasher: &mut Hasher) {
        self.as_str().hash_into(hasher);
    }
}

pub fn hash_of(value: &impl HashInto) -> u64 {
    let mut hasher = Hasher::default();
    value.hash_into(&mut hasher);
    hasher.digest()
}
