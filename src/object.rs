use serde::Serialize;
use std::fmt;

/// Identity of a monitored entity: the host itself or one running workload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum ObjectId {
    Host(String),
    Machine(String),
}

impl ObjectId {
    pub fn host(name: impl Into<String>) -> Self {
        ObjectId::Host(name.into())
    }

    pub fn machine(name: impl Into<String>) -> Self {
        ObjectId::Machine(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            ObjectId::Host(n) | ObjectId::Machine(n) => n,
        }
    }

    pub fn is_host(&self) -> bool {
        matches!(self, ObjectId::Host(_))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectId::Host(n) => write!(f, "host:{n}"),
            ObjectId::Machine(n) => write!(f, "machine:{n}"),
        }
    }
}
