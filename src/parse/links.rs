//! Offset sources: the values other clients publish that a descriptor may take its offset from.
use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

use ahash::AHashMap;
use thiserror::Error;

use super::expr::EvalContext;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("unknown offset source '{0}'")]
    Unknown(String),
    #[error("offset source '{0}' is not numeric")]
    NotNumeric(String),
    #[error("offset source '{name}' unavailable: {reason}")]
    Unavailable { name: String, reason: String },
}

/// A value that can be read as an offset at request time.
pub trait OffsetSource: Send + Sync {
    fn current(&self) -> Result<i64, LinkError>;

    fn is_numeric(&self) -> bool {
        true
    }
}

impl OffsetSource for AtomicI64 {
    fn current(&self) -> Result<i64, LinkError> {
        Ok(self.load(Ordering::Acquire))
    }
}

/// Name resolution for offset references.
pub trait OffsetLinks {
    fn lookup(&self, name: &str) -> Result<Arc<dyn OffsetSource>, LinkError>;
}

#[derive(Default)]
pub struct LinkTable {
    sources: AHashMap<String, Arc<dyn OffsetSource>>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, source: Arc<dyn OffsetSource>) {
        self.sources.insert(name.into(), source);
    }

    /// Register a plain integer cell under `name` and return it for the publisher.
    pub fn publish(&mut self, name: impl Into<String>, initial: i64) -> Arc<AtomicI64> {
        let cell = Arc::new(AtomicI64::new(initial));
        self.insert(name, cell.clone());
        cell
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl OffsetLinks for LinkTable {
    fn lookup(&self, name: &str) -> Result<Arc<dyn OffsetSource>, LinkError> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| LinkError::Unknown(name.to_string()))
    }
}

/// The link a client adapter hands to the parser.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Link<'a> {
    /// Instrument address text, the only kind a register descriptor can come from.
    Instrument(&'a str),
    Constant(f64),
    Database(&'a str),
}

impl Link<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Link::Instrument(_) => "instrument",
            Link::Constant(_) => "constant",
            Link::Database(_) => "database",
        }
    }
}

pub(super) struct SourceContext<'a>(pub &'a dyn OffsetSource);

impl EvalContext for SourceContext<'_> {
    fn read_link(&mut self) -> Result<i64, LinkError> {
        self.0.current()
    }
}
