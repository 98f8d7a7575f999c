//! Named, pluggable execution runtimes.
//!
//! A runtime turns an [`ExecutionInput`] into a [`SimpleResult`] and never
//! lets an internal failure escape as an error: parse errors, handler
//! failures and unknown commands all come back as a non-zero status code
//! with a diagnostic output.

use gossamer_common::{ExecutionInput, SimpleResult};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

mod command;
mod expression;

pub use command::CommandRuntime;
pub use expression::ExpressionRuntime;

/// A named executor. `name()` is unique within a registry.
pub trait ExecutionRuntime: Send + Sync {
    fn name(&self) -> &str;

    /// Execute the input. Failures are data, never errors.
    fn execute(&self, input: &ExecutionInput) -> SimpleResult;
}

/// Explicit name-to-implementation map, populated once at startup.
#[derive(Default)]
pub struct RuntimeRegistry {
    runtimes: HashMap<String, Arc<dyn ExecutionRuntime>>,
}

impl RuntimeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, runtime: Arc<dyn ExecutionRuntime>) {
        self.runtimes.insert(runtime.name().to_string(), runtime);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ExecutionRuntime>> {
        self.runtimes.get(name).cloned()
    }

    /// Registered runtime names, advertised as node capabilities.
    pub fn names(&self) -> BTreeSet<String> {
        self.runtimes.keys().cloned().collect()
    }
}
