//! Command-dispatch runtime: maps a command word plus arguments to a
//! caller-supplied handler.

use gossamer_common::{ExecutionInput, SimpleResult};

use super::ExecutionRuntime;

type CommandHandler = dyn Fn(&ExecutionInput) -> anyhow::Result<SimpleResult> + Send + Sync;

/// A runtime named `CLI[<handler>]` wrapping one command handler.
pub struct CommandRuntime {
    name: String,
    handler: Box<CommandHandler>,
}

impl CommandRuntime {
    pub fn new(
        handler_name: &str,
        handler: impl Fn(&ExecutionInput) -> anyhow::Result<SimpleResult> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: Self::qualified_name(handler_name),
            handler: Box::new(handler),
        }
    }

    /// Registry name for a handler: `CLI[<handler>]`.
    pub fn qualified_name(handler_name: &str) -> String {
        format!("CLI[{handler_name}]")
    }
}

impl ExecutionRuntime for CommandRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, input: &ExecutionInput) -> SimpleResult {
        match (self.handler)(input) {
            Ok(result) => result,
            Err(e) => SimpleResult::new(1, e.to_string()),
        }
    }
}
