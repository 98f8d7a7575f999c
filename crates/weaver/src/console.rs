//! Interactive operator console on stdin.
//!
//! Lines are dispatched to the node's CLI runtime; a leading `delegate
//! <host> <port> <runtime> <command...>` routes through the execution
//! router instead, locally or to a peer.

use anyhow::{Context, Result};
use gossamer_common::{ExecutionInput, ExecutionResult, SimpleResult};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;

use crate::exec::ExecutionRouter;
use crate::runtime::ExecutionRuntime;

/// Tokenize an operator line: the first token is the command, `-key=value`
/// tokens become options (a bare `-flag` reads as `true`), everything else
/// is positional.
pub fn parse_command_line(line: &str) -> ExecutionInput {
    let mut tokens = line.split_whitespace();
    let command = tokens.next().unwrap_or_default().to_string();

    let mut positional = Vec::new();
    let mut options = HashMap::new();

    for token in tokens {
        if let Some(option) = token.strip_prefix('-') {
            match option.split_once('=') {
                Some((key, value)) => {
                    options.insert(format!("-{key}"), value.to_string());
                }
                None => {
                    options.insert(token.to_string(), "true".to_string());
                }
            }
        } else {
            positional.push(token.to_string());
        }
    }

    ExecutionInput::new(command)
        .with_args(positional)
        .with_options(options)
}

/// Run the console loop until stdin closes.
pub async fn run(cli: Arc<dyn ExecutionRuntime>, router: Arc<ExecutionRouter>) -> Result<()> {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    prompt()?;

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            prompt()?;
            continue;
        }

        let result = if let Some(rest) = line.strip_prefix("delegate ") {
            handle_delegate(&router, rest).await
        } else {
            ExecutionResult::Simple(cli.execute(&parse_command_line(line)))
        };

        println!("Status Code: {}", result.status_code());
        println!("\nMessage: \n{}", result.output());

        prompt()?;
    }

    Ok(())
}

async fn handle_delegate(router: &ExecutionRouter, rest: &str) -> ExecutionResult {
    let tokens: Vec<&str> = rest.split_whitespace().collect();

    let parsed = match tokens.as_slice() {
        [host, port, runtime, command @ ..] if !command.is_empty() => {
            match port.parse::<u16>() {
                Ok(port) => Some((host.to_string(), port, runtime.to_string(), command.join(" "))),
                Err(_) => None,
            }
        }
        _ => None,
    };

    let Some((host, port, runtime, command_line)) = parsed else {
        return ExecutionResult::Simple(SimpleResult::new(
            1,
            "usage: delegate <host> <port> <runtime> <command...>",
        ));
    };

    router
        .route(&host, port, &runtime, parse_command_line(&command_line))
        .await
}

fn prompt() -> Result<()> {
    print!("> ");
    std::io::stdout().flush().context("Failed to flush stdout")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_and_positionals() {
        let input = parse_command_line("join node-b 7002");
        assert_eq!(input.command, "join");
        assert_eq!(input.positional_arguments, vec!["node-b", "7002"]);
        assert!(input.options.is_empty());
    }

    #[test]
    fn options_keep_their_dash() {
        let input = parse_command_line("run a -mode=fast -verbose b");
        assert_eq!(input.command, "run");
        assert_eq!(input.positional_arguments, vec!["a", "b"]);
        assert_eq!(input.options.get("-mode").map(String::as_str), Some("fast"));
        assert_eq!(
            input.options.get("-verbose").map(String::as_str),
            Some("true")
        );
    }

    #[test]
    fn empty_line_yields_empty_command() {
        let input = parse_command_line("");
        assert_eq!(input.command, "");
        assert!(input.positional_arguments.is_empty());
    }
}
