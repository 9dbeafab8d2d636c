//! Command-line interface and REPL
//!
//! The console is an external caller of the curator: it reads properties,
//! writes them through the change filter and triggers device resyncs.

use anyhow::{anyhow, bail, Result};
use rustyline::DefaultEditor;

use crate::state::{PropertyValue, StateCurator, StateType};

/// Parsed console command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get(String),
    Set(String, String),
    List,
    Sync,
    Help,
    Exit,
}

impl Command {
    /// Parse one console line; `Ok(None)` for a blank line
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb.to_lowercase().as_str() {
            "get" if !rest.is_empty() => Command::Get(rest.to_string()),
            "get" => bail!("usage: get <property>"),
            "set" => {
                let (name, value) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| anyhow!("usage: set <property> <value>"))?;
                Command::Set(name.to_string(), value.trim().to_string())
            }
            "list" | "ls" => Command::List,
            "sync" => Command::Sync,
            "help" | "?" => Command::Help,
            "exit" | "quit" => Command::Exit,
            other => bail!("Unknown command: {}", other),
        };
        Ok(Some(command))
    }
}

/// Run one command against the curator and return the text to print
pub fn execute<T: StateType>(curator: &StateCurator<T>, command: &Command) -> Result<String> {
    match command {
        Command::Get(name) => Ok(format!("{} = {}", name, curator.get_state(name)?)),
        Command::Set(name, text) => {
            let kind = curator
                .metadata()
                .descriptor(name)
                .map(|d| d.kind())
                .ok_or_else(|| anyhow!("Unknown property: {}", name))?;
            let value = PropertyValue::parse_as(kind, text)
                .ok_or_else(|| anyhow!("'{}' is not a valid {} value", text, kind))?;
            let changed = curator.set_property(name, value)?;
            Ok(if changed {
                format!("{} updated", name)
            } else {
                format!("{} unchanged", name)
            })
        }
        Command::List => {
            let metadata = curator.metadata().clone();
            let lines: Vec<String> = curator
                .snapshot()
                .into_iter()
                .map(|(name, value)| {
                    let range = metadata
                        .descriptor(&name)
                        .and_then(|d| d.range())
                        .map(|r| format!(" [{}, {}]", r.min, r.max))
                        .unwrap_or_default();
                    format!("{} = {}{}", name, value, range)
                })
                .collect();
            Ok(lines.join("\n"))
        }
        Command::Sync => {
            curator.update_state_producers();
            Ok("producers resynced".to_string())
        }
        Command::Help => Ok(
            "get <property> | set <property> <value> | list | sync | exit".to_string(),
        ),
        Command::Exit => Ok(String::new()),
    }
}

/// Interactive loop; blocks until `exit` or end of input
pub fn run_repl<T: StateType>(curator: StateCurator<T>) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline("state> ");
        let line = match readline {
            Ok(line) => line,
            Err(_) => break,
        };
        let _ = rl.add_history_entry(line.as_str());

        match Command::parse(&line) {
            Ok(Some(Command::Exit)) => break,
            Ok(Some(command)) => match execute(&curator, &command) {
                Ok(output) => println!("{}", output),
                Err(e) => println!("error: {:#}", e),
            },
            Ok(None) => {}
            Err(e) => println!("error: {}", e),
        }
    }

    Ok(())
}
