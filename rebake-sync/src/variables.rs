//! Variable reconciliation: find template variables the project has never
//! seen and collect values for them.

use std::io::{BufRead, Write};
use std::path::Path;

use serde_json::Value;

use rebake_core::Variables;
use rebake_renderer::{Manifest, TemplateRenderer};

use crate::error::SyncError;

/// Public manifest entries whose names are absent from `old_context`,
/// in declaration order, with their raw defaults.
pub fn new_variables(manifest: &Manifest, old_context: &Variables) -> Variables {
    manifest
        .public()
        .filter(|(name, _)| !old_context.contains_key(name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Read the manifest of the template checked out at `template_dir` and
/// return the variables `old_context` lacks.
pub fn detect_new(
    renderer: &impl TemplateRenderer,
    template_dir: &Path,
    old_context: &Variables,
) -> Result<Variables, SyncError> {
    let manifest = renderer.manifest(template_dir)?;
    Ok(new_variables(&manifest, old_context))
}

/// Source of values for newly introduced variables.
#[cfg_attr(test, mockall::automock)]
pub trait Prompter {
    /// Values for `new_vars` (name → default). Called at most once per run.
    fn prompt(&mut self, new_vars: &Variables) -> Result<Variables, SyncError>;
}

/// Ask `prompter` for values, unless there is nothing to ask.
pub fn collect_values(
    new_vars: &Variables,
    prompter: &mut impl Prompter,
) -> Result<Variables, SyncError> {
    if new_vars.is_empty() {
        return Ok(Variables::new());
    }
    prompter.prompt(new_vars)
}

/// The value a non-interactive run picks: first choice or the plain default.
pub fn default_value(default: &Value) -> Value {
    match default {
        Value::Array(choices) => choices.first().cloned().unwrap_or(Value::Null),
        other => other.clone(),
    }
}

/// Accepts every default without asking.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultsPrompter;

impl Prompter for DefaultsPrompter {
    fn prompt(&mut self, new_vars: &Variables) -> Result<Variables, SyncError> {
        Ok(new_vars
            .iter()
            .map(|(name, default)| (name.clone(), default_value(default)))
            .collect())
    }
}

/// Line-oriented prompter over any reader/writer pair.
///
/// An empty answer accepts the default. Choice variables list their options
/// and take either the option number or its text.
pub struct TerminalPrompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalPrompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        TerminalPrompter { input, output }
    }

    fn write(&mut self, text: &str) -> Result<(), SyncError> {
        self.output
            .write_all(text.as_bytes())
            .and_then(|_| self.output.flush())
            .map_err(|e| SyncError::Prompt(format!("cannot write prompt: {e}")))
    }

    fn read_answer(&mut self, name: &str) -> Result<String, SyncError> {
        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .map_err(|e| SyncError::Prompt(format!("cannot read answer: {e}")))?;
        if read == 0 {
            return Err(SyncError::Prompt(format!(
                "input closed while asking for '{name}'"
            )));
        }
        Ok(line.trim().to_string())
    }

    fn ask_choice(&mut self, name: &str, choices: &[Value]) -> Result<Value, SyncError> {
        let mut text = format!("Select {name}:\n");
        for (i, choice) in choices.iter().enumerate() {
            text.push_str(&format!("  {} - {}\n", i + 1, display(choice)));
        }
        text.push_str(&format!("Choose from 1-{} [1]: ", choices.len()));

        loop {
            self.write(&text)?;
            let answer = self.read_answer(name)?;
            if answer.is_empty() {
                return Ok(choices.first().cloned().unwrap_or(Value::Null));
            }
            if let Ok(n) = answer.parse::<usize>() {
                if let Some(choice) = n.checked_sub(1).and_then(|i| choices.get(i)) {
                    return Ok(choice.clone());
                }
            }
            if let Some(choice) = choices.iter().find(|c| display(c) == answer) {
                return Ok(choice.clone());
            }
            self.write(&format!("'{answer}' is not one of the options.\n"))?;
        }
    }

    fn ask_value(&mut self, name: &str, default: &Value) -> Result<Value, SyncError> {
        self.write(&format!("{name} [{}]: ", display(default)))?;
        let answer = self.read_answer(name)?;
        if answer.is_empty() {
            return Ok(default.clone());
        }
        Ok(match default {
            Value::Bool(_) => match answer.to_ascii_lowercase().as_str() {
                "y" | "yes" | "true" | "1" | "on" => Value::Bool(true),
                "n" | "no" | "false" | "0" | "off" => Value::Bool(false),
                _ => Value::String(answer),
            },
            Value::Object(_) => serde_json::from_str(&answer).unwrap_or(Value::String(answer)),
            _ => Value::String(answer),
        })
    }
}

impl<R: BufRead, W: Write> Prompter for TerminalPrompter<R, W> {
    fn prompt(&mut self, new_vars: &Variables) -> Result<Variables, SyncError> {
        self.write("The template declares new variables:\n")?;
        let mut values = Variables::new();
        for (name, default) in new_vars {
            let value = match default {
                Value::Array(choices) if !choices.is_empty() => self.ask_choice(name, choices)?,
                other => self.ask_value(name, other)?,
            };
            values.insert(name.clone(), value);
        }
        Ok(values)
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
