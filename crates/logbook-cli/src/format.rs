use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

/// Output format for command results
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text, one record per line
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

impl OutputFormat {
    /// Print `data`, using `text` to render it in text mode.
    pub fn emit<T, F>(self, data: &T, text: F) -> Result<()>
    where
        T: Serialize,
        F: FnOnce(&T) -> String,
    {
        let out = match self {
            Self::Json => serde_json::to_string_pretty(data).context("JSON serialization failed")?,
            Self::Text => text(data),
        };
        if !out.is_empty() {
            println!("{out}");
        }
        Ok(())
    }
}
