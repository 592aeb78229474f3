//! Query resolution: CLI flag, then config, then an interactive prompt.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};

use crate::io::config::RunflowConfig;

pub const PROMPT: &str = "Enter your prompt: ";

/// Resolved query for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Provided(String),
    /// No query configured and prompting disabled; the flow runs without one.
    Absent,
    /// The query was blank; the run is skipped.
    Empty,
}

impl Query {
    pub fn as_deref(&self) -> Option<&str> {
        match self {
            Query::Provided(query) => Some(query.as_str()),
            Query::Absent | Query::Empty => None,
        }
    }
}

pub fn resolve_query<R: BufRead, W: Write>(
    cli_query: Option<String>,
    cfg: &RunflowConfig,
    input: &mut R,
    prompt_out: &mut W,
) -> Result<Query> {
    let raw = match cli_query.or_else(|| cfg.query.clone()) {
        Some(query) => query,
        None if cfg.interactive => {
            prompt_out.write_all(PROMPT.as_bytes()).context("write prompt")?;
            prompt_out.flush().context("flush prompt")?;
            let mut line = String::new();
            input.read_line(&mut line).context("read prompt")?;
            line
        }
        None => return Ok(Query::Absent),
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Ok(Query::Empty)
    } else {
        Ok(Query::Provided(trimmed.to_string()))
    }
}
