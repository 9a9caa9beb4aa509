//! Check command handler

use std::path::Path;

use anyhow::{Context, Result};

use codeblock_core::{try_equivalent, SessionError};

use crate::output::Output;

/// Compare a candidate file against a solution file
pub fn run(candidate: &Path, solution: &Path, output: &Output) -> Result<()> {
    let candidate = std::fs::read_to_string(candidate)
        .with_context(|| format!("Failed to read candidate {:?}", candidate))?;
    let solution = std::fs::read_to_string(solution)
        .with_context(|| format!("Failed to read solution {:?}", solution))?;

    let equivalent = try_equivalent(&candidate, &solution).map_err(SessionError::from)?;
    output.print_verdict(equivalent);
    Ok(())
}
