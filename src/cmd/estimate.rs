//! Token estimation — `chunkgen estimate`.

use anyhow::Result;
use chunkgen::estimate::{estimate_output_tokens, estimate_tokens};
use std::path::Path;

use super::read_input;

pub fn cmd_estimate(file: &Path, task_type: Option<&str>) -> Result<()> {
    let value = read_input(file)?;
    println!("{} tokens", estimate_tokens(&value));
    if let Some(task) = task_type {
        println!(
            "{} tokens predicted output ({})",
            estimate_output_tokens(Some(task), &value),
            task
        );
    }
    Ok(())
}
