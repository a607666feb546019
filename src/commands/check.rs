//! Verify that a file's records are sorted.

use anyhow::{Result, bail};
use clap::Parser;
use exsort_lib::logging::OperationTimer;
use exsort_lib::sort::CheckParams;
use std::path::PathBuf;

use crate::commands::command::Command;
use crate::commands::common::MemoryOptions;
use crate::commands::SortRecord;

/// Check that a file's records are in non-decreasing order.
#[derive(Debug, Parser)]
#[command(name = "check", about = "Verify that a file is sorted")]
pub struct Check {
    /// Input file
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Memory budget options
    #[command(flatten)]
    pub mem: MemoryOptions,
}

impl Command for Check {
    fn execute(&self) -> Result<()> {
        let params = CheckParams { mem: self.mem.to_params(), input: self.input.clone() };

        let records = std::fs::metadata(&self.input)
            .map(|m| m.len() / size_of::<SortRecord>() as u64)
            .unwrap_or(0);

        let timer = OperationTimer::new("Checking sort order");
        let sorted = exsort_lib::check::<SortRecord>(&params)?;
        timer.log_completion(records);
        if !sorted {
            bail!("'{}' is not sorted", self.input.display());
        }
        Ok(())
    }
}
