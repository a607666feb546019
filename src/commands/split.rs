//! Phase 1: split a file into sorted runs.

use anyhow::Result;
use clap::Parser;
use exsort_lib::logging::OperationTimer;
use exsort_lib::sort::SplitParams;
use log::info;
use std::path::PathBuf;

use crate::commands::command::Command;
use crate::commands::common::MemoryOptions;
use crate::commands::SortRecord;

/// Split a file into sorted runs.
#[derive(Debug, Parser)]
#[command(name = "split", about = "Split a file into sorted runs")]
pub struct Split {
    /// Input file
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Prefix for run files; defaults to the input path
    #[arg(short = 't', long = "tmp-prefix")]
    pub tmp_prefix: Option<PathBuf>,

    /// Delete the input file once fully read
    #[arg(long = "rm-input", default_value = "false")]
    pub rm_input: bool,

    /// Memory budget options
    #[command(flatten)]
    pub mem: MemoryOptions,
}

impl Command for Split {
    fn execute(&self) -> Result<()> {
        let params = SplitParams {
            mem: self.mem.to_params(),
            input: self.input.clone(),
            output_prefix: self.tmp_prefix.clone().unwrap_or_else(|| self.input.clone()),
            rm_input: self.rm_input,
        };

        let timer = OperationTimer::new("Splitting into sorted runs");
        let runs = exsort_lib::split::<SortRecord>(&params)?;
        let mut records = 0u64;
        for run in &runs {
            info!("run: {}", run.display());
            records += std::fs::metadata(run)
                .map(|m| m.len() / size_of::<SortRecord>() as u64)
                .unwrap_or(0);
        }
        info!("{} runs produced", runs.len());
        timer.log_completion(records);
        Ok(())
    }
}
