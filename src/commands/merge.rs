//! Phase 2: merge sorted runs into one file.

use anyhow::Result;
use clap::Parser;
use exsort_lib::logging::OperationTimer;
use exsort_lib::sort::MergeParams;
use std::path::PathBuf;

use crate::commands::command::Command;
use crate::commands::common::{MemoryOptions, MergeOptions};
use crate::commands::SortRecord;

/// Merge sorted runs into a single sorted file.
#[derive(Debug, Parser)]
#[command(name = "merge", about = "Merge sorted runs into one sorted file")]
pub struct Merge {
    /// Sorted input files
    #[arg(short = 'i', long = "input", required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    /// Output file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Keep the input files after merging
    #[arg(long = "no-rm", default_value = "false")]
    pub no_rm: bool,

    /// Memory budget options
    #[command(flatten)]
    pub mem: MemoryOptions,

    /// Merge scheduling options
    #[command(flatten)]
    pub merge: MergeOptions,
}

impl Command for Merge {
    fn execute(&self) -> Result<()> {
        let params = MergeParams {
            mem: self.mem.to_params(),
            tasks: self.merge.merge_tasks,
            kmerge: self.merge.merge_streams,
            stream_blocks: self.merge.stream_blocks,
            inputs: self.inputs.clone(),
            output: self.output.clone(),
            rm_input: !self.no_rm,
        };

        // Inputs are consumed as they are read, so size them up front.
        let records: u64 = self
            .inputs
            .iter()
            .filter_map(|p| std::fs::metadata(p).ok())
            .map(|m| m.len() / size_of::<SortRecord>() as u64)
            .sum();

        let timer = OperationTimer::new("Merging sorted runs");
        exsort_lib::merge::<SortRecord>(&params)?;
        timer.log_completion(records);
        Ok(())
    }
}
