//! Sort a file end to end: split into runs, then merge.

use anyhow::Result;
use clap::Parser;
use exsort_lib::logging::OperationTimer;
use log::info;
use std::path::PathBuf;

use crate::commands::command::Command;
use crate::commands::common::{MemoryOptions, MergeOptions};
use crate::commands::SortRecord;

/// Sort a file of fixed-width records.
///
/// Runs both phases: the input is split into sorted runs under the
/// temporary prefix, and the runs are k-way merged into the output.
#[derive(Debug, Parser)]
#[command(
    name = "sort",
    about = "Sort a file of fixed-width records",
    long_about = r"
Sort a file of fixed-width records using external merge-sort.

The input is first split into sorted runs, each the size of one memory
block; the runs are then merged, up to --merge-streams at a time with up
to --merge-tasks merges in flight, until a single sorted file remains.
Peak memory stays within the --mem-size budget per phase.

EXAMPLES:

  # Sort with a 100 MB budget
  exsort sort -i data.bin -o data.sorted -m 100

  # Wider merges, more concurrent merge tasks
  exsort sort -i data.bin -o data.sorted -m 100 -k 8 --merge-tasks 8
"
)]
pub struct Sort {
    /// Input file
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Output file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Prefix for temporary run files; defaults to the input path
    #[arg(short = 't', long = "tmp-prefix")]
    pub tmp_prefix: Option<PathBuf>,

    /// Memory budget options
    #[command(flatten)]
    pub mem: MemoryOptions,

    /// Merge scheduling options
    #[command(flatten)]
    pub merge: MergeOptions,
}

impl Command for Sort {
    fn execute(&self) -> Result<()> {
        let mem = self.mem.to_params();
        let tmp_prefix = self.tmp_prefix.clone().unwrap_or_else(|| self.input.clone());

        info!("Input: {}", self.input.display());
        info!("Output: {}", self.output.display());
        info!("Memory budget: {} bytes in {} blocks", mem.bytes(), mem.blocks);

        let records = std::fs::metadata(&self.input)
            .map(|m| m.len() / size_of::<SortRecord>() as u64)
            .unwrap_or(0);

        let timer = OperationTimer::new("Sorting");
        exsort_lib::sort::<SortRecord>(
            &mem,
            &self.input,
            &self.output,
            &tmp_prefix,
            self.merge.merge_tasks,
            self.merge.merge_streams,
            self.merge.stream_blocks,
        )?;
        timer.log_completion(records);
        Ok(())
    }
}
