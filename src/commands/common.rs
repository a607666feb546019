//! Common CLI options shared across commands.
//!
//! This module provides shared argument structures that can be composed
//! into command structs using `#[command(flatten)]`.

use clap::{Args, ValueEnum};
use exsort_lib::sort::{MemUnit, MemoryParams};

/// Memory budget unit.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MemUnitArg {
    /// Bytes
    B,
    /// Kibibytes
    Kb,
    /// Mebibytes
    Mb,
}

impl From<MemUnitArg> for MemUnit {
    fn from(arg: MemUnitArg) -> Self {
        match arg {
            MemUnitArg::B => MemUnit::B,
            MemUnitArg::Kb => MemUnit::Kb,
            MemUnitArg::Mb => MemUnit::Mb,
        }
    }
}

/// Memory budget options common to every command.
#[derive(Debug, Clone, Args)]
pub struct MemoryOptions {
    /// Memory budget, in units of --mem-unit
    #[arg(short = 'm', long = "mem-size", default_value = "1")]
    pub mem_size: usize,

    /// Unit the memory budget is expressed in
    #[arg(long = "mem-unit", value_enum, default_value = "mb")]
    pub mem_unit: MemUnitArg,

    /// Number of blocks the budget is divided into
    #[arg(long = "mem-blocks", default_value = "2")]
    pub mem_blocks: usize,
}

impl MemoryOptions {
    /// Convert into the library's parameter object.
    #[must_use]
    pub fn to_params(&self) -> MemoryParams {
        MemoryParams { size: self.mem_size, unit: self.mem_unit.into(), blocks: self.mem_blocks }
    }
}

/// Phase-2 scheduling options.
#[derive(Debug, Clone, Args)]
pub struct MergeOptions {
    /// Maximum concurrent merge tasks
    #[arg(long = "merge-tasks", default_value = "4")]
    pub merge_tasks: usize,

    /// Number of streams merged per task
    #[arg(short = 'k', long = "merge-streams", default_value = "4")]
    pub merge_streams: usize,

    /// Blocks per stream pool during merging
    #[arg(long = "stream-blocks", default_value = "2")]
    pub stream_blocks: usize,
}
