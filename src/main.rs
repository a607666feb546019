#![deny(unsafe_code)]
pub mod commands;

use anyhow::Result;
use clap::Parser;
use clap::builder::styling::{AnsiColor, Effects, Styles};
use enum_dispatch::enum_dispatch;
use env_logger::Env;

use commands::all::All;
use commands::check::Check;
use commands::command::Command;
use commands::generate::Generate;
use commands::merge::Merge;
use commands::sort::Sort;
use commands::split::Split;

/// Custom styles for CLI help output
const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(styles = STYLES)]
struct Args {
    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[enum_dispatch(Command)]
#[derive(Parser, Debug)]
#[command(version)]
enum Subcommand {
    #[command(display_order = 1)]
    Generate(Generate),
    #[command(display_order = 2)]
    Split(Split),
    #[command(display_order = 3)]
    Merge(Merge),
    #[command(display_order = 4)]
    Sort(Sort),
    #[command(display_order = 5)]
    Check(Check),
    #[command(display_order = 6)]
    All(All),
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    args.subcommand.execute()
}
