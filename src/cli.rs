use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::events::ClearModifier;

#[derive(Parser)]
#[command(name = "diffview")]
#[command(about = "Screen capture viewer that snapshots frames for before/after comparison")]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to ~/.config/diffview/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List capturable displays
    List {
        #[arg(value_enum)]
        target: ListTarget,
    },

    /// Watch a display live; click to snapshot, shift-click to clear
    View {
        /// Display index to capture
        #[arg(long, default_value_t = 0)]
        display: usize,

        /// Directory snapshots are written to
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Snapshot size relative to the captured resolution
        #[arg(long)]
        scale: Option<f64>,

        /// Modifier that turns a click into "clear"
        #[arg(long, value_enum)]
        clear_modifier: Option<ClearModifier>,

        /// Frames per second requested from the grabber
        #[arg(long)]
        framerate: Option<u32>,

        /// Include the system cursor in captured frames
        #[arg(long)]
        show_cursor: bool,
    },

    /// Capture a single frame of a display to a PNG file
    Snapshot {
        /// Display index to capture
        #[arg(long, default_value_t = 0)]
        display: usize,

        /// Output PNG path
        #[arg(short, long)]
        output: PathBuf,

        /// Snapshot size relative to the captured resolution
        #[arg(long)]
        scale: Option<f64>,

        /// Seconds to wait for the first frame
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
}

#[derive(Clone, ValueEnum)]
pub enum ListTarget {
    /// List available displays
    Displays,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_view_with_overrides() {
        let cli = Cli::try_parse_from([
            "diffview",
            "view",
            "--display",
            "1",
            "--scale",
            "0.5",
            "--clear-modifier",
            "alt",
            "-o",
            "/tmp/snaps",
        ])
        .unwrap();

        match cli.command {
            Commands::View {
                display,
                output,
                scale,
                clear_modifier,
                framerate,
                show_cursor,
            } => {
                assert_eq!(display, 1);
                assert_eq!(output, Some(PathBuf::from("/tmp/snaps")));
                assert_eq!(scale, Some(0.5));
                assert_eq!(clear_modifier, Some(ClearModifier::Alt));
                assert_eq!(framerate, None);
                assert!(!show_cursor);
            }
            _ => panic!("expected view command"),
        }
    }

    #[test]
    fn snapshot_requires_output() {
        assert!(Cli::try_parse_from(["diffview", "snapshot"]).is_err());

        let cli =
            Cli::try_parse_from(["diffview", "--config", "c.json", "snapshot", "-o", "a.png"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("c.json")));
        assert!(matches!(
            cli.command,
            Commands::Snapshot { display: 0, timeout: 10, .. }
        ));
    }
}
