mod capture;
mod cli;
mod config;
mod controller;
mod error;
mod events;
mod media;
mod platform;
mod snapshot;
mod video;
mod viewer;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, ListTarget};
use config::ViewerConfig;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("diffview=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn find_display(index: usize) -> Result<platform::DisplayInfo> {
    platform::list_displays()?
        .into_iter()
        .find(|d| d.index == index)
        .ok_or_else(|| error::CaptureError::DisplayNotFound { index }.into())
}

/// Fold command-line overrides into the loaded config and validate the result.
fn effective_config(mut config: ViewerConfig, command: &Commands) -> ViewerConfig {
    match command {
        Commands::List { .. } => {}
        Commands::View {
            output,
            scale,
            clear_modifier,
            framerate,
            show_cursor,
            ..
        } => {
            if output.is_some() {
                config.output_dir = output.clone();
            }
            if let Some(scale) = scale {
                config.scale = *scale;
            }
            if let Some(modifier) = clear_modifier {
                config.clear_modifier = *modifier;
            }
            if let Some(framerate) = framerate {
                config.framerate = *framerate;
            }
            config.show_cursor |= *show_cursor;
        }
        Commands::Snapshot { scale, .. } => {
            if let Some(scale) = scale {
                config.scale = *scale;
            }
        }
    }
    config.validated()
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::load_default(),
    };
    let config = effective_config(config, &cli.command);

    match cli.command {
        Commands::List { target } => match target {
            ListTarget::Displays => {
                let displays = platform::list_displays()?;
                if displays.is_empty() {
                    println!("No displays found.");
                } else {
                    println!("Available displays:");
                    for d in displays {
                        println!(
                            "  [{index}] {width}x{height} at {x},{y}{main}",
                            index = d.index,
                            width = d.width,
                            height = d.height,
                            x = d.x,
                            y = d.y,
                            main = if d.is_main { " (main)" } else { "" }
                        );
                    }
                }
            }
        },
        Commands::View { display, .. } => {
            let display_info = find_display(display)?;
            viewer::run_viewer(display_info, &config)?;
        }
        Commands::Snapshot {
            display,
            output,
            timeout,
            ..
        } => {
            let display_info = find_display(display)?;
            viewer::snapshot_once(display_info, &config, &output, Duration::from_secs(timeout))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_FRAMERATE;
    use crate::events::ClearModifier;

    fn effective(args: &[&str]) -> ViewerConfig {
        let cli = Cli::try_parse_from(args).unwrap();
        effective_config(ViewerConfig::default(), &cli.command)
    }

    #[test]
    fn view_flags_override_config() {
        let config = effective(&[
            "diffview",
            "view",
            "--scale",
            "0.5",
            "--framerate",
            "12",
            "--clear-modifier",
            "control",
            "--show-cursor",
        ]);
        assert_eq!(config.scale, 0.5);
        assert_eq!(config.framerate, 12);
        assert_eq!(config.clear_modifier, ClearModifier::Control);
        assert!(config.show_cursor);
    }

    #[test]
    fn out_of_range_flags_are_corrected() {
        let config = effective(&["diffview", "view", "--scale", "0", "--framerate", "5000"]);
        assert_eq!(config.scale, 1.0);
        assert_eq!(config.framerate, MAX_FRAMERATE);

        let config = effective(&["diffview", "view", "--scale", "NaN"]);
        assert_eq!(config.scale, 1.0);

        let config = effective(&["diffview", "snapshot", "-o", "a.png", "--scale=-3"]);
        assert_eq!(config.scale, 1.0);
    }
}
