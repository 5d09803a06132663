use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Stop-motion capture station. Settings come from the environment.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// List capture-capable V4L2 devices
    Devices,
    /// Show formats and controls of a device
    Info {
        /// Device node, e.g. /dev/video0
        device: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_runs_station() {
        let cli = Cli::try_parse_from(["station"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn info_takes_device_path() {
        let cli = Cli::try_parse_from(["station", "info", "/dev/video2"]).unwrap();
        match cli.command {
            Some(CliCommand::Info { device }) => assert_eq!(device, PathBuf::from("/dev/video2")),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn info_requires_device() {
        assert!(Cli::try_parse_from(["station", "info"]).is_err());
    }
}
