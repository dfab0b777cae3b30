use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ratctl", about = "Host-side tools for the rat input device")]
pub struct Cli {
    /// TOML config file [default: ./ratctl.toml, then ~/.config/ratctl.toml]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub device: DeviceArgs,

    #[command(flatten)]
    pub patch: PatchArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Device filter overrides.
#[derive(Args, Debug, Default)]
pub struct DeviceArgs {
    /// USB vendor id (hex with 0x prefix, or decimal)
    #[arg(long, global = true, value_parser = parse_id)]
    pub vendor_id: Option<u16>,

    /// USB product id (hex with 0x prefix, or decimal)
    #[arg(long, global = true, value_parser = parse_id)]
    pub product_id: Option<u16>,

    /// USB interface number of the raw HID endpoint
    #[arg(long = "interface", global = true)]
    pub interface_number: Option<i32>,

    /// Only match this serial number
    #[arg(long = "serial", global = true)]
    pub serial_number: Option<String>,

    /// Only match this product string
    #[arg(long = "product", global = true)]
    pub product_string: Option<String>,
}

/// Header patch overrides.
#[derive(Args, Debug, Default)]
pub struct PatchArgs {
    /// Framework package directory
    #[arg(long, global = true)]
    pub framework_dir: Option<PathBuf>,

    /// Header to replace, relative to the framework directory
    #[arg(long, global = true)]
    pub header: Option<PathBuf>,

    /// Replacement header
    #[arg(long, global = true)]
    pub override_file: Option<PathBuf>,

    /// Suffix appended to the header's name for the backup copy
    #[arg(long, global = true)]
    pub backup_suffix: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the active window's title each time focus or title changes
    Tail {
        /// Log unexpected X11 errors instead of exiting
        #[arg(long)]
        tolerate_x11_errors: bool,

        /// Prefix each title with the window id
        #[arg(long)]
        with_id: bool,

        /// Also print pointer motion
        #[arg(long)]
        motion: bool,
    },

    /// Send the liveness probe to the rat
    Poke,

    /// List HID interfaces with the configured vendor and product ids
    Devices,

    /// Send the hello packet to the rat
    Hello,

    /// Send the screen size to the rat
    Layout,

    /// Replace the framework header with the override
    Patch,

    /// Restore the framework header
    Unpatch,

    /// Run a build command with the header patched
    Build {
        /// Build command, e.g. `pio run`
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
}

fn parse_id(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid id {s:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_accept_hex_and_decimal() {
        assert_eq!(parse_id("0x16c0"), Ok(0x16c0));
        assert_eq!(parse_id("0X0487"), Ok(0x0487));
        assert_eq!(parse_id("5824"), Ok(5824));
        assert!(parse_id("0x1_0000").is_err());
        assert!(parse_id("rat").is_err());
    }

    #[test]
    fn global_overrides_after_subcommand() {
        let cli = Cli::try_parse_from([
            "ratctl",
            "poke",
            "--interface",
            "2",
            "--vendor-id",
            "0x16c0",
        ])
        .unwrap();

        assert!(matches!(cli.command, Command::Poke));
        assert_eq!(cli.device.interface_number, Some(2));
        assert_eq!(cli.device.vendor_id, Some(0x16c0));
    }

    #[test]
    fn build_takes_trailing_command() {
        let cli = Cli::try_parse_from(["ratctl", "build", "pio", "run", "-e", "teensy31"]).unwrap();

        match cli.command {
            Command::Build { command } => assert_eq!(command, ["pio", "run", "-e", "teensy31"]),
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn hello_subcommand() {
        let cli = Cli::try_parse_from(["ratctl", "hello"]).unwrap();
        assert!(matches!(cli.command, Command::Hello));
    }

    #[test]
    fn build_requires_command() {
        assert!(Cli::try_parse_from(["ratctl", "build"]).is_err());
    }
}
