mod cli;
mod config;
mod hid;
mod patch;
mod tracker;
mod window;

use std::fmt::Display;

use clap::Parser;
use cli::{Cli, Command};
use config::Config;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref(), &cli.device, &cli.patch)
        .unwrap_or_else(|e| fail("config", &e));

    match cli.command {
        Command::Tail {
            tolerate_x11_errors,
            with_id,
            motion,
        } => {
            let on_error = if tolerate_x11_errors {
                window::tolerate_errors()
            } else {
                window::fatal_errors()
            };
            if let Err(e) = tracker::run(on_error, with_id, motion) {
                fail("tail", &e);
            }
        }
        Command::Poke => {
            if let Err(e) = hid::poke(&config.device) {
                fail("poke", &e);
            }
        }
        Command::Devices => {
            if let Err(e) = hid::list_devices(&config.device) {
                fail("devices", &e);
            }
        }
        Command::Hello => {
            if let Err(e) = hid::send_hello(&config.device) {
                fail("hello", &e);
            }
        }
        Command::Layout => {
            let windows = window::X11Windows::connect(window::fatal_errors())
                .unwrap_or_else(|e| fail("layout", &e));
            let (width, height) = windows.screen_size();
            if let Err(e) = hid::send_layout(&config.device, width, height) {
                fail("layout", &e);
            }
        }
        Command::Patch => {
            let patch = config.patch.header_patch();
            match patch.patch() {
                Ok(true) => eprintln!("patched `{}`", patch.original().display()),
                Ok(false) => eprintln!("already patched: {}", patch.backup().display()),
                Err(e) => fail("patch", &e),
            }
        }
        Command::Unpatch => {
            let patch = config.patch.header_patch();
            match patch.unpatch() {
                Ok(true) => eprintln!("unpatched `{}`", patch.original().display()),
                Ok(false) => eprintln!("not patched: no {}", patch.backup().display()),
                Err(e) => fail("unpatch", &e),
            }
        }
        Command::Build { command } => {
            let patch = config.patch.header_patch();
            match patch::run_build(&patch, &command) {
                Ok(code) => std::process::exit(code),
                Err(e) => fail("build", &e),
            }
        }
    }
}

fn fail(command: &str, error: &dyn Display) -> ! {
    tracing::error!(error = %error, "{command} failed");
    eprintln!("ratctl {command}: {error}");
    std::process::exit(1);
}
