//! Configuration — TOML file merged with command-line overrides.
//!
//! Precedence is CLI, then file, then built-in defaults. The defaults
//! describe the rat: raw HID on interface 6 of 16c0:0487, and the Teensy
//! framework's `usb_desc.h` under PlatformIO's package directory.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::cli::{DeviceArgs, PatchArgs};
use crate::hid::DeviceFilter;
use crate::patch::HeaderPatch;

const CONFIG_FILE: &str = "ratctl.toml";
const FRAMEWORK_PACKAGE: &str = "framework-arduinoteensy";
const DEFAULT_HEADER: &str = "cores/teensy3/usb_desc.h";
const DEFAULT_OVERRIDE: &str = "usb_desc_p.h";
const DEFAULT_BACKUP_SUFFIX: &str = ".or_bkup";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// On-disk layout of `ratctl.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    device: DeviceFilter,
    patch: PatchFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PatchFile {
    framework_dir: Option<PathBuf>,
    header: Option<PathBuf>,
    override_file: Option<PathBuf>,
    backup_suffix: Option<String>,
}

/// Where the header patch hook operates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchSettings {
    pub framework_dir: PathBuf,
    /// Relative to `framework_dir`.
    pub header: PathBuf,
    pub override_file: PathBuf,
    pub backup_suffix: String,
}

impl PatchSettings {
    pub fn header_patch(&self) -> HeaderPatch {
        HeaderPatch::new(
            self.framework_dir.join(&self.header),
            &self.backup_suffix,
            &self.override_file,
        )
    }
}

/// Merged configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub device: DeviceFilter,
    pub patch: PatchSettings,
}

impl Config {
    /// Load `path` if given, else the first default location that parses,
    /// and apply the CLI overrides.
    pub fn load(
        path: Option<&Path>,
        device: &DeviceArgs,
        patch: &PatchArgs,
    ) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => load_from_path(path)?,
            None => load_from_default_paths(),
        };
        Ok(Self::merge(file, device, patch))
    }

    fn merge(file: FileConfig, device: &DeviceArgs, patch: &PatchArgs) -> Self {
        let mut filter = file.device;
        if let Some(id) = device.vendor_id {
            filter.vendor_id = id;
        }
        if let Some(id) = device.product_id {
            filter.product_id = id;
        }
        if let Some(number) = device.interface_number {
            filter.interface_number = number;
        }
        if device.serial_number.is_some() {
            filter.serial_number.clone_from(&device.serial_number);
        }
        if device.product_string.is_some() {
            filter.product_string.clone_from(&device.product_string);
        }

        let framework_dir = patch
            .framework_dir
            .clone()
            .or(file.patch.framework_dir)
            .map(|dir| expand_home(&dir))
            .unwrap_or_else(default_framework_dir);

        Self {
            device: filter,
            patch: PatchSettings {
                framework_dir,
                header: patch
                    .header
                    .clone()
                    .or(file.patch.header)
                    .unwrap_or_else(|| DEFAULT_HEADER.into()),
                override_file: patch
                    .override_file
                    .clone()
                    .or(file.patch.override_file)
                    .unwrap_or_else(|| DEFAULT_OVERRIDE.into()),
                backup_suffix: patch
                    .backup_suffix
                    .clone()
                    .or(file.patch.backup_suffix)
                    .unwrap_or_else(|| DEFAULT_BACKUP_SUFFIX.into()),
            },
        }
    }
}

fn load_from_path(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

fn load_from_default_paths() -> FileConfig {
    for path in default_config_paths() {
        if !path.exists() {
            continue;
        }
        match load_from_path(&path) {
            Ok(config) => return config,
            Err(e) => tracing::warn!(error = %e, "ignoring config file"),
        }
    }
    FileConfig::default()
}

fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE)];
    if let Some(home) = std::env::var_os("HOME") {
        paths.push(PathBuf::from(home).join(".config").join(CONFIG_FILE));
    }
    paths
}

/// PlatformIO's package directory for the Teensy framework.
fn default_framework_dir() -> PathBuf {
    let core_dir = std::env::var_os("PLATFORMIO_CORE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| expand_home(Path::new("~/.platformio")));
    core_dir.join("packages").join(FRAMEWORK_PACKAGE)
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> FileConfig {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn empty_file_gives_rat_defaults() {
        let config = Config::merge(parse(""), &DeviceArgs::default(), &PatchArgs::default());

        assert_eq!(config.device, DeviceFilter::default());
        assert_eq!(config.patch.header, Path::new(DEFAULT_HEADER));
        assert_eq!(config.patch.override_file, Path::new("usb_desc_p.h"));
        assert_eq!(config.patch.backup_suffix, ".or_bkup");
        assert!(config.patch.framework_dir.ends_with("packages/framework-arduinoteensy"));
    }

    #[test]
    fn file_values_apply() {
        let file = parse(
            r#"
            [device]
            interface_number = 2
            product_string = "OrbitRat"

            [patch]
            framework_dir = "/opt/pio/packages/framework-arduinoteensy"
            backup_suffix = ".bkup"
            "#,
        );
        let config = Config::merge(file, &DeviceArgs::default(), &PatchArgs::default());

        assert_eq!(config.device.interface_number, 2);
        assert_eq!(config.device.vendor_id, 0x16c0);
        assert_eq!(config.device.product_string.as_deref(), Some("OrbitRat"));

        let patch = config.patch.header_patch();
        assert_eq!(
            patch.original(),
            Path::new("/opt/pio/packages/framework-arduinoteensy/cores/teensy3/usb_desc.h")
        );
        assert_eq!(
            patch.backup(),
            Path::new("/opt/pio/packages/framework-arduinoteensy/cores/teensy3/usb_desc.h.bkup")
        );
    }

    #[test]
    fn cli_overrides_file() {
        let file = parse(
            r#"
            [device]
            serial_number = "GreyHelix.com:OrbitRatV1"
            [patch]
            backup_suffix = ".bkup"
            "#,
        );
        let device = DeviceArgs {
            product_id: Some(0x0478),
            serial_number: Some("other".into()),
            ..DeviceArgs::default()
        };
        let patch = PatchArgs {
            backup_suffix: Some(".or_bkup".into()),
            framework_dir: Some("/fw".into()),
            ..PatchArgs::default()
        };
        let config = Config::merge(file, &device, &patch);

        assert_eq!(config.device.product_id, 0x0478);
        assert_eq!(config.device.serial_number.as_deref(), Some("other"));
        assert_eq!(config.patch.backup_suffix, ".or_bkup");
        assert_eq!(config.patch.framework_dir, Path::new("/fw"));
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(toml::from_str::<FileConfig>("[device]\nvid = 1\n").is_err());
        assert!(toml::from_str::<FileConfig>("[hooks]\n").is_err());
    }

    #[test]
    fn explicit_path_errors_surface() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            Config::load(Some(missing.as_path()), &DeviceArgs::default(), &PatchArgs::default()),
            Err(ConfigError::Read { .. })
        ));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[device\n").unwrap();
        assert!(matches!(
            Config::load(Some(broken.as_path()), &DeviceArgs::default(), &PatchArgs::default()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn explicit_path_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratctl.toml");
        std::fs::write(&path, "[device]\nvendor_id = 0x1209\n").unwrap();

        let config =
            Config::load(Some(path.as_path()), &DeviceArgs::default(), &PatchArgs::default()).unwrap();
        assert_eq!(config.device.vendor_id, 0x1209);
    }

    #[test]
    fn absolute_paths_not_expanded() {
        assert_eq!(expand_home(Path::new("/opt/pio")), Path::new("/opt/pio"));
    }
}
