//! Build patch hooks — swap a framework header for a local override.
//!
//! The framework's copy is moved aside to `<header><suffix>` while the
//! override is in place. The backup file is the only record of the
//! patched state: present means patched. There is no locking, so two
//! hooks must not run concurrently against the same header.

mod build;

pub use build::run_build;

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Patch hook errors.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("{op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to run {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("empty build command")]
    EmptyCommand,
}

/// One header swap: which file is replaced, by what, and where the
/// original waits meanwhile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderPatch {
    original: PathBuf,
    backup: PathBuf,
    replacement: PathBuf,
}

impl HeaderPatch {
    /// The backup lives next to `original`, named with `backup_suffix`
    /// appended.
    pub fn new(
        original: impl Into<PathBuf>,
        backup_suffix: &str,
        replacement: impl Into<PathBuf>,
    ) -> Self {
        let original = original.into();
        let mut backup = OsString::from(original.as_os_str());
        backup.push(backup_suffix);

        Self {
            original,
            backup: PathBuf::from(backup),
            replacement: replacement.into(),
        }
    }

    pub fn original(&self) -> &Path {
        &self.original
    }

    pub fn backup(&self) -> &Path {
        &self.backup
    }

    /// Whether the override is currently in place.
    pub fn is_applied(&self) -> bool {
        self.backup.exists()
    }

    /// Install the override.
    ///
    /// Returns `Ok(false)` without touching anything if a backup already
    /// exists. An unreadable override fails before the framework header is
    /// touched; a failed install restores the header.
    pub fn patch(&self) -> Result<bool, PatchError> {
        if self.is_applied() {
            tracing::debug!(backup = %self.backup.display(), "already patched");
            return Ok(false);
        }

        fs::File::open(&self.replacement).map_err(|source| PatchError::Io {
            op: "open",
            path: self.replacement.clone(),
            source,
        })?;

        tracing::info!(
            original = %self.original.display(),
            replacement = %self.replacement.display(),
            "patching header"
        );
        copy(&self.original, &self.backup)?;
        let installed =
            remove(&self.original).and_then(|()| copy(&self.replacement, &self.original));
        if let Err(e) = installed {
            tracing::warn!(error = %e, "install failed, restoring header");
            self.unpatch()?;
            return Err(e);
        }
        Ok(true)
    }

    /// Put the framework's header back and drop the backup.
    ///
    /// Returns `Ok(false)` without touching anything if there is no
    /// backup.
    pub fn unpatch(&self) -> Result<bool, PatchError> {
        if !self.is_applied() {
            tracing::debug!(backup = %self.backup.display(), "not patched");
            return Ok(false);
        }

        tracing::info!(original = %self.original.display(), "restoring header");
        remove(&self.original)?;
        copy(&self.backup, &self.original)?;
        remove(&self.backup)?;
        Ok(true)
    }
}

fn copy(from: &Path, to: &Path) -> Result<(), PatchError> {
    fs::copy(from, to).map_err(|source| PatchError::Io {
        op: "copy",
        path: from.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Remove a file; one that is already gone is fine.
fn remove(path: &Path) -> Result<(), PatchError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(PatchError::Io {
            op: "remove",
            path: path.to_path_buf(),
            source: e,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STOCK: &str = "#define PRODUCT_NAME {'T','e','e','n','s','y'}\n";
    const OVERRIDE: &str = "#define PRODUCT_NAME {'O','r','b','i','t','R','a','t'}\n";

    struct Fixture {
        _dir: tempfile::TempDir,
        header: PathBuf,
        patch: HeaderPatch,
    }

    fn fixture(suffix: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let header = dir.path().join("usb_desc.h");
        let replacement = dir.path().join("usb_desc_p.h");
        fs::write(&header, STOCK).unwrap();
        fs::write(&replacement, OVERRIDE).unwrap();

        let patch = HeaderPatch::new(&header, suffix, &replacement);
        Fixture {
            _dir: dir,
            header,
            patch,
        }
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn backup_path_appends_suffix() {
        let patch = HeaderPatch::new("/fw/teensy3/usb_desc.h", ".or_bkup", "usb_desc_p.h");
        assert_eq!(patch.backup(), Path::new("/fw/teensy3/usb_desc.h.or_bkup"));
    }

    #[test]
    fn patch_swaps_in_override() {
        let f = fixture(".or_bkup");

        assert!(f.patch.patch().unwrap());
        assert_eq!(read(&f.header), OVERRIDE);
        assert_eq!(read(f.patch.backup()), STOCK);
        assert!(f.patch.is_applied());
    }

    #[test]
    fn second_patch_is_noop() {
        let f = fixture(".or_bkup");
        f.patch.patch().unwrap();

        // Anything written now must survive a repeated patch.
        fs::write(&f.header, "edited\n").unwrap();
        assert!(!f.patch.patch().unwrap());
        assert_eq!(read(&f.header), "edited\n");
        assert_eq!(read(f.patch.backup()), STOCK);
    }

    #[test]
    fn unpatch_restores_and_drops_backup() {
        let f = fixture(".or_bkup");
        f.patch.patch().unwrap();

        assert!(f.patch.unpatch().unwrap());
        assert_eq!(read(&f.header), STOCK);
        assert!(!f.patch.backup().exists());
        assert!(!f.patch.is_applied());
    }

    #[test]
    fn unpatch_without_patch_is_noop() {
        let f = fixture(".bkup");

        assert!(!f.patch.unpatch().unwrap());
        assert_eq!(read(&f.header), STOCK);
        assert!(!f.patch.backup().exists());
    }

    #[test]
    fn suffixes_are_independent() {
        let f = fixture(".or_bkup");
        let other = HeaderPatch::new(&f.header, ".bkup", "unused.h");
        f.patch.patch().unwrap();

        assert!(!other.unpatch().unwrap());
        assert_eq!(read(&f.header), OVERRIDE);
    }

    #[test]
    fn missing_override_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let header = dir.path().join("usb_desc.h");
        fs::write(&header, STOCK).unwrap();
        let patch = HeaderPatch::new(&header, ".or_bkup", dir.path().join("absent.h"));

        let err = patch.patch().unwrap_err();
        assert!(err.to_string().contains("absent.h"), "{err}");
        assert_eq!(read(&header), STOCK);
        assert!(!patch.backup().exists());

        // A later attempt must not mistake the failure for a finished patch.
        fs::write(dir.path().join("absent.h"), OVERRIDE).unwrap();
        assert!(patch.patch().unwrap());
        assert_eq!(read(&header), OVERRIDE);
    }

    #[test]
    fn missing_header_fails_before_touching_anything() {
        let dir = tempfile::tempdir().unwrap();
        let header = dir.path().join("usb_desc.h");
        let patch = HeaderPatch::new(header, ".or_bkup", "usb_desc_p.h");

        assert!(matches!(patch.patch(), Err(PatchError::Io { .. })));
        assert!(!patch.is_applied());
    }
}
