//! Run one build step with the header patched.
//!
//! Stands in for registering the unpatch hook after a named build step:
//! the step is the wrapped command, and the header is restored however
//! the command ends.

use std::process::Command;

use super::{HeaderPatch, PatchError};

/// Patch, run `command`, unpatch. Returns the command's exit code.
///
/// A command killed by a signal reports exit code 1. If the command
/// cannot be started at all the header is still restored before the
/// error is returned.
pub fn run_build(patch: &HeaderPatch, command: &[String]) -> Result<i32, PatchError> {
    let (program, args) = command.split_first().ok_or(PatchError::EmptyCommand)?;

    match patch.patch() {
        Ok(true) => eprintln!("patching `{}`", file_name(patch)),
        Ok(false) => {}
        Err(e) => {
            if let Err(restore) = patch.unpatch() {
                tracing::warn!(error = %restore, "restore after failed patch");
            }
            return Err(e);
        }
    }

    tracing::info!(command = ?command, "running build step");
    let status = Command::new(program).args(args).status();

    if patch.unpatch()? {
        eprintln!("unpatching `{}`", file_name(patch));
    }

    let status = status.map_err(|source| PatchError::Spawn {
        command: command.join(" "),
        source,
    })?;
    tracing::info!(%status, "build step finished");
    Ok(status.code().unwrap_or(1))
}

fn file_name(patch: &HeaderPatch) -> String {
    patch
        .original()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
