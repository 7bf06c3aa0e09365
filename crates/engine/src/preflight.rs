//! Storage preflight – verify the backup location before anything runs.

use crate::context::AppContext;
use crate::traits::CapError;
use crate::types::*;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

const PROBE_PAYLOAD: &[u8] = b"sched-engine storage probe";

/// Check that the storage location is configured and writable.
///
/// Writes a probe file, reads it back and removes it.
pub fn check_storage(ctx: &AppContext) -> Result<PathBuf, CapError> {
    check_storage_steps(ctx, &mut HashMap::new())
}

fn check_storage_steps(
    ctx: &AppContext,
    steps: &mut HashMap<String, u64>,
) -> Result<PathBuf, CapError> {
    let dir = ctx.storage_dir.clone().ok_or(CapError::NotConfigured)?;

    let t0 = Instant::now();
    if !ctx.fs().is_dir(&dir) {
        return Err(CapError::StorageUnavailable(format!(
            "{} does not exist or is not a directory",
            dir.display()
        )));
    }
    steps.insert("locate".into(), t0.elapsed().as_millis() as u64);

    let probe = dir.join(format!(".sched_probe_{}", &new_run_id()[..8]));
    let t1 = Instant::now();
    ctx.fs().write_file(&probe, PROBE_PAYLOAD).map_err(|e| match e {
        CapError::PermissionDenied(m) => CapError::PermissionDenied(m),
        other => CapError::StorageUnavailable(format!("probe write failed: {}", other)),
    })?;
    steps.insert("write".into(), t1.elapsed().as_millis() as u64);

    let t2 = Instant::now();
    let read_back = ctx.fs().read_file(&probe);
    let _ = ctx.fs().remove_file(&probe);
    match read_back {
        Ok(data) if data == PROBE_PAYLOAD => {}
        Ok(_) => {
            return Err(CapError::StorageUnavailable(
                "read-back data does not match written data".into(),
            ))
        }
        Err(e) => return Err(CapError::StorageUnavailable(format!("probe read failed: {}", e))),
    }
    steps.insert("read_verify".into(), t2.elapsed().as_millis() as u64);

    Ok(dir)
}

/// Run the storage check and describe the result for humans and JSON.
pub fn run_doctor(ctx: &AppContext) -> PreflightReport {
    let mut steps = HashMap::new();
    let (status, error) = match check_storage_steps(ctx, &mut steps) {
        Ok(_) => (Status::Pass, None),
        Err(CapError::NotConfigured) => (Status::Skip, Some(CapError::NotConfigured.to_string())),
        Err(e) => (Status::Fail, Some(e.to_string())),
    };
    PreflightReport {
        run_id: new_run_id(),
        status,
        storage_dir: ctx.storage_dir.as_ref().map(|d| d.display().to_string()),
        error,
        steps,
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
    }
}
