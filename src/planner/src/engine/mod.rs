//! Container engine integration.
//!
//! The planner itself never talks to an engine; this module covers the
//! narrow seams around it: probing whether an image exists in an engine's
//! local store, and piping an image between engines via `save | load`.

use std::process::{Command, Stdio};

use stratum_core::error::{PlanError, Result};

use crate::config::Config;

/// The engines used to build and to run fleet images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRuntime {
    pub build_engine: String,
    pub run_engine: String,
}

/// Resolve the engine pair from configuration; podman is the default,
/// and the run engine follows the build engine unless set.
pub fn resolve_runtime(cfg: &Config) -> ResolvedRuntime {
    let build_engine = cfg
        .engine
        .build
        .clone()
        .unwrap_or_else(|| "podman".to_string());
    let run_engine = cfg.engine.run.clone().unwrap_or_else(|| build_engine.clone());
    ResolvedRuntime {
        build_engine,
        run_engine,
    }
}

/// The binary to invoke for an engine, overridable via
/// `STRATUM_<ENGINE>` (e.g. `STRATUM_PODMAN=/opt/podman/bin/podman`).
pub fn engine_binary(engine: &str) -> String {
    let var = format!(
        "STRATUM_{}",
        engine.to_uppercase().replace(['-', '.'], "_")
    );
    std::env::var(var).unwrap_or_else(|_| engine.to_string())
}

/// Whether an image reference exists in the engine's local store.
pub fn local_image_exists(engine: &str, image_ref: &str) -> bool {
    let binary = engine_binary(engine);
    let mut cmd = Command::new(&binary);
    match engine {
        "podman" => {
            cmd.args(["image", "exists", image_ref]);
        }
        // Docker has no `image exists`; `image inspect` probes instead.
        _ => {
            cmd.args(["image", "inspect", image_ref])
                .stdout(Stdio::null())
                .stderr(Stdio::null());
        }
    }
    cmd.status().map(|s| s.success()).unwrap_or(false)
}

/// Pipe an image from one engine to another.
///
/// The destination `load` starts first with its stdin wired to the
/// source `save` stdout; the source's completion signals EOF, then the
/// destination is awaited.
pub fn transfer_image(src_engine: &str, dst_engine: &str, image_ref: &str) -> Result<()> {
    let src_binary = engine_binary(src_engine);
    let dst_binary = engine_binary(dst_engine);

    tracing::info!(
        image = %image_ref,
        from = %src_engine,
        to = %dst_engine,
        "transferring image"
    );

    let (reader, writer) = std::io::pipe()
        .map_err(|e| PlanError::TransferError(format!("creating pipe: {e}")))?;

    let mut load = Command::new(&dst_binary)
        .arg("load")
        .stdin(Stdio::from(reader))
        .stdout(Stdio::null())
        .spawn()
        .map_err(|e| PlanError::TransferError(format!("starting {dst_binary} load: {e}")))?;

    let save_status = Command::new(&src_binary)
        .args(["save", image_ref])
        .stdout(Stdio::from(writer))
        .status()
        .map_err(|e| PlanError::TransferError(format!("running {src_binary} save: {e}")));

    // EOF has reached the destination either way; collect it before
    // reporting a save failure.
    let load_status = load
        .wait()
        .map_err(|e| PlanError::TransferError(format!("waiting for {dst_binary} load: {e}")));

    let save_status = save_status?;
    if !save_status.success() {
        return Err(PlanError::TransferError(format!(
            "{src_binary} save exited with {save_status}"
        )));
    }
    let load_status = load_status?;
    if !load_status.success() {
        return Err(PlanError::TransferError(format!(
            "{dst_binary} load exited with {load_status}"
        )));
    }

    tracing::info!(image = %image_ref, to = %dst_engine, "transferred image");
    Ok(())
}

/// Make sure `image_ref` is present in the run engine's store,
/// transferring from the build engine when needed.
pub fn ensure_image(image_ref: &str, rt: &ResolvedRuntime) -> Result<()> {
    ensure_image_with(image_ref, rt, local_image_exists)
}

/// `ensure_image` with an injectable existence probe.
fn ensure_image_with(
    image_ref: &str,
    rt: &ResolvedRuntime,
    exists: impl Fn(&str, &str) -> bool,
) -> Result<()> {
    if exists(&rt.run_engine, image_ref) {
        return Ok(());
    }

    if rt.build_engine == rt.run_engine {
        return Err(PlanError::TransferError(format!(
            "image {} not found in {}; build the fleet first",
            image_ref, rt.run_engine
        )));
    }

    if !exists(&rt.build_engine, image_ref) {
        return Err(PlanError::TransferError(format!(
            "image {} not found in {} or {}; build the fleet first",
            image_ref, rt.run_engine, rt.build_engine
        )));
    }

    transfer_image(&rt.build_engine, &rt.run_engine, image_ref)
}
