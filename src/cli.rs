//! Command-line surface
//!
//! Flag parsing plus the startup-time policy glue: turning the model /
//! quantization flags into an ordered list of local-id candidates and
//! pinning down the device name.

use std::path::PathBuf;

use clap::Parser;

/// Quantization presets probed, in order, when none is pinned down.
pub const QUANTIZATION_PRESETS: &[&str] = &["q3f16_0", "q4f16_0", "q4f32_0", "q0f32", "q0f16"];

#[derive(Debug, Parser)]
#[command(name = "parley")]
#[command(about = "Interactive terminal chat for locally compiled language models")]
pub struct Cli {
    /// Exact local id of the model build to load (overrides --model and
    /// --quantization)
    #[arg(long)]
    pub local_id: Option<String>,

    /// Model family name, combined with a quantization preset
    #[arg(long)]
    pub model: Option<String>,

    /// Quantization preset, or "auto" to probe the known presets
    #[arg(long)]
    pub quantization: Option<String>,

    /// Device the model library was compiled for, or "auto"
    #[arg(long)]
    pub device: Option<String>,

    /// Device ordinal
    #[arg(long)]
    pub device_id: Option<usize>,

    /// Root directory holding model artifacts
    #[arg(long)]
    pub artifact_path: Option<PathBuf>,

    /// Repaint the streamed reply every N decode steps
    #[arg(long)]
    pub stream_interval: Option<usize>,
}

/// Ordered local-id candidates for resolution.
///
/// An explicit local id is taken verbatim as the sole candidate. Otherwise
/// one candidate per quantization preset is synthesized as
/// `{model}-{preset}`, every known preset when quantization is `auto`.
pub fn local_id_candidates(
    local_id: Option<&str>,
    model: &str,
    quantization: &str,
) -> Vec<String> {
    if let Some(local_id) = local_id {
        return vec![local_id.to_string()];
    }
    let presets: Vec<&str> = if quantization == "auto" {
        QUANTIZATION_PRESETS.to_vec()
    } else {
        vec![quantization]
    };
    presets
        .iter()
        .map(|preset| format!("{model}-{preset}"))
        .collect()
}

/// Settle `auto` to the platform's customary accelerator. A concrete name
/// is passed through untouched and validated later against the known
/// device kinds.
pub fn detect_device_name(device: &str) -> &str {
    if device != "auto" {
        return device;
    }
    let detected = if cfg!(target_os = "macos") {
        "metal"
    } else {
        "cuda"
    };
    tracing::info!("device \"auto\" resolved to \"{detected}\"");
    detected
}
