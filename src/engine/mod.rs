//! Engine contract
//!
//! The session controller drives whatever backend is linked in through a
//! fixed, typed capability set; it never resolves engine operations by
//! name at runtime. Backends are swappable behind [`ChatEngine`].

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub mod echo;

/// Errors reported by an engine backend
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine initialization failed: {0}")]
    InitFailure(String),
}

/// Capability set the session controller requires from a backend.
///
/// Single-threaded, blocking contract: the controller never issues a call
/// before the previous one settles, and it owns exactly one live engine at
/// a time.
pub trait ChatEngine {
    /// (Re)initialize engine state from a compiled library and a model
    /// resource directory. Clears any conversation context. May fail,
    /// leaving the engine unusable until a later reload succeeds.
    fn reload(&mut self, library: &Path, model_resource_dir: &Path) -> Result<(), EngineError>;

    /// Clear conversation history while keeping loaded weights.
    fn reset_chat(&mut self);

    /// True once the current turn's generation is complete.
    fn stopped(&self) -> bool;

    /// Submit new user input for the current turn.
    fn encode(&mut self, text: &str);

    /// Advance generation by one decoding step.
    fn decode_step(&mut self);

    /// Full accumulated output for the in-progress turn; grows
    /// monotonically until [`ChatEngine::stopped`] reports true.
    fn message(&self) -> String;

    /// Opaque human-readable performance summary.
    fn runtime_stats_text(&self) -> String;

    /// Display label for user turns. Refreshed by callers after reload.
    fn role0(&self) -> String;

    /// Display label for assistant turns.
    fn role1(&self) -> String;
}

/// Device classes a compiled model library can target.
///
/// The lowercase name doubles as the device token embedded in library
/// file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Cpu,
    Cuda,
    Metal,
    Vulkan,
    OpenCl,
}

impl DeviceKind {
    pub fn name(self) -> &'static str {
        match self {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Cuda => "cuda",
            DeviceKind::Metal => "metal",
            DeviceKind::Vulkan => "vulkan",
            DeviceKind::OpenCl => "opencl",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
#[error("unrecognized device name \"{0}\"")]
pub struct UnknownDevice(String);

impl FromStr for DeviceKind {
    type Err = UnknownDevice;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(DeviceKind::Cpu),
            "cuda" => Ok(DeviceKind::Cuda),
            "metal" => Ok(DeviceKind::Metal),
            "vulkan" => Ok(DeviceKind::Vulkan),
            "opencl" => Ok(DeviceKind::OpenCl),
            other => Err(UnknownDevice(other.to_string())),
        }
    }
}

/// A concrete device a model library was compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Device {
    pub kind: DeviceKind,
    pub id: usize,
}

impl Device {
    pub fn new(kind: DeviceKind, id: usize) -> Self {
        Self { kind, id }
    }
}
