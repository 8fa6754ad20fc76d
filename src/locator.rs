//! Model artifact resolution
//!
//! Maps a local model id to the concrete files a load needs: the compiled
//! model library and the resource directory holding the chat config,
//! tokenizer and parameter shards.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Base name of the chat configuration file every usable model ships.
pub const CHAT_CONFIG_NAME: &str = "mlc-chat-config";

/// Base name of the parameter shard index file.
pub const PARAMS_INDEX_NAME: &str = "ndarray-cache";

/// Errors that can occur while resolving model artifacts
#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("cannot find \"{CHAT_CONFIG_NAME}.json\" in any of: {}", format_paths(.searched))]
    ModelNotFound { searched: Vec<PathBuf> },

    #[error("cannot find library \"{lib_name}\" (any platform suffix) in {}", .lib_dir.display())]
    LibraryNotFound { lib_name: String, lib_dir: PathBuf },

    #[error("cannot find \"{PARAMS_INDEX_NAME}.json\" for params in {}", .model_resource_dir.display())]
    ParamsNotFound { model_resource_dir: PathBuf },
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("\"{}\"", p.display()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Artifacts resolved for one model load.
///
/// Immutable once produced; a `/reload` builds a fresh value instead of
/// mutating the active one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    /// Compiled model library to hand to the engine
    pub library_path: PathBuf,
    /// Directory containing chat config, tokenizer and parameter shards
    pub model_resource_dir: PathBuf,
}

/// Resolves local model ids against an artifact root directory.
#[derive(Debug, Clone)]
pub struct ModelLocator {
    artifact_root: PathBuf,
    device_name: String,
}

impl ModelLocator {
    pub fn new(artifact_root: impl Into<PathBuf>, device_name: impl Into<String>) -> Self {
        Self {
            artifact_root: artifact_root.into(),
            device_name: device_name.into(),
        }
    }

    /// Resolve the first candidate local id that has a usable chat config.
    ///
    /// Candidates are probed in order; each one is looked up in its own
    /// `params` directory and then in the shared `prebuilt` tree. The scan
    /// stops at the first candidate with a config hit, and only then are
    /// the library and parameter index required to be present.
    pub fn resolve(&self, candidates: &[String]) -> Result<ResolvedModel, LocatorError> {
        let mut searched = Vec::new();
        let mut config_path = None;
        let mut local_id = String::new();

        for candidate in candidates {
            let config_dirs = [
                self.artifact_root.join(candidate).join("params"),
                self.artifact_root.join("prebuilt").join(candidate),
            ];
            if let Some(path) = find_file(&config_dirs, &[CHAT_CONFIG_NAME], &[".json"]) {
                config_path = Some(path);
                local_id = candidate.clone();
                break;
            }
            searched.extend(config_dirs);
        }

        let config_path = config_path.ok_or(LocatorError::ModelNotFound { searched })?;
        tracing::info!("using config {}", config_path.display());

        // The config always has a parent; it was found inside a search dir.
        let model_resource_dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let lib_dir = library_dir(&model_resource_dir);
        let lib_name = format!("{}-{}", local_id, self.device_name);
        let lib_names = [lib_name.clone(), format!("{lib_name}{}", arch_suffix())];
        let library_path = find_file(&[lib_dir.clone()], &lib_names, lib_suffixes()).ok_or(
            LocatorError::LibraryNotFound {
                lib_name,
                lib_dir,
            },
        )?;
        tracing::info!("using library {}", library_path.display());

        if find_file(&[model_resource_dir.clone()], &[PARAMS_INDEX_NAME], &[".json"]).is_none() {
            return Err(LocatorError::ParamsNotFound { model_resource_dir });
        }

        Ok(ResolvedModel {
            library_path,
            model_resource_dir,
        })
    }
}

/// Directory expected to hold the compiled library for a resource dir.
///
/// A `params` resource dir keeps its library next to it in the model root;
/// anything else (the prebuilt layout) nests it in a `lib` subdirectory.
fn library_dir(model_resource_dir: &Path) -> PathBuf {
    if model_resource_dir.file_name().is_some_and(|n| n == "params") {
        model_resource_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    } else {
        model_resource_dir.join("lib")
    }
}

/// Return the first existing regular file in strict cartesian order:
/// directories outer, names middle, suffixes inner. The match is returned
/// in canonical form.
pub fn find_file<D, N, S>(dirs: &[D], names: &[N], suffixes: &[S]) -> Option<PathBuf>
where
    D: AsRef<Path>,
    N: AsRef<str>,
    S: AsRef<str>,
{
    for dir in dirs {
        for name in names {
            for suffix in suffixes {
                let path = dir
                    .as_ref()
                    .join(format!("{}{}", name.as_ref(), suffix.as_ref()));
                if let Ok(canonical) = path.canonicalize() {
                    if canonical.is_file() {
                        return Some(canonical);
                    }
                }
            }
        }
    }
    None
}

/// Dynamic library suffixes in platform preference order.
pub fn lib_suffixes() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &[".dll"]
    } else if cfg!(target_os = "macos") {
        &[".dylib", ".so"]
    } else {
        &[".so"]
    }
}

/// Architecture tag appended to library names on some build setups.
pub fn arch_suffix() -> &'static str {
    if cfg!(target_arch = "x86_64") {
        "_x86_64"
    } else if cfg!(target_arch = "aarch64") {
        "_arm64"
    } else {
        ""
    }
}
