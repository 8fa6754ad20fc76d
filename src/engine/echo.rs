//! Echo reference backend
//!
//! A weights-free [`ChatEngine`] that streams the user's own words back
//! one pseudo-token at a time. It exists so the full session surface
//! (resolution, reload, streaming redraw, stats) can be exercised without
//! a compiled model, and it is the template test doubles are written
//! against.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::engine::{ChatEngine, EngineError};

#[derive(Debug, Default)]
pub struct EchoEngine {
    loaded: Option<(PathBuf, PathBuf)>,
    pending: VecDeque<String>,
    message: String,
    turns: usize,
    steps: usize,
}

impl EchoEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChatEngine for EchoEngine {
    fn reload(&mut self, library: &Path, model_resource_dir: &Path) -> Result<(), EngineError> {
        if !library.is_file() {
            return Err(EngineError::InitFailure(format!(
                "library not readable: {}",
                library.display()
            )));
        }
        if !model_resource_dir.is_dir() {
            return Err(EngineError::InitFailure(format!(
                "model resource dir not readable: {}",
                model_resource_dir.display()
            )));
        }
        self.loaded = Some((library.to_path_buf(), model_resource_dir.to_path_buf()));
        self.pending.clear();
        self.message.clear();
        self.turns = 0;
        self.steps = 0;
        tracing::debug!("echo backend loaded {}", library.display());
        Ok(())
    }

    fn reset_chat(&mut self) {
        self.pending.clear();
        self.message.clear();
    }

    fn stopped(&self) -> bool {
        self.pending.is_empty()
    }

    fn encode(&mut self, text: &str) {
        self.message.clear();
        self.pending = text
            .split_whitespace()
            .map(|word| format!("{word} "))
            .collect();
        if self.pending.is_empty() {
            self.pending.push_back("...".to_string());
        }
        self.turns += 1;
    }

    fn decode_step(&mut self) {
        if let Some(token) = self.pending.pop_front() {
            self.message.push_str(&token);
            self.steps += 1;
        }
    }

    fn message(&self) -> String {
        self.message.clone()
    }

    fn runtime_stats_text(&self) -> String {
        format!("echo backend: {} turn(s), {} decode step(s)", self.turns, self.steps)
    }

    fn role0(&self) -> String {
        "USER".to_string()
    }

    fn role1(&self) -> String {
        "ASSISTANT".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn loaded_engine(temp: &TempDir) -> EchoEngine {
        let lib = temp.path().join("m-cpu.so");
        File::create(&lib).unwrap();
        let mut engine = EchoEngine::new();
        engine.reload(&lib, temp.path()).unwrap();
        engine
    }

    #[test]
    fn test_reload_rejects_missing_library() {
        let temp = TempDir::new().unwrap();
        let mut engine = EchoEngine::new();
        let err = engine.reload(&temp.path().join("nope.so"), temp.path());
        assert!(matches!(err, Err(EngineError::InitFailure(_))));
    }

    #[test]
    fn test_streams_words_back() {
        let temp = TempDir::new().unwrap();
        let mut engine = loaded_engine(&temp);

        engine.encode("hello echo world");
        assert!(!engine.stopped());

        while !engine.stopped() {
            engine.decode_step();
        }
        assert_eq!(engine.message(), "hello echo world ");
    }

    #[test]
    fn test_message_grows_monotonically() {
        let temp = TempDir::new().unwrap();
        let mut engine = loaded_engine(&temp);

        engine.encode("a b c");
        let mut previous = String::new();
        while !engine.stopped() {
            engine.decode_step();
            let current = engine.message();
            assert!(current.starts_with(&previous));
            previous = current;
        }
    }

    #[test]
    fn test_reset_chat_clears_turn_state() {
        let temp = TempDir::new().unwrap();
        let mut engine = loaded_engine(&temp);

        engine.encode("something");
        engine.decode_step();
        engine.reset_chat();
        assert!(engine.stopped());
        assert!(engine.message().is_empty());
    }

    #[test]
    fn test_stats_mention_counters() {
        let temp = TempDir::new().unwrap();
        let mut engine = loaded_engine(&temp);
        engine.encode("one two");
        engine.decode_step();
        engine.decode_step();
        assert!(engine.runtime_stats_text().contains("2 decode step(s)"));
    }
}
