//! Incremental terminal rendering
//!
//! Streams from the engine arrive as ever-growing snapshots of the whole
//! message. Rather than reprinting the snapshot each time, the renderer
//! segments it into atomic display units and emits an edit script that
//! erases only the divergent tail of what is already on screen. Erasing is
//! done unit-by-unit so multi-byte glyphs are never split mid-sequence.
//!
//! The renderer is pure string-to-string: it never touches the terminal
//! itself.

use thiserror::Error;

/// Backspace, blank the cell, backspace again: erases one display cell.
const ERASE_CELL: &str = "\u{8} \u{8}";

/// Errors produced while segmenting engine output
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("invalid UTF-8 in engine output at byte offset {offset}")]
    InvalidEncoding { offset: usize },
}

/// Split a byte string into its atomic display units.
///
/// Each unit is one UTF-8 scalar: 1 to 4 bytes, classified by the lead
/// byte and consumed whole. Concatenating the returned units reproduces
/// the input exactly. Any lead byte that matches no valid pattern, or a
/// missing/malformed continuation byte, is a hard failure; engine output
/// is never silently truncated.
pub fn segment(bytes: &[u8]) -> Result<Vec<String>, RenderError> {
    let mut units = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let len = match bytes[pos] {
            b if b & 0x80 == 0x00 => 1,
            b if b & 0xE0 == 0xC0 => 2,
            b if b & 0xF0 == 0xE0 => 3,
            b if b & 0xF8 == 0xF0 => 4,
            _ => return Err(RenderError::InvalidEncoding { offset: pos }),
        };
        if pos + len > bytes.len() {
            return Err(RenderError::InvalidEncoding { offset: pos });
        }
        if !bytes[pos + 1..pos + len].iter().all(|b| b & 0xC0 == 0x80) {
            return Err(RenderError::InvalidEncoding { offset: pos });
        }
        // Catches overlong encodings and surrogate ranges the lead-byte
        // classification alone would let through.
        let unit = std::str::from_utf8(&bytes[pos..pos + len])
            .map_err(|_| RenderError::InvalidEncoding { offset: pos })?;
        units.push(unit.to_string());
        pos += len;
    }
    Ok(units)
}

/// Tracks what is currently painted for the in-progress turn and computes
/// the minimal edit between successive message snapshots.
#[derive(Debug, Default)]
pub struct DiffRenderer {
    printed: Vec<String>,
}

impl DiffRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything painted; called at the start of each user turn.
    pub fn reset(&mut self) {
        self.printed.clear();
    }

    /// Compute the edit script taking the screen from the previous snapshot
    /// to `current`: erases for the stale tail, then the new tail verbatim.
    /// The snapshot becomes the new painted state.
    pub fn step(&mut self, current: &str) -> Result<String, RenderError> {
        let units = segment(current.as_bytes())?;

        let prefix = self
            .printed
            .iter()
            .zip(units.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let mut script = String::new();
        for _ in prefix..self.printed.len() {
            script.push_str(ERASE_CELL);
        }
        for unit in &units[prefix..] {
            script.push_str(unit);
        }

        self.printed = units;
        Ok(script)
    }

    /// Erase everything currently painted, leaving a clean line. Used to
    /// unwind the display before aborting on a fatal error.
    pub fn unwind(&mut self) -> String {
        let script = ERASE_CELL.repeat(self.printed.len());
        self.printed.clear();
        script
    }

    /// Number of display units currently painted.
    pub fn painted_len(&self) -> usize {
        self.printed.len()
    }
}
