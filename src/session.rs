//! Interactive chat session
//!
//! Owns the read-eval loop: classifies each input line as a special
//! command or chat text, drives the engine through its lifecycle and
//! paints streamed output through the diff renderer. Execution is
//! single-threaded and blocking; the controller never overlaps engine
//! calls and holds exactly one live engine/model pair.

use std::io::{BufRead, Write};

use thiserror::Error;

use crate::engine::{ChatEngine, EngineError};
use crate::locator::{ModelLocator, ResolvedModel};
use crate::render::{DiffRenderer, RenderError};

/// Fatal session failures. Recoverable conditions (a failed `/reload`)
/// are reported inline and never surface here.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("engine left unusable after failed reload: {0}")]
    Engine(#[from] EngineError),
}

/// A special command, recognized by exact match on the first
/// whitespace-delimited token of the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Help,
    Exit,
    Stats,
    Reset,
    Reload(Option<&'a str>),
}

/// Classify an input line. Anything that is not an exact command token is
/// chat text, including near misses like `/exitnow`; a raw prefix match
/// would swallow turns that merely begin with the same letters.
pub fn parse_command(line: &str) -> Option<Command<'_>> {
    let mut tokens = line.split_whitespace();
    match tokens.next()? {
        "/help" => Some(Command::Help),
        "/exit" => Some(Command::Exit),
        "/stats" => Some(Command::Stats),
        "/reset" => Some(Command::Reset),
        "/reload" => Some(Command::Reload(tokens.next())),
        _ => None,
    }
}

/// Print the fixed list of supported commands.
pub fn write_help(out: &mut impl Write) -> std::io::Result<()> {
    writeln!(
        out,
        "You can use the following special commands:\n\
         \x20 /help               print the special commands\n\
         \x20 /exit               quit the cli\n\
         \x20 /stats              print out the latest stats (token/sec)\n\
         \x20 /reset              restart a fresh chat\n\
         \x20 /reload [local_id]  reload model \"local_id\" from disk, or reload the current \
         model if local_id is not specified"
    )
}

/// The interactive session controller.
///
/// Generic over the engine backend and decoupled from concrete terminal
/// streams so the whole loop is testable against in-memory buffers.
pub struct Session<E: ChatEngine> {
    engine: E,
    locator: ModelLocator,
    resolved: ResolvedModel,
    renderer: DiffRenderer,
    role0: String,
    role1: String,
    /// Render every N-th decode step (plus always on completion).
    stream_interval: usize,
}

impl<E: ChatEngine> Session<E> {
    /// Wrap an already-initialized engine. Role labels are read from the
    /// engine here and refreshed only when a reload swaps the model.
    pub fn new(
        engine: E,
        locator: ModelLocator,
        resolved: ResolvedModel,
        stream_interval: usize,
    ) -> Self {
        let role0 = engine.role0();
        let role1 = engine.role1();
        Self {
            engine,
            locator,
            resolved,
            renderer: DiffRenderer::new(),
            role0,
            role1,
            stream_interval: stream_interval.max(1),
        }
    }

    /// Run the read-eval loop until `/exit` or end of input.
    pub fn run<R: BufRead, W: Write>(&mut self, mut input: R, mut out: W) -> Result<(), SessionError> {
        loop {
            write!(out, "{}: ", self.role0)?;
            out.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                // End of input closes the session like /exit.
                writeln!(out)?;
                break;
            }
            let line = line.trim_end_matches(['\n', '\r']);

            match parse_command(line) {
                Some(Command::Exit) => break,
                Some(Command::Help) => write_help(&mut out)?,
                Some(Command::Reset) => {
                    self.engine.reset_chat();
                    writeln!(out, "RESET CHAT SUCCESS")?;
                }
                Some(Command::Stats) => {
                    writeln!(out, "{}", self.engine.runtime_stats_text())?;
                }
                Some(Command::Reload(local_id)) => self.reload(local_id, &mut out)?,
                None => self.chat_turn(line, &mut out)?,
            }
        }
        Ok(())
    }

    /// Reinitialize the engine, either onto the currently active artifacts
    /// or onto a freshly resolved model.
    ///
    /// Failures are recoverable: the previous `ResolvedModel` stays
    /// installed and the engine is reloaded back onto it. Only a failed
    /// restore escalates to a fatal error.
    fn reload<W: Write>(&mut self, local_id: Option<&str>, out: &mut W) -> Result<(), SessionError> {
        let Some(local_id) = local_id else {
            match self
                .engine
                .reload(&self.resolved.library_path, &self.resolved.model_resource_dir)
            {
                Ok(()) => writeln!(out, "RELOAD THE SAME MODEL SUCCESS")?,
                Err(e) => {
                    tracing::error!("reload of current model failed: {e}");
                    writeln!(out, "reload failed: {e}")?;
                }
            }
            return Ok(());
        };

        let resolved = match self.locator.resolve(&[local_id.to_string()]) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::error!("cannot resolve model \"{local_id}\": {e}");
                writeln!(out, "reload failed: {e}")?;
                return Ok(());
            }
        };

        match self
            .engine
            .reload(&resolved.library_path, &resolved.model_resource_dir)
        {
            Ok(()) => {
                self.resolved = resolved;
                self.role0 = self.engine.role0();
                self.role1 = self.engine.role1();
                writeln!(out, "LOAD MODEL {local_id} SUCCESS")?;
            }
            Err(e) => {
                tracing::error!("reload of \"{local_id}\" failed, restoring previous model: {e}");
                writeln!(out, "reload failed: {e}")?;
                // Restore the previous engine state; the old ResolvedModel
                // was never replaced.
                self.engine
                    .reload(&self.resolved.library_path, &self.resolved.model_resource_dir)?;
            }
        }
        Ok(())
    }

    /// One generation turn: submit the line, poll the engine to
    /// completion, repaint on the configured cadence.
    fn chat_turn<W: Write>(&mut self, line: &str, out: &mut W) -> Result<(), SessionError> {
        self.renderer.reset();
        write!(out, "{}: ", self.role1)?;
        out.flush()?;

        self.engine.encode(line);
        let mut step = 0usize;
        while !self.engine.stopped() {
            self.engine.decode_step();
            step += 1;
            // Sampling every N-th step keeps redraw overhead bounded; the
            // unconditional render on completion guarantees no tail is
            // dropped.
            if step % self.stream_interval == 0 || self.engine.stopped() {
                let message = self.engine.message();
                match self.renderer.step(&message) {
                    Ok(script) => {
                        out.write_all(script.as_bytes())?;
                        out.flush()?;
                    }
                    Err(e) => {
                        // Leave a clean line behind before aborting.
                        out.write_all(self.renderer.unwind().as_bytes())?;
                        writeln!(out)?;
                        out.flush()?;
                        return Err(e.into());
                    }
                }
            }
        }

        writeln!(out)?;
        out.flush()?;
        Ok(())
    }

    #[cfg(test)]
    fn engine(&self) -> &E {
        &self.engine
    }

    #[cfg(test)]
    fn resolved(&self) -> &ResolvedModel {
        &self.resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs::{self, File};
    use std::io::Cursor;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Engine double with a scripted sequence of partial messages.
    #[derive(Debug, Default)]
    struct ScriptedEngine {
        partials: Vec<&'static str>,
        step: usize,
        message_fetches: Cell<usize>,
        reload_paths: Vec<(PathBuf, PathBuf)>,
        reset_calls: usize,
        fail_reloads: usize,
        /// Roles reported after the next successful reload.
        roles_after_reload: Option<(&'static str, &'static str)>,
        roles: (&'static str, &'static str),
    }

    impl ScriptedEngine {
        fn new(partials: Vec<&'static str>) -> Self {
            Self {
                partials,
                roles: ("USER", "ASSISTANT"),
                ..Self::default()
            }
        }
    }

    impl ChatEngine for ScriptedEngine {
        fn reload(&mut self, library: &Path, dir: &Path) -> Result<(), EngineError> {
            if self.fail_reloads > 0 {
                self.fail_reloads -= 1;
                return Err(EngineError::InitFailure("scripted failure".into()));
            }
            self.reload_paths.push((library.to_path_buf(), dir.to_path_buf()));
            if let Some(roles) = self.roles_after_reload {
                self.roles = roles;
            }
            self.step = 0;
            Ok(())
        }

        fn reset_chat(&mut self) {
            self.reset_calls += 1;
        }

        fn stopped(&self) -> bool {
            self.step >= self.partials.len()
        }

        fn encode(&mut self, _text: &str) {
            self.step = 0;
        }

        fn decode_step(&mut self) {
            self.step += 1;
        }

        fn message(&self) -> String {
            self.message_fetches.set(self.message_fetches.get() + 1);
            self.partials[self.step - 1].to_string()
        }

        fn runtime_stats_text(&self) -> String {
            "scripted stats".to_string()
        }

        fn role0(&self) -> String {
            self.roles.0.to_string()
        }

        fn role1(&self) -> String {
            self.roles.1.to_string()
        }
    }

    fn placeholder_resolved(temp: &TempDir) -> ResolvedModel {
        let lib = temp.path().join("current-cpu.so");
        File::create(&lib).unwrap();
        ResolvedModel {
            library_path: lib,
            model_resource_dir: temp.path().to_path_buf(),
        }
    }

    fn session_with(
        engine: ScriptedEngine,
        temp: &TempDir,
        stream_interval: usize,
    ) -> Session<ScriptedEngine> {
        let locator = ModelLocator::new(temp.path(), "cpu");
        Session::new(engine, locator, placeholder_resolved(temp), stream_interval)
    }

    fn run_session(session: &mut Session<ScriptedEngine>, input: &str) -> String {
        let mut out = Vec::new();
        session.run(Cursor::new(input.to_string()), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn plant_model(root: &Path, local_id: &str) {
        let params = root.join(local_id).join("params");
        fs::create_dir_all(&params).unwrap();
        File::create(params.join("mlc-chat-config.json")).unwrap();
        File::create(params.join("ndarray-cache.json")).unwrap();
        File::create(root.join(local_id).join(format!("{local_id}-cpu.so"))).unwrap();
    }

    #[test]
    fn test_parse_command_exact_tokens() {
        assert_eq!(parse_command("/exit"), Some(Command::Exit));
        assert_eq!(parse_command("  /stats  "), Some(Command::Stats));
        assert_eq!(parse_command("/reload"), Some(Command::Reload(None)));
        assert_eq!(
            parse_command("/reload demo-q4f16_0"),
            Some(Command::Reload(Some("demo-q4f16_0")))
        );
    }

    #[test]
    fn test_parse_command_near_misses_are_chat() {
        assert_eq!(parse_command("/exitnow"), None);
        assert_eq!(parse_command("/resetting the server"), None);
        assert_eq!(parse_command("/Help"), None);
        assert_eq!(parse_command("tell me about /exit"), None);
    }

    #[test]
    fn test_parse_command_blank_line_is_chat() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("   "), None);
    }

    #[test]
    fn test_stream_cadence_renders_every_second_step() {
        let temp = TempDir::new().unwrap();
        let engine = ScriptedEngine::new(vec!["H", "He", "Hel", "Hello"]);
        let mut session = session_with(engine, &temp, 2);

        let out = run_session(&mut session, "hi\n/exit\n");

        // Fetched at cycles 2 and 4 only: "He" painted, then its "llo" tail.
        assert_eq!(session.engine().message_fetches.get(), 2);
        assert!(out.contains("ASSISTANT: Hello\n"));
        assert!(!out.contains('\u{8}'));
    }

    #[test]
    fn test_final_render_forced_on_completion() {
        let temp = TempDir::new().unwrap();
        // Three cycles with interval 2: renders at 2 and at completion (3).
        let engine = ScriptedEngine::new(vec!["a", "ab", "abc"]);
        let mut session = session_with(engine, &temp, 2);

        let out = run_session(&mut session, "go\n");
        assert_eq!(session.engine().message_fetches.get(), 2);
        assert!(out.contains("ASSISTANT: abc\n"));
    }

    #[test]
    fn test_reset_keeps_roles_and_engine() {
        let temp = TempDir::new().unwrap();
        let engine = ScriptedEngine::new(vec![]);
        let mut session = session_with(engine, &temp, 2);

        let out = run_session(&mut session, "/reset\n/exit\n");

        assert!(out.contains("RESET CHAT SUCCESS"));
        assert_eq!(session.engine().reset_calls, 1);
        assert!(session.engine().reload_paths.is_empty());
        assert_eq!(session.role0, "USER");
        assert_eq!(session.role1, "ASSISTANT");
    }

    #[test]
    fn test_reload_no_arg_reuses_current_paths() {
        let temp = TempDir::new().unwrap();
        let engine = ScriptedEngine::new(vec![]);
        let mut session = session_with(engine, &temp, 2);
        let before = session.resolved().clone();

        let out = run_session(&mut session, "/reload\n");

        assert!(out.contains("RELOAD THE SAME MODEL SUCCESS"));
        assert_eq!(
            session.engine().reload_paths,
            vec![(before.library_path.clone(), before.model_resource_dir.clone())]
        );
        assert_eq!(session.resolved(), &before);
        // Roles are only refreshed when a new model is adopted.
        assert_eq!(session.role0, "USER");
        assert_eq!(session.role1, "ASSISTANT");
    }

    #[test]
    fn test_reload_with_id_adopts_new_model_and_roles() {
        let temp = TempDir::new().unwrap();
        plant_model(temp.path(), "demo-q4f16_0");

        let mut engine = ScriptedEngine::new(vec![]);
        engine.roles_after_reload = Some(("Human", "Bot"));
        let mut session = session_with(engine, &temp, 2);

        let out = run_session(&mut session, "/reload demo-q4f16_0\n");

        assert!(out.contains("LOAD MODEL demo-q4f16_0 SUCCESS"));
        assert!(session
            .resolved()
            .model_resource_dir
            .ends_with("demo-q4f16_0/params"));
        assert_eq!(session.role0, "Human");
        assert_eq!(session.role1, "Bot");
        // The new prompt label shows up on the next read.
        assert!(out.contains("Human: "));
    }

    #[test]
    fn test_reload_unresolvable_id_is_recoverable() {
        let temp = TempDir::new().unwrap();
        let engine = ScriptedEngine::new(vec![]);
        let mut session = session_with(engine, &temp, 2);
        let before = session.resolved().clone();

        let out = run_session(&mut session, "/reload ghost-q0f16\n/exit\n");

        assert!(out.contains("reload failed"));
        assert_eq!(session.resolved(), &before);
        assert!(session.engine().reload_paths.is_empty());
    }

    #[test]
    fn test_reload_engine_failure_restores_previous_model() {
        let temp = TempDir::new().unwrap();
        plant_model(temp.path(), "demo-q4f16_0");

        let mut engine = ScriptedEngine::new(vec![]);
        engine.fail_reloads = 1;
        engine.roles_after_reload = Some(("Human", "Bot"));
        let mut session = session_with(engine, &temp, 2);
        let before = session.resolved().clone();

        let out = run_session(&mut session, "/reload demo-q4f16_0\n/exit\n");

        assert!(out.contains("reload failed"));
        assert_eq!(session.resolved(), &before);
        // The restore reload went back onto the previous artifacts.
        assert_eq!(
            session.engine().reload_paths,
            vec![(before.library_path.clone(), before.model_resource_dir.clone())]
        );
    }

    #[test]
    fn test_stats_prints_engine_text() {
        let temp = TempDir::new().unwrap();
        let engine = ScriptedEngine::new(vec![]);
        let mut session = session_with(engine, &temp, 2);

        let out = run_session(&mut session, "/stats\n/exit\n");
        assert!(out.contains("scripted stats"));
    }

    #[test]
    fn test_help_lists_all_commands() {
        let temp = TempDir::new().unwrap();
        let engine = ScriptedEngine::new(vec![]);
        let mut session = session_with(engine, &temp, 2);

        let out = run_session(&mut session, "/help\n/exit\n");
        for command in ["/help", "/exit", "/stats", "/reset", "/reload"] {
            assert!(out.contains(command), "missing {command} in help");
        }
    }

    #[test]
    fn test_end_of_input_exits_cleanly() {
        let temp = TempDir::new().unwrap();
        let engine = ScriptedEngine::new(vec![]);
        let mut session = session_with(engine, &temp, 2);

        // No /exit; the input just ends.
        let out = run_session(&mut session, "");
        assert!(out.starts_with("USER: "));
    }

    #[test]
    fn test_interval_one_renders_every_step() {
        let temp = TempDir::new().unwrap();
        let engine = ScriptedEngine::new(vec!["x", "xy"]);
        let mut session = session_with(engine, &temp, 1);

        run_session(&mut session, "go\n");
        assert_eq!(session.engine().message_fetches.get(), 2);
    }
}
