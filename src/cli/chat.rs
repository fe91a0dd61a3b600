use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::chat::{ChatBuilder, FileSource, Role, Segment, Turn};
use crate::core::config::AppConfig;
use crate::render::Render;

/// Streams the transcript to stdout. Renders are full-state callbacks,
/// so only the unseen suffix of the trailing textual segment is printed
/// to make text appear token by token.
struct StdoutRender {
    segments_seen: usize,
    printed: usize,
}

impl StdoutRender {
    fn new() -> Self {
        Self {
            segments_seen: 0,
            printed: 0,
        }
    }

    /// What this render call should append to the terminal.
    fn delta_for(&mut self, turn: &Turn) -> String {
        let mut out = String::new();
        let segments = turn.segments();

        // A new turn starts over
        if segments.len() < self.segments_seen {
            self.segments_seen = 0;
            self.printed = 0;
        }

        // Resume from the segment that was mid-stream last call, then
        // walk any segments that appeared since
        let start = self.segments_seen.saturating_sub(1);
        for (i, segment) in segments.iter().enumerate().skip(start) {
            let is_new = i >= self.segments_seen;
            if is_new {
                if i > 0 {
                    out.push('\n');
                }
                self.printed = 0;
            }
            match segment.text() {
                Some(text) => {
                    // The cleanup transform can rewrite already-printed
                    // text; skip rather than re-print the whole segment
                    if let Some(suffix) = text.get(self.printed..) {
                        out.push_str(suffix);
                    }
                    self.printed = text.len();
                }
                None => {
                    // Announced once; replacement frames of a generated
                    // image stay quiet
                    if self.printed == 0 {
                        let name = segment
                            .payload()
                            .and_then(|p| p.filename.as_deref())
                            .unwrap_or("file");
                        match segment {
                            Segment::Image(_) | Segment::GeneratedImage(_) => {
                                out.push_str(&format!("[image: {}]", name));
                            }
                            _ => out.push_str(&format!("[file: {}]", name)),
                        }
                        self.printed = 1;
                    }
                }
            }
        }
        self.segments_seen = segments.len();
        out
    }
}

impl Render for StdoutRender {
    fn render(&mut self, turn: &Turn) {
        // The prompt already echoed the user's input
        if turn.role == Role::User {
            self.segments_seen = 0;
            self.printed = 0;
            return;
        }
        let delta = self.delta_for(turn);
        if !delta.is_empty() {
            print!("{}", delta);
            let _ = io::stdout().flush();
        }
    }
}

pub async fn run(
    config: &AppConfig,
    files: Vec<PathBuf>,
    history: Option<PathBuf>,
    save: Option<PathBuf>,
    allow_code_interpreter: bool,
) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    let mut builder = ChatBuilder::new()
        .api_hostname(&config.api_hostname)
        .model(&config.model)
        .instructions(&config.instructions)
        .allow_code_interpreter(allow_code_interpreter)
        .files(files.into_iter().map(FileSource::Path).collect())
        .renderer(Box::new(StdoutRender::new()));
    if let Some(key) = &config.api_key {
        builder = builder.api_key(key);
    }
    if let Some(history) = &history {
        builder = builder.history(history);
    }
    let mut chat = builder.build().await?;

    loop {
        let readline = rl.readline(">>> ");
        match readline {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                chat.respond(&line).await?;
                println!();
            }
            Err(ReadlineError::Interrupted) => break,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Some(path) = &save {
        chat.save(path)?;
        println!("Session saved to {}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::FilePayload;

    #[test]
    fn test_delta_is_unseen_suffix_only() {
        let mut render = StdoutRender::new();
        let mut turn = Turn::new(Role::Assistant);

        turn.update(Segment::Text("Hel".to_string()));
        assert_eq!(render.delta_for(&turn), "Hel");

        turn.update(Segment::Text("lo".to_string()));
        assert_eq!(render.delta_for(&turn), "lo");

        // Unchanged state prints nothing
        assert_eq!(render.delta_for(&turn), "");
    }

    #[test]
    fn test_delta_announces_new_segments() {
        let mut render = StdoutRender::new();
        let mut turn = Turn::new(Role::Assistant);

        turn.update(Segment::Text("Here".to_string()));
        assert_eq!(render.delta_for(&turn), "Here");

        turn.update(Segment::Image(FilePayload::new(
            vec![1, 2],
            Some("plot.png".to_string()),
            None,
        )));
        assert_eq!(render.delta_for(&turn), "\n[image: plot.png]");

        turn.update(Segment::Text("Done".to_string()));
        assert_eq!(render.delta_for(&turn), "\nDone");
    }

    #[test]
    fn test_delta_survives_shrinking_rewrite() {
        let mut render = StdoutRender::new();
        let mut turn = Turn::new(Role::Assistant);

        turn.update(Segment::Text("A long streamed sentence".to_string()));
        assert_eq!(render.delta_for(&turn), "A long streamed sentence");

        // Simulates the sandbox-link rewrite shortening the segment:
        // nothing is re-printed, and streaming resumes past the new end
        let mut rewritten = Turn::new(Role::Assistant);
        rewritten.update(Segment::Text("short".to_string()));
        assert_eq!(render.delta_for(&rewritten), "");

        rewritten.update(Segment::Text(" and more".to_string()));
        assert_eq!(render.delta_for(&rewritten), " and more");
    }

    #[test]
    fn test_new_turn_resets_tracking() {
        let mut render = StdoutRender::new();

        let mut first = Turn::new(Role::Assistant);
        first.update(Segment::Text("one".to_string()));
        first.update(Segment::Code("two".to_string()));
        assert_eq!(render.delta_for(&first), "one\ntwo");

        let mut second = Turn::new(Role::Assistant);
        second.update(Segment::Text("three".to_string()));
        assert_eq!(render.delta_for(&second), "three");
    }
}
