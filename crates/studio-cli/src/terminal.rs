//! Renders engine notifications to the terminal as they arrive.

use std::collections::HashSet;
use std::io::Write;
use std::sync::Mutex;

use studio_agent::{ConversationSink, STOPPED_MARKER};

const RESULT_PREVIEW_CHARS: usize = 200;

/// Prints streamed text to stdout and tool activity inline.
#[derive(Default)]
pub struct TerminalSink {
    announced: Mutex<HashSet<String>>,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time `id` is seen in the current turn.
    fn first_sighting(&self, id: &str) -> bool {
        let mut announced = self
            .announced
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        announced.insert(id.to_string())
    }

    fn reset(&self) {
        self.announced
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

fn preview(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("");
    let mut shown: String = first_line.chars().take(RESULT_PREVIEW_CHARS).collect();
    if shown.len() < first_line.len() || text.lines().nth(1).is_some() {
        shown.push_str(" ...");
    }
    shown
}

impl ConversationSink for TerminalSink {
    fn on_text_delta(&self, text: &str) {
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "{text}");
        let _ = stdout.flush();
    }

    fn on_tool_call_started(&self, id: &str, name: &str, args: &serde_json::Value) {
        if self.first_sighting(id) {
            println!("\n[tool] {name}");
        } else if args.as_object().is_some_and(|a| !a.is_empty()) {
            println!("[tool] {name} {args}");
        }
    }

    fn on_tool_call_resolved(&self, _id: &str, result: &str) {
        println!("  -> {}", preview(result));
    }

    fn on_turn_finished(&self, text: &str) {
        self.reset();
        if text == STOPPED_MARKER {
            println!("\n{STOPPED_MARKER}");
        } else {
            println!();
        }
    }

    fn on_turn_failed(&self, message: &str) {
        self.reset();
        eprintln!("\nerror: {message}");
    }
}
