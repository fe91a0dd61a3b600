//! The ordered conversation history plus the request-side state that
//! threads one generation call to the next.
use serde_json::{Value, json};

use super::turn::{Role, Turn};
use crate::openai::events::Usage;

/// One queued entry of the pending-input buffer, mirroring the wire
/// shapes accepted by the generation API's `input` array.
#[derive(Clone, Debug, PartialEq)]
pub enum InputItem {
    Message { role: Role, content: String },
    FunctionCallOutput { call_id: String, output: String },
    InputImage { file_id: String },
    InputFile { file_id: String },
}

impl InputItem {
    pub fn message(role: Role, content: &str) -> Self {
        Self::Message {
            role,
            content: content.to_string(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Message { role, content } => {
                let role = match role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                json!({ "role": role, "content": content })
            }
            Self::FunctionCallOutput { call_id, output } => json!({
                "type": "function_call_output",
                "call_id": call_id,
                "output": output,
            }),
            Self::InputImage { file_id } => json!({
                "role": "user",
                "content": [{ "type": "input_image", "file_id": file_id }],
            }),
            Self::InputFile { file_id } => json!({
                "role": "user",
                "content": [{ "type": "input_file", "file_id": file_id }],
            }),
        }
    }
}

/// Append-only sequence of turns for one conversation. Also owns the
/// pending-input buffer, the continuation handle correlating follow-up
/// calls with prior server-side context, and running usage counters.
#[derive(Default)]
pub struct Transcript {
    turns: Vec<Turn>,
    pending: Vec<InputItem>,
    previous_response_id: Option<String>,
    usage: Usage,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn last_turn_mut(&mut self) -> Option<&mut Turn> {
        self.turns.last_mut()
    }

    /// Open a new empty turn; it becomes the streaming target for
    /// subsequent updates.
    pub fn begin_turn(&mut self, role: Role) -> &mut Turn {
        self.turns.push(Turn::new(role));
        // Just pushed, so the last element always exists
        self.turns.last_mut().expect("turn was just pushed")
    }

    pub fn push_turn(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn queue_input(&mut self, item: InputItem) {
        self.pending.push(item);
    }

    pub fn pending(&self) -> &[InputItem] {
        &self.pending
    }

    /// Flush the pending-input buffer. Called exactly once per request
    /// issued; the drained entries become server-side state addressed by
    /// the continuation handle.
    pub fn take_pending(&mut self) -> Vec<InputItem> {
        std::mem::take(&mut self.pending)
    }

    pub fn continuation(&self) -> Option<&str> {
        self.previous_response_id.as_deref()
    }

    /// Once set, the handle threads every subsequent request until
    /// replaced by a newer one.
    pub fn set_continuation(&mut self, response_id: String) {
        self.previous_response_id = Some(response_id);
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn add_usage(&mut self, usage: Usage) {
        self.usage.input_tokens += usage.input_tokens;
        self.usage.output_tokens += usage.output_tokens;
        self.usage.total_tokens += usage.total_tokens;
    }
}
