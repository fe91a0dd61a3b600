//! The rendering seam between the chat session and whatever UI hosts it.
use crate::chat::turn::Turn;

/// Redraws one turn. Called after every streamed mutation, so
/// implementations must be idempotent against unchanged state: rendering
/// the same turn twice in a row produces the same visible structure.
pub trait Render: Send {
    fn render(&mut self, turn: &Turn);
}

/// Renderer for headless use (tests, batch scripts).
#[derive(Default)]
pub struct NullRender;

impl Render for NullRender {
    fn render(&mut self, _turn: &Turn) {}
}
