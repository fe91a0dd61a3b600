//! One role-attributed message unit composed of typed segments.
use serde::{Deserialize, Serialize};

use super::segment::Segment;
use crate::render::Render;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// An ordered sequence of segments with coalescing-append semantics.
///
/// Within one streaming pass, consecutive updates of the same textual
/// kind extend the trailing segment. A generated image update replaces
/// the trailing generated image wholesale (progressive refinement, not
/// growth). Everything else opens a new segment.
#[derive(Clone, Debug, PartialEq)]
pub struct Turn {
    pub role: Role,
    segments: Vec<Segment>,
}

enum UpdateAction {
    Extend,
    Replace,
    Push,
}

impl Turn {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            segments: Vec::new(),
        }
    }

    pub fn with_segments(role: Role, segments: Vec<Segment>) -> Self {
        Self { role, segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn last_segment(&self) -> Option<&Segment> {
        self.segments.last()
    }

    pub(crate) fn last_segment_mut(&mut self) -> Option<&mut Segment> {
        self.segments.last_mut()
    }

    /// Apply one streamed update. Zero-length textual deltas still take
    /// effect: they create or extend a segment rather than being skipped.
    pub fn update(&mut self, update: Segment) {
        let action = match (self.segments.last(), &update) {
            (Some(last), update)
                if last.kind() == update.kind() && update.kind().is_textual() =>
            {
                UpdateAction::Extend
            }
            (Some(Segment::GeneratedImage(_)), Segment::GeneratedImage(_)) => {
                UpdateAction::Replace
            }
            _ => UpdateAction::Push,
        };

        match action {
            UpdateAction::Extend => {
                if let Some(last) = self.segments.last_mut()
                    && let (Some(buf), Some(delta)) = (last.text_mut(), update.text())
                {
                    buf.push_str(delta);
                }
            }
            UpdateAction::Replace => {
                if let Some(last) = self.segments.last_mut() {
                    *last = update;
                }
            }
            UpdateAction::Push => self.segments.push(update),
        }
    }

    /// Full redraw through the rendering collaborator.
    pub fn render(&self, renderer: &mut dyn Render) {
        renderer.render(self);
    }

    /// The live-streaming primitive: every incremental event funnels
    /// through this exactly once.
    pub fn update_and_render(&mut self, update: Segment, renderer: &mut dyn Render) {
        self.update(update);
        self.render(renderer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::segment::{FilePayload, SegmentKind};

    #[test]
    fn test_text_deltas_coalesce_in_order() {
        let mut turn = Turn::new(Role::Assistant);
        for delta in ["Hel", "lo", " wor", "ld"] {
            turn.update(Segment::Text(delta.to_string()));
        }
        assert_eq!(turn.segments().len(), 1);
        assert_eq!(turn.segments()[0].text(), Some("Hello world"));
    }

    #[test]
    fn test_category_switch_never_merges() {
        let mut turn = Turn::new(Role::Assistant);
        turn.update(Segment::Text("before".to_string()));
        turn.update(Segment::Code("print(1)".to_string()));
        turn.update(Segment::Text("after".to_string()));

        let kinds: Vec<SegmentKind> = turn.segments().iter().map(|s| s.kind()).collect();
        assert_eq!(
            kinds,
            vec![SegmentKind::Text, SegmentKind::Code, SegmentKind::Text]
        );
        assert_eq!(turn.segments()[2].text(), Some("after"));
    }

    #[test]
    fn test_generated_image_replaces() {
        let mut turn = Turn::new(Role::Assistant);
        for frame in [vec![1u8], vec![1, 2], vec![1, 2, 3]] {
            turn.update(Segment::GeneratedImage(FilePayload::new(
                frame,
                Some("img.png".to_string()),
                Some("ig_1".to_string()),
            )));
        }
        assert_eq!(turn.segments().len(), 1);
        assert_eq!(turn.segments()[0].payload().unwrap().bytes, vec![1, 2, 3]);
    }

    #[test]
    fn test_binary_same_kind_appends_new_segment() {
        // Only generated images replace; plain images accumulate
        let mut turn = Turn::new(Role::Assistant);
        turn.update(Segment::Image(FilePayload::new(vec![1], None, None)));
        turn.update(Segment::Image(FilePayload::new(vec![2], None, None)));
        assert_eq!(turn.segments().len(), 2);
    }

    #[test]
    fn test_empty_delta_still_applies() {
        let mut turn = Turn::new(Role::Assistant);
        turn.update(Segment::Text(String::new()));
        assert_eq!(turn.segments().len(), 1);
        assert_eq!(turn.segments()[0].text(), Some(""));

        turn.update(Segment::Text(String::new()));
        assert_eq!(turn.segments().len(), 1);
    }

    #[test]
    fn test_reasoning_extends_reasoning_only() {
        let mut turn = Turn::new(Role::Assistant);
        turn.update(Segment::Reasoning("thinking".to_string()));
        turn.update(Segment::Reasoning("...".to_string()));
        turn.update(Segment::Text("answer".to_string()));
        assert_eq!(turn.segments().len(), 2);
        assert_eq!(turn.segments()[0].text(), Some("thinking..."));
    }

    #[test]
    fn test_render_is_idempotent_against_unchanged_state() {
        struct Snapshot(Vec<Vec<Segment>>);
        impl Render for Snapshot {
            fn render(&mut self, turn: &Turn) {
                self.0.push(turn.segments().to_vec());
            }
        }

        let mut turn = Turn::new(Role::Assistant);
        turn.update(Segment::Text("Hi".to_string()));

        let mut renderer = Snapshot(Vec::new());
        turn.render(&mut renderer);
        turn.render(&mut renderer);
        assert_eq!(renderer.0[0], renderer.0[1]);
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), r#""user""#);
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            r#""assistant""#
        );
    }
}
