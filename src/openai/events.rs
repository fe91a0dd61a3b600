//! Typed events parsed from the Responses API event stream.
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Token usage reported on `response.completed`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// A citation or generated-artifact reference attached to streamed text.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub file_id: String,
    pub filename: String,
    pub container_id: Option<String>,
}

/// A completed function-call output item.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionCallItem {
    pub name: String,
    pub call_id: String,
    /// The argument JSON object, still as the raw string it streamed in
    /// as. Parsed only at invocation time.
    pub arguments: String,
}

/// One streamed event, normalized from the wire `type` discriminator.
/// Event types the driver has no use for are dropped during parsing.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseEvent {
    OutputTextDelta {
        delta: String,
    },
    CodeDelta {
        delta: String,
    },
    ReasoningSummaryDelta {
        delta: String,
    },
    ReasoningSummaryDone,
    PartialImage {
        item_id: String,
        bytes: Vec<u8>,
    },
    AnnotationAdded {
        annotation: Annotation,
    },
    FunctionCallDone(FunctionCallItem),
    Completed {
        response_id: String,
        usage: Usage,
    },
}

/// Incremental parser for the SSE byte stream. Handles event frames
/// fragmented across HTTP/2 chunks by buffering until a complete
/// `\n\n`-terminated frame is available.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    done: bool,
}

impl SseParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ResponseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut events = Vec::new();

        while let Some(split) = self.buffer.find("\n\n") {
            let frame = self.buffer[..split].to_string();
            self.buffer.drain(0..split + 2);

            let Some(payload) = extract_data_payload(&frame) else {
                continue;
            };
            if payload == "[DONE]" {
                self.done = true;
                break;
            }
            if payload.is_empty() {
                continue;
            }

            match serde_json::from_str::<Value>(&payload) {
                Ok(value) => {
                    if let Some(event) = map_event(value) {
                        events.push(event);
                    }
                }
                Err(e) => {
                    tracing::error!("Parsing stream event failed for {}\nError: {}", payload, e)
                }
            }
        }

        events
    }

    /// Whether the `[DONE]` sentinel has been seen.
    pub fn done(&self) -> bool {
        self.done
    }
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.trim())
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

fn map_event(value: Value) -> Option<ResponseEvent> {
    let event_type = value.get("type")?.as_str()?;

    match event_type {
        "response.output_text.delta" => Some(ResponseEvent::OutputTextDelta {
            delta: str_field(&value, "delta"),
        }),
        "response.code_interpreter_call_code.delta" => Some(ResponseEvent::CodeDelta {
            delta: str_field(&value, "delta"),
        }),
        "response.reasoning_summary_text.delta" => Some(ResponseEvent::ReasoningSummaryDelta {
            delta: str_field(&value, "delta"),
        }),
        "response.reasoning_summary_text.done" => Some(ResponseEvent::ReasoningSummaryDone),
        "response.image_generation_call.partial_image" => {
            let item_id = str_field(&value, "item_id");
            let b64 = str_field(&value, "partial_image_b64");
            match BASE64.decode(b64.as_bytes()) {
                Ok(bytes) => Some(ResponseEvent::PartialImage { item_id, bytes }),
                Err(e) => {
                    tracing::error!("Invalid partial image payload for {}: {}", item_id, e);
                    None
                }
            }
        }
        "response.output_text.annotation.added" => {
            let annotation = value.get("annotation")?;
            Some(ResponseEvent::AnnotationAdded {
                annotation: Annotation {
                    file_id: str_field(annotation, "file_id"),
                    filename: str_field(annotation, "filename"),
                    container_id: annotation
                        .get("container_id")
                        .and_then(|v| v.as_str())
                        .map(ToString::to_string),
                },
            })
        }
        "response.output_item.done" => {
            let item = value.get("item")?;
            if item.get("type")?.as_str()? != "function_call" {
                return None;
            }
            Some(ResponseEvent::FunctionCallDone(FunctionCallItem {
                name: str_field(item, "name"),
                call_id: str_field(item, "call_id"),
                arguments: str_field(item, "arguments"),
            }))
        }
        "response.completed" => {
            let response = value.get("response")?;
            let usage = response
                .get("usage")
                .and_then(|u| serde_json::from_value(u.clone()).ok())
                .unwrap_or_default();
            Some(ResponseEvent::Completed {
                response_id: str_field(response, "id"),
                usage,
            })
        }
        _ => None,
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frames_incrementally() {
        let mut parser = SseParser::default();

        let events =
            parser.feed(b"data: {\"type\":\"response.output_text.delta\",\"delta\":\"Hel");
        assert!(events.is_empty());

        let events = parser.feed(b"lo\"}\n\n");
        assert_eq!(
            events,
            vec![ResponseEvent::OutputTextDelta {
                delta: "Hello".to_string()
            }]
        );

        let events = parser.feed(b"data: [DONE]\n\n");
        assert!(events.is_empty());
        assert!(parser.done());
    }

    #[test]
    fn test_empty_delta_is_forwarded() {
        let mut parser = SseParser::default();
        let events =
            parser.feed(b"data: {\"type\":\"response.output_text.delta\",\"delta\":\"\"}\n\n");
        assert_eq!(
            events,
            vec![ResponseEvent::OutputTextDelta {
                delta: String::new()
            }]
        );
    }

    #[test]
    fn test_code_and_reasoning_deltas() {
        let mut parser = SseParser::default();
        let events = parser.feed(
            b"data: {\"type\":\"response.code_interpreter_call_code.delta\",\"delta\":\"x=1\"}\n\n\
              data: {\"type\":\"response.reasoning_summary_text.delta\",\"delta\":\"hmm\"}\n\n\
              data: {\"type\":\"response.reasoning_summary_text.done\"}\n\n",
        );
        assert_eq!(
            events,
            vec![
                ResponseEvent::CodeDelta {
                    delta: "x=1".to_string()
                },
                ResponseEvent::ReasoningSummaryDelta {
                    delta: "hmm".to_string()
                },
                ResponseEvent::ReasoningSummaryDone,
            ]
        );
    }

    #[test]
    fn test_partial_image_decodes_base64() {
        let mut parser = SseParser::default();
        // "abc" -> YWJj
        let events = parser.feed(
            b"data: {\"type\":\"response.image_generation_call.partial_image\",\
              \"item_id\":\"ig_1\",\"partial_image_b64\":\"YWJj\"}\n\n",
        );
        assert_eq!(
            events,
            vec![ResponseEvent::PartialImage {
                item_id: "ig_1".to_string(),
                bytes: b"abc".to_vec()
            }]
        );
    }

    #[test]
    fn test_function_call_output_item() {
        let mut parser = SseParser::default();
        let events = parser.feed(
            b"data: {\"type\":\"response.output_item.done\",\"item\":{\
              \"type\":\"function_call\",\"name\":\"lookup\",\"call_id\":\"call_1\",\
              \"arguments\":\"{\\\"x\\\": 2}\"}}\n\n",
        );
        assert_eq!(
            events,
            vec![ResponseEvent::FunctionCallDone(FunctionCallItem {
                name: "lookup".to_string(),
                call_id: "call_1".to_string(),
                arguments: "{\"x\": 2}".to_string(),
            })]
        );
    }

    #[test]
    fn test_non_function_output_items_are_dropped() {
        let mut parser = SseParser::default();
        let events = parser.feed(
            b"data: {\"type\":\"response.output_item.done\",\"item\":{\"type\":\"message\"}}\n\n",
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_annotation_added() {
        let mut parser = SseParser::default();
        let events = parser.feed(
            b"data: {\"type\":\"response.output_text.annotation.added\",\"annotation\":{\
              \"file_id\":\"cfile_1\",\"filename\":\"cfile_1-plot.png\",\
              \"container_id\":\"cntr_1\"}}\n\n",
        );
        assert_eq!(
            events,
            vec![ResponseEvent::AnnotationAdded {
                annotation: Annotation {
                    file_id: "cfile_1".to_string(),
                    filename: "cfile_1-plot.png".to_string(),
                    container_id: Some("cntr_1".to_string()),
                }
            }]
        );
    }

    #[test]
    fn test_completed_captures_id_and_usage() {
        let mut parser = SseParser::default();
        let events = parser.feed(
            b"data: {\"type\":\"response.completed\",\"response\":{\"id\":\"resp_1\",\
              \"usage\":{\"input_tokens\":10,\"output_tokens\":5,\"total_tokens\":15}}}\n\n",
        );
        assert_eq!(
            events,
            vec![ResponseEvent::Completed {
                response_id: "resp_1".to_string(),
                usage: Usage {
                    input_tokens: 10,
                    output_tokens: 5,
                    total_tokens: 15
                },
            }]
        );
    }

    #[test]
    fn test_unknown_event_types_are_ignored() {
        let mut parser = SseParser::default();
        let events = parser.feed(b"data: {\"type\":\"response.in_progress\"}\n\n");
        assert!(events.is_empty());
    }
}
