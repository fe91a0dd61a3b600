pub mod client;
pub mod events;

pub use client::{Client, FilePurpose, ListPage, ListedObject};
pub use events::{Annotation, FunctionCallItem, ResponseEvent, SseParser, Usage};
