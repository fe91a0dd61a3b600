pub mod archive;
pub mod files;
pub mod segment;
pub mod session;
pub mod tools;
pub mod transcript;
pub mod turn;

pub use files::{FileSearchHandle, FileSource, TrackedFile};
pub use segment::{FilePayload, Segment, SegmentKind};
pub use session::{Chat, ChatBuilder};
pub use tools::{BoxedFunctionTool, FunctionTool, McpServer, ToolRegistry, ToolSpec};
pub use transcript::{InputItem, Transcript};
pub use turn::{Role, Turn};
