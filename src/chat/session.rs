//! The chat session: configuration, tool wiring, file tracking, and the
//! streaming response driver.
use std::borrow::Cow;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use futures_util::{StreamExt, pin_mut};
use regex::Regex;
use serde_json::{Value, json};
use tempfile::TempDir;

use super::archive;
use super::files::{self, FileSearchHandle, FileSource, TrackedFile};
use super::segment::{FilePayload, Segment};
use super::tools::{BoxedFunctionTool, McpServer, ToolRegistry, ToolSpec};
use super::transcript::{InputItem, Transcript};
use super::turn::{Role, Turn};
use crate::openai::client::{Client, FilePurpose};
use crate::openai::events::{Annotation, FunctionCallItem, ResponseEvent};
use crate::render::{NullRender, Render};

/// Baseline instructions prepended to the user-supplied ones on every
/// generation call.
const DEVELOPER_MESSAGE: &str = "\
- Use GitHub-flavored Markdown in your response, including tables, images, URLs, code blocks, and lists.
- Wrap all mathematical expressions and LaTeX terms in `$...$` for inline math and `$$...$$` for display math.
- When a custom function is called with a file path as its input, you must use the local file path.
";

/// Rewrites sandbox-local file links into a human-readable form.
static SANDBOX_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!?\[([^\]]+)\]\(sandbox:/mnt/data/([^\)]+)\)").expect("Invalid regex")
});

/// Annotated container artifacts with these extensions render inline;
/// everything else becomes a download.
const INLINE_IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg"];

const INDEXING_POLL_INTERVAL: Duration = Duration::from_millis(500);

fn rewrite_sandbox_links(text: &str) -> Cow<'_, str> {
    SANDBOX_LINK_RE.replace_all(text, "$1 (`$2`)")
}

/// A multi-turn conversational session backed by the hosted generation
/// API.
///
/// Supports:
/// - Streaming into a live transcript of typed segments
/// - Custom function tools with a second-pass continuation
/// - File tracking into retrieval, execution, and vision tools
/// - Saving/loading the session to a portable archive
///
/// Use `ChatBuilder` to construct a valid `Chat`.
pub struct Chat {
    client: Client,
    model: String,
    instructions: String,
    temperature: f32,
    registry: ToolRegistry,
    tools: Vec<ToolSpec>,
    transcript: Transcript,
    tracked_files: Vec<TrackedFile>,
    container_id: Option<String>,
    vector_store_id: Option<String>,
    allow_code_interpreter: bool,
    renderer: Box<dyn Render>,
    workdir: TempDir,
}

impl Chat {
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn tracked_files(&self) -> &[TrackedFile] {
        &self.tracked_files
    }

    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    /// Send a user prompt and stream the assistant's response into the
    /// transcript. Returns once the turn is complete, including any tool
    /// round-trip.
    pub async fn respond(&mut self, prompt: &str) -> Result<()> {
        self.transcript
            .queue_input(InputItem::message(Role::User, prompt));
        self.transcript.push_turn(Turn::with_segments(
            Role::User,
            vec![Segment::Text(prompt.to_string())],
        ));
        if let Some(turn) = self.transcript.last_turn() {
            turn.render(self.renderer.as_mut());
        }

        self.transcript.begin_turn(Role::Assistant);

        let tool_calls = self.stream_pass().await?;
        if !tool_calls.is_empty() {
            self.resolve_tool_calls(tool_calls).await?;
            // Single-level tool resolution: a continuation pass that
            // itself requests tools is not resolved further.
            let _ = self.stream_pass().await?;
        }

        Ok(())
    }

    /// Issue one streaming generation call and consume its events,
    /// mutating the open assistant turn. Returns the function calls the
    /// model requested during this pass.
    async fn stream_pass(&mut self) -> Result<Vec<FunctionCallItem>> {
        let payload = self.request_payload();
        let stream = self.client.stream_response(payload);
        pin_mut!(stream);

        let mut tool_calls: Vec<FunctionCallItem> = Vec::new();

        while let Some(event) = stream.next().await {
            match event? {
                ResponseEvent::OutputTextDelta { delta } => {
                    self.update_and_render(Segment::Text(delta));
                    self.clean_last_text();
                }
                ResponseEvent::CodeDelta { delta } => {
                    self.update_and_render(Segment::Code(delta));
                }
                ResponseEvent::ReasoningSummaryDelta { delta } => {
                    self.update_and_render(Segment::Reasoning(delta));
                }
                ResponseEvent::ReasoningSummaryDone => {
                    self.update_and_render(Segment::Reasoning("\n\n".to_string()));
                }
                ResponseEvent::PartialImage { item_id, bytes } => {
                    let filename = format!("{}.png", item_id);
                    self.update_and_render(Segment::GeneratedImage(FilePayload::new(
                        bytes,
                        Some(filename),
                        Some(item_id),
                    )));
                }
                ResponseEvent::AnnotationAdded { annotation } => {
                    self.handle_annotation(annotation).await?;
                }
                ResponseEvent::FunctionCallDone(item) => {
                    // Last event per name wins
                    match tool_calls.iter_mut().find(|c| c.name == item.name) {
                        Some(existing) => *existing = item,
                        None => tool_calls.push(item),
                    }
                }
                ResponseEvent::Completed { response_id, usage } => {
                    self.transcript.set_continuation(response_id);
                    self.transcript.add_usage(usage);
                }
            }
        }

        Ok(tool_calls)
    }

    /// Build the request body and flush the pending-input buffer. The
    /// drained entries become server-side state addressed by the
    /// continuation handle.
    fn request_payload(&mut self) -> Value {
        let input: Vec<Value> = self
            .transcript
            .take_pending()
            .iter()
            .map(InputItem::to_value)
            .collect();

        let mut payload = json!({
            "model": self.model,
            "input": input,
            "instructions": format!("{}{}", DEVELOPER_MESSAGE, self.instructions),
            "temperature": self.temperature,
            "stream": true,
        });
        if !self.tools.is_empty() {
            payload["tools"] = json!(self.tools);
        }
        if let Some(id) = self.transcript.continuation() {
            payload["previous_response_id"] = json!(id);
        }
        payload
    }

    fn update_and_render(&mut self, update: Segment) {
        if let Some(turn) = self.transcript.last_turn_mut() {
            turn.update_and_render(update, self.renderer.as_mut());
        }
    }

    /// Apply the cleanup transform to the trailing text segment.
    fn clean_last_text(&mut self) {
        if let Some(turn) = self.transcript.last_turn_mut()
            && let Some(Segment::Text(buf)) = turn.last_segment_mut()
            && SANDBOX_LINK_RE.is_match(buf)
        {
            *buf = rewrite_sandbox_links(buf).into_owned();
        }
    }

    /// Classify an annotation and append the matching segment.
    ///
    /// A file whose id appears inside its own filename is treated as an
    /// artifact generated in the execution container; anything else is a
    /// citation served by the file store. This substring heuristic is
    /// inherited upstream behavior and is pinned by tests; do not
    /// tighten it.
    async fn handle_annotation(&mut self, annotation: Annotation) -> Result<()> {
        let Annotation {
            file_id,
            filename,
            container_id,
        } = annotation;

        if filename.contains(&file_id) {
            let container_id = container_id
                .or_else(|| self.container_id.clone())
                .ok_or_else(|| anyhow!("Annotated container file {} without a container", file_id))?;
            let bytes = self
                .client
                .container_file_content(&container_id, &file_id)
                .await?;
            let payload = FilePayload::new(bytes, Some(filename.clone()), Some(file_id));
            if INLINE_IMAGE_EXTENSIONS.contains(&files::extension(Path::new(&filename)).as_str())
            {
                self.update_and_render(Segment::Image(payload));
            } else {
                self.update_and_render(Segment::Download(payload));
            }
        } else {
            let bytes = self.client.file_content(&file_id).await?;
            self.update_and_render(Segment::Download(FilePayload::new(
                bytes,
                Some(filename),
                Some(file_id),
            )));
        }
        Ok(())
    }

    /// Execute the requested function calls and queue their outputs for
    /// the continuation pass.
    async fn resolve_tool_calls(&mut self, calls: Vec<FunctionCallItem>) -> Result<()> {
        for call in calls {
            let tool = self.registry.get(&call.name)?;
            // Argument JSON must parse fully before invocation
            let args: Value = serde_json::from_str(&call.arguments)?;
            tracing::debug!("\nTool call: {}\nargs: {}", call.name, call.arguments);
            let result = tool.call(args).await?;
            let output = match result {
                Value::String(s) => s,
                other => other.to_string(),
            };
            self.transcript.queue_input(InputItem::FunctionCallOutput {
                call_id: call.call_id,
                output,
            });
        }
        Ok(())
    }

    /// Track a file: persist it locally, announce its path to the model,
    /// and wire it into every tool that can consume it.
    pub async fn track(&mut self, source: FileSource) -> Result<()> {
        self.track_with(source, false).await
    }

    /// Like [`track`](Self::track), but never attaches the file to the
    /// retrieval index.
    pub async fn track_skipping_retrieval(&mut self, source: FileSource) -> Result<()> {
        self.track_with(source, true).await
    }

    async fn track_with(&mut self, source: FileSource, skip_retrieval: bool) -> Result<()> {
        let path = match source {
            FileSource::Path(path) => path,
            FileSource::Memory { name, bytes } => {
                let path = self.workdir.path().join(&name);
                tokio::fs::write(&path, &bytes).await?;
                path
            }
        };

        // Lets tool handlers receive a path and the model correlate
        // natural-language references with file identity
        self.transcript.queue_input(InputItem::message(
            Role::User,
            &format!("File locally available at: {}", path.display()),
        ));

        let mut tracked = TrackedFile::new(path.clone());
        tracked.skip_retrieval = skip_retrieval;

        // PDFs may be fed directly as document input. This is the one
        // probe whose failure is swallowed: it falls through to the
        // retrieval path below.
        if files::is_pdf(&path) {
            match self.client.upload_file(&path, FilePurpose::UserData).await {
                Ok(file_id) => {
                    self.transcript.queue_input(InputItem::InputFile {
                        file_id: file_id.clone(),
                    });
                    tracked.direct_input_file_id = Some(file_id);
                }
                Err(e) => {
                    tracing::debug!(
                        "Direct document input failed for {}: {}",
                        path.display(),
                        e
                    );
                }
            }
        }

        if files::is_vision_eligible(&path) {
            let file_id = self.client.upload_file(&path, FilePurpose::Vision).await?;
            self.transcript.queue_input(InputItem::InputImage {
                file_id: file_id.clone(),
            });
            tracked.vision_file_id = Some(file_id);
        }

        if self.allow_code_interpreter && files::is_code_interpreter_eligible(&path) {
            // Vision uploads double as sandbox inputs; the handle is
            // shared rather than uploading twice
            let file_id = match &tracked.vision_file_id {
                Some(id) => id.clone(),
                None => {
                    self.client
                        .upload_file(&path, FilePurpose::Assistants)
                        .await?
                }
            };
            let container_id = self.ensure_container().await?;
            self.client
                .attach_container_file(&container_id, &file_id)
                .await?;
            tracked.code_interpreter_file_id = Some(file_id);
            tracked.is_container_file = true;
        }

        if files::is_file_search_eligible(&path)
            && tracked.direct_input_file_id.is_none()
            && !tracked.skip_retrieval
        {
            let file_id = self.client.upload_file(&path, FilePurpose::UserData).await?;
            let vector_store_id = self.ensure_vector_store().await?;
            self.client
                .attach_vector_store_file(&vector_store_id, &file_id)
                .await?;
            self.await_indexing(&vector_store_id, &file_id).await?;
            tracked.file_search = Some(FileSearchHandle {
                file_id,
                vector_store_id,
            });
        }

        self.tracked_files.push(tracked);
        Ok(())
    }

    async fn await_indexing(&self, vector_store_id: &str, file_id: &str) -> Result<()> {
        loop {
            let status = self
                .client
                .vector_store_file_status(vector_store_id, file_id)
                .await?;
            match status.as_str() {
                "completed" => return Ok(()),
                "failed" | "cancelled" => {
                    bail!("Indexing did not complete for {}: {}", file_id, status)
                }
                _ => tokio::time::sleep(INDEXING_POLL_INTERVAL).await,
            }
        }
    }

    async fn ensure_container(&mut self) -> Result<String> {
        if let Some(id) = &self.container_id {
            return Ok(id.clone());
        }
        let id = self.client.create_container("container").await?;
        self.container_id = Some(id.clone());
        self.tools.push(ToolSpec::CodeInterpreter {
            container: id.clone(),
        });
        Ok(id)
    }

    /// Recreate an expired execution container and re-attach every
    /// previously tracked sandbox file.
    pub async fn refresh_container(&mut self) -> Result<()> {
        let id = self.client.create_container("container").await?;
        for tool in &mut self.tools {
            if let ToolSpec::CodeInterpreter { container } = tool {
                *container = id.clone();
            }
        }
        self.container_id = Some(id.clone());
        for file in &self.tracked_files {
            if let Some(file_id) = &file.code_interpreter_file_id {
                self.client.attach_container_file(&id, file_id).await?;
            }
        }
        Ok(())
    }

    /// The single lazily created retrieval index. The file-search tool
    /// entry is created once and accumulates store ids.
    async fn ensure_vector_store(&mut self) -> Result<String> {
        if let Some(id) = &self.vector_store_id {
            return Ok(id.clone());
        }
        let id = self.client.create_vector_store().await?;
        self.vector_store_id = Some(id.clone());

        if let Some(ToolSpec::FileSearch { vector_store_ids }) = self
            .tools
            .iter_mut()
            .find(|t| matches!(t, ToolSpec::FileSearch { .. }))
        {
            if !vector_store_ids.contains(&id) {
                vector_store_ids.push(id.clone());
            }
        } else {
            self.tools.push(ToolSpec::FileSearch {
                vector_store_ids: vec![id.clone()],
            });
        }
        Ok(id)
    }

    /// Save the conversation to a portable archive.
    pub fn save(&self, path: &Path) -> Result<()> {
        archive::save(path, &self.model, &self.instructions, self.transcript.turns())
    }

    async fn load_history(&mut self, path: &Path) -> Result<()> {
        let loaded = archive::load(path)?;

        // A resumed session has no continuation handle, so prior textual
        // context is replayed through the pending-input buffer
        let mut retrack = Vec::new();
        for turn in &loaded.turns {
            for segment in turn.segments() {
                match segment {
                    Segment::Text(s) | Segment::Code(s) | Segment::Reasoning(s) => {
                        self.transcript.queue_input(InputItem::Message {
                            role: turn.role,
                            content: s.clone(),
                        });
                    }
                    Segment::Upload(p) => {
                        if let Some(name) = &p.filename {
                            retrack.push((name.clone(), p.bytes.clone()));
                        }
                    }
                    _ => {}
                }
            }
        }

        for turn in loaded.turns {
            self.transcript.push_turn(turn);
        }
        if let Some(turn) = self.transcript.last_turn() {
            turn.render(self.renderer.as_mut());
        }

        for (name, bytes) in retrack {
            self.track(FileSource::Memory { name, bytes }).await?;
        }
        Ok(())
    }
}

/// Builder for [`Chat`]. Construction is async because it may create
/// the execution container, upload initial files, and load history.
pub struct ChatBuilder {
    api_hostname: String,
    api_key: Option<String>,
    model: String,
    instructions: String,
    temperature: f32,
    welcome_message: Option<String>,
    vector_store_ids: Vec<String>,
    allow_code_interpreter: bool,
    web_search: bool,
    image_generation: Option<u8>,
    mcp_servers: Vec<McpServer>,
    functions: Vec<BoxedFunctionTool>,
    files: Vec<FileSource>,
    history: Option<PathBuf>,
    renderer: Option<Box<dyn Render>>,
}

impl Default for ChatBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatBuilder {
    pub fn new() -> Self {
        Self {
            api_hostname: "https://api.openai.com".to_string(),
            api_key: None,
            model: "gpt-4o".to_string(),
            instructions: String::new(),
            temperature: 1.0,
            welcome_message: None,
            vector_store_ids: Vec::new(),
            allow_code_interpreter: true,
            web_search: false,
            image_generation: None,
            mcp_servers: Vec::new(),
            functions: Vec::new(),
            files: Vec::new(),
            history: None,
            renderer: None,
        }
    }

    pub fn api_hostname(mut self, api_hostname: &str) -> Self {
        self.api_hostname = api_hostname.to_string();
        self
    }

    pub fn api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    pub fn model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn instructions(mut self, instructions: &str) -> Self {
        self.instructions = instructions.to_string();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn welcome_message(mut self, message: &str) -> Self {
        self.welcome_message = Some(message.to_string());
        self
    }

    /// Preexisting retrieval indices to advertise for file search.
    pub fn vector_store_ids(mut self, ids: Vec<String>) -> Self {
        self.vector_store_ids = ids;
        self
    }

    pub fn allow_code_interpreter(mut self, allow: bool) -> Self {
        self.allow_code_interpreter = allow;
        self
    }

    pub fn web_search(mut self, enabled: bool) -> Self {
        self.web_search = enabled;
        self
    }

    /// Enable image generation with the given number of partial frames
    /// streamed per image.
    pub fn image_generation(mut self, partial_images: u8) -> Self {
        self.image_generation = Some(partial_images);
        self
    }

    pub fn mcp_server(mut self, server: McpServer) -> Self {
        self.mcp_servers.push(server);
        self
    }

    pub fn tools(mut self, tools: Vec<BoxedFunctionTool>) -> Self {
        self.functions.extend(tools);
        self
    }

    /// Files to track during construction.
    pub fn files(mut self, files: Vec<FileSource>) -> Self {
        self.files = files;
        self
    }

    /// Load a previously saved session archive.
    pub fn history(mut self, path: &Path) -> Self {
        self.history = Some(path.to_path_buf());
        self
    }

    pub fn renderer(mut self, renderer: Box<dyn Render>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub async fn build(self) -> Result<Chat> {
        let Self {
            api_hostname,
            api_key,
            model,
            instructions,
            temperature,
            welcome_message,
            vector_store_ids,
            allow_code_interpreter,
            web_search,
            image_generation,
            mcp_servers,
            functions,
            files,
            history,
            renderer,
        } = self;

        let api_key = match api_key {
            Some(key) => key,
            None => env::var("OPENAI_API_KEY").map_err(|_| {
                anyhow!("Missing API key: pass one explicitly or set OPENAI_API_KEY")
            })?,
        };

        // Fail fast on a malformed archive path before any remote calls
        if let Some(history) = &history
            && !history.to_string_lossy().ends_with(".zip")
        {
            bail!("History file must end with .zip: {}", history.display());
        }

        let mut registry = ToolRegistry::new();
        for function in functions {
            registry.register(function)?;
        }
        let mut tools: Vec<ToolSpec> = registry.iter().map(ToolSpec::function).collect();
        if !vector_store_ids.is_empty() {
            tools.push(ToolSpec::FileSearch { vector_store_ids });
        }
        if web_search {
            tools.push(ToolSpec::WebSearch);
        }
        if let Some(partial_images) = image_generation {
            tools.push(ToolSpec::ImageGeneration { partial_images });
        }
        for server in mcp_servers {
            tools.push(server.into());
        }

        let mut chat = Chat {
            client: Client::new(&api_hostname, &api_key),
            model,
            instructions,
            temperature,
            registry,
            tools,
            transcript: Transcript::new(),
            tracked_files: Vec::new(),
            container_id: None,
            vector_store_id: None,
            allow_code_interpreter,
            renderer: renderer.unwrap_or_else(|| Box::new(NullRender)),
            workdir: tempfile::tempdir()?,
        };

        if chat.allow_code_interpreter {
            chat.ensure_container().await?;
        }

        if let Some(welcome) = welcome_message {
            chat.transcript
                .queue_input(InputItem::message(Role::Assistant, &welcome));
            chat.transcript.push_turn(Turn::with_segments(
                Role::Assistant,
                vec![Segment::Text(welcome)],
            ));
        }

        for source in files {
            chat.track(source).await?;
        }

        if let Some(history) = history {
            chat.load_history(&history).await?;
        }

        Ok(chat)
    }
}
