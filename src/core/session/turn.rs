//! The per-turn tool-calling loop
//!
//! A turn streams a model response through the segmenter into the synthesis
//! pipeline. When the model asks for a tool, the tool runs and its result
//! either ends the turn (spoken directly) or is fed back to the model for
//! another round, up to `max_tool_depth` round trips.

use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::data::{Binding, Session};
use super::events::TurnMarker;
use crate::core::dialogue::{Dialogue, Message, ToolCallDescriptor};
use crate::core::llm::{LlmChunk, LlmStream, ToolCallDelta};
use crate::core::segmenter::{Segment, Segmenter};
use crate::core::synthesis::SynthesisPipeline;
use crate::core::tools::{TOOL_CALL_MARKER, ToolCall, ToolResult};

pub(crate) const DEPTH_LIMIT_MESSAGE: &str = "tool call depth limit reached";
const UNKNOWN_TOOL_MESSAGE: &str = "Sorry, I could not work out which tool to use.";

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model answered with plain text
    Answered,
    /// A tool result was spoken as the final answer
    ToolResponded,
    /// Tool round trips hit the depth cap
    DepthExceeded,
    /// Barge-in stopped the turn
    Aborted,
    /// The model stream failed
    StreamFailed,
    /// The device is not bound; the bind prompt was spoken
    BindPrompt,
    /// The pipeline was closed underneath the turn
    Closed,
}

/// Why speech output stopped early
enum Halt {
    Aborted,
    Closed,
}

impl From<Halt> for TurnOutcome {
    fn from(halt: Halt) -> Self {
        match halt {
            Halt::Aborted => TurnOutcome::Aborted,
            Halt::Closed => TurnOutcome::Closed,
        }
    }
}

/// Tool call as assembled from the stream
#[derive(Debug, Default)]
struct PendingCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
    /// Content received after the tool intent, used for recovery
    text: String,
}

impl PendingCall {
    fn merge(&mut self, delta: ToolCallDelta) {
        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            self.id.get_or_insert(id);
        }
        if let Some(name) = delta.name.filter(|name| !name.is_empty()) {
            self.name.get_or_insert(name);
        }
        if let Some(arguments) = delta.arguments {
            self.arguments.push_str(&arguments);
        }
    }
}

enum RoundEnd {
    Answer,
    ToolCall(PendingCall),
    Failed,
}

/// Running state of one turn
struct Turn<'a> {
    session: &'a Session,
    pipeline: &'a SynthesisPipeline,
    id: String,
    depth: usize,
    /// Text of the current model round
    text: String,
    segmenter: Segmenter,
    /// Latest ready segment, kept back until it is known whether it ends the turn
    held: Option<Segment>,
}

impl<'a> Turn<'a> {
    fn new(session: &'a Session, pipeline: &'a SynthesisPipeline, id: String) -> Self {
        Self {
            session,
            pipeline,
            id,
            depth: 0,
            text: String::new(),
            segmenter: Segmenter::new(session.config.segment_threshold),
            held: None,
        }
    }

    fn begin_round(&mut self) {
        self.text.clear();
        self.segmenter.reset_text();
    }

    fn check_abort(&self) -> Result<(), Halt> {
        if self.session.abort.is_set() {
            Err(Halt::Aborted)
        } else {
            Ok(())
        }
    }

    async fn enqueue(&self, segment: Segment) -> Result<(), Halt> {
        self.check_abort()?;
        self.pipeline
            .enqueue_segment(&segment)
            .await
            .map_err(|_| Halt::Closed)
    }

    /// Enqueue the held segment; more speech follows it
    async fn release_held(&mut self) -> Result<(), Halt> {
        match self.held.take() {
            Some(segment) => self.enqueue(segment).await,
            None => Ok(()),
        }
    }

    /// Append streamed content and enqueue every segment that is ready.
    ///
    /// The newest ready segment stays held while nothing speakable follows
    /// it, so the final segment of the turn can still be marked as last.
    async fn push_text(&mut self, chunk: &str) -> Result<(), Halt> {
        self.text.push_str(chunk);
        while let Some(segment) = self.segmenter.next_segment(&self.text) {
            self.release_held().await?;
            self.held = Some(segment);
        }
        if self.segmenter.has_pending_speech(&self.text) {
            self.release_held().await?;
        }
        Ok(())
    }

    /// Enqueue whatever is left of the round text
    async fn flush(&mut self, is_last: bool) -> Result<(), Halt> {
        self.check_abort()?;
        match self.segmenter.finish(&self.text, is_last) {
            Some(tail) => {
                self.release_held().await?;
                self.enqueue(tail).await
            }
            None => match self.held.take() {
                Some(mut segment) => {
                    segment.is_last = is_last;
                    self.enqueue(segment).await
                }
                None => Ok(()),
            },
        }
    }

    /// Speak a complete text as the end of the turn
    async fn speak(&mut self, text: &str) -> Result<(), Halt> {
        self.begin_round();
        self.push_text(text).await?;
        self.flush(true).await
    }

    /// Consume one model stream.
    ///
    /// Content is spoken as it arrives unless the response opens with the
    /// textual tool-call marker. Structured tool-call fragments switch the
    /// round into tool mode; later content is kept for recovery only.
    async fn stream_round(&mut self, mut stream: LlmStream) -> Result<RoundEnd, Halt> {
        let mut call: Option<PendingCall> = None;
        // Leading content held back while it could still be the marker
        let mut held = String::new();
        let mut deciding = true;

        while let Some(chunk) = stream.next().await {
            self.check_abort()?;

            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(session_id = %self.session.id, turn_id = %self.id, "Model stream failed: {}", e);
                    return Ok(RoundEnd::Failed);
                }
            };

            match chunk {
                LlmChunk::ToolCall(delta) => {
                    let pending = call.get_or_insert_with(PendingCall::default);
                    if deciding {
                        pending.text.push_str(&held);
                        held.clear();
                        deciding = false;
                    }
                    pending.merge(delta);
                }
                LlmChunk::Content(content) => {
                    if let Some(pending) = call.as_mut() {
                        pending.text.push_str(&content);
                        continue;
                    }
                    if !deciding {
                        self.push_text(&content).await?;
                        continue;
                    }

                    held.push_str(&content);
                    let leading = held.trim_start();
                    if leading.starts_with(TOOL_CALL_MARKER) {
                        call = Some(PendingCall {
                            text: std::mem::take(&mut held),
                            ..Default::default()
                        });
                        deciding = false;
                    } else if leading.is_empty() || TOOL_CALL_MARKER.starts_with(leading) {
                        // Still ambiguous
                    } else {
                        deciding = false;
                        let released = std::mem::take(&mut held);
                        self.push_text(&released).await?;
                    }
                }
            }
        }

        match call {
            Some(call) => Ok(RoundEnd::ToolCall(call)),
            None => {
                if !held.is_empty() {
                    self.push_text(&held).await?;
                }
                Ok(RoundEnd::Answer)
            }
        }
    }

    /// Turn an assembled call into a dispatchable one
    fn resolve_call(&self, pending: PendingCall) -> Option<ToolCall> {
        if let Some(name) = pending.name {
            return Some(ToolCall {
                id: pending.id.unwrap_or_else(new_call_id),
                name,
                arguments: pending.arguments,
            });
        }

        let recovered = self.session.recovery.recover(&pending.text)?;
        debug!(turn_id = %self.id, "Recovered tool call {} from text", recovered.name);
        Some(ToolCall {
            id: new_call_id(),
            name: recovered.name,
            arguments: recovered.arguments,
        })
    }

    /// Run a call against the remote executor or the local dispatcher
    async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let caps = &self.session.capabilities;
        let arguments: Value = match call.parsed_arguments() {
            Ok(arguments) => arguments,
            Err(e) => {
                warn!(turn_id = %self.id, "{}", e);
                return ToolResult::Error(format!(
                    "Sorry, I could not understand the request for {}.",
                    call.name
                ));
            }
        };

        let result = if caps.remote_tools.is_known(&call.name) {
            caps.remote_tools.invoke(&call.name, arguments).await
        } else {
            caps.tools.invoke(&call.name, arguments).await
        };

        result.unwrap_or_else(|e| {
            warn!(turn_id = %self.id, tool = %call.name, "Tool failed: {}", e);
            ToolResult::Error(format!("Sorry, {} failed.", call.name))
        })
    }

    async fn tool_catalog(&self) -> Option<Vec<Value>> {
        let caps = &self.session.capabilities;
        let mut tools = caps.tools.list_tools().await;
        tools.extend(caps.remote_tools.list_tools().await);
        (!tools.is_empty()).then_some(tools)
    }

    async fn memory_context(&self, query: &str) -> Option<String> {
        match self.session.capabilities.memory.query(query).await {
            Ok(context) => context,
            Err(e) => {
                warn!(session_id = %self.session.id, "Memory query failed: {}", e);
                None
            }
        }
    }

    /// Model rounds until the turn ends
    async fn run_rounds(&mut self, dialogue: &mut Dialogue, input: &str) -> Result<TurnOutcome, Halt> {
        let caps = self.session.capabilities.clone();
        let tools = self.tool_catalog().await;
        let mut query = input.to_string();

        loop {
            self.check_abort()?;
            self.begin_round();

            let memory = self.memory_context(&query).await;
            let messages = dialogue.for_model(memory.as_deref());
            let stream = match caps
                .model
                .stream_response(&self.session.id, messages, tools.clone())
                .await
            {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(session_id = %self.session.id, turn_id = %self.id, "Model request failed: {}", e);
                    return Ok(TurnOutcome::StreamFailed);
                }
            };

            let pending = match self.stream_round(stream).await? {
                RoundEnd::Failed => {
                    // Sentences completed before the failure are still spoken
                    if let Some(mut segment) = self.held.take() {
                        segment.is_last = true;
                        self.enqueue(segment).await?;
                    }
                    return Ok(TurnOutcome::StreamFailed);
                }
                RoundEnd::Answer => {
                    self.flush(true).await?;
                    if !self.text.trim().is_empty() {
                        dialogue.push(Message::assistant(self.text.clone()));
                    }
                    return Ok(TurnOutcome::Answered);
                }
                RoundEnd::ToolCall(pending) => pending,
            };

            // Anything spoken before the call goes out before the result
            self.flush(false).await?;

            let Some(call) = self.resolve_call(pending) else {
                warn!(turn_id = %self.id, "Tool call could not be recovered");
                return self.finish_with(dialogue, UNKNOWN_TOOL_MESSAGE).await;
            };

            // Every round trip budget is spent: refuse the call before it runs
            if self.depth >= self.session.config.max_tool_depth {
                warn!(
                    turn_id = %self.id,
                    depth = self.depth,
                    tool = %call.name,
                    "Tool call depth limit reached"
                );
                self.finish_with(dialogue, DEPTH_LIMIT_MESSAGE).await?;
                return Ok(TurnOutcome::DepthExceeded);
            }

            info!(
                session_id = %self.session.id,
                turn_id = %self.id,
                depth = self.depth,
                tool = %call.name,
                "Invoking tool"
            );

            let text = match self.dispatch(&call).await {
                ToolResult::Continue(text) if text.trim().is_empty() => {
                    debug!(turn_id = %self.id, "Tool asked to continue without text, ending turn");
                    return Ok(TurnOutcome::ToolResponded);
                }
                ToolResult::Continue(text) => text,
                other => {
                    self.finish_with(dialogue, other.spoken_text()).await?;
                    return Ok(TurnOutcome::ToolResponded);
                }
            };

            dialogue.push(Message::assistant_tool_call(ToolCallDescriptor::function(
                call.id.clone(),
                call.name.clone(),
                call.arguments_or_empty(),
            )));
            dialogue.push(Message::tool(call.id, text.clone()));
            self.depth += 1;
            query = text;
        }
    }

    /// Speak `text` as the final answer and record it
    async fn finish_with(&mut self, dialogue: &mut Dialogue, text: &str) -> Result<TurnOutcome, Halt> {
        self.speak(text).await?;
        dialogue.push(Message::assistant(text));
        Ok(TurnOutcome::ToolResponded)
    }
}

fn new_call_id() -> String {
    Uuid::new_v4().to_string()
}

/// Spoken prompt for a device that still has to be bound
pub(crate) fn bind_prompt(bind_code: Option<&str>) -> String {
    match bind_code {
        Some(code) => {
            let digits: Vec<String> = code.chars().map(|c| c.to_string()).collect();
            format!(
                "Please bind this device in the console first. Your bind code is {}.",
                digits.join(" ")
            )
        }
        None => "This device is not registered yet. Please bind it in the console first."
            .to_string(),
    }
}

/// Run one top-level turn for `input`.
///
/// Turns are serialised on the dialogue lock. Before starting, a turn waits
/// until the previous turn's end marker has been played so the audio of two
/// turns never interleaves, then clears the abort flag.
pub async fn run_turn(session: &Session, pipeline: &SynthesisPipeline, input: String) -> TurnOutcome {
    let mut dialogue = session.dialogue.lock().await;

    let seq = session.next_turn_seq();
    let previous = seq - 1;
    if tokio::time::timeout(session.config.turn_drain_timeout, session.gate.wait_for(previous))
        .await
        .is_err()
    {
        warn!(session_id = %session.id, "Previous turn did not drain in time, starting anyway");
    }
    session.abort.clear();

    let turn_id = Uuid::new_v4().simple().to_string();
    session.set_current_turn(&turn_id);
    info!(session_id = %session.id, turn_id = %turn_id, "Turn started: {}", input);

    if pipeline
        .enqueue_marker(TurnMarker::Start {
            turn_id: turn_id.clone(),
        })
        .await
        .is_err()
    {
        return TurnOutcome::Closed;
    }

    dialogue.push(Message::user(input.clone()));

    let mut turn = Turn::new(session, pipeline, turn_id.clone());
    let outcome = match &session.binding {
        Binding::NeedsBinding { bind_code } => {
            let prompt = bind_prompt(bind_code.as_deref());
            match turn.speak(&prompt).await {
                Ok(()) => {
                    dialogue.push(Message::assistant(prompt));
                    TurnOutcome::BindPrompt
                }
                Err(halt) => halt.into(),
            }
        }
        Binding::Bound => match turn.run_rounds(&mut dialogue, &input).await {
            Ok(outcome) => outcome,
            Err(halt) => halt.into(),
        },
    };

    if pipeline
        .enqueue_marker(TurnMarker::End {
            turn_id: turn_id.clone(),
            seq,
        })
        .await
        .is_err()
    {
        debug!(turn_id = %turn_id, "Pipeline closed before end marker");
    }

    debug!(session_id = %session.id, turn_id = %turn_id, ?outcome, "Turn finished");
    outcome
}
