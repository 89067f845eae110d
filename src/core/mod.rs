pub mod dialogue;
pub mod llm;
pub mod memory;
pub mod provisioning;
pub mod report;
pub mod segmenter;
pub mod session;
pub mod stt;
pub mod synthesis;
pub mod tools;
pub mod tts;

// Re-export commonly used types for convenience
pub use dialogue::{Dialogue, Message, Role};
pub use llm::{LanguageModel, LlmChunk, LlmError, LoopbackModel};
pub use memory::{Memory, MemoryError, NoMemory};
pub use provisioning::{
    Capabilities, DeviceIdentity, Provisioner, ProvisioningError, StaticProvisioner,
};
pub use report::{LogReportSink, ReportRecord, ReportSink, Reporter};
pub use segmenter::{Segment, Segmenter};
pub use session::{
    Binding, Session, SessionConfig, SessionError, SessionEvent, SessionRuntime, TurnOutcome,
};
pub use stt::{NullRecognizer, Recognizer, RecognizerEvent, STTError};
pub use tools::{EmptyToolbox, NoRemoteTools, RemoteTools, ToolDispatcher, ToolResult};
pub use tts::{AudioFormat, SilentSynthesizer, SynthesizedAudio, Synthesizer, TTSError};
