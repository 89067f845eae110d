pub mod base;
mod null;

pub use base::{Recognizer, RecognizerEvent, STTError};
pub use null::NullRecognizer;
