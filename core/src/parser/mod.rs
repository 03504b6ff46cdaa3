//! Streaming normalization of backend stdout: line framing, best-effort JSON
//! decoding, flavor classification, and `(message, session_id, progress)`
//! extraction with bounded memory.

mod extract;
mod flavor;
mod progress;
mod stream;

pub use extract::{is_completion, message, session_id};
pub use flavor::BackendFlavor;
pub use progress::{infer as infer_progress, ProgressStage, ProgressUpdate};
pub use stream::{ParsedStream, ProgressFn, StreamParser, MAX_MESSAGE_BYTES};
