use std::sync::Arc;

use serde_json::Value;
use tokio::io::AsyncReadExt;
use tracing::trace;

use super::extract;
use super::flavor::BackendFlavor;
use super::progress::{self, ProgressUpdate};

/// Cumulative cap on extracted message bytes per stream. The last line of
/// defense against a runaway backend; excess fragments are dropped while
/// session-id and progress processing continue.
pub const MAX_MESSAGE_BYTES: usize = 10 * 1024 * 1024;

pub type ProgressFn = Arc<dyn Fn(&ProgressUpdate) + Send + Sync>;

/// Normalized output of one child's stdout stream.
#[derive(Debug, Clone, Default)]
pub struct ParsedStream {
    pub message: String,
    pub session_id: String,
    pub flavor: BackendFlavor,
    /// Fragments were dropped at the message cap.
    pub truncated: bool,
    /// A completion event was observed (informational).
    pub completed: bool,
    /// Count of successfully decoded events.
    pub events: u64,
}

/// Streaming line-oriented JSON parser.
///
/// Input arrives as arbitrary byte chunks; lines are framed on LF with the
/// trailing fragment carried across chunks and flushed at EOF. Lines whose
/// first non-whitespace byte is not `{` or `[` are skipped without a decode
/// attempt, and individual decode failures never abort the stream.
pub struct StreamParser {
    out: ParsedStream,
    message_bytes: usize,
    line_buf: Vec<u8>,
    progress: Option<ProgressFn>,
}

impl StreamParser {
    pub fn new(progress: Option<ProgressFn>) -> Self {
        Self {
            out: ParsedStream::default(),
            message_bytes: 0,
            line_buf: Vec::with_capacity(8 * 1024),
            progress,
        }
    }

    /// Drive the parser over a reader until EOF. The only error surfaced is
    /// an irrecoverable read failure on the underlying stream.
    pub async fn consume<R>(mut self, mut reader: R) -> std::io::Result<ParsedStream>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; 16 * 1024];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            self.push_chunk(&buf[..n]);
        }
        Ok(self.finish())
    }

    /// Feed one chunk of raw bytes.
    pub fn push_chunk(&mut self, chunk: &[u8]) {
        self.line_buf.extend_from_slice(chunk);
        while let Some(pos) = self.line_buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.line_buf.drain(..=pos).collect();
            self.handle_line(&line[..line.len() - 1]);
        }
    }

    /// EOF: process the final unterminated fragment, if any, and return the
    /// accumulated stream state.
    pub fn finish(mut self) -> ParsedStream {
        if !self.line_buf.is_empty() {
            let line = std::mem::take(&mut self.line_buf);
            self.handle_line(&line);
        }
        self.out
    }

    fn handle_line(&mut self, line: &[u8]) {
        let Some(start) = line.iter().position(|b| !b.is_ascii_whitespace()) else {
            return;
        };
        if line[start] != b'{' && line[start] != b'[' {
            return;
        }

        let event: Value = match serde_json::from_slice(&line[start..]) {
            Ok(v) => v,
            Err(e) => {
                trace!(error = %e, "skipping undecodable line");
                return;
            }
        };
        self.out.events += 1;

        // Latch the flavor on the first non-Unknown classification; later
        // events are interpreted under the cached flavor even if they would
        // individually classify differently.
        if self.out.flavor == BackendFlavor::Unknown {
            let classified = BackendFlavor::classify(&event);
            if classified != BackendFlavor::Unknown {
                self.out.flavor = classified;
            }
        }
        let flavor = self.out.flavor;

        if let Some(fragment) = extract::message(&event, flavor) {
            self.append_message(&fragment);
        }

        if self.out.session_id.is_empty() {
            if let Some(id) = extract::session_id(&event, flavor) {
                self.out.session_id = id;
            }
        }

        if flavor != BackendFlavor::Unknown {
            if let Some(cb) = &self.progress {
                if let Some(update) = progress::infer(&event, flavor) {
                    cb(&update);
                }
            }
        }

        if extract::is_completion(&event, flavor) {
            self.out.completed = true;
        }
    }

    fn append_message(&mut self, fragment: &str) {
        if self.out.truncated {
            return;
        }
        if self.message_bytes + fragment.len() > MAX_MESSAGE_BYTES {
            self.out.truncated = true;
            return;
        }
        self.message_bytes += fragment.len();
        self.out.message.push_str(fragment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn parse_all(input: &[u8]) -> ParsedStream {
        let mut p = StreamParser::new(None);
        p.push_chunk(input);
        p.finish()
    }

    #[test]
    fn single_claude_result() {
        let out = parse_all(b"{\"type\":\"result\",\"session_id\":\"abc\",\"result\":\"Hello\"}\n");
        assert_eq!(out.flavor, BackendFlavor::Claude);
        assert_eq!(out.session_id, "abc");
        assert_eq!(out.message, "Hello");
        assert!(out.completed);
    }

    #[test]
    fn codex_streamed_messages_with_junk() {
        let input = concat!(
            "{\"thread_id\":\"t1\",\"item\":{\"type\":\"message\",\"content\":\"Hi \"}}\n",
            "{\"item\":{\"type\":\"message\",\"content\":\"there\"}}\n",
            "junk not json\n",
        );
        let out = parse_all(input.as_bytes());
        assert_eq!(out.flavor, BackendFlavor::Codex);
        assert_eq!(out.session_id, "t1");
        assert_eq!(out.message, "Hi there");
    }

    #[test]
    fn opencode_tool_output() {
        let out =
            parse_all(b"{\"sessionID\":\"s9\",\"part\":{\"type\":\"tool\",\"state\":{\"output\":\"ok\"}}}\n");
        assert_eq!(out.flavor, BackendFlavor::Opencode);
        assert_eq!(out.session_id, "s9");
        assert_eq!(out.message, "ok");
    }

    #[test]
    fn empty_stream_yields_defaults() {
        let out = parse_all(b"");
        assert_eq!(out.flavor, BackendFlavor::Unknown);
        assert_eq!(out.message, "");
        assert_eq!(out.session_id, "");
        assert_eq!(out.events, 0);
    }

    #[test]
    fn tiny_whitespace_lines_are_skipped() {
        let out = parse_all(b"\n \n  \n\t\n");
        assert_eq!(out.events, 0);
        assert_eq!(out.message, "");
    }

    #[test]
    fn flavor_is_sticky_after_first_classification() {
        // First event latches claude; the second would classify as gemini on
        // its own but is interpreted under the cached flavor.
        let input = concat!(
            "{\"result\":\"a\"}\n",
            "{\"role\":\"model\",\"content\":\"b\"}\n",
        );
        let out = parse_all(input.as_bytes());
        assert_eq!(out.flavor, BackendFlavor::Claude);
        assert_eq!(out.message, "ab");
    }

    #[test]
    fn unknown_events_do_not_latch() {
        // Unclassifiable events keep the flavor open until a classifiable
        // one arrives (non-Unknown latch).
        let input = concat!(
            "{\"content\":\"pre\"}\n",
            "{\"thread_id\":\"t2\",\"item\":{\"type\":\"message\",\"content\":\"post\"}}\n",
        );
        let out = parse_all(input.as_bytes());
        assert_eq!(out.flavor, BackendFlavor::Codex);
        assert_eq!(out.session_id, "t2");
        assert_eq!(out.message, "prepost");
    }

    #[test]
    fn session_id_is_first_non_empty() {
        let input = concat!(
            "{\"type\":\"result\",\"session_id\":\"first\",\"result\":\"x\"}\n",
            "{\"type\":\"result\",\"session_id\":\"second\",\"result\":\"y\"}\n",
        );
        let out = parse_all(input.as_bytes());
        assert_eq!(out.session_id, "first");
    }

    #[test]
    fn chunk_boundaries_do_not_split_events() {
        let line = b"{\"type\":\"result\",\"session_id\":\"abc\",\"result\":\"Hello\"}\n";
        let mut p = StreamParser::new(None);
        for byte in line.iter() {
            p.push_chunk(std::slice::from_ref(byte));
        }
        let out = p.finish();
        assert_eq!(out.message, "Hello");
        assert_eq!(out.session_id, "abc");
    }

    #[test]
    fn final_fragment_without_newline_is_processed() {
        let out = parse_all(b"{\"result\":\"tail\"}");
        assert_eq!(out.message, "tail");
    }

    #[test]
    fn message_cap_drops_excess_but_keeps_parsing() {
        let mut p = StreamParser::new(None);
        let big = "x".repeat(4 * 1024 * 1024);
        for _ in 0..2 {
            let line = format!("{{\"result\":\"{big}\"}}\n");
            p.push_chunk(line.as_bytes());
        }
        // Third fragment would cross 10 MiB: dropped, as is everything after.
        p.push_chunk(format!("{{\"result\":\"{big}\"}}\n").as_bytes());
        p.push_chunk(b"{\"result\":\"late\",\"session_id\":\"still-seen\"}\n");

        let out = p.finish();
        assert!(out.truncated);
        assert_eq!(out.message.len(), 8 * 1024 * 1024);
        assert_eq!(out.session_id, "still-seen");
    }

    #[test]
    fn parse_is_idempotent_over_concatenation() {
        let lines: [&[u8]; 3] = [
            b"{\"thread_id\":\"t1\",\"item\":{\"type\":\"message\",\"content\":\"a\"}}\n",
            b"{\"item\":{\"type\":\"message\",\"content\":\"b\"}}\n",
            b"{\"item\":{\"type\":\"message\",\"content\":\"c\"}}\n",
        ];

        let mut whole = Vec::new();
        for l in &lines {
            whole.extend_from_slice(l);
        }
        let combined = parse_all(&whole);

        let mut message = String::new();
        let mut session = String::new();
        let mut flavor = BackendFlavor::Unknown;
        for l in &lines {
            let one = parse_all(l);
            message.push_str(&one.message);
            if session.is_empty() {
                session = one.session_id;
            }
            if flavor == BackendFlavor::Unknown {
                flavor = one.flavor;
            }
        }

        assert_eq!(combined.message, message);
        assert_eq!(combined.session_id, session);
        assert_eq!(combined.flavor, flavor);
    }

    #[test]
    fn progress_callback_sees_source_order() {
        let seen: Arc<Mutex<Vec<super::super::progress::ProgressStage>>> =
            Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressFn = Arc::new(move |u: &ProgressUpdate| {
            sink.lock().unwrap().push(u.stage);
        });
        let mut p = StreamParser::new(Some(callback));

        p.push_chunk(b"{\"subtype\":\"tool_use\",\"tool_name\":\"bash\"}\n");
        p.push_chunk(b"{\"subtype\":\"tool_result\"}\n");
        let out = p.finish();

        assert_eq!(out.flavor, BackendFlavor::Claude);
        use super::super::progress::ProgressStage::*;
        assert_eq!(*seen.lock().unwrap(), vec![Executing, Executing]);
    }

    #[tokio::test]
    async fn consume_reads_chunked_reader_to_eof() {
        let (mut wr, rd) = tokio::io::duplex(64);
        let parser = StreamParser::new(None);
        let handle = tokio::spawn(parser.consume(rd));

        use tokio::io::AsyncWriteExt;
        wr.write_all(b"{\"type\":\"result\",\"session_id\":\"abc\",")
            .await
            .unwrap();
        wr.write_all(b"\"result\":\"Hello\"}\n").await.unwrap();
        drop(wr);

        let out = handle.await.unwrap().unwrap();
        assert_eq!(out.message, "Hello");
        assert_eq!(out.session_id, "abc");
        assert_eq!(out.flavor, BackendFlavor::Claude);
    }
}
