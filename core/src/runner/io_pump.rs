use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::util::{strip_ansi, RingBytes};

pub const BACKEND_PREFIX: &str = "[BACKEND] ";

/// Drain child stderr into the ring buffer, optionally mirroring each line
/// to the wrapper stderr with the `[BACKEND] ` prefix. ANSI sequences are
/// stripped when stderr is not a TTY.
pub fn pump_stderr<R>(mut reader: R, ring: RingBytes, mirror: bool) -> JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let strip = !atty::is(atty::Stream::Stderr);
        let mut out = tokio::io::stderr();
        let mut buf = vec![0u8; 8 * 1024];
        let mut line_buf: Vec<u8> = Vec::new();

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    debug!(error = %e, "stderr pump ended early");
                    break;
                }
            };

            ring.push(&buf[..n]);

            if mirror {
                line_buf.extend_from_slice(&buf[..n]);
                while let Some(pos) = line_buf.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = line_buf.drain(..=pos).collect();
                    mirror_line(&mut out, &line[..line.len() - 1], strip).await;
                }
            }
        }

        if mirror && !line_buf.is_empty() {
            mirror_line(&mut out, &line_buf, strip).await;
        }
    })
}

async fn mirror_line(out: &mut tokio::io::Stderr, raw: &[u8], strip: bool) {
    let line = String::from_utf8_lossy(raw);
    let line = if strip {
        strip_ansi(&line)
    } else {
        line.into_owned()
    };
    let _ = out.write_all(BACKEND_PREFIX.as_bytes()).await;
    let _ = out.write_all(line.as_bytes()).await;
    let _ = out.write_all(b"\n").await;
    let _ = out.flush().await;
}
