use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use std::path::Path;

/// A bundle between the BA host process and the engine (or the engine
/// and its elevated companion) never needs more than a length-prefixed
/// frame of bytes each way; the message catalogs in `message.rs` decide
/// what's inside. Capped well above anything a legitimate message would
/// need, so a corrupted length prefix fails fast instead of trying to
/// allocate gigabytes.
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

pub struct FramedTransport {
    stream: UnixStream,
}

impl FramedTransport {
    pub fn new(stream: UnixStream) -> Self {
        FramedTransport { stream }
    }

    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let stream = UnixStream::connect(path.as_ref())
            .await
            .with_context(|| format!("connecting to {}", path.as_ref().display()))?;
        Ok(FramedTransport::new(stream))
    }

    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        let len = u32::try_from(payload.len()).context("frame too large to send")?;
        self.stream.write_u32_le(len).await.context("writing frame length")?;
        self.stream.write_all(payload).await.context("writing frame body")?;
        self.stream.flush().await.context("flushing frame")?;
        Ok(())
    }

    /// Returns `Ok(None)` on a clean EOF (the peer closed the connection
    /// between frames, not mid-frame).
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        let mut len_buf = [0u8; 4];
        match self.stream.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err).context("reading frame length"),
        }
        let len = u32::from_le_bytes(len_buf);
        if len > MAX_FRAME_LEN {
            bail!("frame length {} exceeds maximum {}", len, MAX_FRAME_LEN);
        }

        let mut payload = vec![0u8; len as usize];
        self.stream.read_exact(&mut payload).await.context("reading frame body")?;
        Ok(Some(payload))
    }
}

/// Binds a Unix-domain-socket listener at `path`, removing any stale
/// socket file left behind by a previous run first.
pub async fn bind_unix(path: impl AsRef<Path>) -> Result<UnixListener> {
    let path = path.as_ref();
    if path.exists() {
        std::fs::remove_file(path).with_context(|| format!("removing stale socket {}", path.display()))?;
    }
    UnixListener::bind(path).with_context(|| format!("binding socket {}", path.display()))
}
