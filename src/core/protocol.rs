use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use super::errors::{DepotError, Result};
use super::types::TaskId;

/// Deprecated end-of-job sentinel some old agents still send as a
/// filename. Recognized and ignored, nothing else.
pub const JOB_FINISH: &str = "JOB_FINISH";

/// Longest accepted task id / filename token.
pub const MAX_TOKEN_LEN: usize = 4096;

/// Wire protocol, version 1.
///
/// A connection carries exactly one file: a task id token, a filename
/// token, then raw content until the client half-closes. Each token is a
/// u16 big-endian length followed by that many bytes of UTF-8.
pub struct ProtocolReader<R> {
    stream: R,
}

impl<R: AsyncRead + Unpin> ProtocolReader<R> {
    pub fn new(stream: R) -> Self {
        Self { stream }
    }

    pub async fn read_task_id(&mut self) -> Result<TaskId> {
        let token = self.read_token().await?;
        Ok(TaskId::new(token))
    }

    /// Reads the filename token. Anything that could escape the namespace
    /// directory is rejected before any filesystem work happens.
    pub async fn read_filename(&mut self) -> Result<String> {
        let name = self.read_token().await?;
        if name != JOB_FINISH && !is_safe_filename(&name) {
            return Err(DepotError::Protocol(format!("unsafe filename '{name}'")));
        }
        Ok(name)
    }

    /// Streams the remaining connection content into `dest` until the
    /// client half-closes, returning the byte count as read from the wire.
    pub async fn copy_content<W>(&mut self, dest: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let written = tokio::io::copy(&mut self.stream, dest).await?;
        Ok(written)
    }

    async fn read_token(&mut self) -> Result<String> {
        let len = self
            .stream
            .read_u16()
            .await
            .map_err(|err| DepotError::Protocol(format!("cannot read length prefix: {err}")))?
            as usize;
        if len == 0 {
            return Err(DepotError::Protocol("empty token".to_string()));
        }
        if len > MAX_TOKEN_LEN {
            return Err(DepotError::Protocol(format!(
                "token length {len} exceeds {MAX_TOKEN_LEN}"
            )));
        }
        let mut buf = vec![0u8; len];
        self.stream
            .read_exact(&mut buf)
            .await
            .map_err(|err| DepotError::Protocol(format!("truncated token: {err}")))?;
        String::from_utf8(buf)
            .map_err(|_| DepotError::Protocol("token is not valid UTF-8".to_string()))
    }
}

/// Filenames may use subdirectories but must stay below the namespace:
/// only normal path components, no `..`, no absolute paths.
fn is_safe_filename(name: &str) -> bool {
    use std::path::Component;
    let path = std::path::Path::new(name);
    path.components()
        .all(|component| matches!(component, Component::Normal(_)))
}
