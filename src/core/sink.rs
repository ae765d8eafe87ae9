use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_compression::tokio::write::GzipEncoder;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use super::errors::Result;

/// Buffered destination for one incoming file, optionally
/// gzip-compressing on the way down.
///
/// `finish` must run before the value goes away: gzip needs an explicit
/// shutdown to emit the stream trailer, and the write buffer has to reach
/// the file before the handle closes.
pub enum FileSink {
    Plain(BufWriter<File>),
    Gzip(GzipEncoder<BufWriter<File>>),
}

impl FileSink {
    pub fn new(file: File, gzip: bool) -> Self {
        let buffered = BufWriter::new(file);
        if gzip {
            Self::Gzip(GzipEncoder::new(buffered))
        } else {
            Self::Plain(buffered)
        }
    }

    /// Finalize the compressed stream (if present), then flush down to the
    /// file, in that order.
    pub async fn finish(mut self) -> Result<()> {
        self.shutdown().await?;
        Ok(())
    }
}

impl AsyncWrite for FileSink {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(inner) => Pin::new(inner).poll_write(cx, buf),
            Self::Gzip(inner) => Pin::new(inner).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(inner) => Pin::new(inner).poll_flush(cx),
            Self::Gzip(inner) => Pin::new(inner).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(inner) => Pin::new(inner).poll_shutdown(cx),
            Self::Gzip(inner) => Pin::new(inner).poll_shutdown(cx),
        }
    }
}
