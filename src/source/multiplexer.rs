use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Lines a source may have read ahead of the consumer
const LINES_PER_SOURCE: usize = 1;

/// One line and the index of the source it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub source: usize,
    pub line: String,
}

/// Fans N line sources into one channel.
///
/// Each source gets its own reader task. Lines from one source arrive in
/// order; lines from different sources interleave as they become available.
/// The channel closes after every source hit end-of-stream.
pub struct StreamMultiplexer {
    sources: Vec<Box<dyn AsyncRead + Send + Unpin>>,
    capacity: Option<usize>,
}

impl Default for StreamMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamMultiplexer {
    pub fn new() -> Self {
        StreamMultiplexer {
            sources: Vec::new(),
            capacity: None,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity.max(1));
        self
    }

    /// Adds a source; its index is the number of sources added before it.
    pub fn add_source<R>(&mut self, reader: R) -> usize
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        self.sources.push(Box::new(reader));
        self.sources.len() - 1
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Spawn the reader tasks and a supervisor that waits for all of them.
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> mpsc::Receiver<SourceLine> {
        let capacity = self
            .capacity
            .unwrap_or_else(|| (self.sources.len() * LINES_PER_SOURCE).max(1));
        let (tx, rx) = mpsc::channel(capacity);
        let mut readers = JoinSet::new();

        for (index, source) in self.sources.into_iter().enumerate() {
            readers.spawn(read_lines(index, source, tx.clone()));
        }
        // Only the readers hold senders now, so the channel closes with the last one
        drop(tx);

        tokio::spawn(async move {
            while let Some(result) = readers.join_next().await {
                match result {
                    Ok(Ok(index)) => tracing::debug!(source = index, "source reached end of stream"),
                    Ok(Err((index, e))) => {
                        tracing::warn!(source = index, error = %e, "failed reading source")
                    }
                    Err(e) => tracing::warn!(error = %e, "source reader task failed"),
                }
            }
        });

        rx
    }
}

async fn read_lines(
    index: usize,
    source: Box<dyn AsyncRead + Send + Unpin>,
    tx: mpsc::Sender<SourceLine>,
) -> Result<usize, (usize, std::io::Error)> {
    let mut reader = BufReader::new(source);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| (index, e))?;
        if read == 0 {
            return Ok(index);
        }

        let line = String::from_utf8_lossy(trim_line_ending(&buf)).into_owned();
        if tx.send(SourceLine { source: index, line }).await.is_err() {
            // Consumer is gone; nothing left to deliver to
            return Ok(index);
        }
    }
}

fn trim_line_ending(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_line_ending() {
        assert_eq!(trim_line_ending(b"hi\n"), b"hi");
        assert_eq!(trim_line_ending(b"hi\r\n"), b"hi");
        assert_eq!(trim_line_ending(b"hi"), b"hi");
        assert_eq!(trim_line_ending(b"\n"), b"");
    }

    #[tokio::test]
    async fn test_single_source_order_and_last_line() {
        let mut mux = StreamMultiplexer::new();
        mux.add_source(&b"one\ntwo\r\nthree"[..]);
        let mut rx = mux.spawn();

        let mut lines = Vec::new();
        while let Some(item) = rx.recv().await {
            assert_eq!(item.source, 0);
            lines.push(item.line);
        }
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let mut mux = StreamMultiplexer::new();
        mux.add_source(&b"a\xffb\n"[..]);
        let mut rx = mux.spawn();

        assert_eq!(rx.recv().await.unwrap().line, "a\u{fffd}b");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_reader_waits_for_consumer() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let mut mux = StreamMultiplexer::new();
        mux.add_source(reader);
        let mut rx = mux.spawn();

        use tokio::io::AsyncWriteExt;
        writer.write_all(b"1\n2\n3\n").await.unwrap();
        drop(writer);

        // nothing is consumed yet, so only one line can be queued
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(rx.max_capacity(), 1);
        assert_eq!(rx.len(), 1);

        let mut lines = Vec::new();
        while let Some(item) = rx.recv().await {
            lines.push(item.line);
        }
        assert_eq!(lines, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_no_sources_closes_immediately() {
        let mut rx = StreamMultiplexer::new().spawn();
        assert!(rx.recv().await.is_none());
    }
}
