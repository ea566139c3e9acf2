// src/pipeline/stream.rs
use std::future::Future;
use std::io::Write;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::error::ProcessingError;
use crate::metrics::SinkSet;
use crate::pipeline::context::{LineOutcome, ProcessingStats};
use crate::pipeline::transform::TransformPipeline;
use crate::record::OrderedRecord;
use crate::source::{SourceLine, PRIMARY};

/// The single consumer of the multiplexed line channel.
///
/// Lines are handled strictly one at a time: transform, write, increment.
/// Output and counter side effects therefore happen in dequeue order even
/// though the lines were produced concurrently.
pub struct LineDispatcher<'a, O: Write, E: Write> {
    pipeline: &'a TransformPipeline,
    sinks: &'a SinkSet,
    stdout: O,
    stderr: E,
    stats: ProcessingStats,
}

impl<'a, O: Write, E: Write> LineDispatcher<'a, O, E> {
    pub fn new(pipeline: &'a TransformPipeline, sinks: &'a SinkSet, stdout: O, stderr: E) -> Self {
        LineDispatcher {
            pipeline,
            sinks,
            stdout,
            stderr,
            stats: ProcessingStats::default(),
        }
    }

    /// Drain `lines` until every source is closed.
    pub async fn run(
        &mut self,
        lines: &mut mpsc::Receiver<SourceLine>,
    ) -> Result<ProcessingStats, ProcessingError> {
        self.run_until(lines, std::future::pending::<()>()).await
    }

    /// Drain `lines` until every source is closed or `stop` completes.
    /// `stop` is only observed between lines, never in the middle of one.
    pub async fn run_until<F>(
        &mut self,
        lines: &mut mpsc::Receiver<SourceLine>,
        stop: F,
    ) -> Result<ProcessingStats, ProcessingError>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        tokio::pin!(stop);

        loop {
            let item = tokio::select! {
                biased;
                _ = &mut stop => {
                    tracing::debug!("stop requested, no longer reading lines");
                    break;
                }
                item = lines.recv() => item,
            };
            let item = match item {
                Some(item) => item,
                None => break,
            };

            match self.dispatch(&item) {
                Ok(_) => {}
                Err(ProcessingError::IoError(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    tracing::debug!(source = item.source, "output closed, stopping");
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        self.stats.processing_time += start_time.elapsed();
        Ok(self.stats.clone())
    }

    /// Run one line through the pipeline and apply its side effects.
    pub fn dispatch(&mut self, item: &SourceLine) -> Result<LineOutcome, ProcessingError> {
        let outcome = self.pipeline.process(&item.line);

        if let LineOutcome::Accepted { record, labels } = &outcome {
            self.write_record(item.source, record)?;
            self.sinks.increment(labels);
        }
        self.stats.record_outcome(&outcome);

        Ok(outcome)
    }

    fn write_record(&mut self, source: usize, record: &OrderedRecord) -> Result<(), ProcessingError> {
        let to_stderr = source != PRIMARY;
        let output: &mut dyn Write = if to_stderr {
            &mut self.stderr
        } else {
            &mut self.stdout
        };
        writeln!(output, "{}", record.to_json())?;
        output.flush()?;
        if to_stderr {
            self.stats.stderr_lines += 1;
        }
        Ok(())
    }

    pub fn stats(&self) -> &ProcessingStats {
        &self.stats
    }

    /// Hand back the writers, e.g. to inspect buffered output.
    pub fn into_writers(self) -> (O, E) {
        (self.stdout, self.stderr)
    }
}
