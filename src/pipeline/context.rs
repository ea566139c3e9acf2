use indexmap::IndexMap;
use std::time::Duration;

use crate::record::OrderedRecord;

/// Label name to value, in record order.
pub type LabelMap = IndexMap<String, String>;

/// Why a line produced no output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Matched a `discard: true` rule
    Discarded { rule: usize },
    /// Matched a rule with `sampleRate` and lost the draw
    SampledOut { rule: usize },
}

/// Result of running one line through the transform pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Accepted {
        record: OrderedRecord,
        labels: LabelMap,
    },
    Dropped(DropReason),
}

impl LineOutcome {
    pub fn record(&self) -> Option<&OrderedRecord> {
        match self {
            LineOutcome::Accepted { record, .. } => Some(record),
            LineOutcome::Dropped(_) => None,
        }
    }

    pub fn labels(&self) -> Option<&LabelMap> {
        match self {
            LineOutcome::Accepted { labels, .. } => Some(labels),
            LineOutcome::Dropped(_) => None,
        }
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, LineOutcome::Dropped(_))
    }
}

/// Runtime statistics
#[derive(Debug, Default, Clone)]
pub struct ProcessingStats {
    pub lines_processed: usize,
    pub lines_output: usize,
    pub lines_discarded: usize,
    pub lines_sampled_out: usize,
    /// Accepted lines routed to the error output
    pub stderr_lines: usize,
    pub processing_time: Duration,
}

impl ProcessingStats {
    pub fn lines_dropped(&self) -> usize {
        self.lines_discarded + self.lines_sampled_out
    }

    pub(crate) fn record_outcome(&mut self, outcome: &LineOutcome) {
        self.lines_processed += 1;
        match outcome {
            LineOutcome::Accepted { .. } => self.lines_output += 1,
            LineOutcome::Dropped(DropReason::Discarded { .. }) => self.lines_discarded += 1,
            LineOutcome::Dropped(DropReason::SampledOut { .. }) => self.lines_sampled_out += 1,
        }
    }
}
