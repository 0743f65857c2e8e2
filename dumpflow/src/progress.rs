//! Coarse progress reporting for long stages.
//!
//! The reporter is given the total number of files up front, including
//! files that will be skipped. Written files increment the counter and
//! skipped files decrement it, so a tree with skipped files never reaches
//! 100%. Only multiples of ten are emitted, each at most once.

use std::collections::BTreeSet;

/// Receives emitted percentages.
pub trait ProgressSink {
    /// Called once per emitted boundary.
    fn emit(&mut self, percent: u8);
}

impl<F: FnMut(u8)> ProgressSink for F {
    fn emit(&mut self, percent: u8) {
        self(percent);
    }
}

/// Boundary-only percentage reporter.
#[derive(Debug)]
pub struct ProgressReporter<S> {
    total: u64,
    counter: i64,
    emitted: BTreeSet<u8>,
    sink: S,
}

impl<S: ProgressSink> ProgressReporter<S> {
    /// Creates a reporter for `total` files.
    pub fn new(total: u64, sink: S) -> Self {
        Self {
            total,
            counter: 0,
            emitted: BTreeSet::new(),
            sink,
        }
    }

    /// Records a file written to the archive.
    pub fn record_written(&mut self) {
        self.counter += 1;
        self.report();
    }

    /// Records a file skipped by the denylist.
    pub fn record_skipped(&mut self) {
        self.counter -= 1;
        self.report();
    }

    /// Current percentage, `floor(counter * 100 / total)`.
    ///
    /// Returns `None` when there is nothing to count or the counter is
    /// negative.
    #[must_use]
    pub fn percent(&self) -> Option<u8> {
        if self.total == 0 || self.counter < 0 {
            return None;
        }
        let counter = u64::try_from(self.counter).ok()?;
        u8::try_from((counter * 100 / self.total).min(100)).ok()
    }

    /// Boundaries emitted so far, ascending.
    pub fn emitted(&self) -> impl Iterator<Item = u8> + '_ {
        self.emitted.iter().copied()
    }

    fn report(&mut self) {
        let Some(percent) = self.percent() else {
            return;
        };
        if percent == 0 || percent % 10 != 0 {
            return;
        }
        if self.emitted.insert(percent) {
            self.sink.emit(percent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(written: u64, skipped: u64, order: impl Fn(u64) -> bool) -> Vec<u8> {
        let mut seen = Vec::new();
        let total = written + skipped;
        let mut reporter = ProgressReporter::new(total, |p: u8| seen.push(p));
        let (mut w, mut s) = (0, 0);
        for i in 0..total {
            if order(i) && s < skipped || w == written {
                reporter.record_skipped();
                s += 1;
            } else {
                reporter.record_written();
                w += 1;
            }
        }
        drop(reporter);
        seen
    }

    #[test]
    fn test_hundred_files_emit_each_boundary_once() {
        let seen = run(100, 0, |_| false);
        assert_eq!(seen, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
    }

    #[test]
    fn test_skipped_files_inflate_denominator() {
        let mut seen = Vec::new();
        let mut reporter = ProgressReporter::new(100, |p: u8| seen.push(p));
        for _ in 0..90 {
            reporter.record_written();
        }
        assert_eq!(reporter.percent(), Some(90));
        for _ in 0..10 {
            reporter.record_skipped();
        }
        assert_eq!(reporter.percent(), Some(80));
        assert_eq!(reporter.emitted().last(), Some(90));
        drop(reporter);

        assert_eq!(seen, vec![10, 20, 30, 40, 50, 60, 70, 80, 90]);
    }

    #[test]
    fn test_skips_first_delay_boundaries() {
        // Skipped files at the start push the counter below zero.
        let seen = run(90, 10, |i| i < 10);
        assert_eq!(seen, vec![10, 20, 30, 40, 50, 60, 70, 80]);
    }

    #[test]
    fn test_small_trees_skip_intermediate_boundaries() {
        let mut seen = Vec::new();
        let mut reporter = ProgressReporter::new(3, |p: u8| seen.push(p));
        reporter.record_written();
        reporter.record_written();
        reporter.record_written();
        drop(reporter);

        assert_eq!(seen, vec![100]);
    }

    #[test]
    fn test_empty_tree_emits_nothing() {
        let mut seen = Vec::new();
        let mut reporter = ProgressReporter::new(0, |p: u8| seen.push(p));
        reporter.record_written();
        assert_eq!(reporter.percent(), None);
        drop(reporter);

        assert!(seen.is_empty());
    }
}
