//! Hierarchical reducer: partition, reduce each group, repeat until one.
//!
//! The leaf pass uses the leaf preamble; every later pass combines partial
//! summaries under the combine preamble. An iterative fixed-point loop with
//! an explicit non-progress guard replaces open-ended recursion: a combine
//! pass whose partition cannot merge anything (group count equals unit
//! count) would re-summarize the same units forever, so it fails instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::chunk::partition;
use crate::constants::MAX_REDUCE_PASSES;
use crate::progress::ProgressSink;
use crate::token_count::TokenCounter;
use crate::{DigestError, DigestResult};

/// Cooperative cancellation, checked between (never during) reduce calls.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Distinct system prompts for the two reduction phases.
#[derive(Debug, Clone, Copy)]
pub struct ReducePrompts<'a> {
    /// Applied to raw chunks (leaf-reduce).
    pub leaf: &'a str,
    /// Applied to partial summaries (combine-reduce).
    pub combine: &'a str,
}

/// The external reduce operation: `(preamble, payload) -> summary`.
pub type ReduceOne<'a> = dyn Fn(&str, &str) -> DigestResult<String> + Sync + 'a;

pub struct Reducer<'a> {
    counter: &'a dyn TokenCounter,
    ceiling: usize,
    parallel: bool,
}

impl<'a> Reducer<'a> {
    pub fn new(counter: &'a dyn TokenCounter, ceiling: usize) -> Self {
        Self { counter, ceiling, parallel: false }
    }

    /// Reduce independent groups of one pass concurrently. Results are
    /// reassembled in input order either way.
    pub fn with_parallel_leaves(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Reduce `units` to exactly one summary string.
    pub fn reduce(
        &self,
        units: Vec<String>,
        prompts: ReducePrompts<'_>,
        reduce_one: &ReduceOne<'_>,
        progress: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> DigestResult<String> {
        if units.is_empty() {
            return Err(DigestError::InvalidInput("nothing to reduce".to_string()));
        }

        let mut units = units;
        for pass in 1..=MAX_REDUCE_PASSES {
            let preamble = if pass == 1 { prompts.leaf } else { prompts.combine };
            let groups = partition(&units, preamble, self.ceiling, self.counter)?;

            // Round-trip count comparison: a combine pass that merged nothing
            // will emit as many summaries as it consumed.
            if pass > 1 && groups.len() >= units.len() && groups.len() > 1 {
                return Err(DigestError::NonProgress {
                    units: units.len(),
                    groups: groups.len(),
                });
            }

            tracing::debug!(pass, groups = groups.len(), "Reduce pass starting");
            let mut summaries = self.run_pass(&groups, preamble, reduce_one, progress, cancel, pass)?;

            if summaries.len() == 1 {
                return Ok(summaries.pop().expect("one summary"));
            }
            units = summaries;
        }

        Err(DigestError::NonProgress {
            units: units.len(),
            groups: units.len(),
        })
    }

    /// One leaf pass only: partition and reduce each group, returning the
    /// partial summaries without combining them.
    pub fn leaf_pass(
        &self,
        units: &[String],
        preamble: &str,
        reduce_one: &ReduceOne<'_>,
        progress: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> DigestResult<Vec<String>> {
        if units.is_empty() {
            return Err(DigestError::InvalidInput("nothing to reduce".to_string()));
        }
        let groups = partition(units, preamble, self.ceiling, self.counter)?;
        self.run_pass(&groups, preamble, reduce_one, progress, cancel, 1)
    }

    fn run_pass(
        &self,
        groups: &[String],
        preamble: &str,
        reduce_one: &ReduceOne<'_>,
        progress: &mut dyn ProgressSink,
        cancel: &CancelToken,
        pass: usize,
    ) -> DigestResult<Vec<String>> {
        let total = groups.len();

        if self.parallel && total > 1 {
            if cancel.is_cancelled() {
                return Err(DigestError::Cancelled);
            }
            let summaries: DigestResult<Vec<String>> = groups
                .par_iter()
                .map(|group| {
                    if cancel.is_cancelled() {
                        return Err(DigestError::Cancelled);
                    }
                    reduce_one(preamble, group)
                })
                .collect();
            let summaries = summaries?;
            progress.update(100, &format!("Reduce pass {} ({} chunks)", pass, total));
            return Ok(summaries);
        }

        let mut summaries = Vec::with_capacity(total);
        for (done, group) in groups.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(DigestError::Cancelled);
            }
            summaries.push(reduce_one(preamble, group)?);
            progress.update(
                (((done + 1) * 100) / total) as u8,
                &format!("Reduce pass {} ({}/{})", pass, done + 1, total),
            );
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgress;
    use crate::token_count::HeuristicTokenCounter;
    use std::sync::atomic::AtomicUsize;

    const PROMPTS: ReducePrompts<'static> = ReducePrompts { leaf: "leaf prompt", combine: "combine prompt" };

    fn counting_reduce(counter: &AtomicUsize) -> impl Fn(&str, &str) -> DigestResult<String> + Sync + '_ {
        move |_preamble, _payload| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok("short summary".to_string())
        }
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let counter = HeuristicTokenCounter;
        let reducer = Reducer::new(&counter, 1_000);
        let calls = AtomicUsize::new(0);
        let err = reducer
            .reduce(vec![], PROMPTS, &counting_reduce(&calls), &mut NullProgress, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, DigestError::InvalidInput(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_small_input_single_direct_call() {
        let counter = HeuristicTokenCounter;
        let reducer = Reducer::new(&counter, 10_000);
        let calls = AtomicUsize::new(0);
        let units: Vec<String> = (0..5).map(|i| format!("paragraph {}", i)).collect();

        let result = reducer
            .reduce(units, PROMPTS, &counting_reduce(&calls), &mut NullProgress, &CancelToken::new())
            .unwrap();
        assert_eq!(result, "short summary");
        assert_eq!(calls.load(Ordering::SeqCst), 1, "one group, one call, no recursion");
    }

    #[test]
    fn test_large_input_leaf_then_one_combine_pass() {
        let counter = HeuristicTokenCounter;
        // Units of ~12 tokens; ceiling fits roughly 3 per group.
        let units: Vec<String> = (0..12)
            .map(|i| format!("a fairly long paragraph of text number {}", i))
            .collect();
        let reducer = Reducer::new(&counter, 50);
        let calls = AtomicUsize::new(0);

        let result = reducer
            .reduce(units, PROMPTS, &counting_reduce(&calls), &mut NullProgress, &CancelToken::new())
            .unwrap();
        assert_eq!(result, "short summary");
        // Leaf pass: >= 2 groups; the short partial summaries then pack into
        // a single combine group.
        let total = calls.load(Ordering::SeqCst);
        assert!(total >= 3, "expected leaf groups plus one combine call, got {}", total);
    }

    #[test]
    fn test_chunk_count_is_deterministic() {
        let counter = HeuristicTokenCounter;
        let units: Vec<String> = (0..20)
            .map(|i| format!("deterministic unit number {}", i))
            .collect();

        let mut counts = Vec::new();
        for _ in 0..2 {
            let calls = AtomicUsize::new(0);
            let reducer = Reducer::new(&counter, 60);
            reducer
                .reduce(units.clone(), PROMPTS, &counting_reduce(&calls), &mut NullProgress, &CancelToken::new())
                .unwrap();
            counts.push(calls.load(Ordering::SeqCst));
        }
        assert_eq!(counts[0], counts[1]);
    }

    #[test]
    fn test_oversized_unit_propagates_size_exceeded() {
        let counter = HeuristicTokenCounter;
        let reducer = Reducer::new(&counter, 30);
        let calls = AtomicUsize::new(0);
        let units = vec!["tiny".to_string(), "w ".repeat(200)];

        let err = reducer
            .reduce(units, PROMPTS, &counting_reduce(&calls), &mut NullProgress, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, DigestError::SizeExceeded { .. }));
    }

    #[test]
    fn test_non_progress_detected() {
        let counter = HeuristicTokenCounter;
        // Every "summary" is as long as a full group, so combine passes can
        // never merge; the guard must fire instead of looping.
        let stuck = "irreducible ".repeat(12);
        let stuck_clone = stuck.clone();
        let reduce_one =
            move |_p: &str, _u: &str| -> DigestResult<String> { Ok(stuck_clone.clone()) };
        let units: Vec<String> = (0..4).map(|_| stuck.clone()).collect();
        let reducer = Reducer::new(&counter, 60);

        let err = reducer
            .reduce(units, PROMPTS, &reduce_one, &mut NullProgress, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, DigestError::NonProgress { .. }), "got {:?}", err);
    }

    #[test]
    fn test_leaf_and_combine_preambles_differ() {
        let counter = HeuristicTokenCounter;
        let seen = std::sync::Mutex::new(Vec::new());
        let reduce_one = |preamble: &str, _u: &str| -> DigestResult<String> {
            seen.lock().unwrap().push(preamble.to_string());
            Ok("s".to_string())
        };
        let units: Vec<String> = (0..12)
            .map(|i| format!("a fairly long paragraph of text number {}", i))
            .collect();
        let reducer = Reducer::new(&counter, 50);
        reducer
            .reduce(units, PROMPTS, &reduce_one, &mut NullProgress, &CancelToken::new())
            .unwrap();

        let seen = seen.into_inner().unwrap();
        assert!(seen.iter().any(|p| p == "leaf prompt"));
        assert!(seen.iter().any(|p| p == "combine prompt"));
        // No call mixes phases: leaf calls all precede combine calls.
        let first_combine = seen.iter().position(|p| p == "combine prompt").unwrap();
        assert!(seen[..first_combine].iter().all(|p| p == "leaf prompt"));
    }

    #[test]
    fn test_cancellation_aborts_between_calls() {
        let counter = HeuristicTokenCounter;
        let cancel = CancelToken::new();
        let cancel_inner = cancel.clone();
        let calls = AtomicUsize::new(0);
        let reduce_one = move |_p: &str, _u: &str| -> DigestResult<String> {
            calls.fetch_add(1, Ordering::SeqCst);
            // First call requests cancellation; the loop must stop before
            // the second call.
            cancel_inner.cancel();
            Ok("s".to_string())
        };
        let units: Vec<String> = (0..12)
            .map(|i| format!("a fairly long paragraph of text number {}", i))
            .collect();
        let reducer = Reducer::new(&counter, 50);

        let err = reducer
            .reduce(units, PROMPTS, &reduce_one, &mut NullProgress, &cancel)
            .unwrap_err();
        assert!(matches!(err, DigestError::Cancelled));
    }

    #[test]
    fn test_parallel_pass_preserves_order() {
        let counter = HeuristicTokenCounter;
        // Echo reducer: summary identifies its group, so order is observable.
        let reduce_one = |_p: &str, payload: &str| -> DigestResult<String> {
            Ok(format!("sum[{}]", payload.split('\n').next().unwrap_or("")))
        };
        let units: Vec<String> = (0..12)
            .map(|i| format!("a fairly long paragraph of text number {:02}", i))
            .collect();

        let sequential = Reducer::new(&counter, 60)
            .reduce(units.clone(), PROMPTS, &reduce_one, &mut NullProgress, &CancelToken::new())
            .unwrap();
        let parallel = Reducer::new(&counter, 60)
            .with_parallel_leaves(true)
            .reduce(units, PROMPTS, &reduce_one, &mut NullProgress, &CancelToken::new())
            .unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_progress_is_monotonic_within_call() {
        use crate::progress::{MonotonicProgress, ProgressSink};

        struct Recorder(Vec<u8>);
        impl ProgressSink for Recorder {
            fn update(&mut self, percent: u8, _label: &str) {
                self.0.push(percent);
            }
        }

        let counter = HeuristicTokenCounter;
        let calls = AtomicUsize::new(0);
        let units: Vec<String> = (0..12)
            .map(|i| format!("a fairly long paragraph of text number {}", i))
            .collect();
        let mut recorder = Recorder(Vec::new());
        {
            let mut mono = MonotonicProgress::new(&mut recorder);
            let reducer = Reducer::new(&counter, 50);
            reducer
                .reduce(units, PROMPTS, &counting_reduce(&calls), &mut mono, &CancelToken::new())
                .unwrap();
        }
        assert!(recorder.0.windows(2).all(|w| w[0] <= w[1]), "{:?}", recorder.0);
    }
}
