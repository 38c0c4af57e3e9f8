//! Confidence sampler.
//!
//! A single camera frame is an unreliable shape or object-count estimator.
//! [`classify`] draws repeatedly from a caller-supplied single-shot
//! classifier, tallies the labels, and stops as soon as one label holds a
//! large enough share of the draws.
//!
//! # Example
//!
//! ```rust
//! use rally_perception::sampler::classify;
//!
//! let verdict = classify(|| "square", 5, 50, 0.8);
//! assert_eq!(verdict.label, Some("square"));
//! assert!(verdict.converged);
//! assert_eq!(verdict.samples, 5);
//! ```

use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Draw budget and stopping rule for one call site.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Draws required before early stopping is considered.
    pub min_samples: usize,
    /// Hard cap on draws.
    pub max_samples: usize,
    /// Share of draws the leading label needs to stop early, in `(0, 1]`.
    pub confidence: f32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            max_samples: 30,
            confidence: 0.6,
        }
    }
}

impl SamplerConfig {
    pub fn new(min_samples: usize, max_samples: usize, confidence: f32) -> Self {
        Self {
            min_samples,
            max_samples,
            confidence,
        }
    }

    /// Run [`classify`] with this configuration.
    pub fn classify<L, F>(&self, sample_fn: F) -> Verdict<L>
    where
        L: Eq + Hash + Clone,
        F: FnMut() -> L,
    {
        classify(sample_fn, self.min_samples, self.max_samples, self.confidence)
    }
}

/// Result of one sampling run.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict<L> {
    /// The unique leading label, or `None` ("unknown") when nothing was drawn
    /// or the lead is exactly tied.
    pub label: Option<L>,
    /// `true` when the run stopped early on confidence.
    pub converged: bool,
    /// Number of draws taken.
    pub samples: usize,
}

/// Label counts for a single sampling run.
#[derive(Debug, Clone)]
pub struct Tally<L> {
    counts: HashMap<L, usize>,
    total: usize,
}

impl<L: Eq + Hash + Clone> Tally<L> {
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            total: 0,
        }
    }

    pub fn record(&mut self, label: L) {
        *self.counts.entry(label).or_insert(0) += 1;
        self.total += 1;
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn count(&self, label: &L) -> usize {
        self.counts.get(label).copied().unwrap_or(0)
    }

    /// The label with strictly the most draws, with its count.
    pub fn leader(&self) -> Option<(L, usize)> {
        let best = self.counts.values().copied().max()?;
        let mut leaders = self.counts.iter().filter(|(_, c)| **c == best);
        let (label, count) = leaders.next()?;
        if leaders.next().is_some() {
            return None;
        }
        Some((label.clone(), *count))
    }
}

impl<L: Eq + Hash + Clone> Default for Tally<L> {
    fn default() -> Self {
        Self::new()
    }
}

/// One sampling run fed a draw at a time.
///
/// Lets the caller pace draws (for example one per camera frame) and stop
/// between them; [`classify`] is the same rule driven in a tight loop.
#[derive(Debug, Clone)]
pub struct SamplingRun<L> {
    config: SamplerConfig,
    tally: Tally<L>,
}

impl<L: Eq + Hash + Clone> SamplingRun<L> {
    pub fn new(config: SamplerConfig) -> Self {
        Self {
            config,
            tally: Tally::new(),
        }
    }

    pub fn samples(&self) -> usize {
        self.tally.total()
    }

    /// Whether the draw budget is spent.
    pub fn is_exhausted(&self) -> bool {
        self.tally.total() >= self.config.max_samples
    }

    /// Record one draw.  Returns the verdict once the run is over, either
    /// on confidence or because the budget is spent.
    pub fn record(&mut self, label: L) -> Option<Verdict<L>> {
        self.tally.record(label);

        if self.tally.total() >= self.config.min_samples
            && let Some((label, count)) = self.tally.leader()
        {
            let share = count as f32 / self.tally.total() as f32;
            if share >= self.config.confidence {
                debug!(samples = self.tally.total(), share, "sampler converged");
                return Some(Verdict {
                    label: Some(label),
                    converged: true,
                    samples: self.tally.total(),
                });
            }
        }

        self.is_exhausted().then(|| self.finish())
    }

    /// Unconverged verdict over the draws taken so far.
    pub fn finish(&self) -> Verdict<L> {
        debug!(samples = self.tally.total(), "sampler stopped without confidence");
        Verdict {
            label: self.tally.leader().map(|(label, _)| label),
            converged: false,
            samples: self.tally.total(),
        }
    }
}

/// Draw from `sample_fn` until a label is confidently ahead or `max_samples`
/// draws have been taken.
pub fn classify<L, F>(
    mut sample_fn: F,
    min_samples: usize,
    max_samples: usize,
    confidence: f32,
) -> Verdict<L>
where
    L: Eq + Hash + Clone,
    F: FnMut() -> L,
{
    let mut run = SamplingRun::new(SamplerConfig::new(min_samples, max_samples, confidence));
    while !run.is_exhausted() {
        if let Some(verdict) = run.record(sample_fn()) {
            return verdict;
        }
    }
    run.finish()
}
