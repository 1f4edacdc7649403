//! Word frequency extraction: plain text in, bounded term-frequency map out.
//!
//! Text is NFKC-normalized and lowercased, split into word tokens, stripped of
//! stopwords and very short tokens, counted, and truncated to the top terms.
//! The transcription layer that produces the text lives outside this crate;
//! [`TextProcessor`] is the seam for swapping in a different extractor.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::wordmap::{DEFAULT_CAP, Wordmap};

static RE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+(?:['’\-][\p{L}\p{N}]+)*").unwrap());

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of",
    "with", "by", "from", "is", "are", "was", "were", "be", "been", "being",
    "have", "has", "had", "do", "does", "did", "will", "would", "could",
    "should", "may", "might", "shall", "can", "this", "that", "these", "those",
    "it", "its", "he", "she", "they", "we", "you", "his", "her", "their",
    "my", "your", "our", "not", "no", "so", "if", "as", "up", "out", "about",
    "into", "over", "after", "than", "then", "just", "also", "very", "quite",
    "rather", "some", "any", "each", "all", "more", "most", "such", "only",
    "same", "other", "own", "there", "here", "what", "which", "who", "whom",
    "when", "where", "why", "how", "them", "him", "me", "us", "i", "im",
];

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Anything that turns text into a wordmap.
///
/// Implementations must be cheap to share across threads: extraction may be
/// run on a helper thread under a timeout. A timed-out extraction is not
/// cancelled; its thread keeps running until `extract` returns and holds one
/// of the caller's [`ExtractionSlots`] meanwhile.
pub trait TextProcessor: Send + Sync {
    fn extract(&self, text: &str) -> Wordmap;
}

/// Built-in term-frequency extractor.
#[derive(Debug, Clone)]
pub struct WordFrequencyExtractor {
    /// Maximum number of distinct terms returned.
    pub cap: usize,
    /// Tokens shorter than this (in chars) are ignored.
    pub min_len: usize,
}

impl Default for WordFrequencyExtractor {
    fn default() -> Self {
        Self {
            cap: DEFAULT_CAP,
            min_len: 3,
        }
    }
}

impl WordFrequencyExtractor {
    pub fn with_cap(cap: usize) -> Self {
        Self {
            cap,
            ..Default::default()
        }
    }

    /// Normalized tokens of `text`, in order, stopwords and short tokens removed.
    pub fn tokens(&self, text: &str) -> Vec<String> {
        let normalized: String = text.nfkc().collect::<String>().to_lowercase();
        RE_WORD
            .find_iter(&normalized)
            .map(|m| m.as_str().replace('’', "'"))
            .filter(|w| w.chars().count() >= self.min_len && !is_stopword(w))
            .collect()
    }
}

impl TextProcessor for WordFrequencyExtractor {
    fn extract(&self, text: &str) -> Wordmap {
        let mut counts: BTreeMap<String, f64> = BTreeMap::new();
        for token in self.tokens(text) {
            *counts.entry(token).or_insert(0.0) += 1.0;
        }
        Wordmap::from_counts(counts, self.cap)
    }
}

/// Default number of extraction threads allowed alive at once.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 32;

/// Caps how many extraction threads may be alive at once, including threads
/// abandoned after a timeout. Clones share the same count.
#[derive(Debug, Clone)]
pub struct ExtractionSlots {
    in_use: Arc<AtomicUsize>,
    max: usize,
}

impl Default for ExtractionSlots {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IN_FLIGHT)
    }
}

impl ExtractionSlots {
    pub fn new(max: usize) -> Self {
        Self {
            in_use: Arc::new(AtomicUsize::new(0)),
            max: max.max(1),
        }
    }

    /// Threads currently holding a slot.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    fn try_acquire(&self) -> Option<SlotGuard> {
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max).then_some(n + 1)
            })
            .ok()
            .map(|_| SlotGuard(Arc::clone(&self.in_use)))
    }
}

/// Releases its slot when the extraction thread finishes.
struct SlotGuard(Arc<AtomicUsize>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Run `processor` on a helper thread, giving up after `timeout`.
///
/// A timed-out or panicked extraction yields an empty wordmap, so callers fail
/// closed instead of waiting on a slow collaborator while holding a lock. When
/// every slot is taken by a still-running extraction, no thread is spawned and
/// the result is empty as well.
pub fn extract_bounded(
    processor: Arc<dyn TextProcessor>,
    text: String,
    timeout: Duration,
    slots: &ExtractionSlots,
) -> Wordmap {
    let Some(slot) = slots.try_acquire() else {
        tracing::warn!(
            in_flight = slots.in_use(),
            "too many extractions in flight; using empty wordmap"
        );
        return Wordmap::new();
    };
    let (tx, rx) = mpsc::sync_channel(1);
    let spawned = std::thread::Builder::new()
        .name("verbum-extract".into())
        .spawn(move || {
            let _slot = slot;
            let _ = tx.send(processor.extract(&text));
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "failed to spawn extraction thread; using empty wordmap");
        return Wordmap::new();
    }
    match rx.recv_timeout(timeout) {
        Ok(wordmap) => wordmap,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "text extraction timed out");
            Wordmap::new()
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            tracing::warn!("text extraction thread exited without a result");
            Wordmap::new()
        }
    }
}
