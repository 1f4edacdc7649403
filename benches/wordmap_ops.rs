//! Benchmarks for wordmap operations.

use std::collections::BTreeMap;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use verbum::ids::{DomainId, UserId};
use verbum::scoring::score_wordmaps;
use verbum::text::{TextProcessor, WordFrequencyExtractor};
use verbum::wordmap::domain::{OwnerShare, recalculate};
use verbum::wordmap::merge::merge;
use verbum::wordmap::{ContributorWordmap, DEFAULT_CAP, Wordmap};

/// A full-size wordmap with deterministic, offset terms.
fn synthetic(offset: usize) -> Wordmap {
    let counts: BTreeMap<String, f64> = (0..DEFAULT_CAP)
        .map(|i| (format!("term{:04}", i + offset), (i % 17 + 1) as f64))
        .collect();
    Wordmap::from_counts(counts, DEFAULT_CAP)
}

fn bench_merge(c: &mut Criterion) {
    let existing = synthetic(0);
    let incoming = synthetic(100);

    c.bench_function("merge_200x200", |bench| {
        bench.iter(|| black_box(merge(&existing, &incoming, 0.95, DEFAULT_CAP)))
    });
}

fn bench_recalculate(c: &mut Criterion) {
    let domain = DomainId::new("bench").unwrap();
    let wordmaps: Vec<ContributorWordmap> = (0..50)
        .map(|i| {
            let user = UserId::new(format!("user-{i:02}")).unwrap();
            ContributorWordmap::first(user, "unit", synthetic(i * 10), DEFAULT_CAP, 0).unwrap()
        })
        .collect();
    let owners: Vec<OwnerShare<'_>> = wordmaps
        .iter()
        .map(|w| OwnerShare {
            user: &w.owner,
            bps: 200,
            wordmap: Some(w),
        })
        .collect();

    c.bench_function("recalculate_50_owners", |bench| {
        bench.iter(|| black_box(recalculate(&domain, &owners, DEFAULT_CAP).unwrap()))
    });
}

fn bench_score(c: &mut Criterion) {
    let target = synthetic(0);
    let text: String = (0..500)
        .map(|i| format!("term{:04} ", i % 300))
        .collect();
    let extractor = WordFrequencyExtractor::default();

    c.bench_function("extract_and_score_500_tokens", |bench| {
        bench.iter(|| {
            let candidate = extractor.extract(black_box(&text));
            black_box(score_wordmaps(&candidate, &target))
        })
    });
}

criterion_group!(benches, bench_merge, bench_recalculate, bench_score);
criterion_main!(benches);
