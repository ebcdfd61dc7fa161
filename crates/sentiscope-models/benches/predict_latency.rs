//! Latency benchmarks for the prediction path
//!
//! Measures tokenize + encode + classify against an in-memory model, and the
//! registry fast path for an already resident version.
//!
//! Run with: cargo bench -p sentiscope-models

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sentiscope_core::{Label, ModelVersion, Result};
use sentiscope_models::{
    BagOfWordsEncoder, ClassifierArtifact, GaussianNb, LinearClassifier, LoadedModel, ModelLoader,
    ModelRegistry, PredictionEngine, RegistryConfig,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Runtime;

const VOCABULARY: &[&str] = &[
    "good", "bad", "great", "terribl", "food", "servic", "slow", "friend", "delici", "cold",
    "love", "hate", "price", "waiter", "not", "never", "amaz", "disgust", "fresh", "stale",
];

fn encoder() -> BagOfWordsEncoder {
    let vocabulary: HashMap<String, usize> = VOCABULARY
        .iter()
        .enumerate()
        .map(|(i, word)| (word.to_string(), i))
        .collect();
    BagOfWordsEncoder::new(vocabulary, false)
}

fn linear_model() -> LoadedModel {
    let weights = (0..VOCABULARY.len())
        .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
        .collect();
    let classifier = ClassifierArtifact::Linear(LinearClassifier {
        weights,
        intercept: 0.0,
        classes: [Label::Negative, Label::Positive],
    });
    LoadedModel::new(ModelVersion::new("bench-linear").unwrap(), encoder(), classifier).unwrap()
}

fn gaussian_model() -> LoadedModel {
    let width = VOCABULARY.len();
    let classifier = ClassifierArtifact::GaussianNb(GaussianNb {
        classes: vec![Label::Negative, Label::Positive],
        class_prior: vec![0.5, 0.5],
        theta: vec![vec![0.2; width], vec![0.4; width]],
        var: vec![vec![0.3; width], vec![0.3; width]],
    });
    LoadedModel::new(ModelVersion::new("bench-nb").unwrap(), encoder(), classifier).unwrap()
}

fn reviews() -> Vec<(&'static str, String)> {
    vec![
        ("short", "Wow... Loved this place.".to_string()),
        (
            "medium",
            "The food was not good and the service was slow, but the waiter was friendly."
                .to_string(),
        ),
        (
            "long",
            "Delicious fresh food, amazing prices and a friendly waiter. ".repeat(20),
        ),
    ]
}

/// Benchmark the full prediction path per classifier kind
fn benchmark_predict(c: &mut Criterion) {
    let engine = PredictionEngine::with_default().expect("Failed to create engine");

    let mut group = c.benchmark_group("Predict");
    group.sample_size(100);

    for (kind, model) in [("linear", linear_model()), ("gaussian_nb", gaussian_model())] {
        for (name, review) in reviews() {
            group.bench_with_input(
                BenchmarkId::new(kind, name),
                &review,
                |b, review| b.iter(|| engine.predict(&model, black_box(review))),
            );
        }
    }

    group.finish();
}

struct StaticLoader;

#[async_trait]
impl ModelLoader for StaticLoader {
    async fn load(&self, _version: &ModelVersion) -> Result<LoadedModel> {
        Ok(linear_model())
    }
}

/// Benchmark resolving an already resident version through the registry
fn benchmark_registry_lookup(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let registry = ModelRegistry::new(Arc::new(StaticLoader), RegistryConfig::default());
    let version = ModelVersion::new("bench-linear").unwrap();
    rt.block_on(registry.set_active(&version)).unwrap();

    let mut group = c.benchmark_group("Registry");
    group.bench_function("get_or_load_resident", |b| {
        b.iter(|| rt.block_on(async { registry.get_or_load(black_box(&version)).await.unwrap() }))
    });
    group.bench_function("active", |b| b.iter(|| registry.active().unwrap()));
    group.finish();
}

criterion_group!(benches, benchmark_predict, benchmark_registry_lookup);
criterion_main!(benches);
