use std::pin::Pin;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use souvenir_core::config::SouvenirConfig;
use souvenir_core::episode::{EpisodeType, NewEpisode};
use souvenir_core::{cosine_similarity, Engine, LlmCallback};

fn stub_llm() -> LlmCallback {
    Arc::new(|_system: &str, user: &str| {
        let content = user.lines().next().unwrap_or("note").to_string();
        Box::pin(async move {
            Ok(format!(
                r#"{{"items":[{{"content":"{content}","category":"result","importance":0.5,"action":"new"}}]}}"#
            ))
        }) as Pin<Box<dyn std::future::Future<Output = anyhow::Result<String>> + Send>>
    })
}

fn seeded_engine(episode_count: usize) -> Engine {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut config = SouvenirConfig::default();
    config.flush_threshold = episode_count + 1;
    let engine = Engine::open_in_memory(config, None).unwrap();
    rt.block_on(engine.initialize()).unwrap();

    for i in 0..episode_count {
        engine
            .record(NewEpisode {
                session_id: format!("session-{}", i % 8),
                episode_type: EpisodeType::Observation,
                content: format!("the user asked about topic number {i} during review"),
                importance: None,
            })
            .unwrap();
    }
    rt.block_on(engine.consolidate(stub_llm())).unwrap();
    engine
}

fn bench_cosine_similarity(c: &mut Criterion) {
    let a: Vec<f32> = (0..384).map(|i| (i as f32).sin()).collect();
    let b: Vec<f32> = (0..384).map(|i| (i as f32).cos()).collect();

    c.bench_function("cosine_similarity_384d", |bencher| {
        bencher.iter(|| cosine_similarity(black_box(&a), black_box(&b)))
    });
}

fn bench_recall_fts_only(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let engine = seeded_engine(300);

    c.bench_function("recall_fts_only_300_memories", |bencher| {
        bencher.iter_batched(
            || (),
            |()| rt.block_on(engine.recall(black_box("topic review"), Some(2000))).unwrap(),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_cosine_similarity, bench_recall_fts_only);
criterion_main!(benches);
