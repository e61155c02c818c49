use std::pin::Pin;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use souvenir_core::config::SouvenirConfig;
use souvenir_core::episode::{EpisodeType, NewEpisode};
use souvenir_core::{Engine, LlmCallback};

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

fn record_batch(engine: &Engine, session_count: usize, per_session: usize) {
    for session in 0..session_count {
        for i in 0..per_session {
            engine
                .record(NewEpisode {
                    session_id: format!("session-{session}"),
                    episode_type: EpisodeType::Observation,
                    content: format!("session {session} step {i}: investigated a failing test"),
                    importance: None,
                })
                .unwrap();
        }
    }
}

fn bench_consolidate(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("consolidate_8_sessions_20_episodes_each", |bencher| {
        bencher.iter_batched(
            || {
                let mut config = SouvenirConfig::default();
                config.flush_threshold = 10_000;
                let engine = Engine::open_in_memory(config, None).unwrap();
                rt.block_on(engine.initialize()).unwrap();
                record_batch(&engine, 8, 20);
                engine
            },
            |engine| rt.block_on(engine.consolidate(black_box(stub_llm()))).unwrap(),
            BatchSize::SmallInput,
        )
    });
}

fn bench_compact(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("compact_after_consolidation", |bencher| {
        bencher.iter_batched(
            || {
                let mut config = SouvenirConfig::default();
                config.flush_threshold = 10_000;
                let engine = Engine::open_in_memory(config, None).unwrap();
                rt.block_on(engine.initialize()).unwrap();
                record_batch(&engine, 8, 20);
                rt.block_on(engine.consolidate(stub_llm())).unwrap();
                engine
            },
            |engine| engine.compact().unwrap(),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_consolidate, bench_compact);
criterion_main!(benches);
