//! Benchmarks for the formatter, correlation, and dispatcher hot paths.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use std::time::Duration;
use tokio::runtime::Runtime;

use duplex_rpc::correlation::{CorrelationConfig, CorrelationManager};
use duplex_rpc::dispatcher::{identity_transform, Dispatcher, DispatcherConfig};
use duplex_rpc::formatter::{Formatter, JsonFormatter, MessagePackFormatter};
use duplex_rpc::message::{Id, Message, ProtocolMode};

fn create_runtime() -> Runtime {
    Runtime::new().expect("failed to create tokio runtime")
}

fn benchmark_json_formatter_round_trip(c: &mut Criterion) {
    let formatter = JsonFormatter::new(ProtocolMode::V2);
    let message = Message::request(Id::number(1), "echo", Some(json!(["hello", "world"])));

    let mut group = c.benchmark_group("json_formatter");
    group.bench_function("encode", |b| {
        b.iter(|| black_box(formatter.encode(black_box(&message)).unwrap()))
    });

    let bytes = formatter.encode(&message).unwrap();
    group.bench_function("decode", |b| {
        b.iter(|| black_box(formatter.decode(black_box(&bytes)).unwrap()))
    });
    group.finish();
}

fn benchmark_msgpack_formatter_round_trip(c: &mut Criterion) {
    let formatter = MessagePackFormatter::new();
    let message = Message::request(Id::number(1), "echo", Some(json!(["hello", "world"])));

    let mut group = c.benchmark_group("msgpack_formatter");
    group.bench_function("encode", |b| {
        b.iter(|| black_box(formatter.encode(black_box(&message)).unwrap()))
    });

    let bytes = formatter.encode(&message).unwrap();
    group.bench_function("decode", |b| {
        b.iter(|| black_box(formatter.decode(black_box(&bytes)).unwrap()))
    });
    group.finish();
}

fn benchmark_correlation_registration(c: &mut Criterion) {
    let rt = create_runtime();
    let mut group = c.benchmark_group("correlation_manager");

    for pending_count in [1u64, 10, 100].iter() {
        group.bench_with_input(
            BenchmarkId::new("register_and_complete", pending_count),
            pending_count,
            |b, &count| {
                b.iter_batched(
                    || {
                        CorrelationManager::new_without_cleanup(CorrelationConfig {
                            cleanup_interval: Duration::from_secs(3600),
                            ..Default::default()
                        })
                    },
                    |manager| {
                        rt.block_on(async {
                            for i in 0..count {
                                let receiver = manager
                                    .register(Id::number(i), "echo", None, json!(null))
                                    .unwrap();
                                manager.complete(&Id::number(i), Ok(json!("done")));
                                black_box(receiver.await.unwrap().unwrap());
                            }
                        })
                    },
                    criterion::BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

fn benchmark_dispatcher_dispatch(c: &mut Criterion) {
    use async_trait::async_trait;
    use duplex_rpc::cancel::CancelToken;
    use duplex_rpc::dispatcher::{Arity, Target, TargetError, TargetOptions};
    use duplex_rpc::message::Arguments;
    use serde_json::Value;

    struct Echo;

    #[async_trait]
    impl Target for Echo {
        async fn call(&self, args: Arguments, _cancel: CancelToken) -> Result<Value, TargetError> {
            match args {
                Arguments::Positional(mut items) if items.len() == 1 => Ok(items.remove(0)),
                _ => Err(TargetError::InvalidParams("expected one arg".into())),
            }
        }

        fn arity(&self) -> Arity {
            Arity::Positional(1)
        }
    }

    let rt = create_runtime();
    let dispatcher = Dispatcher::new(DispatcherConfig::default(), identity_transform());
    dispatcher.add_target("echo", Echo, TargetOptions::default());

    let mut group = c.benchmark_group("dispatcher");
    group.bench_function("dispatch_request", |b| {
        b.iter(|| {
            rt.block_on(async {
                let request = Message::request(Id::number(1), "echo", Some(json!(["hi"])));
                black_box(dispatcher.dispatch(request, CancelToken::none()).await)
            })
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    benchmark_json_formatter_round_trip,
    benchmark_msgpack_formatter_round_trip,
    benchmark_correlation_registration,
    benchmark_dispatcher_dispatch,
);
criterion_main!(benches);
