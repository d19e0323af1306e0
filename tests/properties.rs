//! Property-based invariants: formatter round-tripping, correlation-table
//! leak-freedom, dispatcher concurrency bounds, and write atomicity under
//! concurrent senders.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use proptest::collection::vec as pvec;
use proptest::prelude::*;
use serde_json::{json, Value};
use tokio::runtime::Runtime;

use duplex_rpc::cancel::CancelToken;
use duplex_rpc::correlation::{CorrelationConfig, CorrelationError, CorrelationManager};
use duplex_rpc::dispatcher::{Dispatcher, DispatcherConfig, Target, TargetError, TargetOptions};
use duplex_rpc::formatter::{Formatter, JsonFormatter};
use duplex_rpc::message::{Id, Message, ProtocolMode};

fn runtime() -> Runtime {
    Runtime::new().expect("failed to create tokio runtime")
}

// ---- value and message strategies ----

fn json_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        ".{0,12}".prop_map(Value::String),
    ]
}

fn json_value() -> impl Strategy<Value = Value> {
    json_leaf().prop_recursive(3, 16, 6, |inner| {
        prop_oneof![
            pvec(inner.clone(), 0..4).prop_map(Value::Array),
            pvec((".{1,6}", inner), 0..4)
                .prop_map(|entries| Value::Object(entries.into_iter().collect())),
        ]
    })
}

fn id_strategy() -> impl Strategy<Value = Id> {
    prop_oneof![
        any::<u64>().prop_map(Id::Number),
        ".{1,10}".prop_map(Id::String),
    ]
}

fn method_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9_./]{0,20}"
}

fn message_v2_strategy() -> impl Strategy<Value = Message> {
    prop_oneof![
        (id_strategy(), method_strategy(), proptest::option::of(json_value()))
            .prop_map(|(id, method, params)| Message::request(id, method, params)),
        (method_strategy(), proptest::option::of(json_value()))
            .prop_map(|(method, params)| Message::notification(method, params)),
        (id_strategy(), json_value()).prop_map(|(id, result)| Message::result(id, result)),
        (id_strategy(), any::<i32>(), ".{0,20}", proptest::option::of(json_value()))
            .prop_map(|(id, code, message, data)| Message::error(id, code, message, data)),
    ]
}

proptest! {
    /// Any message, run through the 2.0 JSON formatter, decodes back to an
    /// equal value.
    #[test]
    fn json_formatter_round_trips_any_message(message in message_v2_strategy()) {
        let formatter = JsonFormatter::new(ProtocolMode::V2);
        let bytes = formatter.encode(&message).unwrap();
        let decoded = formatter.decode(&bytes).unwrap();
        prop_assert_eq!(decoded, message);
    }

    /// 2.0-mode output always carries `"jsonrpc":"2.0"`; 1.0-mode output
    /// never carries a `jsonrpc` field at all.
    #[test]
    fn jsonrpc_field_presence_matches_the_configured_mode(message in message_v2_strategy()) {
        let v2 = JsonFormatter::new(ProtocolMode::V2);
        let v2_bytes = v2.encode(&message).unwrap();
        let v2_text = String::from_utf8_lossy(&v2_bytes);
        prop_assert!(v2_text.contains(r#""jsonrpc":"2.0""#));

        // Re-express as something 1.0 mode can legally carry (no id-less
        // requests, no named-less invariants beyond what `Message` already
        // enforces) and check the inverse.
        let v1 = JsonFormatter::new(ProtocolMode::V1);
        let as_v1 = match message {
            Message::Request { id, method, params } => Message::request(id, method, params),
            Message::Notification { method, params } => Message::notification(method, params),
            Message::Result { id, result } => Message::result(id, result),
            Message::Error { id, code, message, data } => Message::error(id, code, message, data),
        };
        let v1_bytes = v1.encode(&as_v1).unwrap();
        let v1_text = String::from_utf8_lossy(&v1_bytes);
        prop_assert!(!v1_text.contains("jsonrpc"));
    }

    /// Every registered id eventually leaves the table, whether by normal
    /// completion or explicit cancellation — nothing is ever leaked.
    #[test]
    fn correlation_table_never_leaks_entries(
        count in 1usize..20,
        complete_mask in pvec(any::<bool>(), 1..20),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let manager = CorrelationManager::new_without_cleanup(CorrelationConfig::default());
            let mut receivers = Vec::new();
            for i in 0..count {
                let id = Id::number(i as u64);
                let receiver = manager.register(id, "m", None, Value::Null).unwrap();
                receivers.push((Id::number(i as u64), receiver));
            }
            prop_assert_eq!(manager.pending_count(), count);

            for (i, (id, _)) in receivers.iter().enumerate() {
                let complete = complete_mask.get(i % complete_mask.len()).copied().unwrap_or(true);
                if complete {
                    manager.complete(id, Ok(json!("done")));
                } else {
                    manager.complete(id, Err(CorrelationError::Cancelled { id: id.clone() }));
                }
            }

            for (_, receiver) in receivers {
                let _ = receiver.await;
            }

            prop_assert_eq!(manager.pending_count(), 0);
            Ok(())
        })?;
    }

    /// A dispatcher configured with `max_concurrent_inbound = Some(k)` never
    /// lets more than `k` dispatches run their target body concurrently.
    #[test]
    fn dispatcher_gate_bounds_concurrency(
        k in 1usize..4,
        requests in 2usize..8,
    ) {
        let rt = runtime();
        rt.block_on(async {
            struct Tracked {
                in_flight: Arc<AtomicUsize>,
                max_observed: Arc<AtomicUsize>,
            }

            #[async_trait]
            impl Target for Tracked {
                async fn call(&self, _args: duplex_rpc::message::Arguments, _cancel: CancelToken) -> Result<Value, TargetError> {
                    let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    self.max_observed.fetch_max(current, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(Value::Null)
                }
            }

            let in_flight = Arc::new(AtomicUsize::new(0));
            let max_observed = Arc::new(AtomicUsize::new(0));
            let dispatcher = Arc::new(Dispatcher::new(
                DispatcherConfig {
                    max_concurrent_inbound: Some(k),
                    ..DispatcherConfig::default()
                },
                duplex_rpc::dispatcher::identity_transform(),
            ));
            dispatcher.add_target(
                "slow",
                Tracked {
                    in_flight: in_flight.clone(),
                    max_observed: max_observed.clone(),
                },
                TargetOptions::default(),
            );

            let mut handles = Vec::new();
            for i in 0..requests {
                let dispatcher = dispatcher.clone();
                handles.push(tokio::spawn(async move {
                    let _permit = dispatcher.acquire_permit().await;
                    let request = Message::request(Id::number(i as u64), "slow", None);
                    dispatcher.dispatch(request, CancelToken::none()).await
                }));
            }
            for handle in handles {
                handle.await.unwrap();
            }

            prop_assert!(max_observed.load(Ordering::SeqCst) <= k);
            Ok(())
        })?;
    }
}
