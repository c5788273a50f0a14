//! Property tests for the resource store.
//!
//! For any sequence of mutations, the store must equal the fold of those
//! mutations under last-writer-wins by name, and the version counter must
//! advance exactly once per notification-producing mutation.

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;

use glue_core::{Resource, ResourceError};
use glue_manager::{Manager, UpdateContext};

const TEST_TYPE: &str = "type.googleapis.com/test.Cluster";

#[derive(Debug, Clone)]
struct TestResource {
    name: String,
    weight: u32,
}

impl Resource for TestResource {
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn validate(&self) -> Result<(), ResourceError> {
        Ok(())
    }

    fn encode(&self) -> Result<prost_types::Any, ResourceError> {
        Ok(prost_types::Any {
            type_url: TEST_TYPE.to_string(),
            value: self.weight.to_le_bytes().to_vec(),
        })
    }

    fn to_json(&self, _emit_defaults: bool) -> Result<serde_json::Value, ResourceError> {
        Ok(serde_json::json!({ "name": self.name, "weight": self.weight }))
    }
}

fn boxed(name: &str, weight: u32) -> glue_core::BoxResource {
    Arc::new(TestResource {
        name: name.to_string(),
        weight,
    })
}

#[derive(Debug, Clone)]
enum Op {
    Add(Vec<(String, u32)>),
    Replace(Vec<(String, u32)>),
    Delete(String),
}

fn name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "d", "e"]).prop_map(String::from)
}

fn batch_strategy() -> impl Strategy<Value = Vec<(String, u32)>> {
    prop::collection::vec((name_strategy(), any::<u32>()), 0..4)
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        batch_strategy().prop_map(Op::Add),
        batch_strategy().prop_map(Op::Replace),
        name_strategy().prop_map(Op::Delete),
    ]
}

/// Apply an op to the reference model, returning whether it must bump the
/// version counter.
fn apply_to_model(model: &mut BTreeMap<String, u32>, op: &Op) -> bool {
    match op {
        Op::Add(batch) => {
            for (name, weight) in batch {
                model.insert(name.clone(), *weight);
            }
            !batch.is_empty()
        }
        Op::Replace(batch) => {
            let was_empty = model.is_empty();
            let mut next = BTreeMap::new();
            for (name, weight) in batch {
                next.insert(name.clone(), *weight);
            }
            *model = next;
            !(was_empty && batch.is_empty())
        }
        Op::Delete(name) => model.remove(name).is_some(),
    }
}

async fn apply_to_manager(manager: &Manager, ctx: &UpdateContext, op: &Op) {
    match op {
        Op::Add(batch) => {
            let resources = batch
                .iter()
                .map(|(name, weight)| boxed(name, *weight))
                .collect();
            manager.add(ctx, resources).await.expect("add");
        }
        Op::Replace(batch) => {
            let resources = batch
                .iter()
                .map(|(name, weight)| boxed(name, *weight))
                .collect();
            manager.replace(ctx, resources).await.expect("replace");
        }
        Op::Delete(name) => {
            manager.delete(ctx, name).await.expect("delete");
        }
    }
}

proptest! {
    #[test]
    fn store_is_last_writer_wins_fold(ops in prop::collection::vec(op_strategy(), 0..24)) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");

        rt.block_on(async {
            let manager = Manager::new("prop", "v", TEST_TYPE);
            let ctx = UpdateContext::new();
            let mut model = BTreeMap::new();
            let mut expected_version = 0u64;

            for op in &ops {
                apply_to_manager(&manager, &ctx, op).await;
                if apply_to_model(&mut model, op) {
                    expected_version += 1;
                }
            }

            let keys: Vec<String> = model.keys().cloned().collect();
            prop_assert_eq!(manager.list_keys().await, keys);

            let listed = manager.list().await;
            for (resource, (name, weight)) in listed.iter().zip(model.iter()) {
                let any = resource.encode().expect("encode");
                prop_assert_eq!(&any.value, &weight.to_le_bytes().to_vec(), "payload for {}", name);
            }

            prop_assert_eq!(manager.current_version().await, expected_version);
            Ok(())
        })?;
    }

    #[test]
    fn replace_then_list_round_trips(batch in batch_strategy()) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");

        rt.block_on(async {
            let manager = Manager::new("prop", "v", TEST_TYPE);
            let ctx = UpdateContext::new();

            let resources = batch
                .iter()
                .map(|(name, weight)| boxed(name, *weight))
                .collect();
            manager.replace(&ctx, resources).await.expect("replace");

            let mut expected: BTreeMap<String, u32> = BTreeMap::new();
            for (name, weight) in &batch {
                expected.insert(name.clone(), *weight);
            }

            let keys: Vec<String> = expected.keys().cloned().collect();
            prop_assert_eq!(manager.list_keys().await, keys);
            Ok(())
        })?;
    }
}
