//! Cross-entity fan-out.
//!
//! Runs one logical operation once per entity, each with that entity's own
//! credential, and merges the results and costs.

use futures::stream::{self, StreamExt, TryStreamExt};
use ghcache_core::{Cost, Credential, EngineConfig, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-entity results of a fan-out.
#[derive(Debug, Clone, Default)]
pub struct FanOutResult {
    pub results: BTreeMap<String, Arc<Value>>,
    pub cost: Cost,
}

/// Outer results with nested results attached to their items.
#[derive(Debug, Clone, Default)]
pub struct Merged {
    pub results: BTreeMap<String, Value>,
    pub cost: Cost,
}

/// Runs operations across entities under a fixed concurrency bound.
#[derive(Debug, Clone, Copy)]
pub struct FanOutAggregator {
    concurrency: usize,
}

impl FanOutAggregator {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.fan_out_concurrency)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `op` once per entity. The first failure fails the whole fan-out.
    pub async fn fan_out<F, Fut>(
        &self,
        credentials: &BTreeMap<String, Credential>,
        op: F,
    ) -> Result<FanOutResult>
    where
        F: Fn(String, Credential) -> Fut,
        Fut: Future<Output = Result<(Arc<Value>, Cost)>>,
    {
        let calls = credentials.iter().map(|(entity, credential)| {
            let call = op(entity.clone(), credential.clone());
            let entity = entity.clone();
            async move {
                match call.await {
                    Ok((value, cost)) => Ok((entity, value, cost)),
                    Err(e) => Err(e.for_entity(entity)),
                }
            }
        });

        let outcomes: Vec<(String, Arc<Value>, Cost)> = stream::iter(calls)
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        let mut merged = FanOutResult::default();
        for (entity, value, cost) in outcomes {
            merged.cost.merge(&cost);
            merged.results.insert(entity, value);
        }
        debug!(entities = merged.results.len(), remote_calls = merged.cost.remote_calls, "Fan-out complete");
        Ok(merged)
    }

    /// For every item of every entity's array in `outer`, run `op` with that
    /// entity's credential and attach its result to the item as `attach_as`.
    ///
    /// Items whose call fails, or whose entity has no credential, are kept
    /// without attached data. Non-object items and non-array results are
    /// kept unchanged.
    pub async fn fan_out_nested<F, Fut>(
        &self,
        outer: &FanOutResult,
        credentials: &BTreeMap<String, Credential>,
        attach_as: &str,
        op: F,
    ) -> Merged
    where
        F: Fn(String, Value, Credential) -> Fut,
        Fut: Future<Output = Result<(Arc<Value>, Cost)>>,
    {
        let mut calls = Vec::new();
        for (entity, value) in &outer.results {
            let Some(items) = value.as_array() else {
                continue;
            };
            let Some(credential) = credentials.get(entity) else {
                warn!(entity = %entity, "No credential for nested fan-out, items kept as-is");
                continue;
            };
            for (index, item) in items.iter().enumerate() {
                if !item.is_object() {
                    continue;
                }
                let call = op(entity.clone(), item.clone(), credential.clone());
                let entity = entity.clone();
                calls.push(async move { (entity, index, call.await) });
            }
        }

        let outcomes: Vec<_> = stream::iter(calls)
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut merged = Merged {
            results: outer
                .results
                .iter()
                .map(|(entity, value)| (entity.clone(), Value::clone(value)))
                .collect(),
            cost: outer.cost.clone(),
        };

        for (entity, index, outcome) in outcomes {
            match outcome {
                Ok((value, cost)) => {
                    merged.cost.merge(&cost);
                    let item = merged
                        .results
                        .get_mut(&entity)
                        .and_then(|v| v.get_mut(index))
                        .and_then(Value::as_object_mut);
                    if let Some(item) = item {
                        item.insert(attach_as.to_string(), Value::clone(&value));
                    }
                }
                Err(e) => {
                    warn!(entity = %entity, index, error = %e, "Nested call failed, item kept without data");
                }
            }
        }
        merged
    }
}

impl Default for FanOutAggregator {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
