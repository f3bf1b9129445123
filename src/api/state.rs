// State verification
//
// Runs view calls, namespace checks, explicit slot checks and schema-resolved
// storage paths against one contract. The four categories run concurrently and
// so does every item inside a category; results come back in configuration
// order and a failing item never affects its siblings.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use common::CheckStatus;
use ethers::abi::Abi;
use ethers::types::Address;
use log::{debug, warn};
use serde_json::Value;
use tokio::task::JoinSet;

use crate::api::types::{StateVerificationConfig, StateVerificationResult, ViewCallConfig, ViewCallResult};
use crate::compare::{abbreviate, compare_values};
use crate::error::VerifyError;
use crate::ethereum::{token_to_value, ChainAdapter};
use crate::storage::{
    verify_namespace, verify_slot, verify_storage_path, NamespaceConfig, NamespaceResult, SlotConfig, SlotResult,
    StoragePathConfig, StoragePathResult, StorageSchema,
};

const TASK_LOST: &str = "check task did not complete";

/// Shared inputs of one contract's state checks
#[derive(Clone)]
pub struct StateContext {
    pub adapter: Arc<dyn ChainAdapter>,
    pub address: Address,
    pub abi: Arc<Abi>,
    /// Schema for storage paths, or why none is available
    pub schema: Result<Arc<StorageSchema>, String>,
}

/// Runs every configured state check and aggregates them
pub async fn verify_state(context: StateContext, config: &StateVerificationConfig) -> StateVerificationResult {
    let (view_call_results, namespace_results, slot_results, storage_path_results) = tokio::join!(
        run_view_calls(&context, &config.view_calls),
        run_namespaces(&context, &config.namespaces),
        run_slots(&context, &config.slots),
        run_storage_paths(&context, &config.storage_paths),
    );

    let mut result = StateVerificationResult {
        status: CheckStatus::Skip,
        message: String::new(),
        view_call_results,
        namespace_results,
        slot_results,
        storage_path_results,
    };

    let statuses = result.statuses();
    let passed = statuses.iter().filter(|status| status.is_pass()).count();
    let total = statuses.len();

    (result.status, result.message) = if total == 0 {
        (CheckStatus::Skip, "No state checks configured".to_string())
    } else if passed == total {
        (CheckStatus::Pass, format!("All {} state checks passed", total))
    } else {
        (CheckStatus::Fail, format!("{}/{} state checks passed", passed, total))
    };
    debug!("State verification of {:?}: {}", context.address, result.message);

    result
}

/// Calls a view function and compares its decoded output
pub async fn execute_view_call(
    adapter: &dyn ChainAdapter,
    address: Address,
    abi: &Abi,
    config: &ViewCallConfig,
) -> ViewCallResult {
    if abi.function(&config.function).is_err() {
        return failed_call(config, VerifyError::FunctionNotFound(config.function.clone()).to_string());
    }

    let actual = match call_view(adapter, address, abi, config).await {
        Ok(actual) => actual,
        Err(e) => return failed_call(config, format!("Call failed: {:#}", e)),
    };

    let pass = compare_values(&actual, &config.expected, config.comparison);
    let message = if pass {
        format!("{}() = {}", config.function, abbreviate(&actual, 8))
    } else {
        format!(
            "Expected {}, got {}",
            abbreviate(&config.expected, 8),
            abbreviate(&actual, 8)
        )
    };

    ViewCallResult {
        function: config.function.clone(),
        expected: config.expected.clone(),
        actual: Some(actual),
        status: CheckStatus::from_pass(pass),
        message,
    }
}

async fn call_view(adapter: &dyn ChainAdapter, address: Address, abi: &Abi, config: &ViewCallConfig) -> Result<Value> {
    let calldata = adapter.encode_function_data(abi, &config.function, &config.params)?;
    let output = adapter.call(address, calldata).await?;
    let tokens = adapter.decode_function_result(abi, &config.function, &output)?;

    let mut values: Vec<Value> = tokens.iter().map(|token| token_to_value(adapter, token)).collect();
    Ok(if values.len() == 1 {
        values.remove(0)
    } else {
        Value::Array(values)
    })
}

fn failed_call(config: &ViewCallConfig, message: String) -> ViewCallResult {
    ViewCallResult {
        function: config.function.clone(),
        expected: config.expected.clone(),
        actual: None,
        status: CheckStatus::Fail,
        message,
    }
}

async fn run_view_calls(context: &StateContext, calls: &[ViewCallConfig]) -> Vec<ViewCallResult> {
    let tasks = calls
        .iter()
        .cloned()
        .map(|call| {
            let context = context.clone();
            async move { execute_view_call(&*context.adapter, context.address, &context.abi, &call).await }
        })
        .collect();

    join_ordered(tasks, |index| failed_call(&calls[index], format!("Call failed: {}", TASK_LOST))).await
}

async fn run_namespaces(context: &StateContext, namespaces: &[NamespaceConfig]) -> Vec<NamespaceResult> {
    let tasks = namespaces
        .iter()
        .cloned()
        .map(|namespace| {
            let context = context.clone();
            async move { verify_namespace(&*context.adapter, context.address, &namespace).await }
        })
        .collect();

    join_ordered(tasks, |index| NamespaceResult {
        namespace_id: namespaces[index].id.clone(),
        base_slot: "error".to_string(),
        variables: Vec::new(),
        status: CheckStatus::Fail,
        message: TASK_LOST.to_string(),
    })
    .await
}

async fn run_slots(context: &StateContext, slots: &[SlotConfig]) -> Vec<SlotResult> {
    let tasks = slots
        .iter()
        .cloned()
        .map(|slot| {
            let context = context.clone();
            async move { verify_slot(&*context.adapter, context.address, &slot).await }
        })
        .collect();

    join_ordered(tasks, |index| SlotResult {
        slot: slots[index].slot.clone(),
        name: slots[index].name.clone(),
        expected: slots[index].expected.clone(),
        actual: None,
        status: CheckStatus::Fail,
        message: format!("Failed to read slot: {}", TASK_LOST),
    })
    .await
}

async fn run_storage_paths(context: &StateContext, paths: &[StoragePathConfig]) -> Vec<StoragePathResult> {
    let failed = |config: &StoragePathConfig, message: String| StoragePathResult {
        path: config.path.clone(),
        computed_slot: "error".to_string(),
        solidity_type: "unknown".to_string(),
        expected: config.expected.clone(),
        actual: None,
        status: CheckStatus::Fail,
        message,
    };

    let schema = match &context.schema {
        Ok(schema) => schema.clone(),
        Err(reason) => {
            return paths
                .iter()
                .map(|config| failed(config, format!("Error: {}", reason)))
                .collect()
        }
    };

    let tasks = paths
        .iter()
        .cloned()
        .map(|path| {
            let context = context.clone();
            let schema = schema.clone();
            async move { verify_storage_path(&*context.adapter, context.address, &path, &schema).await }
        })
        .collect();

    join_ordered(tasks, |index| failed(&paths[index], format!("Error: {}", TASK_LOST))).await
}

/// Spawns every task on a `JoinSet` and returns the outputs in input order.
///
/// A task that panics or is cancelled is replaced by `fallback(index)`.
async fn join_ordered<T, F>(tasks: Vec<F>, fallback: impl Fn(usize) -> T) -> Vec<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let count = tasks.len();
    let mut set = JoinSet::new();
    for (index, task) in tasks.into_iter().enumerate() {
        set.spawn(async move { (index, task.await) });
    }

    let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(count).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, output)) => slots[index] = Some(output),
            Err(e) => warn!("State check task failed: {}", e),
        }
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| slot.unwrap_or_else(|| fallback(index)))
        .collect()
}
