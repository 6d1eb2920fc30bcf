//! The view-call coordinator.
//!
//! [`EngineState`] is the explicit engine value owning the store handle,
//! the state resolver, the module cache and the worker pool; the request
//! layer holds a shared handle to it and is oblivious to everything below.
pub mod engine_config;
pub mod error;
pub(crate) mod module_cache;

use std::{sync::Arc, time::Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
    execution::{Job, WorkerPool},
    shared::wasm_prep,
    storage::{Snapshot, StateResolver, VersionedStore},
};
pub use engine_config::EngineConfig;
pub use error::Error;
use module_cache::ModuleCache;

/// A view call to execute: deterministic, read-only method invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRequest {
    /// The contract whose method is invoked.
    pub contract_id: String,
    /// Name of the exported method.
    pub method_name: String,
    /// Opaque argument blob surfaced to the guest through `input`.
    pub args: Vec<u8>,
}

/// The outputs of a successful view call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSuccess {
    /// Bytes the guest passed to `value_return`; empty if it never did.
    pub result: Vec<u8>,
    /// Log entries in emission order.
    pub logs: Vec<String>,
    /// The block height the call was pinned to.
    pub block_height: u64,
}

/// The engine answering view calls from the versioned store.
pub struct EngineState<S> {
    config: EngineConfig,
    resolver: Arc<StateResolver<S>>,
    module_cache: ModuleCache,
    pool: WorkerPool<S>,
}

impl<S> EngineState<S>
where
    S: VersionedStore + 'static,
{
    /// Creates an engine over `store`, eagerly spawning the worker pool.
    pub fn new(store: Arc<S>, config: EngineConfig) -> EngineState<S> {
        let resolver = Arc::new(StateResolver::new(
            store,
            config.latest_height_ttl(),
            config.store_retries,
        ));
        let pool = WorkerPool::new(config.worker_count, config.max_memory_pages);
        EngineState {
            config,
            resolver,
            module_cache: ModuleCache::default(),
            pool,
        }
    }

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Executes one view call.
    ///
    /// Pins the latest indexed height, resolves and compiles the
    /// contract's code as of that height, then runs the method in a pooled
    /// worker against a snapshot of storage at the pinned height.
    pub fn run_view(&self, request: ViewRequest) -> Result<ViewSuccess, Error> {
        let ViewRequest {
            contract_id,
            method_name,
            args,
        } = request;
        let deadline = Instant::now() + self.config.call_timeout();

        let block_height = self.resolver.latest_height()?;
        let revision = self
            .resolver
            .code_revision(&contract_id, block_height)?
            .ok_or_else(|| Error::CodeNotFound {
                contract_id: contract_id.clone(),
            })?;
        debug!(
            %contract_id,
            %method_name,
            block_height,
            revision = %base16::encode_lower(&revision),
            "executing view call"
        );

        let module = self
            .module_cache
            .get_or_compile(&contract_id, &revision, || {
                let blob = self
                    .resolver
                    .code_blob(&contract_id, &revision)?
                    .ok_or_else(|| Error::CodeNotFound {
                        contract_id: contract_id.clone(),
                    })?;
                trace!(%contract_id, blob_len = blob.len(), "compiling module");
                wasm_prep::preprocess(
                    self.config.max_memory_pages,
                    self.config.max_stack_height,
                    &blob,
                )
                .map_err(|preprocessing_error| Error::CodeCompilation {
                    message: preprocessing_error.to_string(),
                })
            })?;

        if Instant::now() >= deadline {
            return Err(Error::Timeout);
        }

        let snapshot = Snapshot::new(Arc::clone(&self.resolver), block_height);
        let output = self.pool.execute(Job {
            module,
            contract_id,
            method_name,
            input: args,
            block_height,
            snapshot,
            deadline,
        })?;

        Ok(ViewSuccess {
            result: output.result,
            logs: output.logs,
            block_height: output.block_height,
        })
    }
}
