//! Asynchronous facade over the synchronous engine.
//!
//! The request layer is cooperative with many in-flight calls, while the
//! engine blocks on store I/O and worker acquisition; each call is
//! offloaded to the blocking thread pool so the request loop never stalls.
use std::sync::Arc;

use tokio::task;
use tracing::error;

use crate::{
    engine_state::{EngineState, Error, ViewRequest, ViewSuccess},
    storage::VersionedStore,
};

/// Shared handle to the engine for asynchronous request handlers.
pub struct ViewService<S> {
    engine: Arc<EngineState<S>>,
}

impl<S> Clone for ViewService<S> {
    fn clone(&self) -> Self {
        ViewService {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<S> ViewService<S>
where
    S: VersionedStore + 'static,
{
    /// Wraps an engine in a service handle.
    pub fn new(engine: Arc<EngineState<S>>) -> Self {
        ViewService { engine }
    }

    /// The underlying engine.
    pub fn engine(&self) -> &Arc<EngineState<S>> {
        &self.engine
    }

    /// Executes one view call without blocking the async runtime.
    pub async fn view(&self, request: ViewRequest) -> Result<ViewSuccess, Error> {
        let engine = Arc::clone(&self.engine);
        match task::spawn_blocking(move || engine.run_view(request)).await {
            Ok(result) => result,
            Err(join_error) => {
                error!(%join_error, "view task failed to complete");
                Err(Error::Transient {
                    message: "view task failed to complete".to_string(),
                })
            }
        }
    }
}
