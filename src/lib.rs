//! The engine which answers read-only contract view calls from a
//! pre-indexed versioned key-value store.
//!
//! A view call pins the latest indexed block height, resolves the
//! contract's bytecode as of that height, and runs the requested method in
//! a sandboxed worker whose host bridge serves storage reads from a
//! snapshot of state at the pinned height. The heavyweight canonical node
//! only sees traffic this engine cannot answer (write paths,
//! cross-contract calls), which callers detect through the
//! `notImplemented` error tag.
#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_qualifications
)]

pub mod engine_state;
pub mod execution;
pub mod resolvers;
pub mod runtime;
pub mod service;
pub mod shared;
pub mod storage;

pub use engine_state::{EngineConfig, EngineState, Error, ViewRequest, ViewSuccess};
pub use service::ViewService;
