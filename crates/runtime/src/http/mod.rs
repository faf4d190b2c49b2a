//! The request side: engine seam, retrying executor and bounded gateway.

mod engine;
mod executor;
mod gateway;
mod reqwest_engine;

pub(crate) use engine::error_chain;
pub use engine::{EngineError, HttpEngine, HttpRequest, RawResponse};
pub use executor::RequestExecutor;
pub use gateway::RequestGateway;
pub use reqwest_engine::ReqwestEngine;
