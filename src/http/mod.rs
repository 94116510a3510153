//! HTTP layer: the axum router serving the Git smart-HTTP bridge, the
//! internal repository API and the operational endpoints.

pub mod handler;
pub mod repos;
