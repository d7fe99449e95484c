// Read-only access to analysis documents produced by the tailoring pipeline.

pub mod handlers;
pub mod store;
