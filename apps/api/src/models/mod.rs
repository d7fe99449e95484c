pub mod analysis;
pub mod session;
pub mod stats;
pub mod user;
