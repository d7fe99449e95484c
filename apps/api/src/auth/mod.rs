// Passwordless sign-in: magic-link tokens, database sessions, first-login
// provisioning. Route handlers live in `handlers`; everything else is plain
// functions over the `IdentityStore` trait.

pub mod handlers;
pub mod provisioning;
pub mod service;
pub mod session;
pub mod store;
pub mod sweep;
pub mod tokens;
