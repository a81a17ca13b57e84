//! Common test utilities and fixtures.

pub mod fixtures;
pub mod identity;
pub mod server;

#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use identity::*;
#[allow(unused_imports)]
pub use server::*;
