pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{filesystem_backend, png_bytes, SIGNING_SECRET};
