//! Plugin settings: names, defaults, access policy and storage

mod access;
mod keys;
mod store;

pub use access::*;
pub use keys::*;
pub use store::*;
