//! HTTP request handlers.

pub mod common;
pub mod discovery;
pub mod health;
pub mod proxy;
pub mod selectors;
pub mod targets;

pub use discovery::*;
pub use health::*;
pub use proxy::*;
pub use selectors::*;
pub use targets::*;
