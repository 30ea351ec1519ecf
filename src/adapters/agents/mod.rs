//! Agent capability adapters.

pub mod mock;

pub use mock::{MockAgent, MockResponse};
