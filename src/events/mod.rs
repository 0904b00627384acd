//! The append-only event stream: hash-chained storage, an in-process
//! publisher, and the replayable projections built on top of it.

pub mod projections;
pub mod publisher;
pub mod store;

pub use publisher::Publisher;
pub use store::EventStore;
