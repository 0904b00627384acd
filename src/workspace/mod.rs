//! The workspace repository: the only component allowed to write to a
//! project's `.roady/` directory.

pub mod repository;
pub mod types;

pub use repository::WorkspaceRepository;
