//! Catalog storage
//!
//! The document store port, its memory and file implementations, the typed
//! [`Catalog`] facade and the bundled defaults used to seed an empty store.

mod file;
mod memory;
mod repository;
pub mod seed;
mod store;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use repository::{Catalog, CatalogSnapshot};
pub use store::{CatalogStore, Collection};
