pub mod conformance;
mod config;
mod error;
mod feed;
mod file;
mod memory;
mod traits;
mod write;

pub use config::{open_store, StoreUrl};
pub use error::StorageError;
pub use feed::{ChangeCause, ChangeEvent, ChangeFeed, ChangeStream};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use traits::RecordStore;
