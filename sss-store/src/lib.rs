pub mod file;
pub mod guard;
pub mod memory;
pub mod store;

pub use file::{DEFAULT_DATA_PATH, FileStore};
pub use guard::StoreGuard;
pub use memory::MemoryStore;
pub use store::DataStore;
