pub mod store;

pub use store::{GradingStore, MemoryStore};
