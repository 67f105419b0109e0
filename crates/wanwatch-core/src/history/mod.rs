// # History Store Implementations
//
// Implementations of the HistoryStore trait.

pub mod file;
pub mod memory;

pub use file::FileHistoryStore;
pub use memory::MemoryHistoryStore;
