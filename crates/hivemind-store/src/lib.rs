pub mod error;
pub mod journal;
pub mod memory;
pub mod store;

pub use error::StoreError;
pub use journal::Journal;
pub use memory::ResultCache;
pub use store::RoundStore;
