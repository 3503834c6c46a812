pub mod error;
pub mod memory;
pub mod sqlite;

pub use error::StoreError;
pub use memory::DistanceCache;
pub use sqlite::QuoteLedger;
