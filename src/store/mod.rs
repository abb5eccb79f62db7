pub mod datastore;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod registry;
pub mod scoped;

pub use datastore::Datastore;
pub use error::{OperationKind, StoreError};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use registry::EntityRegistry;
pub use scoped::ScopedStore;
