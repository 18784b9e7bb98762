#![warn(clippy::uninlined_format_args)]

pub mod clock;
pub mod member_registry;
pub mod memory_store;

pub use clock::{FixedClock, SystemClock};
pub use member_registry::InMemoryMemberRegistry;
pub use memory_store::InMemoryLedgerStore;
