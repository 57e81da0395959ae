//! mesh-registry — the authoritative table of live workers.
//!
//! Holds one [`WorkerRecord`] per worker id together with two bounded
//! rings: the last [`HISTORY_CAPACITY`] health samples and the last
//! [`REQUEST_LOG_CAPACITY`] routed requests. Every mutation is mirrored
//! to the [`StatusHub`] so dashboards can follow the table live.
//!
//! # Architecture
//!
//! ```text
//! Registry (Clone, Arc-backed)
//!   ├── RwLock<BTreeMap<id, WorkerEntry>>
//!   │     ├── WorkerRecord (id, address, port, status, handle)
//!   │     ├── Ring<HealthSample>      (cap 50)
//!   │     └── Ring<RequestLogEntry>   (cap 100)
//!   └── StatusHub ──► broadcast ──► SSE subscribers
//! ```
//!
//! Readers only ever receive owned snapshots; the map is never exposed.
//! Iteration order is the id order of the `BTreeMap`, which keeps
//! round-robin cursors stable across snapshots.

pub mod error;
pub mod events;
pub mod ring;
pub mod store;
pub mod types;

pub use error::{RegistryError, RegistryResult};
pub use events::{StatusEvent, StatusHub};
pub use ring::Ring;
pub use store::{HISTORY_CAPACITY, REQUEST_LOG_CAPACITY, Registry};
pub use types::*;
