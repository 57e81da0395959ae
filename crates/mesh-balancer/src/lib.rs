//! mesh-balancer — routes client work to healthy workers with failover.
//!
//! The balancer never reads the registry on the request path. A refresh
//! loop copies the healthy subset into a local [`WorkerCache`]; requests
//! route over that cache, which may be stale by up to one refresh
//! interval. A worker that died in between is simply a failed attempt.
//!
//! # Routing
//!
//! ```text
//! route(work)
//!   cache empty              → BalancerError::NoInstances
//!   while idx = cursor.next_untried(tried):   (shared, atomic)
//!       forward(work) with timeout
//!         2xx  → relay body + content type, done
//!         else → log, optional backoff, next candidate
//!   all failed               → BalancerError::AllFailed { attempts }
//! ```
//!
//! One client call reaches each worker at most once and makes at most
//! `len(cache)` attempts.

pub mod balancer;
pub mod cache;
pub mod cursor;
pub mod error;
pub mod forward;

pub use balancer::{LoadBalancer, RoutingOptions};
pub use cache::{CachedWorker, WorkerCache};
pub use cursor::FailoverCursor;
pub use error::{AttemptFailure, BalancerError, ForwardError};
pub use forward::{WorkRequest, WorkResponse, forward};
