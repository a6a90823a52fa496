//! Rudder State Management
//!
//! This crate persists the last confirmed state of every managed resource and
//! answers the declared-state queries the reconciler needs: whether a field
//! changed, and which remote identifier a resource currently has.
//!
//! # Overview
//!
//! - **StateFile**: the main state structure containing all managed resources
//! - **ResourceState**: one resource's confirmed snapshot and identifier
//! - **StateBackend**: a trait for state storage backends (local file)
//! - **LockInfo**: information about state locks
//!
//! # Example
//!
//! ```ignore
//! use rudder_state::{create_backend, BackendConfig};
//!
//! let backend = create_backend(&BackendConfig::local())?;
//! let lock = backend.acquire_lock("apply").await?;
//!
//! let mut state = backend.read_state().await?.unwrap_or_default();
//! let result = interpreter.apply(&plan).await;
//! if state.record_apply("apsarastack", &result) {
//!     backend.write_state(&state).await?;
//! }
//!
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

pub use backend::{BackendConfig, BackendError, BackendResult, StateBackend};
pub use backends::{LocalBackend, create_backend};
pub use lock::LockInfo;
pub use state::{ResourceState, StateFile};
