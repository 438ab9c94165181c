//! Preview sessions: the registry, per-file live state and the watch loops
//! that keep renders current.

pub mod live;
pub mod registry;
pub mod watcher;

pub use live::{Session, Subscription};
pub use registry::{registered_path, session_id, Registry, RegistryError, RegistryStats};
pub use watcher::WatchSettings;
