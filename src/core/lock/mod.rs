pub mod external;
pub mod named;
pub mod registry;
pub mod synchronized;

pub use external::ExternalLock;
pub use named::{
    DEFAULT_DELAY, LockOptions, NamedLock, external_lock, internal_lock, lock, lock_file_path,
    remove_external_lock_file,
};
pub use registry::{LockEntry, LockHandle, LockRegistry, sanitize_name};
pub use synchronized::{Synchronized, synchronized};
