pub mod lock;
pub mod process;
