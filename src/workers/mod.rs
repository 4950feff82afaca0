pub mod expiry_sweeper;

pub use expiry_sweeper::{expiry_sweeper_worker, sweep_expired_contexts};
