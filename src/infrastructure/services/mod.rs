pub mod lifecycle_service;

pub use lifecycle_service::{completion_check, CompletionCheck, LifecycleService};
