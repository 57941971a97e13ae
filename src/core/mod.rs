//! Core business logic abstractions

pub mod alert;
pub mod cache;
pub mod config;
pub mod history;
pub mod log;
pub mod notify;
pub mod rates;
pub mod runner;
pub mod store;

// Re-export main types for cleaner imports
pub use alert::{Alert, AlertRule, Comparator};
pub use notify::{AlertNotification, Notifier};
pub use rates::{RateDate, RateError, RateSnapshot, RateSource};
pub use store::AlertStore;
