pub mod currency_api;

pub use currency_api::{CurrencyApiProvider, SnapshotCache};
