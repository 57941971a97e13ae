pub mod check;
pub mod list;
pub mod setup;
pub mod simulate;
pub mod ui;
