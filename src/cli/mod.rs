//! Terminal front end

pub mod assets;
pub mod convert;
pub mod setup;
pub mod ui;
