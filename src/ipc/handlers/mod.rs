pub mod analytics;
pub mod core;
pub mod dashboard;
pub mod electives;
pub mod roster;
pub mod submissions;
