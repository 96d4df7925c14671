pub mod attendance;
pub mod bulk;
pub mod calendar;
pub mod core;
pub mod marksheets;
pub mod students;
