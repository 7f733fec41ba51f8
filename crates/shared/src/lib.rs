pub mod domain;
pub mod error;
pub mod lobby;
pub mod protocol;
