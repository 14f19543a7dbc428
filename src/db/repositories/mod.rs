pub mod notes;
pub mod settings;
pub mod token;
pub mod user;
