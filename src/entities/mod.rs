pub mod prelude;

pub mod extra_notes;
pub mod reset_tokens;
pub mod settings;
pub mod users;
