pub use super::extra_notes::Entity as ExtraNotes;
pub use super::reset_tokens::Entity as ResetTokens;
pub use super::settings::Entity as Settings;
pub use super::users::Entity as Users;
