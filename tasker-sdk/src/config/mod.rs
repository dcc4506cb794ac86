//! User-facing configuration records shared with the settings screens.

mod settings;

pub use settings::NotificationSettings;
