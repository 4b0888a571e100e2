pub mod loader;
pub mod providers;
pub mod settings;
