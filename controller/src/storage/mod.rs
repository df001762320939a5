pub mod layout;
pub mod params;
pub mod settings;
