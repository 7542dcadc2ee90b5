pub mod config;
pub mod denoise;

pub use self::config::get_config;
pub use denoise::denoise;
