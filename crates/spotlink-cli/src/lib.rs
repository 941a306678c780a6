//! Spotlink CLI - Spotify session host and link resolver
//!
//! Argument parsing, settings and the host logic live here so they build
//! and test without the native library. `main.rs` binds them to libspotify.

pub mod cli;
pub mod host;
pub mod settings;

pub use cli::{ Args, Command };
pub use settings::Settings;
