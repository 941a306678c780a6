//! Persistent settings
//!
//! Read from `<config dir>/spotlink/settings.json`. Command-line flags take
//! precedence over anything stored here.

use std::fs;
use std::path::{ Path, PathBuf };

use anyhow::{ Context, Result };
use serde::{ Deserialize, Serialize };


/// CLI settings.
#[derive( Debug, Clone, Serialize, Deserialize, PartialEq )]
#[serde( default )]
pub struct Settings {
    /// Application key file
    pub key_file: PathBuf,

    pub cache_location: Option<PathBuf>,
    pub settings_location: Option<PathBuf>,
    pub user_agent: Option<String>,

    /// Upper bound on the wait between event pumps
    pub max_pump_interval_ms: Option<u64>,

    pub verbose: bool,
}


impl Default for Settings {
    fn default() -> Self {
        Self {
            key_file: PathBuf::from( "spotify_appkey.key" ),
            cache_location: None,
            settings_location: None,
            user_agent: None,
            max_pump_interval_ms: None,
            verbose: false,
        }
    }
}


impl Settings {
    /// Returns the path to the settings file.
    pub fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "spotlink" ).join( "settings.json" ) )
    }


    /// Loads settings from disk. A missing file yields defaults.
    ///
    /// Called before logging is set up, so failures are returned rather
    /// than logged here.
    pub fn load() -> Result<Self> {
        match Self::settings_path() {
            Some( path ) => Self::load_from( &path ),
            None => Ok( Self::default() ),
        }
    }


    /// Loads settings from `path`. A missing file yields defaults.
    pub fn load_from( path: &Path ) -> Result<Self> {
        if !path.exists() {
            return Ok( Self::default() );
        }

        let contents = fs::read_to_string( path )
            .with_context( || format!( "Failed to read settings {:?}", path ) )?;
        serde_json::from_str( &contents )
            .with_context( || format!( "Malformed settings {:?}", path ) )
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use tempfile::tempdir;


    #[test]
    fn test_missing_file_gives_defaults() {
        let settings = Settings::load_from( Path::new( "/nonexistent/spotlink/settings.json" ) ).unwrap();
        assert_eq!( settings, Settings::default() );
    }


    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, r#"{ "max_pump_interval_ms": 250, "verbose": true }"# ).unwrap();

        let settings = Settings::load_from( &path ).unwrap();

        assert_eq!( settings.max_pump_interval_ms, Some( 250 ) );
        assert!( settings.verbose );
        assert_eq!( settings.key_file, PathBuf::from( "spotify_appkey.key" ) );
    }


    #[test]
    fn test_malformed_file_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join( "settings.json" );
        fs::write( &path, "not json" ).unwrap();

        let error = Settings::load_from( &path ).unwrap_err();

        assert!( format!( "{:#}", error ).contains( "Malformed settings" ) );
    }
}
