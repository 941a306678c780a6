//! Session configuration
//!
//! Builds the one-shot configuration a session is created from. The native
//! library keeps pointers into these buffers, so a [`SessionConfig`] owns
//! every one of them and must outlive the session.

use std::ffi::CString;
use std::fs;
use std::path::{ Path, PathBuf };

use thiserror::Error;

use crate::native::API_VERSION;


/// User agent reported when none is configured.
pub const DEFAULT_USER_AGENT: &str = "spotlink";


/// Errors that can occur while assembling a session configuration.
#[derive( Debug, Error )]
pub enum ConfigError {
    #[error( "Failed to read application key {path:?}: {source}" )]
    KeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error( "Application key {0:?} is empty" )]
    EmptyKey( PathBuf ),

    #[error( "No {0} configured and no default available" )]
    MissingPath( &'static str ),

    #[error( "{0} contains an interior NUL byte" )]
    InteriorNul( &'static str ),

    #[error( "{0} is not valid Unicode" )]
    NonUnicodePath( &'static str ),

    #[error( "Client has not been configured" )]
    NotConfigured,
}


/// Immutable configuration handed to the native library at session creation.
#[derive( Debug )]
pub struct SessionConfig {
    api_version: i32,
    cache_location: CString,
    settings_location: CString,
    application_key: Vec<u8>,
    user_agent: CString,
}


impl SessionConfig {
    pub fn api_version( &self ) -> i32 {
        self.api_version
    }


    pub fn cache_location( &self ) -> &CString {
        &self.cache_location
    }


    pub fn settings_location( &self ) -> &CString {
        &self.settings_location
    }


    /// The raw application key bytes.
    pub fn credential( &self ) -> &[u8] {
        &self.application_key
    }


    pub fn credential_len( &self ) -> usize {
        self.application_key.len()
    }


    pub fn user_agent( &self ) -> &CString {
        &self.user_agent
    }
}


/// Assembles a [`SessionConfig`] from a key file and optional locations.
#[derive( Debug, Clone )]
pub struct SessionConfigBuilder {
    key_file: PathBuf,
    cache_location: Option<PathBuf>,
    settings_location: Option<PathBuf>,
    user_agent: String,
}


impl SessionConfigBuilder {
    /// Starts a builder for the given application key file.
    pub fn new( key_file: impl Into<PathBuf> ) -> Self {
        Self {
            key_file: key_file.into(),
            cache_location: None,
            settings_location: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }


    pub fn cache_location( mut self, path: impl Into<PathBuf> ) -> Self {
        self.cache_location = Some( path.into() );
        self
    }


    pub fn settings_location( mut self, path: impl Into<PathBuf> ) -> Self {
        self.settings_location = Some( path.into() );
        self
    }


    pub fn user_agent( mut self, user_agent: impl Into<String> ) -> Self {
        self.user_agent = user_agent.into();
        self
    }


    pub fn key_file( &self ) -> &Path {
        &self.key_file
    }


    /// Reads the key file and produces the configuration.
    ///
    /// @returns The configuration, or an error if the key is unreadable or empty
    pub fn build( &self ) -> Result<SessionConfig, ConfigError> {
        let application_key = fs::read( &self.key_file ).map_err( |source| ConfigError::KeyFile {
            path: self.key_file.clone(),
            source,
        })?;

        if application_key.is_empty() {
            return Err( ConfigError::EmptyKey( self.key_file.clone() ) );
        }

        let cache_location = self.cache_location.clone()
            .or_else( || dirs::cache_dir().map( |p| p.join( "spotlink" ) ) )
            .ok_or( ConfigError::MissingPath( "cache location" ) )?;
        let settings_location = self.settings_location.clone()
            .or_else( || dirs::config_dir().map( |p| p.join( "spotlink" ) ) )
            .ok_or( ConfigError::MissingPath( "settings location" ) )?;

        tracing::debug!(
            "Session config: key {:?} ({} bytes), cache {:?}, settings {:?}",
            self.key_file,
            application_key.len(),
            cache_location,
            settings_location
        );

        Ok( SessionConfig {
            api_version: API_VERSION,
            cache_location: path_to_cstring( &cache_location, "cache location" )?,
            settings_location: path_to_cstring( &settings_location, "settings location" )?,
            application_key,
            user_agent: CString::new( self.user_agent.as_str() )
                .map_err( |_| ConfigError::InteriorNul( "user agent" ) )?,
        })
    }
}


/// Converts a path byte for byte; the native library opens it as given.
fn path_to_cstring( path: &Path, what: &'static str ) -> Result<CString, ConfigError> {
    CString::new( path_bytes( path, what )? ).map_err( |_| ConfigError::InteriorNul( what ) )
}


#[cfg( unix )]
fn path_bytes( path: &Path, _what: &'static str ) -> Result<Vec<u8>, ConfigError> {
    use std::os::unix::ffi::OsStrExt;

    Ok( path.as_os_str().as_bytes().to_vec() )
}


#[cfg( not( unix ) )]
fn path_bytes( path: &Path, what: &'static str ) -> Result<Vec<u8>, ConfigError> {
    path.to_str()
        .map( |s| s.as_bytes().to_vec() )
        .ok_or( ConfigError::NonUnicodePath( what ) )
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::io::Write;

    use tempfile::{ tempdir, NamedTempFile };


    fn key_file( contents: &[u8] ) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all( contents ).unwrap();
        file
    }


    #[test]
    fn test_build_credential_length_matches_file() {
        let key: Vec<u8> = ( 0..=255u8 ).cycle().take( 321 ).collect();
        let file = key_file( &key );

        let config = SessionConfigBuilder::new( file.path() )
            .cache_location( "/tmp/cache" )
            .settings_location( "/tmp/settings" )
            .build()
            .unwrap();

        assert_eq!( config.credential_len(), 321 );
        assert_eq!( config.credential(), key.as_slice() );
        assert_eq!( config.api_version(), 1 );
    }


    #[test]
    fn test_build_keeps_locations_and_user_agent() {
        let file = key_file( b"key" );

        let config = SessionConfigBuilder::new( file.path() )
            .cache_location( "/var/cache/spot" )
            .settings_location( "/etc/spot" )
            .user_agent( "Spotify Url Checker" )
            .build()
            .unwrap();

        assert_eq!( config.cache_location().to_str().unwrap(), "/var/cache/spot" );
        assert_eq!( config.settings_location().to_str().unwrap(), "/etc/spot" );
        assert_eq!( config.user_agent().to_str().unwrap(), "Spotify Url Checker" );
    }


    #[test]
    fn test_build_default_user_agent() {
        let file = key_file( b"key" );
        let config = SessionConfigBuilder::new( file.path() )
            .cache_location( "c" )
            .settings_location( "s" )
            .build()
            .unwrap();

        assert_eq!( config.user_agent().to_str().unwrap(), DEFAULT_USER_AGENT );
    }


    #[test]
    fn test_build_missing_key_file() {
        let dir = tempdir().unwrap();
        let result = SessionConfigBuilder::new( dir.path().join( "missing.key" ) ).build();
        assert!( matches!( result, Err( ConfigError::KeyFile { .. } ) ) );
    }


    #[test]
    fn test_build_empty_key_file() {
        let file = key_file( b"" );
        let result = SessionConfigBuilder::new( file.path() ).build();
        assert!( matches!( result, Err( ConfigError::EmptyKey( _ ) ) ) );
    }


    #[cfg( unix )]
    #[test]
    fn test_build_keeps_non_utf8_path_bytes() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let file = key_file( b"key" );
        let cache = OsStr::from_bytes( b"/tmp/caf\xe9" );

        let config = SessionConfigBuilder::new( file.path() )
            .cache_location( cache )
            .settings_location( "s" )
            .build()
            .unwrap();

        assert_eq!( config.cache_location().as_bytes(), b"/tmp/caf\xe9" );
    }


    #[test]
    fn test_build_rejects_nul_in_user_agent() {
        let file = key_file( b"key" );
        let result = SessionConfigBuilder::new( file.path() )
            .cache_location( "c" )
            .settings_location( "s" )
            .user_agent( "bad\0agent" )
            .build();
        assert!( matches!( result, Err( ConfigError::InteriorNul( "user agent" ) ) ) );
    }
}
