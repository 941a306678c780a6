//! Session host
//!
//! Wires settings and flags into a [`Client`] and drives it through login.

use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;

use anyhow::{ bail, Result };

use spotlink_core::native::NativeApi;
use spotlink_core::{ Client, Event, EventKind, LifecycleState, SessionConfigBuilder };

use crate::cli::Args;
use crate::settings::Settings;


/// Merges flags over stored settings into a session configuration.
pub fn session_config( args: &Args, settings: &Settings ) -> SessionConfigBuilder {
    let key_file = args.key_file.clone().unwrap_or_else( || settings.key_file.clone() );
    let mut builder = SessionConfigBuilder::new( key_file );

    if let Some( cache ) = args.cache.as_ref().or( settings.cache_location.as_ref() ) {
        builder = builder.cache_location( cache );
    }
    if let Some( dir ) = args.settings.as_ref().or( settings.settings_location.as_ref() ) {
        builder = builder.settings_location( dir );
    }
    if let Some( user_agent ) = &settings.user_agent {
        builder = builder.user_agent( user_agent.as_str() );
    }

    builder
}


/// Registers the host's handlers. Session events are already logged by the
/// core; these only act on them.
///
/// @param stop - Set once the session logs out
pub fn install_handlers<A: NativeApi + 'static>( client: &mut Client<A>, stop: &Arc<AtomicBool> ) {
    let on_logout = Arc::clone( stop );

    client
        .on( EventKind::Logout, move |_| {
            on_logout.store( true, Ordering::Relaxed );
            Ok(())
        })
        .on( EventKind::MessageToUser, |event| {
            if let Event::MessageToUser( message ) = event {
                eprintln!( "{}", message.trim_end() );
            }
            Ok(())
        });

    tracing::debug!( "Handlers installed: {:?}", client.registry() );
}


/// Pumps until the pending login resolves one way or the other.
pub fn await_login<A: NativeApi + 'static>( client: &Client<A> ) -> Result<()> {
    loop {
        match client.state() {
            LifecycleState::Authenticated => return Ok(()),
            LifecycleState::LoginFailed => bail!( "Login failed" ),
            LifecycleState::LoggedOut => bail!( "Logged out before login completed" ),
            _ => {}
        }

        let next = client.pump_once()?;
        if client.state() == LifecycleState::LoginPending {
            client.wait( next );
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::io::Write;
    use std::path::PathBuf;

    use clap::Parser;
    use tempfile::NamedTempFile;

    use spotlink_core::native::mock::{ MockEvent, MockNative };


    fn key_file( contents: &[u8] ) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all( contents ).unwrap();
        file
    }


    fn logged_in_client( api: &Arc<MockNative>, key: &NamedTempFile ) -> Client<MockNative> {
        let mut client = Client::with_shared_api( Arc::clone( api ) );
        client.configure(
            SessionConfigBuilder::new( key.path() ).cache_location( "c" ).settings_location( "s" ),
        );
        client.login( "alice", "secret" ).unwrap();
        client
    }


    #[test]
    fn test_flags_override_settings() {
        let stored_key = key_file( b"stored" );
        let flag_key = key_file( b"from-the-flag" );
        let settings = Settings {
            key_file: stored_key.path().to_path_buf(),
            cache_location: Some( PathBuf::from( "/settings/cache" ) ),
            settings_location: Some( PathBuf::from( "/settings/dir" ) ),
            user_agent: Some( "stored agent".into() ),
            ..Settings::default()
        };
        let flag_path = flag_key.path().to_str().unwrap();
        let args = Args::parse_from( [
            "spotlink", "--key-file", flag_path, "--cache", "/flag/cache", "login", "alice", "secret",
        ] );

        let builder = session_config( &args, &settings );
        assert_eq!( builder.key_file(), flag_key.path() );

        let config = builder.build().unwrap();
        assert_eq!( config.credential(), b"from-the-flag" );
        assert_eq!( config.cache_location().to_str().unwrap(), "/flag/cache" );
        assert_eq!( config.settings_location().to_str().unwrap(), "/settings/dir" );
        assert_eq!( config.user_agent().to_str().unwrap(), "stored agent" );
    }


    #[test]
    fn test_settings_used_without_flags() {
        let stored_key = key_file( b"stored" );
        let settings = Settings {
            key_file: stored_key.path().to_path_buf(),
            cache_location: Some( PathBuf::from( "/settings/cache" ) ),
            settings_location: Some( PathBuf::from( "/settings/dir" ) ),
            ..Settings::default()
        };
        let args = Args::parse_from( [ "spotlink", "login", "alice", "secret" ] );

        let config = session_config( &args, &settings ).build().unwrap();

        assert_eq!( config.credential(), b"stored" );
        assert_eq!( config.cache_location().to_str().unwrap(), "/settings/cache" );
    }


    #[test]
    fn test_await_login_succeeds() {
        let key = key_file( b"key" );
        let api = Arc::new( MockNative::new() );
        let client = logged_in_client( &api, &key );
        api.push_pump( 0, vec![ MockEvent::MetadataUpdated ] );
        api.push_pump( 0, vec![ MockEvent::LoggedIn( 0 ) ] );

        await_login( &client ).unwrap();

        assert_eq!( client.state(), LifecycleState::Authenticated );
        assert_eq!( api.pump_calls(), 2 );
    }


    #[test]
    fn test_await_login_reports_failure() {
        let key = key_file( b"key" );
        let api = Arc::new( MockNative::new() );
        let client = logged_in_client( &api, &key );
        api.push_pump( 0, vec![ MockEvent::LoggedIn( 6 ) ] );

        assert!( await_login( &client ).is_err() );
        assert_eq!( client.state(), LifecycleState::LoginFailed );
    }


    #[test]
    fn test_await_login_stops_on_logout() {
        let key = key_file( b"key" );
        let api = Arc::new( MockNative::new() );
        let client = logged_in_client( &api, &key );
        api.push_pump( 0, vec![ MockEvent::LoggedOut ] );

        assert!( await_login( &client ).is_err() );
        assert_eq!( api.pump_calls(), 1 );
    }


    #[test]
    fn test_logout_handler_sets_stop() {
        let key = key_file( b"key" );
        let api = Arc::new( MockNative::new() );
        let stop = Arc::new( AtomicBool::new( false ) );
        let mut client = Client::with_shared_api( Arc::clone( &api ) );
        install_handlers( &mut client, &stop );
        client.configure(
            SessionConfigBuilder::new( key.path() ).cache_location( "c" ).settings_location( "s" ),
        );
        client.login( "alice", "secret" ).unwrap();
        api.push_pump( 0, vec![ MockEvent::LoggedIn( 0 ), MockEvent::LoggedOut ] );

        client.pump_once().unwrap();

        assert!( stop.load( Ordering::Relaxed ) );
        assert!( client.registry().is_registered( EventKind::MessageToUser ) );
    }
}
