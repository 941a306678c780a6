//! Public client surface
//!
//! `configure -> on(..) -> login -> run_event_loop`, with `resolve`
//! available once a session exists.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SessionConfigBuilder;
use crate::native::NativeApi;
use crate::registry::{ CallbackRegistry, Event, EventKind, HandlerResult };
use crate::resolver::{ LinkResolver, LinkType, MetadataRecord, ResolveError };
use crate::session::{ LifecycleState, SessionError, SessionLifecycle, UserInfo };


/// Client over one native session.
///
/// Native calls are not assumed to be thread-safe. A host calling in from
/// several threads must serialize access to the client itself.
pub struct Client<A: NativeApi + 'static> {
    registry: Arc<CallbackRegistry>,
    lifecycle: SessionLifecycle<A>,
    resolver: LinkResolver<A>,
}


impl<A: NativeApi + 'static> Client<A> {
    /// Creates a client over the given native layer.
    pub fn new( api: A ) -> Self {
        Self::with_shared_api( Arc::new( api ) )
    }


    /// Creates a client over a native layer the caller keeps a handle to.
    pub fn with_shared_api( api: Arc<A> ) -> Self {
        let registry = Arc::new( CallbackRegistry::new() );

        Self {
            lifecycle: SessionLifecycle::new( Arc::clone( &api ), Arc::clone( &registry ) ),
            resolver: LinkResolver::new( api ),
            registry,
        }
    }


    /// Sets the key file and locations the session will be created with.
    pub fn configure( &mut self, builder: SessionConfigBuilder ) -> &mut Self {
        self.lifecycle.configure( builder );
        self
    }


    /// Sets the upper bound on the wait between event pumps.
    pub fn max_pump_interval( &mut self, max: Duration ) -> &mut Self {
        self.lifecycle.set_max_pump_interval( max );
        self
    }


    /// Registers the handler for `kind`, replacing any previous one.
    pub fn on<F>( &mut self, kind: EventKind, handler: F ) -> &mut Self
    where
        F: FnMut( &Event<'_> ) -> HandlerResult + Send + 'static,
    {
        self.registry.register( kind, handler );
        self
    }


    pub fn registry( &self ) -> &CallbackRegistry {
        &self.registry
    }


    pub fn login( &mut self, user: &str, password: &str ) -> Result<(), SessionError> {
        self.lifecycle.login( user, password )
    }


    pub fn logout( &mut self ) -> Result<(), SessionError> {
        self.lifecycle.logout()
    }


    pub fn state( &self ) -> LifecycleState {
        self.lifecycle.state()
    }


    pub fn current_user( &self ) -> Option<UserInfo> {
        self.lifecycle.current_user()
    }


    /// Resolves a URI into metadata. Requires a created session.
    pub fn resolve( &self, uri: &str ) -> Result<MetadataRecord, ResolveError> {
        self.require_session()?;
        self.resolver.resolve( uri )
    }


    pub fn link_type( &self, uri: &str ) -> Result<LinkType, ResolveError> {
        self.require_session()?;
        self.resolver.link_type( uri )
    }


    pub fn canonical_uri( &self, uri: &str ) -> Result<String, ResolveError> {
        self.require_session()?;
        self.resolver.canonical_uri( uri )
    }


    pub fn pump_once( &self ) -> Result<Duration, SessionError> {
        self.lifecycle.pump_once()
    }


    pub fn wait( &self, timeout: Duration ) -> bool {
        self.lifecycle.wait( timeout )
    }


    /// Pumps events forever. Only returns on error.
    pub fn run_event_loop( &self ) -> Result<(), SessionError> {
        self.lifecycle.run_event_loop()
    }


    /// Pumps events until `stop` is set.
    pub fn run_until( &self, stop: &AtomicBool ) -> Result<(), SessionError> {
        self.lifecycle.run_until( stop )
    }


    fn require_session( &self ) -> Result<(), ResolveError> {
        if self.lifecycle.has_session() {
            Ok(())
        } else {
            Err( ResolveError::NoSession )
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::io::Write;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    use tempfile::NamedTempFile;

    use crate::native::mock::{ MockAlbum, MockEvent, MockNative, MockTrack };


    const URI: &str = "spotify:track:4uLU6hMCjMI75M1A2tKUQC";


    fn key_file() -> NamedTempFile {
        let mut key = NamedTempFile::new().unwrap();
        key.write_all( &[ 0x01, 0x02, 0x03 ] ).unwrap();
        key
    }


    fn mock() -> MockNative {
        MockNative::new().with_track( URI, MockTrack {
            name: "Song".into(),
            artists: vec![ Some( "A".into() ) ],
            album: Some( MockAlbum { name: "Album".into(), year: 1987, artist: Some( "A".into() ) } ),
        })
    }


    #[test]
    fn test_resolve_requires_session() {
        let client = Client::new( mock() );
        assert_eq!( client.resolve( URI ), Err( ResolveError::NoSession ) );
    }


    #[test]
    fn test_full_flow() {
        let key = key_file();
        let api = Arc::new( mock() );
        let mut client = Client::with_shared_api( Arc::clone( &api ) );
        let logged_in = Arc::new( Mutex::new( None ) );
        let flag = Arc::clone( &logged_in );

        client
            .configure( SessionConfigBuilder::new( key.path() ).cache_location( "c" ).settings_location( "s" ) )
            .on( EventKind::Login, move |event| {
                if let Event::Login( result ) = event {
                    *flag.lock().unwrap() = Some( result.is_ok() );
                }
                Ok(())
            });

        client.login( "alice", "secret" ).unwrap();
        assert_eq!( client.state(), LifecycleState::LoginPending );

        api.push_pump( 10, vec![ MockEvent::LoggedIn( 0 ) ] );
        assert_eq!( client.pump_once().unwrap(), Duration::from_millis( 10 ) );

        assert_eq!( *logged_in.lock().unwrap(), Some( true ) );
        assert_eq!( client.state(), LifecycleState::Authenticated );

        let record = client.resolve( URI ).unwrap();
        assert_eq!( record.name, "Song" );
        assert_eq!( record.album.unwrap().year, 1987 );
        assert_eq!( client.link_type( URI ), Ok( LinkType::Track ) );
        assert_eq!( client.canonical_uri( URI ).unwrap(), URI );
    }


    #[test]
    fn test_run_until_stops_on_logout() {
        let key = key_file();
        let api = Arc::new( mock() );
        let mut client = Client::with_shared_api( Arc::clone( &api ) );
        let stop = Arc::new( AtomicBool::new( false ) );
        let flag = Arc::clone( &stop );

        client
            .configure( SessionConfigBuilder::new( key.path() ).cache_location( "c" ).settings_location( "s" ) )
            .max_pump_interval( Duration::from_millis( 5 ) )
            .on( EventKind::Logout, move |_| {
                flag.store( true, Ordering::Relaxed );
                Ok(())
            });
        client.login( "alice", "secret" ).unwrap();
        api.push_pump( 1000, vec![ MockEvent::LoggedIn( 0 ) ] );
        api.push_pump( 1000, vec![ MockEvent::LoggedOut ] );

        client.run_until( &stop ).unwrap();

        assert_eq!( client.state(), LifecycleState::LoggedOut );
        assert_eq!( api.pump_calls(), 2 );
    }
}
