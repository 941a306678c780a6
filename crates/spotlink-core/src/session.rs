//! Session lifecycle
//!
//! Owns the native session handle: creates it once, issues login and
//! logout, pumps native events, and turns native callbacks into registry
//! dispatches.

use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::{ Arc, Condvar, Mutex, MutexGuard, PoisonError };
use std::time::Duration;

use thiserror::Error;

use crate::config::{ ConfigError, SessionConfig, SessionConfigBuilder };
use crate::native::{ EventSink, HandleKind, NativeApi, NativeEvent, NativeHandle, RawHandle };
use crate::registry::{ AudioDelivery, CallbackRegistry, Event };


/// Default cap on the wait between two event pumps.
pub const DEFAULT_MAX_PUMP_INTERVAL: Duration = Duration::from_millis( 1000 );


/// A nonzero status reported by the native library.
#[derive( Debug, Clone, PartialEq, Eq, Error )]
#[error( "{message} (error {code})" )]
pub struct NativeError {
    pub code: i32,
    pub message: String,
}


/// Errors that can occur while driving the session.
#[derive( Debug, Error )]
pub enum SessionError {
    #[error( "Configuration error: {0}" )]
    Config( #[from] ConfigError ),

    #[error( "Native call failed: {0}" )]
    Native( #[from] NativeError ),

    #[error( "No session has been created" )]
    NoSession,
}


impl SessionError {
    /// The native status code, for errors reported by the native library.
    pub fn code( &self ) -> Option<i32> {
        match self {
            SessionError::Native( e ) => Some( e.code ),
            _ => None,
        }
    }
}


/// Where the session is in its login flow.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum LifecycleState {
    #[default]
    Uninitialized,
    Configuring,
    SessionCreated,
    LoginPending,
    Authenticated,
    LoginFailed,
    LoggedOut,
}


/// The logged-in user.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct UserInfo {
    pub canonical_name: String,
    pub display_name: String,
}


/// Lets `notify_main_thread` cut the wait before the next pump short.
#[derive( Default )]
struct Wakeup {
    notified: Mutex<bool>,
    signal: Condvar,
}


impl Wakeup {
    fn notify( &self ) {
        *self.notified.lock().unwrap_or_else( PoisonError::into_inner ) = true;
        self.signal.notify_all();
    }


    /// Waits up to `timeout`. Returns true if woken by a notification.
    fn wait( &self, timeout: Duration ) -> bool {
        let notified = self.notified.lock().unwrap_or_else( PoisonError::into_inner );
        let ( mut notified, _ ) = self.signal
            .wait_timeout_while( notified, timeout, |notified| !*notified )
            .unwrap_or_else( PoisonError::into_inner );
        std::mem::replace( &mut *notified, false )
    }
}


/// State reachable from native callbacks.
struct Shared<A: NativeApi> {
    api: Arc<A>,
    registry: Arc<CallbackRegistry>,
    state: Mutex<LifecycleState>,
    /// The config the session was created from. The native library keeps
    /// pointers into it, so it lives as long as this struct.
    config: Mutex<Option<SessionConfig>>,
    wakeup: Wakeup,
}


impl<A: NativeApi> Shared<A> {
    fn state( &self ) -> LifecycleState {
        *self.lock_state()
    }


    fn set_state( &self, next: LifecycleState ) {
        let mut state = self.lock_state();
        if *state != next {
            tracing::debug!( "Session state: {:?} -> {:?}", *state, next );
            *state = next;
        }
    }


    fn lock_state( &self ) -> MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else( PoisonError::into_inner )
    }


    fn native_error( &self, code: i32 ) -> NativeError {
        NativeError { code, message: self.api.error_message( code ) }
    }


    fn check( &self, code: i32 ) -> Result<(), NativeError> {
        match code {
            0 => Ok(()),
            code => Err( self.native_error( code ) ),
        }
    }
}


impl<A: NativeApi> EventSink for Shared<A> {
    fn deliver( &self, event: NativeEvent<'_> ) -> usize {
        match event {
            NativeEvent::LoggedIn { error } => {
                let result = self.check( error );
                match &result {
                    Ok(()) => {
                        tracing::info!( "Logged in" );
                        self.set_state( LifecycleState::Authenticated );
                    }
                    Err( e ) => {
                        tracing::error!( "Login failed: {}", e );
                        self.set_state( LifecycleState::LoginFailed );
                    }
                }
                self.registry.dispatch( &Event::Login( result ) );
            }
            NativeEvent::LoggedOut => {
                tracing::info!( "Logged out" );
                self.set_state( LifecycleState::LoggedOut );
                self.registry.dispatch( &Event::Logout );
            }
            NativeEvent::MetadataUpdated => {
                tracing::trace!( "Metadata updated" );
                self.registry.dispatch( &Event::MetadataUpdated );
            }
            NativeEvent::ConnectionError { error } => {
                tracing::warn!( "Connection error {}", error );
                self.registry.dispatch( &Event::ConnectionError { code: error } );
            }
            NativeEvent::MessageToUser( message ) => {
                tracing::info!( "Message from service: {}", message );
                self.registry.dispatch( &Event::MessageToUser( message ) );
            }
            NativeEvent::NotifyMainThread => {
                tracing::trace!( "Main thread notified" );
                self.wakeup.notify();
                self.registry.dispatch( &Event::Notification );
            }
            NativeEvent::MusicDelivery { format, frames, num_frames } => {
                self.registry.dispatch( &Event::MusicDelivery( AudioDelivery { format, frames, num_frames } ) );
                return num_frames;
            }
            NativeEvent::PlayTokenLost => {
                tracing::warn!( "Play token lost" );
                self.registry.dispatch( &Event::LostPlayToken );
            }
            NativeEvent::LogMessage( message ) => {
                tracing::debug!( target: "libspotify", "{}", message.trim_end() );
                self.registry.dispatch( &Event::LogMessage( message ) );
            }
        }
        0
    }
}


/// Clamps the interval written back by the event pump.
///
/// Negative values mean "pump again now"; anything above `max` is capped.
fn clamp_interval( raw_ms: i32, max: Duration ) -> Duration {
    if raw_ms < 0 {
        tracing::warn!( "Event pump returned negative interval {} ms", raw_ms );
        return Duration::ZERO;
    }
    let interval = Duration::from_millis( raw_ms as u64 );
    if interval > max {
        tracing::trace!( "Capping pump interval {:?} to {:?}", interval, max );
        max
    } else {
        interval
    }
}


/// The session state machine.
///
/// `Uninitialized -> Configuring -> SessionCreated -> LoginPending ->
/// Authenticated | LoginFailed -> LoggedOut`. Only this type calls
/// session-mutating native entry points.
pub struct SessionLifecycle<A: NativeApi + 'static> {
    shared: Arc<Shared<A>>,
    builder: Option<SessionConfigBuilder>,
    session: Option<RawHandle>,
    max_pump_interval: Duration,
}


impl<A: NativeApi + 'static> SessionLifecycle<A> {
    /// Creates a lifecycle dispatching native callbacks into `registry`.
    pub fn new( api: Arc<A>, registry: Arc<CallbackRegistry> ) -> Self {
        Self {
            shared: Arc::new( Shared {
                api,
                registry,
                state: Mutex::new( LifecycleState::Uninitialized ),
                config: Mutex::new( None ),
                wakeup: Wakeup::default(),
            }),
            builder: None,
            session: None,
            max_pump_interval: DEFAULT_MAX_PUMP_INTERVAL,
        }
    }


    /// Sets the session configuration used by the first `login`.
    pub fn configure( &mut self, builder: SessionConfigBuilder ) {
        if self.session.is_some() {
            tracing::warn!( "Session already created; new configuration is ignored" );
            return;
        }
        self.builder = Some( builder );
        self.shared.set_state( LifecycleState::Configuring );
    }


    /// Sets the upper bound on the wait between pumps.
    pub fn set_max_pump_interval( &mut self, max: Duration ) {
        self.max_pump_interval = max;
    }


    pub fn state( &self ) -> LifecycleState {
        self.shared.state()
    }


    pub fn has_session( &self ) -> bool {
        self.session.is_some()
    }


    /// Logs in, creating the session on the first call.
    ///
    /// Returns once the request is issued. The outcome arrives later as a
    /// login event during a pump.
    ///
    /// @param user - Account name
    /// @param password - Account password
    pub fn login( &mut self, user: &str, password: &str ) -> Result<(), SessionError> {
        let session = match self.session {
            Some( session ) => session,
            None => self.create_session()?,
        };

        let previous = self.shared.state();
        self.shared.set_state( LifecycleState::LoginPending );

        tracing::info!( "Logging in as {}", user );
        let status = self.shared.api.session_login( session, user, password );
        if let Err( e ) = self.shared.check( status ) {
            self.shared.set_state( previous );
            return Err( e.into() );
        }

        Ok(())
    }


    /// Requests logout. Completion arrives as a logout event.
    pub fn logout( &mut self ) -> Result<(), SessionError> {
        let session = self.session.ok_or( SessionError::NoSession )?;

        tracing::info!( "Logging out" );
        let status = self.shared.api.session_logout( session );
        self.shared.check( status )?;

        Ok(())
    }


    /// Runs one event pump.
    ///
    /// @returns How long to wait before the next pump
    pub fn pump_once( &self ) -> Result<Duration, SessionError> {
        let session = self.session.ok_or( SessionError::NoSession )?;
        let raw_ms = self.shared.api.session_process_events( session );
        Ok( clamp_interval( raw_ms, self.max_pump_interval ) )
    }


    /// Blocks for up to `timeout`, returning early if the native library
    /// asked to be pumped. Returns true when woken early.
    pub fn wait( &self, timeout: Duration ) -> bool {
        self.shared.wakeup.wait( timeout )
    }


    /// Pumps events forever. Only returns on error.
    pub fn run_event_loop( &self ) -> Result<(), SessionError> {
        let never = AtomicBool::new( false );
        self.run_until( &never )
    }


    /// Pumps events until `stop` is set.
    pub fn run_until( &self, stop: &AtomicBool ) -> Result<(), SessionError> {
        self.run_until_with( stop, |timeout| {
            self.wait( timeout );
        })
    }


    /// Pumps events until `stop` is set, calling `pause` with each
    /// library-recommended interval between pumps.
    pub fn run_until_with<F>( &self, stop: &AtomicBool, mut pause: F ) -> Result<(), SessionError>
    where
        F: FnMut( Duration ),
    {
        if self.session.is_none() {
            return Err( SessionError::NoSession );
        }

        tracing::debug!( "Entering event loop" );
        while !stop.load( Ordering::Relaxed ) {
            let next = self.pump_once()?;
            if stop.load( Ordering::Relaxed ) {
                break;
            }
            pause( next );
        }
        tracing::debug!( "Event loop stopped" );

        Ok(())
    }


    /// The logged-in user, while authenticated.
    pub fn current_user( &self ) -> Option<UserInfo> {
        let session = self.session?;
        if self.state() != LifecycleState::Authenticated {
            return None;
        }

        let api = self.shared.api.as_ref();
        let user = NativeHandle::acquire( api, HandleKind::User, api.session_user( session ) )?;
        Some( UserInfo {
            canonical_name: api.user_canonical_name( user.raw() ),
            display_name: api.user_display_name( user.raw() ),
        })
    }


    fn create_session( &mut self ) -> Result<RawHandle, SessionError> {
        let builder = self.builder.as_ref().ok_or( ConfigError::NotConfigured )?;
        let config = builder.build()?;

        let sink: Arc<dyn EventSink> = self.shared.clone();
        let session = self.shared.api
            .session_create( &config, sink )
            .map_err( |code| self.shared.native_error( code ) )?;

        tracing::info!( "Session created (api version {})", config.api_version() );
        *self.shared.config.lock().unwrap_or_else( PoisonError::into_inner ) = Some( config );
        self.session = Some( session );
        self.shared.set_state( LifecycleState::SessionCreated );

        Ok( session )
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::io::Write;
    use std::time::Instant;

    use tempfile::NamedTempFile;

    use crate::native::mock::{ MockEvent, MockNative };
    use crate::registry::EventKind;


    struct Fixture {
        api: Arc<MockNative>,
        registry: Arc<CallbackRegistry>,
        lifecycle: SessionLifecycle<MockNative>,
        _key: NamedTempFile,
    }


    fn fixture( mock: MockNative ) -> Fixture {
        let mut key = NamedTempFile::new().unwrap();
        key.write_all( b"0123456789abcdef" ).unwrap();

        let api = Arc::new( mock );
        let registry = Arc::new( CallbackRegistry::new() );
        let mut lifecycle = SessionLifecycle::new( Arc::clone( &api ), Arc::clone( &registry ) );
        lifecycle.configure(
            SessionConfigBuilder::new( key.path() )
                .cache_location( "/tmp/spotlink-cache" )
                .settings_location( "/tmp/spotlink-settings" )
                .user_agent( "test agent" ),
        );

        Fixture { api, registry, lifecycle, _key: key }
    }


    fn record_logins( registry: &CallbackRegistry ) -> Arc<Mutex<Vec<Result<(), NativeError>>>> {
        let seen = Arc::new( Mutex::new( Vec::new() ) );
        let sink = Arc::clone( &seen );
        registry.register( EventKind::Login, move |event| {
            if let Event::Login( result ) = event {
                sink.lock().unwrap().push( result.clone() );
            }
            Ok(())
        });
        seen
    }


    #[test]
    fn test_configure_moves_to_configuring() {
        let f = fixture( MockNative::new() );
        assert_eq!( f.lifecycle.state(), LifecycleState::Configuring );
        assert!( !f.lifecycle.has_session() );
    }


    #[test]
    fn test_login_creates_session_once() {
        let mut f = fixture( MockNative::new() );

        f.lifecycle.login( "alice", "secret" ).unwrap();
        f.lifecycle.login( "alice", "secret" ).unwrap();

        assert_eq!( f.api.sessions_created(), 1 );
        assert_eq!( f.api.logins().len(), 2 );
        assert_eq!( f.lifecycle.state(), LifecycleState::LoginPending );
    }


    #[test]
    fn test_session_config_reaches_native_layer() {
        let mut f = fixture( MockNative::new() );
        f.lifecycle.login( "alice", "secret" ).unwrap();

        assert_eq!( f.api.config_snapshot(), Some(( 16, "test agent".to_string() )) );
        assert_eq!( f.api.logins(), vec![ ( "alice".to_string(), "secret".to_string() ) ] );
    }


    #[test]
    fn test_login_without_configuration() {
        let api = Arc::new( MockNative::new() );
        let mut lifecycle = SessionLifecycle::new( Arc::clone( &api ), Arc::new( CallbackRegistry::new() ) );

        let result = lifecycle.login( "alice", "secret" );

        assert!( matches!( result, Err( SessionError::Config( ConfigError::NotConfigured ) ) ) );
        assert_eq!( api.sessions_created(), 0 );
        assert_eq!( lifecycle.state(), LifecycleState::Uninitialized );
    }


    #[test]
    fn test_login_with_unreadable_key_is_config_error() {
        let api = Arc::new( MockNative::new() );
        let mut lifecycle = SessionLifecycle::new( Arc::clone( &api ), Arc::new( CallbackRegistry::new() ) );
        lifecycle.configure( SessionConfigBuilder::new( "/nonexistent/spotify_appkey.key" ) );

        let result = lifecycle.login( "alice", "secret" );

        assert!( matches!( result, Err( SessionError::Config( ConfigError::KeyFile { .. } ) ) ) );
        assert_eq!( api.sessions_created(), 0 );
    }


    #[test]
    fn test_session_create_failure_carries_native_message() {
        let mut f = fixture( MockNative::new() );
        f.api.fail_session_create( 7 );

        let err = f.lifecycle.login( "alice", "secret" ).unwrap_err();

        assert_eq!( err.code(), Some( 7 ) );
        match err {
            SessionError::Native( e ) => assert_eq!( e.message, "mock error 7" ),
            other => panic!( "unexpected error: {:?}", other ),
        }
        assert!( f.api.logins().is_empty() );
        assert!( !f.lifecycle.has_session() );
    }


    #[test]
    fn test_session_create_is_retried_after_failure() {
        let mut f = fixture( MockNative::new() );
        f.api.fail_session_create( 7 );
        assert!( f.lifecycle.login( "alice", "secret" ).is_err() );

        f.api.fail_session_create( 0 );
        f.lifecycle.login( "alice", "secret" ).unwrap();

        assert_eq!( f.api.sessions_created(), 2 );
        assert!( f.lifecycle.has_session() );
    }


    #[test]
    fn test_synchronous_login_rejection() {
        let mut f = fixture( MockNative::new() );
        f.api.fail_login( 6 );

        let err = f.lifecycle.login( "alice", "wrong" ).unwrap_err();

        assert_eq!( err.code(), Some( 6 ) );
        assert_eq!( f.lifecycle.state(), LifecycleState::SessionCreated );
    }


    #[test]
    fn test_logged_in_success_authenticates() {
        let mut f = fixture( MockNative::new() );
        let logins = record_logins( &f.registry );
        f.lifecycle.login( "alice", "secret" ).unwrap();
        f.api.push_pump( 50, vec![ MockEvent::LoggedIn( 0 ) ] );

        f.lifecycle.pump_once().unwrap();

        assert_eq!( f.lifecycle.state(), LifecycleState::Authenticated );
        assert_eq!( *logins.lock().unwrap(), vec![ Ok(()) ] );
    }


    #[test]
    fn test_logged_in_failure_dispatches_code() {
        let mut f = fixture( MockNative::new() );
        let logins = record_logins( &f.registry );
        f.lifecycle.login( "alice", "secret" ).unwrap();
        f.api.push_pump( 50, vec![ MockEvent::LoggedIn( 6 ) ] );

        f.lifecycle.pump_once().unwrap();

        assert_eq!( f.lifecycle.state(), LifecycleState::LoginFailed );
        assert_eq!(
            *logins.lock().unwrap(),
            vec![ Err( NativeError { code: 6, message: "mock error 6".into() } ) ]
        );
    }


    #[test]
    fn test_logged_in_failure_without_handler_is_silent() {
        let mut f = fixture( MockNative::new() );
        f.lifecycle.login( "alice", "secret" ).unwrap();
        f.api.push_pump( 50, vec![ MockEvent::LoggedIn( 6 ) ] );

        assert!( f.lifecycle.pump_once().is_ok() );
        assert_eq!( f.lifecycle.state(), LifecycleState::LoginFailed );
    }


    #[test]
    fn test_logout_and_relogin() {
        let mut f = fixture( MockNative::new() );
        let logouts = Arc::new( Mutex::new( 0 ) );
        let counter = Arc::clone( &logouts );
        f.registry.register( EventKind::Logout, move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        f.lifecycle.login( "alice", "secret" ).unwrap();
        f.api.push_pump( 10, vec![ MockEvent::LoggedIn( 0 ) ] );
        f.lifecycle.pump_once().unwrap();

        f.lifecycle.logout().unwrap();
        f.api.push_pump( 10, vec![ MockEvent::LoggedOut ] );
        f.lifecycle.pump_once().unwrap();

        assert_eq!( f.api.logouts(), 1 );
        assert_eq!( *logouts.lock().unwrap(), 1 );
        assert_eq!( f.lifecycle.state(), LifecycleState::LoggedOut );

        f.lifecycle.login( "alice", "secret" ).unwrap();
        assert_eq!( f.lifecycle.state(), LifecycleState::LoginPending );
        assert_eq!( f.api.sessions_created(), 1 );
    }


    #[test]
    fn test_logout_without_session() {
        let mut f = fixture( MockNative::new() );
        assert!( matches!( f.lifecycle.logout(), Err( SessionError::NoSession ) ) );
    }


    #[test]
    fn test_logout_native_failure() {
        let mut f = fixture( MockNative::new() );
        f.lifecycle.login( "alice", "secret" ).unwrap();
        f.api.fail_logout( 3 );

        assert_eq!( f.lifecycle.logout().unwrap_err().code(), Some( 3 ) );
    }


    #[test]
    fn test_pump_without_session() {
        let f = fixture( MockNative::new() );
        assert!( matches!( f.lifecycle.pump_once(), Err( SessionError::NoSession ) ) );
    }


    #[test]
    fn test_callbacks_forwarded_verbatim() {
        let mut f = fixture( MockNative::new() );
        let seen = Arc::new( Mutex::new( Vec::new() ) );
        for kind in EventKind::ALL {
            let sink = Arc::clone( &seen );
            f.registry.register( kind, move |event| {
                let entry = match event {
                    Event::ConnectionError { code } => format!( "connectionError:{}", code ),
                    Event::MessageToUser( msg ) => format!( "messageToUser:{}", msg ),
                    Event::LogMessage( msg ) => format!( "logMessage:{}", msg ),
                    Event::MusicDelivery( d ) => format!( "musicDelivery:{}:{}", d.num_frames, d.format.channels ),
                    other => other.kind().name().to_string(),
                };
                sink.lock().unwrap().push( entry );
                Ok(())
            });
        }
        f.lifecycle.login( "alice", "secret" ).unwrap();
        f.api.push_pump( 10, vec![
            MockEvent::MetadataUpdated,
            MockEvent::ConnectionError( 4 ),
            MockEvent::MessageToUser( "hi".into() ),
            MockEvent::MusicDelivery { channels: 2, frames: vec![ 0; 8 ] },
            MockEvent::PlayTokenLost,
            MockEvent::LogMessage( "native log\n".into() ),
            MockEvent::NotifyMainThread,
        ]);

        f.lifecycle.pump_once().unwrap();

        assert_eq!( *seen.lock().unwrap(), vec![
            "metadataUpdated",
            "connectionError:4",
            "messageToUser:hi",
            "musicDelivery:4:2",
            "lostPlayToken",
            "logMessage:native log\n",
            "notification",
        ]);
    }


    #[test]
    fn test_music_delivery_consumes_all_frames() {
        let mut f = fixture( MockNative::new() );
        f.lifecycle.login( "alice", "secret" ).unwrap();

        let consumed = f.api.emit( MockEvent::MusicDelivery { channels: 2, frames: vec![ 1; 20 ] } );

        assert_eq!( consumed, 10 );
    }


    #[test]
    fn test_failing_handler_does_not_break_pump() {
        let mut f = fixture( MockNative::new() );
        f.registry.register( EventKind::Login, |_| panic!( "bad handler" ) );
        f.lifecycle.login( "alice", "secret" ).unwrap();
        f.api.push_pump( 25, vec![ MockEvent::LoggedIn( 0 ) ] );

        assert_eq!( f.lifecycle.pump_once().unwrap(), Duration::from_millis( 25 ) );
        assert_eq!( f.lifecycle.state(), LifecycleState::Authenticated );
    }


    #[test]
    fn test_run_loop_sleeps_for_pump_interval() {
        let mut f = fixture( MockNative::new() );
        let stop = Arc::new( AtomicBool::new( false ) );
        let flag = Arc::clone( &stop );
        f.registry.register( EventKind::Logout, move |_| {
            flag.store( true, Ordering::Relaxed );
            Ok(())
        });
        f.lifecycle.login( "alice", "secret" ).unwrap();
        f.api.push_pump( 5, Vec::new() );
        f.api.push_pump( 120, vec![ MockEvent::LoggedIn( 0 ) ] );
        f.api.push_pump( 0, Vec::new() );
        f.api.push_pump( 40, vec![ MockEvent::LoggedOut ] );

        let mut pauses = Vec::new();
        f.lifecycle.run_until_with( &stop, |d| pauses.push( d ) ).unwrap();

        assert_eq!( pauses, vec![
            Duration::from_millis( 5 ),
            Duration::from_millis( 120 ),
            Duration::ZERO,
        ]);
        assert_eq!( f.api.pump_calls(), 4 );
    }


    #[test]
    fn test_run_loop_checks_stop_flag_first() {
        let mut f = fixture( MockNative::new() );
        f.lifecycle.login( "alice", "secret" ).unwrap();
        let stop = AtomicBool::new( true );

        f.lifecycle.run_until( &stop ).unwrap();

        assert_eq!( f.api.pump_calls(), 0 );
    }


    #[test]
    fn test_run_loop_without_session() {
        let f = fixture( MockNative::new() );
        assert!( matches!( f.lifecycle.run_event_loop(), Err( SessionError::NoSession ) ) );
    }


    #[test]
    fn test_pump_interval_is_clamped() {
        let mut f = fixture( MockNative::new() );
        f.lifecycle.set_max_pump_interval( Duration::from_millis( 500 ) );
        f.lifecycle.login( "alice", "secret" ).unwrap();
        f.api.push_pump( -20, Vec::new() );
        f.api.push_pump( 90_000, Vec::new() );

        assert_eq!( f.lifecycle.pump_once().unwrap(), Duration::ZERO );
        assert_eq!( f.lifecycle.pump_once().unwrap(), Duration::from_millis( 500 ) );
    }


    #[test]
    fn test_notify_main_thread_cuts_wait_short() {
        let mut f = fixture( MockNative::new() );
        f.lifecycle.login( "alice", "secret" ).unwrap();
        f.api.push_pump( 1000, vec![ MockEvent::NotifyMainThread ] );

        let next = f.lifecycle.pump_once().unwrap();
        let started = Instant::now();
        let woken = f.lifecycle.wait( next );

        assert!( woken );
        assert!( started.elapsed() < Duration::from_millis( 500 ) );
        // The notification is consumed by the first wait.
        assert!( !f.lifecycle.wait( Duration::from_millis( 1 ) ) );
    }


    #[test]
    fn test_current_user_requires_authentication() {
        let mut f = fixture( MockNative::new().with_user( "alice", "Alice A." ) );
        f.lifecycle.login( "alice", "secret" ).unwrap();
        assert_eq!( f.lifecycle.current_user(), None );

        f.api.push_pump( 10, vec![ MockEvent::LoggedIn( 0 ) ] );
        f.lifecycle.pump_once().unwrap();

        assert_eq!( f.lifecycle.current_user(), Some( UserInfo {
            canonical_name: "alice".into(),
            display_name: "Alice A.".into(),
        }));
        assert_eq!( f.api.acquired(), 1 );
        assert_eq!( f.api.released(), 1 );
    }


    #[test]
    fn test_configure_after_session_is_ignored() {
        let mut f = fixture( MockNative::new() );
        f.lifecycle.login( "alice", "secret" ).unwrap();

        f.lifecycle.configure( SessionConfigBuilder::new( "/elsewhere.key" ) );
        f.lifecycle.login( "alice", "secret" ).unwrap();

        assert_eq!( f.api.sessions_created(), 1 );
        assert_eq!( f.lifecycle.state(), LifecycleState::LoginPending );
    }
}
