//! Callback registry
//!
//! Maps the fixed set of public event kinds to user handlers. Dispatch runs
//! on the native library's call stack, so nothing a handler does (returning
//! an error, panicking) may escape it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::panic::{ self, AssertUnwindSafe };
use std::str::FromStr;
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };

use thiserror::Error;

use crate::native::AudioFormat;
use crate::session::NativeError;


/// Error type user handlers may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type of a user handler.
pub type HandlerResult = Result<(), HandlerError>;

type Handler = Box<dyn FnMut( &Event<'_> ) -> HandlerResult + Send>;


thread_local! {
    /// (registry address, kind) pairs whose handler is running on this thread.
    static ACTIVE: RefCell<Vec<( usize, EventKind )>> = const { RefCell::new( Vec::new() ) };
}


/// Marks a handler as running on the current thread until dropped.
struct ActiveGuard {
    key: ( usize, EventKind ),
}


impl ActiveGuard {
    /// Returns `None` if the same handler is already running on this thread.
    fn enter( key: ( usize, EventKind ) ) -> Option<Self> {
        ACTIVE.with( |active| {
            let mut active = active.borrow_mut();
            if active.contains( &key ) {
                return None;
            }
            active.push( key );
            Some( Self { key } )
        })
    }
}


impl Drop for ActiveGuard {
    fn drop( &mut self ) {
        ACTIVE.with( |active| {
            let mut active = active.borrow_mut();
            if let Some( index ) = active.iter().rposition( |key| *key == self.key ) {
                active.remove( index );
            }
        });
    }
}


/// Returned when parsing an unknown event name.
#[derive( Debug, Error )]
#[error( "Unknown event: {0}" )]
pub struct UnknownEvent( pub String );


/// Registration slots, one per public event.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash )]
pub enum EventKind {
    Login,
    Logout,
    MetadataUpdated,
    ConnectionError,
    MessageToUser,
    Notification,
    MusicDelivery,
    LostPlayToken,
    LogMessage,
}


impl EventKind {
    /// Every slot, in declaration order.
    pub const ALL: [EventKind; 9] = [
        EventKind::Login,
        EventKind::Logout,
        EventKind::MetadataUpdated,
        EventKind::ConnectionError,
        EventKind::MessageToUser,
        EventKind::Notification,
        EventKind::MusicDelivery,
        EventKind::LostPlayToken,
        EventKind::LogMessage,
    ];


    /// Public name of the event.
    pub fn name( &self ) -> &'static str {
        match self {
            EventKind::Login => "login",
            EventKind::Logout => "logout",
            EventKind::MetadataUpdated => "metadataUpdated",
            EventKind::ConnectionError => "connectionError",
            EventKind::MessageToUser => "messageToUser",
            EventKind::Notification => "notification",
            EventKind::MusicDelivery => "musicDelivery",
            EventKind::LostPlayToken => "lostPlayToken",
            EventKind::LogMessage => "logMessage",
        }
    }
}


impl fmt::Display for EventKind {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        f.write_str( self.name() )
    }
}


impl FromStr for EventKind {
    type Err = UnknownEvent;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find( |kind| kind.name() == s )
            .ok_or_else( || UnknownEvent( s.to_string() ) )
    }
}


/// Audio handed over by the native library.
#[derive( Debug, Clone, Copy, PartialEq )]
pub struct AudioDelivery<'a> {
    pub format: AudioFormat,
    /// Interleaved samples, `num_frames * channels` long.
    pub frames: &'a [i16],
    pub num_frames: usize,
}


/// An event as seen by user handlers.
#[derive( Debug, Clone, PartialEq )]
pub enum Event<'a> {
    /// Outcome of an asynchronous login request.
    Login( Result<(), NativeError> ),
    Logout,
    MetadataUpdated,
    ConnectionError { code: i32 },
    MessageToUser( &'a str ),
    /// The native library asked to be pumped soon.
    Notification,
    MusicDelivery( AudioDelivery<'a> ),
    LostPlayToken,
    LogMessage( &'a str ),
}


impl Event<'_> {
    pub fn kind( &self ) -> EventKind {
        match self {
            Event::Login( _ ) => EventKind::Login,
            Event::Logout => EventKind::Logout,
            Event::MetadataUpdated => EventKind::MetadataUpdated,
            Event::ConnectionError { .. } => EventKind::ConnectionError,
            Event::MessageToUser( _ ) => EventKind::MessageToUser,
            Event::Notification => EventKind::Notification,
            Event::MusicDelivery( _ ) => EventKind::MusicDelivery,
            Event::LostPlayToken => EventKind::LostPlayToken,
            Event::LogMessage( _ ) => EventKind::LogMessage,
        }
    }
}


/// What happened to a dispatched event.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum Dispatch {
    /// The registered handler ran and returned `Ok`.
    Handled,
    /// No handler is registered for the event.
    Unhandled,
    /// The handler returned an error or panicked. Already logged.
    Failed,
    /// The handler for this kind is already running on this thread; the
    /// nested event was dropped.
    Reentrant,
}


/// Event-kind to handler mapping.
///
/// Handlers run without the registry lock held, so a handler may register
/// or replace handlers (including its own) while it runs.
#[derive( Default )]
pub struct CallbackRegistry {
    handlers: Mutex<HashMap<EventKind, Arc<Mutex<Handler>>>>,
}


impl CallbackRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }


    /// Installs `handler` for `kind`, replacing any previous one.
    pub fn register<F>( &self, kind: EventKind, handler: F )
    where
        F: FnMut( &Event<'_> ) -> HandlerResult + Send + 'static,
    {
        let handler: Handler = Box::new( handler );
        let replaced = self.slots().insert( kind, Arc::new( Mutex::new( handler ) ) );
        tracing::debug!(
            "Registered handler for {}{}",
            kind,
            if replaced.is_some() { " (replaced)" } else { "" }
        );
    }


    /// Removes the handler for `kind`. Returns whether one was registered.
    pub fn unregister( &self, kind: EventKind ) -> bool {
        self.slots().remove( &kind ).is_some()
    }


    pub fn is_registered( &self, kind: EventKind ) -> bool {
        self.slots().contains_key( &kind )
    }


    /// Invokes the handler registered for the event's kind, if any.
    ///
    /// Never panics and never returns the handler's error; failures are
    /// logged and reported as [`Dispatch::Failed`]. An event raised from
    /// inside its own kind's handler on the same thread is not delivered.
    pub fn dispatch( &self, event: &Event<'_> ) -> Dispatch {
        let kind = event.kind();
        let handler = match self.slots().get( &kind ) {
            Some( handler ) => Arc::clone( handler ),
            None => {
                tracing::trace!( "No handler for {}", kind );
                return Dispatch::Unhandled;
            }
        };

        let Some( _active ) = ActiveGuard::enter( ( self as *const Self as usize, kind ) ) else {
            tracing::warn!( "Dropping nested {} event raised from its own handler", kind );
            return Dispatch::Reentrant;
        };

        let mut handler = handler.lock().unwrap_or_else( PoisonError::into_inner );
        match panic::catch_unwind( AssertUnwindSafe( || ( &mut **handler )( event ) ) ) {
            Ok( Ok( () ) ) => Dispatch::Handled,
            Ok( Err( e ) ) => {
                tracing::error!( "Handler for {} failed: {}", kind, e );
                Dispatch::Failed
            }
            Err( payload ) => {
                tracing::error!( "Handler for {} panicked: {}", kind, panic_message( payload.as_ref() ) );
                Dispatch::Failed
            }
        }
    }


    fn slots( &self ) -> MutexGuard<'_, HashMap<EventKind, Arc<Mutex<Handler>>>> {
        self.handlers.lock().unwrap_or_else( PoisonError::into_inner )
    }
}


impl fmt::Debug for CallbackRegistry {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        let mut kinds: Vec<_> = self.slots().keys().map( |k| k.name() ).collect();
        kinds.sort_unstable();
        f.debug_struct( "CallbackRegistry" ).field( "registered", &kinds ).finish()
    }
}


fn panic_message( payload: &( dyn std::any::Any + Send ) ) -> &str {
    if let Some( s ) = payload.downcast_ref::<&str>() {
        s
    } else if let Some( s ) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use std::sync::atomic::{ AtomicUsize, Ordering };
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;


    #[test]
    fn test_dispatch_invokes_registered_handler_once() {
        let registry = CallbackRegistry::new();
        let seen = Arc::new( Mutex::new( Vec::new() ) );
        let seen_clone = Arc::clone( &seen );

        registry.register( EventKind::MessageToUser, move |event| {
            if let Event::MessageToUser( msg ) = event {
                seen_clone.lock().unwrap().push( msg.to_string() );
            }
            Ok(())
        });

        let outcome = registry.dispatch( &Event::MessageToUser( "hello" ) );

        assert_eq!( outcome, Dispatch::Handled );
        assert_eq!( *seen.lock().unwrap(), vec![ "hello".to_string() ] );
    }


    #[test]
    fn test_dispatch_unregistered_is_noop() {
        let registry = CallbackRegistry::new();
        assert_eq!( registry.dispatch( &Event::Logout ), Dispatch::Unhandled );
        assert_eq!( registry.dispatch( &Event::ConnectionError { code: 3 } ), Dispatch::Unhandled );
    }


    #[test]
    fn test_last_registration_wins() {
        let registry = CallbackRegistry::new();
        let first = Arc::new( AtomicUsize::new( 0 ) );
        let second = Arc::new( AtomicUsize::new( 0 ) );

        let counter = Arc::clone( &first );
        registry.register( EventKind::Logout, move |_| {
            counter.fetch_add( 1, Ordering::SeqCst );
            Ok(())
        });
        let counter = Arc::clone( &second );
        registry.register( EventKind::Logout, move |_| {
            counter.fetch_add( 1, Ordering::SeqCst );
            Ok(())
        });

        registry.dispatch( &Event::Logout );

        assert_eq!( first.load( Ordering::SeqCst ), 0 );
        assert_eq!( second.load( Ordering::SeqCst ), 1 );
    }


    #[test]
    fn test_handler_only_sees_its_own_kind() {
        let registry = CallbackRegistry::new();
        let calls = Arc::new( AtomicUsize::new( 0 ) );
        let counter = Arc::clone( &calls );
        registry.register( EventKind::Login, move |_| {
            counter.fetch_add( 1, Ordering::SeqCst );
            Ok(())
        });

        registry.dispatch( &Event::Logout );
        registry.dispatch( &Event::MetadataUpdated );

        assert_eq!( calls.load( Ordering::SeqCst ), 0 );
    }


    #[test]
    fn test_handler_error_is_contained() {
        let registry = CallbackRegistry::new();
        registry.register( EventKind::LostPlayToken, |_| Err( "boom".into() ) );

        assert_eq!( registry.dispatch( &Event::LostPlayToken ), Dispatch::Failed );
    }


    #[test]
    fn test_handler_panic_is_contained() {
        let registry = CallbackRegistry::new();
        registry.register( EventKind::MetadataUpdated, |_| panic!( "handler blew up" ) );

        assert_eq!( registry.dispatch( &Event::MetadataUpdated ), Dispatch::Failed );
        // The slot stays usable after a panic.
        assert_eq!( registry.dispatch( &Event::MetadataUpdated ), Dispatch::Failed );
    }


    #[test]
    fn test_handler_can_replace_itself_during_dispatch() {
        let registry = Arc::new( CallbackRegistry::new() );
        let replaced = Arc::new( AtomicUsize::new( 0 ) );

        let inner_registry = Arc::clone( &registry );
        let counter = Arc::clone( &replaced );
        registry.register( EventKind::Notification, move |_| {
            let counter = Arc::clone( &counter );
            inner_registry.register( EventKind::Notification, move |_| {
                counter.fetch_add( 1, Ordering::SeqCst );
                Ok(())
            });
            Ok(())
        });

        assert_eq!( registry.dispatch( &Event::Notification ), Dispatch::Handled );
        assert_eq!( replaced.load( Ordering::SeqCst ), 0 );

        registry.dispatch( &Event::Notification );
        assert_eq!( replaced.load( Ordering::SeqCst ), 1 );
    }


    #[test]
    fn test_nested_same_kind_dispatch_returns() {
        let registry = Arc::new( CallbackRegistry::new() );
        let inner_outcome = Arc::new( Mutex::new( None ) );
        let calls = Arc::new( AtomicUsize::new( 0 ) );

        let inner_registry = Arc::clone( &registry );
        let outcome = Arc::clone( &inner_outcome );
        let counter = Arc::clone( &calls );
        registry.register( EventKind::LogMessage, move |_| {
            counter.fetch_add( 1, Ordering::SeqCst );
            let nested = inner_registry.dispatch( &Event::LogMessage( "nested" ) );
            *outcome.lock().unwrap() = Some( nested );
            Ok(())
        });

        let ( tx, rx ) = mpsc::channel();
        let outer_registry = Arc::clone( &registry );
        thread::spawn( move || {
            let _ = tx.send( outer_registry.dispatch( &Event::LogMessage( "outer" ) ) );
        });

        let outer = rx.recv_timeout( Duration::from_secs( 2 ) ).expect( "nested dispatch deadlocked" );
        assert_eq!( outer, Dispatch::Handled );
        assert_eq!( *inner_outcome.lock().unwrap(), Some( Dispatch::Reentrant ) );
        assert_eq!( calls.load( Ordering::SeqCst ), 1 );

        // The slot is usable again once the outer call has returned.
        assert_eq!( registry.dispatch( &Event::LogMessage( "again" ) ), Dispatch::Handled );
        assert_eq!( calls.load( Ordering::SeqCst ), 2 );
    }


    #[test]
    fn test_nested_dispatch_of_other_kind_is_delivered() {
        let registry = Arc::new( CallbackRegistry::new() );
        let seen = Arc::new( AtomicUsize::new( 0 ) );

        let counter = Arc::clone( &seen );
        registry.register( EventKind::MetadataUpdated, move |_| {
            counter.fetch_add( 1, Ordering::SeqCst );
            Ok(())
        });
        let inner_registry = Arc::clone( &registry );
        registry.register( EventKind::Notification, move |_| {
            assert_eq!( inner_registry.dispatch( &Event::MetadataUpdated ), Dispatch::Handled );
            Ok(())
        });

        assert_eq!( registry.dispatch( &Event::Notification ), Dispatch::Handled );
        assert_eq!( seen.load( Ordering::SeqCst ), 1 );
    }


    #[test]
    fn test_unregister() {
        let registry = CallbackRegistry::new();
        registry.register( EventKind::LogMessage, |_| Ok(()) );

        assert!( registry.is_registered( EventKind::LogMessage ) );
        assert!( registry.unregister( EventKind::LogMessage ) );
        assert!( !registry.unregister( EventKind::LogMessage ) );
        assert_eq!( registry.dispatch( &Event::LogMessage( "x" ) ), Dispatch::Unhandled );
    }


    #[test]
    fn test_event_kind_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!( kind.name().parse::<EventKind>().unwrap(), kind );
        }
        assert!( "playlistAdded".parse::<EventKind>().is_err() );
    }
}
