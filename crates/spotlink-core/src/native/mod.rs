//! Native library boundary
//!
//! Everything the rest of the crate knows about libspotify goes through the
//! [`NativeApi`] trait. The real binding lives behind the `libspotify`
//! feature; tests drive the crate through a counting mock.

mod handle;

#[cfg( feature = "libspotify" )]
mod libspotify;
#[cfg( feature = "libspotify" )]
pub mod sys;

#[cfg( any( test, feature = "test-utils" ) )]
pub mod mock;

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::config::SessionConfig;

pub use handle::NativeHandle;
#[cfg( feature = "libspotify" )]
pub use libspotify::LibSpotify;


/// API version the session configuration is built for.
pub const API_VERSION: i32 = 1;


/// Opaque pointer to a resource owned by the native library.
///
/// Carries no ownership by itself; see [`NativeHandle`] for the owning form.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash )]
pub struct RawHandle( NonNull<c_void> );

// SAFETY: a RawHandle is only an address. Every dereference happens inside
// the native library, and callers serialize native calls per the session
// thread discipline.
unsafe impl Send for RawHandle {}
unsafe impl Sync for RawHandle {}


impl RawHandle {
    /// Wraps a native pointer, returning `None` for null.
    pub fn from_ptr( ptr: *mut c_void ) -> Option<Self> {
        NonNull::new( ptr ).map( Self )
    }


    /// Returns the underlying pointer.
    pub fn as_ptr( &self ) -> *mut c_void {
        self.0.as_ptr()
    }
}


/// Kind of resource a handle refers to. Selects the matching release call.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash )]
pub enum HandleKind {
    Link,
    Track,
    Album,
    Artist,
    User,
}


/// Audio format attached to a music delivery.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub struct AudioFormat {
    /// Native sample type; 0 is signed 16-bit native endian.
    pub sample_type: i32,
    pub sample_rate: i32,
    pub channels: i32,
}


/// A callback as raised by the native library, before any interpretation.
#[derive( Debug, Clone, Copy, PartialEq )]
pub enum NativeEvent<'a> {
    LoggedIn { error: i32 },
    LoggedOut,
    MetadataUpdated,
    ConnectionError { error: i32 },
    MessageToUser( &'a str ),
    NotifyMainThread,
    MusicDelivery { format: AudioFormat, frames: &'a [i16], num_frames: usize },
    PlayTokenLost,
    LogMessage( &'a str ),
}


/// Receiver for native callbacks.
///
/// Installed once at session creation. Implementations must never unwind;
/// they run on the native library's call stack.
pub trait EventSink: Send + Sync {
    /// Handles one native callback.
    ///
    /// @returns The number of frames consumed for music deliveries, 0 otherwise
    fn deliver( &self, event: NativeEvent<'_> ) -> usize;
}


/// The set of native entry points this crate consumes.
///
/// Every method returning a [`RawHandle`] hands out a reference the caller
/// owns and must give back through [`NativeApi::release`] exactly once.
/// A `None` return means the native call produced a null pointer.
pub trait NativeApi: Send + Sync {
    /// Translates a native error code into its message.
    fn error_message( &self, code: i32 ) -> String;

    /// Creates the session. `sink` receives every callback for the rest of the
    /// process. `config` must stay alive as long as the session does.
    fn session_create(
        &self,
        config: &SessionConfig,
        sink: Arc<dyn EventSink>,
    ) -> Result<RawHandle, i32>;

    /// Issues the asynchronous login request. Returns the native status.
    fn session_login( &self, session: RawHandle, user: &str, password: &str ) -> i32;

    /// Issues the asynchronous logout request. Returns the native status.
    fn session_logout( &self, session: RawHandle ) -> i32;

    /// Runs pending native work, possibly invoking callbacks.
    ///
    /// @returns The recommended wait in milliseconds before the next call
    fn session_process_events( &self, session: RawHandle ) -> i32;

    /// The user currently logged in on `session`, if any.
    fn session_user( &self, session: RawHandle ) -> Option<RawHandle>;

    fn link_create_from_string( &self, uri: &str ) -> Option<RawHandle>;
    fn link_type( &self, link: RawHandle ) -> i32;

    /// Serializes a link into `buf`, returning the full length of the URI
    /// (which may exceed the buffer), as `snprintf` does.
    fn link_as_string( &self, link: RawHandle, buf: &mut [u8] ) -> usize;
    fn link_as_track( &self, link: RawHandle ) -> Option<RawHandle>;

    fn track_name( &self, track: RawHandle ) -> String;
    fn track_num_artists( &self, track: RawHandle ) -> usize;
    fn track_artist( &self, track: RawHandle, index: usize ) -> Option<RawHandle>;
    fn track_album( &self, track: RawHandle ) -> Option<RawHandle>;

    fn album_name( &self, album: RawHandle ) -> String;
    fn album_year( &self, album: RawHandle ) -> i32;
    fn album_artist( &self, album: RawHandle ) -> Option<RawHandle>;

    fn artist_name( &self, artist: RawHandle ) -> String;

    fn user_canonical_name( &self, user: RawHandle ) -> String;
    fn user_display_name( &self, user: RawHandle ) -> String;

    /// Gives back a handle obtained from any acquiring call above.
    fn release( &self, kind: HandleKind, handle: RawHandle );
}
