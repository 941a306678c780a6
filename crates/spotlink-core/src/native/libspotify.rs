//! libspotify binding
//!
//! Implements [`NativeApi`] over the raw declarations in [`super::sys`] and
//! installs the session callback table. Handles that libspotify lends out
//! (tracks, albums, artists, users) get an extra reference here so every
//! handle returned to callers is owned and released the same way.

use std::borrow::Cow;
use std::ffi::{ c_void, CStr, CString };
use std::panic::{ self, AssertUnwindSafe };
use std::ptr;
use std::slice;
use std::sync::Arc;

use libc::{ c_char, c_int };

use crate::config::SessionConfig;

use super::sys;
use super::{ AudioFormat, EventSink, HandleKind, NativeApi, NativeEvent, RawHandle };


/// The callback table handed to `sp_session_init`. Fixed for the life of the
/// process; every slot forwards into the session's [`EventSink`].
static CALLBACKS: sys::sp_session_callbacks = sys::sp_session_callbacks {
    logged_in: Some( logged_in ),
    logged_out: Some( logged_out ),
    metadata_updated: Some( metadata_updated ),
    connection_error: Some( connection_error ),
    message_to_user: Some( message_to_user ),
    notify_main_thread: Some( notify_main_thread ),
    music_delivery: Some( music_delivery ),
    play_token_lost: Some( play_token_lost ),
    log_message: Some( log_message ),
};


/// The native libspotify library.
#[derive( Debug, Default )]
pub struct LibSpotify {
    _private: (),
}


impl LibSpotify {
    pub fn new() -> Self {
        Self::default()
    }
}


fn handle<T>( ptr: *mut T ) -> Option<RawHandle> {
    RawHandle::from_ptr( ptr.cast() )
}


/// Copies a native string. Null reads as empty.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn read_str<'a>( ptr: *const c_char ) -> Cow<'a, str> {
    if ptr.is_null() {
        Cow::Borrowed( "" )
    } else {
        CStr::from_ptr( ptr ).to_string_lossy()
    }
}


impl NativeApi for LibSpotify {
    fn error_message( &self, code: i32 ) -> String {
        // SAFETY: sp_error_message returns a static string for any code.
        unsafe { read_str( sys::sp_error_message( code ) ).into_owned() }
    }


    fn session_create(
        &self,
        config: &SessionConfig,
        sink: Arc<dyn EventSink>,
    ) -> Result<RawHandle, i32> {
        // Leaked on success: callbacks may arrive until the process exits.
        let userdata = Box::into_raw( Box::new( sink ) );

        let raw_config = sys::sp_session_config {
            api_version: config.api_version(),
            cache_location: config.cache_location().as_ptr(),
            settings_location: config.settings_location().as_ptr(),
            application_key: config.credential().as_ptr().cast(),
            application_key_size: config.credential_len(),
            user_agent: config.user_agent().as_ptr(),
            callbacks: &CALLBACKS,
            userdata: userdata.cast(),
        };

        let mut session: *mut sys::sp_session = ptr::null_mut();
        // SAFETY: every pointer in raw_config outlives the call; the buffers
        // it points into are owned by `config`, which the caller keeps alive.
        let status = unsafe { sys::sp_session_init( &raw_config, &mut session ) };

        match ( status, handle( session ) ) {
            ( sys::SP_ERROR_OK, Some( session ) ) => Ok( session ),
            ( status, _ ) => {
                // SAFETY: no session exists, so nothing refers to userdata.
                drop( unsafe { Box::from_raw( userdata ) } );
                Err( if status == sys::SP_ERROR_OK { sys::SP_ERROR_OTHER_PERMANENT } else { status } )
            }
        }
    }


    fn session_login( &self, session: RawHandle, user: &str, password: &str ) -> i32 {
        let ( Ok( user ), Ok( password ) ) = ( CString::new( user ), CString::new( password ) ) else {
            return sys::SP_ERROR_INVALID_INDATA;
        };
        // SAFETY: session came from sp_session_init; strings outlive the call.
        unsafe { sys::sp_session_login( session.as_ptr().cast(), user.as_ptr(), password.as_ptr() ) }
    }


    fn session_logout( &self, session: RawHandle ) -> i32 {
        unsafe { sys::sp_session_logout( session.as_ptr().cast() ) }
    }


    fn session_process_events( &self, session: RawHandle ) -> i32 {
        let mut next_timeout: c_int = 0;
        unsafe { sys::sp_session_process_events( session.as_ptr().cast(), &mut next_timeout ) };
        next_timeout
    }


    fn session_user( &self, session: RawHandle ) -> Option<RawHandle> {
        unsafe {
            let user = sys::sp_session_user( session.as_ptr().cast() );
            if !user.is_null() {
                sys::sp_user_add_ref( user );
            }
            handle( user )
        }
    }


    fn link_create_from_string( &self, uri: &str ) -> Option<RawHandle> {
        let uri = CString::new( uri ).ok()?;
        handle( unsafe { sys::sp_link_create_from_string( uri.as_ptr() ) } )
    }


    fn link_type( &self, link: RawHandle ) -> i32 {
        unsafe { sys::sp_link_type( link.as_ptr().cast() ) }
    }


    fn link_as_string( &self, link: RawHandle, buf: &mut [u8] ) -> usize {
        let size = buf.len().min( c_int::MAX as usize ) as c_int;
        let len = unsafe { sys::sp_link_as_string( link.as_ptr().cast(), buf.as_mut_ptr().cast(), size ) };
        len.max( 0 ) as usize
    }


    fn link_as_track( &self, link: RawHandle ) -> Option<RawHandle> {
        unsafe {
            let track = sys::sp_link_as_track( link.as_ptr().cast() );
            if !track.is_null() {
                sys::sp_track_add_ref( track );
            }
            handle( track )
        }
    }


    fn track_name( &self, track: RawHandle ) -> String {
        unsafe { read_str( sys::sp_track_name( track.as_ptr().cast() ) ).into_owned() }
    }


    fn track_num_artists( &self, track: RawHandle ) -> usize {
        unsafe { sys::sp_track_num_artists( track.as_ptr().cast() ).max( 0 ) as usize }
    }


    fn track_artist( &self, track: RawHandle, index: usize ) -> Option<RawHandle> {
        let index = c_int::try_from( index ).ok()?;
        unsafe {
            let artist = sys::sp_track_artist( track.as_ptr().cast(), index );
            if !artist.is_null() {
                sys::sp_artist_add_ref( artist );
            }
            handle( artist )
        }
    }


    fn track_album( &self, track: RawHandle ) -> Option<RawHandle> {
        unsafe {
            let album = sys::sp_track_album( track.as_ptr().cast() );
            if !album.is_null() {
                sys::sp_album_add_ref( album );
            }
            handle( album )
        }
    }


    fn album_name( &self, album: RawHandle ) -> String {
        unsafe { read_str( sys::sp_album_name( album.as_ptr().cast() ) ).into_owned() }
    }


    fn album_year( &self, album: RawHandle ) -> i32 {
        unsafe { sys::sp_album_year( album.as_ptr().cast() ) }
    }


    fn album_artist( &self, album: RawHandle ) -> Option<RawHandle> {
        unsafe {
            let artist = sys::sp_album_artist( album.as_ptr().cast() );
            if !artist.is_null() {
                sys::sp_artist_add_ref( artist );
            }
            handle( artist )
        }
    }


    fn artist_name( &self, artist: RawHandle ) -> String {
        unsafe { read_str( sys::sp_artist_name( artist.as_ptr().cast() ) ).into_owned() }
    }


    fn user_canonical_name( &self, user: RawHandle ) -> String {
        unsafe { read_str( sys::sp_user_canonical_name( user.as_ptr().cast() ) ).into_owned() }
    }


    fn user_display_name( &self, user: RawHandle ) -> String {
        unsafe { read_str( sys::sp_user_display_name( user.as_ptr().cast() ) ).into_owned() }
    }


    fn release( &self, kind: HandleKind, handle: RawHandle ) {
        let ptr = handle.as_ptr();
        // SAFETY: callers release each owned handle exactly once.
        unsafe {
            match kind {
                HandleKind::Link => sys::sp_link_release( ptr.cast() ),
                HandleKind::Track => sys::sp_track_release( ptr.cast() ),
                HandleKind::Album => sys::sp_album_release( ptr.cast() ),
                HandleKind::Artist => sys::sp_artist_release( ptr.cast() ),
                HandleKind::User => sys::sp_user_release( ptr.cast() ),
            }
        }
    }
}


/// Hands a callback to the session's sink without letting a panic cross
/// back into native code.
///
/// # Safety
/// `session` must be a session created by [`LibSpotify::session_create`].
unsafe fn forward( session: *mut sys::sp_session, event: NativeEvent<'_> ) -> usize {
    let userdata = sys::sp_session_userdata( session ) as *const Arc<dyn EventSink>;
    let Some( sink ) = userdata.as_ref() else {
        return 0;
    };

    panic::catch_unwind( AssertUnwindSafe( || sink.deliver( event ) ) ).unwrap_or_else( |_| {
        tracing::error!( "Session callback panicked" );
        0
    })
}


unsafe extern "C" fn logged_in( session: *mut sys::sp_session, error: sys::sp_error ) {
    forward( session, NativeEvent::LoggedIn { error } );
}


unsafe extern "C" fn logged_out( session: *mut sys::sp_session ) {
    forward( session, NativeEvent::LoggedOut );
}


unsafe extern "C" fn metadata_updated( session: *mut sys::sp_session ) {
    forward( session, NativeEvent::MetadataUpdated );
}


unsafe extern "C" fn connection_error( session: *mut sys::sp_session, error: sys::sp_error ) {
    forward( session, NativeEvent::ConnectionError { error } );
}


unsafe extern "C" fn message_to_user( session: *mut sys::sp_session, message: *const c_char ) {
    let message = read_str( message );
    forward( session, NativeEvent::MessageToUser( &message ) );
}


unsafe extern "C" fn notify_main_thread( session: *mut sys::sp_session ) {
    forward( session, NativeEvent::NotifyMainThread );
}


unsafe extern "C" fn music_delivery(
    session: *mut sys::sp_session,
    format: *const sys::sp_audioformat,
    frames: *const c_void,
    num_frames: c_int,
) -> c_int {
    let Some( format ) = format.as_ref() else {
        return 0;
    };
    let num_frames = num_frames.max( 0 ) as usize;
    let samples = num_frames * format.channels.max( 0 ) as usize;
    let frames: &[i16] = if frames.is_null() || samples == 0 {
        &[]
    } else {
        slice::from_raw_parts( frames.cast(), samples )
    };

    let format = AudioFormat {
        sample_type: format.sample_type,
        sample_rate: format.sample_rate,
        channels: format.channels,
    };
    let consumed = forward( session, NativeEvent::MusicDelivery { format, frames, num_frames } );
    consumed.min( c_int::MAX as usize ) as c_int
}


unsafe extern "C" fn play_token_lost( session: *mut sys::sp_session ) {
    forward( session, NativeEvent::PlayTokenLost );
}


unsafe extern "C" fn log_message( session: *mut sys::sp_session, data: *const c_char ) {
    let data = read_str( data );
    forward( session, NativeEvent::LogMessage( &data ) );
}
