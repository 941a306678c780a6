//! Raw libspotify declarations
//!
//! Requires the libspotify shared library at link time. Set
//! `LIBSPOTIFY_DIR` to the directory holding it if it isn't on the
//! default search path.

#![allow( non_camel_case_types )]

use libc::{ c_char, c_int, c_void, size_t };


pub type sp_error = c_int;

pub const SP_ERROR_OK: sp_error = 0;
pub const SP_ERROR_OTHER_PERMANENT: sp_error = 10;
pub const SP_ERROR_INVALID_INDATA: sp_error = 13;


macro_rules! opaque {
    ( $( $name:ident ),* ) => {
        $(
            #[repr( C )]
            pub struct $name {
                _private: [u8; 0],
            }
        )*
    };
}

opaque!( sp_session, sp_link, sp_track, sp_album, sp_artist, sp_user );


#[repr( C )]
pub struct sp_audioformat {
    pub sample_type: c_int,
    pub sample_rate: c_int,
    pub channels: c_int,
}


#[repr( C )]
pub struct sp_session_callbacks {
    pub logged_in: Option<unsafe extern "C" fn( *mut sp_session, sp_error )>,
    pub logged_out: Option<unsafe extern "C" fn( *mut sp_session )>,
    pub metadata_updated: Option<unsafe extern "C" fn( *mut sp_session )>,
    pub connection_error: Option<unsafe extern "C" fn( *mut sp_session, sp_error )>,
    pub message_to_user: Option<unsafe extern "C" fn( *mut sp_session, *const c_char )>,
    pub notify_main_thread: Option<unsafe extern "C" fn( *mut sp_session )>,
    pub music_delivery: Option<
        unsafe extern "C" fn( *mut sp_session, *const sp_audioformat, *const c_void, c_int ) -> c_int,
    >,
    pub play_token_lost: Option<unsafe extern "C" fn( *mut sp_session )>,
    pub log_message: Option<unsafe extern "C" fn( *mut sp_session, *const c_char )>,
}


#[repr( C )]
pub struct sp_session_config {
    pub api_version: c_int,
    pub cache_location: *const c_char,
    pub settings_location: *const c_char,
    pub application_key: *const c_void,
    pub application_key_size: size_t,
    pub user_agent: *const c_char,
    pub callbacks: *const sp_session_callbacks,
    pub userdata: *mut c_void,
}


#[link( name = "spotify" )]
extern "C" {
    pub fn sp_error_message( error: sp_error ) -> *const c_char;

    // --- Session ---

    pub fn sp_session_init( config: *const sp_session_config, sess: *mut *mut sp_session ) -> sp_error;
    pub fn sp_session_login(
        session: *mut sp_session,
        username: *const c_char,
        password: *const c_char,
    ) -> sp_error;
    pub fn sp_session_logout( session: *mut sp_session ) -> sp_error;
    pub fn sp_session_process_events( session: *mut sp_session, next_timeout: *mut c_int );
    pub fn sp_session_userdata( session: *mut sp_session ) -> *mut c_void;
    pub fn sp_session_user( session: *mut sp_session ) -> *mut sp_user;

    // --- Links ---

    pub fn sp_link_create_from_string( link: *const c_char ) -> *mut sp_link;
    pub fn sp_link_as_string( link: *mut sp_link, buffer: *mut c_char, buffer_size: c_int ) -> c_int;
    pub fn sp_link_type( link: *mut sp_link ) -> c_int;
    pub fn sp_link_as_track( link: *mut sp_link ) -> *mut sp_track;
    pub fn sp_link_release( link: *mut sp_link );

    // --- Tracks ---

    pub fn sp_track_name( track: *mut sp_track ) -> *const c_char;
    pub fn sp_track_num_artists( track: *mut sp_track ) -> c_int;
    pub fn sp_track_artist( track: *mut sp_track, index: c_int ) -> *mut sp_artist;
    pub fn sp_track_album( track: *mut sp_track ) -> *mut sp_album;
    pub fn sp_track_add_ref( track: *mut sp_track );
    pub fn sp_track_release( track: *mut sp_track );

    // --- Albums ---

    pub fn sp_album_name( album: *mut sp_album ) -> *const c_char;
    pub fn sp_album_year( album: *mut sp_album ) -> c_int;
    pub fn sp_album_artist( album: *mut sp_album ) -> *mut sp_artist;
    pub fn sp_album_add_ref( album: *mut sp_album );
    pub fn sp_album_release( album: *mut sp_album );

    // --- Artists ---

    pub fn sp_artist_name( artist: *mut sp_artist ) -> *const c_char;
    pub fn sp_artist_add_ref( artist: *mut sp_artist );
    pub fn sp_artist_release( artist: *mut sp_artist );

    // --- Users ---

    pub fn sp_user_canonical_name( user: *mut sp_user ) -> *const c_char;
    pub fn sp_user_display_name( user: *mut sp_user ) -> *const c_char;
    pub fn sp_user_add_ref( user: *mut sp_user );
    pub fn sp_user_release( user: *mut sp_user );
}
