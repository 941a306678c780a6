//! In-memory native layer for tests.
//!
//! Hands out fake handles, counts every acquire and release, and replays
//! scripted callbacks from `session_process_events`.

use std::collections::{ HashMap, VecDeque };
use std::ffi::c_void;
use std::sync::{ Arc, Mutex, MutexGuard };

use crate::config::SessionConfig;
use crate::resolver::LinkType;

use super::{ AudioFormat, EventSink, HandleKind, NativeApi, NativeEvent, RawHandle };


#[derive( Debug, Clone )]
pub struct MockAlbum {
    pub name: String,
    pub year: i32,
    pub artist: Option<String>,
}


#[derive( Debug, Clone )]
pub struct MockTrack {
    pub name: String,
    /// `None` entries make `track_artist` return null at that index.
    pub artists: Vec<Option<String>>,
    pub album: Option<MockAlbum>,
}


#[derive( Debug, Clone )]
struct MockLink {
    link_type: i32,
    canonical: String,
    /// `None` makes `link_as_track` return null.
    track: Option<MockTrack>,
}


/// Owned form of a scripted callback.
#[derive( Debug, Clone )]
pub enum MockEvent {
    LoggedIn( i32 ),
    LoggedOut,
    MetadataUpdated,
    ConnectionError( i32 ),
    MessageToUser( String ),
    NotifyMainThread,
    MusicDelivery { channels: i32, frames: Vec<i16> },
    PlayTokenLost,
    LogMessage( String ),
}


impl MockEvent {
    fn as_native( &self ) -> NativeEvent<'_> {
        match self {
            MockEvent::LoggedIn( error ) => NativeEvent::LoggedIn { error: *error },
            MockEvent::LoggedOut => NativeEvent::LoggedOut,
            MockEvent::MetadataUpdated => NativeEvent::MetadataUpdated,
            MockEvent::ConnectionError( error ) => NativeEvent::ConnectionError { error: *error },
            MockEvent::MessageToUser( msg ) => NativeEvent::MessageToUser( msg ),
            MockEvent::NotifyMainThread => NativeEvent::NotifyMainThread,
            MockEvent::MusicDelivery { channels, frames } => NativeEvent::MusicDelivery {
                format: AudioFormat { sample_type: 0, sample_rate: 44100, channels: *channels },
                frames,
                num_frames: frames.len() / ( *channels ).max( 1 ) as usize,
            },
            MockEvent::PlayTokenLost => NativeEvent::PlayTokenLost,
            MockEvent::LogMessage( msg ) => NativeEvent::LogMessage( msg ),
        }
    }
}


#[derive( Debug, Clone )]
enum Target {
    Link( MockLink ),
    Track( MockTrack ),
    Album( MockAlbum ),
    Artist( String ),
    User,
}


#[derive( Default )]
struct MockState {
    next_id: usize,
    links: HashMap<String, MockLink>,
    live: HashMap<usize, ( HandleKind, Target )>,
    acquired: usize,
    released: usize,
    session: Option<RawHandle>,
    sessions_created: usize,
    logins: Vec<( String, String )>,
    logouts: usize,
    pumps: VecDeque<( i32, Vec<MockEvent> )>,
    pump_calls: usize,
    create_status: i32,
    login_status: i32,
    logout_status: i32,
    user: Option<( String, String )>,
    config_snapshot: Option<( usize, String )>,
}


/// Counting fake of the native library.
#[derive( Default )]
pub struct MockNative {
    state: Mutex<MockState>,
    sink: Mutex<Option<Arc<dyn EventSink>>>,
}


impl MockNative {
    pub fn new() -> Self {
        Self::default()
    }


    fn state( &self ) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }


    /// Registers a track link resolving to `track`.
    pub fn with_track( self, uri: &str, track: MockTrack ) -> Self {
        self.state().links.insert( uri.to_string(), MockLink {
            link_type: LinkType::Track.raw(),
            canonical: uri.to_string(),
            track: Some( track ),
        });
        self
    }


    /// Registers a link of an arbitrary raw type with no track behind it.
    pub fn with_link( self, uri: &str, link_type: i32 ) -> Self {
        self.state().links.insert( uri.to_string(), MockLink {
            link_type,
            canonical: uri.to_string(),
            track: None,
        });
        self
    }


    /// Registers a link whose serialized form differs from the input.
    pub fn with_canonical( self, uri: &str, canonical: &str ) -> Self {
        self.state().links.insert( uri.to_string(), MockLink {
            link_type: LinkType::Track.raw(),
            canonical: canonical.to_string(),
            track: None,
        });
        self
    }


    pub fn with_user( self, canonical: &str, display: &str ) -> Self {
        self.state().user = Some(( canonical.to_string(), display.to_string() ));
        self
    }


    pub fn fail_session_create( &self, code: i32 ) {
        self.state().create_status = code;
    }


    pub fn fail_login( &self, code: i32 ) {
        self.state().login_status = code;
    }


    pub fn fail_logout( &self, code: i32 ) {
        self.state().logout_status = code;
    }


    /// Queues one pump: its callbacks and the interval it writes back.
    pub fn push_pump( &self, timeout_ms: i32, events: Vec<MockEvent> ) {
        self.state().pumps.push_back(( timeout_ms, events ));
    }


    /// Delivers a callback immediately, as a native internal thread would.
    pub fn emit( &self, event: MockEvent ) -> usize {
        let sink = self.sink.lock().unwrap().clone().expect( "no session created" );
        sink.deliver( event.as_native() )
    }


    pub fn acquired( &self ) -> usize {
        self.state().acquired
    }


    pub fn released( &self ) -> usize {
        self.state().released
    }


    pub fn live_handles( &self ) -> usize {
        self.state().live.len()
    }


    pub fn sessions_created( &self ) -> usize {
        self.state().sessions_created
    }


    pub fn logins( &self ) -> Vec<( String, String )> {
        self.state().logins.clone()
    }


    pub fn logouts( &self ) -> usize {
        self.state().logouts
    }


    pub fn pump_calls( &self ) -> usize {
        self.state().pump_calls
    }


    /// Credential length and user agent seen at session creation.
    pub fn config_snapshot( &self ) -> Option<( usize, String )> {
        self.state().config_snapshot.clone()
    }


    fn acquire( &self, kind: HandleKind, target: Target ) -> RawHandle {
        let mut state = self.state();
        state.next_id += 1;
        let id = state.next_id;
        state.live.insert( id, ( kind, target ) );
        state.acquired += 1;
        RawHandle::from_ptr( ( id * 8 ) as *mut c_void ).unwrap()
    }


    fn target( &self, handle: RawHandle ) -> Target {
        let id = handle.as_ptr() as usize / 8;
        self.state().live.get( &id ).map( |( _, t )| t.clone() ).expect( "use of a released handle" )
    }


    fn track( &self, handle: RawHandle ) -> MockTrack {
        match self.target( handle ) {
            Target::Track( track ) => track,
            other => panic!( "expected track, got {:?}", other ),
        }
    }


    fn album( &self, handle: RawHandle ) -> MockAlbum {
        match self.target( handle ) {
            Target::Album( album ) => album,
            other => panic!( "expected album, got {:?}", other ),
        }
    }


    fn link( &self, handle: RawHandle ) -> MockLink {
        match self.target( handle ) {
            Target::Link( link ) => link,
            other => panic!( "expected link, got {:?}", other ),
        }
    }
}


impl NativeApi for MockNative {
    fn error_message( &self, code: i32 ) -> String {
        format!( "mock error {}", code )
    }


    fn session_create(
        &self,
        config: &SessionConfig,
        sink: Arc<dyn EventSink>,
    ) -> Result<RawHandle, i32> {
        let mut state = self.state();
        state.sessions_created += 1;
        if state.create_status != 0 {
            return Err( state.create_status );
        }
        state.config_snapshot = Some((
            config.credential_len(),
            config.user_agent().to_string_lossy().into_owned(),
        ));
        let session = RawHandle::from_ptr( 0xfff8 as *mut c_void ).unwrap();
        state.session = Some( session );
        drop( state );

        *self.sink.lock().unwrap() = Some( sink );
        Ok( session )
    }


    fn session_login( &self, session: RawHandle, user: &str, password: &str ) -> i32 {
        let mut state = self.state();
        assert_eq!( state.session, Some( session ) );
        state.logins.push(( user.to_string(), password.to_string() ));
        state.login_status
    }


    fn session_logout( &self, session: RawHandle ) -> i32 {
        let mut state = self.state();
        assert_eq!( state.session, Some( session ) );
        state.logouts += 1;
        state.logout_status
    }


    fn session_process_events( &self, _session: RawHandle ) -> i32 {
        let ( timeout, events ) = {
            let mut state = self.state();
            state.pump_calls += 1;
            state.pumps.pop_front().unwrap_or(( 1000, Vec::new() ))
        };

        let sink = self.sink.lock().unwrap().clone();
        if let Some( sink ) = sink {
            for event in &events {
                sink.deliver( event.as_native() );
            }
        }
        timeout
    }


    fn session_user( &self, _session: RawHandle ) -> Option<RawHandle> {
        let has_user = self.state().user.is_some();
        has_user.then( || self.acquire( HandleKind::User, Target::User ) )
    }


    fn link_create_from_string( &self, uri: &str ) -> Option<RawHandle> {
        let link = self.state().links.get( uri ).cloned()?;
        Some( self.acquire( HandleKind::Link, Target::Link( link ) ) )
    }


    fn link_type( &self, link: RawHandle ) -> i32 {
        self.link( link ).link_type
    }


    fn link_as_string( &self, link: RawHandle, buf: &mut [u8] ) -> usize {
        let canonical = self.link( link ).canonical;
        let bytes = canonical.as_bytes();
        if !buf.is_empty() {
            let n = bytes.len().min( buf.len() - 1 );
            buf[ ..n ].copy_from_slice( &bytes[ ..n ] );
            buf[ n ] = 0;
        }
        bytes.len()
    }


    fn link_as_track( &self, link: RawHandle ) -> Option<RawHandle> {
        let track = self.link( link ).track?;
        Some( self.acquire( HandleKind::Track, Target::Track( track ) ) )
    }


    fn track_name( &self, track: RawHandle ) -> String {
        self.track( track ).name
    }


    fn track_num_artists( &self, track: RawHandle ) -> usize {
        self.track( track ).artists.len()
    }


    fn track_artist( &self, track: RawHandle, index: usize ) -> Option<RawHandle> {
        let name = self.track( track ).artists.get( index ).cloned().flatten()?;
        Some( self.acquire( HandleKind::Artist, Target::Artist( name ) ) )
    }


    fn track_album( &self, track: RawHandle ) -> Option<RawHandle> {
        let album = self.track( track ).album?;
        Some( self.acquire( HandleKind::Album, Target::Album( album ) ) )
    }


    fn album_name( &self, album: RawHandle ) -> String {
        self.album( album ).name
    }


    fn album_year( &self, album: RawHandle ) -> i32 {
        self.album( album ).year
    }


    fn album_artist( &self, album: RawHandle ) -> Option<RawHandle> {
        let name = self.album( album ).artist?;
        Some( self.acquire( HandleKind::Artist, Target::Artist( name ) ) )
    }


    fn artist_name( &self, artist: RawHandle ) -> String {
        match self.target( artist ) {
            Target::Artist( name ) => name,
            other => panic!( "expected artist, got {:?}", other ),
        }
    }


    fn user_canonical_name( &self, _user: RawHandle ) -> String {
        self.state().user.clone().map( |( c, _ )| c ).unwrap_or_default()
    }


    fn user_display_name( &self, _user: RawHandle ) -> String {
        self.state().user.clone().map( |( _, d )| d ).unwrap_or_default()
    }


    fn release( &self, kind: HandleKind, handle: RawHandle ) {
        let id = handle.as_ptr() as usize / 8;
        let mut state = self.state();
        match state.live.remove( &id ) {
            Some(( live_kind, _ )) => assert_eq!( live_kind, kind, "released with the wrong kind" ),
            None => panic!( "{:?} handle {:?} released twice or never acquired", kind, handle ),
        }
        state.released += 1;
    }
}
