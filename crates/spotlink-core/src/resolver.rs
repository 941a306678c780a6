//! Link resolution
//!
//! Turns a URI into a native link and, for track links, into a
//! [`MetadataRecord`]. Every handle taken during the walk is held in a
//! [`NativeHandle`] guard, so each one is released exactly once whichever
//! way the walk ends.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::native::{ HandleKind, NativeApi, NativeHandle };


/// Initial buffer size for link serialization.
const LINK_BUFFER_LEN: usize = 256;


/// Errors that can occur while resolving a link.
#[derive( Debug, Clone, PartialEq, Eq, Error )]
pub enum ResolveError {
    #[error( "Invalid link: {0}" )]
    InvalidLink( String ),

    #[error( "Unsupported link type {kind} for {uri}" )]
    UnsupportedLinkType { uri: String, kind: LinkType },

    #[error( "Link {0} does not refer to a track" )]
    TypeMismatch( String ),

    #[error( "No session has been created" )]
    NoSession,
}


/// Native link discriminant.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize )]
#[serde( rename_all = "lowercase" )]
pub enum LinkType {
    Invalid,
    Track,
    Album,
    Artist,
    Search,
    Playlist,
}


/// Raw discriminants in the native ABI.
const LINK_TYPES: [( i32, LinkType ); 6] = [
    ( 0, LinkType::Invalid ),
    ( 1, LinkType::Track ),
    ( 2, LinkType::Album ),
    ( 3, LinkType::Artist ),
    ( 4, LinkType::Search ),
    ( 5, LinkType::Playlist ),
];


impl LinkType {
    /// Decodes a native discriminant. `None` for values this crate doesn't know.
    pub fn from_raw( raw: i32 ) -> Option<Self> {
        LINK_TYPES.iter().find( |( r, _ )| *r == raw ).map( |( _, t )| *t )
    }


    pub fn raw( &self ) -> i32 {
        LINK_TYPES.iter().find( |( _, t )| t == self ).map( |( r, _ )| *r ).unwrap_or( 0 )
    }


    pub fn as_str( &self ) -> &'static str {
        match self {
            LinkType::Invalid => "invalid",
            LinkType::Track => "track",
            LinkType::Album => "album",
            LinkType::Artist => "artist",
            LinkType::Search => "search",
            LinkType::Playlist => "playlist",
        }
    }
}


impl fmt::Display for LinkType {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        f.write_str( self.as_str() )
    }
}


/// Album part of a resolved track.
#[derive( Debug, Clone, PartialEq, Eq, Serialize )]
pub struct AlbumRecord {
    #[serde( skip_serializing_if = "Option::is_none" )]
    pub artist: Option<String>,
    pub name: String,
    pub year: i32,
}


/// Structured metadata of a resolved link.
#[derive( Debug, Clone, PartialEq, Eq, Serialize )]
pub struct MetadataRecord {
    #[serde( rename = "type" )]
    pub link_type: LinkType,
    pub name: String,
    /// Artist names in native enumeration order. Null artists are skipped.
    pub artists: Vec<String>,
    pub album: Option<AlbumRecord>,
}


/// Resolves URIs through the native link API.
pub struct LinkResolver<A: NativeApi> {
    api: Arc<A>,
}


impl<A: NativeApi> LinkResolver<A> {
    pub fn new( api: Arc<A> ) -> Self {
        Self { api }
    }


    /// Resolves `uri` into a metadata record.
    ///
    /// Only track links are supported; other recognized types fail with
    /// [`ResolveError::UnsupportedLinkType`].
    pub fn resolve( &self, uri: &str ) -> Result<MetadataRecord, ResolveError> {
        let link = self.parse( uri )?;

        let result = match self.classify( &link, uri )? {
            LinkType::Track => self.resolve_track( &link, uri ),
            kind => Err( ResolveError::UnsupportedLinkType { uri: uri.to_string(), kind } ),
        };

        match &result {
            Ok( record ) => tracing::debug!( "Resolved {} -> {:?}", uri, record ),
            Err( e ) => tracing::debug!( "Failed to resolve {}: {}", uri, e ),
        }
        result
    }


    /// Classifies `uri` without resolving it.
    pub fn link_type( &self, uri: &str ) -> Result<LinkType, ResolveError> {
        let link = self.parse( uri )?;
        self.classify( &link, uri )
    }


    /// Returns the native library's serialized form of `uri`.
    pub fn canonical_uri( &self, uri: &str ) -> Result<String, ResolveError> {
        let link = self.parse( uri )?;

        let mut buf = vec![ 0u8; LINK_BUFFER_LEN ];
        let mut len = self.api.link_as_string( link.raw(), &mut buf );
        if len >= buf.len() {
            buf.resize( len + 1, 0 );
            len = self.api.link_as_string( link.raw(), &mut buf );
        }
        let len = len.min( buf.len().saturating_sub( 1 ) );

        Ok( String::from_utf8_lossy( &buf[ ..len ] ).into_owned() )
    }


    fn parse( &self, uri: &str ) -> Result<NativeHandle<'_, A>, ResolveError> {
        let api = self.api.as_ref();
        NativeHandle::acquire( api, HandleKind::Link, api.link_create_from_string( uri ) )
            .ok_or_else( || ResolveError::InvalidLink( uri.to_string() ) )
    }


    fn classify( &self, link: &NativeHandle<'_, A>, uri: &str ) -> Result<LinkType, ResolveError> {
        let raw = self.api.link_type( link.raw() );
        match LinkType::from_raw( raw ) {
            Some( LinkType::Invalid ) | None => {
                tracing::debug!( "Link {} has unusable type {}", uri, raw );
                Err( ResolveError::InvalidLink( uri.to_string() ) )
            }
            Some( kind ) => Ok( kind ),
        }
    }


    fn resolve_track(
        &self,
        link: &NativeHandle<'_, A>,
        uri: &str,
    ) -> Result<MetadataRecord, ResolveError> {
        let api = self.api.as_ref();

        let track = NativeHandle::acquire( api, HandleKind::Track, api.link_as_track( link.raw() ) )
            .ok_or_else( || ResolveError::TypeMismatch( uri.to_string() ) )?;

        let name = api.track_name( track.raw() );

        let artists = ( 0..api.track_num_artists( track.raw() ) )
            .filter_map( |index| {
                NativeHandle::acquire( api, HandleKind::Artist, api.track_artist( track.raw(), index ) )
            })
            .map( |artist| api.artist_name( artist.raw() ) )
            .collect();

        let album = NativeHandle::acquire( api, HandleKind::Album, api.track_album( track.raw() ) )
            .map( |album| {
                let name = api.album_name( album.raw() );
                let year = api.album_year( album.raw() );
                let artist = NativeHandle::acquire( api, HandleKind::Artist, api.album_artist( album.raw() ) )
                    .map( |artist| api.artist_name( artist.raw() ) );
                AlbumRecord { artist, name, year }
            });

        Ok( MetadataRecord {
            link_type: LinkType::Track,
            name,
            artists,
            album,
        })
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use crate::native::mock::{ MockAlbum, MockNative, MockTrack };


    const SONG_URI: &str = "spotify:track:6JEK0CvvjDjjMUBFoXShNZ";


    fn song() -> MockTrack {
        MockTrack {
            name: "Song".into(),
            artists: vec![ Some( "A".into() ), Some( "B".into() ) ],
            album: Some( MockAlbum { name: "Album".into(), year: 2020, artist: Some( "C".into() ) } ),
        }
    }


    fn setup( mock: MockNative ) -> ( Arc<MockNative>, LinkResolver<MockNative> ) {
        let api = Arc::new( mock );
        ( Arc::clone( &api ), LinkResolver::new( api ) )
    }


    #[test]
    fn test_resolve_track() {
        let ( api, resolver ) = setup( MockNative::new().with_track( SONG_URI, song() ) );

        let record = resolver.resolve( SONG_URI ).unwrap();

        assert_eq!( record, MetadataRecord {
            link_type: LinkType::Track,
            name: "Song".into(),
            artists: vec![ "A".into(), "B".into() ],
            album: Some( AlbumRecord { artist: Some( "C".into() ), name: "Album".into(), year: 2020 } ),
        });
        // link, track, two artists, album, album artist
        assert_eq!( api.acquired(), 6 );
        assert_eq!( api.released(), 6 );
        assert_eq!( api.live_handles(), 0 );
    }


    #[test]
    fn test_resolve_track_json_shape() {
        let ( _api, resolver ) = setup( MockNative::new().with_track( SONG_URI, song() ) );

        let json = serde_json::to_value( resolver.resolve( SONG_URI ).unwrap() ).unwrap();

        assert_eq!( json, serde_json::json!({
            "type": "track",
            "name": "Song",
            "artists": [ "A", "B" ],
            "album": { "artist": "C", "name": "Album", "year": 2020 },
        }));
    }


    #[test]
    fn test_resolve_skips_null_artists_and_album() {
        let track = MockTrack {
            name: "Lonely".into(),
            artists: vec![ None, Some( "B".into() ), None ],
            album: None,
        };
        let ( api, resolver ) = setup( MockNative::new().with_track( SONG_URI, track ) );

        let record = resolver.resolve( SONG_URI ).unwrap();

        assert_eq!( record.artists, vec![ "B".to_string() ] );
        assert_eq!( record.album, None );
        assert_eq!( api.acquired(), api.released() );
        assert_eq!( api.live_handles(), 0 );
    }


    #[test]
    fn test_resolve_album_without_artist() {
        let track = MockTrack {
            name: "Song".into(),
            artists: Vec::new(),
            album: Some( MockAlbum { name: "Various".into(), year: 1999, artist: None } ),
        };
        let ( api, resolver ) = setup( MockNative::new().with_track( SONG_URI, track ) );

        let record = resolver.resolve( SONG_URI ).unwrap();

        assert!( record.artists.is_empty() );
        assert_eq!( record.album, Some( AlbumRecord { artist: None, name: "Various".into(), year: 1999 } ) );
        assert_eq!( api.live_handles(), 0 );
    }


    #[test]
    fn test_resolve_unparseable_uri() {
        let ( api, resolver ) = setup( MockNative::new() );

        let result = resolver.resolve( "not a uri" );

        assert_eq!( result, Err( ResolveError::InvalidLink( "not a uri".into() ) ) );
        assert_eq!( api.acquired(), 0 );
        assert_eq!( api.released(), 0 );
    }


    #[test]
    fn test_resolve_invalid_link_type_releases_link_once() {
        let ( api, resolver ) = setup( MockNative::new().with_link( "spotify:bogus", LinkType::Invalid.raw() ) );

        let result = resolver.resolve( "spotify:bogus" );

        assert!( matches!( result, Err( ResolveError::InvalidLink( _ ) ) ) );
        assert_eq!( api.acquired(), 1 );
        assert_eq!( api.released(), 1 );
    }


    #[test]
    fn test_resolve_unrecognized_discriminant_is_invalid() {
        let ( api, resolver ) = setup( MockNative::new().with_link( "spotify:user:x:starred", 7 ) );

        let result = resolver.resolve( "spotify:user:x:starred" );

        assert!( matches!( result, Err( ResolveError::InvalidLink( _ ) ) ) );
        assert_eq!( api.live_handles(), 0 );
    }


    #[test]
    fn test_resolve_unsupported_types() {
        for kind in [ LinkType::Album, LinkType::Artist, LinkType::Search, LinkType::Playlist ] {
            let uri = format!( "spotify:{}:x", kind );
            let ( api, resolver ) = setup( MockNative::new().with_link( &uri, kind.raw() ) );

            let result = resolver.resolve( &uri );

            assert_eq!( result, Err( ResolveError::UnsupportedLinkType { uri: uri.clone(), kind } ) );
            assert_eq!( api.acquired(), 1 );
            assert_eq!( api.released(), 1 );
        }
    }


    #[test]
    fn test_resolve_type_mismatch() {
        // Parses as a track link, but the track conversion yields null.
        let ( api, resolver ) = setup( MockNative::new().with_link( SONG_URI, LinkType::Track.raw() ) );

        let result = resolver.resolve( SONG_URI );

        assert_eq!( result, Err( ResolveError::TypeMismatch( SONG_URI.into() ) ) );
        assert_eq!( api.acquired(), 1 );
        assert_eq!( api.released(), 1 );
    }


    #[test]
    fn test_link_type() {
        let ( api, resolver ) = setup( MockNative::new()
            .with_track( SONG_URI, song() )
            .with_link( "spotify:album:x", LinkType::Album.raw() ) );

        assert_eq!( resolver.link_type( SONG_URI ), Ok( LinkType::Track ) );
        assert_eq!( resolver.link_type( "spotify:album:x" ), Ok( LinkType::Album ) );
        assert!( resolver.link_type( "nope" ).is_err() );
        assert_eq!( api.live_handles(), 0 );
    }


    #[test]
    fn test_canonical_uri_grows_buffer() {
        let long = format!( "spotify:track:{}", "x".repeat( 400 ) );
        let ( api, resolver ) = setup( MockNative::new()
            .with_canonical( "http://open.spotify.com/track/abc", "spotify:track:abc" )
            .with_canonical( "long", &long ) );

        assert_eq!( resolver.canonical_uri( "http://open.spotify.com/track/abc" ).unwrap(), "spotify:track:abc" );
        assert_eq!( resolver.canonical_uri( "long" ).unwrap(), long );
        assert_eq!( api.live_handles(), 0 );
    }


    #[test]
    fn test_link_type_table() {
        assert_eq!( LinkType::from_raw( 1 ), Some( LinkType::Track ) );
        assert_eq!( LinkType::from_raw( 5 ), Some( LinkType::Playlist ) );
        assert_eq!( LinkType::from_raw( 42 ), None );
        assert_eq!( LinkType::Artist.raw(), 3 );
    }
}
