//! Owned native handles.

use std::fmt;

use super::{ HandleKind, NativeApi, RawHandle };


/// A native reference released exactly once, when the guard is dropped.
///
/// Acquire-then-wrap must happen in one expression so no early return can
/// slip between the native call and the guard.
pub struct NativeHandle<'a, A: NativeApi + ?Sized> {
    api: &'a A,
    kind: HandleKind,
    raw: RawHandle,
}


impl<'a, A: NativeApi + ?Sized> NativeHandle<'a, A> {
    /// Takes ownership of `raw`.
    pub fn new( api: &'a A, kind: HandleKind, raw: RawHandle ) -> Self {
        Self { api, kind, raw }
    }


    /// Takes ownership of the result of an acquiring native call, if non-null.
    pub fn acquire( api: &'a A, kind: HandleKind, raw: Option<RawHandle> ) -> Option<Self> {
        raw.map( |raw| Self::new( api, kind, raw ) )
    }


    pub fn raw( &self ) -> RawHandle {
        self.raw
    }


    pub fn kind( &self ) -> HandleKind {
        self.kind
    }
}


impl<A: NativeApi + ?Sized> Drop for NativeHandle<'_, A> {
    fn drop( &mut self ) {
        tracing::trace!( "Releasing {:?} handle {:?}", self.kind, self.raw );
        self.api.release( self.kind, self.raw );
    }
}


impl<A: NativeApi + ?Sized> fmt::Debug for NativeHandle<'_, A> {
    fn fmt( &self, f: &mut fmt::Formatter<'_> ) -> fmt::Result {
        f.debug_struct( "NativeHandle" )
            .field( "kind", &self.kind )
            .field( "raw", &self.raw )
            .finish()
    }
}


#[cfg( test )]
mod tests {
    use super::*;

    use crate::native::mock::MockNative;


    const URI: &str = "spotify:album:2mCuMNdJkoyiXFhsQCLLqw";


    #[test]
    fn test_release_on_drop() {
        let api = MockNative::new().with_link( URI, 2 );

        {
            let link = NativeHandle::acquire( &api, HandleKind::Link, api.link_create_from_string( URI ) )
                .unwrap();
            assert_eq!( link.kind(), HandleKind::Link );
            assert_eq!( api.live_handles(), 1 );
        }

        assert_eq!( api.acquired(), 1 );
        assert_eq!( api.released(), 1 );
        assert_eq!( api.live_handles(), 0 );
    }


    #[test]
    fn test_acquire_null_is_none() {
        let api = MockNative::new();

        let link = NativeHandle::acquire( &api, HandleKind::Link, api.link_create_from_string( URI ) );

        assert!( link.is_none() );
        assert_eq!( api.released(), 0 );
    }


    #[test]
    fn test_release_on_early_return() {
        fn read_type( api: &MockNative, bail: bool ) -> Result<i32, ()> {
            let link = NativeHandle::acquire( api, HandleKind::Link, api.link_create_from_string( URI ) )
                .ok_or(())?;
            if bail {
                return Err(());
            }
            Ok( api.link_type( link.raw() ) )
        }

        let api = MockNative::new().with_link( URI, 2 );

        assert_eq!( read_type( &api, true ), Err(()) );
        assert_eq!( read_type( &api, false ), Ok( 2 ) );
        assert_eq!( api.live_handles(), 0 );
    }
}
