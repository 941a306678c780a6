//! Spotlink Core - Session management over libspotify
//!
//! This crate drives a native libspotify session: configuration, login,
//! the cooperative event pump, callback dispatch, and resolution of
//! Spotify URIs into structured metadata.

pub mod client;
pub mod config;
pub mod native;
pub mod registry;
pub mod resolver;
pub mod session;

pub use client::Client;
pub use config::{ ConfigError, SessionConfig, SessionConfigBuilder };
pub use registry::{ CallbackRegistry, Dispatch, Event, EventKind, HandlerError, HandlerResult };
pub use resolver::{ AlbumRecord, LinkResolver, LinkType, MetadataRecord, ResolveError };
pub use session::{ LifecycleState, NativeError, SessionError, SessionLifecycle, UserInfo };
