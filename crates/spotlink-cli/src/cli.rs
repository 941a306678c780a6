//! Command-line argument parsing for Spotlink.

use std::path::PathBuf;

use clap::{ Parser, Subcommand };


/// Spotlink - log in to Spotify and resolve links from the terminal.
#[derive( Parser, Debug )]
#[command( name = "spotlink" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Application key file. Overrides the settings file.
    #[arg( short, long, global = true )]
    pub key_file: Option<PathBuf>,

    /// Cache directory for the native session.
    #[arg( long, global = true )]
    pub cache: Option<PathBuf>,

    /// Settings directory for the native session.
    #[arg( long, global = true )]
    pub settings: Option<PathBuf>,

    /// Log debug output.
    #[arg( short, long, global = true )]
    pub verbose: bool,

    #[command( subcommand )]
    pub command: Command,
}


#[derive( Subcommand, Debug )]
pub enum Command {
    /// Log in and pump events until the session logs out.
    Login {
        user: String,
        password: String,
    },

    /// Log in, print metadata for each URI as JSON, then exit.
    Resolve {
        user: String,
        password: String,

        #[arg( required = true )]
        uris: Vec<String>,
    },
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_resolve() {
        let args = Args::parse_from( [
            "spotlink", "resolve", "alice", "secret",
            "spotify:track:a", "spotify:track:b", "--key-file", "app.key",
        ] );

        assert_eq!( args.key_file, Some( PathBuf::from( "app.key" ) ) );
        match args.command {
            Command::Resolve { user, uris, .. } => {
                assert_eq!( user, "alice" );
                assert_eq!( uris.len(), 2 );
            }
            other => panic!( "unexpected command {:?}", other ),
        }
    }


    #[test]
    fn test_resolve_requires_uri() {
        assert!( Args::try_parse_from( [ "spotlink", "resolve", "alice", "secret" ] ).is_err() );
    }


    #[test]
    fn test_verbose_is_global() {
        let args = Args::try_parse_from( [ "spotlink", "login", "-v", "alice", "secret" ] ).unwrap();
        assert!( args.verbose );
    }
}
