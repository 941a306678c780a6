//! Spotlink CLI - Spotify session host and link resolver

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ bail, Context, Result };
use clap::Parser;
use tracing::Level;

use spotlink_core::native::LibSpotify;
use spotlink_core::Client;

use spotlink_cli::host::{ await_login, install_handlers, session_config };
use spotlink_cli::{ Args, Command, Settings };


/// Sends log output to stderr so resolved JSON on stdout stays clean.
fn init_logging( verbose: bool ) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    tracing_subscriber::fmt()
        .with_max_level( level )
        .with_writer( std::io::stderr )
        .with_target( false )
        .init();
}


fn main() -> Result<()> {
    let args = Args::parse();
    let loaded = Settings::load();
    let settings = loaded.as_ref().cloned().unwrap_or_default();

    init_logging( args.verbose || settings.verbose );
    if let Err( e ) = &loaded {
        tracing::warn!( "Using default settings: {:#}", e );
    }

    let builder = session_config( &args, &settings );
    tracing::debug!( "Application key: {:?}", builder.key_file() );

    let stop = Arc::new( AtomicBool::new( false ) );
    let mut client = Client::new( LibSpotify::new() );
    client.configure( builder );
    if let Some( ms ) = settings.max_pump_interval_ms {
        client.max_pump_interval( Duration::from_millis( ms ) );
    }
    install_handlers( &mut client, &stop );

    match &args.command {
        Command::Login { user, password } => {
            client.login( user, password ).context( "Failed to start login" )?;
            await_login( &client )?;

            if let Some( user ) = client.current_user() {
                tracing::info!( "Session user: {} ({})", user.display_name, user.canonical_name );
            }

            client.run_until( &stop )?;
        }

        Command::Resolve { user, password, uris } => {
            client.login( user, password ).context( "Failed to start login" )?;
            await_login( &client )?;

            let mut failures = 0;
            for uri in uris {
                match client.resolve( uri ) {
                    Ok( record ) => println!( "{}", serde_json::to_string_pretty( &record )? ),
                    Err( e ) => {
                        tracing::error!( "{}", e );
                        failures += 1;
                    }
                }
            }

            if failures > 0 {
                bail!( "{} of {} links failed to resolve", failures, uris.len() );
            }
        }
    }

    Ok(())
}
