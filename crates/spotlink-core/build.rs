fn main() {
    println!( "cargo:rerun-if-env-changed=LIBSPOTIFY_DIR" );

    // Only the native binding links against libspotify
    if std::env::var_os( "CARGO_FEATURE_LIBSPOTIFY" ).is_none() {
        return;
    }

    if let Some( dir ) = std::env::var_os( "LIBSPOTIFY_DIR" ) {
        println!( "cargo:rustc-link-search=native={}", dir.to_string_lossy() );
    }
}
