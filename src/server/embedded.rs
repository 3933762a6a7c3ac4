use rust_embed::RustEmbed;

/// Demo and admin pages compiled into the binary.
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/assets/"]
pub struct Assets;
