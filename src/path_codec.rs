//! Reversible path substitution codec.
//!
//! Common directory prefixes and file extensions are replaced by single
//! control-byte tokens so asset paths with deep class-oriented layouts fit
//! the 128-byte path field.  Compression and decompression walk the same
//! table; the table below is the only copy.
//!
//! Tokens live in `0x01..=0x19`.  A path that already contains a byte in that
//! range cannot be encoded unambiguously and is rejected by the packer.

/// Version of [`SUBSTITUTIONS`].  Bump whenever a pattern or token changes;
/// archives written with one table cannot be decoded with another.
pub const TABLE_VERSION: u8 = 1;

pub const TOKEN_MIN: u8 = 0x01;
pub const TOKEN_MAX: u8 = 0x19;

/// Canonical `(pattern, token)` table, applied in order.
pub const SUBSTITUTIONS: &[(&str, u8)] = &[
    // Directories
    ("textures/",   0x01),
    ("sounds/",     0x02),
    ("models/",     0x03),
    ("shaders/",    0x04),
    ("materials/",  0x06),
    ("animations/", 0x07),
    ("ui/",         0x08),
    ("fonts/",      0x09),
    ("config/",     0x0A),
    ("levels/",     0x0B),
    ("effects/",    0x0C),
    // Textures
    (".png",        0x0D),
    (".dds",        0x0E),
    // Audio
    (".wav",        0x0F),
    (".ogg",        0x10),
    // Shaders
    (".geo",        0x11),
    (".glsl",       0x12),
    (".hlsl",       0x13),
    (".vert",       0x14),
    (".frag",       0x15),
    (".comp",       0x16),
    // Models
    (".obj",        0x17),
    (".gltf",       0x18),
    (".glb",        0x19),
];

#[inline]
pub fn is_token(byte: u8) -> bool {
    (TOKEN_MIN..=TOKEN_MAX).contains(&byte)
}

/// First byte of `path` that collides with the token range, if any.
pub fn find_reserved_byte(path: &str) -> Option<u8> {
    path.bytes().find(|&b| is_token(b))
}

/// Replace every dictionary pattern with its token.
pub fn compress(path: &str) -> String {
    let mut out = path.to_owned();
    for &(pattern, token) in SUBSTITUTIONS {
        if out.contains(pattern) {
            out = out.replace(pattern, token_str(token));
        }
    }
    out
}

/// Expand every token back to its pattern.
pub fn decompress(stored: &str) -> String {
    let mut out = stored.to_owned();
    for &(pattern, token) in SUBSTITUTIONS {
        let tok = token_str(token);
        if out.contains(tok) {
            out = out.replace(tok, pattern);
        }
    }
    out
}

fn token_str(token: u8) -> &'static str {
    // All tokens are ASCII, so each one is a valid one-byte str.
    const TOKENS: [&str; (TOKEN_MAX + 1) as usize] = [
        "\x00", "\x01", "\x02", "\x03", "\x04", "\x05", "\x06", "\x07",
        "\x08", "\x09", "\x0A", "\x0B", "\x0C", "\x0D", "\x0E", "\x0F",
        "\x10", "\x11", "\x12", "\x13", "\x14", "\x15", "\x16", "\x17",
        "\x18", "\x19",
    ];
    TOKENS[token as usize]
}
