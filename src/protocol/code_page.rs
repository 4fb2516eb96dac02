//! Code page 437 text conversion.
//!
//! Strings on the wire are single-byte CP437. Peers that have not negotiated
//! `FullCP437` only render printable ASCII, so text sent to them has every
//! other character replaced by a close ASCII stand-in.

use ahash::AHashMap;
use once_cell::sync::Lazy;

/// Glyphs for bytes 0x00..0x20.
const LOW_GLYPHS: [char; 32] = [
    '\0', '☺', '☻', '♥', '♦', '♣', '♠', '•', '◘', '○', '◙', '♂', '♀', '♪', '♫', '☼', //
    '►', '◄', '↕', '‼', '¶', '§', '▬', '↨', '↑', '↓', '→', '←', '∟', '↔', '▲', '▼',
];

/// Glyphs for bytes 0x7F..=0xFF.
const HIGH_GLYPHS: [char; 129] = [
    '⌂', //
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', //
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ', //
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»', //
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐', //
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧', //
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀', //
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩', //
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{a0}',
];

/// ASCII stand-ins used when the peer cannot render the full code page.
const FALLBACKS: &[(char, char)] = &[
    ('Ç', 'C'),
    ('ü', 'u'),
    ('é', 'e'),
    ('â', 'a'),
    ('ä', 'a'),
    ('à', 'a'),
    ('å', 'a'),
    ('ç', 'c'),
    ('ê', 'e'),
    ('ë', 'e'),
    ('è', 'e'),
    ('ï', 'i'),
    ('î', 'i'),
    ('ì', 'i'),
    ('Ä', 'A'),
    ('Å', 'A'),
    ('É', 'E'),
    ('æ', 'a'),
    ('Æ', 'A'),
    ('ô', 'o'),
    ('ö', 'o'),
    ('ò', 'o'),
    ('û', 'u'),
    ('ù', 'u'),
    ('ÿ', 'y'),
    ('Ö', 'O'),
    ('Ü', 'U'),
    ('á', 'a'),
    ('í', 'i'),
    ('ó', 'o'),
    ('ú', 'u'),
    ('ñ', 'n'),
    ('Ñ', 'N'),
    ('•', '*'),
    ('·', '.'),
    ('∙', '.'),
    ('«', '<'),
    ('»', '>'),
    ('─', '-'),
    ('│', '|'),
    ('\u{a0}', ' '),
];

static ENCODE_TABLE: Lazy<AHashMap<char, u8>> = Lazy::new(|| {
    (0..=u8::MAX).map(|byte| (decode_byte(byte), byte)).collect()
});

static FALLBACK_TABLE: Lazy<AHashMap<char, char>> =
    Lazy::new(|| FALLBACKS.iter().copied().collect());

/// Which characters may be sent to a peer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TextEncoding {
    /// Printable ASCII only.
    #[default]
    Restricted,
    /// Every CP437 glyph.
    FullCodePage,
}

/// Maps one wire byte to its CP437 glyph.
pub fn decode_byte(byte: u8) -> char {
    match byte {
        0x00..=0x1F => LOW_GLYPHS[usize::from(byte)],
        0x20..=0x7E => char::from(byte),
        _ => HIGH_GLYPHS[usize::from(byte - 0x7F)],
    }
}

/// Maps a character to a wire byte for the given peer.
pub fn encode_char(c: char, encoding: TextEncoding) -> u8 {
    if (' '..='~').contains(&c) {
        return c as u8;
    }
    match encoding {
        TextEncoding::FullCodePage => ENCODE_TABLE.get(&c).copied().unwrap_or(b'?'),
        TextEncoding::Restricted => FALLBACK_TABLE
            .get(&c)
            .map(|&fallback| fallback as u8)
            .unwrap_or(b'?'),
    }
}
