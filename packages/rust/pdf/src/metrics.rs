//! Helvetica glyph metrics and WinAnsi encoding for footer text.
//!
//! Footer labels are set in the standard Type 1 Helvetica font, which every
//! PDF viewer provides without embedding. Widths are the AFM advance widths
//! in 1/1000 em, so centering works for proportional text of any length.

/// Advance widths for WinAnsi codes 32..=126.
const ASCII_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a'..'m'
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n'..'z'
    334, 260, 334, 584, // '{'..'~'
];

/// Width used for codes without a specific entry.
const DEFAULT_WIDTH: u16 = 556;

/// Byte substituted for characters WinAnsi cannot represent.
const REPLACEMENT: u8 = b'?';

/// Encode text as WinAnsi (the encoding declared on the footer font).
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars().map(win_ansi_code).collect()
}

fn win_ansi_code(ch: char) -> u8 {
    match ch {
        ' '..='~' => ch as u8,
        '\u{A0}'..='\u{FF}' => ch as u32 as u8,
        '€' => 0x80,
        '‚' => 0x82,
        'ƒ' => 0x83,
        '„' => 0x84,
        '…' => 0x85,
        '†' => 0x86,
        '‡' => 0x87,
        'ˆ' => 0x88,
        '‰' => 0x89,
        'Š' => 0x8A,
        '‹' => 0x8B,
        'Œ' => 0x8C,
        'Ž' => 0x8E,
        '‘' => 0x91,
        '’' => 0x92,
        '“' => 0x93,
        '”' => 0x94,
        '•' => 0x95,
        '–' => 0x96,
        '—' => 0x97,
        '˜' => 0x98,
        '™' => 0x99,
        'š' => 0x9A,
        '›' => 0x9B,
        'œ' => 0x9C,
        'ž' => 0x9E,
        'Ÿ' => 0x9F,
        _ => REPLACEMENT,
    }
}

/// Advance width of a WinAnsi code in 1/1000 em.
pub fn glyph_width(code: u8) -> u16 {
    match code {
        32..=126 => ASCII_WIDTHS[(code - 32) as usize],
        0x85 | 0x97 | 0x99 => 1000,
        0x89 => 1000,
        0x8C | 0xC6 => 1000,
        0x91 | 0x92 | 0x82 => 222,
        0x93 | 0x94 | 0x84 => 333,
        0x95 => 350,
        0x8B | 0x9B => 333,
        0x9C | 0xE6 => 889,
        0xA0 | 0xB7 => 278,
        0xA9 | 0xAE => 737,
        0xB0 => 400,
        0xC0..=0xC5 | 0xC8..=0xCB | 0xDD | 0xDE => 667,
        0xC7 | 0xD0 | 0xD1 | 0xD9..=0xDC => 722,
        0xCC..=0xCF | 0xEC..=0xEF => 278,
        0xD2..=0xD6 | 0xD8 => 778,
        0xD7 | 0xF7 => 584,
        0xDF | 0xF8 => 611,
        0xE7 | 0xFD | 0xFF => 500,
        _ => DEFAULT_WIDTH,
    }
}

/// Rendered width in points of `text` at `font_size`.
pub fn text_width(text: &str, font_size: f32) -> f32 {
    let units: u32 = encode_win_ansi(text)
        .into_iter()
        .map(|code| u32::from(glyph_width(code)))
        .sum();
    units as f32 * font_size / 1000.0
}
