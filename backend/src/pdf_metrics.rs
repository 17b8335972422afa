// lopdf knows nothing about font metrics, that is a viewer thing...
// The overlay only uses the standard Helvetica Type1 font, so its advance widths
// (from the well known Helvetica.afm, in 1/1000 em) are tabulated here for the
// glyphs reachable through WinAnsiEncoding.

/// Measures rendered text width, in points.
pub trait TextMeasure {
    fn string_width(&self, text: &str, font: &str, size: f32) -> f32;
}

impl<F> TextMeasure for F
where
    F: Fn(&str, &str, f32) -> f32,
{
    fn string_width(&self, text: &str, font: &str, size: f32) -> f32 {
        self(text, font, size)
    }
}

/// Metrics of the standard (non-embedded) PDF fonts the overlay can use.
#[derive(Copy, Clone, Debug, Default)]
pub struct StandardFontMetrics;

impl TextMeasure for StandardFontMetrics {
    fn string_width(&self, text: &str, _font: &str, size: f32) -> f32 {
        measure_helvetica(text) as f32 * size / 1000.0
    }
}

pub fn has_metrics(font: &str) -> bool {
    font == "Helvetica"
}

// U+0020..=U+007E
const ASCII_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0'..'?'
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P'..'_'
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`'..'o'
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 'p'..'~'
];

// U+00A0..=U+00FF
const LATIN1_WIDTHS: [u16; 96] = [
    278, 333, 556, 556, 556, 556, 260, 556, 333, 737, 370, 556, 584, 333, 737, 333, // nbsp..macron
    400, 584, 333, 333, 333, 556, 537, 278, 333, 333, 365, 556, 834, 834, 834, 611, // degree..questiondown
    667, 667, 667, 667, 667, 667, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278, // À..Ï
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611, // Ð..ß
    556, 556, 556, 556, 556, 556, 889, 500, 556, 556, 556, 556, 278, 278, 278, 278, // à..ï
    556, 556, 556, 556, 556, 556, 556, 584, 611, 556, 556, 556, 556, 500, 556, 500, // ð..ÿ
];

// WinAnsi code points outside Latin-1, sorted by char: (char, code, width).
const WIN_ANSI_EXTRA: &[(char, (u8, u16))] = &[
    ('\u{0152}', (0x8C, 1000)), // OE
    ('\u{0153}', (0x9C, 944)),  // oe
    ('\u{0160}', (0x8A, 667)),  // Scaron
    ('\u{0161}', (0x9A, 500)),  // scaron
    ('\u{0178}', (0x9F, 667)),  // Ydieresis
    ('\u{017D}', (0x8E, 611)),  // Zcaron
    ('\u{017E}', (0x9E, 500)),  // zcaron
    ('\u{0192}', (0x83, 556)),  // florin
    ('\u{02C6}', (0x88, 333)),  // circumflex
    ('\u{02DC}', (0x98, 333)),  // tilde
    ('\u{2013}', (0x96, 556)),  // endash
    ('\u{2014}', (0x97, 1000)), // emdash
    ('\u{2018}', (0x91, 222)),  // quoteleft
    ('\u{2019}', (0x92, 222)),  // quoteright
    ('\u{201A}', (0x82, 222)),  // quotesinglbase
    ('\u{201C}', (0x93, 333)),  // quotedblleft
    ('\u{201D}', (0x94, 333)),  // quotedblright
    ('\u{201E}', (0x84, 333)),  // quotedblbase
    ('\u{2020}', (0x86, 556)),  // dagger
    ('\u{2021}', (0x87, 556)),  // daggerdbl
    ('\u{2022}', (0x95, 350)),  // bullet
    ('\u{2026}', (0x85, 1000)), // ellipsis
    ('\u{2030}', (0x89, 1000)), // perthousand
    ('\u{2039}', (0x8B, 333)),  // guilsinglleft
    ('\u{203A}', (0x9B, 333)),  // guilsinglright
    ('\u{20AC}', (0x80, 556)),  // Euro
    ('\u{2122}', (0x99, 1000)), // trademark
];

/// Stands in for glyphs WinAnsiEncoding can't express.
const REPLACEMENT: u8 = b'?';

fn find_in_vec_tuple<V>(key: char, data: &[(char, V)]) -> Option<&V> {
    let i = data.binary_search_by_key(&key, |(a, _)| *a).ok()?;
    Some(&data[i].1)
}

/// WinAnsi code and Helvetica width of `c`, if the encoding has it.
fn glyph(c: char) -> Option<(u8, u16)> {
    match c {
        ' '..='~' => Some((c as u8, ASCII_WIDTHS[c as usize - 0x20])),
        '\u{A0}'..='\u{FF}' => Some((c as u8, LATIN1_WIDTHS[c as usize - 0xA0])),
        _ => find_in_vec_tuple(c, WIN_ANSI_EXTRA).copied(),
    }
}

/// Width of `text` in Helvetica, in 1/1000 em.
///
/// Glyphs outside WinAnsiEncoding are measured as the `?` they are drawn as.
pub fn measure_helvetica(text: &str) -> u32 {
    let fallback = ASCII_WIDTHS[(REPLACEMENT - 0x20) as usize];
    text.chars()
        .map(|c| glyph(c).map_or(fallback, |(_, w)| w) as u32)
        .sum()
}

/// Encodes `text` as WinAnsiEncoding bytes for a Type1 `Tj` string.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| glyph(c).map_or(REPLACEMENT, |(code, _)| code))
        .collect()
}
