//! Output text normalization. The built-in PDF fonts only cover ASCII
//! reliably, so everything drawn goes through `sanitize` first and then
//! through `split_markers` to pick out trademark and registered marks.

const ENTITIES: [(&str, &str); 9] = [
    ("&trade;", "\u{2122}"),
    ("&reg;", "\u{00ae}"),
    ("&copy;", "\u{00a9}"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&nbsp;", " "),
    ("&amp;", "&"),
];

/// Maps typographic characters and common symbols to ASCII equivalents.
/// Any other non-ASCII character becomes a space.
pub fn sanitize(text: &str) -> String {
    to_ascii(&decode_entities(text))
}

fn decode_entities(text: &str) -> String {
    let mut decoded = text.to_string();
    for (entity, replacement) in ENTITIES {
        if decoded.contains(entity) {
            decoded = decoded.replace(entity, replacement);
        }
    }
    decoded
}

fn to_ascii(decoded: &str) -> String {
    let mut out = String::with_capacity(decoded.len());
    for c in decoded.chars() {
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201a}' | '\u{2032}' => out.push('\''),
            '\u{201c}' | '\u{201d}' | '\u{201e}' | '\u{2033}' => out.push('"'),
            '\u{2013}' | '\u{2014}' | '\u{2012}' | '\u{2212}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{2122}' => out.push_str("TM"),
            '\u{00ae}' => out.push_str("(R)"),
            '\u{00a9}' => out.push_str("(c)"),
            '\u{00b0}' => out.push_str(" deg"),
            '\u{20ac}' => out.push_str("EUR"),
            '\u{00a3}' => out.push_str("GBP"),
            '\u{00a5}' => out.push_str("JPY"),
            '\u{00bd}' => out.push_str("1/2"),
            '\u{00bc}' => out.push_str("1/4"),
            '\u{00be}' => out.push_str("3/4"),
            '\u{221e}' => out.push_str("infinity"),
            '\u{00b1}' => out.push_str("+/-"),
            '\u{2264}' => out.push_str("<="),
            '\u{2265}' => out.push_str(">="),
            '\u{00f7}' => out.push('/'),
            '\u{00d7}' => out.push('x'),
            '\u{2022}' | '\u{00b7}' => out.push('-'),
            '\t' => out.push(' '),
            c if c.is_ascii() && (!c.is_ascii_control() || c == '\n') => out.push(c),
            _ => out.push(' '),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Trademark,
    Registered,
}

impl Marker {
    pub fn glyph(self) -> &'static str {
        match self {
            Marker::Trademark => "TM",
            Marker::Registered => "(R)",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Mark(Marker),
}

/// Sanitizes `text` and splits it into drawable runs and marks. Trademark and
/// registered sign characters always become marks; the ASCII spellings inside
/// each run go through `split_markers`.
pub fn marked(text: &str) -> Vec<Segment> {
    let decoded = decode_entities(text);
    let mut segments = Vec::new();
    let mut start = 0;

    for (i, c) in decoded.char_indices() {
        let mark = match c {
            '\u{2122}' => Marker::Trademark,
            '\u{00ae}' => Marker::Registered,
            _ => continue,
        };
        segments.extend(split_markers(&to_ascii(&decoded[start..i])));
        segments.push(Segment::Mark(mark));
        start = i + c.len_utf8();
    }
    segments.extend(split_markers(&to_ascii(&decoded[start..])));
    segments
}

/// Splits sanitized text around `TM` and `(R)` marks. `TM` only counts when
/// it closes a word that is not itself upper case, so "HTML" stays intact.
pub fn split_markers(text: &str) -> Vec<Segment> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let marker = if bytes[i..].starts_with(b"(R)") {
            Some((Marker::Registered, 3))
        } else if bytes[i..].starts_with(b"TM") && is_trademark_at(bytes, i) {
            Some((Marker::Trademark, 2))
        } else {
            None
        };

        match marker {
            Some((mark, len)) => {
                if start < i {
                    segments.push(Segment::Text(text[start..i].to_string()));
                }
                segments.push(Segment::Mark(mark));
                i += len;
                start = i;
            }
            None => i += 1,
        }
    }

    if start < bytes.len() {
        segments.push(Segment::Text(text[start..].to_string()));
    }
    segments
}

fn is_trademark_at(bytes: &[u8], i: usize) -> bool {
    let prev_upper = i > 0 && bytes[i - 1].is_ascii_uppercase();
    let next_alnum = bytes.get(i + 2).is_some_and(u8::is_ascii_alphanumeric);
    !prev_upper && !next_alnum
}
