//! Flow layout. Content is poured top to bottom into A4 pages; a line that
//! does not fit opens a new page. The result is a plain list of draw
//! operations per page, so identical input always yields identical pages.

use super::fonts::{FontStyle, text_width};
use super::sanitize::{Marker, Segment, marked, sanitize};

pub const PAGE_WIDTH: f32 = 595.28;
pub const PAGE_HEIGHT: f32 = 841.89;
pub const MARGIN: f32 = 40.0;
pub const BANNER_HEIGHT: f32 = 110.0;

const CONTENT_TOP: f32 = BANNER_HEIGHT + 20.0;
const CONTENT_BOTTOM: f32 = PAGE_HEIGHT - MARGIN;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const LINE_SPACING: f32 = 1.35;
const SUPERSCRIPT_SCALE: f32 = 0.6;
const SUPERSCRIPT_RISE: f32 = 0.4;
const BULLET_GAP: f32 = 12.0;
const CELL_PADDING: f32 = 4.0;

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    /// `y` is the baseline, measured down from the top edge of the page.
    Text {
        x: f32,
        y: f32,
        size: f32,
        font: FontStyle,
        text: String,
    },
    Rule {
        x1: f32,
        x2: f32,
        y: f32,
        thickness: f32,
        gray: f32,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub ops: Vec<DrawOp>,
}

impl Page {
    pub fn text(&self) -> String {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { text, .. } => Some(text.as_str()),
                DrawOp::Rule { .. } => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub title: String,
    pub pages: Vec<Page>,
}

impl Layout {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// All drawn text, page by page.
    pub fn text(&self) -> String {
        self.pages
            .iter()
            .map(Page::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Index of the first page whose text contains `needle`.
    pub fn page_of(&self, needle: &str) -> Option<usize> {
        self.pages.iter().position(|page| page.text().contains(needle))
    }
}

/// A stretch of text in one face.
#[derive(Debug, Clone, Copy)]
pub struct Run<'a> {
    pub text: &'a str,
    pub font: FontStyle,
}

impl<'a> Run<'a> {
    pub fn regular(text: &'a str) -> Self {
        Self {
            text,
            font: FontStyle::Regular,
        }
    }

    pub fn bold(text: &'a str) -> Self {
        Self {
            text,
            font: FontStyle::Bold,
        }
    }

    pub fn italic(text: &'a str) -> Self {
        Self {
            text,
            font: FontStyle::Italic,
        }
    }

    pub fn bold_italic(text: &'a str) -> Self {
        Self {
            text,
            font: FontStyle::BoldItalic,
        }
    }
}

#[derive(Debug, Clone)]
struct Piece {
    text: String,
    font: FontStyle,
    superscript: bool,
}

type Word = Vec<Piece>;

/// Breaks runs into words. Runs are sanitized here, and trademark marks
/// attach to the word they follow as superscript pieces.
fn words(runs: &[Run<'_>]) -> Vec<Word> {
    let mut words = Vec::new();
    let mut current: Word = Vec::new();

    for run in runs {
        for segment in marked(run.text) {
            match segment {
                Segment::Text(text) => {
                    let mut buf = String::new();
                    for c in text.chars() {
                        if c.is_whitespace() {
                            push_piece(&mut current, &mut buf, run.font);
                            if !current.is_empty() {
                                words.push(std::mem::take(&mut current));
                            }
                        } else {
                            buf.push(c);
                        }
                    }
                    push_piece(&mut current, &mut buf, run.font);
                }
                Segment::Mark(mark) => current.push(marker_piece(mark)),
            }
        }
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn push_piece(word: &mut Word, buf: &mut String, font: FontStyle) {
    if !buf.is_empty() {
        word.push(Piece {
            text: std::mem::take(buf),
            font,
            superscript: false,
        });
    }
}

fn marker_piece(mark: Marker) -> Piece {
    Piece {
        text: mark.glyph().to_string(),
        font: FontStyle::Bold,
        superscript: true,
    }
}

fn piece_width(piece: &Piece, size: f32) -> f32 {
    if piece.superscript {
        text_width(&piece.text, piece.font, size * SUPERSCRIPT_SCALE)
    } else {
        text_width(&piece.text, piece.font, size)
    }
}

fn word_width(word: &Word, size: f32) -> f32 {
    word.iter().map(|p| piece_width(p, size)).sum()
}

/// Cuts a word that cannot fit on a line by itself into line-wide chunks.
fn break_word(word: Word, max_width: f32, size: f32) -> Vec<Word> {
    if word_width(&word, size) <= max_width {
        return vec![word];
    }

    let mut chunks = Vec::new();
    let mut current: Word = Vec::new();
    let mut width = 0.0;
    for piece in word {
        let scaled = if piece.superscript {
            size * SUPERSCRIPT_SCALE
        } else {
            size
        };
        let mut buf = String::new();
        for c in piece.text.chars() {
            let char_width = text_width(c.encode_utf8(&mut [0; 4]), piece.font, scaled);
            if width > 0.0 && width + char_width > max_width {
                if !buf.is_empty() {
                    current.push(Piece {
                        text: std::mem::take(&mut buf),
                        font: piece.font,
                        superscript: piece.superscript,
                    });
                }
                chunks.push(std::mem::take(&mut current));
                width = 0.0;
            }
            buf.push(c);
            width += char_width;
        }
        if !buf.is_empty() {
            current.push(Piece {
                text: buf,
                font: piece.font,
                superscript: piece.superscript,
            });
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Greedy line filling. Words wider than the line are hard broken.
fn wrap(words: Vec<Word>, max_width: f32, size: f32) -> Vec<Vec<Word>> {
    let space = text_width(" ", FontStyle::Regular, size);
    let mut lines = Vec::new();
    let mut line: Vec<Word> = Vec::new();
    let mut line_width = 0.0;

    for word in words
        .into_iter()
        .flat_map(|word| break_word(word, max_width, size))
    {
        let width = word_width(&word, size);
        if !line.is_empty() && line_width + space + width > max_width {
            lines.push(std::mem::take(&mut line));
            line_width = 0.0;
        }
        if !line.is_empty() {
            line_width += space;
        }
        line_width += width;
        line.push(word);
    }

    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

pub struct LayoutBuilder {
    title: String,
    pages: Vec<Page>,
    cursor: f32,
    page_has_content: bool,
}

impl LayoutBuilder {
    pub fn new(title: &str) -> Self {
        let mut builder = Self {
            title: sanitize(title),
            pages: Vec::new(),
            cursor: CONTENT_TOP,
            page_has_content: false,
        };
        builder.start_page();
        builder
    }

    pub fn finish(self) -> Layout {
        Layout {
            title: self.title,
            pages: self.pages,
        }
    }

    fn start_page(&mut self) {
        let number = self.pages.len() + 1;
        self.pages.push(Page {
            ops: banner_ops(&self.title, number),
        });
        self.cursor = CONTENT_TOP;
        self.page_has_content = false;
    }

    fn push(&mut self, op: DrawOp) {
        if let Some(page) = self.pages.last_mut() {
            page.ops.push(op);
        }
    }

    fn ensure(&mut self, height: f32) {
        if self.page_has_content && self.cursor + height > CONTENT_BOTTOM {
            self.start_page();
        }
    }

    /// Starts a new page unless the current one is still empty.
    pub fn page_break(&mut self) {
        if self.page_has_content {
            self.start_page();
        }
    }

    pub fn space(&mut self, points: f32) {
        if self.page_has_content {
            self.cursor += points;
        }
    }

    /// Bold title kept on the same page as at least a few lines after it.
    pub fn heading(&mut self, text: &str, size: f32) {
        self.ensure(size * LINE_SPACING + 3.0 * 11.0 * LINE_SPACING);
        self.paragraph(&[Run::bold(text)], size, 0.0);
        self.space(size * 0.3);
    }

    pub fn paragraph(&mut self, runs: &[Run<'_>], size: f32, indent: f32) {
        let lines = wrap(words(runs), CONTENT_WIDTH - indent, size);
        let x = MARGIN + indent;
        self.lay_lines(lines, size, x, x);
    }

    /// Text that may contain line breaks; each non-empty line becomes its own
    /// paragraph.
    pub fn text_block(&mut self, text: &str, font: FontStyle, size: f32) {
        let mut first = true;
        for part in text.split('\n').map(str::trim).filter(|p| !p.is_empty()) {
            if !first {
                self.space(size * 0.5);
            }
            self.paragraph(&[Run { text: part, font }], size, 0.0);
            first = false;
        }
    }

    pub fn bullet(&mut self, runs: &[Run<'_>], size: f32, indent: f32) {
        let text_x = MARGIN + indent + BULLET_GAP;
        let lines = wrap(words(runs), CONTENT_WIDTH - indent - BULLET_GAP, size);
        if lines.is_empty() {
            return;
        }

        self.ensure(size * LINE_SPACING);
        self.push(DrawOp::Text {
            x: MARGIN + indent,
            y: self.cursor + size,
            size,
            font: FontStyle::Bold,
            text: "-".to_string(),
        });
        self.lay_lines(lines, size, text_x, text_x);
        self.space(size * 0.25);
    }

    pub fn separator(&mut self) {
        if !self.page_has_content {
            return;
        }
        self.space(6.0);
        self.ensure(12.0);
        let y = self.cursor;
        self.push(DrawOp::Rule {
            x1: MARGIN,
            x2: PAGE_WIDTH - MARGIN,
            y,
            thickness: 0.6,
            gray: 0.75,
        });
        self.cursor += 12.0;
    }

    /// Three-column table; the header row repeats on every page it spans.
    pub fn table(&mut self, headers: [&str; 3], fractions: [f32; 3], rows: &[[String; 3]], size: f32) {
        let line_height = size * LINE_SPACING;
        let mut col_x = [MARGIN; 3];
        for i in 1..3 {
            col_x[i] = col_x[i - 1] + fractions[i - 1] * CONTENT_WIDTH;
        }
        let col_width = fractions.map(|f| f * CONTENT_WIDTH - 2.0 * CELL_PADDING);

        self.ensure(line_height * 3.0);
        self.table_header(&headers, &col_x, size);

        for row in rows {
            let cells: Vec<Vec<Vec<Word>>> = row
                .iter()
                .zip(col_width)
                .map(|(cell, width)| wrap(words(&[Run::regular(cell)]), width, size))
                .collect();
            let line_count = cells.iter().map(Vec::len).max().unwrap_or(0).max(1);
            let row_height = line_count as f32 * line_height + 6.0;

            if self.cursor + row_height > CONTENT_BOTTOM {
                self.start_page();
                self.table_header(&headers, &col_x, size);
            }

            let top = self.cursor;
            for (col, lines) in cells.into_iter().enumerate() {
                for (i, line) in lines.into_iter().enumerate() {
                    let baseline = top + 3.0 + size + i as f32 * line_height;
                    self.emit_line(line, col_x[col] + CELL_PADDING, baseline, size);
                }
            }
            self.cursor = top + row_height;
            self.push(DrawOp::Rule {
                x1: MARGIN,
                x2: PAGE_WIDTH - MARGIN,
                y: self.cursor,
                thickness: 0.4,
                gray: 0.8,
            });
        }
        self.space(8.0);
    }

    fn table_header(&mut self, headers: &[&str; 3], col_x: &[f32; 3], size: f32) {
        let top = self.cursor;
        for (header, x) in headers.iter().zip(col_x) {
            self.push(DrawOp::Text {
                x: x + CELL_PADDING,
                y: top + 3.0 + size,
                size,
                font: FontStyle::Bold,
                text: sanitize(header),
            });
        }
        self.cursor = top + size * LINE_SPACING + 6.0;
        self.push(DrawOp::Rule {
            x1: MARGIN,
            x2: PAGE_WIDTH - MARGIN,
            y: self.cursor,
            thickness: 0.8,
            gray: 0.3,
        });
        self.page_has_content = true;
    }

    fn lay_lines(&mut self, lines: Vec<Vec<Word>>, size: f32, first_x: f32, rest_x: f32) {
        let line_height = size * LINE_SPACING;
        for (i, line) in lines.into_iter().enumerate() {
            self.ensure(line_height);
            let x = if i == 0 { first_x } else { rest_x };
            let baseline = self.cursor + size;
            self.emit_line(line, x, baseline, size);
            self.cursor += line_height;
            self.page_has_content = true;
        }
    }

    /// Draws one wrapped line, merging adjacent pieces that share a face.
    fn emit_line(&mut self, line: Vec<Word>, start_x: f32, baseline: f32, size: f32) {
        let space = text_width(" ", FontStyle::Regular, size);
        let mut x = start_x;
        let mut open: Option<(f32, FontStyle, String)> = None;

        for (i, word) in line.into_iter().enumerate() {
            let mut pending_space = i > 0;
            if pending_space {
                x += space;
            }

            for piece in word {
                let width = piece_width(&piece, size);
                if piece.superscript {
                    if let Some(run) = open.take() {
                        self.push_run(run, baseline, size);
                    }
                    self.push(DrawOp::Text {
                        x,
                        y: baseline - size * SUPERSCRIPT_RISE,
                        size: size * SUPERSCRIPT_SCALE,
                        font: piece.font,
                        text: piece.text,
                    });
                } else {
                    match open.as_mut() {
                        Some((_, font, text)) if *font == piece.font => {
                            if pending_space {
                                text.push(' ');
                            }
                            text.push_str(&piece.text);
                        }
                        _ => {
                            if let Some(run) = open.take() {
                                self.push_run(run, baseline, size);
                            }
                            open = Some((x, piece.font, piece.text));
                        }
                    }
                }
                pending_space = false;
                x += width;
            }
        }

        if let Some(run) = open {
            self.push_run(run, baseline, size);
        }
    }

    fn push_run(&mut self, (x, font, text): (f32, FontStyle, String), baseline: f32, size: f32) {
        self.push(DrawOp::Text {
            x,
            y: baseline,
            size,
            font,
            text,
        });
    }
}

fn banner_ops(title: &str, page_number: usize) -> Vec<DrawOp> {
    let tagline = "Powered by the Neuro Change Method";
    let tagline_size = 11.0;
    let tagline_width = text_width(tagline, FontStyle::Italic, tagline_size);
    let page_label = format!("Page {page_number}");
    let right = PAGE_WIDTH - MARGIN;

    vec![
        DrawOp::Text {
            x: MARGIN,
            y: 50.0,
            size: 24.0,
            font: FontStyle::Bold,
            text: "DreamScape AI".to_string(),
        },
        DrawOp::Text {
            x: MARGIN,
            y: 72.0,
            size: tagline_size,
            font: FontStyle::Italic,
            text: tagline.to_string(),
        },
        DrawOp::Text {
            x: MARGIN + tagline_width,
            y: 72.0 - tagline_size * SUPERSCRIPT_RISE,
            size: tagline_size * SUPERSCRIPT_SCALE,
            font: FontStyle::Bold,
            text: Marker::Trademark.glyph().to_string(),
        },
        DrawOp::Text {
            x: right - text_width(title, FontStyle::Regular, 10.0),
            y: 50.0,
            size: 10.0,
            font: FontStyle::Regular,
            text: title.to_string(),
        },
        DrawOp::Text {
            x: right - text_width(&page_label, FontStyle::Regular, 9.0),
            y: 72.0,
            size: 9.0,
            font: FontStyle::Regular,
            text: page_label,
        },
        DrawOp::Rule {
            x1: MARGIN,
            x2: right,
            y: BANNER_HEIGHT - 14.0,
            thickness: 1.5,
            gray: 0.35,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_text(words: usize) -> String {
        (0..words)
            .map(|i| format!("word{i}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn text_ops(page: &Page) -> Vec<(f32, f32, f32, &str)> {
        page.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text {
                    x, y, size, text, ..
                } => Some((*x, *y, *size, text.as_str())),
                DrawOp::Rule { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_every_page_carries_the_banner() {
        let mut builder = LayoutBuilder::new("Client Assessment Report");
        builder.paragraph(&[Run::regular(&long_text(3000))], 11.0, 0.0);
        let layout = builder.finish();

        assert!(layout.page_count() > 2);
        for (i, page) in layout.pages.iter().enumerate() {
            let ops = text_ops(page);
            assert_eq!(ops[0].3, "DreamScape AI");
            assert!(page.text().contains(&format!("Page {}", i + 1)));
        }
    }

    #[test]
    fn test_content_stays_inside_the_margins() {
        let mut builder = LayoutBuilder::new("Report");
        builder.paragraph(&[Run::regular(&long_text(2000))], 11.0, 0.0);
        builder.bullet(&[Run::bold("Label: "), Run::regular(&long_text(200))], 11.0, 15.0);
        let layout = builder.finish();

        for page in &layout.pages {
            for op in &page.ops {
                if let DrawOp::Text { x, y, size, font, text } = op {
                    assert!(*y <= CONTENT_BOTTOM + 0.01, "{text} below the bottom margin");
                    assert!(x + text_width(text, *font, *size) <= PAGE_WIDTH - MARGIN + 0.01);
                    if *y > BANNER_HEIGHT {
                        assert!(*y >= CONTENT_TOP);
                    }
                }
            }
        }
    }

    #[test]
    fn test_overlong_word_is_hard_broken() {
        let url = format!("https://example.com/{}", "segment".repeat(60));
        let mut builder = LayoutBuilder::new("Report");
        builder.paragraph(&[Run::regular(&url)], 11.0, 0.0);
        builder.bullet(&[Run::regular(&url)], 11.0, 15.0);
        let layout = builder.finish();

        let mut chunks = Vec::new();
        for op in &layout.pages[0].ops {
            if let DrawOp::Text { x, size, font, text, .. } = op {
                assert!(x + text_width(text, *font, *size) <= PAGE_WIDTH - MARGIN + 0.01, "{text}");
                if text.len() > 1 && url.contains(text.as_str()) {
                    chunks.push(text.as_str());
                }
            }
        }

        assert!(chunks.len() >= 4);
        assert!(chunks.concat().starts_with(&url));
    }

    #[test]
    fn test_page_break_on_fresh_page_is_a_no_op() {
        let mut builder = LayoutBuilder::new("Report");
        builder.page_break();
        builder.paragraph(&[Run::regular("first")], 11.0, 0.0);
        builder.page_break();
        builder.page_break();
        builder.paragraph(&[Run::regular("second")], 11.0, 0.0);
        let layout = builder.finish();

        assert_eq!(layout.page_count(), 2);
        assert_eq!(layout.page_of("first"), Some(0));
        assert_eq!(layout.page_of("second"), Some(1));
    }

    #[test]
    fn test_trademark_is_drawn_as_superscript() {
        let mut builder = LayoutBuilder::new("Report");
        builder.paragraph(&[Run::regular("The Neuro Change Method\u{2122} works")], 12.0, 0.0);
        let layout = builder.finish();

        let ops = text_ops(&layout.pages[0]);
        let body = ops.iter().position(|op| op.3 == "The Neuro Change Method").unwrap();
        let (x, y, size, _) = ops[body];
        let (mark_x, mark_y, mark_size, mark) = ops[body + 1];
        let (_, after_y, _, after) = ops[body + 2];

        assert_eq!(mark, "TM");
        assert!(mark_size < size);
        assert!(mark_y < y);
        assert!(mark_x > x);
        assert_eq!(after, "works");
        assert_eq!(after_y, y);
    }

    #[test]
    fn test_adjacent_runs_in_one_face_merge() {
        let mut builder = LayoutBuilder::new("Report");
        builder.paragraph(&[Run::bold("Focus: "), Run::regular("Self Awareness + Rest")], 11.0, 0.0);
        let layout = builder.finish();

        let texts: Vec<&str> = text_ops(&layout.pages[0]).into_iter().map(|op| op.3).collect();
        assert!(texts.contains(&"Focus:"));
        assert!(texts.contains(&"Self Awareness + Rest"));
    }

    #[test]
    fn test_table_repeats_header_across_pages() {
        let rows: Vec<[String; 3]> = (0..80)
            .map(|i| [format!("Milestone {i}"), format!("Week {i}"), long_text(12)])
            .collect();
        let mut builder = LayoutBuilder::new("Report");
        builder.table(["Milestone", "Target Week", "Tools & Focus"], [0.4, 0.2, 0.4], &rows, 10.0);
        let layout = builder.finish();

        assert!(layout.page_count() > 1);
        for page in &layout.pages {
            assert!(page.text().contains("Target Week"));
        }
    }

    #[test]
    fn test_layout_is_deterministic() {
        let build = || {
            let mut builder = LayoutBuilder::new("Report");
            builder.heading("Heading\u{2122}", 14.0);
            builder.paragraph(&[Run::italic(&long_text(900))], 11.0, 0.0);
            builder.separator();
            builder.bullet(&[Run::regular("\u{201c}quoted\u{201d}")], 11.0, 0.0);
            builder.finish()
        };
        assert_eq!(build(), build());
    }
}
