//! Page layout for exported reports
//!
//! Positions are PDF points with the origin at the bottom-left corner.
//! Text width is estimated from a fixed average glyph width; the standard
//! Type1 fonts carry no metrics we could measure against.

/// A4 portrait
pub const PAGE_WIDTH: f32 = 595.0;
pub const PAGE_HEIGHT: f32 = 842.0;
pub const MARGIN: f32 = 50.0;

pub const TITLE_SIZE: f32 = 20.0;
pub const SUBTITLE_SIZE: f32 = 11.0;
pub const HEADING_SIZE: f32 = 14.0;
pub const BODY_SIZE: f32 = 11.0;
pub const REFERENCE_SIZE: f32 = 10.0;

/// Average Helvetica glyph width as a fraction of the font size
const GLYPH_WIDTH_RATIO: f32 = 0.5;
const LINE_SPACING: f32 = 1.4;

/// Headings and references need at least this much room below the cursor
const KEEP_TOGETHER: f32 = MARGIN + 3.0 * HEADING_SIZE * LINE_SPACING;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

/// One positioned line of text
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub font: Font,
    pub size: f32,
    pub x: f32,
    pub y: f32,
}

pub type Page = Vec<TextLine>;

/// Replace characters the standard fonts cannot show.
///
/// Typographic punctuation is folded to ASCII; anything outside Latin-1
/// becomes `?`. Markdown emphasis markers are removed.
pub fn sanitize(text: &str) -> String {
    let text = text.replace("**", "").replace("__", "");
    text.chars()
        .filter(|c| *c != '\r')
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => '"',
            '\u{2013}' | '\u{2014}' | '\u{2212}' => '-',
            '\u{2022}' | '\u{2023}' | '\u{25CF}' => '*',
            '\u{2026}' => '.',
            '\t' => ' ',
            c if (c as u32) < 0x20 && c != '\n' => ' ',
            c if (c as u32) <= 0xFF => c,
            _ => '?',
        })
        .collect()
}

/// Latin-1 bytes for a PDF string literal
pub fn encode_latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(c as u32).unwrap_or(b'?'))
        .collect()
}

/// Characters that fit on one line at `size`
pub fn chars_per_line(size: f32, width: f32) -> usize {
    ((width / (size * GLYPH_WIDTH_RATIO)).floor() as usize).max(1)
}

/// Greedy word wrap by character count. Words longer than a line are split.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();

        while word.len() > max_chars {
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
        }

        let needed = if current_len == 0 { word.len() } else { current_len + 1 + word.len() };
        if needed > max_chars && current_len > 0 {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.extend(word.iter());
        current_len += word.len();
    }

    if current_len > 0 {
        lines.push(current);
    }
    lines
}

/// Lays text out top to bottom, opening pages as needed
pub struct PageWriter {
    pages: Vec<Page>,
    cursor: f32,
}

impl Default for PageWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl PageWriter {
    pub fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            cursor: PAGE_HEIGHT - MARGIN,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Vertical space left above the bottom margin
    pub fn remaining(&self) -> f32 {
        self.cursor - MARGIN
    }

    pub fn new_page(&mut self) {
        self.pages.push(Vec::new());
        self.cursor = PAGE_HEIGHT - MARGIN;
    }

    /// Start a new page when too little room is left to begin a block
    fn keep_together(&mut self) {
        if self.cursor < KEEP_TOGETHER && !self.current_page_is_empty() {
            self.new_page();
        }
    }

    fn current_page_is_empty(&self) -> bool {
        self.pages.last().map(Vec::is_empty).unwrap_or(true)
    }

    fn line(&mut self, text: String, font: Font, size: f32, indent: f32) {
        let height = size * LINE_SPACING;
        if self.cursor - height < MARGIN {
            self.new_page();
        }
        self.cursor -= height;
        let y = self.cursor;
        if let Some(page) = self.pages.last_mut() {
            page.push(TextLine {
                text,
                font,
                size,
                x: MARGIN + indent,
                y,
            });
        }
    }

    fn wrapped(&mut self, text: &str, font: Font, size: f32, indent: f32) {
        let width = PAGE_WIDTH - 2.0 * MARGIN - indent;
        for line in wrap_text(&sanitize(text), chars_per_line(size, width)) {
            self.line(line, font, size, indent);
        }
    }

    pub fn space(&mut self, points: f32) {
        self.cursor = (self.cursor - points).max(MARGIN);
    }

    pub fn title(&mut self, text: &str) {
        self.wrapped(text, Font::Bold, TITLE_SIZE, 0.0);
    }

    pub fn subtitle(&mut self, text: &str) {
        self.wrapped(text, Font::Regular, SUBTITLE_SIZE, 0.0);
    }

    pub fn heading(&mut self, text: &str) {
        self.keep_together();
        self.space(HEADING_SIZE * 0.6);
        self.wrapped(text, Font::Bold, HEADING_SIZE, 0.0);
        self.space(BODY_SIZE * 0.3);
    }

    /// Body text; blank lines separate paragraphs
    pub fn body(&mut self, text: &str) {
        let mut first = true;
        for paragraph in text.split('\n').map(str::trim).filter(|p| !p.is_empty()) {
            if !first {
                self.space(BODY_SIZE * 0.5);
            }
            first = false;
            self.wrapped(paragraph, Font::Regular, BODY_SIZE, 0.0);
        }
    }

    /// Numbered reference entry with a hanging indent
    pub fn reference(&mut self, number: usize, text: &str) {
        self.keep_together();
        let label = format!("[{}]", number);
        let indent = (label.chars().count() + 1) as f32 * REFERENCE_SIZE * GLYPH_WIDTH_RATIO;
        let width = PAGE_WIDTH - 2.0 * MARGIN - indent;
        let lines = wrap_text(&sanitize(text), chars_per_line(REFERENCE_SIZE, width));

        for (i, line) in lines.into_iter().enumerate() {
            if i == 0 {
                self.line(format!("{} {}", label, line), Font::Regular, REFERENCE_SIZE, 0.0);
            } else {
                self.line(line, Font::Regular, REFERENCE_SIZE, indent);
            }
        }
        self.space(REFERENCE_SIZE * 0.4);
    }

    pub fn finish(self) -> Vec<Page> {
        self.pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_respects_width() {
        let text = "the quick brown fox jumps over the lazy dog ".repeat(10);
        let lines = wrap_text(&text, 20);
        assert!(lines.iter().all(|l| l.chars().count() <= 20));
        assert_eq!(lines.join(" "), text.trim());
    }

    #[test]
    fn test_wrap_splits_long_words() {
        let lines = wrap_text("abcdefghij xy", 4);
        assert_eq!(lines, vec!["abcd", "efgh", "ij", "xy"]);
        assert!(wrap_text("   ", 10).is_empty());
    }

    #[test]
    fn test_sanitize_folds_typography() {
        assert_eq!(sanitize("\u{201C}Soil\u{201D} \u{2014} it\u{2019}s **key**"), "\"Soil\" - it's key");
        assert_eq!(sanitize("caf\u{e9} \u{4e2d}"), "caf\u{e9} ?");
        assert_eq!(encode_latin1("caf\u{e9}"), vec![b'c', b'a', b'f', 0xE9]);
    }

    #[test]
    fn test_body_lines_break_pages() {
        let mut writer = PageWriter::new();
        let paragraph = "word ".repeat(2000);
        writer.body(&paragraph);
        let pages = writer.finish();

        assert!(pages.len() > 1);
        for page in &pages {
            assert!(page.iter().all(|l| l.y >= MARGIN && l.y <= PAGE_HEIGHT - MARGIN));
        }
    }

    #[test]
    fn test_heading_moves_to_new_page_near_bottom() {
        let mut writer = PageWriter::new();
        while writer.remaining() > KEEP_TOGETHER - MARGIN - 1.0 {
            writer.body("filler line");
        }
        assert_eq!(writer.page_count(), 1);

        writer.heading("Discussion");
        let pages = writer.finish();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1][0].text, "Discussion");
        assert_eq!(pages[1][0].font, Font::Bold);
    }

    #[test]
    fn test_reference_hanging_indent() {
        let mut writer = PageWriter::new();
        writer.reference(12, &"Author, A. (2020). A long title. ".repeat(6));
        let page = &writer.finish()[0];

        assert!(page[0].text.starts_with("[12] Author"));
        assert!(page.len() > 1);
        assert!(page[1].x > page[0].x);
    }
}
