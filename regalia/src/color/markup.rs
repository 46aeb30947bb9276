//! Structured color-tagged text
//!
//! [`Markup`] is the normalized form every input syntax parses into: a run of
//! [`Span`]s, each carrying one [`Style`]. Three input syntaxes are understood:
//!
//! - inline legacy codes: `§c`, `§l`, `§r`, and hex as `§x§R§R§G§G§B§B`
//! - the same codes with `&` as the marker, plus the `&#RRGGBB` shorthand
//! - nestable tags: `<red>`, `<#FF8800>`, `<color:gold>`, `<bold>`/`<b>`,
//!   `<italic>`/`<i>`/`<em>`, `<underlined>`/`<u>`, `<strikethrough>`/`<st>`,
//!   `<obfuscated>`/`<obf>`, `<reset>`, `<gradient:a:b>`, `<rainbow>`, and
//!   closing tags `</name>`
//!
//! In tag syntax a `\` before `<`, `&`, `§` or `\` makes that character literal.
//! Nested effects keep their own colors; an outer gradient or rainbow only
//! paints the glyphs no inner effect colored.
//!
//! Conversion back to legacy codes is lossless for colors and modifiers.
//! Legacy codes that are not recognized (`§z`, a truncated `§x` sequence) are
//! kept as literal text; they survive a round trip but are not guaranteed to
//! keep their meaning if a consumer later interprets them.

use super::{gradient_stop, parse_color, rainbow_stop, NamedColor, Rgb, TextColor, SECTION};

const MODIFIER_CODES: [char; 5] = ['k', 'l', 'm', 'n', 'o'];
const MODIFIER_TAGS: [&str; 5] = ["obfuscated", "bold", "strikethrough", "underlined", "italic"];

/// Characters that tag syntax reads as markup unless preceded by `\`
const ESCAPED: [char; 4] = ['<', '&', SECTION, '\\'];

/// Color and modifiers applied to a span of text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Style {
    pub color: Option<TextColor>,
    pub bold: bool,
    pub italic: bool,
    pub underlined: bool,
    pub strikethrough: bool,
    pub obfuscated: bool,
}

impl Style {
    pub fn colored(color: TextColor) -> Self {
        Self {
            color: Some(color),
            ..Self::default()
        }
    }

    pub fn is_plain(&self) -> bool {
        *self == Self::default()
    }

    /// Modifier flags in legacy code order (`k` through `o`)
    fn modifiers(&self) -> [bool; 5] {
        [
            self.obfuscated,
            self.bold,
            self.strikethrough,
            self.underlined,
            self.italic,
        ]
    }

    fn set_modifier(&mut self, code: char) -> bool {
        match code {
            'k' => self.obfuscated = true,
            'l' => self.bold = true,
            'm' => self.strikethrough = true,
            'n' => self.underlined = true,
            'o' => self.italic = true,
            _ => return false,
        }
        true
    }

    /// Every modifier set on `other` is also set here
    fn covers(&self, other: &Style) -> bool {
        self.modifiers()
            .iter()
            .zip(other.modifiers().iter())
            .all(|(mine, theirs)| *mine || !*theirs)
    }

    fn legacy_modifiers_since(&self, prev: &Style) -> String {
        let mut out = String::new();
        for ((on, was), code) in self
            .modifiers()
            .iter()
            .zip(prev.modifiers().iter())
            .zip(MODIFIER_CODES)
        {
            if *on && !*was {
                out.push(SECTION);
                out.push(code);
            }
        }
        out
    }
}

/// Text sharing one style
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub style: Style,
}

/// Normalized styled text
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Markup {
    spans: Vec<Span>,
}

impl Markup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse any mix of tags, `§` codes and `&` codes
    pub fn parse(text: &str) -> Self {
        Parser::new(text, Syntax::FULL).run()
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// Append text, merging with the previous span when styles match
    pub fn push_str(&mut self, text: &str, style: Style) {
        if text.is_empty() {
            return;
        }
        match self.spans.last_mut() {
            Some(last) if last.style == style => last.text.push_str(text),
            _ => self.spans.push(Span {
                text: text.to_string(),
                style,
            }),
        }
    }

    pub fn push(&mut self, ch: char, style: Style) {
        let mut buf = [0u8; 4];
        self.push_str(ch.encode_utf8(&mut buf), style);
    }

    /// Content with every style removed
    pub fn plain_text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }

    /// Length of the plain content in characters
    pub fn char_len(&self) -> usize {
        self.spans.iter().map(|s| s.text.chars().count()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Character offsets at which the color changes, with the new color
    pub fn color_runs(&self) -> Vec<(usize, Option<TextColor>)> {
        let mut runs: Vec<(usize, Option<TextColor>)> = Vec::new();
        let mut offset = 0;
        for span in &self.spans {
            if runs.last().map(|(_, color)| *color) != Some(span.style.color) {
                runs.push((offset, span.style.color));
            }
            offset += span.text.chars().count();
        }
        runs
    }

    /// Render with inline `§` codes
    pub fn to_legacy(&self) -> String {
        let mut out = String::new();
        let mut prev = Style::default();

        for span in &self.spans {
            if span.style != prev {
                if span.style.color.is_none() && prev.color.is_none() && span.style.covers(&prev) {
                    out.push_str(&span.style.legacy_modifiers_since(&prev));
                } else {
                    match span.style.color {
                        Some(color) => out.push_str(&color.to_legacy()),
                        None => {
                            out.push(SECTION);
                            out.push('r');
                        }
                    }
                    out.push_str(&span.style.legacy_modifiers_since(&Style::default()));
                }
                prev = span.style;
            }
            out.push_str(&span.text);
        }

        out
    }

    /// Render with tag syntax
    pub fn to_tagged(&self) -> String {
        let mut out = String::new();
        let mut prev = Style::default();

        for span in &self.spans {
            if span.style != prev {
                if !prev.is_plain() {
                    out.push_str("<reset>");
                }
                if let Some(color) = span.style.color {
                    out.push('<');
                    out.push_str(&color.to_string());
                    out.push('>');
                }
                for (on, tag) in span.style.modifiers().iter().zip(MODIFIER_TAGS) {
                    if *on {
                        out.push('<');
                        out.push_str(tag);
                        out.push('>');
                    }
                }
                prev = span.style;
            }
            for ch in span.text.chars() {
                if ESCAPED.contains(&ch) {
                    out.push('\\');
                }
                out.push(ch);
            }
        }

        out
    }
}

/// Parse text containing only `§` codes
pub fn legacy_to_markup(text: &str) -> Markup {
    Parser::new(text, Syntax::LEGACY).run()
}

/// Render markup with inline `§` codes
pub fn markup_to_legacy(markup: &Markup) -> String {
    markup.to_legacy()
}

/// Remove every recognized color and style marker
pub fn strip_colors(text: &str) -> String {
    Markup::parse(text).plain_text()
}

/// Normalize any supported syntax into `§` codes
pub fn render_legacy(text: &str) -> String {
    Markup::parse(text).to_legacy()
}

#[derive(Debug, Clone, Copy)]
struct Syntax {
    ampersand: bool,
    tags: bool,
}

impl Syntax {
    const LEGACY: Syntax = Syntax { ampersand: false, tags: false };
    const FULL: Syntax = Syntax { ampersand: true, tags: true };
}

#[derive(Debug, Clone, Copy)]
enum Effect {
    Gradient(Rgb, Rgb),
    Rainbow,
}

#[derive(Debug, Clone, Copy)]
struct Glyph {
    ch: char,
    style: Style,
    /// Colored by an effect that already closed
    painted: bool,
}

#[derive(Debug)]
struct Frame {
    tag: &'static str,
    saved: Style,
    effect: Option<Effect>,
    start: usize,
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    syntax: Syntax,
    style: Style,
    frames: Vec<Frame>,
    glyphs: Vec<Glyph>,
}

impl Parser {
    fn new(text: &str, syntax: Syntax) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            syntax,
            style: Style::default(),
            frames: Vec::new(),
            glyphs: Vec::new(),
        }
    }

    fn run(mut self) -> Markup {
        while self.pos < self.chars.len() {
            let ch = self.chars[self.pos];

            let consumed = if ch == SECTION || (self.syntax.ampersand && ch == '&') {
                self.legacy_code(ch)
            } else if self.syntax.tags && ch == '<' {
                self.tag()
            } else if self.syntax.tags && ch == '\\' {
                match self.chars.get(self.pos + 1).copied() {
                    Some(next) if ESCAPED.contains(&next) => {
                        self.push_glyph(next);
                        Some(2)
                    }
                    _ => None,
                }
            } else {
                None
            };

            match consumed {
                Some(n) => self.pos += n,
                None => {
                    self.push_glyph(ch);
                    self.pos += 1;
                }
            }
        }

        while let Some(frame) = self.frames.pop() {
            self.apply_effect(&frame);
        }

        let mut markup = Markup::new();
        for glyph in self.glyphs {
            markup.push(glyph.ch, glyph.style);
        }
        markup
    }

    fn push_glyph(&mut self, ch: char) {
        self.glyphs.push(Glyph {
            ch,
            style: self.style,
            painted: false,
        });
    }

    /// Consume a legacy code at the cursor, returning its width
    fn legacy_code(&mut self, marker: char) -> Option<usize> {
        let code = self.chars.get(self.pos + 1)?.to_ascii_lowercase();

        if code == 'x' {
            let rgb = self.legacy_hex(marker)?;
            self.style = Style::colored(TextColor::Hex(rgb));
            return Some(14);
        }

        if marker == '&' && code == '#' {
            let digits: String = self.chars.get(self.pos + 2..self.pos + 8)?.iter().collect();
            let rgb = Rgb::from_hex(&format!("#{}", digits))?;
            self.style = Style::colored(TextColor::Hex(rgb));
            return Some(8);
        }

        if let Some(named) = NamedColor::from_code(code) {
            self.style = Style::colored(TextColor::Named(named));
            return Some(2);
        }

        if code == 'r' {
            self.style = Style::default();
            return Some(2);
        }

        self.style.set_modifier(code).then_some(2)
    }

    /// `§x§R§R§G§G§B§B` following the cursor
    fn legacy_hex(&self, marker: char) -> Option<Rgb> {
        let pairs = self.chars.get(self.pos + 2..self.pos + 14)?;
        let mut hex = String::from("#");
        for pair in pairs.chunks(2) {
            if pair[0] != marker {
                return None;
            }
            hex.push(pair[1]);
        }
        Rgb::from_hex(&hex)
    }

    /// Consume a tag at the cursor, returning its width
    fn tag(&mut self) -> Option<usize> {
        let rest = self.chars.get(self.pos + 1..)?;
        let close = rest.iter().position(|&c| c == '>')?;
        let content: String = rest[..close].iter().collect();
        if content.is_empty() || content.contains('<') {
            return None;
        }

        let accepted = match content.strip_prefix('/') {
            Some(name) => self.close_tag(name),
            None => self.open_tag(&content),
        };
        accepted.then_some(close + 2)
    }

    fn open_tag(&mut self, content: &str) -> bool {
        let lower = content.trim().to_ascii_lowercase();
        let (name, args) = match lower.split_once(':') {
            Some((name, args)) => (name, Some(args)),
            None => (lower.as_str(), None),
        };
        let Some(key) = canonical_tag(name) else {
            return false;
        };

        let mut next = self.style;
        let mut effect = None;

        match (key, args) {
            ("reset", None) => {
                while let Some(frame) = self.frames.pop() {
                    self.apply_effect(&frame);
                }
                self.style = Style::default();
                return true;
            }
            ("bold", None) => next.bold = true,
            ("italic", None) => next.italic = true,
            ("underlined", None) => next.underlined = true,
            ("strikethrough", None) => next.strikethrough = true,
            ("obfuscated", None) => next.obfuscated = true,
            ("rainbow", None) => effect = Some(Effect::Rainbow),
            ("gradient", Some(args)) => {
                let Some((start, end)) = args.split_once(':') else {
                    return false;
                };
                match (parse_color(start), parse_color(end)) {
                    (Ok(Some(start)), Ok(Some(end))) => {
                        effect = Some(Effect::Gradient(start.rgb(), end.rgb()))
                    }
                    _ => return false,
                }
            }
            ("color", Some(arg)) => match parse_color(arg) {
                Ok(Some(color)) => next.color = Some(color),
                _ => return false,
            },
            ("color", None) => match parse_color(name) {
                Ok(Some(color)) => next.color = Some(color),
                _ => return false,
            },
            _ => return false,
        }

        self.frames.push(Frame {
            tag: key,
            saved: self.style,
            effect,
            start: self.glyphs.len(),
        });
        self.style = next;
        true
    }

    fn close_tag(&mut self, name: &str) -> bool {
        let lower = name.trim().to_ascii_lowercase();
        let index = if lower.is_empty() {
            self.frames.len().checked_sub(1)
        } else {
            let name = lower.split(':').next().unwrap_or_default();
            let Some(key) = canonical_tag(name) else {
                return false;
            };
            self.frames.iter().rposition(|f| f.tag == key)
        };
        let Some(index) = index else {
            return false;
        };

        let mut restored = self.style;
        while self.frames.len() > index {
            if let Some(frame) = self.frames.pop() {
                self.apply_effect(&frame);
                restored = frame.saved;
            }
        }
        self.style = restored;
        true
    }

    fn apply_effect(&mut self, frame: &Frame) {
        let Some(effect) = frame.effect else {
            return;
        };
        let glyphs = &mut self.glyphs[frame.start..];
        let len = glyphs.len();
        // Inner effects keep their colors; positions still span the whole frame
        for (i, glyph) in glyphs.iter_mut().enumerate() {
            if glyph.painted {
                continue;
            }
            let rgb = match effect {
                Effect::Gradient(start, end) => gradient_stop(start, end, i, len),
                Effect::Rainbow => rainbow_stop(i, len),
            };
            glyph.style.color = Some(TextColor::Hex(rgb));
            glyph.painted = true;
        }
    }
}

/// Map tag aliases to one name; colors all map to `color`
fn canonical_tag(name: &str) -> Option<&'static str> {
    let key = match name {
        "b" | "bold" => "bold",
        "i" | "em" | "italic" => "italic",
        "u" | "underline" | "underlined" => "underlined",
        "st" | "strike" | "strikethrough" => "strikethrough",
        "obf" | "obfuscated" => "obfuscated",
        "c" | "color" | "colour" => "color",
        "gradient" => "gradient",
        "rainbow" => "rainbow",
        "reset" => "reset",
        other if other.starts_with('#') || NamedColor::from_name(other).is_some() => "color",
        _ => return None,
    };
    Some(key)
}
