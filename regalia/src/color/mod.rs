//! Color model for display customizations
//!
//! Colors come in three shapes: one of the 16 legacy named colors, a
//! `#RRGGBB` hex value, or an effect (two-stop gradient, rainbow) that
//! assigns a color per character. Rendered output uses the inline
//! `§`-code format understood by chat and overhead-label consumers.

pub mod markup;

pub use markup::{legacy_to_markup, markup_to_legacy, render_legacy, strip_colors, Markup, Span, Style};

use crate::error::{RegaliaError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker that introduces an inline legacy code
pub const SECTION: char = '§';

static HEX_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("static hex pattern"));

/// 24-bit color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB`
    pub fn from_hex(hex: &str) -> Option<Self> {
        if !is_valid_hex(hex) {
            return None;
        }
        let r = u8::from_str_radix(&hex[1..3], 16).ok()?;
        let g = u8::from_str_radix(&hex[3..5], 16).ok()?;
        let b = u8::from_str_radix(&hex[5..7], 16).ok()?;
        Some(Self::new(r, g, b))
    }

    /// Uppercase `#RRGGBB`
    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Legacy hex sequence `§x§R§R§G§G§B§B`
    pub fn to_legacy(self) -> String {
        let mut out = String::with_capacity(14);
        out.push(SECTION);
        out.push('x');
        for digit in self.to_hex()[1..].chars() {
            out.push(SECTION);
            out.push(digit.to_ascii_lowercase());
        }
        out
    }

    /// Create a color from HSV values
    ///
    /// - h: Hue in degrees, wrapped into [0, 360)
    /// - s: Saturation [0, 1]
    /// - v: Value [0, 1]
    pub fn from_hsv(h: f64, s: f64, v: f64) -> Self {
        let h = h.rem_euclid(360.0);
        let s = s.clamp(0.0, 1.0);
        let v = v.clamp(0.0, 1.0);

        let c = v * s;
        let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
        let m = v - c;

        let (r, g, b) = match (h / 60.0) as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };

        let to_u8 = |f: f64| ((f + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        Self::new(to_u8(r), to_u8(g), to_u8(b))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// The 16 legacy named colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedColor {
    Black,
    DarkBlue,
    DarkGreen,
    DarkAqua,
    DarkRed,
    DarkPurple,
    Gold,
    Gray,
    DarkGray,
    Blue,
    Green,
    Aqua,
    Red,
    LightPurple,
    Yellow,
    White,
}

impl NamedColor {
    pub const ALL: [NamedColor; 16] = [
        NamedColor::Black,
        NamedColor::DarkBlue,
        NamedColor::DarkGreen,
        NamedColor::DarkAqua,
        NamedColor::DarkRed,
        NamedColor::DarkPurple,
        NamedColor::Gold,
        NamedColor::Gray,
        NamedColor::DarkGray,
        NamedColor::Blue,
        NamedColor::Green,
        NamedColor::Aqua,
        NamedColor::Red,
        NamedColor::LightPurple,
        NamedColor::Yellow,
        NamedColor::White,
    ];

    /// Legacy code character (`0`-`9`, `a`-`f`)
    pub fn code(self) -> char {
        match self {
            NamedColor::Black => '0',
            NamedColor::DarkBlue => '1',
            NamedColor::DarkGreen => '2',
            NamedColor::DarkAqua => '3',
            NamedColor::DarkRed => '4',
            NamedColor::DarkPurple => '5',
            NamedColor::Gold => '6',
            NamedColor::Gray => '7',
            NamedColor::DarkGray => '8',
            NamedColor::Blue => '9',
            NamedColor::Green => 'a',
            NamedColor::Aqua => 'b',
            NamedColor::Red => 'c',
            NamedColor::LightPurple => 'd',
            NamedColor::Yellow => 'e',
            NamedColor::White => 'f',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        let index = code.to_digit(16)?;
        Self::ALL.get(index as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            NamedColor::Black => "black",
            NamedColor::DarkBlue => "dark_blue",
            NamedColor::DarkGreen => "dark_green",
            NamedColor::DarkAqua => "dark_aqua",
            NamedColor::DarkRed => "dark_red",
            NamedColor::DarkPurple => "dark_purple",
            NamedColor::Gold => "gold",
            NamedColor::Gray => "gray",
            NamedColor::DarkGray => "dark_gray",
            NamedColor::Blue => "blue",
            NamedColor::Green => "green",
            NamedColor::Aqua => "aqua",
            NamedColor::Red => "red",
            NamedColor::LightPurple => "light_purple",
            NamedColor::Yellow => "yellow",
            NamedColor::White => "white",
        }
    }

    /// Case-insensitive lookup; spaces and dashes count as underscores
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .trim()
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();

        let normalized = match normalized.as_str() {
            "grey" => "gray",
            "dark_grey" => "dark_gray",
            "purple" => "light_purple",
            "pink" => "light_purple",
            other => other,
        };

        Self::ALL.iter().copied().find(|c| c.name() == normalized)
    }

    pub fn rgb(self) -> Rgb {
        match self {
            NamedColor::Black => Rgb::new(0x00, 0x00, 0x00),
            NamedColor::DarkBlue => Rgb::new(0x00, 0x00, 0xAA),
            NamedColor::DarkGreen => Rgb::new(0x00, 0xAA, 0x00),
            NamedColor::DarkAqua => Rgb::new(0x00, 0xAA, 0xAA),
            NamedColor::DarkRed => Rgb::new(0xAA, 0x00, 0x00),
            NamedColor::DarkPurple => Rgb::new(0xAA, 0x00, 0xAA),
            NamedColor::Gold => Rgb::new(0xFF, 0xAA, 0x00),
            NamedColor::Gray => Rgb::new(0xAA, 0xAA, 0xAA),
            NamedColor::DarkGray => Rgb::new(0x55, 0x55, 0x55),
            NamedColor::Blue => Rgb::new(0x55, 0x55, 0xFF),
            NamedColor::Green => Rgb::new(0x55, 0xFF, 0x55),
            NamedColor::Aqua => Rgb::new(0x55, 0xFF, 0xFF),
            NamedColor::Red => Rgb::new(0xFF, 0x55, 0x55),
            NamedColor::LightPurple => Rgb::new(0xFF, 0x55, 0xFF),
            NamedColor::Yellow => Rgb::new(0xFF, 0xFF, 0x55),
            NamedColor::White => Rgb::new(0xFF, 0xFF, 0xFF),
        }
    }
}

/// A single text color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextColor {
    Named(NamedColor),
    Hex(Rgb),
}

impl TextColor {
    pub fn rgb(self) -> Rgb {
        match self {
            TextColor::Named(named) => named.rgb(),
            TextColor::Hex(rgb) => rgb,
        }
    }

    /// Inline legacy code for this color
    pub fn to_legacy(self) -> String {
        match self {
            TextColor::Named(named) => format!("{}{}", SECTION, named.code()),
            TextColor::Hex(rgb) => rgb.to_legacy(),
        }
    }
}

impl fmt::Display for TextColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextColor::Named(named) => f.write_str(named.name()),
            TextColor::Hex(rgb) => f.write_str(&rgb.to_hex()),
        }
    }
}

/// True iff `s` is exactly `#` followed by six hex digits
pub fn is_valid_hex(s: &str) -> bool {
    HEX_COLOR.is_match(s)
}

/// Parse a named or `#RRGGBB` color; empty input means "no color"
pub fn parse_color(spec: &str) -> Result<Option<TextColor>> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Ok(None);
    }

    if spec.starts_with('#') {
        return Rgb::from_hex(spec)
            .map(|rgb| Some(TextColor::Hex(rgb)))
            .ok_or_else(|| RegaliaError::InvalidColor(spec.to_string()));
    }

    NamedColor::from_name(spec)
        .map(|named| Some(TextColor::Named(named)))
        .ok_or_else(|| RegaliaError::InvalidColor(spec.to_string()))
}

/// Linear per-channel interpolation with exact endpoints
pub fn interpolate(start: Rgb, end: Rgb, ratio: f64) -> Rgb {
    // NaN lands here as well
    if !(ratio > 0.0) {
        return start;
    }
    if ratio >= 1.0 {
        return end;
    }

    let lerp = |a: u8, b: u8| {
        let a = f64::from(a);
        let b = f64::from(b);
        (a + (b - a) * ratio).round().clamp(0.0, 255.0) as u8
    };

    Rgb::new(lerp(start.r, end.r), lerp(start.g, end.g), lerp(start.b, end.b))
}

/// Sum of absolute channel differences is within `threshold`
pub fn color_similarity(c1: Rgb, c2: Rgb, threshold: u32) -> bool {
    let diff = |a: u8, b: u8| u32::from(a.abs_diff(b));
    diff(c1.r, c2.r) + diff(c1.g, c2.g) + diff(c1.b, c2.b) <= threshold
}

/// Two-stop gradient laid across a piece of text
#[derive(Debug, Clone, Copy)]
pub struct Gradient<'a> {
    text: &'a str,
    len: usize,
    start: Rgb,
    end: Rgb,
}

/// Lay a gradient across `text`
pub fn gradient_text(text: &str, start: Rgb, end: Rgb) -> Gradient<'_> {
    Gradient {
        text,
        len: text.chars().count(),
        start,
        end,
    }
}

impl<'a> Gradient<'a> {
    /// Fresh iterator over the colored glyphs; may be called repeatedly
    pub fn glyphs(&self) -> GradientGlyphs<'a> {
        GradientGlyphs {
            chars: self.text.chars(),
            index: 0,
            len: self.len,
            start: self.start,
            end: self.end,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<'a> IntoIterator for Gradient<'a> {
    type Item = (char, Rgb);
    type IntoIter = GradientGlyphs<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.glyphs()
    }
}

/// Lazily colored glyphs of a [`Gradient`]
#[derive(Debug, Clone)]
pub struct GradientGlyphs<'a> {
    chars: std::str::Chars<'a>,
    index: usize,
    len: usize,
    start: Rgb,
    end: Rgb,
}

impl Iterator for GradientGlyphs<'_> {
    type Item = (char, Rgb);

    fn next(&mut self) -> Option<Self::Item> {
        let ch = self.chars.next()?;
        let color = gradient_stop(self.start, self.end, self.index, self.len);
        self.index += 1;
        Some((ch, color))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for GradientGlyphs<'_> {}

/// Color of glyph `index` in a gradient of `len` glyphs
pub(crate) fn gradient_stop(start: Rgb, end: Rgb, index: usize, len: usize) -> Rgb {
    if len <= 1 {
        return start;
    }
    interpolate(start, end, index as f64 / (len - 1) as f64)
}

/// Color of glyph `index` in a rainbow of `len` glyphs
pub(crate) fn rainbow_stop(index: usize, len: usize) -> Rgb {
    let hue = if len == 0 { 0.0 } else { index as f64 * 360.0 / len as f64 };
    Rgb::from_hsv(hue, 1.0, 1.0)
}

/// Sweep the hue wheel across `text`
pub fn rainbow_text(text: &str) -> impl Iterator<Item = (char, Rgb)> + Clone + '_ {
    let len = text.chars().count();
    text.chars()
        .enumerate()
        .map(move |(i, ch)| (ch, rainbow_stop(i, len)))
}

/// A stored name-color choice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpec {
    Solid(TextColor),
    Gradient(TextColor, TextColor),
    Rainbow,
}

impl ColorSpec {
    /// Parse `name`, `#RRGGBB`, `start:end` or `rainbow`; empty means no color
    pub fn parse(spec: &str) -> Result<Option<ColorSpec>> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Ok(None);
        }

        if spec.eq_ignore_ascii_case("rainbow") {
            return Ok(Some(ColorSpec::Rainbow));
        }

        if let Some((start, end)) = spec.split_once(':') {
            let invalid = || RegaliaError::InvalidColor(spec.to_string());
            let start = parse_color(start)?.ok_or_else(invalid)?;
            let end = parse_color(end)?.ok_or_else(invalid)?;
            return Ok(Some(ColorSpec::Gradient(start, end)));
        }

        Ok(parse_color(spec)?.map(ColorSpec::Solid))
    }

    /// Whether the spec colors each character separately
    pub fn is_effect(&self) -> bool {
        !matches!(self, ColorSpec::Solid(_))
    }

    /// Render `text` with inline legacy color codes
    pub fn paint(&self, text: &str) -> String {
        match self {
            ColorSpec::Solid(color) => format!("{}{}", color.to_legacy(), text),
            ColorSpec::Gradient(start, end) => {
                paint_glyphs(gradient_text(text, start.rgb(), end.rgb()).glyphs())
            }
            ColorSpec::Rainbow => paint_glyphs(rainbow_text(text)),
        }
    }
}

fn paint_glyphs(glyphs: impl Iterator<Item = (char, Rgb)>) -> String {
    let mut out = String::new();
    for (ch, rgb) in glyphs {
        out.push_str(&rgb.to_legacy());
        out.push(ch);
    }
    out
}

impl fmt::Display for ColorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorSpec::Solid(color) => write!(f, "{}", color),
            ColorSpec::Gradient(start, end) => write!(f, "{}:{}", start, end),
            ColorSpec::Rainbow => f.write_str("rainbow"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_color_variants() {
        assert_eq!(parse_color("").unwrap(), None);
        assert_eq!(parse_color("   ").unwrap(), None);
        assert_eq!(
            parse_color("Dark Red").unwrap(),
            Some(TextColor::Named(NamedColor::DarkRed))
        );
        assert_eq!(
            parse_color("#ff8800").unwrap(),
            Some(TextColor::Hex(Rgb::new(0xFF, 0x88, 0x00)))
        );
        assert!(matches!(parse_color("#ff88"), Err(RegaliaError::InvalidColor(_))));
        assert!(matches!(parse_color("octarine"), Err(RegaliaError::InvalidColor(_))));
    }

    #[test]
    fn test_is_valid_hex() {
        assert!(is_valid_hex("#A0b1C2"));
        assert!(!is_valid_hex("A0B1C2"));
        assert!(!is_valid_hex("#A0B1C"));
        assert!(!is_valid_hex("#A0B1C2D"));
        assert!(!is_valid_hex("#GGGGGG"));
    }

    #[test]
    fn test_named_codes_round_trip() {
        for named in NamedColor::ALL {
            assert_eq!(NamedColor::from_code(named.code()), Some(named));
            assert_eq!(NamedColor::from_name(named.name()), Some(named));
        }
        assert_eq!(NamedColor::Red.code(), 'c');
        assert_eq!(NamedColor::from_code('G'), None);
    }

    #[test]
    fn test_interpolate_clamps() {
        let a = Rgb::new(0, 0, 0);
        let b = Rgb::new(200, 100, 50);
        assert_eq!(interpolate(a, b, -1.0), a);
        assert_eq!(interpolate(a, b, 2.0), b);
        assert_eq!(interpolate(a, b, f64::NAN), a);
        assert_eq!(interpolate(a, b, 0.5), Rgb::new(100, 50, 25));
    }

    #[test]
    fn test_gradient_single_char_takes_start() {
        let start = Rgb::new(255, 0, 0);
        let end = Rgb::new(0, 0, 255);
        let glyphs: Vec<_> = gradient_text("A", start, end).glyphs().collect();
        assert_eq!(glyphs, vec![('A', start)]);
    }

    #[test]
    fn test_gradient_endpoints_and_restart() {
        let start = Rgb::new(255, 0, 0);
        let end = Rgb::new(0, 0, 255);
        let gradient = gradient_text("Steve", start, end);
        let first: Vec<_> = gradient.glyphs().collect();
        let second: Vec<_> = gradient.glyphs().collect();

        assert_eq!(first.len(), 5);
        assert_eq!(first[0].1, start);
        assert_eq!(first[4].1, end);
        assert_eq!(first, second);
        assert_eq!(gradient.glyphs().len(), 5);
    }

    #[test]
    fn test_color_similarity() {
        let a = Rgb::new(10, 10, 10);
        let b = Rgb::new(15, 5, 10);
        assert!(color_similarity(a, b, 10));
        assert!(!color_similarity(a, b, 9));
    }

    #[test]
    fn test_color_spec_parse() {
        assert_eq!(ColorSpec::parse("").unwrap(), None);
        assert_eq!(ColorSpec::parse("RAINBOW").unwrap(), Some(ColorSpec::Rainbow));
        assert_eq!(
            ColorSpec::parse("red:gold").unwrap(),
            Some(ColorSpec::Gradient(
                TextColor::Named(NamedColor::Red),
                TextColor::Named(NamedColor::Gold)
            ))
        );
        assert!(ColorSpec::parse("red:").is_err());
        assert!(ColorSpec::parse("red:nope").is_err());
        assert_eq!(
            ColorSpec::parse("#FF5F6D:#FFC371").unwrap().map(|s| s.to_string()),
            Some("#FF5F6D:#FFC371".to_string())
        );
    }

    #[test]
    fn test_paint_solid_and_gradient() {
        let red = ColorSpec::Solid(TextColor::Named(NamedColor::Red));
        assert_eq!(red.paint("Nova"), "§cNova");

        let gradient = ColorSpec::Gradient(
            TextColor::Hex(Rgb::new(0xFF, 0, 0)),
            TextColor::Hex(Rgb::new(0, 0, 0xFF)),
        );
        let painted = gradient.paint("ab");
        assert_eq!(painted, "§x§f§f§0§0§0§0a§x§0§0§0§0§f§fb");
        assert_eq!(strip_colors(&painted), "ab");
    }

    #[test]
    fn test_rainbow_starts_red() {
        let colors: Vec<_> = rainbow_text("abc").collect();
        assert_eq!(colors.len(), 3);
        assert_eq!(colors[0].1, Rgb::new(255, 0, 0));
    }

    fn rgb_strategy() -> impl Strategy<Value = Rgb> {
        (any::<u8>(), any::<u8>(), any::<u8>()).prop_map(|(r, g, b)| Rgb::new(r, g, b))
    }

    proptest! {
        /// Endpoints are returned exactly, with no rounding drift.
        #[test]
        fn interpolate_endpoints_exact(a in rgb_strategy(), b in rgb_strategy()) {
            prop_assert_eq!(interpolate(a, b, 0.0), a);
            prop_assert_eq!(interpolate(a, b, 1.0), b);
        }

        /// Every channel stays between the two endpoint channels.
        #[test]
        fn interpolate_bounded(a in rgb_strategy(), b in rgb_strategy(), t in 0.0f64..=1.0) {
            let c = interpolate(a, b, t);
            prop_assert!(c.r >= a.r.min(b.r) && c.r <= a.r.max(b.r));
            prop_assert!(c.g >= a.g.min(b.g) && c.g <= a.g.max(b.g));
            prop_assert!(c.b >= a.b.min(b.b) && c.b <= a.b.max(b.b));
        }

        /// A gradient has one glyph per character and hits both stops.
        #[test]
        fn gradient_hits_both_stops(text in "[a-zA-Z0-9]{2,24}", a in rgb_strategy(), b in rgb_strategy()) {
            let glyphs: Vec<_> = gradient_text(&text, a, b).glyphs().collect();
            prop_assert_eq!(glyphs.len(), text.chars().count());
            prop_assert_eq!(glyphs[0].1, a);
            prop_assert_eq!(glyphs[glyphs.len() - 1].1, b);
        }
    }
}
