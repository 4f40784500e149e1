//! Parsers for the string-typed style arguments blocks hand to the context.
//!
//! Parsing follows the browser: an unparseable value is reported as `None` and the caller keeps
//! the previous setting. The dash pattern is the exception and reports a hard error.

use crate::foundation::core::Rgba8;
use crate::foundation::error::{ReCanvasError, ReCanvasResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineCap {
    #[default]
    Butt,
    Round,
    Square,
}

impl LineCap {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "butt" => Some(Self::Butt),
            "round" => Some(Self::Round),
            "square" => Some(Self::Square),
            _ => None,
        }
    }

    pub(crate) fn to_kurbo(self) -> kurbo::Cap {
        match self {
            Self::Butt => kurbo::Cap::Butt,
            Self::Round => kurbo::Cap::Round,
            Self::Square => kurbo::Cap::Square,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineJoin {
    #[default]
    Miter,
    Round,
    Bevel,
}

impl LineJoin {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "miter" => Some(Self::Miter),
            "round" => Some(Self::Round),
            "bevel" => Some(Self::Bevel),
            _ => None,
        }
    }

    pub(crate) fn to_kurbo(self) -> kurbo::Join {
        match self {
            Self::Miter => kurbo::Join::Miter,
            Self::Round => kurbo::Join::Round,
            Self::Bevel => kurbo::Join::Bevel,
        }
    }
}

/// `globalCompositeOperation` values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash)]
pub enum CompositeMode {
    #[default]
    SourceOver,
    SourceIn,
    SourceOut,
    SourceAtop,
    DestinationOver,
    DestinationIn,
    DestinationOut,
    DestinationAtop,
    Lighter,
    Copy,
    Xor,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl CompositeMode {
    pub const ALL: [Self; 26] = [
        Self::SourceOver,
        Self::SourceIn,
        Self::SourceOut,
        Self::SourceAtop,
        Self::DestinationOver,
        Self::DestinationIn,
        Self::DestinationOut,
        Self::DestinationAtop,
        Self::Lighter,
        Self::Copy,
        Self::Xor,
        Self::Multiply,
        Self::Screen,
        Self::Overlay,
        Self::Darken,
        Self::Lighten,
        Self::ColorDodge,
        Self::ColorBurn,
        Self::HardLight,
        Self::SoftLight,
        Self::Difference,
        Self::Exclusion,
        Self::Hue,
        Self::Saturation,
        Self::Color,
        Self::Luminosity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SourceOver => "source-over",
            Self::SourceIn => "source-in",
            Self::SourceOut => "source-out",
            Self::SourceAtop => "source-atop",
            Self::DestinationOver => "destination-over",
            Self::DestinationIn => "destination-in",
            Self::DestinationOut => "destination-out",
            Self::DestinationAtop => "destination-atop",
            Self::Lighter => "lighter",
            Self::Copy => "copy",
            Self::Xor => "xor",
            Self::Multiply => "multiply",
            Self::Screen => "screen",
            Self::Overlay => "overlay",
            Self::Darken => "darken",
            Self::Lighten => "lighten",
            Self::ColorDodge => "color-dodge",
            Self::ColorBurn => "color-burn",
            Self::HardLight => "hard-light",
            Self::SoftLight => "soft-light",
            Self::Difference => "difference",
            Self::Exclusion => "exclusion",
            Self::Hue => "hue",
            Self::Saturation => "saturation",
            Self::Color => "color",
            Self::Luminosity => "luminosity",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|m| m.as_str() == s)
    }
}

/// Parse a CSS color. Supports hex forms, `rgb()`/`rgba()` and a small named palette.
pub fn parse_css_color(s: &str) -> Option<Rgba8> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex(hex);
    }

    let lower = s.to_ascii_lowercase();
    if let Some(body) = lower
        .strip_prefix("rgba(")
        .or_else(|| lower.strip_prefix("rgb("))
    {
        return parse_rgb_fn(body.strip_suffix(')')?);
    }

    let named = match lower.as_str() {
        "black" => Rgba8::opaque(0, 0, 0),
        "white" => Rgba8::opaque(255, 255, 255),
        "red" => Rgba8::opaque(255, 0, 0),
        "green" => Rgba8::opaque(0, 128, 0),
        "lime" => Rgba8::opaque(0, 255, 0),
        "blue" => Rgba8::opaque(0, 0, 255),
        "yellow" => Rgba8::opaque(255, 255, 0),
        "cyan" | "aqua" => Rgba8::opaque(0, 255, 255),
        "magenta" | "fuchsia" => Rgba8::opaque(255, 0, 255),
        "orange" => Rgba8::opaque(255, 165, 0),
        "purple" => Rgba8::opaque(128, 0, 128),
        "pink" => Rgba8::opaque(255, 192, 203),
        "gray" | "grey" => Rgba8::opaque(128, 128, 128),
        "silver" => Rgba8::opaque(192, 192, 192),
        "navy" => Rgba8::opaque(0, 0, 128),
        "teal" => Rgba8::opaque(0, 128, 128),
        "maroon" => Rgba8::opaque(128, 0, 0),
        "olive" => Rgba8::opaque(128, 128, 0),
        "transparent" => Rgba8::new(0, 0, 0, 0),
        _ => return None,
    };
    Some(named)
}

fn parse_hex(hex: &str) -> Option<Rgba8> {
    if !hex.bytes().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let nib = |i: usize| u8::from_str_radix(&hex[i..=i], 16).ok().map(|n| n << 4 | n);
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        3 => Some(Rgba8::opaque(nib(0)?, nib(1)?, nib(2)?)),
        4 => Some(Rgba8::new(nib(0)?, nib(1)?, nib(2)?, nib(3)?)),
        6 => Some(Rgba8::opaque(byte(0)?, byte(2)?, byte(4)?)),
        8 => Some(Rgba8::new(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
        _ => None,
    }
}

fn parse_rgb_fn(body: &str) -> Option<Rgba8> {
    let parts: Vec<&str> = body
        .split([',', ' ', '/'])
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }

    let channel = |p: &str| -> Option<u8> {
        let v = match p.strip_suffix('%') {
            Some(pct) => pct.parse::<f64>().ok()? * 2.55,
            None => p.parse::<f64>().ok()?,
        };
        v.is_finite().then(|| v.round().clamp(0.0, 255.0) as u8)
    };
    let alpha = |p: &str| -> Option<u8> {
        let v = match p.strip_suffix('%') {
            Some(pct) => pct.parse::<f64>().ok()? / 100.0,
            None => p.parse::<f64>().ok()?,
        };
        v.is_finite()
            .then(|| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
    };

    let a = match parts.get(3) {
        Some(p) => alpha(p)?,
        None => 255,
    };
    Some(Rgba8::new(
        channel(parts[0])?,
        channel(parts[1])?,
        channel(parts[2])?,
        a,
    ))
}

/// Parsed subset of the CSS `font` shorthand.
#[derive(Clone, Debug, PartialEq)]
pub struct FontSpec {
    pub size_px: f32,
    pub family: String,
    pub bold: bool,
    pub italic: bool,
}

impl Default for FontSpec {
    fn default() -> Self {
        Self {
            size_px: 10.0,
            family: "sans-serif".to_string(),
            bold: false,
            italic: false,
        }
    }
}

impl FontSpec {
    /// Parse e.g. `"50px arial"`, `"bold 12pt 'Noto Sans', serif"`.
    pub fn parse(s: &str) -> Option<Self> {
        let mut bold = false;
        let mut italic = false;
        let mut rest = s.trim();

        loop {
            let (token, tail) = match rest.split_once(char::is_whitespace) {
                Some((t, tail)) => (t, tail.trim_start()),
                None => (rest, ""),
            };
            match token.to_ascii_lowercase().as_str() {
                "italic" | "oblique" => italic = true,
                "bold" | "bolder" | "600" | "700" | "800" | "900" => bold = true,
                "normal" | "lighter" | "100" | "200" | "300" | "400" | "500" => {}
                "small-caps" => {}
                _ => break,
            }
            rest = tail;
        }

        let (size_token, family) = rest.split_once(char::is_whitespace)?;
        // `12px/1.5 family` carries a line height we do not use.
        let size_token = size_token.split('/').next()?;
        let size_px = if let Some(px) = size_token.strip_suffix("px") {
            px.parse::<f32>().ok()?
        } else if let Some(pt) = size_token.strip_suffix("pt") {
            pt.parse::<f32>().ok()? * 4.0 / 3.0
        } else {
            return None;
        };
        if !size_px.is_finite() || size_px <= 0.0 {
            return None;
        }

        let family = family
            .split(',')
            .next()?
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .to_string();
        if family.is_empty() {
            return None;
        }

        Some(Self {
            size_px,
            family,
            bold,
            italic,
        })
    }
}

/// Parse a dash pattern given as a JSON array, e.g. `"[10,5]"`.
///
/// Malformed JSON is an error. A list containing negative or non-finite values yields `Ok(None)`
/// (the context ignores it). Odd-length lists are repeated to even length.
pub fn parse_line_dash(s: &str) -> ReCanvasResult<Option<Vec<f64>>> {
    let values: Vec<f64> = serde_json::from_str(s)
        .map_err(|e| ReCanvasError::argument(format!("invalid dash pattern '{s}': {e}")))?;
    if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Ok(None);
    }
    let mut out = values.clone();
    if out.len() % 2 == 1 {
        out.extend_from_slice(&values);
    }
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_parse_like_css() {
        assert_eq!(parse_css_color("#66CCFF"), Some(Rgba8::opaque(0x66, 0xcc, 0xff)));
        assert_eq!(parse_css_color("#fff"), Some(Rgba8::opaque(255, 255, 255)));
        assert_eq!(parse_css_color("#ff000080"), Some(Rgba8::new(255, 0, 0, 128)));
        assert_eq!(
            parse_css_color("rgba(10, 20, 30, 0.5)"),
            Some(Rgba8::new(10, 20, 30, 128))
        );
        assert_eq!(parse_css_color("rgb(0 255 0)"), Some(Rgba8::opaque(0, 255, 0)));
        assert_eq!(parse_css_color("Red"), Some(Rgba8::opaque(255, 0, 0)));
        assert_eq!(parse_css_color("#12"), None);
        assert_eq!(parse_css_color("#zzzzzz"), None);
        assert_eq!(parse_css_color("not a color"), None);
    }

    #[test]
    fn composite_names_round_trip_through_parse() {
        for m in CompositeMode::ALL {
            assert_eq!(CompositeMode::parse(m.as_str()), Some(m));
        }
        assert_eq!(CompositeMode::parse("plus"), None);
    }

    #[test]
    fn font_shorthand_subset() {
        let f = FontSpec::parse("50px arial").unwrap();
        assert_eq!(f.size_px, 50.0);
        assert_eq!(f.family, "arial");

        let f = FontSpec::parse("italic bold 12pt 'Noto Sans', serif").unwrap();
        assert!(f.bold && f.italic);
        assert_eq!(f.size_px, 16.0);
        assert_eq!(f.family, "Noto Sans");

        assert!(FontSpec::parse("arial").is_none());
        assert!(FontSpec::parse("-3px arial").is_none());
    }

    #[test]
    fn dash_pattern_parsing() {
        assert_eq!(parse_line_dash("[10,5]").unwrap(), Some(vec![10.0, 5.0]));
        assert_eq!(
            parse_line_dash("[1,2,3]").unwrap(),
            Some(vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0])
        );
        assert_eq!(parse_line_dash("[]").unwrap(), Some(vec![]));
        assert_eq!(parse_line_dash("[4,-1]").unwrap(), None);
        assert!(parse_line_dash("[10,").is_err());
    }
}
