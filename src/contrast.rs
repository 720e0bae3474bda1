//! WCAG contrast evaluation.
//!
//! Implements the WCAG 2.x relative luminance and contrast ratio formulas
//! (<https://www.w3.org/TR/WCAG21/#dfn-relative-luminance>). Used as the
//! local fallback when the axe server cannot answer a contrast query, so it
//! never fails: malformed colors yield a conservative failing result.

use serde::{Deserialize, Serialize};

/// Result of a contrast check between a foreground and a background color.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContrastResult {
    pub contrast_ratio: f64,
    pub passes: bool,
    pub wcag_aa: bool,
    pub wcag_aaa: bool,
}

impl ContrastResult {
    fn from_ratio(ratio: f64) -> Self {
        Self {
            contrast_ratio: ratio,
            passes: ratio >= 4.5,
            wcag_aa: ratio >= 4.5,
            wcag_aaa: ratio >= 7.0,
        }
    }

    /// Conservative result for inputs that cannot be evaluated.
    pub fn failing() -> Self {
        Self::from_ratio(1.0)
    }
}

/// Parse a 6-hex-digit RGB color, with or without a leading `#`.
pub fn parse_color(value: &str) -> Option<(u8, u8, u8)> {
    let hex = value.trim();
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

fn linearize(channel: u8) -> f64 {
    let c = channel as f64 / 255.0;
    if c <= 0.03928 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Relative luminance of an sRGB color per WCAG 2.x.
pub fn relative_luminance(r: u8, g: u8, b: u8) -> f64 {
    0.2126 * linearize(r) + 0.7152 * linearize(g) + 0.0722 * linearize(b)
}

/// Contrast ratio between two hex colors.
///
/// Returns the failing fallback (1.0, all flags false) when either color is
/// not a valid 6-hex-digit value.
pub fn contrast_ratio(foreground: &str, background: &str) -> ContrastResult {
    let (fg, bg) = match (parse_color(foreground), parse_color(background)) {
        (Some(fg), Some(bg)) => (fg, bg),
        _ => return ContrastResult::failing(),
    };

    let l1 = relative_luminance(fg.0, fg.1, fg.2);
    let l2 = relative_luminance(bg.0, bg.1, bg.2);
    let (lighter, darker) = if l1 > l2 { (l1, l2) } else { (l2, l1) };
    ContrastResult::from_ratio((lighter + 0.05) / (darker + 0.05))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#ff0000"), Some((255, 0, 0)));
        assert_eq!(parse_color("1a2b3c"), Some((0x1a, 0x2b, 0x3c)));
        assert_eq!(parse_color("  #FFFFFF "), Some((255, 255, 255)));
        assert_eq!(parse_color("#fff"), None);
        assert_eq!(parse_color("#zzzzzz"), None);
        assert_eq!(parse_color("red"), None);
        assert_eq!(parse_color(""), None);
    }

    #[test]
    fn test_black_on_white() {
        let result = contrast_ratio("#000000", "#ffffff");
        assert!(
            (result.contrast_ratio - 21.0).abs() < 0.1,
            "black on white should be ~21:1, got {:.2}",
            result.contrast_ratio
        );
        assert!(result.passes && result.wcag_aa && result.wcag_aaa);
    }

    #[test]
    fn test_same_color_is_one() {
        for color in ["#000000", "#ffffff", "#1a2b3c", "#777777"] {
            let result = contrast_ratio(color, color);
            assert!(
                (result.contrast_ratio - 1.0).abs() < 0.001,
                "{} against itself should be 1:1",
                color
            );
            assert!(!result.passes);
        }
    }

    #[test]
    fn test_symmetric() {
        let pairs = [
            ("#000000", "#ffffff"),
            ("#123456", "#fedcba"),
            ("#777777", "#eeeeee"),
        ];
        for (a, b) in pairs {
            let ab = contrast_ratio(a, b).contrast_ratio;
            let ba = contrast_ratio(b, a).contrast_ratio;
            assert!((ab - ba).abs() < 1e-9, "ratio({a},{b}) != ratio({b},{a})");
        }
    }

    #[test]
    fn test_aaa_implies_aa() {
        for (a, b) in [
            ("#000000", "#ffffff"),
            ("#595959", "#ffffff"),
            ("#777777", "#888888"),
            ("#0000ff", "#ffffff"),
        ] {
            let result = contrast_ratio(a, b);
            if result.wcag_aaa {
                assert!(result.wcag_aa, "AAA pass without AA for {a}/{b}");
            }
        }
    }

    #[test]
    fn test_malformed_input_falls_back() {
        for (a, b) in [("red", "#ffffff"), ("#zzzzzz", "#000000"), ("#fff", "#000000")] {
            let result = contrast_ratio(a, b);
            assert_eq!(result.contrast_ratio, 1.0);
            assert!(!result.passes && !result.wcag_aa && !result.wcag_aaa);
        }
    }

    #[test]
    fn test_aa_but_not_aaa() {
        // #595959 on white is ~7.0 boundary; #767676 on white is ~4.54
        let result = contrast_ratio("#767676", "#ffffff");
        assert!(result.wcag_aa, "got {:.2}", result.contrast_ratio);
        assert!(!result.wcag_aaa);
    }

    #[test]
    fn test_luminance_extremes() {
        assert!((relative_luminance(255, 255, 255) - 1.0).abs() < 0.01);
        assert!(relative_luminance(0, 0, 0).abs() < 0.01);
    }
}
