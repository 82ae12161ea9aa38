//! Page layout options for a render.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: &str = "A4";
pub const DEFAULT_MARGIN_MM: u32 = 10;
pub const DEFAULT_DPI: u32 = 300;

/// Query keys that carry render options.
const OPTION_KEYS: &[&str] = &[
    "page_size",
    "portrait",
    "margin_top_mm",
    "margin_right_mm",
    "margin_bottom_mm",
    "margin_left_mm",
    "dpi",
    "print_background",
    "grayscale",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Portrait => write!(f, "Portrait"),
            Orientation::Landscape => write!(f, "Landscape"),
        }
    }
}

/// Layout parameters. Every field is optional; `None` means "use the default".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    pub page_size: Option<String>,
    pub margin_top_mm: Option<u32>,
    pub margin_right_mm: Option<u32>,
    pub margin_bottom_mm: Option<u32>,
    pub margin_left_mm: Option<u32>,
    pub dpi: Option<u32>,
    pub print_background: Option<bool>,
    pub grayscale: Option<bool>,
    pub orientation: Option<Orientation>,
}

impl RenderOptions {
    /// Fully specified default set: A4, 10 mm margins, 300 DPI, background
    /// on, grayscale off, portrait.
    pub fn defaults() -> Self {
        Self {
            page_size: Some(DEFAULT_PAGE_SIZE.to_string()),
            margin_top_mm: Some(DEFAULT_MARGIN_MM),
            margin_right_mm: Some(DEFAULT_MARGIN_MM),
            margin_bottom_mm: Some(DEFAULT_MARGIN_MM),
            margin_left_mm: Some(DEFAULT_MARGIN_MM),
            dpi: Some(DEFAULT_DPI),
            print_background: Some(true),
            grayscale: Some(false),
            orientation: Some(Orientation::Portrait),
        }
    }

    /// Fills every unset field from [`RenderOptions::defaults`]. Idempotent.
    pub fn with_defaults(self) -> Self {
        let d = Self::defaults();
        Self {
            page_size: self.page_size.or(d.page_size),
            margin_top_mm: self.margin_top_mm.or(d.margin_top_mm),
            margin_right_mm: self.margin_right_mm.or(d.margin_right_mm),
            margin_bottom_mm: self.margin_bottom_mm.or(d.margin_bottom_mm),
            margin_left_mm: self.margin_left_mm.or(d.margin_left_mm),
            dpi: self.dpi.or(d.dpi),
            print_background: self.print_background.or(d.print_background),
            grayscale: self.grayscale.or(d.grayscale),
            orientation: self.orientation.or(d.orientation),
        }
    }

    /// Reads options from query parameters.
    ///
    /// Returns `None` when no option key is present at all. Values that fail
    /// to parse are ignored rather than rejected.
    pub fn from_query(query: &HashMap<String, String>) -> Option<Self> {
        let present = OPTION_KEYS
            .iter()
            .any(|key| query.get(*key).is_some_and(|v| !v.is_empty()));
        if !present {
            return None;
        }

        let get_u32 = |key: &str| query.get(key).and_then(|v| v.trim().parse::<u32>().ok());
        let get_bool = |key: &str| query.get(key).and_then(|v| parse_bool(v));

        Some(Self {
            page_size: query.get("page_size").filter(|v| !v.is_empty()).cloned(),
            margin_top_mm: get_u32("margin_top_mm"),
            margin_right_mm: get_u32("margin_right_mm"),
            margin_bottom_mm: get_u32("margin_bottom_mm"),
            margin_left_mm: get_u32("margin_left_mm"),
            dpi: get_u32("dpi"),
            print_background: get_bool("print_background"),
            grayscale: get_bool("grayscale"),
            orientation: get_bool("portrait").map(|portrait| {
                if portrait {
                    Orientation::Portrait
                } else {
                    Orientation::Landscape
                }
            }),
        })
    }
}

/// Accepts the spellings `1 t T TRUE true True` and their false counterparts.
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_options_take_defaults() {
        let opts = RenderOptions::default().with_defaults();
        assert_eq!(opts.page_size.as_deref(), Some("A4"));
        assert_eq!(opts.margin_top_mm, Some(10));
        assert_eq!(opts.margin_right_mm, Some(10));
        assert_eq!(opts.margin_bottom_mm, Some(10));
        assert_eq!(opts.margin_left_mm, Some(10));
        assert_eq!(opts.dpi, Some(300));
        assert_eq!(opts.print_background, Some(true));
        assert_eq!(opts.grayscale, Some(false));
        assert_eq!(opts.orientation, Some(Orientation::Portrait));
        assert_eq!(opts, RenderOptions::defaults());
    }

    #[test]
    fn test_defaults_idempotent() {
        let full = RenderOptions {
            page_size: Some("Letter".into()),
            margin_top_mm: Some(1),
            margin_right_mm: Some(2),
            margin_bottom_mm: Some(3),
            margin_left_mm: Some(4),
            dpi: Some(96),
            print_background: Some(false),
            grayscale: Some(true),
            orientation: Some(Orientation::Landscape),
        };
        assert_eq!(full.clone().with_defaults(), full);

        let once = RenderOptions::default().with_defaults();
        assert_eq!(once.clone().with_defaults(), once);
    }

    #[test]
    fn test_partial_overlay() {
        let opts = RenderOptions {
            dpi: Some(150),
            grayscale: Some(true),
            ..Default::default()
        }
        .with_defaults();

        assert_eq!(opts.dpi, Some(150));
        assert_eq!(opts.grayscale, Some(true));
        assert_eq!(opts.page_size.as_deref(), Some("A4"));
        assert_eq!(opts.margin_left_mm, Some(10));
    }

    #[test]
    fn test_from_query_absent() {
        assert_eq!(RenderOptions::from_query(&query(&[])), None);
        assert_eq!(
            RenderOptions::from_query(&query(&[("filename", "x.pdf"), ("base_url", "https://a")])),
            None
        );
        assert_eq!(RenderOptions::from_query(&query(&[("dpi", "")])), None);
    }

    #[test]
    fn test_from_query_values() {
        let opts = RenderOptions::from_query(&query(&[
            ("page_size", "Letter"),
            ("portrait", "false"),
            ("margin_top_mm", "5"),
            ("dpi", "not-a-number"),
            ("grayscale", "1"),
        ]))
        .unwrap();

        assert_eq!(
            opts,
            RenderOptions {
                page_size: Some("Letter".into()),
                margin_top_mm: Some(5),
                grayscale: Some(true),
                orientation: Some(Orientation::Landscape),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_parse_bool_spellings() {
        assert_eq!(parse_bool("True"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("yes"), None);
    }
}
