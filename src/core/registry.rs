//! Category registry: label and display color per category id
//!
//! Established before the pipeline starts and immutable afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::wire::CategoryId;

/// Projects served by the mirror, in wire id order
pub const MIRROR_PROJECTS: &[&str] = &[
    "almalinux", "alpine", "archlinux", "archlinux32", "artix-linux", "blender", "centos",
    "clonezilla", "cpan", "cran", "ctan", "cygwin", "debian", "debian-cd", "eclipse", "freebsd",
    "gentoo", "gentoo-portage", "gparted", "ipfire", "isabelle", "linux", "linuxmint", "manjaro",
    "msys2", "odroid", "openbsd", "opensuse", "parrot", "raspbian", "RebornOS", "ros", "sabayon",
    "serenity", "slackware", "slitaz", "tdf", "templeos", "ubuntu", "ubuntu-cdimage",
    "ubuntu-ports", "ubuntu-releases", "videolan", "voidlinux", "zorinos",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid color {0:?}, expected #rrggbb or #rgb")]
pub struct ColorParseError(pub String);

/// 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const WHITE: Rgb = Rgb(255, 255, 255);

    /// Convert HSV (all components in [0, 1]) to RGB
    pub fn from_hsv(h: f32, s: f32, v: f32) -> Self {
        let h = h.rem_euclid(1.0) * 6.0;
        let sector = h.floor() as u32;
        let f = h - h.floor();
        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));
        let (r, g, b) = match sector {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        };
        let to_u8 = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgb(to_u8(r), to_u8(g), to_u8(b))
    }
}

impl FromStr for Rgb {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ColorParseError(s.to_string());
        let hex = s.strip_prefix('#').ok_or_else(err)?;
        if !hex.is_ascii() {
            return Err(err());
        }
        let channel = |digits: &str| u8::from_str_radix(digits, 16).map_err(|_| err());
        match hex.len() {
            6 => Ok(Rgb(channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?)),
            3 => {
                // #abc == #aabbcc
                let r = channel(&hex[0..1])?;
                let g = channel(&hex[1..2])?;
                let b = channel(&hex[2..3])?;
                Ok(Rgb(r * 17, g * 17, b * 17))
            }
            _ => Err(err()),
        }
    }
}

impl TryFrom<String> for Rgb {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

/// A registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub label: String,
    pub color: Rgb,
}

/// Immutable mapping from [`CategoryId`] to label and color
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRegistry {
    categories: Vec<Category>,
}

impl CategoryRegistry {
    /// Build a registry. Only the first 256 entries are addressable on the wire.
    pub fn new(mut categories: Vec<Category>) -> Self {
        if categories.len() > u8::MAX as usize + 1 {
            tracing::warn!(
                len = categories.len(),
                "Registry larger than the wire id space, truncating"
            );
            categories.truncate(u8::MAX as usize + 1);
        }
        Self { categories }
    }

    /// Registry of the mirror's projects with evenly spread hues
    pub fn mirror_projects() -> Self {
        Self::from_labels(MIRROR_PROJECTS.iter().copied())
    }

    /// Assign distinct colors to the given labels.
    ///
    /// Hues step by the golden angle so neighbouring ids never look alike.
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        const GOLDEN: f32 = 0.618_034;
        let categories = labels
            .into_iter()
            .enumerate()
            .map(|(i, label)| {
                let hue = (i as f32 * GOLDEN).fract();
                let value = if i % 2 == 0 { 0.95 } else { 0.8 };
                Category {
                    label: label.to_string(),
                    color: Rgb::from_hsv(hue, 0.65, value),
                }
            })
            .collect();
        Self::new(categories)
    }

    pub fn get(&self, id: CategoryId) -> Option<&Category> {
        self.categories.get(id.idx())
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CategoryId, &Category)> {
        self.categories
            .iter()
            .enumerate()
            .map(|(i, c)| (CategoryId(i as u8), c))
    }
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::mirror_projects()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_colors() {
        assert_eq!("#ff8000".parse::<Rgb>(), Ok(Rgb(255, 128, 0)));
        assert_eq!("#0A0b0C".parse::<Rgb>(), Ok(Rgb(10, 11, 12)));
        assert_eq!("#fff".parse::<Rgb>(), Ok(Rgb::WHITE));
        assert!("ff8000".parse::<Rgb>().is_err());
        assert!("#ff80".parse::<Rgb>().is_err());
        assert!("#gg0000".parse::<Rgb>().is_err());
        assert!("#ü00".parse::<Rgb>().is_err());
    }

    #[test]
    fn test_color_display() {
        assert_eq!(Rgb(40, 40, 40).to_string(), "#282828");
    }

    #[test]
    fn test_category_json() {
        let json = r##"[{"label": "debian", "color": "#d70a53"}, {"label": "alpine", "color": "#0d597f"}]"##;
        let categories: Vec<Category> = serde_json::from_str(json).unwrap();
        let registry = CategoryRegistry::new(categories);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(CategoryId(0)).unwrap().label, "debian");
        assert_eq!(registry.get(CategoryId(1)).unwrap().color, Rgb(13, 89, 127));
        assert!(registry.get(CategoryId(2)).is_none());
    }

    #[test]
    fn test_bad_color_rejected_in_json() {
        let json = r#"[{"label": "debian", "color": "red"}]"#;
        assert!(serde_json::from_str::<Vec<Category>>(json).is_err());
    }

    #[test]
    fn test_mirror_projects_distinct_colors() {
        let registry = CategoryRegistry::mirror_projects();
        assert_eq!(registry.len(), MIRROR_PROJECTS.len());
        assert_eq!(registry.get(CategoryId(0)).unwrap().label, "almalinux");

        let colors: Vec<Rgb> = registry.iter().map(|(_, c)| c.color).collect();
        for i in 0..colors.len() {
            for j in (i + 1)..colors.len() {
                assert_ne!(colors[i], colors[j], "Categories {} and {} share a color", i, j);
            }
        }
    }

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(Rgb::from_hsv(0.0, 1.0, 1.0), Rgb(255, 0, 0));
        assert_eq!(Rgb::from_hsv(1.0 / 3.0, 1.0, 1.0), Rgb(0, 255, 0));
        assert_eq!(Rgb::from_hsv(2.0 / 3.0, 1.0, 1.0), Rgb(0, 0, 255));
        assert_eq!(Rgb::from_hsv(0.5, 0.0, 1.0), Rgb::WHITE);
    }
}
