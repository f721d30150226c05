//! Flag code to bulb color mapping, one table per feed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ingestors::types::{FeedKind, FlagCode};

/// One bulb setting. `hex` is only used for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorSpec {
    pub hue: u16,
    pub saturation: u8,
    pub brightness: u8,
    pub label: String,
    pub hex: String,
}

impl ColorSpec {
    pub fn new(hue: u16, saturation: u8, brightness: u8, label: &str, hex: &str) -> Self {
        Self {
            hue,
            saturation,
            brightness,
            label: label.to_string(),
            hex: hex.to_string(),
        }
    }
}

pub type ColorTable = BTreeMap<String, ColorSpec>;

/// Entries read from the config file, merged over the built-in tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorOverrides {
    pub f1: ColorTable,
    pub motogp: ColorTable,
    pub nascar: ColorTable,
}

impl ColorOverrides {
    pub fn is_empty(&self) -> bool {
        self.f1.is_empty() && self.motogp.is_empty() && self.nascar.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorTables {
    f1: ColorTable,
    motogp: ColorTable,
    nascar: ColorTable,
}

impl ColorTables {
    pub fn with_overrides(overrides: &ColorOverrides) -> Self {
        let mut tables = Self::default();
        for kind in FeedKind::ALL {
            let source = match kind {
                FeedKind::F1 => &overrides.f1,
                FeedKind::MotoGp => &overrides.motogp,
                FeedKind::Nascar => &overrides.nascar,
            };
            tables
                .table_mut(kind)
                .extend(source.iter().map(|(code, spec)| (code.clone(), spec.clone())));
        }
        tables
    }

    pub fn table(&self, kind: FeedKind) -> &ColorTable {
        match kind {
            FeedKind::F1 => &self.f1,
            FeedKind::MotoGp => &self.motogp,
            FeedKind::Nascar => &self.nascar,
        }
    }

    fn table_mut(&mut self, kind: FeedKind) -> &mut ColorTable {
        match kind {
            FeedKind::F1 => &mut self.f1,
            FeedKind::MotoGp => &mut self.motogp,
            FeedKind::Nascar => &mut self.nascar,
        }
    }

    pub fn lookup(&self, kind: FeedKind, code: &FlagCode) -> Option<&ColorSpec> {
        self.table(kind).get(code.as_str())
    }
}

fn table(entries: &[(&str, u16, u8, u8, &str, &str)]) -> ColorTable {
    entries
        .iter()
        .map(|&(code, h, s, v, label, hex)| (code.to_string(), ColorSpec::new(h, s, v, label, hex)))
        .collect()
}

impl Default for ColorTables {
    fn default() -> Self {
        let f1 = table(&[
            ("1", 120, 100, 50, "Track Clear", "#00FF00"),
            ("2", 60, 100, 50, "Yellow Flag", "#FFFF00"),
            ("3", 60, 100, 50, "Yellow Flag", "#FFFF00"),
            ("4", 30, 100, 70, "Safety Car", "#FFA500"),
            ("5", 0, 100, 50, "Red Flag", "#FF0000"),
            ("6", 300, 100, 50, "VSC", "#FF00FF"),
            ("7", 300, 100, 30, "VSC Ending", "#800080"),
        ]);
        let motogp = table(&[
            ("I", 120, 100, 50, "Session Running", "#00FF00"),
            ("R", 0, 100, 50, "Red Flag", "#FF0000"),
            ("F", 0, 0, 50, "Session Finished", "#808080"),
            ("N", 0, 0, 10, "Not Started", "#1A1A1A"),
        ]);
        let nascar = table(&[
            ("0", 0, 0, 0, "None", "#000000"),
            ("1", 120, 100, 50, "Green", "#00FF00"),
            ("2", 60, 100, 50, "Yellow", "#FFFF00"),
            ("3", 0, 100, 50, "Red", "#FF0000"),
            ("4", 0, 0, 100, "White", "#FFFFFF"),
            ("5", 0, 0, 50, "Checkered", "#808080"),
            ("6", 180, 100, 50, "Who Knows 1", "#00FFFF"),
            ("7", 240, 100, 50, "Who Knows 2", "#0000FF"),
            ("8", 0, 100, 70, "Hot Track", "#FF3300"),
            ("9", 200, 100, 50, "Cold Track", "#0066FF"),
        ]);
        Self { f1, motogp, nascar }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tables_resolve_per_feed() {
        let tables = ColorTables::default();
        let code = FlagCode::from("5");

        assert_eq!(tables.lookup(FeedKind::F1, &code).unwrap().label, "Red Flag");
        assert_eq!(tables.lookup(FeedKind::Nascar, &code).unwrap().label, "Checkered");
        assert!(tables.lookup(FeedKind::MotoGp, &code).is_none());
        assert!(tables.lookup(FeedKind::F1, &FlagCode::from("99")).is_none());
    }

    #[test]
    fn overrides_replace_and_extend() {
        let overrides: ColorOverrides = serde_json::from_value(serde_json::json!({
            "motogp": {
                "I": {"hue": 90, "saturation": 80, "brightness": 40, "label": "Go", "hex": "#44AA00"},
                "Q": {"hue": 45, "saturation": 100, "brightness": 50, "label": "Qualifying", "hex": "#FFBF00"}
            }
        }))
        .unwrap();

        let tables = ColorTables::with_overrides(&overrides);
        assert_eq!(tables.lookup(FeedKind::MotoGp, &FlagCode::from("I")).unwrap().hue, 90);
        assert_eq!(tables.lookup(FeedKind::MotoGp, &FlagCode::from("Q")).unwrap().label, "Qualifying");
        assert_eq!(tables.lookup(FeedKind::MotoGp, &FlagCode::from("R")).unwrap().label, "Red Flag");
        assert_eq!(tables.table(FeedKind::F1), ColorTables::default().table(FeedKind::F1));
    }
}
