use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaletteName {
    Warm,
    Dark,
    #[serde(other)]
    Unknown,
}

impl Default for PaletteName {
    fn default() -> Self {
        PaletteName::Warm
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardPalette {
    pub background: Rgb,
    pub card: Rgb,
    pub text: Rgb,
    pub accent: Rgb,
    pub error: Rgb,
}

impl CardPalette {
    pub fn for_name(name: PaletteName) -> Self {
        match name {
            PaletteName::Dark => CardPalette {
                background: Rgb(0x1E, 0x1C, 0x1A),
                card: Rgb(0x2B, 0x28, 0x25),
                text: Rgb(0xE8, 0xE2, 0xD9),
                accent: Rgb(0xE0, 0x9F, 0x5A),
                error: Rgb(0xF2, 0x6D, 0x5B),
            },
            PaletteName::Warm | PaletteName::Unknown => CardPalette {
                background: Rgb(0xF8, 0xEE, 0xE2),
                card: Rgb(0xFF, 0xFD, 0xFA),
                text: Rgb(0x59, 0x55, 0x50),
                accent: Rgb(0xB8, 0x6B, 0x2E),
                error: Rgb(0xB0, 0x3A, 0x2E),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaletteRegistry {
    names: HashSet<PaletteName>,
}

impl PaletteRegistry {
    pub fn contains(&self, palette: &PaletteName) -> bool {
        self.names.contains(palette)
    }
}

impl Default for PaletteRegistry {
    fn default() -> Self {
        let names = [PaletteName::Warm, PaletteName::Dark].into_iter().collect();
        Self { names }
    }
}
