use serde::{Deserialize, Serialize};

use crate::document::PageRect;

/// Clockwise page rotation in quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => Rotation::Deg90,
            180 => Rotation::Deg180,
            270 => Rotation::Deg270,
            _ => Rotation::Deg0,
        }
    }

    pub fn degrees(self) -> i32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Positive turns rotate clockwise, negative counterclockwise.
    pub fn rotated_by(self, quarter_turns: i32) -> Self {
        Self::from_degrees(self.degrees() + 90 * quarter_turns.rem_euclid(4))
    }

    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CropMode {
    #[default]
    None,
    Auto,
    Manual,
}

impl CropMode {
    pub fn label(self) -> &'static str {
        match self {
            CropMode::None => "no crop",
            CropMode::Auto => "auto crop",
            CropMode::Manual => "manual crop",
        }
    }
}

/// Document-wide view settings. Changing any of them invalidates every page.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewOptions {
    pub rotation: Rotation,
    pub crop: CropMode,
    /// Kept while another crop mode is active so cycling back restores it.
    pub manual_crop: Option<PageRect>,
    pub alpha: bool,
    pub invert: bool,
    pub tint: bool,
}

impl ViewOptions {
    pub fn rotate(&mut self, quarter_turns: i32) {
        self.rotation = self.rotation.rotated_by(quarter_turns);
    }

    /// none -> auto -> manual -> none; manual is skipped while no rectangle is stored.
    pub fn cycle_crop(&mut self) -> CropMode {
        self.crop = match self.crop {
            CropMode::None => CropMode::Auto,
            CropMode::Auto if self.manual_crop.is_some() => CropMode::Manual,
            CropMode::Auto | CropMode::Manual => CropMode::None,
        };
        self.crop
    }

    pub fn set_manual_crop(&mut self, rect: PageRect) {
        self.manual_crop = Some(rect);
        self.crop = CropMode::Manual;
    }
}
