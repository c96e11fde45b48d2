//! The editable view of one tray hole.
//!
//! [`IrradiatedPosition`] is what an operator edits between saves: plain
//! strings for the sample chain (empty means unset), the flux, and display
//! state derived from which fields are populated.

use crate::error::CoreError;
use crate::flux::FluxValue;

/// An RGB display colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// `#rrggbb` form.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

/// Colours handed out, in order, to each populated field of a filled hole.
pub const FILL_PALETTE: [Rgb; 4] = [
    Rgb(194, 194, 194),
    Rgb(255, 255, 160),
    Rgb(255, 255, 0),
    Rgb(25, 230, 25),
];

/// Display state of a hole on the tray canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FillState {
    pub fill: bool,
    /// `None` renders in the neutral background colour.
    pub color: Option<Rgb>,
    /// The hole holds the flux monitor.
    pub monitor: bool,
}

impl FillState {
    /// Derives the fill state from the populated fields of `position`.
    ///
    /// An empty hole is unfilled. Otherwise the palette advances once for
    /// each of sample, material, project and identifier that is set, so a
    /// hole with only a sample is grey and a fully labelled hole is green.
    pub fn derive(position: &IrradiatedPosition, monitor_name: &str) -> FillState {
        if position.sample.is_empty() {
            return FillState::default();
        }

        let populated = [
            &position.sample,
            &position.material,
            &position.project,
            &position.identifier,
        ]
        .iter()
        .filter(|field| !field.is_empty())
        .count();

        FillState {
            fill: true,
            color: Some(FILL_PALETTE[populated - 1]),
            monitor: !monitor_name.is_empty() && position.sample == monitor_name,
        }
    }
}

/// In-memory view of one hole.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IrradiatedPosition {
    /// 1-based hole index in the tray.
    pub hole: u32,
    pub alt_hole: String,
    /// Canvas coordinates from the holder geometry.
    pub pos: Option<(f64, f64)>,
    pub identifier: String,
    pub sample: String,
    pub material: String,
    pub grainsize: String,
    pub project: String,
    pub principal_investigator: String,
    pub igsn: String,
    pub j: f64,
    pub j_err: f64,
    pub size: String,
    pub weight: f64,
    pub note: String,
    pub analysis_count: u32,
    pub analyzed: bool,
    pub fill: FillState,
}

impl IrradiatedPosition {
    pub fn new(hole: u32) -> Result<Self, CoreError> {
        if hole == 0 {
            return Err(CoreError::InvalidHole { hole });
        }
        Ok(IrradiatedPosition {
            hole,
            ..Default::default()
        })
    }

    /// A hole at the given canvas coordinates.
    pub fn at(hole: u32, x: f64, y: f64) -> Result<Self, CoreError> {
        let mut position = Self::new(hole)?;
        position.pos = Some((x, y));
        Ok(position)
    }

    pub fn flux(&self) -> FluxValue {
        FluxValue {
            value: self.j,
            error: self.j_err,
        }
    }

    pub fn set_flux(&mut self, flux: FluxValue) {
        self.j = flux.nominal_value();
        self.j_err = flux.std_dev();
    }

    /// Reasons this hole cannot be saved with its identifier.
    ///
    /// Only holes carrying an identifier are checked.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.identifier.is_empty() {
            return missing;
        }
        if self.sample.is_empty() {
            missing.push("No sample");
        }
        if self.project.is_empty() {
            missing.push("No project");
        }
        if self.material.is_empty() {
            missing.push("No material");
        }
        missing
    }

    /// Empties the sample chain.
    pub fn clear_sample(&mut self) {
        self.sample.clear();
        self.project.clear();
        self.material.clear();
    }
}
