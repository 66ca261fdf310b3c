// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Parameters for a render.  `FractalParameters` is what the engine
//! consumes, and can only be built from values that make sense.
//! `ParameterRecord` is the flat, persisted form of a whole request:
//! everything needed to reproduce a picture, including the display
//! hints the engine itself never looks at.

use num::Complex;
use serde::{Deserialize, Serialize};
use serde_json;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use errors::{FractalError, Result};
use planes::{BoundingBox, Grid, Origin, Resolution};
use rules::FractalKind;

/// Any orbit that reaches modulus 2 under a quadratic map diverges.
pub const DEFAULT_BOUND: f64 = 2.0;

/// The iteration budget used when none is given.
pub const DEFAULT_ITERATIONS: u32 = 100;

/// A Julia constant that makes a pleasant picture.
pub const DEFAULT_JULIA_C: (f64, f64) = (-0.835, -0.211);

/// The escape bound, iteration budget, rule and Julia constant for a
/// single run.  Immutable once built.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FractalParameters {
    kind: FractalKind,
    bound: f64,
    iterations: u32,
    c: Complex<f64>,
}

impl FractalParameters {
    /// A budget of zero is rejected; the bound starts at the default
    /// and `c` at the default Julia constant.
    pub fn new(kind: FractalKind, iterations: u32) -> Result<FractalParameters> {
        if iterations == 0 {
            return Err(FractalError::InvalidIterationBudget { value: 0 });
        }
        Ok(FractalParameters {
            kind,
            bound: DEFAULT_BOUND,
            iterations,
            c: Complex::new(DEFAULT_JULIA_C.0, DEFAULT_JULIA_C.1),
        })
    }

    /// Shorthand for the Mandelbrot set.
    pub fn mandelbrot(iterations: u32) -> Result<FractalParameters> {
        FractalParameters::new(FractalKind::Mandelbrot, iterations)
    }

    /// Shorthand for the Julia set of `c`.
    pub fn julia(c: Complex<f64>, iterations: u32) -> Result<FractalParameters> {
        Ok(FractalParameters::new(FractalKind::Julia, iterations)?.with_c(c))
    }

    /// Shorthand for the Burning Ship.
    pub fn burning_ship(iterations: u32) -> Result<FractalParameters> {
        FractalParameters::new(FractalKind::BurningShip, iterations)
    }

    /// Replace the escape bound, which must be finite and positive.
    pub fn with_bound(self, bound: f64) -> Result<FractalParameters> {
        if !bound.is_finite() || bound <= 0.0 {
            return Err(FractalError::InvalidEscapeBound { value: bound });
        }
        Ok(FractalParameters { bound, ..self })
    }

    /// Replace the Julia constant.  Harmless for the other kinds.
    pub fn with_c(self, c: Complex<f64>) -> FractalParameters {
        FractalParameters { c, ..self }
    }

    /// Which rule to run.
    pub fn kind(&self) -> FractalKind {
        self.kind
    }

    /// The escape bound.
    pub fn bound(&self) -> f64 {
        self.bound
    }

    /// The iteration budget.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// The Julia constant.
    pub fn c(&self) -> Complex<f64> {
        self.c
    }
}

/// Converts a persisted, signed iteration count into a budget.
pub fn iteration_budget(value: i64) -> Result<u32> {
    if value < 1 || value > i64::from(::std::u32::MAX) {
        return Err(FractalError::InvalidIterationBudget { value });
    }
    Ok(value as u32)
}

/// The persisted form of a request.  A flat record so that it reads
/// well as JSON and every field survives a save and load unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterRecord {
    /// `mandelbrot`, `julia` or `burning-ship`.
    pub kind: String,
    /// Top-left real.
    pub x1: f64,
    /// Top-left imaginary.
    pub y1: f64,
    /// Bottom-right real.
    pub x2: f64,
    /// Bottom-right imaginary.
    pub y2: f64,
    /// Pixels per unit of the complex plane, on both axes.
    pub pixels_per_unit: f64,
    /// Escape bound.
    pub bound: f64,
    /// Iteration budget.
    pub iterations: i64,
    /// Julia constant, real part.
    pub c_re: f64,
    /// Julia constant, imaginary part.
    pub c_im: f64,
    /// Colour map name, for whoever draws the picture.
    pub colormap: String,
    /// Interpolation mode, for whoever draws the picture.
    pub interpolation: String,
}

impl Default for ParameterRecord {
    fn default() -> Self {
        ParameterRecord {
            kind: FractalKind::Mandelbrot.name().to_string(),
            x1: -1.65,
            y1: 1.65,
            x2: 1.65,
            y2: -1.65,
            pixels_per_unit: 200.0,
            bound: DEFAULT_BOUND,
            iterations: i64::from(DEFAULT_ITERATIONS),
            c_re: DEFAULT_JULIA_C.0,
            c_im: DEFAULT_JULIA_C.1,
            colormap: "bone_r".to_string(),
            interpolation: "bilinear".to_string(),
        }
    }
}

impl ParameterRecord {
    /// Build a record describing an already-validated request.
    pub fn describe(
        bounds: &BoundingBox,
        pixels_per_unit: f64,
        params: &FractalParameters,
        colormap: &str,
        interpolation: &str,
    ) -> ParameterRecord {
        ParameterRecord {
            kind: params.kind().name().to_string(),
            x1: bounds.top_left().re,
            y1: bounds.top_left().im,
            x2: bounds.bottom_right().re,
            y2: bounds.bottom_right().im,
            pixels_per_unit,
            bound: params.bound(),
            iterations: i64::from(params.iterations()),
            c_re: params.c().re,
            c_im: params.c().im,
            colormap: colormap.to_string(),
            interpolation: interpolation.to_string(),
        }
    }

    /// Parse a record from JSON.  Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<ParameterRecord> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write the record as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a record from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ParameterRecord> {
        let path = path.as_ref();
        debug!("Loading parameters from '{}'", path.display());
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Write a record to a file, replacing whatever was there.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        debug!("Saving parameters to '{}'", path.display());
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// The bounding box the record describes.
    pub fn bounds(&self) -> Result<BoundingBox> {
        BoundingBox::from_corners(self.x1, self.y1, self.x2, self.y2)
    }

    /// The grid resolution the record describes.
    pub fn resolution(&self) -> Result<Resolution> {
        Resolution::from_density(&self.bounds()?, self.pixels_per_unit)
    }

    /// The engine parameters the record describes.
    pub fn parameters(&self) -> Result<FractalParameters> {
        let kind: FractalKind = self.kind.parse()?;
        let params = FractalParameters::new(kind, iteration_budget(self.iterations)?)?;
        Ok(params
            .with_bound(self.bound)?
            .with_c(Complex::new(self.c_re, self.c_im)))
    }

    /// Validate the whole record at once, producing the grid and
    /// parameters for a run.
    pub fn validate(&self, origin: Origin) -> Result<(Grid, FractalParameters)> {
        let bounds = self.bounds()?;
        let resolution = Resolution::from_density(&bounds, self.pixels_per_unit)?;
        let params = self.parameters()?;
        Ok((Grid::new(bounds, resolution, origin), params))
    }
}
