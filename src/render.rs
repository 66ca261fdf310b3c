// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Turning an iteration matrix into something to look at.  This is a
//! small consumer: counts are mapped linearly onto an
//! 8-bit gray ramp and written out as a binary PGM.  The colour map
//! name and interpolation mode travel with the matrix so that a
//! fancier renderer downstream knows what was asked for.

use image::pnm::PNMEncoder;
use image::pnm::{PNMSubtype, SampleEncoding};
use image::ColorType;
use num::clamp;
use std::fs::File;
use std::path::Path;

use engine::IterationMatrix;
use errors::Result;
use planes::BoundingBox;

/// Which way the gray ramp runs.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ColorMap {
    /// Few iterations are black, the interior is white.
    Gray,
    /// Few iterations are white, the interior is black.
    GrayReversed,
}

impl ColorMap {
    /// Interpret a colour map name.  `gray`, `grey` and `bone` run dark
    /// to light, `binary` runs light to dark, and a `_r` suffix turns
    /// either around.  Anything else is drawn as `gray`.
    pub fn from_name(name: &str) -> ColorMap {
        let name = name.trim().to_lowercase();
        let (base, reversed) = if name.ends_with("_r") {
            (&name[..name.len() - 2], true)
        } else {
            (&name[..], false)
        };
        let light_to_dark = match base {
            "gray" | "grey" | "bone" => false,
            "binary" => true,
            _ => {
                warn!("Unknown colour map '{}', drawing in gray", name);
                false
            }
        };
        if light_to_dark != reversed {
            ColorMap::GrayReversed
        } else {
            ColorMap::Gray
        }
    }

    /// Map a count out of a budget onto a gray level.
    pub fn shade(self, count: u32, budget: u32) -> u8 {
        let level = clamp(u64::from(count) * 255 / u64::from(budget.max(1)), 0, 255) as u8;
        match self {
            ColorMap::Gray => level,
            ColorMap::GrayReversed => 255 - level,
        }
    }
}

/// A finished render: the counts, the piece of the plane they cover,
/// and the display hints that go with them.
#[derive(Clone, Debug)]
pub struct Rendering {
    /// The counts.
    pub matrix: IterationMatrix,
    /// The region the counts were sampled from.
    pub bounds: BoundingBox,
    /// Colour map name.  Not used by the engine.
    pub colormap: String,
    /// Interpolation mode.  Not used by the engine or by `to_gray`.
    pub interpolation: String,
}

impl Rendering {
    /// Bundle a matrix with its region and hints.
    pub fn new(
        matrix: IterationMatrix,
        bounds: BoundingBox,
        colormap: &str,
        interpolation: &str,
    ) -> Rendering {
        Rendering {
            matrix,
            bounds,
            colormap: colormap.to_string(),
            interpolation: interpolation.to_string(),
        }
    }

    /// Axis extents as `[xmin, xmax, ymin, ymax]`, the order plotting
    /// libraries expect.
    pub fn extent(&self) -> [f64; 4] {
        let (xmin, xmax) = self.bounds.x_range();
        let (ymin, ymax) = self.bounds.y_range();
        [xmin, xmax, ymin, ymax]
    }

    /// One gray byte per count, row major.
    pub fn to_gray(&self) -> Vec<u8> {
        let map = ColorMap::from_name(&self.colormap);
        let budget = self.matrix.budget();
        self.matrix
            .as_slice()
            .iter()
            .map(|&count| map.shade(count, budget))
            .collect()
    }

    /// Write the picture as a binary graymap.
    pub fn write_pgm<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let pixels = self.to_gray();
        let output = File::create(path)?;
        let mut encoder =
            PNMEncoder::new(output).with_subtype(PNMSubtype::Graymap(SampleEncoding::Binary));
        encoder.encode(
            &pixels[..],
            self.matrix.cols() as u32,
            self.matrix.rows() as u32,
            ColorType::Gray(8),
        )?;
        info!(
            "Wrote {}x{} image to '{}'",
            self.matrix.cols(),
            self.matrix.rows(),
            path.display()
        );
        Ok(())
    }
}
