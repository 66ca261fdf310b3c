#![deny(missing_docs)]
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Escape-time fractals
//!
//! The Mandelbrot set, its Julia sets, and the Burning Ship are all
//! drawn the same way.  Take a point on the complex plane, start an
//! orbit from it, and keep applying a simple quadratic map to the
//! orbit.  Either the orbit stays small forever, or at some point its
//! modulus crosses a bound (2 will do for all of these) and it is
//! gone for good.  The number of steps it took to cross is the
//! "escape time" of the point, and a picture of escape times over a
//! rectangle of the plane is the familiar fractal.
//!
//! This crate samples a rectangle of the plane into a grid
//! (`planes`), runs every point of the grid through one of three
//! update rules (`rules`) in a masked loop that leaves escaped orbits
//! alone (`engine`), and hands back a matrix of escape times.  The
//! `params` and `render` modules persist requests and draw matrices.

extern crate crossbeam;
extern crate image;
extern crate itertools;
extern crate num;
extern crate serde;
extern crate serde_json;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

#[cfg(test)]
extern crate tempfile;

pub mod engine;
pub mod errors;
pub mod params;
pub mod planes;
pub mod render;
pub mod rules;

pub use engine::{Engine, Flow, IterationMatrix, Observer, Progress};
pub use errors::{FractalError, Result};
pub use params::{FractalParameters, ParameterRecord};
pub use planes::{BoundingBox, Grid, Origin, Pixel, Resolution};
pub use render::Rendering;
pub use rules::{EscapeRule, FractalKind};

/// Sample a region and run the engine over it in one go.
pub fn escape_time(
    bounds: BoundingBox,
    resolution: Resolution,
    params: FractalParameters,
) -> IterationMatrix {
    let grid = Grid::new(bounds, resolution, Origin::Top);
    Engine::new(&grid, params).render()
}
