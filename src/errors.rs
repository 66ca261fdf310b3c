// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The error taxonomy.  Everything that can go wrong with a request
//! is caught before the escape-time loop starts, and every variant
//! names the field and value that has to be corrected.  Numeric
//! blow-ups inside the loop are not errors at all; they just make
//! ugly pictures.

use serde_json;
use std::io;

/// Every failure the crate reports.
#[derive(Debug, Fail)]
pub enum FractalError {
    /// A corner, width or height that does not describe a
    /// non-degenerate, finite rectangle.
    #[fail(display = "invalid bounding box: {} = {}", field, value)]
    InvalidBoundingBox {
        /// Which part of the box was rejected.
        field: &'static str,
        /// The rejected value, as given.
        value: f64,
    },

    /// A pixel count or pixel density that cannot produce a grid.
    #[fail(display = "invalid resolution: {} = {}", field, value)]
    InvalidResolution {
        /// Which resolution parameter was rejected.
        field: &'static str,
        /// The rejected value, as given.
        value: f64,
    },

    /// The iteration budget must be at least one.
    #[fail(display = "invalid iteration budget: {}", value)]
    InvalidIterationBudget {
        /// The rejected budget.
        value: i64,
    },

    /// The escape bound must be finite and positive.
    #[fail(display = "invalid escape bound: {}", value)]
    InvalidEscapeBound {
        /// The rejected bound.
        value: f64,
    },

    /// The fractal selector did not name a known rule.
    #[fail(
        display = "unknown fractal kind '{}' (expected mandelbrot, julia or burning-ship)",
        name
    )]
    UnknownFractalKind {
        /// The selector as given.
        name: String,
    },

    /// An observer asked the engine to stop.
    #[fail(display = "render cancelled after {} iterations", completed)]
    Cancelled {
        /// Iterations fully completed before the stop.
        completed: u32,
    },

    /// A worker thread of a threaded render panicked.
    #[fail(display = "a render thread panicked")]
    WorkerPanicked,

    /// Reading or writing a parameter file or image failed.
    #[fail(display = "i/o error: {}", _0)]
    Io(#[cause] io::Error),

    /// A parameter file was not valid JSON for the parameter record.
    #[fail(display = "parameter file error: {}", _0)]
    Json(#[cause] serde_json::Error),
}

impl From<io::Error> for FractalError {
    fn from(err: io::Error) -> Self {
        FractalError::Io(err)
    }
}

impl From<serde_json::Error> for FractalError {
    fn from(err: serde_json::Error) -> Self {
        FractalError::Json(err)
    }
}

/// Crate-wide result alias.
pub type Result<T> = ::std::result::Result<T, FractalError>;
