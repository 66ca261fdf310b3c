// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The update rules.  Each escape-time family is a pair of
//! functions: one that decides where an orbit starts (its `Z`) and
//! what it is perturbed by (its `C`), and one that advances the orbit
//! by a single step.  The engine does not care which family it is
//! running; it only needs those two capabilities.

use num::Complex;
use std::fmt;
use std::str::FromStr;

use errors::FractalError;

/// The two capabilities the engine needs from a fractal family.
/// Implementations must be pure: the same inputs always produce the
/// same outputs, so that renders are reproducible bit for bit.
pub trait EscapeRule: Sync {
    /// Given a sample point of the grid, return the starting `(Z, C)`
    /// of its orbit.
    fn initialize(&self, point: Complex<f64>) -> (Complex<f64>, Complex<f64>);

    /// Advance an orbit by one step.
    fn step(&self, z: Complex<f64>, c: Complex<f64>) -> Complex<f64>;
}

/// `Z ← Z² + C`, starting from zero with `C` the sample point.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Mandelbrot;

impl EscapeRule for Mandelbrot {
    #[inline]
    fn initialize(&self, point: Complex<f64>) -> (Complex<f64>, Complex<f64>) {
        (Complex::new(0.0, 0.0), point)
    }

    #[inline]
    fn step(&self, z: Complex<f64>, c: Complex<f64>) -> Complex<f64> {
        z * z + c
    }
}

/// `Z ← Z² + c`, starting from the sample point, with one fixed `c`
/// for the whole picture.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Julia {
    /// The constant added at every step.
    pub c: Complex<f64>,
}

impl EscapeRule for Julia {
    #[inline]
    fn initialize(&self, point: Complex<f64>) -> (Complex<f64>, Complex<f64>) {
        (point, self.c)
    }

    #[inline]
    fn step(&self, z: Complex<f64>, c: Complex<f64>) -> Complex<f64> {
        z * z + c
    }
}

/// The Mandelbrot iteration with both components of `Z` folded into
/// the first quadrant before squaring.  The fold is on the parts, not
/// the modulus.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct BurningShip;

impl EscapeRule for BurningShip {
    #[inline]
    fn initialize(&self, point: Complex<f64>) -> (Complex<f64>, Complex<f64>) {
        (Complex::new(0.0, 0.0), point)
    }

    #[inline]
    fn step(&self, z: Complex<f64>, c: Complex<f64>) -> Complex<f64> {
        let folded = Complex::new(z.re.abs(), z.im.abs());
        folded * folded + c
    }
}

/// The selector for which rule a render uses.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FractalKind {
    /// See `Mandelbrot`.
    Mandelbrot,
    /// See `Julia`.
    Julia,
    /// See `BurningShip`.
    BurningShip,
}

impl FractalKind {
    /// All the kinds, in the order they are listed to users.
    pub const ALL: [FractalKind; 3] = [
        FractalKind::Mandelbrot,
        FractalKind::Julia,
        FractalKind::BurningShip,
    ];

    /// The canonical name, as accepted by `from_str` and written to
    /// parameter files.
    pub fn name(self) -> &'static str {
        match self {
            FractalKind::Mandelbrot => "mandelbrot",
            FractalKind::Julia => "julia",
            FractalKind::BurningShip => "burning-ship",
        }
    }

    /// Whether the `c` parameter means anything for this kind.
    pub fn uses_c(self) -> bool {
        self == FractalKind::Julia
    }
}

impl fmt::Display for FractalKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FractalKind {
    type Err = FractalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mandelbrot" => Ok(FractalKind::Mandelbrot),
            "julia" => Ok(FractalKind::Julia),
            "burning-ship" | "burning_ship" | "burningship" => Ok(FractalKind::BurningShip),
            _ => Err(FractalError::UnknownFractalKind {
                name: s.to_string(),
            }),
        }
    }
}
