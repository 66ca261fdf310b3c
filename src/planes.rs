// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Contains the BoundingBox and Grid structs.  The BoundingBox is a
//! rectangle on the complex plane, described by its top-left and
//! bottom-right corners; the Grid is the set of evenly spaced sample
//! points the engine will iterate, one per pixel of the integral
//! plane.  The two are related the same way an image is related to
//! the window of the plane it is a picture of.

use itertools::iproduct;
use num::Complex;
use std::mem;

use errors::{FractalError, Result};

/// The width of the bounding box that counts as "no zoom at all".
/// The classic Mandelbrot view is four units across.
pub const REFERENCE_WIDTH: f64 = 4.0;

/// Whether a grid of `xn` by `yn` samples, and the orbit state the
/// engine keeps for it, can be addressed at all.
fn addressable(xn: usize, yn: usize) -> bool {
    xn.checked_mul(yn)
        .and_then(|n| n.checked_mul(mem::size_of::<Complex<f64>>()))
        .map_or(false, |bytes| bytes <= ::std::isize::MAX as usize)
}

/// Describes the column, row of a pixel in the grid.  Column first,
/// to match the x,y schema of the complex plane.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Pixel(pub usize, pub usize);

/// Which edge of the bounding box row 0 of the grid sits on.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Origin {
    /// Row 0 is the top edge (largest imaginary part), as in image
    /// row order.
    Top,
    /// Row 0 is the bottom edge (smallest imaginary part).
    Bottom,
}

impl Default for Origin {
    fn default() -> Self {
        Origin::Top
    }
}

/// A non-degenerate rectangle on the complex plane.  The imaginary
/// axis is inverted with respect to the integral plane: the top-left
/// corner has the *larger* imaginary part.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundingBox {
    top_left: Complex<f64>,
    bottom_right: Complex<f64>,
}

fn finite(field: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FractalError::InvalidBoundingBox { field, value })
    }
}

fn positive(field: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(FractalError::InvalidBoundingBox { field, value })
    }
}

impl BoundingBox {
    /// Constructor.  Takes the top-left and bottom-right corners of the
    /// region; fails unless the first is strictly left of and strictly
    /// above the second.
    pub fn new(top_left: Complex<f64>, bottom_right: Complex<f64>) -> Result<BoundingBox> {
        finite("x1", top_left.re)?;
        finite("y1", top_left.im)?;
        finite("x2", bottom_right.re)?;
        finite("y2", bottom_right.im)?;
        positive("width", bottom_right.re - top_left.re)?;
        positive("height", top_left.im - bottom_right.im)?;
        Ok(BoundingBox {
            top_left,
            bottom_right,
        })
    }

    /// The `((x1, y1), (x2, y2))` form.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<BoundingBox> {
        BoundingBox::new(Complex::new(x1, y1), Complex::new(x2, y2))
    }

    /// The `(center, width, height)` form.
    pub fn centered(center: Complex<f64>, width: f64, height: f64) -> Result<BoundingBox> {
        finite("center.re", center.re)?;
        finite("center.im", center.im)?;
        let (hw, hh) = (positive("width", width)? / 2.0, positive("height", height)? / 2.0);
        BoundingBox::new(
            Complex::new(center.re - hw, center.im + hh),
            Complex::new(center.re + hw, center.im - hh),
        )
    }

    /// The `(center, width)` form with the height derived from an
    /// aspect ratio (width / height).
    pub fn centered_with_aspect(
        center: Complex<f64>,
        width: f64,
        aspect: f64,
    ) -> Result<BoundingBox> {
        let aspect = positive("aspect", aspect)?;
        BoundingBox::centered(center, width, width / aspect)
    }

    /// Top-left corner.
    pub fn top_left(&self) -> Complex<f64> {
        self.top_left
    }

    /// Bottom-right corner.
    pub fn bottom_right(&self) -> Complex<f64> {
        self.bottom_right
    }

    /// Extent along the real axis.
    pub fn width(&self) -> f64 {
        self.bottom_right.re - self.top_left.re
    }

    /// Extent along the imaginary axis.
    pub fn height(&self) -> f64 {
        self.top_left.im - self.bottom_right.im
    }

    /// Midpoint of the rectangle.
    pub fn center(&self) -> Complex<f64> {
        Complex::new(
            (self.top_left.re + self.bottom_right.re) / 2.0,
            (self.top_left.im + self.bottom_right.im) / 2.0,
        )
    }

    /// How far we are zoomed in relative to a four-unit-wide view.
    /// Somewhere past 1e13 or so an f64 grid stops being able to tell
    /// neighbouring pixels apart; see `Grid::is_resolvable`.
    pub fn magnification(&self) -> f64 {
        REFERENCE_WIDTH / self.width()
    }

    /// Real-axis interval, low to high.
    pub fn x_range(&self) -> (f64, f64) {
        (self.top_left.re, self.bottom_right.re)
    }

    /// Imaginary-axis interval, low to high.
    pub fn y_range(&self) -> (f64, f64) {
        (self.bottom_right.im, self.top_left.im)
    }
}

/// The number of samples taken along each axis.  The two counts are
/// independent, so pixels need not be square.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Resolution {
    /// Columns.
    pub xn: usize,
    /// Rows.
    pub yn: usize,
}

impl Resolution {
    /// Both counts must be at least one, and small enough that the
    /// grid fits in memory addresses.
    pub fn new(xn: usize, yn: usize) -> Result<Resolution> {
        if xn == 0 {
            return Err(FractalError::InvalidResolution {
                field: "xn",
                value: xn as f64,
            });
        }
        if yn == 0 {
            return Err(FractalError::InvalidResolution {
                field: "yn",
                value: yn as f64,
            });
        }
        if !addressable(xn, yn) {
            return Err(FractalError::InvalidResolution {
                field: "xn * yn",
                value: xn as f64 * yn as f64,
            });
        }
        Ok(Resolution { xn, yn })
    }

    /// Derive the counts from a single density, in pixels per unit of
    /// the complex plane, applied to both axes of the box.
    pub fn from_density(bounds: &BoundingBox, pixels_per_unit: f64) -> Result<Resolution> {
        if !pixels_per_unit.is_finite() || pixels_per_unit <= 0.0 {
            return Err(FractalError::InvalidResolution {
                field: "pixels_per_unit",
                value: pixels_per_unit,
            });
        }
        let invalid = FractalError::InvalidResolution {
            field: "pixels_per_unit",
            value: pixels_per_unit,
        };
        let count = |extent: f64| {
            let n = (extent * pixels_per_unit).round();
            if n < ::std::usize::MAX as f64 {
                Some((n as usize).max(1))
            } else {
                None
            }
        };
        match (count(bounds.width()), count(bounds.height())) {
            (Some(xn), Some(yn)) if addressable(xn, yn) => Resolution::new(xn, yn),
            _ => Err(invalid),
        }
    }

    /// Total number of pixels.
    pub fn len(&self) -> usize {
        self.xn * self.yn
    }

    /// Never true for a validated resolution.
    pub fn is_empty(&self) -> bool {
        self.xn == 0 || self.yn == 0
    }
}

/// `n` evenly spaced values from `min` to `max` inclusive.  The last
/// value is pinned to `max` so rounding never pushes it past the edge.
pub fn linspace(min: f64, max: f64, n: usize) -> Vec<f64> {
    match n {
        0 => vec![],
        1 => vec![min],
        _ => {
            let step = (max - min) / ((n - 1) as f64);
            let mut samples: Vec<f64> = (0..n).map(|i| min + (i as f64) * step).collect();
            samples[n - 1] = max;
            samples
        }
    }
}

/// The sample grid: one complex point per pixel, row major.  Columns
/// run left to right along the real axis; rows run along the
/// imaginary axis in the direction the `Origin` says.
#[derive(Clone, Debug)]
pub struct Grid {
    bounds: BoundingBox,
    origin: Origin,
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl Grid {
    /// Sample the box at the given resolution.
    pub fn new(bounds: BoundingBox, resolution: Resolution, origin: Origin) -> Grid {
        let (xmin, xmax) = bounds.x_range();
        let (ymin, ymax) = bounds.y_range();
        let xs = linspace(xmin, xmax, resolution.xn);
        let ys = match origin {
            Origin::Top => linspace(ymax, ymin, resolution.yn),
            Origin::Bottom => linspace(ymin, ymax, resolution.yn),
        };
        Grid {
            bounds,
            origin,
            xs,
            ys,
        }
    }

    /// The box this grid samples.
    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    /// The X samples, one per column.
    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    /// The Y samples, one per row, in row order.
    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    /// Number of columns (`xn`).
    pub fn cols(&self) -> usize {
        self.xs.len()
    }

    /// Number of rows (`yn`).
    pub fn rows(&self) -> usize {
        self.ys.len()
    }

    /// The total number of points in the grid.  Used to calculate
    /// memory needs.
    pub fn len(&self) -> usize {
        self.cols() * self.rows()
    }

    /// See `BoundingBox::magnification`.
    pub fn magnification(&self) -> f64 {
        self.bounds.magnification()
    }

    /// Given a pixel, return the complex sample it stands for.
    pub fn point(&self, pixel: &Pixel) -> Complex<f64> {
        Complex::new(self.xs[pixel.0], self.ys[pixel.1])
    }

    /// Given a complex number inside the box, map it to the pixel
    /// whose sample is nearest.  Points outside the box have no pixel.
    pub fn nearest(&self, point: &Complex<f64>) -> Option<Pixel> {
        let (xmin, xmax) = self.bounds.x_range();
        let (ymin, ymax) = self.bounds.y_range();
        // Written so that NaN falls outside.
        if !(xmin <= point.re && point.re <= xmax && ymin <= point.im && point.im <= ymax) {
            return None;
        }
        let index = |offset: f64, extent: f64, n: usize| {
            if n < 2 {
                return 0;
            }
            let i = (offset / extent * ((n - 1) as f64)).round() as usize;
            i.min(n - 1)
        };
        let column = index(point.re - xmin, xmax - xmin, self.cols());
        let row = match self.origin {
            Origin::Top => index(ymax - point.im, ymax - ymin, self.rows()),
            Origin::Bottom => index(point.im - ymin, ymax - ymin, self.rows()),
        };
        Some(Pixel(column, row))
    }

    /// Every sample, row by row.
    pub fn points<'a>(&'a self) -> impl Iterator<Item = Complex<f64>> + 'a {
        iproduct!(self.ys.iter(), self.xs.iter()).map(|(&im, &re)| Complex::new(re, im))
    }

    /// The samples of rows `start..end`, row by row.  Used to hand a
    /// band of the grid to a worker.
    pub fn band_points(&self, start: usize, end: usize) -> Vec<Complex<f64>> {
        iproduct!(self.ys[start..end].iter(), self.xs.iter())
            .map(|(&im, &re)| Complex::new(re, im))
            .collect()
    }

    /// Whether neighbouring samples are still distinct, and in order,
    /// at f64 precision.  When this goes false we have zoomed past what
    /// the hardware can resolve and the picture will show blocky
    /// smears instead of detail.
    pub fn is_resolvable(&self) -> bool {
        let xs_ok = self.xs.windows(2).all(|w| w[0] < w[1]);
        let ys_ok = match self.origin {
            Origin::Top => self.ys.windows(2).all(|w| w[0] > w[1]),
            Origin::Bottom => self.ys.windows(2).all(|w| w[0] < w[1]),
        };
        xs_ok && ys_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(n: usize) -> Grid {
        let bb = BoundingBox::from_corners(-2.0, 2.0, 2.0, -2.0).unwrap();
        Grid::new(bb, Resolution::new(n, n).unwrap(), Origin::Top)
    }

    #[test]
    fn boundingbox_fails_on_bad_shape() {
        assert!(BoundingBox::from_corners(1.0, 1.0, -1.0, -1.0).is_err());
        assert!(BoundingBox::from_corners(-1.0, -1.0, 1.0, 1.0).is_err());
        assert!(BoundingBox::from_corners(-1.0, 1.0, -1.0, -1.0).is_err());
    }

    #[test]
    fn boundingbox_passes_on_good_shape() {
        let bb = BoundingBox::from_corners(-1.0, 1.0, 1.0, -1.0).unwrap();
        assert_eq!(bb.width(), 2.0);
        assert_eq!(bb.height(), 2.0);
        assert_eq!(bb.center(), Complex::new(0.0, 0.0));
    }

    #[test]
    fn boundingbox_reports_the_offending_field() {
        match BoundingBox::from_corners(0.0, 1.0, 0.0, -1.0) {
            Err(FractalError::InvalidBoundingBox { field, value }) => {
                assert_eq!(field, "width");
                assert_eq!(value, 0.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        match BoundingBox::centered(Complex::new(0.0, 0.0), 1.0, -3.0) {
            Err(FractalError::InvalidBoundingBox { field, .. }) => assert_eq!(field, "height"),
            other => panic!("unexpected {:?}", other),
        }
        match BoundingBox::from_corners(::std::f64::NAN, 1.0, 1.0, -1.0) {
            Err(FractalError::InvalidBoundingBox { field, .. }) => assert_eq!(field, "x1"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn centered_forms_agree_with_corners() {
        let a = BoundingBox::centered(Complex::new(-0.5, 0.0), 3.0, 2.0).unwrap();
        let b = BoundingBox::from_corners(-2.0, 1.0, 1.0, -1.0).unwrap();
        assert_eq!(a, b);
        let c = BoundingBox::centered_with_aspect(Complex::new(-0.5, 0.0), 3.0, 1.5).unwrap();
        assert_eq!(c, b);
        assert!(BoundingBox::centered_with_aspect(Complex::new(0.0, 0.0), 1.0, 0.0).is_err());
    }

    #[test]
    fn magnification_is_relative_to_four_units() {
        let bb = BoundingBox::from_corners(-2.0, 2.0, 2.0, -2.0).unwrap();
        assert_eq!(bb.magnification(), 1.0);
        let bb = BoundingBox::centered(Complex::new(-0.75, 0.1), 0.004, 0.004).unwrap();
        assert!((bb.magnification() - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn resolution_rejects_zero() {
        assert!(Resolution::new(0, 10).is_err());
        assert!(Resolution::new(10, 0).is_err());
        assert!(Resolution::new(1, 1).is_ok());
    }

    #[test]
    fn resolution_from_density() {
        let bb = BoundingBox::from_corners(-1.65, 1.65, 1.65, -1.65).unwrap();
        let r = Resolution::from_density(&bb, 100.0).unwrap();
        assert_eq!(r, Resolution { xn: 330, yn: 330 });
        assert!(Resolution::from_density(&bb, 0.0).is_err());
        assert!(Resolution::from_density(&bb, -5.0).is_err());
    }

    #[test]
    fn resolution_rejects_densities_too_large_to_sample() {
        let bb = BoundingBox::from_corners(-1.65, 1.65, 1.65, -1.65).unwrap();
        for &density in &[1e300, 1e12, ::std::f64::INFINITY, ::std::f64::NAN] {
            match Resolution::from_density(&bb, density) {
                Err(FractalError::InvalidResolution { field, .. }) => {
                    assert_eq!(field, "pixels_per_unit")
                }
                other => panic!("unexpected {:?} for {}", other, density),
            }
        }
        assert!(Resolution::new(::std::usize::MAX, 2).is_err());
        assert!(Resolution::new(1usize << 40, 1usize << 40).is_err());
    }

    #[test]
    fn linspace_is_inclusive_and_even() {
        assert_eq!(linspace(-2.0, 2.0, 5), vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
        assert_eq!(linspace(3.0, 7.0, 1), vec![3.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn grid_rows_follow_the_origin() {
        let grid = square(5);
        assert_eq!(grid.ys()[0], 2.0);
        assert_eq!(grid.ys()[4], -2.0);

        let bb = BoundingBox::from_corners(-2.0, 2.0, 2.0, -2.0).unwrap();
        let grid = Grid::new(bb, Resolution::new(5, 5).unwrap(), Origin::Bottom);
        assert_eq!(grid.ys()[0], -2.0);
        assert_eq!(grid.ys()[4], 2.0);
    }

    #[test]
    fn grid_dimensions_are_independent() {
        let bb = BoundingBox::from_corners(-2.0, 1.0, 1.0, -1.0).unwrap();
        let grid = Grid::new(bb, Resolution::new(7, 3).unwrap(), Origin::Top);
        assert_eq!(grid.cols(), 7);
        assert_eq!(grid.rows(), 3);
        assert_eq!(grid.len(), 21);
        assert_eq!(grid.points().count(), 21);
    }

    #[test]
    fn pixel_to_point_on_mixed_planes() {
        let grid = square(5);
        assert_eq!(grid.point(&Pixel(2, 2)), Complex::new(0.0, 0.0));
        assert_eq!(grid.point(&Pixel(0, 0)), Complex::new(-2.0, 2.0));
        assert_eq!(grid.point(&Pixel(4, 4)), Complex::new(2.0, -2.0));
        assert_eq!(grid.point(&Pixel(3, 1)), Complex::new(1.0, 1.0));
    }

    #[test]
    fn point_to_pixel_on_mixed_planes() {
        let grid = square(5);
        assert_eq!(grid.nearest(&Complex::new(0.0, 0.0)), Some(Pixel(2, 2)));
        assert_eq!(grid.nearest(&Complex::new(-2.0, 2.0)), Some(Pixel(0, 0)));
        assert_eq!(grid.nearest(&Complex::new(2.0, -2.0)), Some(Pixel(4, 4)));
        assert_eq!(grid.nearest(&Complex::new(0.9, 1.1)), Some(Pixel(3, 1)));
        assert_eq!(grid.nearest(&Complex::new(2.5, 0.0)), None);
    }

    #[test]
    fn nan_has_no_pixel() {
        let grid = square(5);
        assert_eq!(grid.nearest(&Complex::new(::std::f64::NAN, 0.0)), None);
        assert_eq!(grid.nearest(&Complex::new(0.0, ::std::f64::NAN)), None);
    }

    #[test]
    fn point_to_pixel_from_the_bottom() {
        let bb = BoundingBox::from_corners(-2.0, 2.0, 2.0, -2.0).unwrap();
        let grid = Grid::new(bb, Resolution::new(5, 5).unwrap(), Origin::Bottom);
        assert_eq!(grid.nearest(&Complex::new(-2.0, -2.0)), Some(Pixel(0, 0)));
        assert_eq!(grid.nearest(&Complex::new(0.9, 1.1)), Some(Pixel(3, 3)));
        let pixel = grid.nearest(&Complex::new(2.0, 2.0)).unwrap();
        assert_eq!(pixel, Pixel(4, 4));
        assert_eq!(grid.point(&pixel), Complex::new(2.0, 2.0));
    }

    #[test]
    fn points_are_row_major() {
        let grid = square(3);
        let points: Vec<Complex<f64>> = grid.points().collect();
        assert_eq!(points[0], Complex::new(-2.0, 2.0));
        assert_eq!(points[1], Complex::new(0.0, 2.0));
        assert_eq!(points[3], Complex::new(-2.0, 0.0));
        assert_eq!(grid.band_points(1, 2), points[3..6].to_vec());
    }

    #[test]
    fn precision_runs_out_at_deep_zoom() {
        assert!(square(100).is_resolvable());
        let bb = BoundingBox::centered(Complex::new(-0.75, 0.1), 1e-15, 1e-15).unwrap();
        let grid = Grid::new(bb, Resolution::new(100, 100).unwrap(), Origin::Top);
        assert!(grid.magnification() > 1e15);
        assert!(!grid.is_resolvable());
    }
}
