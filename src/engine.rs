// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The escape-time engine.
//!
//! Every point of the grid gets an orbit.  On each pass we first
//! decide which orbits are still inside the escape bound (the active
//! mask), credit each of those with one more iteration, and then
//! advance only those orbits by one step.  Orbits that have escaped
//! are frozen where they left: they are never squared again, which
//! saves the work and keeps their values from running off to
//! infinity.
//!
//! The mask is always computed from the orbits as they stood before
//! the pass, so no orbit ever sees another's value from the same
//! pass.  That is what makes it safe to split the grid into bands and
//! run the bands on separate threads.

extern crate crossbeam;

use crossbeam::thread::ScopedJoinHandle;
use num::Complex;
use std::sync::atomic::{AtomicBool, Ordering};

use errors::{FractalError, Result};
use params::FractalParameters;
use planes::{Grid, Pixel};
use rules::{BurningShip, EscapeRule, FractalKind, Julia, Mandelbrot};

/// The result of a run: one count per grid point, row major.  A count
/// equal to the budget means the orbit never escaped.
#[derive(Clone, Debug, PartialEq)]
pub struct IterationMatrix {
    rows: usize,
    cols: usize,
    budget: u32,
    counts: Vec<u32>,
}

impl IterationMatrix {
    /// Number of rows (`yn`).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (`xn`).
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// The iteration budget of the run that produced this matrix.
    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// The count at a row and column.
    pub fn get(&self, row: usize, col: usize) -> u32 {
        self.counts[row * self.cols + col]
    }

    /// The count at a pixel.
    pub fn at(&self, pixel: &Pixel) -> u32 {
        self.get(pixel.1, pixel.0)
    }

    /// One row of counts.
    pub fn row(&self, row: usize) -> &[u32] {
        &self.counts[row * self.cols..(row + 1) * self.cols]
    }

    /// All counts, row major.
    pub fn as_slice(&self) -> &[u32] {
        &self.counts
    }

    /// The number of points that never escaped.
    pub fn interior_count(&self) -> usize {
        self.counts.iter().filter(|&&n| n == self.budget).count()
    }
}

/// The per-point state of a run.  Lives only as long as the run.
#[derive(Debug)]
pub struct OrbitState {
    z: Vec<Complex<f64>>,
    c: Vec<Complex<f64>>,
    active: Vec<bool>,
}

impl OrbitState {
    /// Start an orbit for every point, as the rule says.
    pub fn new<R, I>(rule: &R, points: I) -> OrbitState
    where
        R: EscapeRule,
        I: IntoIterator<Item = Complex<f64>>,
    {
        let (z, c): (Vec<_>, Vec<_>) = points.into_iter().map(|p| rule.initialize(p)).unzip();
        let active = vec![false; z.len()];
        OrbitState { z, c, active }
    }

    /// The current `Z` of every orbit.
    pub fn z(&self) -> &[Complex<f64>] {
        &self.z
    }

    /// Recompute the active mask from the current `Z`.  Strictly less
    /// than: an orbit sitting exactly on the bound has escaped.  A NaN
    /// modulus compares false, so a blown-up orbit freezes too.
    /// Returns the number of active orbits.
    pub fn mask(&mut self, bound: f64) -> usize {
        let mut active = 0;
        for (flag, z) in self.active.iter_mut().zip(self.z.iter()) {
            *flag = z.norm() < bound;
            if *flag {
                active += 1;
            }
        }
        active
    }

    /// Credit every active orbit with one iteration.
    pub fn tally(&self, counts: &mut [u32]) {
        for (count, &flag) in counts.iter_mut().zip(self.active.iter()) {
            if flag {
                *count += 1;
            }
        }
    }

    /// Advance every active orbit by one step.  Escaped orbits are not
    /// touched.
    pub fn advance<R: EscapeRule>(&mut self, rule: &R) {
        let orbits = self.z.iter_mut().zip(self.c.iter()).zip(self.active.iter());
        for ((z, &c), &flag) in orbits {
            if flag {
                *z = rule.step(*z, c);
            }
        }
    }
}

/// What an observer is told after each completed iteration.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Progress {
    /// Iterations done so far, counting this one.
    pub completed: u32,
    /// The iteration budget.
    pub budget: u32,
    /// How many orbits were still active during this iteration.
    pub active: usize,
}

impl Progress {
    /// Completed fraction of the budget, 0.0 to 1.0.
    pub fn fraction(&self) -> f64 {
        f64::from(self.completed) / f64::from(self.budget)
    }
}

/// An observer's answer: keep going, or give up.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Flow {
    /// Carry on with the next iteration.
    Continue,
    /// Abandon the run.
    Stop,
}

/// Something that wants to hear about a run as it happens.  Observers
/// can stop a run but can never change its numbers.
pub trait Observer {
    /// Called before each iteration starts, with the number already
    /// completed.  Observers that only watch finished iterations can
    /// leave this alone.
    fn ready(&mut self, _completed: u32) -> Flow {
        Flow::Continue
    }

    /// Called once after each completed iteration.
    fn iteration(&mut self, progress: &Progress) -> Flow;
}

impl<F> Observer for F
where
    F: FnMut(&Progress) -> Flow,
{
    fn iteration(&mut self, progress: &Progress) -> Flow {
        (*self)(progress)
    }
}

/// The observer that does not care.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoProgress;

impl Observer for NoProgress {
    fn iteration(&mut self, _progress: &Progress) -> Flow {
        Flow::Continue
    }
}

/// Stops a run before the next iteration once the flag it watches is
/// raised.  This is how threaded runs are cancelled: every band
/// watches the same flag.
#[derive(Copy, Clone, Debug)]
pub struct CancelFlag<'a>(pub &'a AtomicBool);

impl<'a> Observer for CancelFlag<'a> {
    fn ready(&mut self, _completed: u32) -> Flow {
        if self.0.load(Ordering::Relaxed) {
            Flow::Stop
        } else {
            Flow::Continue
        }
    }

    fn iteration(&mut self, _progress: &Progress) -> Flow {
        Flow::Continue
    }
}

/// Run the masked loop over a set of points, writing the counts into
/// `counts`, which must be zeroed and as long as `points`.  Returns
/// the number of completed iterations if an observer stopped the run.
fn iterate<R, O>(
    rule: &R,
    points: Vec<Complex<f64>>,
    bound: f64,
    budget: u32,
    counts: &mut [u32],
    observer: &mut O,
) -> Option<u32>
where
    R: EscapeRule,
    O: Observer,
{
    let mut orbits = OrbitState::new(rule, points);
    for n in 0..budget {
        if observer.ready(n) == Flow::Stop {
            return Some(n);
        }
        let active = orbits.mask(bound);
        if active == 0 {
            trace!("Every orbit escaped after {} iterations", n);
            break;
        }
        orbits.tally(counts);
        orbits.advance(rule);
        trace!("Iteration {}: {} orbits active", n, active);

        let progress = Progress {
            completed: n + 1,
            budget,
            active,
        };
        if observer.iteration(&progress) == Flow::Stop {
            return Some(n + 1);
        }
    }
    None
}

/// Takes a grid and the parameters of a run and turns them into an
/// iteration matrix.  Holds no state between runs; two engines, or
/// two runs of the same engine, never share anything mutable.
pub struct Engine<'a> {
    grid: &'a Grid,
    params: FractalParameters,
}

impl<'a> Engine<'a> {
    /// Requires the sample grid and validated parameters.
    pub fn new(grid: &'a Grid, params: FractalParameters) -> Self {
        Engine { grid, params }
    }

    fn blank(&self) -> IterationMatrix {
        IterationMatrix {
            rows: self.grid.rows(),
            cols: self.grid.cols(),
            budget: self.params.iterations(),
            counts: vec![0 as u32; self.grid.len()],
        }
    }

    /// Pick the rule for our kind and run it over one band of points.
    fn run_band<O: Observer>(
        &self,
        points: Vec<Complex<f64>>,
        counts: &mut [u32],
        observer: &mut O,
    ) -> Option<u32> {
        let (bound, budget) = (self.params.bound(), self.params.iterations());
        match self.params.kind() {
            FractalKind::Mandelbrot => iterate(&Mandelbrot, points, bound, budget, counts, observer),
            FractalKind::Julia => {
                let rule = Julia { c: self.params.c() };
                iterate(&rule, points, bound, budget, counts, observer)
            }
            FractalKind::BurningShip => {
                iterate(&BurningShip, points, bound, budget, counts, observer)
            }
        }
    }

    fn announce(&self, threads: usize) {
        debug!(
            "Rendering {} over {}x{} for {} iterations (bound {}, magnification {:.3e}, {} thread(s))",
            self.params.kind(),
            self.grid.cols(),
            self.grid.rows(),
            self.params.iterations(),
            self.params.bound(),
            self.grid.magnification(),
            threads
        );
        if !self.grid.is_resolvable() {
            warn!(
                "Neighbouring samples are no longer distinct at magnification {:.3e}",
                self.grid.magnification()
            );
        }
    }

    fn finish(&self, matrix: IterationMatrix) -> IterationMatrix {
        debug!(
            "{} of {} points never escaped",
            matrix.interior_count(),
            matrix.as_slice().len()
        );
        matrix
    }

    /// The main function for single-threaded runs.
    pub fn render(&self) -> IterationMatrix {
        self.announce(1);
        let mut matrix = self.blank();
        self.run_band(self.grid.points().collect(), &mut matrix.counts, &mut NoProgress);
        self.finish(matrix)
    }

    /// A single-threaded run that reports to an observer after every
    /// iteration.  Fails with `Cancelled` if the observer stops it.
    pub fn render_observed<O: Observer>(&self, observer: &mut O) -> Result<IterationMatrix> {
        self.announce(1);
        let mut matrix = self.blank();
        if let Some(completed) =
            self.run_band(self.grid.points().collect(), &mut matrix.counts, observer)
        {
            info!("Render stopped after {} iterations", completed);
            return Err(FractalError::Cancelled { completed });
        }
        Ok(self.finish(matrix))
    }

    /// A multi-threaded version of the render function that takes a
    /// thread count as an option.  The grid is cut into horizontal
    /// bands, one per thread; the result is identical to `render`.
    pub fn render_threaded(&self, threads: usize) -> Result<IterationMatrix> {
        let never = AtomicBool::new(false);
        self.render_threaded_cancellable(threads, &never)
    }

    /// As `render_threaded`, but every band gives up as soon as
    /// `cancel` is raised.
    pub fn render_threaded_cancellable(
        &self,
        threads: usize,
        cancel: &AtomicBool,
    ) -> Result<IterationMatrix> {
        let threads = threads.max(1).min(self.grid.rows());
        self.announce(threads);
        let mut matrix = self.blank();
        let (rows, cols) = (self.grid.rows(), self.grid.cols());
        let band = (rows + threads - 1) / threads;

        let outcomes = crossbeam::scope(|spawner| {
            let handles: Vec<ScopedJoinHandle<Option<u32>>> = matrix
                .counts
                .chunks_mut(band * cols)
                .enumerate()
                .map(|(i, counts)| {
                    let (start, end) = (i * band, ((i + 1) * band).min(rows));
                    let points = self.grid.band_points(start, end);
                    spawner.spawn(move |_| {
                        let stopped = self.run_band(points, counts, &mut CancelFlag(cancel));
                        debug!("Band {}..{} finished", start, end);
                        stopped
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join())
                .collect::<Vec<_>>()
        })
        .map_err(|_| FractalError::WorkerPanicked)?;

        let mut stopped = None;
        for outcome in outcomes {
            if let Some(completed) = outcome.map_err(|_| FractalError::WorkerPanicked)? {
                stopped = Some(stopped.map_or(completed, |s: u32| s.min(completed)));
            }
        }
        if let Some(completed) = stopped {
            info!("Render stopped after {} iterations", completed);
            return Err(FractalError::Cancelled { completed });
        }
        Ok(self.finish(matrix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planes::{BoundingBox, Origin, Resolution};

    fn grid(x1: f64, y1: f64, x2: f64, y2: f64, xn: usize, yn: usize) -> Grid {
        let bb = BoundingBox::from_corners(x1, y1, x2, y2).unwrap();
        Grid::new(bb, Resolution::new(xn, yn).unwrap(), Origin::Top)
    }

    #[test]
    fn matrix_has_the_grid_shape_and_bounded_entries() {
        let g = grid(-2.0, 1.5, 1.0, -1.5, 37, 23);
        let params = FractalParameters::mandelbrot(30).unwrap();
        let m = Engine::new(&g, params).render();
        assert_eq!(m.rows(), 23);
        assert_eq!(m.cols(), 37);
        assert_eq!(m.as_slice().len(), 23 * 37);
        assert!(m.as_slice().iter().all(|&n| n <= 30));
    }

    #[test]
    fn origin_is_in_the_mandelbrot_set() {
        let g = grid(-2.0, 2.0, 2.0, -2.0, 100, 100);
        let params = FractalParameters::mandelbrot(50).unwrap();
        let m = Engine::new(&g, params).render();
        let pixel = g.nearest(&Complex::new(0.0, 0.0)).unwrap();
        assert_eq!(m.at(&pixel), 50);
    }

    #[test]
    fn two_escapes_on_the_boundary() {
        // The right-hand column of this grid is exactly 2 + 0i.
        let g = grid(0.0, 1.0, 2.0, -1.0, 3, 3);
        for &budget in &[1, 2, 10, 500] {
            let params = FractalParameters::mandelbrot(budget).unwrap();
            let m = Engine::new(&g, params).render();
            assert_eq!(g.point(&Pixel(2, 1)), Complex::new(2.0, 0.0));
            assert_eq!(m.get(1, 2), 1);
        }
    }

    #[test]
    fn a_point_exactly_on_the_bound_is_not_active() {
        let mut orbits = OrbitState::new(
            &Julia {
                c: Complex::new(0.0, 0.0),
            },
            vec![
                Complex::new(2.0, 0.0),
                Complex::new(0.0, -2.0),
                Complex::new(1.999, 0.0),
            ],
        );
        assert_eq!(orbits.mask(2.0), 1);
        let mut counts = vec![0, 0, 0];
        orbits.tally(&mut counts);
        assert_eq!(counts, vec![0, 0, 1]);
    }

    #[test]
    fn escaped_orbits_are_frozen() {
        let rule = Mandelbrot;
        let mut orbits = OrbitState::new(&rule, vec![Complex::new(3.0, 0.0), Complex::new(0.0, 0.0)]);
        orbits.mask(2.0);
        orbits.advance(&rule);
        assert_eq!(orbits.z()[0], Complex::new(3.0, 0.0));
        orbits.mask(2.0);
        orbits.advance(&rule);
        // 3 + 0i is outside the bound now and must stay put.
        assert_eq!(orbits.z()[0], Complex::new(3.0, 0.0));
        assert_eq!(orbits.z()[1], Complex::new(0.0, 0.0));
    }

    #[test]
    fn blown_up_orbits_freeze_instead_of_failing() {
        let g = grid(-1e300, 1e300, 1e300, -1e300, 5, 5);
        let params = FractalParameters::burning_ship(20).unwrap();
        let m = Engine::new(&g, params).render();
        assert!(m.as_slice().iter().all(|&n| n <= 20));
    }

    #[test]
    fn larger_bounds_never_escape_sooner() {
        let g = grid(-2.0, 1.5, 1.0, -1.5, 30, 30);
        let tight = FractalParameters::mandelbrot(40).unwrap();
        let loose = tight.with_bound(10.0).unwrap();
        let a = Engine::new(&g, tight).render();
        let b = Engine::new(&g, loose).render();
        for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
            assert!(x <= y);
        }
    }

    #[test]
    fn burning_ship_agrees_with_mandelbrot_on_the_positive_real_axis() {
        // A single row straight along the real axis from 0 to 2.
        let bb = BoundingBox::from_corners(0.0, 0.5, 2.0, -0.5).unwrap();
        let g = Grid::new(bb, Resolution::new(41, 3).unwrap(), Origin::Top);
        assert_eq!(g.ys()[1], 0.0);
        let m = Engine::new(&g, FractalParameters::mandelbrot(60).unwrap()).render();
        let b = Engine::new(&g, FractalParameters::burning_ship(60).unwrap()).render();
        assert_eq!(m.row(1), b.row(1));
    }

    #[test]
    fn burning_ship_differs_from_mandelbrot_off_axis() {
        let g = grid(-2.0, 1.5, 1.0, -1.5, 40, 40);
        let m = Engine::new(&g, FractalParameters::mandelbrot(40).unwrap()).render();
        let b = Engine::new(&g, FractalParameters::burning_ship(40).unwrap()).render();
        assert_ne!(m, b);
    }

    #[test]
    fn julia_runs_are_deterministic() {
        let g = grid(-1.65, 1.65, 1.65, -1.65, 64, 48);
        let params = FractalParameters::julia(Complex::new(-0.82, -0.2), 80).unwrap();
        let first = Engine::new(&g, params).render();
        let second = Engine::new(&g, params).render();
        assert_eq!(first, second);
        assert!(first.as_slice().iter().any(|&n| n > 1));
    }

    #[test]
    fn observer_sees_every_iteration() {
        let g = grid(-2.0, 2.0, 2.0, -2.0, 9, 9);
        let params = FractalParameters::mandelbrot(25).unwrap();
        let mut seen = vec![];
        let m = Engine::new(&g, params)
            .render_observed(&mut |p: &Progress| {
                seen.push(p.completed);
                Flow::Continue
            })
            .unwrap();
        assert_eq!(seen, (1..=25).collect::<Vec<u32>>());
        assert_eq!(m, Engine::new(&g, params).render());
    }

    #[test]
    fn observer_can_cancel() {
        let g = grid(-2.0, 2.0, 2.0, -2.0, 9, 9);
        let params = FractalParameters::mandelbrot(25).unwrap();
        let mut stop_at_five = |p: &Progress| {
            if p.completed == 5 {
                Flow::Stop
            } else {
                Flow::Continue
            }
        };
        match Engine::new(&g, params).render_observed(&mut stop_at_five) {
            Err(FractalError::Cancelled { completed }) => assert_eq!(completed, 5),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn threaded_matches_single() {
        let g = grid(-2.0, 1.25, 0.75, -1.25, 53, 31);
        for params in &[
            FractalParameters::mandelbrot(64).unwrap(),
            FractalParameters::burning_ship(64).unwrap(),
            FractalParameters::julia(Complex::new(-0.82, -0.2), 64).unwrap(),
        ] {
            let engine = Engine::new(&g, *params);
            let single = engine.render();
            for &threads in &[1, 2, 3, 8, 100] {
                assert_eq!(engine.render_threaded(threads).unwrap(), single);
            }
        }
    }

    #[test]
    fn threaded_run_can_be_cancelled() {
        let g = grid(-2.0, 2.0, 2.0, -2.0, 16, 16);
        let params = FractalParameters::mandelbrot(100).unwrap();
        let cancel = AtomicBool::new(true);
        match Engine::new(&g, params).render_threaded_cancellable(4, &cancel) {
            Err(FractalError::Cancelled { completed }) => assert_eq!(completed, 0),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn a_raised_flag_stops_before_the_next_iteration() {
        let g = grid(-2.0, 2.0, 2.0, -2.0, 9, 9);
        let params = FractalParameters::mandelbrot(25).unwrap();
        let engine = Engine::new(&g, params);

        let lowered = AtomicBool::new(false);
        assert_eq!(
            engine.render_observed(&mut CancelFlag(&lowered)).unwrap(),
            engine.render()
        );

        // Raises the flag after the third pass; the fourth never starts.
        struct RaiseAfter<'a> {
            flag: CancelFlag<'a>,
            after: u32,
        }
        impl<'a> Observer for RaiseAfter<'a> {
            fn ready(&mut self, completed: u32) -> Flow {
                self.flag.ready(completed)
            }
            fn iteration(&mut self, progress: &Progress) -> Flow {
                if progress.completed == self.after {
                    (self.flag.0).store(true, Ordering::Relaxed);
                }
                Flow::Continue
            }
        }
        let flag = AtomicBool::new(false);
        let mut observer = RaiseAfter {
            flag: CancelFlag(&flag),
            after: 3,
        };
        match engine.render_observed(&mut observer) {
            Err(FractalError::Cancelled { completed }) => assert_eq!(completed, 3),
            other => panic!("unexpected {:?}", other),
        }
    }
}
