extern crate clap;
extern crate env_logger;
extern crate fractals;
#[macro_use]
extern crate log;
extern crate num;
extern crate num_cpus;

use clap::{App, Arg, ArgMatches};
use fractals::{
    BoundingBox, Engine, Flow, FractalKind, Grid, IterationMatrix, Origin, ParameterRecord,
    Progress, Rendering, Resolution,
};
use num::Complex;
use std::io::Write;
use std::str::FromStr;

fn parse_pair<T>(s: &str, separator: char) -> Option<(T, T)>
where
    T: FromStr,
{
    match s.find(separator) {
        None => None,
        Some(index) => match (T::from_str(&s[..index]), T::from_str(&s[index + 1..])) {
            (Ok(l), Ok(r)) => Some((l, r)),
            _ => None,
        },
    }
}

fn parse_complex(s: &str) -> Option<Complex<f64>> {
    match parse_pair(s, ',') {
        Some((re, im)) => Some(Complex { re, im }),
        None => None,
    }
}

fn validate_pair<T: FromStr>(s: &str, separator: char, err: &str) -> Result<(), String> {
    match parse_pair::<T>(s, separator) {
        Some(_) => Ok(()),
        None => Err(err.to_string()),
    }
}

fn validate_number<T: FromStr>(s: &str, err: &str) -> Result<(), String> {
    match T::from_str(s) {
        Ok(_) => Ok(()),
        Err(_) => Err(err.to_string()),
    }
}

fn validate_range<T: FromStr + Ord>(
    s: &str,
    low: T,
    high: T,
    isnotanumber_err: &str,
    isnotinrange_err: &str,
) -> Result<(), String> {
    match T::from_str(s) {
        Ok(i) => {
            if i >= low && i <= high {
                Ok(())
            } else {
                Err(isnotinrange_err.to_string())
            }
        }
        Err(_) => Err(isnotanumber_err.to_string()),
    }
}

const OUTPUT: &str = "output";
const KIND: &str = "kind";
const SIZE: &str = "size";
const UPPERLEFT: &str = "upperleft";
const LOWERRIGHT: &str = "lowerright";
const CENTER: &str = "center";
const WIDTH: &str = "width";
const HEIGHT: &str = "height";
const DENSITY: &str = "density";
const BOUND: &str = "bound";
const ITERATIONS: &str = "iterations";
const JULIA_C: &str = "julia-c";
const THREADS: &str = "threads";
const PARAMS: &str = "params";
const SAVE_PARAMS: &str = "save-params";
const COLORMAP: &str = "colormap";
const INTERPOLATION: &str = "interpolation";
const PROGRESS: &str = "progress";

fn args<'a>() -> ArgMatches<'a> {
    let max_threads = num_cpus::get();

    App::new("fractal")
        .version("0.1.0")
        .author("Elf M. Sternberg <elf.sternberg@gmail.com>")
        .about("Escape-time fractal renderer")
        .arg(
            Arg::with_name(OUTPUT)
                .required_unless(SAVE_PARAMS)
                .long(OUTPUT)
                .short("o")
                .takes_value(true)
                .help("Output file (binary PGM)"),
        )
        .arg(
            Arg::with_name(KIND)
                .long(KIND)
                .short("k")
                .takes_value(true)
                .validator(|s| s.parse::<FractalKind>().map(|_| ()).map_err(|e| e.to_string()))
                .help("mandelbrot, julia or burning-ship"),
        )
        .arg(
            Arg::with_name(SIZE)
                .long(SIZE)
                .short("s")
                .takes_value(true)
                .validator(|s| validate_pair::<usize>(&s, 'x', "Could not parse output image size"))
                .help("Size of output image, as WIDTHxHEIGHT; overrides --density"),
        )
        .arg(
            Arg::with_name(UPPERLEFT)
                .long(UPPERLEFT)
                .short("u")
                .takes_value(true)
                .allow_hyphen_values(true)
                .conflicts_with(CENTER)
                .validator(|s| validate_pair::<f64>(&s, ',', "Could not parse upper left corner"))
                .help("Upper left corner of the region, as RE,IM"),
        )
        .arg(
            Arg::with_name(LOWERRIGHT)
                .long(LOWERRIGHT)
                .short("l")
                .takes_value(true)
                .allow_hyphen_values(true)
                .conflicts_with(CENTER)
                .validator(|s| validate_pair::<f64>(&s, ',', "Could not parse lower right corner"))
                .help("Lower right corner of the region, as RE,IM"),
        )
        .arg(
            Arg::with_name(CENTER)
                .long(CENTER)
                .takes_value(true)
                .allow_hyphen_values(true)
                .requires(WIDTH)
                .validator(|s| validate_pair::<f64>(&s, ',', "Could not parse center"))
                .help("Center of the region, as RE,IM"),
        )
        .arg(
            Arg::with_name(WIDTH)
                .long(WIDTH)
                .takes_value(true)
                .allow_hyphen_values(true)
                .requires(CENTER)
                .validator(|s| validate_number::<f64>(&s, "Could not parse width"))
                .help("Width of the region around --center"),
        )
        .arg(
            Arg::with_name(HEIGHT)
                .long(HEIGHT)
                .takes_value(true)
                .allow_hyphen_values(true)
                .requires(WIDTH)
                .validator(|s| validate_number::<f64>(&s, "Could not parse height"))
                .help("Height of the region around --center (default: keep the image aspect)"),
        )
        .arg(
            Arg::with_name(DENSITY)
                .long(DENSITY)
                .short("d")
                .takes_value(true)
                .allow_hyphen_values(true)
                .validator(|s| validate_number::<f64>(&s, "Could not parse pixel density"))
                .help("Pixels per unit of the complex plane"),
        )
        .arg(
            Arg::with_name(BOUND)
                .long(BOUND)
                .short("b")
                .takes_value(true)
                .allow_hyphen_values(true)
                .validator(|s| validate_number::<f64>(&s, "Could not parse escape bound"))
                .help("Escape bound"),
        )
        .arg(
            Arg::with_name(ITERATIONS)
                .long(ITERATIONS)
                .short("i")
                .takes_value(true)
                .allow_hyphen_values(true)
                .validator(|s| validate_number::<i64>(&s, "Could not parse iteration count"))
                .help("Iteration budget"),
        )
        .arg(
            Arg::with_name(JULIA_C)
                .long(JULIA_C)
                .short("c")
                .takes_value(true)
                .allow_hyphen_values(true)
                .validator(|s| validate_pair::<f64>(&s, ',', "Could not parse Julia constant"))
                .help("Julia constant, as RE,IM"),
        )
        .arg(
            Arg::with_name(THREADS)
                .long(THREADS)
                .short("t")
                .takes_value(true)
                .default_value("1")
                .validator(move |s| {
                    validate_range(
                        &s,
                        1,
                        max_threads,
                        "Could not parse thread count",
                        &format!("Thread count must be between 1 and {}", max_threads),
                    )
                })
                .help("Number of threads to use in solver"),
        )
        .arg(
            Arg::with_name(PARAMS)
                .long(PARAMS)
                .short("p")
                .takes_value(true)
                .help("Load parameters from a JSON file; other options override it"),
        )
        .arg(
            Arg::with_name(SAVE_PARAMS)
                .long(SAVE_PARAMS)
                .takes_value(true)
                .help(
                    "Save the final parameters to a JSON file; the image size is \
                     saved as a density, so non-square pixels do not survive",
                ),
        )
        .arg(
            Arg::with_name(COLORMAP)
                .long(COLORMAP)
                .takes_value(true)
                .help("Colour map: gray, bone, binary, with an optional _r suffix"),
        )
        .arg(
            Arg::with_name(INTERPOLATION)
                .long(INTERPOLATION)
                .takes_value(true)
                .help("Interpolation hint recorded for downstream renderers"),
        )
        .arg(
            Arg::with_name(PROGRESS)
                .long(PROGRESS)
                .help("Show a progress bar (single-threaded runs only)"),
        )
        .get_matches()
}

fn value<T: FromStr>(matches: &ArgMatches, name: &str) -> Option<T> {
    matches.value_of(name).and_then(|s| T::from_str(s).ok())
}

fn pair<T: FromStr>(matches: &ArgMatches, name: &str, separator: char) -> Option<(T, T)> {
    matches.value_of(name).and_then(|s| parse_pair(s, separator))
}

fn complex(matches: &ArgMatches, name: &str) -> Option<Complex<f64>> {
    matches.value_of(name).and_then(parse_complex)
}

/// Fold the command line over a record loaded from disk (or the
/// defaults), and work out the image size.
fn request(matches: &ArgMatches) -> fractals::Result<(ParameterRecord, Option<Resolution>)> {
    let mut record = match matches.value_of(PARAMS) {
        Some(path) => ParameterRecord::load(path)?,
        None => ParameterRecord::default(),
    };

    if let Some(kind) = matches.value_of(KIND) {
        record.kind = kind.to_string();
    }
    if let Some(density) = value(matches, DENSITY) {
        record.pixels_per_unit = density;
    }
    if let Some(bound) = value(matches, BOUND) {
        record.bound = bound;
    }
    if let Some(iterations) = value(matches, ITERATIONS) {
        record.iterations = iterations;
    }
    if let Some(c) = complex(matches, JULIA_C) {
        record.c_re = c.re;
        record.c_im = c.im;
    }
    if let Some(colormap) = matches.value_of(COLORMAP) {
        record.colormap = colormap.to_string();
    }
    if let Some(interpolation) = matches.value_of(INTERPOLATION) {
        record.interpolation = interpolation.to_string();
    }
    if let Some(ul) = complex(matches, UPPERLEFT) {
        record.x1 = ul.re;
        record.y1 = ul.im;
    }
    if let Some(lr) = complex(matches, LOWERRIGHT) {
        record.x2 = lr.re;
        record.y2 = lr.im;
    }

    let resolution = match pair::<usize>(matches, SIZE, 'x') {
        Some((xn, yn)) => Some(Resolution::new(xn, yn)?),
        None => None,
    };

    if let (Some(center), Some(width)) = (complex(matches, CENTER), value::<f64>(matches, WIDTH)) {
        let bounds = match (value::<f64>(matches, HEIGHT), resolution) {
            (Some(height), _) => BoundingBox::centered(center, width, height)?,
            (None, Some(r)) => {
                BoundingBox::centered_with_aspect(center, width, r.xn as f64 / r.yn as f64)?
            }
            (None, None) => BoundingBox::centered(center, width, width)?,
        };
        record.x1 = bounds.top_left().re;
        record.y1 = bounds.top_left().im;
        record.x2 = bounds.bottom_right().re;
        record.y2 = bounds.bottom_right().im;
    }

    if let Some(r) = resolution {
        record.pixels_per_unit = r.xn as f64 / (record.x2 - record.x1);
        if matches.is_present(SAVE_PARAMS) {
            match record.resolution() {
                Ok(ref saved) if *saved == r => {}
                Ok(saved) => warn!(
                    "Parameter files keep a density, not a size: {}x{} will reload as {}x{}",
                    r.xn, r.yn, saved.xn, saved.yn
                ),
                Err(_) => {}
            }
        }
    }
    Ok((record, resolution))
}

/// A textual progress bar on stderr, redrawn after every iteration.
fn progress_bar(progress: &Progress) -> Flow {
    const BAR: usize = 40;
    let filled = ((progress.fraction() * BAR as f64) as usize).min(BAR);
    let mut stderr = std::io::stderr();
    let _ = write!(
        stderr,
        "\r[{}{}] {}/{}",
        "#".repeat(filled),
        ".".repeat(BAR - filled),
        progress.completed,
        progress.budget
    );
    Flow::Continue
}

fn compute(
    grid: &Grid,
    record: &ParameterRecord,
    threads: usize,
    show_progress: bool,
) -> fractals::Result<IterationMatrix> {
    let engine = Engine::new(grid, record.parameters()?);
    if threads > 1 {
        if show_progress {
            warn!("--progress is ignored for threaded runs");
        }
        return engine.render_threaded(threads);
    }
    if show_progress {
        let matrix = engine.render_observed(&mut progress_bar);
        let _ = writeln!(std::io::stderr());
        matrix
    } else {
        Ok(engine.render())
    }
}

fn run(matches: &ArgMatches) -> fractals::Result<()> {
    let (record, resolution) = request(matches)?;

    let bounds = record.bounds()?;
    let params = record.parameters()?;
    let resolution = match resolution {
        Some(r) => r,
        None => record.resolution()?,
    };
    info!(
        "{} at {}x{}, magnification {:.3e}",
        params.kind(),
        resolution.xn,
        resolution.yn,
        bounds.magnification()
    );
    if matches.is_present(JULIA_C) && !params.kind().uses_c() {
        warn!("--julia-c has no effect on {}", params.kind());
    }

    if let Some(path) = matches.value_of(SAVE_PARAMS) {
        record.save(path)?;
    }

    if let Some(output) = matches.value_of(OUTPUT) {
        let grid = Grid::new(bounds, resolution, Origin::Top);
        let threads = value(matches, THREADS).unwrap_or(1);
        let matrix = compute(&grid, &record, threads, matches.is_present(PROGRESS))?;
        let rendering = Rendering::new(matrix, bounds, &record.colormap, &record.interpolation);
        rendering.write_pgm(output)?;
    }
    Ok(())
}

fn main() {
    env_logger::init();
    let matches = args();
    if let Err(e) = run(&matches) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
