extern crate clap;
extern crate env_logger;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;
extern crate mandelfarm;
extern crate num_cpus;

use clap::{App, Arg, ArgMatches};
use failure::Error;
use mandelfarm::{
    task_size_for_count, Config, Grid, LocalRenderer, Shape, Task, Tiling, Viewport,
};
use std::fs::File;
use std::io::BufWriter;
use std::str::FromStr;
use std::time::{Duration, Instant};

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

fn parse_viewport(s: &str) -> Option<Viewport> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|part| f64::from_str(part.trim()))
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [xmin, ymin, dx, dy] => Some(Viewport {
            xmin: *xmin,
            ymin: *ymin,
            dx: *dx,
            dy: *dy,
        }),
        _ => None,
    }
}

fn parse_tiling(s: &str) -> Option<Tiling> {
    match s {
        "linear" => Some(Tiling::Linear),
        "rectangular" => Some(Tiling::Rectangular),
        "rows" => Some(Tiling::RowSegments),
        _ => None,
    }
}

fn validate_pair<T: FromStr>(s: &str, separator: char, err: &str) -> Result<(), String> {
    match parse_pair::<T>(s, separator) {
        Some(_) => Ok(()),
        None => Err(err.to_string()),
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
const SIZE: &str = "size";
const TASK_SIZE: &str = "task-size";
const TASKS: &str = "tasks";
const TILING: &str = "tiling";
const WORKERS: &str = "workers";
const CREDIT: &str = "credit";
const THREADS: &str = "threads";
const ITERATIONS: &str = "iterations";
const VIEWPORT: &str = "viewport";
const ENGINE: &str = "engine";
const TRIALS: &str = "trials";

fn args<'a>() -> ArgMatches<'a> {
    let max_threads = num_cpus::get();

    App::new("mandelfarm")
        .version("0.1.0")
        .author("Elf M. Sternberg <elf.sternberg@gmail.com>")
        .about("Mandelbrot escape-time renderer farmed out over message-passing workers")
        .arg(
            Arg::with_name(OUTPUT)
                .long(OUTPUT)
                .short("o")
                .takes_value(true)
                .default_value("mandelbrot.dat")
                .help("Output file"),
        )
        .arg(
            Arg::with_name(SIZE)
                .long(SIZE)
                .short("s")
                .takes_value(true)
                .default_value("1000x1000")
                .validator(|s| {
                    validate_pair::<usize>(&s, 'x', "Could not parse grid size")?;
                    match parse_pair::<usize>(&s, 'x') {
                        Some((cols, rows)) if cols >= 2 && rows >= 2 => Ok(()),
                        _ => Err("Grid must be at least 2x2".to_string()),
                    }
                })
                .help("Grid size, COLSxROWS"),
        )
        .arg(
            Arg::with_name(TASK_SIZE)
                .long(TASK_SIZE)
                .short("t")
                .takes_value(true)
                .default_value("100")
                .validator(|s| {
                    validate_range(
                        &s,
                        1,
                        usize::max_value(),
                        "Could not parse task size",
                        "Task size must be at least 1",
                    )
                })
                .help("Cells per task (linear) or tile edge (rectangular, rows)"),
        )
        .arg(
            Arg::with_name(TASKS)
                .long(TASKS)
                .takes_value(true)
                .validator(|s| {
                    validate_range(
                        &s,
                        1,
                        usize::max_value(),
                        "Could not parse task count",
                        "Task count must be at least 1",
                    )
                })
                .help("Cut the grid into at most this many tasks; overrides --task-size"),
        )
        .arg(
            Arg::with_name(TILING)
                .long(TILING)
                .takes_value(true)
                .default_value("linear")
                .possible_values(&["linear", "rectangular", "rows"])
                .help("How the grid is cut into tasks"),
        )
        .arg(
            Arg::with_name(WORKERS)
                .long(WORKERS)
                .short("w")
                .takes_value(true)
                .validator(|s| {
                    validate_range(
                        &s,
                        1,
                        1024,
                        "Could not parse worker count",
                        "Worker count must be between 1 and 1024",
                    )
                })
                .help("Number of worker ranks [default: one less than the CPU count]"),
        )
        .arg(
            Arg::with_name(CREDIT)
                .long(CREDIT)
                .short("c")
                .takes_value(true)
                .default_value("4")
                .validator(|s| {
                    validate_range(
                        &s,
                        1,
                        64,
                        "Could not parse credit",
                        "Credit must be between 1 and 64",
                    )
                })
                .help("Tasks each worker may hold at once"),
        )
        .arg(
            Arg::with_name(THREADS)
                .long(THREADS)
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
                .help("Compute threads per worker, or for the threaded engine"),
        )
        .arg(
            Arg::with_name(ITERATIONS)
                .long(ITERATIONS)
                .short("i")
                .takes_value(true)
                .default_value("100")
                .validator(|s| {
                    validate_range(
                        &s,
                        1,
                        1_000_000,
                        "Could not parse iteration count",
                        "Iteration count must be between 1 and 1000000",
                    )
                })
                .help("Iteration cap per cell"),
        )
        .arg(
            Arg::with_name(VIEWPORT)
                .long(VIEWPORT)
                .takes_value(true)
                .allow_hyphen_values(true)
                .default_value("-2.5,-1,3.5,2")
                .validator(|s| match parse_viewport(&s) {
                    Some(ref v) if v.dx > 0.0 && v.dy > 0.0 => Ok(()),
                    Some(_) => Err("Viewport extents must be positive".to_string()),
                    None => Err("Could not parse viewport XMIN,YMIN,DX,DY".to_string()),
                })
                .help("Region of the complex plane, XMIN,YMIN,DX,DY"),
        )
        .arg(
            Arg::with_name(ENGINE)
                .long(ENGINE)
                .short("e")
                .takes_value(true)
                .default_value("farm")
                .possible_values(&["farm", "sequential", "threaded"])
                .help("Render through the worker farm, or locally"),
        )
        .arg(
            Arg::with_name(TRIALS)
                .long(TRIALS)
                .takes_value(true)
                .default_value("1")
                .validator(|s| {
                    validate_range(
                        &s,
                        1,
                        1000,
                        "Could not parse trial count",
                        "Trial count must be between 1 and 1000",
                    )
                })
                .help("Render this many times and report the fastest"),
        )
        .get_matches()
}

fn value<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<T, Error> {
    let raw = matches
        .value_of(name)
        .ok_or_else(|| format_err!("missing --{}", name))?;
    T::from_str(raw).map_err(|_| format_err!("could not parse --{} {}", name, raw))
}

fn config(matches: &ArgMatches) -> Result<Config, Error> {
    let size = matches.value_of(SIZE).unwrap_or("");
    let (cols, rows) =
        parse_pair::<usize>(size, 'x').ok_or_else(|| format_err!("bad grid size {}", size))?;
    let shape = Shape::new(rows, cols);
    let tiling = matches
        .value_of(TILING)
        .and_then(parse_tiling)
        .ok_or_else(|| format_err!("bad tiling"))?;
    let viewport = matches
        .value_of(VIEWPORT)
        .and_then(parse_viewport)
        .ok_or_else(|| format_err!("bad viewport"))?;
    let task_size = match matches.value_of(TASKS) {
        Some(_) => task_size_for_count(shape, tiling, value(matches, TASKS)?),
        None => value(matches, TASK_SIZE)?,
    };
    let config = Config {
        shape,
        task_size,
        tiling,
        viewport,
        max_iterations: value(matches, ITERATIONS)?,
        workers: match matches.value_of(WORKERS) {
            Some(_) => value(matches, WORKERS)?,
            None => Config::default().workers,
        },
        credit: value(matches, CREDIT)?,
        threads: value(matches, THREADS)?,
    };
    config.validate()?;
    Ok(config)
}

fn render(engine: &str, config: &Config) -> Result<Grid, Error> {
    match engine {
        "farm" => Ok(mandelfarm::run(config)?.grid),
        _ => {
            let renderer = LocalRenderer::new(config.plane()?, config.max_iterations);
            let cells = if engine == "threaded" {
                renderer.render(config.threads)?
            } else {
                renderer.render_single()
            };
            let mut grid = Grid::new(config.shape);
            let whole = Task::Span {
                offset: 0,
                len: config.shape.len(),
            };
            grid.write_range(&whole, &cells)?;
            Ok(grid)
        }
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs() as f64 * 1e3 + f64::from(duration.subsec_nanos()) / 1e6
}

fn run() -> Result<(), Error> {
    let matches = args();
    let config = config(&matches)?;
    let engine = matches.value_of(ENGINE).unwrap_or("farm");
    let trials: usize = value(&matches, TRIALS)?;

    let mut best: Option<Duration> = None;
    let mut grid = None;
    for trial in 0..trials {
        let start = Instant::now();
        let rendered = render(engine, &config)?;
        let elapsed = start.elapsed();
        debug!("trial {}: {:.2} ms", trial, millis(elapsed));
        best = Some(best.map_or(elapsed, |b| b.min(elapsed)));
        grid = Some(rendered);
    }

    let grid = grid.ok_or_else(|| format_err!("no trials were run"))?;
    if let Some(best) = best {
        println!("{} time={:.2} ms.", engine, millis(best));
    }

    let outfile = matches.value_of(OUTPUT).unwrap_or("mandelbrot.dat");
    let mut out = BufWriter::new(File::create(outfile)?);
    mandelfarm::write_grid(&mut out, &config.viewport, &grid)?;
    info!("wrote {}x{} grid to {}", config.shape.cols, config.shape.rows, outfile);
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("Render failure: {}", e);
        std::process::exit(1);
    }
}
