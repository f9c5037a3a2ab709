use std::path::PathBuf;
use std::time::Instant;

use clap::{Args, Parser};
use hashbrown::HashSet;

use polycubes::cache::{CacheReader, CubeSource};
use polycubes::error::Error;
use polycubes::gen::{gen, GenOpts};
use polycubes::rotations::canonical_form;
use polycubes::{make_bar, Cube};

#[derive(Clone, Parser)]
pub enum Opts {
    /// Enumerate all polycubes made of a specific amount of cubes
    Enumerate(EnumerateOpts),
    /// Check that a cache file holds what it claims to hold
    Validate(ValidateArgs),
    /// Print header information of cache files
    Info {
        #[clap(required = true)]
        path: Vec<String>,
    },
}

#[derive(Clone, Args)]
pub struct EnumerateOpts {
    /// The N value for which to calculate all unique polycubes.
    pub n: usize,

    /// Number of expansion worker threads
    #[clap(long, short, default_value_t = 1)]
    pub threads: usize,

    /// Seed each size from the previous size's cache file
    #[clap(long, short = 'c')]
    pub use_cache: bool,

    /// Write a cache file for every size generated
    #[clap(long, short = 'w')]
    pub write_cache: bool,

    /// Write one cache file per bounding box shape, dropping each shape
    /// from memory once it is on disk
    #[clap(long)]
    pub split_cache: bool,

    /// Stream seeds from per-shape cache files
    #[clap(long)]
    pub use_split_cache: bool,

    /// Directory the cache files live in
    #[clap(long, default_value = "cache")]
    pub cache_dir: PathBuf,
}

#[derive(Clone, Args)]
pub struct ValidateArgs {
    /// The path of the cache file to check
    pub path: String,

    /// Don't validate that all polycubes in the file are unique
    #[clap(short = 'u', long)]
    pub no_uniqueness: bool,

    /// Don't validate that every polycube is connected and canonical
    #[clap(short = 'c', long)]
    pub no_canonical: bool,
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn enumerate(opts: &EnumerateOpts) -> Result<(), Error> {
    let gen_opts = GenOpts {
        threads: opts.threads.max(1),
        use_cache: opts.use_cache || env_flag("USE_CACHE"),
        write_cache: opts.write_cache || env_flag("WRITE_CACHE"),
        split_cache: opts.split_cache,
        use_split_cache: opts.use_split_cache,
        base_dir: opts.cache_dir.clone(),
    };

    let start = Instant::now();
    let seeds = gen(opts.n, &gen_opts)?;
    let duration = start.elapsed();

    println!("Unique polycubes found for N = {}: {}.", opts.n, seeds.len());
    println!("Duration: {} ms", duration.as_millis());
    Ok(())
}

fn validate(opts: &ValidateArgs) {
    let path = &opts.path;
    let reader = match CacheReader::load(path) {
        Ok(reader) => reader,
        Err(e) => {
            println!("Failed to open file. {e}");
            std::process::exit(1);
        }
    };

    let bar = make_bar(reader.len());
    bar.set_message("cubes validated");
    bar.println(format!("Validating {path}"));

    let exit = |msg: &str| {
        bar.abandon();
        println!("{msg}");
        std::process::exit(1);
    };

    let mut seen = (!opts.no_uniqueness).then(HashSet::new);
    let mut total = 0u64;
    for sid in 0..reader.num_shapes() {
        let range = reader.cubes_by_shape(sid);
        for cube in range {
            total += 1;
            bar.inc(1);

            if cube.len() != reader.n() {
                exit(&format!(
                    "Error: Found a cube with {} cells, expected {}.",
                    cube.len(),
                    reader.n()
                ));
            }

            if !opts.no_canonical {
                if !cube.is_connected() {
                    exit("Error: Found a disconnected polycube.");
                }
                let (canon, dim) = canonical_form(cube.points());
                if canon != cube.points() || dim != range.shape() {
                    exit("Error: Found a non-canonical polycube.");
                }
            }

            if let Some(seen) = &mut seen {
                if !seen.insert(Cube::from_points(cube.points().to_vec())) {
                    exit("Error: Found non-unique polycubes.");
                }
            }
        }
    }

    bar.finish();
    println!("Success: {path}, containing {total} cubes, is valid");
}

fn info(path: &str) {
    let reader = match CacheReader::load(path) {
        Ok(reader) => reader,
        Err(e) => {
            println!("Failed to open file. {e}");
            std::process::exit(1);
        }
    };

    println!();
    println!("Info for {path}");
    println!("Cube size: {}", reader.n());
    println!("Amount of polycubes: {}", reader.len());
    println!("Shapes:");
    for sid in 0..reader.num_shapes() {
        let shape = reader.shape(sid).unwrap();
        println!(
            "  [{:2} {:2} {:2}] {}",
            shape.x,
            shape.y,
            shape.z,
            reader.shape_len(sid)
        );
    }
}

fn main() {
    let opts = Opts::parse();

    match opts {
        Opts::Enumerate(e) => {
            if let Err(err) = enumerate(&e) {
                eprintln!("Error: {err}");
                std::process::exit(1);
            }
        }
        Opts::Validate(v) => validate(&v),
        Opts::Info { path } => path.iter().map(String::as_str).for_each(info),
    }
}
