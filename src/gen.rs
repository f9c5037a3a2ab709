//! The inductive enumeration driver.
//!
//! Size N is produced from the size N-1 population one (target shape, seed
//! shape) job at a time: seeds stream out of a cache (mapped or in-memory),
//! workers pull chunks off a shared cursor, expand every seed by one cube
//! and insert the canonical forms into the shape store. All workers drain
//! before the next job launches; that barrier is the only ordering callers
//! may rely on.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use crate::cache::{
    cache_path, split_cache_path, CacheReader, CacheWriter, CubeSource, FlatCache, Seeds,
    ShapeRange,
};
use crate::cube::{Cube, Dim, Point, MAX_CUBES};
use crate::error::{Error, Result};
use crate::rotations::best_rotation;
use crate::store::ShapeStore;
use crate::{make_bar, results};

/// Seeds handed to a worker per cursor pull. Balances cursor contention
/// against tail imbalance; must stay at least 1.
const CHUNK_SIZE: usize = 500;

#[derive(Clone, Debug)]
pub struct GenOpts {
    /// Expansion workers per level. Zero behaves like one.
    pub threads: usize,
    /// Seed from `cubes_<n>.bin` files when they exist.
    pub use_cache: bool,
    /// Persist every generated size.
    pub write_cache: bool,
    /// Write one cache file per target shape and drop each bucket after it
    /// is persisted, capping peak memory.
    pub split_cache: bool,
    /// Stream seeds from per-shape cache files instead of holding the
    /// previous size in memory.
    pub use_split_cache: bool,
    /// Directory the cache files live in.
    pub base_dir: PathBuf,
}

impl Default for GenOpts {
    fn default() -> Self {
        GenOpts {
            threads: 1,
            use_cache: false,
            write_cache: false,
            split_cache: false,
            use_split_cache: false,
            base_dir: PathBuf::from("cache"),
        }
    }
}

/// Enumerate all polycubes of size `n`.
///
/// The returned seeds hold one canonical representative per rotation class,
/// grouped by bounding box shape. The total is checked against the known
/// results table before returning.
pub fn gen(n: usize, opts: &GenOpts) -> Result<Seeds> {
    if n == 0 || n > MAX_CUBES {
        return Err(Error::InvalidArgument(format!(
            "polycube size must be within 1..={MAX_CUBES}, got {n}"
        )));
    }
    if opts.write_cache {
        std::fs::create_dir_all(&opts.base_dir)?;
    }
    gen_level(n, opts)
}

fn gen_level(n: usize, opts: &GenOpts) -> Result<Seeds> {
    if n <= 2 {
        let mut store = ShapeStore::new();
        store.init(n);
        if n == 1 {
            store.insert(
                Cube::from_points(vec![Point::new(0, 0, 0)]),
                Dim::new(0, 0, 0),
            );
        } else {
            store.insert(
                Cube::from_points(vec![Point::new(0, 0, 0), Point::new(0, 0, 1)]),
                Dim::new(0, 0, 1),
            );
        }
        if opts.write_cache {
            CacheWriter::save(cache_path(&opts.base_dir, n), &store, n)?;
        }
        return Ok(Seeds::Flat(FlatCache::from_store(&store, n)));
    }

    // a finished run of this size can be streamed straight back
    if opts.use_cache && !opts.use_split_cache {
        match CacheReader::load(cache_path(&opts.base_dir, n)) {
            Ok(reader) if reader.n() == n => {
                println!("Found cache for N = {n}: {} cubes.", reader.len());
                return Ok(Seeds::Mapped(reader));
            }
            Ok(_) => {} // file advertises some other size, ignore it
            Err(e) if e.is_cache_miss() => {}
            Err(e) => return Err(e),
        }
    }

    let prev_shapes = ShapeStore::generate_shapes(n - 1);

    // seed source: per-shape split files when any exist, otherwise the
    // previous level held in memory or in a unified cache file
    let use_split = opts.use_split_cache
        && prev_shapes
            .iter()
            .any(|s| split_cache_path(&opts.base_dir, n - 1, *s).exists());
    let seeds = if use_split {
        None
    } else {
        let inner = GenOpts {
            split_cache: false,
            use_split_cache: false,
            ..opts.clone()
        };
        Some(gen_level(n - 1, &inner)?)
    };

    let mut store = ShapeStore::new();
    store.init(n);

    match &seeds {
        Some(seeds) => println!(
            "N = {n} || generating new cubes from {} base cubes.",
            seeds.len()
        ),
        None => println!("N = {n} || generating new cubes from split cache files."),
    }

    let start = Instant::now();
    let total = run_level(n, opts, &store, seeds.as_ref(), &prev_shapes)?;

    if opts.write_cache && !opts.split_cache {
        CacheWriter::save(cache_path(&opts.base_dir, n), &store, n)?;
    }

    println!(
        "N = {n} || {total} polycubes, took {:.2} s",
        start.elapsed().as_secs_f32()
    );
    results::check(n, total)?;

    Ok(Seeds::Flat(FlatCache::from_store(&store, n)))
}

/// One full pass over the target shapes of size `n`, on a worker pool that
/// lives for the whole level.
fn run_level(
    n: usize,
    opts: &GenOpts,
    store: &ShapeStore,
    seeds: Option<&Seeds>,
    prev_shapes: &[Dim],
) -> Result<u64> {
    let use_split = seeds.is_none();
    let targets: Vec<Dim> = store.shapes().map(|(shape, _)| *shape).collect();
    let bar = make_bar(targets.len() as u64);

    thread::scope(|scope| {
        let pool = if opts.threads > 1 {
            Some(WorkerPool::start(scope, opts.threads))
        } else {
            None
        };

        let mut total = 0u64;
        for target in targets {
            bar.set_message(format!("shape [{} {} {}]", target.x, target.y, target.z));

            for (sid, &seed_shape) in prev_shapes.iter().enumerate() {
                let diff_x = target.x as i32 - seed_shape.x as i32;
                let diff_y = target.y as i32 - seed_shape.y as i32;
                let diff_z = target.z as i32 - seed_shape.z as i32;
                if diff_x < 0 || diff_y < 0 || diff_z < 0 || diff_x + diff_y + diff_z > 1 {
                    continue;
                }
                let not_same_shape = diff_x + diff_y + diff_z == 1;

                // a seed shape with equal dimensions grows the same way
                // along either axis, so widen the expansion instead of
                // re-running it
                let mut expand = [diff_x == 1, diff_y == 1, diff_z == 1];
                if expand[2] && seed_shape.z == seed_shape.y {
                    expand[1] = true;
                }
                if expand[1] && seed_shape.y == seed_shape.x {
                    expand[0] = true;
                }

                let slot = if use_split {
                    let path = split_cache_path(&opts.base_dir, n - 1, seed_shape);
                    if !path.exists() {
                        // shapes that held no cubes are never written
                        continue;
                    }
                    // a file that exists but cannot be used would silently
                    // drop seeds, so it aborts the run instead of degrading
                    // to a miss
                    SeedSlot::Owned(CacheReader::load(path)?, sid)
                } else {
                    SeedSlot::Borrowed(seeds.unwrap(), sid)
                };

                let range = slot.range();
                if range.is_empty() {
                    continue;
                }
                if range.shape() != seed_shape {
                    let path = match &slot {
                        SeedSlot::Owned(reader, _) => reader.path().to_path_buf(),
                        SeedSlot::Borrowed(..) => cache_path(&opts.base_dir, n - 1),
                    };
                    return Err(Error::CacheCorrupt {
                        path,
                        reason: format!(
                            "shape entry {sid} is {:?}, expected {:?}",
                            range.shape(),
                            seed_shape
                        ),
                    });
                }
                let seed_count = range.len();

                let ws = Arc::new(Workset::new(
                    slot,
                    store,
                    seed_shape,
                    expand,
                    not_same_shape,
                    seed_count,
                ));
                ws.prefetch();
                match &pool {
                    Some(pool) => {
                        pool.launch(ws.clone());
                        pool.sync();
                    }
                    None => Worker { ws: ws.as_ref() }.run(),
                }
                ws.release();
            }

            let count = store.shape_len(target);
            total += count;
            if opts.write_cache && opts.split_cache {
                CacheWriter::save(split_cache_path(&opts.base_dir, n, target), store, n)?;
            }
            if opts.split_cache {
                store.clear_shape(target);
            }
            bar.inc(1);
        }
        bar.finish_and_clear();
        Ok(total)
    })
}

/// Where one job's seeds come from: a level-wide source, or a per-shape
/// split file owned by the job itself.
enum SeedSlot<'a> {
    Borrowed(&'a Seeds, usize),
    Owned(CacheReader, usize),
}

impl SeedSlot<'_> {
    fn range(&self) -> ShapeRange<'_> {
        match self {
            SeedSlot::Borrowed(seeds, sid) => seeds.cubes_by_shape(*sid),
            SeedSlot::Owned(reader, sid) => reader.cubes_by_shape(*sid),
        }
    }

    fn prefetch(&self) {
        match self {
            SeedSlot::Borrowed(seeds, sid) => seeds.prefetch(*sid),
            SeedSlot::Owned(reader, sid) => reader.prefetch(*sid),
        }
    }

    fn release(&self) {
        match self {
            SeedSlot::Borrowed(seeds, sid) => seeds.release(*sid),
            SeedSlot::Owned(reader, sid) => reader.release(*sid),
        }
    }
}

/// One (target, seed) expansion job: the immutable description plus a
/// mutex guarded cursor that deals out chunks of seeds.
struct Workset<'a> {
    slot: SeedSlot<'a>,
    store: &'a ShapeStore,
    shape: Dim,
    expand: [bool; 3],
    not_same_shape: bool,
    seed_count: usize,
    cursor: Mutex<usize>,
}

impl<'a> Workset<'a> {
    fn new(
        slot: SeedSlot<'a>,
        store: &'a ShapeStore,
        shape: Dim,
        expand: [bool; 3],
        not_same_shape: bool,
        seed_count: usize,
    ) -> Self {
        Workset {
            slot,
            store,
            shape,
            expand,
            not_same_shape,
            seed_count,
            cursor: Mutex::new(0),
        }
    }

    fn next_chunk(&self) -> Option<std::ops::Range<usize>> {
        let mut cursor = self.cursor.lock();
        if *cursor >= self.seed_count {
            return None;
        }
        let start = *cursor;
        *cursor = (start + CHUNK_SIZE).min(self.seed_count);
        Some(start..*cursor)
    }

    /// No chunks left to hand out. Workers may still be finishing theirs.
    fn exhausted(&self) -> bool {
        *self.cursor.lock() >= self.seed_count
    }

    fn prefetch(&self) {
        self.slot.prefetch();
    }

    fn release(&self) {
        self.slot.release();
    }
}

/// The per-level worker pool.
///
/// Workers sit idle on a condition variable until a job is assigned, drain
/// its cursor, and report back through a second condition variable. The
/// generator's `sync` blocks until the job's cursor is empty and every
/// worker has gone idle again; `launch` then hands over the next job.
/// Dropping the pool terminates the workers cooperatively.
struct WorkerPool<'a> {
    shared: Arc<PoolShared<'a>>,
}

struct PoolShared<'a> {
    state: Mutex<PoolState<'a>>,
    work_ready: Condvar,
    work_done: Condvar,
}

struct PoolState<'a> {
    job: Option<Arc<Workset<'a>>>,
    /// Bumped per launch so a worker never re-enters a job it already ran.
    epoch: u64,
    /// Workers currently inside a job.
    active: usize,
    terminate: bool,
}

impl<'a> WorkerPool<'a> {
    fn start<'scope, 'env>(scope: &'scope thread::Scope<'scope, 'env>, threads: usize) -> Self
    where
        'a: 'env,
    {
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                job: None,
                epoch: 0,
                active: 0,
                terminate: false,
            }),
            work_ready: Condvar::new(),
            work_done: Condvar::new(),
        });
        for _ in 0..threads {
            let shared = shared.clone();
            scope.spawn(move || worker_loop(&shared));
        }
        WorkerPool { shared }
    }

    fn launch(&self, job: Arc<Workset<'a>>) {
        let mut state = self.shared.state.lock();
        state.job = Some(job);
        state.epoch += 1;
        self.shared.work_ready.notify_all();
    }

    /// Wait until the launched job has fully completed: no chunks left and
    /// no worker still running. Workers that never woke up for the job are
    /// left waiting for the next one.
    fn sync(&self) {
        let mut state = self.shared.state.lock();
        loop {
            let exhausted = state.job.as_ref().map_or(true, |job| job.exhausted());
            if exhausted && state.active == 0 {
                state.job = None;
                return;
            }
            self.shared.work_done.wait(&mut state);
        }
    }
}

impl Drop for WorkerPool<'_> {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.terminate = true;
        drop(state);
        self.shared.work_ready.notify_all();
    }
}

fn worker_loop(shared: &PoolShared<'_>) {
    let mut seen_epoch = 0u64;
    loop {
        let job = {
            let mut state = shared.state.lock();
            loop {
                if state.terminate {
                    return;
                }
                if state.epoch != seen_epoch {
                    if let Some(job) = state.job.clone() {
                        seen_epoch = state.epoch;
                        state.active += 1;
                        break job;
                    }
                }
                shared.work_ready.wait(&mut state);
            }
        };

        Worker { ws: job.as_ref() }.run();

        let mut state = shared.state.lock();
        state.active -= 1;
        if state.active == 0 {
            shared.work_done.notify_all();
        }
    }
}

struct Worker<'w, 'a> {
    ws: &'w Workset<'a>,
}

impl Worker<'_, '_> {
    fn run(self) {
        let range = self.ws.slot.range();
        // scratch reused across every seed this worker processes
        let mut candidates = Vec::new();
        let mut grown = Vec::new();
        let mut rotated = Vec::new();
        let mut best = Vec::new();
        while let Some(chunk) = self.ws.next_chunk() {
            for i in chunk {
                let seed = range.get(i);
                self.expand(&seed, &mut candidates, &mut grown, &mut rotated, &mut best);
            }
        }
    }

    /// Grow `seed` by one cube in every admitted direction and insert the
    /// canonical form of each result.
    fn expand(
        &self,
        seed: &Cube<'_>,
        candidates: &mut Vec<Point>,
        grown: &mut Vec<Point>,
        rotated: &mut Vec<Point>,
        best: &mut Vec<Point>,
    ) {
        let shape = self.ws.shape;
        let points = seed.points();

        candidates.clear();
        if self.ws.not_same_shape {
            // grow off the faces of the expansion axes only
            for p in points {
                if self.ws.expand[0] {
                    if p.x == shape.x as i8 {
                        candidates.push(Point::new(p.x + 1, p.y, p.z));
                    }
                    if p.x == 0 {
                        candidates.push(Point::new(p.x - 1, p.y, p.z));
                    }
                }
                if self.ws.expand[1] {
                    if p.y == shape.y as i8 {
                        candidates.push(Point::new(p.x, p.y + 1, p.z));
                    }
                    if p.y == 0 {
                        candidates.push(Point::new(p.x, p.y - 1, p.z));
                    }
                }
                if self.ws.expand[2] {
                    if p.z == shape.z as i8 {
                        candidates.push(Point::new(p.x, p.y, p.z + 1));
                    }
                    if p.z == 0 {
                        candidates.push(Point::new(p.x, p.y, p.z - 1));
                    }
                }
            }
        } else {
            // moves that stay inside the shape box
            for p in points {
                if p.x < shape.x as i8 {
                    candidates.push(Point::new(p.x + 1, p.y, p.z));
                }
                if p.x > 0 {
                    candidates.push(Point::new(p.x - 1, p.y, p.z));
                }
                if p.y < shape.y as i8 {
                    candidates.push(Point::new(p.x, p.y + 1, p.z));
                }
                if p.y > 0 {
                    candidates.push(Point::new(p.x, p.y - 1, p.z));
                }
                if p.z < shape.z as i8 {
                    candidates.push(Point::new(p.x, p.y, p.z + 1));
                }
                if p.z > 0 {
                    candidates.push(Point::new(p.x, p.y, p.z - 1));
                }
            }
        }
        candidates.sort_unstable();
        candidates.dedup();
        // seed coordinates are sorted, so occupied cells binary-search out
        candidates.retain(|p| points.binary_search(p).is_err());

        for &e in candidates.iter() {
            let shift = Point::new((e.x < 0) as i8, (e.y < 0) as i8, (e.z < 0) as i8);

            grown.clear();
            let first = e + shift;
            grown.push(first);
            let mut max = first;
            for &p in points {
                let q = p + shift;
                max.x = max.x.max(q.x);
                max.y = max.y.max(q.y);
                max.z = max.z.max(q.z);
                grown.push(q);
            }
            let grown_shape = Dim::new(max.x as u8, max.y as u8, max.z as u8);

            let dim = best_rotation(grown, grown_shape, rotated, best);
            self.ws.store.insert(Cube::from_points(best.clone()), dim);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_seeds(n: usize, cubes: &[(&[Point], Dim)]) -> Seeds {
        let mut store = ShapeStore::new();
        store.init(n);
        for (points, shape) in cubes {
            store.insert(Cube::from_points(points.to_vec()), *shape);
        }
        Seeds::Flat(FlatCache::from_store(&store, n))
    }

    fn workset<'a>(
        seeds: &'a Seeds,
        store: &'a ShapeStore,
        shape: Dim,
        expand: [bool; 3],
        not_same_shape: bool,
    ) -> Workset<'a> {
        let slot = SeedSlot::Borrowed(seeds, 0);
        let count = slot.range().len();
        Workset::new(slot, store, shape, expand, not_same_shape, count)
    }

    #[test]
    fn chunks_cover_the_range_once() {
        let seeds = flat_seeds(1, &[(&[Point::new(0, 0, 0)], Dim::new(0, 0, 0))]);
        let mut store = ShapeStore::new();
        store.init(2);
        let ws = workset(&seeds, &store, Dim::new(0, 0, 0), [false, false, true], true);
        assert!(!ws.exhausted());
        assert_eq!(ws.next_chunk(), Some(0..1));
        assert!(ws.exhausted());
        assert_eq!(ws.next_chunk(), None);
        assert_eq!(ws.next_chunk(), None);
    }

    #[test]
    fn monocube_expands_to_one_domino() {
        let seeds = flat_seeds(1, &[(&[Point::new(0, 0, 0)], Dim::new(0, 0, 0))]);
        let mut store = ShapeStore::new();
        store.init(2);

        // growing along z off a cube with equal dimensions widens to all axes
        let ws = workset(&seeds, &store, Dim::new(0, 0, 0), [true, true, true], true);
        Worker { ws: &ws }.run();

        assert_eq!(store.len(), 1);
        assert_eq!(store.shape_len(Dim::new(0, 0, 1)), 1);
    }

    #[test]
    fn same_shape_job_stays_inside_the_box() {
        // the straight tromino cannot grow inside its own 1x1x3 box
        let line = [Point::new(0, 0, 0), Point::new(0, 0, 1), Point::new(0, 0, 2)];
        let seeds = flat_seeds(3, &[(&line, Dim::new(0, 0, 2))]);
        let mut store = ShapeStore::new();
        store.init(4);

        let ws = workset(
            &seeds,
            &store,
            Dim::new(0, 0, 2),
            [false, false, false],
            false,
        );
        Worker { ws: &ws }.run();
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn pool_runs_jobs_and_terminates() {
        let seeds = flat_seeds(1, &[(&[Point::new(0, 0, 0)], Dim::new(0, 0, 0))]);
        let mut store = ShapeStore::new();
        store.init(2);

        thread::scope(|scope| {
            let pool = WorkerPool::start(scope, 4);
            let ws = Arc::new(workset(
                &seeds,
                &store,
                Dim::new(0, 0, 0),
                [true, true, true],
                true,
            ));
            pool.launch(ws.clone());
            pool.sync();
            assert!(ws.exhausted());

            // a second sync with no job pending returns immediately
            pool.sync();
        });

        assert_eq!(store.len(), 1);
    }

    #[test]
    fn parallel_and_serial_runs_agree() {
        let serial = gen(6, &GenOpts::default()).unwrap();

        let parallel = gen(
            6,
            &GenOpts {
                threads: 4,
                ..GenOpts::default()
            },
        )
        .unwrap();

        assert_eq!(serial.len(), parallel.len());
        assert_eq!(serial.num_shapes(), parallel.num_shapes());
        for sid in 0..serial.num_shapes() {
            let a: hashbrown::HashSet<_> = serial
                .cubes_by_shape(sid)
                .iter()
                .map(Cube::into_owned)
                .collect();
            let b: hashbrown::HashSet<_> = parallel
                .cubes_by_shape(sid)
                .iter()
                .map(Cube::into_owned)
                .collect();
            assert_eq!(a, b);
        }
    }
}
