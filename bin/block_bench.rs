use procfs::CpuInfo;
use rand::distributions::Uniform;
use rand::{Rng, RngCore};
use rayon::prelude::*;
use rowlite::column_map::{ColumnDesc, ColumnMap};
use rowlite::iterator::{IteratorOptions, QueryRange, RowIterator, ScanRange};
use rowlite::macro_block::{Compression, MacroBlockOptions, MacroBlockReader, MacroBlockWriter};
use rowlite::row_cache::{RowCache, RowCacheConfig};
use rowlite::types::{ColumnType, Datum, RowKey, StoreRow};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

#[cfg(feature = "use_jemalloc")]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

const NUM_ROWS: i64 = 1000000;
const KEY_SIZE: usize = std::mem::size_of::<i64>();
const VALUE_SIZE: usize = 100;
const RAW_SIZE: f64 = ((KEY_SIZE + VALUE_SIZE) * NUM_ROWS as usize) as f64 / 1024f64 / 1024f64;
const TABLE_ID: u64 = 1;

fn print_environment() {
    println!("RowLite: version {}", env!("CARGO_PKG_VERSION"));

    let datetime = chrono::Utc::now();
    println!("Date: {:?}", datetime.naive_utc());

    let cpu_info = CpuInfo::new().unwrap();
    println!(
        "CPU: {} * {}",
        cpu_info.cpus.len(),
        cpu_info.fields.get("model name").unwrap()
    );
    println!("CPU Cache: {}", cpu_info.fields.get("cache size").unwrap());
}

fn print_arguments() {
    println!("Keys: {} bytes each", KEY_SIZE);
    println!("Values: {} bytes each", VALUE_SIZE);
    println!("Rows: {}", NUM_ROWS);
    println!("RawSize: {} MB (estimated)", RAW_SIZE);
}

#[cfg(feature = "use_jemalloc")]
fn print_memory() {
    jemalloc_ctl::epoch::advance().unwrap();
    let allocated = jemalloc_ctl::stats::allocated::read().unwrap();
    let resident = jemalloc_ctl::stats::resident::read().unwrap();
    println!(
        "jemalloc: {} MB allocated, {} MB resident",
        allocated / 1024 / 1024,
        resident / 1024 / 1024
    );
}

#[cfg(not(feature = "use_jemalloc"))]
fn print_memory() {}

fn column_map() -> ColumnMap {
    ColumnMap::full(
        1,
        1,
        vec![
            ColumnDesc::new(16, ColumnType::Int),
            ColumnDesc::new(17, ColumnType::Blob),
        ],
    )
    .unwrap()
}

fn key(k: i64) -> RowKey<'static> {
    RowKey::new(vec![Datum::Int(k)])
}

struct BenchMark {
    temp_dir: TempDir,
    column_map: ColumnMap,
    compression: Compression,
}

impl BenchMark {
    fn new(compression: Compression) -> BenchMark {
        BenchMark {
            temp_dir: tempfile::Builder::new()
                .prefix("block_bench")
                .tempdir()
                .unwrap(),
            column_map: column_map(),
            compression,
        }
    }

    fn path(&self) -> PathBuf {
        self.temp_dir.path().join("bench.mb")
    }

    fn fill_seq(&self) {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.path())
            .unwrap();
        let mut writer = MacroBlockWriter::new(
            file,
            &self.column_map,
            MacroBlockOptions {
                compression: self.compression,
                ..MacroBlockOptions::default()
            },
        )
        .unwrap();

        let mut random = rand::thread_rng();
        let start = std::time::Instant::now();
        for i in 0..NUM_ROWS {
            let mut value = vec![0u8; VALUE_SIZE];
            random.fill_bytes(&mut value[..VALUE_SIZE / 2]);
            let row = StoreRow::from_cells(vec![Datum::Int(i * 2), Datum::from(value)]);
            writer.append_row(&row).unwrap();
        }
        let meta = writer.finish().unwrap();
        let elapsed = start.elapsed().as_secs_f64();
        let file_size = fs_extra::dir::get_size(self.temp_dir.path()).unwrap();
        println!(
            "fill_seq: {:?} MB/s | {} micro blocks | file size: {}",
            RAW_SIZE / elapsed,
            meta.block_count,
            file_size
        );
    }

    fn read_seq(&self, reader: &MacroBlockReader) {
        let mut iter = RowIterator::new(reader, &self.column_map, TABLE_ID);
        let start = std::time::Instant::now();
        iter.open(QueryRange::Scan(ScanRange::whole())).unwrap();
        let mut rows = 0;
        while iter.get_next_row().unwrap().is_some() {
            rows += 1;
        }
        let elapsed = start.elapsed().as_secs_f64();
        println!(
            "read_seq: {:?} MB/s ({} rows, {} blocks)",
            RAW_SIZE / elapsed,
            rows,
            iter.stats().blocks_read
        );
    }

    fn read_random(&self, reader: &MacroBlockReader, cache: Option<Arc<RowCache>>) {
        let mut random = rand::thread_rng().sample_iter(Uniform::new(0, NUM_ROWS * 2));
        let mut iter = RowIterator::new(reader, &self.column_map, TABLE_ID);
        if let Some(cache) = &cache {
            iter = iter.with_cache(cache.clone());
        }
        let num_reads = NUM_ROWS / 10;
        let mut found = 0;
        let start = std::time::Instant::now();
        for _ in 0..num_reads {
            iter.open(QueryRange::Get(key(random.next().unwrap())))
                .unwrap();
            if iter.get_next_row().is_ok() {
                found += 1;
            }
            iter.reset();
        }
        let elapsed = start.elapsed().as_secs_f64();
        let stats = iter.stats();
        println!(
            "read_random{}: {:?} reads per second ({} of {} found, {} hits, {} blocks)",
            if cache.is_some() { "_cached" } else { "" },
            num_reads as f64 / elapsed,
            found,
            num_reads,
            stats.cache_hits,
            stats.blocks_read
        );
    }

    fn read_random_parallel(&self, reader: &MacroBlockReader, cache: Arc<RowCache>) {
        let num_reads = NUM_ROWS / 10;
        let start = std::time::Instant::now();
        let found: usize = (0..num_reads)
            .into_par_iter()
            .map_init(
                || {
                    RowIterator::new(reader, &self.column_map, TABLE_ID)
                        .with_cache(cache.clone())
                        .with_options(IteratorOptions {
                            prefetch_depth: 1,
                            ..IteratorOptions::default()
                        })
                },
                |iter, _| {
                    let k = rand::thread_rng().gen_range(0..NUM_ROWS) * 2;
                    iter.open(QueryRange::Get(key(k))).unwrap();
                    let hit = iter.get_next_row().map_or(0, |_| 1);
                    iter.reset();
                    hit
                },
            )
            .sum();
        let elapsed = start.elapsed().as_secs_f64();
        println!(
            "read_random_parallel: {:?} reads per second ({} threads, {} of {} found)",
            num_reads as f64 / elapsed,
            rayon::current_num_threads(),
            found,
            num_reads
        );
    }

    fn run(&self) {
        println!("-------------------------------------------------");
        println!("Compression: {:?}", self.compression);
        self.fill_seq();
        let reader = MacroBlockReader::open(self.path()).unwrap();
        self.read_seq(&reader);
        self.read_random(&reader, None);

        let cache = Arc::new(RowCache::new());
        cache.init(RowCacheConfig::default()).unwrap();
        self.read_random(&reader, Some(cache.clone()));
        self.read_random_parallel(&reader, cache.clone());
        let stats = cache.stats().unwrap();
        println!(
            "row cache: {} entries, {} bytes, {} hits, {} misses, {} evictions",
            stats.entries, stats.resident_bytes, stats.hits, stats.misses, stats.evictions
        );
        print_memory();
        cache.destroy().unwrap();
    }
}

fn main() {
    print_environment();
    print_arguments();
    if cfg!(feature = "use_jemalloc") {
        println!("Use jemalloc");
    } else {
        println!("Use system default memory allocator");
    }

    BenchMark::new(Compression::None).run();
    BenchMark::new(Compression::Snappy).run();
}
