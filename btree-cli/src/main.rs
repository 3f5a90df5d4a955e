//! Command-line harness for building a B+-tree index over a fixed-width
//! relation dump and running range scans against it.

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{bail, Context};
use bptree_index::{BPlusTree, BufferPool, CompareOp, FixedWidthRelation, IndexKey, KeyType};
use clap::{Parser, Subcommand, ValueEnum};
use paged_file::PagedFile;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "btree-cli")]
#[command(about = "Build and query a disk-resident B+-tree index", long_about = None)]
struct Cli {
    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an index over a relation's fixed-width records
    Build {
        /// Path to the relation file (a flat sequence of fixed-width records)
        relation: PathBuf,

        /// Byte offset of the indexed attribute within each record
        attr_byte_offset: i32,

        /// Type of the indexed attribute
        #[arg(value_enum)]
        key_type: KeyTypeArg,

        /// Size in bytes of one record
        record_size: usize,

        /// Number of records packed per logical page for row ids
        #[arg(long, default_value_t = 64)]
        records_per_page: u16,

        /// Number of frames in the buffer pool
        #[arg(long, default_value_t = 64)]
        pool_size: usize,
    },

    /// Run a range scan against a previously built index
    Scan {
        /// Path to the relation file the index was built over
        relation: PathBuf,

        /// Byte offset of the indexed attribute (selects the index file)
        attr_byte_offset: i32,

        /// Type of the indexed attribute
        #[arg(value_enum)]
        key_type: KeyTypeArg,

        /// Inclusive/exclusive lower bound
        low: f64,
        #[arg(value_enum)]
        low_op: CompareOpArg,

        /// Inclusive/exclusive upper bound
        high: f64,
        #[arg(value_enum)]
        high_op: CompareOpArg,

        /// Number of frames in the buffer pool
        #[arg(long, default_value_t = 64)]
        pool_size: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KeyTypeArg {
    Integer,
    Double,
}

impl From<KeyTypeArg> for KeyType {
    fn from(v: KeyTypeArg) -> Self {
        match v {
            KeyTypeArg::Integer => KeyType::Integer,
            KeyTypeArg::Double => KeyType::Double,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CompareOpArg {
    Gt,
    Gte,
    Lt,
    Lte,
}

impl From<CompareOpArg> for CompareOp {
    fn from(v: CompareOpArg) -> Self {
        match v {
            CompareOpArg::Gt => CompareOp::Gt,
            CompareOpArg::Gte => CompareOp::Gte,
            CompareOpArg::Lt => CompareOp::Lt,
            CompareOpArg::Lte => CompareOp::Lte,
        }
    }
}

/// The relation's basename, used both as the stored `relation_name` (which
/// must fit the meta page's fixed-width field) and as the stem the index
/// file name is derived from.
fn relation_basename(relation: &PathBuf) -> String {
    relation
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "relation".to_string())
}

/// Derives the on-disk index file path from the relation it indexes and
/// the byte offset of the indexed attribute.
fn index_path(relation: &PathBuf, attr_byte_offset: i32) -> PathBuf {
    let name = BPlusTree::<BufferPool>::index_file_name(&relation_basename(relation), attr_byte_offset);
    relation.with_file_name(name)
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn key_from_f64(value: f64, key_type: KeyType) -> IndexKey {
    match key_type {
        KeyType::Integer => IndexKey::Integer(value as i32),
        KeyType::Double => IndexKey::Double(value),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Build {
            relation,
            attr_byte_offset,
            key_type,
            record_size,
            records_per_page,
            pool_size,
        } => {
            let key_type: KeyType = key_type.into();
            let idx_path = index_path(&relation, attr_byte_offset);
            if PagedFile::file_exists(&idx_path) {
                bail!("index file {} already exists", idx_path.display());
            }

            let mut scanner = FixedWidthRelation::open(&relation, record_size, records_per_page)
                .with_context(|| format!("opening relation {}", relation.display()))?;

            let pf = Rc::new(
                PagedFile::open_or_create(&idx_path)
                    .with_context(|| format!("creating index file {}", idx_path.display()))?,
            );
            let bpm = BufferPool::new(pool_size, pf);
            let relation_name = relation_basename(&relation);
            let _tree = BPlusTree::create_or_open(bpm, attr_byte_offset, key_type, &relation_name, false, &mut scanner)
                .context("building index")?;

            println!("built index {}", idx_path.display());
            Ok(())
        }

        Commands::Scan {
            relation,
            attr_byte_offset,
            key_type,
            low,
            low_op,
            high,
            high_op,
            pool_size,
        } => {
            let key_type: KeyType = key_type.into();
            let idx_path = index_path(&relation, attr_byte_offset);
            if !PagedFile::file_exists(&idx_path) {
                bail!("index file {} does not exist; run `build` first", idx_path.display());
            }

            let pf = Rc::new(
                PagedFile::open_or_create(&idx_path)
                    .with_context(|| format!("opening index file {}", idx_path.display()))?,
            );
            let bpm = BufferPool::new(pool_size, pf);
            let relation_name = relation_basename(&relation);
            let mut tree =
                BPlusTree::open(bpm, attr_byte_offset, key_type, &relation_name).context("opening index")?;

            tree.start_scan(
                key_from_f64(low, key_type),
                low_op.into(),
                key_from_f64(high, key_type),
                high_op.into(),
            )
            .context("starting scan")?;

            let mut count = 0usize;
            loop {
                match tree.scan_next() {
                    Ok(rid) => {
                        println!("{}\t{}", rid.page_id, rid.slot_index);
                        count += 1;
                    }
                    Err(bptree_index::IndexError::IndexScanCompleted) => break,
                    Err(e) => return Err(e.into()),
                }
            }
            tree.end_scan().context("ending scan")?;
            eprintln!("{count} row ids");
            Ok(())
        }
    }
}
