//! Binary entry point for the cowtxn page inspector.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use cowtxn::{
    primitives::{
        alloc::HeapAllocator,
        store::{FileStore, PageStore},
    },
    txn::{format_metadata_page, index_in_group, Transaction, TxnFlags},
    types::{
        page::{span_count, PageFlags, PAGES_IN_METADATA, PAGE_SIZE},
        PageId,
    },
    TxnOptions,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "cowtxn-inspect",
    version,
    about = "Inspect and patch page files through copy-on-write transactions",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "COWTXN_CONFIG",
        help = "TOML file with transaction options"
    )]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a page file with formatted metadata pages
    Init {
        #[arg(value_name = "DB")]
        db_path: PathBuf,
        #[arg(long, default_value_t = 1, help = "Number of page groups to lay out")]
        groups: u64,
    },
    /// Show the metadata record describing a page
    Meta {
        #[arg(value_name = "DB")]
        db_path: PathBuf,
        page: u64,
    },
    /// Print the leading bytes of a page in hex
    Dump {
        #[arg(value_name = "DB")]
        db_path: PathBuf,
        page: u64,
        #[arg(long, default_value_t = 64, help = "Number of bytes to print")]
        bytes: usize,
    },
    /// Patch a page inside a transaction and commit it
    Write {
        #[arg(value_name = "DB")]
        db_path: PathBuf,
        page: u64,
        #[arg(long, default_value_t = 0, help = "Byte offset of the patch")]
        offset: usize,
        #[arg(long, help = "Patch contents as hex")]
        hex: String,
        #[arg(long, help = "Record the page as heading a record of this many bytes")]
        record_size: Option<u32>,
    },
}

fn main() {
    init_tracing();
    if let Err(err) = run(Cli::parse()) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let options = load_options(cli.config.as_deref())?;

    match cli.command {
        Command::Init { db_path, groups } => {
            if groups == 0 {
                return Err("--groups must be at least 1".into());
            }
            let store = FileStore::open(&db_path)?;
            let mut meta = vec![0u8; PAGE_SIZE];
            format_metadata_page(&mut meta)?;
            let blank = vec![0u8; PAGE_SIZE];
            for group in 0..groups {
                let leader = group * PAGES_IN_METADATA;
                store.put(PageId(leader), &meta)?;
                store.put(PageId(leader + PAGES_IN_METADATA - 1), &blank)?;
            }
            store.sync()?;
            println!(
                "Initialized {} with {} group(s), {} pages",
                db_path.display(),
                groups,
                store.page_count()?
            );
        }
        Command::Meta { db_path, page } => {
            let tx = open_txn(&db_path, TxnFlags::READ, &options)?;
            let id = PageId(page);
            let record = tx.get_metadata_record(id)?;
            let flags = match record.flags() {
                Ok(flags) => format!("{flags:?}"),
                Err(_) => format!("unknown ({:#04x})", record.raw_flags()),
            };
            println!("Metadata for page {id}");
            print_field("metadata page", record.metadata_page());
            print_field("record index", index_in_group(id));
            print_field("flags", flags);
            print_field("overflow size", record.overflow_size());
            print_field("pages spanned", span_count(record.overflow_size()));
        }
        Command::Dump {
            db_path,
            page,
            bytes,
        } => {
            let tx = open_txn(&db_path, TxnFlags::READ, &options)?;
            let page = tx.get(PageId(page))?;
            let data = page.data();
            let shown = bytes.min(data.len());
            println!("Page {}", page.id);
            print_field("overflow size", page.overflow_size);
            print_field("image bytes", data.len());
            for (line, chunk) in data[..shown].chunks(32).enumerate() {
                println!("{:08x}  {}", line * 32, hex::encode(chunk));
            }
        }
        Command::Write {
            db_path,
            page,
            offset,
            hex: patch,
            record_size,
        } => {
            let patch = hex::decode(patch.trim())?;
            let store = Arc::new(FileStore::open(&db_path)?);
            let mut tx = Transaction::with_options(
                store.clone(),
                Arc::new(HeapAllocator),
                TxnFlags::READ_WRITE,
                options,
            )?;
            let id = PageId(page);
            if let Some(size) = record_size {
                let mut record = tx.modify_metadata_record(id)?;
                let flags = if span_count(size) > 1 {
                    PageFlags::OverflowFirst
                } else {
                    PageFlags::Single
                };
                record.set_flags(flags);
                record.set_overflow_size(size);
            }
            {
                let mut target = tx.modify_page(id)?;
                let data = target.data_mut();
                let end = offset
                    .checked_add(patch.len())
                    .filter(|&end| end <= data.len())
                    .ok_or_else(|| {
                        format!(
                            "patch of {} bytes at offset {} exceeds the {}-byte copy",
                            patch.len(),
                            offset,
                            data.len()
                        )
                    })?;
                data[offset..end].copy_from_slice(&patch);
            }
            let tracked = tx.tracked_pages();
            tx.commit()?;
            store.sync()?;
            tx.close()?;
            println!(
                "Wrote {} bytes to page {} ({} page(s) committed)",
                patch.len(),
                id,
                tracked
            );
        }
    }

    Ok(())
}

fn load_options(path: Option<&Path>) -> Result<TxnOptions, Box<dyn Error>> {
    match path {
        Some(path) => {
            let src = std::fs::read_to_string(path)?;
            Ok(TxnOptions::from_toml_str(&src)?)
        }
        None => Ok(TxnOptions::default()),
    }
}

fn open_txn(
    db_path: &Path,
    flags: TxnFlags,
    options: &TxnOptions,
) -> Result<Transaction, Box<dyn Error>> {
    if !db_path.exists() {
        return Err(format!("{} does not exist", db_path.display()).into());
    }
    let store = Arc::new(FileStore::open(db_path)?);
    Ok(Transaction::with_options(
        store,
        Arc::new(HeapAllocator),
        flags,
        options.clone(),
    )?)
}

fn print_field(name: &str, value: impl std::fmt::Display) {
    println!("  {:.<24} {}", name, value);
}
