use clap::{Parser, Subcommand};
use ledgerfs::config::Config;
use ledgerfs::service::IntegrityService;
use ledgerfs::store::{DiskStore, Retry};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "ledgerfs",
    version,
    about = "Tamper-evident file integrity ledger over a content-addressable chunk store"
)]
struct Cli {
    /// Configuration file (JSON); flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ledger file path (default: ledger.json)
    #[arg(long)]
    ledger: Option<PathBuf>,

    /// Content store directory (default: ./chunks)
    #[arg(long, default_value = "chunks")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the whole chain: hashes, linkage, proof-of-work
    VerifyChain,
    /// Verify one file chunk by chunk against the ledger and the store
    VerifyFile { name: String },
    /// List recorded files with size and chunk counts
    Ls,
    /// Show chain summary
    Info,
    /// Dump every block in the chain
    Show,
    /// Record a local file's contents in the ledger
    Write {
        /// Name to record the file under
        name: String,
        /// Local path to read the bytes from
        path: PathBuf,
    },
    /// Reconstruct a file and write it to stdout
    Cat {
        name: String,
        /// Byte offset to start from
        #[arg(long, default_value = "0")]
        offset: u64,
        /// Bytes to read (default: to end of file)
        #[arg(long)]
        size: Option<usize>,
    },
}

type Service = IntegrityService<Retry<DiskStore>>;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    let service = match open_service(&cli) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match &cli.command {
        Commands::VerifyChain => cmd_verify_chain(&service),
        Commands::VerifyFile { name } => cmd_verify_file(&service, name),
        Commands::Ls => cmd_ls(&service),
        Commands::Info => cmd_info(&service),
        Commands::Show => cmd_show(&service),
        Commands::Write { name, path } => cmd_write(&service, name, path),
        Commands::Cat { name, offset, size } => cmd_cat(&service, name, *offset, *size),
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn open_service(cli: &Cli) -> Result<Service, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(ledger) = &cli.ledger {
        config.ledger_path = ledger.clone();
    }

    let store = Retry::new(
        DiskStore::open(&cli.store)?,
        config.store_retries,
        Duration::from_millis(config.store_retry_delay_ms),
    );
    Ok(IntegrityService::new(config, store)?)
}

fn cmd_verify_chain(service: &Service) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = service.verify_chain();
    println!("{}", outcome);
    if !outcome.is_valid() {
        std::process::exit(1);
    }
    let info = service.chain_info();
    println!("{} block(s), latest hash {}", info.total_blocks, info.latest_hash.unwrap_or_default());
    Ok(())
}

fn cmd_verify_file(service: &Service, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let report = service.verify_file(name)?;
    if !report.tampered.is_empty() {
        println!("tampered block(s): {:?}", report.tampered);
    }
    println!(
        "{}: {}/{} chunk(s) verified",
        report.filename, report.verified_chunks, report.total_chunks
    );
    if !report.is_ok() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_ls(service: &Service) -> Result<(), Box<dyn std::error::Error>> {
    let files = service.list_files();
    if files.is_empty() {
        println!("(no files recorded)");
    }
    for f in files {
        println!("{}  {} bytes, {} chunk(s)", f.name, f.size, f.chunks);
    }
    Ok(())
}

fn cmd_info(service: &Service) -> Result<(), Box<dyn std::error::Error>> {
    print!("{}", service.chain_info());
    if !service.store_available() {
        println!("Store:  unreachable");
    }
    Ok(())
}

fn cmd_show(service: &Service) -> Result<(), Box<dyn std::error::Error>> {
    for block in service.blocks() {
        println!("Block {}:", block.index);
        println!("  timestamp:  {}", block.timestamp);
        println!("  filename:   {}", block.filename);
        println!("  chunk size: {}", block.chunk_size);
        println!("  chunk hash: {}", block.chunk_hash);
        println!("  address:    {}", block.content_address);
        println!("  previous:   {}", block.previous_hash);
        println!("  nonce:      {}", block.nonce);
        println!("  hash:       {}", block.hash);
    }
    Ok(())
}

fn cmd_write(service: &Service, name: &str, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read(path)?;
    let receipt = service.write_file(name, &data)?;
    println!(
        "recorded '{}': {} bytes in {} chunk(s)",
        receipt.filename, receipt.bytes, receipt.chunks
    );
    Ok(())
}

fn cmd_cat(
    service: &Service,
    name: &str,
    offset: u64,
    size: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let size = match size {
        Some(n) => n,
        None => service
            .stat(name)
            .map(|s| s.size as usize)
            .unwrap_or(usize::MAX),
    };
    let data = service.read_file(name, offset, size)?;
    std::io::stdout().write_all(&data)?;
    Ok(())
}
