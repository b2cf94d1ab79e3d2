use banner_scanner::classify::{banner_suggestions, find_banners, BannerCatalog, RedirectResolver, StaticRedirects};
use banner_scanner::config::RaterConfig;
use banner_scanner::dump::open_dump;
use banner_scanner::error::Result;
use banner_scanner::parallel::{process_channel_pipeline, process_sequential, CensusContext, ParallelConfig, Stats};
use banner_scanner::{parse_all, patch};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Processing strategy for the dump census
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    /// Sequential processing (baseline)
    Sequential,
    /// Channel-based pipeline processing
    ChannelPipeline,
}

#[derive(Parser)]
#[command(name = "banner-scanner")]
#[command(about = "Parse talk-page wikitext, find WikiProject banners and patch them back in")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Wiki configuration (.yaml, .yml or .json); English Wikipedia defaults otherwise
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging on stderr (otherwise RUST_LOG, default warn)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Print every template on a page as JSON lines
    Parse {
        /// Wikitext file
        file: PathBuf,

        /// Also parse templates nested in parameter values
        #[arg(long)]
        recursive: bool,
    },

    /// Print the banners on a talk page as JSON
    Banners {
        /// Wikitext file
        file: PathBuf,

        /// Banner catalog (.yaml, .yml or .json)
        #[arg(long)]
        catalog: PathBuf,

        /// Known template redirects, title to target
        #[arg(long)]
        redirects: Option<PathBuf>,
    },

    /// List the catalog as banner picker entries, one JSON line each
    Suggest {
        /// Banner catalog (.yaml, .yml or .json)
        catalog: PathBuf,
    },

    /// Merge a banner block into a page and print the result
    Apply {
        /// Wikitext file of the talk page
        page: PathBuf,

        /// File holding the new banner block
        block: PathBuf,

        /// Name of a banner currently on the page (repeatable)
        #[arg(long = "existing")]
        existing: Vec<String>,
    },

    /// Scan a dump and write one JSON line per talk page
    Census {
        /// Input XML file (.xml or .xml.bz2)
        input: PathBuf,

        /// Output JSONL file
        output: PathBuf,

        /// Banner catalog (.yaml, .yml or .json)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Known template redirects, title to target
        #[arg(long)]
        redirects: Option<PathBuf>,

        /// Talk namespace to include (repeatable; 0 keeps every talk namespace)
        #[arg(long = "namespace", default_values_t = [1])]
        namespaces: Vec<i64>,

        /// Processing strategy
        #[arg(short, long, value_enum, default_value_t = Strategy::ChannelPipeline)]
        strategy: Strategy,

        /// Number of threads (4 = default, 0 = auto-detect)
        #[arg(short, long, default_value_t = 4)]
        threads: usize,

        /// Channel buffer size for channel-pipeline strategy
        #[arg(long, default_value_t = 10000)]
        channel_buffer: usize,

        /// Limit number of pages to scan (for testing with raw dumps)
        #[arg(long)]
        page_limit: Option<usize>,

        /// Quiet mode - minimal output
        #[arg(short, long)]
        quiet: bool,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<RaterConfig> {
    match path {
        Some(path) => RaterConfig::from_path(path),
        None => Ok(RaterConfig::default()),
    }
}

fn load_redirects(path: Option<&Path>, config: &RaterConfig) -> Result<Option<StaticRedirects>> {
    path.map(|path| StaticRedirects::from_path(path, config)).transpose()
}

fn print_stats(stats: &Stats, strategy_name: &str) {
    println!();
    println!("============================================================");
    println!("Strategy: {}", strategy_name);
    println!("Pages processed: {}", stats.pages_processed);
    println!("Talk pages written: {}", stats.talk_pages);
    println!("Pages with banners: {}", stats.pages_with_banners);
    println!("Pages with a shell: {}", stats.pages_with_shell);
    println!("Banners found: {}", stats.banners_found);
    println!(
        "Avg banners/page: {:.2}",
        stats.banners_found as f64 / stats.pages_with_banners.max(1) as f64
    );
    println!("------------------------------------------------------------");
    println!("Other namespaces: {}", stats.non_talk);
    println!("Redirects: {}", stats.redirects);
    println!("Skipped: {}", stats.skipped);
    println!("Time: {}m {}s", stats.elapsed.as_secs() / 60, stats.elapsed.as_secs() % 60);
    println!("Rate: {:.0} pages/sec", stats.pages_processed as f64 / stats.elapsed.as_secs_f64());
    println!("============================================================");
}

fn run(args: Args) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match args.command {
        Command::Parse { file, recursive } => {
            let text = fs::read_to_string(&file)?;
            for template in parse_all(&text, recursive) {
                serde_json::to_writer(&mut out, &template)?;
                writeln!(out)?;
            }
        }

        Command::Banners {
            file,
            catalog,
            redirects,
        } => {
            let text = fs::read_to_string(&file)?;
            let catalog = BannerCatalog::from_path(&catalog)?;
            let redirects = load_redirects(redirects.as_deref(), &config)?;
            let resolver = redirects.as_ref().map(|r| r as &dyn RedirectResolver);
            let banners = find_banners(&text, &catalog, resolver, &config);
            serde_json::to_writer_pretty(&mut out, &banners)?;
            writeln!(out)?;
        }

        Command::Suggest { catalog } => {
            let catalog = BannerCatalog::from_path(&catalog)?;
            for suggestion in banner_suggestions(&catalog, &config) {
                serde_json::to_writer(&mut out, &suggestion)?;
                writeln!(out)?;
            }
        }

        Command::Apply { page, block, existing } => {
            let page = fs::read_to_string(&page)?;
            let block = fs::read_to_string(&block)?;
            let patched = patch::apply(&page, &block, &existing, &config);
            if patched == page {
                tracing::info!("page unchanged");
            }
            write!(out, "{}", patched)?;
        }

        Command::Census {
            input,
            output,
            catalog,
            redirects,
            namespaces,
            strategy,
            threads,
            channel_buffer,
            page_limit,
            quiet,
        } => {
            let catalog = match catalog {
                Some(path) => BannerCatalog::from_path(&path)?,
                None => BannerCatalog::default(),
            };
            let redirects = load_redirects(redirects.as_deref(), &config)?;
            let context = CensusContext {
                redirects,
                namespaces: namespaces.into_iter().filter(|&ns| ns != 0).collect(),
                ..CensusContext::new(config, catalog)
            };

            let mut parallel = ParallelConfig::default();
            if threads > 0 {
                parallel.num_workers = threads.saturating_sub(1).max(1);
            }
            parallel.channel_buffer = channel_buffer;

            if !quiet {
                println!("Scanning: {}", input.display());
                println!("Output: {}", output.display());
                println!("Strategy: {:?}", strategy);
                if strategy != Strategy::Sequential {
                    println!("Workers: {}", parallel.num_workers);
                }
                if let Some(limit) = page_limit {
                    println!("Page limit: {}", limit);
                }
                println!();
            }

            let reader = open_dump(&input)?;
            let file = File::create(&output)?;
            let stats = match strategy {
                Strategy::Sequential => {
                    let mut writer = BufWriter::with_capacity(256 * 1024, file);
                    process_sequential(reader, &mut writer, &context, page_limit, quiet)?
                }
                Strategy::ChannelPipeline => {
                    process_channel_pipeline(reader, file, Arc::new(context), &parallel, page_limit)?
                }
            };

            if !quiet {
                print_stats(&stats, &format!("{:?}", strategy));
            }
        }
    }

    out.flush()?;
    Ok(())
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(err) = run(args) {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}
