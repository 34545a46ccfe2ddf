use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use kyujin_client::{ChromeConfig, ChromeLauncher, SourceExtractors};
use kyujin_core::industry::Industry;
use kyujin_core::models::{CrawlRun, ListingFilter, ListingStats, TOP_PREFECTURES};
use kyujin_core::orchestrator::{CrawlOrchestrator, CrawlRequest, CrawlScope};
use kyujin_core::region::{prefectures_by_region, regions};
use kyujin_core::reporter::TracingCrawlReporter;
use kyujin_core::schedule::{DEFAULT_SCHEDULE_FILE, Schedule, ScheduleFile, Scheduler};
use kyujin_core::source::{ListingSource, SearchQuery};
use kyujin_core::traits::{ListingStore, NullStore};
use kyujin_core::traversal::{TraversalConfig, TraversalController};
use kyujin_core::wage::PayPeriod;
use kyujin_db::{Database, DatabaseConfig, ListingRepository};

#[derive(Parser)]
#[command(name = "kyujin", version, about = "Job listing crawler for Japanese job boards")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl one search on a listing source
    Crawl {
        /// Listing source: hellowork or indeed
        #[arg(short, long, default_value = "hellowork")]
        source: ListingSource,

        /// Prefecture (hellowork) or free-text location (indeed)
        #[arg(short, long)]
        area: Option<String>,

        /// Free-text keyword
        #[arg(short, long)]
        keyword: Option<String>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Crawl every prefecture of a region, one after another
    Region {
        /// Region key (see `kyujin regions`)
        #[arg(short, long)]
        region: String,

        /// Free-text keyword
        #[arg(short, long)]
        keyword: Option<String>,

        #[command(flatten)]
        run: RunArgs,
    },

    /// List stored listings, newest first
    List {
        #[command(flatten)]
        filter: FilterArgs,

        /// Maximum number of listings to print
        #[arg(short, long, default_value_t = 50)]
        limit: usize,

        /// Write CSV instead of JSON
        #[arg(long, default_value_t = false)]
        csv: bool,
    },

    /// Print counts and average wages, overall and by industry and prefecture
    Stats {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Manage and run interval schedules
    Schedule {
        /// Schedule file
        #[arg(long, env = "KYUJIN_SCHEDULE_FILE", default_value = DEFAULT_SCHEDULE_FILE, global = true)]
        file: PathBuf,

        #[command(subcommand)]
        action: ScheduleAction,
    },

    /// List region keys
    Regions,
}

#[derive(Args)]
struct RunArgs {
    /// Number of result pages to read per search
    #[arg(short, long, env = "KYUJIN_MAX_PAGES", default_value_t = 3)]
    max_pages: u32,

    /// Insert listings even when the same title and company are stored
    #[arg(long, default_value_t = false)]
    force: bool,

    /// Crawl without touching the database
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Args)]
struct FilterArgs {
    /// Substring of title or company
    #[arg(short, long)]
    keyword: Option<String>,

    /// Lowest acceptable minimum wage
    #[arg(long)]
    wage_min: Option<u64>,

    /// Highest acceptable minimum wage
    #[arg(long)]
    wage_max: Option<u64>,

    /// Industry slug or label
    #[arg(short, long)]
    industry: Option<Industry>,

    /// Substring of location
    #[arg(long)]
    location: Option<String>,

    /// hourly, daily, monthly, annual or unknown
    #[arg(long)]
    pay_period: Option<PayPeriod>,
}

impl FilterArgs {
    fn into_filter(self, limit: Option<usize>) -> ListingFilter {
        ListingFilter {
            keyword: self.keyword,
            wage_min: self.wage_min,
            wage_max: self.wage_max,
            industry: self.industry,
            location: self.location,
            pay_period: self.pay_period,
            limit,
        }
    }
}

#[derive(Subcommand)]
enum ScheduleAction {
    /// Show all schedules
    List,

    /// Add a schedule, replacing any with the same name
    Add {
        /// Unique schedule name
        #[arg(short, long)]
        name: String,

        #[arg(short, long, default_value = "hellowork")]
        source: ListingSource,

        #[arg(short, long, conflicts_with = "region")]
        area: Option<String>,

        /// Region key; fans out over its prefectures
        #[arg(short, long)]
        region: Option<String>,

        #[arg(short, long)]
        keyword: Option<String>,

        /// Hours between runs
        #[arg(long, default_value_t = 24)]
        interval_hours: u32,

        #[arg(short, long, default_value_t = 10)]
        max_pages: u32,

        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Remove a schedule by name
    Remove { name: String },

    /// Run due schedules until Ctrl-C
    Run {
        /// Seconds between schedule checks
        #[arg(long, default_value_t = 60)]
        poll_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("kyujin=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Crawl {
            source,
            area,
            keyword,
            run,
        } => {
            let request = CrawlRequest {
                source,
                scope: CrawlScope::Single(SearchQuery::new(area, keyword)),
                max_pages: run.max_pages,
                force: run.force,
            };
            cmd_crawl(request, run.dry_run).await?;
        }
        Commands::Region {
            region,
            keyword,
            run,
        } => {
            let areas = prefectures_by_region(&region)
                .with_context(|| format!("Unknown region '{region}'. See `kyujin regions`."))?;
            let request = CrawlRequest {
                source: ListingSource::Hellowork,
                scope: CrawlScope::Region {
                    region,
                    areas: areas.into_iter().map(String::from).collect(),
                    keyword,
                },
                max_pages: run.max_pages,
                force: run.force,
            };
            cmd_crawl(request, run.dry_run).await?;
        }
        Commands::List { filter, limit, csv } => {
            let repo = connect_db().await?;
            cmd_list(&repo, filter.into_filter(Some(limit)), csv).await?;
        }
        Commands::Stats { filter } => {
            let repo = connect_db().await?;
            let listings = repo.query_all(&filter.into_filter(None)).await?;
            let stats = serde_json::json!({
                "overall": ListingStats::from_listings(&listings),
                "industries": ListingStats::by_industry(&listings),
                "prefectures": ListingStats::by_prefecture(&listings, TOP_PREFECTURES),
            });
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Schedule { file, action } => {
            cmd_schedule(ScheduleFile::new(file), action).await?;
        }
        Commands::Regions => {
            for (key, name) in regions() {
                println!("{key}\t{name}");
            }
        }
    }

    Ok(())
}

/// Connect to PostgreSQL using DATABASE_URL and apply pending migrations.
async fn connect_db() -> Result<ListingRepository> {
    let config = DatabaseConfig::from_env()?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await?;
    Ok(db.listing_repo())
}

fn controller<S: ListingStore>(
    store: S,
) -> Result<TraversalController<ChromeLauncher, SourceExtractors, S>> {
    let launcher = ChromeLauncher::new(ChromeConfig::from_env()?);
    Ok(TraversalController::new(
        launcher,
        SourceExtractors,
        store,
        TraversalConfig::from_env()?,
    ))
}

async fn cmd_crawl(request: CrawlRequest, dry_run: bool) -> Result<()> {
    tracing::info!(
        source = %request.source,
        scope = %request.scope.describe(),
        max_pages = request.max_pages,
        force = request.force,
        dry_run,
        "Starting crawl"
    );

    let status = if dry_run {
        run_to_completion(controller(NullStore)?, request).await?
    } else {
        run_to_completion(controller(connect_db().await?)?, request).await?
    };

    println!("{}", serde_json::to_string_pretty(&status)?);

    match status.last_error {
        Some(error) => anyhow::bail!("Crawl failed: {error}"),
        None => Ok(()),
    }
}

/// Start one run on a fresh orchestrator and wait for it to finish.
async fn run_to_completion<S: ListingStore + 'static>(
    controller: TraversalController<ChromeLauncher, SourceExtractors, S>,
    request: CrawlRequest,
) -> Result<CrawlRun> {
    let cancel = CancellationToken::new();
    let (orchestrator, worker) =
        CrawlOrchestrator::spawn(controller, TracingCrawlReporter, cancel.clone());

    orchestrator.start(request)?;
    orchestrator.wait_idle().await;

    cancel.cancel();
    worker.await.context("Crawl worker panicked")?;

    Ok(orchestrator.status())
}

async fn cmd_list(repo: &ListingRepository, filter: ListingFilter, csv: bool) -> Result<()> {
    let listings = repo.query_all(&filter).await?;

    if csv {
        let mut writer = csv::Writer::from_writer(std::io::stdout());
        for listing in &listings {
            writer.serialize(listing)?;
        }
        writer.flush()?;
    } else {
        println!("{}", serde_json::to_string_pretty(&listings)?);
    }

    tracing::info!(count = listings.len(), "Listings printed");
    Ok(())
}

async fn cmd_schedule(file: ScheduleFile, action: ScheduleAction) -> Result<()> {
    match action {
        ScheduleAction::List => {
            let schedules = file.load().await?;
            if schedules.is_empty() {
                println!("No schedules in {}", file.path().display());
                return Ok(());
            }
            println!("{}", serde_json::to_string_pretty(&schedules)?);
        }
        ScheduleAction::Add {
            name,
            source,
            area,
            region,
            keyword,
            interval_hours,
            max_pages,
            force,
        } => {
            let schedule = Schedule {
                name: name.clone(),
                source,
                area,
                region,
                keyword,
                interval_hours,
                max_pages,
                force,
                created_at: Utc::now(),
                last_run: None,
            };
            file.add(schedule).await?;
            println!("Schedule '{name}' saved to {}", file.path().display());
        }
        ScheduleAction::Remove { name } => {
            if file.remove(&name).await? {
                println!("Schedule '{name}' removed");
            } else {
                anyhow::bail!("No schedule named '{name}'");
            }
        }
        ScheduleAction::Run { poll_secs } => {
            let repo = connect_db().await?;
            let cancel = CancellationToken::new();
            let (orchestrator, worker) =
                CrawlOrchestrator::spawn(controller(repo)?, TracingCrawlReporter, cancel.clone());

            let signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Shutdown requested, finishing current run");
                    signal.cancel();
                }
            });

            let scheduler = Scheduler::new(std::time::Duration::from_secs(poll_secs.max(1)));
            scheduler.run(&orchestrator, &file, cancel).await?;

            worker.await.context("Crawl worker panicked")?;
            let status = orchestrator.status();
            if let Some(last) = status.last_result {
                tracing::info!(success = last.success, scope = %last.scope, "Last run");
            }
        }
    }

    Ok(())
}
