use std::process::ExitCode;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use ulid::Ulid;

use sala::calendar::{check_selectable, SelectionError};
use sala::config::Config;
use sala::limits::WEEKLY_QUOTA;
use sala::rules::{week_window_of, ConflictKind};
use sala::store::compact_if_needed;
use sala::*;

#[derive(Parser)]
#[command(name = "sala", version, about = "Reserve the Sala Gourmet for a day")]
struct Cli {
    /// Treat this day as today for the calendar rules (YYYY-MM-DD).
    #[arg(long, global = true, value_parser = parse_date)]
    today: Option<NaiveDate>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ApartmentArgs {
    /// Building entrance: 1, 2 or 3.
    #[arg(long)]
    portal: Portal,
    /// Floor: 1 to 10.
    #[arg(long)]
    floor: Floor,
    /// Door: A or B (any case).
    #[arg(long)]
    door: Door,
}

impl ApartmentArgs {
    fn apartment(&self) -> Apartment {
        Apartment::new(self.portal, self.floor, self.door)
    }
}

#[derive(Subcommand)]
enum Command {
    /// Show every reservation, earliest day first.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Reserve a day for an apartment.
    Book {
        #[command(flatten)]
        apartment: ApartmentArgs,
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,
        /// Skip the current-week and past-day checks of the calendar.
        #[arg(long)]
        any_day: bool,
    },
    /// Cancel a reservation by id.
    Cancel { id: Ulid },
    /// How many reservations an apartment holds in the week of a day.
    Count {
        #[command(flatten)]
        apartment: ApartmentArgs,
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,
    },
    /// Rewrite the reservation log to the live set.
    Compact {
        /// Compact even below the configured threshold.
        #[arg(long)]
        force: bool,
    },
}

enum CliError {
    Setup(String),
    Io(std::io::Error),
    Json(serde_json::Error),
    Selection(SelectionError),
    Service(ServiceError),
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Json(e)
    }
}

impl From<SelectionError> for CliError {
    fn from(e: SelectionError) -> Self {
        CliError::Selection(e)
    }
}

impl From<ServiceError> for CliError {
    fn from(e: ServiceError) -> Self {
        CliError::Service(e)
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        CliError::Service(e.into())
    }
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            CliError::Setup(_) | CliError::Io(_) | CliError::Json(_) => 1,
            CliError::Selection(_) => 2,
            CliError::Service(ServiceError::Conflict(_)) => 3,
            CliError::Service(ServiceError::NotFound(_)) => 4,
            CliError::Service(ServiceError::StoreUnavailable(_)) => 5,
        }
    }

    /// One actionable message per failure kind.
    fn message(&self) -> String {
        match self {
            CliError::Setup(e) => format!("startup failed: {e}"),
            CliError::Io(e) => format!("I/O error: {e}"),
            CliError::Json(e) => format!("could not encode output: {e}"),
            CliError::Selection(SelectionError::PastDate(d)) => {
                format!("{d} is in the past; reservations can only be made from today on")
            }
            CliError::Selection(SelectionError::OutsideCurrentWeek {
                week_start, week_end, ..
            }) => format!("only days of the current week can be booked ({week_start} .. {week_end})"),
            CliError::Selection(SelectionError::AlreadyReserved(d))
            | CliError::Service(ServiceError::Conflict(ConflictKind::DateAlreadyReserved(d))) => {
                format!("{d} is already reserved; pick another day")
            }
            CliError::Service(ServiceError::Conflict(ConflictKind::WeeklyQuotaExceeded {
                apartment,
                week,
            })) => format!(
                "{apartment} already has {WEEKLY_QUOTA} reservations in the week {} .. {}; \
                 the limit is {WEEKLY_QUOTA} per week, the next week opens on {}",
                week.start,
                week.end,
                week.next().start
            ),
            CliError::Service(ServiceError::NotFound(id)) => {
                format!("reservation {id} no longer exists; run `sala list` to refresh")
            }
            CliError::Service(ServiceError::StoreUnavailable(e)) => {
                format!("the reservation store is unavailable ({e}); try again")
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e.message());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli, config: Config) -> Result<(), CliError> {
    let Cli { today, command } = cli;
    observability::init(config.metrics_port).map_err(|e| CliError::Setup(e.to_string()))?;

    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(WalStore::open(&config.wal_path())?);
    let service = ReservationService::open(store.clone()).await?;
    info!("data_dir: {}", config.data_dir.display());

    match command {
        Command::List { json } => {
            let mut all = service.snapshot().await;
            all.sort_by_key(|r| r.date);
            if json {
                println!("{}", serde_json::to_string_pretty(&all)?);
            } else if all.is_empty() {
                println!("no reservations");
            } else {
                for r in &all {
                    println!(
                        "{}  {:<14}  {}",
                        r.date.format("%a %Y-%m-%d"),
                        r.apartment().to_string(),
                        r.id
                    );
                }
            }
        }
        Command::Book {
            apartment,
            date,
            any_day,
        } => {
            let apartment = apartment.apartment();
            if !any_day {
                let today = today.unwrap_or_else(|| chrono::Local::now().date_naive());
                check_selectable(&service.snapshot().await, date, today, config.week_start)?;
            }
            // Same check `create` repeats against a fresh snapshot.
            if service.weekly_apartment_count(&apartment, date).await >= WEEKLY_QUOTA {
                return Err(ServiceError::Conflict(ConflictKind::WeeklyQuotaExceeded {
                    apartment,
                    week: week_window_of(date),
                })
                .into());
            }
            let r = service.create(NewReservation::new(apartment, date)).await?;
            println!("reserved {} for {} ({})", r.date, r.apartment(), r.id);
            compact_quietly(&store, config.compact_threshold).await;
        }
        Command::Cancel { id } => {
            service.cancel(id).await?;
            println!("cancelled {id}");
            compact_quietly(&store, config.compact_threshold).await;
        }
        Command::Count { apartment, date } => {
            let apartment = apartment.apartment();
            let week = week_window_of(date);
            let n = service.weekly_apartment_count(&apartment, date).await;
            println!(
                "{apartment}: {n}/{WEEKLY_QUOTA} reservations in the week {} .. {}",
                week.start, week.end
            );
        }
        Command::Compact { force } => {
            let appends = store.appends_since_compact().await;
            let ran = if force {
                store.compact().await?;
                true
            } else {
                compact_if_needed(&store, config.compact_threshold).await?
            };
            if ran {
                println!("compacted {appends} appends to {} reservations", store.len());
            } else {
                println!(
                    "{appends} appends since last compaction, threshold {}",
                    config.compact_threshold
                );
            }
        }
    }
    Ok(())
}

/// Compaction after a write is housekeeping; the write already succeeded.
async fn compact_quietly(store: &WalStore, threshold: u64) {
    if let Err(e) = compact_if_needed(store, threshold).await {
        warn!("compaction failed: {e}");
    }
}
