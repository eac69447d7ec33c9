use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use propertypal_lib::db::open_sqlite_pool;
use propertypal_lib::migrate::apply_migrations;
use propertypal_lib::money::format_currency;
use propertypal_lib::reports::{DateRange, FinancialReport};
use propertypal_lib::views::{DashboardView, SlotView};
use propertypal_lib::{
    logging, Config, PropertyId, Session, SqliteBackend, StoreHandle, ViewScope,
};

#[derive(Debug, Parser)]
#[command(name = "propertypal", about = "Property-scoped homeowner records", version)]
struct Cli {
    /// SQLite database to read and write.
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,
    /// File holding the persisted current property.
    #[arg(long, global = true, value_name = "PATH")]
    session: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List properties, marking the current and the primary one.
    Properties {
        #[arg(long)]
        json: bool,
    },
    /// Switch the current property.
    Select { id: String },
    /// Flag a property as the primary residence.
    Primary { id: String },
    /// Load and print the dashboard for the current property.
    Dashboard {
        #[arg(long)]
        json: bool,
    },
    /// Financial report for the current property.
    Report {
        #[arg(long, default_value = "month")]
        range: DateRange,
        #[arg(long)]
        json: bool,
    },
    /// Forget the persisted current property.
    Logout,
}

fn main() {
    let cli = Cli::parse();

    let config = match resolve_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    };
    let guard = match logging::init(&config) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Error: {err:#}");
            None
        }
    };
    tracing::debug!(
        target: "propertypal",
        event = "cli_started",
        commit = propertypal_lib::git_commit_hash()
    );

    let code = match handle_cli(cli.command, &config) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            1
        }
    };
    drop(guard);
    process::exit(code);
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::from_env().context("resolve configuration")?;
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }
    if let Some(session) = &cli.session {
        config.session_file = session.clone();
    }
    Ok(config)
}

fn handle_cli(command: Commands, config: &Config) -> Result<i32> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build async runtime")?;
    runtime.block_on(run(command, config))
}

async fn open_session(config: &Config, scope: ViewScope) -> Result<Session> {
    let pool = open_sqlite_pool(&config.db_path).await?;
    apply_migrations(&pool).await.context("apply migrations")?;
    let store = StoreHandle::file(&config.session_file)
        .with_context(|| format!("open session file {}", config.session_file.display()))?;
    Ok(Session::new(
        Arc::new(SqliteBackend::new(pool)),
        store,
        Arc::new(config.clock()),
        scope,
    ))
}

async fn run(command: Commands, config: &Config) -> Result<i32> {
    match command {
        Commands::Properties { json } => {
            let session = open_session(config, ViewScope::Dashboard).await?;
            session.resume().await?;
            print_properties(&session, json)
        }
        Commands::Select { id } => {
            let session = open_session(config, ViewScope::Dashboard).await?;
            if session.resume().await?.is_none() {
                eprintln!("No properties yet.");
                return Ok(1);
            }
            let id = PropertyId::from(id);
            session.context().select_property(&id)?;
            println!("Current property: {id}");
            Ok(0)
        }
        Commands::Primary { id } => {
            let session = open_session(config, ViewScope::Dashboard).await?;
            session.resume().await?;
            let id = PropertyId::from(id);
            if let Some(cycle) = session.set_primary_property(&id).await? {
                cycle.settled().await;
            }
            println!("Primary property: {id}");
            Ok(0)
        }
        Commands::Dashboard { json } => {
            let session = open_session(config, ViewScope::Dashboard).await?;
            session.start().await?.settled().await;
            let view = session.dashboard();
            if json {
                let serialized =
                    serde_json::to_string_pretty(&view).context("serialize dashboard")?;
                println!("{serialized}");
            } else {
                print_dashboard(&view);
            }
            Ok(0)
        }
        Commands::Report { range, json } => {
            let session = open_session(config, ViewScope::Unfiltered).await?;
            if session.resume().await?.is_none() {
                eprintln!("No properties yet.");
                return Ok(1);
            }
            let report = session.report(range).await?;
            if json {
                let serialized =
                    serde_json::to_string_pretty(&report).context("serialize report")?;
                println!("{serialized}");
            } else {
                print_report(&report);
            }
            Ok(0)
        }
        Commands::Logout => {
            let session = open_session(config, ViewScope::Dashboard).await?;
            session.logout()?;
            println!("Logged out.");
            Ok(0)
        }
    }
}

fn print_properties(session: &Session, emit_json: bool) -> Result<i32> {
    let properties = session.context().properties();
    let current = session.context().current_id();
    if emit_json {
        let payload = json!({
            "current": current,
            "properties": properties,
        });
        let serialized =
            serde_json::to_string_pretty(&payload).context("serialize property list")?;
        println!("{serialized}");
        return Ok(0);
    }

    if properties.is_empty() {
        println!("No properties yet.");
        return Ok(0);
    }
    for property in properties {
        let marker = if current.as_ref() == Some(&property.id) { '*' } else { ' ' };
        let primary = if property.is_primary_residence { "  (primary)" } else { "" };
        println!("{marker} {:<38} {}{primary}", property.id, property.address);
    }
    Ok(0)
}

fn slot_line<T>(slot: &SlotView<T>, detail: impl FnOnce(&[T]) -> String) -> String {
    match &slot.error {
        Some(error) => format!("error: {error}"),
        None if slot.loading => "loading".to_string(),
        None => detail(&slot.items),
    }
}

fn print_dashboard(view: &DashboardView) {
    let Some(property_id) = &view.property_id else {
        println!("No properties yet.");
        return;
    };
    println!("Property      : {property_id}");
    println!("Today         : {} ({})", view.today, view.season);
    println!(
        "Maintenance   : {}",
        slot_line(&view.maintenance, |items| format!(
            "{} pending, {} overdue",
            items.len(),
            view.overdue_maintenance
        ))
    );
    println!(
        "Appliances    : {}",
        slot_line(&view.appliances, |items| format!(
            "{}, {} warranties expiring soon",
            items.len(),
            view.expiring_warranties
        ))
    );
    println!(
        "Documents     : {}",
        slot_line(&view.documents, |items| items.len().to_string())
    );
    println!(
        "Projects      : {}",
        slot_line(&view.projects, |items| items.len().to_string())
    );
    println!(
        "Expenses      : {}",
        slot_line(&view.expenses, |items| format!(
            "{} this month, {}",
            items.len(),
            format_currency(view.summary.total_expenses)
        ))
    );
    println!(
        "Budgets       : {}",
        slot_line(&view.budgets, |items| format!(
            "{} lines, {} budgeted",
            items.len(),
            format_currency(view.summary.total_budget)
        ))
    );
    if view.summary.total_budget > 0.0 {
        let direction = if view.summary.status.under_budget {
            "under"
        } else {
            "over"
        };
        println!(
            "Budget status : {}% {direction} budget",
            view.summary.status.percentage
        );
    }
}

fn print_report(report: &FinancialReport) {
    match report.start_date {
        Some(start) => println!(
            "Range          : {} ({start} to {})",
            report.range, report.end_date
        ),
        None => println!("Range          : {} (to {})", report.range, report.end_date),
    }
    println!("Total expenses : {}", format_currency(report.total_expenses));
    println!("Total budget   : {}", format_currency(report.total_budget));
    println!("Savings rate   : {:.1}%", report.savings_rate);
    println!("Growth rate    : {:.1}%", report.expense_growth_rate);
    if !report.monthly_totals.is_empty() {
        println!("Monthly totals:");
        for month in &report.monthly_totals {
            println!("  {}  {}", month.month, format_currency(month.total));
        }
    }
    if !report.category_totals.is_empty() {
        println!("Category totals:");
        for (category, total) in &report.category_totals {
            println!("  {category:<16} {}", format_currency(*total));
        }
    }
}
