mod reports;
mod storage;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{Args as ClapArgs, Parser, Subcommand};
use colored::Colorize;
use dealtrail_engine::{
    AdvanceOutcome, CheckInType, Clock, Coordinates, DealEngine, DealFilters, DealType,
    EngineConfig, FixedClock, JourneyCriteria, JourneyStateMachine, PlanResponse,
    RecoveryOutcome, SystemClock, VendorId,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reports::{OutputTarget, ReportFormat};
use storage::{FileStore, FileVendorSource};

#[derive(Debug, Parser)]
#[command(name = "dealtrail", version)]
#[command(about = "Plan and run multi-stop deal journeys from the command line")]
struct Args {
    /// Vendor feed (JSON array of vendor records)
    #[arg(long, global = true, default_value = "vendors.json")]
    vendors: PathBuf,

    /// Key-value store file; created on first write
    #[arg(long, global = true, default_value = "dealtrail-store.json")]
    store: PathBuf,

    /// Engine configuration overrides (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output report format
    #[arg(long, global = true, value_enum, default_value_t = ReportFormat::Console)]
    report: ReportFormat,

    /// Optional path to write the report output instead of stdout
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Pin the clock to an RFC 3339 timestamp (replays and tests)
    #[arg(long, global = true)]
    now: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Plan a journey without starting it
    Plan(PlanArgs),
    /// Plan a journey and make it the active one
    Start(PlanArgs),
    /// Show the active journey
    Status,
    /// Move to the next stop
    Advance,
    /// Drop the current stop
    Skip,
    /// Confirm a visit and redeem the deal
    Checkin {
        /// Stop number (1-based); defaults to the current stop
        #[arg(long)]
        stop: Option<usize>,
        /// qr or qrSkipped
        #[arg(long, default_value = "qr")]
        kind: CheckInType,
    },
    /// Finish the journey from its final stop
    Complete,
    /// End the journey early
    Terminate,
    /// Drop the active journey without scoring it
    Clear,
    /// Recently finished journeys
    History,
    /// Redemption counts for today and all time
    Stats,
    /// Cumulative points balance
    Points,
    /// Deals of one type available today
    Deals {
        #[arg(long)]
        deal_type: DealType,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Remove redemption records dated before a day
    Prune {
        #[arg(long)]
        before: NaiveDate,
    },
}

#[derive(Debug, ClapArgs)]
struct PlanArgs {
    /// birthday, daily, multiDay, special or everyday
    #[arg(long)]
    deal_type: DealType,

    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    #[arg(long, allow_hyphen_values = true)]
    lon: f64,

    /// Stop cap (clamped to the configured ceiling)
    #[arg(long)]
    max_stops: Option<usize>,

    /// Search radius in miles
    #[arg(long)]
    max_distance: Option<f64>,

    /// Vendor ids to leave out (comma-separated)
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,

    #[command(flatten)]
    filters: FilterArgs,
}

#[derive(Debug, ClapArgs)]
struct FilterArgs {
    /// Category allow-list for everyday deals (comma-separated)
    #[arg(long, value_delimiter = ',')]
    category: Vec<String>,

    /// Only partner vendors
    #[arg(long)]
    partners_only: bool,
}

impl FilterArgs {
    fn to_filters(&self) -> DealFilters {
        DealFilters {
            categories: (!self.category.is_empty()).then(|| self.category.clone()),
            partners_only: self.partners_only,
        }
    }
}

impl PlanArgs {
    fn criteria(&self) -> JourneyCriteria {
        let mut criteria =
            JourneyCriteria::new(self.deal_type, Coordinates::new(self.lat, self.lon))
                .excluding(self.exclude.iter().map(|id| VendorId::from(id.as_str())))
                .with_filters(self.filters.to_filters());
        criteria.max_stops = self.max_stops;
        criteria.max_distance_miles = self.max_distance;
        criteria
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let engine = build_engine(&args)?;
    let mut out = OutputTarget::new(args.output.clone())?;

    let (mut machine, recovery) = engine
        .resume()
        .await
        .context("failed to recover the active journey")?;
    if args.report == ReportFormat::Console {
        reports::recovery_notice(&mut out, &recovery)?;
    }

    let succeeded = run(&args, &engine, &mut machine, &recovery, &mut out).await?;
    out.flush_inner()?;
    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

fn build_engine(args: &Args) -> Result<DealEngine> {
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => EngineConfig::default(),
    };
    let clock: Arc<dyn Clock> = match &args.now {
        Some(now) => Arc::new(
            FixedClock::parse(now).with_context(|| format!("invalid --now timestamp `{now}`"))?,
        ),
        None => Arc::new(SystemClock),
    };
    log::debug!(
        "engine: vendors={} store={}",
        args.vendors.display(),
        args.store.display()
    );
    Ok(DealEngine::new(
        Arc::new(FileVendorSource::new(&args.vendors)),
        Arc::new(FileStore::new(&args.store)),
        clock,
        config,
    ))
}

fn load_config(path: &Path) -> Result<EngineConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    EngineConfig::from_json(&raw).with_context(|| format!("invalid config {}", path.display()))
}

/// Execute one subcommand; `Ok(false)` means a user-facing failure was reported.
async fn run(
    args: &Args,
    engine: &DealEngine,
    machine: &mut JourneyStateMachine,
    recovery: &RecoveryOutcome,
    out: &mut OutputTarget,
) -> Result<bool> {
    let json = args.report == ReportFormat::Json;
    match &args.command {
        Command::Plan(plan) => {
            let response = plan_journey(engine, plan).await?;
            emit_plan(out, json, &response)?;
            Ok(response.success)
        }
        Command::Start(plan) => start_journey(engine, machine, plan, json, out).await,
        Command::Status => {
            if json {
                reports::write_json(
                    out,
                    &serde_json::json!({
                        "phase": machine.phase(),
                        "recovery": recovery,
                        "journey": machine.journey(),
                        "route": machine.route(),
                    }),
                )?;
            } else {
                reports::console_status(out, machine.phase(), machine.journey(), machine.route())?;
            }
            Ok(true)
        }
        Command::Advance => {
            let outcome = machine.advance().await?;
            if json {
                reports::write_json(out, &outcome)?;
            } else if let AdvanceOutcome::Moved { index } = outcome {
                writeln!(out, "Now at stop {}.", index + 1)?;
            } else {
                writeln!(out, "Final stop reached; run `complete` to finish.")?;
            }
            Ok(true)
        }
        Command::Skip => {
            let removed = machine.skip().await?;
            if json {
                reports::write_json(out, &removed)?;
            } else {
                writeln!(out, "Skipped {}.", removed.vendor.name)?;
            }
            Ok(true)
        }
        Command::Checkin { stop, kind } => {
            let index = match stop {
                Some(0) => bail!("stop numbers start at 1"),
                Some(number) => number - 1,
                None => machine
                    .journey()
                    .map(|journey| journey.current_stop_index)
                    .unwrap_or_default(),
            };
            let redemption = machine.mark_checked_in(index, *kind).await?;
            if json {
                reports::write_json(out, &redemption)?;
            } else {
                writeln!(out, "{} checked in at stop {}", "✅".green(), index + 1)?;
                if redemption.is_none() {
                    writeln!(out, "{}", "Redemption could not be recorded.".yellow())?;
                }
            }
            Ok(true)
        }
        Command::Complete => {
            let result = machine.complete().await?;
            emit_result(out, json, &result)
        }
        Command::Terminate => {
            let result = machine.terminate().await?;
            emit_result(out, json, &result)
        }
        Command::Clear => {
            machine.clear().await?;
            if json {
                reports::write_json(out, &machine.phase())?;
            } else {
                writeln!(out, "Active journey cleared.")?;
            }
            Ok(true)
        }
        Command::History => {
            let history = machine.history().await?;
            if json {
                reports::write_json(out, &history)?;
            } else {
                reports::console_history(out, &history)?;
            }
            Ok(true)
        }
        Command::Stats => {
            let stats = engine.tracker().stats().await;
            if json {
                reports::write_json(out, &stats)?;
            } else {
                reports::console_stats(out, &stats)?;
            }
            Ok(true)
        }
        Command::Points => {
            let ledger = engine.points().await?;
            if json {
                reports::write_json(out, &ledger)?;
            } else {
                reports::console_points(out, &ledger)?;
            }
            Ok(true)
        }
        Command::Deals { deal_type, filters } => {
            engine
                .initialize()
                .await
                .context("failed to load vendors")?;
            let today = engine.clock().today();
            let deals = engine
                .cache()
                .deals_by_type(*deal_type, &filters.to_filters(), today);
            if json {
                reports::write_json(out, &deals)?;
            } else {
                reports::console_deals(out, &deals)?;
            }
            Ok(true)
        }
        Command::Prune { before } => {
            let removed = engine.tracker().prune_before(*before).await?;
            if json {
                reports::write_json(out, &serde_json::json!({ "removed": removed }))?;
            } else {
                writeln!(out, "Removed {removed} redemption records.")?;
            }
            Ok(true)
        }
    }
}

async fn plan_journey(engine: &DealEngine, plan: &PlanArgs) -> Result<PlanResponse> {
    if let Err(err) = engine.initialize().await {
        log::warn!("vendor cache unavailable: {err}");
    }
    Ok(engine.plan(&plan.criteria()).await)
}

async fn start_journey(
    engine: &DealEngine,
    machine: &mut JourneyStateMachine,
    plan: &PlanArgs,
    json: bool,
    out: &mut OutputTarget,
) -> Result<bool> {
    if machine.journey().is_some() {
        bail!("a journey is already active; complete, terminate or clear it first");
    }
    if let Err(err) = engine.initialize().await {
        log::warn!("vendor cache unavailable: {err}");
    }
    let planned = match engine.planner().create_journey(&plan.criteria()).await {
        Ok(planned) => planned,
        Err(err) => {
            emit_plan(out, json, &PlanResponse::from(Err(err)))?;
            return Ok(false);
        }
    };
    let journey = machine.start(planned).await?;
    if json {
        reports::write_json(out, journey)?;
    } else {
        writeln!(
            out,
            "{} journey started with {} stops",
            "🚀".bright_green(),
            journey.total_stops
        )?;
        reports::console_status(out, machine.phase(), machine.journey(), machine.route())?;
    }
    Ok(true)
}

fn emit_plan(out: &mut OutputTarget, json: bool, response: &PlanResponse) -> Result<()> {
    if json {
        reports::write_json(out, response)
    } else {
        reports::console_plan(out, response)
    }
}

fn emit_result(
    out: &mut OutputTarget,
    json: bool,
    result: &dealtrail_engine::JourneyResult,
) -> Result<bool> {
    if json {
        reports::write_json(out, result)?;
    } else {
        reports::console_result(out, result)?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_args_build_criteria() {
        let args = Args::parse_from([
            "dealtrail",
            "plan",
            "--deal-type",
            "multiDay",
            "--lat",
            "61.2",
            "--lon",
            "-149.9",
            "--max-stops",
            "3",
            "--exclude",
            "4,5",
            "--category",
            "Coffee",
        ]);
        let Command::Plan(plan) = args.command else {
            panic!("expected plan");
        };
        let criteria = plan.criteria();
        assert_eq!(criteria.deal_type, DealType::MultiDay);
        assert_eq!(criteria.max_stops, Some(3));
        assert_eq!(criteria.exclude_vendor_ids, vec![VendorId::from(4_u64), VendorId::from(5_u64)]);
        assert_eq!(criteria.filters.categories, Some(vec!["Coffee".to_string()]));
        assert!((criteria.origin_coordinates.longitude + 149.9).abs() < f64::EPSILON);
    }

    #[test]
    fn checkin_kind_parses_wire_names() {
        let args = Args::parse_from(["dealtrail", "checkin", "--kind", "qrSkipped", "--stop", "2"]);
        assert!(matches!(
            args.command,
            Command::Checkin { stop: Some(2), kind: CheckInType::QrSkipped }
        ));
    }
}
