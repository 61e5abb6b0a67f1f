use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use dealtrail_engine::{
    CheckInType, DealRecord, JourneyHistoryEntry, JourneyPhase, JourneyRecord, JourneyResult,
    PlanResponse, PointsLedger, RecoveryOutcome, RedemptionStats, RouteSummary,
};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Colored, human-readable text
    Console,
    /// Pretty-printed JSON using the engine's wire names
    Json,
}

pub enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    pub fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    pub fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

pub fn write_json<T: Serialize + ?Sized>(out: &mut dyn Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).context("failed to encode report")?;
    writeln!(out)?;
    Ok(())
}

pub fn recovery_notice(out: &mut dyn Write, outcome: &RecoveryOutcome) -> Result<()> {
    match outcome {
        RecoveryOutcome::Expired { created_at } => writeln!(
            out,
            "{} journey started {} expired and was cleared",
            "⌛".yellow(),
            created_at.format("%Y-%m-%d %H:%M UTC")
        )?,
        RecoveryOutcome::Corrupt => writeln!(
            out,
            "{}",
            "⚠️  stored journey was unreadable and has been cleared".yellow()
        )?,
        RecoveryOutcome::UnsupportedVersion { found } => writeln!(
            out,
            "{}",
            format!("⚠️  stored journey uses schema {found}; upgrade to resume it").yellow()
        )?,
        RecoveryOutcome::NoJourney | RecoveryOutcome::Restored => {}
    }
    Ok(())
}

pub fn console_plan(out: &mut dyn Write, response: &PlanResponse) -> Result<()> {
    let Some(stops) = response.vendors.as_ref().filter(|_| response.success) else {
        let code = response
            .error
            .map_or_else(|| "Unknown".to_string(), |kind| kind.to_string());
        writeln!(out, "{} {}", "❌".red(), code.red().bold())?;
        if let Some(message) = &response.message {
            writeln!(out, "   {message}")?;
        }
        return Ok(());
    };
    writeln!(out, "{}", "🗺️  Planned journey".bright_cyan().bold())?;
    writeln!(out, "{}", "==================".cyan())?;
    for (index, stop) in stops.iter().enumerate() {
        writeln!(
            out,
            "{:>2}. {} ({:.2} mi from origin, +{:.2} mi){}",
            index + 1,
            stop.vendor.name.bold(),
            stop.distance_from_origin,
            stop.distance,
            if stop.has_qr_code { " [QR]" } else { "" }
        )?;
    }
    if let Some(route) = &response.route {
        console_route(out, route)?;
    }
    Ok(())
}

fn console_route(out: &mut dyn Write, route: &RouteSummary) -> Result<()> {
    writeln!(
        out,
        "Route: {:.2} mi, about {} min",
        route.total_distance, route.estimated_time_minutes
    )?;
    Ok(())
}

pub fn console_status(
    out: &mut dyn Write,
    phase: JourneyPhase,
    journey: Option<&JourneyRecord>,
    route: Option<&RouteSummary>,
) -> Result<()> {
    let Some(journey) = journey else {
        writeln!(out, "No active journey ({phase:?}).")?;
        return Ok(());
    };
    writeln!(
        out,
        "{} {} journey, stop {}/{} (planned {})",
        "🚶".bright_green(),
        journey.deal_type.to_string().bold(),
        (journey.current_stop_index + 1).min(journey.total_stops),
        journey.total_stops,
        journey.planned_stops
    )?;
    for (index, stop) in journey.stops.iter().enumerate() {
        let marker = if index == journey.current_stop_index {
            "➤".bright_yellow().to_string()
        } else {
            " ".to_string()
        };
        let state = match (stop.checked_in, stop.check_in_type) {
            (true, CheckInType::Qr) => "✅ scanned".green().to_string(),
            (true, CheckInType::QrSkipped) => "☑️  scan skipped".yellow().to_string(),
            (true, CheckInType::None) => "✅ visited".green().to_string(),
            (false, _) => "· pending".dimmed().to_string(),
        };
        writeln!(out, "{marker} {:>2}. {} {state}", index + 1, stop.vendor.name)?;
    }
    if let Some(route) = route {
        console_route(out, route)?;
    }
    Ok(())
}

pub fn console_result(out: &mut dyn Write, result: &JourneyResult) -> Result<()> {
    let reward = &result.reward;
    writeln!(
        out,
        "{} journey {:?}",
        "🏁".bright_cyan(),
        result.outcome
    )?;
    writeln!(out, "Check-in points: {}", reward.checkin_points)?;
    writeln!(
        out,
        "Bonus points:    {} ({} milestones, {:.0}% QR compliance)",
        reward.bonus_points,
        reward.milestones,
        reward.qr_compliance_rate * 100.0
    )?;
    writeln!(
        out,
        "Total:           {}",
        reward.total_points.to_string().green().bold()
    )?;
    if let Some(notice) = &reward.notice {
        writeln!(out, "{}", notice.yellow())?;
    }
    if !result.credited {
        writeln!(out, "{}", "Already credited; balance unchanged.".dimmed())?;
    }
    writeln!(out, "Balance: {}", result.balance)?;
    Ok(())
}

pub fn console_history(out: &mut dyn Write, entries: &[JourneyHistoryEntry]) -> Result<()> {
    if entries.is_empty() {
        writeln!(out, "No finished journeys yet.")?;
        return Ok(());
    }
    for entry in entries {
        writeln!(
            out,
            "{}  {:<9} {:?}  {}/{} checked in  {} pts",
            entry.completed_at.format("%Y-%m-%d %H:%M"),
            entry.deal_type.to_string(),
            entry.outcome,
            entry.checked_in_stops,
            entry.planned_stops,
            entry.points
        )?;
    }
    Ok(())
}

pub fn console_stats(out: &mut dyn Write, stats: &RedemptionStats) -> Result<()> {
    writeln!(out, "{}", "📊 Redemptions".bright_cyan().bold())?;
    writeln!(
        out,
        "Today: {} ({} vendors)",
        stats.today.count, stats.today.unique_vendors
    )?;
    writeln!(
        out,
        "Total: {} ({} vendors)",
        stats.total.count, stats.total.unique_vendors
    )?;
    Ok(())
}

pub fn console_points(out: &mut dyn Write, ledger: &PointsLedger) -> Result<()> {
    writeln!(out, "Points balance: {}", ledger.balance.to_string().green().bold())?;
    Ok(())
}

pub fn console_deals(out: &mut dyn Write, deals: &[DealRecord]) -> Result<()> {
    if deals.is_empty() {
        writeln!(out, "No deals available today.")?;
        return Ok(());
    }
    for deal in deals {
        writeln!(out, "[{}] {} - {}", deal.vendor_id, deal.title.bold(), deal.discount_text)?;
        for restriction in &deal.restrictions {
            writeln!(out, "      • {restriction}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealtrail_engine::{ErrorKind, RedemptionTally};

    fn render(f: impl FnOnce(&mut dyn Write) -> Result<()>) -> String {
        colored::control::set_override(false);
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn failed_plan_shows_code_and_message() {
        let response = PlanResponse {
            success: false,
            vendors: None,
            route: None,
            error: Some(ErrorKind::AllVendorsRedeemed),
            message: Some("come back tomorrow".into()),
        };
        let text = render(|out| console_plan(out, &response));
        assert!(text.contains("AllVendorsRedeemed"));
        assert!(text.contains("come back tomorrow"));
    }

    #[test]
    fn stats_and_empty_history_render() {
        let stats = RedemptionStats {
            today: RedemptionTally { count: 2, unique_vendors: 1 },
            total: RedemptionTally { count: 5, unique_vendors: 3 },
        };
        let text = render(|out| console_stats(out, &stats));
        assert!(text.contains("Today: 2 (1 vendors)"));
        assert!(text.contains("Total: 5 (3 vendors)"));
        assert!(render(|out| console_history(out, &[])).contains("No finished journeys"));
    }

    #[test]
    fn json_report_uses_wire_names() {
        let ledger = PointsLedger { balance: 42, last_credited: None };
        let text = render(|out| write_json(out, &ledger));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["balance"], 42);
        assert!(value.get("lastCredited").is_some());
    }
}
