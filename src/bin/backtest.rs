use spreadbot::backtest::{
    MarketScenario, SimulationReport, SimulationRunner, SyntheticDataGenerator,
};
use spreadbot::Settings;

/// Bars per scenario: a week of 5-minute bars
const NUM_BARS: usize = 12 * 24 * 7;
const SEED: u64 = 42;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("spreadbot=info")
        .init();

    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║        SPREADBOT MOVING AVERAGE REPLAY SUITE          ║");
    println!("╚═══════════════════════════════════════════════════════╝");

    let settings = Settings::default();
    let runner = SimulationRunner::new(settings.sim_ticks, settings.sim_initial_cash);

    let mut results = Vec::new();

    for scenario in MarketScenario::all() {
        let mut generator = SyntheticDataGenerator::new(SEED);
        let closes: Vec<f64> = generator
            .generate(scenario, NUM_BARS, 5)
            .iter()
            .map(|bar| bar.close)
            .collect();

        let report = runner.run_windows(&closes, settings.ma_long_window, settings.ma_short_window);
        tracing::info!(
            scenario = scenario.label(),
            final_cash = report.final_cash,
            buys = report.buys,
            sells = report.sells,
            "Replay finished"
        );
        results.push((scenario.label(), report));
    }

    print_summary_comparison(&results);
}

fn print_summary_comparison(results: &[(&str, SimulationReport)]) {
    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║              SCENARIO COMPARISON                      ║");
    println!("╚═══════════════════════════════════════════════════════╝\n");

    println!(
        "{:<30} {:>10} {:>10} {:>6} {:>6} {:>8}",
        "Scenario", "Cash", "Return%", "Buys", "Sells", "Refused"
    );
    println!("{}", "─".repeat(76));

    for (name, report) in results {
        println!(
            "{:<30} {:>10.2} {:>10.2} {:>6} {:>6} {:>8}",
            name,
            report.final_cash,
            report.return_pct(),
            report.buys,
            report.sells,
            report.refused_sells
        );
    }

    if let Some((best_name, best)) = results
        .iter()
        .max_by(|a, b| a.1.return_pct().total_cmp(&b.1.return_pct()))
    {
        println!("\nBest Scenario: {} ({:+.2}%)", best_name, best.return_pct());
    }

    if let Some((worst_name, worst)) = results
        .iter()
        .min_by(|a, b| a.1.return_pct().total_cmp(&b.1.return_pct()))
    {
        println!("Worst Scenario: {} ({:+.2}%)", worst_name, worst.return_pct());
    }

    println!("\n═══════════════════════════════════════════════════════\n");
}
