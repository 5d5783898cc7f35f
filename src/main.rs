use relay_coordination::config::Config;
use relay_coordination::export::{write_export_to_json, OptimizationExport};
use relay_coordination::runner::optimize_all;
use relay_coordination::scenario::load_scenarios;
use std::path::Path;
use std::process;

fn main() {
    env_logger::init();
    log::info!("Booting relay coordination optimizer...");

    // 1. Load and Validate Configuration
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = match Config::load(Path::new(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        log::error!("Invalid configuration: {}", e);
        process::exit(1);
    }
    log::info!("Configuration loaded and validated.");

    // 2. Load Scenarios
    let scenarios = match load_scenarios(Path::new(&config.data.scenarios_file)) {
        Ok(s) => s,
        Err(e) => {
            log::error!("Failed to load scenarios: {}", e);
            process::exit(1);
        }
    };
    if scenarios.is_empty() {
        log::error!(
            "No usable scenarios in '{}'",
            config.data.scenarios_file
        );
        process::exit(1);
    }
    log::info!(
        "Loaded {} scenarios from '{}'.",
        scenarios.len(),
        config.data.scenarios_file
    );

    // 3. Run the batch optimization
    log::info!("--- Starting Optimization ---");
    let results = optimize_all(&scenarios, &config);

    let mut succeeded = Vec::new();
    let mut failed = 0usize;
    for (scenario, result) in scenarios.iter().zip(results) {
        match result {
            Ok(optimized) => {
                let before = optimized
                    .before
                    .map(|m| format!("TMT {:.6}, {:.1}% coordinated", m.tmt, m.coordination_pct))
                    .unwrap_or_else(|| "unknown".to_string());
                println!(
                    "\n[{}] before: {} | after: TMT {:.6}, {:.1}% coordinated \
                     (best at generation {}/{})",
                    optimized.scenario_id,
                    before,
                    optimized.after.tmt,
                    optimized.after.coordination_pct,
                    optimized.best_generation,
                    optimized.generations_run,
                );
                for relay in &optimized.relays {
                    println!(
                        "  {}: TDS {:.5}, pickup {:.5} A",
                        relay.id, relay.tds, relay.pickup
                    );
                }
                succeeded.push(optimized);
            }
            Err(e) => {
                log::error!("Scenario '{}' failed: {}", scenario.id, e);
                failed += 1;
            }
        }
    }

    log::info!(
        "--- Optimization Complete: {} succeeded, {} failed ---",
        succeeded.len(),
        failed
    );

    // 4. Export results
    let output_path = config.data.output_file.clone();
    let export = OptimizationExport::new(config, &succeeded);
    if let Err(e) = write_export_to_json(&export, Path::new(&output_path)) {
        log::error!("Failed to write export: {}", e);
        process::exit(1);
    }
    log::info!("Results written to '{}'.", output_path);

    if failed > 0 {
        process::exit(2);
    }
}
