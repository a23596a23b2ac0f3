// src/main.rs

use std::env;
use std::error::Error;

use ato_pricing::io::{params, reporting};
use ato_pricing::model::store::StoreModel;
use ato_pricing::simulation::engine::AtoModel;
use ato_pricing::simulation::stability::StabilityMonitor;
use ato_pricing::surface::optimizer::ResponseSurfaceOptimizer;
use tracing::info;

const DEFAULT_SETTINGS: &str = "settings/small_fashion_solver.json";

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    println!("=== Assemble-to-Order Price Optimization ===");

    // 1. LOAD SETTINGS
    // usage: ato-pricing [run settings] [store parameters override]
    let mut args = env::args().skip(1);
    let path = args.next().unwrap_or_else(|| DEFAULT_SETTINGS.to_string());
    let store_override = args.next();
    let config = params::load_run_config(&path)?;

    // 2. BUILD THE STORE AND THE ALLOCATION MODEL
    let store = StoreModel::new(config.store.clone(), config.profile.clone())?;
    let features = store.features();
    info!(
        kind = %features.kind,
        name = %features.name,
        products = ?features.products,
        "store loaded"
    );
    let mut ato = AtoModel::new(store, config.n_scenarios)?;
    if let Some(store_path) = &store_override {
        // e.g. updated costs or capacities for the same store
        ato.set_store_params(params::load_store_params(store_path)?)?;
        info!(path = %store_path, "store parameters replaced");
    }

    // 3. SEARCH THE PRICE GRID
    let mut optimizer = ResponseSurfaceOptimizer::new(config.surface.clone())?;
    if let Some(stability) = config.stability.clone() {
        optimizer = optimizer.with_stability_monitor(StabilityMonitor::new(stability)?);
    }
    let optimum = optimizer.optimize(&mut ato)?;

    println!("\n=== Result ===");
    for (product, price) in ato.store().products().iter().zip(&optimum.prices) {
        println!("{}: {}", product, price);
    }
    println!("Predicted revenue: {:.2}", optimum.predicted);
    println!("Metamodel R^2: {:.4}", optimum.fit_score);
    if !optimum.converged {
        println!("Warning: the surrogate search did not converge.");
    }

    // 4. VERIFY THE RECOMMENDATION
    let prices: Vec<f64> = optimum.prices.iter().map(|p| *p as f64).collect();
    let verification = ato.evaluate_detailed(&prices, config.verification_seed)?;
    println!(
        "Simulated profit at the recommended prices ({} scenarios): {:.2}",
        ato.n_scenarios(),
        verification.profit
    );
    for (item, quantity) in ato.store().items().iter().zip(&verification.production) {
        println!("  produce {}: {}", item, quantity);
    }

    // 5. EXPORT RESULTS
    if let Some(report_path) = &config.report_path {
        reporting::write_response_surface(report_path, optimizer.responses())?;
        println!("Response surface written to ./{}", report_path);
    }

    println!("\nOptimization Complete.");
    Ok(())
}
