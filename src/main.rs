use std::collections::HashMap;

use gee::config::Config;
use gee::{logger, Engine, StatusCode};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config".to_string());
    let cfg = Config::load_from(&config_path)?;
    logger::init(&cfg)?;

    // Worker count follows config, defaulting to CPU cores
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    let engine = build_engine();
    runtime.block_on(engine.run(&cfg.bind_address()))?;
    Ok(())
}

fn build_engine() -> Engine {
    let mut engine = Engine::new();

    engine.get("/", |c| c.html(StatusCode::OK, "<h1>Hello Gee</h1>"));

    engine.get("/hello", |c| {
        let name = c.query("name");
        let path = c.path().to_string();
        c.string(StatusCode::OK, format_args!("hello {name}, you're at {path}\n"));
    });

    engine.post("/login", |c| {
        let mut body = HashMap::new();
        body.insert("username", c.form_value("username"));
        body.insert("password", c.form_value("password"));
        c.json(StatusCode::OK, &body);
    });

    engine
}
