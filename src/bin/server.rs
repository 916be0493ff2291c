//! cordex API server.
//!
//! Usage:
//! ```bash
//! cordex-server <INDEX_DIR> [port]
//! ```
//!
//! Exits with status 1 when arguments are missing or the initial reload
//! fails.

use cordex::engine::Engine;
use cordex::server;
use std::sync::Arc;
use tokio::sync::Mutex;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <INDEX_DIR> [port]", args[0]);
        eprintln!("Example: {} ./index 8080", args[0]);
        std::process::exit(1);
    }

    let index_dir = std::path::PathBuf::from(&args[1]);
    let port: u16 = match args.get(2).map(|p| p.parse()) {
        None => 8080,
        Some(Ok(p)) => p,
        Some(Err(_)) => {
            eprintln!("Invalid port: {}", args[2]);
            std::process::exit(1);
        }
    };

    let mut engine = Engine::new(&index_dir);
    if let Err(e) = engine.reload() {
        eprintln!(
            "Failed to load index segments from {}: {}",
            index_dir.display(),
            e
        );
        std::process::exit(1);
    }

    let engine: server::SharedEngine = Arc::new(Mutex::new(engine));
    let app = server::router(engine.clone());

    let addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    println!("API running on http://127.0.0.1:{}", port);
    println!("Try: /api/search?q=mycoplasma+pneumonia&k=10");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Flush dirty caches before the process exits.
    engine.lock().await.flush_caches();

    if let Err(e) = result {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
