//! MyQ Home CLI
//!
//! Run with: cargo run --bin myq-home -- serve
//! Or after build: ./target/release/myq-home serve

#[tokio::main]
async fn main() {
    // Load .env file as early as possible so `$env:` config values resolve
    let _ = dotenvy::dotenv();

    // Logging is initialized by the CLI once the config is loaded
    if let Err(e) = myq_home::cli::run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
