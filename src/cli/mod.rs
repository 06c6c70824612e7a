//! Command-line interface for MyQ Home
//!
//! `serve` runs the HTTP bridge; `client` manages OAuth client
//! registrations in the configured credential store.

use crate::Result;
use crate::auth::register_client;
use crate::config::Config;
use clap::{Arg, ArgAction, ArgMatches, Command};

/// Main CLI entry point
pub async fn run() -> Result<()> {
    let matches = build_cli().get_matches();

    let config = match matches.get_one::<String>("config") {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    crate::init_logging(config.log_level());

    match matches.subcommand() {
        Some(("serve", sub_matches)) => handle_serve_command(config, sub_matches).await,
        Some(("client", sub_matches)) => handle_client_command(config, sub_matches).await,
        _ => {
            eprintln!("No command specified. Use --help for usage information.");
            std::process::exit(1);
        }
    }
}

/// Build the command tree
fn build_cli() -> Command {
    Command::new("myq-home")
        .about("MyQ Home - OAuth2 bridge to the MyQ device API")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .help("Path to a JSON or YAML config file"),
        )
        .subcommand(
            Command::new("serve")
                .about("Start the HTTP server")
                .arg(Arg::new("host").long("host").help("Host to bind"))
                .arg(
                    Arg::new("port")
                        .long("port")
                        .value_parser(clap::value_parser!(u16))
                        .help("Port to bind"),
                ),
        )
        .subcommand(
            Command::new("client")
                .about("OAuth client management")
                .subcommand_required(true)
                .subcommand(
                    Command::new("register")
                        .about("Register an OAuth client")
                        .arg(Arg::new("name").long("name").required(true))
                        .arg(
                            Arg::new("redirect-uri")
                                .long("redirect-uri")
                                .required(true)
                                .action(ArgAction::Append)
                                .help("Allowed redirect URI (repeatable)"),
                        )
                        .arg(Arg::new("scope").long("scope").default_value(""))
                        .arg(
                            Arg::new("grant")
                                .long("grant")
                                .action(ArgAction::Append)
                                .help("Allowed grant type (repeatable, default: both)"),
                        )
                        .arg(Arg::new("json").long("json").action(ArgAction::SetTrue)),
                )
                .subcommand(
                    Command::new("list")
                        .about("List OAuth clients")
                        .arg(Arg::new("json").long("json").action(ArgAction::SetTrue)),
                ),
        )
}

async fn handle_serve_command(mut config: Config, matches: &ArgMatches) -> Result<()> {
    // CLI flags override the config file
    if let Some(host) = matches.get_one::<String>("host") {
        config.http.host = host.clone();
    }
    if let Some(port) = matches.get_one::<u16>("port") {
        config.http.port = *port;
    }
    config.validate()?;

    crate::http::start_server(config).await
}

fn strings(matches: &ArgMatches, key: &str) -> Vec<String> {
    matches
        .get_many::<String>(key)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

async fn handle_client_command(config: Config, matches: &ArgMatches) -> Result<()> {
    let storage = crate::storage::create_storage_from_config(&config.storage).await?;

    match matches.subcommand() {
        Some(("register", sub)) => {
            let name = sub
                .get_one::<String>("name")
                .map(String::as_str)
                .unwrap_or_default();
            let scope = sub
                .get_one::<String>("scope")
                .map(String::as_str)
                .unwrap_or_default();

            let client = register_client(
                storage.as_ref(),
                name,
                strings(sub, "redirect-uri"),
                scope,
                strings(sub, "grant"),
            )
            .await?;

            if sub.get_flag("json") {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "client_id": client.id,
                        "client_secret": client.secret,
                    }))?
                );
            } else {
                println!("\nOAuth client registered");
                println!("Client ID:     {}", client.id);
                println!("Client Secret: {}", client.secret);
            }
        }
        Some(("list", sub)) => {
            let clients = storage.list_clients().await?;

            if sub.get_flag("json") {
                let listed: Vec<_> = clients
                    .iter()
                    .map(|c| {
                        serde_json::json!({
                            "id": c.id,
                            "name": c.name,
                            "redirect_uris": c.redirect_uris,
                            "grant_types": c.grant_types,
                            "scope": c.scope,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&listed)?);
            } else {
                println!("\nOAuth Clients:");
                for client in clients {
                    println!("  {} ({})", client.name, client.id);
                }
            }
        }
        _ => {}
    }
    Ok(())
}
