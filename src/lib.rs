pub mod clients;
pub mod config;
pub mod constants;
pub mod models;
pub mod services;

use std::path::Path;

use clients::graph::GraphClient;
use clients::ldap::DirectoryClient;
pub use config::Config;
use services::{ConsoleProgress, CsvExporter, ReconcileService};
use tracing::info;
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    let config = Config::load()?;
    config.validate()?;

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let fmt_layer = tracing_subscriber::fmt::layer();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "export" | "-e" | "--export" => {
            let output = args
                .iter()
                .position(|a| a == "--output")
                .and_then(|i| args.get(i + 1))
                .map(String::as_str);
            cmd_export(&config, output).await
        }

        "init" | "--init" => {
            Config::create_default_if_missing()?;
            println!("✓ Config file created. Edit config.toml and run again.");
            Ok(())
        }

        "help" | "-h" | "--help" => {
            print_help();
            Ok(())
        }

        _ => {
            println!("Unknown command: {}", args[1]);
            println!();
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!("Idaudit - Hybrid Identity Audit Export");
    println!("Reconciles AD and Entra ID user records into a single CSV");
    println!();
    println!("USAGE:");
    println!("  idaudit <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("  export [--output <path>]  Run the reconciliation and write the CSV");
    println!("  init                      Create default config file");
    println!("  help                      Show this help message");
    println!();
    println!("EXAMPLES:");
    println!("  idaudit init                          # Create config.toml");
    println!("  idaudit export                        # Export to the configured path");
    println!("  idaudit export --output users.csv     # Export to users.csv");
    println!();
    println!("CONFIG:");
    println!("  Edit config.toml to configure the directory and Entra connections.");
}

async fn cmd_export(config: &Config, output: Option<&str>) -> anyhow::Result<()> {
    let output_path = output.unwrap_or(&config.export.output_path);

    println!(
        "Connecting to directory {}:{} ...",
        config.directory.host, config.directory.port
    );
    let directory = DirectoryClient::connect(&config.directory).await?;

    let graph = if config.entra.enabled {
        Some(GraphClient::new(&config.entra))
    } else {
        info!("Entra source disabled in config");
        None
    };

    let exporter = CsvExporter::create(Path::new(output_path))?;

    println!("Building Entra user index ...");
    let service = ReconcileService::new(directory, graph, exporter);
    let stats = service.run(&ConsoleProgress).await?;

    println!();
    println!("{:-<70}", "");
    println!("Export complete!");
    println!("  Directory users:  {}", stats.directory_users);
    println!("  Matched in Entra: {}", stats.matched);
    println!("  Entra index size: {}", stats.cloud_index_size);
    if !stats.failed_prefixes.is_empty() {
        let failed: String = stats
            .failed_prefixes
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        println!("  Failed prefixes:  {failed}");
    }
    println!("  Output: {output_path}");

    Ok(())
}
