mod cell;
mod cli;
mod db;
mod dedup;
mod dictionary;
mod error;
mod extractor;
mod fmt;
mod gapfill;
mod header;
mod importer;
mod layout;
mod models;
mod normalize;
mod render;
mod settings;
mod sheet;
mod store;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("salonbook=warn")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Import(args) => cli::import::run(&args),
        Commands::FillGaps => cli::fill::run(),
        Commands::Report { customer } => cli::report::run(customer.as_deref()),
        Commands::Export { output, customer } => cli::export::run(&output, customer.as_deref()),
        Commands::Cleanup {
            customer,
            from_date,
            to_date,
        } => cli::cleanup::run(&customer, from_date, to_date),
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
