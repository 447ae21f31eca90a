use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod config;
mod ingest;
mod normalize;
mod pipeline;
mod records;
mod semantic;
mod storage;
#[cfg(test)]
mod tests;
mod web;

use app::AppFactory;
use storage::BackendLocal;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    init_logging();

    let paths = AppFactory::get_paths()?;
    let config = AppFactory::create_config(&paths)?;

    match args.command {
        cli::Command::Serve { listen } => {
            let service = AppFactory::create_search_service(&paths, &config)?;
            let addr = listen.unwrap_or_else(|| config.listen_addr.clone());
            web::start_daemon(service, &addr)?;
        }

        cli::Command::Search {
            category,
            num_results,
            query,
        } => {
            let service = AppFactory::create_search_service(&paths, &config)?;
            let best_matches = service.search(category, &query, num_results)?;
            print_json(&web::SearchResponse {
                query,
                best_matches,
            })?;
        }

        cli::Command::Ingest {} => {
            let data = BackendLocal::new(&paths.data_path)?;
            let reports = ingest::ingest(&config.confluence, &data)?;
            print_json(&reports)?;
        }

        cli::Command::Normalize {} => {
            let data = BackendLocal::new(&paths.data_path)?;
            for (category, count) in normalize::normalize_all(&data)? {
                println!("{category}: {count} records");
            }
        }

        cli::Command::Vectorize {} => {
            let model = AppFactory::create_embedding_model(&config)?;
            let reports = pipeline::vectorize_all(&paths, &config, &model)?;
            print_json(&reports)?;
        }

        cli::Command::Update { reload_url } => {
            let model = AppFactory::create_embedding_model(&config)?;
            pipeline::update(&paths, &config, &model, reload_url.as_deref())?;
        }

        cli::Command::Check {} => {
            let data = BackendLocal::new(&paths.data_path)?;
            for (category, first) in pipeline::check(&data) {
                println!("\n{category}:");
                match first {
                    Ok(Some(record)) => print_json(&record)?,
                    Ok(None) => println!("(empty)"),
                    Err(err) => println!("error: {err:#}"),
                }
            }
        }
    }

    Ok(())
}
