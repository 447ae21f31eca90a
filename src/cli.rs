use crate::records::Category;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Load every category and serve the search API and web UI
    Serve {
        /// Overrides `listen_addr` from config.yaml
        #[clap(short, long)]
        listen: Option<String>,
    },

    /// Search one category and print the response as JSON
    Search {
        #[clap(short, long, value_enum)]
        category: Category,

        /// Number of results; defaults to `default_num_results`
        #[clap(short = 'n', long)]
        num_results: Option<usize>,

        query: String,
    },

    /// Fetch every category's page tree from the wiki
    Ingest {},

    /// Extract labelled fields from fetched pages
    Normalize {},

    /// Embed normalized records and write the search artifacts
    Vectorize {},

    /// Ingest, normalize and vectorize in one go
    Update {
        /// Address of a running daemon to reload afterwards
        #[clap(long)]
        reload_url: Option<String>,
    },

    /// Print the first normalized record of each category
    Check {},
}
