use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Rewrite, search, extract, flatten, and write a spreadsheet in one go.
    Run(RunArgs),
    /// Turn a free-text request into a short search phrase.
    Rewrite(RewriteArgs),
    /// Find forum pages for a search phrase.
    Search(SearchArgs),
    /// Extract user interactions from forum pages into `pages.jsonl`.
    Extract(ExtractArgs),
    /// Flatten `pages.jsonl` into `rows.jsonl`.
    Flatten(FlattenArgs),
    /// Create a spreadsheet from `rows.jsonl` and print its link.
    Sheet(SheetArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// YAML config file (default: `$XDG_CONFIG_HOME/leadsheet/config.yaml`).
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Firecrawl API key (overrides config file and `FIRECRAWL_API_KEY`).
    #[arg(long, global = true)]
    pub firecrawl_api_key: Option<String>,

    /// Comma-separated Gemini API keys, rotated per request (1-3).
    #[arg(long, global = true)]
    pub gemini_api_keys: Option<String>,

    /// Composio API key with the Google Sheets integration enabled.
    #[arg(long, global = true)]
    pub composio_api_key: Option<String>,

    #[arg(long, global = true, hide = true)]
    pub firecrawl_base_url: Option<String>,

    #[arg(long, global = true, hide = true)]
    pub gemini_base_url: Option<String>,

    #[arg(long, global = true, hide = true)]
    pub composio_base_url: Option<String>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// What kind of leads you are looking for.
    #[arg(long)]
    pub query: String,

    /// Number of forum pages to search (1-10).
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub num_links: u8,

    /// Spreadsheet title (default: "AI Leads").
    #[arg(long)]
    pub title: Option<String>,

    /// Forum domain to search (default: from config, else quora.com).
    #[arg(long)]
    pub domain: Option<String>,

    /// Also save the flattened rows as JSONL.
    #[arg(long)]
    pub rows_out: Option<String>,
}

#[derive(Debug, Args)]
pub struct RewriteArgs {
    /// Free-text lead request.
    #[arg(long)]
    pub query: String,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    /// Short description of the product or service.
    #[arg(long)]
    pub description: String,

    /// Number of results to request (1-10).
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub num_links: u8,

    /// Forum domain to search.
    #[arg(long)]
    pub domain: Option<String>,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Forum page to extract (repeatable).
    #[arg(long, required = true)]
    pub url: Vec<String>,

    /// Output path for `pages.jsonl`.
    #[arg(long)]
    pub out: String,
}

#[derive(Debug, Args)]
pub struct FlattenArgs {
    /// Input `pages.jsonl` (created by `extract`).
    #[arg(long)]
    pub pages: String,

    /// Output path for `rows.jsonl`.
    #[arg(long)]
    pub out: String,
}

#[derive(Debug, Args)]
pub struct SheetArgs {
    /// Input `rows.jsonl` (created by `flatten`).
    #[arg(long)]
    pub rows: String,

    /// Spreadsheet title (default: "AI Leads").
    #[arg(long)]
    pub title: Option<String>,
}
