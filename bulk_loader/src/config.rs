use project_root::get_project_root;

use clap::Parser;

use std::path::PathBuf;

/// All loader settings: the engine sections shared with other hosts plus
/// the loader's own `paths` and `bulk_loader` sections.
#[derive(Debug, Clone)]
pub struct Config {
    pub rowflow: rowflow_config::Config,
    pub paths: PathsConfig,
    pub bulk_loader: BulkLoaderConfig,
}

#[derive(serde::Deserialize, Debug, Clone)]
struct Sections {
    paths: PathsConfig,
    bulk_loader: BulkLoaderConfig,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct PathsConfig {
    /// `.csv` or `.json` file to load.
    pub input: PathBuf,
    /// JSON pointer to the array of rows inside a `.json` input.
    #[serde(default)]
    pub json_pointer: Option<String>,
    pub output_dir: PathBuf,
    /// Where to write the step counter report as CSV, if anywhere.
    #[serde(default)]
    pub report_csv: Option<PathBuf>,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct BulkLoaderConfig {
    /// Sort keys, e.g. `last_name:asc,age:desc`.
    pub sort: String,
    pub table: String,
    #[serde(default)]
    pub filter: Option<FilterConfig>,
}

/// Keeps only rows whose `field` is greater than `greater_than`.
#[derive(serde::Deserialize, Debug, Clone)]
pub struct FilterConfig {
    pub field: String,
    pub greater_than: f64,
}

/// Parses command-line arguments using the clap derive macro.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Settings file; defaults to `config/settings.toml` in the project root.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    input: Option<PathBuf>,
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    #[arg(short, long)]
    sort: Option<String>,
    #[arg(short, long)]
    batch_size: Option<usize>,
    #[arg(long)]
    max_concurrent_flushes: Option<usize>,
}

/// Loads configuration from the TOML file and the environment, then merges
/// CLI arguments over it.
pub fn get_config() -> anyhow::Result<Config> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => get_project_root()?.join("config/settings.toml"),
    };
    let mut figment = rowflow_config::Config::figment(config_path);

    if let Some(input) = cli.input {
        figment = figment.merge(("paths.input", input));
    }
    if let Some(output_dir) = cli.output_dir {
        figment = figment.merge(("paths.output_dir", output_dir));
    }
    if let Some(sort) = cli.sort {
        figment = figment.merge(("bulk_loader.sort", sort));
    }
    if let Some(batch_size) = cli.batch_size {
        figment = figment.merge(("sink.batch-size", batch_size));
    }
    if let Some(max_concurrent_flushes) = cli.max_concurrent_flushes {
        figment = figment.merge(("sink.max-concurrent-flushes", max_concurrent_flushes));
    }

    let rowflow: rowflow_config::Config = figment.extract()?;
    rowflow.validate()?;
    let Sections { paths, bulk_loader } = figment.extract()?;

    Ok(Config {
        rowflow,
        paths,
        bulk_loader,
    })
}
