use clap::Parser;

fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    let data_dir = &config.data_dir;
    let counts = config.counts.iter().copied();
    std::fs::create_dir_all(data_dir)?;
    for path in rowflow_model::generate_data(data_dir, counts)? {
        println!("{}", path.display());
    }
    Ok(())
}

/// Writes `employees_<count>.csv` files of generated employees.
#[derive(Clone, Debug, Parser)]
#[command()]
struct Config {
    #[arg()]
    data_dir: Box<std::path::Path>,
    /// Row count of each file; files that already exist are kept.
    #[arg(required = true)]
    counts: Vec<usize>,
}
