const DATA_DIR_ENV: &str = "STAND_DATA_DIR";

fn main() -> anyhow::Result<()> {
    let out_dir = std::path::PathBuf::from(std::env::var("OUT_DIR")?).join("data");
    std::fs::create_dir_all(&out_dir)?;

    let qualities = (1_000..=10_000).step_by(3_000);
    for path in rowflow_model::generate_data(&out_dir, qualities)? {
        println!("cargo::warning=generated {}", path.display());
    }

    println!("cargo::rerun-if-changed=build.rs");
    println!("cargo::rustc-env={DATA_DIR_ENV}={}", out_dir.display());
    Ok(())
}
