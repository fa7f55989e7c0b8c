pub mod codec;
pub mod generator;
pub mod record;
pub mod sort_key;

pub use record::{Record, as_number, number_value, records_from_json};
pub use sort_key::{Direction, SortKey, SortKeySpec, compare_values};
pub use serde_json::{Value, json};

/// Writes `count` generated employee records as `employees_<count>.csv` into
/// `out_dir`, leaving files that already exist untouched.
pub fn generate_data(
    out_dir: &std::path::Path,
    counts: impl Iterator<Item = usize>,
) -> anyhow::Result<Vec<std::path::PathBuf>> {
    let mut written = Vec::new();
    for count in counts {
        let file_name = format!("employees_{count}.csv");
        let file_path = out_dir.join(file_name.as_str());
        if let Ok(file) = std::fs::File::create_new(&file_path) {
            write_data_file(&file, count)?;
            written.push(file_path);
        }
    }
    Ok(written)
}

fn write_data_file(file: &std::fs::File, count: usize) -> anyhow::Result<()> {
    let records: Vec<Record> = generator::EmployeeGenerator::new().take(count).collect();
    codec::write_csv_with_header(
        &records,
        generator::EmployeeGenerator::FIELDS,
        std::io::BufWriter::new(file),
    )
}

/// Lists `employees_<count>.csv` files in `dir`, sorted by count.
pub fn list_data_files(dir: &std::path::Path) -> anyhow::Result<Vec<(u64, std::path::PathBuf)>> {
    // IMPLEMENTATION NOTES:
    // Every entry is visited so that io errors surface instead of being
    // skipped by a lazy iterator.
    let mut files = vec![];
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            if let Some(count) = get_count(&path) {
                files.push((count, path));
            }
        }
    }

    files.sort();

    Ok(files)
}

fn get_count(path: &std::path::Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    stem.strip_prefix("employees_")?.parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_files_are_listed_by_count() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let written = generate_data(dir.path(), [30, 5].into_iter())?;
        assert_eq!(written.len(), 2);
        // existing files are left alone
        assert!(generate_data(dir.path(), [5].into_iter())?.is_empty());

        std::fs::write(dir.path().join("notes.txt"), "ignored")?;
        let listed: Vec<u64> = list_data_files(dir.path())?
            .into_iter()
            .map(|(count, _)| count)
            .collect();
        assert_eq!(listed, [5, 30]);

        let rows = codec::CsvRecords::open(&written[0])?.count();
        assert_eq!(rows, 30);
        Ok(())
    }
}
