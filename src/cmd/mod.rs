pub mod analyze;
pub mod entity;
pub mod project;
pub mod schema;
pub mod summary;
pub mod validate;

use crate::core::{RateTable, TaxReturn};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Built-in rate year used when neither --year nor --rates is given
pub const DEFAULT_YEAR: u16 = 2025;

/// Read a tax return (JSON) from a file, or stdin with "-"
pub fn read_return(path: &Path) -> anyhow::Result<TaxReturn> {
    if path.as_os_str() == "-" {
        read_from_stdin()
    } else {
        read_from_file(path)
    }
}

fn read_from_file(path: &Path) -> anyhow::Result<TaxReturn> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let ret = serde_json::from_reader(reader)?;
    Ok(ret)
}

fn read_from_stdin() -> anyhow::Result<TaxReturn> {
    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin.lock());

    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer)?;

    if buffer.is_empty() {
        anyhow::bail!("No input received. Provide a file or pipe data to stdin.");
    }

    let ret = serde_json::from_slice(&buffer)?;
    Ok(ret)
}

/// Resolve the rate table: an explicit --rates file wins, then --year,
/// then the default year
pub fn load_rates(year: Option<u16>, rates: Option<&Path>) -> anyhow::Result<RateTable> {
    match rates {
        Some(path) => {
            let file = File::open(path)?;
            let table = RateTable::load_json(BufReader::new(file))?;
            Ok(table)
        }
        None => Ok(RateTable::for_year(year.unwrap_or(DEFAULT_YEAR))?),
    }
}
