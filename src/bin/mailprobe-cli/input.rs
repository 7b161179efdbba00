use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};

/// Reads input addresses in file order. Blank lines are skipped; anything
/// else is kept, even without an `@`, so every line gets a verdict.
pub fn read_addresses(path: Option<&Path>, stdin: bool) -> Result<Vec<String>> {
    if stdin {
        return read_lines(io::stdin().lock()).context("read stdin");
    }
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    #[cfg(feature = "with-csv")]
    {
        if is_csv(path) {
            return read_csv(path);
        }
    }
    let file = std::fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    read_lines(BufReader::new(file)).with_context(|| format!("read {}", path.display()))
}

fn read_lines<R: BufRead>(reader: R) -> io::Result<Vec<String>> {
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            out.push(trimmed.to_string());
        }
    }
    Ok(out)
}

#[cfg(feature = "with-csv")]
fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

/// CSV with an `Email` column (case-insensitive); other columns are ignored.
#[cfg(feature = "with-csv")]
fn read_csv(path: &Path) -> Result<Vec<String>> {
    let file = std::fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    read_csv_from(file).with_context(|| format!("read {}", path.display()))
}

#[cfg(feature = "with-csv")]
fn read_csv_from<R: io::Read>(reader: R) -> Result<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let column = rdr
        .headers()?
        .iter()
        .position(|h| h.eq_ignore_ascii_case("email"))
        .context("no 'Email' column in CSV header")?;
    let mut out = Vec::new();
    for row in rdr.records() {
        let row = row?;
        if let Some(value) = row.get(column).filter(|v| !v.is_empty()) {
            out.push(value.to_string());
        }
    }
    Ok(out)
}
