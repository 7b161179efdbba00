//! `MX_Records.csv` persistence for [`MxCache`]: one row per domain, the
//! domain first and its exchangers after it. A row with no exchanger is a
//! cached negative answer.

use std::io;
use std::path::Path;

use super::{Error, MxCache};

const HEADER: [&str; 6] = [
    "Email domain",
    "MX Record #1",
    "MX Record #2",
    "MX Record #3",
    "MX Record #4",
    "MX Record #5",
];

pub fn read_entries<Rd: io::Read>(reader: Rd) -> Result<Vec<(String, Vec<String>)>, Error> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);
    let mut entries = Vec::new();
    for row in rdr.records() {
        let row = row.map_err(|source| Error::Persist { source })?;
        let mut fields = row.iter().map(str::trim);
        let Some(domain) = fields.next().filter(|d| !d.is_empty()) else {
            continue;
        };
        let hosts = fields
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect();
        entries.push((domain.to_string(), hosts));
    }
    Ok(entries)
}

pub fn write_entries<W: io::Write>(
    writer: W,
    entries: &[(String, Vec<String>)],
) -> Result<(), Error> {
    let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(writer);
    wtr.write_record(HEADER)
        .map_err(|source| Error::Persist { source })?;
    for (domain, hosts) in entries {
        let mut row = Vec::with_capacity(hosts.len() + 1);
        row.push(domain.as_str());
        row.extend(hosts.iter().map(String::as_str));
        wtr.write_record(&row)
            .map_err(|source| Error::Persist { source })?;
    }
    wtr.flush().map_err(|source| Error::PersistIo { source })
}

impl<R> MxCache<R> {
    /// Preloads entries from a cache file. A missing file is not an error.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<usize, Error> {
        let file = match std::fs::File::open(path.as_ref()) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(source) => return Err(Error::PersistIo { source }),
        };
        let entries = read_entries(io::BufReader::new(file))?;
        Ok(self.preload(entries))
    }

    /// Writes every settled entry, replacing the file atomically.
    pub fn save_file(&self, path: impl AsRef<Path>) -> Result<usize, Error> {
        let path = path.as_ref();
        let entries = self.snapshot();
        let mut buf = Vec::new();
        write_entries(&mut buf, &entries)?;

        let tmp = path.with_extension("csv.tmp");
        {
            use std::io::Write;
            let mut f = std::fs::File::create(&tmp).map_err(|source| Error::PersistIo { source })?;
            f.write_all(&buf)
                .map_err(|source| Error::PersistIo { source })?;
            f.sync_all().map_err(|source| Error::PersistIo { source })?;
        }
        std::fs::rename(&tmp, path).map_err(|source| Error::PersistIo { source })?;
        Ok(entries.len())
    }
}
