use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use mailprobe_lib::{BatchSummary, ResultRecord, ResultSink, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Human,
    Json,
    Ndjson,
    Csv,
}

impl Format {
    pub fn parse(s: &str) -> Result<Self> {
        let format = match s {
            "human" => Self::Human,
            "json" => Self::Json,
            "ndjson" => Self::Ndjson,
            "csv" => Self::Csv,
            other => bail!("unknown --format '{other}', use: human|json|ndjson|csv"),
        };
        if matches!(format, Self::Json | Self::Ndjson) && !cfg!(feature = "with-serde") {
            bail!("format={s} nécessite la feature 'with-serde'");
        }
        if format == Self::Csv && !cfg!(feature = "with-csv") {
            bail!("format=csv nécessite la feature 'with-csv'");
        }
        Ok(format)
    }
}

enum Target {
    Human(Box<dyn Write>),
    #[cfg(feature = "with-serde")]
    Ndjson(Box<dyn Write>),
    /// JSON is an array, so records are held until `finish`.
    #[cfg(feature = "with-serde")]
    Json(Box<dyn Write>, Vec<ResultRecord>),
    #[cfg(feature = "with-csv")]
    Csv(csv::Writer<Box<dyn Write>>),
}

/// Streams records to stdout or to `--out`, plus optional category exports.
pub struct OutputSink {
    target: Target,
    /// `(tmp, final)` renamed once everything is written.
    rename: Option<(PathBuf, PathBuf)>,
    #[cfg(feature = "with-csv")]
    exports: Option<CategoryExports>,
}

impl OutputSink {
    pub fn new(format: Format, out: Option<&Path>) -> Result<Self> {
        let (writer, rename): (Box<dyn Write>, _) = match out {
            Some(path) => {
                let tmp = tmp_path(path);
                let file = std::fs::File::create(&tmp)
                    .with_context(|| format!("create {}", tmp.display()))?;
                (
                    Box::new(io::BufWriter::new(file)),
                    Some((tmp, path.to_path_buf())),
                )
            }
            None => (Box::new(io::stdout()), None),
        };
        let target = match format {
            #[cfg(feature = "with-serde")]
            Format::Ndjson => Target::Ndjson(writer),
            #[cfg(feature = "with-serde")]
            Format::Json => Target::Json(writer, Vec::new()),
            #[cfg(feature = "with-csv")]
            Format::Csv => {
                let mut wtr = csv::Writer::from_writer(writer);
                wtr.write_record(RECORD_HEADER)?;
                Target::Csv(wtr)
            }
            _ => Target::Human(writer),
        };
        Ok(Self {
            target,
            rename,
            #[cfg(feature = "with-csv")]
            exports: None,
        })
    }

    #[cfg(feature = "with-csv")]
    pub fn with_exports(mut self, dir: &Path) -> Result<Self> {
        self.exports = Some(CategoryExports::create(dir)?);
        Ok(self)
    }
}

impl ResultSink for OutputSink {
    type Error = io::Error;

    fn write_batch(&mut self, records: &[ResultRecord]) -> io::Result<()> {
        match &mut self.target {
            Target::Human(out) => {
                for r in records {
                    write_human(out, r)?;
                }
            }
            #[cfg(feature = "with-serde")]
            Target::Ndjson(out) => {
                for r in records {
                    serde_json::to_writer(&mut *out, r)?;
                    out.write_all(b"\n")?;
                }
            }
            #[cfg(feature = "with-serde")]
            Target::Json(_, rows) => rows.extend_from_slice(records),
            #[cfg(feature = "with-csv")]
            Target::Csv(wtr) => {
                for r in records {
                    wtr.write_record(record_row(r))?;
                }
                wtr.flush()?;
            }
        }
        #[cfg(feature = "with-csv")]
        {
            if let Some(exports) = &mut self.exports {
                exports.append(records)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        match &mut self.target {
            Target::Human(out) => out.flush()?,
            #[cfg(feature = "with-serde")]
            Target::Ndjson(out) => out.flush()?,
            #[cfg(feature = "with-serde")]
            Target::Json(out, rows) => {
                serde_json::to_writer_pretty(&mut *out, rows)?;
                out.write_all(b"\n")?;
                out.flush()?;
            }
            #[cfg(feature = "with-csv")]
            Target::Csv(wtr) => wtr.flush()?,
        }
        if let Some((tmp, path)) = self.rename.take() {
            std::fs::rename(tmp, path)?;
        }
        #[cfg(feature = "with-csv")]
        {
            if let Some(exports) = self.exports.take() {
                exports.finish()?;
            }
        }
        Ok(())
    }
}

fn write_human(out: &mut dyn Write, r: &ResultRecord) -> io::Result<()> {
    let tag = match r.verdict {
        Verdict::Valid => "[VALID]",
        Verdict::Invalid => "[INVALID]",
        Verdict::Business => "[BUSINESS]",
        Verdict::SpamTrapOrDisposable => "[SPAMTRAP]",
        Verdict::Blocked => "[BLOCKED]",
    };
    write!(out, "{tag:<11} {}", r.original)?;
    if let Some(corrected) = r.corrected.as_deref().filter(|c| *c != r.original.trim()) {
        write!(out, " -> {corrected}")?;
    }
    writeln!(out, " :: {}", r.note)
}

pub fn print_summary(summary: &BatchSummary) {
    eprintln!("--- résumé ---");
    eprint!("{summary}");
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(feature = "with-csv")]
const RECORD_HEADER: [&str; 7] = [
    "Email",
    "Corrected Email",
    "MX Record",
    "SMTP FROM",
    "SMTP RCPT",
    "Interpretation",
    "Note",
];

#[cfg(feature = "with-csv")]
fn record_row(r: &ResultRecord) -> [String; 7] {
    [
        r.original.clone(),
        r.corrected.clone().unwrap_or_default(),
        r.exchanger.clone().unwrap_or_default(),
        r.mail_from_reply
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        r.rcpt_reply
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        r.verdict.as_str().to_string(),
        r.note.clone(),
    ]
}

/// `<category>_emails.csv` (single `Email` column) per verdict plus
/// `all_emails.csv`, written to temporary names and renamed on `finish`.
#[cfg(feature = "with-csv")]
struct CategoryExports {
    files: Vec<(Verdict, csv::Writer<std::fs::File>, PathBuf, PathBuf)>,
    all: (csv::Writer<std::fs::File>, PathBuf, PathBuf),
}

#[cfg(feature = "with-csv")]
impl CategoryExports {
    fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        let open = |name: &str| -> Result<(csv::Writer<std::fs::File>, PathBuf, PathBuf)> {
            let path = dir.join(name);
            let tmp = tmp_path(&path);
            let wtr = csv::Writer::from_path(&tmp)
                .with_context(|| format!("create {}", tmp.display()))?;
            Ok((wtr, tmp, path))
        };

        let mut files = Vec::with_capacity(Verdict::ALL.len());
        for verdict in Verdict::ALL {
            let (mut wtr, tmp, path) = open(&format!("{}_emails.csv", verdict.as_str()))?;
            wtr.write_record(["Email"])?;
            files.push((verdict, wtr, tmp, path));
        }
        let (mut all, tmp, path) = open("all_emails.csv")?;
        all.write_record(RECORD_HEADER)?;
        Ok(Self {
            files,
            all: (all, tmp, path),
        })
    }

    fn append(&mut self, records: &[ResultRecord]) -> io::Result<()> {
        for r in records {
            if let Some((_, wtr, _, _)) = self.files.iter_mut().find(|(v, ..)| *v == r.verdict) {
                wtr.write_record([r.original.as_str()])?;
            }
            self.all.0.write_record(record_row(r))?;
        }
        Ok(())
    }

    fn finish(self) -> io::Result<()> {
        for (_, mut wtr, tmp, path) in self.files {
            wtr.flush()?;
            std::fs::rename(tmp, path)?;
        }
        let (mut all, tmp, path) = self.all;
        all.flush()?;
        std::fs::rename(tmp, path)
    }
}
