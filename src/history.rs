//! Per-step time series of a run and their on-disk archive.

use anyhow::{Context, Result, bail};
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Seek, Write},
    path::Path,
};
use zip::{CompressionMethod, ZipArchive, ZipWriter, write::SimpleFileOptions};

const HISTORY_ENTRY: &str = "history";
const R0_ENTRY: &str = "r0_history";

/// Number of agents in each status at one step.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Counts {
    pub susceptible: usize,
    pub infected: usize,
    pub recovered: usize,
}

impl Counts {
    pub fn total(&self) -> usize {
        self.susceptible + self.infected + self.recovered
    }

    fn to_row(self) -> [u64; 3] {
        [
            self.susceptible as u64,
            self.infected as u64,
            self.recovered as u64,
        ]
    }

    fn from_row(row: [u64; 3]) -> Self {
        Self {
            susceptible: row[0] as usize,
            infected: row[1] as usize,
            recovered: row[2] as usize,
        }
    }
}

/// Status counts as three aligned sequences.
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct CountSeries {
    pub susceptible: Vec<usize>,
    pub infected: Vec<usize>,
    pub recovered: Vec<usize>,
}

/// History record and raw R0 series of a run.
///
/// Both series only grow during a run; entries are never modified.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct History {
    counts: Vec<Counts>,
    r0: Vec<f64>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_counts(&mut self, counts: Counts) {
        self.counts.push(counts);
    }

    pub(crate) fn push_r0(&mut self, r0: f64) {
        self.r0.push(r0);
    }

    pub fn counts(&self) -> &[Counts] {
        &self.counts
    }

    pub fn r0(&self) -> &[f64] {
        &self.r0
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn counts_by_status(&self) -> CountSeries {
        CountSeries {
            susceptible: self.counts.iter().map(|c| c.susceptible).collect(),
            infected: self.counts.iter().map(|c| c.infected).collect(),
            recovered: self.counts.iter().map(|c| c.recovered).collect(),
        }
    }

    /// Save both series to a zip archive, replacing any existing file.
    ///
    /// The archive holds two deflated MessagePack entries: `history`
    /// (one `[S, I, R]` row per step) and `r0_history`.
    pub fn save<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let rows: Vec<_> = self.counts.iter().map(|c| c.to_row()).collect();
        zip.start_file(HISTORY_ENTRY, options)
            .context("failed to start history entry")?;
        encode::write(&mut zip, &rows).context("failed to serialize history")?;

        zip.start_file(R0_ENTRY, options)
            .context("failed to start R0 entry")?;
        encode::write(&mut zip, &self.r0).context("failed to serialize R0 history")?;

        let mut writer = zip.finish().context("failed to finish archive")?;
        writer.flush().context("failed to flush writer stream")?;

        Ok(())
    }

    /// Load both series from an archive written by [`History::save`].
    ///
    /// # Errors
    /// Fails if the file does not exist (the source error is an
    /// [`std::io::Error`] of kind `NotFound`), if either entry is missing,
    /// or if the content is malformed.
    pub fn load<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut zip = ZipArchive::new(BufReader::new(file)).context("failed to read archive")?;

        let rows: Vec<[u64; 3]> = read_entry(&mut zip, HISTORY_ENTRY)?;
        let r0: Vec<f64> = read_entry(&mut zip, R0_ENTRY)?;

        let history = Self {
            counts: rows.into_iter().map(Counts::from_row).collect(),
            r0,
        };
        history.check().context("inconsistent archive content")?;

        Ok(history)
    }

    fn check(&self) -> Result<()> {
        if self.r0.len() > self.counts.len() {
            bail!(
                "R0 history has {} entries, but history has only {}",
                self.r0.len(),
                self.counts.len()
            );
        }
        if let Some(first) = self.counts.first() {
            let population = first.total();
            if let Some(idx) = self.counts.iter().position(|c| c.total() != population) {
                bail!("counts at step {idx} do not sum to population {population}");
            }
        }
        Ok(())
    }
}

fn read_entry<R, T>(zip: &mut ZipArchive<R>, name: &str) -> Result<T>
where
    R: Read + Seek,
    T: for<'de> Deserialize<'de>,
{
    let entry = zip
        .by_name(name)
        .with_context(|| format!("failed to find {name:?} entry"))?;
    decode::from_read(entry).with_context(|| format!("failed to deserialize {name:?} entry"))
}
