//! Tweet records and the sources that produce them.
//!
//! The rest of the crate only needs `screen_name` and `account_created_at`,
//! so every source reduces its input to [`TweetRecord`].

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use flate2::read::MultiGzDecoder;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const HANDLE_COLUMN: &str = "screen_name";
pub const CREATED_COLUMN: &str = "account_created_at";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TweetRecord {
    pub screen_name: String,
    pub account_created_at: DateTime<Utc>,
    pub text: Option<String>,
}

impl TweetRecord {
    pub fn new(screen_name: impl Into<String>, account_created_at: DateTime<Utc>) -> Self {
        TweetRecord {
            screen_name: screen_name.into(),
            account_created_at,
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Anything that can populate the tweet table.
pub trait RecordSource {
    fn fetch(&self) -> Result<Vec<TweetRecord>>;
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    screen_name: String,
    account_created_at: String,
    #[serde(default)]
    text: Option<String>,
}

/// Delimited tweet table on disk, optionally gzip-compressed.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvSource { path: path.into() }
    }
}

impl RecordSource for CsvSource {
    fn fetch(&self) -> Result<Vec<TweetRecord>> {
        let file = File::open(&self.path).map_err(|e| Error::io(&self.path, e))?;
        let mut reader = BufReader::new(file);
        let compressed = reader
            .fill_buf()
            .map_err(|e| Error::io(&self.path, e))?
            .starts_with(&GZIP_MAGIC);
        debug!(path = %self.path.display(), compressed, "opening tweet table");

        let input: Box<dyn Read> = if compressed {
            Box::new(MultiGzDecoder::new(reader))
        } else {
            Box::new(reader)
        };
        let records = read_records(input, &self.path)?;
        info!(path = %self.path.display(), records = records.len(), "loaded tweet table");
        Ok(records)
    }
}

/// Parses a tweet table from any reader. `origin` is only used in errors.
pub fn read_records<R: Read>(input: R, origin: &Path) -> Result<Vec<TweetRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(input);
    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        warn!(path = %origin.display(), "tweet table is empty");
        return Ok(Vec::new());
    }
    for column in [HANDLE_COLUMN, CREATED_COLUMN] {
        if !headers.iter().any(|h| h == column) {
            return Err(Error::MissingColumn {
                path: origin.to_path_buf(),
                column,
            });
        }
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let line = row.position().map_or(0, |p| p.line());
        let raw: RawRecord = row.deserialize(Some(&headers)).map_err(|e| Error::MalformedRecord {
            line,
            reason: e.to_string(),
        })?;
        let screen_name = raw.screen_name.trim();
        if screen_name.is_empty() {
            return Err(Error::MalformedRecord {
                line,
                reason: format!("empty `{HANDLE_COLUMN}`"),
            });
        }
        let account_created_at =
            parse_timestamp(&raw.account_created_at).ok_or_else(|| Error::Timestamp {
                line,
                value: raw.account_created_at.clone(),
            })?;
        records.push(TweetRecord {
            screen_name: screen_name.to_string(),
            account_created_at,
            text: raw.text.filter(|t| !t.is_empty()),
        });
    }
    Ok(records)
}

/// Accepts the timestamp shapes found in exported tweet tables. Values
/// without an offset are taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(value, "%a %b %d %H:%M:%S %z %Y") {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S UTC"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Seeded generator of organic accounts plus planted account farms.
///
/// Farm members share one creation date and differ only in a numeric
/// suffix, so they surface in both the coincident-date table and the
/// nearest-neighbor graph.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    pub organic: usize,
    pub farms: usize,
    pub farm_size: usize,
    pub seed: u64,
    pub start: NaiveDate,
    pub days: u32,
    pub message: String,
}

impl Default for SyntheticSource {
    fn default() -> Self {
        SyntheticSource {
            organic: 140,
            farms: 3,
            farm_size: 8,
            seed: 7,
            start: NaiveDate::from_ymd_opt(2021, 8, 1).unwrap_or_default(),
            days: 30,
            message: "everyone should see this".to_string(),
        }
    }
}

const PREFIXES: [&str; 15] = [
    "dark", "shadow", "light", "blue", "red", "green", "gold", "silver", "phantom", "ninja",
    "stealth", "epic", "legend", "super", "mega",
];

const SUFFIXES: [&str; 15] = [
    "warrior", "hunter", "mage", "slayer", "knight", "rogue", "wizard", "assassin", "lord",
    "king", "queen", "master", "pro", "noob", "gamer",
];

impl SyntheticSource {
    fn rng_for(&self, stream: u64, index: usize) -> StdRng {
        StdRng::seed_from_u64(self.seed ^ (stream << 32) ^ index as u64)
    }

    fn timestamp(&self, day: u32, rng: &mut StdRng) -> DateTime<Utc> {
        let date = self.start + chrono::Days::new(u64::from(day));
        let naive = date
            .and_hms_opt(rng.gen_range(0..24), rng.gen_range(0..60), 0)
            .unwrap_or_default();
        Utc.from_utc_datetime(&naive)
    }

    fn organic_accounts(&self) -> Vec<TweetRecord> {
        let days = self.days.max(1);
        (0..self.organic)
            .into_par_iter()
            .map(|i| {
                let mut rng = self.rng_for(1, i);
                let prefix = PREFIXES[rng.gen_range(0..PREFIXES.len())];
                let suffix = SUFFIXES[rng.gen_range(0..SUFFIXES.len())];
                let handle = format!("{}{}{}", prefix, suffix, rng.gen_range(1..999));
                let day = rng.gen_range(0..days);
                TweetRecord::new(handle, self.timestamp(day, &mut rng))
            })
            .collect()
    }

    fn farm_accounts(&self) -> Vec<TweetRecord> {
        let days = self.days.max(1);
        (0..self.farms)
            .into_par_iter()
            .flat_map_iter(|farm| {
                let mut rng = self.rng_for(2, farm);
                let base = format!(
                    "{}{}",
                    PREFIXES[rng.gen_range(0..PREFIXES.len())],
                    SUFFIXES[rng.gen_range(0..SUFFIXES.len())]
                );
                let day = rng.gen_range(0..days);
                (0..self.farm_size)
                    .map(|member| {
                        let handle = format!("{}{:04}", base, rng.gen_range(0..10_000));
                        let created = self.timestamp(day, &mut rng);
                        debug!(farm, member, %handle, "planted farm account");
                        TweetRecord::new(handle, created)
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

impl RecordSource for SyntheticSource {
    fn fetch(&self) -> Result<Vec<TweetRecord>> {
        let mut seen = HashSet::new();
        let records: Vec<TweetRecord> = self
            .farm_accounts()
            .into_iter()
            .chain(self.organic_accounts())
            .filter(|r| seen.insert(r.screen_name.clone()))
            .map(|r| r.with_text(self.message.clone()))
            .collect();
        info!(records = records.len(), seed = self.seed, "generated synthetic tweets");
        Ok(records)
    }
}
