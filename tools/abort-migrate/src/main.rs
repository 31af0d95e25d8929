//! abort-migrate: import legacy per-ring JSON abort logs into the abort store
//!
//! Usage:
//!   abort-migrate -u <database-url> -r <root> -H <her dir> -L <ler dir>
//!
//! Every `**/*.json` file under `<root>/<her dir>` and `<root>/<ler dir>` is one
//! abort: a list of per-channel entries. Files with the same name in both
//! rings are the same abort and become a single both-ring incident.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use abort_engine::{EngineError, IncidentId, IncidentStore, PgStore, Ring, SignalRecord, Timestamp};

type BoxError = Box<dyn std::error::Error>;

#[derive(Debug, Parser)]
#[command(name = "abort-migrate", about = "Import legacy JSON abort logs")]
struct Args {
    /// PostgreSQL connection URL
    #[arg(short = 'u', long, env = "DATABASE_URL")]
    database_url: String,

    /// Root directory of the legacy logs
    #[arg(short = 'r', long)]
    root: PathBuf,

    /// HER directory, relative to the root
    #[arg(short = 'H')]
    her_dir: PathBuf,

    /// LER directory, relative to the root
    #[arg(short = 'L')]
    ler_dir: PathBuf,
}

/// One channel entry of a legacy abort file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
struct LegacyEntry {
    name: String,
    #[serde(default)]
    msg: String,
    /// Channel timestamp; defaults to `date` at microsecond precision.
    #[serde(default)]
    ts: Option<String>,
    /// Abort timestamp.
    date: String,
    reset: i64,
    tcnt: i64,
    acnt: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Planned {
    OneRing(Ring, PathBuf),
    BothRings { her: PathBuf, ler: PathBuf },
}

fn file_name(path: &Path) -> &std::ffi::OsStr {
    path.file_name().unwrap_or(path.as_os_str())
}

/// All `**/*.json` files under `dir`, sorted by path.
fn collect_json(dir: &Path) -> Result<Vec<PathBuf>, BoxError> {
    let pattern = dir.join("**").join("*.json");
    let mut paths = Vec::new();
    for entry in glob::glob(&pattern.to_string_lossy())? {
        paths.push(entry?);
    }
    paths.sort();
    Ok(paths)
}

/// Walk both sorted lists merge-style, pairing files by name.
fn plan(her: &[PathBuf], ler: &[PathBuf]) -> Vec<Planned> {
    let mut out = Vec::with_capacity(her.len().max(ler.len()));
    let (mut ih, mut il) = (0, 0);
    while ih < her.len() || il < ler.len() {
        let order = match (her.get(ih), ler.get(il)) {
            (Some(h), Some(l)) => file_name(h).cmp(file_name(l)),
            (Some(_), None) => Ordering::Less,
            (None, _) => Ordering::Greater,
        };
        match order {
            Ordering::Less => {
                out.push(Planned::OneRing(Ring::Her, her[ih].clone()));
                ih += 1;
            }
            Ordering::Greater => {
                out.push(Planned::OneRing(Ring::Ler, ler[il].clone()));
                il += 1;
            }
            Ordering::Equal => {
                out.push(Planned::BothRings {
                    her: her[ih].clone(),
                    ler: ler[il].clone(),
                });
                ih += 1;
                il += 1;
            }
        }
    }
    out
}

fn load_entries(path: &Path) -> Result<Vec<LegacyEntry>, BoxError> {
    let contents = fs::read_to_string(path)?;
    let entries: Vec<LegacyEntry> = serde_json::from_str(&contents)
        .map_err(|e| EngineError::parse(format!("{}: {}", path.display(), e)))?;
    if entries.is_empty() {
        return Err(EngineError::parse(format!("{}: no entries", path.display())).into());
    }
    Ok(entries)
}

/// Incident time: the earliest first-entry `DATE` of the given files.
fn incident_time(files: &[&[LegacyEntry]]) -> Result<Timestamp, EngineError> {
    let mut first: Option<Timestamp> = None;
    for entries in files {
        if let Some(entry) = entries.first() {
            let t = Timestamp::parse(&entry.date)?;
            first = Some(first.map_or(t, |f| f.min(t)));
        }
    }
    first.ok_or_else(|| EngineError::parse("abort without entries"))
}

fn to_record(entry: &LegacyEntry, incident: IncidentId) -> Result<SignalRecord, EngineError> {
    let abort_ts = Timestamp::parse(&entry.date)?;
    let channel_ts = match &entry.ts {
        Some(ts) => Timestamp::parse(ts)?,
        None => abort_ts.truncate_to_micros(),
    };
    Ok(SignalRecord {
        incident_id: Some(incident),
        channel: entry.name.clone(),
        message: entry.msg.clone(),
        channel_ts,
        abort_ts,
        reset_count: entry.reset,
        trigger_count: entry.tcnt,
        interrupt_count: entry.acnt,
    })
}

async fn register(store: &PgStore, files: &[(Ring, Vec<LegacyEntry>)]) -> Result<IncidentId, BoxError> {
    let slices: Vec<&[LegacyEntry]> = files.iter().map(|(_, e)| e.as_slice()).collect();
    let id = store.insert_incident(incident_time(&slices)?).await?;

    for (ring, entries) in files {
        let channels: Vec<(String, Ring)> = entries.iter().map(|e| (e.name.clone(), *ring)).collect();
        store.insert_channels(&channels).await?;
        let records = entries
            .iter()
            .map(|e| to_record(e, id))
            .collect::<Result<Vec<_>, _>>()?;
        store.insert_signal_records(&records, Some(id)).await?;
    }
    Ok(id)
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    let her = collect_json(&args.root.join(&args.her_dir))?;
    let ler = collect_json(&args.root.join(&args.ler_dir))?;

    let store = PgStore::connect(&args.database_url).await?;
    store.migrate().await?;

    let mut imported = 0;
    for step in plan(&her, &ler) {
        match &step {
            Planned::OneRing(ring, path) => {
                println!("One ring: {}", path.display());
                register(&store, &[(*ring, load_entries(path)?)]).await?;
            }
            Planned::BothRings { her, ler } => {
                println!("Both ring: {}, {}", her.display(), ler.display());
                let files = [(Ring::Her, load_entries(her)?), (Ring::Ler, load_entries(ler)?)];
                register(&store, &files).await?;
            }
        }
        imported += 1;
    }

    println!("Imported {} aborts.", imported);
    Ok(())
}
