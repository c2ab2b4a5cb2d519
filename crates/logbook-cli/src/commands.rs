//! Dataset subcommands. Each opens the book, performs one operation, and
//! prints the result.

use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;
use std::path::Path;

use anyhow::{Context as _, Result, bail};
use clap::Subcommand;
use logbook::dsref::{DsRef, VersionInfo, VersionSave};
use logbook::identity::AuthorId;
use logbook::model::types::DatasetName;
use logbook::oplog::{OpPayload, Oplog, SignedOperation};
use logbook_cas::Address;
use serde::Serialize;

use crate::format::OutputFormat;
use crate::session::Session;

/// Cache maintenance subcommands
#[derive(Subcommand)]
pub enum CacheCommands {
    /// Discard the dataset cache and rebuild it from the logs
    Rebuild,

    /// Print every cache entry
    Show,
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

pub fn init(session: &Session, name: DatasetName, format: OutputFormat) -> Result<()> {
    let dsref = session
        .book
        .init_dataset(&session.ctx, session.author(), name)?;
    format.emit(&dsref, ToString::to_string)
}

pub fn rename(
    session: &Session,
    dataset: &str,
    new_name: DatasetName,
    format: OutputFormat,
) -> Result<()> {
    let dsref = session.dataset_arg(dataset)?;
    let renamed = session
        .book
        .rename_dataset(&session.ctx, session.author(), &dsref, new_name)?;
    format.emit(&renamed, |r| format!("{} -> {r}", dsref.alias()))
}

pub fn save(
    session: &Session,
    dataset: &str,
    path: Address,
    title: String,
    previous: Option<Address>,
    format: OutputFormat,
) -> Result<()> {
    let dsref = session.dataset_arg(dataset)?;
    let base = match previous {
        Some(prev) => dsref.with_path(Some(prev)),
        None => session.book.resolve(&dsref.username, &dsref.name)?,
    };
    let saved = session.book.save_version(
        &session.ctx,
        session.author(),
        &VersionSave::on(&base, path, title),
    )?;
    format.emit(&saved, ToString::to_string)
}

pub fn delete(session: &Session, dataset: &str, count: u32, format: OutputFormat) -> Result<()> {
    let dsref = session.dataset_arg(dataset)?;
    let head = session
        .book
        .delete_versions(&session.ctx, session.author(), &dsref, count)?;
    format.emit(&head, ToString::to_string)
}

pub fn import(
    session: &Session,
    file: &Path,
    key: Option<AuthorId>,
    format: OutputFormat,
) -> Result<()> {
    let bytes = fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    if let Some(key) = key {
        let log = Oplog::from_json(&bytes)
            .with_context(|| format!("decoding oplog {}", file.display()))?;
        session.keys.insert(log.username().clone(), key);
    }
    let dsref = session.book.import_foreign(&session.ctx, &bytes)?;
    format.emit(&dsref, |r| format!("imported {r}"))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

pub fn resolve(session: &Session, reference: &str, format: OutputFormat) -> Result<()> {
    let dsref = session.dataset_arg(reference)?;
    let resolved = session.book.resolve_ref(&dsref)?;
    format.emit(&resolved, ToString::to_string)
}

pub fn list(session: &Session, format: OutputFormat) -> Result<()> {
    let refs = session.book.list();
    format.emit(&refs, |refs: &Vec<DsRef>| {
        refs.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
    })
}

pub fn versions(session: &Session, dataset: &str, format: OutputFormat) -> Result<()> {
    let dsref = session.dataset_arg(dataset)?;
    let versions = session.book.versions(&dsref)?;
    format.emit(&versions, |versions: &Vec<VersionInfo>| {
        let mut out = String::new();
        for v in versions {
            let path = v.dsref.path.as_ref().map_or("", Address::as_str);
            let _ = writeln!(out, "{path}  {}  {}", v.timestamp, v.title);
        }
        out.trim_end().to_owned()
    })
}

#[derive(Serialize)]
struct LogLine<'a> {
    timestamp: i64,
    author: String,
    #[serde(flatten)]
    payload: &'a OpPayload,
}

fn describe(op: &SignedOperation) -> String {
    match &op.op.payload {
        OpPayload::Init { name } => format!("init {name}"),
        OpPayload::Rename { name } => format!("rename -> {name}"),
        OpPayload::VersionSave {
            previous_path,
            path,
            title,
        } => match previous_path {
            Some(prev) => format!("save {path} (on {prev}) {title:?}"),
            None => format!("save {path} {title:?}"),
        },
        OpPayload::VersionDelete { count } => format!("delete {count}"),
    }
}

/// Print a dataset's raw operation history, oldest first.
pub fn log(session: &Session, dataset: &str, format: OutputFormat) -> Result<()> {
    let dsref = session.dataset_arg(dataset)?;
    let oplog = session.book.oplog(&dsref)?;
    let lines: Vec<LogLine<'_>> = oplog
        .ops()
        .iter()
        .map(|op| LogLine {
            timestamp: op.op.timestamp,
            author: op.op.author.short(),
            payload: &op.op.payload,
        })
        .collect();
    format.emit(&lines, |_| {
        let mut out = format!("{} ({})\n", dsref.alias(), oplog.id());
        for op in oplog.ops() {
            let _ = writeln!(out, "{}  {}", op.op.timestamp, describe(op));
        }
        out.trim_end().to_owned()
    })
}

/// Write a dataset's signed log to stdout, for import elsewhere.
pub fn export(session: &Session, dataset: &str) -> Result<()> {
    let dsref = session.dataset_arg(dataset)?;
    let oplog = session.book.oplog(&dsref)?;
    let bytes = oplog.to_canonical_json()?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&bytes).context("writing to stdout")?;
    stdout.write_all(b"\n").context("writing to stdout")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

pub fn cache(session: &Session, cmd: &CacheCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        CacheCommands::Rebuild => {
            let count = session.book.rebuild_cache()?;
            if let Err(e) = session.book.save_cache() {
                bail!("rebuilt {count} entries but could not save the cache: {e}");
            }
            format.emit(&count, |n| format!("rebuilt {n} cache entries"))
        }
        CacheCommands::Show => {
            let entries = session.book.cache().entries();
            format.emit(&entries, |entries| {
                let mut out = String::new();
                for e in entries {
                    let flags = match (e.foreign, e.stale) {
                        (true, true) => " [foreign, stale]",
                        (true, false) => " [foreign]",
                        (false, true) => " [stale]",
                        (false, false) => "",
                    };
                    let _ = writeln!(
                        out,
                        "{}  {}  versions={} ops={}{flags}",
                        e.id.short(),
                        e.dsref(),
                        e.version_count,
                        e.op_count
                    );
                }
                out.trim_end().to_owned()
            })
        }
    }
}
