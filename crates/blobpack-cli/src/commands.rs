use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::Context;
use blobpack_store::segment::index_path;
use blobpack_store::{BlobId, SegmentStore, StoreConfig};
use colored::Colorize;
use serde::Serialize;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref(), cli.max_segment_size)?;
    // Only `put` may create a store.
    if !matches!(cli.command, Command::Put(_)) {
        require_existing_store(&cli.store)?;
    }
    let store = SegmentStore::open_with_config(&cli.store, config)
        .with_context(|| format!("opening store {}", cli.store.display()))?;

    let result = match cli.command {
        Command::Put(args) => cmd_put(&store, args, &cli.format),
        Command::Get(args) => cmd_get(&store, args),
        Command::List => cmd_list(&store, &cli.format),
        Command::Stat => cmd_stat(&store, &cli.format),
        Command::Verify => cmd_verify(&store, &cli.format),
    };
    store.close();
    result
}

fn require_existing_store(base: &Path) -> anyhow::Result<()> {
    let index = index_path(base);
    if !index.exists() {
        anyhow::bail!("no store at {} ({} not found)", base.display(), index.display());
    }
    Ok(())
}

/// Read store settings from an optional TOML file, then apply flag overrides.
pub fn load_config(path: Option<&Path>, max_segment_size: Option<u64>) -> anyhow::Result<StoreConfig> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => StoreConfig::default(),
    };
    if let Some(size) = max_segment_size {
        config.max_segment_size = size;
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct PutOutput {
    path: String,
    id: BlobId,
}

fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut data = Vec::new();
        io::stdin().read_to_end(&mut data).context("reading stdin")?;
        Ok(data)
    } else {
        fs::read(path).with_context(|| format!("reading {}", path.display()))
    }
}

fn cmd_put(store: &SegmentStore, args: PutArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let mut stored = Vec::new();
    for path in &args.paths {
        let data = read_input(path)?;
        let id = store.put(&data)?;
        tracing::debug!(path = %path.display(), %id, size = data.len(), "stored");
        stored.push(PutOutput {
            path: path.display().to_string(),
            id,
        });
    }
    match format {
        OutputFormat::Json => print_json(&stored),
        OutputFormat::Text => {
            for out in &stored {
                println!("{}  {}", out.id.to_string().yellow(), out.path);
            }
            Ok(())
        }
    }
}

fn cmd_get(store: &SegmentStore, args: GetArgs) -> anyhow::Result<()> {
    let id: BlobId = args
        .id
        .parse()
        .with_context(|| format!("invalid blob id {:?}", args.id))?;
    let data = store.get(&id)?;
    match args.output {
        Some(path) => fs::write(&path, &data).with_context(|| format!("writing {}", path.display()))?,
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn cmd_list(store: &SegmentStore, format: &OutputFormat) -> anyhow::Result<()> {
    let ids = store.all_ids()?;
    match format {
        OutputFormat::Json => print_json(&ids),
        OutputFormat::Text => {
            for id in &ids {
                println!("{id}");
            }
            Ok(())
        }
    }
}

fn cmd_stat(store: &SegmentStore, format: &OutputFormat) -> anyhow::Result<()> {
    let stats = store.stats()?;
    match format {
        OutputFormat::Json => print_json(&stats),
        OutputFormat::Text => {
            println!("Store {}", store.base_path().display().to_string().bold());
            println!("  Blobs:            {}", stats.blob_count);
            println!("  Payload bytes:    {}", stats.total_bytes);
            println!("  Segments:         {}", stats.segment_count);
            println!(
                "  Current segment:  {} ({} / {} bytes)",
                stats.current_segment,
                stats.current_segment_size,
                store.config().max_segment_size
            );
            Ok(())
        }
    }
}

fn cmd_verify(store: &SegmentStore, format: &OutputFormat) -> anyhow::Result<()> {
    let report = store.verify()?;
    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            if report.is_ok() {
                println!("{} {} blobs verified", "✓".green().bold(), report.checked);
            } else {
                for id in &report.mismatched {
                    println!("  {} {}", "corrupt:".red(), id);
                }
                println!(
                    "{} {} of {} blobs failed verification",
                    "✗".red().bold(),
                    report.mismatched.len(),
                    report.checked
                );
            }
        }
    }
    if !report.is_ok() {
        anyhow::bail!("{} corrupt blobs", report.mismatched.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobpack_store::IndexSync;
    use clap::Parser;

    #[test]
    fn default_config_without_file() {
        let config = load_config(None, None).unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn flag_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blobpack.toml");
        fs::write(&path, "max_segment_size = 100\nindex_sync = \"every_write\"\n").unwrap();

        let config = load_config(Some(&path), None).unwrap();
        assert_eq!(config.max_segment_size, 100);
        assert_eq!(config.index_sync, IndexSync::EveryWrite);

        let config = load_config(Some(&path), Some(7)).unwrap();
        assert_eq!(config.max_segment_size, 7);
        assert_eq!(config.index_sync, IndexSync::EveryWrite);
    }

    #[test]
    fn bad_config_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "max_segment_size = \"big\"").unwrap();
        let err = load_config(Some(&path), None).unwrap_err();
        assert!(format!("{err}").contains("bad.toml"));
    }

    #[test]
    fn put_and_get_through_commands() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        fs::write(&input, b"cli payload").unwrap();

        let store = SegmentStore::open(dir.path().join("store"), 1024).unwrap();
        cmd_put(&store, PutArgs { paths: vec![input.clone()] }, &OutputFormat::Json).unwrap();
        let id = store.all_ids().unwrap()[0];

        cmd_get(
            &store,
            GetArgs {
                id: id.to_hex(),
                output: Some(output.clone()),
            },
        )
        .unwrap();
        assert_eq!(fs::read(&output).unwrap(), b"cli payload");
        cmd_verify(&store, &OutputFormat::Text).unwrap();
    }

    #[test]
    fn get_rejects_malformed_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = SegmentStore::open(dir.path().join("store"), 1024).unwrap();
        let err = cmd_get(
            &store,
            GetArgs {
                id: "not-hex".into(),
                output: None,
            },
        )
        .unwrap_err();
        assert!(format!("{err}").contains("invalid blob id"));
    }

    #[test]
    fn read_commands_require_an_existing_store() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("typo");
        let err = require_existing_store(&base).unwrap_err();
        assert!(format!("{err}").contains("no store at"));
        assert!(!index_path(&base).exists());

        SegmentStore::open(&base, 1024).unwrap().close();
        require_existing_store(&base).unwrap();
    }

    #[test]
    fn list_on_missing_store_leaves_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("missing");
        let cli = Cli::parse_from(["blobpack", "--store", base.to_str().unwrap(), "list"]);
        assert!(run_command(cli).is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
