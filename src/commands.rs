//! Glue between the CLI surface (§6) and the core: wires discovery,
//! pipeline, prune, and publisher together per invocation, and owns the
//! process-wide cancellation token and timeout.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::cancel::CancellationToken;
use crate::cli::{BuildArgs, PruneArgs};
use crate::io_json;
use crate::model::Catalog;
use crate::pipeline;
use crate::prune;
use crate::publish;

const DEFAULT_STREAM: &str = "images";

fn stream_names(image_dirs: &[String]) -> Vec<String> {
    if image_dirs.is_empty() { vec![DEFAULT_STREAM.to_string()] } else { image_dirs.to_vec() }
}

fn start_timeout(timeout_secs: u64, cancel: &CancellationToken) {
    if timeout_secs == 0 {
        return;
    }
    let cancel = cancel.clone();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs(timeout_secs));
        cancel.cancel();
    });
}

pub fn build(args: &BuildArgs, timeout_secs: u64) -> Result<()> {
    let streams = stream_names(&args.image_dirs);
    let cancel = CancellationToken::new();
    start_timeout(timeout_secs, &cancel);

    let catalogs = pipeline::run_build(&args.root, &args.stream_version, &streams, args.workers, &cancel)
        .context("build pass failed")?;

    publish::publish(&args.root, &args.stream_version, &catalogs).context("publishing catalog and index")?;

    Ok(())
}

pub fn prune(args: &PruneArgs, timeout_secs: u64) -> Result<()> {
    if let Some(0) = args.retain_builds {
        bail!("--retain-builds must be >= 1");
    }

    let streams = stream_names(&args.image_dirs);
    let cancel = CancellationToken::new();
    start_timeout(timeout_secs, &cancel);

    let retain_days = if args.retain_days == 0 { None } else { Some(args.retain_days) };
    let freshness = time::Duration::hours(prune::DEFAULT_FRESHNESS_HOURS);

    let mut catalogs: BTreeMap<String, Catalog> = BTreeMap::new();

    for stream in &streams {
        if cancel.is_cancelled() {
            bail!("prune cancelled before processing stream {stream}");
        }

        let catalog_path = args.root.join("streams").join(&args.stream_version).join(format!("{stream}.json"));
        let Some(mut catalog) = io_json::read_optional::<Catalog>(&catalog_path)
            .with_context(|| format!("reading catalog for stream {stream}"))?
        else {
            continue;
        };

        if let Some(keep) = args.retain_builds {
            catalog = prune::prune_quota(&args.root, stream, catalog, keep, retain_days)
                .with_context(|| format!("quota retention for stream {stream}"))?;
        }

        if args.dangling {
            prune::prune_dangling(&args.root, stream, &catalog, freshness)
                .with_context(|| format!("dangling sweep for stream {stream}"))?;
        }

        catalogs.insert(stream.clone(), catalog);
    }

    prune::prune_empty_dirs(&args.root, true).context("cleaning up empty directories")?;

    if !catalogs.is_empty() {
        publish::publish(&args.root, &args.stream_version, &catalogs).context("publishing catalog and index")?;
    }

    Ok(())
}
