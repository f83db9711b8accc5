use std::io::Write;

use anyhow::{Context, Result};
use camera_ingest::{DenyList, DeviceLister, group_by_name};
use clap::Parser;
use mjpeg_stream::StreamCliArgs;

/// Serve a USB/CSI camera as an annotated MJPEG stream over HTTP.
#[derive(Debug, Parser)]
#[command(name = "camstream", version)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) stream: StreamCliArgs,
    /// Print how device enumeration sees this host (kept and skipped) and exit.
    #[arg(long = "list-devices", action = clap::ArgAction::SetTrue)]
    pub(crate) list_devices: bool,
}

/// Write the enumeration view: every listed device, its nodes, and whether
/// the deny-list would skip it.
pub(crate) fn list_devices<L: DeviceLister>(
    lister: &L,
    deny: &DenyList,
    out: &mut impl Write,
) -> Result<()> {
    let listed = lister.list().context("Failed to list video devices")?;
    if listed.is_empty() {
        writeln!(out, "no video devices listed")?;
        return Ok(());
    }

    for group in group_by_name(listed) {
        let verdict = match deny.matched(&group.declared_name) {
            Some(keyword) => format!("skipped (matches {keyword:?})"),
            None => "candidate".to_string(),
        };
        writeln!(out, "{}  [{verdict}]", group.declared_name)?;
        for candidate in &group.candidates {
            writeln!(out, "    {}", candidate.id)?;
        }
    }
    Ok(())
}
