//! `list-ports` command.

use anyhow::{Context, Result};

use crate::report::Reporter;

/// List serial ports, as text on stderr or as JSON on stdout.
pub(crate) fn cmd_list_ports(json: bool, reporter: &Reporter) -> Result<()> {
    let ports = uartstress::list_ports().context("Failed to enumerate serial ports")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }

    reporter.port_list(&ports);
    Ok(())
}
