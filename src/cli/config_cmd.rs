use std::path::{Path, PathBuf};

use colored::Colorize;
use serde_json::{json, Value};

use crate::config::loader::{discover_config_files, load_config_file, load_config};
use crate::config::GrantflowConfig;
use crate::error::GrantflowError;

use super::output::{print_json, stdout_is_tty};

const SECTIONS: [&str; 3] = ["device", "store", "payment"];

fn has_section(cfg: &GrantflowConfig, name: &str) -> bool {
    match name {
        "device" => cfg.device.is_some(),
        "store" => cfg.store.is_some(),
        "payment" => cfg.payment.is_some(),
        _ => false,
    }
}

/// The file each section was taken from (first occurrence wins, matching the
/// merge order).
fn section_sources(files: &[PathBuf]) -> Vec<(&'static str, PathBuf)> {
    let loaded: Vec<(PathBuf, GrantflowConfig)> = files
        .iter()
        .filter_map(|path| load_config_file(path).ok().map(|cfg| (path.clone(), cfg)))
        .collect();

    SECTIONS
        .iter()
        .filter_map(|name| {
            loaded
                .iter()
                .find(|(_, cfg)| has_section(cfg, name))
                .map(|(path, _)| (*name, path.clone()))
        })
        .collect()
}

/// Display the effective configuration with secrets masked.
pub fn run_config_show(cli_config: Option<&str>, json_mode: bool) -> Result<(), GrantflowError> {
    let files = discover_config_files(cli_config);
    let effective = load_config(cli_config)?.redacted();
    let sources = section_sources(&files);
    let sections = serde_json::to_value(&effective).unwrap_or_else(|_| json!({}));

    if json_mode {
        let files: Vec<String> = files.iter().map(|p| p.display().to_string()).collect();
        print_json(&json!({ "files": files, "config": sections }));
        return Ok(());
    }

    if sources.is_empty() {
        println!("No configuration found.");
        return Ok(());
    }

    let is_tty = stdout_is_tty();
    for (i, (name, source)) in sources.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print_section(name, source, sections.get(*name), is_tty);
    }
    Ok(())
}

fn print_section(name: &str, source: &Path, body: Option<&Value>, is_tty: bool) {
    if is_tty {
        println!("{}", name.bold().cyan());
        println!("  {}: {}", "Source".dimmed(), source.display());
    } else {
        println!("{name}");
        println!("  Source: {}", source.display());
    }
    if let Some(body) = body {
        let pretty = serde_json::to_string_pretty(body).unwrap_or_default();
        for line in pretty.lines() {
            println!("  {line}");
        }
    }
}
