//! Man page generator for motionflash
//!
//! Writes `motionflash.1` plus one `motionflash-<command>.1` page per
//! subcommand. The main page gains EXIT STATUS, ENVIRONMENT and FILES
//! sections built from the error kinds and tuning variables.
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]

use clap::CommandFactory;
use motionflash_core::{ErrorKind, TransportTuning};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[path = "../cli.rs"]
mod cli;

fn main() -> io::Result<()> {
    let output_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));

    fs::create_dir_all(&output_dir)?;

    let mut cmd = cli::Cli::command();
    // Propagates display names, so subcommand pages are titled motionflash-<name>
    cmd.build();

    let mut buffer = Vec::new();
    clap_mangen::Man::new(cmd.clone()).render(&mut buffer)?;
    buffer.extend_from_slice(extra_sections().as_bytes());
    let main_page = write_page(&output_dir, "motionflash", &buffer)?;

    let mut pages = 1;
    for sub in cmd.get_subcommands().filter(|s| !s.is_hide_set()) {
        let name = sub
            .get_display_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("motionflash-{}", sub.get_name()));
        let mut buffer = Vec::new();
        clap_mangen::Man::new(sub.clone()).render(&mut buffer)?;
        write_page(&output_dir, &name, &buffer)?;
        pages += 1;
    }

    println!("Generated {} man page(s) in {}", pages, output_dir.display());
    println!("\nTo view the man page:");
    println!("  man -l {}", main_page.display());

    Ok(())
}

fn write_page(dir: &Path, name: &str, contents: &[u8]) -> io::Result<PathBuf> {
    let path = dir.join(format!("{}.1", name));
    fs::write(&path, contents)?;
    Ok(path)
}

/// Roff for the sections clap has no notion of
fn extra_sections() -> String {
    let mut exit = vec![
        ("0".to_string(), "Success.".to_string()),
        (
            "1".to_string(),
            "host_error: a report or port listing could not be produced.".to_string(),
        ),
    ];
    exit.extend(ErrorKind::ALL.iter().map(|kind| {
        (
            kind.exit_code().to_string(),
            format!("{}.", kind.code()),
        )
    }));

    let defaults = TransportTuning::default();
    let environment = vec![
        (
            TransportTuning::ENV_BAUD.to_string(),
            format!("Serial baud rate (default {}).", defaults.baud),
        ),
        (
            TransportTuning::ENV_TIMEOUT_MS.to_string(),
            format!(
                "Per-command reply timeout in milliseconds (default {}).",
                defaults.timeout.as_millis()
            ),
        ),
        (
            TransportTuning::ENV_RETRIES.to_string(),
            format!(
                "Extra attempts after a transport failure (default {}).",
                defaults.retries
            ),
        ),
        (
            TransportTuning::ENV_VERBOSE.to_string(),
            "Enable trace logging when set to 1, true or yes.".to_string(),
        ),
        (
            "RUST_LOG".to_string(),
            "Log filter, overriding the default of info.".to_string(),
        ),
    ];

    let files = vec![(
        "reports/<timestamp>_<kind>_<port>_<address>.<ext>".to_string(),
        "Flash and test reports (JSON) and test traces (CSV, with --csv). \
         The directory is set with --report-dir."
            .to_string(),
    )];

    let mut out = String::new();
    out.push_str(&section(
        "EXIT STATUS",
        "Every failure prints {\"code\", \"message\", \"details\"} as JSON on stderr.",
        &exit,
    ));
    out.push_str(&section("ENVIRONMENT", "", &environment));
    out.push_str(&section("FILES", "", &files));
    out
}

fn section(title: &str, intro: &str, entries: &[(String, String)]) -> String {
    let mut out = format!(".SH \"{}\"\n", title);
    if !intro.is_empty() {
        out.push_str(&escape(intro));
        out.push('\n');
    }
    for (term, text) in entries {
        out.push_str(&format!(".TP\n\\fB{}\\fR\n{}\n", escape(term), escape(text)));
    }
    out
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\e").replace('-', "\\-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_lists_every_kind() {
        let roff = extra_sections();
        assert!(roff.contains(".SH \"EXIT STATUS\""));
        for kind in ErrorKind::ALL {
            let entry = format!("\\fB{}\\fR\n{}.", kind.exit_code(), kind.code());
            assert!(roff.contains(&entry), "missing {}", kind);
        }
        assert!(roff.contains("\\fBMOTIONFLASH_RETRIES\\fR"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("--report-dir"), "\\-\\-report\\-dir");
    }
}
