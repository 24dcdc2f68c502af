mod config;
mod dom;
mod error;
mod favicon;
mod menu;
mod page;
mod toc;

use std::{
    fs,
    io::{self, IsTerminal, Write},
    path::{Path, PathBuf},
    process,
    time::Duration,
};

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use config::PageConfig;
use dom::Document;
use error::{Error, Result};

/// Explicit subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Install the TOC, tidy favicons, scroll the menu, and print the page
    Enhance {
        /// Path to the HTML page
        file: PathBuf,
        /// URL path the page is shown at, used to pick the current menu item
        #[arg(long, default_value = "/")]
        location: String,
        /// Write the enhanced page here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// JSON file overriding element ids and blink settings
        #[arg(long)]
        config: Option<PathBuf>,
        /// Run the favicon blink timer for this many milliseconds first
        #[arg(long, value_name = "MS")]
        blink_for: Option<u64>,
        /// Seed for the blink timer's random draws
        #[arg(long, requires = "blink_for")]
        seed: Option<u64>,
    },
    /// Print the table of contents of a page
    Toc {
        /// Path to the HTML page
        file: PathBuf,
        /// Print the TOC forest as JSON
        #[arg(long)]
        json: bool,
        /// JSON file overriding element ids and blink settings
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Parser)]
#[command(
    name = "pagelift",
    version,
    about = "Table-of-contents and page enhancements for static HTML sites",
    after_help = "INVOCATION FORMS:\n  pagelift enhance [OPTIONS] <file.html>   Print the enhanced page\n  pagelift toc [--json] <file.html>        Print the table of contents"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(io::stderr().is_terminal())
        .with_writer(io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    if let Err(e) = run(cli.command) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Enhance {
            file,
            location,
            output,
            config,
            blink_for,
            seed,
        } => {
            let config = PageConfig::load_or_default(config.as_deref())?;
            let source = read_page(&file)?;
            let (html, ready) = match blink_for {
                None => page::enhance_html(&source, &location, &config),
                Some(ms) => {
                    let rng = match seed {
                        Some(seed) => StdRng::seed_from_u64(seed),
                        None => StdRng::from_os_rng(),
                    };
                    let rt = tokio::runtime::Builder::new_current_thread()
                        .enable_time()
                        .build()?;
                    rt.block_on(page::enhance_html_blinking(
                        &source,
                        &location,
                        &config,
                        Duration::from_millis(ms),
                        rng,
                    ))
                }
            };
            debug!(file = %file.display(), ?ready, "enhanced");
            match output {
                Some(path) => fs::write(&path, html).map_err(|e| Error::write(&path, e)),
                None => write_stdout(&html),
            }
        }
        Commands::Toc { file, json, config } => {
            let config = PageConfig::load_or_default(config.as_deref())?;
            let source = read_page(&file)?;
            let doc = Document::parse(&source);
            let forest = toc::page_toc(&doc, &config);
            let out = if json {
                let mut s = serde_json::to_string_pretty(&forest)
                    .map_err(|e| Error::UnsupportedInput(e.to_string()))?;
                s.push('\n');
                s
            } else {
                toc::render_outline(&forest)
            };
            write_stdout(&out)
        }
    }
}

/// Read an HTML page, rejecting anything that is not `.html`/`.htm`.
fn read_page(path: &Path) -> Result<String> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm") => {}
        Some(ext) => {
            return Err(Error::UnsupportedInput(format!(
                "'{ext}' is not an HTML extension (expected .html or .htm)"
            )));
        }
        None => {
            return Err(Error::UnsupportedInput(format!(
                "'{}' has no file extension (expected .html or .htm)",
                path.display()
            )));
        }
    }
    fs::read_to_string(path).map_err(|e| Error::read(path, e))
}

fn write_stdout(s: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(s.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn enhance_defaults() {
        let cli = Cli::try_parse_from(["pagelift", "enhance", "a.html"]).unwrap();
        match cli.command {
            Commands::Enhance {
                file, location, output, blink_for, ..
            } => {
                assert_eq!(file, PathBuf::from("a.html"));
                assert_eq!(location, "/");
                assert!(output.is_none());
                assert!(blink_for.is_none());
            }
            _ => panic!("expected enhance"),
        }
    }

    #[test]
    fn seed_requires_blink_for() {
        assert!(Cli::try_parse_from(["pagelift", "enhance", "--seed", "1", "a.html"]).is_err());
        let cli = Cli::try_parse_from([
            "pagelift", "enhance", "--blink-for", "500", "--seed", "1", "a.html",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Enhance {
                blink_for: Some(500),
                seed: Some(1),
                ..
            }
        ));
    }

    #[test]
    fn read_page_rejects_non_html() {
        let err = read_page(Path::new("notes.md")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedInput(_)));
        let err = read_page(Path::new("README")).unwrap_err();
        assert!(err.to_string().contains("no file extension"));
    }

    #[test]
    fn read_page_reports_missing_file() {
        let err = read_page(Path::new("/definitely/not/here.html")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
        assert!(err.to_string().contains("/definitely/not/here.html"));
    }
}
