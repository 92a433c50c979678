//! Seal CLI
//!
//! Places seals on PDFs and images, optionally signing the result, and
//! checks signatures produced by earlier runs.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use seal_core::SealConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "seal")]
#[command(version, about = "Place company seals on PDFs and images")]
struct Cli {
    /// TOML configuration file; `SEAL_*` variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Place a seal on one PDF or a set of images
    Seal(SealArgs),
    /// Check the signature of a sealed PDF or image
    Verify(VerifyArgs),
    /// Generate a self-signed PKCS#12 keystore
    Keystore(KeystoreArgs),
    /// Print the text of a document, line by line
    Text(TextArgs),
}

/// Inputs are file paths, or `@code` for a file in the `--store` directory.
#[derive(Args, Debug)]
pub(crate) struct SealArgs {
    /// Seal image (PNG or JPEG)
    #[arg(short, long)]
    pub seal: String,

    /// `x,y` on every page or `page,x,y`, bottom-left origin
    #[arg(short, long, conflicts_with = "keyword")]
    pub position: Option<String>,

    /// Place the seal at this text instead of a fixed position
    #[arg(short, long)]
    pub keyword: Option<String>,

    /// Which keyword matches to seal: 0 = exactly one, 1 = every; default last
    #[arg(short, long, requires = "keyword")]
    pub multi: Option<i64>,

    /// Stack images into one JPEG instead of a zip
    #[arg(long)]
    pub merge: bool,

    /// Digitally sign the result
    #[arg(long)]
    pub sign: bool,

    /// Signing keystore: a path, or `@code` in the store
    #[arg(long, requires = "sign")]
    pub cert: Option<String>,

    /// Name recorded in the PDF signature
    #[arg(long)]
    pub signer: Option<String>,

    /// File store directory for `@code` inputs and results
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Output file; defaults to the result's name in the current directory
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// PDF, or one or more images
    #[arg(required = true)]
    pub documents: Vec<String>,
}

#[derive(Args, Debug)]
pub(crate) struct VerifyArgs {
    pub file: PathBuf,

    /// Keystore holding the image signer's certificate
    #[arg(long)]
    pub cert: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct KeystoreArgs {
    #[arg(long, default_value = "Seal Service")]
    pub common_name: String,

    /// Defaults to the configured keystore password
    #[arg(long)]
    pub password: Option<String>,

    #[arg(short, long)]
    pub out: PathBuf,
}

#[derive(Args, Debug)]
pub(crate) struct TextArgs {
    pub file: String,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    // Results may go to stdout, so logs stay on stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let config = SealConfig::load(cli.config.as_deref()).context("loading configuration")?;
    tracing::debug!(keystore = ?config.keystore_path, ocr_dpi = config.ocr_dpi, "configuration loaded");

    match cli.command {
        Command::Seal(args) => commands::seal(config, &args),
        Command::Verify(args) => commands::verify(&config, &args),
        Command::Keystore(args) => commands::keystore(&config, &args),
        Command::Text(args) => commands::text(config, &args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_seal_arguments() {
        let cli = Cli::try_parse_from([
            "seal", "seal", "--seal", "stamp.png", "--keyword", "TOTAL", "--multi", "1", "--sign",
            "a.jpg", "b.jpg",
        ])
        .unwrap();
        let Command::Seal(args) = cli.command else {
            panic!("expected seal command");
        };
        assert_eq!(args.keyword.as_deref(), Some("TOTAL"));
        assert_eq!(args.multi, Some(1));
        assert!(args.sign);
        assert_eq!(args.documents, vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn test_position_and_keyword_conflict() {
        let parsed = Cli::try_parse_from([
            "seal", "seal", "--seal", "s.png", "--position", "1,1", "--keyword", "x", "a.pdf",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_cert_requires_sign() {
        let parsed = Cli::try_parse_from([
            "seal", "seal", "--seal", "s.png", "--position", "1,1", "--cert", "k.p12", "a.pdf",
        ]);
        assert!(parsed.is_err());
    }
}
