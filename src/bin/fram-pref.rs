//! FRAM Preferences command-line tool
//!
//! Works on an image file of the FRAM chip, using the same store
//! configuration the firmware uses.
//!
//! # Examples
//!
//! ```bash
//! # Show pool usage and slots
//! fram-pref --image fram.bin --config prefs.toml describe
//!
//! # Store and read back a value for tag 0xAAAA
//! fram-pref --image fram.bin --config prefs.toml save --tag 0xAAAA --data 0102030405
//! fram-pref --image fram.bin --config prefs.toml load --tag 0xAAAA --len 5
//!
//! # Replay the firmware's pool requests without editing the config
//! fram-pref --image fram.bin --config prefs.toml --preload 0xAAAA:5 --preload 0xBBBB:2 describe
//! ```
//!
//! Pool addresses depend on the order in which tags are first requested.
//! The tool replays the configured `[[requests]]` (then any `--preload`)
//! and refuses pool tags that the replay did not place.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use fram_pref::config::parse_tag;
use fram_pref::prefs::fnv1_hash;
use fram_pref::{
    FileFram, FramPreferences, PreferenceChain, PreferenceRequest, PreferenceStore, StoreConfig,
    VolatilePreferences,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// FRAM Preferences - persistent preference slots on FRAM
#[derive(Parser, Debug)]
#[command(name = "fram-pref")]
#[command(version = fram_pref::VERSION)]
#[command(about = "Inspect and edit FRAM preference images", long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// FRAM image file
    #[arg(long, global = true, default_value = "fram.bin", env = "FRAM_PREF_IMAGE")]
    image: PathBuf,

    /// Device capacity in bytes
    #[arg(long, global = true, default_value = "32768", env = "FRAM_PREF_CAPACITY")]
    capacity: u16,

    /// Store configuration (TOML)
    #[arg(short, long, global = true, env = "FRAM_PREF_CONFIG")]
    config: Option<PathBuf>,

    /// Pool request to replay before the command, as TAG:LEN (repeatable)
    #[arg(long, global = true, value_name = "TAG:LEN")]
    preload: Vec<PreferenceRequest>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the store layout as JSON
    Describe,

    /// Save a value
    Save {
        /// Type tag (decimal or 0x-prefixed hex)
        #[arg(short, long, value_parser = parse_tag)]
        tag: u32,
        /// Payload as hex bytes
        #[arg(short, long)]
        data: String,
    },

    /// Load a value
    Load {
        /// Type tag (decimal or 0x-prefixed hex)
        #[arg(short, long, value_parser = parse_tag)]
        tag: u32,
        /// Payload length in bytes
        #[arg(short, long)]
        len: usize,
    },

    /// Invalidate the pool so it is wiped on next start
    Reset,

    /// Print the version hash for a build identity
    Hash {
        /// Build identity string
        identity: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli);

    let output = run(cli)?;
    println!("{}", output);
    Ok(())
}

/// Execute one command and return what it prints
fn run(cli: Cli) -> anyhow::Result<String> {
    if let Commands::Hash { identity } = &cli.command {
        return Ok(format!("{:#010x}", fnv1_hash(identity)));
    }

    let mut config = match &cli.config {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            warn!("No configuration given, using defaults (no pool)");
            StoreConfig::default()
        }
    };

    config.requests.extend(cli.preload.iter().copied());

    let device = Arc::new(FileFram::open(&cli.image, cli.capacity)?);
    let mut chain = PreferenceChain::with_base(Arc::new(VolatilePreferences::new()));
    let store = FramPreferences::with_shared_device(device.clone(), &config)?.install(&mut chain)?;
    let granted = store.preload(&config.requests);
    info!(
        image = %cli.image.display(),
        links = ?chain.names(),
        replayed = config.requests.len(),
        granted,
        "Store installed"
    );

    let require_slot = |tag: u32| -> anyhow::Result<()> {
        if !store.has_slot(tag) {
            bail!(
                "tag {:#x} has no slot; list it under [[requests]] in the config \
                 or pass --preload {:#x}:LEN in boot order",
                tag,
                tag
            );
        }
        Ok(())
    };

    let output = match cli.command {
        Commands::Describe => {
            store.log_config();
            serde_json::to_string_pretty(&store.describe())?
        }
        Commands::Save { tag, data } => {
            require_slot(tag)?;
            let bytes = hex::decode(data.trim()).context("payload is not valid hex")?;
            let handle = chain.make_handle(tag, bytes.len());
            if !handle.is_valid() {
                bail!("no slot available for tag {:#x}", tag);
            }
            if !handle.save(&bytes) {
                bail!("save failed for tag {:#x}", tag);
            }
            format!("saved {} bytes", bytes.len())
        }
        Commands::Load { tag, len } => {
            require_slot(tag)?;
            let handle = chain.make_handle(tag, len);
            let mut bytes = vec![0u8; len];
            if !handle.load(&mut bytes) {
                bail!("no stored value for tag {:#x}", tag);
            }
            hex::encode(bytes)
        }
        Commands::Reset => {
            if !chain.reset() {
                bail!("reset failed");
            }
            "pool invalidated".to_string()
        }
        Commands::Hash { .. } => unreachable!("handled before opening the image"),
    };

    device.flush()?;
    Ok(output)
}

/// Setup console logging
fn setup_logging(cli: &Cli) {
    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!cli.no_color),
        )
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fram_pref_cli_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn invoke(dir: &Path, args: &[&str]) -> anyhow::Result<String> {
        let image = dir.join("fram.bin");
        let config = dir.join("prefs.toml");
        let mut argv = vec![
            "fram-pref".to_string(),
            "--image".to_string(),
            image.display().to_string(),
            "--capacity".to_string(),
            "256".to_string(),
            "--config".to_string(),
            config.display().to_string(),
        ];
        argv.extend(args.iter().map(|a| a.to_string()));
        run(Cli::parse_from(argv))
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::parse_from([
            "fram-pref", "--image", "x.bin", "--preload", "0xA:4", "--preload", "2:8", "load", "--tag", "0x10",
            "--len", "4",
        ]);
        assert!(matches!(cli.command, Commands::Load { tag: 0x10, len: 4 }));
        assert_eq!(
            cli.preload,
            vec![PreferenceRequest::new(0xA, 4), PreferenceRequest::new(2, 8)]
        );
    }

    #[test]
    fn test_saves_on_two_pool_tags_keep_both_values() -> anyhow::Result<()> {
        let dir = scratch("replay");
        std::fs::write(
            dir.join("prefs.toml"),
            "build_identity = \"cli\"\n[pool]\nsize = 64\n\n\
             [[requests]]\ntag = 1\nlen = 4\n\n[[requests]]\ntag = 2\nlen = 4\n",
        )?;

        assert_eq!(invoke(&dir, &["save", "--tag", "1", "--data", "01020304"])?, "saved 4 bytes");
        assert_eq!(invoke(&dir, &["save", "--tag", "2", "--data", "0a0b0c0d"])?, "saved 4 bytes");
        assert_eq!(invoke(&dir, &["load", "--tag", "1", "--len", "4"])?, "01020304");
        assert_eq!(invoke(&dir, &["load", "--tag", "2", "--len", "4"])?, "0a0b0c0d");

        std::fs::remove_dir_all(dir).ok();
        Ok(())
    }

    #[test]
    fn test_preload_flag_places_pool_tags() -> anyhow::Result<()> {
        let dir = scratch("preload");
        std::fs::write(dir.join("prefs.toml"), "build_identity = \"cli\"\n[pool]\nsize = 64\n")?;

        let boot = "--preload 0xA:2 --preload 0xB:2";
        let with_boot = |command: &str| -> anyhow::Result<String> {
            let line = format!("{} {}", boot, command);
            invoke(&dir, &line.split_whitespace().collect::<Vec<_>>())
        };

        with_boot("save --tag 0xB --data bbbb")?;
        with_boot("save --tag 0xA --data aaaa")?;
        assert_eq!(with_boot("load --tag 0xB --len 2")?, "bbbb");
        assert_eq!(with_boot("load --tag 0xA --len 2")?, "aaaa");

        std::fs::remove_dir_all(dir).ok();
        Ok(())
    }

    #[test]
    fn test_unlisted_pool_tag_is_refused() -> anyhow::Result<()> {
        let dir = scratch("refuse");
        std::fs::write(
            dir.join("prefs.toml"),
            "build_identity = \"cli\"\n[pool]\nsize = 64\n\n[[requests]]\ntag = 1\nlen = 4\n",
        )?;

        let err = invoke(&dir, &["save", "--tag", "9", "--data", "00"]).unwrap_err();
        assert!(err.to_string().contains("[[requests]]"));
        assert!(invoke(&dir, &["load", "--tag", "9", "--len", "1"]).is_err());

        std::fs::remove_dir_all(dir).ok();
        Ok(())
    }

    #[test]
    fn test_hash_needs_no_image() -> anyhow::Result<()> {
        let cli = Cli::parse_from(["fram-pref", "hash", "b1"]);
        assert_eq!(run(cli)?, format!("{:#010x}", fnv1_hash("b1")));
        Ok(())
    }
}
