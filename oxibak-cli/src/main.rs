//! OxiBak CLI - bucket backups in streaming ZIP64 archives
//!
//! Packs a directory of objects into a ZIP64 archive, lists, reads and
//! verifies archives, and unpacks them again.

mod commands;
mod utils;

use clap::{Parser, Subcommand};
use commands::{
    ListOptions, cmd_cat, cmd_diff, cmd_entries, cmd_list, cmd_pack, cmd_unpack, cmd_verify,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "oxibak")]
#[command(author, version, about = "Bucket backups in streaming ZIP64 archives")]
#[command(long_about = "
OxiBak stores objects in ZIP64 archives: each object body becomes a
_DATA/<key> entry and its metadata a _META/<key>.ser entry. Entries are
streamed, so objects of any size can be archived without buffering.

Examples:
  oxibak pack ./bucket backup.zip
  oxibak list backup.zip -l
  oxibak list backup.zip -I 'photos/**'
  oxibak cat backup.zip photos/cat.jpg > cat.jpg
  oxibak entries backup.zip --json
  oxibak verify backup.zip
  oxibak diff ./bucket backup.zip
  oxibak unpack backup.zip ./restored
")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the objects stored in an archive
    #[command(alias = "l")]
    List {
        /// Archive file to list
        archive: PathBuf,

        /// Show size and content type
        #[arg(short, long)]
        long: bool,

        /// Output as JSON (machine-readable)
        #[arg(short, long)]
        json: bool,

        /// Include only keys matching pattern (glob syntax: *.txt, photos/**)
        #[arg(short = 'I', long)]
        include: Vec<String>,

        /// Exclude keys matching pattern (glob syntax)
        #[arg(short = 'X', long)]
        exclude: Vec<String>,
    },

    /// List the raw ZIP entries of an archive
    #[command(alias = "e")]
    Entries {
        /// Archive file to inspect
        archive: PathBuf,

        /// Output as JSON (machine-readable)
        #[arg(short, long)]
        json: bool,
    },

    /// Write one object's body to stdout
    Cat {
        /// Archive file to read
        archive: PathBuf,

        /// Object key
        key: String,
    },

    /// Pack a directory of objects into a new archive
    #[command(alias = "p")]
    Pack {
        /// Directory holding the objects
        source: PathBuf,

        /// Archive file to create
        archive: PathBuf,

        /// Show progress bar
        #[arg(short = 'P', long)]
        progress: bool,
    },

    /// Unpack an archive into a directory
    #[command(alias = "u")]
    Unpack {
        /// Archive file to unpack
        archive: PathBuf,

        /// Target directory
        target: PathBuf,

        /// Show progress bar
        #[arg(short = 'P', long)]
        progress: bool,
    },

    /// List objects in source that are missing from target
    #[command(alias = "d")]
    Diff {
        /// Source archive file or directory
        source: PathBuf,

        /// Target archive file or directory
        target: PathBuf,

        /// Output as JSON (machine-readable)
        #[arg(short, long)]
        json: bool,
    },

    /// Check the CRC-32 of every entry
    #[command(alias = "t")]
    Verify {
        /// Archive file to verify
        archive: PathBuf,
    },
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::builder()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::List {
            archive,
            long,
            json,
            include,
            exclude,
        } => cmd_list(
            &archive,
            &ListOptions {
                long,
                json,
                include: &include,
                exclude: &exclude,
            },
        ),
        Commands::Entries { archive, json } => cmd_entries(&archive, json),
        Commands::Cat { archive, key } => cmd_cat(&archive, &key),
        Commands::Pack {
            source,
            archive,
            progress,
        } => cmd_pack(&source, &archive, progress),
        Commands::Unpack {
            archive,
            target,
            progress,
        } => cmd_unpack(&archive, &target, progress),
        Commands::Diff {
            source,
            target,
            json,
        } => cmd_diff(&source, &target, json),
        Commands::Verify { archive } => cmd_verify(&archive),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_list() {
        let cli = Cli::try_parse_from(["oxibak", "-vv", "list", "a.zip", "-l", "-I", "*.txt"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::List {
                archive,
                long,
                json,
                include,
                exclude,
            } => {
                assert_eq!(archive, PathBuf::from("a.zip"));
                assert!(long);
                assert!(!json);
                assert_eq!(include, vec!["*.txt"]);
                assert!(exclude.is_empty());
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn test_parse_diff() {
        let cli = Cli::try_parse_from(["oxibak", "diff", "bucket", "backup.zip", "--json"]).unwrap();
        match cli.command {
            Commands::Diff {
                source,
                target,
                json,
            } => {
                assert_eq!(source, PathBuf::from("bucket"));
                assert_eq!(target, PathBuf::from("backup.zip"));
                assert!(json);
            }
            _ => panic!("expected diff"),
        }
    }

    #[test]
    fn test_parse_pack_global_verbose_after_subcommand() {
        let cli = Cli::try_parse_from(["oxibak", "pack", "dir", "out.zip", "-P", "-v"]).unwrap();
        assert_eq!(cli.verbose, 1);
        assert!(matches!(cli.command, Commands::Pack { progress: true, .. }));
    }
}
