// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: One subcommand per image engine operation.

use clap::{Parser, Subcommand};
use picha::runtime::ArchiveFormat;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "picha")]
#[command(about = "Manage container images on a local or remote Docker/Podman service")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: picha.yml in the current directory)
    #[arg(short, long, global = true, env = "PICHA_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check whether an image exists (exit status 1 when it does not)
    Exists { image: String },

    /// List images
    #[command(alias = "list")]
    Ls {
        /// Include intermediate images
        #[arg(short, long)]
        all: bool,

        /// Filter output (key=value, repeatable)
        #[arg(short, long = "filter")]
        filters: Vec<String>,
    },

    /// Display detailed information on one or more images
    Inspect {
        #[arg(required = true)]
        images: Vec<String>,

        /// Compute image sizes
        #[arg(short, long)]
        size: bool,
    },

    /// Show the layer history of an image
    History { image: String },

    /// Pull an image from a registry
    Pull {
        image: String,

        /// Pull every tagged image of the repository
        #[arg(short, long)]
        all_tags: bool,

        /// Registry credentials as USERNAME[:PASSWORD]
        #[arg(long)]
        creds: Option<String>,

        /// Require HTTPS and verify certificates
        #[arg(long)]
        tls_verify: Option<bool>,

        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Push an image to a registry
    Push {
        image: String,

        /// Destination reference (default: the image name)
        destination: Option<String>,

        /// Registry credentials as USERNAME[:PASSWORD]
        #[arg(long)]
        creds: Option<String>,
    },

    /// Add names to an image
    Tag {
        image: String,
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Remove names from an image
    Untag { image: String, tags: Vec<String> },

    /// Load images from an archive
    Load {
        /// Archive to read
        #[arg(short, long)]
        input: PathBuf,

        /// Name for the loaded image
        name: Option<String>,
    },

    /// Create an image from a root filesystem tarball
    Import {
        /// Tarball path or URL
        source: String,

        /// repo[:tag] of the new image
        reference: Option<String>,

        /// Dockerfile instruction to apply (repeatable)
        #[arg(short, long = "change")]
        changes: Vec<String>,

        /// Commit message for the imported image
        #[arg(short, long, default_value = "")]
        message: String,
    },

    /// Save an image to an archive or directory
    Save {
        image: String,

        /// Output file or directory
        #[arg(short, long)]
        output: PathBuf,

        /// oci-archive, docker-archive, oci-dir or docker-dir (default from config)
        #[arg(long)]
        format: Option<ArchiveFormat>,

        /// Compress layers (directory formats)
        #[arg(long)]
        compress: bool,
    },

    /// Show filesystem changes made by an image
    Diff { image: String },

    /// Remove unused images
    Prune {
        /// Remove all unused images, not just dangling ones
        #[arg(short, long)]
        all: bool,

        /// Filter images to prune (key=value, repeatable)
        #[arg(long = "filter")]
        filters: Vec<String>,
    },

    /// Remove one or more images
    #[command(alias = "rmi")]
    Rm {
        #[arg(required = true)]
        images: Vec<String>,

        /// Remove images used by containers
        #[arg(short, long)]
        force: bool,
    },

    /// Search registries for images
    Search {
        term: String,

        /// Maximum number of results
        #[arg(long)]
        limit: Option<u32>,

        /// Filter results (key=value, repeatable)
        #[arg(short, long = "filter")]
        filters: Vec<String>,
    },

    /// Print the effective configuration
    Config,
}
