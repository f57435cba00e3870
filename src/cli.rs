use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::generator::DEFAULT_CHUNK_SIZE;
use crate::server::{DEFAULT_SIZE, ServerConfig};
use crate::stream::DEFAULT_HIGH_WATER;

#[derive(Parser, Debug)]
#[command(name = "zipstream")]
#[command(version)]
#[command(about = "Stream ZIP archives generated on the fly", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipstream serve --addr 127.0.0.1:8080       serve GET /zip/{name}.zip?size=N\n  \
  zipstream pack out.zip a.txt b.txt          zip local files through the streaming generator\n  \
  zipstream list -v out.zip                   list entries with sizes and timestamps")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve demo archives over HTTP
    Serve(ServeArgs),

    /// Stream local files into a ZIP archive
    Pack {
        /// Archive to create
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// Files to add, stored under their file names
        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>,

        /// Bridge buffer capacity in bytes
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },

    /// List the entries of a ZIP archive
    List {
        /// ZIP file path
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// List verbosely
        #[arg(short = 'v')]
        verbose: bool,
    },
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub addr: SocketAddr,

    /// Entry count when the request has no valid `size`
    #[arg(long, default_value_t = DEFAULT_SIZE)]
    pub default_size: usize,

    /// Bridge buffer capacity and read size in bytes
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Chunks queued for a slow client before generation pauses
    #[arg(long, default_value_t = DEFAULT_HIGH_WATER)]
    pub high_water: usize,
}

impl From<ServeArgs> for ServerConfig {
    fn from(args: ServeArgs) -> Self {
        Self {
            addr: args.addr,
            default_size: args.default_size,
            chunk_size: args.chunk_size,
            high_water: args.high_water,
        }
    }
}
