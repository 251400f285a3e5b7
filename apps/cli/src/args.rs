use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "dropcast", version, about, long_about = None)]
pub struct Cli {
    #[arg(
        short,
        long,
        global = true,
        value_name = "PATH",
        help = "Path to a TOML config file. Defaults to ~/.config/dropcast/config.toml."
    )]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Upload a file and print its public URL.
    Upload(UploadArgs),
    /// Write a starter config file.
    InitConfig(InitConfigArgs),
    /// Validate the config without uploading anything.
    Check,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Local file to upload.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Remote file name (defaults to the local file's name).
    #[arg(short, long, value_name = "NAME")]
    pub name: Option<String>,

    /// Abort the upload after this many seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Do not draw a progress bar.
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Args, Debug)]
pub struct InitConfigArgs {
    /// Overwrite an existing config file.
    #[arg(long)]
    pub force: bool,
}
