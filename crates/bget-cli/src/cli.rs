use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use bget_core::config;
use bget_core::queue::Batch;
use bget_core::scheduler::{self, RunOptions};
use bget_core::storage::OutputFile;
use bget_core::summary;
use bget_core::task::Task;
use bget_core::url_model;

/// Command line for the bget batch downloader.
#[derive(Debug, Parser)]
#[command(name = "bget")]
#[command(about = "bget: concurrent HTTP/1.0 batch downloader with resume", long_about = None)]
pub struct Cli {
    /// Text file with one URL per line ([http://]host[:port]/path).
    pub url_list: PathBuf,

    /// Directory downloaded files are written into.
    #[arg(long, default_value = ".")]
    pub download_dir: PathBuf,

    /// Identify as the genuine client instead of a browser.
    #[arg(long)]
    pub genuine_agent: bool,
}

impl Cli {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        let parts = url_model::read_url_list(&cli.url_list)?;
        if parts.is_empty() {
            anyhow::bail!("no usable URLs in {}", cli.url_list.display());
        }

        let genuine_agent = cli.genuine_agent || cfg.genuine_agent;
        let mut batch = Batch::new();
        for p in parts {
            let local_path = cli.download_dir.join(&p.local);
            match OutputFile::open(&local_path) {
                Ok(opened) => {
                    if opened.resumed {
                        tracing::info!("{}: resuming at byte {}", p.local, opened.restart_offset);
                    }
                    tracing::info!("created download task {}", p.url);
                    batch.add(Task::new(
                        p,
                        opened.output,
                        opened.restart_offset,
                        opened.resumed,
                        cfg.buffer_capacity(),
                        genuine_agent,
                    ));
                }
                Err(e) => tracing::warn!("skipping {}: {:#}", p.url, e),
            }
        }
        if batch.initial.is_empty() {
            anyhow::bail!("no download tasks could be created");
        }

        let opts = RunOptions {
            read_timeout: cfg.read_timeout(),
            timeout_retries: cfg.timeout_retries,
        };
        let result = scheduler::run_batch(&mut batch, &opts).await;

        print!("{}", summary::render(&batch));

        result.context("batch aborted")?;
        Ok(())
    }
}
