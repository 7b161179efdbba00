mod args;
mod input;
mod output;

use anyhow::{Context, Result};
use mailprobe_lib::{MxStatus, check_mx};
use tracing_subscriber::EnvFilter;

use crate::args::{Cli, Commands};
use crate::output::{Format, OutputSink};

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_mx(domain: &str) -> Result<()> {
    match check_mx(domain).with_context(|| format!("MX lookup for {domain}"))? {
        MxStatus::Exchangers(hosts) => {
            for (rank, host) in hosts.iter().enumerate() {
                println!("{:>2}. {host}", rank + 1);
            }
        }
        MxStatus::NoExchanger => println!("{domain}: aucun exchanger"),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Some(Commands::Mx { domain }) = &cli.cmd {
        return print_mx(domain);
    }

    if cli.input.is_none() && !cli.stdin {
        Cli::clap_command().print_help()?;
        println!();
        return Ok(());
    }

    let format = Format::parse(&cli.format)?;
    let config = cli.build_config()?;
    let addresses = input::read_addresses(cli.input.as_deref(), cli.stdin)?;
    tracing::info!(count = addresses.len(), "addresses loaded");

    let dispatcher = config.build_dispatcher().context("start engine")?;

    #[cfg(feature = "with-csv")]
    {
        if let Some(path) = &config.mx_cache {
            if cli.refresh_mx {
                tracing::info!(path = %path.display(), "ignoring persisted MX cache");
            } else {
                let loaded = dispatcher
                    .cache()
                    .load_file(path)
                    .with_context(|| format!("load MX cache {}", path.display()))?;
                tracing::info!(path = %path.display(), loaded, "MX cache loaded");
            }
        }
    }

    if cli.prewarm {
        dispatcher.prewarm(&addresses)?;
    }

    let sink = OutputSink::new(format, cli.out.as_deref())?;
    #[cfg(feature = "with-csv")]
    let sink = match &cli.out_dir {
        Some(dir) => sink.with_exports(dir)?,
        None => sink,
    };
    let mut sink = sink;

    let summary = dispatcher.run(&addresses, &mut sink)?;

    #[cfg(feature = "with-csv")]
    {
        if let Some(path) = &config.mx_cache {
            let saved = dispatcher
                .cache()
                .save_file(path)
                .with_context(|| format!("save MX cache {}", path.display()))?;
            tracing::info!(path = %path.display(), saved, "MX cache saved");
        }
    }

    output::print_summary(&summary);
    Ok(())
}
