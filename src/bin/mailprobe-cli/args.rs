use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mailprobe_lib::config::parse_dns_servers;
use mailprobe_lib::{Config, DomainPolicy};

#[derive(Parser)]
#[command(name = "mailprobe-cli", version, args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Option<Commands>,

    /// fichier d'adresses (une par ligne, ou CSV avec une colonne `Email`)
    pub input: Option<PathBuf>,

    /// lit des adresses depuis stdin (une par ligne)
    #[arg(long)]
    pub stdin: bool,

    /// format: human|json|ndjson|csv
    #[arg(long, default_value = "human")]
    pub format: String,

    /// write records to file instead of stdout (atomic rename at the end)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// répertoire des exports par catégorie (feature `with-csv`)
    #[cfg(feature = "with-csv")]
    #[arg(long = "out-dir")]
    pub out_dir: Option<PathBuf>,

    /// fichier de configuration TOML (feature `with-config`)
    #[cfg(feature = "with-config")]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// taille du pool de workers
    #[arg(long)]
    pub workers: Option<usize>,

    /// timeout par exchanger (secondes)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// nombre maximum d'MX interrogés par adresse
    #[arg(long = "max-mx")]
    pub max_mx: Option<usize>,

    /// enveloppe MAIL FROM
    #[arg(long = "from")]
    pub mail_from: Option<String>,

    /// nom utilisé pour EHLO/HELO
    #[arg(long)]
    pub helo: Option<String>,

    /// port SMTP des exchangers
    #[arg(long)]
    pub port: Option<u16>,

    /// désactive STARTTLS
    #[arg(long = "no-starttls")]
    pub no_starttls: bool,

    /// serveur DNS (répétable)
    #[arg(long = "dns-server")]
    pub dns_servers: Vec<String>,

    /// utilise la configuration DNS du système
    #[arg(long = "system-dns", conflicts_with = "dns_servers")]
    pub system_dns: bool,

    /// block-list de domaines jetables (un domaine par ligne)
    #[arg(long)]
    pub blocklist: Option<PathBuf>,

    /// politique fixe pour un domaine: domaine=valid|invalid (répétable)
    #[arg(long = "policy", value_parser = parse_policy)]
    pub policies: Vec<(String, DomainPolicy)>,

    /// cache MX persistant (`MX_Records.csv`, feature `with-csv`)
    #[cfg(feature = "with-csv")]
    #[arg(long = "mx-cache")]
    pub mx_cache: Option<PathBuf>,

    /// ignore le cache MX existant et le réécrit
    #[cfg(feature = "with-csv")]
    #[arg(long = "refresh-mx")]
    pub refresh_mx: bool,

    /// résout tous les domaines avant de sonder
    #[arg(long)]
    pub prewarm: bool,

    /// records buffered between two flushes
    #[arg(long = "flush-every")]
    pub flush_every: Option<usize>,

    /// logs détaillés (debug)
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// affiche les exchangers d'un domaine, par préférence
    Mx { domain: String },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn clap_command() -> clap::Command {
        <Self as clap::CommandFactory>::command()
    }

    /// Defaults, then the config file, then command-line flags.
    pub fn build_config(&self) -> Result<Config> {
        #[cfg(feature = "with-config")]
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("load config {}", path.display()))?,
            None => Config::default(),
        };
        #[cfg(not(feature = "with-config"))]
        let mut config = Config::default();

        if let Some(workers) = self.workers {
            config.dispatch.workers = workers;
        }
        if let Some(flush_every) = self.flush_every {
            config.dispatch.flush_every = flush_every;
        }
        if let Some(max_mx) = self.max_mx {
            config.dispatch.max_candidates = max_mx;
        }
        if let Some(secs) = self.timeout {
            config.probe.timeout = Duration::from_secs(secs);
        }
        if let Some(from) = &self.mail_from {
            config.probe.envelope_sender = from.clone();
        }
        if let Some(helo) = &self.helo {
            config.probe.helo_domain = Some(helo.clone());
        }
        if let Some(port) = self.port {
            config.probe.port = port;
        }
        if self.no_starttls {
            config.probe.starttls = false;
        }
        if self.system_dns {
            config.dns_servers.clear();
        } else if !self.dns_servers.is_empty() {
            config.dns_servers = parse_dns_servers(&self.dns_servers)?;
        }
        if let Some(path) = &self.blocklist {
            config.blocklist = Some(path.clone());
        }
        for (domain, policy) in &self.policies {
            config.set_policy(domain, *policy);
        }
        #[cfg(feature = "with-csv")]
        {
            if let Some(path) = &self.mx_cache {
                config.mx_cache = Some(path.clone());
            }
        }
        config.validate()?;
        Ok(config)
    }
}

fn parse_policy(s: &str) -> Result<(String, DomainPolicy), String> {
    let (domain, policy) = s
        .split_once('=')
        .ok_or_else(|| format!("expected domaine=valid|invalid, got '{s}'"))?;
    let domain = domain.trim();
    if domain.is_empty() {
        return Err(format!("empty domain in '{s}'"));
    }
    Ok((domain.to_string(), policy.parse::<DomainPolicy>()?))
}
