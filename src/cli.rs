use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use connscope::config::{AnchorPolicy, Config, ErrorPolicy, ReportFormat, ResolverKind, RttMatcherKind};
use connscope::report::TraceReport;

#[derive(Parser)]
#[command(name = "connscope")]
#[command(author, version, about = "Offline TCP connection analysis for pcap captures")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a capture file
    Analyze {
        /// Ethernet pcap file
        pcap: PathBuf,

        /// Output format
        #[arg(short, long)]
        format: Option<FormatArg>,

        /// Reference point for relative times
        #[arg(long)]
        anchor: Option<AnchorArg>,

        /// Connection lookup strategy
        #[arg(long)]
        resolver: Option<ResolverArg>,

        /// RTT matching strategy
        #[arg(long)]
        rtt_matcher: Option<MatcherArg>,

        /// Read frames on a separate thread
        #[arg(long)]
        threaded: bool,

        /// Stop at the first truncated or malformed frame
        #[arg(long)]
        strict: bool,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum AnchorArg {
    FirstConnection,
    Earliest,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ResolverArg {
    Linear,
    Hashed,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum MatcherArg {
    NestedScan,
    SeqIndex,
}

impl From<FormatArg> for ReportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => ReportFormat::Text,
            FormatArg::Json => ReportFormat::Json,
        }
    }
}

impl From<AnchorArg> for AnchorPolicy {
    fn from(arg: AnchorArg) -> Self {
        match arg {
            AnchorArg::FirstConnection => AnchorPolicy::FirstConnection,
            AnchorArg::Earliest => AnchorPolicy::Earliest,
        }
    }
}

impl From<ResolverArg> for ResolverKind {
    fn from(arg: ResolverArg) -> Self {
        match arg {
            ResolverArg::Linear => ResolverKind::Linear,
            ResolverArg::Hashed => ResolverKind::Hashed,
        }
    }
}

impl From<MatcherArg> for RttMatcherKind {
    fn from(arg: MatcherArg) -> Self {
        match arg {
            MatcherArg::NestedScan => RttMatcherKind::NestedScan,
            MatcherArg::SeqIndex => RttMatcherKind::SeqIndex,
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(Config::default()),
    }
}

pub fn run_command(cli: Cli) -> Result<()> {
    let mut config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Analyze {
            pcap,
            format,
            anchor,
            resolver,
            rtt_matcher,
            threaded,
            strict,
            output,
        } => {
            // Command-line flags override the file
            if let Some(format) = format {
                config.report.format = format.into();
            }
            if let Some(anchor) = anchor {
                config.analysis.anchor = anchor.into();
            }
            if let Some(resolver) = resolver {
                config.analysis.resolver = resolver.into();
            }
            if let Some(matcher) = rtt_matcher {
                config.analysis.rtt_matcher = matcher.into();
            }
            if threaded {
                config.pipeline.threaded = true;
            }
            if strict {
                config.pipeline.error_policy = ErrorPolicy::Abort;
            }

            let trace = connscope::analyze_file(&pcap, &config)
                .with_context(|| format!("Failed to analyze {}", pcap.display()))?;
            let content = TraceReport::new(&trace).render(config.report.format)?;

            if let Some(path) = output {
                std::fs::write(&path, &content)
                    .with_context(|| format!("Failed to write report to {}", path.display()))?;
                println!("Report written to: {}", path.display());
            } else {
                print!("{}", content);
            }
        }

        Commands::ShowConfig => {
            print!("{}", config.to_string()?);
        }
    }

    Ok(())
}
