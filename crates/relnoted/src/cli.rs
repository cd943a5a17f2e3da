use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use relnote_config::{InferenceProviderKind, RelnoteConfig};
use relnote_core::{MonthWindow, extract_change_set_ids};
use relnote_infer::ProviderOverrides;
use relnote_source::RepoRef;

use crate::pipeline::{ChangelogPlan, ReportPlan, RunRequest, SummaryPlan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format '{other}', expected one of: human, json"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct SummaryArgs {
    #[arg(long, help = "Year of the reported month (defaults to the current UTC year)")]
    pub year: Option<i32>,

    #[arg(long, help = "Month 1-12 (defaults to the current UTC month)")]
    pub month: Option<u32>,

    #[arg(
        long,
        value_delimiter = ',',
        value_name = "ID",
        help = "Comma-separated change-set ids to feature as highlights"
    )]
    pub important: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ChangelogArgs {
    #[arg(
        long,
        value_delimiter = ',',
        value_name = "ID",
        help = "Comma-separated change-set ids to include"
    )]
    pub ids: Vec<u64>,

    #[arg(
        long,
        value_name = "FILE",
        help = "Text file to scan for #123 or pull/123 references"
    )]
    pub ids_file: Option<PathBuf>,

    #[arg(
        long,
        value_delimiter = ',',
        value_name = "ID",
        help = "Comma-separated change-set ids to mark as important"
    )]
    pub important: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Monthly summary report with highlights for important change-sets
    Summary(SummaryArgs),
    /// Release notes for an explicit list of change-sets
    Changelog(ChangelogArgs),
}

#[derive(Debug, Parser)]
#[command(author, version, about = "Release document synthesis from merged change-sets")]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value = ".",
        help = "Workspace root holding .relnote/config.toml"
    )]
    pub workspace: PathBuf,

    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        long,
        global = true,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log format: human or json"
    )]
    pub log_format: LogFormat,

    #[arg(long, global = true, help = "Repository owner (overrides source.owner)")]
    pub owner: Option<String>,

    #[arg(long, global = true, help = "Repository name (overrides source.repo)")]
    pub repo: Option<String>,

    #[arg(long, global = true, help = "Skip writing the translated report")]
    pub no_translate: bool,

    #[arg(
        long,
        global = true,
        help = "Directory for generated reports (overrides report.output_dir)"
    )]
    pub output_dir: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_parser = parse_inference_provider,
        help = "Inference provider override: auto, mock, openai_compatible, or gemini"
    )]
    pub inference_provider: Option<InferenceProviderKind>,

    #[arg(long, global = true, help = "Inference model override")]
    pub inference_model: Option<String>,

    #[arg(long, global = true, help = "OpenAI-compatible endpoint override")]
    pub inference_endpoint: Option<String>,

    #[arg(
        long,
        global = true,
        help = "Environment variable holding the inference API key"
    )]
    pub inference_api_key_env: Option<String>,
}

impl Cli {
    pub fn provider_overrides(&self) -> ProviderOverrides {
        ProviderOverrides {
            provider: self.inference_provider,
            model: self.inference_model.clone(),
            endpoint: self.inference_endpoint.clone(),
            api_key_env: self.inference_api_key_env.clone(),
        }
    }

    /// Output directory, resolved against the workspace when relative.
    pub fn output_dir(&self, workspace: &Path, config: &RelnoteConfig) -> PathBuf {
        let dir = self
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.report.output_dir));
        if dir.is_absolute() {
            dir
        } else {
            workspace.join(dir)
        }
    }

    /// Builds the run request from flags, falling back to config values.
    ///
    /// Missing owner or repo are left blank so that the pipeline reports them
    /// before any retrieval starts.
    pub fn run_request(&self, config: &RelnoteConfig, today: MonthWindow) -> Result<RunRequest> {
        let owner = self
            .owner
            .clone()
            .or_else(|| config.source.owner.clone())
            .unwrap_or_default();
        let repo = self
            .repo
            .clone()
            .or_else(|| config.source.repo.clone())
            .unwrap_or_default();

        let plan = match &self.command {
            Commands::Summary(args) => ReportPlan::Summary(SummaryPlan {
                window: MonthWindow {
                    year: args.year.unwrap_or(today.year),
                    month: args.month.unwrap_or(today.month),
                },
                important_ids: args.important.clone(),
            }),
            Commands::Changelog(args) => {
                let mut ids = args.ids.clone();
                if let Some(path) = &args.ids_file {
                    let text = fs::read_to_string(path)
                        .with_context(|| format!("failed to read id file {}", path.display()))?;
                    ids.extend(extract_change_set_ids(&text));
                }
                ReportPlan::Changelog(ChangelogPlan {
                    ids,
                    important_ids: args.important.clone(),
                })
            }
        };

        Ok(RunRequest {
            repo: RepoRef::new(owner, repo),
            plan,
            translate: config.translation.enabled && !self.no_translate,
        })
    }
}

pub fn parse_cli() -> Cli {
    let mut args: Vec<_> = std::env::args_os().collect();
    if args.get(1).is_some_and(|arg| arg == OsStr::new("--")) {
        args.remove(1);
    }

    Cli::parse_from(args)
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}

fn parse_inference_provider(value: &str) -> Result<InferenceProviderKind, String> {
    value.parse()
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn may_2025() -> MonthWindow {
        MonthWindow {
            year: 2025,
            month: 5,
        }
    }

    #[test]
    fn summary_defaults_to_current_month_and_config_repo() {
        let cli = Cli::try_parse_from(["relnoted", "summary", "--important", "3,9"])
            .expect("summary should parse");
        let mut config = RelnoteConfig::default();
        config.source.owner = Some("acme".to_owned());
        config.source.repo = Some("widget".to_owned());

        let request = cli.run_request(&config, may_2025()).expect("request");

        assert_eq!(request.repo, RepoRef::new("acme", "widget"));
        assert!(request.translate);
        assert_eq!(
            request.plan,
            ReportPlan::Summary(SummaryPlan {
                window: may_2025(),
                important_ids: vec![3, 9],
            })
        );
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "relnoted",
            "changelog",
            "--ids",
            "10,20",
            "--owner",
            "acme",
            "--repo",
            "widget",
            "--no-translate",
            "--log-format",
            "json",
            "--inference-provider",
            "mock",
        ])
        .expect("changelog flags should parse");

        assert_eq!(cli.log_format.as_str(), "json");
        assert_eq!(
            cli.provider_overrides().provider,
            Some(InferenceProviderKind::Mock)
        );
        let request = cli
            .run_request(&RelnoteConfig::default(), may_2025())
            .expect("request");
        assert!(!request.translate);
        assert_eq!(request.repo.slug(), "acme/widget");
        assert_eq!(
            request.plan,
            ReportPlan::Changelog(ChangelogPlan {
                ids: vec![10, 20],
                important_ids: Vec::new(),
            })
        );
    }

    #[test]
    fn ids_file_references_are_appended() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("ids.txt");
        fs::write(&path, "Merged #12 and https://github.com/acme/widget/pull/7\n")
            .expect("write ids file");
        let cli = Cli::try_parse_from([
            "relnoted",
            "changelog",
            "--ids",
            "3",
            "--ids-file",
            path.to_str().expect("utf-8 path"),
        ])
        .expect("changelog should parse");

        let request = cli
            .run_request(&RelnoteConfig::default(), may_2025())
            .expect("request");

        let ReportPlan::Changelog(plan) = request.plan else {
            panic!("expected changelog plan");
        };
        assert_eq!(plan.ids, vec![3, 7, 12]);
    }

    #[test]
    fn missing_ids_file_is_an_error() {
        let cli = Cli::try_parse_from([
            "relnoted",
            "changelog",
            "--ids-file",
            "/nonexistent/relnote-ids.txt",
        ])
        .expect("changelog should parse");

        assert!(
            cli.run_request(&RelnoteConfig::default(), may_2025())
                .is_err()
        );
    }

    #[test]
    fn relative_output_dir_resolves_against_workspace() {
        let cli = Cli::try_parse_from(["relnoted", "--output-dir", "out", "summary"])
            .expect("summary should parse");

        let dir = cli.output_dir(Path::new("/work"), &RelnoteConfig::default());

        assert_eq!(dir, PathBuf::from("/work/out"));
    }

    #[test]
    fn invalid_log_format_is_rejected() {
        assert!(Cli::try_parse_from(["relnoted", "--log-format", "xml", "summary"]).is_err());
    }
}
