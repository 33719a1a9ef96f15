use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};

use ci_repeat::{Config, Publisher, RepeatJobRequest, WorkingCopy};

use crate::output::{self, StageProgress};

#[derive(Parser)]
#[command(name = "ci-repeat")]
#[command(author, version, about = "Repeat a CI job to catch intermittent failures", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./ci-repeat.{toml,json,yaml,yml})
    #[arg(short, long, global = true, env = "CI_REPEAT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(clap::Args)]
struct JobArgs {
    /// Working copy to publish from
    root: PathBuf,

    /// Job to repeat (see `ci-repeat jobs`)
    job: String,

    /// Remote to push the branch to
    #[arg(short, long)]
    remote: Option<String>,

    /// How many times the job runs
    #[arg(short = 'n', long, default_value_t = 10)]
    repetitions: u32,

    /// Extra global environment directive, e.g. APP=communications/contacts
    #[arg(short, long = "global")]
    globals: Vec<String>,

    /// Branch name (defaults to <job>_<epoch millis>)
    #[arg(short, long)]
    branch: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite the manifest, commit it on a new branch and push it
    Publish(JobArgs),

    /// Print the rewritten manifest without writing it or touching git
    Render(JobArgs),

    /// Only validate the working copy
    Check {
        root: PathBuf,

        #[arg(short, long)]
        remote: Option<String>,
    },

    /// Push a branch whose publish failed at the push step
    Push {
        root: PathBuf,

        branch: String,

        #[arg(short, long)]
        remote: Option<String>,
    },

    /// List the jobs that can be repeated
    Jobs,
}

impl Cli {
    fn working_copy(config: &Config, root: &Path, remote: Option<&str>) -> WorkingCopy {
        let remote = remote.unwrap_or(config.git.default_remote.as_str());
        WorkingCopy::new(root, remote, config.project.clone())
    }

    fn request(args: &JobArgs) -> Result<RepeatJobRequest> {
        let request = RepeatJobRequest::new(&args.job, args.repetitions)?
            .with_globals(args.globals.clone());
        Ok(match &args.branch {
            Some(branch) => request.with_branch(branch),
            None => request,
        })
    }

    async fn execute_publish(&self, config: &Config, args: &JobArgs) -> Result<()> {
        let request = Self::request(args)?;
        let working_copy = Self::working_copy(config, &args.root, args.remote.as_deref());
        info!("Publishing from {}", working_copy.root().display());

        let progress = StageProgress::start(&format!(
            "Publishing {} x{} to {}",
            request.job(),
            request.repetitions(),
            working_copy.remote()
        ));

        match Publisher::from_config(config)
            .publish(&working_copy, &request)
            .await
        {
            Ok(published) => {
                progress.succeed("Published");
                output::print_published(&published, &request);
                println!("{}", published.branch);
                Ok(())
            }
            Err(e) => {
                progress.fail("Publish failed");
                Err(e.into())
            }
        }
    }

    async fn execute_render(&self, config: &Config, args: &JobArgs) -> Result<()> {
        let request = Self::request(args)?;
        let working_copy = Self::working_copy(config, &args.root, args.remote.as_deref());

        let (branch, manifest) = Publisher::from_config(config)
            .render(&working_copy, &request)
            .await?;

        info!("Rendered manifest for branch {branch}");
        print!("{}", manifest.to_yaml_string().map_err(anyhow::Error::msg)?);
        Ok(())
    }

    async fn execute_check(&self, config: &Config, root: &Path, remote: Option<&str>) -> Result<()> {
        let working_copy = Self::working_copy(config, root, remote);
        let origin = working_copy.validate().await?;
        output::print_origin(&working_copy, &origin);
        Ok(())
    }

    async fn execute_push(
        &self,
        config: &Config,
        root: &Path,
        branch: &str,
        remote: Option<&str>,
    ) -> Result<()> {
        let working_copy = Self::working_copy(config, root, remote);
        let progress = StageProgress::start(&format!("Pushing {branch} to {}", working_copy.remote()));

        match Publisher::from_config(config)
            .resume_push(&working_copy, branch)
            .await
        {
            Ok(()) => {
                progress.succeed("Pushed");
                println!("{branch}");
                Ok(())
            }
            Err(e) => {
                progress.fail("Push failed");
                Err(e.into())
            }
        }
    }

    pub async fn execute(&self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;

        match &self.command {
            Commands::Publish(args) => self.execute_publish(&config, args).await,
            Commands::Render(args) => self.execute_render(&config, args).await,
            Commands::Check { root, remote } => {
                self.execute_check(&config, root, remote.as_deref()).await
            }
            Commands::Push {
                root,
                branch,
                remote,
            } => {
                self.execute_push(&config, root, branch, remote.as_deref())
                    .await
            }
            Commands::Jobs => {
                output::print_jobs();
                Ok(())
            }
        }
    }
}
