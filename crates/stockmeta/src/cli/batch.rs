//! The `stockmeta batch` command: title generation through provider batch jobs.
//!
//! Cloud providers return a job id to poll later. Local providers run the
//! batch eagerly, so `submit` already prints the results.

use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use stockmeta_core::metadata::parse::clean_title;
use stockmeta_core::{BatchJob, Config, MediaDiscovery, Message, PromptManager};

/// Arguments for the `batch` command.
#[derive(Args, Debug)]
pub struct BatchArgs {
    #[command(subcommand)]
    pub command: BatchCommand,
}

/// Batch job subcommands.
#[derive(Subcommand, Debug)]
pub enum BatchCommand {
    /// Submit title generation for every image under a path
    Submit {
        /// Image file or directory
        input: PathBuf,

        /// Model selector, e.g. anthropic/claude-sonnet-4-20250514
        #[arg(short, long)]
        model: Option<String>,

        /// Free-text context added to every title prompt
        #[arg(long)]
        context: Option<String>,
    },

    /// Fetch the current status (and results, once finished)
    Status {
        job_id: String,

        #[arg(short, long)]
        model: Option<String>,
    },

    /// Request cancellation of a running job
    Cancel {
        job_id: String,

        #[arg(short, long)]
        model: Option<String>,
    },
}

/// Job summary printed to stdout. Titles are cleaned like generated titles.
#[derive(Debug, Serialize)]
struct JobReport<'a> {
    job_id: &'a str,
    status: stockmeta_core::BatchStatus,
    results: Vec<TitleResult<'a>>,
}

#[derive(Debug, Serialize)]
struct TitleResult<'a> {
    custom_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

fn report(job: &BatchJob, title_limit: usize) -> JobReport<'_> {
    let results = job
        .results
        .iter()
        .map(|r| {
            if r.is_error() {
                TitleResult {
                    custom_id: &r.custom_id,
                    title: None,
                    error: Some(&r.response.content),
                }
            } else {
                TitleResult {
                    custom_id: &r.custom_id,
                    title: Some(clean_title(&r.response.content, title_limit)),
                    error: None,
                }
            }
        })
        .collect();
    JobReport {
        job_id: &job.job_id,
        status: job.status,
        results,
    }
}

/// Execute the batch command.
pub async fn execute(args: BatchArgs, config: &Config) -> anyhow::Result<()> {
    let prompts = PromptManager::load(config.generation.prompts_path().as_deref());
    let title_limit = prompts.character_limits().title;

    match args.command {
        BatchCommand::Submit {
            input,
            model,
            context,
        } => {
            let provider = super::create_provider(config, model.as_deref())?;
            let files = MediaDiscovery::new(config.discovery.clone()).discover(&input);
            if files.is_empty() {
                tracing::warn!("No supported image files found at {:?}", input);
                return Ok(());
            }

            let prompt = prompts.title_prompt(context.as_deref());
            let mut messages_list = Vec::with_capacity(files.len());
            let mut custom_ids = Vec::with_capacity(files.len());
            for file in &files {
                let image = super::load_image(&file.path).await?;
                messages_list.push(vec![Message::user_with_image(prompt.clone(), image)]);
                custom_ids.push(file.path.display().to_string());
            }

            let job = provider
                .create_batch_job(&messages_list, &custom_ids, &config.generation.options())
                .await?;
            tracing::info!(
                "Submitted batch {} with {} image(s), status {:?}",
                job.job_id,
                files.len(),
                job.status
            );
            println!("{}", serde_json::to_string_pretty(&report(&job, title_limit))?);
        }

        BatchCommand::Status { job_id, model } => {
            let provider = super::create_provider(config, model.as_deref())?;
            let job = provider.get_batch_job(&job_id).await?;
            println!("{}", serde_json::to_string_pretty(&report(&job, title_limit))?);
        }

        BatchCommand::Cancel { job_id, model } => {
            let provider = super::create_provider(config, model.as_deref())?;
            if provider.cancel_batch_job(&job_id).await {
                println!("Cancellation requested for {job_id}");
            } else {
                println!("Job {job_id} was not cancelled (already finished or rejected)");
            }
        }
    }

    Ok(())
}
