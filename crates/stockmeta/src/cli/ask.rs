//! The `stockmeta ask` command: one prompt, streamed when possible.

use clap::Args;
use futures_util::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use stockmeta_core::{Config, Message};

/// Arguments for the `ask` command.
#[derive(Args, Debug)]
pub struct AskArgs {
    /// Prompt text
    #[arg(required = true)]
    pub prompt: String,

    /// Model selector, e.g. openai/gpt-4o (defaults to generation.default_model)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Image to attach to the prompt
    #[arg(short, long)]
    pub image: Option<PathBuf>,

    /// System prompt
    #[arg(long)]
    pub system: Option<String>,

    /// Print the full response at once instead of streaming
    #[arg(long)]
    pub no_stream: bool,
}

/// Execute the ask command.
pub async fn execute(args: AskArgs, config: &Config) -> anyhow::Result<()> {
    let provider = super::create_provider(config, args.model.as_deref())?;
    let options = config.generation.options();

    let mut messages = Vec::new();
    if let Some(system) = args.system {
        messages.push(Message::system(system));
    }
    messages.push(match &args.image {
        Some(path) => Message::user_with_image(args.prompt, super::load_image(path).await?),
        None => Message::user(args.prompt),
    });

    if provider.supports_streaming() && !args.no_stream {
        let mut stream = provider.generate_text_stream(&messages, &options).await?;
        let mut stdout = std::io::stdout().lock();
        while let Some(fragment) = stream.next().await {
            stdout.write_all(fragment?.as_bytes())?;
            stdout.flush()?;
        }
        writeln!(stdout)?;
    } else {
        let response = provider.generate_text(&messages, &options).await?;
        println!("{}", response.content);
        if let Some(usage) = response.usage {
            tracing::debug!(
                "{} input / {} output tokens",
                usage.input_tokens,
                usage.output_tokens
            );
        }
    }

    tracing::debug!("Provider stats: {:?}", provider.usage_stats());
    Ok(())
}
