//! The `stockmeta models` command: the static model catalog.

use clap::Args;
use stockmeta_core::{available_models, AiFactory, Config};

/// Arguments for the `models` command.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    /// Only list this provider's models
    pub provider: Option<String>,
}

/// Execute the models command.
pub fn execute(args: ModelsArgs, config: &Config) -> anyhow::Result<()> {
    let factory = AiFactory::from_config(config);
    let providers: Vec<&str> = match args.provider.as_deref() {
        Some(name) if factory.providers().contains(&name) => vec![name],
        Some(name) => anyhow::bail!(
            "Unknown provider '{name}' (available: {})",
            factory.providers().join(", ")
        ),
        None => factory.providers(),
    };

    for provider in providers {
        println!("{provider}:");
        for model in available_models(provider) {
            println!("  {provider}/{model}");
        }
    }
    println!("\nDefault: {}", config.generation.default_model);
    Ok(())
}
