//! The `stockmeta generate` command: metadata for every image under a path.

use anyhow::Context;
use clap::{Args, ValueEnum};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;
use stockmeta_core::{
    Config, DiscoveredFile, EditTag, EditorialContext, GeneratedMetadata, GenerationRequest,
    MediaDiscovery, MetadataGenerator, MetadataRecord, OutputFormat as CoreOutputFormat,
    OutputWriter, PromptManager,
};

/// Supported output formats.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    /// Pretty JSON array
    #[default]
    Json,
    /// One JSON object per line
    Jsonl,
}

impl From<OutputFormat> for CoreOutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => CoreOutputFormat::Json,
            OutputFormat::Jsonl => CoreOutputFormat::JsonLines,
        }
    }
}

/// Arguments for the `generate` command.
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Image file or directory to process
    #[arg(required = true)]
    pub input: PathBuf,

    /// Model selector, e.g. openai/gpt-4o (defaults to generation.default_model)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Free-text context or an existing title to improve
    #[arg(long)]
    pub context: Option<String>,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// City for editorial submissions
    #[arg(long, requires_all = ["editorial_country", "editorial_date"])]
    pub editorial_city: Option<String>,

    /// Country for editorial submissions
    #[arg(long, requires_all = ["editorial_city", "editorial_date"])]
    pub editorial_country: Option<String>,

    /// Date for editorial submissions, e.g. 03/15/2024
    #[arg(long, requires_all = ["editorial_city", "editorial_country"])]
    pub editorial_date: Option<String>,

    /// Also generate metadata for an edited variant (_bw, _negative, _sharpen, _misty, _blurred)
    #[arg(long)]
    pub alternative: Option<EditTag>,

    /// Number of keywords to request (defaults to generation.keyword_count)
    #[arg(long)]
    pub keywords: Option<usize>,
}

impl GenerateArgs {
    fn editorial(&self) -> Option<EditorialContext> {
        match (&self.editorial_city, &self.editorial_country, &self.editorial_date) {
            (Some(city), Some(country), Some(date)) => Some(EditorialContext {
                city: city.clone(),
                country: country.clone(),
                date: date.clone(),
            }),
            _ => None,
        }
    }
}

/// Originals first so tagged variants (`name_bw.jpg`) can reuse their
/// original's metadata.
fn processing_order(mut files: Vec<DiscoveredFile>) -> Vec<DiscoveredFile> {
    files.sort_by_key(|f| f.edit_tag().is_some());
    files
}

fn create_progress_bar(total: u64) -> anyhow::Result<indicatif::ProgressBar> {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
            )?
            .progress_chars("##-"),
    );
    pb.set_message("starting...");
    Ok(pb)
}

/// Execute the generate command.
pub async fn execute(args: GenerateArgs, config: &Config) -> anyhow::Result<()> {
    let provider = super::create_provider(config, args.model.as_deref())?;
    let prompts = PromptManager::load(config.generation.prompts_path().as_deref());
    let generator = MetadataGenerator::new(provider.clone(), prompts)
        .with_photobank_categories(config.photobanks.0.clone())
        .with_keyword_count(args.keywords.unwrap_or(config.generation.keyword_count))
        .with_options(config.generation.options());

    let files = MediaDiscovery::new(config.discovery.clone()).discover(&args.input);
    if files.is_empty() {
        tracing::warn!("No supported image files found at {:?}", args.input);
        return Ok(());
    }
    tracing::info!("Found {} image(s) to process", files.len());

    let sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut writer = OutputWriter::new(sink, args.format.into());

    let editorial = args.editorial();
    let progress = create_progress_bar(files.len() as u64)?;
    let start = Instant::now();
    let mut bases: HashMap<PathBuf, GeneratedMetadata> = HashMap::new();
    let (mut succeeded, mut failed) = (0u64, 0u64);

    for file in processing_order(files) {
        progress.set_message(
            file.path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        match process_file(&generator, &args, editorial.as_ref(), &file, &bases).await {
            Ok(records) => {
                for record in &records {
                    writer.write(record)?;
                }
                if let Some(base) = records.into_iter().next() {
                    bases.insert(base.file, base.metadata);
                }
                succeeded += 1;
            }
            Err(e) => {
                progress.suspend(|| tracing::error!("Failed to process {:?}: {e:#}", file.path));
                failed += 1;
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();
    writer.finish()?;

    if let Some(path) = &args.output {
        tracing::info!("Output written to {:?}", path);
    }
    eprintln!(
        "Processed {succeeded} image(s), {failed} failed in {:.1}s",
        start.elapsed().as_secs_f64()
    );
    tracing::debug!("Provider stats: {:?}", provider.usage_stats());
    Ok(())
}

/// Metadata records for one file: its own, plus the `--alternative` variant.
async fn process_file(
    generator: &MetadataGenerator,
    args: &GenerateArgs,
    editorial: Option<&EditorialContext>,
    file: &DiscoveredFile,
    bases: &HashMap<PathBuf, GeneratedMetadata>,
) -> anyhow::Result<Vec<MetadataRecord>> {
    let image = super::load_image(&file.path).await?;

    let original = file
        .original_path()
        .and_then(|path| bases.get(&path))
        .zip(file.edit_tag());
    let metadata = match original {
        Some((base, tag)) => {
            tracing::debug!("{:?} is a {} variant, regenerating from original", file.path, tag);
            generator.generate_alternative(tag, base, &image).await?
        }
        None => {
            let mut request = GenerationRequest::new(image.clone());
            request.context = args.context.clone();
            request.editorial = editorial.cloned();
            generator.generate(&request).await?
        }
    };

    let mut records = Vec::with_capacity(2);
    if let Some(tag) = args.alternative {
        if metadata.edit_tag.is_none() {
            let alternative = generator.generate_alternative(tag, &metadata, &image).await?;
            records.push(MetadataRecord {
                file: file.path.clone(),
                metadata: metadata.clone(),
            });
            records.push(MetadataRecord {
                file: file.path.clone(),
                metadata: alternative,
            });
            return Ok(records);
        }
    }
    records.push(MetadataRecord {
        file: file.path.clone(),
        metadata,
    });
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str) -> DiscoveredFile {
        DiscoveredFile {
            path: PathBuf::from(path),
            size: 0,
        }
    }

    #[test]
    fn test_originals_processed_before_variants() {
        let ordered = processing_order(vec![
            file("a_bw.jpg"),
            file("b.jpg"),
            file("a.jpg"),
            file("b_misty.jpg"),
        ]);
        let names: Vec<_> = ordered.iter().map(|f| f.path.to_string_lossy().into_owned()).collect();
        assert_eq!(names, vec!["b.jpg", "a.jpg", "a_bw.jpg", "b_misty.jpg"]);
    }

    #[test]
    fn test_editorial_requires_all_parts() {
        let args = GenerateArgs {
            input: PathBuf::from("."),
            model: None,
            context: None,
            output: None,
            format: OutputFormat::Json,
            editorial_city: Some("Prague".into()),
            editorial_country: Some("Czech Republic".into()),
            editorial_date: Some("05/01/2024".into()),
            alternative: None,
            keywords: None,
        };
        let editorial = args.editorial().unwrap();
        assert_eq!(editorial.prefix(), "PRAGUE, CZECH REPUBLIC - 05/01/2024: ");

        let partial = GenerateArgs {
            editorial_date: None,
            ..args
        };
        assert!(partial.editorial().is_none());
    }
}
