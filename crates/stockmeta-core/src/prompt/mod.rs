//! Prompt templates for metadata generation.
//!
//! Templates come from an optional JSON file:
//!
//! ```json
//! {
//!   "metadata_generation": {
//!     "title": {
//!       "variables": {"style": "concise"},
//!       "template": ["Write a {style} stock photo title.", "{context_section}"],
//!       "context_template": "Existing title to improve: {context}"
//!     }
//!   },
//!   "character_limits": {"title": 100, "description": 200, "keywords_max": 50},
//!   "photobank_limits": {"shutterstock": 2}
//! }
//! ```
//!
//! A missing or unreadable file, a missing kind, or a template that does not
//! render all fall back to a minimal built-in prompt for that call.

pub mod edit;
pub mod template;

pub use edit::EditTag;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use template::render;

/// Keywords shown before a preview is cut short.
pub const KEYWORD_PREVIEW_COUNT: usize = 10;

const DEFAULT_PHOTOBANK_LIMITS: &[(&str, usize)] = &[
    ("shutterstock", 2),
    ("adobestock", 1),
    ("dreamstime", 3),
    ("alamy", 2),
];

/// Category cap for banks with no configured limit.
const UNKNOWN_BANK_LIMIT: usize = 1;

/// Length caps applied to generated fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CharacterLimits {
    pub title: usize,
    pub description: usize,
    pub keywords_max: usize,
}

impl Default for CharacterLimits {
    fn default() -> Self {
        Self {
            title: 100,
            description: 200,
            keywords_max: 50,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PromptFile {
    metadata_generation: HashMap<String, KindTemplate>,
    character_limits: PartialLimits,
    photobank_limits: HashMap<String, usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PartialLimits {
    title: Option<usize>,
    description: Option<usize>,
    keywords_max: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct KindTemplate {
    #[serde(default)]
    variables: serde_json::Map<String, serde_json::Value>,
    template: TemplateText,
    context_template: Option<String>,
    title_template: Option<String>,
    description_template: Option<String>,
    categories_template: Option<String>,
}

/// One string, or fragments joined with newlines.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TemplateText {
    One(String),
    Lines(Vec<String>),
}

impl TemplateText {
    fn joined(&self) -> String {
        match self {
            TemplateText::One(text) => text.clone(),
            TemplateText::Lines(lines) => lines.join("\n"),
        }
    }
}

type Vars = HashMap<String, String>;

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Render an optional sub-section. Empty input gives an empty section.
fn section(template: Option<&String>, name: &str, value: Option<&str>) -> Result<String, String> {
    let Some(value) = present(value) else {
        return Ok(String::new());
    };
    let template = template.ok_or_else(|| format!("{name}_template is missing"))?;
    let vars = Vars::from([(name.to_string(), value.to_string())]);
    render(template, &vars).map_err(|e| e.to_string())
}

/// First [`KEYWORD_PREVIEW_COUNT`] keywords, then `, ... (N total)` if there are more.
pub fn keyword_preview(keywords: &[String]) -> String {
    let mut preview = keywords
        .iter()
        .take(KEYWORD_PREVIEW_COUNT)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if keywords.len() > KEYWORD_PREVIEW_COUNT {
        preview.push_str(&format!(", ... ({} total)", keywords.len()));
    }
    preview
}

/// Builds the prompt for each generation kind.
#[derive(Debug, Default)]
pub struct PromptManager {
    file: PromptFile,
}

impl PromptManager {
    /// Built-in prompts only.
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Parse a prompt configuration document.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            file: serde_json::from_str(text)?,
        })
    }

    /// Load from `path`. Never fails: problems are logged and built-in prompts are used.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            tracing::debug!("No prompt config set, using built-in prompts");
            return Self::builtin();
        };
        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|text| Self::from_json(&text).map_err(|e| e.to_string()));
        match parsed {
            Ok(manager) => {
                tracing::debug!("Loaded prompt config from {:?}", path);
                manager
            }
            Err(e) => {
                tracing::warn!("Failed to load prompt config {:?}: {e}, using built-in prompts", path);
                Self::builtin()
            }
        }
    }

    pub fn character_limits(&self) -> CharacterLimits {
        let defaults = CharacterLimits::default();
        let configured = &self.file.character_limits;
        CharacterLimits {
            title: configured.title.unwrap_or(defaults.title),
            description: configured.description.unwrap_or(defaults.description),
            keywords_max: configured.keywords_max.unwrap_or(defaults.keywords_max),
        }
    }

    /// Category caps per bank: built-in defaults overlaid with configured values.
    pub fn photobank_limits(&self) -> BTreeMap<String, usize> {
        let mut limits: BTreeMap<String, usize> = DEFAULT_PHOTOBANK_LIMITS
            .iter()
            .map(|(bank, limit)| (bank.to_string(), *limit))
            .collect();
        limits.extend(self.file.photobank_limits.iter().map(|(k, v)| (k.clone(), *v)));
        limits
    }

    /// Category cap for one bank. The name is lowercased and spaces are removed.
    pub fn photobank_limit(&self, photobank: &str) -> usize {
        let key = photobank.to_lowercase().replace(' ', "");
        self.photobank_limits()
            .get(&key)
            .copied()
            .unwrap_or(UNKNOWN_BANK_LIMIT)
    }

    /// Render `kind` with its configured variables plus whatever `fill` adds.
    fn render_kind<F>(&self, kind: &str, fill: F) -> Result<String, String>
    where
        F: FnOnce(&KindTemplate, &mut Vars) -> Result<(), String>,
    {
        let config = self
            .file
            .metadata_generation
            .get(kind)
            .ok_or_else(|| "no template configured".to_string())?;
        let mut vars: Vars = config
            .variables
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect();
        fill(config, &mut vars)?;
        render(&config.template.joined(), &vars).map_err(|e| e.to_string())
    }

    fn or_fallback(
        &self,
        kind: &str,
        rendered: Result<String, String>,
        fallback: impl FnOnce() -> String,
    ) -> String {
        match rendered {
            Ok(prompt) => prompt,
            Err(reason) => {
                if !self.file.metadata_generation.is_empty() {
                    tracing::warn!("Prompt '{kind}' fell back to built-in template: {reason}");
                }
                fallback()
            }
        }
    }

    pub fn title_prompt(&self, context: Option<&str>) -> String {
        let rendered = self.render_kind("title", |cfg, vars| {
            vars.insert(
                "context_section".into(),
                section(cfg.context_template.as_ref(), "context", context)?,
            );
            Ok(())
        });
        self.or_fallback("title", rendered, || {
            let mut prompt = "Create a title for this image.\n\n".to_string();
            if let Some(context) = present(context) {
                prompt.push_str(&format!("Context/existing title to improve: {context}\n\n"));
            }
            prompt.push_str("Return ONLY the title, no other text.");
            prompt
        })
    }

    pub fn description_prompt(&self, title: Option<&str>, context: Option<&str>) -> String {
        let rendered = self.render_kind("description", |cfg, vars| {
            vars.insert(
                "title_section".into(),
                section(cfg.title_template.as_ref(), "title", title)?,
            );
            vars.insert(
                "context_section".into(),
                section(cfg.context_template.as_ref(), "context", context)?,
            );
            Ok(())
        });
        self.or_fallback("description", rendered, || {
            let mut prompt = "Create a description for this image.\n\n".to_string();
            if let Some(title) = present(title) {
                prompt.push_str(&format!("Title: {title}\n"));
            }
            if let Some(context) = present(context) {
                prompt.push_str(&format!("Context/existing description to improve: {context}\n"));
            }
            prompt.push_str("\nReturn ONLY the description, no other text.");
            prompt
        })
    }

    pub fn keywords_prompt(
        &self,
        title: Option<&str>,
        description: Option<&str>,
        count: usize,
    ) -> String {
        let rendered = self.render_kind("keywords", |cfg, vars| {
            vars.insert("count".into(), count.to_string());
            vars.insert(
                "title_section".into(),
                section(cfg.title_template.as_ref(), "title", title)?,
            );
            vars.insert(
                "description_section".into(),
                section(cfg.description_template.as_ref(), "description", description)?,
            );
            Ok(())
        });
        self.or_fallback("keywords", rendered, || {
            let mut prompt = format!("Generate {count} relevant keywords for this image.\n\n");
            if let Some(title) = present(title) {
                prompt.push_str(&format!("Title: {title}\n"));
            }
            if let Some(description) = present(description) {
                prompt.push_str(&format!("Description: {description}\n"));
            }
            prompt.push_str(&format!(
                "\nReturn ONLY {count} keywords separated by commas, no other text."
            ));
            prompt
        })
    }

    pub fn categories_prompt(
        &self,
        photobank: &str,
        categories: &[String],
        title: Option<&str>,
        description: Option<&str>,
    ) -> String {
        let max = self.photobank_limit(photobank);
        let (word, plural) = if max > 1 {
            ("categories", "s")
        } else {
            ("category", "")
        };
        let list = categories.join(", ");

        let rendered = self.render_kind("categories", |cfg, vars| {
            vars.insert("max_categories".into(), max.to_string());
            vars.insert("photobank".into(), photobank.to_string());
            vars.insert("categories_list".into(), list.clone());
            vars.insert("category_word".into(), word.to_string());
            vars.insert("category_plural".into(), plural.to_string());
            let categories_section = match &cfg.categories_template {
                Some(_) => section(cfg.categories_template.as_ref(), "categories_list", Some(list.as_str()))?,
                None => list.clone(),
            };
            vars.insert("categories_section".into(), categories_section);
            vars.insert(
                "title_section".into(),
                section(cfg.title_template.as_ref(), "title", title)?,
            );
            vars.insert(
                "description_section".into(),
                section(cfg.description_template.as_ref(), "description", description)?,
            );
            Ok(())
        });
        self.or_fallback("categories", rendered, || {
            let mut prompt = format!("Select {max} {word} from: {list}\n\n");
            if let Some(title) = present(title) {
                prompt.push_str(&format!("Title: {title}\n"));
            }
            if let Some(description) = present(description) {
                prompt.push_str(&format!("Description: {description}\n"));
            }
            prompt.push_str(&format!(
                "\nReturn ONLY {max} category name{plural} separated by commas."
            ));
            prompt
        })
    }

    pub fn editorial_prompt(&self, title: Option<&str>, description: Option<&str>) -> String {
        let rendered = self.render_kind("editorial", |cfg, vars| {
            vars.insert(
                "title_section".into(),
                section(cfg.title_template.as_ref(), "title", title)?,
            );
            vars.insert(
                "description_section".into(),
                section(cfg.description_template.as_ref(), "description", description)?,
            );
            Ok(())
        });
        self.or_fallback("editorial", rendered, || {
            let mut prompt = "Is this image editorial content?\n\n".to_string();
            if let Some(title) = present(title) {
                prompt.push_str(&format!("Title: {title}\n"));
            }
            if let Some(description) = present(description) {
                prompt.push_str(&format!("Description: {description}\n"));
            }
            prompt.push_str("\nReturn ONLY 'YES' or 'NO'.");
            prompt
        })
    }

    fn edit_vars(vars: &mut Vars, edit: EditTag) {
        vars.insert("edit_tag".into(), edit.as_str().to_string());
        vars.insert("edit_description".into(), edit.description().to_string());
        vars.insert("edit_hint".into(), edit.hint().to_string());
    }

    pub fn title_alternative_prompt(&self, edit: EditTag, original_title: &str) -> String {
        let rendered = self.render_kind("title_alternative", |_, vars| {
            Self::edit_vars(vars, edit);
            vars.insert("edit_instructions".into(), edit.title_instructions().to_string());
            vars.insert("original_title".into(), original_title.to_string());
            Ok(())
        });
        self.or_fallback("title_alternative", rendered, || {
            format!(
                "Create a title for the {} version of this image.\n\
                 Original title: {original_title}\n\
                 {}.\n\
                 Return ONLY the new title.",
                edit.description(),
                edit.title_instructions()
            )
        })
    }

    pub fn description_alternative_prompt(
        &self,
        edit: EditTag,
        original_title: &str,
        original_description: &str,
    ) -> String {
        let rendered = self.render_kind("description_alternative", |_, vars| {
            Self::edit_vars(vars, edit);
            vars.insert(
                "edit_instructions".into(),
                edit.description_instructions().to_string(),
            );
            vars.insert("original_title".into(), original_title.to_string());
            vars.insert("original_description".into(), original_description.to_string());
            Ok(())
        });
        self.or_fallback("description_alternative", rendered, || {
            format!(
                "Create a description for the {} version of this image.\n\
                 Original title: {original_title}\n\
                 Original description: {original_description}\n\
                 {}.\n\
                 Return ONLY the new description.",
                edit.description(),
                edit.description_instructions()
            )
        })
    }

    pub fn keywords_alternative_prompt(
        &self,
        edit: EditTag,
        original_title: &str,
        original_description: &str,
        original_keywords: &[String],
        count: usize,
    ) -> String {
        let preview = keyword_preview(original_keywords);
        let rendered = self.render_kind("keywords_alternative", |_, vars| {
            Self::edit_vars(vars, edit);
            vars.insert("edit_instructions".into(), edit.keywords_instructions().to_string());
            vars.insert("original_title".into(), original_title.to_string());
            vars.insert("original_description".into(), original_description.to_string());
            vars.insert("original_keywords".into(), preview.clone());
            vars.insert("count".into(), count.to_string());
            Ok(())
        });
        self.or_fallback("keywords_alternative", rendered, || {
            format!(
                "Generate {count} keywords for the {} version of this image.\n\
                 Original title: {original_title}\n\
                 Original keywords: {preview}\n\
                 {}.\n\
                 Return ONLY comma-separated keywords.",
                edit.description(),
                edit.keywords_instructions()
            )
        })
    }
}
