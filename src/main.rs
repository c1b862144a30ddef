use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use textcheck::api::{CheckRequest, LanguageToolClient, MetaData, RemoteChecker};
use textcheck::apply::{Correction, CorrectionApplier, DelaySettle};
use textcheck::config::Config;
use textcheck::dedup::{compute_active, SuppressionPolicy};
use textcheck::dom::Document;
use textcheck::markup::{extract, MarkupList};
use textcheck::settings::{ConfyStore, SettingsStore};
use textcheck::surface::markup_of_element;

#[derive(Parser)]
#[command(version, about = "Check text against a LanguageTool server and apply fixes")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a text or an HTML fragment and list the active matches
    Check {
        /// HTML file to check
        #[arg(long, conflicts_with = "text")]
        html: Option<PathBuf>,

        /// Plain text to check
        #[arg(long)]
        text: Option<String>,

        /// Server base URL, overrides the config file
        #[arg(long)]
        server: Option<String>,

        /// Language code, `auto` to detect
        #[arg(long)]
        language: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace one span of a text or HTML fragment and print the result
    Fix {
        /// HTML file, treated as the content of an editable element
        #[arg(long, conflicts_with = "text")]
        html: Option<PathBuf>,

        /// Plain text, treated as the value of a textarea
        #[arg(long)]
        text: Option<String>,

        /// Start of the span, in UTF-16 units of the flat text
        #[arg(long)]
        offset: usize,

        #[arg(long)]
        length: usize,

        #[arg(long)]
        replacement: String,
    },
}

enum Input {
    Html(String),
    Text(String),
}

fn read_input(html: Option<PathBuf>, text: Option<String>) -> Result<Input> {
    match (html, text) {
        (Some(path), _) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))
            .map(Input::Html),
        (None, Some(text)) => Ok(Input::Text(text)),
        (None, None) => bail!("either --html or --text is required"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load();

    match cli.command {
        Commands::Check {
            html,
            text,
            server,
            language,
            json,
        } => {
            if let Some(server) = server {
                config.server_url = server;
            }
            if let Some(language) = language {
                config.language = language;
            }
            let markup_list = match read_input(html, text)? {
                Input::Html(html) => extract(&html),
                Input::Text(text) => MarkupList::from_plain(text),
            };
            check(&config, markup_list, json).await
        }
        Commands::Fix {
            html,
            text,
            offset,
            length,
            replacement,
        } => {
            let input = read_input(html, text)?;
            fix(&config, input, offset, length, replacement).await
        }
    }
}

async fn check(config: &Config, markup_list: MarkupList, json: bool) -> Result<()> {
    let client = LanguageToolClient::from_config(config)?;
    let settings = ConfyStore.get().unwrap_or_else(|e| {
        tracing::warn!("failed to read settings, using defaults: {}", e);
        Default::default()
    });

    let text = markup_list.flat_text();
    tracing::info!(server = %config.server_url, text_len = markup_list.flat_len(), "checking");
    let response = client
        .check(CheckRequest {
            markup_list,
            meta_data: MetaData::new("cli://textcheck", None),
        })
        .await?;

    let policy = SuppressionPolicy::from_settings(
        &settings,
        response.language.short_code(),
        Some(text.as_str()),
    );
    let active = compute_active(&response.matches, &policy);

    if json {
        println!("{}", serde_json::to_string_pretty(&active)?);
        return Ok(());
    }

    println!(
        "{} ({}): {} issue(s)",
        response.language.name, response.language.code, active.active_count
    );
    for m in active.active() {
        let suggestions: Vec<&str> = m
            .replacements
            .iter()
            .take(3)
            .map(|r| r.value.as_str())
            .collect();
        println!(
            "  {}+{}  {}  [{}]{}",
            m.offset,
            m.length,
            m.message,
            m.rule.id,
            if suggestions.is_empty() {
                String::new()
            } else {
                format!("  -> {}", suggestions.join(", "))
            }
        );
    }
    Ok(())
}

async fn fix(
    config: &Config,
    input: Input,
    offset: usize,
    length: usize,
    replacement: String,
) -> Result<()> {
    let (document, target) = match &input {
        Input::Html(html) => {
            let doc =
                Document::from_body_html(&format!("<div contenteditable=\"true\">{}</div>", html));
            let target = doc
                .element_children(doc.body())
                .first()
                .copied()
                .context("fragment did not produce an element")?;
            (doc, target)
        }
        Input::Text(text) => {
            let mut doc = Document::new();
            let body = doc.body();
            let textarea = doc.create_element("textarea");
            doc.append_child(body, textarea)?;
            doc.set_value(textarea, text)?;
            (doc, textarea)
        }
    };
    let document = document.into_shared();
    document.borrow_mut().focus(target)?;

    let markup_list = markup_of_element(&document.borrow(), Some(target))?;
    let correction = Correction {
        markup_list,
        offset,
        length,
        replacement,
        editable: true,
    };
    let applier = CorrectionApplier::new(DelaySettle(config.settle_delay()));
    let applied = applier.apply(&document, target, &correction).await?;
    tracing::debug!(?applied, "correction applied");

    let doc = document.borrow();
    match input {
        Input::Html(_) => println!("{}", doc.inner_html(target)),
        Input::Text(_) => println!("{}", doc.value(target).unwrap_or_default()),
    }
    Ok(())
}
