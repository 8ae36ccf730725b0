mod config;
mod error;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use catalog::{ModelsDevStore, StaticCatalog};
use clap::{Parser, Subcommand};
use environment::{EnvFileProvider, MultiProvider, OsEnvProvider};
use provider::{
    BoxMessageStream, ChatMessage, FileReference, ImageUrl, MessagePart, MessageStream, ModelChoice, ModelResolver,
    Provider, Role, Usage,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use config::{CONFIG_FILE, CatalogSource, Config};
use error::{Error, Result};

#[derive(Parser)]
#[command(name = "capstan")]
#[command(about = "Resolve model references and stream from LLM providers", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List selectable models
    Models {
        /// Use this agent's default model
        #[arg(long)]
        agent: Option<String>,
        /// Mark this reference as the active one
        #[arg(long)]
        current: Option<String>,
        /// Previously used references to include
        #[arg(long = "custom")]
        custom: Vec<String>,
    },
    /// Show the handles a reference resolves to
    Resolve {
        /// Config name, provider/model, or comma-separated alloy
        reference: String,
    },
    /// Send one prompt and stream the answer
    Chat {
        /// Model reference (defaults to default_model)
        #[arg(short, long)]
        model: Option<String>,
        /// Attach a local image (repeatable)
        #[arg(long = "image")]
        images: Vec<PathBuf>,
        /// System prompt
        #[arg(long)]
        system: Option<String>,
        prompt: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.config)?;
    let resolver = build_resolver(&config)?;

    match cli.command {
        Commands::Models { agent, current, custom } => {
            let default_ref = config.default_ref(agent.as_deref())?;
            cmd_models(&resolver, default_ref, current.as_deref(), &custom).await
        }
        Commands::Resolve { reference } => cmd_resolve(&resolver, &reference).await,
        Commands::Chat {
            model,
            images,
            system,
            prompt,
        } => {
            let reference = model
                .or_else(|| config.default_model.clone())
                .ok_or(Error::NoModel)?;
            cmd_chat(&resolver, &reference, system.as_deref(), &images, &prompt).await
        }
    }
}

fn build_resolver(config: &Config) -> Result<ModelResolver> {
    let mut env = MultiProvider::new().with(OsEnvProvider);
    if let Some(path) = &config.env_file {
        env = env.with(EnvFileProvider::load(path)?);
    }

    let mut resolver = ModelResolver::new(config.models.clone(), Arc::new(env));
    if let Some(gateway) = &config.gateway {
        resolver = resolver.with_gateway(gateway);
    }
    match config.catalog_source() {
        Some(CatalogSource::ModelsDev) => {
            resolver = resolver.with_catalog(Arc::new(ModelsDevStore::new()));
        }
        Some(CatalogSource::File(path)) => {
            resolver = resolver.with_catalog(Arc::new(StaticCatalog::load(&path)?));
        }
        None => {}
    }
    Ok(resolver)
}

async fn cmd_models(
    resolver: &ModelResolver,
    default_ref: Option<&str>,
    current: Option<&str>,
    custom: &[String],
) -> Result<()> {
    let choices = resolver.available_models(default_ref, current, custom).await;
    if choices.is_empty() {
        println!("No models available. Configure models in {CONFIG_FILE} or set provider API keys.");
        return Ok(());
    }

    println!("{:<2}{:<32}  {:<16}  {:<40}  SOURCE", "", "NAME", "PROVIDER", "MODEL");
    println!("{}", "-".repeat(104));
    for choice in &choices {
        let marker = if choice.is_current { "*" } else { "" };
        println!(
            "{marker:<2}{:<32}  {:<16}  {:<40}  {}",
            choice.name,
            choice.provider,
            choice.model,
            source_label(choice)
        );
    }
    Ok(())
}

fn source_label(choice: &ModelChoice) -> &'static str {
    if choice.is_default {
        "default"
    } else if choice.is_custom {
        "custom"
    } else if choice.is_catalog {
        "catalog"
    } else {
        "config"
    }
}

async fn cmd_resolve(resolver: &ModelResolver, reference: &str) -> Result<()> {
    for handle in resolve_handles(resolver, reference).await? {
        println!("{}", handle.id());
    }
    Ok(())
}

/// Every handle behind `reference`. A stored alloy expands to its members.
async fn resolve_handles(resolver: &ModelResolver, reference: &str) -> Result<Vec<Arc<dyn Provider>>> {
    if let Some(members) = resolver.alloy_members(reference.trim()) {
        return Ok(resolver.resolve_refs(&members).await?);
    }
    Ok(resolver.resolve(reference).await?.into_providers())
}

async fn cmd_chat(
    resolver: &ModelResolver,
    reference: &str,
    system: Option<&str>,
    images: &[PathBuf],
    prompt: &str,
) -> Result<()> {
    let handles = resolve_handles(resolver, reference).await?;
    let messages = build_messages(system, images, prompt);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received, cancelling stream");
            on_interrupt.cancel();
        }
    });

    let mut stream = open_stream(&handles, reference, &cancel, &messages).await?;
    let mut stdout = io::stdout();
    let mut usage: Option<Usage> = None;

    while let Some(delta) = stream.recv().await? {
        if !delta.reasoning_content.is_empty() {
            eprint!("{}", delta.reasoning_content);
        }
        if !delta.content.is_empty() {
            print!("{}", delta.content);
            stdout.flush()?;
        }
        if let Some(reason) = delta.finish_reason {
            debug!(%reason, "model finished");
        }
        if delta.usage.is_some() {
            usage = delta.usage;
        }
    }
    println!();

    if let Some(usage) = usage {
        info!(
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "token usage"
        );
    }
    if cancel.is_cancelled() {
        eprintln!("(cancelled)");
    }
    Ok(())
}

fn build_messages(system: Option<&str>, images: &[PathBuf], prompt: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::new();
    if let Some(system) = system {
        messages.push(ChatMessage::system(system));
    }

    if images.is_empty() {
        messages.push(ChatMessage::user(prompt));
    } else {
        let mut parts = vec![MessagePart::text(prompt)];
        parts.extend(images.iter().map(|path| image_part(path)));
        messages.push(ChatMessage::parts(Role::User, parts));
    }
    messages
}

fn image_part(path: &Path) -> MessagePart {
    // The media type is inferred from the extension when the file is read.
    let file = FileReference::local(path.to_string_lossy(), "");
    MessagePart::image(ImageUrl::file(file))
}

/// Open a stream on the first handle that accepts the request.
async fn open_stream(
    handles: &[Arc<dyn Provider>],
    reference: &str,
    cancel: &CancellationToken,
    messages: &[ChatMessage],
) -> Result<BoxMessageStream> {
    let mut last_error = None;
    for handle in handles {
        match handle
            .create_chat_completion_stream(cancel.clone(), messages, &[])
            .await
        {
            Ok(stream) => {
                info!(model = %handle.id(), "streaming response");
                return Ok(stream);
            }
            Err(err) => {
                warn!(model = %handle.id(), error = %err, "model failed to start a stream");
                last_error = Some(err);
            }
        }
    }

    match last_error {
        Some(source) if handles.len() > 1 => Err(Error::AllModelsFailed {
            reference: reference.to_string(),
            source,
        }),
        Some(source) => Err(source.into()),
        None => Err(Error::NoModel),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_prompt_is_single_user_message() {
        let messages = build_messages(Some("be brief"), &[], "hello");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "hello");
        assert!(messages[1].multi_content.is_empty());
    }

    #[test]
    fn images_become_local_file_parts() {
        let messages = build_messages(None, &[PathBuf::from("shot.png")], "what is this?");
        assert_eq!(messages.len(), 1);
        let parts = &messages[0].multi_content;
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], MessagePart::text("what is this?"));
        let MessagePart::ImageUrl { image_url } = &parts[1] else {
            panic!("expected image part, got {:?}", parts[1]);
        };
        let file = image_url.as_ref().and_then(|i| i.file_ref.as_ref()).unwrap();
        assert_eq!(file.local_path, "shot.png");
    }

    #[tokio::test]
    async fn stored_alloy_resolves_every_member() {
        let config = Config::parse(
            r#"
[models.a]
provider = "anthropic"
model = "claude"

[models.pair]
model = "a, anthropic/claude-haiku"
"#,
        )
        .unwrap();
        let env = environment::MapProvider::new().set("ANTHROPIC_API_KEY", "sk-test");
        let resolver = ModelResolver::new(config.models, Arc::new(env));

        let handles = resolve_handles(&resolver, "pair").await.unwrap();
        let ids: Vec<_> = handles.iter().map(|h| h.id()).collect();
        assert_eq!(ids, vec!["anthropic/claude", "anthropic/claude-haiku"]);
    }

    #[tokio::test]
    async fn failing_members_report_the_reference() {
        let resolver = ModelResolver::new(
            std::collections::HashMap::new(),
            Arc::new(environment::MapProvider::new().set("ANTHROPIC_API_KEY", "sk-test")),
        );
        let handles = resolve_handles(&resolver, "anthropic/a, anthropic/b").await.unwrap();
        let err = open_stream(&handles, "anthropic/a, anthropic/b", &CancellationToken::new(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AllModelsFailed { .. }));
    }
}
