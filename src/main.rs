//! Console transport for the intake bot.
//!
//! Reads one message per line from stdin and prints the reply. A line of the
//! form `user-id| text` speaks as that user; anything else speaks as the
//! default console user. `!reset <key>` is handled as an admin command.

use std::sync::Arc;

use secrecy::Secret;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use intake_orchestrator::adapters::{
    FileSessionStore, InMemorySessionStore, LlmClassificationService, MockClassificationService,
    MockCompletionService, OpenAICompletionService, OpenAIConfig,
};
use intake_orchestrator::application::{IdleSweeper, IntakeOrchestrator};
use intake_orchestrator::config::{
    AppConfig, CompletionConfig, CompletionProvider, LoggingConfig, StorageBackend, StorageConfig,
};
use intake_orchestrator::domain::foundation::UserId;
use intake_orchestrator::domain::intake::APOLOGY;
use intake_orchestrator::ports::{
    ClassificationService, CompletionService, ServiceError, SessionStore,
};

const CONSOLE_USER: &str = "console";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging);
    config.validate()?;

    info!(
        provider = ?config.completion.provider,
        storage = ?config.storage.backend,
        "starting intake bot v{}",
        env!("CARGO_PKG_VERSION")
    );

    let (completion, classifier) = build_services(&config.completion)?;
    let orchestrator = Arc::new(IntakeOrchestrator::new(
        build_store(&config.storage),
        completion,
        classifier,
        config.session.intake_settings(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = IdleSweeper::with_interval(orchestrator.clone(), config.session.sweep_interval());
    let sweeper_task = tokio::spawn(async move { sweeper.run(shutdown_rx).await });

    run_console(&orchestrator).await?;

    info!("stdin closed, shutting down");
    // The sweeper may already be gone; nothing else listens.
    let _ = shutdown_tx.send(true);
    sweeper_task.await?;
    Ok(())
}

fn init_tracing(config: &LoggingConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.level.clone().into());

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };
    subscriber.with(fmt_layer).init();
}

fn build_services(
    config: &CompletionConfig,
) -> Result<(Arc<dyn CompletionService>, Arc<dyn ClassificationService>), ServiceError> {
    match config.provider {
        CompletionProvider::Mock => Ok((
            Arc::new(MockCompletionService::new()),
            Arc::new(MockClassificationService::new()),
        )),
        CompletionProvider::OpenAI => {
            let key = config
                .api_key
                .clone()
                .unwrap_or_else(|| Secret::new(String::new()));
            let openai = OpenAIConfig::from_secret(key)
                .with_model(config.model.as_str())
                .with_base_url(config.base_url.as_str())
                .with_timeout(config.timeout());
            let completion: Arc<dyn CompletionService> =
                Arc::new(OpenAICompletionService::new(openai)?);
            let classifier = Arc::new(LlmClassificationService::new(completion.clone()));
            Ok((completion, classifier))
        }
    }
}

fn build_store(config: &StorageConfig) -> Arc<dyn SessionStore> {
    match config.backend {
        StorageBackend::Memory => Arc::new(InMemorySessionStore::new()),
        StorageBackend::File => {
            info!(dir = %config.data_dir.display(), "using file session store");
            Arc::new(FileSessionStore::new(&config.data_dir))
        }
    }
}

/// Splits `user-id| text` into its parts.
fn parse_line(line: &str) -> (&str, &str) {
    match line.split_once('|') {
        Some((user, text)) if !user.trim().is_empty() => (user.trim(), text.trim()),
        _ => (CONSOLE_USER, line.trim()),
    }
}

async fn run_console(orchestrator: &IntakeOrchestrator) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let (user, text) = parse_line(&line);
        let user_id = match UserId::new(user) {
            Ok(id) => id,
            Err(_) => continue,
        };

        let result = match orchestrator.handle_admin_command(&user_id, text).await {
            Ok(Some(reply)) => Ok(Some(reply)),
            Ok(None) => {
                orchestrator
                    .handle_inbound_message(&user_id, text, user)
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(Some(reply)) => println!("{}", reply),
            Ok(None) => {}
            Err(e) => {
                error!(user_id = %user_id, error = %e, "turn failed");
                println!("{}", APOLOGY);
            }
        }
    }
    Ok(())
}
