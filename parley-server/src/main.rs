use std::sync::Arc;

use anyhow::Context;
use parley_core::{ConversationStore, MemoryConversationStore, OpenAiChatModel, ReactGraph};
use parley_server::{ParleyRouter, Settings, StoreKind};
use parley_sqlite::SqliteConversationStore;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env().context("invalid settings")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(settings.tracing_filter())
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let store: Arc<dyn ConversationStore> = match settings.store {
        StoreKind::Memory => Arc::new(MemoryConversationStore::new()),
        StoreKind::Sqlite => Arc::new(
            SqliteConversationStore::open(&settings.sqlite_path)
                .with_context(|| format!("opening {}", settings.sqlite_path.display()))?,
        ),
    };
    tracing::info!(store = ?settings.store, "conversation store ready");

    let mut model = OpenAiChatModel::new(&settings.model_base_url, &settings.model_name);
    if let Some(key) = &settings.model_api_key {
        model = model.with_api_key(key);
    }

    let mut graph = ReactGraph::builder().model(model).store(store.clone());
    if let Some(prompt) = &settings.system_prompt {
        graph = graph.system_prompt(prompt);
    }
    let graph = graph.build()?;

    let app = ParleyRouter::new(Arc::new(graph), store)
        .formatter_options(settings.formatter_options())
        .service_name(&settings.service_name)
        .build();

    let addr = settings.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, model = %settings.model_name, "listening");

    axum::serve(listener, app).await?;

    Ok(())
}
