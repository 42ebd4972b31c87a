use std::sync::Arc;

use anyhow::Context;

use page_responder::channels::{GraphSendClient, GraphUserDirectory, SheetsKeywordSource};
use page_responder::config::ResponderConfig;
use page_responder::pipeline::{EventDispatcher, IntentResolver, KeywordSource, StaticKeywordSource};
use page_responder::webhook::{WebhookState, webhook_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ResponderConfig::from_env().context("Failed to read configuration")?;
    let catalog = Arc::new(config.load_catalog().context("Failed to load reply catalog")?);

    eprintln!("📨 Page Responder v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Webhook: http://0.0.0.0:{}/webhook", config.port);
    eprintln!(
        "   Graph API: {}/{}",
        config.graph_api_base, config.graph_api_version
    );
    eprintln!(
        "   Catalog: {} ({} buttons, {} greeting keywords)",
        config
            .catalog_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "built-in".to_string()),
        catalog.quick_replies.len(),
        catalog.greeting_keywords.len(),
    );

    let missing = catalog.missing_payloads();
    if !missing.is_empty() {
        tracing::warn!(
            payloads = ?missing,
            "Quick reply payloads without a reply; taps will get the fallback message"
        );
    }

    // One pooled HTTP client shared by every adapter
    let http = reqwest::Client::new();

    let keywords: Arc<dyn KeywordSource> = match config.sheets.clone() {
        Some(sheets) => {
            eprintln!(
                "   Keywords: spreadsheet {} ({})",
                sheets.spreadsheet_id, sheets.range
            );
            Arc::new(SheetsKeywordSource::new(http.clone(), sheets))
        }
        None => {
            eprintln!("   Keywords: disabled (SPREADSHEET_ID not set)");
            Arc::new(StaticKeywordSource::empty())
        }
    };

    let directory = Arc::new(GraphUserDirectory::new(
        http.clone(),
        config.graph_api_base.clone(),
        config.page_access_token.clone(),
    ));
    let gateway = Arc::new(GraphSendClient::new(
        http,
        config.graph_api_base.clone(),
        config.graph_api_version.clone(),
        config.page_access_token.clone(),
    ));

    let resolver = IntentResolver::new(Arc::clone(&catalog), keywords, directory);
    let dispatcher = Arc::new(EventDispatcher::new(catalog, resolver, gateway));

    let app = webhook_routes(WebhookState {
        dispatcher,
        verify_token: config.verify_token.clone(),
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Webhook server started");
    axum::serve(listener, app).await?;

    Ok(())
}
