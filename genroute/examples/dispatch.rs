//! End-to-end dispatch against a job gateway.
//!
//! This demonstrates:
//! 1. Building a dispatcher with layers, the built-in catalog and prompt stages
//! 2. Submitting a request and handing its task ids to the poller
//! 3. Consuming one-time notifications until every task is terminal
//!
//! Configure with `GENROUTE_GATEWAY_URL`, `GENROUTE_API_KEY` and, for prompt
//! translation and enhancement, `DEEPSEEK_API_KEY`. The usual `GENROUTE_*`
//! settings are read as well.

use futures::StreamExt;
use genroute::prelude::*;
use genroute::provider::{default_registry, ids, HttpGateway};
use genroute::GenrouteConfig;
use std::sync::Arc;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = GenrouteConfig::from_env()?;
    let base_url = std::env::var("GENROUTE_GATEWAY_URL")
        .expect("GENROUTE_GATEWAY_URL environment variable not set");
    let api_key =
        std::env::var("GENROUTE_API_KEY").expect("GENROUTE_API_KEY environment variable not set");

    let gateway = HttpGateway::builder()
        .base_url(base_url)
        .api_key(api_key)
        .build()?;
    let board: Arc<dyn JobBoard> = Arc::new(gateway.clone());

    let styles = StaticPromptSource::new("presets")
        .with("neon", "{subject} in a neon-lit city at night, cinematic lighting");

    let mut builder = Dispatcher::builder(gateway)
        .layer(LoggingLayer::new())
        .layer(RetryLayer::new().max_resubmits(2))
        .registry(default_registry()?)
        .stage(Arc::new(StyleStage::new(vec![Arc::new(styles)])))
        .surcharges(config.surcharges.clone())
        .config(config.dispatch.clone());

    if let Ok(key) = std::env::var("DEEPSEEK_API_KEY") {
        let assist = Arc::new(genroute::provider::deepseek(key)?);
        builder = builder
            .stage(Arc::new(TranslateStage::new(assist.clone())))
            .stage(Arc::new(
                EnhanceStage::new(assist.clone()).with_translator(assist),
            ));
    }
    let dispatcher = Arc::new(builder.finish()?);

    let (manager, mut notifications) = TaskManager::builder(board)
        .config(&config.poller)
        .build();
    let submitter = TaskSubmitter::new(dispatcher.clone(), manager.clone());

    // Example 1: style preset through the prompt middleware
    println!("=== Example 1: Text to video with a style preset ===\n");

    let request = GenerationRequest::new()
        .with("prompt", "a fox running")
        .with("duration", 5)
        .with(
            "meta_data",
            serde_json::json!({
                "need_middleware": true,
                "style_id": "neon",
                "subject": "a red fox"
            }),
        );

    let cost = dispatcher
        .estimate_cost(ids::SEEDANCE_TEXT_TO_VIDEO, &request)
        .await?;
    println!("Estimated cost: {} zaps per output", cost);

    match submitter.submit(ids::SEEDANCE_TEXT_TO_VIDEO, request).await {
        Ok(receipt) => println!("Submitted tasks: {:?}\n", receipt.outcome.task_ids),
        Err(rejection) => {
            println!("Rejected ({:?}): {}", rejection.action, rejection.error);
            return Ok(());
        }
    }

    // Example 2: wait for the poller to settle every task
    println!("=== Example 2: Waiting for results ===\n");

    while !manager.in_flight().is_empty() || manager.is_polling() {
        let Some(note) = notifications.next().await else {
            break;
        };
        println!("{:?} -> {}", note.task_id, note.message_key());
        if note.task_id.is_none() {
            break;
        }
    }

    for entry in manager.visible().iter() {
        println!(
            "{} [{:?}] {}",
            entry.id,
            entry.status,
            entry.output.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}
