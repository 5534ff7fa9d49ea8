use std::sync::Arc;
use std::time::Duration;

pub mod plugins;
pub mod services;

use services::backend::HttpBackend;
use services::config::{ClientConfig, load_client_config};
use services::events::{ChannelSink, EventSink, LogSink};
use services::model_status::ModelStatusPoller;
use services::session::SessionController;
use services::terminal;

/// How long exit waits for queued events to be printed.
const RENDER_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

async fn drive<S: EventSink>(config: &ClientConfig, sink: Arc<S>) {
    let backend = Arc::new(HttpBackend::new(config));
    let session = SessionController::new(backend.clone(), sink.clone());
    let poller = ModelStatusPoller::new(backend, sink.clone(), config);

    session.start_new_session().await;
    // The first baseline tick polls immediately.
    poller.start();

    terminal::input_loop(session, poller.clone(), sink).await;

    poller.stop();
}

async fn run_client() {
    let config = load_client_config();
    log::info!("InfoSage backend: {}", config.base_url);

    if config.headless {
        drive(&config, Arc::new(LogSink)).await;
        return;
    }

    let (sink, events) = ChannelSink::new();
    let renderer = tokio::spawn(terminal::render_loop(events));
    println!("{}", terminal::HELP);

    drive(&config, Arc::new(sink)).await;

    // The renderer ends once every sender is dropped. A chat still waiting
    // for its reply holds one, so the wait is bounded.
    if tokio::time::timeout(RENDER_FLUSH_TIMEOUT, renderer)
        .await
        .is_err()
    {
        log::debug!("Exiting with events still pending");
    }
}

pub fn run() {
    init_logging();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("Failed to start async runtime: {}", err);
            return;
        }
    };
    runtime.block_on(run_client());
}
