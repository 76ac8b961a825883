mod backend;
mod http;
mod mpv;
mod session;
mod socket;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use kaiga_proto::config::Config;
use kaiga_proto::wordpress::WordPressClient;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Forwards WARN and ERROR events to connected socket clients.
struct LogLayer {
    sender: broadcast::Sender<String>,
}

impl LogLayer {
    fn new(sender: broadcast::Sender<String>) -> Self {
        Self { sender }
    }
}

impl<S> tracing_subscriber::Layer<S> for LogLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let level = event.metadata().level();
        if !matches!(*level, tracing::Level::WARN | tracing::Level::ERROR) {
            return;
        }

        let mut message = format!("{} [{}] ", chrono::Local::now().format("%H:%M:%S"), level);
        event.record(&mut MessageVisitor(&mut message));

        // No subscribers is fine.
        let _ = self.sender.send(message);
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (log_tx, _) = broadcast::channel::<String>(100);

    let data_dir = kaiga_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(LogLayer::new(log_tx.clone()))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,kaiga_daemon=debug")),
        )
        .init();

    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    let catalog = Arc::new(config.stations.load_catalog());
    info!("{} stations available", catalog.len());

    let content = WordPressClient::new(config.api.base_url.clone(), config.api.timeout())?;
    info!("Content API: {}", content.base_url());

    if kaiga_proto::platform::find_mpv_binary().is_none() {
        warn!("mpv not found; playback requests will fail until it is installed");
    }
    let backend = mpv::MpvBackend::new(config.audio.connect_timeout(), config.audio.volume);

    let (core, session) = session::SessionCore::new(backend);
    let core_task = tokio::spawn(core.run());

    let _socket_handle = socket::start_server(
        config.socket.bind_address.clone(),
        config.socket.port,
        session.clone(),
        Arc::clone(&catalog),
        log_tx.clone(),
    );

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            http::HttpState {
                session: session.clone(),
                catalog: Arc::clone(&catalog),
                content,
                per_page: config.api.per_page,
            },
        );
    }

    info!("Daemon initialised");
    tokio::signal::ctrl_c().await?;

    info!("Interrupt received, releasing playback");
    session.shutdown().await;
    core_task.await?;

    Ok(())
}
