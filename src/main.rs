use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};

use host_dashboard::config::{self, Settings};
use host_dashboard::connection::{ConnectionHandle, ConnectionManager};
use host_dashboard::intent::{self, Intent};
use host_dashboard::rest::RestClient;
use host_dashboard::scheduler::TokioScheduler;
use host_dashboard::state::{StateChange, StateStore};
use host_dashboard::transport::WsTransport;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting host dashboard");

    let settings_path = config::default_path().context("Failed to locate settings")?;
    let mut settings = Settings::load_or_init(&settings_path).context("Failed to load settings")?;
    settings.apply_env().context("Invalid environment override")?;

    let store = StateStore::new();
    tokio::spawn(report_changes(store.clone(), settings.max_retries));

    let (manager, events) = ConnectionManager::new(
        settings.manager_config(),
        store.clone(),
        Arc::new(WsTransport),
        Arc::new(TokioScheduler),
    );
    let connection = manager.handle();
    let manager_task = manager.spawn(events);

    // Ctrl+C (SIGINT) and SIGTERM
    let (quit_tx, mut quit_rx) = mpsc::unbounded_channel::<()>();
    ctrlc::set_handler(move || {
        log::info!("Received interrupt signal, shutting down...");
        let _ = quit_tx.send(());
    })
    .context("Failed to set Ctrl+C handler")?;

    // The socket does not wait on REST; login and the first level read run alongside it.
    connection.connect(settings.socket_url());
    let rest = RestClient::new(settings.rest_base_url()).context("Failed to build HTTP client")?;
    let credentials = settings
        .credentials()
        .map(|(username, password)| (username.to_string(), password.to_string()));
    tokio::spawn(rest.bootstrap(credentials, store.clone()));
    log::info!("Commands: {}", intent::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            _ = quit_rx.recv() => break,
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if !handle_line(&line, &connection, &store) {
                        break;
                    }
                }
                Ok(None) => {
                    log::debug!("stdin closed, waiting for Ctrl+C");
                    stdin_open = false;
                }
                Err(e) => {
                    log::warn!("Error reading stdin: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    connection.shutdown();
    manager_task.await.context("Connection manager task failed")?;
    log::info!("Bye");
    Ok(())
}

/// Returns `false` when the user asked to quit.
fn handle_line(line: &str, connection: &ConnectionHandle, store: &StateStore) -> bool {
    match intent::parse(line) {
        Some(Intent::Send(outbound)) => connection.send(outbound),
        Some(Intent::AddTodo(text)) => {
            let id = store.add_todo(text);
            log::info!("Added todo #{}", id);
        }
        Some(Intent::ToggleTodo(id)) => {
            if !store.toggle_todo(id) {
                log::warn!("No todo #{}", id);
            }
        }
        Some(Intent::Quit) => return false,
        None if line.trim().is_empty() => {}
        None => log::warn!("Unknown command '{}'. Try: {}", line.trim(), intent::HELP),
    }
    true
}

/// Log the parts of the store that change. Stands in for a rendered UI.
async fn report_changes(store: StateStore, max_retries: u32) {
    let mut changes = store.subscribe();
    loop {
        let change = match changes.recv().await {
            Ok(change) => change,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::debug!("Skipped {} state changes", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };

        let state = store.snapshot();
        match change {
            StateChange::Connection => {
                let conn = &state.connection;
                let retry = conn.retry_count;
                match &conn.last_error {
                    Some(error) => log::info!(
                        "[status] {:?} (retry {}, last error: {})",
                        conn.status,
                        retry,
                        error
                    ),
                    None => log::info!("[status] {:?} (retry {})", conn.status, retry),
                }
                if conn.target_url.is_some() && conn.is_idle(max_retries) {
                    log::warn!("[status] gave up after {} attempts", retry);
                }
            }
            StateChange::Live => {
                let live = &state.live;
                if let Some(media) = &live.media_info {
                    log::info!(
                        "[media] {} - {} ({:?}, {}s / {}s)",
                        media.artist,
                        media.title,
                        media.state,
                        media.position.as_secs(),
                        media.length.as_secs()
                    );
                }
                if let Some(Some(Ok(bytes))) = live.art_work.as_ref().map(|a| a.decode_base64()) {
                    log::debug!("[media] artwork {} bytes", bytes.len());
                }
                log::info!(
                    "[system] volume {}{} brightness {} bluetooth {} wifi {}",
                    live.volume_level,
                    if live.is_muted { " (muted)" } else { "" },
                    live.brightness_level,
                    live.bluetooth_devices.len(),
                    live.wifi_info
                        .as_ref()
                        .and_then(|w| w.ssid.as_deref())
                        .unwrap_or("-")
                );
                if let Some(output) = &live.command_output {
                    log::info!("[output] {}", output.trim_end());
                }
            }
            StateChange::Toasts => {
                if let Some(toast) = state.toasts.last() {
                    log::info!("[toast] {:?}: {}", toast.kind, toast.text);
                }
            }
            StateChange::Todos => {
                for todo in &state.todos {
                    let mark = if todo.done { "x" } else { " " };
                    log::info!("[todo] #{} [{}] {}", todo.id, mark, todo.text);
                }
            }
            StateChange::Session => match &state.session {
                Some(session) => log::info!("[session] {}", session.username),
                None => log::info!("[session] signed out"),
            },
        }
    }
}
