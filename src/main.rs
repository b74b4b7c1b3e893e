use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use registrar::auth::Credentials;
use registrar::config::Config;
use registrar::tenant::TenantManager;
use registrar::{observability, tls, wire};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    observability::init(config.metrics_port)?;
    let tls_acceptor = tls::load_tls_acceptor(&config)?;
    std::fs::create_dir_all(&config.data_dir)?;

    let tenants = Arc::new(TenantManager::new(
        config.data_dir.clone(),
        config.compact_threshold,
        config.policy,
    ));
    let credentials = Credentials {
        admin_password: config.admin_password.clone(),
        teacher_password: config.teacher_password.clone(),
    };
    let slots = Arc::new(Semaphore::new(config.max_connections));

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!(
        data_dir = %config.data_dir.display(),
        max_connections = config.max_connections,
        tls = tls_acceptor.is_some(),
        day_check = ?config.policy.day_check,
        classroom_conflicts = config.policy.classroom_conflicts,
        "registrar listening on {addr}"
    );

    let shutdown = shutdown_signal()?;
    tokio::pin!(shutdown);

    loop {
        let (socket, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!("accept error: {e}");
                    continue;
                }
            },
            _ = &mut shutdown => {
                info!("shutdown requested, no longer accepting");
                break;
            }
        };

        let Ok(permit) = Arc::clone(&slots).try_acquire_owned() else {
            tracing::warn!("connection limit reached, refusing {peer}");
            metrics::counter!(observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
            continue;
        };

        info!("connection from {peer}");
        metrics::counter!(observability::CONNECTIONS_TOTAL).increment(1);
        metrics::gauge!(observability::CONNECTIONS_ACTIVE).increment(1.0);
        let tenants = Arc::clone(&tenants);
        let credentials = credentials.clone();
        let tls = tls_acceptor.clone();
        tokio::spawn(async move {
            if let Err(e) = wire::process_connection(socket, tenants, credentials, tls).await {
                tracing::error!("connection error from {peer}: {e}");
            }
            metrics::gauge!(observability::CONNECTIONS_ACTIVE).decrement(1.0);
            drop(permit);
        });
    }

    drain(&slots, config.max_connections).await;
    info!("registrar stopped");
    Ok(())
}

/// Resolves on ctrl-c, or SIGTERM on unix.
fn shutdown_signal() -> io::Result<impl std::future::Future<Output = ()>> {
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    Ok(async move {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
    })
}

/// Wait until every connection has returned its permit, or give up after `DRAIN_TIMEOUT`.
async fn drain(slots: &Semaphore, max_connections: usize) {
    let all_permits = u32::try_from(max_connections).unwrap_or(u32::MAX);
    match tokio::time::timeout(DRAIN_TIMEOUT, slots.acquire_many(all_permits)).await {
        Ok(_) => info!("all connections drained"),
        Err(_) => {
            let open = max_connections - slots.available_permits();
            tracing::warn!("drain timeout, {open} connections still open");
        }
    }
}
