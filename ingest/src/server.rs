use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::dispatch::DispatchQueue;
use crate::router;
use crate::storage::{PostgresStorage, StorageGateway};
use crate::worker::WriterPool;

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let storage: Arc<dyn StorageGateway + Send + Sync> = Arc::new(
        PostgresStorage::connect(&config.database_url, config.max_pg_connections)
            .await
            .expect("failed to connect to Postgres"),
    );

    let queue = DispatchQueue::with_capacity(config.queue_capacity);
    let writers = WriterPool::new(queue.clone(), storage, config.writer_count).spawn();

    let app = router::router(queue.clone(), config.export_prometheus);

    tracing::info!("listening on {:?}", listener.local_addr().unwrap());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .unwrap();

    // The HTTP side is done; tell the writers to stop and let each finish
    // its in-flight record before the connection pool is dropped.
    queue.shutdown();
    join_writers(writers).await;
}

async fn join_writers(writers: Vec<JoinHandle<()>>) {
    for writer in writers {
        if let Err(error) = writer.await {
            tracing::error!(%error, "writer task panicked");
        }
    }
}
