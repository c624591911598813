// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! PostgreSQL wire protocol front end.

mod processor;

use std::sync::Arc;

use pgwire::api::auth::noop::NoopStartupHandler;
use pgwire::api::query::PlaceholderExtendedQueryHandler;
use pgwire::api::{MakeHandler, StatelessMakeHandler};
use pgwire::tokio::process_socket;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub use self::processor::Processor;
use crate::Database;

/// Accept connections until the listener fails to bind.
pub async fn run_server(host: &str, port: u16, db: Database) -> std::io::Result<()> {
    let processor = Arc::new(Processor::new(db));
    let authenticator = Arc::new(NoopStartupHandler);
    let placeholder = Arc::new(StatelessMakeHandler::new(Arc::new(
        PlaceholderExtendedQueryHandler,
    )));
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "listening");
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(incoming) => incoming,
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
                continue;
            }
        };
        info!(%peer, "connection accepted");
        let authenticator = authenticator.clone();
        let processor = processor.clone();
        let placeholder = placeholder.make();
        tokio::spawn(async move {
            if let Err(e) =
                process_socket(socket, None, authenticator, processor, placeholder).await
            {
                warn!(%peer, error = %e, "connection closed with error");
            }
        });
    }
}
