//! Control channel: one 32-bit code per connection.
//!
//! `ACCEPT` answers with the data port, `PING` with zero. `FINISH` stops the
//! server without answering; `FINISH_AWAIT` echoes its code once every data
//! connection has drained.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use xpn_net::{Acceptor, Comm, NetError};
use xpn_proto::ControlCode;
use xpn_types::ClientTag;

use crate::server::ShutdownSignal;

const CONTROL_TAG: ClientTag = ClientTag(0);

pub struct ControlContext {
    data_port: u16,
    shutdown: Arc<ShutdownSignal>,
    drained: watch::Receiver<bool>,
}

impl ControlContext {
    pub fn new(
        data_port: u16,
        shutdown: Arc<ShutdownSignal>,
        drained: watch::Receiver<bool>,
    ) -> Self {
        Self {
            data_port,
            shutdown,
            drained,
        }
    }
}

/// Answer control connections until the server stops.
///
/// Every exchange runs in its own task, so a client that never sends its
/// code only holds its own connection. Pending exchanges are awaited before
/// returning; a `FINISH_AWAIT` reply therefore goes out before this ends.
pub async fn serve_control<A: Acceptor>(acceptor: A, ctx: ControlContext) -> Result<(), NetError> {
    let addr = acceptor.local_addr();
    tracing::info!(%addr, "control channel listening");

    let ctx = Arc::new(ctx);
    let mut tasks = JoinSet::new();
    loop {
        let accepted = tokio::select! {
            biased;
            _ = ctx.shutdown.wait() => break,
            Some(res) = tasks.join_next(), if !tasks.is_empty() => {
                log_join(res);
                continue;
            }
            accepted = acceptor.accept() => accepted,
        };
        let comm = match accepted {
            Ok(comm) => comm,
            Err(NetError::ShuttingDown) => break,
            Err(e) => {
                tracing::error!(%addr, error = %e, "control accept failed");
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
        };

        let ctx = Arc::clone(&ctx);
        tasks.spawn(async move {
            if let Err(e) = handle_control(&comm, &ctx).await {
                tracing::debug!(peer = %comm.peer(), error = %e, "control exchange failed");
            }
            comm.close().await;
        });
    }

    while let Some(res) = tasks.join_next().await {
        log_join(res);
    }
    tracing::info!(%addr, "control channel stopped");
    Ok(())
}

fn log_join(res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        tracing::error!(error = %e, "control task failed");
    }
}

async fn handle_control<C: Comm>(comm: &C, ctx: &ControlContext) -> Result<(), NetError> {
    let rank = comm.rank();
    let mut raw = [0u8; 4];
    tokio::select! {
        biased;
        _ = ctx.shutdown.wait() => return Ok(()),
        res = comm.read_data(&mut raw, rank, CONTROL_TAG) => res?,
    }
    let code = i32::from_le_bytes(raw);

    let Some(code) = ControlCode::from_raw(code) else {
        tracing::warn!(peer = %comm.peer(), code, "unknown control code");
        return Ok(());
    };
    tracing::info!(peer = %comm.peer(), %code, "control request");

    match code {
        ControlCode::Accept => {
            let port = i32::from(ctx.data_port);
            comm.write_data(&port.to_le_bytes(), rank, CONTROL_TAG).await?;
        }
        ControlCode::Ping => {
            comm.write_data(&ControlCode::ACK.to_le_bytes(), rank, CONTROL_TAG)
                .await?;
        }
        ControlCode::Finish => ctx.shutdown.trigger(),
        ControlCode::FinishAwait => {
            ctx.shutdown.trigger();
            let mut drained = ctx.drained.clone();
            if drained.wait_for(|done| *done).await.is_err() {
                tracing::warn!("server gone before drain completed");
            }
            comm.write_data(&code.to_le_bytes(), rank, CONTROL_TAG).await?;
        }
    }
    Ok(())
}
