use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify, Semaphore};
use tokio::task::JoinSet;
use xpn_net::{read_envelope, Acceptor, Comm, NetError};
use xpn_types::Status;

use crate::config::ThreadMode;
use crate::control::{serve_control, ControlContext};
use crate::ops::{Dispatcher, Flow};
use crate::session::ConnectionSession;

/// Latched stop request shared by every loop of a server.
#[derive(Default)]
pub struct ShutdownSignal {
    triggered: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::AcqRel) {
            tracing::info!("shutdown requested");
        }
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Resolve once `trigger` has been called, including before this call.
    pub async fn wait(&self) {
        let notified = self.notify.notified();
        if self.is_triggered() {
            return;
        }
        notified.await;
    }
}

/// The file server: a data accept loop plus the control channel.
///
/// Each connection gets its own dispatch loop and [`ConnectionSession`];
/// requests on one connection are handled strictly in arrival order.
pub struct XpnServer {
    dispatcher: Arc<Dispatcher>,
    shutdown: Arc<ShutdownSignal>,
    thread_mode: ThreadMode,
    workers: usize,
    drained: watch::Sender<bool>,
}

impl XpnServer {
    pub fn new(dispatcher: Dispatcher, thread_mode: ThreadMode, workers: usize) -> Self {
        let (drained, _) = watch::channel(false);
        Self {
            dispatcher: Arc::new(dispatcher),
            shutdown: Arc::new(ShutdownSignal::new()),
            thread_mode,
            workers: workers.max(1),
            drained,
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn shutdown_signal(&self) -> Arc<ShutdownSignal> {
        Arc::clone(&self.shutdown)
    }

    pub fn stop(&self) {
        self.shutdown.trigger();
    }

    /// Serve data connections and the control channel until shutdown.
    ///
    /// `data_port` is what `ACCEPT` on the control channel reports.
    pub async fn run<D, C>(&self, data: D, control: C, data_port: u16) -> xpn_types::Result<()>
    where
        D: Acceptor,
        C: Acceptor,
    {
        let ctx = ControlContext::new(data_port, self.shutdown_signal(), self.drained.subscribe());
        let (data_res, control_res) = tokio::join!(self.serve(data), serve_control(control, ctx));
        data_res?;
        control_res.map_err(Status::from)
    }

    /// Accept data connections until shutdown, then wait for every
    /// connection to finish.
    pub async fn serve<A: Acceptor>(&self, acceptor: A) -> xpn_types::Result<()> {
        let addr = acceptor.local_addr();
        tracing::info!(%addr, mode = ?self.thread_mode, workers = self.workers, "server listening");

        let mut tasks = JoinSet::new();
        let permits = Arc::new(Semaphore::new(self.workers));

        loop {
            let permit = if self.thread_mode == ThreadMode::Pool {
                tokio::select! {
                    biased;
                    _ = self.shutdown.wait() => break,
                    Some(res) = tasks.join_next(), if !tasks.is_empty() => {
                        log_join(res);
                        continue;
                    }
                    permit = Arc::clone(&permits).acquire_owned() => match permit {
                        Ok(p) => Some(p),
                        Err(_) => break,
                    },
                }
            } else {
                None
            };

            tokio::select! {
                biased;

                _ = self.shutdown.wait() => break,

                Some(res) = tasks.join_next(), if !tasks.is_empty() => log_join(res),

                accepted = acceptor.accept() => match accepted {
                    Ok(comm) => {
                        tracing::info!(peer = %comm.peer(), rank = %comm.rank(), "connection accepted");
                        let conn = serve_connection(
                            Arc::clone(&self.dispatcher),
                            comm,
                            Arc::clone(&self.shutdown),
                        );
                        match self.thread_mode {
                            ThreadMode::Sequential => conn.await,
                            ThreadMode::OnDemand => {
                                tasks.spawn(conn);
                            }
                            ThreadMode::Pool => {
                                tasks.spawn(async move {
                                    let _permit = permit;
                                    conn.await
                                });
                            }
                        }
                    }
                    Err(NetError::ShuttingDown) => break,
                    Err(e) => {
                        tracing::error!(%addr, error = %e, "accept failed");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
            }
        }

        tracing::info!(%addr, active = tasks.len(), "accept loop stopped, draining connections");
        while let Some(res) = tasks.join_next().await {
            log_join(res);
        }
        self.drained.send_replace(true);
        tracing::info!(%addr, "server drained");
        Ok(())
    }
}

fn log_join(res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        tracing::error!(error = %e, "connection task failed");
    }
}

/// Dispatch requests from one connection until it disconnects, fails, or the
/// server stops. Handles left open in session mode are closed on the way out.
pub async fn serve_connection<C: Comm>(
    dispatcher: Arc<Dispatcher>,
    comm: C,
    shutdown: Arc<ShutdownSignal>,
) {
    let peer = comm.peer();
    let mut session = ConnectionSession::new();

    let res = loop {
        let env = tokio::select! {
            biased;
            _ = shutdown.wait() => break Ok(Flow::Disconnect),
            env = read_envelope(&comm) => env,
        };
        let env = match env {
            Ok(env) => env,
            Err(NetError::ConnectionClosed) => break Ok(Flow::Disconnect),
            Err(e) => break Err(e),
        };
        match dispatcher.dispatch(&comm, &mut session, env).await {
            Ok(Flow::Continue) => {}
            Ok(flow) => break Ok(flow),
            Err(e) => break Err(e),
        }
    };

    let leaked = session.close_all(dispatcher.fs().as_ref());
    comm.close().await;
    match res {
        Ok(Flow::Finalize) => {
            tracing::info!(%peer, leaked, "finalize received");
            shutdown.trigger();
        }
        Ok(_) => tracing::info!(%peer, leaked, "connection closed"),
        Err(e) => tracing::warn!(%peer, leaked, status = %Status::from(e), "connection aborted"),
    }
}
