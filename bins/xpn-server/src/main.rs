use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use xpn_fs::{DiskFilesystem, Filesystem, MemFilesystem};
use xpn_net_tcp::TcpAcceptor;
use xpn_server::{Dispatcher, FsMode, ServerConfig, ShutdownSignal, ThreadMode, XpnServer};

/// XPN file server
#[derive(Parser, Debug)]
#[command(name = "xpn_server", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data port (overrides `comm_port`)
    #[arg(short, long)]
    port: Option<u16>,

    /// Control channel port
    #[arg(long)]
    control_port: Option<u16>,

    #[arg(short, long, value_enum)]
    thread_mode: Option<ThreadMode>,

    /// Directory served by the disk backend
    #[arg(long)]
    root_dir: Option<PathBuf>,

    #[arg(long, value_enum)]
    fs_mode: Option<FsMode>,

    /// Dump default configuration and exit
    #[arg(long)]
    dump_default_config: bool,
}

impl Args {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(port) = self.port {
            config.comm_port = port;
        }
        if let Some(port) = self.control_port {
            config.control_port = port;
        }
        if let Some(mode) = self.thread_mode {
            config.thread_mode = mode;
        }
        if let Some(dir) = &self.root_dir {
            config.root_dir = dir.clone();
        }
        if let Some(mode) = self.fs_mode {
            config.fs_mode = mode;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.dump_default_config {
        print!("{}", ServerConfig::default().to_toml_string()?);
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;
    check_standalone(&config)?;

    let _log_guard = xpn_logging::init_logging(&config.log)?;
    tracing::info!(
        config = ?args.config,
        root = %config.root_dir.display(),
        fs_mode = ?config.fs_mode,
        "starting xpn server"
    );

    let fs: Arc<dyn Filesystem> = match config.fs_mode {
        FsMode::Disk => {
            std::fs::create_dir_all(&config.root_dir)
                .with_context(|| format!("creating {}", config.root_dir.display()))?;
            Arc::new(DiskFilesystem::new(&config.root_dir))
        }
        FsMode::Memory => Arc::new(MemFilesystem::new()),
    };

    let dispatcher = Dispatcher::new(fs).with_max_buffer_size(config.max_buffer_size);

    let server = XpnServer::new(dispatcher, config.thread_mode, config.workers);
    let data = TcpAcceptor::bind(config.comm_addr())
        .await
        .with_context(|| format!("binding data port {}", config.comm_addr()))?;
    let control = TcpAcceptor::bind(config.control_addr())
        .await
        .with_context(|| format!("binding control port {}", config.control_addr()))?;
    let data_port = data.local_socket_addr().port();
    tracing::info!(
        data = %data.local_socket_addr(),
        control = %control.local_socket_addr(),
        "xpn server initialization complete"
    );

    tokio::spawn(stop_on_signal(server.shutdown_signal()));
    server.run(data, control, data_port).await?;

    tracing::info!("xpn server stopped");
    Ok(())
}

/// This binary has no pub/sub broker client, so a subscription could never
/// receive a publication. Embedders with a broker wire `MqBridge` themselves.
fn check_standalone(config: &ServerConfig) -> anyhow::Result<()> {
    if config.mq.enabled {
        bail!("mq.enabled requires a pub/sub broker client, which xpn_server does not include");
    }
    Ok(())
}

async fn stop_on_signal(shutdown: Arc<ShutdownSignal>) {
    let ctrl_c = tokio::signal::ctrl_c();
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c => tracing::info!("received CTRL+C"),
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = shutdown.wait() => return,
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "cannot register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => tracing::info!("received CTRL+C"),
                _ = shutdown.wait() => return,
            }
        }
    }
    shutdown.trigger();
}
