use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::net::lookup_host;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;
use xpn_net::Comm;
use xpn_proto::ControlCode;
use xpn_types::ClientTag;

const DEFAULT_CONTROL_PORT: u16 = 3456;

/// Stop (or ping) running XPN servers through their control port
#[derive(Parser, Debug)]
#[command(name = "xpn_stop_server", version, about)]
struct Args {
    /// Comma separated `host[:port]` list
    #[arg(long, value_delimiter = ',')]
    hosts: Vec<String>,

    /// File with one `host[:port]` per line
    #[arg(short = 'f', long)]
    shutdown_file: Option<PathBuf>,

    /// Control port used when a target omits one
    #[arg(short, long, default_value_t = DEFAULT_CONTROL_PORT)]
    port: u16,

    /// Wait until each server has drained its connections
    #[arg(short = 'w', long = "await")]
    wait: bool,

    /// Only check that the servers answer
    #[arg(long, conflicts_with = "wait")]
    ping: bool,

    /// Per-target timeout in seconds (0 waits forever)
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

impl Args {
    fn code(&self) -> ControlCode {
        if self.ping {
            ControlCode::Ping
        } else if self.wait {
            ControlCode::FinishAwait
        } else {
            ControlCode::Finish
        }
    }

    fn targets(&self) -> anyhow::Result<Vec<String>> {
        let mut raw: Vec<String> = self.hosts.clone();
        if let Some(path) = &self.shutdown_file {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            raw.extend(content.lines().map(str::to_string));
        }
        let targets: Vec<String> = raw
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty() && !t.starts_with('#'))
            .map(|t| with_port(t, self.port))
            .collect();
        if targets.is_empty() {
            bail!("no servers given; use --hosts or --shutdown-file");
        }
        Ok(targets)
    }
}

fn with_port(target: &str, port: u16) -> String {
    let has_port = match target.rsplit_once(':') {
        Some((host, p)) => !host.is_empty() && !host.ends_with(':') && p.parse::<u16>().is_ok(),
        None => false,
    };
    if has_port {
        target.to_string()
    } else {
        format!("{}:{}", target, port)
    }
}

async fn send(target: String, code: ControlCode) -> anyhow::Result<Option<i32>> {
    let addr = lookup_host(target.as_str())
        .await
        .with_context(|| format!("resolving {target}"))?
        .next()
        .with_context(|| format!("no address for {target}"))?;
    let comm = xpn_net_tcp::connect(addr)
        .await
        .with_context(|| format!("connecting to {target}"))?;
    let rank = comm.rank();
    let tag = ClientTag(0);
    comm.write_data(&code.to_le_bytes(), rank, tag).await?;

    let answer = match code {
        ControlCode::Finish => None,
        _ => {
            let mut raw = [0u8; 4];
            comm.read_data(&mut raw, rank, tag)
                .await
                .with_context(|| format!("waiting for {target}"))?;
            Some(i32::from_le_bytes(raw))
        }
    };
    comm.close().await;
    Ok(answer)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let code = args.code();
    let targets = args.targets()?;
    let timeout = (args.timeout > 0).then(|| Duration::from_secs(args.timeout));

    let mut tasks = JoinSet::new();
    for target in targets {
        tasks.spawn(async move {
            let res = match timeout {
                Some(limit) => tokio::time::timeout(limit, send(target.clone(), code))
                    .await
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("timed out"))),
                None => send(target.clone(), code).await,
            };
            (target, res)
        });
    }

    let mut failed = 0usize;
    while let Some(joined) = tasks.join_next().await {
        let (target, res) = joined?;
        let expected = match code {
            ControlCode::Ping => Some(ControlCode::ACK),
            ControlCode::FinishAwait => Some(code as i32),
            _ => None,
        };
        match res {
            Ok(answer) if answer == expected => tracing::info!(%target, %code, "done"),
            Ok(answer) => {
                failed += 1;
                tracing::error!(%target, %code, ?answer, "unexpected answer");
            }
            Err(e) => {
                failed += 1;
                tracing::error!(%target, %code, error = %format!("{e:#}"), "failed");
            }
        }
    }

    if failed > 0 {
        bail!("{failed} server(s) did not respond");
    }
    Ok(())
}
