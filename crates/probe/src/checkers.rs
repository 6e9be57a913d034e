//! Probe checker implementations.

use crate::types::{ProbeKind, ProbeResult};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Errors raised while building a checker
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Probe checker trait. One implementation per [`ProbeKind`].
#[async_trait]
pub trait ProbeChecker: Send + Sync {
    /// Probe `target`, never taking longer than `timeout`
    async fn check(&self, target: &str, timeout: Duration) -> ProbeResult;

    /// Kind of probe this checker performs
    fn kind(&self) -> ProbeKind;
}

/// ICMP echo checker backed by the system `ping` binary
pub struct PingChecker {
    program: String,
    count: u32,
    interval: Duration,
}

impl PingChecker {
    /// Create a checker sending 4 echo requests 300ms apart
    pub fn new() -> Self {
        Self {
            program: "ping".to_string(),
            count: 4,
            interval: Duration::from_millis(300),
        }
    }

    /// Use a different `ping` executable
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn command(&self, target: &str, timeout: Duration) -> Command {
        let deadline = timeout.as_secs().max(1);
        let mut cmd = Command::new(&self.program);
        cmd.arg("-n")
            .arg("-c")
            .arg(self.count.to_string())
            .arg("-i")
            .arg(format!("{:.1}", self.interval.as_secs_f64()))
            .arg("-w")
            .arg(deadline.to_string())
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl Default for PingChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the average RTT from a `min/avg/max` summary line
fn parse_avg_rtt(output: &str) -> Option<Duration> {
    let line = output.lines().find(|l| l.contains("min/avg/max"))?;
    let values = line.split('=').nth(1)?.trim();
    let avg_ms: f64 = values.split('/').nth(1)?.trim().parse().ok()?;
    Some(Duration::from_secs_f64(avg_ms / 1000.0))
}

/// The `N packets transmitted, M received` summary line, if present
fn packet_summary(output: &str) -> Option<&str> {
    output
        .lines()
        .find(|l| l.contains("packets transmitted"))
        .map(str::trim)
}

#[async_trait]
impl ProbeChecker for PingChecker {
    async fn check(&self, target: &str, timeout_duration: Duration) -> ProbeResult {
        let start = Instant::now();

        if target.is_empty() || target.starts_with('-') {
            return ProbeResult::error(
                ProbeKind::Ping,
                target,
                start.elapsed(),
                format!("invalid ping target: {:?}", target),
            );
        }

        let child = match self.command(target, timeout_duration).spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(target = %target, error = %e, "Failed to spawn ping");
                return ProbeResult::error(
                    ProbeKind::Ping,
                    target,
                    start.elapsed(),
                    format!("failed to run {}: {}", self.program, e),
                );
            }
        };

        // `-w` bounds ping itself; the outer timeout guards against a hung child
        let guard = timeout_duration + Duration::from_secs(1);
        match timeout(guard, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let elapsed = start.elapsed();
                let stdout = String::from_utf8_lossy(&output.stdout);
                if output.status.success() {
                    let latency = parse_avg_rtt(&stdout).unwrap_or(elapsed);
                    debug!(target = %target, latency_ms = latency.as_millis(), "Ping successful");
                    ProbeResult::healthy(ProbeKind::Ping, target, latency)
                } else if output.status.code() == Some(1) {
                    let summary = packet_summary(&stdout).unwrap_or("no reply received");
                    warn!(target = %target, summary = %summary, "Ping got no reply");
                    ProbeResult::unhealthy(
                        ProbeKind::Ping,
                        target,
                        elapsed,
                        format!("ICMP echo timed out ({})", summary),
                    )
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    warn!(target = %target, error = %stderr.trim(), "Ping failed");
                    ProbeResult::error(
                        ProbeKind::Ping,
                        target,
                        elapsed,
                        format!("ping failed: {}", stderr.trim()),
                    )
                }
            }
            Ok(Err(e)) => {
                let elapsed = start.elapsed();
                warn!(target = %target, error = %e, "Ping failed");
                ProbeResult::error(ProbeKind::Ping, target, elapsed, format!("ping failed: {}", e))
            }
            Err(_) => {
                warn!(target = %target, "Ping timed out");
                ProbeResult::timeout(ProbeKind::Ping, target, start.elapsed())
            }
        }
    }

    fn kind(&self) -> ProbeKind {
        ProbeKind::Ping
    }
}

/// Split `host:port`, accepting bracketed IPv6 hosts
pub fn split_host_port(target: &str) -> Option<(&str, u16)> {
    let (host, port) = target.rsplit_once(':')?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() || host.contains(':') && !target.starts_with('[') {
        return None;
    }
    let port = port.parse::<u16>().ok().filter(|p| *p != 0)?;
    Some((host, port))
}

/// TCP connect checker
#[derive(Debug, Default)]
pub struct TcpChecker;

impl TcpChecker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProbeChecker for TcpChecker {
    async fn check(&self, target: &str, timeout_duration: Duration) -> ProbeResult {
        let start = Instant::now();

        let Some((host, port)) = split_host_port(target) else {
            return ProbeResult::error(
                ProbeKind::Tcp,
                target,
                start.elapsed(),
                format!("invalid target (expected host:port): {}", target),
            );
        };

        match timeout(timeout_duration, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => {
                let duration = start.elapsed();
                debug!(target = %target, duration_ms = duration.as_millis(), "TCP check successful");
                ProbeResult::healthy(ProbeKind::Tcp, target, duration)
            }
            Ok(Err(e)) => {
                let duration = start.elapsed();
                warn!(target = %target, error = %e, "TCP check failed");
                ProbeResult::unhealthy(
                    ProbeKind::Tcp,
                    target,
                    duration,
                    format!("connection failed: {}", e),
                )
            }
            Err(_) => {
                warn!(target = %target, "TCP check timed out");
                ProbeResult::timeout(ProbeKind::Tcp, target, start.elapsed())
            }
        }
    }

    fn kind(&self) -> ProbeKind {
        ProbeKind::Tcp
    }
}

/// HTTP GET checker. 2xx and 3xx count as success; redirects are not followed.
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    /// Create a new HTTP checker
    ///
    /// Certificate verification is disabled so that internal services with
    /// self-signed certificates can be probed.
    pub fn new() -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ProbeChecker for HttpChecker {
    async fn check(&self, url: &str, timeout_duration: Duration) -> ProbeResult {
        let start = Instant::now();

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return ProbeResult::error(
                ProbeKind::Http,
                url,
                start.elapsed(),
                format!("invalid URL (must start with http:// or https://): {}", url),
            );
        }

        let request = self.client.get(url).timeout(timeout_duration);

        match timeout(timeout_duration, request.send()).await {
            Ok(Ok(response)) => {
                let duration = start.elapsed();
                let status_code = response.status().as_u16();

                if (200..400).contains(&status_code) {
                    debug!(url = %url, status = status_code, duration_ms = duration.as_millis(),
                           "HTTP check successful");
                    ProbeResult::healthy(ProbeKind::Http, url, duration)
                        .with_response_code(status_code)
                } else {
                    warn!(url = %url, status = status_code, "HTTP check failed: unexpected status code");
                    ProbeResult::unhealthy(
                        ProbeKind::Http,
                        url,
                        duration,
                        format!("unexpected status code: {}", status_code),
                    )
                    .with_response_code(status_code)
                }
            }
            Ok(Err(e)) if e.is_timeout() => {
                warn!(url = %url, "HTTP check timed out");
                ProbeResult::timeout(ProbeKind::Http, url, start.elapsed())
            }
            Ok(Err(e)) => {
                let duration = start.elapsed();
                warn!(url = %url, error = %e, "HTTP check failed");
                ProbeResult::error(ProbeKind::Http, url, duration, format!("HTTP request failed: {}", e))
            }
            Err(_) => {
                warn!(url = %url, "HTTP check timed out");
                ProbeResult::timeout(ProbeKind::Http, url, start.elapsed())
            }
        }
    }

    fn kind(&self) -> ProbeKind {
        ProbeKind::Http
    }
}
