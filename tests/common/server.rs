//! Test server management.
//!
//! Spawns tinyircd instances (the compiled binary) for integration
//! testing, each with its own port and temp directories.

#![allow(dead_code)]

use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

/// A running tinyircd instance.
pub struct TestServer {
    child: Child,
    port: u16,
    data_dir: TempDir,
    extra_args: Vec<String>,
}

impl TestServer {
    /// Spawn a server bound to 127.0.0.1:`port` with default flags.
    pub async fn spawn(port: u16) -> anyhow::Result<Self> {
        Self::spawn_with_args(port, &[]).await
    }

    /// Spawn a server with additional flags appended.
    pub async fn spawn_with_args(port: u16, extra_args: &[&str]) -> anyhow::Result<Self> {
        let data_dir = tempfile::tempdir()?;
        let extra_args: Vec<String> = extra_args.iter().map(|s| s.to_string()).collect();
        let child = Self::start(port, &extra_args)?;
        let server = Self {
            child,
            port,
            data_dir,
            extra_args,
        };
        server.wait_until_ready().await?;
        Ok(server)
    }

    fn start(port: u16, extra_args: &[String]) -> anyhow::Result<Child> {
        let binary = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("target/debug/tinyircd");
        let child = Command::new(&binary)
            .arg("--hostname")
            .arg("localhost")
            .arg("--bind")
            .arg(format!("127.0.0.1:{}", port))
            .args(extra_args)
            .spawn()?;
        Ok(child)
    }

    /// Kill the running instance and start a fresh one with the same
    /// flags on a new port (used for persistence-across-restart tests; a
    /// fresh port avoids colliding with lingering sockets).
    pub async fn restart_on_port(&mut self, port: u16) -> anyhow::Result<()> {
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.port = port;
        self.child = Self::start(self.port, &self.extra_args)?;
        self.wait_until_ready().await
    }

    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        for _ in 0..50 {
            if tokio::net::TcpStream::connect(("127.0.0.1", self.port))
                .await
                .is_ok()
            {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("server failed to start within 5 seconds")
    }

    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// A scratch directory that lives as long as the server.
    pub fn data_dir(&self) -> &std::path::Path {
        self.data_dir.path()
    }

    /// Connect a new test client to this server.
    pub async fn connect(&self, nick: &str) -> anyhow::Result<super::TestClient> {
        super::TestClient::connect(&self.address(), nick).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
