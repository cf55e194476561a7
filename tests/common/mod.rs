//! Shared utilities for integration tests.
//!
//! Each test gets its own manager on an ephemeral port, with a scratch
//! directory holding the HAProxy config. `sh` scripts stand in for
//! `haproxy -c` and the reload script:
//! - the check rejects any config mentioning `reject.test`
//! - the reload fails for any config mentioning `crash.test`

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;

use haproxy_manager::config::ManagerConfig;
use haproxy_manager::lifecycle::{self, Shutdown};
use haproxy_manager::HttpServer;

pub const INITIAL_CONFIG: &str = "# initial\n";

/// `sh -c <script> sh {config}`: the script sees the config path as `$1`.
pub fn sh(script: &str) -> Vec<String> {
    vec![
        "sh".into(),
        "-c".into(),
        script.into(),
        "sh".into(),
        "{config}".into(),
    ]
}

pub struct TestManager {
    pub addr: SocketAddr,
    pub dir: TempDir,
    pub client: reqwest::Client,
    shutdown: Shutdown,
}

impl TestManager {
    /// Start with a healthy initial config in place.
    pub async fn start(configure: impl FnOnce(&mut ManagerConfig, &Path)) -> Self {
        Self::launch(TempDir::new().unwrap(), true, configure).await
    }

    /// Start with no HAProxy config on disk.
    pub async fn start_empty(configure: impl FnOnce(&mut ManagerConfig, &Path)) -> Self {
        Self::launch(TempDir::new().unwrap(), false, configure).await
    }

    /// Start again on an existing scratch directory, e.g. after `stop`.
    pub async fn restart(dir: TempDir, configure: impl FnOnce(&mut ManagerConfig, &Path)) -> Self {
        Self::launch(dir, false, configure).await
    }

    async fn launch(dir: TempDir, seed: bool, configure: impl FnOnce(&mut ManagerConfig, &Path)) -> Self {
        let config_path = dir.path().join("haproxy.cfg");
        if seed {
            std::fs::write(&config_path, INITIAL_CONFIG).unwrap();
        }

        let mut config = ManagerConfig::default();
        config.haproxy.config_path = config_path;
        config.haproxy.check_command =
            sh("! grep -q 'reject.test' \"$1\" || { echo \"[ALERT] rejected by check\" >&2; exit 1; }");
        config.haproxy.reload_command =
            sh("! grep -q 'crash.test' \"$1\" || { echo \"[ALERT] reload crashed\" >&2; exit 1; }");
        config.haproxy.reload_timeout_secs = 5;
        config.haproxy.health_timeout_secs = 2;
        configure(&mut config, dir.path());

        let dispatcher = lifecycle::build(&config).await.unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shutdown = Shutdown::new();
        let server = HttpServer::new(&config, dispatcher);
        let server_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = server.run(listener, server_shutdown).await;
        });

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        Self {
            addr,
            dir,
            client,
            shutdown,
        }
    }

    /// Stop the server and hand back its scratch directory.
    pub fn stop(self) -> TempDir {
        self.shutdown.trigger();
        self.dir
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("haproxy.cfg")
    }

    /// Contents of the live HAProxy config, if any.
    pub fn live_config(&self) -> Option<String> {
        std::fs::read_to_string(self.config_path()).ok()
    }

    /// JSON-RPC call; asserts the HTTP layer answered 200.
    pub async fn call(&self, method: &str, params: Value) -> Value {
        let response = self
            .client
            .post(self.url("/haproxy"))
            .json(&json!({"id": 1, "method": method, "params": [params]}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        response.json().await.unwrap()
    }

    pub async fn add(&self, name: &str, port: u16, domain: &str) -> Value {
        self.call("Haproxy.Add", json!({"Name": name, "Port": port, "Domain": domain}))
            .await
    }

    pub async fn status(&self) -> Value {
        self.client
            .get(self.url("/status"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }
}
