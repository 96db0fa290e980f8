//! Orchestrator - wires the helper supervisor, client and HTTP server.
//!
//! Flow:
//! 1. Spawn the helper via the supervisor
//! 2. Poll helper health until ready (no listener before this succeeds)
//! 3. Bind and serve the gateway routes
//! 4. On shutdown signal: stop the helper, then drain and close the listener

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;

use crate::config::Config;
use crate::helper::{HelperClient, HelperError};
use crate::supervisor::{HelperSpawnConfig, HelperSupervisor, ShutdownSignal};
use crate::transport::http::{bind, routes, serve, wait_for_shutdown_signal};

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Client(HelperError),
    #[error("helper never became ready: {0}")]
    Readiness(#[source] HelperError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

pub struct Orchestrator {
    config: Config,
    client: Arc<HelperClient>,
    supervisor: Arc<HelperSupervisor>,
    listening_tx: watch::Sender<Option<SocketAddr>>,
}

impl Orchestrator {
    pub fn new(config: Config) -> Result<Self, OrchestratorError> {
        let client = HelperClient::new(&config.helper).map_err(OrchestratorError::Client)?;
        let supervisor = HelperSupervisor::new(HelperSpawnConfig::from(&config.helper));
        let (listening_tx, _) = watch::channel(None);

        Ok(Self {
            config,
            client: Arc::new(client),
            supervisor: Arc::new(supervisor),
            listening_tx,
        })
    }

    pub fn supervisor(&self) -> &Arc<HelperSupervisor> {
        &self.supervisor
    }

    /// Address of the open listener, `None` before readiness and after shutdown.
    pub fn listening(&self) -> watch::Receiver<Option<SocketAddr>> {
        self.listening_tx.subscribe()
    }

    /// Run until SIGINT or SIGTERM.
    pub async fn run(&self) -> Result<(), OrchestratorError> {
        self.run_until(wait_for_shutdown_signal()).await
    }

    /// Run until `shutdown` yields the signal that ended the gateway.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), OrchestratorError>
    where
        F: Future<Output = ShutdownSignal> + Send + 'static,
    {
        let helper = &self.config.helper;

        self.supervisor.start();

        if let Err(e) = self
            .client
            .wait_until_healthy(helper.readiness_timeout, helper.readiness_poll_interval)
            .await
        {
            tracing::error!(error = %e, "Helper did not become healthy, aborting startup");
            self.supervisor.stop(ShutdownSignal::Terminate).await;
            return Err(OrchestratorError::Readiness(e));
        }

        let (listener, addr) = match bind(&self.config.listen_host, self.config.listen_port).await
        {
            Ok(bound) => bound,
            Err(source) => {
                self.supervisor.stop(ShutdownSignal::Terminate).await;
                return Err(OrchestratorError::Bind {
                    addr: format!("{}:{}", self.config.listen_host, self.config.listen_port),
                    source,
                });
            }
        };

        tracing::info!(
            %addr,
            helper = %self.client.base_url(),
            "Gateway listening"
        );
        self.listening_tx.send_replace(Some(addr));

        let supervisor = Arc::clone(&self.supervisor);
        let graceful = async move {
            let signal = shutdown.await;
            supervisor.stop(signal.for_helper()).await;
        };

        let result = serve(listener, routes(Arc::clone(&self.client)), graceful).await;
        self.listening_tx.send_replace(None);

        if let Err(source) = result {
            self.supervisor.stop(ShutdownSignal::Terminate).await;
            return Err(OrchestratorError::Serve(source));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use crate::config::{HelperConfig, HelperStdio};

    fn unused_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn config(command: PathBuf, script_path: PathBuf, helper_port: u16, listen_port: u16) -> Config {
        Config {
            listen_host: "127.0.0.1".to_string(),
            listen_port,
            helper: HelperConfig {
                host: "127.0.0.1".to_string(),
                port: helper_port,
                health_path: "/health".to_string(),
                command,
                script_path,
                readiness_timeout: Duration::from_millis(300),
                readiness_poll_interval: Duration::from_millis(20),
                stdio: HelperStdio::Null,
            },
        }
    }

    #[tokio::test]
    async fn never_listens_when_readiness_times_out() {
        let listen_port = unused_port();
        let orchestrator = Orchestrator::new(config(
            PathBuf::from("/nonexistent/numgate-test-interpreter"),
            PathBuf::from("helper.py"),
            unused_port(),
            listen_port,
        ))
        .unwrap();

        let err = orchestrator
            .run_until(std::future::pending::<ShutdownSignal>())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrchestratorError::Readiness(HelperError::ReadinessTimeout(_))
        ));
        assert!(orchestrator.listening().borrow().is_none());
        assert!(
            tokio::net::TcpStream::connect(("127.0.0.1", listen_port))
                .await
                .is_err()
        );
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn sleeping_helper() -> (tempfile::TempDir, PathBuf) {
            let dir = tempfile::tempdir().unwrap();
            let script = dir.path().join("helper.sh");
            std::fs::write(&script, "exec sleep 30\n").unwrap();
            (dir, script)
        }

        #[tokio::test]
        async fn readiness_failure_stops_spawned_helper() {
            let (_dir, script) = sleeping_helper();
            let orchestrator = Orchestrator::new(config(
                PathBuf::from("sh"),
                script,
                unused_port(),
                unused_port(),
            ))
            .unwrap();

            let err = orchestrator
                .run_until(std::future::pending::<ShutdownSignal>())
                .await
                .unwrap_err();

            assert!(matches!(err, OrchestratorError::Readiness(_)));
            assert!(!orchestrator.supervisor().is_running());
        }

        #[tokio::test]
        async fn serves_after_readiness_and_shuts_down_on_signal() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/health"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_json(serde_json::json!({"status": "ok", "uptime_seconds": 0.5})),
                )
                .mount(&server)
                .await;

            let (_dir, script) = sleeping_helper();
            let orchestrator = Arc::new(
                Orchestrator::new(config(
                    PathBuf::from("sh"),
                    script,
                    server.address().port(),
                    0,
                ))
                .unwrap(),
            );
            let mut listening = orchestrator.listening();

            let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
            let running = Arc::clone(&orchestrator);
            let task = tokio::spawn(async move {
                running
                    .run_until(async move {
                        let _ = shutdown_rx.await;
                        ShutdownSignal::Interrupt
                    })
                    .await
            });

            let addr = {
                let bound = listening.wait_for(Option::is_some).await.unwrap();
                let addr: Option<SocketAddr> = *bound;
                addr.unwrap()
            };
            assert!(orchestrator.supervisor().is_running());

            let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::OK);
            let json: serde_json::Value = response.json().await.unwrap();
            assert_eq!(json["status"], "ok");
            assert_eq!(json["helper"]["uptime_seconds"], 0.5);

            shutdown_tx.send(()).unwrap();
            tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .unwrap()
                .unwrap()
                .unwrap();

            assert!(!orchestrator.supervisor().is_running());
            assert!(orchestrator.listening().borrow().is_none());
            assert!(tokio::net::TcpStream::connect(addr).await.is_err());
        }
    }
}
