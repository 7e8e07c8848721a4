//! Establishment of configured connections and custody of live tunnels.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use log::{error, info, warn};

use crate::connection::ConnectionSpec;
use crate::error::TunnelError;
use crate::report;
use crate::resolver::DependencyResolver;
use crate::session::{CredentialSource, Establish, LiveTunnel, SessionOutcome};

/// How often live tunnels are checked while holding
const KEEPALIVE_POLL: Duration = Duration::from_secs(2);

/// Result of [`ConnectionSupervisor::connect_subset`].
#[derive(Debug)]
pub struct SubsetOutcome {
    pub outcomes: Vec<SessionOutcome>,
    /// Requested names that match no configured connection
    pub unknown: Vec<String>,
}

/// Establishes connections in dependency order, one at a time, and keeps
/// the connected ones alive until shutdown.
///
/// The live table is owned here and only touched from the supervisor's own
/// task.
pub struct ConnectionSupervisor<E: Establish> {
    connections: Vec<ConnectionSpec>,
    establisher: E,
    credentials: CredentialSource,
    live: Vec<LiveTunnel>,
}

impl<E: Establish> ConnectionSupervisor<E> {
    pub fn new(
        connections: Vec<ConnectionSpec>,
        establisher: E,
        credentials: CredentialSource,
    ) -> Self {
        Self {
            connections,
            establisher,
            credentials,
            live: Vec::new(),
        }
    }

    /// Configured connection names, in configured order.
    pub fn list_names(&self) -> Vec<&str> {
        self.connections.iter().map(|c| c.name()).collect()
    }

    /// Names of the tunnels currently held open.
    pub fn live_names(&self) -> Vec<&str> {
        self.live.iter().map(|t| t.name.as_str()).collect()
    }

    pub async fn connect_all(&mut self) -> Result<Vec<SessionOutcome>, TunnelError> {
        let selected = self.connections.clone();
        self.establish_in_order(&selected).await
    }

    /// Establishes only the named connections.
    ///
    /// Unknown names are returned for the caller to report and otherwise
    /// ignored. Ordering only considers the selected connections.
    pub async fn connect_subset(&mut self, names: &[String]) -> Result<SubsetOutcome, TunnelError> {
        let requested: HashSet<&str> = names.iter().map(String::as_str).collect();
        let configured: HashSet<&str> = self.connections.iter().map(|c| c.name()).collect();

        let mut unknown: Vec<String> = Vec::new();
        for name in names {
            if !configured.contains(name.as_str()) && !unknown.contains(name) {
                unknown.push(name.clone());
            }
        }

        let selected: Vec<ConnectionSpec> = self
            .connections
            .iter()
            .filter(|c| requested.contains(c.name()))
            .cloned()
            .collect();

        let outcomes = self.establish_in_order(&selected).await?;
        Ok(SubsetOutcome { outcomes, unknown })
    }

    async fn establish_in_order(
        &mut self,
        selected: &[ConnectionSpec],
    ) -> Result<Vec<SessionOutcome>, TunnelError> {
        let ordered = DependencyResolver::order(selected)?;
        let mut outcomes = Vec::with_capacity(ordered.len());

        for connection in ordered {
            let established = self
                .establisher
                .establish(connection, &mut self.credentials)
                .await;

            println!("{}", report::outcome_line(&established.outcome));
            if let Some(tunnel) = established.tunnel {
                info!("Holding tunnel {} (pid {:?})", tunnel.name, tunnel.process.pid());
                self.live.push(tunnel);
            }
            outcomes.push(established.outcome);
        }

        Ok(outcomes)
    }

    /// Holds the live tunnels until Ctrl-C (or SIGTERM), then closes them.
    pub async fn hold_until_interrupt(&mut self) {
        self.hold_until(shutdown_signal()).await;
    }

    /// Holds the live tunnels until `shutdown` completes, then closes them.
    ///
    /// Tunnels whose process exits meanwhile are dropped from the table.
    pub async fn hold_until(&mut self, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(KEEPALIVE_POLL);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Interrupt received, closing tunnels");
                    break;
                }
                _ = ticker.tick() => self.reap_exited(),
            }
        }

        self.shutdown();
    }

    fn reap_exited(&mut self) {
        self.live.retain_mut(|tunnel| {
            if tunnel.process.has_exited() {
                warn!("tunnel {} exited", tunnel.name);
                false
            } else {
                true
            }
        });
    }

    /// Kills every live tunnel.
    pub fn shutdown(&mut self) {
        for mut tunnel in self.live.drain(..) {
            match tunnel.process.terminate() {
                Ok(()) => info!("Closed tunnel {}", tunnel.name),
                Err(e) => error!("Failed to close tunnel {}: {}", tunnel.name, e),
            }
        }
    }
}

impl<E: Establish> Drop for ConnectionSupervisor<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::TunnelSpec;
    use crate::session::{Established, FailureReason, SessionState};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Records attempts and answers from a fixed table.
    #[derive(Default, Clone)]
    struct FakeEstablisher {
        attempts: Arc<Mutex<Vec<String>>>,
        results: HashMap<String, SessionState>,
    }

    impl FakeEstablisher {
        fn with(results: &[(&str, SessionState)]) -> Self {
            Self {
                attempts: Arc::default(),
                results: results
                    .iter()
                    .map(|(n, s)| (n.to_string(), s.clone()))
                    .collect(),
            }
        }

        fn attempts(&self) -> Vec<String> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Establish for FakeEstablisher {
        async fn establish(
            &self,
            connection: &ConnectionSpec,
            _credentials: &mut CredentialSource,
        ) -> Established {
            self.attempts
                .lock()
                .unwrap()
                .push(connection.name().to_string());
            let state = self
                .results
                .get(connection.name())
                .cloned()
                .unwrap_or(SessionState::Connected);
            Established {
                outcome: SessionOutcome {
                    name: connection.name().to_string(),
                    state,
                },
                tunnel: None,
            }
        }
    }

    fn conn(name: &str, server: &str, port: u16, tunnels: Vec<TunnelSpec>) -> ConnectionSpec {
        ConnectionSpec::new(Some(name.to_string()), server, port, "user", None, tunnels).unwrap()
    }

    fn supervisor(
        connections: Vec<ConnectionSpec>,
        fake: &FakeEstablisher,
    ) -> ConnectionSupervisor<FakeEstablisher> {
        ConnectionSupervisor::new(connections, fake.clone(), CredentialSource::piped(&b""[..]))
    }

    fn names(outcomes: &[SessionOutcome]) -> Vec<&str> {
        outcomes.iter().map(|o| o.name.as_str()).collect()
    }

    // -------------------------------------------------------------------------
    // connect_all
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_connect_all_follows_dependency_order() {
        let fake = FakeEstablisher::default();
        let mut sup = supervisor(
            vec![
                conn("target", "localhost", 2222, vec![TunnelSpec::local(8080, "app", 80)]),
                conn("jump", "bastion", 22, vec![TunnelSpec::local(2222, "10.0.0.5", 22)]),
            ],
            &fake,
        );

        let outcomes = sup.connect_all().await.unwrap();
        assert_eq!(names(&outcomes), vec!["jump", "target"]);
        assert_eq!(fake.attempts(), vec!["jump", "target"]);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_later_connections() {
        let fake = FakeEstablisher::with(&[
            ("a", SessionState::TimedOut),
            ("b", SessionState::Failed(FailureReason::AuthDenied)),
        ]);
        let mut sup = supervisor(
            vec![
                conn("a", "a", 22, vec![TunnelSpec::dynamic(1080)]),
                conn("b", "b", 22, vec![TunnelSpec::dynamic(1081)]),
                conn("c", "c", 22, vec![TunnelSpec::dynamic(1082)]),
            ],
            &fake,
        );

        let outcomes = sup.connect_all().await.unwrap();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].state, SessionState::TimedOut);
        assert_eq!(outcomes[1].state, SessionState::Failed(FailureReason::AuthDenied));
        assert!(outcomes[2].is_connected());
    }

    #[tokio::test]
    async fn test_cycle_aborts_before_any_attempt() {
        let fake = FakeEstablisher::default();
        let mut sup = supervisor(
            vec![
                conn("a", "localhost", 2000, vec![TunnelSpec::local(3000, "x", 22)]),
                conn("b", "localhost", 3000, vec![TunnelSpec::local(2000, "y", 22)]),
            ],
            &fake,
        );

        let result = sup.connect_all().await;
        assert!(matches!(result, Err(TunnelError::CyclicDependency(_))));
        assert!(fake.attempts().is_empty());
    }

    // -------------------------------------------------------------------------
    // connect_subset
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_connect_subset_only_touches_selection() {
        let fake = FakeEstablisher::default();
        let mut sup = supervisor(
            vec![
                conn("web", "web.example.com", 22, vec![TunnelSpec::local(8080, "localhost", 80)]),
                conn("db", "db.example.com", 22, vec![TunnelSpec::local(5432, "localhost", 5432)]),
            ],
            &fake,
        );

        let result = sup.connect_subset(&["web".to_string()]).await.unwrap();
        assert_eq!(names(&result.outcomes), vec!["web"]);
        assert!(result.unknown.is_empty());
        assert_eq!(fake.attempts(), vec!["web"]);
    }

    #[tokio::test]
    async fn test_connect_subset_reports_unknown_names() {
        let fake = FakeEstablisher::default();
        let mut sup = supervisor(
            vec![
                conn("web", "web", 22, vec![TunnelSpec::dynamic(1080)]),
                conn("db", "db", 22, vec![TunnelSpec::dynamic(1081)]),
            ],
            &fake,
        );

        let requested = vec![
            "cache".to_string(),
            "db".to_string(),
            "queue".to_string(),
            "cache".to_string(),
        ];
        let result = sup.connect_subset(&requested).await.unwrap();
        assert_eq!(result.unknown, vec!["cache".to_string(), "queue".to_string()]);
        assert_eq!(names(&result.outcomes), vec!["db"]);
    }

    #[tokio::test]
    async fn test_subset_ignores_providers_outside_selection() {
        let fake = FakeEstablisher::default();
        let mut sup = supervisor(
            vec![
                conn("target", "localhost", 2222, vec![TunnelSpec::dynamic(1080)]),
                conn("jump", "bastion", 22, vec![TunnelSpec::local(2222, "10.0.0.5", 22)]),
                conn("peer", "localhost", 2222, vec![TunnelSpec::dynamic(1081)]),
            ],
            &fake,
        );

        let result = sup
            .connect_subset(&["peer".to_string(), "target".to_string()])
            .await
            .unwrap();
        // Configured order is kept since `jump` is not being established.
        assert_eq!(names(&result.outcomes), vec!["target", "peer"]);
    }

    // -------------------------------------------------------------------------
    // list / hold
    // -------------------------------------------------------------------------

    #[test]
    fn test_list_names_in_configured_order() {
        let fake = FakeEstablisher::default();
        let sup = supervisor(
            vec![
                conn("zeta", "z", 22, vec![TunnelSpec::dynamic(1)]),
                conn("alpha", "a", 22, vec![TunnelSpec::dynamic(2)]),
            ],
            &fake,
        );
        assert_eq!(sup.list_names(), vec!["zeta", "alpha"]);
        assert!(sup.live_names().is_empty());
    }

    #[tokio::test]
    async fn test_hold_returns_on_shutdown() {
        let fake = FakeEstablisher::default();
        let mut sup = supervisor(vec![], &fake);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), sup.hold_until(async {
            let _ = rx.await;
        }))
        .await
        .expect("hold should end once shutdown resolves");
        assert!(sup.live_names().is_empty());
    }

    // -------------------------------------------------------------------------
    // Live tunnels
    // -------------------------------------------------------------------------

    #[cfg(unix)]
    mod live {
        use super::*;
        use crate::session::{LiveTunnel, Subordinate};

        /// Keeps reading its terminal until end of input.
        const WAIT_FOR_EOF: &str = "while read l; do :; done";

        fn spawn_tunnel(name: &str, script: &str) -> LiveTunnel {
            let argv = vec!["sh".to_string(), "-c".to_string(), script.to_string()];
            let (mut process, io) = Subordinate::spawn(name, &argv).unwrap();
            process.keep_input(io.into_input());
            LiveTunnel {
                name: name.to_string(),
                process,
            }
        }

        fn pid_alive(pid: u32) -> bool {
            std::process::Command::new("sh")
                .args(["-c", &format!("kill -0 {} 2>/dev/null", pid)])
                .status()
                .map(|s| s.success())
                .unwrap_or(false)
        }

        /// Connects every connection by spawning a long-lived shell.
        struct ShellEstablisher;

        #[async_trait]
        impl Establish for ShellEstablisher {
            async fn establish(
                &self,
                connection: &ConnectionSpec,
                _credentials: &mut CredentialSource,
            ) -> Established {
                Established {
                    outcome: SessionOutcome {
                        name: connection.name().to_string(),
                        state: SessionState::Connected,
                    },
                    tunnel: Some(spawn_tunnel(connection.name(), WAIT_FOR_EOF)),
                }
            }
        }

        #[tokio::test]
        async fn test_connected_tunnel_is_held_then_closed() {
            let mut sup = ConnectionSupervisor::new(
                vec![conn("web", "web", 22, vec![TunnelSpec::dynamic(1080)])],
                ShellEstablisher,
                CredentialSource::piped(&b""[..]),
            );

            sup.connect_all().await.unwrap();
            assert_eq!(sup.live_names(), vec!["web"]);
            let pid = sup.live[0].process.pid().unwrap();

            tokio::time::sleep(Duration::from_millis(300)).await;
            assert!(!sup.live[0].process.has_exited());
            assert!(pid_alive(pid));

            sup.hold_until(async {}).await;
            assert!(sup.live_names().is_empty());
            assert!(!pid_alive(pid));
        }

        #[tokio::test]
        async fn test_exited_tunnel_is_dropped() {
            let fake = FakeEstablisher::default();
            let mut sup = supervisor(vec![], &fake);
            sup.live.push(spawn_tunnel("gone", "exit 0"));
            sup.live.push(spawn_tunnel("steady", WAIT_FOR_EOF));

            tokio::time::sleep(Duration::from_millis(300)).await;
            sup.reap_exited();
            assert_eq!(sup.live_names(), vec!["steady"]);

            let pid = sup.live[0].process.pid().unwrap();
            sup.shutdown();
            assert!(sup.live_names().is_empty());
            assert!(!pid_alive(pid));
        }
    }
}
