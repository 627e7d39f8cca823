//! Polling primitives layered over the client trait. Every wait takes an
//! abort timeout and a cancellation token; expiry maps to `Error::Timeout`
//! with the thing being waited on named in the message.

use std::net::IpAddr;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use super::{Error, OrchestratorClient};

/// Resolves once the deployment reports at least one available replica.
pub async fn wait_for_deployment_available(
    client: &dyn OrchestratorClient,
    name: &str,
    poll_interval: Duration,
    abort_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    let wait = async {
        loop {
            let available = client
                .list_deployments()
                .await?
                .into_iter()
                .find(|d| d.name == name)
                .map(|d| d.available_replicas > 0)
                .unwrap_or(false);
            if available {
                return Ok(());
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = sleep(poll_interval) => {}
            }
        }
    };

    match timeout(abort_timeout, wait).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            what: format!("deployment \"{}\" to become available", name),
            after: abort_timeout,
        }),
    }
}

/// Resolves once no pod of the deployment remains.
pub async fn wait_for_deployment_scaled_down(
    client: &dyn OrchestratorClient,
    name: &str,
    poll_interval: Duration,
    abort_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    let wait = async {
        loop {
            let gone = !client
                .list_pods()
                .await?
                .iter()
                .any(|pod| pod.app_label == name);
            if gone {
                return Ok(());
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = sleep(poll_interval) => {}
            }
        }
    };

    match timeout(abort_timeout, wait).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            what: format!("deployment \"{}\" to scale down", name),
            after: abort_timeout,
        }),
    }
}

/// Resolves to the external IP of the service's first ingress point.
/// A missing service fails immediately with `NotFound`; an assigned but
/// unparsable address with `BadAddress`.
pub async fn wait_for_load_balancer_address(
    client: &dyn OrchestratorClient,
    name: &str,
    poll_interval: Duration,
    abort_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<IpAddr, Error> {
    let wait = async {
        loop {
            let service = client
                .list_services()
                .await?
                .into_iter()
                .find(|s| s.name == name)
                .ok_or_else(|| Error::NotFound(format!("service \"{}\"", name)))?;

            if let Some(address) = service.load_balancer_ingress {
                return address.parse().map_err(|_| Error::BadAddress(address));
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = sleep(poll_interval) => {}
            }
        }
    };

    match timeout(abort_timeout, wait).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            what: format!("service \"{}\" load balancer address", name),
            after: abort_timeout,
        }),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::orchestrator::memory::MemoryOrchestrator;
    use crate::orchestrator::resources::{ProbeSpec, ServiceKind, ServiceSpec};

    const POLL: Duration = Duration::from_millis(100);
    const ABORT: Duration = Duration::from_secs(5);

    fn deployment(name: &str) -> crate::orchestrator::DeploymentSpec {
        crate::orchestrator::DeploymentSpec {
            name: name.into(),
            app_label: name.into(),
            image: "image:latest".into(),
            replicas: 1,
            container_port: 5000,
            env: vec![],
            startup_probe: ProbeSpec {
                path: "/api/v1/status".into(),
                period_seconds: 10,
                failure_threshold: 6,
            },
            termination_grace_period_seconds: 60,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_available_resolves() {
        let orchestrator = MemoryOrchestrator::new();
        orchestrator
            .create_deployment(&deployment("user-reader-0"))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        wait_for_deployment_available(&orchestrator, "user-reader-0", POLL, ABORT, &cancel)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_available_times_out() {
        let orchestrator = MemoryOrchestrator::new();
        orchestrator
            .create_deployment(&deployment("user-reader-0"))
            .await
            .unwrap();
        orchestrator.hold_available("user-reader-0");

        let cancel = CancellationToken::new();
        let err =
            wait_for_deployment_available(&orchestrator, "user-reader-0", POLL, ABORT, &cancel)
                .await
                .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_propagates() {
        let orchestrator = MemoryOrchestrator::new();
        orchestrator
            .create_deployment(&deployment("user-reader-0"))
            .await
            .unwrap();
        orchestrator.hold_available("user-reader-0");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err =
            wait_for_deployment_available(&orchestrator, "user-reader-0", POLL, ABORT, &cancel)
                .await
                .unwrap_err();
        assert_eq!(err, Error::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scaled_down_waits_for_pods() {
        let orchestrator = MemoryOrchestrator::new();
        orchestrator
            .create_deployment(&deployment("user-writer-0"))
            .await
            .unwrap();
        orchestrator
            .patch_deployment_replicas("user-writer-0", 0)
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        wait_for_deployment_scaled_down(&orchestrator, "user-writer-0", POLL, ABORT, &cancel)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_balancer_address() {
        let orchestrator = MemoryOrchestrator::new();
        orchestrator
            .create_service(&ServiceSpec {
                name: "writer-externalservice".into(),
                app_label: "writer".into(),
                kind: ServiceKind::LoadBalancer,
                port: 7001,
                target_port: 5000,
            })
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let address = wait_for_load_balancer_address(
            &orchestrator,
            "writer-externalservice",
            POLL,
            ABORT,
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(address.to_string(), "10.104.198.1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_balancer_missing_service() {
        let orchestrator = MemoryOrchestrator::new();
        let cancel = CancellationToken::new();
        let err =
            wait_for_load_balancer_address(&orchestrator, "no-such-service", POLL, ABORT, &cancel)
                .await
                .unwrap_err();
        assert!(err.is_not_found());
    }
}
