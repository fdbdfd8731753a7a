//! Unit tests for the deployment orchestrator

#[cfg(test)]
mod tests {
    use crate::error::{DeployError, HostPowerError};
    use crate::test_utils::*;
    use crate::tftp::TftpBootFiles;
    use models::{
        DeploymentRequest, FailureReason, HostRequest, ManagementEndpoint, Outcome, PowerState,
    };
    use power_client::{PowerAction, PowerError};
    use std::sync::Arc;
    use std::time::Duration;

    fn request(configuration: &str, hosts: &[(&str, bool)]) -> DeploymentRequest {
        DeploymentRequest {
            configuration: configuration.to_string(),
            hosts: hosts
                .iter()
                .map(|(name, reboot)| HostRequest::new(*name, *reboot))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_unknown_configuration_mutates_nothing() {
        let bed = TestBed::new(create_test_catalog(&["prod"]));
        bed.add_host("a", "aa:01", agent_endpoint("10.0.0.1")).await;

        let err = bed
            .orchestrator
            .deploy(request("missing", &[("a", true)]))
            .await
            .unwrap_err();

        assert_eq!(err, DeployError::ConfigurationNotFound("missing".to_string()));
        assert!(bed.registry.lookup("a").await.unwrap().configuration.is_none());
        assert!(bed.agent.calls().is_empty());
    }

    #[tokio::test]
    async fn test_outcomes_follow_request_order() {
        let bed = TestBed::new(create_test_catalog(&["prod"]));
        bed.add_host("a", "aa:01", agent_endpoint("10.0.0.1")).await;
        bed.add_host("b", "aa:02", ManagementEndpoint::None).await;

        let result = bed
            .orchestrator
            .deploy(request("prod", &[("a", false), ("ghost", false), ("b", true)]))
            .await
            .unwrap();

        let names: Vec<_> = result.hosts.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, ["a", "ghost", "b"]);
        assert_eq!(
            result.outcomes(),
            [
                &Outcome::ConfigApplied,
                &Outcome::Failed(FailureReason::HostUnknown),
                &Outcome::Failed(FailureReason::NoManagementEndpoint),
            ]
        );
        assert!(!result.all_succeeded());
    }

    #[tokio::test]
    async fn test_order_kept_when_backends_finish_in_reverse() {
        let bed = TestBed::new(create_test_catalog(&["prod"]));
        let names = ["n0", "n1", "n2", "n3", "n4"];
        for (i, name) in names.iter().enumerate() {
            let address = format!("10.0.0.{i}");
            bed.add_host(name, &format!("aa:0{i}"), agent_endpoint(&address)).await;
            // Earlier entries finish last
            bed.agent
                .set_delay(&address, Duration::from_millis(20 * (names.len() - i) as u64));
        }

        let entries: Vec<_> = names.iter().map(|n| (*n, true)).collect();
        let result = bed.orchestrator.deploy(request("prod", &entries)).await.unwrap();

        let got: Vec<_> = result.hosts.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(got, names);
        assert!(result.outcomes().iter().all(|o| **o == Outcome::Rebooted));
    }

    #[tokio::test]
    async fn test_backends_run_concurrently() {
        let bed = TestBed::new(create_test_catalog(&["prod"]));
        for i in 0..4 {
            let address = format!("10.0.0.{i}");
            bed.add_host(&format!("n{i}"), &format!("aa:0{i}"), agent_endpoint(&address)).await;
            bed.agent.set_delay(&address, Duration::from_millis(200));
        }

        let started = tokio::time::Instant::now();
        let entries = [("n0", true), ("n1", true), ("n2", true), ("n3", true)];
        let result = bed.orchestrator.deploy(request("prod", &entries)).await.unwrap();

        // Two sequential calls per host, 4 hosts: serial would take 1.6 s
        assert!(started.elapsed() < Duration::from_millis(1200));
        assert!(result.all_succeeded());
    }

    #[tokio::test]
    async fn test_no_endpoint_makes_no_backend_call() {
        let bed = TestBed::new(create_test_catalog(&["prod"]));
        bed.add_host("bare", "aa:01", ManagementEndpoint::None).await;

        let result = bed
            .orchestrator
            .deploy(request("prod", &[("bare", true)]))
            .await
            .unwrap();

        assert_eq!(
            result.hosts[0].outcome,
            Outcome::Failed(FailureReason::NoManagementEndpoint)
        );
        // The configuration is assigned even though the reboot could not be attempted
        assert_eq!(
            bed.registry.lookup("bare").await.unwrap().configuration.as_deref(),
            Some("prod")
        );
        assert!(bed.vendor.calls().is_empty());
        assert!(bed.agent.calls().is_empty());
    }

    #[tokio::test]
    async fn test_deploy_without_reboot_is_idempotent() {
        let bed = TestBed::new(create_test_catalog(&["prod"]));
        bed.add_host("a", "aa:01", agent_endpoint("10.0.0.1")).await;

        let first = bed.orchestrator.deploy(request("prod", &[("a", false)])).await.unwrap();
        let after_first = bed.registry.list().await;
        let second = bed.orchestrator.deploy(request("prod", &[("a", false)])).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(bed.registry.list().await, after_first);
        assert!(bed.agent.calls().is_empty());
    }

    #[tokio::test]
    async fn test_mixed_batch() {
        let bed = TestBed::new(create_test_catalog(&["prod"]));
        bed.add_host("A", "aa:01", bmc_endpoint("10.0.0.1")).await;
        bed.add_host("B", "aa:02", ManagementEndpoint::None).await;
        bed.vendor.set_power("10.0.0.1", PowerState::Off);

        let result = bed
            .orchestrator
            .deploy(request("prod", &[("A", true), ("B", false), ("missing", true)]))
            .await
            .unwrap();

        assert_eq!(
            result.outcomes(),
            [
                &Outcome::Rebooted,
                &Outcome::ConfigApplied,
                &Outcome::Failed(FailureReason::HostUnknown),
            ]
        );
        let a = bed.registry.lookup("A").await.unwrap();
        assert_eq!(a.configuration.as_deref(), Some("prod"));
        assert_eq!(a.power_state, PowerState::On);
        assert_eq!(
            bed.registry.lookup("B").await.unwrap().configuration.as_deref(),
            Some("prod")
        );
        assert!(bed.registry.lookup("missing").await.is_none());
        assert_eq!(bed.vendor.actions_for("10.0.0.1"), [PowerAction::On]);
    }

    #[tokio::test]
    async fn test_agent_host_and_unmanaged_host_rebooted_together() {
        let bed = TestBed::new(create_test_catalog(&["prod"]));
        bed.add_host("A", "aa:aa", agent_endpoint("10.0.0.1")).await;
        bed.add_host("B", "bb:bb", ManagementEndpoint::None).await;
        bed.registry.set_power_state("A", PowerState::Off).await.unwrap();
        bed.agent.set_power("10.0.0.1", PowerState::Off);

        let result = bed
            .orchestrator
            .deploy(request("prod", &[("A", true), ("B", true), ("missing", true)]))
            .await
            .unwrap();

        assert_eq!(
            result.outcomes(),
            [
                &Outcome::Rebooted,
                &Outcome::Failed(FailureReason::NoManagementEndpoint),
                &Outcome::Failed(FailureReason::HostUnknown),
            ]
        );
        for name in ["A", "B"] {
            let host = bed.registry.lookup(name).await.unwrap();
            assert_eq!(host.configuration.as_deref(), Some("prod"));
        }
        assert!(bed.registry.lookup("missing").await.is_none());
        assert_eq!(bed.agent.actions_for("10.0.0.1"), [PowerAction::On]);
    }

    #[tokio::test]
    async fn test_reboot_failure_keeps_configuration() {
        let bed = TestBed::new(create_test_catalog(&["prod", "rescue"]));
        bed.add_host("a", "aa:01", agent_endpoint("10.0.0.1")).await;
        bed.agent.set_power("10.0.0.1", PowerState::On);
        bed.agent
            .fail_with("10.0.0.1", PowerError::Protocol("unexpected body".to_string()));

        let result = bed
            .orchestrator
            .deploy(request("rescue", &[("a", true)]))
            .await
            .unwrap();

        assert_eq!(
            result.hosts[0].outcome,
            Outcome::Failed(FailureReason::BackendProtocolError)
        );
        let host = bed.registry.lookup("a").await.unwrap();
        assert_eq!(host.configuration.as_deref(), Some("rescue"));
        assert_eq!(host.power_state, PowerState::Unknown);
    }

    #[tokio::test]
    async fn test_timeout_is_reported_per_host() {
        let bed = TestBed::new(create_test_catalog(&["prod"]));
        bed.add_host("slow", "aa:01", agent_endpoint("10.0.0.1")).await;
        bed.add_host("fast", "aa:02", agent_endpoint("10.0.0.2")).await;
        bed.agent.set_delay("10.0.0.1", Duration::from_secs(10));

        let result = bed
            .orchestrator
            .deploy(request("prod", &[("slow", true), ("fast", true)]))
            .await
            .unwrap();

        assert_eq!(
            result.outcomes(),
            [&Outcome::Failed(FailureReason::BackendTimeout), &Outcome::Rebooted]
        );
    }

    #[tokio::test]
    async fn test_boot_files_written_before_assignment() {
        let dir = tempfile::tempdir().unwrap();
        let bed = TestBed::with_boot_files(
            create_test_catalog(&["prod"]),
            Arc::new(TftpBootFiles::new(dir.path())),
        );
        bed.add_host("a", "aa:bb:cc:dd:ee:01", ManagementEndpoint::None).await;

        bed.orchestrator.deploy(request("prod", &[("a", false)])).await.unwrap();

        let path = dir.path().join("pxelinux.cfg/01-aa-bb-cc-dd-ee-01");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "DEFAULT prod\n");
    }

    #[tokio::test]
    async fn test_boot_file_failure_leaves_host_unassigned() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("file");
        std::fs::write(&root, "").unwrap();
        let bed = TestBed::with_boot_files(
            create_test_catalog(&["prod"]),
            Arc::new(TftpBootFiles::new(&root)),
        );
        bed.add_host("a", "aa:01", agent_endpoint("10.0.0.1")).await;

        let result = bed.orchestrator.deploy(request("prod", &[("a", true)])).await.unwrap();

        assert_eq!(result.hosts[0].outcome, Outcome::Failed(FailureReason::BootFile));
        assert!(bed.registry.lookup("a").await.unwrap().configuration.is_none());
        assert!(bed.agent.calls().is_empty());
    }

    #[tokio::test]
    async fn test_single_host_power_operations() {
        let bed = TestBed::new(create_test_catalog(&[]));
        bed.add_host("a", "aa:01", agent_endpoint("10.0.0.1")).await;
        bed.add_host("bare", "aa:02", ManagementEndpoint::None).await;

        bed.orchestrator.power_off("a").await.unwrap();
        assert_eq!(bed.registry.lookup("a").await.unwrap().power_state, PowerState::Off);
        bed.orchestrator.reboot("a").await.unwrap();
        assert_eq!(bed.registry.lookup("a").await.unwrap().power_state, PowerState::On);
        bed.orchestrator.power_on("a").await.unwrap();
        assert_eq!(
            bed.agent.actions_for("10.0.0.1"),
            [PowerAction::Off, PowerAction::On, PowerAction::On]
        );

        assert_eq!(
            bed.orchestrator.reboot("ghost").await,
            Err(HostPowerError::HostUnknown("ghost".to_string()))
        );
        assert_eq!(
            bed.orchestrator.power_on("bare").await,
            Err(HostPowerError::Power(PowerError::NoManagementEndpoint))
        );
    }

    #[tokio::test]
    async fn test_unassign_missing_after_catalog_swap() {
        let dir = tempfile::tempdir().unwrap();
        let bed = TestBed::with_boot_files(
            create_test_catalog(&["prod", "rescue"]),
            Arc::new(TftpBootFiles::new(dir.path())),
        );
        bed.add_host("a", "aa:01", ManagementEndpoint::None).await;
        bed.add_host("b", "aa:02", ManagementEndpoint::None).await;
        bed.orchestrator.deploy(request("prod", &[("a", false)])).await.unwrap();
        bed.orchestrator.deploy(request("rescue", &[("b", false)])).await.unwrap();

        let previous = bed.catalog.swap(create_test_catalog(&["prod"]));
        let unassigned = bed.orchestrator.unassign_missing(&previous).await;

        assert_eq!(unassigned, ["b"]);
        assert!(bed.registry.lookup("b").await.unwrap().configuration.is_none());
        assert_eq!(
            bed.registry.lookup("a").await.unwrap().configuration.as_deref(),
            Some("prod")
        );
        assert!(!dir.path().join("pxelinux.cfg/01-aa-02").exists());
        assert!(dir.path().join("pxelinux.cfg/01-aa-01").exists());
    }

    #[tokio::test]
    async fn test_backend_calls_bounded_by_max_concurrency() {
        let bed = TestBed::with_max_concurrency(create_test_catalog(&["prod"]), 2);
        let names: Vec<String> = (0..6).map(|i| format!("n{i}")).collect();
        for (i, name) in names.iter().enumerate() {
            let address = format!("10.0.0.{i}");
            bed.add_host(name, &format!("aa:0{i}"), agent_endpoint(&address)).await;
            bed.agent.set_delay(&address, Duration::from_millis(30));
        }

        let entries: Vec<_> = names.iter().map(|n| (n.as_str(), true)).collect();
        let result = bed.orchestrator.deploy(request("prod", &entries)).await.unwrap();

        assert!(result.all_succeeded());
        // A status query and an action per host
        assert_eq!(bed.agent.calls().len(), 12);
        assert_eq!(bed.agent.peak_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_refresh_shares_backend_call_limit() {
        let bed = TestBed::with_max_concurrency(create_test_catalog(&["prod"]), 1);
        let names: Vec<String> = (0..4).map(|i| format!("n{i}")).collect();
        for (i, name) in names.iter().enumerate() {
            let address = format!("10.0.0.{i}");
            bed.add_host(name, &format!("aa:0{i}"), agent_endpoint(&address)).await;
            bed.agent.set_delay(&address, Duration::from_millis(20));
        }
        let refresh = bed.refresh_engine();

        let entries: Vec<_> = names.iter().map(|n| (n.as_str(), true)).collect();
        let (deployed, report) = tokio::join!(
            bed.orchestrator.deploy(request("prod", &entries)),
            refresh.refresh_all()
        );

        assert!(deployed.unwrap().all_succeeded());
        assert_eq!(report.refreshed, names);
        assert_eq!(bed.agent.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_configuration_removed_while_waiting_for_host() {
        let bed = TestBed::new(create_test_catalog(&["prod"]));
        bed.add_host("a", "aa:01", ManagementEndpoint::None).await;

        // Holding the host lets the deployment validate, then wait for it
        let held = bed.registry.lock("a").await.unwrap();
        let deployment = {
            let orchestrator = bed.orchestrator.clone();
            tokio::spawn(async move { orchestrator.deploy(request("prod", &[("a", false)])).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let previous = bed.catalog.swap(create_test_catalog(&[]));
        drop(held);
        let unassigned = bed.orchestrator.unassign_missing(&previous).await;
        let result = deployment.await.unwrap().unwrap();

        assert_eq!(
            result.hosts[0].outcome,
            Outcome::Failed(FailureReason::ConfigurationRemoved)
        );
        assert!(unassigned.is_empty());
        assert!(bed.registry.lookup("a").await.unwrap().configuration.is_none());
    }

    #[tokio::test]
    async fn test_boot_file_failure_on_one_mac_writes_none() {
        let dir = tempfile::tempdir().unwrap();
        let bed = TestBed::with_boot_files(
            create_test_catalog(&["prod"]),
            Arc::new(TftpBootFiles::new(dir.path())),
        );
        bed.registry
            .upsert("a", identity("a", &["aa:01", "aa:02"]), ManagementEndpoint::None)
            .await
            .unwrap();
        std::fs::create_dir_all(dir.path().join("pxelinux.cfg/01-aa-02/keep")).unwrap();

        let result = bed.orchestrator.deploy(request("prod", &[("a", false)])).await.unwrap();

        assert_eq!(result.hosts[0].outcome, Outcome::Failed(FailureReason::BootFile));
        assert!(bed.registry.lookup("a").await.unwrap().configuration.is_none());
        assert!(!dir.path().join("pxelinux.cfg/01-aa-01").exists());
    }
}
