//! Reconciliation state machine: desired state × existence → operations.

use serde::Serialize;
use tracing::{info, warn};

use crate::Result;
use crate::command;
use crate::exec::{Executor, describe_exit};
use crate::inventory::{ConnectionRecord, connection_exists};
use crate::spec::{ConnectionSpec, ConnectionType, DesiredState};

/// Result object returned to the caller.
///
/// `changed` counts only mutating commands that exited zero, so after a
/// partial failure it reflects what actually happened on the host. An
/// actuation failure is recorded in `failure`/`rc` and aborts the
/// remaining phases; nothing is rolled back — a re-run converges via
/// modify semantics.
#[derive(Debug, Serialize)]
pub struct Report {
    pub conn_name: String,
    pub state: DesiredState,
    pub exists: bool,
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rc: Option<i32>,
}

impl Report {
    pub fn failed(&self) -> bool {
        self.failure.is_some()
    }

    fn new(spec: &ConnectionSpec, exists: bool) -> Self {
        Self {
            conn_name: spec.conn_name.clone(),
            state: spec.state,
            exists,
            changed: false,
            stdout: None,
            stderr: None,
            failure: None,
            rc: None,
        }
    }

    /// Run one mutating phase. Returns false when the phase failed and the
    /// failure has been recorded as terminal.
    async fn run_phase<E: Executor>(
        &mut self,
        executor: &E,
        args: &[String],
        phase: &str,
    ) -> Result<bool> {
        let out = executor.run(args).await?;
        self.stdout = non_empty(out.stdout);
        self.stderr = non_empty(out.stderr);
        if out.code == 0 {
            self.changed = true;
            Ok(true)
        } else {
            warn!(
                conn_name = %self.conn_name,
                phase,
                code = out.code,
                "nmcli failed: {}",
                describe_exit(out.code)
            );
            self.rc = Some(out.code);
            self.failure = Some(format!("{phase} failed: {}", describe_exit(out.code)));
            Ok(false)
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

/// Converge one connection profile towards its desired state.
///
/// Discovery has already happened; `records` is the current inventory. In
/// check mode the would-be `changed` verdict is reported without touching
/// the executor. Errors are configuration problems caught before any
/// mutation; actuation failures come back inside the [`Report`].
pub async fn reconcile<E: Executor>(
    spec: &ConnectionSpec,
    records: &[ConnectionRecord],
    executor: &E,
    check_mode: bool,
) -> Result<Report> {
    spec.validate()?;

    let exists = connection_exists(&spec.conn_name, records);
    let mut report = Report::new(spec, exists);

    match (spec.state, exists) {
        (DesiredState::Absent, false) => {
            info!(conn_name = %spec.conn_name, "already absent, nothing to do");
        }

        (DesiredState::Absent, true) => {
            if check_mode {
                report.changed = true;
                return Ok(report);
            }
            // Deactivation failure is not terminal; the profile may simply
            // not be active. Deletion failure is.
            let down = executor.run(&command::down_args(&spec.conn_name)).await?;
            if down.code == 0 {
                report.changed = true;
            } else {
                warn!(
                    conn_name = %spec.conn_name,
                    code = down.code,
                    "deactivation failed: {}",
                    describe_exit(down.code)
                );
            }
            report
                .run_phase(executor, &command::delete_args(&spec.conn_name), "delete")
                .await?;
        }

        (DesiredState::Present, true) => {
            let modify = command::modify_args(spec)?;
            warn_ignored_mtu(spec);
            if check_mode {
                report.changed = true;
                return Ok(report);
            }
            report.run_phase(executor, &modify, "modify").await?;
        }

        (DesiredState::Present, false) => {
            // Synthesize every phase up front so a configuration error
            // aborts before the executor is touched.
            let create = command::create_args(spec)?;
            let follow_up = if command::needs_two_phase(spec) {
                Some(command::modify_args(spec)?)
            } else {
                None
            };
            warn_ignored_mtu(spec);

            if check_mode {
                report.changed = true;
                return Ok(report);
            }

            if !report.run_phase(executor, &create, "create").await? {
                return Ok(report);
            }
            if let Some(modify) = follow_up {
                if !report.run_phase(executor, &modify, "modify").await? {
                    return Ok(report);
                }
                report
                    .run_phase(executor, &command::up_args(&spec.conn_name), "activate")
                    .await?;
            }
        }
    }

    Ok(report)
}

fn warn_ignored_mtu(spec: &ConnectionSpec) {
    if spec.conn_type == Some(ConnectionType::Team) && spec.mtu.is_some() {
        warn!(conn_name = %spec.conn_name, "mtu cannot be set on a team profile, ignoring");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::Error;
    use crate::exec::CommandOutput;
    use crate::inventory::SettingsMap;

    struct MockExecutor {
        calls: Mutex<Vec<Vec<String>>>,
        script: Mutex<VecDeque<CommandOutput>>,
    }

    impl MockExecutor {
        fn all_ok() -> Self {
            Self::scripted(Vec::new())
        }

        /// Outputs are consumed in call order; once the script runs out,
        /// every further call succeeds.
        fn scripted(outputs: Vec<CommandOutput>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                script: Mutex::new(outputs.into()),
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Executor for MockExecutor {
        async fn run(&self, args: &[String]) -> Result<CommandOutput> {
            self.calls.lock().unwrap().push(args.to_vec());
            Ok(self.script.lock().unwrap().pop_front().unwrap_or(ok()))
        }
    }

    fn ok() -> CommandOutput {
        CommandOutput {
            code: 0,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    fn failed(code: i32, stderr: &str) -> CommandOutput {
        CommandOutput {
            code,
            stdout: String::new(),
            stderr: stderr.to_owned(),
        }
    }

    fn spec(json: &str) -> ConnectionSpec {
        serde_json::from_str(json).unwrap()
    }

    fn existing(name: &str) -> ConnectionRecord {
        ConnectionRecord {
            id: name.to_owned(),
            uuid: "f6a8d3a0-94f6-419f-bd18-6fd64857c0a1".to_owned(),
            conn_type: "802-3-ethernet".to_owned(),
            settings: SettingsMap::new(),
        }
    }

    #[tokio::test]
    async fn absent_and_missing_is_a_noop() {
        let exec = MockExecutor::all_ok();
        let s = spec(r#"{"conn_name": "old-eth0", "state": "absent"}"#);
        let report = reconcile(&s, &[], &exec, false).await.unwrap();
        assert!(!report.changed);
        assert!(!report.failed());
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn absent_and_existing_runs_down_then_delete() {
        let exec = MockExecutor::all_ok();
        let s = spec(r#"{"conn_name": "old-eth0", "state": "absent"}"#);
        let records = [existing("old-eth0")];
        let report = reconcile(&s, &records, &exec, false).await.unwrap();
        assert!(report.changed);
        assert_eq!(
            exec.calls(),
            [
                vec!["con", "down", "old-eth0"],
                vec!["con", "del", "old-eth0"],
            ]
        );
    }

    #[tokio::test]
    async fn failed_delete_reports_rc_and_stderr_with_changed_true() {
        let exec = MockExecutor::scripted(vec![
            ok(),
            failed(10, "Error: unknown connection 'old-eth0'."),
        ]);
        let s = spec(r#"{"conn_name": "old-eth0", "state": "absent"}"#);
        let records = [existing("old-eth0")];
        let report = reconcile(&s, &records, &exec, false).await.unwrap();
        assert!(report.failed());
        assert_eq!(report.rc, Some(10));
        assert_eq!(
            report.stderr.as_deref(),
            Some("Error: unknown connection 'old-eth0'.")
        );
        // The successful deactivation already changed device state.
        assert!(report.changed);
    }

    #[tokio::test]
    async fn failed_deactivation_is_not_terminal() {
        let exec = MockExecutor::scripted(vec![failed(5, "not active"), ok()]);
        let s = spec(r#"{"conn_name": "old-eth0", "state": "absent"}"#);
        let records = [existing("old-eth0")];
        let report = reconcile(&s, &records, &exec, false).await.unwrap();
        assert!(!report.failed());
        assert!(report.changed);
        assert_eq!(exec.calls().len(), 2);
    }

    #[tokio::test]
    async fn present_and_missing_runs_single_phase_create() {
        let exec = MockExecutor::all_ok();
        let s = spec(
            r#"{"conn_name": "my-eth1", "type": "ethernet", "state": "present",
                "ip4": "192.0.2.100/24", "gw4": "192.0.2.1"}"#,
        );
        let report = reconcile(&s, &[], &exec, false).await.unwrap();
        assert!(report.changed);
        assert_eq!(
            exec.calls(),
            [vec![
                "con", "add", "type", "ethernet", "con-name", "my-eth1", "ifname", "my-eth1",
                "ip4", "192.0.2.100/24", "gw4", "192.0.2.1",
            ]]
        );
    }

    #[tokio::test]
    async fn present_and_missing_with_dns_runs_two_phases_and_activates() {
        let exec = MockExecutor::all_ok();
        let s = spec(
            r#"{"conn_name": "my-eth1", "type": "ethernet", "state": "present",
                "ip4": "192.0.2.100/24", "gw4": "192.0.2.1",
                "dns4": ["192.0.2.53", "198.51.100.53"]}"#,
        );
        let report = reconcile(&s, &[], &exec, false).await.unwrap();
        assert!(report.changed);
        let calls = exec.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(&calls[0][..4], ["con", "add", "type", "ethernet"]);
        assert!(!calls[0].iter().any(|t| t == "ipv4.dns"));
        assert_eq!(
            calls[1],
            ["con", "mod", "my-eth1", "ipv4.address", "192.0.2.100/24", "ipv4.gateway",
             "192.0.2.1", "ipv4.dns", "192.0.2.53 198.51.100.53"]
        );
        assert_eq!(calls[2], ["con", "up", "my-eth1"]);
    }

    #[tokio::test]
    async fn team_slave_with_mtu_activates_after_modify() {
        let exec = MockExecutor::all_ok();
        let s = spec(
            r#"{"conn_name": "team-em1", "ifname": "em1", "type": "team-slave",
                "master": "tenant", "mtu": 9000, "state": "present"}"#,
        );
        let report = reconcile(&s, &[], &exec, false).await.unwrap();
        assert!(report.changed);
        let calls = exec.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2], ["con", "up", "team-em1"]);
    }

    #[tokio::test]
    async fn failed_second_phase_keeps_create_in_place() {
        let exec = MockExecutor::scripted(vec![ok(), failed(2, "invalid property")]);
        let s = spec(
            r#"{"conn_name": "bond0", "type": "bond", "mtu": 9000, "state": "present"}"#,
        );
        let report = reconcile(&s, &[], &exec, false).await.unwrap();
        assert!(report.failed());
        assert_eq!(report.rc, Some(2));
        // Create succeeded, so a change did happen and no rollback is issued.
        assert!(report.changed);
        assert_eq!(exec.calls().len(), 2);
    }

    #[tokio::test]
    async fn rerun_against_matching_record_modifies_instead_of_creating() {
        let s = spec(
            r#"{"conn_name": "my-eth1", "type": "ethernet", "state": "present",
                "ip4": "192.0.2.100/24"}"#,
        );

        let exec = MockExecutor::all_ok();
        reconcile(&s, &[], &exec, false).await.unwrap();
        assert_eq!(exec.calls()[0][1], "add");

        // Same spec, now matching the record the first run created.
        let exec = MockExecutor::all_ok();
        let records = [existing("my-eth1")];
        let report = reconcile(&s, &records, &exec, false).await.unwrap();
        assert!(report.changed);
        assert_eq!(
            exec.calls(),
            [vec!["con", "mod", "my-eth1", "ipv4.address", "192.0.2.100/24"]]
        );
    }

    #[tokio::test]
    async fn check_mode_reports_verdict_without_executing() {
        let cases = [
            (r#"{"conn_name": "a", "state": "absent"}"#, vec![], false),
            (
                r#"{"conn_name": "my-eth1", "type": "ethernet", "state": "present"}"#,
                vec![],
                true,
            ),
            (
                r#"{"conn_name": "my-eth1", "type": "ethernet", "state": "present"}"#,
                vec![existing("my-eth1")],
                true,
            ),
            (
                r#"{"conn_name": "my-eth1", "state": "absent"}"#,
                vec![existing("my-eth1")],
                true,
            ),
        ];

        for (json, records, want_changed) in cases {
            let s = spec(json);

            let check_exec = MockExecutor::all_ok();
            let check = reconcile(&s, &records, &check_exec, true).await.unwrap();
            assert!(check_exec.calls().is_empty(), "check mode ran nmcli for {json}");
            assert_eq!(check.changed, want_changed, "verdict for {json}");

            let real_exec = MockExecutor::all_ok();
            let real = reconcile(&s, &records, &real_exec, false).await.unwrap();
            assert_eq!(check.changed, real.changed, "check/real divergence for {json}");
        }
    }

    #[tokio::test]
    async fn missing_type_aborts_before_any_call() {
        let exec = MockExecutor::all_ok();
        let s = spec(r#"{"conn_name": "my-eth1", "state": "present"}"#);
        let err = reconcile(&s, &[], &exec, false).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_master_aborts_before_any_call() {
        let exec = MockExecutor::all_ok();
        let s = spec(
            r#"{"conn_name": "team-em1", "ifname": "em1", "type": "team-slave",
                "state": "present"}"#,
        );
        let err = reconcile(&s, &[], &exec, false).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn bridge_create_is_an_unsupported_error() {
        let exec = MockExecutor::all_ok();
        let s = spec(r#"{"conn_name": "br0", "type": "bridge", "state": "present"}"#);
        let err = reconcile(&s, &[], &exec, false).await.unwrap_err();
        assert!(matches!(err, Error::Unsupported(ConnectionType::Bridge)));
        assert!(exec.calls().is_empty());
    }
}
