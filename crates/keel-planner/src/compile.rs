//! Desired-plan compiler.
//!
//! `desired_plan` maps (cluster spec, machine, role, join address,
//! shared secrets) to a `NodePlan`. The output must be identical for
//! identical inputs — plan equality against the stored record is the
//! drift-detection mechanism — so every collection rendered into the
//! plan is sorted and the config document is serialized from a
//! `BTreeMap`.

use std::collections::BTreeMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde_json::{Value, json};

use keel_core::{Cluster, ClusterSecrets, Instruction, NodePlan, PlanFile, Runtime, Settings, Taint};
use keel_directory::labels::MACHINE_UID_LABEL;
use keel_directory::{extra_labels, extra_taints};
use keel_state::Machine;

use crate::error::PlannerResult;
use crate::manifest::ManifestSource;
use crate::roles::{is_control_plane, is_only_etcd, is_only_worker};

/// Compile the desired plan for one machine.
///
/// The init node's plan must not depend on `join_url`: a node's own
/// desired plan has to be stable regardless of who else is joining, or
/// a control-plane change would flap the init node's plan.
pub async fn desired_plan(
    cluster: &Cluster,
    secrets: &ClusterSecrets,
    machine: &Machine,
    init_node: bool,
    join_url: &str,
    settings: &Settings,
    manifests: &dyn ManifestSource,
) -> PlannerResult<NodePlan> {
    let mut agent = false;
    let mut config: BTreeMap<String, Value> = BTreeMap::new();

    // First config fragment whose selector matches the cluster labels
    // wins. A fragment without a selector matches nothing.
    for fragment in &cluster.spec.config {
        let Some(selector) = &fragment.machine_label_selector else {
            continue;
        };
        if selector.matches(&cluster.labels)? {
            config = fragment.config.clone();
            break;
        }
    }

    let runtime = Runtime::from_version(&cluster.spec.kubernetes_version);

    if init_node {
        if runtime == Runtime::Skiff {
            config.insert("cluster-init".to_string(), json!(true));
        }
    } else {
        config.insert("server".to_string(), json!(join_url));
    }

    if is_only_etcd(machine) {
        config.insert("role".to_string(), json!("etcd"));
    } else if is_only_worker(machine) {
        agent = true;
    }

    let mut plan = NodePlan::default();

    if is_control_plane(machine) {
        let manifest = manifests.cluster_agent(cluster).await?;
        plan.files.push(PlanFile {
            content: BASE64.encode(&manifest),
            path: runtime.cluster_agent_manifest_path(),
        });
    }

    let image = runtime.installer_image(
        &settings.installer_image_base(),
        &cluster.spec.kubernetes_version,
    );
    let mut instruction = Instruction {
        image,
        command: "sh".to_string(),
        args: vec!["-c".to_string(), "run.sh".to_string()],
        env: vec![],
    };

    if agent {
        instruction.env.push(runtime.agent_mode_env());
        config.insert("token".to_string(), json!(secrets.agent_token));
    } else {
        config.insert("token".to_string(), json!(secrets.server_token));
        config.insert("agent-token".to_string(), json!(secrets.agent_token));
    }

    let mut node_labels: Vec<String> = extra_labels(machine)?
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    node_labels.push(format!("{}={}", MACHINE_UID_LABEL, machine.uid));
    node_labels.sort();
    config.insert("node-label".to_string(), json!(node_labels));

    let taints = extra_taints(machine)?;
    if !taints.is_empty() {
        let mut taint_lines: Vec<String> = taints.iter().map(Taint::to_config_line).collect();
        taint_lines.sort();
        config.insert("node-taint".to_string(), json!(taint_lines));
    }

    plan.instructions.push(instruction);

    // BTreeMap keys serialize sorted, so the document is canonical.
    let config_doc = serde_json::to_vec_pretty(&config)?;
    plan.files.push(PlanFile {
        content: BASE64.encode(&config_doc),
        path: runtime.config_path(),
    });

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ManifestError, ManifestFuture};
    use keel_core::{
        ClusterSpec, ClusterStatus, LabelSelector, SystemConfig, UpgradeStrategy,
    };
    use keel_directory::labels::{
        CONTROL_PLANE_ROLE_LABEL, ETCD_ROLE_LABEL, LABELS_ANNOTATION, TAINTS_ANNOTATION,
    };
    use keel_state::MachineStatus;
    use std::collections::HashMap;

    struct StubManifests(Vec<u8>);

    impl ManifestSource for StubManifests {
        fn cluster_agent<'a>(&'a self, _cluster: &'a Cluster) -> ManifestFuture<'a> {
            let bytes = self.0.clone();
            Box::pin(async move { Ok(bytes) })
        }
    }

    struct FailingManifests;

    impl ManifestSource for FailingManifests {
        fn cluster_agent<'a>(&'a self, _cluster: &'a Cluster) -> ManifestFuture<'a> {
            Box::pin(async { Err(ManifestError::Fetch("boom".to_string())) })
        }
    }

    fn test_settings() -> Settings {
        Settings {
            server: keel_core::config::ServerSettings {
                url: "https://mgmt.keel.dev".to_string(),
                ca_certs: String::new(),
            },
            images: keel_core::config::ImageSettings::default(),
        }
    }

    fn test_cluster() -> Cluster {
        Cluster {
            name: "prod".to_string(),
            namespace: "fleet".to_string(),
            labels: BTreeMap::new(),
            spec: ClusterSpec {
                kubernetes_version: "v1.27.4+skiff1".to_string(),
                management_cluster: "local".to_string(),
                config: vec![],
                upgrade_strategy: UpgradeStrategy::default(),
            },
            status: ClusterStatus::default(),
        }
    }

    fn test_secrets() -> ClusterSecrets {
        ClusterSecrets {
            server_token: "server-token".to_string(),
            agent_token: "agent-token".to_string(),
        }
    }

    fn machine(name: &str, labels: &[(&str, &str)], annotations: &[(&str, &str)]) -> Machine {
        Machine {
            name: name.to_string(),
            uid: format!("uid-{name}"),
            namespace: "fleet".to_string(),
            cluster_name: "prod".to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            annotations: annotations
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            deleting: false,
            status: MachineStatus::default(),
        }
    }

    fn decode_config(plan: &NodePlan) -> BTreeMap<String, Value> {
        let file = plan
            .files
            .iter()
            .find(|f| f.path.ends_with("config.yaml"))
            .expect("config document present");
        serde_json::from_slice(&BASE64.decode(&file.content).unwrap()).unwrap()
    }

    async fn compile(
        cluster: &Cluster,
        m: &Machine,
        init: bool,
        join: &str,
    ) -> PlannerResult<NodePlan> {
        desired_plan(
            cluster,
            &test_secrets(),
            m,
            init,
            join,
            &test_settings(),
            &StubManifests(b"manifest".to_vec()),
        )
        .await
    }

    #[tokio::test]
    async fn identical_inputs_yield_identical_bytes() {
        let cluster = test_cluster();
        let m = machine("node-1", &[(ETCD_ROLE_LABEL, "true")], &[]);

        let a = compile(&cluster, &m, false, "https://join:9345").await.unwrap();
        let b = compile(&cluster, &m, false, "https://join:9345").await.unwrap();
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }

    #[tokio::test]
    async fn init_node_plan_is_independent_of_join_url() {
        let cluster = test_cluster();
        let m = machine("node-1", &[(ETCD_ROLE_LABEL, "true")], &[]);

        let a = compile(&cluster, &m, true, "").await.unwrap();
        let b = compile(&cluster, &m, true, "https://somewhere-else:9345").await.unwrap();
        assert_eq!(a, b);

        let config = decode_config(&a);
        assert_eq!(config.get("cluster-init"), Some(&json!(true)));
        assert!(!config.contains_key("server"));
    }

    #[tokio::test]
    async fn second_generation_runtime_has_no_cluster_init() {
        let mut cluster = test_cluster();
        cluster.spec.kubernetes_version = "v1.27.4+clipper2".to_string();
        let m = machine("node-1", &[(ETCD_ROLE_LABEL, "true")], &[]);

        let plan = compile(&cluster, &m, true, "").await.unwrap();
        let config = decode_config(&plan);
        assert!(!config.contains_key("cluster-init"));
        assert!(!config.contains_key("server"));
    }

    #[tokio::test]
    async fn joining_nodes_point_at_the_join_url() {
        let cluster = test_cluster();
        let m = machine("node-2", &[(ETCD_ROLE_LABEL, "true")], &[]);

        let plan = compile(&cluster, &m, false, "https://10.0.0.1:9345").await.unwrap();
        let config = decode_config(&plan);
        assert_eq!(config.get("server"), Some(&json!("https://10.0.0.1:9345")));
        assert_eq!(config.get("role"), Some(&json!("etcd")));
        // Servers get both tokens.
        assert_eq!(config.get("token"), Some(&json!("server-token")));
        assert_eq!(config.get("agent-token"), Some(&json!("agent-token")));
    }

    #[tokio::test]
    async fn workers_run_in_agent_mode_with_agent_token() {
        let cluster = test_cluster();
        let m = machine("worker-1", &[], &[]);

        let plan = compile(&cluster, &m, false, "https://10.0.0.1:9345").await.unwrap();
        assert_eq!(plan.instructions.len(), 1);
        assert_eq!(
            plan.instructions[0].env,
            vec!["INSTALL_SKIFF_TYPE=agent".to_string()]
        );

        let config = decode_config(&plan);
        assert_eq!(config.get("token"), Some(&json!("agent-token")));
        assert!(!config.contains_key("agent-token"));
        assert!(!config.contains_key("role"));
    }

    #[tokio::test]
    async fn control_plane_nodes_embed_the_cluster_agent_manifest() {
        let cluster = test_cluster();
        let m = machine("cp-1", &[(CONTROL_PLANE_ROLE_LABEL, "true")], &[]);

        let plan = compile(&cluster, &m, false, "https://10.0.0.1:9345").await.unwrap();
        let manifest = plan
            .files
            .iter()
            .find(|f| f.path.ends_with("cluster-agent.yaml"))
            .expect("manifest file present");
        assert_eq!(BASE64.decode(&manifest.content).unwrap(), b"manifest");
        assert_eq!(
            manifest.path,
            "/var/lib/keel/skiff/server/manifests/cluster-agent.yaml"
        );
    }

    #[tokio::test]
    async fn manifest_fetch_failure_is_a_hard_error() {
        let cluster = test_cluster();
        let m = machine("cp-1", &[(CONTROL_PLANE_ROLE_LABEL, "true")], &[]);

        let result = desired_plan(
            &cluster,
            &test_secrets(),
            &m,
            false,
            "https://10.0.0.1:9345",
            &test_settings(),
            &FailingManifests,
        )
        .await;
        assert!(matches!(result, Err(crate::PlannerError::Manifest(_))));
    }

    #[tokio::test]
    async fn node_labels_are_sorted_and_include_machine_uid() {
        let cluster = test_cluster();
        let m = machine(
            "worker-1",
            &[],
            &[(LABELS_ANNOTATION, r#"{"zone":"b","rack":"r2"}"#)],
        );

        let plan = compile(&cluster, &m, false, "https://j:9345").await.unwrap();
        let config = decode_config(&plan);
        assert_eq!(
            config.get("node-label"),
            Some(&json!([
                "keel.dev/machine=uid-worker-1",
                "rack=r2",
                "zone=b"
            ]))
        );
    }

    #[tokio::test]
    async fn taints_render_sorted_when_present() {
        let cluster = test_cluster();
        let m = machine(
            "node-1",
            &[(ETCD_ROLE_LABEL, "true")],
            &[(
                TAINTS_ANNOTATION,
                r#"[{"key":"b","value":"2","effect":"NoSchedule"},
                    {"key":"a","value":"1","effect":"NoExecute"}]"#,
            )],
        );

        let plan = compile(&cluster, &m, false, "https://j:9345").await.unwrap();
        let config = decode_config(&plan);
        assert_eq!(
            config.get("node-taint"),
            Some(&json!(["a=1:NoExecute", "b=2:NoSchedule"]))
        );

        // And absent entirely when the machine carries no taints.
        let plain = machine("node-2", &[(ETCD_ROLE_LABEL, "true")], &[]);
        let plan = compile(&cluster, &plain, false, "https://j:9345").await.unwrap();
        assert!(!decode_config(&plan).contains_key("node-taint"));
    }

    #[tokio::test]
    async fn malformed_annotations_are_hard_errors() {
        let cluster = test_cluster();
        let m = machine("node-1", &[], &[(LABELS_ANNOTATION, "{broken")]);
        let result = compile(&cluster, &m, false, "https://j:9345").await;
        assert!(matches!(result, Err(crate::PlannerError::Directory(_))));
    }

    #[tokio::test]
    async fn first_matching_config_fragment_wins() {
        let mut cluster = test_cluster();
        cluster
            .labels
            .insert("env".to_string(), "prod".to_string());
        cluster.spec.config = vec![
            // No selector: matches nothing.
            SystemConfig {
                machine_label_selector: None,
                config: BTreeMap::from([("skipped".to_string(), json!(true))]),
            },
            SystemConfig {
                machine_label_selector: Some(LabelSelector {
                    match_labels: BTreeMap::from([(
                        "env".to_string(),
                        "prod".to_string(),
                    )]),
                    match_expressions: vec![],
                }),
                config: BTreeMap::from([("kube-apiserver-arg".to_string(), json!("audit"))]),
            },
            SystemConfig {
                machine_label_selector: Some(LabelSelector::default()),
                config: BTreeMap::from([("shadowed".to_string(), json!(true))]),
            },
        ];
        let m = machine("node-1", &[(ETCD_ROLE_LABEL, "true")], &[]);

        let plan = compile(&cluster, &m, false, "https://j:9345").await.unwrap();
        let config = decode_config(&plan);
        assert_eq!(config.get("kube-apiserver-arg"), Some(&json!("audit")));
        assert!(!config.contains_key("skipped"));
        assert!(!config.contains_key("shadowed"));
    }

    #[tokio::test]
    async fn malformed_selector_is_a_hard_error() {
        let mut cluster = test_cluster();
        cluster.spec.config = vec![SystemConfig {
            machine_label_selector: Some(LabelSelector {
                match_labels: BTreeMap::new(),
                match_expressions: vec![keel_core::SelectorRequirement {
                    key: "env".to_string(),
                    operator: "Near".to_string(),
                    values: vec![],
                }],
            }),
            config: BTreeMap::new(),
        }];
        let m = machine("node-1", &[(ETCD_ROLE_LABEL, "true")], &[]);

        let result = compile(&cluster, &m, false, "https://j:9345").await;
        assert!(matches!(result, Err(crate::PlannerError::Selector(_))));
    }

    #[tokio::test]
    async fn installer_image_tracks_runtime_and_version() {
        let cluster = test_cluster();
        let m = machine("node-1", &[(ETCD_ROLE_LABEL, "true")], &[]);

        let plan = compile(&cluster, &m, false, "https://j:9345").await.unwrap();
        assert_eq!(
            plan.instructions[0].image,
            "keel/keel-installer-skiff:v1.27.4-skiff1"
        );
        assert_eq!(plan.instructions[0].command, "sh");
        assert_eq!(plan.instructions[0].args, vec!["-c", "run.sh"]);
    }
}
