//! Decoding of annotation-encoded machine data.
//!
//! Extra node labels and taints arrive as JSON blobs inside string
//! annotations. Decoding happens here, at the directory boundary — the
//! planner only ever sees structured values. A malformed blob is a hard
//! error; it aborts the pass instead of producing a partial plan.

use std::collections::BTreeMap;

use keel_core::Taint;
use keel_state::Machine;

use crate::error::{DirectoryError, DirectoryResult};
use crate::labels::{JOIN_URL_ANNOTATION, LABELS_ANNOTATION, TAINTS_ANNOTATION};

/// Join URL the init node published, if any.
pub fn join_url(machine: &Machine) -> Option<String> {
    machine
        .annotations
        .get(JOIN_URL_ANNOTATION)
        .filter(|url| !url.is_empty())
        .cloned()
}

/// Extra node labels decoded from the labels annotation.
///
/// Returned as a `BTreeMap` so downstream rendering is deterministic.
pub fn extra_labels(machine: &Machine) -> DirectoryResult<BTreeMap<String, String>> {
    let Some(data) = machine.annotations.get(LABELS_ANNOTATION) else {
        return Ok(BTreeMap::new());
    };
    if data.is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(data).map_err(|source| DirectoryError::MalformedLabels {
        machine: machine.name.clone(),
        source,
    })
}

/// Extra node taints decoded from the taints annotation.
pub fn extra_taints(machine: &Machine) -> DirectoryResult<Vec<Taint>> {
    let Some(data) = machine.annotations.get(TAINTS_ANNOTATION) else {
        return Ok(Vec::new());
    };
    if data.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(data).map_err(|source| DirectoryError::MalformedTaints {
        machine: machine.name.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_state::MachineStatus;
    use std::collections::HashMap;

    fn machine_with_annotation(key: &str, value: &str) -> Machine {
        Machine {
            name: "node-1".to_string(),
            uid: "uid-1".to_string(),
            namespace: "fleet".to_string(),
            cluster_name: "prod".to_string(),
            labels: HashMap::new(),
            annotations: HashMap::from([(key.to_string(), value.to_string())]),
            deleting: false,
            status: MachineStatus::default(),
        }
    }

    #[test]
    fn join_url_absent_or_empty_is_none() {
        let machine = machine_with_annotation(JOIN_URL_ANNOTATION, "");
        assert!(join_url(&machine).is_none());

        let machine = machine_with_annotation("other", "x");
        assert!(join_url(&machine).is_none());
    }

    #[test]
    fn join_url_present() {
        let machine = machine_with_annotation(JOIN_URL_ANNOTATION, "https://10.0.0.1:9345");
        assert_eq!(join_url(&machine).as_deref(), Some("https://10.0.0.1:9345"));
    }

    #[test]
    fn extra_labels_decode_sorted() {
        let machine =
            machine_with_annotation(LABELS_ANNOTATION, r#"{"zone":"b","rack":"r2"}"#);
        let labels = extra_labels(&machine).unwrap();
        let keys: Vec<_> = labels.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["rack", "zone"]);
    }

    #[test]
    fn missing_annotations_decode_empty() {
        let machine = machine_with_annotation("unrelated", "x");
        assert!(extra_labels(&machine).unwrap().is_empty());
        assert!(extra_taints(&machine).unwrap().is_empty());
    }

    #[test]
    fn malformed_labels_are_hard_errors() {
        let machine = machine_with_annotation(LABELS_ANNOTATION, "{not json");
        assert!(matches!(
            extra_labels(&machine),
            Err(DirectoryError::MalformedLabels { .. })
        ));
    }

    #[test]
    fn taints_decode() {
        let machine = machine_with_annotation(
            TAINTS_ANNOTATION,
            r#"[{"key":"etcd-only","value":"true","effect":"NoExecute"}]"#,
        );
        let taints = extra_taints(&machine).unwrap();
        assert_eq!(taints.len(), 1);
        assert_eq!(taints[0].to_config_line(), "etcd-only=true:NoExecute");
    }

    #[test]
    fn malformed_taints_are_hard_errors() {
        let machine = machine_with_annotation(TAINTS_ANNOTATION, r#"{"not":"a list"}"#);
        assert!(matches!(
            extra_taints(&machine),
            Err(DirectoryError::MalformedTaints { .. })
        ));
    }
}
