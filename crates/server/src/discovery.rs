//! Prometheus HTTP service discovery assembly.
//!
//! Turns registry records into `{targets, labels}` groups. Targets with
//! credentials are pointed at the proxy; the real destination and the
//! credential travel as `__param_*` labels that Prometheus forwards as query
//! parameters.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use promhub_core::config::ProxyEndpoint;
use promhub_core::target::proxy_host_port;
use promhub_core::{Credentials, Fingerprint};
use promhub_registry::models::TargetRecord;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

/// One entry of an HTTP SD response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    pub targets: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

/// Build discovery groups, one per fingerprint.
///
/// Group order follows the first record of each fingerprint, but the group
/// itself is built from the last record. Endpoint and labels always come
/// from the same record, so a proxied group never mixes with a direct one.
pub fn assemble(records: &[TargetRecord], proxy: &ProxyEndpoint) -> Vec<TargetGroup> {
    let mut order = Vec::new();
    let mut groups: HashMap<Fingerprint, TargetGroup> = HashMap::new();

    for record in records {
        let group = target_group(record, proxy);
        match groups.entry(record.fingerprint()) {
            Entry::Occupied(mut existing) => {
                existing.insert(group);
            }
            Entry::Vacant(slot) => {
                order.push(*slot.key());
                slot.insert(group);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|fingerprint| groups.remove(&fingerprint))
        .collect()
}

/// Drop records whose fingerprint already appeared, keeping the first.
pub fn unique_by_fingerprint(records: Vec<TargetRecord>) -> Vec<TargetRecord> {
    let mut seen = std::collections::HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.fingerprint()))
        .collect()
}

fn target_group(record: &TargetRecord, proxy: &ProxyEndpoint) -> TargetGroup {
    let target = &record.target;
    let scheme = target.scheme();
    let credentials = target.credentials();

    let mut labels = BTreeMap::new();
    labels.insert("instance".to_string(), target.address.clone());
    labels.insert(
        "__scrape_interval__".to_string(),
        format!("{}s", target.scrape_interval_secs),
    );
    labels.insert(
        "__scrape_timeout__".to_string(),
        format!("{}s", target.scrape_timeout_secs),
    );

    let endpoint = match &credentials {
        None => {
            labels.insert("__metrics_path__".to_string(), target.metric_path.clone());
            labels.insert("__scheme__".to_string(), scheme.to_string());
            target.address.clone()
        }
        Some(_) => {
            labels.insert("__metrics_path__".to_string(), proxy.path.clone());
            labels.insert("__scheme__".to_string(), proxy.scheme.to_string());
            proxy.host.clone()
        }
    };

    for label in &record.labels {
        labels.insert(label.key.clone(), label.value.clone());
    }

    if let Some(credentials) = &credentials {
        let (host, port) = proxy_host_port(&target.address, scheme);
        labels.insert("__param_host".to_string(), host);
        labels.insert("__param_port".to_string(), port);
        labels.insert("__param_path".to_string(), target.metric_path.clone());
        labels.insert("__param_schema".to_string(), scheme.to_string());
        match credentials {
            Credentials::Bearer(token) => {
                labels.insert("__param_bearer".to_string(), token.clone());
            }
            Credentials::Basic(raw) => {
                labels.insert("__param_base".to_string(), BASE64.encode(raw));
            }
        }
    }

    for param in &record.params {
        labels.insert(format!("__param_{}", param.key), param.value.clone());
    }

    // Blackbox-style probes name the probed endpoint in the `target` param.
    if let Some(probed) = labels.get("__param_target").cloned() {
        labels.insert("instance".to_string(), probed);
    }

    TargetGroup {
        targets: vec![endpoint],
        labels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promhub_core::{KeyValue, Scheme};
    use promhub_registry::models::TargetRow;
    use time::OffsetDateTime;

    fn proxy() -> ProxyEndpoint {
        ProxyEndpoint {
            scheme: Scheme::Http,
            host: "promhub.internal:8080".to_string(),
            path: "/v1/proxy".to_string(),
        }
    }

    fn record(id: i64, address: &str) -> TargetRecord {
        let now = OffsetDateTime::now_utc();
        TargetRecord {
            target: TargetRow {
                id,
                scheme: "http".to_string(),
                address: address.to_string(),
                metric_path: "/metrics".to_string(),
                scrape_interval_secs: 30,
                scrape_timeout_secs: 10,
                bearer_token: None,
                base_auth: None,
                deleted: false,
                created_at: now,
                updated_at: now,
            },
            labels: Vec::new(),
            params: Vec::new(),
            selectors: vec![KeyValue::new("job", "node")],
        }
    }

    #[test]
    fn test_plain_target_points_at_itself() {
        let mut r = record(1, "10.0.0.5:9100");
        r.labels.push(KeyValue::new("env", "prod"));

        let groups = assemble(&[r], &proxy());
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.targets, vec!["10.0.0.5:9100"]);
        assert_eq!(group.labels["instance"], "10.0.0.5:9100");
        assert_eq!(group.labels["__scrape_interval__"], "30s");
        assert_eq!(group.labels["__scrape_timeout__"], "10s");
        assert_eq!(group.labels["__metrics_path__"], "/metrics");
        assert_eq!(group.labels["__scheme__"], "http");
        assert_eq!(group.labels["env"], "prod");
        assert!(!group.labels.contains_key("__param_host"));
    }

    #[test]
    fn test_bearer_target_goes_through_proxy() {
        let mut r = record(1, "10.0.0.5:9100");
        r.target.bearer_token = Some("abc".to_string());

        let group = &assemble(&[r], &proxy())[0];
        assert_eq!(group.targets, vec!["promhub.internal:8080"]);
        assert_eq!(group.labels["instance"], "10.0.0.5:9100");
        assert_eq!(group.labels["__metrics_path__"], "/v1/proxy");
        assert_eq!(group.labels["__scheme__"], "http");
        assert_eq!(group.labels["__param_host"], "10.0.0.5");
        assert_eq!(group.labels["__param_port"], "9100");
        assert_eq!(group.labels["__param_path"], "/metrics");
        assert_eq!(group.labels["__param_schema"], "http");
        assert_eq!(group.labels["__param_bearer"], "abc");
        assert!(!group.labels.contains_key("__param_base"));
    }

    #[test]
    fn test_basic_auth_is_base64_and_loses_to_bearer() {
        let mut r = record(1, "db.example.com");
        r.target.scheme = "https".to_string();
        r.target.base_auth = Some("user:pass".to_string());

        let group = &assemble(std::slice::from_ref(&r), &proxy())[0];
        assert_eq!(group.labels["__param_base"], "dXNlcjpwYXNz");
        assert_eq!(group.labels["__param_host"], "db.example.com");
        assert_eq!(group.labels["__param_port"], "443");
        assert_eq!(group.labels["__param_schema"], "https");

        r.target.bearer_token = Some("tok".to_string());
        let group = &assemble(&[r], &proxy())[0];
        assert_eq!(group.labels["__param_bearer"], "tok");
        assert!(!group.labels.contains_key("__param_base"));
    }

    #[test]
    fn test_params_become_param_labels_and_target_overrides_instance() {
        let mut r = record(1, "blackbox:9115");
        r.params.push(KeyValue::new("module", "http_2xx"));
        r.params.push(KeyValue::new("target", "https://example.com"));

        let group = &assemble(&[r], &proxy())[0];
        assert_eq!(group.targets, vec!["blackbox:9115"]);
        assert_eq!(group.labels["__param_module"], "http_2xx");
        assert_eq!(group.labels["instance"], "https://example.com");
    }

    #[test]
    fn test_same_fingerprint_keeps_last_record_whole() {
        let mut first = record(1, "10.0.0.5:9100");
        first.labels.push(KeyValue::new("team", "a"));
        first.labels.push(KeyValue::new("env", "prod"));
        let mut second = record(2, "10.0.0.5:9100");
        second.labels.push(KeyValue::new("team", "b"));
        let other = record(3, "10.0.0.6:9100");

        let groups = assemble(&[first, other, second], &proxy());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].targets, vec!["10.0.0.5:9100"]);
        assert_eq!(groups[0].labels["team"], "b");
        assert!(!groups[0].labels.contains_key("env"));
        assert_eq!(groups[1].targets, vec!["10.0.0.6:9100"]);
    }

    #[test]
    fn test_credentialed_and_plain_rows_never_mix_addressing() {
        let plain = record(1, "10.0.0.5:9100");
        let mut secured = record(2, "10.0.0.5:9100");
        secured.target.scrape_interval_secs = 60;
        secured.target.bearer_token = Some("abc".to_string());

        let group = &assemble(&[plain.clone(), secured.clone()], &proxy())[0];
        assert_eq!(group.targets, vec!["promhub.internal:8080"]);
        assert_eq!(group.labels["__metrics_path__"], "/v1/proxy");
        assert_eq!(group.labels["__param_bearer"], "abc");
        assert_eq!(group.labels["__scrape_interval__"], "60s");

        let group = &assemble(&[secured, plain], &proxy())[0];
        assert_eq!(group.targets, vec!["10.0.0.5:9100"]);
        assert_eq!(group.labels["__metrics_path__"], "/metrics");
        assert!(!group.labels.contains_key("__param_bearer"));
        assert!(!group.labels.contains_key("__param_host"));
    }

    #[test]
    fn test_unique_by_fingerprint_keeps_first() {
        let records = vec![
            record(1, "a:1"),
            record(2, "a:1"),
            record(3, "b:1"),
        ];
        let ids = unique_by_fingerprint(records)
            .iter()
            .map(|r| r.target.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 3]);
    }
}
