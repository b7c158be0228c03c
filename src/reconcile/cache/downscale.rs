// Copyright 2025 The Registry Cluster Operator Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Master-safety checks for cache downscaling, kept free of I/O. The
//! lifecycle shell feeds these observed pods and roles and acts on the
//! returned decision.
//!
//! A scale-down removes the statefulset's highest ordinals. Shrinking while
//! one of those ordinals holds the master role would drop writes, so the
//! resize is deferred behind a manual failover until the master lives on a
//! surviving ordinal.

use crate::reconcile::Error;
use crate::reconcile::cache::SERVER_PREFIX;
use crate::reconcile::cache::redis::RedisAdmin;
use crate::types::v1alpha1::redis_failover::RedisFailover;
use k8s_openapi::api::core::v1 as corev1;
use kube::ResourceExt;

/// Stable pod name for a server ordinal, following the failover operator's
/// statefulset naming.
pub fn pod_name(cluster: &str, ordinal: i32) -> String {
    format!("{SERVER_PREFIX}-{cluster}-{ordinal}")
}

/// Names of the server pods a resize from `actual` down to `expected` would
/// remove, highest ordinal first. None when no downscale is requested.
pub fn leaving_node_names(expected: &RedisFailover, actual: &RedisFailover) -> Option<Vec<String>> {
    let target = expected.spec.redis.replicas;
    let initial = actual.spec.redis.replicas;
    if target >= initial {
        return None;
    }

    let cluster = kube::ResourceExt::name_any(actual);
    Some(
        (target..initial)
            .rev()
            .map(|ordinal| pod_name(&cluster, ordinal))
            .collect(),
    )
}

/// Split observed pods into those already terminating and those still
/// current. Terminating pods belong to an earlier resize and must not be
/// consulted for roles.
pub fn partition_pods(pods: &[corev1::Pod]) -> (Vec<&corev1::Pod>, Vec<&corev1::Pod>) {
    pods.iter()
        .partition(|pod| pod.metadata.deletion_timestamp.is_some())
}

/// Query the master role of each current pod through the protocol seam.
/// Pods without an assigned address are skipped, they cannot hold traffic
/// yet.
pub async fn observe_masters(
    admin: &dyn RedisAdmin,
    pods: &[&corev1::Pod],
    password: Option<&str>,
) -> Result<Vec<String>, Error> {
    let mut masters = Vec::new();
    for pod in pods {
        let Some(ip) = pod.status.as_ref().and_then(|s| s.pod_ip.as_deref()) else {
            continue;
        };
        if admin.role_is_master(ip, password).await? {
            masters.push(pod.name_any());
        }
    }
    Ok(masters)
}

pub fn intersect(left: &[String], right: &[String]) -> Vec<String> {
    left.iter()
        .filter(|name| right.contains(name))
        .cloned()
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownscaleDecision {
    /// No leaving node holds the master role; the resize may proceed.
    Safe,
    /// The master lives on a leaving node; fail over first and re-evaluate
    /// next cycle.
    FailoverRequired,
    /// More than one server claims the master role. Resizing under split
    /// brain risks data loss, so the tier is parked until an operator
    /// intervenes.
    SplitBrain,
}

/// Decide whether the resize is safe given the leaving pod names and the
/// pods currently reporting the master role.
pub fn evaluate(leaving: &[String], masters: &[String]) -> DownscaleDecision {
    if masters.len() > 1 {
        return DownscaleDecision::SplitBrain;
    }
    if intersect(leaving, masters).is_empty() {
        DownscaleDecision::Safe
    } else {
        DownscaleDecision::FailoverRequired
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::reconcile::cache::redis::RedisConnect;
    use crate::tests::create_failover;
    use async_trait::async_trait;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
    use std::collections::BTreeSet;

    fn pod(name: &str, deleting: bool) -> corev1::Pod {
        corev1::Pod {
            metadata: metav1::ObjectMeta {
                name: Some(name.to_owned()),
                deletion_timestamp: deleting
                    .then(|| metav1::Time(chrono::Utc::now())),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn running_pod(name: &str, ip: &str) -> corev1::Pod {
        let mut pod = pod(name, false);
        pod.status = Some(corev1::PodStatus {
            pod_ip: Some(ip.to_owned()),
            ..Default::default()
        });
        pod
    }

    /// Answers role queries from a fixed set of master addresses.
    struct FakeRedisAdmin {
        masters: BTreeSet<String>,
    }

    #[async_trait]
    impl RedisAdmin for FakeRedisAdmin {
        async fn ping(&self, _connect: &RedisConnect) -> Result<(), Error> {
            Ok(())
        }

        async fn role_is_master(&self, ip: &str, _password: Option<&str>) -> Result<bool, Error> {
            Ok(self.masters.contains(ip))
        }

        async fn force_failover(&self, _endpoint: &str) -> Result<(), Error> {
            Ok(())
        }
    }

    #[test]
    fn leaving_nodes_are_the_highest_ordinals() {
        let expected = create_failover("demo", 2);
        let actual = create_failover("demo", 5);
        assert_eq!(
            leaving_node_names(&expected, &actual).unwrap(),
            vec!["rfr-demo-4", "rfr-demo-3", "rfr-demo-2"]
        );
    }

    #[test]
    fn no_leaving_nodes_without_a_downscale() {
        let expected = create_failover("demo", 5);
        let actual = create_failover("demo", 3);
        assert!(leaving_node_names(&expected, &actual).is_none());

        let same = create_failover("demo", 3);
        assert!(leaving_node_names(&same, &actual).is_none());
    }

    #[test]
    fn terminating_pods_are_set_aside() {
        let pods = vec![
            pod("rfr-demo-0", false),
            pod("rfr-demo-1", true),
            pod("rfr-demo-2", false),
        ];
        let (deleting, current) = partition_pods(&pods);
        assert_eq!(deleting.len(), 1);
        assert_eq!(current.len(), 2);
        assert_eq!(
            deleting[0].metadata.name.as_deref(),
            Some("rfr-demo-1")
        );
    }

    #[test]
    fn a_master_on_a_leaving_node_requires_failover() {
        let leaving = vec!["rfr-demo-4".to_owned(), "rfr-demo-3".to_owned()];
        let masters = vec!["rfr-demo-4".to_owned()];
        assert_eq!(
            evaluate(&leaving, &masters),
            DownscaleDecision::FailoverRequired
        );
    }

    #[test]
    fn a_master_on_a_surviving_node_is_safe() {
        let leaving = vec!["rfr-demo-4".to_owned(), "rfr-demo-3".to_owned()];
        let masters = vec!["rfr-demo-1".to_owned()];
        assert_eq!(evaluate(&leaving, &masters), DownscaleDecision::Safe);
    }

    #[test]
    fn dual_masters_park_the_resize() {
        let leaving = vec!["rfr-demo-4".to_owned()];
        let masters = vec!["rfr-demo-0".to_owned(), "rfr-demo-4".to_owned()];
        assert_eq!(evaluate(&leaving, &masters), DownscaleDecision::SplitBrain);
    }

    #[tokio::test]
    async fn masters_are_observed_through_the_protocol_seam() {
        let admin = FakeRedisAdmin {
            masters: ["10.0.0.4".to_owned()].into_iter().collect(),
        };
        let pods = vec![
            running_pod("rfr-demo-0", "10.0.0.1"),
            running_pod("rfr-demo-4", "10.0.0.4"),
            pod("rfr-demo-2", false), // no address yet, skipped
        ];
        let refs: Vec<&corev1::Pod> = pods.iter().collect();

        let masters = observe_masters(&admin, &refs, None).await.unwrap();
        assert_eq!(masters, vec!["rfr-demo-4"]);

        let leaving = vec!["rfr-demo-4".to_owned()];
        assert_eq!(
            evaluate(&leaving, &masters),
            DownscaleDecision::FailoverRequired
        );
    }

    // The full two-cycle story: failover moves the master off the leaving
    // ordinal, then the next evaluation clears the resize.
    #[test]
    fn failover_then_safe_across_cycles() {
        let expected = create_failover("demo", 2);
        let actual = create_failover("demo", 5);
        let leaving = leaving_node_names(&expected, &actual).unwrap();

        let before = vec![pod_name("demo", 4)];
        assert_eq!(
            evaluate(&leaving, &before),
            DownscaleDecision::FailoverRequired
        );

        let after = vec![pod_name("demo", 1)];
        assert_eq!(evaluate(&leaving, &after), DownscaleDecision::Safe);
    }
}
