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

//! Expected/actual comparison for child resources. Each tier's child CR
//! exposes its sizing through [`ChildSpec`] so the scale and upgrade checks
//! are written once.

use crate::types::v1alpha1::minio::MinIOInstance;
use crate::types::v1alpha1::postgresql::Postgresql;
use crate::types::v1alpha1::redis_failover::RedisFailover;
use k8s_openapi::api::core::v1 as corev1;
use kube::Resource;

pub trait ChildSpec {
    fn replicas(&self) -> i32;

    fn resources(&self) -> Option<&corev1::ResourceRequirements>;
}

impl ChildSpec for RedisFailover {
    fn replicas(&self) -> i32 {
        self.spec.redis.replicas
    }

    fn resources(&self) -> Option<&corev1::ResourceRequirements> {
        self.spec.redis.resources.as_ref()
    }
}

impl ChildSpec for Postgresql {
    fn replicas(&self) -> i32 {
        self.spec.number_of_instances
    }

    fn resources(&self) -> Option<&corev1::ResourceRequirements> {
        self.spec.resources.as_ref()
    }
}

impl ChildSpec for MinIOInstance {
    fn replicas(&self) -> i32 {
        self.spec.replicas
    }

    fn resources(&self) -> Option<&corev1::ResourceRequirements> {
        self.spec.resources.as_ref()
    }
}

pub fn replicas_differ<T: ChildSpec>(expected: &T, actual: &T) -> bool {
    expected.replicas() != actual.replicas()
}

pub fn resources_differ<T: ChildSpec>(expected: &T, actual: &T) -> bool {
    expected.resources() != actual.resources()
}

/// Carry the actual resource's version token onto the expected one so a full
/// replace fails on a concurrent write instead of clobbering it.
pub fn inherit_resource_version<T>(expected: &mut T, actual: &T)
where
    T: Resource,
{
    expected.meta_mut().resource_version = actual.meta().resource_version.clone();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::create_failover;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    #[test]
    fn replica_counts_drive_scaling() {
        let expected = create_failover("cache", 5);
        let actual = create_failover("cache", 3);
        assert!(replicas_differ(&expected, &actual));
        assert!(!replicas_differ(&actual, &actual));
    }

    #[test]
    fn resource_requirements_drive_upgrades() {
        let mut expected = create_failover("cache", 3);
        let actual = create_failover("cache", 3);
        assert!(!resources_differ(&expected, &actual));

        expected.spec.redis.resources = Some(corev1::ResourceRequirements {
            limits: Some(
                [("memory".to_owned(), Quantity("1Gi".to_owned()))]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        });
        assert!(resources_differ(&expected, &actual));
    }

    #[test]
    fn replace_carries_the_actual_version_token() {
        let mut expected = create_failover("cache", 5);
        let mut actual = create_failover("cache", 3);
        actual.meta_mut().resource_version = Some("41".to_owned());

        inherit_resource_version(&mut expected, &actual);
        assert_eq!(expected.meta().resource_version.as_deref(), Some("41"));
        assert_eq!(expected.spec.redis.replicas, 5);
    }
}
