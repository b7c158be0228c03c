//  Copyright 2025 The Registry Cluster Operator Authors
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//      http:www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;

use crate::types::v1alpha1::redis_failover::{
    RedisFailover, RedisFailoverSpec, RedisSettings, SentinelSettings,
};
use crate::types::v1alpha1::registry_cluster::{
    CacheSpec, DatabaseSpec, RegistryCluster, RegistryClusterSpec, ServerSpec, StorageSpec,
};

// Helper function to create a test cluster (available to submodule tests via
// crate::tests)
pub fn create_test_cluster() -> RegistryCluster {
    let server = ServerSpec {
        replicas: 3,
        resources: None,
        storage_size: Some("10Gi".to_string()),
    };

    RegistryCluster {
        metadata: metav1::ObjectMeta {
            name: Some("test-cluster".to_string()),
            namespace: Some("default".to_string()),
            uid: Some("test-uid-123".to_string()),
            ..Default::default()
        },
        spec: RegistryClusterSpec {
            version: "1.10.0".to_string(),
            public_url: "https://registry.example.com".to_string(),
            replicas: 1,
            cache: CacheSpec {
                server: Some(server.clone()),
                ..Default::default()
            },
            database: DatabaseSpec {
                server: Some(server.clone()),
                ..Default::default()
            },
            storage: StorageSpec {
                server: Some(server),
                ..Default::default()
            },
            ..Default::default()
        },
        status: None,
    }
}

pub fn create_failover(name: &str, replicas: i32) -> RedisFailover {
    RedisFailover {
        metadata: metav1::ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: RedisFailoverSpec {
            redis: RedisSettings {
                replicas,
                resources: None,
            },
            sentinel: SentinelSettings {
                replicas: 3,
                resources: None,
            },
            auth: None,
        },
    }
}
