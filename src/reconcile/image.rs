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

//! Component image resolution. All application-tier images derive from the
//! cluster's declared version plus an optional private registry prefix.

use crate::reconcile::Error;
use crate::types::v1alpha1::registry_cluster::RegistryCluster;

/// Application versions this operator knows how to deploy.
pub const SUPPORTED_VERSIONS: &[&str] = &["1.10.0"];

/// Resolves component image references for one cluster.
#[derive(Clone, Debug)]
pub struct ImageLocator {
    registry: Option<String>,
    version: String,
}

impl ImageLocator {
    pub fn new(cluster: &RegistryCluster) -> Result<Self, Error> {
        let version = cluster.spec.version.clone();
        if !SUPPORTED_VERSIONS.contains(&version.as_str()) {
            return Err(Error::Config {
                message: format!(
                    "unsupported application version '{version}', supported: {SUPPORTED_VERSIONS:?}"
                ),
            });
        }

        let registry = cluster
            .spec
            .image_source
            .as_ref()
            .map(|source| source.registry.trim_end_matches('/').to_owned());

        Ok(Self { registry, version })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    fn image(&self, repository: &str) -> String {
        match &self.registry {
            Some(registry) => format!("{registry}/{repository}:v{}", self.version),
            None => format!("{repository}:v{}", self.version),
        }
    }

    pub fn core_image(&self) -> String {
        self.image("registryhq/registry-core")
    }

    pub fn portal_image(&self) -> String {
        self.image("registryhq/registry-portal")
    }

    pub fn registry_image(&self) -> String {
        self.image("registryhq/registry-registryctl")
    }

    pub fn jobservice_image(&self) -> String {
        self.image("registryhq/registry-jobservice")
    }

    pub fn chartmuseum_image(&self) -> String {
        self.image("registryhq/chartmuseum-photon")
    }

    pub fn clair_image(&self) -> String {
        self.image("registryhq/clair-photon")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::tests::create_test_cluster;
    use crate::types::v1alpha1::registry_cluster::ImageSource;

    #[test]
    fn unsupported_versions_are_rejected() {
        let mut cluster = create_test_cluster();
        cluster.spec.version = "0.0.1".to_owned();
        match ImageLocator::new(&cluster) {
            Err(Error::Config { message }) => assert!(message.contains("0.0.1")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn images_default_to_the_public_repositories() {
        let cluster = create_test_cluster();
        let locator = ImageLocator::new(&cluster).unwrap();
        assert_eq!(locator.core_image(), "registryhq/registry-core:v1.10.0");
        assert_eq!(locator.clair_image(), "registryhq/clair-photon:v1.10.0");
    }

    #[test]
    fn a_private_registry_prefixes_every_image() {
        let mut cluster = create_test_cluster();
        cluster.spec.image_source = Some(ImageSource {
            registry: "mirror.internal:5000/".to_owned(),
            image_pull_secret: Some("pull-creds".to_owned()),
        });

        let locator = ImageLocator::new(&cluster).unwrap();
        assert_eq!(
            locator.portal_image(),
            "mirror.internal:5000/registryhq/registry-portal:v1.10.0"
        );
    }
}
