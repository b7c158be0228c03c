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

//! The per-tier lifecycle contract. Every tier controller implements this
//! trait; the orchestrator only ever talks to tiers through it.

use crate::reconcile::Error;
use crate::types::v1alpha1::component::Component;
use crate::types::v1alpha1::condition::{Condition, ConditionStatus, ConditionType};
use crate::types::v1alpha1::properties::Properties;
use async_trait::async_trait;
use strum::Display;

/// Lifecycle phase of one tier, carried in its per-cycle result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Display)]
pub enum Phase {
    #[default]
    Pending,
    Deploying,
    Ready,
    Upgrading,
    Destroying,
    Failed,
}

/// The per-cycle result of one tier controller. Produced fresh every
/// reconciliation; the orchestrator folds the condition into the cluster
/// status and hands the properties to the application tier.
#[derive(Clone, Debug)]
pub struct CRStatus {
    pub condition: Condition,
    pub phase: Phase,
    pub properties: Properties,
}

impl CRStatus {
    pub fn new(type_: ConditionType) -> Self {
        Self {
            condition: Condition::new(type_),
            phase: Phase::Pending,
            properties: Properties::new(),
        }
    }

    pub fn for_component(component: Component) -> Self {
        Self::new(component.condition_type())
    }

    pub fn with_status(mut self, status: ConditionStatus) -> Self {
        self.condition.status = status;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.condition.reason = Some(reason.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.condition.message = Some(message.into());
        self
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.condition.status == ConditionStatus::True
    }

    /// Mark the condition failed, carrying the reason and the error text so
    /// the failure is visible on the cluster status.
    pub fn record_failure(&mut self, reason: &str, err: &Error) {
        self.condition.status = ConditionStatus::False;
        self.condition.reason = Some(reason.to_owned());
        self.condition.message = Some(err.to_string());
    }
}

/// Generic lifecycle contract: provision → observe readiness → scale →
/// rolling update. Operations a tier has no use for fall through to a typed
/// `NotImplemented` error instead of panicking.
#[async_trait]
pub trait LifecycleController: Send {
    fn component(&self) -> Component;

    /// The last computed result; the orchestrator reads this after a failed
    /// cycle to record partial progress.
    fn status(&self) -> CRStatus;

    /// Fetch the tier's actual child resource and compute the expected one.
    /// Returns false when the child resource does not exist yet, which is
    /// the only condition that routes to `provision`.
    async fn observe(&mut self) -> Result<bool, Error>;

    async fn provision(&mut self) -> Result<(), Error>;

    async fn readiness(&mut self) -> Result<(), Error>;

    async fn scale_up(&mut self) -> Result<(), Error> {
        Err(Error::NotImplemented {
            component: self.component(),
            op: "scale up",
        })
    }

    async fn scale_down(&mut self) -> Result<(), Error> {
        Err(Error::NotImplemented {
            component: self.component(),
            op: "scale down",
        })
    }

    async fn rolling_upgrade(&mut self) -> Result<(), Error> {
        Err(Error::NotImplemented {
            component: self.component(),
            op: "rolling upgrade",
        })
    }

    async fn delete(&mut self) -> Result<(), Error> {
        Err(Error::NotImplemented {
            component: self.component(),
            op: "delete",
        })
    }

    /// Default sequencing for one cycle. Readiness is only evaluated after
    /// provision has had a chance to create the child resource; the scale
    /// and upgrade steps only run once an expected/actual pair exists.
    async fn reconcile(&mut self) -> Result<CRStatus, Error> {
        if !self.observe().await? {
            self.provision().await?;
            return Ok(self.status());
        }

        self.readiness().await?;
        self.scale_up().await?;
        self.scale_down().await?;
        self.rolling_upgrade().await?;
        Ok(self.status())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    struct Stub {
        observed: bool,
        phase: Phase,
    }

    #[async_trait]
    impl LifecycleController for Stub {
        fn component(&self) -> Component {
            Component::Database
        }

        fn status(&self) -> CRStatus {
            CRStatus::for_component(Component::Database).with_phase(self.phase)
        }

        async fn observe(&mut self) -> Result<bool, Error> {
            Ok(self.observed)
        }

        async fn provision(&mut self) -> Result<(), Error> {
            self.phase = Phase::Deploying;
            Ok(())
        }

        async fn readiness(&mut self) -> Result<(), Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn unimplemented_operations_are_typed_errors() {
        let mut stub = Stub {
            observed: true,
            phase: Phase::Pending,
        };
        match stub.reconcile().await {
            Err(Error::NotImplemented { component, op }) => {
                assert_eq!(component, Component::Database);
                assert_eq!(op, "scale up");
            }
            other => panic!("expected NotImplemented, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn absent_child_resource_routes_to_provision() {
        let mut stub = Stub {
            observed: false,
            phase: Phase::Pending,
        };
        let status = stub.reconcile().await.unwrap();
        assert_eq!(status.phase, Phase::Deploying);
        assert_eq!(status.condition.status, ConditionStatus::Unknown);
    }

    #[test]
    fn recorded_failures_mark_the_condition_false() {
        let mut status = CRStatus::for_component(Component::Cache);
        let err = Error::transient("GetCacheSecretFailed", "secret 'demo-redis' not found");

        status.record_failure("GetCacheSecretFailed", &err);
        assert_eq!(status.condition.status, ConditionStatus::False);
        assert_eq!(
            status.condition.reason.as_deref(),
            Some("GetCacheSecretFailed")
        );
        assert!(
            status
                .condition
                .message
                .as_deref()
                .is_some_and(|m| m.contains("demo-redis"))
        );
        assert!(!status.is_ready());
    }
}
