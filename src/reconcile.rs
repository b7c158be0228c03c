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

//! Cluster reconciliation. Each cycle runs the three dependency tiers,
//! records whatever progress they made, and only drives the application
//! tier once all of them report ready. A failing tier never aborts the
//! cycle for its siblings.

pub mod application;
pub mod cache;
pub mod database;
pub mod diff;
pub mod image;
pub mod lcm;
pub mod storage;

use crate::context::Context;
use crate::reconcile::application::ApplicationLifecycle;
use crate::reconcile::cache::CacheLifecycle;
use crate::reconcile::cache::redis::RedisCli;
use crate::reconcile::database::DatabaseLifecycle;
use crate::reconcile::lcm::{CRStatus, LifecycleController, Phase};
use crate::reconcile::storage::StorageLifecycle;
use crate::types;
use crate::types::v1alpha1::component::Component;
use crate::types::v1alpha1::condition::{self, Condition};
use crate::types::v1alpha1::registry_cluster::RegistryCluster;
use kube::Resource;
use kube::runtime::controller::Action;
use rand::Rng;
use rand::distributions::Alphanumeric;
use snafu::Snafu;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_REQUEUE: Duration = Duration::from_secs(10);
const FATAL_REQUEUE: Duration = Duration::from_secs(30);

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(transparent)]
    Context { source: crate::context::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },

    #[snafu(transparent)]
    Protocol { source: redis::RedisError },

    /// Expected churn while the system converges; retried on the normal
    /// cadence.
    #[snafu(display("{reason}: {message}"))]
    Transient { reason: &'static str, message: String },

    /// Requires operator intervention; retried slowly so the condition
    /// stays visible without hammering the API server.
    #[snafu(display("{reason}: {message}"))]
    Fatal { reason: &'static str, message: String },

    #[snafu(display("configuration error: {message}"))]
    Config { message: String },

    #[snafu(display("operation '{op}' is not supported for the {component} tier"))]
    NotImplemented {
        component: Component,
        op: &'static str,
    },
}

impl Error {
    pub fn transient(reason: &'static str, message: impl Into<String>) -> Self {
        Error::Transient {
            reason,
            message: message.into(),
        }
    }

    pub fn fatal(reason: &'static str, message: impl Into<String>) -> Self {
        Error::Fatal {
            reason,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        !matches!(self, Error::Fatal { .. } | Error::Config { .. })
    }

    pub fn requeue_after(&self) -> Duration {
        if self.is_transient() {
            DEFAULT_REQUEUE
        } else {
            FATAL_REQUEUE
        }
    }
}

/// Random credential for generated secrets.
pub(crate) fn generated_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

pub async fn reconcile_cluster(
    object: Arc<RegistryCluster>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let namespace = object.namespace()?;
    let name = object.name();

    // Work from the latest revision, the watch event may be stale.
    let cluster = match ctx.get::<RegistryCluster>(&name, &namespace).await {
        Ok(cluster) => cluster,
        Err(err) if err.is_not_found() => return Ok(Action::await_change()),
        Err(err) => return Err(err.into()),
    };

    // Child resources and generated secrets are owner-referenced, platform
    // garbage collection tears them down with the cluster.
    if cluster.meta().deletion_timestamp.is_some() {
        info!(%name, "cluster is terminating");
        return Ok(Action::await_change());
    }

    let admin = RedisCli;
    let mut statuses: BTreeMap<Component, CRStatus> = BTreeMap::new();
    let mut first_err: Option<Error> = None;

    {
        let mut tier = CacheLifecycle::new(&cluster, &ctx, &admin)?;
        run_tier(&mut tier, &mut statuses, &mut first_err).await;
    }
    {
        let mut tier = DatabaseLifecycle::new(&cluster, &ctx)?;
        run_tier(&mut tier, &mut statuses, &mut first_err).await;
    }
    {
        let mut tier = StorageLifecycle::new(&cluster, &ctx)?;
        run_tier(&mut tier, &mut statuses, &mut first_err).await;
    }

    if first_err.is_none() && dependencies_ready(&statuses) {
        let dependencies = statuses.clone();
        // A constructor failure (an unsupported version, for one) still has
        // to land on the cluster conditions, so it is recorded like any
        // other tier failure instead of aborting the cycle here.
        match ApplicationLifecycle::new(&cluster, &ctx, &dependencies) {
            Ok(mut tier) => run_tier(&mut tier, &mut statuses, &mut first_err).await,
            Err(err) => {
                warn!(error = %err, "application tier could not be constructed");
                statuses.insert(
                    Component::Application,
                    invalid_tier_status(
                        Component::Application,
                        application::reason::CONFIG_INVALID,
                        &err,
                    ),
                );
                first_err.get_or_insert(err);
            }
        }
    }

    let mut conditions = cluster
        .status
        .as_ref()
        .map(|status| status.conditions.clone())
        .unwrap_or_default();
    fold_conditions(&mut conditions, &statuses);
    ctx.update_conditions(&cluster, &conditions).await?;

    match first_err {
        Some(err) => Err(err),
        None => Ok(Action::requeue(DEFAULT_REQUEUE)),
    }
}

/// Run one tier and record its result. On failure the tier's partial status
/// is still recorded and the first error of the cycle is kept for the
/// requeue decision.
async fn run_tier<T: LifecycleController>(
    tier: &mut T,
    statuses: &mut BTreeMap<Component, CRStatus>,
    first_err: &mut Option<Error>,
) {
    let component = tier.component();
    let status = match tier.reconcile().await {
        Ok(status) => status,
        Err(err) => {
            warn!(%component, error = %err, "tier reconciliation incomplete");
            let status = tier.status();
            first_err.get_or_insert(err);
            status
        }
    };
    statuses.insert(component, status);
}

/// Status recorded for a tier that could not even be constructed. The
/// failure is parked on its condition so the status surface shows it.
fn invalid_tier_status(component: Component, reason: &str, err: &Error) -> CRStatus {
    let mut status = CRStatus::for_component(component).with_phase(Phase::Failed);
    status.record_failure(reason, err);
    status
}

fn dependencies_ready(statuses: &BTreeMap<Component, CRStatus>) -> bool {
    [Component::Cache, Component::Database, Component::Storage]
        .iter()
        .all(|component| statuses.get(component).is_some_and(CRStatus::is_ready))
}

fn fold_conditions(conditions: &mut Vec<Condition>, statuses: &BTreeMap<Component, CRStatus>) {
    for status in statuses.values() {
        condition::upsert(conditions, status.condition.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::v1alpha1::condition::{ConditionStatus, ConditionType};

    fn ready(type_: ConditionType) -> CRStatus {
        CRStatus::new(type_).with_status(ConditionStatus::True)
    }

    #[test]
    fn the_application_tier_waits_for_all_dependencies() {
        let mut statuses = BTreeMap::new();
        statuses.insert(Component::Cache, ready(ConditionType::CacheReady));
        statuses.insert(Component::Database, ready(ConditionType::DatabaseReady));
        assert!(!dependencies_ready(&statuses));

        statuses.insert(
            Component::Storage,
            CRStatus::new(ConditionType::StorageReady),
        );
        assert!(!dependencies_ready(&statuses));

        statuses.insert(Component::Storage, ready(ConditionType::StorageReady));
        assert!(dependencies_ready(&statuses));
    }

    #[test]
    fn folding_statuses_yields_one_condition_per_type() {
        let mut statuses = BTreeMap::new();
        statuses.insert(Component::Cache, ready(ConditionType::CacheReady));
        statuses.insert(Component::Database, ready(ConditionType::DatabaseReady));

        let mut conditions = Vec::new();
        fold_conditions(&mut conditions, &statuses);
        assert_eq!(conditions.len(), 2);

        // A second fold with identical statuses changes nothing.
        let before = conditions.clone();
        fold_conditions(&mut conditions, &statuses);
        assert_eq!(conditions.len(), 2);
        for (folded, original) in conditions.iter().zip(&before) {
            assert!(folded.same_state(original));
        }
    }

    #[test]
    fn an_invalid_application_config_still_lands_on_the_conditions() {
        let err = Error::Config {
            message: "unsupported application version '2.0.0'".to_owned(),
        };
        let mut statuses = BTreeMap::new();
        statuses.insert(
            Component::Application,
            invalid_tier_status(
                Component::Application,
                application::reason::CONFIG_INVALID,
                &err,
            ),
        );

        let mut conditions = Vec::new();
        fold_conditions(&mut conditions, &statuses);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].type_, ConditionType::ServiceReady);
        assert_eq!(conditions[0].status, ConditionStatus::False);
        assert_eq!(
            conditions[0].reason.as_deref(),
            Some(application::reason::CONFIG_INVALID)
        );
        assert!(
            conditions[0]
                .message
                .as_deref()
                .is_some_and(|m| m.contains("2.0.0"))
        );
    }

    #[test]
    fn transient_and_fatal_errors_requeue_differently() {
        let transient = Error::transient("CachePodsPending", "still starting");
        let fatal = Error::fatal("DualMasterDetected", "two masters");
        assert!(transient.is_transient());
        assert!(!fatal.is_transient());
        assert!(transient.requeue_after() < fatal.requeue_after());
    }

    #[test]
    fn generated_passwords_are_alphanumeric() {
        let password = generated_password();
        assert_eq!(password.len(), 16);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
