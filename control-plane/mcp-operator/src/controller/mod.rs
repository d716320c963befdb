use std::sync::Arc;

use futures_util::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceAccount};
use kube::runtime::controller::Action;
use kube::runtime::events::{Recorder, Reporter};
use kube::runtime::{Controller, watcher::Config};
use kube::{Api, Client};
use tokio::time::Duration;
use tracing::{error, info, warn};

use crate::config::OperatorConfig;
use crate::crd::McpServer;
use crate::translator::Translator;

pub mod apply;
pub mod events;
pub mod observe;
pub mod reconcile;

pub use reconcile::reconcile;

/// SSA field manager and event reporting component.
pub const FIELD_MANAGER: &str = "mcp-operator";

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    #[error("kube api error: {0}")]
    Kube(#[from] kube::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Clone)]
pub struct ControllerContext {
    pub client: Client,
    pub translator: Translator,
    pub cfg: OperatorConfig,
    pub event_recorder: Recorder,
}

impl ControllerContext {
    pub fn new(
        client: Client,
        cfg: OperatorConfig,
    ) -> Result<Self, crate::config::ConfigError> {
        let translator = Translator::new(cfg.translator_defaults()?);
        let event_recorder = Recorder::new(
            client.clone(),
            Reporter {
                controller: FIELD_MANAGER.to_string(),
                instance: None,
            },
        );
        Ok(Self {
            client,
            translator,
            cfg,
            event_recorder,
        })
    }

    fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + serde::de::DeserializeOwned
            + std::fmt::Debug,
        <K as kube::Resource>::DynamicType: Default,
    {
        match self.cfg.namespace() {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    pub fn requeue(&self) -> Duration {
        Duration::from_secs(self.cfg.requeue_secs.max(1))
    }
}

pub async fn run_controller(
    client: Client,
    cfg: OperatorConfig,
) -> anyhow::Result<()> {
    let ctx = Arc::new(ControllerContext::new(client, cfg)?);
    info!(
        namespace = ctx.cfg.namespace().unwrap_or("<all>"),
        defaults = ?ctx.translator.defaults(),
        "starting MCPServer controller"
    );

    let servers: Api<McpServer> = ctx.api();
    Controller::new(servers, Config::default())
        .owns(ctx.api::<Deployment>(), Config::default())
        .owns(ctx.api::<Service>(), Config::default())
        .owns(ctx.api::<ConfigMap>(), Config::default())
        .owns(ctx.api::<ServiceAccount>(), Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx.clone())
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, action)) => {
                    info!(name = %obj_ref.name, "reconciled: requeue={:?}", action)
                }
                Err(e) => error!(error = ?e, "reconcile error"),
            }
        })
        .await;

    Ok(())
}

pub fn error_policy(
    obj: Arc<McpServer>,
    err: &ReconcileErr,
    ctx: Arc<ControllerContext>,
) -> Action {
    use kube::ResourceExt;
    warn!(name = %obj.name_any(), error = %err, "reconcile failed; requeueing");
    Action::requeue(ctx.requeue())
}
