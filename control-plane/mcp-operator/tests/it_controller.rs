// Integration tests require a running Kubernetes cluster with the MCPServer
// CRD installed (`cargo run --bin crdgen | kubectl apply -f -`). These tests
// are ignored by default.

use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::{
    Client,
    api::{Api, DeleteParams, PostParams},
};
use mcp_operator::config::OperatorConfig;
use mcp_operator::crd::{
    ConditionStatus, ConditionType, McpServer, McpServerDeployment,
    McpServerSpec, TransportType,
};

fn uniq(prefix: &str) -> String {
    format!("{prefix}-{}", chrono::Utc::now().timestamp_micros() % 1_000_000)
}

fn stdio_server(name: &str) -> McpServer {
    McpServer::new(
        name,
        McpServerSpec {
            deployment: McpServerDeployment {
                image: Some("node:22-alpine".into()),
                cmd: Some("npx".into()),
                args: vec![
                    "-y".into(),
                    "@modelcontextprotocol/server-everything".into(),
                ],
                ..Default::default()
            },
            transport_type: Some(TransportType::Stdio),
            ..Default::default()
        },
    )
}

async fn condition_status(
    api: &Api<McpServer>,
    name: &str,
    t: ConditionType,
) -> Option<ConditionStatus> {
    let obj = api.get_opt(name).await.ok()??;
    obj.status?
        .conditions
        .into_iter()
        .find(|c| c.type_ == t)
        .map(|c| c.status)
}

#[test_log::test(tokio::test)]
#[ignore]
async fn controller_programs_stdio_server() {
    let client = Client::try_default().await.expect("kube client");
    let ns = "default";
    let name = uniq("mcp-it-stdio");

    let api: Api<McpServer> = Api::namespaced(client.clone(), ns);
    api.create(&PostParams::default(), &stdio_server(&name))
        .await
        .expect("create MCPServer");

    let client_for_ctrl = client.clone();
    let ctrl = tokio::spawn(async move {
        let _ = mcp_operator::controller::run_controller(
            client_for_ctrl,
            OperatorConfig::default(),
        )
        .await;
    });

    let dep_api: Api<Deployment> = Api::namespaced(client.clone(), ns);
    let cm_api: Api<ConfigMap> = Api::namespaced(client.clone(), ns);
    let svc_api: Api<Service> = Api::namespaced(client.clone(), ns);

    let mut programmed = false;
    for _ in 0..30 {
        if condition_status(&api, &name, ConditionType::Programmed).await
            == Some(ConditionStatus::True)
        {
            programmed = true;
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    assert!(programmed, "MCPServer {ns}/{name} never became Programmed");

    assert!(dep_api.get_opt(&name).await.unwrap().is_some());
    assert!(
        cm_api
            .get_opt(&format!("{name}-adapter"))
            .await
            .unwrap()
            .is_some()
    );
    // stdio never exposes a Service
    assert!(svc_api.get_opt(&name).await.unwrap().is_none());

    ctrl.abort();
    let _ = api.delete(&name, &DeleteParams::default()).await;
}

#[test_log::test(tokio::test)]
#[ignore]
async fn controller_reports_missing_secret() {
    let client = Client::try_default().await.expect("kube client");
    let ns = "default";
    let name = uniq("mcp-it-refs");

    let mut server = stdio_server(&name);
    server.spec.deployment.secret_refs = vec![mcp_operator::crd::ObjectRef {
        name: format!("{name}-does-not-exist"),
    }];
    let api: Api<McpServer> = Api::namespaced(client.clone(), ns);
    api.create(&PostParams::default(), &server)
        .await
        .expect("create MCPServer");

    let client_for_ctrl = client.clone();
    let ctrl = tokio::spawn(async move {
        let _ = mcp_operator::controller::run_controller(
            client_for_ctrl,
            OperatorConfig::default(),
        )
        .await;
    });

    let mut unresolved = false;
    for _ in 0..30 {
        if condition_status(&api, &name, ConditionType::ResolvedRefs).await
            == Some(ConditionStatus::False)
        {
            unresolved = true;
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    assert!(unresolved, "missing secret was not reported");

    // objects are withheld while references are unresolved
    let dep_api: Api<Deployment> = Api::namespaced(client.clone(), ns);
    assert!(dep_api.get_opt(&name).await.unwrap().is_none());

    ctrl.abort();
    let _ = api.delete(&name, &DeleteParams::default()).await;
}
