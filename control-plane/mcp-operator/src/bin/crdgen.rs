use kube::core::CustomResourceExt;
use mcp_operator::crd::McpServer;

fn main() {
    let crd = McpServer::crd();
    let yaml = serde_yaml::to_string(&crd).expect("serialize CRD to YAML");
    println!("{}", yaml);
}
