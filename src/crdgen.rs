//! # CRD Generator
//!
//! Prints the `ApplicationGateway` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/applicationgateway.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use app_gateway_operator::crd::ApplicationGateway;
use kube::core::CustomResourceExt;

fn main() {
    let crd = ApplicationGateway::crd();

    match serde_yaml::to_string(&crd) {
        Ok(yaml) => print!("{yaml}"),
        Err(e) => {
            eprintln!("Failed to serialize CRD to YAML: {e}");
            std::process::exit(1);
        }
    }
}
