//! # CRD Generator
//!
//! Generates the Kubernetes CustomResourceDefinition YAML of all GrowthBook
//! kinds from the Rust type definitions.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/growthbook.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```
//!
//! The generated CRDs include:
//! - OpenAPI schema validation
//! - Default values
//! - Status subresource (Instance only)

use growthbook_controller::crd::{
    GrowthbookClient, GrowthbookFeature, GrowthbookInstance, GrowthbookOrganization,
    GrowthbookUser,
};
use kube::core::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    let crds = [
        GrowthbookInstance::crd(),
        GrowthbookOrganization::crd(),
        GrowthbookUser::crd(),
        GrowthbookFeature::crd(),
        GrowthbookClient::crd(),
    ];

    let documents = crds
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    print!("{}", documents.join("---\n"));
    Ok(())
}
