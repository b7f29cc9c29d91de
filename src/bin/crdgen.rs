//! Print the AutoResizePolicy CustomResourceDefinition as YAML
//!
//! ```text
//! cargo run --bin crdgen > config/crd/autoresizepolicy.yaml
//! ```

use kube::CustomResourceExt;
use pvc_autoresizer_operator::AutoResizePolicy;

fn main() -> anyhow::Result<()> {
    let crd = serde_yaml::to_string(&AutoResizePolicy::crd())?;
    print!("{}", crd);
    Ok(())
}
