//! Prints the VirtualRobot CustomResourceDefinition as YAML.
//!
//! ```sh
//! cargo run -p crds --bin crdgen > config/crd/virtualrobot.yaml
//! ```

use crds::VirtualRobot;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&VirtualRobot::crd())?);
    Ok(())
}
