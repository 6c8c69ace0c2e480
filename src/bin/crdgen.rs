use kube::CustomResourceExt;
use turngate::crd::{Dataplane, Gateway, GatewayClass, GatewayConfig, StaticService, UDPRoute};

fn main() {
    let crds = [
        serde_yaml::to_string(&GatewayClass::crd()),
        serde_yaml::to_string(&GatewayConfig::crd()),
        serde_yaml::to_string(&Gateway::crd()),
        serde_yaml::to_string(&UDPRoute::crd()),
        serde_yaml::to_string(&StaticService::crd()),
        serde_yaml::to_string(&Dataplane::crd()),
    ];
    for crd in crds {
        println!("---");
        print!("{}", crd.unwrap());
    }
}
