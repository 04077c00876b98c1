//! Generates the plugin gRPC clients and servers from the message types in
//! `src/protocol.rs`

use tonic_build::manual::{Builder, Method, Service};

const PACKAGE: &str = "porter.plugins.v1";

fn method(name: &str, route: &str, input: &str, output: &str) -> Method {
    Method::builder()
        .name(name)
        .route_name(route)
        .input_type(format!("crate::protocol::{}", input))
        .output_type(format!("crate::protocol::{}", output))
        .codec_path("tonic::codec::ProstCodec")
        .build()
}

fn main() {
    let signing = Service::builder()
        .name("Signing")
        .package(PACKAGE)
        .method(method("sign", "Sign", "SignRequest", "SignResponse"))
        .method(method("verify", "Verify", "VerifyRequest", "VerifyResponse"))
        .build();

    let sbom = Service::builder()
        .name("SbomGenerator")
        .package(PACKAGE)
        .method(method("generate", "Generate", "GenerateRequest", "GenerateResponse"))
        .build();

    let controller = Service::builder()
        .name("Controller")
        .package(PACKAGE)
        .method(method("shutdown", "Shutdown", "ShutdownRequest", "ShutdownResponse"))
        .build();

    Builder::new().compile(&[signing, sbom, controller]);
    println!("cargo:rerun-if-changed=build.rs");
}
