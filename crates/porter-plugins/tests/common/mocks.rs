//! Mocks for trait seams

use async_trait::async_trait;
use mockall::mock;
use porter_plugins::{SbomConnector, SbomGeneratorProtocol, SigningConnector, SigningProtocol};

mock! {
    pub SigningPlugin {}

    #[async_trait]
    impl SigningProtocol for SigningPlugin {
        async fn sign(&mut self, reference: &str) -> porter_plugins::Result<()>;
        async fn verify(&mut self, reference: &str) -> porter_plugins::Result<()>;
        async fn close(&mut self) -> porter_plugins::Result<()>;
    }
}

mock! {
    pub SignerSource {}

    #[async_trait]
    impl SigningConnector for SignerSource {
        async fn connect_signer(&self) -> anyhow::Result<Box<dyn SigningProtocol>>;
    }
}

mock! {
    pub SbomPlugin {}

    #[async_trait]
    impl SbomGeneratorProtocol for SbomPlugin {
        async fn generate(
            &mut self,
            reference: &str,
            sbom_path: &str,
            insecure_registry: bool,
        ) -> porter_plugins::Result<()>;
        async fn close(&mut self) -> porter_plugins::Result<()>;
    }
}

mock! {
    pub SbomSource {}

    #[async_trait]
    impl SbomConnector for SbomSource {
        async fn connect_sbom_generator(&self) -> anyhow::Result<Box<dyn SbomGeneratorProtocol>>;
    }
}

/// Connector handing out `plugin` exactly once
pub fn signing_connector(plugin: MockSigningPlugin) -> MockSignerSource {
    let mut connector = MockSignerSource::new();
    connector
        .expect_connect_signer()
        .times(1)
        .return_once(move || Ok(Box::new(plugin) as Box<dyn SigningProtocol>));
    connector
}

pub fn sbom_connector(plugin: MockSbomPlugin) -> MockSbomSource {
    let mut connector = MockSbomSource::new();
    connector
        .expect_connect_sbom_generator()
        .times(1)
        .return_once(move || Ok(Box::new(plugin) as Box<dyn SbomGeneratorProtocol>));
    connector
}
