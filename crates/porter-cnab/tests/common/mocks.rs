//! Mocks for trait seams

use async_trait::async_trait;
use mockall::mock;
use porter_cnab::TagLister;
use porter_core::OciReference;

mock! {
    pub Registry {}

    #[async_trait]
    impl TagLister for Registry {
        async fn list_tags(&self, reference: &OciReference) -> anyhow::Result<Vec<String>>;
    }
}

/// Registry answering every listing with `tags`
pub fn registry_with_tags(tags: &[&str]) -> MockRegistry {
    let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
    let mut registry = MockRegistry::new();
    registry
        .expect_list_tags()
        .returning(move |_| Ok(tags.clone()));
    registry
}
