//! Fluent builder for porter.yaml documents

#![allow(dead_code)]

/// Builds porter.yaml text for tests
pub struct ManifestBuilder {
    schema_version: String,
    name: String,
    version: String,
    registry: String,
    mixins: Vec<String>,
    sections: Vec<String>,
    install: Vec<String>,
    uninstall: Vec<String>,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self {
            schema_version: "1.0.0".to_string(),
            name: "hello".to_string(),
            version: "0.1.0".to_string(),
            registry: "localhost:5000".to_string(),
            mixins: vec!["exec".to_string()],
            sections: Vec::new(),
            install: Vec::new(),
            uninstall: vec![exec_step("Uninstall", "echo goodbye")],
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_schema_version(mut self, version: &str) -> Self {
        self.schema_version = version.to_string();
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn with_mixin(mut self, mixin: &str) -> Self {
        self.mixins.push(mixin.to_string());
        self
    }

    pub fn without_mixins(mut self) -> Self {
        self.mixins.clear();
        self
    }

    /// Append an install step running `command` with the exec mixin
    pub fn with_install_command(mut self, description: &str, command: &str) -> Self {
        self.install.push(exec_step(description, command));
        self
    }

    /// Append a raw top-level section, e.g. a `parameters:` block
    pub fn with_section(mut self, yaml: &str) -> Self {
        self.sections.push(yaml.trim_end().to_string());
        self
    }

    pub fn build(&self) -> String {
        let mut out = String::new();
        if !self.schema_version.is_empty() {
            out.push_str(&format!("schemaVersion: {}\n", self.schema_version));
        }
        out.push_str(&format!("name: {}\n", self.name));
        out.push_str(&format!("version: {}\n", self.version));
        out.push_str(&format!("registry: \"{}\"\n", self.registry));
        if !self.mixins.is_empty() {
            out.push_str("mixins:\n");
            for m in &self.mixins {
                out.push_str(&format!("  - {}\n", m));
            }
        }
        for section in &self.sections {
            out.push_str(section);
            out.push('\n');
        }
        let install = if self.install.is_empty() {
            vec![exec_step("Install", "echo hello")]
        } else {
            self.install.clone()
        };
        out.push_str("install:\n");
        for step in &install {
            out.push_str(step);
        }
        out.push_str("uninstall:\n");
        for step in &self.uninstall {
            out.push_str(step);
        }
        out
    }
}

impl Default for ManifestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn exec_step(description: &str, command: &str) -> String {
    format!(
        "  - exec:\n      description: \"{}\"\n      command: \"{}\"\n",
        description, command
    )
}
