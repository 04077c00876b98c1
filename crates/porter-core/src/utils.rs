//! Naming helpers shared by the compiler and the runtime

/// Environment variable that carries a parameter named `name`
/// when the manifest does not declare one.
pub fn env_var_name(name: &str) -> String {
    name.to_uppercase().replace(['-', '.'], "_")
}

/// Name of the internal parameter that carries a bundle output back in
pub fn output_wiring_name(output: &str) -> String {
    format!("porter-{}-output", output)
}

/// Name of the internal parameter that carries a dependency output in
pub fn dependency_output_wiring_name(dependency: &str, output: &str) -> String {
    format!("porter-{}-{}-dep-output", dependency, output)
}

/// Check whether an `applyTo` list covers `action`. Empty means every action.
pub fn applies_to(apply_to: &[String], action: &str) -> bool {
    apply_to.is_empty() || apply_to.iter().any(|a| a == action)
}

/// Lower the first character, e.g. `MediaType` -> `mediaType`
pub fn lower_camel(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Get the user's home directory
pub fn get_home_dir() -> Option<std::path::PathBuf> {
    dirs::home_dir()
}
