use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use virtual_patient_core::persona::{Catalog, Persona};

/// Reads every `*.json` file in `dir_path` as a persona.
pub fn load_personas(dir_path: &Path) -> Result<Vec<Persona>> {
    let mut personas = Vec::new();

    for entry in fs::read_dir(dir_path)
        .with_context(|| format!("Failed to read personas directory: {}", dir_path.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read persona file: {}", path.display()))?;
            let persona: Persona = serde_json::from_str(&content)
                .with_context(|| format!("Invalid persona file: {}", path.display()))?;
            personas.push(persona);
        }
    }

    personas.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(personas)
}

/// The built-in patients, extended or overridden by the files in `dir_path`.
pub fn load_catalog(dir_path: Option<&Path>) -> Result<Catalog> {
    let mut catalog = Catalog::builtin();
    if let Some(dir_path) = dir_path {
        for persona in load_personas(dir_path)? {
            tracing::debug!("Loaded persona {} from {}", persona.id, dir_path.display());
            catalog.insert(persona);
        }
    }
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    const PATIENT: &str = r#"{
        "id": "amira-haddad",
        "name": "Amira Haddad",
        "age": 34,
        "ethnicity": "Arab British",
        "occupation": "pharmacist",
        "short_description": "Pharmacist with recurring migraines",
        "health_concerns": ["Migraines three times a week"],
        "personality_traits": ["Precise", "Slightly impatient"],
        "demeanour": "Use accurate medical vocabulary.",
        "avatar_id": "Anna_public"
    }"#;

    #[test]
    fn test_load_personas_successfully() -> Result<()> {
        // 1. Arrange: one persona file, one file to ignore and a subdirectory.
        let dir = tempdir()?;
        let dir_path = dir.path();

        let mut file = File::create(dir_path.join("amira.json"))?;
        writeln!(file, "{PATIENT}")?;

        let mut ignored_file = File::create(dir_path.join("notes.md"))?;
        writeln!(ignored_file, "not a persona")?;

        std::fs::create_dir(dir_path.join("subdir"))?;

        // 2. Act
        let personas = load_personas(dir_path)?;

        // 3. Assert
        assert_eq!(personas.len(), 1, "Should only load .json files");
        assert_eq!(personas[0].id, "amira-haddad");
        assert_eq!(personas[0].age, 34);

        Ok(())
    }

    #[test]
    fn test_catalog_adds_loaded_personas() -> Result<()> {
        let dir = tempdir()?;
        let mut file = File::create(dir.path().join("amira.json"))?;
        writeln!(file, "{PATIENT}")?;

        let catalog = load_catalog(Some(dir.path()))?;

        assert_eq!(catalog.len(), 6);
        assert!(catalog.find("amira-haddad").is_some());
        assert!(catalog.find("zhao-li").is_some());
        Ok(())
    }

    #[test]
    fn test_invalid_persona_file_is_an_error() -> Result<()> {
        let dir = tempdir()?;
        let mut file = File::create(dir.path().join("broken.json"))?;
        writeln!(file, "{{\"id\": \"half\"}}")?;

        let err = load_personas(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid persona file"));
        Ok(())
    }

    #[test]
    fn test_load_personas_from_nonexistent_dir() {
        let result = load_personas(Path::new("nonexistent_dir_for_testing_personas"));
        assert!(result.is_err());
    }
}
