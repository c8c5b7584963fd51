use crate::config::Config;
use log::warn;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Photo lookup for the broadcast graphics: grouping name or id to a file
/// under the configured base directory. Loaded once at startup; a missing or
/// unreadable map degrades to the default sentinel for every row.
pub struct Fotos {
    map: HashMap<String, String>,
    base_path: String,
    default_file: String,
}

impl Fotos {
    pub fn new(map: HashMap<String, String>, base_path: String, default_file: String) -> Self {
        Self {
            map,
            base_path,
            default_file,
        }
    }

    pub fn load(config: &Config) -> Self {
        let map = if config.fotos_json_path.is_empty() {
            HashMap::new()
        } else {
            match read_map(&config.fotos_json_path) {
                Ok(map) => map,
                Err(e) => {
                    warn!("could not load photo map {}: {e}", config.fotos_json_path);
                    HashMap::new()
                }
            }
        };
        Self::new(
            map,
            config.fotos_base_path.clone(),
            config.fotos_default_file.clone(),
        )
    }

    /// Exact name match first, then id; a hit is joined onto the base
    /// directory, a miss yields the default sentinel verbatim. Whether the
    /// file exists on disk is not this side's problem.
    pub fn resolve(&self, nombre: &str, id: &str) -> String {
        match self.map.get(nombre).or_else(|| self.map.get(id)) {
            Some(file) => self.join(file),
            None => self.default_file.clone(),
        }
    }

    fn join(&self, file: &str) -> String {
        if self.base_path.is_empty() {
            file.to_string()
        } else {
            Path::new(&self.base_path)
                .join(file)
                .to_string_lossy()
                .into_owned()
        }
    }
}

fn read_map(path: &str) -> Result<HashMap<String, String>, String> {
    let text = fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&text).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample() -> Fotos {
        let mut map = HashMap::new();
        map.insert("001".to_string(), "fp.jpg".to_string());
        map.insert("Frente Uno".to_string(), "frente_uno.png".to_string());
        Fotos::new(map, "/srv/fotos".to_string(), "N/A".to_string())
    }

    #[test]
    fn id_hit_joins_base_path() {
        let resolved = sample().resolve("Unmapped Name", "001");
        assert!(resolved.starts_with("/srv/fotos"));
        assert!(resolved.ends_with("fp.jpg"));
    }

    #[test]
    fn name_match_takes_precedence_over_id() {
        let resolved = sample().resolve("Frente Uno", "001");
        assert!(resolved.ends_with("frente_uno.png"));
    }

    #[test]
    fn miss_yields_the_sentinel() {
        assert_eq!(sample().resolve("Nobody", "999"), "N/A");
    }

    #[test]
    fn empty_base_path_returns_bare_filename() {
        let mut map = HashMap::new();
        map.insert("001".to_string(), "fp.jpg".to_string());
        let fotos = Fotos::new(map, String::new(), "N/A".to_string());
        assert_eq!(fotos.resolve("", "001"), "fp.jpg");
    }

    #[test]
    fn unreadable_map_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fotos.json");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "not json at all").unwrap();
        assert!(read_map(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn loads_a_valid_map_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fotos.json");
        fs::write(&path, r#"{"001": "fp.jpg"}"#).unwrap();
        let map = read_map(path.to_str().unwrap()).unwrap();
        assert_eq!(map.get("001").map(String::as_str), Some("fp.jpg"));
    }
}
