use common::{CoordResult, CoordinatorError, RoomConfig, RoomId};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
};
use tracing::info;

/// Store externo con la configuración de cada sala. Solo se lee al arrancar un job.
pub trait ConfigStore: Send + Sync {
    /// Registro validado; si falta o está incompleto es `ConfigLoad`.
    fn load(&self, room: &str) -> CoordResult<RoomConfig>;

    /// Registro tal cual está guardado.
    fn get(&self, room: &str) -> Option<RoomConfig>;

    fn save(&self, room: &str, config: RoomConfig) -> CoordResult<()>;
}

/// Store en memoria, opcionalmente respaldado por un archivo JSON `{ room: RoomConfig }`.
pub struct JsonConfigStore {
    path: Option<PathBuf>,
    rooms: RwLock<HashMap<RoomId, RoomConfig>>,
}

impl JsonConfigStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Lee el archivo si existe; si no, arranca vacío y lo crea en el primer save.
    pub fn open(path: impl AsRef<Path>) -> CoordResult<Self> {
        let path = path.as_ref().to_path_buf();
        let rooms: HashMap<RoomId, RoomConfig> = if path.exists() {
            let data = fs::read_to_string(&path)?;
            serde_json::from_str(&data)?
        } else {
            HashMap::new()
        };

        info!(
            "store de configuración {} cargado ({} salas)",
            path.display(),
            rooms.len()
        );

        Ok(Self {
            path: Some(path),
            rooms: RwLock::new(rooms),
        })
    }

    fn persist(&self, rooms: &HashMap<RoomId, RoomConfig>) -> CoordResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(rooms)?)?;
        Ok(())
    }
}

impl ConfigStore for JsonConfigStore {
    fn load(&self, room: &str) -> CoordResult<RoomConfig> {
        let config = self
            .get(room)
            .ok_or_else(|| CoordinatorError::ConfigLoad(format!("no hay registro para la sala {room}")))?;
        config.validate(room)?;
        Ok(config)
    }

    fn get(&self, room: &str) -> Option<RoomConfig> {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(room)
            .cloned()
    }

    fn save(&self, room: &str, config: RoomConfig) -> CoordResult<()> {
        config.validate(room)?;
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        rooms.insert(room.to_string(), config);
        self.persist(&rooms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir().join("config_store_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    fn config(population_size: usize) -> RoomConfig {
        serde_json::from_value(serde_json::json!({
            "parameters": {
                "population_size": population_size,
                "chromosome_length": 6,
                "generations": 3
            },
            "fitness": {"function": "count_ones"},
            "selection": {"name": "tournament", "function": "tournament"}
        }))
        .unwrap()
    }

    #[test]
    fn load_de_sala_inexistente_es_config_load() {
        let store = JsonConfigStore::in_memory();
        assert!(matches!(store.load("nada"), Err(CoordinatorError::ConfigLoad(_))));
    }

    #[test]
    fn save_rechaza_registros_incompletos() {
        let store = JsonConfigStore::in_memory();
        assert!(store.save("r", config(0)).is_err());
        assert!(store.get("r").is_none());
    }

    #[test]
    fn save_y_open_persisten_en_disco() {
        let dir = temp_dir("persist");
        let path = dir.join("nested").join("rooms.json");

        let store = JsonConfigStore::open(&path).unwrap();
        store.save("r1", config(8)).unwrap();
        assert!(path.exists());

        let reopened = JsonConfigStore::open(&path).unwrap();
        let loaded = reopened.load("r1").unwrap();
        assert_eq!(loaded.parameters.population_size, 8);
        assert!(loaded.mutations.is_empty());
    }

    #[test]
    fn open_con_json_roto_falla() {
        let dir = temp_dir("roto");
        let path = dir.join("rooms.json");
        fs::write(&path, "{ no es json").unwrap();

        assert!(matches!(
            JsonConfigStore::open(&path),
            Err(CoordinatorError::Json(_))
        ));
    }

    #[test]
    fn load_valida_lo_que_hay_en_el_archivo() {
        let dir = temp_dir("invalido");
        let path = dir.join("rooms.json");
        let mut rooms = HashMap::new();
        rooms.insert("r".to_string(), config(0));
        fs::write(&path, serde_json::to_string(&rooms).unwrap()).unwrap();

        let store = JsonConfigStore::open(&path).unwrap();
        assert!(store.get("r").is_some());
        assert!(matches!(store.load("r"), Err(CoordinatorError::ConfigLoad(_))));
    }
}
