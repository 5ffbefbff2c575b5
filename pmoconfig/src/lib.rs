//! # PMOShare Configuration Module
//!
//! Gestion de la configuration pour PMOShare :
//! - Chargement depuis un fichier YAML
//! - Fusion avec la configuration par défaut embarquée
//! - Overrides par variables d'environnement
//! - Getters/setters typés pour les clés de partage
//! - Notification des changements (toutes les clés sont observables)
//!
//! ## Usage
//!
//! ```no_run
//! use pmoconfig::get_config;
//!
//! let config = get_config();
//! let name = config.share_name()?;
//! config.set_sharing_enabled(true)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing::info;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("pmoshare.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load PMOShare configuration"));
}

const ENV_CONFIG_DIR: &str = "PMOSHARE_CONFIG";
const ENV_PREFIX: &str = "PMOSHARE_CONFIG__";

// Clés observables (chemins dans l'arbre YAML).
pub const SHARE_MEDIA: &[&str] = &["share", "media"];
pub const SHARE_DISCOVERABLE: &[&str] = &["share", "discoverable"];
pub const SHARE_NAME: &[&str] = &["share", "name"];
pub const SHARE_AUDIO: &[&str] = &["share", "audio"];
pub const SHARE_VIDEO: &[&str] = &["share", "video"];
pub const SHARE_FEED: &[&str] = &["share", "feed"];
pub const SUPPORT_DIRECTORY: &[&str] = &["host", "support_directory"];

const DEFAULT_SHARE_NAME: &str = "PMOShare Library";
const DEFAULT_SUPPORT_DIRECTORY: &str = "support";

/// Evènement émis à chaque modification d'une clé de configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEvent {
    /// Clé modifiée, sous forme pointée (ex: "share.media").
    pub key: String,
}

impl ConfigEvent {
    pub fn is(&self, path: &[&str]) -> bool {
        self.key == path.join(".")
    }
}

/// Macro pour générer getter/setter de valeurs booléennes observables
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<bool> {
            match self.get_value($path)? {
                Value::Bool(b) => Ok(b),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Gestionnaire de configuration PMOShare.
///
/// Toutes les clés sont observables : chaque écriture est sauvegardée puis
/// diffusée aux abonnés de [`Config::subscribe`].
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
    watchers: Mutex<Vec<Sender<ConfigEvent>>>,
}

impl Config {
    /// Cherche le répertoire de configuration en essayant plusieurs
    /// emplacements dans l'ordre.
    fn find_config_dir(directory: &str) -> String {
        // 1. Répertoire fourni
        if !directory.is_empty() {
            return directory.to_string();
        }

        // 2. Variable d'environnement
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        // 3. Répertoire courant
        if Path::new(".pmoshare").exists() {
            return ".pmoshare".to_string();
        }

        // 4. Répertoire home
        if let Some(home) = home_dir() {
            let home_config = home.join(".pmoshare");
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        ".pmoshare".to_string()
    }

    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("Le chemin spécifié n'est pas un répertoire"));
        }

        // Test d'écriture
        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        fs::read_dir(path)?;

        Ok(())
    }

    /// Détermine et valide le répertoire de configuration.
    ///
    /// # Panics
    ///
    /// Panique si le répertoire ne peut pas être créé ou validé.
    pub fn config_dir(directory: &str) -> String {
        let dir_path = Self::find_config_dir(directory);
        let path = Path::new(&dir_path);

        Self::validate_config_dir(path)
            .expect("Impossible de valider le répertoire de configuration");

        dir_path
    }

    /// Charge la configuration depuis le répertoire indiqué (vide = défauts).
    ///
    /// Fusionne la configuration embarquée avec le fichier `config.yaml`
    /// s'il existe, applique les overrides d'environnement, puis sauvegarde
    /// le résultat.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory);
        info!(config_dir = %config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        let yaml_data = if let Ok(data) = fs::read(&path) {
            info!(config_file = %path, "Loaded config file");
            data
        } else {
            info!(config_file = %path, "Config file not found, using default embedded config");
            DEFAULT_CONFIG.as_bytes().to_vec()
        };

        let external_value: Value = serde_yaml::from_slice(&yaml_data)?;
        merge_yaml(&mut default_value, &external_value);
        let mut config_value = Self::lower_keys_value(default_value);

        Self::apply_env_overrides(&mut config_value);

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
            watchers: Mutex::new(Vec::new()),
        };

        config.save()?;
        Ok(config)
    }

    /// Sauvegarde la configuration courante dans config.yaml.
    pub fn save(&self) -> Result<()> {
        let data = self.data.lock().unwrap();
        let yaml = serde_yaml::to_string(&*data)?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// S'abonne aux changements de configuration.
    ///
    /// Chaque setter diffuse un [`ConfigEvent`] après sauvegarde.
    pub fn subscribe(&self) -> Receiver<ConfigEvent> {
        let (tx, rx) = unbounded::<ConfigEvent>();
        self.watchers.lock().unwrap().push(tx);
        rx
    }

    fn notify(&self, path: &[&str]) {
        let event = ConfigEvent {
            key: path.join("."),
        };
        let mut watchers = self.watchers.lock().unwrap();
        watchers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Ecrit une valeur au chemin donné, sauvegarde et notifie les abonnés.
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        let mut data = self.data.lock().unwrap();
        Self::set_value_internal(&mut data, path, value)?;
        drop(data);
        self.save()?;
        self.notify(path);
        Ok(())
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key = path[0].to_lowercase();
            let key_value = Value::String(key.clone());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Lit la valeur au chemin donné.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data.lock().unwrap();
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                let key = key.to_lowercase();

                if let Some(next) = map.get(&Value::String(key)) {
                    current = next;
                } else {
                    return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                }
            } else {
                return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if key.starts_with(ENV_PREFIX) {
                let key_path = key
                    .trim_start_matches(ENV_PREFIX)
                    .split("__")
                    .collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                let _ = Self::set_value_internal(config, &key_path, yaml_value);
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
            return parsed;
        }
        Value::String(value.to_string())
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    if let Value::String(s) = k {
                        let new_key = Value::String(s.to_lowercase());
                        new_map.insert(new_key, Self::lower_keys_value(v));
                    } else {
                        new_map.insert(k, Self::lower_keys_value(v));
                    }
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    // ------------------------------------------------------------------
    // Accesseurs typés
    // ------------------------------------------------------------------

    impl_bool_config!(is_sharing_enabled, set_sharing_enabled, SHARE_MEDIA, false);
    impl_bool_config!(is_discoverable, set_discoverable, SHARE_DISCOVERABLE, true);
    impl_bool_config!(share_audio, set_share_audio, SHARE_AUDIO, true);
    impl_bool_config!(share_video, set_share_video, SHARE_VIDEO, true);
    impl_bool_config!(share_feed, set_share_feed, SHARE_FEED, false);

    /// Nom de partage demandé à l'enregistrement mDNS.
    pub fn share_name(&self) -> Result<String> {
        match self.get_value(SHARE_NAME)? {
            Value::String(s) if !s.is_empty() => Ok(s),
            _ => Ok(DEFAULT_SHARE_NAME.to_string()),
        }
    }

    pub fn set_share_name(&self, name: &str) -> Result<()> {
        self.set_value(SHARE_NAME, Value::String(name.to_string()))
    }

    /// Répertoire de support (bases miroir des partages distants).
    ///
    /// Un chemin relatif est résolu par rapport au répertoire de
    /// configuration. Le répertoire est créé si nécessaire.
    pub fn support_directory(&self) -> Result<PathBuf> {
        let raw = match self.get_value(SUPPORT_DIRECTORY)? {
            Value::String(s) if !s.is_empty() => s,
            _ => DEFAULT_SUPPORT_DIRECTORY.to_string(),
        };

        let path = Path::new(&raw);
        let absolute_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.config_dir).join(path)
        };

        if !absolute_path.exists() {
            fs::create_dir_all(&absolute_path)?;
            info!(directory = %absolute_path.display(), "Created support directory");
        }

        Ok(absolute_path)
    }
}

/// Fusionne récursivement `overlay` dans `base`.
fn merge_yaml(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (k, v) in overlay_map {
                match base_map.get_mut(k) {
                    Some(base_entry) => merge_yaml(base_entry, v),
                    None => {
                        base_map.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

/// Retourne la configuration globale.
pub fn get_config() -> &'static Arc<Config> {
    &CONFIG
}
