use std::{
    collections::HashMap,
    env, fs,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use directories::BaseDirs;

#[derive(Debug, Clone)]
pub struct Config {
    inner: HashMap<String, String>,
    pub config_path: PathBuf,
}

impl Config {
    /// Defaults, then the rc file, then `.env` in the working directory, then the process env.
    pub fn load() -> Self {
        let mut map = default_map();
        let config_path = default_config_path();

        if config_path.exists() {
            merge_rc_file(&mut map, &config_path);
        }

        // .env only fills variables that are not already set
        let _ = dotenvy::dotenv();

        for (k, v) in env::vars() {
            if is_config_key(&k) {
                map.insert(k, v);
            }
        }

        Self { inner: map, config_path }
    }

    /// Config built from defaults plus explicit pairs, ignoring files and the environment.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = default_map();
        for (k, v) in pairs {
            map.insert(k.into(), v.into());
        }
        Self { inner: map, config_path: default_config_path() }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).cloned()
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.inner.insert(key.to_string(), value.into());
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse::<usize>().ok())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse::<u64>().ok())
    }

    pub fn get_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.get_path("OUTPUT_DIR").unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn remote_output_dir(&self) -> String {
        self.get("REMOTE_OUTPUT_DIR").unwrap_or_else(|| "/home/user".into())
    }

    pub fn e2b_api_url(&self) -> String {
        match self.get("E2B_API_URL") {
            Some(url) if !url.trim().is_empty() => url,
            _ => format!("https://api.{}", self.get("E2B_DOMAIN").unwrap_or_else(|| "e2b.app".into())),
        }
    }
}

fn merge_rc_file(map: &mut HashMap<String, String>, path: &Path) {
    let Ok(file) = fs::File::open(path) else {
        return;
    };
    let reader = BufReader::new(file);
    for line in reader.lines().map_while(Result::ok) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            map.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
}

fn is_config_key(k: &str) -> bool {
    const KEYS: &[&str] = &[
        "ANTHROPIC_API_KEY",
        "ANTHROPIC_BASE_URL",
        "DEFAULT_MODEL",
        "MAX_TOKENS",
        "REQUEST_TIMEOUT",
        "E2B_API_KEY",
        "E2B_DOMAIN",
        "E2B_API_URL",
        "E2B_SANDBOX_URL",
        "SANDBOX_TEMPLATE",
        "SESSION_SANDBOX_TEMPLATE",
        "REMOTE_OUTPUT_DIR",
        "OUTPUT_DIR",
        "PRETTIFY_MARKDOWN",
    ];

    KEYS.contains(&k) || k.starts_with("INTERPRETER_")
}

fn default_config_path() -> PathBuf {
    let base = BaseDirs::new()
        .map(|b| b.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.config"));
    base.join("opus_interpreter").join(".interpreterrc")
}

fn default_map() -> HashMap<String, String> {
    let mut m = HashMap::new();

    // Endpoints
    m.insert("ANTHROPIC_BASE_URL".into(), "https://api.anthropic.com".into());
    m.insert("E2B_DOMAIN".into(), "e2b.app".into());

    // Numbers
    m.insert("MAX_TOKENS".into(), "4096".into());
    m.insert("REQUEST_TIMEOUT".into(), "300".into());

    // Strings
    m.insert("DEFAULT_MODEL".into(), "claude-3-opus-20240229".into());
    m.insert("SANDBOX_TEMPLATE".into(), "code-interpreter-v1".into());
    m.insert("SESSION_SANDBOX_TEMPLATE".into(), "base".into());
    m.insert("REMOTE_OUTPUT_DIR".into(), "/home/user".into());
    m.insert("OUTPUT_DIR".into(), ".".into());

    // Bools as strings
    m.insert("PRETTIFY_MARKDOWN".into(), "true".into());

    m
}
