use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use ini::Ini;

/// Connection values read from the `[client]` section of a MySQL options
/// file. Absent keys stay `None` and never override explicit flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MyCnfValues {
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub socket: Option<String>,
    pub database: Option<String>,
}

pub fn read_my_cnf(path: &Path) -> Result<MyCnfValues> {
    let path = expand_home(path)?;
    if !path.exists() {
        return Err(anyhow!("config file {} does not exist", path.display()));
    }

    let config = Ini::load_from_file(&path)
        .with_context(|| format!("unable to read config file {}", path.display()))?;
    let section = config
        .section(Some("client"))
        .ok_or_else(|| anyhow!("config file {} has no [client] section", path.display()))?;

    Ok(MyCnfValues {
        user: non_empty(section.get("user")),
        password: non_empty(section.get("password")),
        host: non_empty(section.get("host")),
        port: section.get("port").and_then(|port| port.trim().parse().ok()),
        socket: non_empty(section.get("socket")),
        database: non_empty(section.get("database")),
    })
}

fn expand_home(path: &Path) -> Result<PathBuf> {
    let Ok(stripped) = path.strip_prefix("~") else {
        return Ok(path.to_path_buf());
    };
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("HOME is not set, cannot expand {}", path.display()))?;
    Ok(home.join(stripped))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
