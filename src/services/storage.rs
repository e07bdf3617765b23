// 启动期数据读取：配置文件与数据目录

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use russh::keys::PrivateKey;

use crate::constants::defaults::DATA_DIR_NAME;
use crate::models::Config;
use crate::services::host_keys;

/// 获取默认数据目录路径
/// macOS: ~/Library/Application Support/sshhoney
/// Linux: ~/.local/share/sshhoney
/// Windows: C:\Users\<用户名>\AppData\Roaming\sshhoney
pub fn default_data_dir() -> Result<PathBuf> {
    Ok(dirs::data_dir()
        .context("无法获取系统数据目录")?
        .join(DATA_DIR_NAME))
}

/// 加载配置，未指定文件时使用默认配置
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("无法读取配置文件 {}", path.display()))?;
    let config = Config::from_yaml(&content)
        .with_context(|| format!("无法解析配置文件 {}", path.display()))?;
    Ok(config)
}

/// 启动所需的全部数据
pub struct Setup {
    pub config: Config,
    pub host_keys: Vec<PrivateKey>,
}

/// 解析主机密钥
///
/// 配置未列出任何主机密钥时，使用（必要时生成）数据目录下的默认密钥，
/// 并把它的路径写回配置。
pub fn resolve(mut config: Config, data_dir: &Path) -> Result<Setup> {
    if config.server.host_keys.is_empty() {
        let key_file = host_keys::ensure_default_key(data_dir).context("无法准备默认主机密钥")?;
        config
            .server
            .host_keys
            .push(key_file.to_string_lossy().into_owned());
    }

    let keys = host_keys::resolve_host_keys(&config.server.host_keys).context("无法加载主机密钥")?;
    tracing::info!("Loaded {} host key(s)", keys.len());

    Ok(Setup {
        config,
        host_keys: keys,
    })
}
